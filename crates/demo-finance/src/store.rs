//! Users, holdings and transactions on top of the finance SQLite store

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;
use webgrade_common::Database;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUser,

    #[error("can't afford")]
    InsufficientCash,

    #[error("too many shares")]
    InsufficientShares,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub shares: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub shares: i64,
    pub price: f64,
    pub timestamp: String,
}

/// Finance store over the shared [`Database`] wrapper
#[derive(Clone)]
pub struct FinanceStore {
    db: Database,
}

impl FinanceStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create_user(&self, username: &str, password: &str) -> StoreResult<i64> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let result = conn.execute(
            "INSERT INTO users (username, hash) VALUES (?1, ?2)",
            params![username, hash_password(username, password)],
        );
        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateUser)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The user's id if the credentials match
    pub fn authenticate(&self, username: &str, password: &str) -> StoreResult<Option<i64>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, hash FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(id, hash)| (hash == hash_password(username, password)).then_some(id)))
    }

    pub fn cash(&self, user_id: i64) -> StoreResult<f64> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let cash = conn.query_row(
            "SELECT cash FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(cash)
    }

    /// Symbols with a positive share count, alphabetical
    pub fn holdings(&self, user_id: i64) -> StoreResult<Vec<Holding>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(
            "SELECT symbol, SUM(shares) AS total FROM transactions
             WHERE user_id = ?1 GROUP BY symbol HAVING total > 0 ORDER BY symbol",
        )?;
        let holdings = stmt
            .query_map(params![user_id], |row| {
                Ok(Holding {
                    symbol: row.get(0)?,
                    shares: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(holdings)
    }

    pub fn shares_owned(&self, user_id: i64, symbol: &str) -> StoreResult<i64> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let shares = conn.query_row(
            "SELECT COALESCE(SUM(shares), 0) FROM transactions WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
            |row| row.get(0),
        )?;
        Ok(shares)
    }

    /// Record a purchase (positive `shares`) or sale (negative), moving cash
    /// atomically.
    pub fn trade(&self, user_id: i64, symbol: &str, shares: i64, price: f64) -> StoreResult<()> {
        let conn = self.db.connection();
        let mut conn = conn.lock();
        let tx = conn.transaction()?;

        let cash: f64 = tx.query_row(
            "SELECT cash FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let cost = shares as f64 * price;
        if cost > cash {
            return Err(StoreError::InsufficientCash);
        }
        if shares < 0 {
            let owned: i64 = tx.query_row(
                "SELECT COALESCE(SUM(shares), 0) FROM transactions WHERE user_id = ?1 AND symbol = ?2",
                params![user_id, symbol],
                |row| row.get(0),
            )?;
            if owned < -shares {
                return Err(StoreError::InsufficientShares);
            }
        }

        tx.execute(
            "UPDATE users SET cash = cash - ?1 WHERE id = ?2",
            params![cost, user_id],
        )?;
        tx.execute(
            "INSERT INTO transactions (user_id, symbol, shares, price) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, symbol, shares, price],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn history(&self, user_id: i64) -> StoreResult<Vec<Trade>> {
        let conn = self.db.connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(
            "SELECT symbol, shares, price, timestamp FROM transactions
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let trades = stmt
            .query_map(params![user_id], |row| {
                Ok(Trade {
                    symbol: row.get(0)?,
                    shares: row.get(1)?,
                    price: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trades)
    }
}

fn hash_password(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            username TEXT NOT NULL,
            hash TEXT NOT NULL,
            cash NUMERIC NOT NULL DEFAULT 10000.00
        );
        CREATE UNIQUE INDEX username ON users (username);
        CREATE TABLE transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            symbol TEXT NOT NULL,
            shares INTEGER NOT NULL,
            price REAL NOT NULL,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );
    "#;

    fn store() -> FinanceStore {
        let db = Database::open_memory().unwrap();
        db.apply_schema(SCHEMA).unwrap();
        FinanceStore::new(db)
    }

    #[test]
    fn test_register_and_authenticate() {
        let store = store();
        let id = store.create_user("testuser", "password123").unwrap();

        assert_eq!(store.authenticate("testuser", "password123").unwrap(), Some(id));
        assert_eq!(store.authenticate("testuser", "wrong").unwrap(), None);
        assert_eq!(store.authenticate("nobody", "password123").unwrap(), None);
        assert!(matches!(
            store.create_user("testuser", "other"),
            Err(StoreError::DuplicateUser)
        ));
    }

    #[test]
    fn test_buy_then_sell() {
        let store = store();
        let id = store.create_user("testuser", "pw").unwrap();
        assert_eq!(store.cash(id).unwrap(), 10_000.0);

        store.trade(id, "AAAA", 4, 28.0).unwrap();
        assert_eq!(store.cash(id).unwrap(), 9_888.0);
        assert_eq!(
            store.holdings(id).unwrap(),
            vec![Holding { symbol: "AAAA".to_string(), shares: 4 }]
        );

        assert!(matches!(
            store.trade(id, "AAAA", -8, 28.0),
            Err(StoreError::InsufficientShares)
        ));

        store.trade(id, "AAAA", -2, 28.0).unwrap();
        assert_eq!(store.cash(id).unwrap(), 9_944.0);
        assert_eq!(store.shares_owned(id, "AAAA").unwrap(), 2);
        assert_eq!(store.history(id).unwrap().len(), 2);
    }

    #[test]
    fn test_cannot_overspend() {
        let store = store();
        let id = store.create_user("testuser", "pw").unwrap();
        assert!(matches!(
            store.trade(id, "AAAA", 1000, 28.0),
            Err(StoreError::InsufficientCash)
        ));
        assert_eq!(store.cash(id).unwrap(), 10_000.0);
        assert!(store.history(id).unwrap().is_empty());
    }
}
