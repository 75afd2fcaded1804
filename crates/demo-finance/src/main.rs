//! finance-demo
//!
//! A small stock-trading web application that satisfies the built-in
//! `finance` scenario. Used as a known-good grading target.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use webgrade_common::Database;

mod app;
mod quotes;
mod store;

use app::AppState;
use quotes::QuoteSource;
use store::FinanceStore;

/// Schema used when the store file starts out empty
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    username TEXT NOT NULL,
    hash TEXT NOT NULL,
    cash NUMERIC NOT NULL DEFAULT 10000.00
);
CREATE UNIQUE INDEX IF NOT EXISTS username ON users (username);
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    shares INTEGER NOT NULL,
    price REAL NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

#[derive(Parser)]
#[command(name = "finance-demo")]
#[command(about = "Reference finance web application")]
#[command(version)]
struct Cli {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listen port
    #[arg(short, long, env = webgrade_common::PORT_ENV, default_value = "5000")]
    port: u16,

    /// SQLite store, relative to the working directory
    #[arg(long, default_value = "finance.db")]
    db: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let db = Database::open(&cli.db)?;
    if db.table_names()?.is_empty() {
        info!("Initializing empty store at {}", cli.db.display());
    }
    db.apply_schema(SCHEMA)?;

    let quotes = QuoteSource::from_env();
    info!("Quote source: {:?}", quotes);

    let state = Arc::new(AppState::new(FinanceStore::new(db), quotes));
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("finance-demo v{} listening on http://{}", webgrade_common::VERSION, addr);

    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("finance-demo shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
