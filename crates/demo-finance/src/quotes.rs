//! Stock quotes

use tracing::debug;

/// Canned prices served while test mode is enabled
const MOCK_QUOTES: &[(&str, &str, f64)] = &[
    ("AAAA", "Test A Corp", 28.00),
    ("BBBB", "Test B Holdings", 14.50),
    ("CCCC", "Test C Industries", 2_000.00),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
}

/// Where prices come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSource {
    /// Fixed table, no network
    Mock,
    /// No upstream configured; every lookup misses
    Offline,
}

impl QuoteSource {
    pub fn from_env() -> Self {
        if webgrade_common::test_mode_enabled() {
            QuoteSource::Mock
        } else {
            QuoteSource::Offline
        }
    }

    pub fn lookup(&self, symbol: &str) -> Option<Quote> {
        let symbol = symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return None;
        }

        match self {
            QuoteSource::Mock => MOCK_QUOTES
                .iter()
                .find(|(s, _, _)| *s == symbol)
                .map(|(s, name, price)| Quote {
                    symbol: s.to_string(),
                    name: name.to_string(),
                    price: *price,
                }),
            QuoteSource::Offline => {
                debug!("No quote source configured, {} not found", symbol);
                None
            }
        }
    }
}

/// Format a dollar amount as `$1,234.56`
pub fn usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}
