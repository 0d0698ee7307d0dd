use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;

/// How a return figure was obtained. Only `Extracted` carries a figure read
/// from the page, the other two fall back to zero.
#[derive(Serialize, Deserialize, Display, Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuoteStatus {
    #[strum(serialize = "ok")]
    Extracted,
    #[strum(serialize = "no figure")]
    NoMatch,
    #[strum(serialize = "fetch failed")]
    FetchFailed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuoteResult {
    pub symbol: String,
    pub return_pct: Decimal,
    pub fetched_at: DateTime<Utc>,
    /// Served from a cache entry filled by an earlier lookup.
    pub stale: bool,
    pub status: QuoteStatus,
    pub notice: Option<String>,
}

impl QuoteResult {
    pub fn failed(symbol: &str, notice: String) -> Self {
        Self {
            symbol: symbol.to_owned(),
            return_pct: Decimal::ZERO,
            fetched_at: Utc::now(),
            stale: false,
            status: QuoteStatus::FetchFailed,
            notice: Some(notice),
        }
    }
}
