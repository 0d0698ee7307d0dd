use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::extract::{find_return, visible_text};
use crate::fetch::DocumentFetcher;
use crate::quote::{QuoteResult, QuoteStatus};

#[derive(Clone, Debug)]
struct CachedReturn {
    return_pct: Decimal,
    status: QuoteStatus,
    fetched_at: DateTime<Utc>,
    stored_at: Instant,
}

impl CachedReturn {
    fn to_quote(&self, symbol: &str, stale: bool) -> QuoteResult {
        QuoteResult {
            symbol: symbol.to_owned(),
            return_pct: self.return_pct,
            fetched_at: self.fetched_at,
            stale,
            status: self.status,
            notice: None,
        }
    }
}

type Slot = Arc<Mutex<Option<CachedReturn>>>;

/// Extracted returns keyed by source url, kept for `ttl`.
///
/// Each url has its own slot lock which is held for the duration of a fetch,
/// so concurrent lookups of one url wait for a single fetch instead of
/// issuing their own. Failed fetches are never stored.
pub struct ResultCache<F> {
    fetcher: F,
    ttl: Duration,
    entries: RwLock<HashMap<String, Slot>>,
}

impl<F: DocumentFetcher> ResultCache<F> {
    pub fn new(fetcher: F, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_or_fetch(&self, url: &str, symbol: &str) -> Decimal {
        self.lookup(url, symbol).await.return_pct
    }

    pub async fn lookup(&self, url: &str, symbol: &str) -> QuoteResult {
        let slot = self.slot(url).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry
            .as_ref()
            .filter(|cached| cached.stored_at.elapsed() < self.ttl)
        {
            debug!("Cache hit for {} ({})", symbol, url);
            return cached.to_quote(symbol, true);
        }

        debug!("Cache miss for {} ({})", symbol, url);
        match self.fetcher.fetch_document(url).await {
            Ok(document) => {
                let (return_pct, status) = match find_return(&visible_text(&document)) {
                    Some(value) => (value, QuoteStatus::Extracted),
                    None => {
                        warn!("No return figure found for {} at {}", symbol, url);
                        (Decimal::ZERO, QuoteStatus::NoMatch)
                    }
                };
                let cached = CachedReturn {
                    return_pct,
                    status,
                    fetched_at: Utc::now(),
                    stored_at: Instant::now(),
                };
                let quote = cached.to_quote(symbol, false);
                *entry = Some(cached);
                quote
            }
            Err(cause) => {
                let err = FetchError::new(symbol, url, cause);
                warn!("{}", err);
                QuoteResult::failed(symbol, err.to_string())
            }
        }
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        info!("Cleared {} cached returns", count);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn slot(&self, url: &str) -> Slot {
        if let Some(slot) = self.entries.read().await.get(url) {
            return slot.clone();
        }
        let mut entries = self.entries.write().await;
        entries.entry(url.to_owned()).or_default().clone()
    }
}
