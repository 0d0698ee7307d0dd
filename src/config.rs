use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// One `{symbol, url, weight}` triple of the startup portfolio.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SeedHolding {
    pub symbol: String,
    pub url: String,
    pub weight: Decimal,
}

impl SeedHolding {
    fn screener(symbol: &str, path: &str, weight: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            url: format!("https://www.screener.in/company/{path}"),
            weight,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    pub concurrency: usize,
    pub seed: Vec<SeedHolding>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: 1,
            seed: default_seed(),
        }
    }
}

/// Midcap basket tracked when no seed file is given.
pub fn default_seed() -> Vec<SeedHolding> {
    vec![
        SeedHolding::screener("DIXON", "DIXON/consolidated/", dec!(10.08)),
        SeedHolding::screener("COFORGE", "COFORGE/consolidated/", dec!(9.79)),
        SeedHolding::screener("TRENT", "TRENT/consolidated/", dec!(9.14)),
        SeedHolding::screener("ETERNAL", "ETERNAL/consolidated/", dec!(9.03)),
        SeedHolding::screener("KALYANKJIL", "KALYANKJIL/consolidated/", dec!(8.70)),
        SeedHolding::screener("PAYTM", "PAYTM/consolidated/", dec!(8.68)),
        SeedHolding::screener("PERSISTENT", "PERSISTENT/consolidated/", dec!(8.39)),
        SeedHolding::screener("POLYCAB", "POLYCAB/consolidated/", dec!(6.22)),
        SeedHolding::screener("KEI", "KEI/", dec!(4.11)),
        SeedHolding::screener("KAYNES", "KAYNES/consolidated/", dec!(3.70)),
        SeedHolding::screener("BHARTIHEXA", "BHARTIHEXA/", dec!(3.34)),
        SeedHolding::screener("MAXHEALTH", "MAXHEALTH/consolidated/", dec!(3.21)),
        SeedHolding::screener("ABCAPITAL", "ABCAPITAL/consolidated/", dec!(3.20)),
        SeedHolding::screener("TIINDIA", "TIINDIA/consolidated/", dec!(2.98)),
        SeedHolding::screener("PRESTIGE", "PRESTIGE/consolidated/", dec!(2.58)),
        SeedHolding::screener("SUPREMEIND", "SUPREMEIND/consolidated/", dec!(2.38)),
        SeedHolding::screener("KPITTECH", "KPITTECH/consolidated/", dec!(1.03)),
        SeedHolding::screener("POWERINDIA", "POWERINDIA", dec!(0.86)),
    ]
}

pub fn load_seed_file(path: &Path) -> Result<Vec<SeedHolding>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let seed = serde_json::from_str(&content)
        .with_context(|| format!("Invalid seed file {}", path.display()))?;
    Ok(seed)
}
