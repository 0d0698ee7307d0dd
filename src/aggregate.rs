use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use colored::Colorize;
use futures::{stream, StreamExt};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::fetch::DocumentFetcher;
use crate::portfolio::{Holding, Portfolio};
use crate::quote::{QuoteResult, QuoteStatus};

// tolerated distance between the total weight and 100% before warning
const WEIGHT_TOLERANCE: Decimal = dec!(1);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HoldingReturn {
    pub symbol: String,
    pub return_pct: Decimal,
    /// Raw allocation weight, not normalized.
    pub weight_pct: Decimal,
    pub contribution_pct: Decimal,
    pub status: QuoteStatus,
    pub stale: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FetchNotice {
    pub symbol: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AggregateResult {
    pub cycle: Uuid,
    pub computed_at: DateTime<Utc>,
    pub total_weighted_return: Decimal,
    pub per_holding: Vec<HoldingReturn>,
    pub positive_count: usize,
    pub total_count: usize,
    pub total_weight_pct: Decimal,
    pub notices: Vec<FetchNotice>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Progress {
    pub cycle: Uuid,
    pub completed: usize,
    pub total: usize,
    pub symbol: String,
}

impl AggregateResult {
    /// Highest return, the earliest holding wins a tie.
    pub fn best_performer(&self) -> Option<&HoldingReturn> {
        // max_by_key keeps the last maximum, so walk backwards
        self.per_holding.iter().rev().max_by_key(|h| h.return_pct)
    }

    /// Lowest return, the earliest holding wins a tie.
    pub fn worst_performer(&self) -> Option<&HoldingReturn> {
        self.per_holding.iter().min_by_key(|h| h.return_pct)
    }

    /// Total weight when it strays more than one point from 100%.
    pub fn weight_divergence(&self) -> Option<Decimal> {
        if self.total_count == 0 {
            return None;
        }
        if (self.total_weight_pct - dec!(100)).abs() > WEIGHT_TOLERANCE {
            Some(self.total_weight_pct)
        } else {
            None
        }
    }
}

/// Folds per-holding quotes into the weighted portfolio return.
///
/// Contributions always use the normalized weight. A zero total weight
/// normalizes every holding to zero instead of dividing.
pub fn summarize(cycle: Uuid, entries: Vec<(&Holding, QuoteResult)>) -> AggregateResult {
    let total_weight: Decimal = entries.iter().map(|(h, _)| h.allocation_weight).sum();

    let mut total_weighted_return = Decimal::ZERO;
    let mut per_holding = Vec::with_capacity(entries.len());
    let mut notices = vec![];

    for (holding, quote) in entries {
        let normalized_weight = if total_weight.is_zero() {
            Decimal::ZERO
        } else {
            holding.allocation_weight / total_weight
        };
        let contribution_pct = quote.return_pct * normalized_weight;
        total_weighted_return += contribution_pct;

        if let Some(message) = quote.notice {
            notices.push(FetchNotice {
                symbol: holding.symbol.clone(),
                message,
            });
        }

        per_holding.push(HoldingReturn {
            symbol: holding.symbol.clone(),
            return_pct: quote.return_pct,
            weight_pct: holding.allocation_weight,
            contribution_pct,
            status: quote.status,
            stale: quote.stale,
        });
    }

    AggregateResult {
        cycle,
        computed_at: Utc::now(),
        total_weighted_return,
        positive_count: per_holding
            .iter()
            .filter(|h| h.return_pct > Decimal::ZERO)
            .count(),
        total_count: per_holding.len(),
        total_weight_pct: total_weight,
        per_holding,
        notices,
    }
}

pub struct Aggregator<F> {
    cache: Arc<ResultCache<F>>,
    concurrency: usize,
}

impl<F: DocumentFetcher + 'static> Aggregator<F> {
    pub fn new(cache: Arc<ResultCache<F>>) -> Self {
        Self {
            cache,
            concurrency: 1,
        }
    }

    /// Number of holdings fetched at once. Results keep portfolio order
    /// whatever the value.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache<F>> {
        &self.cache
    }

    pub async fn compute(&self, portfolio: &Portfolio) -> AggregateResult {
        self.compute_with_progress(portfolio, |_| {}).await
    }

    pub async fn compute_with_progress<P>(
        &self,
        portfolio: &Portfolio,
        mut on_progress: P,
    ) -> AggregateResult
    where
        P: FnMut(Progress) + Send,
    {
        let cycle = Uuid::new_v4();
        let total = portfolio.len();
        info!("Refresh cycle {} for {} holdings", cycle, total);

        let lookups: Vec<_> = portfolio
            .holdings()
            .map(|holding| {
                let cache = self.cache.clone();
                let url = holding.source_url.clone();
                let symbol = holding.symbol.clone();
                async move { cache.lookup(&url, &symbol).await }
            })
            .collect();

        let mut quotes = stream::iter(lookups).buffered(self.concurrency);
        let mut results = Vec::with_capacity(total);
        while let Some(quote) = quotes.next().await {
            on_progress(Progress {
                cycle,
                completed: results.len() + 1,
                total,
                symbol: quote.symbol.clone(),
            });
            results.push(quote);
        }

        let aggregate = summarize(cycle, portfolio.holdings().zip(results).collect());
        for notice in aggregate.notices.iter() {
            warn!("{}", notice.message);
        }
        if let Some(total_weight) = aggregate.weight_divergence() {
            warn!(
                "Total weight is {}%, returns are normalized against it",
                total_weight
            );
        }
        info!(
            "Cycle {} done, portfolio return {:+.2}% ({}/{} green)",
            cycle,
            rounded(aggregate.total_weighted_return, 2),
            aggregate.positive_count,
            aggregate.total_count
        );
        aggregate
    }
}

// Display on Decimal truncates past the requested precision
fn rounded(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn colorize_return(value: Decimal, text: String) -> colored::ColoredString {
    if value > Decimal::ZERO {
        text.green()
    } else if value < Decimal::ZERO {
        text.red()
    } else {
        text.normal()
    }
}

impl Display for AggregateResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.per_holding.is_empty() {
            return writeln!(f, "{}", "No stocks in portfolio.".yellow());
        }

        writeln!(
            f,
            "{:<12} {:>9} {:>8} {:>13}",
            "Stock", "Return", "Weight", "Contribution"
        )?;
        for holding in self.per_holding.iter() {
            let status = match holding.status {
                QuoteStatus::Extracted => String::new(),
                other => format!(" ({})", other),
            };
            writeln!(
                f,
                "{:<12} {} {:>8} {:>13}{}",
                holding.symbol,
                colorize_return(
                    holding.return_pct,
                    format!("{:>9}", format!("{:+.2}%", rounded(holding.return_pct, 2)))
                ),
                format!("{:.1}%", rounded(holding.weight_pct, 1)),
                format!("{:+.3}%", rounded(holding.contribution_pct, 3)),
                status.dimmed()
            )?;
        }

        writeln!(f)?;
        writeln!(
            f,
            "Portfolio return today: {}",
            colorize_return(
                self.total_weighted_return,
                format!("{:+.2}%", rounded(self.total_weighted_return, 2))
            )
            .bold()
        )?;
        writeln!(
            f,
            "Green stocks: {}/{}    Total weight: {:.0}%",
            self.positive_count,
            self.total_count,
            rounded(self.total_weight_pct, 0)
        )?;
        if let (Some(best), Some(worst)) = (self.best_performer(), self.worst_performer()) {
            writeln!(
                f,
                "Best: {} ({:+.2}%)    Worst: {} ({:+.2}%)",
                best.symbol.green(),
                rounded(best.return_pct, 2),
                worst.symbol.red(),
                rounded(worst.return_pct, 2)
            )?;
        }
        if let Some(total_weight) = self.weight_divergence() {
            writeln!(
                f,
                "{}",
                format!(
                    "Total weight: {:.1}%. Consider adjusting to 100%.",
                    rounded(total_weight, 1)
                )
                .yellow()
            )?;
        }
        for notice in self.notices.iter() {
            writeln!(f, "{}", notice.message.red())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stub::StubFetcher;
    use std::sync::Mutex;
    use std::time::Duration;

    fn holding(symbol: &str, weight: Decimal) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            source_url: format!("https://example.test/{}", symbol.to_lowercase()),
            allocation_weight: weight,
        }
    }

    fn quote(symbol: &str, return_pct: Decimal) -> QuoteResult {
        QuoteResult {
            symbol: symbol.to_string(),
            return_pct,
            fetched_at: Utc::now(),
            stale: false,
            status: QuoteStatus::Extracted,
            notice: None,
        }
    }

    fn summarize_pairs(pairs: &[(Holding, Decimal)]) -> AggregateResult {
        summarize(
            Uuid::new_v4(),
            pairs
                .iter()
                .map(|(h, r)| (h, quote(&h.symbol, *r)))
                .collect(),
        )
    }

    fn portfolio(pairs: &[(&str, Decimal)]) -> Portfolio {
        let mut portfolio = Portfolio::new();
        for (symbol, weight) in pairs {
            portfolio
                .add_holding(
                    symbol,
                    &format!("https://example.test/{}", symbol.to_lowercase()),
                    *weight,
                )
                .unwrap();
        }
        portfolio
    }

    #[test]
    fn test_weighted_return() {
        let result = summarize_pairs(&[
            (holding("A", dec!(10)), dec!(1.0)),
            (holding("B", dec!(20)), dec!(-2.0)),
            (holding("C", dec!(30)), dec!(3.0)),
        ]);
        let contributions: Vec<Decimal> = result
            .per_holding
            .iter()
            .map(|h| h.contribution_pct.round_dp(4))
            .collect();
        assert_eq!(contributions, vec![dec!(0.1667), dec!(-0.6667), dec!(1.5)]);
        assert_eq!(result.total_weighted_return.round_dp(10), dec!(1));
        assert_eq!(result.total_weight_pct, dec!(60));
        assert_eq!(result.positive_count, 2);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.per_holding[1].weight_pct, dec!(20));
        assert_eq!(result.per_holding[1].return_pct, dec!(-2.0));
    }

    #[test]
    fn test_empty_portfolio() {
        let result = summarize(Uuid::new_v4(), vec![]);
        assert_eq!(result.total_weighted_return, Decimal::ZERO);
        assert!(result.per_holding.is_empty());
        assert_eq!(result.positive_count, 0);
        assert_eq!(result.total_count, 0);
        assert_eq!(result.best_performer(), None);
        assert_eq!(result.worst_performer(), None);
        assert_eq!(result.weight_divergence(), None);
    }

    #[test]
    fn test_zero_total_weight() {
        let result = summarize_pairs(&[
            (holding("A", dec!(0)), dec!(4.5)),
            (holding("B", dec!(0)), dec!(-1.5)),
        ]);
        assert_eq!(result.total_weighted_return, Decimal::ZERO);
        assert!(result
            .per_holding
            .iter()
            .all(|h| h.contribution_pct.is_zero()));
        assert_eq!(result.positive_count, 1);
        assert_eq!(result.total_count, 2);
    }

    #[test]
    fn test_zero_return_is_not_positive() {
        let result = summarize_pairs(&[
            (holding("A", dec!(50)), dec!(0)),
            (holding("B", dec!(50)), dec!(0.01)),
        ]);
        assert_eq!(result.positive_count, 1);
    }

    #[test]
    fn test_performer_ties_pick_first() {
        let result = summarize_pairs(&[
            (holding("A", dec!(10)), dec!(-1.0)),
            (holding("B", dec!(10)), dec!(2.5)),
            (holding("C", dec!(10)), dec!(-1.0)),
            (holding("D", dec!(10)), dec!(2.50)),
        ]);
        assert_eq!(result.best_performer().unwrap().symbol, "B");
        assert_eq!(result.worst_performer().unwrap().symbol, "A");
    }

    #[test]
    fn test_weight_divergence() {
        let close = summarize_pairs(&[
            (holding("A", dec!(60)), dec!(1)),
            (holding("B", dec!(39.5)), dec!(1)),
        ]);
        assert_eq!(close.weight_divergence(), None);

        let far = summarize_pairs(&[(holding("A", dec!(60)), dec!(1))]);
        assert_eq!(far.weight_divergence(), Some(dec!(60)));
    }

    #[tokio::test]
    async fn test_compute_isolates_failed_fetch() {
        let stub = StubFetcher::new()
            .page("https://example.test/a", "<b>+1.00%</b>")
            .status("https://example.test/b", 500)
            .page("https://example.test/c", "<b>+3.00%</b>");
        let aggregator = Aggregator::new(Arc::new(ResultCache::new(
            stub,
            Duration::from_secs(300),
        )));

        let result = aggregator
            .compute(&portfolio(&[("A", dec!(10)), ("B", dec!(20)), ("C", dec!(30))]))
            .await;

        assert_eq!(result.total_count, 3);
        let symbols: Vec<&str> = result.per_holding.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B", "C"]);
        assert_eq!(result.per_holding[1].return_pct, Decimal::ZERO);
        assert_eq!(result.per_holding[1].status, QuoteStatus::FetchFailed);
        assert_eq!(result.per_holding[2].return_pct, dec!(3.00));
        assert_eq!(
            result.notices,
            vec![FetchNotice {
                symbol: "B".into(),
                message: "Error fetching B: unexpected http status 500".into(),
            }]
        );
        // 1/6 + 3/2
        assert_eq!(result.total_weighted_return.round_dp(4), dec!(1.6667));
        assert_eq!(aggregator.cache().fetcher().calls(), 3);
    }

    #[tokio::test]
    async fn test_progress_reported_in_order() {
        let stub = StubFetcher::new()
            .page("https://example.test/a", "-0.50%")
            .page("https://example.test/b", "+0.75%")
            .page("https://example.test/c", "+1.25%")
            .delay(Duration::from_millis(10));
        let aggregator = Aggregator::new(Arc::new(ResultCache::new(
            stub,
            Duration::from_secs(300),
        )))
        .with_concurrency(3);

        let seen = Mutex::new(vec![]);
        let result = aggregator
            .compute_with_progress(
                &portfolio(&[("A", dec!(40)), ("B", dec!(30)), ("C", dec!(30))]),
                |progress| seen.lock().unwrap().push(progress),
            )
            .await;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|p| p.cycle == result.cycle && p.total == 3));
        assert_eq!(
            seen.iter()
                .map(|p| (p.completed, p.symbol.as_str()))
                .collect::<Vec<_>>(),
            vec![(1, "A"), (2, "B"), (3, "C")]
        );
        assert_eq!(result.per_holding[0].return_pct, dec!(-0.50));
        assert_eq!(result.positive_count, 2);
    }

    #[tokio::test]
    async fn test_second_compute_served_from_cache() {
        let stub = StubFetcher::new().page("https://example.test/a", "+2.00%");
        let aggregator = Aggregator::new(Arc::new(ResultCache::new(
            stub,
            Duration::from_secs(300),
        )));
        let portfolio = portfolio(&[("A", dec!(100))]);

        let first = aggregator.compute(&portfolio).await;
        let second = aggregator.compute(&portfolio).await;
        assert!(!first.per_holding[0].stale);
        assert!(second.per_holding[0].stale);
        assert_ne!(first.cycle, second.cycle);
        assert_eq!(second.total_weighted_return, dec!(2.00));
        assert_eq!(aggregator.cache().fetcher().calls(), 1);
    }

    #[test]
    fn test_display_lists_holdings() {
        colored::control::set_override(false);
        let result = summarize_pairs(&[
            (holding("DIXON", dec!(60)), dec!(1.5)),
            (holding("KEI", dec!(40)), dec!(-1.0)),
        ]);
        let text = result.to_string();
        assert!(text.contains("DIXON"));
        assert!(text.contains("+1.50%"));
        assert!(text.contains("-1.00%"));
        assert!(text.contains("60.0%"));
        assert!(text.contains("+0.900%"));
        assert!(text.contains("Portfolio return today: +0.50%"));
        assert!(text.contains("Green stocks: 1/2"));
        assert!(!text.contains("Consider adjusting"));
    }

    #[test]
    fn test_display_rounds() {
        colored::control::set_override(false);
        let result = summarize_pairs(&[
            (holding("A", dec!(10)), dec!(1.0)),
            (holding("B", dec!(20)), dec!(-2.0)),
            (holding("C", dec!(30)), dec!(3.0)),
        ]);
        let text = result.to_string();
        assert!(text.contains("+0.167%"));
        assert!(text.contains("-0.667%"));
        assert!(text.contains("+1.500%"));
        assert!(!text.contains("+0.166%"));
        assert!(text.contains("Portfolio return today: +1.00%"));
        assert!(text.contains("Best: C (+3.00%)    Worst: B (-2.00%)"));

        let near_one = summarize_pairs(&[(holding("A", dec!(100)), dec!(0.9999))]);
        assert!(near_one
            .to_string()
            .contains("Portfolio return today: +1.00%"));
    }
}
