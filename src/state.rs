use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::RwLock;
use tracing::{info, trace};

use crate::aggregate::{AggregateResult, Aggregator, Progress};
use crate::error::ValidationError;
use crate::fetch::DocumentFetcher;
use crate::portfolio::{Holding, Portfolio, PortfolioEvent};
use crate::AppEvent;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct State {
    pub portfolio: Portfolio,
    pub last_aggregate: Option<AggregateResult>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum RefreshEvent {
    Progress(Progress),
    Completed(AggregateResult),
}

/// Entry point for the presentation side: portfolio edits, refreshes and
/// the event feed.
pub struct Tracker<F> {
    state: Arc<RwLock<State>>,
    aggregator: Aggregator<F>,
    tx_app: Sender<AppEvent>,
}

impl<F: DocumentFetcher + 'static> Tracker<F> {
    pub fn new(portfolio: Portfolio, aggregator: Aggregator<F>) -> Self {
        let (tx_app, _) = tokio::sync::broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(State {
                portfolio,
                last_aggregate: None,
            })),
            aggregator,
            tx_app,
        }
    }

    pub fn subscribe(&self) -> Receiver<AppEvent> {
        self.tx_app.subscribe()
    }

    pub fn aggregator(&self) -> &Aggregator<F> {
        &self.aggregator
    }

    pub async fn portfolio(&self) -> Portfolio {
        self.state.read().await.portfolio.clone()
    }

    pub async fn last_aggregate(&self) -> Option<AggregateResult> {
        self.state.read().await.last_aggregate.clone()
    }

    pub async fn add_holding(
        &self,
        symbol: &str,
        url: &str,
        weight: Decimal,
    ) -> Result<Holding, ValidationError> {
        let mut state = self.state.write().await;
        let holding = state.portfolio.add_holding(symbol, url, weight)?;
        info!(
            "Added {} ({}%) from {}",
            holding.symbol, holding.allocation_weight, holding.source_url
        );
        self.notify_portfolio_update(&state.portfolio);
        Ok(holding)
    }

    pub async fn update_holding(
        &self,
        symbol: &str,
        url: Option<&str>,
        weight: Option<Decimal>,
    ) -> Result<Holding, ValidationError> {
        let mut state = self.state.write().await;
        let holding = state.portfolio.update_holding(symbol, url, weight)?;
        info!(
            "Updated {} ({}%) from {}",
            holding.symbol, holding.allocation_weight, holding.source_url
        );
        self.notify_portfolio_update(&state.portfolio);
        Ok(holding)
    }

    pub async fn delete_holding(&self, symbol: &str) -> Result<Holding, ValidationError> {
        let mut state = self.state.write().await;
        let holding = state.portfolio.delete_holding(symbol)?;
        info!("Deleted {}", holding.symbol);
        self.notify_portfolio_update(&state.portfolio);
        Ok(holding)
    }

    /// Drops every cached return and recomputes from fresh fetches.
    pub async fn trigger_refresh(&self) -> AggregateResult {
        self.aggregator.cache().clear().await;
        self.refresh().await
    }

    /// Recomputes the aggregate, reusing cached returns that are still
    /// within their ttl.
    pub async fn get_current_aggregate(&self) -> AggregateResult {
        self.refresh().await
    }

    async fn refresh(&self) -> AggregateResult {
        // work on a snapshot so edits are not blocked by slow fetches
        let portfolio = self.portfolio().await;

        let tx_app = self.tx_app.clone();
        let aggregate = self
            .aggregator
            .compute_with_progress(&portfolio, move |progress| {
                trace!(
                    "Fetched {} ({}/{})",
                    progress.symbol,
                    progress.completed,
                    progress.total
                );
                let _ = tx_app.send(AppEvent::Refresh(RefreshEvent::Progress(progress)));
            })
            .await;

        self.state.write().await.last_aggregate = Some(aggregate.clone());
        let _ = self
            .tx_app
            .send(AppEvent::Refresh(RefreshEvent::Completed(aggregate.clone())));
        aggregate
    }

    fn notify_portfolio_update(&self, portfolio: &Portfolio) {
        // an error only means nobody is listening
        let _ = self
            .tx_app
            .send(AppEvent::Portfolio(PortfolioEvent::Updated(portfolio.clone())));
    }
}
