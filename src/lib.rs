use portfolio::PortfolioEvent;
use serde::{Deserialize, Serialize};
use state::RefreshEvent;

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod portfolio;
pub mod quote;
pub mod server;
pub mod state;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum AppEvent {
    Portfolio(PortfolioEvent),
    Refresh(RefreshEvent),
}
