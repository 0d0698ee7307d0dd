use std::fmt::Display;

use colored::Colorize;
use indexmap::IndexMap;
use itertools::Itertools;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::SeedHolding;
use crate::error::ValidationError;

const MAX_WEIGHT: Decimal = dec!(100);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub source_url: String,
    /// Share of the portfolio in percentage points.
    pub allocation_weight: Decimal,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum PortfolioEvent {
    Updated(Portfolio),
}

/// Holdings keyed by symbol, in insertion order.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Portfolio {
    holdings: IndexMap<String, Holding>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self {
            holdings: IndexMap::new(),
        }
    }

    /// Builds a portfolio from seed triples, rejecting the whole seed on the
    /// first invalid entry.
    pub fn from_seed(seed: &[SeedHolding]) -> Result<Self, ValidationError> {
        let mut portfolio = Self::new();
        for holding in seed {
            portfolio.add_holding(&holding.symbol, &holding.url, holding.weight)?;
        }
        Ok(portfolio)
    }

    pub fn add_holding(
        &mut self,
        symbol: &str,
        url: &str,
        weight: Decimal,
    ) -> Result<Holding, ValidationError> {
        let symbol = normalize_symbol(symbol)?;
        let url = validate_url(url)?;
        validate_weight(weight)?;

        if self.holdings.contains_key(&symbol) {
            return Err(ValidationError::DuplicateSymbol(symbol));
        }

        let holding = Holding {
            symbol: symbol.clone(),
            source_url: url,
            allocation_weight: weight,
        };
        self.holdings.insert(symbol, holding.clone());
        Ok(holding)
    }

    pub fn update_holding(
        &mut self,
        symbol: &str,
        url: Option<&str>,
        weight: Option<Decimal>,
    ) -> Result<Holding, ValidationError> {
        let symbol = normalize_symbol(symbol)?;
        let url = url.map(validate_url).transpose()?;
        if let Some(weight) = weight {
            validate_weight(weight)?;
        }

        let holding = self
            .holdings
            .get_mut(&symbol)
            .ok_or(ValidationError::UnknownSymbol(symbol))?;
        if let Some(url) = url {
            holding.source_url = url;
        }
        if let Some(weight) = weight {
            holding.allocation_weight = weight;
        }
        Ok(holding.clone())
    }

    pub fn delete_holding(&mut self, symbol: &str) -> Result<Holding, ValidationError> {
        let symbol = normalize_symbol(symbol)?;
        // shift_remove keeps the order of the remaining holdings
        self.holdings
            .shift_remove(&symbol)
            .ok_or(ValidationError::UnknownSymbol(symbol))
    }

    pub fn get(&self, symbol: &str) -> Option<&Holding> {
        self.holdings.get(&symbol.trim().to_uppercase())
    }

    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.values()
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn total_weight(&self) -> Decimal {
        self.holdings.values().map(|h| h.allocation_weight).sum()
    }
}

impl Display for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self
            .holdings
            .values()
            .map(|holding| {
                format!(
                    "{} ({}%)",
                    holding.symbol,
                    holding.allocation_weight.to_string().purple()
                )
            })
            .join(" / ");
        write!(
            f,
            "{} holdings, {}% : {}",
            self.len(),
            self.total_weight().to_string().yellow(),
            s
        )
    }
}

fn normalize_symbol(symbol: &str) -> Result<String, ValidationError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    Ok(symbol.to_uppercase())
}

fn validate_url(url: &str) -> Result<String, ValidationError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }
    Ok(url.to_string())
}

fn validate_weight(weight: Decimal) -> Result<(), ValidationError> {
    if weight <= Decimal::ZERO || weight > MAX_WEIGHT {
        return Err(ValidationError::WeightOutOfRange(weight));
    }
    Ok(())
}
