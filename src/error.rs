use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Symbol must not be empty")]
    EmptySymbol,

    #[error("Source url must not be empty")]
    EmptyUrl,

    #[error("Weight {0}% is out of range, expected 0 < weight <= 100")]
    WeightOutOfRange(Decimal),

    #[error("{0} already exists in portfolio")]
    DuplicateSymbol(String),

    #[error("{0} is not in portfolio")]
    UnknownSymbol(String),
}

#[derive(Error, Debug)]
pub enum FetchCause {
    #[error("request timed out")]
    Timeout,

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchCause {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchCause::Timeout
        } else if let Some(status) = err.status() {
            FetchCause::Status(status.as_u16())
        } else {
            FetchCause::Transport(err.to_string())
        }
    }
}

/// A failed fetch for a single holding. Never fatal: the holding falls back
/// to a zero return for the current cycle.
#[derive(Error, Debug)]
#[error("Error fetching {symbol}: {cause}")]
pub struct FetchError {
    pub symbol: String,
    pub url: String,
    #[source]
    pub cause: FetchCause,
}

impl FetchError {
    pub fn new(symbol: &str, url: &str, cause: FetchCause) -> Self {
        Self {
            symbol: symbol.to_owned(),
            url: url.to_owned(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fetch_error_names_holding() {
        let err = FetchError::new("DIXON", "https://example.test", FetchCause::Status(503));
        assert_eq!(
            err.to_string(),
            "Error fetching DIXON: unexpected http status 503"
        );
    }

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            ValidationError::WeightOutOfRange(dec!(120)).to_string(),
            "Weight 120% is out of range, expected 0 < weight <= 100"
        );
        assert_eq!(
            ValidationError::DuplicateSymbol("KEI".into()).to_string(),
            "KEI already exists in portfolio"
        );
    }
}
