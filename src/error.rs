use crate::core::currency::CurrencyCode;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Which side of an expense failed to add up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationKind {
    /// Contributions ("who paid").
    Payments,
    /// Splits ("who owes").
    Splits,
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationKind::Payments => write!(f, "payments"),
            AllocationKind::Splits => write!(f, "splits"),
        }
    }
}

/// Errors surfaced by the balance engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} sum to {actual}, expected {expected}")]
    AllocationMismatch {
        kind: AllocationKind,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("no exchange rate available for {base} -> {target}{}", on_date(.date))]
    RateUnavailable {
        base: CurrencyCode,
        target: CurrencyCode,
        date: Option<NaiveDate>,
    },

    #[error("exchange rate must be positive, got {rate} for {base} -> {target}")]
    InvalidRate {
        base: CurrencyCode,
        target: CurrencyCode,
        rate: Decimal,
    },

    /// Raised when conversion is off but the group's expenses span several currencies.
    #[error("group {group} mixes currencies {currencies:?} without conversion")]
    MixedCurrencies {
        group: String,
        currencies: Vec<CurrencyCode>,
    },

    #[error("invalid balance options: {0}")]
    InvalidOptions(String),

    #[error("expense {0} not found")]
    ExpenseNotFound(Uuid),

    #[error("storage error: {0}")]
    Storage(String),
}

fn on_date(date: &Option<NaiveDate>) -> String {
    match date {
        Some(d) => format!(" on {}", d),
        None => String::new(),
    }
}

/// Failure of the remote exchange-rate source.
///
/// Never surfaced directly to callers of the converter: every variant is
/// turned into a fallback lookup, and only escalates as
/// [`EngineError::RateUnavailable`] when no stored rate exists.
#[derive(Debug, Error)]
pub enum RateSourceError {
    #[error("rate source returned HTTP {0}")]
    Http(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate source response has no rate for {0}")]
    MissingTarget(CurrencyCode),

    #[error("malformed rate source response: {0}")]
    Parse(String),

    #[error("rate source is offline")]
    Offline,
}

impl From<reqwest::Error> for RateSourceError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            RateSourceError::Http(status.as_u16())
        } else if e.is_decode() {
            RateSourceError::Parse(e.to_string())
        } else {
            RateSourceError::Network(e.to_string())
        }
    }
}
