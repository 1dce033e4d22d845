use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Amounts closer together than this are considered equal.
///
/// Absorbs rounding drift between allocated amounts and expense totals,
/// and marks members whose net balance is within one cent as settled.
pub const TOLERANCE: Decimal = dec!(0.01);

/// Round a money amount to two decimal places, half away from zero.
///
/// Every conversion and every reported balance goes through this function
/// so that rounding is identical at all call sites.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an amount with a resolved rate: multiply, then round to cents.
///
/// ```
/// use balance_engine::core::currency::convert_amount;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(convert_amount(dec!(100), dec!(1.1)), dec!(110.00));
/// assert_eq!(convert_amount(dec!(10.005), dec!(1)), dec!(10.01));
/// ```
pub fn convert_amount(amount: Decimal, rate: Decimal) -> Decimal {
    round_money(amount * rate)
}

/// ISO 4217-style currency code, normalized to upper case.
///
/// # Examples
///
/// ```
/// use balance_engine::core::currency::CurrencyCode;
///
/// let usd = CurrencyCode::new("usd");
/// assert_eq!(usd.as_str(), "USD");
/// assert_ne!(usd, CurrencyCode::new("EUR"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A pair of currencies representing an exchange rate direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CurrencyPair {
    pub base: CurrencyCode,
    pub target: CurrencyCode,
}

impl CurrencyPair {
    pub fn new(base: CurrencyCode, target: CurrencyCode) -> Self {
        Self { base, target }
    }

    pub fn is_identity(&self) -> bool {
        self.base == self.target
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.target)
    }
}

/// A persisted exchange rate: 1 unit of `base` = `rate` units of `target`
/// on `rate_date`.
///
/// Identity is `(base, target, rate_date)`; stores keep at most one rate
/// per triple. The rate keeps the full precision of its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base: CurrencyCode,
    pub target: CurrencyCode,
    pub rate_date: NaiveDate,
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(
        base: CurrencyCode,
        target: CurrencyCode,
        rate_date: NaiveDate,
        rate: Decimal,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        if rate <= Decimal::ZERO {
            return Err(EngineError::InvalidRate { base, target, rate });
        }
        Ok(Self {
            base,
            target,
            rate_date,
            rate,
            fetched_at,
        })
    }

    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base.clone(), self.target.clone())
    }
}

/// How amounts are normalized into a display currency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// No cross-currency normalization.
    #[default]
    Off,
    /// Today's rate for every conversion.
    Simple,
    /// The historical rate matching each expense's own date.
    Smart,
}

impl ConversionMode {
    /// The rate a given expense date needs under this mode.
    /// `None` when conversion is off.
    pub fn rate_key(&self, expense_date: NaiveDate) -> Option<RateKey> {
        match self {
            ConversionMode::Off => None,
            ConversionMode::Simple => Some(RateKey::Current),
            ConversionMode::Smart => Some(RateKey::Historical(expense_date)),
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversionMode::Off => "off",
            ConversionMode::Simple => "simple",
            ConversionMode::Smart => "smart",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ConversionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(ConversionMode::Off),
            "simple" => Ok(ConversionMode::Simple),
            "smart" => Ok(ConversionMode::Smart),
            other => Err(format!("unknown conversion mode '{}'", other)),
        }
    }
}

/// Which rate a conversion asks for: today's, or the one valid on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "date")]
pub enum RateKey {
    Current,
    Historical(NaiveDate),
}

/// Where a resolved rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateOrigin {
    /// Same currency on both sides; no lookup performed.
    Identity,
    /// Short-lived in-memory cache of current rates.
    MemoryCache,
    /// Persistent rate cache, exact date match.
    Stored,
    /// Fetched from the remote rate source.
    Remote,
    /// Latest persisted rate for the pair, used after a remote failure.
    Fallback,
}

/// A resolved exchange rate ready to be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub rate: Decimal,
    pub rate_date: NaiveDate,
    pub origin: RateOrigin,
    /// True when the rate belongs to a different date than the one
    /// requested, because the remote source failed.
    pub approximate: bool,
}

impl RateQuote {
    pub fn identity(rate_date: NaiveDate) -> Self {
        Self {
            rate: Decimal::ONE,
            rate_date,
            origin: RateOrigin::Identity,
            approximate: false,
        }
    }

    pub fn exact(rate: Decimal, rate_date: NaiveDate, origin: RateOrigin) -> Self {
        Self {
            rate,
            rate_date,
            origin,
            approximate: false,
        }
    }

    pub fn fallback(rate: Decimal, rate_date: NaiveDate, requested: Option<NaiveDate>) -> Self {
        Self {
            rate,
            rate_date,
            origin: RateOrigin::Fallback,
            approximate: requested != Some(rate_date),
        }
    }
}

/// Pre-resolved rates into a single target currency.
///
/// Built once per balance calculation so that each distinct
/// `(source currency, rate key)` pair is resolved a single time instead
/// of once per expense.
///
/// # Examples
///
/// ```
/// use balance_engine::core::currency::{CurrencyCode, RateKey, RateOrigin, RateQuote, RateTable};
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
/// let mut table = RateTable::new(CurrencyCode::new("USD"));
/// table.insert(
///     CurrencyCode::new("EUR"),
///     RateKey::Current,
///     RateQuote::exact(dec!(1.1), today, RateOrigin::Remote),
/// );
///
/// let quote = table.get(&CurrencyCode::new("EUR"), &RateKey::Current).unwrap();
/// assert_eq!(quote.rate, dec!(1.1));
/// ```
#[derive(Debug, Clone)]
pub struct RateTable {
    /// The currency every rate converts into.
    pub target: CurrencyCode,
    rates: HashMap<(CurrencyCode, RateKey), RateQuote>,
}

impl RateTable {
    pub fn new(target: CurrencyCode) -> Self {
        Self {
            target,
            rates: HashMap::new(),
        }
    }

    pub fn insert(&mut self, source: CurrencyCode, key: RateKey, quote: RateQuote) {
        self.rates.insert((source, key), quote);
    }

    /// Look up a pre-resolved quote. Quotes for the target currency itself
    /// are not required to be present; callers handle identity first.
    pub fn get(&self, source: &CurrencyCode, key: &RateKey) -> Option<&RateQuote> {
        self.rates.get(&(source.clone(), *key))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}
