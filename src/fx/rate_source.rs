use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::error::RateSourceError;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A rate as reported by a remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRate {
    pub rate: Decimal,
    /// The date the source says the rate is valid for.
    pub date: NaiveDate,
}

/// Remote exchange-rate provider.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Today's rate for `base -> target`.
    async fn fetch_latest(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<FetchedRate, RateSourceError>;

    /// The rate for `base -> target` valid on `date`.
    async fn fetch_historical(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<FetchedRate, RateSourceError>;
}

#[async_trait]
impl<T: RateSource + ?Sized> RateSource for Arc<T> {
    async fn fetch_latest(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<FetchedRate, RateSourceError> {
        (**self).fetch_latest(base, target).await
    }

    async fn fetch_historical(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<FetchedRate, RateSourceError> {
        (**self).fetch_historical(base, target, date).await
    }
}

/// Table-backed rate source for offline runs and tests.
///
/// Counts every fetch so callers can assert how many remote round-trips a
/// calculation needed, and can be switched offline to exercise fallbacks.
#[derive(Debug, Default)]
pub struct StaticRateSource {
    latest: HashMap<CurrencyPair, FetchedRate>,
    historical: HashMap<(CurrencyPair, NaiveDate), Decimal>,
    offline: AtomicBool,
    fetches: AtomicUsize,
}

impl StaticRateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latest(
        mut self,
        base: CurrencyCode,
        target: CurrencyCode,
        rate: Decimal,
        date: NaiveDate,
    ) -> Self {
        self.latest
            .insert(CurrencyPair::new(base, target), FetchedRate { rate, date });
        self
    }

    pub fn with_historical(
        mut self,
        base: CurrencyCode,
        target: CurrencyCode,
        date: NaiveDate,
        rate: Decimal,
    ) -> Self {
        self.historical
            .insert((CurrencyPair::new(base, target), date), rate);
        self
    }

    /// Make every subsequent fetch fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetch attempts so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn begin_fetch(&self) -> Result<(), RateSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RateSourceError::Offline);
        }
        Ok(())
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn fetch_latest(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<FetchedRate, RateSourceError> {
        self.begin_fetch()?;
        self.latest
            .get(&CurrencyPair::new(base.clone(), target.clone()))
            .cloned()
            .ok_or_else(|| RateSourceError::MissingTarget(target.clone()))
    }

    async fn fetch_historical(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<FetchedRate, RateSourceError> {
        self.begin_fetch()?;
        self.historical
            .get(&(CurrencyPair::new(base.clone(), target.clone()), date))
            .map(|rate| FetchedRate { rate: *rate, date })
            .ok_or_else(|| RateSourceError::MissingTarget(target.clone()))
    }
}
