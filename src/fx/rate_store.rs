use crate::core::currency::{CurrencyCode, CurrencyPair, ExchangeRate};
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persistent exchange-rate cache, keyed by `(base, target, rate_date)`.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn find_cached_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, EngineError>;

    /// Batch form of [`find_cached_rate`](Self::find_cached_rate). Dates with
    /// no stored rate are simply absent from the result.
    async fn find_cached_rates(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        dates: &[NaiveDate],
    ) -> Result<HashMap<NaiveDate, ExchangeRate>, EngineError> {
        let mut found = HashMap::new();
        for date in dates {
            if let Some(rate) = self.find_cached_rate(base, target, *date).await? {
                found.insert(*date, rate);
            }
        }
        Ok(found)
    }

    /// The stored rate with the greatest `rate_date` for the pair.
    async fn find_latest_cached_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Option<ExchangeRate>, EngineError>;

    /// Insert or replace the rate for its `(base, target, rate_date)`.
    async fn upsert_rate(&self, rate: ExchangeRate) -> Result<(), EngineError>;

    /// Delete every rate dated before `cutoff`. Returns how many were removed.
    async fn prune_older_than(&self, cutoff: NaiveDate) -> Result<usize, EngineError>;
}

#[async_trait]
impl<T: RateStore + ?Sized> RateStore for Arc<T> {
    async fn find_cached_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, EngineError> {
        (**self).find_cached_rate(base, target, date).await
    }

    async fn find_cached_rates(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        dates: &[NaiveDate],
    ) -> Result<HashMap<NaiveDate, ExchangeRate>, EngineError> {
        (**self).find_cached_rates(base, target, dates).await
    }

    async fn find_latest_cached_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Option<ExchangeRate>, EngineError> {
        (**self).find_latest_cached_rate(base, target).await
    }

    async fn upsert_rate(&self, rate: ExchangeRate) -> Result<(), EngineError> {
        (**self).upsert_rate(rate).await
    }

    async fn prune_older_than(&self, cutoff: NaiveDate) -> Result<usize, EngineError> {
        (**self).prune_older_than(cutoff).await
    }
}

/// Map-backed [`RateStore`]. Clones share the same rates.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateStore {
    rates: Arc<RwLock<HashMap<(CurrencyPair, NaiveDate), ExchangeRate>>>,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rates.read().await.is_empty()
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn find_cached_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, EngineError> {
        let key = (CurrencyPair::new(base.clone(), target.clone()), date);
        Ok(self.rates.read().await.get(&key).cloned())
    }

    async fn find_cached_rates(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        dates: &[NaiveDate],
    ) -> Result<HashMap<NaiveDate, ExchangeRate>, EngineError> {
        let pair = CurrencyPair::new(base.clone(), target.clone());
        let rates = self.rates.read().await;
        Ok(dates
            .iter()
            .filter_map(|date| {
                rates
                    .get(&(pair.clone(), *date))
                    .map(|rate| (*date, rate.clone()))
            })
            .collect())
    }

    async fn find_latest_cached_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Option<ExchangeRate>, EngineError> {
        let pair = CurrencyPair::new(base.clone(), target.clone());
        Ok(self
            .rates
            .read()
            .await
            .iter()
            .filter(|((p, _), _)| *p == pair)
            .max_by_key(|((_, date), _)| *date)
            .map(|(_, rate)| rate.clone()))
    }

    async fn upsert_rate(&self, rate: ExchangeRate) -> Result<(), EngineError> {
        self.rates
            .write()
            .await
            .insert((rate.pair(), rate.rate_date), rate);
        Ok(())
    }

    async fn prune_older_than(&self, cutoff: NaiveDate) -> Result<usize, EngineError> {
        let mut rates = self.rates.write().await;
        let before = rates.len();
        rates.retain(|(_, date), _| *date >= cutoff);
        Ok(before - rates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn eur_usd(date: NaiveDate, rate: Decimal) -> ExchangeRate {
        ExchangeRate::new("EUR".into(), "USD".into(), date, rate, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_date() {
        let store = InMemoryRateStore::new();
        store.upsert_rate(eur_usd(day(1), dec!(1.08))).await.unwrap();
        store.upsert_rate(eur_usd(day(1), dec!(1.09))).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store
            .find_cached_rate(&"EUR".into(), &"USD".into(), day(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.rate, dec!(1.09));
    }

    #[tokio::test]
    async fn test_latest_is_greatest_date() {
        let store = InMemoryRateStore::new();
        for (d, r) in [(3, dec!(1.07)), (9, dec!(1.10)), (5, dec!(1.08))] {
            store.upsert_rate(eur_usd(day(d), r)).await.unwrap();
        }
        let latest = store
            .find_latest_cached_rate(&"EUR".into(), &"USD".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.rate_date, day(9));

        let none = store
            .find_latest_cached_rate(&"GBP".into(), &"USD".into())
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_batch_lookup_and_prune() {
        let store = InMemoryRateStore::new();
        store.upsert_rate(eur_usd(day(1), dec!(1.08))).await.unwrap();
        store.upsert_rate(eur_usd(day(2), dec!(1.09))).await.unwrap();

        let found = store
            .find_cached_rates(&"EUR".into(), &"USD".into(), &[day(1), day(2), day(3)])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(!found.contains_key(&day(3)));

        assert_eq!(store.prune_older_than(day(2)).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }
}
