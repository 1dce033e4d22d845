//! Rate resolution and amount conversion.
//!
//! Lookup order for a current rate is memory cache, then remote source,
//! then the latest persisted rate. Historical rates skip the memory cache
//! and start from the persistent store. Remote failures never surface
//! directly; they fall back to the latest stored rate for the pair and the
//! quote is flagged approximate when its date differs from the one asked for.

use crate::clock::{Clock, SystemClock};
use crate::core::currency::{
    convert_amount, ConversionMode, CurrencyCode, CurrencyPair, ExchangeRate, RateKey,
    RateOrigin, RateQuote, RateTable,
};
use crate::core::expense::Expense;
use crate::error::EngineError;
use crate::fx::rate_cache::CurrentRateCache;
use crate::fx::rate_source::RateSource;
use crate::fx::rate_store::RateStore;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// An expense amount normalized into a display currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub rate: Decimal,
    pub rate_date: NaiveDate,
    pub approximate: bool,
}

/// Result of batch-converting one expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedAmount {
    pub original_amount: Decimal,
    pub original_currency: CurrencyCode,
    /// `None` when no rate could be resolved for the expense's currency/date.
    pub converted: Option<Conversion>,
}

pub struct CurrencyConverter<S, R> {
    store: S,
    source: R,
    cache: CurrentRateCache,
    clock: Arc<dyn Clock>,
}

impl<S: RateStore, R: RateSource> CurrencyConverter<S, R> {
    pub fn new(store: S, source: R, cache: CurrentRateCache) -> Self {
        Self {
            store,
            source,
            cache,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Today's rate for `base -> target`.
    pub async fn current_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RateQuote, EngineError> {
        let now = self.clock.now();
        let today = now.date_naive();
        if base == target {
            return Ok(RateQuote::identity(today));
        }

        let pair = CurrencyPair::new(base.clone(), target.clone());
        if let Some(rate) = self.cache.get(&pair, now).await {
            debug!("memory cache hit for {}", pair);
            return Ok(RateQuote::exact(rate, today, RateOrigin::MemoryCache));
        }

        match self.source.fetch_latest(base, target).await {
            Ok(fetched) => {
                self.cache.put(pair, fetched.rate, now).await;
                self.persist(base, target, today, fetched.rate, now).await;
                Ok(RateQuote::exact(fetched.rate, today, RateOrigin::Remote))
            }
            Err(e) => {
                warn!("current rate fetch for {} failed: {}", pair, e);
                self.fallback(base, target, today, None).await
            }
        }
    }

    /// The rate for `base -> target` valid on `date`.
    pub async fn historical_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<RateQuote, EngineError> {
        if base == target {
            return Ok(RateQuote::identity(date));
        }

        if let Some(stored) = self.store.find_cached_rate(base, target, date).await? {
            debug!("stored rate hit for {}/{} on {}", base, target, date);
            return Ok(RateQuote::exact(stored.rate, date, RateOrigin::Stored));
        }

        self.fetch_historical(base, target, date).await
    }

    /// Resolve a single rate on demand.
    pub async fn rate_for(
        &self,
        currency: &CurrencyCode,
        target: &CurrencyCode,
        key: RateKey,
    ) -> Result<RateQuote, EngineError> {
        match key {
            RateKey::Current => self.current_rate(currency, target).await,
            RateKey::Historical(date) => self.historical_rate(currency, target, date).await,
        }
    }

    /// Apply a resolved quote to an amount.
    pub fn convert(&self, amount: Decimal, quote: &RateQuote) -> Decimal {
        convert_amount(amount, quote.rate)
    }

    /// Resolve every distinct `(currency, key)` request into `target`.
    ///
    /// Currencies are resolved concurrently. Within a currency, historical
    /// dates are first looked up in the store in one batch and only the
    /// missing dates are fetched. Requests that cannot be resolved are
    /// logged and left out of the table.
    pub async fn resolve_rates(
        &self,
        target: &CurrencyCode,
        requests: &[(CurrencyCode, RateKey)],
    ) -> RateTable {
        let mut by_currency: BTreeMap<&CurrencyCode, BTreeSet<RateKey>> = BTreeMap::new();
        for (currency, key) in requests {
            by_currency.entry(currency).or_default().insert(*key);
        }

        let groups = by_currency
            .into_iter()
            .map(|(currency, keys)| self.resolve_currency(currency, target, keys));

        let mut table = RateTable::new(target.clone());
        for resolved in join_all(groups).await {
            for (currency, key, quote) in resolved {
                table.insert(currency, key, quote);
            }
        }
        table
    }

    /// Convert each expense into `target` under `mode`, keyed by expense id.
    pub async fn convert_batch(
        &self,
        expenses: &[Expense],
        target: &CurrencyCode,
        mode: ConversionMode,
    ) -> HashMap<Uuid, ConvertedAmount> {
        let keyed: Vec<(&Expense, RateKey)> = expenses
            .iter()
            .filter_map(|e| mode.rate_key(e.date()).map(|key| (e, key)))
            .collect();
        if keyed.is_empty() {
            return HashMap::new();
        }

        let requests: Vec<(CurrencyCode, RateKey)> = keyed
            .iter()
            .map(|(e, key)| (e.currency().clone(), *key))
            .collect();
        let table = self.resolve_rates(target, &requests).await;

        keyed
            .into_iter()
            .map(|(expense, key)| {
                let converted = table.get(expense.currency(), &key).map(|quote| Conversion {
                    amount: self.convert(expense.amount(), quote),
                    currency: target.clone(),
                    rate: quote.rate,
                    rate_date: quote.rate_date,
                    approximate: quote.approximate,
                });
                if converted.is_none() {
                    warn!(
                        "expense {} left unconverted: no {} -> {} rate",
                        expense.id(),
                        expense.currency(),
                        target
                    );
                }
                (
                    expense.id(),
                    ConvertedAmount {
                        original_amount: expense.amount(),
                        original_currency: expense.currency().clone(),
                        converted,
                    },
                )
            })
            .collect()
    }

    /// Drop persisted rates older than `retention_days`.
    pub async fn prune_rates(&self, retention_days: u32) -> Result<usize, EngineError> {
        let cutoff = self.clock.today() - Duration::days(i64::from(retention_days));
        let removed = self.store.prune_older_than(cutoff).await?;
        if removed > 0 {
            info!("pruned {} exchange rates dated before {}", removed, cutoff);
        }
        Ok(removed)
    }

    async fn resolve_currency(
        &self,
        currency: &CurrencyCode,
        target: &CurrencyCode,
        keys: BTreeSet<RateKey>,
    ) -> Vec<(CurrencyCode, RateKey, RateQuote)> {
        let today = self.clock.today();
        if currency == target {
            return keys
                .into_iter()
                .map(|key| {
                    let date = match key {
                        RateKey::Current => today,
                        RateKey::Historical(d) => d,
                    };
                    (currency.clone(), key, RateQuote::identity(date))
                })
                .collect();
        }

        let mut resolved = Vec::with_capacity(keys.len());
        let dates: Vec<NaiveDate> = keys
            .iter()
            .filter_map(|key| match key {
                RateKey::Historical(d) => Some(*d),
                RateKey::Current => None,
            })
            .collect();

        if keys.contains(&RateKey::Current) {
            match self.current_rate(currency, target).await {
                Ok(quote) => resolved.push((currency.clone(), RateKey::Current, quote)),
                Err(e) => warn!("skipping current {} -> {}: {}", currency, target, e),
            }
        }

        if dates.is_empty() {
            return resolved;
        }

        let stored = match self.store.find_cached_rates(currency, target, &dates).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("stored rate lookup for {} -> {} failed: {}", currency, target, e);
                return resolved;
            }
        };
        debug!(
            "{} -> {}: {} of {} dates already stored",
            currency,
            target,
            stored.len(),
            dates.len()
        );

        for date in dates {
            let quote = match stored.get(&date) {
                Some(rate) => Ok(RateQuote::exact(rate.rate, date, RateOrigin::Stored)),
                None => self.fetch_historical(currency, target, date).await,
            };
            match quote {
                Ok(quote) => resolved.push((currency.clone(), RateKey::Historical(date), quote)),
                Err(e) => warn!("skipping {} -> {} on {}: {}", currency, target, date, e),
            }
        }
        resolved
    }

    /// Remote lookup for a date already known to be missing from the store.
    async fn fetch_historical(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<RateQuote, EngineError> {
        match self.source.fetch_historical(base, target, date).await {
            Ok(fetched) => {
                self.persist(base, target, date, fetched.rate, self.clock.now())
                    .await;
                Ok(RateQuote::exact(fetched.rate, date, RateOrigin::Remote))
            }
            Err(e) => {
                warn!(
                    "historical rate fetch for {}/{} on {} failed: {}",
                    base, target, date, e
                );
                self.fallback(base, target, date, Some(date)).await
            }
        }
    }

    async fn fallback(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        wanted: NaiveDate,
        requested: Option<NaiveDate>,
    ) -> Result<RateQuote, EngineError> {
        match self.store.find_latest_cached_rate(base, target).await? {
            Some(latest) => {
                let quote = RateQuote::fallback(latest.rate, latest.rate_date, Some(wanted));
                if quote.approximate {
                    warn!(
                        "using approximate {}/{} rate from {} instead of {}",
                        base, target, latest.rate_date, wanted
                    );
                }
                Ok(quote)
            }
            None => Err(EngineError::RateUnavailable {
                base: base.clone(),
                target: target.clone(),
                date: requested,
            }),
        }
    }

    async fn persist(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        rate_date: NaiveDate,
        rate: Decimal,
        fetched_at: DateTime<Utc>,
    ) {
        let stored = match ExchangeRate::new(base.clone(), target.clone(), rate_date, rate, fetched_at)
        {
            Ok(rate) => rate,
            Err(e) => {
                warn!("not persisting fetched rate: {}", e);
                return;
            }
        };
        match self.store.upsert_rate(stored).await {
            Ok(()) => info!("stored {}/{} rate {} for {}", base, target, rate, rate_date),
            Err(e) => warn!("failed to persist {}/{} rate: {}", base, target, e),
        }
    }
}
