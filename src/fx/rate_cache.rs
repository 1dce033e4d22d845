use crate::core::currency::CurrencyPair;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default lifetime of a cached current rate.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Short-lived, process-wide cache of current rates.
///
/// Clones share the same map. Only current rates live here; historical
/// rates are served from the persistent [`RateStore`](super::rate_store::RateStore).
#[derive(Debug, Clone)]
pub struct CurrentRateCache {
    entries: Arc<RwLock<HashMap<CurrencyPair, (Decimal, DateTime<Utc>)>>>,
    ttl: Duration,
}

impl Default for CurrentRateCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl CurrentRateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Cached rate for `pair`, if stored less than one TTL before `now`.
    pub async fn get(&self, pair: &CurrencyPair, now: DateTime<Utc>) -> Option<Decimal> {
        let entries = self.entries.read().await;
        match entries.get(pair) {
            Some((rate, stored_at)) if now - *stored_at < self.ttl => Some(*rate),
            Some(_) => {
                debug!("current rate for {} expired", pair);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, pair: CurrencyPair, rate: Decimal, now: DateTime<Utc>) {
        self.entries.write().await.insert(pair, (rate, now));
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
