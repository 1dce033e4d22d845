//! HTTP exchange-rate client.
//!
//! Speaks the Frankfurter-style contract:
//! `GET {base_url}/latest?from=X&to=Y` and `GET {base_url}/{YYYY-MM-DD}?from=X&to=Y`,
//! both answering `{ "base": .., "date": .., "rates": { "Y": 1.23 } }`.
//! Rates are read from the JSON text, never through `f64`.

use crate::core::currency::CurrencyCode;
use crate::error::RateSourceError;
use crate::fx::rate_source::{FetchedRate, RateSource};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::time::Duration;

/// Body returned by both endpoints.
#[derive(Debug, Deserialize)]
pub struct RateResponse {
    pub base: String,
    pub date: NaiveDate,
    pub rates: HashMap<String, Box<RawValue>>,
}

impl RateResponse {
    /// Pull the rate for `target` out of the response.
    pub fn rate_for(&self, target: &CurrencyCode) -> Result<FetchedRate, RateSourceError> {
        let raw = self
            .rates
            .get(target.as_str())
            .ok_or_else(|| RateSourceError::MissingTarget(target.clone()))?;
        let text = raw.get();
        let parsed = if text.contains(|c| c == 'e' || c == 'E') {
            Decimal::from_scientific(text)
        } else {
            Decimal::from_str_exact(text)
        };
        let rate = parsed
            .map_err(|e| RateSourceError::Parse(format!("rate {} for {}: {}", text, target, e)))?;
        if rate <= Decimal::ZERO {
            return Err(RateSourceError::Parse(format!(
                "non-positive rate {} for {}",
                rate, target
            )));
        }
        Ok(FetchedRate {
            rate,
            date: self.date,
        })
    }
}

/// Async reqwest client for a remote rate API.
#[derive(Clone)]
pub struct HttpRateSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRateSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RateSourceError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("balance-engine/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(
        &self,
        path: &str,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<FetchedRate, RateSourceError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("fetching {} -> {} from {}", base, target, url);

        let resp = self
            .http
            .get(&url)
            .query(&[("from", base.as_str()), ("to", target.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RateSourceError::Http(status.as_u16()));
        }

        let body: RateResponse = resp
            .json()
            .await
            .map_err(|e| RateSourceError::Parse(e.to_string()))?;
        body.rate_for(target)
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch_latest(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<FetchedRate, RateSourceError> {
        self.get("latest", base, target).await
    }

    async fn fetch_historical(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<FetchedRate, RateSourceError> {
        self.get(&date.format("%Y-%m-%d").to_string(), base, target)
            .await
    }
}
