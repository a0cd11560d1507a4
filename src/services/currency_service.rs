//! Currency service - cached exchange rates with layered fallback.
//!
//! Lookup order: in-process snapshot younger than the TTL, the snapshot
//! shared through Redis, the live source, the last live snapshot (even
//! stale), and finally the static table.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::config::CACHE_KEY_EXCHANGE_RATES;
use crate::domain::{currency, ExchangeRates, RateSource};
use crate::errors::{AppError, AppResult};
use crate::infra::Cache;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Failed fetches are not retried for this long.
const FETCH_BACKOFF_SECONDS: i64 = 60;

/// Source of live USD-based rates.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch(&self) -> AppResult<BTreeMap<String, Decimal>>;
}

#[derive(Deserialize)]
struct RatesPayload {
    rates: BTreeMap<String, Decimal>,
}

/// Fetches `{ "rates": { "EUR": 0.92, ... } }` over HTTP.
pub struct HttpRateFetcher {
    client: Client,
    url: String,
}

impl HttpRateFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RateFetcher for HttpRateFetcher {
    async fn fetch(&self) -> AppResult<BTreeMap<String, Decimal>> {
        let payload: RatesPayload = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if payload.rates.is_empty() {
            return Err(AppError::unavailable("exchange rate source returned no rates"));
        }
        Ok(payload.rates)
    }
}

/// Result of a conversion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Conversion {
    #[schema(value_type = String, example = "100")]
    pub amount: Decimal,
    #[schema(example = "EUR")]
    pub from: String,
    #[schema(example = "USD")]
    pub to: String,
    #[schema(value_type = String, example = "108.70")]
    pub result: Decimal,
    pub source: RateSource,
}

#[async_trait]
pub trait CurrencyService: Send + Sync {
    /// Current rates; never fails, degrading to the static table.
    async fn rates(&self) -> ExchangeRates;

    /// `strict` turns unknown currencies into a validation error instead of
    /// returning the amount unconverted.
    async fn convert(&self, amount: Decimal, from: &str, to: &str, strict: bool) -> AppResult<Conversion>;
}

#[derive(Default)]
struct RatesState {
    /// Last live snapshot
    snapshot: Option<ExchangeRates>,
    last_failure: Option<DateTime<Utc>>,
}

pub struct RatesCache {
    fetcher: Arc<dyn RateFetcher>,
    cache: Option<Arc<Cache>>,
    ttl_seconds: u64,
    state: RwLock<RatesState>,
}

impl RatesCache {
    pub fn new(fetcher: Arc<dyn RateFetcher>, cache: Option<Arc<Cache>>, ttl_seconds: u64) -> Self {
        Self {
            fetcher,
            cache,
            ttl_seconds,
            state: RwLock::new(RatesState::default()),
        }
    }

    fn fresh(&self, state: &RatesState, now: DateTime<Utc>) -> Option<ExchangeRates> {
        state
            .snapshot
            .as_ref()
            .filter(|rates| rates.is_fresh(now, self.ttl_seconds))
            .cloned()
    }

    fn backing_off(state: &RatesState, now: DateTime<Utc>) -> bool {
        state
            .last_failure
            .is_some_and(|at| now.signed_duration_since(at).num_seconds() < FETCH_BACKOFF_SECONDS)
    }

    fn degraded(state: &RatesState) -> ExchangeRates {
        state.snapshot.clone().unwrap_or_else(ExchangeRates::fallback)
    }

    async fn shared_snapshot(&self, now: DateTime<Utc>) -> Option<ExchangeRates> {
        let cache = self.cache.as_ref()?;
        match cache.get_json::<ExchangeRates>(CACHE_KEY_EXCHANGE_RATES).await {
            Ok(Some(rates)) if rates.is_fresh(now, self.ttl_seconds) => Some(rates),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Shared rate snapshot unavailable");
                None
            }
        }
    }

    async fn share(&self, rates: &ExchangeRates) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .put_json(CACHE_KEY_EXCHANGE_RATES, rates, self.ttl_seconds)
                .await
            {
                tracing::debug!(error = %e, "Failed to share rate snapshot");
            }
        }
    }
}

#[async_trait]
impl CurrencyService for RatesCache {
    async fn rates(&self) -> ExchangeRates {
        let now = Utc::now();
        {
            let state = self.state.read().await;
            if let Some(rates) = self.fresh(&state, now) {
                return rates;
            }
            if Self::backing_off(&state, now) {
                return Self::degraded(&state);
            }
        }

        let mut state = self.state.write().await;
        // another request may have refreshed while we waited
        if let Some(rates) = self.fresh(&state, now) {
            return rates;
        }

        if let Some(rates) = self.shared_snapshot(now).await {
            state.snapshot = Some(rates.clone());
            return rates;
        }

        match self.fetcher.fetch().await {
            Ok(raw) => {
                let rates = ExchangeRates::new(raw, RateSource::Live);
                tracing::info!(currencies = rates.rates.len(), "Exchange rates refreshed");
                state.snapshot = Some(rates.clone());
                state.last_failure = None;
                drop(state);
                self.share(&rates).await;
                rates
            }
            Err(e) => {
                let stale = state.snapshot.is_some();
                tracing::warn!(error = %e, stale, "Exchange rate fetch failed, using fallback rates");
                state.last_failure = Some(now);
                Self::degraded(&state)
            }
        }
    }

    async fn convert(&self, amount: Decimal, from: &str, to: &str, strict: bool) -> AppResult<Conversion> {
        let rates = self.rates().await;
        let result = if strict {
            currency::try_convert(amount, from, to, &rates)?
        } else {
            currency::convert(amount, from, to, &rates)
        };

        Ok(Conversion {
            amount,
            from: from.to_uppercase(),
            to: to.to_uppercase(),
            result,
            source: rates.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn live_rates() -> BTreeMap<String, Decimal> {
        BTreeMap::from([("eur".to_string(), dec!(0.5)), ("GBP".to_string(), dec!(0.25))])
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_reused() {
        let mut fetcher = MockRateFetcher::new();
        fetcher.expect_fetch().times(1).returning(|| Ok(live_rates()));
        let service = RatesCache::new(Arc::new(fetcher), None, 1800);

        let first = service.rates().await;
        let second = service.rates().await;
        assert_eq!(first.source, RateSource::Live);
        assert_eq!(first, second);
        assert_eq!(first.rate("EUR"), Some(dec!(0.5)));
        assert_eq!(first.rate("USD"), Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_refetched() {
        let mut fetcher = MockRateFetcher::new();
        fetcher.expect_fetch().times(2).returning(|| Ok(live_rates()));
        let service = RatesCache::new(Arc::new(fetcher), None, 0);

        service.rates().await;
        service.rates().await;
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_static_table() {
        let mut fetcher = MockRateFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|| Err(AppError::unavailable("offline")));
        let service = RatesCache::new(Arc::new(fetcher), None, 1800);

        let rates = service.rates().await;
        assert_eq!(rates.source, RateSource::Fallback);
        assert!(rates.rate("EUR").is_some());

        // backoff: the second call does not hit the source again
        assert_eq!(service.rates().await.source, RateSource::Fallback);
    }

    #[tokio::test]
    async fn test_failure_keeps_last_live_snapshot() {
        let mut fetcher = MockRateFetcher::new();
        let mut seq = mockall::Sequence::new();
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(live_rates()));
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(AppError::unavailable("offline")));
        // ttl 0: every call wants a refresh
        let service = RatesCache::new(Arc::new(fetcher), None, 0);

        service.rates().await;
        let rates = service.rates().await;
        assert_eq!(rates.source, RateSource::Live);
        assert_eq!(rates.rate("GBP"), Some(dec!(0.25)));
    }

    #[tokio::test]
    async fn test_convert_modes() {
        let mut fetcher = MockRateFetcher::new();
        fetcher.expect_fetch().returning(|| Ok(live_rates()));
        let service = RatesCache::new(Arc::new(fetcher), None, 1800);

        let converted = service.convert(dec!(10), "eur", "gbp", false).await.unwrap();
        assert_eq!(converted.result, dec!(5.00));
        assert_eq!(converted.from, "EUR");

        let same = service.convert(dec!(10.123), "XYZ", "xyz", true).await.unwrap();
        assert_eq!(same.result, dec!(10.123));

        let lenient = service.convert(dec!(10), "EUR", "XYZ", false).await.unwrap();
        assert_eq!(lenient.result, dec!(10));

        let err = service.convert(dec!(10), "EUR", "XYZ", true).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
