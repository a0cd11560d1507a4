//! Exchange rates and currency conversion.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::totals::round_money;
use crate::config::BASE_CURRENCY;
use crate::errors::{AppError, AppResult};

/// Where a rate snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    Live,
    Fallback,
}

/// USD-relative exchange rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExchangeRates {
    #[schema(example = "USD")]
    pub base: String,
    #[schema(value_type = Object)]
    pub rates: BTreeMap<String, Decimal>,
    pub fetched_at: DateTime<Utc>,
    pub source: RateSource,
}

/// Static table used when the live source has never been reachable.
const FALLBACK_RATES: &[(&str, &str)] = &[
    ("USD", "1"),
    ("EUR", "0.92"),
    ("GBP", "0.79"),
    ("JPY", "149.50"),
    ("INR", "83.12"),
    ("CAD", "1.36"),
    ("AUD", "1.52"),
    ("CHF", "0.88"),
    ("CNY", "7.24"),
    ("AED", "3.67"),
    ("SAR", "3.75"),
    ("BRL", "4.97"),
    ("MXN", "17.15"),
    ("ZAR", "18.65"),
    ("SGD", "1.34"),
];

impl ExchangeRates {
    pub fn new(rates: BTreeMap<String, Decimal>, source: RateSource) -> Self {
        let mut rates: BTreeMap<String, Decimal> = rates
            .into_iter()
            .map(|(code, rate)| (code.to_uppercase(), rate))
            .collect();
        rates.entry(BASE_CURRENCY.to_string()).or_insert(Decimal::ONE);

        Self {
            base: BASE_CURRENCY.to_string(),
            rates,
            fetched_at: Utc::now(),
            source,
        }
    }

    pub fn fallback() -> Self {
        let rates = FALLBACK_RATES
            .iter()
            .filter_map(|(code, rate)| rate.parse::<Decimal>().ok().map(|r| (code.to_string(), r)))
            .collect();
        Self::new(rates, RateSource::Fallback)
    }

    /// Usable rate for a currency code; zero and negative rates are ignored.
    pub fn rate(&self, code: &str) -> Option<Decimal> {
        self.rates
            .get(&code.to_uppercase())
            .copied()
            .filter(|rate| *rate > Decimal::ZERO)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
        let age = now.signed_duration_since(self.fetched_at).num_seconds();
        age >= 0 && (age as u64) < ttl_seconds
    }

    /// Convert through USD. Unknown currencies leave the amount unchanged.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Decimal {
        convert(amount, from, to, self)
    }

    pub fn try_convert(&self, amount: Decimal, from: &str, to: &str) -> AppResult<Decimal> {
        try_convert(amount, from, to, self)
    }
}

/// `amount / from_rate * to_rate` rounded to cents, or `None` when the
/// result does not fit a `Decimal`.
fn cross(amount: Decimal, from_rate: Decimal, to_rate: Decimal) -> Option<Decimal> {
    amount
        .checked_div(from_rate)?
        .checked_mul(to_rate)
        .map(round_money)
}

/// `amount / rates[from] * rates[to]`, rounded to cents.
///
/// Identical currencies return the input untouched. When either rate is
/// missing, or the result overflows, the original amount is returned.
pub fn convert(amount: Decimal, from: &str, to: &str, rates: &ExchangeRates) -> Decimal {
    if from.eq_ignore_ascii_case(to) {
        return amount;
    }
    let (Some(from_rate), Some(to_rate)) = (rates.rate(from), rates.rate(to)) else {
        tracing::warn!(from = %from, to = %to, "Missing exchange rate, amount left unconverted");
        return amount;
    };
    cross(amount, from_rate, to_rate).unwrap_or_else(|| {
        tracing::warn!(from = %from, to = %to, "Conversion out of range, amount left unconverted");
        amount
    })
}

/// Like [`convert`] but unknown currencies are an error.
pub fn try_convert(amount: Decimal, from: &str, to: &str, rates: &ExchangeRates) -> AppResult<Decimal> {
    if from.eq_ignore_ascii_case(to) {
        return Ok(amount);
    }
    let from_rate = rates
        .rate(from)
        .ok_or_else(|| AppError::validation(format!("Unknown currency '{}'", from)))?;
    let to_rate = rates
        .rate(to)
        .ok_or_else(|| AppError::validation(format!("Unknown currency '{}'", to)))?;
    cross(amount, from_rate, to_rate).ok_or_else(|| AppError::validation("Amount out of range"))
}
