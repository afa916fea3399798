//! USD-per-unit price quotes
//!
//! Bets need a live quote. `PriceCache` wraps a feed and serves a quote while
//! it is younger than the TTL, fetching a fresh one otherwise.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::BoxFuture;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceError {
    #[error("Price feed unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid price quote: {0}")]
    Invalid(f64),
}

/// External price source
pub trait PriceFeed: Send + Sync {
    /// USD value of one in-game unit
    fn usd_per_unit(&self) -> BoxFuture<'_, Result<f64, PriceError>>;
}

/// Constant quote
#[derive(Debug, Clone, Copy)]
pub struct FixedPriceFeed(pub f64);

impl PriceFeed for FixedPriceFeed {
    fn usd_per_unit(&self) -> BoxFuture<'_, Result<f64, PriceError>> {
        let price = self.0;
        Box::pin(async move { validate(price) })
    }
}

/// HTTP feed answering `{"usd": <f64>}`
#[cfg(feature = "http_price")]
pub struct HttpPriceFeed {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "http_price")]
#[derive(serde::Deserialize)]
struct QuoteResponse {
    usd: f64,
}

#[cfg(feature = "http_price")]
impl HttpPriceFeed {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[cfg(feature = "http_price")]
impl PriceFeed for HttpPriceFeed {
    fn usd_per_unit(&self) -> BoxFuture<'_, Result<f64, PriceError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| PriceError::Unavailable(format!("HTTP request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                warn!("Price feed error: {}", status);
                return Err(PriceError::Unavailable(format!("HTTP status {}", status)));
            }

            let quote: QuoteResponse = response
                .json()
                .await
                .map_err(|e| PriceError::Unavailable(format!("Failed to parse quote: {}", e)))?;
            validate(quote.usd)
        })
    }
}

fn validate(price: f64) -> Result<f64, PriceError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(PriceError::Invalid(price))
    }
}

/// TTL cache in front of a price feed
pub struct PriceCache {
    feed: Arc<dyn PriceFeed>,
    ttl: Duration,
    cached: Mutex<Option<(f64, Instant)>>,
}

impl PriceCache {
    pub fn new(feed: Arc<dyn PriceFeed>, ttl: Duration) -> Self {
        Self {
            feed,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Fresh quote, refreshing from the feed when the cached one expired
    pub async fn quote(&self) -> Result<f64, PriceError> {
        let cached = *self.cached.lock();
        if let Some((price, at)) = cached {
            if at.elapsed() < self.ttl {
                return Ok(price);
            }
        }

        match self.feed.usd_per_unit().await {
            Ok(price) => {
                debug!("Price refreshed: {} USD/unit", price);
                *self.cached.lock() = Some((price, Instant::now()));
                Ok(price)
            }
            Err(e) => {
                warn!("Price refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Most recent quote regardless of age (display only)
    pub fn last_known(&self) -> Option<f64> {
        self.cached.lock().map(|(price, _)| price)
    }
}

/// Units worth `usd_cents` at `usd_per_unit`, rounded to the nearest unit
pub fn cents_to_units(usd_cents: u64, usd_per_unit: f64) -> u64 {
    if !(usd_per_unit.is_finite() && usd_per_unit > 0.0) {
        return 0;
    }
    (usd_cents as f64 / 100.0 / usd_per_unit).round() as u64
}

/// USD cents worth `units` at `usd_per_unit`, rounded to the nearest cent
pub fn units_to_cents(units: u64, usd_per_unit: f64) -> u64 {
    if !(usd_per_unit.is_finite() && usd_per_unit > 0.0) {
        return 0;
    }
    (units as f64 * usd_per_unit * 100.0).round() as u64
}
