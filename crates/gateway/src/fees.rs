//! Fee-per-byte estimates with a per-tier TTL cache.
//!
//! Each speed tier has its own slot guarded by an async mutex. The caller
//! that finds a slot empty or stale fetches while holding that slot's lock,
//! so concurrent callers for the same tier wait for the one in-flight fetch
//! and then read its result instead of issuing their own. Tiers refresh
//! independently. A failed fetch leaves the slot untouched, so the next
//! caller retries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use utxo_core::Amount;

use crate::config::GatewayConfig;
use crate::error::FeeError;

/// How quickly a transaction should confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxSpeed {
    /// About an hour.
    Slow,
    /// About half an hour.
    Standard,
    /// The next block.
    Fast,
}

impl TxSpeed {
    pub const ALL: [TxSpeed; 3] = [TxSpeed::Slow, TxSpeed::Standard, TxSpeed::Fast];

    fn slot(self) -> usize {
        match self {
            TxSpeed::Slow => 0,
            TxSpeed::Standard => 1,
            TxSpeed::Fast => 2,
        }
    }
}

impl fmt::Display for TxSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxSpeed::Slow => "slow",
            TxSpeed::Standard => "standard",
            TxSpeed::Fast => "fast",
        })
    }
}

/// A cached fee rate for one speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub speed: TxSpeed,
    pub per_byte: Amount,
    pub fetched_at: Instant,
}

impl FeeQuote {
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Upstream provider of fee rates.
#[async_trait]
pub trait FeeSource: Send + Sync {
    /// Current fee per byte for `speed`.
    async fn fetch(&self, speed: TxSpeed) -> Result<Amount, FeeError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedFees {
    fastest_fee: i64,
    half_hour_fee: i64,
    hour_fee: i64,
}

/// Fee source reading a `{fastestFee, halfHourFee, hourFee}` JSON document.
pub struct HttpFeeSource {
    http: reqwest::Client,
    url: String,
}

impl HttpFeeSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeeError::Request(e.to_string()))?;
        Ok(HttpFeeSource { http, url: url.into() })
    }
}

#[async_trait]
impl FeeSource for HttpFeeSource {
    async fn fetch(&self, speed: TxSpeed) -> Result<Amount, FeeError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeeError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FeeError::Status(response.status().as_u16()));
        }
        let fees: RecommendedFees = response
            .json()
            .await
            .map_err(|e| FeeError::InvalidResponse(e.to_string()))?;

        let per_byte = match speed {
            TxSpeed::Fast => fees.fastest_fee,
            TxSpeed::Standard => fees.half_hour_fee,
            TxSpeed::Slow => fees.hour_fee,
        };
        if per_byte < 0 {
            return Err(FeeError::InvalidResponse(format!("negative fee rate {per_byte}")));
        }
        Ok(Amount::from_sat(per_byte))
    }
}

/// TTL-cached fee estimates with a fixed fallback.
pub struct FeeOracle {
    source: Arc<dyn FeeSource>,
    ttl: Duration,
    fallback: Amount,
    slots: [Mutex<Option<FeeQuote>>; 3],
}

impl FeeOracle {
    pub fn new(source: Arc<dyn FeeSource>, ttl: Duration, fallback: Amount) -> Self {
        FeeOracle {
            source,
            ttl,
            fallback,
            slots: [Mutex::new(None), Mutex::new(None), Mutex::new(None)],
        }
    }

    /// Oracle backed by the configured HTTP fee source.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, FeeError> {
        let source = HttpFeeSource::new(config.fee_source_url.clone(), config.request_timeout())?;
        Ok(FeeOracle::new(Arc::new(source), config.fee_ttl(), config.fallback_fee))
    }

    pub fn fallback(&self) -> Amount {
        self.fallback
    }

    /// Fee per byte for `speed`, served from cache while fresh.
    pub async fn fee_per_byte(&self, speed: TxSpeed) -> Result<Amount, FeeError> {
        let mut slot = self.slots[speed.slot()].lock().await;
        if let Some(quote) = *slot {
            if quote.is_fresh(self.ttl, Instant::now()) {
                return Ok(quote.per_byte);
            }
        }

        debug!(%speed, "refreshing fee quote");
        let per_byte = self.source.fetch(speed).await?;
        *slot = Some(FeeQuote {
            speed,
            per_byte,
            fetched_at: Instant::now(),
        });
        Ok(per_byte)
    }

    /// Total fee for a transaction of `tx_size` bytes.
    ///
    /// Never fails: if no rate can be obtained the fallback fee is returned
    /// as the total.
    pub async fn suggest_fee(&self, speed: TxSpeed, tx_size: usize) -> Amount {
        let fee = self.fee_per_byte(speed).await.and_then(|per_byte| {
            i64::try_from(tx_size)
                .ok()
                .and_then(|size| per_byte.checked_mul(size))
                .ok_or(FeeError::Overflow {
                    per_byte: per_byte.to_sat(),
                    size: tx_size,
                })
        });
        match fee {
            Ok(fee) => fee,
            Err(e) => {
                warn!(error = %e, %speed, fallback = %self.fallback, "fee estimation failed, using fallback");
                self.fallback
            }
        }
    }

    /// The cached quote for `speed`, fresh or not.
    pub async fn cached(&self, speed: TxSpeed) -> Option<FeeQuote> {
        *self.slots[speed.slot()].lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(30 * 60);
    const FALLBACK: Amount = Amount::from_sat(10_000);

    struct CountingSource {
        fetches: AtomicUsize,
        rate: Option<i64>,
        delay: Duration,
    }

    impl CountingSource {
        fn ok(rate: i64) -> Arc<Self> {
            Arc::new(CountingSource {
                fetches: AtomicUsize::new(0),
                rate: Some(rate),
                delay: Duration::ZERO,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(CountingSource {
                fetches: AtomicUsize::new(0),
                rate: None,
                delay: Duration::ZERO,
            })
        }

        fn count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeeSource for CountingSource {
        async fn fetch(&self, speed: TxSpeed) -> Result<Amount, FeeError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let rate = self.rate.ok_or_else(|| FeeError::Request("connection refused".into()))?;
            // Distinct rates per tier make cross-tier mixups visible.
            Ok(Amount::from_sat(rate + speed.slot() as i64))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cached_within_ttl_and_refreshed_after() {
        let source = CountingSource::ok(20);
        let oracle = FeeOracle::new(source.clone(), TTL, FALLBACK);

        assert_eq!(oracle.suggest_fee(TxSpeed::Slow, 100).await, Amount::from_sat(2_000));
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        assert_eq!(oracle.suggest_fee(TxSpeed::Slow, 100).await, Amount::from_sat(2_000));
        assert_eq!(source.count(), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(oracle.suggest_fee(TxSpeed::Slow, 100).await, Amount::from_sat(2_000));
        assert_eq!(source.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tiers_are_cached_independently() {
        let source = CountingSource::ok(10);
        let oracle = FeeOracle::new(source.clone(), TTL, FALLBACK);

        assert_eq!(oracle.fee_per_byte(TxSpeed::Slow).await.unwrap(), Amount::from_sat(10));
        assert_eq!(oracle.fee_per_byte(TxSpeed::Fast).await.unwrap(), Amount::from_sat(12));
        assert_eq!(oracle.fee_per_byte(TxSpeed::Fast).await.unwrap(), Amount::from_sat(12));
        assert_eq!(source.count(), 2);
        assert!(oracle.cached(TxSpeed::Standard).await.is_none());
        assert_eq!(oracle.cached(TxSpeed::Fast).await.unwrap().speed, TxSpeed::Fast);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_fetch() {
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            rate: Some(5),
            delay: Duration::from_millis(500),
        });
        let oracle = Arc::new(FeeOracle::new(source.clone(), TTL, FALLBACK));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let oracle = oracle.clone();
                tokio::spawn(async move { oracle.suggest_fee(TxSpeed::Standard, 10).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Amount::from_sat(60));
        }
        assert_eq!(source.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_returns_fallback_and_is_not_cached() {
        let source = CountingSource::failing();
        let oracle = FeeOracle::new(source.clone(), TTL, FALLBACK);

        assert_eq!(oracle.suggest_fee(TxSpeed::Fast, 250).await, FALLBACK);
        assert_eq!(oracle.suggest_fee(TxSpeed::Fast, 250).await, FALLBACK);
        assert_eq!(source.count(), 2);
        assert!(oracle.cached(TxSpeed::Fast).await.is_none());
    }

    #[tokio::test]
    async fn overflowing_fee_falls_back() {
        let oracle = FeeOracle::new(CountingSource::ok(i64::MAX - 2), TTL, FALLBACK);
        assert_eq!(oracle.suggest_fee(TxSpeed::Slow, 2).await, FALLBACK);
    }

    #[test]
    fn freshness_boundary() {
        let now = Instant::now();
        let quote = FeeQuote {
            speed: TxSpeed::Slow,
            per_byte: Amount::from_sat(1),
            fetched_at: now,
        };
        assert!(quote.is_fresh(TTL, now + TTL - Duration::from_nanos(1)));
        assert!(!quote.is_fresh(TTL, now + TTL));
    }

    #[test]
    fn recommended_fees_shape() {
        let fees: RecommendedFees =
            serde_json::from_str(r#"{"fastestFee":40,"halfHourFee":30,"hourFee":12}"#).unwrap();
        assert_eq!((fees.fastest_fee, fees.half_hour_fee, fees.hour_fee), (40, 30, 12));
    }
}
