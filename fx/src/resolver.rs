//! Cache-first rate resolution with tiered degradation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use fxshim_common::{CurrencyPair, Rate};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, RateCache};
use crate::chain::SourceChain;
use crate::error::FxResult;

/// Source name carried by the configured last-resort rate.
pub const DEFAULT_RATE_SOURCE: &str = "default";

/// Which tier produced a resolved rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Freshness {
    /// Fetched from a source during this call.
    LiveFetch,
    /// Served from a cache entry still within its TTL.
    LiveCache,
    /// All sources failed; an expired cache entry was used.
    StaleFallback,
    /// All sources failed and nothing was cached; the static default was used.
    DefaultFallback,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::LiveFetch => "live-fetch",
            Freshness::LiveCache => "live-cache",
            Freshness::StaleFallback => "stale-fallback",
            Freshness::DefaultFallback => "default-fallback",
        }
    }

    /// True for the two fallback tiers.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Freshness::StaleFallback | Freshness::DefaultFallback)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rate together with the tier it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRate {
    pub rate: Rate,
    pub freshness: Freshness,
}

impl ResolvedRate {
    fn new(rate: Rate, freshness: Freshness) -> Self {
        Self { rate, freshness }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, ResolvedRate>>;

/// The refresh currently running, tagged so only its owner clears the slot.
type InflightSlot = Arc<Mutex<Option<(u64, SharedRefresh)>>>;

/// Resolves the current rate for one currency pair.
///
/// Order of preference: fresh cache, live fetch, stale cache, static
/// default. `get_rate` never fails; its worst-case latency is the chain's
/// total timeout budget. Concurrent cache misses share one refresh.
pub struct Resolver {
    pair: CurrencyPair,
    chain: Arc<SourceChain>,
    cache: Arc<RateCache>,
    fallback: Rate,
    inflight: InflightSlot,
    refreshes: AtomicU64,
}

impl Resolver {
    /// Create a resolver; fails if the fallback rate is not positive.
    pub fn new(
        pair: CurrencyPair,
        chain: Arc<SourceChain>,
        cache: Arc<RateCache>,
        fallback_rate: Decimal,
    ) -> FxResult<Self> {
        let fallback = Rate::new(pair.clone(), fallback_rate, DEFAULT_RATE_SOURCE)?;

        Ok(Self {
            pair,
            chain,
            cache,
            fallback,
            inflight: Arc::new(Mutex::new(None)),
            refreshes: AtomicU64::new(0),
        })
    }

    pub fn pair(&self) -> &CurrencyPair {
        &self.pair
    }

    /// Get the current rate for the configured pair.
    #[instrument(skip(self), fields(pair = %self.pair))]
    pub async fn get_rate(&self) -> ResolvedRate {
        if let Some(entry) = self.cache.get_fresh(Utc::now()) {
            debug!(rate = %entry.rate().value(), "Using cached rate");
            return ResolvedRate::new(entry.rate().clone(), Freshness::LiveCache);
        }

        let refresh = self.join_refresh();
        refresh.await
    }

    /// Join the in-flight refresh, or start one.
    fn join_refresh(&self) -> SharedRefresh {
        let mut slot = self.inflight.lock();
        if let Some((_, refresh)) = slot.as_ref() {
            debug!("Joining in-flight refresh");
            return refresh.clone();
        }

        let id = self.refreshes.fetch_add(1, Ordering::Relaxed);
        let refresh = run_refresh(
            id,
            self.pair.clone(),
            self.chain.clone(),
            self.cache.clone(),
            self.fallback.clone(),
            self.inflight.clone(),
        )
        .boxed()
        .shared();

        *slot = Some((id, refresh.clone()));
        refresh
    }

    /// Get resolver statistics.
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            refreshes_started: self.refreshes.load(Ordering::Relaxed),
            cache: self.cache.stats(Utc::now()),
        }
    }
}

async fn run_refresh(
    id: u64,
    pair: CurrencyPair,
    chain: Arc<SourceChain>,
    cache: Arc<RateCache>,
    fallback: Rate,
    inflight: InflightSlot,
) -> ResolvedRate {
    let resolved = resolve_uncached(&pair, &chain, &cache, fallback).await;

    // Clear before waiters see the result so the next miss starts afresh.
    let mut slot = inflight.lock();
    if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
        *slot = None;
    }

    resolved
}

async fn resolve_uncached(
    pair: &CurrencyPair,
    chain: &SourceChain,
    cache: &RateCache,
    fallback: Rate,
) -> ResolvedRate {
    // A refresh that finished just before this one started may have filled the cache.
    if let Some(entry) = cache.get_fresh(Utc::now()) {
        return ResolvedRate::new(entry.rate().clone(), Freshness::LiveCache);
    }

    match chain.resolve(pair).await {
        Ok(rate) => {
            cache.put(rate.clone());
            info!(
                source = rate.source(),
                rate = %rate.value(),
                "Refreshed rate"
            );
            ResolvedRate::new(rate, Freshness::LiveFetch)
        }
        Err(failure) => match cache.get() {
            Some(entry) => {
                warn!(
                    reasons = %failure.summary(),
                    rate = %entry.rate().value(),
                    obtained_at = %entry.rate().obtained_at(),
                    "All rate sources failed, serving stale cached rate"
                );
                ResolvedRate::new(entry.rate().clone(), Freshness::StaleFallback)
            }
            None => {
                warn!(
                    reasons = %failure.summary(),
                    rate = %fallback.value(),
                    "All rate sources failed with nothing cached, serving default rate"
                );
                ResolvedRate::new(fallback, Freshness::DefaultFallback)
            }
        },
    }
}

/// Resolver statistics.
#[derive(Debug, Clone)]
pub struct ResolverStats {
    /// Number of refreshes started (joined misses are not counted).
    pub refreshes_started: u64,
    pub cache: CacheStats,
}
