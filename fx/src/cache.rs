//! Single-entry rate cache with TTL support.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fxshim_common::{constants, Rate};
use parking_lot::RwLock;
use tracing::debug;

/// The cached rate and the instant it stops being fresh.
///
/// Entries are immutable; a refresh swaps in a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    rate: Rate,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(rate: Rate, ttl: Duration) -> Self {
        let expires_at = rate.obtained_at() + ttl;
        Self { rate, expires_at }
    }

    pub fn rate(&self) -> &Rate {
        &self.rate
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Fresh while `now` is strictly before the expiry instant.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Age of the underlying rate.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.rate.obtained_at())
    }
}

/// Holds the most recently resolved rate for one currency pair.
///
/// Readers get an `Arc` snapshot, so a freshness check and the value read
/// always observe the same entry even while a writer swaps it out.
pub struct RateCache {
    current: RwLock<Option<Arc<CacheEntry>>>,
    ttl: Duration,
}

impl RateCache {
    /// Create a new rate cache with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl(constants::default_cache_ttl())
    }

    /// Create a new rate cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current entry, fresh or not.
    pub fn get(&self) -> Option<Arc<CacheEntry>> {
        self.current.read().clone()
    }

    /// Whether `entry` is still fresh at `now`.
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.is_fresh_at(now)
    }

    /// Current entry only if it is still fresh at `now`.
    pub fn get_fresh(&self, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        self.get().filter(|entry| entry.is_fresh_at(now))
    }

    /// Replace the current entry with one built from `rate`.
    pub fn put(&self, rate: Rate) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry::new(rate, self.ttl));
        debug!(
            rate = %entry.rate().value(),
            source = entry.rate().source(),
            expires_at = %entry.expires_at(),
            "Cached rate"
        );
        *self.current.write() = Some(entry.clone());
        entry
    }

    /// Drop the current entry.
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// Get cache statistics.
    pub fn stats(&self, now: DateTime<Utc>) -> CacheStats {
        match self.get() {
            Some(entry) => CacheStats {
                has_entry: true,
                fresh: entry.is_fresh_at(now),
                age: Some(entry.age_at(now)),
                source: Some(entry.rate().source().to_string()),
            },
            None => CacheStats::default(),
        }
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub has_entry: bool,
    pub fresh: bool,
    pub age: Option<Duration>,
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxshim_common::CurrencyPair;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn rate_at(value: Decimal, obtained_at: DateTime<Utc>) -> Rate {
        Rate::observed_at(CurrencyPair::usd_eur(), value, "TEST", obtained_at).unwrap()
    }

    #[test]
    fn test_empty_cache() {
        let cache = RateCache::new();

        assert!(cache.get().is_none());
        assert_eq!(cache.stats(Utc::now()), CacheStats::default());
    }

    #[test]
    fn test_put_and_get() {
        let cache = RateCache::new();
        let now = Utc::now();

        let entry = cache.put(rate_at(dec!(0.85), now));

        assert_eq!(entry.expires_at(), now + Duration::minutes(10));
        let cached = cache.get().unwrap();
        assert_eq!(cached.rate().value(), dec!(0.85));
        assert!(cache.is_fresh(&cached, now));
    }

    #[test]
    fn test_freshness_boundary() {
        let cache = RateCache::with_ttl(Duration::minutes(10));
        let obtained = Utc::now();
        let entry = cache.put(rate_at(dec!(0.85), obtained));

        assert!(cache.is_fresh(&entry, obtained + Duration::minutes(10) - Duration::milliseconds(1)));
        assert!(!cache.is_fresh(&entry, obtained + Duration::minutes(10)));
        assert!(cache.get_fresh(obtained + Duration::minutes(11)).is_none());
    }

    #[test]
    fn test_stale_entry_is_still_returned() {
        let cache = RateCache::new();
        let obtained = Utc::now() - Duration::minutes(30);
        cache.put(rate_at(dec!(0.84), obtained));

        let entry = cache.get().unwrap();
        assert!(!cache.is_fresh(&entry, Utc::now()));
        assert_eq!(entry.rate().value(), dec!(0.84));

        let stats = cache.stats(Utc::now());
        assert!(stats.has_entry);
        assert!(!stats.fresh);
        assert!(stats.age.unwrap() >= Duration::minutes(30));
    }

    #[test]
    fn test_put_replaces_wholesale() {
        let cache = RateCache::new();
        let first = cache.put(rate_at(dec!(0.84), Utc::now()));
        let second = cache.put(rate_at(dec!(0.86), Utc::now()));

        // Earlier snapshots keep their own value.
        assert_eq!(first.rate().value(), dec!(0.84));
        assert_eq!(second.rate().value(), dec!(0.86));
        assert_eq!(cache.get().unwrap().rate().value(), dec!(0.86));
    }

    #[test]
    fn test_cache_clear() {
        let cache = RateCache::new();
        cache.put(rate_at(dec!(0.85), Utc::now()));

        cache.clear();

        assert!(cache.get().is_none());
    }
}
