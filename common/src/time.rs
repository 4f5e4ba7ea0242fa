//! Timing defaults for the rate pipeline.

use chrono::Duration;

/// Pipeline timing defaults.
pub mod constants {
    use super::Duration;

    /// Freshness window of a cached rate (10 minutes).
    pub const DEFAULT_CACHE_TTL_MINUTES: i64 = 10;

    /// Budget of a single source call (10 seconds).
    pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 10;

    pub fn default_cache_ttl() -> Duration {
        Duration::minutes(DEFAULT_CACHE_TTL_MINUTES)
    }

    pub fn default_source_timeout() -> std::time::Duration {
        std::time::Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS)
    }
}
