//! Ordered failover across rate sources.

use std::sync::Arc;
use std::time::Duration;

use fxshim_common::{constants, CurrencyPair, Rate};
use tracing::{debug, warn};

use crate::error::{ChainFailure, SourceAttempt, SourceFailure};
use crate::provider::RateSource;

/// Tries sources strictly in priority order until one produces a rate.
///
/// Holds no state between calls and never touches the cache. Each source
/// gets its own timeout, so the worst case is the sum of all budgets.
pub struct SourceChain {
    sources: Vec<Arc<dyn RateSource>>,
    timeout: Duration,
}

impl SourceChain {
    /// Create a chain; the first source has the highest priority.
    pub fn new(sources: Vec<Arc<dyn RateSource>>) -> Self {
        Self {
            sources,
            timeout: constants::default_source_timeout(),
        }
    }

    /// Set the per-source timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Names of the sources that will actually be tried, in order.
    pub fn enabled_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|s| s.is_enabled())
            .map(|s| s.name())
            .collect()
    }

    /// Resolve a rate, failing over on any source failure.
    pub async fn resolve(&self, pair: &CurrencyPair) -> Result<Rate, ChainFailure> {
        let mut attempts = Vec::new();

        for source in &self.sources {
            if !source.is_enabled() {
                debug!(source = source.name(), "Skipping disabled rate source");
                continue;
            }

            let outcome = match tokio::time::timeout(self.timeout, source.fetch(pair)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SourceFailure::Timeout(self.timeout)),
            };

            let outcome = outcome.and_then(|rate| {
                if rate.pair() == pair {
                    Ok(rate)
                } else {
                    Err(SourceFailure::Malformed(format!(
                        "answered for {} instead of {}",
                        rate.pair(),
                        pair
                    )))
                }
            });

            match outcome {
                Ok(rate) => {
                    debug!(
                        source = source.name(),
                        pair = %pair,
                        rate = %rate.value(),
                        "Got rate from source"
                    );
                    return Ok(rate);
                }
                Err(failure) => {
                    warn!(
                        source = source.name(),
                        pair = %pair,
                        kind = failure.kind(),
                        error = %failure,
                        "Rate source failed"
                    );
                    attempts.push(SourceAttempt {
                        source: source.name().to_string(),
                        failure,
                    });
                }
            }
        }

        Err(ChainFailure {
            pair: pair.clone(),
            attempts,
        })
    }
}
