//! Pipeline configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use fxshim_common::{constants, CurrencyPair};
use rust_decimal::Decimal;
use tracing::info;

use crate::cache::RateCache;
use crate::chain::SourceChain;
use crate::conversion::ConversionService;
use crate::error::{FxError, FxResult};
use crate::provider::{ExchangeRateApiSource, FrankfurterSource, RateSource};
use crate::resolver::Resolver;

/// Primary (keyed) source settings.
#[derive(Clone)]
pub struct ExchangeRateApiConfig {
    pub endpoint: String,
    /// Absent key disables the source.
    pub api_key: Option<String>,
}

impl fmt::Debug for ExchangeRateApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeRateApiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for ExchangeRateApiConfig {
    fn default() -> Self {
        Self {
            endpoint: ExchangeRateApiSource::DEFAULT_ENDPOINT.to_string(),
            api_key: None,
        }
    }
}

/// Secondary (keyless) source settings.
#[derive(Debug, Clone)]
pub struct FrankfurterConfig {
    /// `None` disables the source.
    pub endpoint: Option<String>,
}

impl Default for FrankfurterConfig {
    fn default() -> Self {
        Self {
            endpoint: Some(FrankfurterSource::DEFAULT_ENDPOINT.to_string()),
        }
    }
}

/// Main pipeline configuration.
#[derive(Debug, Clone)]
pub struct FxConfig {
    /// The single pair this pipeline serves.
    pub pair: CurrencyPair,
    /// Freshness window of the cached rate.
    pub cache_ttl: Duration,
    /// Last-resort rate when nothing else is available.
    pub fallback_rate: Decimal,
    /// Budget for each source call.
    pub source_timeout: StdDuration,
    pub exchangerate_api: ExchangeRateApiConfig,
    pub frankfurter: FrankfurterConfig,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            pair: CurrencyPair::usd_eur(),
            cache_ttl: constants::default_cache_ttl(),
            fallback_rate: Decimal::new(85, 2),
            source_timeout: constants::default_source_timeout(),
            exchangerate_api: ExchangeRateApiConfig::default(),
            frankfurter: FrankfurterConfig::default(),
        }
    }
}

fn parse_positive<T>(key: &str, raw: &str) -> FxResult<T>
where
    T: FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(FxError::Configuration(format!(
            "{} must be a positive number, got {:?}",
            key, raw
        ))),
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> FxResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value lookup.
    ///
    /// Malformed values are errors rather than silently defaulted.
    pub fn from_lookup<F>(lookup: F) -> FxResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("CACHE_TTL_MINUTES") {
            let minutes: i64 = parse_positive("CACHE_TTL_MINUTES", &raw)?;
            config.cache_ttl = Duration::try_minutes(minutes).ok_or_else(|| {
                FxError::Configuration(format!("CACHE_TTL_MINUTES out of range: {}", minutes))
            })?;
        }

        if let Some(raw) = lookup("FALLBACK_RATE") {
            config.fallback_rate = parse_positive("FALLBACK_RATE", &raw)?;
        }

        if let Some(raw) = lookup("SOURCE_TIMEOUT_SECONDS") {
            let secs: u64 = parse_positive("SOURCE_TIMEOUT_SECONDS", &raw)?;
            config.source_timeout = StdDuration::from_secs(secs);
        }

        if let Some(key) = lookup("EXCHANGERATE_API_KEY") {
            config.exchangerate_api.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }

        if let Some(url) = lookup("EXCHANGERATE_API_URL") {
            config.exchangerate_api.endpoint = url;
        }

        if let Some(url) = lookup("FRANKFURTER_URL") {
            config.frankfurter.endpoint = Some(url).filter(|u| !u.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.cache_ttl <= Duration::zero() {
            return Err(FxError::Configuration("Cache TTL must be positive".to_string()));
        }

        if self.fallback_rate <= Decimal::ZERO {
            return Err(FxError::Configuration("Fallback rate must be positive".to_string()));
        }

        if self.source_timeout.is_zero() {
            return Err(FxError::Configuration("Source timeout must be positive".to_string()));
        }

        Ok(())
    }

    /// Build the source chain in priority order.
    pub fn build_chain(&self) -> FxResult<SourceChain> {
        let mut sources: Vec<Arc<dyn RateSource>> = Vec::new();

        sources.push(Arc::new(ExchangeRateApiSource::new(
            &self.exchangerate_api.endpoint,
            self.exchangerate_api.api_key.clone(),
        )?));

        if let Some(endpoint) = &self.frankfurter.endpoint {
            sources.push(Arc::new(FrankfurterSource::new(endpoint)?));
        }

        let chain = SourceChain::new(sources).with_timeout(self.source_timeout);
        info!(
            sources = ?chain.enabled_sources(),
            timeout_secs = self.source_timeout.as_secs(),
            "Configured rate sources"
        );
        Ok(chain)
    }

    /// Build the full pipeline: chain, cache, resolver and conversion service.
    pub fn build_service(&self) -> FxResult<ConversionService> {
        self.validate()?;

        let chain = Arc::new(self.build_chain()?);
        let cache = Arc::new(RateCache::with_ttl(self.cache_ttl));
        let resolver = Resolver::new(self.pair.clone(), chain, cache, self.fallback_rate)?;

        Ok(ConversionService::new(Arc::new(resolver)))
    }
}
