//! fxshim FX Pipeline
//!
//! Resolves an exchange rate for one configured currency pair from a set of
//! unreliable external sources, and converts amounts with it.
//!
//! # Features
//!
//! - Ordered failover across rate sources with per-source timeouts
//! - Single-entry rate cache with configurable TTL
//! - Degradation to a stale cached rate, then to a static default
//! - At most one concurrent refresh per pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use fxshim_fx::{ConversionRequest, FxConfig};
//! use rust_decimal_macros::dec;
//!
//! let service = FxConfig::from_env()?.build_service()?;
//!
//! let result = service.convert(ConversionRequest::new(dec!(100))).await?;
//! println!("{} ({})", result.output, result.freshness);
//! ```

pub mod provider;
pub mod chain;
pub mod cache;
pub mod resolver;
pub mod conversion;
pub mod config;
pub mod error;

pub use provider::{ExchangeRateApiSource, FrankfurterSource, RateSource, SourceResult};
#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateSource;
pub use chain::SourceChain;
pub use cache::{CacheEntry, RateCache};
pub use resolver::{Freshness, ResolvedRate, Resolver};
pub use conversion::{ConversionRequest, ConversionResult, ConversionService};
pub use config::FxConfig;
pub use error::{ChainFailure, FxError, FxResult, SourceFailure};
