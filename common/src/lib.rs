//! fxshim Common Types
//!
//! Value types shared by the rate pipeline and the tool layer: currencies,
//! monetary amounts, exchange rates, error codes and timing defaults.

pub mod monetary;
pub mod error;
pub mod time;

pub use monetary::*;
pub use error::*;
pub use time::*;
