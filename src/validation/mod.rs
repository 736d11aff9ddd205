//! Activity Validation Module
//!
//! Every candidate produced by a broker parser passes through the
//! validator before it is returned. Checks run in a fixed order and stop
//! at the first failure; a failed candidate is dropped with a diagnostic,
//! never turned into an error.

pub mod engine;
pub mod types;

pub use engine::*;
pub use types::*;
