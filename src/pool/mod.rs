//! The worker pool, its envelopes, configuration, batch tracking and sizing advisor

pub mod config;
pub mod executor;
pub mod sizing;
pub mod tracker;
pub mod types;

pub use config::*;
pub use executor::*;
pub use sizing::*;
pub use tracker::*;
pub use types::*;
