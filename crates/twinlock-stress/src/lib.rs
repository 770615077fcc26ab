//! Multi-threaded stress driver for `twinlock_core::TwoLockQueue`.
//!
//! Producers push disjoint integer ranges, then the driver pushes one terminal
//! marker per consumer; consumers pop until they see a marker. The marker is a
//! convention of this driver only, the queue knows nothing about it.

pub mod config;
pub mod driver;
pub mod error;

pub use config::{LoggingConfig, StressConfig};
pub use driver::{run, run_in, StressReport};
pub use error::{Result, StressError};
