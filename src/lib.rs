//! Continuous ICMP path measurement with per-hop statistics.
//!
//! [`Mtr::connect`] opens a raw ICMP socket through tokio's `AsyncFd` and is
//! only available on unix. Everywhere else the engine can still be driven
//! through [`Mtr::with_parts`] with a custom [`probe::ProbeSocket`].

// Public API - engine, configuration, results and export functions
pub mod config;
pub mod error;
pub mod export;
pub mod lookup;
pub mod probe;
pub mod state;
pub mod trace;

pub use config::Config;
pub use error::MtrError;
pub use state::{HopSnapshot, ResultSnapshot};
pub use trace::Mtr;
