//! # Utility Modules
//!
//! Supporting pieces shared by the codec and the session.
//!
//! ## Components
//! - **Compression**: zlib, LZ4 and Zstd batch stages with output limits
//! - **Logging**: `tracing` subscriber setup
//! - **Metrics**: per-session atomic counters
//! - **Signal**: one-shot broadcast used for the connected/closed race
//! - **Timeout**: async deadline wrappers

pub mod compression;
pub mod logging;
pub mod metrics;
pub mod signal;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
pub use signal::Signal;
