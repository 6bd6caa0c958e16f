//! flowstat: damped multi-timescale flow statistics for network anomaly detection.
//!
//! Modular structure:
//! - [`numeric`]: Floating and s15.16 fixed-point arithmetic behind one trait
//! - [`stats`]: 1-D and 2-D incremental statistics and the stream database
//! - [`features`]: Per-packet composite extractor and packet record resolution
//! - [`kernel`]: Bounded fixed-point flow table for the packet hot path
//! - [`config`]: JSON configuration
//! - [`logging`]: Structured logging

pub mod config;
pub mod error;
pub mod features;
pub mod kernel;
pub mod logging;
pub mod numeric;
pub mod stats;

pub use config::ExtractorConfig;
pub use error::{ConfigError, KernelError, NumericError, Result, StatsError};
pub use features::{FeatureVector, FlowInputs, NetStat, PacketRecord, Transport};
pub use kernel::{FlowHashes, FlowTable};
pub use logging::StructuredLogger;
pub use numeric::{Fx, Numeric};
pub use stats::{IncStat, IncStatCov, IncStatDB, StreamKind, Timescales};
