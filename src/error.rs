//! Error types for flow statistics, the fixed-point kernel and configuration.

use thiserror::Error;

/// A value fell outside what a numeric back-end can represent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericError {
    /// Time delta does not fit the s15.16 seconds range
    #[error("time delta of {nanos} ns exceeds the fixed-point seconds range")]
    TimeDeltaOutOfRange { nanos: u64 },

    /// Decay or exp2 exponent is not representable
    #[error("exponent out of representable range")]
    ExponentOutOfRange,

    /// Accumulated value left the representable range
    #[error("accumulator overflow")]
    Overflow,

    /// Input outside the function's domain
    #[error("domain error: {0}")]
    Domain(&'static str),
}

impl NumericError {
    /// The stream's clock is too far from the update to decay it.
    pub fn is_time_range(&self) -> bool {
        matches!(self, Self::TimeDeltaOutOfRange { .. } | Self::ExponentOutOfRange)
    }
}

/// Errors from a stream database or the composite extractor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// A new key could not be admitted
    #[error("table {table} is full ({limit} streams)")]
    CapacityExhausted { table: &'static str, limit: usize },

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

/// Errors from the constrained-domain flow table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("flow table is full ({limit} entries)")]
    CapacityExhausted { limit: usize },

    /// Lock could not be taken within the configured bound
    #[error("lock acquisition timed out for key {key:#010x}")]
    LockTimeout { key: u32 },

    /// Persisted record failed validation; never auto-repaired
    #[error("malformed record for key {key:#010x}: {reason}")]
    MalformedRecord { key: u32, reason: &'static str },

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

/// Invalid extractor configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("at least one timescale is required")]
    NoTimescales,

    #[error("timescale {0} must be finite and non-negative")]
    InvalidTimescale(f64),

    #[error("size scale {0} must be finite and positive")]
    InvalidSizeScale(f64),

    #[error("flow table max_entries must be non-zero")]
    ZeroCapacity,

    #[error("flow table needs exactly {expected} timescales, got {got}")]
    TimescaleCount { expected: usize, got: usize },
}

/// Result type alias for stream statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;
