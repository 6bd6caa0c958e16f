//! Structured logging for the extractor and its harness.

mod format;

pub use format::StructuredLogger;
