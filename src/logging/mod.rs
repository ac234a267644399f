//! Structured logging: `tracing` to stderr or a log file, summaries as JSON lines on stdout.

mod format;

pub use format::{InvocationSummary, StructuredLogger};
