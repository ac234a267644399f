//! benchbot: resource-bounded benchmark harness.
//!
//! Modular structure:
//! - [`process`]: `/proc` snapshots, process-tree discovery, timelines
//! - [`supervisor`]: launch, polling loop and escalating termination
//! - [`namespace`]: single- and multi-key attribute stores
//! - [`tables`]: declared schema, output extraction, table population
//! - [`storage`]: row sinks (SQLite, memory)
//! - [`harness`]: batch driver over solvers and invocation lists
//! - [`logging`]: structured logging and JSON summaries

pub mod config;
pub mod error;
pub mod harness;
pub mod logging;
pub mod namespace;
pub mod process;
pub mod storage;
pub mod supervisor;
pub mod tables;

pub use config::{HarnessConfig, Limits};
pub use error::{Error, Result};
pub use harness::{Harness, Invocation, InvocationHooks, InvocationOutcome, NoHooks};
pub use logging::{InvocationSummary, StructuredLogger};
pub use namespace::{Key, Namespace, NamespaceError, Value};
pub use process::{ProcessSnapshot, ProcessTimeline};
pub use storage::{MemorySink, RowSink, SqliteSink};
pub use supervisor::{InvocationReport, LaunchRequest, Supervisor};
pub use tables::{populate, Namespaces, Schema, TableDescriptor, TableRows};
