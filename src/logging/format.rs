//! Log setup from [`LogConfig`] and the one-line JSON summaries printed per invocation.

use crate::config::LogConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Outcome of one invocation, as printed on standard output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvocationSummary {
    pub solver: String,
    pub invocation: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exitcode: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cputime: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wctime: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxvsize: Option<u64>,
    pub rows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber described by `config`. `RUST_LOG` wins
    /// over `config.level`. JSON lines carry the enclosing solver and
    /// invocation span fields so every record can be attributed.
    pub fn init(config: &LogConfig) -> Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
        let writer = Self::writer(config.file.as_deref())?;
        let installed = if config.json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .with_writer(writer);
            tracing_subscriber::registry().with(filter).with(fmt).try_init()
        } else {
            let fmt = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(config.file.is_none())
                .with_writer(writer);
            tracing_subscriber::registry().with(filter).with(fmt).try_init()
        };
        installed.map_err(|e| Error::config(format!("logger already installed: {}", e)))
    }

    /// Appending log file when one is configured, stderr otherwise.
    fn writer(file: Option<&Path>) -> Result<BoxMakeWriter> {
        match file {
            Some(path) => {
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| Error::config(format!("log file {}: {}", path.display(), e)))?;
                Ok(BoxMakeWriter::new(Mutex::new(f)))
            }
            None => Ok(BoxMakeWriter::new(std::io::stderr)),
        }
    }

    /// Write `summary` as a single JSON line, outside of tracing.
    pub fn emit_summary(summary: &InvocationSummary, w: &mut impl Write) -> std::io::Result<()> {
        serde_json::to_writer(&mut *w, summary)?;
        writeln!(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_is_one_line_without_empty_fields() {
        let summary = InvocationSummary {
            solver: "ida".into(),
            invocation: "t1".into(),
            outcome: "not_launched",
            errors: vec!["no such file".into()],
            ..InvocationSummary::default()
        };
        let mut out = Vec::new();
        StructuredLogger::emit_summary(&summary, &mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(line.lines().count(), 1);
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["outcome"], "not_launched");
        assert!(v.get("status").is_none());
        assert_eq!(v["rows"], 0);
    }

    #[test]
    fn configured_file_receives_span_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchbot.log");
        let config = LogConfig {
            level: "debug".into(),
            json: true,
            file: Some(path.clone()),
        };
        StructuredLogger::init(&config).unwrap();
        {
            let span = tracing::info_span!("invocation", invocation = "t7");
            let _guard = span.enter();
            tracing::info!(polls = 3, "invocation finished");
        }
        // a second install is refused, not a panic
        assert!(matches!(StructuredLogger::init(&config), Err(Error::Config(_))));

        let logged = std::fs::read_to_string(&path).unwrap();
        let line = logged.lines().find(|l| l.contains("invocation finished")).unwrap();
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(v["spans"][0]["invocation"], "t7");
        assert_eq!(v["fields"]["polls"], 3);
    }
}
