//! Batch driver: runs every invocation of a list against one solver,
//! extracts measurements into the declared tables and writes them, with the
//! admin tables, to the solver's database.

mod artifacts;
mod host;
mod invocation;

pub use artifacts::{store_output, substitute, SolverLayout};
pub use host::HostInfo;
pub use invocation::{check_ids, Invocation};

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::logging::InvocationSummary;
use crate::namespace::{Namespace, Value};
use crate::process::check_tick_rate;
use crate::storage::{RowSink, SqliteSink};
use crate::supervisor::{InvocationReport, LaunchRequest, Supervisor};
use crate::tables::{admin, populate, Extractor, Namespaces, Schema, TableDescriptor, TableScope};
use chrono::Local;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn};

/// What hooks get to see of the invocation around them.
pub struct InvocationContext<'a> {
    pub solver: &'a Path,
    pub invocation: &'a Invocation,
    pub layout: &'a SolverLayout,
}

/// Code run right before and right after every invocation. Both may write
/// the user namespace; a failing prologue keeps the invocation from running.
pub trait InvocationHooks {
    fn prologue(&mut self, _ctx: &InvocationContext<'_>, _ns: &mut Namespaces) -> Result<()> {
        Ok(())
    }

    fn epilogue(&mut self, _ctx: &InvocationContext<'_>, _ns: &mut Namespaces) -> Result<()> {
        Ok(())
    }
}

pub struct NoHooks;

impl InvocationHooks for NoHooks {}

#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    /// The solver ran, whether it finished or was stopped
    Completed {
        id: String,
        report: InvocationReport,
        rows: usize,
        /// Tables that could not be populated
        errors: Vec<String>,
    },
    /// The solver never started
    NotLaunched { id: String, error: String },
}

impl InvocationOutcome {
    pub fn id(&self) -> &str {
        match self {
            InvocationOutcome::Completed { id, .. } | InvocationOutcome::NotLaunched { id, .. } => id,
        }
    }

    pub fn launched(&self) -> bool {
        matches!(self, InvocationOutcome::Completed { .. })
    }

    pub fn summary(&self, solver: &str) -> InvocationSummary {
        match self {
            InvocationOutcome::Completed { id, report, rows, errors } => InvocationSummary {
                solver: solver.to_string(),
                invocation: id.clone(),
                outcome: if report.was_stopped() { "stopped" } else { "completed" },
                status: Some(report.status),
                exitcode: report.exit_code,
                signal: report.signal,
                cputime: Some(report.cpu_time),
                wctime: Some(report.wall_time),
                maxvsize: Some(report.max_vsize),
                rows: *rows,
                errors: errors.clone(),
            },
            InvocationOutcome::NotLaunched { id, error } => InvocationSummary {
                solver: solver.to_string(),
                invocation: id.clone(),
                outcome: "not_launched",
                errors: vec![error.clone()],
                ..InvocationSummary::default()
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolverReport {
    pub solver: String,
    pub layout: SolverLayout,
    pub outcomes: Vec<InvocationOutcome>,
}

impl SolverReport {
    pub fn summaries(&self) -> Vec<InvocationSummary> {
        self.outcomes.iter().map(|o| o.summary(&self.solver)).collect()
    }
}

fn write_admin(sink: &dyn RowSink, table: &str, rows: &[Vec<Value>]) -> Result<()> {
    let descriptor = admin::descriptor(table)
        .ok_or_else(|| Error::config(format!("unknown admin table '{}'", table)))?;
    sink.write_rows(&descriptor, rows)
}

fn read_lossy(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "captured output not readable");
            String::new()
        }
    }
}

fn stamp_sys(sys: &mut Namespace, index: &str, name: &str) {
    let now = Local::now();
    sys.set("index", index);
    sys.set("name", name);
    sys.set("date", now.format("%Y-%m-%d").to_string());
    sys.set("time", now.format("%H:%M:%S").to_string());
}

/// Populate every table of `scope`, writing each as one batch. Extraction
/// failures are confined to their table; sink failures abort.
fn write_tables<'a>(
    tables: impl Iterator<Item = &'a TableDescriptor>,
    ns: &Namespaces,
    sink: &dyn RowSink,
    errors: &mut Vec<String>,
) -> Result<usize> {
    let mut written = 0;
    for table in tables {
        match populate(table, ns) {
            Ok(out) => {
                sink.write_rows(table, &out.rows)?;
                written += out.rows.len();
            }
            Err(e) if e.is_extraction() || matches!(e, Error::Namespace(_)) => {
                warn!(table = %table.name, error = %e, "table not populated");
                errors.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

pub struct Harness {
    config: HarnessConfig,
    schema: Schema,
    extractor: Extractor,
    supervisor: Supervisor,
    tests_file: Option<PathBuf>,
    schema_file: Option<PathBuf>,
}

impl Harness {
    /// Check limits, schema and the platform tick rate before anything runs.
    pub fn new(config: HarnessConfig, schema: Schema) -> Result<Self> {
        config.limits.validate()?;
        schema.validate()?;
        check_tick_rate()?;
        let extractor = Extractor::new(&schema)?;
        let supervisor = Supervisor::new(config.limits);
        Ok(Self {
            config,
            schema,
            extractor,
            supervisor,
            tests_file: None,
            schema_file: None,
        })
    }

    /// Declared input files, copied next to the results and named in `admin_params`.
    pub fn with_sources(mut self, tests: Option<PathBuf>, schema: Option<PathBuf>) -> Self {
        self.tests_file = tests;
        self.schema_file = schema;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    fn main_namespace(&self, solver: &Path) -> Namespace {
        let shown = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
        let limits = &self.config.limits;
        let mut main = Namespace::new();
        main.set("solver", solver.display().to_string());
        main.set("timeout", limits.timeout_secs);
        main.set("memory", limits.memory_bytes);
        main.set("check", limits.check_secs);
        main.set("tests", shown(&self.tests_file));
        main.set("db", shown(&self.schema_file));
        main
    }

    /// Run every invocation against `solver`. Launch and extraction failures
    /// are recorded per invocation; setup, supervision and sink failures abort
    /// the solver.
    pub fn run_solver(
        &self,
        solver: &Path,
        invocations: &[Invocation],
        hooks: &mut dyn InvocationHooks,
    ) -> Result<SolverReport> {
        check_ids(invocations)?;
        if !solver.is_file() {
            return Err(Error::config(format!("solver {} is not accessible", solver.display())));
        }
        let program = std::fs::canonicalize(solver)?;
        let name = program
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::config(format!("solver {} has no usable name", solver.display())))?
            .to_string();

        let span = info_span!("solver", solver = %name);
        let _guard = span.enter();

        let layout = SolverLayout::create(&self.config.directory, &name)?;
        for file in [&self.tests_file, &self.schema_file].into_iter().flatten() {
            layout.keep_copy(file)?;
        }
        let host = HostInfo::collect();
        std::fs::write(layout.log.join("host.json"), serde_json::to_string_pretty(&host)?)?;

        let sink = SqliteSink::open(&layout.database)?;
        let main = self.main_namespace(&program);
        write_admin(&sink, admin::VERSION, &[admin::version_row()])?;
        write_admin(&sink, admin::HOST, &[host.row()])?;
        write_admin(&sink, admin::PARAMS, &[admin::params_row(&main)])?;
        info!(invocations = invocations.len(), directory = %layout.root.display(), "solver started");

        let mut outcomes = Vec::with_capacity(invocations.len());
        for inv in invocations {
            let outcome = self.run_invocation(&program, &name, &layout, &sink, &main, inv, hooks)?;
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.launched()).count();
        info!(completed = outcomes.len() - failed, not_launched = failed, "solver finished");
        Ok(SolverReport {
            solver: name,
            layout,
            outcomes,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_invocation(
        &self,
        program: &Path,
        name: &str,
        layout: &SolverLayout,
        sink: &dyn RowSink,
        main: &Namespace,
        inv: &Invocation,
        hooks: &mut dyn InvocationHooks,
    ) -> Result<InvocationOutcome> {
        let span = info_span!("invocation", invocation = %inv.id);
        let _guard = span.enter();

        let mut ns = Namespaces::new();
        ns.main = main.clone();
        stamp_sys(&mut ns.sys, &inv.id, name);
        inv.fill_params(&mut ns.param);

        let prefix = substitute(&self.config.output, &[&ns.sys, &ns.main]).replace('/', "_");
        let request = LaunchRequest {
            invocation: inv.id.clone(),
            program: program.to_path_buf(),
            args: inv.args.clone(),
            cwd: None,
            stdout: layout.root.join(format!("{}.log", prefix)),
            stderr: layout.root.join(format!("{}.err", prefix)),
        };
        let ctx = InvocationContext {
            solver: program,
            invocation: inv,
            layout,
        };

        write_admin(sink, admin::TESTS, &[admin::tests_row(&inv.id, &inv.args)])?;
        let not_launched = |e: Error| -> Result<InvocationOutcome> {
            error!(error = %e, "invocation not launched");
            write_admin(sink, admin::STATUS, &[admin::status_row(&inv.id, admin::NOT_LAUNCHED_STATUS)])?;
            for staged in [&request.stdout, &request.stderr] {
                let _ = std::fs::remove_file(staged);
            }
            Ok(InvocationOutcome::NotLaunched {
                id: inv.id.clone(),
                error: e.to_string(),
            })
        };

        if let Err(e) = hooks.prologue(&ctx, &mut ns) {
            return not_launched(e);
        }

        let poll_tables: Vec<&TableDescriptor> = self.schema.tables_in(TableScope::Poll).collect();
        let mut poll_rows: BTreeMap<String, Vec<Vec<Value>>> = BTreeMap::new();
        let mut errors: Vec<String> = Vec::new();
        let result = self.supervisor.run(&request, &mut ns, |ns| {
            for table in &poll_tables {
                match populate(table, ns) {
                    Ok(out) => poll_rows.entry(table.name.clone()).or_default().extend(out.rows),
                    Err(e) => {
                        let msg = e.to_string();
                        if !errors.contains(&msg) {
                            warn!(table = %table.name, error = %msg, "poll table not populated");
                            errors.push(msg);
                        }
                    }
                }
            }
        });
        let report = match result {
            Ok(report) => report,
            Err(e @ Error::Launch { .. }) => return not_launched(e),
            Err(e) => {
                // captured output stays in place for inspection
                error!(error = %e, "supervision failed");
                return Err(e);
            }
        };

        let cwd = std::env::current_dir()?;
        let stdout = read_lossy(&request.stdout);
        let stderr = read_lossy(&request.stderr);
        self.extractor.apply(&stdout, &stderr, &cwd, &mut ns);
        if let Err(e) = hooks.epilogue(&ctx, &mut ns) {
            warn!(error = %e, "epilogue failed");
            errors.push(e.to_string());
        }

        let mut rows = write_tables(self.schema.tables_in(TableScope::Invocation), &ns, sink, &mut errors)?;
        for table in poll_tables {
            if let Some(batch) = poll_rows.remove(&table.name) {
                sink.write_rows(table, &batch)?;
                rows += batch.len();
            }
        }

        write_admin(sink, admin::TIME, &[admin::time_row(&inv.id, report.started, report.ended)])?;
        write_admin(sink, admin::STATUS, &[admin::status_row(&inv.id, i64::from(report.status))])?;
        write_admin(sink, admin::TIMELINE, &admin::timeline_rows(&inv.id, &report.timeline))?;

        for captured in [&request.stdout, &request.stderr] {
            store_output(captured, &layout.results, self.config.compress)?;
        }

        info!(
            status = report.status,
            cpu_time = report.cpu_time,
            wall_time = report.wall_time,
            rows,
            "invocation finished"
        );
        Ok(InvocationOutcome::Completed {
            id: inv.id.clone(),
            report,
            rows,
            errors,
        })
    }

    /// Text-parsing variant: every file is treated as the standard output of
    /// a finished run. Rows go to `<directory>/<schema stem>.db`.
    pub fn parse_files(&self, files: &[PathBuf]) -> Result<Vec<InvocationSummary>> {
        let stem = self
            .schema_file
            .as_ref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or(env!("CARGO_PKG_NAME"));
        std::fs::create_dir_all(&self.config.directory)?;
        let sink = SqliteSink::open(&self.config.directory.join(format!("{}.db", stem)))?;
        self.parse_into(files, &sink)
    }

    /// Same as [`Harness::parse_files`], into any sink.
    pub fn parse_into(&self, files: &[PathBuf], sink: &dyn RowSink) -> Result<Vec<InvocationSummary>> {
        let mut main = Namespace::new();
        main.set(
            "db",
            self.schema_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
        );

        let mut summaries = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let name = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
            let span = info_span!("parse", file = %file.display());
            let _guard = span.enter();
            let mut summary = InvocationSummary {
                solver: name.clone(),
                invocation: index.to_string(),
                outcome: "parsed",
                ..InvocationSummary::default()
            };

            let content = match std::fs::read(file) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    error!(error = %e, "file not readable");
                    summary.outcome = "unreadable";
                    summary.errors.push(e.to_string());
                    summaries.push(summary);
                    continue;
                }
            };

            let mut ns = Namespaces::new();
            ns.main = main.clone();
            stamp_sys(&mut ns.sys, &index.to_string(), &name);
            let dir = file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            self.extractor.apply(&content, "", dir, &mut ns);
            summary.rows = write_tables(
                self.schema.tables_in(TableScope::Invocation),
                &ns,
                sink,
                &mut summary.errors,
            )?;
            info!(rows = summary.rows, "file parsed");
            summaries.push(summary);
        }
        Ok(summaries)
    }
}
