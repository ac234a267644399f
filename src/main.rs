//! benchbot entrypoint: `run` supervises solvers over an invocation list,
//! `parse` extracts the same tables from existing text files.

use benchbot::{
    config::HarnessConfig,
    harness::{Harness, Invocation, NoHooks},
    logging::StructuredLogger,
    tables::Schema,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "benchbot", version, about = "Run solvers under a resource ceiling and tabulate their output")]
struct Cli {
    /// Configuration file (default: $BENCHBOT_CONFIG or benchbot.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every invocation against each solver
    Run {
        #[arg(required = true)]
        solvers: Vec<PathBuf>,
        /// Invocation list (JSON)
        #[arg(long)]
        tests: PathBuf,
        /// Declared tables and patterns (JSON)
        #[arg(long)]
        db: PathBuf,
        /// CPU-time ceiling, seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Virtual memory ceiling, bytes
        #[arg(long)]
        memory: Option<u64>,
        /// Seconds between polls
        #[arg(long)]
        check: Option<f64>,
        #[arg(long)]
        directory: Option<PathBuf>,
        /// Prefix of captured output files, with $var placeholders
        #[arg(long)]
        output: Option<String>,
        /// bzip2 captured output
        #[arg(long)]
        compress: bool,
    },
    /// Extract tables from text files
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Declared tables and patterns (JSON)
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        directory: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var("BENCHBOT_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("benchbot.json"));
    let mut config = HarnessConfig::load(&config_path)?;

    StructuredLogger::init(&config.log)?;

    let mut stdout = std::io::stdout();
    let mut failures = 0usize;
    match cli.command {
        Command::Run {
            solvers,
            tests,
            db,
            timeout,
            memory,
            check,
            directory,
            output,
            compress,
        } => {
            if let Some(v) = timeout {
                config.limits.timeout_secs = v;
            }
            if let Some(v) = memory {
                config.limits.memory_bytes = v;
            }
            if let Some(v) = check {
                config.limits.check_secs = v;
            }
            if let Some(v) = directory {
                config.directory = v;
            }
            if let Some(v) = output {
                config.output = v;
            }
            config.compress |= compress;

            let schema = Schema::load(&db)?;
            let invocations = Invocation::load_all(&tests)?;
            let harness = Harness::new(config, schema)?.with_sources(Some(tests), Some(db));
            info!(solvers = solvers.len(), invocations = invocations.len(), "batch starting");

            for solver in &solvers {
                match harness.run_solver(solver, &invocations, &mut NoHooks) {
                    Ok(report) => {
                        for summary in report.summaries() {
                            if summary.outcome == "not_launched" {
                                failures += 1;
                            }
                            StructuredLogger::emit_summary(&summary, &mut stdout)?;
                        }
                    }
                    Err(e) => {
                        error!(solver = %solver.display(), error = %e, "solver skipped");
                        failures += 1;
                    }
                }
            }
        }
        Command::Parse { files, db, directory } => {
            if let Some(v) = directory {
                config.directory = v;
            }
            let schema = Schema::load(&db)?;
            let harness = Harness::new(config, schema)?.with_sources(None, Some(db));
            for summary in harness.parse_files(&files)? {
                if summary.outcome != "parsed" {
                    failures += 1;
                }
                StructuredLogger::emit_summary(&summary, &mut stdout)?;
            }
        }
    }

    if failures > 0 {
        error!(failures, "batch finished with failures");
        std::process::exit(1);
    }
    Ok(())
}
