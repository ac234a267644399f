//! Supervision of one invocation: launch in a fresh process group, poll the
//! process tree every `check` seconds, escalate stop signals when the
//! ceiling is breached, and record the final figures once the child exits.

mod policy;

pub use policy::{Escalation, TerminationPolicy, Usage};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::namespace::Namespace;
use crate::process::{discover, ProcessTimeline, TimelineEntry};
use crate::tables::Namespaces;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Invocation id, for error context
    pub invocation: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Files receiving standard output and error
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

#[derive(Debug, Clone)]
pub struct InvocationReport {
    /// Raw wait status
    pub status: i32,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub cpu_time: f64,
    pub wall_time: f64,
    pub max_vsize: u64,
    /// Furthest escalation reached
    pub escalation: Escalation,
    pub polls: u64,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub timeline: Vec<TimelineEntry>,
}

impl InvocationReport {
    pub fn was_stopped(&self) -> bool {
        self.escalation != Escalation::Running
    }
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    limits: Limits,
}

fn record_usage(sys: &mut Namespace, usage: &Usage, timeline: &ProcessTimeline) {
    sys.set("cputime", usage.cpu_time);
    sys.set("wctime", usage.wall_time);
    sys.set("vsize", timeline.live_vsize());
    sys.set("maxvsize", usage.max_memory);
    sys.set("numprocs", timeline.len());
    sys.set("numthreads", timeline.total_threads());
}

fn record_status(sys: &mut Namespace, status: &ExitStatus) {
    sys.set("status", status.into_raw());
    if let Some(code) = status.code() {
        sys.set("exitcode", code);
    }
    if let Some(signal) = status.signal() {
        sys.set("signal", signal);
    }
}

impl Supervisor {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Run `request` to completion under the configured ceiling.
    ///
    /// Usage figures land in `ns.sys` on every poll, then `on_poll` sees the
    /// namespaces. A child that cannot be started is [`Error::Launch`]; a
    /// child stopped for breaching the ceiling is a normal report.
    pub fn run<F>(&self, request: &LaunchRequest, ns: &mut Namespaces, mut on_poll: F) -> Result<InvocationReport>
    where
        F: FnMut(&Namespaces),
    {
        let stdout = File::create(&request.stdout)?;
        let stderr = File::create(&request.stderr)?;

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }

        let started = Utc::now();
        let clock = Instant::now();
        let mut child = cmd.spawn().map_err(|source| Error::Launch {
            invocation: request.invocation.clone(),
            program: request.program.clone(),
            source,
        })?;
        // process_group(0): the child leads a group named after itself
        let pgrp = child.id() as i32;
        info!(pid = pgrp, program = %request.program.display(), "launched");

        let mut timeline = ProcessTimeline::new();
        let mut policy = TerminationPolicy::new(self.limits);
        let mut max_vsize = 0u64;
        let mut polls = 0u64;

        let status = loop {
            std::thread::sleep(self.limits.check_interval());
            timeline.merge(discover(pgrp));
            let wall_time = clock.elapsed().as_secs_f64();
            // only after the merge, so a child exiting now was still seen once
            let exited = match child.try_wait() {
                Ok(s) => s,
                Err(e) => {
                    warn!(pid = pgrp, error = %e, "cannot wait for child");
                    timeline.terminate();
                    let _ = child.wait();
                    return Err(e.into());
                }
            };
            polls += 1;

            max_vsize = max_vsize.max(timeline.live_vsize());
            let usage = Usage {
                cpu_time: timeline.cpu_time(),
                wall_time,
                max_memory: max_vsize,
            };
            record_usage(&mut ns.sys, &usage, &timeline);
            if let Some(status) = exited {
                break status;
            }
            on_poll(ns);

            if let Some(signal) = policy.decide(&usage) {
                let delivered = timeline.signal_alive(signal);
                info!(
                    ?signal,
                    delivered,
                    cpu_time = usage.cpu_time,
                    wall_time = usage.wall_time,
                    max_vsize = usage.max_memory,
                    "resource ceiling breached"
                );
            }
        };

        // orphans still in the group are swept up with the rest
        timeline.merge(discover(pgrp));
        timeline.terminate();
        let ended = Utc::now();

        let usage = Usage {
            cpu_time: timeline.cpu_time(),
            wall_time: clock.elapsed().as_secs_f64(),
            max_memory: max_vsize,
        };
        record_usage(&mut ns.sys, &usage, &timeline);
        record_status(&mut ns.sys, &status);
        debug!(pid = pgrp, status = status.into_raw(), polls, "child exited");

        Ok(InvocationReport {
            status: status.into_raw(),
            exit_code: status.code(),
            signal: status.signal(),
            cpu_time: usage.cpu_time,
            wall_time: usage.wall_time,
            max_vsize,
            escalation: policy.state(),
            polls,
            started,
            ended,
            timeline: timeline.entries(),
        })
    }
}
