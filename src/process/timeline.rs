//! Accumulating registry of every process observed during one invocation.

use super::snapshot::{capture_with, read_uptime};
use super::{send_signal, ProcessSnapshot, StopSignal};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Reporting view of one timeline member.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub pid: i32,
    pub cmdline: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Seconds between start and end, when the end is known
    pub elapsed: Option<f64>,
}

#[derive(Debug, Default)]
pub struct ProcessTimeline {
    processes: BTreeMap<i32, ProcessSnapshot>,
}

impl ProcessTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, tree: Vec<ProcessSnapshot>) {
        self.merge_at(tree, Utc::now());
    }

    /// Fold a fresh discovery result in. Members that are alive here but
    /// missing from `tree` end at `now` (detection time, at most one poll late).
    /// Re-observed pids take the new attributes but keep an end time once set.
    pub fn merge_at(&mut self, tree: Vec<ProcessSnapshot>, now: DateTime<Utc>) {
        let seen: HashSet<i32> = tree.iter().map(|p| p.pid).collect();
        for p in self.processes.values_mut() {
            if p.end_time.is_none() && !seen.contains(&p.pid) {
                p.end_time = Some(now);
            }
        }
        for mut p in tree {
            if let Some(prev) = self.processes.get(&p.pid) {
                p.end_time = p.end_time.or(prev.end_time);
            }
            self.processes.insert(p.pid, p);
        }
    }

    /// Send `signal` to every member still considered alive. Delivery
    /// failures are logged only; the target may already be gone.
    pub fn signal_alive(&self, signal: StopSignal) -> usize {
        let mut delivered = 0;
        for pid in self.alive_pids() {
            match send_signal(pid, signal) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(pid, ?signal, error = %e, "signal not delivered"),
            }
        }
        delivered
    }

    pub fn terminate(&mut self) {
        self.terminate_at(Utc::now());
    }

    /// Close the timeline: every member with an unset end time ends at `now`.
    /// Then every member that still exists is killed, including those already
    /// closed by a merge: a child that left the group and was re-parented
    /// drops out of discovery but keeps running. A pid whose current start
    /// time differs from the recorded one was reused and is left alone.
    pub fn terminate_at(&mut self, now: DateTime<Utc>) {
        for p in self.processes.values_mut() {
            if p.end_time.is_none() {
                p.end_time = Some(now);
            }
        }
        let Some(uptime) = read_uptime() else {
            warn!("uptime unreadable, survivors not swept");
            return;
        };
        let read_at = Utc::now();
        for recorded in self.processes.values() {
            let Some(current) = capture_with(recorded.pid, uptime, read_at) else {
                continue;
            };
            if !recorded.same_process(&current) {
                debug!(pid = recorded.pid, "pid reused, not killed");
                continue;
            }
            match send_signal(recorded.pid, StopSignal::Forceful) {
                Ok(()) => debug!(pid = recorded.pid, "survivor killed"),
                Err(e) => warn!(pid = recorded.pid, error = %e, "could not kill process"),
            }
        }
    }

    fn alive_pids(&self) -> Vec<i32> {
        self.processes
            .values()
            .filter(|p| p.is_alive())
            .map(|p| p.pid)
            .collect()
    }

    pub fn pids(&self) -> Vec<i32> {
        self.processes.keys().copied().collect()
    }

    pub fn get(&self, pid: i32) -> Option<&ProcessSnapshot> {
        self.processes.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Cumulated CPU seconds of every member, ended ones included.
    pub fn cpu_time(&self) -> f64 {
        self.processes.values().map(|p| p.cpu_seconds()).sum()
    }

    /// Virtual memory of every member, bytes.
    pub fn total_vsize(&self) -> u64 {
        self.processes.values().map(|p| p.vsize).sum()
    }

    /// Virtual memory of the members still alive, bytes.
    pub fn live_vsize(&self) -> u64 {
        self.processes
            .values()
            .filter(|p| p.is_alive())
            .map(|p| p.vsize)
            .sum()
    }

    pub fn total_threads(&self) -> u64 {
        self.processes.values().map(|p| p.num_threads).sum()
    }

    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.processes
            .values()
            .map(|p| TimelineEntry {
                pid: p.pid,
                cmdline: p.cmdline.clone(),
                start: p.start_time,
                end: p.end_time,
                elapsed: p
                    .end_time
                    .map(|e| (e - p.start_time).num_milliseconds() as f64 / 1000.0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snap(pid: i32, ticks: u64, vsize: u64) -> ProcessSnapshot {
        ProcessSnapshot {
            pid,
            ppid: 1,
            pgrp: 1,
            utime: ticks,
            stime: 0,
            cutime: 0,
            cstime: 0,
            num_threads: 2,
            vsize,
            cmdline: format!("p{}", pid),
            start_time: Utc::now() - Duration::seconds(10),
            end_time: None,
        }
    }

    #[test]
    fn vanished_members_end_at_detection_time() {
        let mut t = ProcessTimeline::new();
        let t0 = Utc::now();
        t.merge_at(vec![snap(1, 100, 10), snap(2, 50, 20)], t0);
        assert_eq!(t.len(), 2);

        let t1 = t0 + Duration::seconds(1);
        t.merge_at(vec![snap(1, 150, 10)], t1);
        assert_eq!(t.get(2).unwrap().end_time, Some(t1));
        assert!(t.get(1).unwrap().is_alive());
        // latest attributes win
        assert_eq!(t.get(1).unwrap().utime, 150);
        assert!((t.cpu_time() - 2.0).abs() < 1e-9);
        assert_eq!(t.total_vsize(), 30);
        assert_eq!(t.live_vsize(), 10);
        assert_eq!(t.total_threads(), 4);
    }

    #[test]
    fn end_time_survives_reobservation() {
        let mut t = ProcessTimeline::new();
        let t0 = Utc::now();
        t.merge_at(vec![snap(7, 1, 1)], t0);
        let t1 = t0 + Duration::seconds(1);
        t.merge_at(vec![], t1);
        assert_eq!(t.get(7).unwrap().end_time, Some(t1));

        // a late observation of the same pid must not reopen it
        t.merge_at(vec![snap(7, 3, 1)], t1 + Duration::seconds(1));
        assert_eq!(t.get(7).unwrap().end_time, Some(t1));
        assert_eq!(t.get(7).unwrap().utime, 3);
    }

    #[test]
    fn terminate_closes_open_members_only() {
        let mut t = ProcessTimeline::new();
        let t0 = Utc::now();
        // pids that cannot exist, so no signal is ever sent
        t.merge_at(vec![snap(i32::MAX, 0, 0), snap(i32::MAX - 1, 0, 0)], t0);
        t.merge_at(vec![snap(i32::MAX, 0, 0)], t0 + Duration::seconds(1));

        let t2 = t0 + Duration::seconds(2);
        t.terminate_at(t2);
        assert_eq!(t.get(i32::MAX).unwrap().end_time, Some(t2));
        assert_eq!(t.get(i32::MAX - 1).unwrap().end_time, Some(t0 + Duration::seconds(1)));

        let entries = t.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.elapsed.is_some()));
    }

    #[cfg(target_os = "linux")]
    fn sleeper() -> (std::process::Child, ProcessSnapshot) {
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let snap = crate::process::capture(child.id() as i32).unwrap();
        (child, snap)
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn terminate_kills_members_closed_by_an_earlier_merge() {
        use std::os::unix::process::ExitStatusExt;

        let (mut child, snap) = sleeper();
        let mut t = ProcessTimeline::new();
        t.merge(vec![snap]);
        // dropped out of discovery while still running
        t.merge(vec![]);
        assert!(!t.get(child.id() as i32).unwrap().is_alive());

        t.terminate();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn terminate_spares_a_reused_pid() {
        let (mut child, mut snap) = sleeper();
        // the record describes an older process that had the same pid
        snap.start_time = snap.start_time - Duration::hours(1);
        let mut t = ProcessTimeline::new();
        t.merge(vec![snap]);

        t.terminate();
        assert!(child.try_wait().unwrap().is_none());
        child.kill().unwrap();
        child.wait().unwrap();
    }
}
