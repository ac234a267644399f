//! One process's accounting record, read from `/proc/<pid>/stat` and `/proc/<pid>/cmdline`.

use super::TICKS_PER_SECOND;
use chrono::{DateTime, Duration, Utc};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub pid: i32,
    pub ppid: i32,
    pub pgrp: i32,
    /// Self CPU ticks (user, system)
    pub utime: u64,
    pub stime: u64,
    /// Reaped children CPU ticks (user, system)
    pub cutime: u64,
    pub cstime: u64,
    pub num_threads: u64,
    /// Virtual memory size, bytes
    pub vsize: u64,
    pub cmdline: String,
    pub start_time: DateTime<Utc>,
    /// `None` while the process is considered alive
    pub end_time: Option<DateTime<Utc>>,
}

impl ProcessSnapshot {
    pub fn total_ticks(&self) -> u64 {
        self.utime + self.stime + self.cutime + self.cstime
    }

    pub fn cpu_seconds(&self) -> f64 {
        self.total_ticks() as f64 / TICKS_PER_SECOND as f64
    }

    pub fn is_alive(&self) -> bool {
        self.end_time.is_none()
    }

    /// True when `current` is the same process this record describes, not a
    /// later one that was given the same pid. Start times derived from
    /// uptime jitter by a few ticks between reads.
    pub fn same_process(&self, current: &ProcessSnapshot) -> bool {
        self.pid == current.pid
            && (current.start_time - self.start_time).num_milliseconds().abs() <= START_TIME_SLACK_MS
    }
}

const START_TIME_SLACK_MS: i64 = 250;

// identity is the pid alone
impl PartialEq for ProcessSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid
    }
}

impl Eq for ProcessSnapshot {}

impl Hash for ProcessSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pid.hash(state);
    }
}

/// Parse the content of `/proc/<pid>/stat`.
///
/// The command name sits between the first `(` and the last `)` and may hold
/// spaces or parentheses, so fields are counted from the last `)`.
pub fn parse_stat(
    pid: i32,
    stat: &str,
    cmdline: &[u8],
    uptime_secs: f64,
    now: DateTime<Utc>,
) -> Option<ProcessSnapshot> {
    let comm_end = stat.rfind(')')?;
    let fields: Vec<&str> = stat.get(comm_end + 1..)?.split_whitespace().collect();
    if fields.len() < 21 {
        return None;
    }
    let num = |i: usize| fields[i].parse::<u64>().ok();
    let int = |i: usize| fields[i].parse::<i32>().ok();

    let start_ticks = num(19)?;
    let since_start = uptime_secs - start_ticks as f64 / TICKS_PER_SECOND as f64;
    let start_time = now - Duration::milliseconds((since_start * 1000.0) as i64);

    let cmdline = String::from_utf8_lossy(cmdline)
        .trim_end_matches(['\0', '\n'])
        .replace('\0', " ");

    Some(ProcessSnapshot {
        pid,
        ppid: int(1)?,
        pgrp: int(2)?,
        utime: num(11)?,
        stime: num(12)?,
        cutime: num(13)?,
        cstime: num(14)?,
        num_threads: num(17)?,
        vsize: num(20)?,
        cmdline,
        start_time,
        end_time: None,
    })
}

pub(crate) fn read_uptime() -> Option<f64> {
    let raw = std::fs::read_to_string("/proc/uptime").ok()?;
    raw.split_whitespace().next()?.parse().ok()
}

/// Snapshot with a pre-read uptime; any read failure means the pid is gone.
pub(crate) fn capture_with(pid: i32, uptime_secs: f64, now: DateTime<Utc>) -> Option<ProcessSnapshot> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let cmdline = std::fs::read(format!("/proc/{}/cmdline", pid)).ok()?;
    parse_stat(pid, &stat, &cmdline, uptime_secs, now)
}

/// Snapshot `pid`, or `None` when it no longer exists (or cannot be read).
pub fn capture(pid: i32) -> Option<ProcessSnapshot> {
    let uptime = read_uptime()?;
    capture_with(pid, uptime, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "4242 (my (odd) solver) S 4200 4242 4200 0 -1 4194560 1052 0 0 0 \
                        150 30 7 3 20 0 3 0 50000 104857600 2048 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 2 0 0 0 0 0";

    #[test]
    fn parses_fields_after_last_paren() {
        let now = Utc::now();
        let p = parse_stat(4242, STAT, b"./solver\0--depth\0 3\0", 1000.0, now).unwrap();
        assert_eq!(p.ppid, 4200);
        assert_eq!(p.pgrp, 4242);
        assert_eq!((p.utime, p.stime, p.cutime, p.cstime), (150, 30, 7, 3));
        assert_eq!(p.num_threads, 3);
        assert_eq!(p.vsize, 104_857_600);
        assert_eq!(p.cmdline, "./solver --depth  3");
        assert!(p.is_alive());
        assert!((p.cpu_seconds() - 1.9).abs() < 1e-9);

        // started 500s after boot, 1000s of uptime: 500s ago
        let age = (now - p.start_time).num_milliseconds();
        assert_eq!(age, 500_000);
    }

    #[test]
    fn reused_pid_is_a_different_process() {
        let now = Utc::now();
        let first = parse_stat(4242, STAT, b"", 1000.0, now).unwrap();
        // same boot, re-read a moment later: uptime moved with the clock
        let again = parse_stat(4242, STAT, b"", 1000.04, now + Duration::milliseconds(30)).unwrap();
        assert!(first.same_process(&again));

        let reused_stat = STAT.replace(" 50000 ", " 90000 ");
        let reused = parse_stat(4242, &reused_stat, b"", 1000.0, now).unwrap();
        assert!(!first.same_process(&reused));
    }

    #[test]
    fn truncated_record_is_unavailable() {
        assert!(parse_stat(1, "1 (init) S 0 1", b"", 10.0, Utc::now()).is_none());
        assert!(parse_stat(1, "garbage", b"", 10.0, Utc::now()).is_none());
    }

    #[test]
    fn vanished_pid_is_unavailable() {
        // pid_max never reaches this
        assert!(capture(i32::MAX).is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn captures_own_process() {
        let me = capture(std::process::id() as i32).unwrap();
        assert_eq!(me.pid, std::process::id() as i32);
        assert!(me.vsize > 0);
        assert!(me.num_threads >= 1);
    }
}
