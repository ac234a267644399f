//! Process-tree discovery: every process in the target group, plus every
//! descendant of a tracked process even after it moved to a new group.

use super::snapshot::{capture_with, read_uptime, ProcessSnapshot};
use chrono::Utc;
use std::collections::{HashMap, HashSet};

/// Fixpoint closure over an already captured process list.
///
/// Groups start as `{target}`; a process joins (and tracks its own group)
/// when its group is tracked or its parent is a tracked member. Returns every
/// process whose group ended up tracked.
pub fn close_over_group(processes: Vec<ProcessSnapshot>, target: i32) -> Vec<ProcessSnapshot> {
    let mut groups: HashMap<i32, HashSet<i32>> = HashMap::new();
    groups.insert(target, HashSet::new());
    let mut members: HashSet<i32> = HashSet::new();

    let mut changed = true;
    while changed {
        changed = false;
        for p in &processes {
            let already = groups.get(&p.pgrp).is_some_and(|m| m.contains(&p.pid));
            if already {
                continue;
            }
            if groups.contains_key(&p.pgrp) || members.contains(&p.ppid) {
                groups.entry(p.pgrp).or_default().insert(p.pid);
                members.insert(p.pid);
                changed = true;
            }
        }
    }

    processes
        .into_iter()
        .filter(|p| groups.contains_key(&p.pgrp))
        .collect()
}

fn all_processes() -> Vec<ProcessSnapshot> {
    let Some(uptime) = read_uptime() else {
        return Vec::new();
    };
    let now = Utc::now();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse::<i32>().ok()))
        .filter_map(|pid| capture_with(pid, uptime, now))
        .collect()
}

/// Live processes belonging to `pgrp` or descending from one of its members.
/// Processes that vanish while being read are silently left out.
pub fn discover(pgrp: i32) -> Vec<ProcessSnapshot> {
    close_over_group(all_processes(), pgrp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc_(pid: i32, ppid: i32, pgrp: i32) -> ProcessSnapshot {
        ProcessSnapshot {
            pid,
            ppid,
            pgrp,
            utime: 0,
            stime: 0,
            cutime: 0,
            cstime: 0,
            num_threads: 1,
            vsize: 0,
            cmdline: format!("p{}", pid),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    fn pids(mut v: Vec<ProcessSnapshot>) -> Vec<i32> {
        v.sort_by_key(|p| p.pid);
        v.into_iter().map(|p| p.pid).collect()
    }

    #[test]
    fn follows_children_into_new_groups() {
        // 100 leads group 100; 101 escapes into group 101 and forks 102;
        // 102 forks 103 into yet another group. 200 is unrelated.
        let procs = vec![
            proc_(103, 102, 103),
            proc_(100, 1, 100),
            proc_(101, 100, 101),
            proc_(102, 101, 101),
            proc_(200, 1, 200),
            proc_(201, 200, 200),
        ];
        assert_eq!(pids(close_over_group(procs, 100)), vec![100, 101, 102, 103]);
    }

    #[test]
    fn unrelated_process_sharing_nothing_is_excluded() {
        let procs = vec![proc_(10, 1, 10), proc_(11, 10, 10), proc_(12, 1, 12)];
        assert_eq!(pids(close_over_group(procs, 10)), vec![10, 11]);
    }

    #[test]
    fn empty_group_yields_nothing() {
        let procs = vec![proc_(10, 1, 10)];
        assert!(close_over_group(procs, 99).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn discovers_own_group() {
        // SAFETY: getpgrp has no preconditions
        let own = unsafe { libc::getpgrp() };
        let found = discover(own);
        assert!(found.iter().any(|p| p.pid == std::process::id() as i32));
    }
}
