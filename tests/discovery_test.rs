//! Discovery closure over random process graphs where descendants leave
//! their parent's group.

use benchbot::process::{close_over_group, ProcessSnapshot};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

fn snapshot(pid: i32, ppid: i32, pgrp: i32) -> ProcessSnapshot {
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
        cmdline: String::new(),
        start_time: Utc::now(),
        end_time: None,
    }
}

/// A forest rooted at pid 1000 (group 1000) plus unrelated roots. Every
/// spawned process inherits its parent's group or, sometimes, leads a new one.
fn random_forest(rng: &mut StdRng) -> Vec<ProcessSnapshot> {
    let mut procs = vec![snapshot(1000, 1, 1000)];
    let unrelated = rng.gen_range(1..4);
    for i in 0..unrelated {
        let pid = 5000 + i * 100;
        procs.push(snapshot(pid, 1, pid));
    }
    let mut next = 2000;
    for _ in 0..rng.gen_range(5..40) {
        let parent = procs[rng.gen_range(0..procs.len())].clone();
        let pgrp = if rng.gen_bool(0.3) { next } else { parent.pgrp };
        procs.push(snapshot(next, parent.pid, pgrp));
        next += 1;
    }
    procs
}

fn descendants_of(root: i32, procs: &[ProcessSnapshot]) -> HashSet<i32> {
    let mut found: HashSet<i32> = [root].into_iter().collect();
    loop {
        let before = found.len();
        for p in procs {
            if found.contains(&p.ppid) {
                found.insert(p.pid);
            }
        }
        if found.len() == before {
            return found;
        }
    }
}

#[test]
fn every_descendant_is_discovered() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let mut procs = random_forest(&mut rng);
        let expected = descendants_of(1000, &procs);
        // listing order must not matter
        procs.reverse();
        let found: HashSet<i32> = close_over_group(procs.clone(), 1000).iter().map(|p| p.pid).collect();

        assert!(expected.is_subset(&found), "missing {:?}", expected.difference(&found).collect::<Vec<_>>());
        // anything else found shares a tracked group with a descendant
        let groups: HashSet<i32> = procs
            .iter()
            .filter(|p| expected.contains(&p.pid))
            .map(|p| p.pgrp)
            .collect();
        for p in procs.iter().filter(|p| found.contains(&p.pid)) {
            assert!(groups.contains(&p.pgrp));
        }
    }
}

#[test]
fn unrelated_roots_stay_out() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        let procs = random_forest(&mut rng);
        let found: HashSet<i32> = close_over_group(procs, 1000).iter().map(|p| p.pid).collect();
        assert!(found.iter().all(|pid| !(5000..6000).contains(pid)));
    }
}

#[test]
fn discovery_is_monotone_in_the_process_list() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let procs = random_forest(&mut rng);
        let cut = rng.gen_range(1..=procs.len());
        let partial: HashSet<i32> = close_over_group(procs[..cut].to_vec(), 1000).iter().map(|p| p.pid).collect();
        let full: HashSet<i32> = close_over_group(procs, 1000).iter().map(|p| p.pid).collect();
        assert!(partial.is_subset(&full));
    }
}
