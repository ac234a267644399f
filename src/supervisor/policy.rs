//! Escalating termination policy, evaluated once per poll against the
//! aggregate usage of the supervised tree.

use crate::config::Limits;
use crate::process::StopSignal;

/// Usage figures of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    /// Seconds of CPU consumed by the whole timeline
    pub cpu_time: f64,
    /// Seconds since launch, supervisor clock
    pub wall_time: f64,
    /// Largest live-tree virtual memory seen so far, bytes
    pub max_memory: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Running,
    /// A graceful stop was sent
    Terminating,
    /// Forceful stops are being sent
    Killing,
}

#[derive(Debug, Clone)]
pub struct TerminationPolicy {
    limits: Limits,
    state: Escalation,
}

impl TerminationPolicy {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            state: Escalation::Running,
        }
    }

    pub fn state(&self) -> Escalation {
        self.state
    }

    fn over_time(&self, usage: &Usage, grace: f64) -> bool {
        let timeout = self.limits.timeout_secs;
        usage.cpu_time > timeout + grace || usage.wall_time >= 1.5 * timeout + grace
    }

    fn over_memory(&self, usage: &Usage) -> bool {
        usage.max_memory > self.limits.memory_bytes
    }

    /// Signal to send this poll, if any. The first breach yields one graceful
    /// stop; once past the grace window every poll yields a forceful stop.
    pub fn decide(&mut self, usage: &Usage) -> Option<StopSignal> {
        match self.state {
            Escalation::Running => {
                if self.over_time(usage, 0.0) || self.over_memory(usage) {
                    self.state = Escalation::Terminating;
                    Some(StopSignal::Graceful)
                } else {
                    None
                }
            }
            Escalation::Terminating | Escalation::Killing => {
                if self.over_time(usage, self.limits.kill_delay_secs) || self.over_memory(usage) {
                    self.state = Escalation::Killing;
                    Some(StopSignal::Forceful)
                } else {
                    None
                }
            }
        }
    }
}
