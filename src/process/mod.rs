//! Process accounting from the `/proc` pseudo-filesystem: per-pid snapshots,
//! process-tree discovery across group boundaries, and the timeline that
//! accumulates every process an invocation ever spawned.

mod snapshot;
mod timeline;
mod tree;

pub use snapshot::{capture, parse_stat, ProcessSnapshot};
pub use timeline::{ProcessTimeline, TimelineEntry};
pub use tree::{close_over_group, discover};

use crate::error::{Error, Result};

/// Scheduler ticks per second every CPU-time figure is computed with.
pub const TICKS_PER_SECOND: u64 = 100;

/// Tick rate reported by the platform.
pub fn platform_tick_rate() -> i64 {
    // SAFETY: sysconf has no preconditions
    unsafe { libc::sysconf(libc::_SC_CLK_TCK) as i64 }
}

/// Refuse to run when the platform tick rate differs from [`TICKS_PER_SECOND`].
pub fn check_tick_rate() -> Result<()> {
    let detected = platform_tick_rate();
    if detected != TICKS_PER_SECOND as i64 {
        return Err(Error::config(format!(
            "scheduler tick rate is {} per second, expected {}",
            detected, TICKS_PER_SECOND
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM
    Graceful,
    /// SIGKILL
    Forceful,
}

impl StopSignal {
    fn as_raw(self) -> libc::c_int {
        match self {
            StopSignal::Graceful => libc::SIGTERM,
            StopSignal::Forceful => libc::SIGKILL,
        }
    }
}

/// Send `signal` to a single pid.
pub fn send_signal(pid: i32, signal: StopSignal) -> std::io::Result<()> {
    // SAFETY: kill only reads its integer arguments
    let rc = unsafe { libc::kill(pid, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn tick_rate_matches_expected_constant() {
        assert!(check_tick_rate().is_ok());
    }
}
