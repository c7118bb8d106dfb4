//! Per-checker pause switch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Pauses a single checker until a deadline.
///
/// The deadline is stored as unix seconds in an atomic, so toggling and
/// querying are safe while region checks run on other threads. A paused
/// checker declines every region; other checkers are unaffected.
#[derive(Debug, Default)]
pub struct PauseController {
    /// Unix seconds until which the checker is paused. Zero means running.
    paused_until: AtomicU64,
}

impl PauseController {
    pub const fn new() -> Self {
        Self {
            paused_until: AtomicU64::new(0),
        }
    }

    /// Returns true while the pause deadline lies in the future.
    pub fn is_paused(&self) -> bool {
        unix_now_secs() < self.paused_until.load(Ordering::Relaxed)
    }

    /// Pauses for `delay_secs` seconds from now, or resumes when zero.
    pub fn pause_or_resume(&self, delay_secs: u64) {
        let until = if delay_secs == 0 {
            0
        } else {
            unix_now_secs().saturating_add(delay_secs)
        };
        self.paused_until.store(until, Ordering::Relaxed);
        if until == 0 {
            tracing::info!("checker resumed");
        } else {
            tracing::info!(delay_secs, paused_until = until, "checker paused");
        }
    }

    /// Returns the pause deadline (unix seconds) if currently paused.
    pub fn paused_until(&self) -> Option<u64> {
        let until = self.paused_until.load(Ordering::Relaxed);
        (unix_now_secs() < until).then_some(until)
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
