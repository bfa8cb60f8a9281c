// src/clock.rs
//
// Clock sources for registry timestamps, in unix seconds.
//
// SystemClock never hands out a reading smaller than one it already
// returned, so a wall-clock step backwards cannot reorder registrations.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of `now` for the registry.
pub trait Clock: Send + Sync {
    /// Current time in unix seconds.
    fn now(&self) -> u64;
}

fn system_time_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Wall clock with a monotonic floor.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_secs: Mutex<u64>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        let candidate = system_time_now_secs();
        let mut last = self.last_secs.lock();
        if candidate > *last {
            *last = candidate;
        }
        *last
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(start_secs),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, by_secs: u64) {
        self.secs.fetch_add(by_secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

// ==== TESTS ====
