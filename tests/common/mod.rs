//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use alarma::Watchdog;

/// Failure used by enclosing scopes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("outer budget exhausted")]
pub struct Outer;

/// Failure used by nested scopes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("inner budget exhausted")]
pub struct Inner;

/// SIGALRM is process-wide, so tests owning a watchdog must not overlap.
static FACILITY: Mutex<()> = Mutex::new(());

/// A watchdog owned by the calling test thread, plus the lock that keeps
/// other tests in this binary from claiming the facility meanwhile.
pub struct Harness {
    pub watchdog: Watchdog,
    _lock: MutexGuard<'static, ()>,
}

impl std::ops::Deref for Harness {
    type Target = Watchdog;
    fn deref(&self) -> &Self::Target {
        &self.watchdog
    }
}

pub fn lock() -> MutexGuard<'static, ()> {
    FACILITY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn install() -> Harness {
    let lock = lock();
    let watchdog = Watchdog::install().expect("SIGALRM facility should be free");
    Harness {
        watchdog,
        _lock: lock,
    }
}

/// Sleep outside of any scope for long enough that a dangling alarm would
/// have fired; returns the checkpoint result afterwards.
pub fn settle(watchdog: &Watchdog, duration: Duration) -> alarma::Result<()> {
    watchdog.sleep(duration)?;
    watchdog.checkpoint()
}

pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}
