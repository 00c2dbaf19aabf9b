//! Reusable, pausable time budgets.
//!
//! # Responsibilities
//! - Track an allowance consumed across discontiguous usages
//! - Report the time left at any moment, running or not
//! - Support reentrant start/stop so nested scopes can share one quota
//!
//! # Design Decisions
//! - Only the outermost start/stop pair measures wall time
//! - The allowance is only authoritative while stopped; while running the
//!   elapsed time is subtracted on read
//! - Handles are cheap clones over shared state
//! - The first thread to start a quota owns it; starting or stopping it from
//!   any other thread fails with `WrongThread` and leaves it untouched

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug)]
struct QuotaState {
    /// Time left when not running.
    allowance: Duration,
    /// Number of unbalanced `start` calls.
    depth: usize,
    /// Start of the outermost running period.
    running_since: Option<Instant>,
    /// Thread that first started the quota.
    owner: Option<ThreadId>,
}

impl QuotaState {
    fn claim(&mut self) -> Result<()> {
        let current = thread::current().id();
        match self.owner {
            Some(owner) if owner != current => Err(Error::WrongThread),
            Some(_) => Ok(()),
            None => {
                self.owner = Some(current);
                Ok(())
            }
        }
    }

    fn remaining_at(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self
                .allowance
                .saturating_sub(now.saturating_duration_since(since)),
            None => self.allowance,
        }
    }
}

/// A time budget that can be spent across several timeout scopes.
#[derive(Debug, Clone)]
pub struct Quota {
    state: Arc<Mutex<QuotaState>>,
}

impl Quota {
    /// Create a quota holding `seconds` of allowance.
    ///
    /// Fails with [`Error::InvalidArgument`] unless `seconds` is finite and
    /// strictly positive. Allowances beyond [`Duration::MAX`] saturate.
    pub fn new(seconds: f64) -> Result<Self> {
        if seconds.is_nan() || seconds <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "quota must be greater than 0 seconds, got {seconds}"
            )));
        }
        if !seconds.is_finite() {
            return Err(Error::InvalidArgument(format!("quota must be finite, got {seconds}")));
        }
        let allowance = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        Ok(Self::with_allowance(allowance))
    }

    /// Create a quota from a [`Duration`]; zero is rejected.
    pub fn from_duration(allowance: Duration) -> Result<Self> {
        if allowance.is_zero() {
            return Err(Error::InvalidArgument(
                "quota must be greater than 0 seconds".to_string(),
            ));
        }
        Ok(Self::with_allowance(allowance))
    }

    fn with_allowance(allowance: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QuotaState {
                allowance,
                depth: 0,
                running_since: None,
                owner: None,
            })),
        }
    }

    /// Begin (or re-enter) a consumption period.
    ///
    /// Fails with [`Error::WrongThread`] when another thread owns the quota.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock().expect("quota mutex poisoned");
        state.claim()?;
        if state.depth == 0 {
            state.running_since = Some(Instant::now());
        }
        state.depth += 1;
        Ok(())
    }

    /// End a consumption period, committing elapsed time once the outermost
    /// period closes.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().expect("quota mutex poisoned");
        state.claim()?;
        if state.depth == 0 {
            tracing::warn!("Quota stopped without a matching start; ignoring");
            return Ok(());
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.allowance = state.remaining_at(Instant::now());
            state.running_since = None;
        }
        Ok(())
    }

    /// Time left in the budget. Never negative.
    pub fn remaining(&self) -> Duration {
        let state = self.state.lock().expect("quota mutex poisoned");
        state.remaining_at(Instant::now())
    }

    /// True while at least one consumption period is open.
    pub fn running(&self) -> bool {
        self.state.lock().expect("quota mutex poisoned").depth > 0
    }
}
