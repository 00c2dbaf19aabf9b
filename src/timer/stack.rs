//! Nested deadlines multiplexed onto one countdown.
//!
//! # State Transitions
//! ```text
//! empty ──push──▶ armed(top)
//! armed(top) ──push (tighter)──▶ armed(new top)
//! armed(top) ──push (not tighter)──▶ armed(top)      covered by the outer deadline
//! armed(top) ──pop / fire──▶ armed(next) | empty     re-armed for what next has left
//! ```
//!
//! # Invariants
//! - When armed, the countdown is armed for the top entry's remaining time
//! - An entry whose deadline is not strictly sooner than the current arm is
//!   never pushed; the outer entry's failure covers it
//! - Firing pops every entry whose deadline has already passed and reports the
//!   outermost of them

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{BoxFailure, Error, Expired, Result};
use crate::observability::metrics;
use crate::timer::countdown::Countdown;

/// Longest delay a single entry is granted; longer budgets are clamped.
pub const MAX_DELAY: Duration = Duration::from_secs(i32::MAX as u64);

/// Identifies a pushed entry so its scope can pop it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

struct Entry {
    id: EntryId,
    expiration: Instant,
    granted: Duration,
    failure: BoxFailure,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("expiration", &self.expiration)
            .field("granted", &self.granted)
            .field("failure", &self.failure.to_string())
            .finish()
    }
}

/// Stack of active deadlines sharing a single countdown.
#[derive(Debug)]
pub struct TimerStack {
    entries: Vec<Entry>,
    countdown: Box<dyn Countdown>,
    next_id: u64,
}

impl TimerStack {
    pub fn new(countdown: Box<dyn Countdown>) -> Self {
        Self {
            entries: Vec::new(),
            countdown,
            next_id: 0,
        }
    }

    /// Number of pushed entries.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Whether the countdown is currently armed.
    pub fn is_armed(&self) -> Result<bool> {
        Ok(self.countdown.remaining()?.is_some())
    }

    /// Whether `id` is still on the stack (it has neither fired nor popped).
    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Register a deadline `seconds` from now.
    ///
    /// Returns the new entry's id, or `None` when the current arm already
    /// fires no later than the requested deadline. A non-positive `seconds`
    /// pushes an already-expired entry and notifies immediately.
    pub fn push(&mut self, seconds: f64, failure: BoxFailure) -> Result<Option<EntryId>> {
        let now = Instant::now();

        if seconds.is_nan() || seconds <= 0.0 {
            let id = self.insert(now, Duration::ZERO, failure);
            self.countdown.notify();
            tracing::debug!(depth = self.entries.len(), "Budget exhausted on entry; firing immediately");
            metrics::record_scope_entered("exhausted");
            return Ok(Some(id));
        }

        if !seconds.is_finite() {
            return Err(Error::InvalidArgument(format!("timeout must be finite, got {seconds}")));
        }
        let granted = if seconds >= MAX_DELAY.as_secs_f64() {
            tracing::debug!(requested_secs = seconds, "Clamping timeout to the longest supported delay");
            MAX_DELAY
        } else {
            Duration::from_secs_f64(seconds)
        };

        if !self.entries.is_empty() {
            let outer = self.countdown.remaining()?.unwrap_or(Duration::ZERO);
            if outer <= granted {
                tracing::trace!(
                    requested_secs = seconds,
                    outer_secs = outer.as_secs_f64(),
                    "Deadline covered by outer timeout"
                );
                metrics::record_scope_entered("covered");
                return Ok(None);
            }
        }

        let expiration = now.checked_add(granted).ok_or_else(|| {
            Error::InvalidArgument(format!("timeout of {seconds}s overflows the clock"))
        })?;
        let id = self.insert(expiration, granted, failure);
        if let Err(e) = self.countdown.arm(granted) {
            self.entries.pop();
            return Err(e);
        }
        tracing::trace!(depth = self.entries.len(), granted_secs = seconds, "Timeout armed");
        metrics::record_scope_entered("armed");
        Ok(Some(id))
    }

    fn insert(&mut self, expiration: Instant, granted: Duration, failure: BoxFailure) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            expiration,
            granted,
            failure,
        });
        id
    }

    /// Remove the entry `id` on normal scope exit and re-arm for its parent.
    ///
    /// Popping an entry that already fired is a no-op. If the parent's
    /// deadline passed while the child ran, a notification is raised so the
    /// parent fires at the next checkpoint.
    pub fn pop(&mut self, id: EntryId) -> Result<()> {
        let Some(position) = self.entries.iter().position(|entry| entry.id == id) else {
            return Ok(());
        };
        self.entries.remove(position);
        tracing::trace!(depth = self.entries.len(), "Timeout released");
        self.rearm(Instant::now())
    }

    /// Consume a pending notification and run the firing procedure for it.
    pub fn poll(&mut self) -> Result<Option<Expired>> {
        if !self.countdown.take_notification() {
            return Ok(None);
        }
        self.fire()
    }

    /// The firing procedure.
    ///
    /// Pops the top entry if its deadline has passed, then keeps popping while
    /// the next entry has expired too. The failure of the last entry popped is
    /// returned and the countdown is re-armed for whatever is left. A
    /// notification with nothing expired is ignored.
    pub fn fire(&mut self) -> Result<Option<Expired>> {
        let now = Instant::now();

        let expired = matches!(self.entries.last(), Some(top) if top.expiration <= now);
        if !expired {
            tracing::trace!(depth = self.entries.len(), "Ignoring stale timer notification");
            metrics::record_stale_notification();
            self.rearm(now)?;
            return Ok(None);
        }

        let Some(mut fired) = self.entries.pop() else {
            return Ok(None);
        };
        let mut chained = 0usize;
        while matches!(self.entries.last(), Some(next) if next.expiration <= now) {
            if let Some(outer) = self.entries.pop() {
                fired = outer;
                chained += 1;
            }
        }

        if let Err(e) = self.rearm(now) {
            tracing::error!(error = %e, "Failed to re-arm countdown after expiry");
        }

        tracing::debug!(
            depth = self.entries.len(),
            chained,
            granted_secs = fired.granted.as_secs_f64(),
            failure = %fired.failure,
            "Timeout expired"
        );
        metrics::record_expiration(chained);
        Ok(Some(Expired::new(fired.failure, fired.granted)))
    }

    /// Point the countdown at the current top entry, or disarm when empty.
    fn rearm(&mut self, now: Instant) -> Result<()> {
        match self.entries.last() {
            None => self.countdown.disarm(),
            Some(top) => {
                let left = top.expiration.saturating_duration_since(now);
                if left.is_zero() {
                    self.countdown.notify();
                    Ok(())
                } else {
                    self.countdown.arm(left)
                }
            }
        }
    }
}
