//! The owned handle to the process timeout facility.
//!
//! # Responsibilities
//! - Claim the countdown facility once and record the control thread
//! - Reject every mutating call made from any other thread
//! - Turn pending timer notifications into expiry failures at checkpoints
//!
//! # Design Decisions
//! - Explicit handle instead of hidden global state; clones share one stack
//! - Thread identity is checked before any state is touched
//! - Interruption is cooperative: a fired timer is acted on at the next
//!   `checkpoint`, or immediately by the blocking wrappers in `blocking.rs`,
//!   whose syscalls the alarm cuts short with `EINTR`

pub mod blocking;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::budget::Budget;
use crate::error::{Error, Result};
use crate::scope::Timeout;
use crate::timer::{Countdown, PosixCountdown, TimerStack};

struct Inner {
    owner: ThreadId,
    stack: Mutex<TimerStack>,
}

/// Handle to the timer stack owned by one control thread.
///
/// The handle is `Send + Sync` so it can be stored anywhere, but only the
/// thread that created it may open scopes, run checkpoints or call the
/// blocking wrappers. Dropping the last clone releases the facility.
#[derive(Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

impl Watchdog {
    /// Claim SIGALRM and make the calling thread the control thread.
    ///
    /// Fails with [`Error::AlreadyInUse`] when another watchdog is alive or
    /// some other code installed a SIGALRM handler.
    pub fn install() -> Result<Self> {
        let countdown = PosixCountdown::install()?;
        tracing::info!(thread = ?thread::current().id(), "Watchdog installed");
        Ok(Self::with_countdown(Box::new(countdown)))
    }

    /// Build a watchdog over a custom countdown, owned by the calling thread.
    pub fn with_countdown(countdown: Box<dyn Countdown>) -> Self {
        Self {
            inner: Arc::new(Inner {
                owner: thread::current().id(),
                stack: Mutex::new(TimerStack::new(countdown)),
            }),
        }
    }

    /// Start building a timeout scope with the given budget.
    pub fn timeout(&self, budget: impl Into<Budget>) -> Timeout {
        Timeout::new(self.clone(), budget.into())
    }

    /// The thread allowed to use this watchdog.
    pub fn control_thread(&self) -> ThreadId {
        self.inner.owner
    }

    pub fn is_control_thread(&self) -> bool {
        thread::current().id() == self.inner.owner
    }

    /// Number of deadlines currently on the stack.
    pub fn depth(&self) -> usize {
        self.with_stack(|stack| stack.depth())
    }

    /// Whether the countdown is armed right now.
    ///
    /// An OS error reading the timer is logged and reported as not armed.
    pub fn armed(&self) -> bool {
        match self.with_stack(|stack| stack.is_armed()) {
            Ok(armed) => armed,
            Err(e) => {
                tracing::warn!(error = %e, "Unable to read the countdown timer");
                false
            }
        }
    }

    /// Act on a pending timer notification.
    ///
    /// Returns the expiry failure of the scope whose deadline passed, or
    /// `Ok(())` when nothing has expired. CPU-bound code should call this
    /// regularly; it is cheap when no notification is pending.
    pub fn checkpoint(&self) -> Result<()> {
        self.ensure_control_thread()?;
        match self.with_stack(|stack| stack.poll())? {
            Some(expired) => Err(Error::Expired(expired)),
            None => Ok(()),
        }
    }

    pub(crate) fn ensure_control_thread(&self) -> Result<()> {
        if self.is_control_thread() {
            Ok(())
        } else {
            Err(Error::WrongThread)
        }
    }

    pub(crate) fn with_stack<R>(&self, f: impl FnOnce(&mut TimerStack) -> R) -> R {
        let mut stack = self.inner.stack.lock().expect("timer stack mutex poisoned");
        f(&mut stack)
    }
}

impl fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchdog")
            .field("owner", &self.inner.owner)
            .field("depth", &self.depth())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        tracing::info!(thread = ?self.owner, "Watchdog released");
    }
}
