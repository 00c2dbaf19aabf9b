//! Error types surfaced by the timeout engine.
//!
//! # Error Kinds
//! - `InvalidArgument`: non-positive or non-finite duration
//! - `WrongThread`: a mutating call made off the control thread
//! - `AlreadyInUse`: the SIGALRM facility is owned by someone else
//! - `Expired`: a scope's budget ran out; carries the caller's failure value
//! - `Sys`: the OS refused a timer or syscall operation
//!
//! # Design Decisions
//! - Expiry failures are type-erased so nested scopes with different failure
//!   types can propagate through each other with `?`
//! - Callers recover their own failure type with `Expired::is` / `downcast_ref`

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use nix::errno::Errno;

/// Boxed failure value stored on the timer stack until it fires.
pub type BoxFailure = Box<dyn StdError + Send + Sync + 'static>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by watchdogs, scopes and quotas.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("timeouts can only be used from the thread that installed the watchdog")]
    WrongThread,

    #[error("the process alarm handler is already in use")]
    AlreadyInUse,

    #[error(transparent)]
    Expired(#[from] Expired),

    #[error("countdown facility error: {0}")]
    Sys(#[from] Errno),
}

impl Error {
    /// True when this error is an expiry whose failure is of type `F`.
    pub fn is_expired_with<F: StdError + 'static>(&self) -> bool {
        matches!(self, Error::Expired(expired) if expired.is::<F>())
    }

    /// Borrow the expiry, if this error is one.
    pub fn as_expired(&self) -> Option<&Expired> {
        match self {
            Error::Expired(expired) => Some(expired),
            _ => None,
        }
    }
}

/// A scope's time budget ran out.
///
/// Wraps the failure value supplied when the scope was created, together
/// with the budget that was granted to the entry that fired.
#[derive(Debug)]
pub struct Expired {
    failure: BoxFailure,
    granted: Duration,
}

impl Expired {
    pub(crate) fn new(failure: BoxFailure, granted: Duration) -> Self {
        Self { failure, granted }
    }

    /// Budget granted to the scope whose deadline passed.
    pub fn granted(&self) -> Duration {
        self.granted
    }

    /// True when the failure value is an `F`.
    pub fn is<F: StdError + 'static>(&self) -> bool {
        self.failure.is::<F>()
    }

    /// Borrow the failure value as an `F`.
    pub fn downcast_ref<F: StdError + 'static>(&self) -> Option<&F> {
        self.failure.downcast_ref::<F>()
    }

    /// Take ownership of the failure value.
    pub fn into_failure(self) -> BoxFailure {
        self.failure
    }
}

impl fmt::Display for Expired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (budget {:.3}s)", self.failure, self.granted.as_secs_f64())
    }
}

impl StdError for Expired {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.failure.as_ref())
    }
}

/// Default failure raised when a scope was given no explicit failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, thiserror::Error)]
#[error("execution timed out")]
pub struct TimedOut;
