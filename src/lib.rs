//! In-process execution time limits.
//!
//! Wrap a block or a function in a time budget; when the budget runs out the
//! block is interrupted and a failure of your choosing is returned. Budgets
//! nest, and a [`Quota`] can be spent across many separate scopes.
//!
//! ```no_run
//! use std::time::Duration;
//! use alarma::{Error, Watchdog};
//!
//! #[derive(Debug, Clone, thiserror::Error)]
//! #[error("outer budget exhausted")]
//! struct Outer;
//!
//! let watchdog = Watchdog::install()?;
//! let result = watchdog.timeout(1.0).failure(Outer).run(|| {
//!     watchdog.sleep(Duration::from_secs(2))
//! });
//! assert!(matches!(result, Err(e) if e.is_expired_with::<Outer>()));
//! # Ok::<(), Error>(())
//! ```
//!
//! # Interruption
//!
//! A POSIX timer delivers SIGALRM to the thread that installed the
//! [`Watchdog`]. The handler only records the notification; the expiry is
//! raised on that thread at the next interruption point:
//! - [`Watchdog::checkpoint`], which CPU-bound loops should call regularly
//! - [`Watchdog::sleep`] and [`Watchdog::read`], whose syscalls the alarm
//!   cuts short
//! - entry to, completion of and exit from a [`Timeout::run`] block
//!
//! Code that neither checkpoints nor blocks in these wrappers runs to the
//! end of its block and then reports the overrun.
//!
//! Linux only: the timer targets the control thread with `SIGEV_THREAD_ID`.

pub mod budget;
pub mod config;
pub mod error;
pub mod hooks;
pub mod observability;
pub mod scope;
pub mod timer;
pub mod watchdog;

pub use budget::{Budget, Quota};
pub use config::AlarmaConfig;
pub use error::{Error, Expired, Result, TimedOut};
pub use hooks::RequestWatchdog;
pub use scope::{ScopeGuard, Timeout};
pub use watchdog::Watchdog;
