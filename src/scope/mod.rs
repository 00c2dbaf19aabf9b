//! Timeout scopes, the public entry point.
//!
//! # Forms
//! - Block: `watchdog.timeout(0.5).run(|| ...)`
//! - Guard: `let guard = watchdog.timeout(0.5).enter()?;` (exit on drop)
//! - Decorator: `watchdog.timeout(0.5).wrap(f)` runs every call of `f` in a
//!   fresh scope
//!
//! All three go through the same `enter` / release pair, so cleanup (stack
//! pop, countdown re-arm or disarm, quota stop) happens on every exit path.
//!
//! # Design Decisions
//! - Validation and the thread check run before any state is touched
//! - The block form checks for expiry on entry, after the body and after exit
//!   so overruns are reported even when the body has no checkpoints
//! - A failure is stored as a factory so one `Timeout` can be entered many
//!   times

use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::budget::{Budget, Quota};
use crate::error::{BoxFailure, Error, Result, TimedOut};
use crate::timer::EntryId;
use crate::watchdog::Watchdog;

type FailureFactory = Arc<dyn Fn() -> BoxFailure + Send + Sync>;

/// A configured, reusable timeout scope.
#[derive(Clone)]
pub struct Timeout {
    watchdog: Watchdog,
    budget: Budget,
    failure: FailureFactory,
}

impl Timeout {
    pub(crate) fn new(watchdog: Watchdog, budget: Budget) -> Self {
        Self {
            watchdog,
            budget,
            failure: Arc::new(|| Box::new(TimedOut) as BoxFailure),
        }
    }

    /// Raise `failure` instead of [`TimedOut`] when this scope expires.
    pub fn failure<F>(mut self, failure: F) -> Self
    where
        F: StdError + Clone + Send + Sync + 'static,
    {
        self.failure = Arc::new(move || Box::new(failure.clone()) as BoxFailure);
        self
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Open the scope and return a guard that closes it when dropped.
    pub fn enter(&self) -> Result<ScopeGuard> {
        self.watchdog.ensure_control_thread()?;
        self.budget.validate()?;

        let quota = self.budget.quota().cloned();
        let seconds = match &self.budget {
            Budget::Seconds(secs) => *secs,
            Budget::Quota(quota) => {
                quota.start()?;
                quota.remaining().as_secs_f64()
            }
        };

        let failure = (self.failure)();
        let depth = self.watchdog.depth();
        let entry = match self.watchdog.with_stack(|stack| stack.push(seconds, failure)) {
            Ok(entry) => entry,
            Err(e) => {
                if let Some(Err(stop)) = quota.as_ref().map(Quota::stop) {
                    tracing::error!(error = %stop, "Failed to stop quota after a rejected scope");
                }
                return Err(e);
            }
        };

        Ok(ScopeGuard {
            watchdog: self.watchdog.clone(),
            entry,
            quota,
            depth,
            active: true,
            _control_thread: PhantomData,
        })
    }

    /// Run `body` inside the scope.
    ///
    /// Errors from the body pass through unchanged. An expiry surfaces as
    /// [`Error::Expired`] converted into `E`.
    pub fn run<T, E, B>(&self, body: B) -> std::result::Result<T, E>
    where
        B: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let guard = self.enter()?;
        let outcome = guard
            .checkpoint()
            .map_err(E::from)
            .and_then(|()| body())
            .and_then(|value| guard.checkpoint().map(|()| value).map_err(E::from));

        match outcome {
            Ok(value) => {
                guard.exit()?;
                Ok(value)
            }
            Err(e) => {
                // Any pending parent expiry is left for the parent to raise.
                drop(guard);
                Err(e)
            }
        }
    }

    /// Decorator form: wrap `f` so every call runs in a fresh scope.
    pub fn wrap<A, T, E, F>(self, mut f: F) -> impl FnMut(A) -> std::result::Result<T, E>
    where
        F: FnMut(A) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        move |arg| self.run(|| f(arg))
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("budget", &self.budget)
            .field("failure", &(self.failure)().to_string())
            .finish()
    }
}

/// An open timeout scope.
///
/// Dropping the guard closes the scope. Use [`ScopeGuard::exit`] to also
/// learn whether an enclosing scope expired while this one was open.
#[must_use = "the scope closes as soon as the guard is dropped"]
pub struct ScopeGuard {
    watchdog: Watchdog,
    entry: Option<EntryId>,
    quota: Option<Quota>,
    depth: usize,
    active: bool,
    // Scopes must close on the thread that opened them.
    _control_thread: PhantomData<*const ()>,
}

impl ScopeGuard {
    /// Whether this scope armed its own deadline, as opposed to running under
    /// an enclosing deadline that fires no later.
    pub fn is_armed(&self) -> bool {
        self.entry.is_some()
    }

    /// Stack depth when the scope was entered.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.watchdog.checkpoint()
    }

    /// Close the scope, then report a pending expiry of an enclosing scope.
    pub fn exit(mut self) -> Result<()> {
        self.release()?;
        self.watchdog.checkpoint()
    }

    fn release(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        let popped = match self.entry.take() {
            Some(id) => self.watchdog.with_stack(|stack| stack.pop(id)),
            None => Ok(()),
        };
        let stopped = match self.quota.take() {
            Some(quota) => quota.stop(),
            None => Ok(()),
        };
        popped.and(stopped)
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("entry", &self.entry)
            .field("depth", &self.depth)
            .field("active", &self.active)
            .finish()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::error!(error = %e, "Failed to release timeout scope");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::countdown::exclusive;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, thiserror::Error)]
    #[error("slow")]
    struct Slow;

    #[test]
    fn test_guard_exit_disarms() {
        let _lock = exclusive();
        let watchdog = Watchdog::install().unwrap();
        let guard = watchdog.timeout(1.0).enter().unwrap();
        assert!(guard.is_armed());
        assert_eq!(guard.depth(), 0);
        assert_eq!(watchdog.depth(), 1);
        assert!(watchdog.armed());

        guard.exit().unwrap();
        assert_eq!(watchdog.depth(), 0);
        assert!(!watchdog.armed());
    }

    #[test]
    fn test_guard_drop_disarms() {
        let _lock = exclusive();
        let watchdog = Watchdog::install().unwrap();
        {
            let _guard = watchdog.timeout(1.0).enter().unwrap();
            assert!(watchdog.armed());
        }
        assert_eq!(watchdog.depth(), 0);
        assert!(!watchdog.armed());
    }

    #[test]
    fn test_overrun_without_checkpoints_is_reported() {
        let _lock = exclusive();
        let watchdog = Watchdog::install().unwrap();
        let result: Result<()> = watchdog.timeout(0.05).failure(Slow).run(|| {
            thread::sleep(Duration::from_millis(100));
            Ok(())
        });
        assert!(matches!(result, Err(e) if e.is_expired_with::<Slow>()));
        assert_eq!(watchdog.depth(), 0);
    }

    #[test]
    fn test_invalid_budget_leaves_stack_untouched() {
        let _lock = exclusive();
        let watchdog = Watchdog::install().unwrap();
        assert!(matches!(
            watchdog.timeout(0.0).enter(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            watchdog.timeout(-1.0).run(|| Ok::<_, Error>(())),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(watchdog.depth(), 0);
        assert!(!watchdog.armed());
    }

    #[test]
    fn test_quota_is_stopped_on_every_path() {
        let _lock = exclusive();
        let watchdog = Watchdog::install().unwrap();
        let quota = Quota::new(1.0).unwrap();

        let result: std::result::Result<(), Error> = watchdog
            .timeout(&quota)
            .run(|| Err(Error::InvalidArgument("body failed".into())));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(!quota.running());

        let guard = watchdog.timeout(&quota).enter().unwrap();
        assert!(quota.running());
        drop(guard);
        assert!(!quota.running());
    }

    #[test]
    fn test_quota_owned_by_other_thread_is_rejected() {
        let _lock = exclusive();
        let watchdog = Watchdog::install().unwrap();
        let quota = Quota::new(1.0).unwrap();
        let remote = quota.clone();
        thread::spawn(move || {
            remote.start().unwrap();
            remote.stop().unwrap();
        })
        .join()
        .unwrap();

        let result = watchdog.timeout(&quota).run(|| Ok::<_, Error>(()));
        assert!(matches!(result, Err(Error::WrongThread)));
        assert_eq!(watchdog.depth(), 0);
        assert!(!watchdog.armed());
        assert!(!quota.running());
    }

    #[test]
    fn test_wrap_runs_each_call_in_fresh_scope() {
        let _lock = exclusive();
        let watchdog = Watchdog::install().unwrap();
        let inner = watchdog.clone();
        let mut nap = watchdog
            .timeout(0.1)
            .failure(Slow)
            .wrap(move |millis: u64| inner.sleep(Duration::from_millis(millis)));

        assert!(nap(10).is_ok());
        assert!(matches!(nap(500), Err(e) if e.is_expired_with::<Slow>()));
        assert!(nap(10).is_ok());
        assert_eq!(watchdog.depth(), 0);
    }
}
