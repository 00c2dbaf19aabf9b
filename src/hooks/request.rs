//! Pre/post request hooks.
//!
//! Wraps each unit of work in a timeout scope for hosts that expose request
//! lifecycle callbacks. If the alarm facility is already owned elsewhere the
//! hooks disable themselves with a warning instead of failing the host.

use std::fmt;

use crate::config::HookConfig;
use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::scope::ScopeGuard;
use crate::watchdog::Watchdog;

/// Lifecycle of the hook pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    /// The facility has not been claimed yet.
    Uninitialized,
    /// Requests run under a timeout.
    Enabled,
    /// Requests run unguarded.
    Disabled,
}

/// Failure raised when a request overruns its budget.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("request interrupted after {timeout_secs}s")]
pub struct RequestInterrupted {
    pub timeout_secs: f64,
}

/// Request watchdog driven by host pre/post callbacks.
pub struct RequestWatchdog {
    config: HookConfig,
    state: HookState,
    watchdog: Option<Watchdog>,
    active: Option<ScopeGuard>,
}

impl RequestWatchdog {
    /// Create the hooks; the facility is claimed on the first request.
    pub fn new(config: HookConfig) -> Self {
        let state = if config.enabled {
            HookState::Uninitialized
        } else {
            tracing::info!("Request watchdog disabled by configuration");
            HookState::Disabled
        };
        Self {
            config,
            state,
            watchdog: None,
            active: None,
        }
    }

    /// Create the hooks on top of a watchdog the host already installed.
    pub fn with_watchdog(config: HookConfig, watchdog: Watchdog) -> Self {
        let mut hooks = Self::new(config);
        hooks.watchdog = Some(watchdog);
        hooks
    }

    pub fn state(&self) -> HookState {
        self.state
    }

    /// The watchdog requests run under, once enabled.
    pub fn watchdog(&self) -> Option<&Watchdog> {
        match self.state {
            HookState::Enabled => self.watchdog.as_ref(),
            _ => None,
        }
    }

    /// Whether a request is currently open.
    pub fn in_request(&self) -> bool {
        self.active.is_some()
    }

    /// Open a request scope.
    ///
    /// Claims the facility on first use. A conflict with another alarm owner
    /// disables the hooks instead of returning an error.
    pub fn pre_request(&mut self) -> Result<()> {
        if self.state == HookState::Uninitialized {
            self.initialize();
        }
        if self.state != HookState::Enabled {
            return Ok(());
        }
        let Some(watchdog) = self.watchdog.as_ref() else {
            return Ok(());
        };

        if self.active.take().is_some() {
            tracing::warn!("Previous request was never finished; releasing its timeout");
        }

        let timeout_secs = self.config.request_timeout_secs;
        let guard = watchdog
            .timeout(timeout_secs)
            .failure(RequestInterrupted { timeout_secs })
            .enter()?;
        self.active = Some(guard);
        Ok(())
    }

    /// Close the request scope opened by [`pre_request`](Self::pre_request).
    pub fn post_request(&mut self) -> Result<()> {
        match self.active.take() {
            Some(guard) => guard.exit(),
            None => Ok(()),
        }
    }

    /// Run `request` between the two hooks; `post_request` always runs.
    ///
    /// The closure receives the watchdog when the hooks are enabled so the
    /// request can call checkpoints and the blocking wrappers.
    pub fn handle<T, E, F>(&mut self, request: F) -> std::result::Result<T, E>
    where
        F: FnOnce(Option<&Watchdog>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.pre_request()?;
        let watchdog = self.watchdog().cloned();
        let outcome = request(watchdog.as_ref());
        let finished = self.post_request();

        match (outcome, finished) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(post)) => {
                tracing::debug!(error = %post, "Request failed; ignoring post_request error");
                Err(e)
            }
        }
    }

    /// Checkpoint the current request; a no-op when disabled.
    pub fn checkpoint(&self) -> Result<()> {
        match self.watchdog() {
            Some(watchdog) => watchdog.checkpoint(),
            None => Ok(()),
        }
    }

    fn initialize(&mut self) {
        match &self.watchdog {
            Some(watchdog) if !watchdog.is_control_thread() => {
                tracing::error!("Request watchdog used off its control thread; disabling");
                metrics::record_hook_disabled("wrong_thread");
                self.state = HookState::Disabled;
            }
            Some(_) => self.state = HookState::Enabled,
            None => match Watchdog::install() {
                Ok(watchdog) => {
                    tracing::info!(
                        request_timeout_secs = self.config.request_timeout_secs,
                        "Request watchdog enabled"
                    );
                    self.watchdog = Some(watchdog);
                    self.state = HookState::Enabled;
                }
                Err(Error::AlreadyInUse) => {
                    tracing::warn!("Your process alarm handler is already in use! Disabling request watchdog");
                    metrics::record_hook_disabled("already_in_use");
                    self.state = HookState::Disabled;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Unable to register SIGALRM handler; request watchdog disabled");
                    metrics::record_hook_disabled("registration_failed");
                    self.state = HookState::Disabled;
                }
            },
        }
    }
}

impl fmt::Debug for RequestWatchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestWatchdog")
            .field("state", &self.state)
            .field("request_timeout_secs", &self.config.request_timeout_secs)
            .field("in_request", &self.in_request())
            .finish()
    }
}
