//! Time budgets accepted by timeout scopes.
//!
//! # Data Flow
//! ```text
//! f64 seconds / Duration ──┐
//!                          ├─▶ Budget ──▶ scope enter ──▶ timer stack push
//! Quota (shared handle) ───┘
//! ```
//!
//! # Design Decisions
//! - Plain durations are validated on scope entry, before any stack mutation
//! - A quota is charged for the whole lifetime of the scope, even when the
//!   scope runs under a parent's deadline

pub mod quota;

pub use quota::Quota;

use std::time::Duration;

use crate::error::{Error, Result};

/// The budget of a single timeout scope.
#[derive(Debug, Clone)]
pub enum Budget {
    /// A fixed number of seconds.
    Seconds(f64),
    /// Whatever is left of a shared quota when the scope is entered.
    Quota(Quota),
}

impl Budget {
    /// Reject plain durations that are not strictly positive.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Budget::Seconds(secs) if secs.is_nan() || *secs <= 0.0 => Err(
                Error::InvalidArgument(format!("timeout must be greater than 0 seconds, got {secs}")),
            ),
            Budget::Seconds(secs) if !secs.is_finite() => Err(Error::InvalidArgument(format!(
                "timeout must be finite, got {secs}"
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn quota(&self) -> Option<&Quota> {
        match self {
            Budget::Quota(quota) => Some(quota),
            Budget::Seconds(_) => None,
        }
    }
}

impl From<f64> for Budget {
    fn from(secs: f64) -> Self {
        Budget::Seconds(secs)
    }
}

impl From<Duration> for Budget {
    fn from(duration: Duration) -> Self {
        Budget::Seconds(duration.as_secs_f64())
    }
}

impl From<Quota> for Budget {
    fn from(quota: Quota) -> Self {
        Budget::Quota(quota)
    }
}

impl From<&Quota> for Budget {
    fn from(quota: &Quota) -> Self {
        Budget::Quota(quota.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Budget::from(0.5).validate().is_ok());
        assert!(Budget::from(Duration::from_millis(10)).validate().is_ok());
        assert!(matches!(Budget::from(0.0).validate(), Err(Error::InvalidArgument(_))));
        assert!(matches!(Budget::from(-1.0).validate(), Err(Error::InvalidArgument(_))));
        assert!(matches!(Budget::from(f64::NAN).validate(), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            Budget::from(f64::INFINITY).validate(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Budget::from(Duration::ZERO).validate(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_exhausted_quota_is_still_valid() {
        let quota = Quota::new(0.001).unwrap();
        quota.start().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        quota.stop().unwrap();
        let budget = Budget::from(&quota);
        assert!(budget.validate().is_ok());
        assert!(budget.quota().is_some());
    }
}
