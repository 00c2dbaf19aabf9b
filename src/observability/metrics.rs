//! Metrics collection.
//!
//! # Metrics
//! - `alarma_scopes_total` (counter): scopes entered, by `kind`
//!   (`armed`, `covered`, `exhausted`)
//! - `alarma_expirations_total` (counter): timeouts that fired
//! - `alarma_chained_expirations_total` (counter): enclosing deadlines that
//!   had already passed when an inner one fired
//! - `alarma_stale_notifications_total` (counter): notifications ignored
//!   because nothing had expired
//! - `alarma_hooks_disabled_total` (counter): request hooks that disabled
//!   themselves, by `reason`
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; the host installs a recorder
//! - Never called from the signal handler
//! - A process-wide switch (`observability.metrics_enabled`) turns every
//!   helper into a no-op

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn metric recording on or off for the whole process.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn record_scope_entered(kind: &'static str) {
    if !is_enabled() {
        return;
    }
    counter!("alarma_scopes_total", "kind" => kind).increment(1);
}

pub fn record_expiration(chained: usize) {
    if !is_enabled() {
        return;
    }
    counter!("alarma_expirations_total").increment(1);
    if chained > 0 {
        counter!("alarma_chained_expirations_total").increment(chained as u64);
    }
}

pub fn record_stale_notification() {
    if !is_enabled() {
        return;
    }
    counter!("alarma_stale_notifications_total").increment(1);
}

pub fn record_hook_disabled(reason: &'static str) {
    if !is_enabled() {
        return;
    }
    counter!("alarma_hooks_disabled_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_toggles_recording() {
        set_enabled(false);
        assert!(!is_enabled());
        // Helpers are no-ops while disabled.
        record_scope_entered("armed");
        record_expiration(2);
        set_enabled(true);
        assert!(is_enabled());
        record_stale_notification();
    }
}
