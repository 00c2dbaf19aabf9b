//! Request lifecycle hooks.

use alarma::config::HookConfig;
use alarma::hooks::{HookState, RequestInterrupted, RequestWatchdog};
use alarma::{Error, Watchdog};

mod common;

use common::secs;

fn config(request_timeout_secs: f64) -> HookConfig {
    HookConfig {
        enabled: true,
        request_timeout_secs,
    }
}

#[test]
fn test_hooks_enable_on_first_request() {
    let _lock = common::lock();
    let mut hooks = RequestWatchdog::new(config(1.0));
    assert_eq!(hooks.state(), HookState::Uninitialized);

    hooks.pre_request().unwrap();
    assert_eq!(hooks.state(), HookState::Enabled);
    assert!(hooks.in_request());
    assert_eq!(hooks.watchdog().map(Watchdog::depth), Some(1));

    hooks.post_request().unwrap();
    assert!(!hooks.in_request());
    assert_eq!(hooks.watchdog().map(Watchdog::depth), Some(0));
}

#[test]
fn test_request_is_interrupted() {
    let _lock = common::lock();
    let mut hooks = RequestWatchdog::new(config(0.3));

    let result = hooks.handle(|watchdog| -> alarma::Result<()> {
        let watchdog = watchdog.ok_or(Error::AlreadyInUse)?;
        watchdog.sleep(secs(2.0))
    });

    let err = result.unwrap_err();
    let expired = err.as_expired().expect("request should have expired");
    assert_eq!(
        expired.downcast_ref::<RequestInterrupted>(),
        Some(&RequestInterrupted { timeout_secs: 0.3 })
    );
    assert!(!hooks.in_request());

    // The next request gets a fresh budget.
    let value = hooks
        .handle(|watchdog| -> alarma::Result<u32> {
            if let Some(watchdog) = watchdog {
                watchdog.sleep(secs(0.05))?;
            }
            Ok(1)
        })
        .unwrap();
    assert_eq!(value, 1);
}

#[test]
fn test_hook_checkpoint_reports_expiry() {
    let _lock = common::lock();
    let mut hooks = RequestWatchdog::new(config(0.1));

    hooks.pre_request().unwrap();
    std::thread::sleep(secs(0.3));
    let result = hooks.checkpoint();
    hooks.post_request().unwrap();

    assert!(matches!(result, Err(e) if e.is_expired_with::<RequestInterrupted>()));
}

#[test]
fn test_hooks_degrade_when_alarm_in_use() {
    let wd = common::install();
    let mut hooks = RequestWatchdog::new(config(0.1));

    hooks.pre_request().unwrap();
    assert_eq!(hooks.state(), HookState::Disabled);
    assert!(!hooks.in_request());
    assert!(hooks.watchdog().is_none());

    // Requests run unguarded.
    let value = hooks
        .handle(|watchdog| -> alarma::Result<&str> {
            assert!(watchdog.is_none());
            std::thread::sleep(secs(0.2));
            Ok("done")
        })
        .unwrap();
    assert_eq!(value, "done");
    hooks.post_request().unwrap();

    // The existing owner is untouched.
    assert_eq!(wd.depth(), 0);
    wd.checkpoint().unwrap();
}

#[test]
fn test_hooks_share_existing_watchdog() {
    let wd = common::install();
    let mut hooks = RequestWatchdog::with_watchdog(config(0.2), wd.watchdog.clone());

    let result = wd.timeout(5.0).run(|| {
        hooks.handle(|watchdog| -> alarma::Result<()> {
            assert_eq!(watchdog.map(Watchdog::depth), Some(2));
            wd.sleep(secs(1.0))
        })
    });

    assert!(matches!(result, Err(e) if e.is_expired_with::<RequestInterrupted>()));
    assert_eq!(wd.depth(), 0);
}

#[test]
fn test_unfinished_request_is_released() {
    let _lock = common::lock();
    let mut hooks = RequestWatchdog::new(config(1.0));

    hooks.pre_request().unwrap();
    hooks.pre_request().unwrap();
    assert_eq!(hooks.watchdog().map(Watchdog::depth), Some(1));
    hooks.post_request().unwrap();
    assert_eq!(hooks.watchdog().map(Watchdog::depth), Some(0));
}
