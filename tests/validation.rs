//! Argument, thread and ownership checks.

use std::ffi::c_int;
use std::thread;
use std::time::Duration;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use alarma::{Error, Quota, Watchdog};

mod common;

use common::secs;

extern "C" fn foreign_handler(_signal: c_int) {}

#[test]
fn test_non_positive_timeouts_are_rejected() {
    let wd = common::install();

    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let result = wd.timeout(bad).run(|| Ok::<_, Error>(()));
        assert!(matches!(result, Err(Error::InvalidArgument(_))), "{bad} accepted");
        assert_eq!(wd.depth(), 0);
    }
    assert!(matches!(wd.timeout(Duration::ZERO).enter(), Err(Error::InvalidArgument(_))));
    assert!(!wd.armed());
}

#[test]
fn test_non_positive_quotas_are_rejected() {
    assert!(matches!(Quota::new(0.0), Err(Error::InvalidArgument(_))));
    assert!(matches!(Quota::new(-1.0), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_invalid_timeout_runs_no_body() {
    let wd = common::install();
    let mut ran = false;

    let result = wd.timeout(-0.5).run(|| {
        ran = true;
        Ok::<_, Error>(())
    });

    assert!(result.is_err());
    assert!(!ran);
}

#[test]
fn test_other_thread_is_rejected() {
    let wd = common::install();
    let outer = wd.timeout(2.0).enter().unwrap();
    assert_eq!(wd.depth(), 1);

    let remote = wd.watchdog.clone();
    let results = thread::spawn(move || {
        (
            remote.timeout(0.5).run(|| Ok::<_, Error>(())),
            remote.checkpoint(),
            remote.sleep(secs(0.01)),
        )
    })
    .join()
    .unwrap();

    assert!(matches!(results.0, Err(Error::WrongThread)));
    assert!(matches!(results.1, Err(Error::WrongThread)));
    assert!(matches!(results.2, Err(Error::WrongThread)));
    assert_eq!(wd.depth(), 1);

    outer.exit().unwrap();
    assert_eq!(wd.depth(), 0);
}

#[test]
fn test_second_install_is_rejected() {
    let wd = common::install();

    assert!(matches!(Watchdog::install(), Err(Error::AlreadyInUse)));
    // The live watchdog keeps working.
    wd.timeout(0.5).run(|| wd.sleep(secs(0.05))).unwrap();
}

#[test]
fn test_foreign_handler_is_detected() {
    let _lock = common::lock();
    let foreign = SigAction::new(SigHandler::Handler(foreign_handler), SaFlags::empty(), SigSet::empty());
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());

    unsafe { sigaction(Signal::SIGALRM, &foreign) }.unwrap();
    let result = Watchdog::install();
    let current = unsafe { sigaction(Signal::SIGALRM, &default) }.unwrap();

    assert!(matches!(result, Err(Error::AlreadyInUse)));
    // The foreign handler was left in place.
    assert!(current.handler() == SigHandler::Handler(foreign_handler));

    assert!(Watchdog::install().is_ok());
}

#[test]
fn test_release_allows_reinstall() {
    let _lock = common::lock();
    let first = Watchdog::install().unwrap();
    drop(first);

    let second = Watchdog::install().unwrap();
    second.timeout(0.1).run(|| second.sleep(secs(0.01))).unwrap();
}

#[test]
fn test_huge_timeouts_are_accepted() {
    let wd = common::install();

    let value = wd.timeout(1e20).run(|| Ok::<_, Error>(5)).unwrap();
    assert_eq!(value, 5);

    let guard = wd.timeout(Duration::MAX).enter().unwrap();
    assert!(guard.is_armed());
    assert!(wd.armed());
    guard.exit().unwrap();
    assert!(!wd.armed());
}
