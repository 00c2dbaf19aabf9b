//! The process-wide countdown facility.
//!
//! # Responsibilities
//! - Claim SIGALRM for this crate, refusing if another owner exists
//! - Arm, read and disarm a one-shot POSIX timer aimed at the control thread
//! - Record notifications so the control thread can act on them
//!
//! # Design Decisions
//! - The signal handler only stores an atomic flag; all stack work happens on
//!   the control thread at the next checkpoint
//! - The handler is installed without `SA_RESTART`, so blocking syscalls on
//!   the control thread return `EINTR` instead of swallowing the alarm
//! - Notifications are delivered with `SIGEV_THREAD_ID`, never to whichever
//!   thread happens to be running

use std::ffi::c_int;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigEvent, SigHandler, SigSet, SigevNotify, Signal};
use nix::sys::time::TimeSpec;
use nix::sys::timer::{Expiration, Timer, TimerSetTimeFlags};
use nix::time::ClockId;
use nix::unistd::gettid;

use crate::error::{Error, Result};

/// A single one-shot timer that notifies the control thread when it elapses.
///
/// The timer stack only needs these operations; [`PosixCountdown`] is the
/// production implementation.
pub trait Countdown: Send + fmt::Debug {
    /// Arm (or re-arm) the timer to elapse after `delay`.
    fn arm(&mut self, delay: Duration) -> Result<()>;

    /// Cancel the timer. Disarming an idle timer is not an error.
    fn disarm(&mut self) -> Result<()>;

    /// Time until the timer elapses, or `None` when disarmed.
    fn remaining(&self) -> Result<Option<Duration>>;

    /// Record a notification right away, as if the timer had just elapsed.
    fn notify(&self);

    /// Consume a pending notification, returning whether there was one.
    fn take_notification(&self) -> bool;
}

/// Set by the signal handler, cleared by the control thread.
static PENDING: AtomicBool = AtomicBool::new(false);

/// Whether a [`SignalRegistration`] is currently alive in this process.
static CLAIMED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_alarm(_signal: c_int) {
    PENDING.store(true, Ordering::SeqCst);
}

/// Ownership of the process SIGALRM disposition.
///
/// Dropping the registration restores the default disposition.
#[derive(Debug)]
struct SignalRegistration {
    _private: (),
}

impl SignalRegistration {
    fn claim() -> Result<Self> {
        if CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyInUse);
        }

        let action = SigAction::new(SigHandler::Handler(on_alarm), SaFlags::empty(), SigSet::empty());
        // SAFETY: `on_alarm` only performs an atomic store, which is
        // async-signal-safe.
        let previous = match unsafe { sigaction(Signal::SIGALRM, &action) } {
            Ok(previous) => previous,
            Err(errno) => {
                CLAIMED.store(false, Ordering::Release);
                tracing::error!(error = %errno, "Unable to register SIGALRM handler");
                return Err(errno.into());
            }
        };

        if previous.handler() != SigHandler::SigDfl {
            // SAFETY: reinstates exactly the disposition we just replaced.
            if let Err(errno) = unsafe { sigaction(Signal::SIGALRM, &previous) } {
                tracing::error!(error = %errno, "Unable to restore the previous SIGALRM handler");
            }
            CLAIMED.store(false, Ordering::Release);
            tracing::warn!(handler = ?previous.handler(), "Process alarm handler is already in use");
            return Err(Error::AlreadyInUse);
        }

        PENDING.store(false, Ordering::SeqCst);
        tracing::debug!("SIGALRM handler registered");
        Ok(Self { _private: () })
    }
}

impl Drop for SignalRegistration {
    fn drop(&mut self) {
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        // SAFETY: restoring the default disposition installs no Rust code.
        if let Err(errno) = unsafe { sigaction(Signal::SIGALRM, &default) } {
            tracing::error!(error = %errno, "Unable to restore the default SIGALRM handler");
        }
        PENDING.store(false, Ordering::SeqCst);
        CLAIMED.store(false, Ordering::Release);
        tracing::debug!("SIGALRM handler released");
    }
}

/// A `CLOCK_MONOTONIC` POSIX timer delivering SIGALRM to one thread.
pub struct PosixCountdown {
    // Declared first so the timer is deleted before the handler is restored.
    timer: Timer,
    _registration: SignalRegistration,
}

// SAFETY: `timer_t` is a process-wide kernel handle, not thread-local state.
// The owning watchdog only touches it from the control thread.
unsafe impl Send for PosixCountdown {}

impl PosixCountdown {
    /// Claim SIGALRM and create a timer aimed at the calling thread.
    ///
    /// Fails with [`Error::AlreadyInUse`] if another countdown is alive or
    /// something else installed a SIGALRM handler.
    pub fn install() -> Result<Self> {
        let registration = SignalRegistration::claim()?;
        let event = SigEvent::new(SigevNotify::SigevThreadId {
            signal: Signal::SIGALRM,
            thread_id: gettid().as_raw(),
            si_value: 0,
        });
        let timer = Timer::new(ClockId::CLOCK_MONOTONIC, event)?;
        Ok(Self {
            timer,
            _registration: registration,
        })
    }
}

impl fmt::Debug for PosixCountdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosixCountdown")
            .field("remaining", &self.remaining().ok().flatten())
            .finish()
    }
}

impl Countdown for PosixCountdown {
    fn arm(&mut self, delay: Duration) -> Result<()> {
        // A zero it_value would disarm the timer instead of firing it.
        if delay.is_zero() {
            self.notify();
            return Ok(());
        }
        self.timer.set(
            Expiration::OneShot(TimeSpec::from_duration(delay)),
            TimerSetTimeFlags::empty(),
        )?;
        Ok(())
    }

    fn disarm(&mut self) -> Result<()> {
        self.timer.set(
            Expiration::OneShot(TimeSpec::new(0, 0)),
            TimerSetTimeFlags::empty(),
        )?;
        Ok(())
    }

    fn remaining(&self) -> Result<Option<Duration>> {
        let left = match self.timer.get()? {
            None => return Ok(None),
            Some(Expiration::OneShot(ts)) => ts,
            Some(Expiration::IntervalDelayed(ts, _)) => ts,
            Some(Expiration::Interval(ts)) => ts,
        };
        Ok(Some(Duration::new(
            left.tv_sec().max(0) as u64,
            left.tv_nsec().max(0) as u32,
        )))
    }

    fn notify(&self) {
        PENDING.store(true, Ordering::SeqCst);
    }

    fn take_notification(&self) -> bool {
        PENDING.swap(false, Ordering::SeqCst)
    }
}

/// Serialises unit tests that claim the process SIGALRM facility.
#[cfg(test)]
pub(crate) fn exclusive() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_second_install_is_rejected() {
        let _lock = exclusive();
        let first = PosixCountdown::install().unwrap();
        assert!(matches!(PosixCountdown::install(), Err(Error::AlreadyInUse)));
        drop(first);
        let again = PosixCountdown::install();
        assert!(again.is_ok());
    }

    #[test]
    fn test_arm_read_disarm() {
        let _lock = exclusive();
        let mut countdown = PosixCountdown::install().unwrap();
        assert_eq!(countdown.remaining().unwrap(), None);

        countdown.arm(Duration::from_secs(5)).unwrap();
        let left = countdown.remaining().unwrap().unwrap();
        assert!(left > Duration::from_secs(4) && left <= Duration::from_secs(5));

        countdown.disarm().unwrap();
        assert_eq!(countdown.remaining().unwrap(), None);
        assert!(!countdown.take_notification());
    }

    #[test]
    fn test_notification_is_delivered() {
        let _lock = exclusive();
        let mut countdown = PosixCountdown::install().unwrap();
        countdown.arm(Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(countdown.take_notification());
        assert!(!countdown.take_notification());
        assert_eq!(countdown.remaining().unwrap(), None);
    }

    #[test]
    fn test_zero_delay_notifies_immediately() {
        let _lock = exclusive();
        let mut countdown = PosixCountdown::install().unwrap();
        countdown.arm(Duration::ZERO).unwrap();
        assert!(countdown.take_notification());
    }
}
