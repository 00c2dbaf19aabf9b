//! Blocking calls that give way to a fired timeout.
//!
//! `std::thread::sleep` and most `std::io` helpers retry on `EINTR`, which
//! would swallow the alarm. These wrappers wait in `ppoll` instead and treat
//! `EINTR` as an interruption point: they run the firing procedure and return
//! the expiry, and only resume waiting when the notification turns out to be
//! stale.
//!
//! # Design Decisions
//! - SIGALRM is blocked on the control thread for the whole call and only
//!   unblocked atomically inside `ppoll`. An alarm landing between the
//!   checkpoint and the wait stays pending and interrupts the wait at once
//! - `read` waits for readiness first, so the read itself never blocks
//! - Waits are issued in bounded slices; a sleep longer than the monotonic
//!   clock can represent waits until a timeout interrupts it

use std::ffi::c_int;
use std::os::fd::{AsFd, AsRawFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{ppoll, PollFd, PollFlags};
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use nix::sys::time::TimeSpec;

use crate::error::Result;
use crate::watchdog::Watchdog;

/// Longest single `ppoll` wait.
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// SIGALRM blocked on the current thread until dropped.
struct AlarmMask {
    previous: SigSet,
    waiting: SigSet,
}

impl AlarmMask {
    fn block() -> Result<Self> {
        let mut alarm = SigSet::empty();
        alarm.add(Signal::SIGALRM);
        let mut previous = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&alarm), Some(&mut previous))?;

        let mut waiting = previous;
        waiting.remove(Signal::SIGALRM);
        Ok(Self { previous, waiting })
    }

    /// Wait on `fds` with SIGALRM unblocked for exactly the duration of the
    /// wait.
    fn wait(&self, fds: &mut [PollFd<'_>], timeout: Option<Duration>) -> nix::Result<c_int> {
        let timeout = timeout.map(|t| TimeSpec::from_duration(t.min(MAX_WAIT)));
        ppoll(fds, timeout, Some(self.waiting))
    }
}

impl Drop for AlarmMask {
    fn drop(&mut self) {
        if let Err(errno) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            tracing::error!(error = %errno, "Unable to restore the thread signal mask");
        }
    }
}

impl Watchdog {
    /// Sleep for `duration`, returning early with the expiry failure if a
    /// timeout fires first.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        self.ensure_control_thread()?;
        let mask = AlarmMask::block()?;
        // `None` when the deadline is beyond what `Instant` can hold.
        let deadline = Instant::now().checked_add(duration);
        loop {
            self.checkpoint()?;
            let left = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(());
                    }
                    left
                }
                None => MAX_WAIT,
            };
            let mut none: [PollFd<'_>; 0] = [];
            match mask.wait(&mut none, Some(left)) {
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
    }

    /// Read from `fd` into `buf`, returning early with the expiry failure if a
    /// timeout fires while waiting for data.
    pub fn read<F: AsFd>(&self, fd: &F, buf: &mut [u8]) -> Result<usize> {
        self.ensure_control_thread()?;
        let mask = AlarmMask::block()?;
        let fd = fd.as_fd();
        loop {
            self.checkpoint()?;
            let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
            match mask.wait(&mut fds, None) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
            match nix::unistd::read(fd.as_raw_fd(), buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
    }
}
