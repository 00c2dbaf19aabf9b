//! Timer subsystem.
//!
//! # Data Flow
//! ```text
//! scope enter ──push──▶ stack.rs ──arm──▶ countdown.rs (POSIX timer)
//!                                              │ SIGALRM to the control thread
//!                                              ▼
//! checkpoint / EINTR ──poll──▶ stack.rs (firing procedure) ──▶ Expired
//! scope exit ──pop──▶ stack.rs ──re-arm parent / disarm──▶ countdown.rs
//! ```
//!
//! # Design Decisions
//! - One countdown per process; the stack multiplexes every nested deadline
//!   onto it
//! - The countdown is a trait so the stack can be driven by an in-memory
//!   implementation in tests

pub mod countdown;
pub mod stack;

pub use countdown::{Countdown, PosixCountdown};
pub use stack::{EntryId, TimerStack, MAX_DELAY};
