//! Request lifecycle adapters.
//!
//! # Data Flow
//! ```text
//! host pre-request callback  → RequestWatchdog::pre_request  → scope enter
//! request body               → checkpoints / blocking wrappers
//! host post-request callback → RequestWatchdog::post_request → scope exit
//! ```
//!
//! # Design Decisions
//! - Degrade, don't fail: an alarm facility owned by someone else disables
//!   the hooks with a warning
//! - The facility is claimed lazily on the first request, on the thread that
//!   serves it

pub mod request;

pub use request::{HookState, RequestInterrupted, RequestWatchdog};
