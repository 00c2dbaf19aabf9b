//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! timer stack, scopes, hooks produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters via the metrics facade)
//! ```
//!
//! # Design Decisions
//! - Nothing here runs inside the signal handler
//! - Stack transitions log at debug/trace; hook degradation at warn/error

pub mod logging;
pub mod metrics;
