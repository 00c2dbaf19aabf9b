//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for binaries
//! - Let `RUST_LOG` override the configured level
//!
//! # Design Decisions
//! - The library only emits `tracing` events; installing a subscriber is the
//!   host's job, done here for the `alarma` binary
//! - Logs go to stderr so command output on stdout stays machine-readable

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directive used when `RUST_LOG` is not set.
pub fn default_directive(level: &str) -> String {
    format!("alarma={}", level.to_ascii_lowercase())
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("DEBUG"), "alarma=debug");
    }

    #[test]
    fn test_init_twice() {
        init("info");
        init("debug");
    }
}
