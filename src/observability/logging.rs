//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binary
//! - Respect `RUST_LOG` when set, fall back to the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Library code only emits events; subscriber setup is the binary's call

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ObservabilityConfig;

/// Initialize the global tracing subscriber. Call once, from the binary.
pub fn init(config: &ObservabilityConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("blackwall={}", config.log_level))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
