//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters by action, category, horizon, outcome)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments behind the `metrics` facade)
//! - Observability failures never gate decisions

pub mod logging;
pub mod metrics;
