//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → consumed once at engine construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart (signature
//!   tables and thresholds are not a runtime mutation surface)
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    AdminConfig, AuditConfig, BlockConfig, CategoryToggles, DetectionConfig, EngineConfig,
    EscalationConfig, FallbackPolicy, ListenerConfig, ObservabilityConfig, PolicyConfig,
    RateLimitConfig, ScoringConfig,
};
