//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::detect::Severity;

/// Root configuration for the security engine and its glue.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Listener configuration for the demo binary.
    pub listener: ListenerConfig,

    /// Pattern-detection settings.
    pub detection: DetectionConfig,

    /// Decision-policy knobs.
    pub policy: PolicyConfig,

    /// Suspicion scoring: severity deltas, decay, thresholds.
    pub scoring: ScoringConfig,

    /// Rate limiting horizons and limits.
    pub rate_limit: RateLimitConfig,

    /// Block durations and the permanent-block line.
    pub blocks: BlockConfig,

    /// Escalation to the external analysis service.
    pub escalation: EscalationConfig,

    /// Audit trail sink.
    pub audit: AuditConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Which attack categories the detector scans for.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CategoryToggles {
    pub sql_injection: bool,
    pub xss: bool,
    pub command_injection: bool,
    pub path_traversal: bool,
    pub ssrf: bool,
    pub xxe: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            sql_injection: true,
            xss: true,
            command_injection: true,
            path_traversal: true,
            ssrf: true,
            xxe: true,
        }
    }
}

/// Pattern-detection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// How much body the middleware buffers and the detector scans.
    pub max_body_bytes: usize,

    /// Declared payload size past which the request itself is a finding.
    pub oversize_threshold_bytes: usize,

    /// Cap on evidence snippet length, in characters.
    pub evidence_max_chars: usize,

    /// Run detection on whitelisted traffic for audit visibility. Findings
    /// never drive actions or the score either way.
    pub scan_whitelisted: bool,

    pub categories: CategoryToggles,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 256 * 1024,
            oversize_threshold_bytes: 100 * 1024,
            evidence_max_chars: 120,
            scan_whitelisted: true,
            categories: CategoryToggles::default(),
        }
    }
}

/// Decision-policy knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Findings at or above this severity block immediately instead of
    /// passing through escalation. With the default, a lone high-severity
    /// finding is ambiguous and goes to analysis first.
    pub confident_severity: Severity,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            confident_severity: Severity::Critical,
        }
    }
}

/// Suspicion scoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Score added per finding, by severity.
    pub low_delta: f64,
    pub medium_delta: f64,
    pub high_delta: f64,
    pub critical_delta: f64,

    /// Linear decay per idle hour, toward zero.
    pub decay_per_hour: f64,

    /// Score at which a clean request is still worth watching.
    pub monitor_threshold: f64,

    /// Score at which clean requests start getting rate-limit responses.
    pub restrict_threshold: f64,

    /// Score at which the client is blocked outright.
    pub block_threshold: f64,

    /// Optional score nudge on each rate-limit violation.
    pub rate_violation_bump: f64,
}

impl ScoringConfig {
    pub fn delta(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low_delta,
            Severity::Medium => self.medium_delta,
            Severity::High => self.high_delta,
            Severity::Critical => self.critical_delta,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            low_delta: 1.0,
            medium_delta: 5.0,
            high_delta: 15.0,
            critical_delta: 40.0,
            decay_per_hour: 5.0,
            monitor_threshold: 10.0,
            restrict_threshold: 25.0,
            block_threshold: 60.0,
            rate_violation_bump: 0.0,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Short-burst window length in seconds.
    pub burst_window_secs: u64,

    /// Maximum requests inside the burst window.
    pub burst_limit: u32,

    /// Maximum requests per sliding minute.
    pub per_minute: u32,

    /// Maximum requests per sliding hour.
    pub per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            burst_window_secs: 10,
            burst_limit: 20,
            per_minute: 120,
            per_hour: 2_000,
        }
    }
}

/// Block durations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockConfig {
    /// First-offense temporary block length in seconds. Doubles with each
    /// prior offense.
    pub base_duration_secs: u64,

    /// Cap on any single temporary block.
    pub max_duration_secs: u64,

    /// Offense count at which the block becomes permanent.
    pub permanent_after: u32,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            base_duration_secs: 300,
            max_duration_secs: 24 * 3_600,
            permanent_after: 5,
        }
    }
}

/// What to do when an escalated request gets no verdict: allow by default
/// or restrict by default. A deliberate security/availability tradeoff,
/// which is why it lives in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    FailOpen,
    FailClosed,
}

/// Escalation to the external analysis service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Enable escalation of ambiguous requests.
    pub enabled: bool,

    /// Analysis service endpoint URL.
    pub endpoint: String,

    /// Bearer token for the analysis service.
    pub api_key: String,

    /// Model the analysis service should use.
    pub model: String,

    /// Hard deadline for one analysis round-trip.
    pub timeout_ms: u64,

    /// Applied on timeout or failure; see [`FallbackPolicy`].
    pub fallback: FallbackPolicy,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            model: "gpt-4.1".to_string(),
            timeout_ms: 2_000,
            fallback: FallbackPolicy::FailOpen,
        }
    }
}

/// Audit trail sink.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines file path. When unset, entries go to the structured log.
    pub path: Option<String>,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin router.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
