//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ordering (thresholds ascending, caps above bases)
//! - Catch configurations that would silently disable protection
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::EngineConfig;

/// A single semantic problem in a configuration.
#[derive(Debug)]
pub enum ValidationError {
    MisorderedThresholds { monitor: f64, restrict: f64, block: f64 },
    NonPositive { field: &'static str },
    NegativeDelta { field: &'static str },
    OversizeAboveBodyCap { oversize: usize, cap: usize },
    EscalationEndpointMissing,
    EscalationEndpointInvalid { endpoint: String, error: String },
    AdminKeyPlaceholder,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MisorderedThresholds { monitor, restrict, block } => write!(
                f,
                "score thresholds must ascend: monitor {} < restrict {} < block {}",
                monitor, restrict, block
            ),
            ValidationError::NonPositive { field } => {
                write!(f, "{} must be greater than zero", field)
            }
            ValidationError::NegativeDelta { field } => {
                write!(f, "{} must not be negative", field)
            }
            ValidationError::OversizeAboveBodyCap { oversize, cap } => write!(
                f,
                "oversize threshold {} exceeds the body buffer cap {}; oversize detection would never fire",
                oversize, cap
            ),
            ValidationError::EscalationEndpointMissing => {
                write!(f, "escalation is enabled but no endpoint is configured")
            }
            ValidationError::EscalationEndpointInvalid { endpoint, error } => {
                write!(f, "escalation endpoint '{}' is not a valid URL: {}", endpoint, error)
            }
            ValidationError::AdminKeyPlaceholder => {
                write!(f, "admin API is enabled with the placeholder key; set admin.api_key")
            }
        }
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let s = &config.scoring;
    if !(s.monitor_threshold < s.restrict_threshold && s.restrict_threshold < s.block_threshold) {
        errors.push(ValidationError::MisorderedThresholds {
            monitor: s.monitor_threshold,
            restrict: s.restrict_threshold,
            block: s.block_threshold,
        });
    }
    for (field, value) in [
        ("scoring.low_delta", s.low_delta),
        ("scoring.medium_delta", s.medium_delta),
        ("scoring.high_delta", s.high_delta),
        ("scoring.critical_delta", s.critical_delta),
        ("scoring.decay_per_hour", s.decay_per_hour),
        ("scoring.rate_violation_bump", s.rate_violation_bump),
    ] {
        if value < 0.0 {
            errors.push(ValidationError::NegativeDelta { field });
        }
    }

    if config.rate_limit.enabled {
        for (field, value) in [
            ("rate_limit.burst_window_secs", config.rate_limit.burst_window_secs),
            ("rate_limit.burst_limit", config.rate_limit.burst_limit as u64),
            ("rate_limit.per_minute", config.rate_limit.per_minute as u64),
            ("rate_limit.per_hour", config.rate_limit.per_hour as u64),
        ] {
            if value == 0 {
                errors.push(ValidationError::NonPositive { field });
            }
        }
    }

    if config.blocks.base_duration_secs == 0 {
        errors.push(ValidationError::NonPositive { field: "blocks.base_duration_secs" });
    }
    if config.blocks.permanent_after == 0 {
        errors.push(ValidationError::NonPositive { field: "blocks.permanent_after" });
    }

    if config.detection.oversize_threshold_bytes > config.detection.max_body_bytes {
        errors.push(ValidationError::OversizeAboveBodyCap {
            oversize: config.detection.oversize_threshold_bytes,
            cap: config.detection.max_body_bytes,
        });
    }

    if config.escalation.enabled {
        if config.escalation.endpoint.is_empty() {
            errors.push(ValidationError::EscalationEndpointMissing);
        } else if let Err(e) = url::Url::parse(&config.escalation.endpoint) {
            errors.push(ValidationError::EscalationEndpointInvalid {
                endpoint: config.escalation.endpoint.clone(),
                error: e.to_string(),
            });
        }
        if config.escalation.timeout_ms == 0 {
            errors.push(ValidationError::NonPositive { field: "escalation.timeout_ms" });
        }
    }

    if config.admin.enabled && config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
        errors.push(ValidationError::AdminKeyPlaceholder);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
