//! Decision types returned to the caller and written to the audit trail.

use serde::Serialize;
use uuid::Uuid;

use crate::detect::ThreatFinding;

/// Graduated action for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Pass the request through untouched.
    Allow,
    /// Pass through, but the client is in the watch band.
    Monitor,
    /// Reject with a rate-limit response; the client is not blocked.
    RateLimit,
    BlockTemporary,
    BlockPermanent,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Monitor => "monitor",
            Action::RateLimit => "rate_limit",
            Action::BlockTemporary => "block_temporary",
            Action::BlockPermanent => "block_permanent",
        }
    }

    /// Whether the caller should let the request proceed.
    pub fn permits(&self) -> bool {
        matches!(self, Action::Allow | Action::Monitor)
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Action::BlockTemporary | Action::BlockPermanent)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the action was chosen. Fallback outcomes are distinguishable from
/// verdict-driven ones so operators can see degraded escalation at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Whitelisted,
    ActiveBlock,
    NoFindings,
    /// Score in the watch band, nothing else against the client.
    SuspicionElevated,
    /// Score at or above the blocking threshold.
    SuspicionThreshold,
    /// A finding at or above the configured confident severity.
    ConfidentFinding,
    RateLimitExceeded,
    EscalationMalicious,
    EscalationBenign,
    /// Fallback applied: the analysis service missed its deadline.
    EscalationTimeout,
    /// Fallback applied: transport/status/parse failure.
    EscalationFailure,
    /// Fallback applied: no analysis service is configured.
    EscalationUnavailable,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Whitelisted => "whitelisted",
            ReasonCode::ActiveBlock => "active_block",
            ReasonCode::NoFindings => "no_findings",
            ReasonCode::SuspicionElevated => "suspicion_elevated",
            ReasonCode::SuspicionThreshold => "suspicion_threshold",
            ReasonCode::ConfidentFinding => "confident_finding",
            ReasonCode::RateLimitExceeded => "rate_limit_exceeded",
            ReasonCode::EscalationMalicious => "escalation_malicious",
            ReasonCode::EscalationBenign => "escalation_benign",
            ReasonCode::EscalationTimeout => "escalation_timeout",
            ReasonCode::EscalationFailure => "escalation_failure",
            ReasonCode::EscalationUnavailable => "escalation_unavailable",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final, immutable outcome of one request's evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub id: Uuid,
    pub action: Action,
    pub reason: ReasonCode,
    /// Everything the detector found, retained in full for audit even
    /// though only the highest severity drives the action.
    pub findings: Vec<ThreatFinding>,
    /// Suspicion score after this request's updates.
    pub score: f64,
    /// Whether the escalation gateway was invoked for this request.
    pub escalated: bool,
    pub decided_at_ms: u64,
}

impl Decision {
    pub fn new(
        action: Action,
        reason: ReasonCode,
        findings: Vec<ThreatFinding>,
        score: f64,
        escalated: bool,
        decided_at_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            reason,
            findings,
            score,
            escalated,
            decided_at_ms,
        }
    }
}
