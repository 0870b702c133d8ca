//! Decision policy: the orchestrator behind `evaluate`.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → whitelist / active-block fast paths (no detection work)
//!     → detector findings → score update → rate check
//!     → confident decision, or escalation for the ambiguous middle
//!     → Decision finalized: metrics, counters, audit entry
//! ```
//!
//! # Design Decisions
//! - The policy is the sole mutator of engine state; the escalation
//!   collaborator only ever returns a verdict
//! - The highest severity present drives the action; every finding is
//!   retained on the decision for audit
//! - Side effects already applied (score, rate counters) are never rolled
//!   back, even when the caller abandons the request

pub mod decision;

pub use decision::{Action, Decision, ReasonCode};

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditLog};
use crate::config::{EngineConfig, FallbackPolicy};
use crate::detect::{PatternDetector, Severity, ThreatFinding};
use crate::escalate::{EscalationError, EscalationGateway};
use crate::observability::metrics;
use crate::rate::RateLimiter;
use crate::request::RequestContext;
use crate::state::{BlockState, IpStateStore};

/// Failure to construct an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("signature table failed to compile: {0}")]
    Signature(#[from] regex::Error),
}

/// Running decision tallies, exposed on the admin surface.
#[derive(Default)]
pub struct DecisionCounters {
    allowed: AtomicU64,
    monitored: AtomicU64,
    rate_limited: AtomicU64,
    blocked: AtomicU64,
    escalations: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub allowed: u64,
    pub monitored: u64,
    pub rate_limited: u64,
    pub blocked: u64,
    pub escalations: u64,
    pub tracked_clients: usize,
}

/// The security decision engine. One instance per deployment; constructed
/// once at startup and shared behind `Arc`. Tests build their own — there
/// is no process-global state.
pub struct SecurityEngine {
    detector: PatternDetector,
    ip_store: IpStateStore,
    rate_limiter: RateLimiter,
    gateway: Option<EscalationGateway>,
    audit: AuditLog,
    counters: DecisionCounters,
    config: EngineConfig,
}

impl SecurityEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let detector = PatternDetector::new(&config.detection)?;
        let ip_store = IpStateStore::new(config.scoring.clone());
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());
        let gateway = if config.escalation.enabled {
            Some(EscalationGateway::new(config.escalation.clone()))
        } else {
            None
        };
        let audit = AuditLog::new(&config.audit);

        Ok(Self {
            detector,
            ip_store,
            rate_limiter,
            gateway,
            audit,
            counters: DecisionCounters::default(),
            config,
        })
    }

    /// Evaluate one request. Concurrent-safe; many evaluations may run at
    /// once, including for the same client.
    pub async fn evaluate(&self, ctx: &RequestContext) -> Decision {
        let now = ctx.received_at_ms;
        let client = ctx.client_key();
        let snapshot = self.ip_store.lookup(&client, now);

        // Whitelist is the first gate: detection may still run for audit
        // visibility, but nothing it finds drives an action or the score.
        if snapshot.whitelisted {
            let findings = if self.config.detection.scan_whitelisted {
                self.detector.detect(ctx)
            } else {
                Vec::new()
            };
            let decision = Decision::new(
                Action::Allow,
                ReasonCode::Whitelisted,
                findings,
                snapshot.score,
                false,
                now,
            );
            return self.finalize(ctx, decision);
        }

        // Existing block: cheapest path, no detection work.
        match snapshot.block {
            BlockState::Permanent => {
                let decision = Decision::new(
                    Action::BlockPermanent,
                    ReasonCode::ActiveBlock,
                    Vec::new(),
                    snapshot.score,
                    false,
                    now,
                );
                return self.finalize(ctx, decision);
            }
            BlockState::Temporary { .. } if snapshot.block.is_active(now) => {
                let decision = Decision::new(
                    Action::BlockTemporary,
                    ReasonCode::ActiveBlock,
                    Vec::new(),
                    snapshot.score,
                    false,
                    now,
                );
                return self.finalize(ctx, decision);
            }
            _ => {}
        }

        let findings = self.detector.detect(ctx);
        for f in &findings {
            metrics::record_finding(f.category.as_str());
        }
        let score = self.ip_store.record_findings(&client, &findings, now);
        let rate = self.rate_limiter.check_and_increment(&client, now);

        let top = findings.iter().map(|f| f.severity).max();
        let scoring = &self.config.scoring;

        // Confidently malicious: a finding at the configured severity, or a
        // high-severity finding from a client already past the block line.
        if let Some(top) = top {
            let confident = top >= self.config.policy.confident_severity
                || (top >= Severity::High && score >= scoring.block_threshold);
            if confident {
                let decision =
                    self.apply_block(&client, ReasonCode::ConfidentFinding, findings, score, false, now);
                return self.finalize(ctx, decision);
            }
        }

        // Rate violation alone: reject the request, leave the client
        // unblocked, optionally nudge the score.
        if !rate.within_limits {
            let score = if scoring.rate_violation_bump > 0.0 {
                self.ip_store.add_score(&client, scoring.rate_violation_bump, now)
            } else {
                score
            };
            let decision = Decision::new(
                Action::RateLimit,
                ReasonCode::RateLimitExceeded,
                findings,
                score,
                false,
                now,
            );
            return self.finalize(ctx, decision);
        }

        if findings.is_empty() {
            let decision = if score >= scoring.block_threshold {
                self.apply_block(&client, ReasonCode::SuspicionThreshold, findings, score, false, now)
            } else if score >= scoring.restrict_threshold {
                Decision::new(Action::RateLimit, ReasonCode::SuspicionElevated, findings, score, false, now)
            } else if score >= scoring.monitor_threshold {
                Decision::new(Action::Monitor, ReasonCode::SuspicionElevated, findings, score, false, now)
            } else {
                Decision::new(Action::Allow, ReasonCode::NoFindings, findings, score, false, now)
            };
            return self.finalize(ctx, decision);
        }

        // Ambiguous: low/medium findings, nothing confident. Defer to the
        // analysis collaborator under its deadline.
        let decision = self.escalate(ctx, &client, findings, score, now).await;
        self.finalize(ctx, decision)
    }

    async fn escalate(
        &self,
        ctx: &RequestContext,
        client: &str,
        findings: Vec<ThreatFinding>,
        score: f64,
        now: u64,
    ) -> Decision {
        let Some(gateway) = &self.gateway else {
            return self.fallback(client, ReasonCode::EscalationUnavailable, findings, score, false, now);
        };

        self.counters.escalations.fetch_add(1, Ordering::Relaxed);
        match gateway.escalate(ctx, &findings).await {
            Ok(verdict) if verdict.malicious => {
                metrics::record_escalation("malicious");
                self.apply_block(client, ReasonCode::EscalationMalicious, findings, score, true, now)
            }
            Ok(_) => {
                metrics::record_escalation("benign");
                Decision::new(Action::Allow, ReasonCode::EscalationBenign, findings, score, true, now)
            }
            Err(EscalationError::Timeout(ms)) => {
                warn!(client, timeout_ms = ms, "escalation missed its deadline");
                metrics::record_escalation("timeout");
                self.fallback(client, ReasonCode::EscalationTimeout, findings, score, true, now)
            }
            Err(e) => {
                warn!(client, error = %e, "escalation failed");
                metrics::record_escalation("failure");
                self.fallback(client, ReasonCode::EscalationFailure, findings, score, true, now)
            }
        }
    }

    /// Resolve an unanswered escalation per the configured policy. The
    /// choice is a security/availability tradeoff and always comes from
    /// configuration, never from a built-in default path.
    fn fallback(
        &self,
        client: &str,
        reason: ReasonCode,
        findings: Vec<ThreatFinding>,
        score: f64,
        escalated: bool,
        now: u64,
    ) -> Decision {
        match self.config.escalation.fallback {
            FallbackPolicy::FailOpen => {
                info!(client, reason = %reason, "fail-open: allowing unresolved request");
                Decision::new(Action::Allow, reason, findings, score, escalated, now)
            }
            FallbackPolicy::FailClosed => {
                Decision::new(Action::RateLimit, reason, findings, score, escalated, now)
            }
        }
    }

    /// Block with escalating duration: doubling per prior offense, capped,
    /// then permanent once the offense count crosses the configured line.
    fn apply_block(
        &self,
        client: &str,
        reason: ReasonCode,
        findings: Vec<ThreatFinding>,
        score: f64,
        escalated: bool,
        now: u64,
    ) -> Decision {
        let blocks = &self.config.blocks;
        let offenses = self.ip_store.note_offense(client, now);

        if offenses >= blocks.permanent_after {
            self.ip_store.block(client, BlockState::Permanent, reason.as_str(), now);
            warn!(client, offenses, "client blocked permanently");
            return Decision::new(Action::BlockPermanent, reason, findings, score, escalated, now);
        }

        let doublings = offenses.saturating_sub(1).min(16);
        let duration_secs = blocks
            .base_duration_secs
            .saturating_mul(1u64 << doublings)
            .min(blocks.max_duration_secs);
        let expires_at_ms = now + duration_secs * 1_000;
        self.ip_store.block(
            client,
            BlockState::Temporary { expires_at_ms },
            reason.as_str(),
            now,
        );
        warn!(client, offenses, duration_secs, "client blocked temporarily");
        Decision::new(Action::BlockTemporary, reason, findings, score, escalated, now)
    }

    /// Record the decision everywhere it needs to land. Exactly one call
    /// per evaluation, on every path.
    fn finalize(&self, ctx: &RequestContext, decision: Decision) -> Decision {
        match decision.action {
            Action::Allow => self.counters.allowed.fetch_add(1, Ordering::Relaxed),
            Action::Monitor => self.counters.monitored.fetch_add(1, Ordering::Relaxed),
            Action::RateLimit => self.counters.rate_limited.fetch_add(1, Ordering::Relaxed),
            Action::BlockTemporary | Action::BlockPermanent => {
                self.counters.blocked.fetch_add(1, Ordering::Relaxed)
            }
        };
        metrics::record_decision(decision.action.as_str());
        debug!(
            client = %ctx.client_key(),
            action = %decision.action,
            reason = %decision.reason,
            findings = decision.findings.len(),
            "request evaluated"
        );
        self.audit.append(AuditEntry::new(ctx, &decision));
        decision
    }

    /// Per-client state, exposed for the admin surface.
    pub fn ip_store(&self) -> &IpStateStore {
        &self.ip_store
    }

    pub fn analytics(&self) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            allowed: self.counters.allowed.load(Ordering::Relaxed),
            monitored: self.counters.monitored.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            blocked: self.counters.blocked.load(Ordering::Relaxed),
            escalations: self.counters.escalations.load(Ordering::Relaxed),
            tracked_clients: self.ip_store.tracked_clients(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Periodic housekeeping: evict idle rate entries and purge dormant
    /// client records. Correctness never depends on this running.
    pub fn housekeeping(&self, now_ms: u64) {
        self.rate_limiter.evict_idle(now_ms);
        self.ip_store.purge_idle(3_600_000, now_ms);
    }
}
