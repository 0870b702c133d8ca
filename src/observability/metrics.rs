//! Metrics collection.
//!
//! # Metrics
//! - `blackwall_decisions_total` (counter): decisions by action
//! - `blackwall_findings_total` (counter): detector findings by category
//! - `blackwall_rate_limited_total` (counter): violations by horizon
//! - `blackwall_escalations_total` (counter): escalation outcomes
//! - `blackwall_audit_drops_total` (counter): audit entries lost
//! - `blackwall_state_anomalies_total` (counter): clamped invariants
//!
//! Exposition is the binary's concern; the library only increments through
//! the `metrics` facade, which is a no-op until a recorder is installed.

use metrics::counter;

pub fn record_decision(action: &'static str) {
    counter!("blackwall_decisions_total", "action" => action).increment(1);
}

pub fn record_finding(category: &'static str) {
    counter!("blackwall_findings_total", "category" => category).increment(1);
}

pub fn record_rate_limited(horizon: &'static str) {
    counter!("blackwall_rate_limited_total", "horizon" => horizon).increment(1);
}

pub fn record_escalation(outcome: &'static str) {
    counter!("blackwall_escalations_total", "outcome" => outcome).increment(1);
}

pub fn record_audit_drop() {
    counter!("blackwall_audit_drops_total").increment(1);
}

pub fn record_state_anomaly(kind: &'static str) {
    counter!("blackwall_state_anomalies_total", "kind" => kind).increment(1);
}
