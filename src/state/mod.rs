//! Per-client state: blocklist, whitelist, suspicion score.
//!
//! # Data Flow
//! ```text
//! evaluate():
//!     → lookup (lazy block expiry, lazy score decay)
//!     → record_findings (severity deltas accumulate into the score)
//!     → note_offense / block (on blocking decisions)
//!
//! admin surface:
//!     → block / unblock / whitelist / unwhitelist
//!     → blocklist / whitelisted listings
//! ```
//!
//! # Design Decisions
//! - `DashMap` keyed by client identifier: same-client mutations serialize
//!   on the entry lock, cross-client operations never contend globally
//! - Records never leave the store; callers get `IpSnapshot` copies
//! - Temporary-block expiry and score decay are evaluated lazily on access;
//!   `purge_expired` exists for housekeeping, not correctness

mod record;

pub use record::{BlockState, BlockedClient, IpSnapshot};
pub(crate) use record::IpRecord;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::ScoringConfig;
use crate::detect::ThreatFinding;
use crate::observability::metrics;

/// Store of per-client reputation state. One instance per engine; tests
/// construct their own, nothing is process-global.
pub struct IpStateStore {
    records: DashMap<String, IpRecord>,
    scoring: ScoringConfig,
}

impl IpStateStore {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self {
            records: DashMap::new(),
            scoring,
        }
    }

    /// Current state of a client. A lookup past a temporary block's expiry
    /// observes `BlockState::None` and clears the record.
    pub fn lookup(&self, client: &str, now_ms: u64) -> IpSnapshot {
        let Some(mut rec) = self.records.get_mut(client) else {
            return IpSnapshot::absent();
        };
        let was_blocked = rec.block != BlockState::None;
        rec.expire_block(now_ms);
        if was_blocked && rec.block == BlockState::None {
            debug!(client, "temporary block expired");
        }
        rec.decay_score(&self.scoring, now_ms);
        IpSnapshot {
            score: rec.score,
            block: rec.block,
            whitelisted: rec.whitelisted,
            offenses: rec.offenses,
        }
    }

    /// Fold a request's findings into the client's suspicion score and
    /// return the updated value.
    pub fn record_findings(&self, client: &str, findings: &[ThreatFinding], now_ms: u64) -> f64 {
        let delta: f64 = findings.iter().map(|f| self.scoring.delta(f.severity)).sum();
        self.add_score(client, delta, now_ms)
    }

    /// Adjust the score directly (rate-violation bumps and the like).
    pub fn add_score(&self, client: &str, delta: f64, now_ms: u64) -> f64 {
        let mut rec = self
            .records
            .entry(client.to_string())
            .or_insert_with(|| IpRecord::new(now_ms));
        rec.decay_score(&self.scoring, now_ms);
        rec.score += delta;
        if rec.score < 0.0 {
            // A negative score means a misconfigured delta; clamp and
            // report rather than propagate the defect.
            warn!(client, score = rec.score, "suspicion score went negative, clamping");
            metrics::record_state_anomaly("negative_score");
            rec.score = 0.0;
        }
        rec.last_seen_ms = now_ms;
        rec.score
    }

    /// Count a blocking offense and return the updated total; the policy
    /// uses the count to pick escalating block durations.
    pub fn note_offense(&self, client: &str, now_ms: u64) -> u32 {
        let mut rec = self
            .records
            .entry(client.to_string())
            .or_insert_with(|| IpRecord::new(now_ms));
        rec.offenses += 1;
        rec.last_seen_ms = now_ms;
        rec.offenses
    }

    /// Apply a block. Idempotent with stronger-wins semantics: permanent
    /// overwrites temporary, a later expiry overwrites an earlier one, and
    /// a weaker request leaves the existing block untouched.
    pub fn block(&self, client: &str, state: BlockState, reason: impl Into<String>, now_ms: u64) {
        let mut rec = self
            .records
            .entry(client.to_string())
            .or_insert_with(|| IpRecord::new(now_ms));
        rec.expire_block(now_ms);
        let merged = rec.block.stronger_of(state);
        if merged != rec.block || rec.block_reason.is_none() {
            rec.block_reason = Some(reason.into());
        }
        rec.block = merged;
        rec.last_seen_ms = now_ms;
    }

    /// Lift any block. Returns whether a block was present.
    pub fn unblock(&self, client: &str) -> bool {
        match self.records.get_mut(client) {
            Some(mut rec) => {
                let had = rec.block != BlockState::None;
                rec.block = BlockState::None;
                rec.block_reason = None;
                had
            }
            None => false,
        }
    }

    pub fn whitelist(&self, client: &str, now_ms: u64) {
        let mut rec = self
            .records
            .entry(client.to_string())
            .or_insert_with(|| IpRecord::new(now_ms));
        rec.whitelisted = true;
    }

    pub fn unwhitelist(&self, client: &str) {
        if let Some(mut rec) = self.records.get_mut(client) {
            rec.whitelisted = false;
        }
    }

    /// Active blocks, for the admin surface. Expired entries are skipped
    /// (and will be cleared on their next lookup).
    pub fn blocklist(&self, now_ms: u64) -> Vec<BlockedClient> {
        self.records
            .iter()
            .filter(|r| r.block.is_active(now_ms))
            .map(|r| BlockedClient {
                client: r.key().clone(),
                state: r.block,
                reason: r.block_reason.clone(),
            })
            .collect()
    }

    pub fn whitelisted(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.whitelisted)
            .map(|r| r.key().clone())
            .collect()
    }

    /// Drop records that carry no state worth keeping: no active block,
    /// no whitelist entry, score decayed to zero, and idle past the cutoff.
    pub fn purge_idle(&self, idle_cutoff_ms: u64, now_ms: u64) {
        let before = self.records.len();
        self.records.retain(|_, rec| {
            rec.expire_block(now_ms);
            rec.decay_score(&self.scoring, now_ms);
            rec.whitelisted
                || rec.block != BlockState::None
                || rec.score > 0.0
                || now_ms.saturating_sub(rec.last_seen_ms) < idle_cutoff_ms
        });
        let dropped = before - self.records.len();
        if dropped > 0 {
            debug!(dropped, "purged idle client records");
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Severity, ThreatCategory, ThreatFinding};

    const T0: u64 = 1_700_000_000_000;
    const HOUR: u64 = 3_600_000;

    fn store() -> IpStateStore {
        IpStateStore::new(ScoringConfig::default())
    }

    fn finding(severity: Severity) -> ThreatFinding {
        ThreatFinding {
            category: ThreatCategory::SqlInjection,
            severity,
            matched_field: "body".into(),
            evidence: "x".into(),
            signature: "test",
        }
    }

    #[test]
    fn severity_deltas_accumulate() {
        let store = store();
        let score = store.record_findings("1.2.3.4", &[finding(Severity::High)], T0);
        assert_eq!(score, 15.0);
        let score = store.record_findings("1.2.3.4", &[finding(Severity::Low), finding(Severity::Medium)], T0);
        assert_eq!(score, 21.0);
    }

    #[test]
    fn score_decays_linearly_and_floors_at_zero() {
        let store = store();
        store.record_findings("1.2.3.4", &[finding(Severity::High)], T0);

        // Default decay is 5 points per hour.
        let snap = store.lookup("1.2.3.4", T0 + HOUR);
        assert!((snap.score - 10.0).abs() < 1e-9);

        let snap = store.lookup("1.2.3.4", T0 + 100 * HOUR);
        assert_eq!(snap.score, 0.0);
    }

    #[test]
    fn score_never_negative() {
        let store = store();
        store.add_score("1.2.3.4", -50.0, T0);
        assert_eq!(store.lookup("1.2.3.4", T0).score, 0.0);
    }

    #[test]
    fn temporary_block_expires_lazily_on_lookup() {
        let store = store();
        store.block("1.2.3.4", BlockState::Temporary { expires_at_ms: T0 + 1_000 }, "test", T0);

        assert!(store.lookup("1.2.3.4", T0 + 999).block.is_active(T0 + 999));
        assert_eq!(store.lookup("1.2.3.4", T0 + 1_000).block, BlockState::None);
        // And the record itself was cleared, not just the snapshot.
        assert!(store.blocklist(T0 + 1_000).is_empty());
    }

    #[test]
    fn blocking_merges_stronger_wins() {
        let store = store();
        store.block("1.2.3.4", BlockState::Temporary { expires_at_ms: T0 + 5_000 }, "first", T0);
        store.block("1.2.3.4", BlockState::Temporary { expires_at_ms: T0 + 1_000 }, "weaker", T0);
        assert_eq!(
            store.lookup("1.2.3.4", T0).block,
            BlockState::Temporary { expires_at_ms: T0 + 5_000 }
        );

        store.block("1.2.3.4", BlockState::Permanent, "perm", T0);
        assert_eq!(store.lookup("1.2.3.4", T0).block, BlockState::Permanent);

        // A temporary request cannot downgrade a permanent block.
        store.block("1.2.3.4", BlockState::Temporary { expires_at_ms: T0 + 9_000 }, "late", T0);
        assert_eq!(store.lookup("1.2.3.4", T0).block, BlockState::Permanent);
    }

    #[test]
    fn unblock_clears_state() {
        let store = store();
        store.block("1.2.3.4", BlockState::Permanent, "perm", T0);
        assert!(store.unblock("1.2.3.4"));
        assert_eq!(store.lookup("1.2.3.4", T0).block, BlockState::None);
        assert!(!store.unblock("1.2.3.4"));
    }

    #[test]
    fn purge_keeps_meaningful_records() {
        let store = store();
        store.whitelist("keep-whitelisted", T0);
        store.block("keep-blocked", BlockState::Permanent, "perm", T0);
        store.add_score("drop-idle", 1.0, T0);

        // Far enough out that the idle client's score has fully decayed.
        let later = T0 + 10 * HOUR;
        store.purge_idle(HOUR, later);

        assert_eq!(store.tracked_clients(), 2);
        assert!(store.lookup("keep-whitelisted", later).whitelisted);
    }
}
