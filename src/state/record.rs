//! Per-client record types.

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;

/// Block status of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BlockState {
    None,
    Temporary { expires_at_ms: u64 },
    Permanent,
}

impl BlockState {
    pub fn is_active(&self, now_ms: u64) -> bool {
        match self {
            BlockState::None => false,
            BlockState::Temporary { expires_at_ms } => now_ms < *expires_at_ms,
            BlockState::Permanent => true,
        }
    }

    /// Ranking for stronger-wins merging: permanent beats any temporary,
    /// a later expiry beats an earlier one.
    fn strength(&self) -> (u8, u64) {
        match self {
            BlockState::None => (0, 0),
            BlockState::Temporary { expires_at_ms } => (1, *expires_at_ms),
            BlockState::Permanent => (2, 0),
        }
    }

    pub fn stronger_of(self, other: BlockState) -> BlockState {
        if other.strength() > self.strength() {
            other
        } else {
            self
        }
    }
}

/// Mutable per-client record. Owned by the store; callers only ever see
/// [`IpSnapshot`] copies.
#[derive(Debug, Clone)]
pub(crate) struct IpRecord {
    pub score: f64,
    pub score_updated_ms: u64,
    pub block: BlockState,
    pub block_reason: Option<String>,
    pub whitelisted: bool,
    pub offenses: u32,
    pub last_seen_ms: u64,
}

impl IpRecord {
    pub fn new(now_ms: u64) -> Self {
        Self {
            score: 0.0,
            score_updated_ms: now_ms,
            block: BlockState::None,
            block_reason: None,
            whitelisted: false,
            offenses: 0,
            last_seen_ms: now_ms,
        }
    }

    /// Apply linear decay for the time elapsed since the last score touch.
    /// The floor at zero is an invariant, not a convenience.
    pub fn decay_score(&mut self, scoring: &ScoringConfig, now_ms: u64) {
        if now_ms <= self.score_updated_ms {
            return;
        }
        let hours = (now_ms - self.score_updated_ms) as f64 / 3_600_000.0;
        self.score = (self.score - scoring.decay_per_hour * hours).max(0.0);
        self.score_updated_ms = now_ms;
    }

    /// Clear a temporary block whose expiry has passed.
    pub fn expire_block(&mut self, now_ms: u64) {
        if let BlockState::Temporary { expires_at_ms } = self.block {
            if now_ms >= expires_at_ms {
                self.block = BlockState::None;
                self.block_reason = None;
            }
        }
    }
}

/// Read-only copy of a client's state at lookup time.
#[derive(Debug, Clone)]
pub struct IpSnapshot {
    pub score: f64,
    pub block: BlockState,
    pub whitelisted: bool,
    pub offenses: u32,
}

impl IpSnapshot {
    pub(crate) fn absent() -> Self {
        Self {
            score: 0.0,
            block: BlockState::None,
            whitelisted: false,
            offenses: 0,
        }
    }
}

/// One row of the admin blocklist view.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedClient {
    pub client: String,
    pub state: BlockState,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stronger_of_prefers_permanent_and_later_expiry() {
        let short = BlockState::Temporary { expires_at_ms: 100 };
        let long = BlockState::Temporary { expires_at_ms: 200 };
        assert_eq!(short.stronger_of(long), long);
        assert_eq!(long.stronger_of(short), long);
        assert_eq!(long.stronger_of(BlockState::Permanent), BlockState::Permanent);
        assert_eq!(BlockState::Permanent.stronger_of(long), BlockState::Permanent);
        assert_eq!(BlockState::None.stronger_of(short), short);
    }

    #[test]
    fn temporary_block_active_strictly_before_expiry() {
        let block = BlockState::Temporary { expires_at_ms: 1_000 };
        assert!(block.is_active(999));
        assert!(!block.is_active(1_000));
        assert!(!block.is_active(1_001));
    }
}
