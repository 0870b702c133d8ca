//! Per-client rate limiting over sliding horizons.
//!
//! # Design Decisions
//! - Three horizons: burst (seconds), minute, hour; burst is checked first
//!   since it is the cheapest to evaluate and the most likely to stop an
//!   abusive run early
//! - Sliding log per horizon: memory per client is bounded by the sum of
//!   the horizon limits, because rejected requests are not recorded
//! - Check-then-increment runs under the client's `DashMap` entry lock, so
//!   concurrent requests from the same client cannot race past a limit
//! - Idle clients are evictable once the largest horizon has passed

use std::collections::VecDeque;

use dashmap::DashMap;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Which horizon a request violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    Burst,
    Minute,
    Hour,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Burst => "burst",
            Horizon::Minute => "minute",
            Horizon::Hour => "hour",
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a combined check-and-increment.
#[derive(Debug, Clone, Copy)]
pub struct RateStatus {
    pub within_limits: bool,
    pub violated: Option<Horizon>,
}

impl RateStatus {
    fn ok() -> Self {
        Self {
            within_limits: true,
            violated: None,
        }
    }

    fn violation(horizon: Horizon) -> Self {
        Self {
            within_limits: false,
            violated: Some(horizon),
        }
    }
}

#[derive(Default)]
struct ClientWindows {
    burst: VecDeque<u64>,
    minute: VecDeque<u64>,
    hour: VecDeque<u64>,
    last_seen_ms: u64,
}

/// Sliding-window rate limiter, one instance per engine.
pub struct RateLimiter {
    clients: DashMap<String, ClientWindows>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            clients: DashMap::new(),
            config,
        }
    }

    /// Check all horizons and, if none is exhausted, record the request in
    /// each. One logical operation under the client's entry lock.
    pub fn check_and_increment(&self, client: &str, now_ms: u64) -> RateStatus {
        if !self.config.enabled {
            return RateStatus::ok();
        }

        let mut windows = self.clients.entry(client.to_string()).or_default();
        windows.last_seen_ms = now_ms;

        let burst_window = self.config.burst_window_secs * 1_000;
        let checks = [
            (Horizon::Burst, burst_window, self.config.burst_limit),
            (Horizon::Minute, 60_000, self.config.per_minute),
            (Horizon::Hour, 3_600_000, self.config.per_hour),
        ];

        for (horizon, window_ms, limit) in checks {
            let log = match horizon {
                Horizon::Burst => &mut windows.burst,
                Horizon::Minute => &mut windows.minute,
                Horizon::Hour => &mut windows.hour,
            };
            prune(log, now_ms, window_ms);
            if log.len() as u32 >= limit {
                debug!(client, horizon = %horizon, limit, "rate limit exceeded");
                metrics::record_rate_limited(horizon.as_str());
                return RateStatus::violation(horizon);
            }
        }

        windows.burst.push_back(now_ms);
        windows.minute.push_back(now_ms);
        windows.hour.push_back(now_ms);
        RateStatus::ok()
    }

    /// Drop clients idle past the largest horizon.
    pub fn evict_idle(&self, now_ms: u64) {
        let cutoff = 3_600_000u64;
        let before = self.clients.len();
        self.clients
            .retain(|_, w| now_ms.saturating_sub(w.last_seen_ms) < cutoff);
        let dropped = before - self.clients.len();
        if dropped > 0 {
            debug!(dropped, "evicted idle rate-limit entries");
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

fn prune(log: &mut VecDeque<u64>, now_ms: u64, window_ms: u64) {
    let cutoff = now_ms.saturating_sub(window_ms);
    while log.front().is_some_and(|&t| t <= cutoff) {
        log.pop_front();
    }
}
