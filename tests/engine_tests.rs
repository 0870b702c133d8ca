//! End-to-end decision properties of the engine.

use std::sync::Arc;

use blackwall::detect::{Severity, ThreatCategory};
use blackwall::policy::{Action, ReasonCode};
use blackwall::state::BlockState;
use blackwall::SecurityEngine;

mod common;
use common::{ambiguous_request, benign_request, engine_config, request, sqli_login, T0};

const MINUTE: u64 = 60_000;

#[tokio::test]
async fn critical_sqli_is_never_allowed() {
    let engine = SecurityEngine::new(engine_config()).unwrap();

    for (i, payload) in [
        "q=1 UNION SELECT username, password FROM users",
        "id=1'; DROP TABLE accounts;--",
    ]
    .iter()
    .enumerate()
    {
        let client = format!("203.0.113.{}", 10 + i);
        let ctx = request(&client, "/search", T0).with_body(payload.as_bytes().to_vec());
        let decision = engine.evaluate(&ctx).await;
        assert!(decision.action.is_block(), "payload {:?} must block", payload);
        assert_eq!(decision.reason, ReasonCode::ConfidentFinding);
        assert!(decision
            .findings
            .iter()
            .any(|f| f.category == ThreatCategory::SqlInjection && f.severity == Severity::Critical));
    }
}

#[tokio::test]
async fn whitelisted_client_is_always_allowed() {
    let mut config = engine_config();
    config.rate_limit.per_minute = 2;
    let engine = SecurityEngine::new(config).unwrap();
    engine.ip_store().whitelist("203.0.113.7", T0);

    // Malicious payloads, repeated well past the rate limit.
    for i in 0..20u64 {
        let decision = engine.evaluate(&sqli_login("203.0.113.7", T0 + i)).await;
        assert_eq!(decision.action, Action::Allow);
        assert_eq!(decision.reason, ReasonCode::Whitelisted);
        // Findings stay visible for audit, they just drive nothing.
        assert!(!decision.findings.is_empty());
    }
    assert_eq!(engine.ip_store().lookup("203.0.113.7", T0 + 20).score, 0.0);
}

#[tokio::test]
async fn rate_limit_boundary_is_exact() {
    let mut config = engine_config();
    config.rate_limit.per_minute = 10;
    let engine = SecurityEngine::new(config).unwrap();

    for i in 0..10u64 {
        let decision = engine.evaluate(&benign_request("198.51.100.4", T0 + i)).await;
        assert_eq!(decision.action, Action::Allow, "request {} should pass", i + 1);
    }
    let decision = engine.evaluate(&benign_request("198.51.100.4", T0 + 10)).await;
    assert_eq!(decision.action, Action::RateLimit);
    assert_eq!(decision.reason, ReasonCode::RateLimitExceeded);

    // A different client is unaffected.
    let decision = engine.evaluate(&benign_request("198.51.100.5", T0 + 11)).await;
    assert_eq!(decision.action, Action::Allow);
}

#[tokio::test]
async fn temporary_block_honored_strictly_until_expiry() {
    let mut config = engine_config();
    config.policy.confident_severity = Severity::High;
    config.blocks.base_duration_secs = 300;
    let engine = SecurityEngine::new(config).unwrap();

    let decision = engine.evaluate(&sqli_login("203.0.113.7", T0)).await;
    assert_eq!(decision.action, Action::BlockTemporary);

    let expiry = T0 + 300 * 1_000;

    let decision = engine.evaluate(&benign_request("203.0.113.7", expiry - 1)).await;
    assert_eq!(decision.action, Action::BlockTemporary);
    assert_eq!(decision.reason, ReasonCode::ActiveBlock);

    // At the expiry instant the block is gone; the lingering score keeps
    // the client in the watch band but the request goes through.
    let decision = engine.evaluate(&benign_request("203.0.113.7", expiry)).await;
    assert!(decision.action.permits(), "got {:?}", decision.action);
}

#[tokio::test]
async fn block_durations_escalate_to_permanent() {
    let mut config = engine_config();
    config.policy.confident_severity = Severity::High;
    config.scoring.decay_per_hour = 1_000_000.0; // isolate offenses from the score path
    config.blocks.base_duration_secs = 100;
    config.blocks.permanent_after = 3;
    let engine = SecurityEngine::new(config).unwrap();

    let mut now = T0;

    // First offense: base duration.
    let d1 = engine.evaluate(&sqli_login("203.0.113.7", now)).await;
    assert_eq!(d1.action, Action::BlockTemporary);

    // Reoffend after expiry: doubled duration.
    now += 101 * 1_000;
    let d2 = engine.evaluate(&sqli_login("203.0.113.7", now)).await;
    assert_eq!(d2.action, Action::BlockTemporary);
    let blocked = engine.ip_store().blocklist(now);
    match blocked[0].state {
        BlockState::Temporary { expires_at_ms } => {
            assert_eq!(expires_at_ms, now + 200 * 1_000);
        }
        other => panic!("expected temporary block, got {:?}", other),
    }

    // Third offense crosses the permanent line.
    now += 201 * 1_000;
    let d3 = engine.evaluate(&sqli_login("203.0.113.7", now)).await;
    assert_eq!(d3.action, Action::BlockPermanent);
    assert_eq!(engine.ip_store().lookup("203.0.113.7", now).block, BlockState::Permanent);
}

#[tokio::test]
async fn suspicion_bands_drive_clean_request_actions() {
    let engine = SecurityEngine::new(engine_config()).unwrap();
    let store = engine.ip_store();

    store.add_score("10.0.0.1", 15.0, T0);
    let decision = engine.evaluate(&benign_request("10.0.0.1", T0)).await;
    assert_eq!(decision.action, Action::Monitor);
    assert_eq!(decision.reason, ReasonCode::SuspicionElevated);

    store.add_score("10.0.0.2", 30.0, T0);
    let decision = engine.evaluate(&benign_request("10.0.0.2", T0)).await;
    assert_eq!(decision.action, Action::RateLimit);

    store.add_score("10.0.0.3", 70.0, T0);
    let decision = engine.evaluate(&benign_request("10.0.0.3", T0)).await;
    assert_eq!(decision.action, Action::BlockTemporary);
    assert_eq!(decision.reason, ReasonCode::SuspicionThreshold);

    store.add_score("10.0.0.4", 5.0, T0);
    let decision = engine.evaluate(&benign_request("10.0.0.4", T0)).await;
    assert_eq!(decision.action, Action::Allow);
}

#[tokio::test]
async fn score_decays_between_requests() {
    let mut config = engine_config();
    config.policy.confident_severity = Severity::Critical;
    let engine = SecurityEngine::new(config).unwrap();

    // One high finding: +15, then escalation is unavailable and the
    // default fail-open policy lets it through.
    let decision = engine.evaluate(&sqli_login("203.0.113.7", T0)).await;
    assert_eq!(decision.score, 15.0);

    // Two idle hours at 5 points per hour.
    let snap = engine.ip_store().lookup("203.0.113.7", T0 + 2 * 3_600_000);
    assert!((snap.score - 5.0).abs() < 1e-9);
    assert!(snap.score >= 0.0);

    // Much later the floor holds.
    assert_eq!(engine.ip_store().lookup("203.0.113.7", T0 + 100 * 3_600_000).score, 0.0);
}

#[tokio::test]
async fn ambiguous_without_gateway_applies_fail_open() {
    let engine = SecurityEngine::new(engine_config()).unwrap();
    let decision = engine.evaluate(&ambiguous_request("203.0.113.9", T0)).await;
    assert_eq!(decision.action, Action::Allow);
    assert_eq!(decision.reason, ReasonCode::EscalationUnavailable);
    assert!(!decision.escalated);
}

#[tokio::test]
async fn ambiguous_without_gateway_applies_fail_closed() {
    let mut config = engine_config();
    config.escalation.fallback = blackwall::config::FallbackPolicy::FailClosed;
    let engine = SecurityEngine::new(config).unwrap();
    let decision = engine.evaluate(&ambiguous_request("203.0.113.9", T0)).await;
    assert_eq!(decision.action, Action::RateLimit);
    assert_eq!(decision.reason, ReasonCode::EscalationUnavailable);
}

#[tokio::test]
async fn concurrent_requests_cannot_race_past_the_limit() {
    let mut config = engine_config();
    config.rate_limit.per_minute = 10;
    config.rate_limit.burst_limit = 100;
    let engine = Arc::new(SecurityEngine::new(config).unwrap());

    let mut handles = Vec::new();
    for _ in 0..50 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.evaluate(&benign_request("198.51.100.77", T0)).await.action
        }));
    }

    let mut allowed = 0;
    let mut rate_limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Action::Allow => allowed += 1,
            Action::RateLimit => rate_limited += 1,
            other => panic!("unexpected action {:?}", other),
        }
    }
    assert_eq!(allowed, 10);
    assert_eq!(rate_limited, 40);
}

#[tokio::test]
async fn login_injection_scenario_blocks_with_high_confidence_policy() {
    // Policy pinned explicitly: high-severity findings block immediately.
    let mut config = engine_config();
    config.policy.confident_severity = Severity::High;
    let engine = SecurityEngine::new(config).unwrap();

    let decision = engine.evaluate(&sqli_login("203.0.113.7", T0)).await;

    assert_eq!(decision.action, Action::BlockTemporary);
    assert_eq!(decision.reason, ReasonCode::ConfidentFinding);
    assert!(decision
        .findings
        .iter()
        .any(|f| f.category == ThreatCategory::SqlInjection && f.severity == Severity::High));
    assert_eq!(decision.score, 15.0);
    assert!(!decision.escalated);

    let analytics = engine.analytics();
    assert_eq!(analytics.blocked, 1);
    assert_eq!(analytics.escalations, 0);
}

#[tokio::test]
async fn rate_window_slides_open_after_a_minute() {
    let mut config = engine_config();
    config.rate_limit.per_minute = 3;
    let engine = SecurityEngine::new(config).unwrap();

    for i in 0..3u64 {
        assert_eq!(
            engine.evaluate(&benign_request("10.9.8.7", T0 + i)).await.action,
            Action::Allow
        );
    }
    assert_eq!(
        engine.evaluate(&benign_request("10.9.8.7", T0 + 3)).await.action,
        Action::RateLimit
    );
    assert_eq!(
        engine.evaluate(&benign_request("10.9.8.7", T0 + MINUTE)).await.action,
        Action::Allow
    );
}
