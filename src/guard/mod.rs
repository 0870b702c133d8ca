//! Axum middleware that puts the engine in front of an application.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → buffer body up to the configured cap
//!     → build RequestContext snapshot
//!     → engine.evaluate()
//!     → Allow/Monitor: pass through with the buffered body restored
//!     → RateLimit: 429 with a machine-readable reason
//!     → Block*: 403 with a machine-readable reason
//! ```
//!
//! The engine itself never produces HTTP responses; this module owns the
//! mapping from decisions to status codes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, State},
    http::{header::CONTENT_LENGTH, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::policy::{Action, Decision, SecurityEngine};
use crate::request::{unix_ms, RequestContext};

/// State for the guard middleware.
#[derive(Clone)]
pub struct GuardState {
    pub engine: Arc<SecurityEngine>,
}

/// Middleware function evaluating every request before the application
/// sees it.
pub async fn security_middleware(
    State(state): State<GuardState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let cap = state.engine.config().detection.max_body_bytes;
    let (parts, body) = request.into_parts();

    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    // A declared length over the cap is decided without touching the body
    // stream, so an allowed oversized upload still reaches the app intact.
    if let Some(declared) = declared.filter(|&d| d > cap) {
        let mut ctx = build_context(&parts, addr);
        ctx.declared_body_len = declared;
        let decision = state.engine.evaluate(&ctx).await;
        if decision.action.permits() {
            return next.run(Request::from_parts(parts, body)).await;
        }
        return rejection(&decision);
    }

    match to_bytes(body, cap).await {
        Ok(bytes) => {
            let mut ctx = build_context(&parts, addr);
            ctx.declared_body_len = bytes.len();
            ctx.body = bytes.to_vec();
            let decision = state.engine.evaluate(&ctx).await;
            if decision.action.permits() {
                return next.run(Request::from_parts(parts, Body::from(bytes))).await;
            }
            rejection(&decision)
        }
        Err(_) => {
            // Chunked body past the cap: the stream is consumed, so even an
            // allowing decision cannot be forwarded.
            let mut ctx = build_context(&parts, addr);
            ctx.declared_body_len = cap + 1;
            let decision = state.engine.evaluate(&ctx).await;
            if decision.action.permits() {
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
            rejection(&decision)
        }
    }
}

fn build_context(parts: &Parts, addr: SocketAddr) -> RequestContext {
    let mut ctx = RequestContext::new(
        addr.ip(),
        parts.method.as_str(),
        parts.uri.path(),
        unix_ms(),
    );
    ctx.query = parse_query(parts.uri.query().unwrap_or(""));
    ctx.headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    ctx
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn rejection(decision: &Decision) -> Response {
    let status = match decision.action {
        Action::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::FORBIDDEN,
    };
    let body = Json(serde_json::json!({
        "error": if decision.action == Action::RateLimit { "rate_limited" } else { "blocked" },
        "reason": decision.reason.as_str(),
        "decision_id": decision.id,
    }));
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_parse_in_order() {
        let pairs = parse_query("a=1&b=two&flag");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
        assert!(parse_query("").is_empty());
    }
}
