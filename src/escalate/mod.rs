//! Escalation gateway to the external analysis service.
//!
//! # Responsibilities
//! - Package a sanitized request summary (no credentials forwarded)
//! - POST it to the analysis endpoint with a hard deadline
//! - Map the verdict, or its absence, into the policy's vocabulary
//!
//! # Design Decisions
//! - Single attempt per request: escalation is latency-sensitive, a retry
//!   would double the worst-case stall
//! - A missed deadline is a distinguished `EscalationError::Timeout`, never
//!   a panic or an unresolved future
//! - Many escalations may be in flight at once; each carries its own
//!   deadline and none blocks unrelated traffic

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::config::EscalationConfig;
use crate::detect::{Severity, ThreatCategory, ThreatFinding};
use crate::request::RequestContext;

/// Header values that must never leave the process.
const REDACTED_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

/// Cap on the body excerpt forwarded for analysis.
const SUMMARY_BODY_CHARS: usize = 2_048;

/// Errors from a single escalation attempt.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// The analysis service did not answer within the deadline.
    #[error("analysis request timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure reaching the service.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("analysis service returned status {0}")]
    Status(u16),

    /// The response body did not parse as a verdict.
    #[error("malformed verdict: {0}")]
    Malformed(String),
}

/// What the analysis service concluded.
#[derive(Debug, Clone, Deserialize)]
pub struct Verdict {
    pub malicious: bool,
    #[serde(default)]
    pub recommended_action: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Wire request sent to the analysis service.
#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    model: &'a str,
    client: String,
    method: &'a str,
    path: &'a str,
    headers: Vec<(String, String)>,
    body_excerpt: String,
    findings: Vec<FindingSummary<'a>>,
}

#[derive(Debug, Serialize)]
struct FindingSummary<'a> {
    category: ThreatCategory,
    severity: Severity,
    field: &'a str,
    signature: &'a str,
}

/// Client for the external analysis collaborator.
pub struct EscalationGateway {
    http: reqwest::Client,
    config: EscalationConfig,
}

impl EscalationGateway {
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Ask the analysis service for a verdict on an ambiguous request.
    pub async fn escalate(
        &self,
        ctx: &RequestContext,
        findings: &[ThreatFinding],
    ) -> Result<Verdict, EscalationError> {
        let payload = self.sanitize(ctx, findings);
        let deadline = Duration::from_millis(self.config.timeout_ms);

        let request = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send();

        let response = match timeout(deadline, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(EscalationError::Transport(e)),
            Err(_) => return Err(EscalationError::Timeout(self.config.timeout_ms)),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(EscalationError::Status(status.as_u16()));
        }

        let verdict = match timeout(deadline, response.json::<Verdict>()).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Err(EscalationError::Malformed(e.to_string())),
            Err(_) => return Err(EscalationError::Timeout(self.config.timeout_ms)),
        };

        debug!(
            malicious = verdict.malicious,
            rationale = verdict.rationale.as_deref().unwrap_or(""),
            "analysis verdict received"
        );
        Ok(verdict)
    }

    /// Build the outbound summary: credential-bearing headers redacted,
    /// body truncated.
    fn sanitize<'a>(
        &'a self,
        ctx: &'a RequestContext,
        findings: &'a [ThreatFinding],
    ) -> AnalysisRequest<'a> {
        let headers = ctx
            .headers
            .iter()
            .map(|(name, value)| {
                if REDACTED_HEADERS.contains(&name.to_lowercase().as_str()) {
                    (name.clone(), "[redacted]".to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect();

        AnalysisRequest {
            model: &self.config.model,
            client: ctx.client_key(),
            method: &ctx.method,
            path: &ctx.path,
            headers,
            body_excerpt: ctx.body_text().chars().take(SUMMARY_BODY_CHARS).collect(),
            findings: findings
                .iter()
                .map(|f| FindingSummary {
                    category: f.category,
                    severity: f.severity,
                    field: &f.matched_field,
                    signature: f.signature,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn gateway() -> EscalationGateway {
        EscalationGateway::new(EscalationConfig {
            enabled: true,
            endpoint: "http://127.0.0.1:1/analyze".to_string(),
            ..EscalationConfig::default()
        })
    }

    #[test]
    fn credentials_are_redacted_from_summaries() {
        let ctx = RequestContext::new("10.0.0.1".parse::<IpAddr>().unwrap(), "POST", "/login", 0)
            .with_header("Authorization", "Bearer secret-token")
            .with_header("Cookie", "session=abc")
            .with_header("User-Agent", "curl/8");
        let gw = gateway();
        let summary = gw.sanitize(&ctx, &[]);

        let redacted: Vec<_> = summary
            .headers
            .iter()
            .filter(|(_, v)| v == "[redacted]")
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(redacted, vec!["Authorization", "Cookie"]);
        assert!(summary.headers.iter().any(|(n, v)| n == "User-Agent" && v == "curl/8"));
    }

    #[test]
    fn body_excerpt_is_bounded() {
        let ctx = RequestContext::new("10.0.0.1".parse::<IpAddr>().unwrap(), "POST", "/x", 0)
            .with_body(vec![b'a'; 100_000]);
        let gw = gateway();
        assert_eq!(gw.sanitize(&ctx, &[]).body_excerpt.len(), SUMMARY_BODY_CHARS);
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let ctx = RequestContext::new("10.0.0.1".parse::<IpAddr>().unwrap(), "GET", "/", 0);
        let err = gateway().escalate(&ctx, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            EscalationError::Transport(_) | EscalationError::Timeout(_)
        ));
    }
}
