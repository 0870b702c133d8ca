//! Pattern detection pipeline.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → field iterator (path, query values, header values, body text)
//!     → every enabled category's signature table
//!     → Vec<ThreatFinding> (category, severity, field, evidence)
//! ```
//!
//! # Design Decisions
//! - Pure function of the request: no shared state, safe to run fully in
//!   parallel across requests
//! - Severity is per-signature; the decision policy aggregates
//! - Undecodable bytes are matched lossily, never an error
//! - Signature tables compile once at construction and never change

pub mod signatures;

use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::request::RequestContext;
use signatures::{Signature, SignatureSet};

/// Attack category a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    SqlInjection,
    Xss,
    CommandInjection,
    PathTraversal,
    Ssrf,
    Xxe,
    OversizedPayload,
}

impl ThreatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::SqlInjection => "sql_injection",
            ThreatCategory::Xss => "xss",
            ThreatCategory::CommandInjection => "command_injection",
            ThreatCategory::PathTraversal => "path_traversal",
            ThreatCategory::Ssrf => "ssrf",
            ThreatCategory::Xxe => "xxe",
            ThreatCategory::OversizedPayload => "oversized_payload",
        }
    }
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatCategory::SqlInjection => write!(f, "SQL Injection"),
            ThreatCategory::Xss => write!(f, "Cross-Site Scripting"),
            ThreatCategory::CommandInjection => write!(f, "Command Injection"),
            ThreatCategory::PathTraversal => write!(f, "Path Traversal"),
            ThreatCategory::Ssrf => write!(f, "Server-Side Request Forgery"),
            ThreatCategory::Xxe => write!(f, "XML External Entity"),
            ThreatCategory::OversizedPayload => write!(f, "Oversized Payload"),
        }
    }
}

/// Finding severity, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One detected indicator. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct ThreatFinding {
    pub category: ThreatCategory,
    pub severity: Severity,
    /// Which request field triggered the match, e.g. `query:username`.
    pub matched_field: String,
    /// Bounded snippet of the matched text.
    pub evidence: String,
    /// Name of the signature that fired.
    pub signature: &'static str,
}

/// Upper bound on findings per request; past this the request is already
/// as suspicious as it can get and further scanning is wasted work.
const MAX_FINDINGS: usize = 64;

/// Stateless multi-category detector.
pub struct PatternDetector {
    sets: Vec<SignatureSet>,
    url_re: regex::Regex,
    ssrf_enabled: bool,
    oversize_threshold: usize,
    evidence_max: usize,
}

impl PatternDetector {
    /// Build the detector, compiling every enabled category's table.
    pub fn new(config: &DetectionConfig) -> Result<Self, regex::Error> {
        let mut sets = Vec::new();
        let cats = &config.categories;
        if cats.sql_injection {
            sets.push(SignatureSet {
                category: ThreatCategory::SqlInjection,
                signatures: signatures::sql_injection()?,
            });
        }
        if cats.xss {
            sets.push(SignatureSet {
                category: ThreatCategory::Xss,
                signatures: signatures::xss()?,
            });
        }
        if cats.command_injection {
            sets.push(SignatureSet {
                category: ThreatCategory::CommandInjection,
                signatures: signatures::command_injection()?,
            });
        }
        if cats.path_traversal {
            sets.push(SignatureSet {
                category: ThreatCategory::PathTraversal,
                signatures: signatures::path_traversal()?,
            });
        }
        if cats.ssrf {
            sets.push(SignatureSet {
                category: ThreatCategory::Ssrf,
                signatures: signatures::ssrf()?,
            });
        }
        if cats.xxe {
            sets.push(SignatureSet {
                category: ThreatCategory::Xxe,
                signatures: signatures::xxe()?,
            });
        }
        Ok(Self {
            sets,
            url_re: regex::Regex::new(r"(?i)\b[a-z][a-z0-9+.-]*://[^\s\x22'<>]+")?,
            ssrf_enabled: cats.ssrf,
            oversize_threshold: config.oversize_threshold_bytes,
            evidence_max: config.evidence_max_chars,
        })
    }

    /// Scan every field of the request against every enabled category.
    pub fn detect(&self, ctx: &RequestContext) -> Vec<ThreatFinding> {
        let mut findings = Vec::new();

        if ctx.declared_body_len > self.oversize_threshold {
            findings.push(ThreatFinding {
                category: ThreatCategory::OversizedPayload,
                severity: Severity::Medium,
                matched_field: "body".to_string(),
                evidence: format!("{} bytes", ctx.declared_body_len),
                signature: "oversized-payload",
            });
        }

        self.scan_field("path", &ctx.path, &mut findings);
        if let Some(decoded) = percent_decode(&ctx.path) {
            self.scan_field("path", &decoded, &mut findings);
        }
        for (key, value) in &ctx.query {
            let field = format!("query:{key}");
            self.scan_field(&field, value, &mut findings);
            if let Some(decoded) = percent_decode(value) {
                self.scan_field(&field, &decoded, &mut findings);
            }
        }
        for (name, value) in &ctx.headers {
            self.scan_field(&format!("header:{name}"), value, &mut findings);
        }
        self.scan_field("body", &ctx.body_text(), &mut findings);

        findings
    }

    fn scan_field(&self, field: &str, text: &str, findings: &mut Vec<ThreatFinding>) {
        if text.is_empty() || findings.len() >= MAX_FINDINGS {
            return;
        }
        let lowered = text.to_lowercase();

        for set in &self.sets {
            for sig in &set.signatures {
                if findings.len() >= MAX_FINDINGS {
                    return;
                }
                // At most one finding per signature per field.
                if already_found(findings, field, sig) {
                    continue;
                }
                if let Some((start, end)) = sig.find(text, &lowered) {
                    findings.push(ThreatFinding {
                        category: set.category,
                        severity: sig.severity,
                        matched_field: field.to_string(),
                        evidence: snippet(text, start, end, self.evidence_max),
                        signature: sig.name,
                    });
                }
            }
        }

        if self.ssrf_enabled {
            self.scan_ssrf_targets(field, text, findings);
        }
    }

    /// Parse embedded URLs and classify their hosts against the loopback /
    /// link-local / metadata ranges.
    fn scan_ssrf_targets(&self, field: &str, text: &str, findings: &mut Vec<ThreatFinding>) {
        for m in self.url_re.find_iter(text) {
            if findings.len() >= MAX_FINDINGS {
                return;
            }
            let Ok(parsed) = url::Url::parse(m.as_str()) else {
                continue;
            };
            let Some(host) = parsed.host_str() else {
                continue;
            };
            if let Some((name, severity)) = signatures::ssrf_target_severity(host) {
                if findings.iter().any(|f| f.signature == name && f.matched_field == field) {
                    continue;
                }
                findings.push(ThreatFinding {
                    category: ThreatCategory::Ssrf,
                    severity,
                    matched_field: field.to_string(),
                    evidence: snippet(text, m.start(), m.end(), self.evidence_max),
                    signature: name,
                });
            }
        }
    }
}

fn already_found(findings: &[ThreatFinding], field: &str, sig: &Signature) -> bool {
    findings
        .iter()
        .any(|f| f.signature == sig.name && f.matched_field == field)
}

/// Extract a bounded, char-boundary-safe snippet around a match.
fn snippet(text: &str, start: usize, end: usize, max_chars: usize) -> String {
    let mut lo = start;
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = end.min(text.len());
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    text[lo..hi].chars().take(max_chars).collect()
}

/// Decode `%xx` escapes (and `+` as space). Returns None when the input
/// contains no escapes, so callers skip the redundant second scan.
fn percent_decode(input: &str) -> Option<String> {
    if !input.contains('%') && !input.contains('+') {
        return None;
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Some(String::from_utf8_lossy(&out).into_owned())
}
