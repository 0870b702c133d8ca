//! Per-category signature tables.
//!
//! Each category contributes an independent list of signatures: literal
//! substrings (matched case-insensitively against lowercased text) and
//! compiled regular expressions. Severity is assigned per signature, not
//! derived from combinations; aggregation is the policy's job.
//!
//! Tables are built once at engine construction and are immutable after
//! that. Reloading signature sets is a deployment concern, not a mutation
//! surface of the engine.

use regex::Regex;

use super::{Severity, ThreatCategory};

/// How a single signature matches a field.
pub enum Pattern {
    /// Case-insensitive literal; the needle must be lowercase.
    Substring(&'static str),
    /// Compiled regular expression.
    Regex(Regex),
}

/// One detection signature with its own severity.
pub struct Signature {
    pub name: &'static str,
    pub pattern: Pattern,
    pub severity: Severity,
}

impl Signature {
    fn substring(name: &'static str, needle: &'static str, severity: Severity) -> Self {
        Self {
            name,
            pattern: Pattern::Substring(needle),
            severity,
        }
    }

    fn regex(name: &'static str, pattern: &str, severity: Severity) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Pattern::Regex(Regex::new(pattern)?),
            severity,
        })
    }

    /// Check `text` (and `lowered`, its lowercase form) for a match,
    /// returning the matched byte range on a hit.
    pub fn find(&self, text: &str, lowered: &str) -> Option<(usize, usize)> {
        match &self.pattern {
            Pattern::Substring(needle) => lowered.find(needle).map(|s| (s, s + needle.len())),
            Pattern::Regex(re) => re.find(text).map(|m| (m.start(), m.end())),
        }
    }
}

/// A category's signature list.
pub struct SignatureSet {
    pub category: ThreatCategory,
    pub signatures: Vec<Signature>,
}

pub fn sql_injection() -> Result<Vec<Signature>, regex::Error> {
    Ok(vec![
        Signature::regex("sqli-union-select", r"(?i)\bunion\b[\s/*]+(all[\s/*]+)?select\b", Severity::Critical)?,
        Signature::regex("sqli-stacked-drop", r"(?i);\s*drop\s+(table|database)\b", Severity::Critical)?,
        Signature::substring("sqli-xp-cmdshell", "xp_cmdshell", Severity::Critical),
        Signature::regex("sqli-quote-or-equals", r#"(?i)['"]\s*or\s+['"]?[\w\s]+['"]?\s*=\s*['"]?[\w\s]+"#, Severity::High)?,
        Signature::regex("sqli-time-based", r"(?i)\b(sleep|benchmark|waitfor)\s*\(", Severity::High)?,
        Signature::substring("sqli-information-schema", "information_schema", Severity::High),
        Signature::regex("sqli-stacked-dml", r"(?i);\s*(insert|update|delete)\s", Severity::Medium)?,
        Signature::regex("sqli-comment-trail", r"(--|#|/\*)\s*$", Severity::Low)?,
    ])
}

pub fn xss() -> Result<Vec<Signature>, regex::Error> {
    Ok(vec![
        Signature::substring("xss-script-tag", "<script", Severity::High),
        Signature::regex("xss-event-handler", r"(?i)\bon(error|load|click|mouseover|focus|submit)\s*=", Severity::High)?,
        Signature::regex("xss-document-access", r"(?i)document\s*\.\s*(cookie|location|write)", Severity::High)?,
        Signature::substring("xss-javascript-uri", "javascript:", Severity::Medium),
        Signature::regex("xss-embed-tag", r"(?i)<\s*(iframe|embed|object|svg)\b", Severity::Medium)?,
        Signature::regex("xss-data-uri-html", r"(?i)data:text/html", Severity::Medium)?,
        Signature::regex("xss-alert-probe", r"(?i)\balert\s*\(", Severity::Low)?,
    ])
}

pub fn command_injection() -> Result<Vec<Signature>, regex::Error> {
    Ok(vec![
        Signature::regex("cmdi-destructive", r"(?i)[;&|]\s*rm\s+-rf?\b", Severity::Critical)?,
        Signature::regex("cmdi-reverse-shell", r"(?i)(nc\s+-e|/bin/(ba|z)?sh\s+-i|bash\s+-c)", Severity::Critical)?,
        Signature::regex("cmdi-chained-probe", r"(?i)[;&|`]\s*(cat|id|whoami|uname|pwd|ls)\b", Severity::High)?,
        Signature::regex("cmdi-remote-fetch", r"(?i)[;&|`]\s*(wget|curl)\s+", Severity::High)?,
        Signature::substring("cmdi-subshell", "$(", Severity::Medium),
        Signature::substring("cmdi-backtick", "`", Severity::Low),
    ])
}

pub fn path_traversal() -> Result<Vec<Signature>, regex::Error> {
    Ok(vec![
        Signature::regex("traversal-deep", r"(\.\./){2,}|(\.\.\\){2,}", Severity::High)?,
        Signature::regex("traversal-encoded", r"(?i)(%2e%2e[/\\%]|\.\.%2f|%c0%ae)", Severity::High)?,
        Signature::regex("traversal-sensitive-file", r"(?i)(/etc/(passwd|shadow)|boot\.ini|win\.ini)", Severity::High)?,
        Signature::substring("traversal-null-byte", "%00", Severity::High),
        Signature::substring("traversal-dot-dot-slash", "../", Severity::Medium),
        Signature::substring("traversal-dot-dot-backslash", "..\\", Severity::Medium),
    ])
}

/// Scheme-based SSRF signatures. Address-range checks live in
/// [`ssrf_target_severity`], which needs URL parsing rather than pattern
/// matching.
pub fn ssrf() -> Result<Vec<Signature>, regex::Error> {
    Ok(vec![
        Signature::substring("ssrf-file-scheme", "file://", Severity::High),
        Signature::substring("ssrf-gopher-scheme", "gopher://", Severity::High),
        Signature::substring("ssrf-dict-scheme", "dict://", Severity::Medium),
    ])
}

pub fn xxe() -> Result<Vec<Signature>, regex::Error> {
    Ok(vec![
        Signature::regex("xxe-external-entity-file", r#"(?i)<!entity[^>]+system\s+["'](file|php|expect):"#, Severity::Critical)?,
        Signature::regex("xxe-entity-decl", r"(?i)<!entity\s", Severity::High)?,
        Signature::regex("xxe-doctype-subset", r"(?i)<!doctype[^>]*\[", Severity::Medium)?,
    ])
}

/// Classify the host of an embedded URL for SSRF purposes.
///
/// Loopback, link-local, and private ranges are the classic pivot targets;
/// cloud metadata endpoints are the most damaging and rank highest.
pub fn ssrf_target_severity(host: &str) -> Option<(&'static str, Severity)> {
    if host == "169.254.169.254" || host.eq_ignore_ascii_case("metadata.google.internal") {
        return Some(("ssrf-metadata-endpoint", Severity::Critical));
    }
    if host.eq_ignore_ascii_case("localhost") {
        return Some(("ssrf-loopback-target", Severity::High));
    }
    match host.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(v4)) => {
            if v4.is_loopback() || v4.is_unspecified() {
                Some(("ssrf-loopback-target", Severity::High))
            } else if v4.is_link_local() {
                Some(("ssrf-link-local-target", Severity::High))
            } else if v4.is_private() {
                Some(("ssrf-private-range-target", Severity::High))
            } else {
                None
            }
        }
        Ok(std::net::IpAddr::V6(v6)) => {
            if v6.is_loopback() || v6.is_unspecified() {
                Some(("ssrf-loopback-target", Severity::High))
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(sigs: &[Signature], text: &str) -> Option<&'static str> {
        let lowered = text.to_lowercase();
        sigs.iter()
            .find(|s| s.find(text, &lowered).is_some())
            .map(|s| s.name)
    }

    #[test]
    fn sqli_classic_payloads() {
        let sigs = sql_injection().unwrap();
        assert_eq!(hit(&sigs, "1 UNION SELECT password FROM users"), Some("sqli-union-select"));
        assert_eq!(hit(&sigs, "x'; DROP TABLE users;--"), Some("sqli-stacked-drop"));
        assert_eq!(hit(&sigs, "admin' OR '1'='1"), Some("sqli-quote-or-equals"));
        assert!(hit(&sigs, "ordinary search terms").is_none());
    }

    #[test]
    fn sqli_benign_text_passes() {
        let sigs = sql_injection().unwrap();
        // Words like "selection" or "order" must not trip keyword rules.
        assert!(hit(&sigs, "union membership selection order form").is_none());
    }

    #[test]
    fn xss_payloads() {
        let sigs = xss().unwrap();
        assert_eq!(hit(&sigs, "<script>alert('XSS')</script>"), Some("xss-script-tag"));
        assert_eq!(hit(&sigs, "<img src=x onerror=steal()>"), Some("xss-event-handler"));
        assert!(hit(&sigs, "a plain biography").is_none());
    }

    #[test]
    fn traversal_payloads() {
        let sigs = path_traversal().unwrap();
        assert_eq!(hit(&sigs, "../../../../etc/passwd"), Some("traversal-deep"));
        assert_eq!(hit(&sigs, "%2e%2e%2fconfig"), Some("traversal-encoded"));
    }

    #[test]
    fn ssrf_hosts() {
        assert_eq!(
            ssrf_target_severity("169.254.169.254").map(|(_, s)| s),
            Some(Severity::Critical)
        );
        assert_eq!(
            ssrf_target_severity("127.0.0.1").map(|(_, s)| s),
            Some(Severity::High)
        );
        assert_eq!(
            ssrf_target_severity("10.1.2.3").map(|(_, s)| s),
            Some(Severity::High)
        );
        assert!(ssrf_target_severity("example.com").is_none());
    }
}
