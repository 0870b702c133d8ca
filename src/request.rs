//! Immutable request snapshot handed to the engine.
//!
//! One `RequestContext` is built per inbound request (by the middleware or
//! by an embedding framework) and is read-only for the lifetime of that
//! request's evaluation. The engine never holds onto it past the decision.

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix milliseconds.
pub fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Snapshot of a single inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Network address of the requester.
    pub client_addr: IpAddr,

    /// Authenticated identity, when the embedding layer knows one.
    pub identity: Option<String>,

    /// HTTP method, uppercase.
    pub method: String,

    /// Request path (no query string).
    pub path: String,

    /// Decoded query parameters, in order of appearance.
    pub query: Vec<(String, String)>,

    /// Header name/value pairs, in order of appearance.
    pub headers: Vec<(String, String)>,

    /// Buffered body bytes, capped at the configured maximum.
    pub body: Vec<u8>,

    /// Length the client declared (or we observed), which may exceed
    /// `body.len()` when the body was truncated at the cap.
    pub declared_body_len: usize,

    /// Arrival time in unix milliseconds. All time-based state (rate
    /// windows, block expiry, score decay) is evaluated against this.
    pub received_at_ms: u64,
}

impl RequestContext {
    /// Create a context with empty fields; callers fill in what they have.
    pub fn new(client_addr: IpAddr, method: impl Into<String>, path: impl Into<String>, received_at_ms: u64) -> Self {
        Self {
            client_addr,
            identity: None,
            method: method.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Vec::new(),
            declared_body_len: 0,
            received_at_ms,
        }
    }

    /// Key used for rate/reputation tracking: the address, suffixed with
    /// the authenticated identity when one is present.
    pub fn client_key(&self) -> String {
        match &self.identity {
            Some(id) => format!("{}:{}", self.client_addr, id),
            None => self.client_addr.to_string(),
        }
    }

    /// Body interpreted as text. Undecodable bytes are replaced, never an
    /// error; detection runs over whatever text this yields.
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.declared_body_len = body.len();
        self.body = body;
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}
