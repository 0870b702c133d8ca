//! Append-only decision audit trail.
//!
//! # Design Decisions
//! - `append` never fails the decision path: entries go over an unbounded
//!   channel to a dedicated writer thread, and a send failure is logged
//!   and counted, not propagated
//! - JSON lines to a configured file; without a path, entries land on the
//!   structured log under the `audit` target
//! - Retention and rotation are external concerns; the engine only appends

use std::fs::OpenOptions;
use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::detect::ThreatFinding;
use crate::observability::metrics;
use crate::policy::decision::{Action, Decision, ReasonCode};
use crate::request::RequestContext;

/// One appended record: the request summary plus the decision it produced.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub decision_id: Uuid,
    pub client: String,
    pub method: String,
    pub path: String,
    pub body_bytes: usize,
    pub action: Action,
    pub reason: ReasonCode,
    pub findings: Vec<ThreatFinding>,
    pub score: f64,
    pub escalated: bool,
    pub received_at_ms: u64,
    pub decided_at_ms: u64,
}

impl AuditEntry {
    pub fn new(ctx: &RequestContext, decision: &Decision) -> Self {
        Self {
            decision_id: decision.id,
            client: ctx.client_key(),
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            body_bytes: ctx.declared_body_len,
            action: decision.action,
            reason: decision.reason,
            findings: decision.findings.clone(),
            score: decision.score,
            escalated: decision.escalated,
            received_at_ms: ctx.received_at_ms,
            decided_at_ms: decision.decided_at_ms,
        }
    }
}

/// Handle for appending entries. Cloneable and cheap; the writer thread
/// exits once every handle is dropped.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::UnboundedSender<AuditEntry>,
}

impl AuditLog {
    /// Start the writer thread and return the append handle.
    pub fn new(config: &AuditConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = config.path.clone();
        std::thread::Builder::new()
            .name("audit-writer".to_string())
            .spawn(move || writer_loop(rx, path))
            .expect("spawning audit writer thread");
        Self { tx }
    }

    /// Append an entry. Infallible from the caller's perspective.
    pub fn append(&self, entry: AuditEntry) {
        if self.tx.send(entry).is_err() {
            warn!("audit writer gone, dropping entry");
            metrics::record_audit_drop();
        }
    }
}

fn writer_loop(mut rx: mpsc::UnboundedReceiver<AuditEntry>, path: Option<String>) {
    let mut file = path.as_ref().and_then(|p| {
        match OpenOptions::new().create(true).append(true).open(p) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(path = %p, error = %e, "cannot open audit sink, falling back to log output");
                None
            }
        }
    });

    while let Some(entry) = rx.blocking_recv() {
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "unserializable audit entry dropped");
                metrics::record_audit_drop();
                continue;
            }
        };
        match file.as_mut() {
            Some(f) => {
                if let Err(e) = writeln!(f, "{line}") {
                    warn!(error = %e, "audit write failed");
                    metrics::record_audit_drop();
                }
            }
            None => {
                info!(target: "audit", entry = %line);
            }
        }
    }
}
