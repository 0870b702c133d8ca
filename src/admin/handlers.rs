use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admin::AdminState;
use crate::policy::AnalyticsSnapshot;
use crate::request::unix_ms;
use crate::state::{BlockState, BlockedClient};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Deserialize)]
pub struct BlockRequest {
    pub client: String,
    /// Permanent block; otherwise temporary for `duration_secs`.
    #[serde(default)]
    pub permanent: bool,
    pub duration_secs: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ClientRequest {
    pub client: String,
}

#[derive(Serialize)]
pub struct MutationOutcome {
    pub client: String,
    pub applied: bool,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_blocklist(State(state): State<AdminState>) -> Json<Vec<BlockedClient>> {
    Json(state.engine.ip_store().blocklist(unix_ms()))
}

pub async fn get_whitelist(State(state): State<AdminState>) -> Json<Vec<String>> {
    Json(state.engine.ip_store().whitelisted())
}

pub async fn get_analytics(State(state): State<AdminState>) -> Json<AnalyticsSnapshot> {
    Json(state.engine.analytics())
}

/// Administrative block. Unlike the automatic policy, this may override a
/// whitelist entry, which is why the whitelist flag is cleared explicitly.
pub async fn post_block(
    State(state): State<AdminState>,
    Json(req): Json<BlockRequest>,
) -> Result<Json<MutationOutcome>, StatusCode> {
    let now = unix_ms();
    let store = state.engine.ip_store();
    let block = if req.permanent {
        BlockState::Permanent
    } else {
        let secs = req.duration_secs.ok_or(StatusCode::BAD_REQUEST)?;
        BlockState::Temporary {
            expires_at_ms: now + secs * 1_000,
        }
    };
    let reason = req.reason.unwrap_or_else(|| "administrative".to_string());
    store.unwhitelist(&req.client);
    store.block(&req.client, block, reason, now);
    info!(client = %req.client, permanent = req.permanent, "administrative block applied");
    Ok(Json(MutationOutcome {
        client: req.client,
        applied: true,
    }))
}

pub async fn post_unblock(
    State(state): State<AdminState>,
    Json(req): Json<ClientRequest>,
) -> Json<MutationOutcome> {
    let applied = state.engine.ip_store().unblock(&req.client);
    info!(client = %req.client, applied, "administrative unblock");
    Json(MutationOutcome {
        client: req.client,
        applied,
    })
}

pub async fn post_whitelist(
    State(state): State<AdminState>,
    Json(req): Json<ClientRequest>,
) -> Json<MutationOutcome> {
    state.engine.ip_store().whitelist(&req.client, unix_ms());
    info!(client = %req.client, "client whitelisted");
    Json(MutationOutcome {
        client: req.client,
        applied: true,
    })
}

pub async fn delete_whitelist(
    State(state): State<AdminState>,
    Path(client): Path<String>,
) -> Json<MutationOutcome> {
    state.engine.ip_store().unwhitelist(&client);
    info!(client = %client, "client removed from whitelist");
    Json(MutationOutcome {
        client,
        applied: true,
    })
}
