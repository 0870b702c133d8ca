pub mod handlers;
pub mod auth;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::policy::SecurityEngine;
use self::handlers::*;
use self::auth::admin_auth_middleware;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub engine: Arc<SecurityEngine>,
    pub api_key: String,
}

/// Build the admin router: read access to the block/whitelist state plus
/// the explicit mutation operations. These are the only doors into the
/// stores besides the policy itself.
pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/blocklist", get(get_blocklist))
        .route("/admin/whitelist", get(get_whitelist))
        .route("/admin/analytics", get(get_analytics))
        .route("/admin/block", post(post_block))
        .route("/admin/unblock", post(post_unblock))
        .route("/admin/whitelist", post(post_whitelist))
        .route("/admin/whitelist/{client}", delete(delete_whitelist))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
