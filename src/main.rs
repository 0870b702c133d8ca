//! Blackwall demo server.
//!
//! A small protected API wired through the security engine, built with
//! Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────┐
//!                    │                  BLACKWALL                      │
//!                    │                                                 │
//!   Client Request   │  ┌───────┐   ┌──────────────────────────────┐  │
//!   ─────────────────┼─▶│ guard │──▶│        SecurityEngine         │  │
//!                    │  └───┬───┘   │  detect → state → rate →      │  │
//!                    │      │       │  policy → (escalate?) → audit │  │
//!                    │      │       └──────────────┬───────────────┘  │
//!                    │      │ allow                │ ambiguous        │
//!                    │      ▼                      ▼                  │
//!                    │  ┌─────────┐        ┌───────────────┐          │
//!   Client Response  │  │ demo    │        │ analysis svc  │◀─────────┼──── external
//!   ◀────────────────┼──│ routes  │        │ (HTTP, deadline)│        │     collaborator
//!                    │  └─────────┘        └───────────────┘          │
//!                    │                                                 │
//!                    │  ┌──────────────────────────────────────────┐  │
//!                    │  │  Cross-Cutting: config · admin · metrics │  │
//!                    │  │  audit trail · structured logging        │  │
//!                    │  └──────────────────────────────────────────┘  │
//!                    └────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use blackwall::admin::{setup_admin_router, AdminState};
use blackwall::config::{loader::load_config, EngineConfig};
use blackwall::guard::{security_middleware, GuardState};
use blackwall::observability::logging;
use blackwall::request::unix_ms;
use blackwall::SecurityEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration before logging so the log level applies.
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => EngineConfig::default(),
    };
    logging::init(&config.observability);

    tracing::info!("blackwall v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
                    tracing::warn!(error = %e, "metrics exporter failed to start");
                } else {
                    tracing::info!(address = %addr, "metrics endpoint listening");
                }
            }
            Err(e) => tracing::warn!(error = %e, "invalid metrics address"),
        }
    }

    let engine = Arc::new(SecurityEngine::new(config.clone())?);

    // Periodic housekeeping; correctness never depends on it.
    let housekeeper = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            housekeeper.housekeeping(unix_ms());
        }
    });

    let mut app = demo_routes()
        .layer(middleware::from_fn_with_state(
            GuardState { engine: engine.clone() },
            security_middleware,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http());

    if config.admin.enabled {
        app = app.merge(setup_admin_router(AdminState {
            engine: engine.clone(),
            api_key: config.admin.api_key.clone(),
        }));
        tracing::info!("admin API enabled under /admin");
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %config.listener.bind_address, "HTTP server starting");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}

// ── Demo application ────────────────────────────────────────────────────
// Minimal endpoints to exercise the engine end to end; everything below
// runs behind the guard middleware.

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct UserData {
    name: String,
    email: String,
    #[allow(dead_code)]
    bio: String,
}

fn demo_routes() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/users", post(create_user))
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Blackwall Protected API",
        "status": "active",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "security": "active" }))
}

async fn login(Json(credentials): Json<LoginRequest>) -> Result<Json<serde_json::Value>, StatusCode> {
    // Simulated authentication; the interesting work happened in the guard.
    if credentials.username == "admin" && credentials.password == "password" {
        Ok(Json(serde_json::json!({
            "message": "Login successful",
            "token": "fake-token",
        })))
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn create_user(Json(user): Json<UserData>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "User created",
        "user": { "name": user.name, "email": user.email },
    }))
}
