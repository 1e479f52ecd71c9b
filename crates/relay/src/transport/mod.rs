// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the relay.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all relay routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Donation webhook (POST requires key)
        .route("/", get(http::status).post(http::webhook))
        // Browser event stream
        .route("/ws", get(ws::ws_handler))
        // OAuth authorization code redirect target
        .route("/oauth/callback", get(http::oauth_callback))
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/following", post(http::set_following))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::key_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
