// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the relay: donation webhook, health, OAuth callback and
//! the follow-button API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::events::RelayEvent;
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Badge connection state, or `disabled`.
    pub badge: String,
    pub authenticated: bool,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FollowingRequest {
    pub usernames: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowingResponse {
    pub badge_ready: bool,
    pub updated_clients: Option<u64>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /`
pub async fn status() -> &'static str {
    "Running OK"
}

/// `POST /?key=`: donation-tracker postback.
pub async fn webhook(State(s): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                return RelayError::BadRequest
                    .with_message(format!("invalid JSON body: {e}"))
                    .into_response();
            }
        }
    };

    match RelayEvent::from_webhook(&payload) {
        Some(event) => {
            s.events.emit(event);
        }
        None => {
            let message_type = payload.get("message_type").and_then(Value::as_str);
            debug!(message_type, "webhook message ignored");
        }
    }
    "OK".into_response()
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let badge = s.badge.as_ref().map(|b| b.state().as_str()).unwrap_or("disabled");
    Json(HealthResponse {
        status: "running".to_owned(),
        badge: badge.to_owned(),
        authenticated: s.tokens.store().is_authenticated(),
    })
}

/// `GET /oauth/callback?code=`: finish the authorization code flow.
pub async fn oauth_callback(
    State(s): State<Arc<AppState>>,
    Query(q): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(error) = q.error {
        let detail = q.error_description.unwrap_or_default();
        warn!(%error, %detail, "authorization denied");
        let message = format!("authorization denied: {error} {detail}");
        return RelayError::BadRequest.with_message(message.trim_end()).into_response();
    }
    let Some(code) = q.code.filter(|c| !c.is_empty()) else {
        return RelayError::BadRequest.with_message("missing code").into_response();
    };

    match s.tokens.complete_authorization(&code).await {
        Ok(creds) => {
            format!("Authorized as {}. You can close this window.", creds.account_name)
                .into_response()
        }
        Err(e) => {
            warn!(err = %format!("{e:#}"), "authorization code exchange failed");
            RelayError::UpstreamError.with_message(format!("{e:#}")).into_response()
        }
    }
}

/// `POST /api/v1/following?key=`: replace follow buttons and featured
/// channels.
pub async fn set_following(
    State(s): State<Arc<AppState>>,
    Json(req): Json<FollowingRequest>,
) -> impl IntoResponse {
    let (badge_ready, updated_clients) = match s.badge {
        Some(ref badge) => {
            let ready = badge.is_ready();
            match badge.set_following(&req.usernames).await {
                Ok(updated) => (ready, updated),
                Err(e) => {
                    warn!(err = %e, "follow button update failed");
                    let response = RelayError::UpstreamError.with_message(e.to_string());
                    return response.into_response();
                }
            }
        }
        None => (false, None),
    };

    match s.featured {
        Some(ref featured) => {
            if let Err(e) = featured.update(&req.usernames).await {
                warn!(err = %format!("{e:#}"), "featured channel update failed");
                let response = RelayError::UpstreamError.with_message(format!("{e:#}"));
                return response.into_response();
            }
        }
        None => debug!("featured channels not configured, update skipped"),
    }

    info!(count = req.usernames.len(), badge_ready, ?updated_clients, "following updated");
    Json(FollowingResponse { badge_ready, updated_clients }).into_response()
}
