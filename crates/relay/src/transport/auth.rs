// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{Method, Request, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::RelayError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate the `?key=` query parameter against the configured key.
pub fn validate_key(uri: &Uri, expected: &str) -> Result<(), RelayError> {
    let query = Query::<KeyQuery>::try_from_uri(uri).map(|q| q.0).unwrap_or_default();
    match query.key {
        Some(ref key) if constant_time_eq(key, expected) => Ok(()),
        _ => Err(RelayError::Forbidden),
    }
}

/// Axum middleware requiring the shared key on every POST.
///
/// GET routes (status, health, browser WebSocket, OAuth callback) are open.
pub async fn key_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }

    if let Err(code) = validate_key(req.uri(), &state.key) {
        tracing::debug!(path = %req.uri().path(), "rejected request with bad key");
        return code.with_message("invalid key").into_response();
    }

    next.run(req).await
}
