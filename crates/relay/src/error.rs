// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error envelope for the relay HTTP API: `{"error":{"code":..,"message":..}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Machine-readable error codes returned by the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("FORBIDDEN")]
    Forbidden,
    #[error("BAD_REQUEST")]
    BadRequest,
    /// The identity provider, badge service or featured-channel service
    /// failed the request.
    #[error("UPSTREAM_ERROR")]
    UpstreamError,
}

impl RelayError {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Attach a human-readable message.
    pub fn with_message(self, message: impl Into<String>) -> ApiError {
        ApiError { kind: self, message: message.into() }
    }
}

/// A [`RelayError`] plus message, rendered as a JSON error response.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: RelayError,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody { code: self.kind.to_string(), message: self.message },
        };
        (self.kind.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
