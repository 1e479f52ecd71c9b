// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity-provider HTTP calls: token validation, refresh, and code exchange.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Body of a successful "who am I" call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub login: String,
    pub user_id: String,
}

/// Outcome of validating an access token.
#[derive(Debug, Clone)]
pub enum Validation {
    Valid(Identity),
    /// The provider rejected the token (401).
    Invalid,
}

/// Endpoints and client registration for the identity provider.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub validate_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// HTTP client for the identity provider.
pub struct IdentityClient {
    settings: OAuthSettings,
    http: reqwest::Client,
}

impl IdentityClient {
    pub fn new(settings: OAuthSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { settings, http }
    }

    /// Ask the provider who owns `access_token`.
    pub async fn validate(&self, access_token: &str) -> anyhow::Result<Validation> {
        let resp =
            self.http.get(&self.settings.validate_url).bearer_auth(access_token).send().await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => Ok(Validation::Invalid),
            s if s.is_success() => Ok(Validation::Valid(resp.json().await?)),
            status => {
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("validate failed ({status}): {text}");
            }
        }
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> anyhow::Result<TokenResponse> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ])
        .await
    }

    /// Exchange an authorization code from the redirect callback.
    pub async fn exchange_code(&self, code: &str) -> anyhow::Result<TokenResponse> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> anyhow::Result<TokenResponse> {
        let resp = self.http.post(&self.settings.token_url).form(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("token request failed ({status}): {text}");
        }

        Ok(resp.json().await?)
    }
}
