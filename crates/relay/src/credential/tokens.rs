// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access-token lifecycle: validate against the provider, refresh when
//! rejected, retry with exponential backoff, and never run two refreshes at
//! once.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::credential::oauth::{IdentityClient, Validation};
use crate::credential::{CredentialStore, Credentials};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("no credentials stored, complete the OAuth flow first")]
    NoCredentials,
    #[error("token {operation} failed after {attempts} attempts: {last_error}")]
    Exhausted { operation: &'static str, attempts: u32, last_error: String },
}

/// Backoff schedule for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Keeps the stored access token usable.
pub struct TokenManager {
    store: Arc<CredentialStore>,
    client: IdentityClient,
    policy: RetryPolicy,
    /// Held for the duration of a refresh so concurrent callers queue behind
    /// it and then observe its result.
    refresh_guard: tokio::sync::Mutex<()>,
}

impl TokenManager {
    pub fn new(store: Arc<CredentialStore>, client: IdentityClient, policy: RetryPolicy) -> Self {
        Self { store, client, policy, refresh_guard: tokio::sync::Mutex::new(()) }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.store.get()
    }

    /// Return once the stored access token is confirmed valid or replaced.
    pub async fn ensure_valid(&self) -> Result<Credentials, TokenError> {
        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            let creds = self.store.get().ok_or(TokenError::NoCredentials)?;
            match self.client.validate(&creds.access_token).await {
                Ok(Validation::Valid(identity)) => {
                    debug!(login = %identity.login, "access token valid");
                    return Ok(creds);
                }
                Ok(Validation::Invalid) => {
                    info!(account = %creds.account_name, "access token rejected, refreshing");
                    return self.refresh_from(&creds.access_token).await;
                }
                Err(e) => {
                    warn!(attempt, err = %e, "token validation failed");
                    last_error = e.to_string();
                }
            }
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }
        Err(TokenError::Exhausted {
            operation: "validation",
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    /// Unconditionally replace the current access token.
    pub async fn refresh(&self) -> Result<Credentials, TokenError> {
        let creds = self.store.get().ok_or(TokenError::NoCredentials)?;
        self.refresh_from(&creds.access_token).await
    }

    /// Refresh unless another caller already replaced `stale_access` while
    /// this one waited for the guard.
    async fn refresh_from(&self, stale_access: &str) -> Result<Credentials, TokenError> {
        let _guard = self.refresh_guard.lock().await;

        let creds = self.store.get().ok_or(TokenError::NoCredentials)?;
        if creds.access_token != stale_access {
            debug!("access token already refreshed by a concurrent caller");
            return Ok(creds);
        }

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match self.client.refresh(&creds.refresh_token).await {
                Ok(token) => {
                    let updated = Credentials {
                        access_token: token.access_token,
                        refresh_token: token
                            .refresh_token
                            .unwrap_or_else(|| creds.refresh_token.clone()),
                        ..creds.clone()
                    };
                    if let Err(e) = self.store.set(updated.clone()) {
                        warn!(err = %format!("{e:#}"), "refreshed credentials not persisted");
                    }
                    info!(account = %updated.account_name, "access token refreshed");
                    return Ok(updated);
                }
                Err(e) => {
                    warn!(attempt, err = %e, "token refresh failed");
                    last_error = e.to_string();
                }
            }
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }
        Err(TokenError::Exhausted {
            operation: "refresh",
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    /// Finish the authorization code flow: exchange the code, learn which
    /// account it belongs to, and persist the result.
    pub async fn complete_authorization(&self, code: &str) -> anyhow::Result<Credentials> {
        let token = self.client.exchange_code(code).await?;
        let identity = match self.client.validate(&token.access_token).await? {
            Validation::Valid(identity) => identity,
            Validation::Invalid => anyhow::bail!("provider rejected a freshly issued token"),
        };
        let creds = Credentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_default(),
            account_name: identity.login,
            account_id: identity.user_id,
        };

        let _guard = self.refresh_guard.lock().await;
        self.store.set(creds.clone())?;
        info!(account = %creds.account_name, "authorization completed, credentials stored");
        Ok(creds)
    }
}

#[cfg(test)]
#[path = "tokens_tests.rs"]
mod tests;
