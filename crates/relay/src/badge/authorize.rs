// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relays `do_authorize` codes to the badge service's authorizer account as
//! a chat whisper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::{self, ChatSettings};
use crate::credential::tokens::TokenManager;

pub struct AuthRelay {
    tokens: Arc<TokenManager>,
    chat: ChatSettings,
    authorizer: String,
    /// Code -> completion time; `None` while the relay is in flight.
    recent: Mutex<HashMap<String, Option<Instant>>>,
}

impl AuthRelay {
    pub fn new(tokens: Arc<TokenManager>, chat: ChatSettings, authorizer: String) -> Self {
        Self { tokens, chat, authorizer, recent: Mutex::new(HashMap::new()) }
    }

    /// Whisper `AUTH <code>` to the authorizer. Returns `Ok(false)` when the
    /// same code is already in flight or was sent within the grace window.
    pub async fn relay(&self, code: &str) -> anyhow::Result<bool> {
        if !self.claim(code) {
            info!("duplicate authorization code skipped");
            return Ok(false);
        }

        let result = self.send(code).await;
        let mut recent = self.recent.lock();
        match result {
            Ok(()) => {
                recent.insert(code.to_owned(), Some(Instant::now()));
                Ok(true)
            }
            Err(e) => {
                // Let a later push with the same code try again.
                recent.remove(code);
                Err(e)
            }
        }
    }

    fn claim(&self, code: &str) -> bool {
        let window = self.chat.grace;
        let mut recent = self.recent.lock();
        recent.retain(|_, done| !matches!(done, Some(at) if at.elapsed() >= window));
        if recent.contains_key(code) {
            return false;
        }
        recent.insert(code.to_owned(), None);
        true
    }

    async fn send(&self, code: &str) -> anyhow::Result<()> {
        let creds = self.tokens.ensure_valid().await?;
        debug!(authorizer = %self.authorizer, "relaying authorization code");
        chat::send_whisper(&self.chat, &creds, &self.authorizer, &format!("AUTH {code}")).await
    }
}

/// Consume codes from the badge connection, relaying each on its own task.
pub fn spawn_auth_relay(
    relay: Arc<AuthRelay>,
    mut codes: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let code = tokio::select! {
                _ = shutdown.cancelled() => break,
                code = codes.recv() => match code {
                    Some(code) => code,
                    None => break,
                },
            };
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                match relay.relay(&code).await {
                    Ok(true) => info!("authorization code relayed"),
                    Ok(false) => {}
                    Err(e) => warn!(err = %format!("{e:#}"), "authorization relay failed"),
                }
            });
        }
    })
}

#[cfg(test)]
#[path = "authorize_tests.rs"]
mod tests;
