// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Donation relay: webhook-to-browser event fan-out plus a long-lived
//! badge-service client gated by an OAuth token lifecycle.

pub mod badge;
pub mod chat;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod featured;
pub mod state;
pub mod transport;

#[cfg(test)]
pub mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::badge::authorize::{spawn_auth_relay, AuthRelay};
use crate::badge::BadgeConnection;
use crate::config::Config;
use crate::credential::oauth::IdentityClient;
use crate::credential::tokens::TokenManager;
use crate::credential::CredentialStore;
use crate::featured::FeaturedClient;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the relay until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let listen = config.listen_settings()?;
    if listen.defaulted {
        warn!("no config file, port or key given; using defaults");
    }
    let shutdown = CancellationToken::new();

    let store = Arc::new(CredentialStore::load(config.credentials.clone())?);
    if !store.is_authenticated() {
        warn!(
            path = %config.credentials.display(),
            "no stored credentials; visit the OAuth authorize URL to sign in"
        );
    }
    let tokens = Arc::new(TokenManager::new(
        store,
        IdentityClient::new(config.oauth_settings()),
        config.retry_policy(),
    ));

    let featured =
        FeaturedClient::from_config(config.featured_url.as_deref(), config.featured_token.as_deref());
    let mut state = AppState::new(listen.key, Arc::clone(&tokens), shutdown.clone())
        .with_featured(featured);

    if config.no_badge {
        info!("badge connection disabled");
    } else {
        let (authorize_tx, authorize_rx) = mpsc::unbounded_channel();
        let badge = BadgeConnection::new(config.badge_settings()?, authorize_tx);
        let relay =
            Arc::new(AuthRelay::new(Arc::clone(&tokens), config.chat_settings(), config.authorizer));
        spawn_auth_relay(relay, authorize_rx, shutdown.clone());
        tokio::spawn(badge.clone().run(Arc::clone(&tokens), shutdown.clone()));
        if !config.following.is_empty() {
            spawn_initial_following(badge.clone(), config.following, shutdown.clone());
        }
        state = state.with_badge(badge);
    }

    spawn_signal_handler(shutdown.clone());

    let addr = format!("{}:{}", config.host, listen.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("donation-relay listening on {addr}");

    let router = build_router(Arc::new(state));
    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;
    shutdown.cancel();

    Ok(())
}

/// Apply the configured follow buttons the first time the badge service is
/// ready.
fn spawn_initial_following(
    badge: BadgeConnection,
    usernames: Vec<String>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = badge.wait_ready() => {
                if let Err(e) = badge.set_following(&usernames).await {
                    warn!(err = %e, "initial follow button update failed");
                }
            }
        }
    });
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
