// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local fakes for the identity provider, badge service and chat network.
//!
//! Each binds `127.0.0.1:0` and runs on the test's tokio runtime.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::credential::oauth::{IdentityClient, OAuthSettings};
use crate::credential::tokens::{RetryPolicy, TokenManager};
use crate::credential::{CredentialStore, Credentials};

static CRYPTO: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

// -- Identity provider -------------------------------------------------------

/// Fake identity provider. Accepts exactly one access token at a time and
/// issues `at-N`/`rt-N` pairs from its token endpoint.
#[derive(Default)]
pub struct FakeProvider {
    pub valid_token: Mutex<String>,
    pub validate_failures: AtomicU32,
    pub refresh_failures: AtomicU32,
    pub validate_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub bearers: Mutex<Vec<String>>,
    pub token_forms: Mutex<Vec<HashMap<String, String>>>,
    pub refresh_delay_ms: u64,
}

impl FakeProvider {
    pub fn accepting(token: &str) -> Self {
        let provider = Self::default();
        *provider.valid_token.lock() = token.to_owned();
        provider
    }
}

async fn provider_validate(State(p): State<Arc<FakeProvider>>, headers: HeaderMap) -> Response {
    p.validate_calls.fetch_add(1, Ordering::SeqCst);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_owned();
    p.bearers.lock().push(bearer.clone());

    if p.validate_failures.load(Ordering::SeqCst) > 0 {
        p.validate_failures.fetch_sub(1, Ordering::SeqCst);
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    if *p.valid_token.lock() == bearer {
        Json(serde_json::json!({"login": "streamer", "user_id": "42", "client_id": "cid"}))
            .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, r#"{"status":401,"message":"invalid access token"}"#)
            .into_response()
    }
}

async fn provider_token(
    State(p): State<Arc<FakeProvider>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = p.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    p.token_forms.lock().push(form);
    if p.refresh_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(p.refresh_delay_ms)).await;
    }
    if p.refresh_failures.load(Ordering::SeqCst) > 0 {
        p.refresh_failures.fetch_sub(1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response();
    }
    let access = format!("at-{n}");
    *p.valid_token.lock() = access.clone();
    Json(serde_json::json!({
        "access_token": access,
        "refresh_token": format!("rt-{n}"),
        "expires_in": 14400,
        "token_type": "bearer"
    }))
    .into_response()
}

/// Serve `provider` and return its base URL.
pub async fn start_provider(provider: FakeProvider) -> anyhow::Result<(String, Arc<FakeProvider>)> {
    let provider = Arc::new(provider);
    let app = Router::new()
        .route("/validate", get(provider_validate))
        .route("/token", post(provider_token))
        .with_state(Arc::clone(&provider));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), provider))
}

pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

pub fn credentials(access: &str) -> Credentials {
    Credentials {
        access_token: access.to_owned(),
        refresh_token: "rt-0".to_owned(),
        account_name: "streamer".to_owned(),
        account_id: "42".to_owned(),
    }
}

pub fn oauth_settings(base: &str) -> OAuthSettings {
    OAuthSettings {
        validate_url: format!("{base}/validate"),
        token_url: format!("{base}/token"),
        client_id: "cid".to_owned(),
        client_secret: "secret".to_owned(),
        redirect_uri: "http://localhost/oauth/callback".to_owned(),
    }
}

pub fn token_manager(
    base: &str,
    dir: &tempfile::TempDir,
    creds: Option<Credentials>,
    policy: RetryPolicy,
) -> TokenManager {
    ensure_crypto_provider();
    let store =
        Arc::new(CredentialStore::with_credentials(dir.path().join("credentials.json"), creds));
    TokenManager::new(store, IdentityClient::new(oauth_settings(base)), policy)
}

/// A token manager backed by a provider that accepts the stored token.
pub async fn valid_tokens(
    dir: &tempfile::TempDir,
) -> anyhow::Result<(Arc<TokenManager>, Arc<FakeProvider>)> {
    let (base, provider) = start_provider(FakeProvider::accepting("at-0")).await?;
    let tokens = token_manager(&base, dir, Some(credentials("at-0")), fast_policy(3));
    Ok((Arc::new(tokens), provider))
}

// -- Badge service -----------------------------------------------------------

/// Observations from the fake badge service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadgeEvent {
    Connected(usize),
    Text(usize, String),
    Closed(usize),
}

/// Commands to a single fake badge connection.
#[derive(Debug)]
pub enum BadgeCommand {
    Send(String),
    /// Stop reading, so pings go unanswered.
    Mute,
    Close,
}

/// Fake badge service. Acks every request with `<seq> ok` unless its
/// sequence number is held, and answers `update_follow_buttons` with
/// `updated_clients`.
pub struct FakeBadge {
    pub url: String,
    pub events: mpsc::UnboundedReceiver<BadgeEvent>,
    connections: Arc<Mutex<Vec<mpsc::UnboundedSender<BadgeCommand>>>>,
    held: Arc<Mutex<HashSet<u64>>>,
}

impl FakeBadge {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (event_tx, events) = mpsc::unbounded_channel();
        let connections: Arc<Mutex<Vec<mpsc::UnboundedSender<BadgeCommand>>>> = Arc::default();
        let held: Arc<Mutex<HashSet<u64>>> = Arc::default();

        let conns = Arc::clone(&connections);
        let held_seqs = Arc::clone(&held);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else { continue };
                let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                let idx = {
                    let mut conns = conns.lock();
                    conns.push(cmd_tx);
                    conns.len() - 1
                };
                let _ = event_tx.send(BadgeEvent::Connected(idx));
                tokio::spawn(serve_badge(
                    idx,
                    ws,
                    cmd_rx,
                    event_tx.clone(),
                    Arc::clone(&held_seqs),
                ));
            }
        });

        Ok(Self { url: format!("ws://{addr}/"), events, connections, held })
    }

    /// Do not auto-ack requests with these sequence numbers.
    pub fn hold(&self, seqs: &[u64]) {
        self.held.lock().extend(seqs.iter().copied());
    }

    pub fn command(&self, conn: usize, cmd: BadgeCommand) {
        if let Some(tx) = self.connections.lock().get(conn) {
            let _ = tx.send(cmd);
        }
    }

    /// Next event, or `None` after `wait`.
    pub async fn next_event(&mut self, wait: Duration) -> Option<BadgeEvent> {
        tokio::time::timeout(wait, self.events.recv()).await.ok().flatten()
    }

    /// Skip events until a text frame arrives.
    pub async fn next_text(&mut self, wait: Duration) -> Option<(usize, String)> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_event(remaining).await? {
                BadgeEvent::Text(conn, text) => return Some((conn, text)),
                _ => continue,
            }
        }
    }

    /// Skip events until `pred` matches.
    pub async fn wait_for(
        &mut self,
        wait: Duration,
        pred: impl Fn(&BadgeEvent) -> bool,
    ) -> Option<BadgeEvent> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let event = self.next_event(remaining).await?;
            if pred(&event) {
                return Some(event);
            }
        }
    }
}

async fn serve_badge(
    idx: usize,
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut cmd_rx: mpsc::UnboundedReceiver<BadgeCommand>,
    event_tx: mpsc::UnboundedSender<BadgeEvent>,
    held: Arc<Mutex<HashSet<u64>>>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut muted = false;
    loop {
        tokio::select! {
            msg = stream.next(), if !muted => match msg {
                Some(Ok(Message::Text(text))) => {
                    let text = text.to_string();
                    let _ = event_tx.send(BadgeEvent::Text(idx, text.clone()));
                    if let Some(reply) = auto_reply(&text, &held) {
                        if sink.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(BadgeCommand::Send(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(BadgeCommand::Mute) => muted = true,
                Some(BadgeCommand::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
    let _ = event_tx.send(BadgeEvent::Closed(idx));
}

fn auto_reply(text: &str, held: &Mutex<HashSet<u64>>) -> Option<String> {
    let (seq, body) = text.split_once(' ')?;
    let seq: u64 = seq.parse().ok()?;
    if held.lock().contains(&seq) {
        return None;
    }
    if body.starts_with("update_follow_buttons") {
        return Some(format!(r#"{seq} ok {{"updated_clients":5}}"#));
    }
    Some(format!("{seq} ok"))
}

// -- Chat network ------------------------------------------------------------

/// Fake IRC-over-WebSocket server that welcomes every login and records
/// each line it receives.
pub struct FakeChat {
    pub url: String,
    pub lines: Arc<Mutex<Vec<String>>>,
    pub connections: Arc<AtomicU32>,
}

impl FakeChat {
    pub async fn start(reject_login: bool) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let lines: Arc<Mutex<Vec<String>>> = Arc::default();
        let connections = Arc::new(AtomicU32::new(0));

        let seen = Arc::clone(&lines);
        let count = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else { continue };
                count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_chat(ws, Arc::clone(&seen), reject_login));
            }
        });

        Ok(Self { url: format!("ws://{addr}/"), lines, connections })
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn whispers(&self) -> Vec<String> {
        self.lines().into_iter().filter(|l| l.starts_with("PRIVMSG")).collect()
    }

    /// Poll until at least `count` whispers arrived or `wait` elapses, then
    /// return them all. Delivery trails the sender's close on loopback.
    pub async fn wait_whispers(&self, count: usize, wait: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let whispers = self.whispers();
            if whispers.len() >= count || tokio::time::Instant::now() >= deadline {
                return whispers;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn serve_chat(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    lines: Arc<Mutex<Vec<String>>>,
    reject_login: bool,
) {
    let (mut sink, mut stream) = ws.split();
    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        for line in text.lines() {
            lines.lock().push(line.to_owned());
            if let Some(nick) = line.strip_prefix("NICK ") {
                let reply = if reject_login {
                    ":tmi.twitch.tv NOTICE * :Login authentication failed".to_owned()
                } else {
                    format!("PING :tmi.twitch.tv\r\n:tmi.twitch.tv 001 {nick} :Welcome, GLHF!")
                };
                if sink.send(Message::Text(reply.into())).await.is_err() {
                    return;
                }
            }
        }
    }
}
