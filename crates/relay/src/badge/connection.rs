// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single long-lived badge-service session: endpoint choice, handshake,
//! correlated requests, push dispatch, keepalive and reconnect.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::badge::correlator::{Correlator, RequestError};
use crate::badge::endpoint::{self, WeightedEndpoint};
use crate::badge::keepalive::{Keepalive, KeepaliveAction};
use crate::badge::protocol::{self, ReplyOutcome, ServerMessage};
use crate::credential::tokens::{TokenError, TokenManager};

/// Connection tuning.
#[derive(Debug, Clone)]
pub struct BadgeSettings {
    pub endpoints: Vec<WeightedEndpoint>,
    pub client_name: String,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub reconnect_delay: Duration,
    /// Close the session if the hello is not acknowledged in time.
    pub handshake_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHandshakeAck,
    Ready,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHandshakeAck => "awaiting_handshake_ack",
            Self::Ready => "ready",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-transport state. Replaced wholesale on reconnect.
struct Session {
    outbound: mpsc::UnboundedSender<Message>,
    correlator: Correlator,
    account_name: String,
    hello_acked: bool,
}

struct Shared {
    state: ConnectionState,
    session: Option<Session>,
}

struct Inner {
    settings: BadgeSettings,
    /// State, sequence counter and pending table change together under this
    /// lock. Never held across an await.
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
    authorize_tx: mpsc::UnboundedSender<String>,
}

/// Handle to the badge-service connection. Cheap to clone.
#[derive(Clone)]
pub struct BadgeConnection {
    inner: Arc<Inner>,
}

impl BadgeConnection {
    /// Codes from `do_authorize` pushes are forwarded on `authorize_tx`.
    pub fn new(settings: BadgeSettings, authorize_tx: mpsc::UnboundedSender<String>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                settings,
                shared: Mutex::new(Shared { state: ConnectionState::Disconnected, session: None }),
                state_tx,
                authorize_tx,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Resolve once the connection reaches Ready.
    pub async fn wait_ready(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s == ConnectionState::Ready).await;
    }

    /// Send `body` as a correlated request and wait for its reply payload.
    /// Fails with `NotConnected` unless the connection is Ready.
    pub async fn request(&self, body: &str) -> Result<String, RequestError> {
        let rx = self.enqueue(true, |_| body.to_owned())?;
        rx.await.unwrap_or(Err(RequestError::ConnectionClosed))
    }

    /// Replace the follow buttons on the relay account's channel. Returns the
    /// number of updated clients, or `None` when not Ready.
    pub async fn set_following(&self, usernames: &[String]) -> Result<Option<u64>, RequestError> {
        let rx = match self.enqueue(true, |session| {
            protocol::update_follow_buttons(&session.account_name, usernames)
        }) {
            Ok(rx) => rx,
            Err(RequestError::NotConnected) => {
                debug!(state = %self.state(), "badge service not ready, following update skipped");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let reply = rx.await.unwrap_or(Err(RequestError::ConnectionClosed))?;
        let updated = protocol::parse_updated_clients(&reply);
        info!(count = usernames.len(), updated_clients = ?updated, "follow buttons updated");
        Ok(updated)
    }

    /// Handshake-internal request: allowed before Ready.
    async fn setup_request(&self, body: &str) -> Result<String, RequestError> {
        let rx = self.enqueue(false, |_| body.to_owned())?;
        rx.await.unwrap_or(Err(RequestError::ConnectionClosed))
    }

    /// Check state, allocate a sequence number and queue the frame under one
    /// lock, so a teardown cannot slip in between.
    fn enqueue(
        &self,
        ready_only: bool,
        body: impl FnOnce(&Session) -> String,
    ) -> Result<oneshot::Receiver<Result<String, RequestError>>, RequestError> {
        let mut shared = self.inner.shared.lock();
        if ready_only && shared.state != ConnectionState::Ready {
            return Err(RequestError::NotConnected);
        }
        let session = shared.session.as_mut().ok_or(RequestError::NotConnected)?;
        let body = body(&*session);
        let (seq, rx) = session.correlator.register();
        if session.outbound.send(Message::Text(protocol::frame(seq, &body).into())).is_err() {
            session.correlator.resolve(seq, Err(RequestError::ConnectionClosed));
        }
        Ok(rx)
    }

    /// Supervisor loop: validate the token, run one session, tear it down,
    /// wait, repeat. Returns on shutdown.
    pub async fn run(self, tokens: Arc<TokenManager>, shutdown: CancellationToken) {
        let settings = &self.inner.settings;
        let mut warned_unauthenticated = false;

        loop {
            let validated = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = tokens.ensure_valid() => r,
            };

            match validated {
                Ok(creds) => {
                    warned_unauthenticated = false;
                    let picked = {
                        let mut rng = rand::rng();
                        endpoint::choose(&settings.endpoints, &mut rng).cloned()
                    };
                    match picked {
                        Some(endpoint) => {
                            let url = endpoint.url.as_str();
                            if let Err(e) =
                                self.run_session(url, &creds.account_name, &shutdown).await
                            {
                                warn!(url, err = %format!("{e:#}"), "badge session failed");
                            }
                            self.teardown();
                        }
                        None => warn!("no badge endpoints configured"),
                    }
                }
                Err(TokenError::NoCredentials) => {
                    if !warned_unauthenticated {
                        warn!("no stored credentials, badge connection skipped");
                        warned_unauthenticated = true;
                    }
                }
                Err(e) => warn!(err = %e, "token validation failed, badge connection deferred"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(settings.reconnect_delay) => {}
            }
        }

        self.teardown();
        debug!("badge supervisor stopped");
    }

    async fn run_session(
        &self,
        url: &str,
        account: &str,
        shutdown: &CancellationToken,
    ) -> anyhow::Result<()> {
        let settings = &self.inner.settings;
        self.set_state(ConnectionState::Connecting);
        info!(url, "connecting to badge service");

        let (ws, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            r = tokio_tungstenite::connect_async(url) => r.context("badge connect")?,
        };
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        // Hello is sequence 1 and is queued before any caller can register.
        let hello_rx = {
            let mut shared = self.inner.shared.lock();
            let mut correlator = Correlator::new();
            let (seq, rx) = correlator.register();
            let hello = protocol::frame(seq, &protocol::hello(&settings.client_name));
            let _ = out_tx.send(Message::Text(hello.into()));
            shared.session = Some(Session {
                outbound: out_tx,
                correlator,
                account_name: account.to_owned(),
                hello_acked: false,
            });
            self.set_state_locked(&mut shared, ConnectionState::AwaitingHandshakeAck);
            rx
        };

        let handshake = self.handshake(hello_rx, account);
        tokio::pin!(handshake);
        let mut keepalive: Option<Keepalive> = None;

        let graceful = loop {
            let probe_at = keepalive.as_ref().map(Keepalive::deadline);
            tokio::select! {
                _ = shutdown.cancelled() => break true,
                result = &mut handshake, if keepalive.is_none() => match result {
                    Ok(()) => {
                        self.set_state(ConnectionState::Ready);
                        keepalive = Some(Keepalive::new(
                            Instant::now(),
                            settings.ping_interval,
                            settings.pong_timeout,
                        ));
                        info!(url, account, "badge service ready");
                    }
                    Err(e) => {
                        warn!(err = %format!("{e:#}"), "badge handshake failed, closing");
                        break true;
                    }
                },
                Some(msg) = out_rx.recv() => {
                    sink.send(msg).await.context("badge send")?;
                }
                _ = sleep_until(probe_at) => {
                    let action = keepalive.as_mut().and_then(|k| k.on_deadline(Instant::now()));
                    match action {
                        Some(KeepaliveAction::SendPing) => {
                            debug!("keepalive ping");
                            sink.send(Message::Ping(Default::default()))
                                .await
                                .context("badge ping")?;
                        }
                        Some(KeepaliveAction::Terminate) => {
                            warn!(url, "keepalive pong timeout, dropping connection");
                            break false;
                        }
                        None => {}
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                    Some(Ok(Message::Pong(_))) => {
                        if let Some(k) = keepalive.as_mut() {
                            k.on_pong(Instant::now());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(url, ?frame, "badge service closed connection");
                        break false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("badge receive"),
                    None => {
                        info!(url, "badge connection ended");
                        break false;
                    }
                },
            }
        };

        self.set_state(ConnectionState::Closing);
        if graceful {
            let _ = sink.send(Message::Close(None)).await;
        }
        Ok(())
    }

    /// Wait for the hello ack, then run the setup steps one at a time.
    async fn handshake(
        &self,
        hello_rx: oneshot::Receiver<Result<String, RequestError>>,
        account: &str,
    ) -> anyhow::Result<()> {
        let ack = async { hello_rx.await.unwrap_or(Err(RequestError::ConnectionClosed)) };
        let ack = match self.inner.settings.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, ack)
                .await
                .map_err(|_| anyhow::anyhow!("hello not acknowledged within {limit:?}"))?,
            None => ack.await,
        };
        ack.context("hello")?;
        debug!("hello acknowledged");

        for body in protocol::setup_sequence(account) {
            self.setup_request(&body).await.with_context(|| format!("setup step {body:?}"))?;
        }
        Ok(())
    }

    fn dispatch(&self, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(err = %e, text, "malformed badge message ignored");
                return;
            }
        };

        match message {
            ServerMessage::Reply { seq, outcome } => {
                let mut shared = self.inner.shared.lock();
                let Some(session) = shared.session.as_mut() else { return };
                if !session.hello_acked {
                    if !protocol::is_hello_ack(text) {
                        debug!(text, "ignored while awaiting hello ack");
                        return;
                    }
                    session.hello_acked = true;
                }
                let result = match outcome {
                    ReplyOutcome::Ok(payload) => Ok(payload),
                    ReplyOutcome::Other(rest) => Err(RequestError::Rejected(rest)),
                };
                if !session.correlator.resolve(seq, result) {
                    debug!(seq, "reply for unknown request");
                }
            }
            ServerMessage::Push { event, payload } => {
                let hello_acked =
                    self.inner.shared.lock().session.as_ref().is_some_and(|s| s.hello_acked);
                if !hello_acked {
                    debug!(%event, "push ignored while awaiting hello ack");
                    return;
                }
                self.on_push(&event, &payload);
            }
        }
    }

    fn on_push(&self, event: &str, payload: &str) {
        match event {
            protocol::EVENT_DO_AUTHORIZE => match protocol::parse_authorize_code(payload) {
                Some(code) => {
                    info!("badge service requested authorization");
                    if self.inner.authorize_tx.send(code).is_err() {
                        warn!("authorization relay not running, code dropped");
                    }
                }
                None => warn!(payload, "do_authorize push without a code"),
            },
            protocol::EVENT_FOLLOW_BUTTONS => info!(payload, "follow buttons"),
            _ => debug!(event, payload, "badge push"),
        }
    }

    /// Drop the session and fail whatever it still had in flight.
    fn teardown(&self) {
        let mut shared = self.inner.shared.lock();
        if let Some(mut session) = shared.session.take() {
            if shared.state != ConnectionState::Closing {
                self.set_state_locked(&mut shared, ConnectionState::Closing);
            }
            let failed = session.correlator.fail_all(RequestError::ConnectionClosed);
            if failed > 0 {
                debug!(failed, "pending badge requests failed on teardown");
            }
        }
        self.set_state_locked(&mut shared, ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        let mut shared = self.inner.shared.lock();
        self.set_state_locked(&mut shared, state);
    }

    fn set_state_locked(&self, shared: &mut Shared, state: ConnectionState) {
        if shared.state != state {
            debug!(from = %shared.state, to = %state, "badge connection state");
            shared.state = state;
            self.inner.state_tx.send_replace(state);
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
