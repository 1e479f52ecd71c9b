// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-lived chat-network client: log in over IRC-on-WebSocket, send one
//! whisper, linger briefly so it is delivered, disconnect.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

use crate::credential::Credentials;

/// Where and how long to talk to the chat network.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub url: String,
    /// Time to keep the connection open after sending.
    pub grace: Duration,
    /// Upper bound on connecting and logging in.
    pub login_timeout: Duration,
}

/// Classification of one IRC line relevant to a send-and-leave client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    /// `001` numeric: logged in.
    Welcome,
    /// Server keepalive; reply `PONG <arg>`.
    Ping(String),
    /// Login rejected by the server.
    LoginFailed(String),
    Other,
}

pub fn classify(line: &str) -> ChatLine {
    if let Some(arg) = line.strip_prefix("PING") {
        return ChatLine::Ping(arg.trim().to_owned());
    }
    let mut parts = line.split(' ');
    let _prefix = parts.next();
    match parts.next() {
        Some("001") => ChatLine::Welcome,
        Some("NOTICE")
            if line.contains("Login authentication failed")
                || line.contains("Improperly formatted auth") =>
        {
            let reason = line.rsplit_once(" :").map(|(_, r)| r).unwrap_or(line);
            ChatLine::LoginFailed(reason.to_owned())
        }
        _ => ChatLine::Other,
    }
}

/// IRC line whispering `text` to `recipient` from `account`'s own channel.
pub fn whisper_line(account: &str, recipient: &str, text: &str) -> String {
    format!("PRIVMSG #{account} :/w {recipient} {text}")
}

/// Connect as the credential owner, whisper `text` to `recipient`, wait out
/// the grace period, then close. Delivery is not confirmed.
pub async fn send_whisper(
    settings: &ChatSettings,
    creds: &Credentials,
    recipient: &str,
    text: &str,
) -> anyhow::Result<()> {
    let account = creds.account_name.to_lowercase();

    let (ws, _) = tokio::time::timeout(
        settings.login_timeout,
        tokio_tungstenite::connect_async(settings.url.as_str()),
    )
    .await
    .map_err(|_| anyhow::anyhow!("chat connect timed out"))??;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(format!("PASS oauth:{}", creds.access_token).into())).await?;
    sink.send(Message::Text(format!("NICK {account}").into())).await?;

    tokio::time::timeout(settings.login_timeout, wait_for_welcome(&mut sink, &mut stream))
        .await
        .map_err(|_| anyhow::anyhow!("chat login timed out"))??;
    debug!(account = %account, "chat connected");

    sink.send(Message::Text(whisper_line(&account, recipient, text).into())).await?;
    info!(recipient, "chat whisper sent");

    let linger = tokio::time::sleep(settings.grace);
    tokio::pin!(linger);
    loop {
        tokio::select! {
            _ = &mut linger => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    for line in text.lines() {
                        if let ChatLine::Ping(arg) = classify(line) {
                            sink.send(Message::Text(format!("PONG {arg}").into())).await?;
                        }
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}

/// Read until the `001` welcome, answering pings on the way.
async fn wait_for_welcome<S, R>(sink: &mut S, stream: &mut R) -> anyhow::Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        let Message::Text(text) = msg? else { continue };
        for line in text.lines() {
            match classify(line) {
                ChatLine::Welcome => return Ok(()),
                ChatLine::Ping(arg) => {
                    sink.send(Message::Text(format!("PONG {arg}").into())).await?;
                }
                ChatLine::LoginFailed(reason) => anyhow::bail!("chat login failed: {reason}"),
                ChatLine::Other => {}
            }
        }
    }
    anyhow::bail!("chat connection closed before login")
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
