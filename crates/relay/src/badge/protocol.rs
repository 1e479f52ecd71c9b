// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Badge-service text protocol.
//!
//! Client frames are `<seq> <verb> <args>`. The service answers with
//! `<seq> ok<json>` and pushes unsolicited events as `-1 <event> <json>`.

use serde_json::Value;

/// Sequence number the service uses for unsolicited pushes.
const PUSH_SEQ: &str = "-1";

/// Push telling the client to prove account ownership.
pub const EVENT_DO_AUTHORIZE: &str = "do_authorize";

/// Push describing the current follow buttons.
pub const EVENT_FOLLOW_BUTTONS: &str = "follow_buttons";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("invalid sequence number: {0:?}")]
    BadSequence(String),
    #[error("push without event name")]
    MissingEvent,
}

/// A parsed service-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Reply to a correlated request.
    Reply { seq: u64, outcome: ReplyOutcome },
    /// Unsolicited event.
    Push { event: String, payload: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// `ok` with whatever followed it, trimmed.
    Ok(String),
    /// Any other status word plus its remainder, verbatim.
    Other(String),
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim_end();
        if text.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let (head, rest) = text.split_once(' ').unwrap_or((text, ""));

        if head == PUSH_SEQ {
            let rest = rest.trim_start();
            let (event, payload) = rest.split_once(' ').unwrap_or((rest, ""));
            if event.is_empty() {
                return Err(ProtocolError::MissingEvent);
            }
            return Ok(Self::Push { event: event.to_owned(), payload: payload.trim().to_owned() });
        }

        let seq: u64 = head.parse().map_err(|_| ProtocolError::BadSequence(head.to_owned()))?;
        let outcome = match rest.strip_prefix("ok") {
            Some(payload) => ReplyOutcome::Ok(payload.trim().to_owned()),
            None => ReplyOutcome::Other(rest.to_owned()),
        };
        Ok(Self::Reply { seq, outcome })
    }
}

/// Frame a request body with its sequence number.
pub fn frame(seq: u64, body: &str) -> String {
    format!("{seq} {body}")
}

/// Body of the hello message identifying this client.
pub fn hello(client_name: &str) -> String {
    format!("hello {}", Value::from(vec![Value::from(client_name), Value::Bool(false)]))
}

/// True if `text` acknowledges the hello (sequence 1).
pub fn is_hello_ack(text: &str) -> bool {
    text.starts_with("1 ok")
}

/// The four session-setup bodies, in the order the service requires.
pub fn setup_sequence(account_name: &str) -> [String; 4] {
    [
        format!("setuser {}", Value::from(account_name)),
        format!("sub {}", Value::from(format!("room.{account_name}"))),
        format!("sub {}", Value::from(format!("channel.{account_name}"))),
        "ready 0".to_owned(),
    ]
}

/// Body replacing the follow buttons shown for `account_name`.
pub fn update_follow_buttons(account_name: &str, usernames: &[String]) -> String {
    let args = serde_json::json!([account_name, usernames]);
    format!("update_follow_buttons {args}")
}

/// Extract `updated_clients` from an `update_follow_buttons` reply.
pub fn parse_updated_clients(payload: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value.get("updated_clients")?.as_u64()
}

/// Extract the one-time code from a `do_authorize` payload. The service
/// sends either a JSON string or an array whose first element is the code.
pub fn parse_authorize_code(payload: &str) -> Option<String> {
    let code = match serde_json::from_str::<Value>(payload).ok()? {
        Value::String(code) => code,
        Value::Array(items) => items.first()?.as_str()?.to_owned(),
        _ => return None,
    };
    (!code.is_empty()).then_some(code)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
