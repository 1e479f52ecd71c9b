// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the badge service: a text-framed WebSocket protocol with
//! correlated requests, server pushes and ping/pong liveness.

pub mod authorize;
pub mod connection;
pub mod correlator;
pub mod endpoint;
pub mod keepalive;
pub mod protocol;

pub use connection::{BadgeConnection, BadgeSettings, ConnectionState};
