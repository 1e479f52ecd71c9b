// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ping/pong liveness timing for a ready connection.
//!
//! Pure state: the connection loop sleeps until [`Keepalive::deadline`] and
//! feeds the result back through [`Keepalive::on_deadline`].

use std::time::Duration;

use tokio::time::Instant;

/// What the connection must do when the keepalive deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    SendPing,
    /// The last ping went unanswered; drop the transport.
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle { next_probe: Instant },
    AwaitingPong { deadline: Instant },
}

#[derive(Debug, Clone)]
pub struct Keepalive {
    interval: Duration,
    timeout: Duration,
    phase: Phase,
}

impl Keepalive {
    /// Start timing; the first ping is due one `interval` after `now`.
    pub fn new(now: Instant, interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout, phase: Phase::Idle { next_probe: now + interval } }
    }

    pub fn deadline(&self) -> Instant {
        match self.phase {
            Phase::Idle { next_probe } => next_probe,
            Phase::AwaitingPong { deadline } => deadline,
        }
    }

    pub fn awaiting_pong(&self) -> bool {
        matches!(self.phase, Phase::AwaitingPong { .. })
    }

    /// Advance on a timer wakeup. Returns `None` for an early wakeup.
    pub fn on_deadline(&mut self, now: Instant) -> Option<KeepaliveAction> {
        match self.phase {
            Phase::Idle { next_probe } if now >= next_probe => {
                self.phase = Phase::AwaitingPong { deadline: now + self.timeout };
                Some(KeepaliveAction::SendPing)
            }
            Phase::AwaitingPong { deadline } if now >= deadline => Some(KeepaliveAction::Terminate),
            _ => None,
        }
    }

    /// Record a pong. Unsolicited pongs are ignored and return `false`.
    pub fn on_pong(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::AwaitingPong { .. } => {
                self.phase = Phase::Idle { next_probe: now + self.interval };
                true
            }
            Phase::Idle { .. } => false,
        }
    }
}

#[cfg(test)]
#[path = "keepalive_tests.rs"]
mod tests;
