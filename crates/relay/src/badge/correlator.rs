// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sequence-number allocation and the table of requests awaiting replies.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::oneshot;

/// Why a correlated request did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("badge service not connected")]
    NotConnected,
    #[error("connection closed before reply")]
    ConnectionClosed,
    #[error("request rejected: {0}")]
    Rejected(String),
}

pub type Completion = oneshot::Sender<Result<String, RequestError>>;

/// A request that has been written and not yet answered.
pub struct PendingRequest {
    pub issued_at: Instant,
    completion: Completion,
}

/// Per-connection correlation state. Sequence numbers start at 1 and are
/// never reused for the life of the table.
pub struct Correlator {
    next_seq: u64,
    pending: HashMap<u64, PendingRequest>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self { next_seq: 1, pending: HashMap::new() }
    }

    /// Allocate the next sequence number and register a pending entry.
    pub fn register(&mut self) -> (u64, oneshot::Receiver<Result<String, RequestError>>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, PendingRequest { issued_at: Instant::now(), completion: tx });
        (seq, rx)
    }

    /// Complete the request for `seq`. Returns `false` if nothing was waiting,
    /// e.g. a duplicate or unsolicited reply.
    pub fn resolve(&mut self, seq: u64, result: Result<String, RequestError>) -> bool {
        let Some(pending) = self.pending.remove(&seq) else {
            return false;
        };
        tracing::trace!(seq, elapsed_ms = pending.issued_at.elapsed().as_millis() as u64, "reply");
        // The caller may have stopped waiting; that is not an error here.
        let _ = pending.completion.send(result);
        true
    }

    /// Fail every outstanding request. Returns how many were failed.
    pub fn fail_all(&mut self, err: RequestError) -> usize {
        let drained: Vec<_> = self.pending.drain().collect();
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.completion.send(Err(err.clone()));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The sequence number the next `register` will hand out.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
