// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity-provider credentials: the persisted token pair, the OAuth HTTP
//! calls, and the validate/refresh lifecycle that gates everything needing
//! a bearer token.

pub mod oauth;
pub mod persist;
pub mod tokens;

use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Bearer credentials for the relay's own account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub account_name: String,
    pub account_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_name", &self.account_name)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Holds the current credentials and writes every change through to disk.
pub struct CredentialStore {
    path: PathBuf,
    current: RwLock<Option<Credentials>>,
}

impl CredentialStore {
    /// Load the store from `path`. A missing file yields an empty store.
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let current = persist::load(&path)?;
        Ok(Self { path, current: RwLock::new(current) })
    }

    /// Build an in-memory store seeded with `creds` that persists to `path`.
    pub fn with_credentials(path: PathBuf, creds: Option<Credentials>) -> Self {
        Self { path, current: RwLock::new(creds) }
    }

    pub fn get(&self) -> Option<Credentials> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// Make `creds` current, then write them to disk. The in-memory value
    /// is replaced even when the write fails, since the provider may already
    /// have revoked the previous pair.
    pub fn set(&self, creds: Credentials) -> anyhow::Result<()> {
        let mut current = self.current.write();
        let saved = persist::save(&self.path, &creds);
        *current = Some(creds);
        saved
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
