// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::badge::BadgeConnection;
use crate::credential::tokens::TokenManager;
use crate::events::EventHub;
use crate::featured::FeaturedClient;

/// Shared relay state handed to every HTTP handler.
pub struct AppState {
    /// Shared key required on POST routes.
    pub key: String,
    pub events: EventHub,
    pub tokens: Arc<TokenManager>,
    /// `None` when the badge connection is disabled.
    pub badge: Option<BadgeConnection>,
    pub featured: Option<FeaturedClient>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(key: String, tokens: Arc<TokenManager>, shutdown: CancellationToken) -> Self {
        Self { key, events: EventHub::default(), tokens, badge: None, featured: None, shutdown }
    }

    pub fn with_badge(mut self, badge: BadgeConnection) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn with_featured(mut self, featured: Option<FeaturedClient>) -> Self {
        self.featured = featured;
        self
    }
}
