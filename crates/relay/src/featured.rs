// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot update of the featured-channels listing.

use std::time::Duration;

use tracing::info;

pub struct FeaturedClient {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl FeaturedClient {
    /// Build a client when both the endpoint and its token are configured.
    pub fn from_config(url: Option<&str>, token: Option<&str>) -> Option<Self> {
        match (url, token) {
            (Some(url), Some(token)) if !url.is_empty() => Some(Self {
                http: reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
                url: url.to_owned(),
                token: token.to_owned(),
            }),
            _ => None,
        }
    }

    /// Replace the featured channels with `usernames`.
    pub async fn update(&self, usernames: &[String]) -> anyhow::Result<()> {
        let channels = usernames.join(",");
        let resp = self
            .http
            .get(&self.url)
            .query(&[("token", self.token.as_str()), ("channels", channels.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("featured update returned {status}: {body}");
        }
        info!(count = usernames.len(), "featured channels updated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "featured_tests.rs"]
mod tests;
