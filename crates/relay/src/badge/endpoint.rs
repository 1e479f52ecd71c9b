// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Weighted random choice of badge-service server.

use std::str::FromStr;

use rand::seq::IndexedRandom;
use rand::Rng;

/// A server URL with a relative selection weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedEndpoint {
    pub url: String,
    pub weight: u32,
}

impl FromStr for WeightedEndpoint {
    type Err = anyhow::Error;

    /// Parse `url` (weight 1) or `url=weight`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (url, weight) = match s.rsplit_once('=') {
            Some((url, w)) if w.chars().all(|c| c.is_ascii_digit()) && !w.is_empty() => {
                (url, w.parse::<u32>()?)
            }
            _ => (s, 1),
        };
        if url.is_empty() {
            anyhow::bail!("empty endpoint url");
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            anyhow::bail!("endpoint must be a ws:// or wss:// url: {url}");
        }
        if weight == 0 {
            anyhow::bail!("endpoint weight must be positive: {s}");
        }
        Ok(Self { url: url.to_owned(), weight })
    }
}

/// Pick an endpoint with probability proportional to its weight. `None`
/// when there is nothing with a positive weight to pick.
pub fn choose<'a, R: Rng + ?Sized>(
    endpoints: &'a [WeightedEndpoint],
    rng: &mut R,
) -> Option<&'a WeightedEndpoint> {
    endpoints.choose_weighted(rng, |e| e.weight).ok()
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
