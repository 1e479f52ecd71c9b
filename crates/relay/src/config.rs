// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::badge::endpoint::WeightedEndpoint;
use crate::badge::BadgeSettings;
use crate::chat::ChatSettings;
use crate::credential::oauth::OAuthSettings;
use crate::credential::tokens::RetryPolicy;

const DEFAULT_PORT: u16 = 1234;
const DEFAULT_KEY: &str = "default_key";
const DEFAULT_CONFIG_FILE: &str = "config.json";
const CHAT_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default badge-service socket servers, weighted 1:2:2:2.
pub const DEFAULT_BADGE_ENDPOINTS: &[&str] = &[
    "wss://catbag.frankerfacez.com/=1",
    "wss://andknuckles.frankerfacez.com/=2",
    "wss://tuturu.frankerfacez.com/=2",
    "wss://lilz.frankerfacez.com/=2",
];

/// Configuration for the donation relay.
#[derive(Debug, Clone, Parser)]
#[command(name = "donation-relay", version, about = "Donation relay and badge-service client")]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_HOST")]
    pub host: String,

    /// Port to listen on. Falls back to the config file, then 1234.
    #[arg(long, env = "RELAY_PORT")]
    pub port: Option<u16>,

    /// Shared key required on webhook and API calls. Falls back to the config file.
    #[arg(long, env = "RELAY_KEY")]
    pub key: Option<String>,

    /// JSON config file carrying `port` and `key`.
    #[arg(long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the persisted OAuth credentials.
    #[arg(long, default_value = "credentials.json", env = "RELAY_CREDENTIALS")]
    pub credentials: PathBuf,

    /// OAuth client ID for the identity provider.
    #[arg(long, default_value = "", env = "RELAY_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret for the identity provider.
    #[arg(long, default_value = "", env = "RELAY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Redirect URI registered for the authorization code flow.
    #[arg(long, default_value = "http://localhost:1234/oauth/callback", env = "RELAY_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Identity provider token validation ("who am I") endpoint.
    #[arg(long, default_value = "https://id.twitch.tv/oauth2/validate", env = "RELAY_VALIDATE_URL")]
    pub validate_url: String,

    /// Identity provider token endpoint.
    #[arg(long, default_value = "https://id.twitch.tv/oauth2/token", env = "RELAY_TOKEN_URL")]
    pub token_url: String,

    /// Max attempts for token validation/refresh before giving up.
    #[arg(long, default_value_t = 10, env = "RELAY_TOKEN_MAX_ATTEMPTS")]
    pub token_max_attempts: u32,

    /// Badge-service endpoints as `url` or `url=weight`. Repeatable.
    #[arg(long = "badge-endpoint", env = "RELAY_BADGE_ENDPOINTS", value_delimiter = ',')]
    pub badge_endpoints: Vec<String>,

    /// Client name sent in the badge-service hello.
    #[arg(long, default_value = "donation-relay", env = "RELAY_BADGE_CLIENT")]
    pub badge_client_name: String,

    /// Disable the badge-service connection entirely.
    #[arg(long, env = "RELAY_NO_BADGE")]
    pub no_badge: bool,

    /// Seconds between keepalive pings.
    #[arg(long, default_value_t = 60, env = "RELAY_PING_INTERVAL_SECS")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the connection.
    #[arg(long, default_value_t = 10, env = "RELAY_PONG_TIMEOUT_SECS")]
    pub pong_timeout_secs: u64,

    /// Seconds between a connection closing and the next attempt.
    #[arg(long, default_value_t = 10, env = "RELAY_RECONNECT_DELAY_SECS")]
    pub reconnect_delay_secs: u64,

    /// Seconds to wait for the hello ack. 0 waits forever.
    #[arg(long, default_value_t = 0, env = "RELAY_HANDSHAKE_TIMEOUT_SECS")]
    pub handshake_timeout_secs: u64,

    /// Chat network WebSocket URL used to relay authorization codes.
    #[arg(long, default_value = "wss://irc-ws.chat.twitch.tv:443", env = "RELAY_CHAT_URL")]
    pub chat_url: String,

    /// Account that receives `AUTH <code>` whispers.
    #[arg(long, default_value = "frankerfacez", env = "RELAY_AUTHORIZER")]
    pub authorizer: String,

    /// Milliseconds to keep the chat connection open after sending the code.
    #[arg(long, default_value_t = 5000, env = "RELAY_AUTH_GRACE_MS")]
    pub auth_grace_ms: u64,

    /// Usernames to put on the follow buttons once the badge service is ready.
    #[arg(long, env = "RELAY_FOLLOWING", value_delimiter = ',')]
    pub following: Vec<String>,

    /// Featured-channels update endpoint. Disabled if unset.
    #[arg(long, env = "RELAY_FEATURED_URL")]
    pub featured_url: Option<String>,

    /// Token embedded in featured-channels update calls.
    #[arg(long, env = "RELAY_FEATURED_TOKEN", hide_env_values = true)]
    pub featured_token: Option<String>,

    /// Log level filter (e.g. `info`, `donation_relay=debug`).
    #[arg(long, default_value = "info", env = "RELAY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: `text` or `json`.
    #[arg(long, default_value = "text", env = "RELAY_LOG_FORMAT")]
    pub log_format: String,
}

/// Contents of the optional JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub key: Option<String>,
}

impl FileConfig {
    /// Read a config file. A missing default file is not an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Port and key after merging CLI/env, config file, and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSettings {
    pub port: u16,
    pub key: String,
    /// True when neither CLI/env nor a file supplied the settings.
    pub defaulted: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        if self.pong_timeout_secs == 0 {
            anyhow::bail!("pong timeout must be at least one second");
        }
        self.endpoints()?;
        Ok(())
    }

    /// Resolve port and key. CLI/env wins over the config file, which wins
    /// over the built-in defaults.
    pub fn listen_settings(&self) -> anyhow::Result<ListenSettings> {
        let file = match self.config {
            Some(ref path) => Some(FileConfig::load(path)?),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Some(FileConfig::load(path)?)
                } else {
                    None
                }
            }
        };
        Ok(merge_listen(self.port, self.key.clone(), file))
    }

    /// Parse the badge-service endpoint list, falling back to the defaults.
    pub fn endpoints(&self) -> anyhow::Result<Vec<WeightedEndpoint>> {
        if self.badge_endpoints.is_empty() {
            return DEFAULT_BADGE_ENDPOINTS.iter().map(|s| s.parse()).collect();
        }
        self.badge_endpoints.iter().map(|s| s.parse()).collect()
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        match self.handshake_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn auth_grace(&self) -> Duration {
        Duration::from_millis(self.auth_grace_ms)
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            validate_url: self.validate_url.clone(),
            token_url: self.token_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: self.token_max_attempts.max(1), ..RetryPolicy::default() }
    }

    pub fn badge_settings(&self) -> anyhow::Result<BadgeSettings> {
        Ok(BadgeSettings {
            endpoints: self.endpoints()?,
            client_name: self.badge_client_name.clone(),
            ping_interval: self.ping_interval(),
            pong_timeout: self.pong_timeout(),
            reconnect_delay: self.reconnect_delay(),
            handshake_timeout: self.handshake_timeout(),
        })
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            url: self.chat_url.clone(),
            grace: self.auth_grace(),
            login_timeout: CHAT_LOGIN_TIMEOUT,
        }
    }
}

fn merge_listen(port: Option<u16>, key: Option<String>, file: Option<FileConfig>) -> ListenSettings {
    let defaulted = port.is_none() && key.is_none() && file.is_none();
    let file = file.unwrap_or_default();
    ListenSettings {
        port: port.or(file.port).unwrap_or(DEFAULT_PORT),
        key: key.or(file.key).unwrap_or_else(|| DEFAULT_KEY.to_owned()),
        defaulted,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
