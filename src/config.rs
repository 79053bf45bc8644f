use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

const DEFAULT_DB_PATH: &str = "tripsync.db";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the trips backend, always ending with `/`
    pub api_url: Url,
    pub auth_token: Option<String>,
    pub user_id: String,
    pub db_path: String,
    pub timeout_secs: u64,
}

impl SyncConfig {
    /// Creates a config from environment variables (and `.env`, when present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_url = std::env::var("TRIPSYNC_API_URL")
            .map_err(|_| anyhow!("TRIPSYNC_API_URL environment variable is required"))?;

        let user_id = std::env::var("TRIPSYNC_USER_ID")
            .map_err(|_| anyhow!("TRIPSYNC_USER_ID environment variable is required"))?;

        let auth_token = std::env::var("TRIPSYNC_AUTH_TOKEN").ok();
        if auth_token.is_none() {
            warn!("TRIPSYNC_AUTH_TOKEN not set, remote calls will fail until a token is configured");
        }

        let db_path =
            std::env::var("TRIPSYNC_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

        let timeout_secs = match std::env::var("TRIPSYNC_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow!("TRIPSYNC_TIMEOUT_SECS must be a whole number, got {}", raw))?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Self::new(&api_url, auth_token, user_id, db_path, timeout_secs)
    }

    pub fn new(
        api_url: &str,
        auth_token: Option<String>,
        user_id: String,
        db_path: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        if user_id.trim().is_empty() {
            return Err(anyhow!("User id must not be empty"));
        }

        Ok(Self {
            api_url: normalize_base_url(api_url)?,
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
            user_id,
            db_path,
            timeout_secs,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Ensures the base URL ends with a slash so relative endpoint paths join under it
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw).map_err(|e| anyhow!("Invalid API URL {}: {}", raw, e))?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("API URL {} cannot be used as a base URL", raw));
    }
    Ok(url)
}
