//! Atlassian OAuth token file handling.
//!
//! The token file is produced out of band (an OAuth 3LO consent flow). This
//! module only reads it, derives the Jira API root from it, and refreshes the
//! access token when asked to.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::http::read_json;
use crate::utils::write_atomic;

pub const ATLASSIAN_TOKEN_URL: &str = "https://auth.atlassian.com/oauth/token";

/// Refresh when the access token expires within this many seconds.
pub const REFRESH_MARGIN_SECS: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds.
    #[serde(default)]
    pub expires_at: f64,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub cloud_id: Option<String>,
    #[serde(default)]
    pub cloud_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OAuthToken {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let now_secs = now.timestamp_millis() as f64 / 1000.0;
        now_secs >= self.expires_at - REFRESH_MARGIN_SECS
    }

    /// Jira REST root for this site: `cloud_url`, else the API gateway for `cloud_id`.
    pub fn api_root(&self) -> Option<String> {
        if let Some(url) = self.cloud_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Some(url.trim().trim_end_matches('/').to_string());
        }
        self.cloud_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(|id| format!("https://api.atlassian.com/ex/jira/{}", id.trim()))
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
    token_url: String,
}

impl TokenFile {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf(), token_url: ATLASSIAN_TOKEN_URL.to_string() }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token, or `None` when the file does not exist.
    pub fn load(&self) -> Result<Option<OAuthToken>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed reading token file: {}", self.path.display()))
            }
        };
        let token = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid token file: {}", self.path.display()))?;
        Ok(Some(token))
    }

    /// Ensure a usable access token, refreshing it when it expires within
    /// [`REFRESH_MARGIN_SECS`] of `now`.
    ///
    /// Returns `None` when there is no token, or when it has expired and
    /// cannot be refreshed for lack of a refresh token or client credentials.
    /// A refresh that the server rejects is an error. After a successful
    /// refresh the file is rewritten with the new token.
    pub fn ensure_fresh(&self, client: &Client, now: DateTime<Utc>) -> Result<Option<String>> {
        let Some(mut token) = self.load()? else {
            return Ok(None);
        };
        if token.access_token.is_empty() {
            return Ok(None);
        }
        if !token.needs_refresh(now) {
            return Ok(Some(token.access_token));
        }

        let (Some(refresh), Some(client_id), Some(secret)) =
            (token.refresh_token.clone(), token.client_id.clone(), token.client_secret.clone())
        else {
            tracing::warn!(path = %self.path.display(), "OAuth token expired and cannot be refreshed");
            return Ok(None);
        };

        tracing::debug!(path = %self.path.display(), "refreshing OAuth access token");
        let body = json!({
            "grant_type": "refresh_token",
            "client_id": client_id,
            "client_secret": secret,
            "refresh_token": refresh,
        });
        let response = client
            .post(&self.token_url)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&body)?)
            .send()
            .context("OAuth token refresh request failed")?;
        let refreshed: RefreshResponse = read_json("Atlassian OAuth", response)?;

        token.access_token = refreshed.access_token;
        token.refresh_token = refreshed.refresh_token.or(Some(refresh));
        let now_secs = now.timestamp_millis() as f64 / 1000.0;
        token.expires_at = now_secs + refreshed.expires_in.unwrap_or(3600) as f64;
        write_atomic(&self.path, serde_json::to_string_pretty(&token)?.as_bytes())?;
        Ok(Some(token.access_token))
    }
}
