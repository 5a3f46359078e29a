//! Shared blocking HTTP plumbing for the service clients.

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::AuditError;

pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("release-audit/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed building HTTP client")
}

/// Parse `base` and append path segments, escaping each one.
pub fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base.trim_end_matches('/'))
        .with_context(|| format!("Invalid base URL: {base}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Base URL cannot carry a path: {base}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Decode a JSON body, turning non-success statuses into [`AuditError::Api`].
pub fn read_json<T: DeserializeOwned>(service: &'static str, response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().with_context(|| format!("Failed reading {service} response"))?;
    if !status.is_success() {
        return Err(AuditError::api(service, status.as_u16(), &body).into());
    }
    serde_json::from_str(&body).with_context(|| format!("Invalid JSON from {service}"))
}
