//! Service endpoints, credentials, and cache placement.
//!
//! Precedence: environment > settings file > defaults. The settings are
//! built once in the CLI and handed to every client constructor.

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cache::BackendKind;
use crate::AuditError;

pub const DEFAULT_SETTINGS_FILE: &str = "release-audit.settings.toml";

/// Environment variables read on top of the settings file (matched case-insensitively).
const ENV_KEYS: &[&str] = &[
    "bitbucket_base_url",
    "bitbucket_email",
    "bitbucket_app_password",
    "jira_base_url",
    "jira_email",
    "jira_api_token",
    "jira_token_file",
    "openai_api_key",
    "openai_base_url",
    "default_jql",
    "cache_dir",
    "cache_backend",
    "http_timeout_secs",
];

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bitbucket Server REST root, e.g. `https://scm.example.com/rest/api/1.0`.
    pub bitbucket_base_url: String,
    pub bitbucket_email: String,
    pub bitbucket_app_password: String,
    /// Jira site root; a trailing `/browse` is tolerated.
    pub jira_base_url: String,
    pub jira_email: String,
    pub jira_api_token: String,
    /// Atlassian OAuth token file; when present and valid it wins over basic auth.
    pub jira_token_file: Option<PathBuf>,
    pub openai_api_key: String,
    pub openai_base_url: String,
    /// JQL template; `{fix_version}` is substituted.
    pub default_jql: Option<String>,
    pub cache_dir: PathBuf,
    pub cache_backend: BackendKind,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bitbucket_base_url: String::new(),
            bitbucket_email: String::new(),
            bitbucket_app_password: String::new(),
            jira_base_url: String::new(),
            jira_email: String::new(),
            jira_api_token: String::new(),
            jira_token_file: None,
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            default_jql: None,
            cache_dir: PathBuf::from("data/.cache"),
            cache_backend: BackendKind::Files,
            http_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Merge defaults, the settings file, and the environment.
    ///
    /// An explicit `path` must exist; without one, [`DEFAULT_SETTINGS_FILE`]
    /// in the working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::figment(path)?
            .merge(Env::raw().only(ENV_KEYS))
            .extract()
            .map_err(|e| AuditError::Config(e.to_string()).into())
    }

    fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        match path {
            Some(path) if !path.exists() => {
                return Err(AuditError::Config(format!(
                    "settings file not found: {}",
                    path.display()
                ))
                .into());
            }
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let default_path = Path::new(DEFAULT_SETTINGS_FILE);
                if default_path.exists() {
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }
        Ok(figment)
    }

    /// Settings from the file layers only, ignoring the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::figment(Some(path))?.extract().map_err(|e| AuditError::Config(e.to_string()).into())
    }
}

fn mask(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "***"
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bitbucket_base_url", &self.bitbucket_base_url)
            .field("bitbucket_email", &self.bitbucket_email)
            .field("bitbucket_app_password", &mask(&self.bitbucket_app_password))
            .field("jira_base_url", &self.jira_base_url)
            .field("jira_email", &self.jira_email)
            .field("jira_api_token", &mask(&self.jira_api_token))
            .field("jira_token_file", &self.jira_token_file)
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("default_jql", &self.default_jql)
            .field("cache_dir", &self.cache_dir)
            .field("cache_backend", &self.cache_backend)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}
