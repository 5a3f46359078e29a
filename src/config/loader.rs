//! Audit config file loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::RepoRef;
use crate::AuditError;

/// What to audit: repositories, branches, and the release label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// `PROJECT/REPO` → display label.
    #[serde(deserialize_with = "deserialize_repos")]
    pub repos: BTreeMap<String, String>,
    #[serde(default)]
    pub release_branch: Option<String>,
    #[serde(default)]
    pub develop_branch: Option<String>,
    #[serde(default)]
    pub fix_version: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
}

impl AuditConfig {
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.repos.is_empty() {
            return Err(AuditError::Config("config must include a 'repos' mapping".to_string()));
        }
        if non_empty(&self.release_branch).is_none() && non_empty(&self.develop_branch).is_none() {
            return Err(AuditError::Config(
                "config must define 'release_branch' or 'develop_branch'".to_string(),
            ));
        }
        for spec in self.repos.keys() {
            RepoRef::parse(spec)?;
        }
        Ok(())
    }

    pub fn repo_refs(&self) -> Result<Vec<RepoRef>, AuditError> {
        self.repos.keys().map(|spec| RepoRef::parse(spec)).collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Accept `repos` either as a `{"PROJ/repo": "label"}` map or a `["PROJ/repo"]` list.
fn deserialize_repos<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repos {
        Map(BTreeMap<String, String>),
        List(Vec<String>),
    }

    Ok(match Repos::deserialize(deserializer)? {
        Repos::Map(map) => {
            map.into_iter().map(|(k, v)| (k.trim().to_string(), v)).collect()
        }
        Repos::List(list) => list
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| (k.clone(), k))
            .collect(),
    })
}

/// Load the audit config from `config_path`, or discover one in `dir`.
pub fn load_config(dir: &Path, config_path: Option<&Path>) -> Result<AuditConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => discover_config(dir).ok_or_else(|| {
            AuditError::Config(format!(
                "no config file given and none found in {} (tried release-audit.toml/.yml/.yaml/.json)",
                dir.display()
            ))
        })?,
    };

    if !config_file.exists() {
        return Err(
            AuditError::Config(format!("config file not found: {}", config_file.display())).into()
        );
    }

    let content = fs::read_to_string(&config_file)
        .with_context(|| format!("Failed reading config file: {}", config_file.display()))?;

    let ext = config_file.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    let parsed = match ext.as_str() {
        "toml" => parse_toml_config(&content, &config_file)?,
        "yaml" | "yml" => parse_yaml_config(&content, &config_file)?,
        "json" => parse_json_config(&content, &config_file)?,
        other => {
            return Err(AuditError::Config(format!(
                "unsupported config extension '.{}' for file {}",
                other,
                config_file.display()
            ))
            .into())
        }
    };

    parsed.validate()?;
    tracing::debug!(path = %config_file.display(), repos = parsed.repos.len(), "loaded audit config");
    Ok(parsed)
}

/// Parse TOML config, supporting a nested `[release-audit]` table.
fn parse_toml_config(content: &str, config_file: &Path) -> Result<AuditConfig> {
    let raw: toml::Value = toml::from_str(content)
        .with_context(|| format!("Invalid TOML syntax: {}", config_file.display()))?;

    let config_val = match raw.get("release-audit") {
        Some(nested) => nested.clone(),
        None => raw,
    };

    config_val.try_into().with_context(|| format!("Invalid TOML config: {}", config_file.display()))
}

/// Parse YAML config, supporting a nested `release-audit` mapping.
fn parse_yaml_config(content: &str, config_file: &Path) -> Result<AuditConfig> {
    let raw: serde_yaml::Value = serde_yaml::from_str(content)
        .with_context(|| format!("Invalid YAML syntax: {}", config_file.display()))?;

    let config_val = match raw.get("release-audit") {
        Some(nested) => nested.clone(),
        None => raw,
    };

    serde_yaml::from_value(config_val)
        .with_context(|| format!("Invalid YAML config: {}", config_file.display()))
}

fn parse_json_config(content: &str, config_file: &Path) -> Result<AuditConfig> {
    let raw: serde_json::Value = serde_json::from_str(content)
        .with_context(|| format!("Invalid JSON: {}", config_file.display()))?;

    let config_val = match raw.get("release-audit") {
        Some(nested) => nested.clone(),
        None => raw,
    };

    serde_json::from_value(config_val)
        .with_context(|| format!("Invalid JSON config: {}", config_file.display()))
}

fn discover_config(dir: &Path) -> Option<PathBuf> {
    let candidates = [
        "release-audit.toml",
        ".release-audit.toml",
        "release-audit.yml",
        "release-audit.yaml",
        "release-audit.json",
    ];

    candidates.iter().map(|c| dir.join(c)).find(|p| p.exists())
}
