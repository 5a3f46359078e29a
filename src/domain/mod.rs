//! Core records shared by the fetch, reconcile, and report stages.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Maximum number of characters kept from a commit message.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// A commit as seen by the audit, tagged with the ticket keys in its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    #[serde(default)]
    pub display_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    /// Author timestamp in epoch milliseconds.
    pub author_timestamp: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub extracted_keys: Vec<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl CommitRecord {
    /// First line of the message, trimmed.
    pub fn first_line(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    /// `display_id` when present, otherwise the first 10 characters of `id`.
    pub fn short_id(&self) -> String {
        if self.display_id.is_empty() {
            self.id.chars().take(10).collect()
        } else {
            self.display_id.clone()
        }
    }
}

/// An issue-tracker ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub key: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub fix_versions: Vec<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl TicketRecord {
    pub fn new(key: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            summary: summary.into(),
            status: String::new(),
            issue_type: String::new(),
            assignee: String::new(),
            fix_versions: Vec::new(),
            updated: None,
            link: None,
        }
    }
}

/// One commit referencing one known ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub key: String,
    pub commit_id: String,
    pub author: String,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub matches: Vec<MatchRecord>,
    pub missing_in_source: Vec<TicketRecord>,
    pub orphan_commits: Vec<CommitRecord>,
}

/// Where a value handed back by the cache store came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cache,
    Api,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Cache => "cache",
            Provenance::Api => "api",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive UTC time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }

    /// The four weeks ending at `now`.
    pub fn last_four_weeks(now: DateTime<Utc>) -> Self {
        Self { since: now - Duration::weeks(4), until: now }
    }

    pub fn since_millis(&self) -> i64 {
        self.since.timestamp_millis()
    }

    pub fn until_millis(&self) -> i64 {
        self.until.timestamp_millis()
    }

    pub fn contains_millis(&self, ts: i64) -> bool {
        self.since_millis() <= ts && ts <= self.until_millis()
    }
}

/// A `PROJECT/REPO` pair from the audit config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoRef {
    pub project: String,
    pub repo: String,
}

impl RepoRef {
    pub fn parse(spec: &str) -> Result<Self, crate::AuditError> {
        match spec.split_once('/') {
            Some((project, repo)) if !project.trim().is_empty() && !repo.trim().is_empty() => {
                Ok(Self { project: project.trim().to_string(), repo: repo.trim().to_string() })
            }
            _ => Err(crate::AuditError::InvalidRepo(spec.to_string())),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.repo)
    }
}

/// Commits collected for one (project, repo, branch) unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCommits {
    pub project: String,
    pub repo: String,
    pub branch: String,
    pub commits: Vec<CommitRecord>,
}

/// Outcome of fetching one (project, repo, branch) unit; one `summary.csv` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRun {
    pub project: String,
    pub repo: String,
    pub branch: String,
    pub count: usize,
    pub window: TimeWindow,
    pub csv_path: PathBuf,
    pub provenance: Provenance,
}
