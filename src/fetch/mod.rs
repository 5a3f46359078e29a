//! Commit and ticket retrieval.
//!
//! [`fetch_window`] drives any newest-first [`CommitSource`] and collects the
//! commits whose author timestamp falls inside a [`TimeWindow`]. The
//! `*_cached` helpers wrap collaborator calls in the [`CacheStore`] under
//! explicit cache keys.

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod auth;
pub mod bitbucket;
pub mod http;
pub mod jira;

pub use bitbucket::{BitbucketClient, BranchCommits};
pub use jira::JiraClient;

use crate::cache::{CacheKey, CacheStore};
use crate::domain::{CommitRecord, Provenance, TicketRecord, TimeWindow, MAX_MESSAGE_CHARS};
use crate::keys;

/// Records requested per page.
pub const PAGE_SIZE: u32 = 100;

/// Commit as delivered by the source-control API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCommit {
    pub id: String,
    #[serde(default)]
    pub display_id: String,
    #[serde(default)]
    pub author: RawAuthor,
    #[serde(default)]
    pub author_timestamp: i64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email_address: String,
}

/// One page of newest-first commits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitPage {
    #[serde(default)]
    pub values: Vec<RawCommit>,
    #[serde(default)]
    pub is_last_page: bool,
    #[serde(default)]
    pub next_page_start: Option<u64>,
}

/// A paginated, newest-first commit feed for one branch.
pub trait CommitSource {
    fn fetch_page(&self, start: u64, limit: u32) -> Result<CommitPage>;

    /// Browser link for a commit, when the source knows one.
    fn commit_link(&self, _commit_id: &str) -> Option<String> {
        None
    }
}

/// Issue-tracker search.
pub trait TicketSource {
    fn search(&self, query: &str) -> Result<Vec<TicketRecord>>;
}

impl CommitRecord {
    /// Tag a raw commit with its ticket keys and cap the stored message length.
    pub fn from_raw(raw: RawCommit, link: Option<String>) -> Self {
        let message = raw.message.unwrap_or_default();
        let extracted_keys = keys::extract(&message);
        Self {
            id: raw.id,
            display_id: raw.display_id,
            author: raw.author.name,
            author_email: raw.author.email_address,
            author_timestamp: raw.author_timestamp,
            message: message.chars().take(MAX_MESSAGE_CHARS).collect(),
            extracted_keys,
            link,
        }
    }
}

/// Collect every commit of `source` whose author timestamp lies in `window`.
///
/// Relies on the source returning commits newest first: the first commit older
/// than `window.since` ends pagination. Commits newer than `window.until` are
/// skipped. Any failed page fails the whole call.
pub fn fetch_window<S>(source: &S, window: &TimeWindow) -> Result<Vec<CommitRecord>>
where
    S: CommitSource + ?Sized,
{
    let since_ms = window.since_millis();
    let until_ms = window.until_millis();
    let mut commits = Vec::new();
    let mut start = 0u64;

    loop {
        let page = source.fetch_page(start, PAGE_SIZE)?;
        tracing::debug!(start, count = page.values.len(), "commit page");

        let mut stop = false;
        for raw in page.values {
            let ts = raw.author_timestamp;
            if ts < since_ms {
                stop = true;
                break;
            }
            if ts <= until_ms {
                let link = source.commit_link(&raw.id);
                commits.push(CommitRecord::from_raw(raw, link));
            }
        }

        if stop || page.is_last_page {
            break;
        }
        match page.next_page_start {
            Some(next) if next > start => start = next,
            other => {
                tracing::warn!(start, next = ?other, "page has no usable next offset; stopping");
                break;
            }
        }
    }

    Ok(commits)
}

/// [`fetch_window`] through the cache, keyed by branch coordinates and window.
#[allow(clippy::too_many_arguments)]
pub fn fetch_commits_cached<S>(
    store: &CacheStore,
    source: &S,
    project: &str,
    repo: &str,
    branch: &str,
    window: &TimeWindow,
    ttl_hours: u64,
    force_refresh: bool,
) -> Result<(Vec<CommitRecord>, Provenance)>
where
    S: CommitSource + ?Sized,
{
    let key = commits_cache_key(project, repo, branch, window);
    store.load_or_call(&key.to_string(), ttl_hours, || fetch_window(source, window), force_refresh)
}

pub fn commits_cache_key(project: &str, repo: &str, branch: &str, window: &TimeWindow) -> CacheKey {
    CacheKey::new("bb:commits")
        .part("project", project)
        .part("repo", repo)
        .part("branch", branch)
        .part("since", window.since.to_rfc3339())
        .part("until", window.until.to_rfc3339())
}

/// Ticket search through the cache, keyed by the query and requested fields.
pub fn fetch_tickets_cached<S>(
    store: &CacheStore,
    source: &S,
    jql: &str,
    ttl_hours: u64,
    force_refresh: bool,
) -> Result<(Vec<TicketRecord>, Provenance)>
where
    S: TicketSource + ?Sized,
{
    let key = CacheKey::new("jira:search").part("jql", jql).part("fields", jira::FIELDS);
    store.load_or_call(&key.to_string(), ttl_hours, || source.search(jql), force_refresh)
}
