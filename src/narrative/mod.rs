//! Budget-gated release narrative.
//!
//! The builder condenses per-repo commit lists into a bounded context, prices
//! the resulting prompt with a flat per-token estimate, and only calls the
//! [`TextGenerator`] when the estimate fits the caller's budget. An estimate
//! over budget is retried once with fewer highlights per repo
//! ([`REDUCED_TOP_N`]); if that still does not fit, the build fails with
//! [`AuditError::BudgetExceeded`] without any generation call.
//!
//! Generated text is cached under a fingerprint of the context, so re-running
//! an unchanged audit costs nothing.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod cost;
pub mod openai;
pub mod prompt;

pub use cost::{CostSession, Usage};
pub use openai::OpenAiClient;

use crate::cache::{CacheKey, CacheStore};
use crate::domain::{CommitRecord, Provenance, ReconciliationResult, RepoCommits, TimeWindow};
use crate::utils::{estimate_tokens, sha256_hex};
use crate::AuditError;

pub const DEFAULT_TOP_N: usize = 15;
/// Highlights per repo used for the single over-budget retry.
pub const REDUCED_TOP_N: usize = 8;
/// Flat estimate in cents per 1K tokens.
pub const CENTS_PER_1K_TOKENS: u64 = 15;
pub const NARRATIVE_TTL_HOURS: u64 = 720;
pub const HIGHLIGHT_MAX_CHARS: usize = 160;

/// One generated completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<Usage>,
}

pub trait TextGenerator {
    fn generate(&self, model: &str, system: &str, user: &str, max_tokens: u32) -> Result<Generation>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub display: String,
    pub author: String,
    pub timestamp: String,
    pub key: String,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoContext {
    pub project: String,
    pub repo: String,
    pub branch: String,
    pub count: usize,
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowLabel {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub matches: usize,
    pub missing_in_source: usize,
    pub orphan_commits: usize,
}

/// Everything the generator gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrativeContext {
    pub fix_version: String,
    pub window: WindowLabel,
    pub branches: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<Counts>,
    pub repos: Vec<RepoContext>,
}

impl NarrativeContext {
    pub fn build(
        reconciliation: Option<&ReconciliationResult>,
        repo_commits: &[RepoCommits],
        window: &TimeWindow,
        fix_version: Option<&str>,
        branches_label: &str,
        top_n: usize,
    ) -> Self {
        let repos = repo_commits
            .iter()
            .map(|rc| RepoContext {
                project: rc.project.clone(),
                repo: rc.repo.clone(),
                branch: rc.branch.clone(),
                count: rc.commits.len(),
                highlights: select_highlights(&rc.commits, top_n),
            })
            .collect();
        Self {
            fix_version: fix_version.unwrap_or_default().to_string(),
            window: WindowLabel { start: window.since.to_rfc3339(), end: window.until.to_rfc3339() },
            branches: branches_label.to_string(),
            counts: reconciliation.map(|r| Counts {
                matches: r.matches.len(),
                missing_in_source: r.missing_in_source.len(),
                orphan_commits: r.orphan_commits.len(),
            }),
            repos,
        }
    }

    /// SHA-256 of the context serialized with keys sorted.
    pub fn fingerprint(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(sha256_hex(&serde_json::to_string(&value)?))
    }
}

/// Keyword score of a commit's first line.
pub fn score_commit(line: &str) -> u32 {
    let lower = line.to_lowercase();
    let mut score = 0;
    for (word, points) in [("feat", 3), ("fix", 3), ("refactor", 2), ("perf", 2), ("bug", 2)] {
        if lower.contains(word) {
            score += points;
        }
    }
    if key_hint(line).is_some() {
        score += 1;
    }
    score
}

/// First `WORD-...` token whose prefix before the hyphen is alphabetic.
fn key_hint(line: &str) -> Option<&str> {
    line.split_whitespace()
        .map(|token| token.trim_matches(|c: char| ",.;:()[]{}".contains(c)))
        .find(|token| match token.split_once('-') {
            Some((prefix, _)) => !prefix.is_empty() && prefix.chars().all(char::is_alphabetic),
            None => false,
        })
}

fn truncate_line(line: &str) -> String {
    let line = line.trim();
    if line.chars().count() <= HIGHLIGHT_MAX_CHARS {
        line.to_string()
    } else {
        let mut out: String = line.chars().take(HIGHLIGHT_MAX_CHARS - 1).collect();
        out.push('…');
        out
    }
}

/// The `top_n` highest scoring commits, one per ticket key (or commit id).
///
/// Ties keep input order.
pub fn select_highlights(commits: &[CommitRecord], top_n: usize) -> Vec<Highlight> {
    let mut seen = HashSet::new();
    let mut scored: Vec<(u32, Highlight)> = Vec::new();

    for commit in commits {
        let line = commit.first_line();
        let key = commit.extracted_keys.first().cloned().unwrap_or_default();
        let dedup = if key.is_empty() { commit.short_id() } else { key.clone() };
        if !seen.insert(dedup) {
            continue;
        }
        let author = if commit.author.is_empty() { &commit.author_email } else { &commit.author };
        let timestamp = Utc
            .timestamp_millis_opt(commit.author_timestamp)
            .single()
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default();
        scored.push((
            score_commit(line),
            Highlight {
                display: commit.short_id(),
                author: author.clone(),
                timestamp,
                key,
                line: truncate_line(line),
            },
        ));
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(top_n).map(|(_, h)| h).collect()
}

/// Estimated cost in whole cents of one generation over `context`.
pub fn estimate_cost_cents(context: &NarrativeContext, max_tokens: u32) -> Result<u64> {
    let (system, user) = prompt::build_prompts(context)?;
    Ok(cents_for(&system, &user, max_tokens))
}

fn cents_for(system: &str, user: &str, max_tokens: u32) -> u64 {
    let tokens = estimate_tokens(&format!("{system}{user}")) as u64 + u64::from(max_tokens);
    tokens * CENTS_PER_1K_TOKENS / 1000
}

#[derive(Debug, Clone)]
pub struct NarrativeRequest {
    pub model: String,
    pub max_tokens: u32,
    pub budget_cents: u64,
    pub top_n_per_repo: usize,
    pub fix_version: Option<String>,
    pub branches_label: String,
    pub force_refresh: bool,
}

impl Default for NarrativeRequest {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1200,
            budget_cents: 10,
            top_n_per_repo: DEFAULT_TOP_N,
            fix_version: None,
            branches_label: String::new(),
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub text: String,
    pub provenance: Provenance,
    /// Highlights per repo actually sent.
    pub top_n: usize,
    pub estimated_cents: u64,
    /// Reported usage; `None` when served from cache or not reported.
    pub usage: Option<Usage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedNarrative {
    text: String,
}

struct Prepared {
    context: NarrativeContext,
    system: String,
    user: String,
    estimated_cents: u64,
}

pub struct NarrativeBuilder<'a> {
    store: &'a CacheStore,
    generator: &'a dyn TextGenerator,
}

impl<'a> NarrativeBuilder<'a> {
    pub fn new(store: &'a CacheStore, generator: &'a dyn TextGenerator) -> Self {
        Self { store, generator }
    }

    pub fn build(
        &self,
        reconciliation: Option<&ReconciliationResult>,
        repo_commits: &[RepoCommits],
        window: &TimeWindow,
        request: &NarrativeRequest,
    ) -> Result<Narrative> {
        let prepare = |top_n: usize| -> Result<Prepared> {
            let context = NarrativeContext::build(
                reconciliation,
                repo_commits,
                window,
                request.fix_version.as_deref(),
                &request.branches_label,
                top_n,
            );
            let (system, user) = prompt::build_prompts(&context)?;
            let estimated_cents = cents_for(&system, &user, request.max_tokens);
            Ok(Prepared { context, system, user, estimated_cents })
        };

        let mut top_n = request.top_n_per_repo;
        let mut prepared = prepare(top_n)?;
        if prepared.estimated_cents > request.budget_cents && top_n > REDUCED_TOP_N {
            tracing::warn!(
                estimated_cents = prepared.estimated_cents,
                budget_cents = request.budget_cents,
                "narrative over budget at top {top_n}; retrying with top {REDUCED_TOP_N}"
            );
            top_n = REDUCED_TOP_N;
            prepared = prepare(top_n)?;
        }
        if prepared.estimated_cents > request.budget_cents {
            return Err(AuditError::BudgetExceeded {
                estimated_cents: prepared.estimated_cents,
                budget_cents: request.budget_cents,
            }
            .into());
        }

        let key = CacheKey::new("llm:summary")
            .part("model", &request.model)
            .part("fp", prepared.context.fingerprint()?);

        let mut usage = None;
        let (cached, provenance) = self.store.load_or_call(
            &key.to_string(),
            NARRATIVE_TTL_HOURS,
            || {
                let generation = self.generator.generate(
                    &request.model,
                    &prepared.system,
                    &prepared.user,
                    request.max_tokens,
                )?;
                if generation.text.trim().is_empty() {
                    return Err(AuditError::EmptyNarrative.into());
                }
                usage = generation.usage;
                Ok(CachedNarrative { text: generation.text })
            },
            request.force_refresh,
        )?;

        let text = cached.text;
        if text.trim().is_empty() {
            return Err(AuditError::EmptyNarrative.into());
        }
        tracing::info!(%provenance, top_n, estimated_cents = prepared.estimated_cents, "narrative ready");
        Ok(Narrative { text, provenance, top_n, estimated_cents: prepared.estimated_cents, usage })
    }
}
