//! Audit command implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::Args;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::cache::CacheStore;
use crate::config::{load_config, AuditConfig, Settings};
use crate::domain::{CommitRecord, Provenance, ReconciliationResult, RepoCommits, RepoRef, RepoRun, TimeWindow};
use crate::fetch::jira::render_jql;
use crate::fetch::{fetch_commits_cached, fetch_tickets_cached, BitbucketClient, JiraClient};
use crate::narrative::{CostSession, NarrativeBuilder, NarrativeRequest, OpenAiClient};
use crate::reconcile::reconcile;
use crate::render::csv::summary_table;
use crate::render::{
    commits_file_name, render_audit_markdown, write_commits_csv, write_narrative,
    write_reconciliation, AUDIT_MARKDOWN, SUMMARY_CSV,
};
use crate::utils::write_atomic;
use crate::AuditError;

const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Args)]
pub struct AuditArgs {
    /// Audit config (repos, branches, fix version); discovered in the working directory when omitted
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the develop branch from the config
    #[arg(long, value_name = "BRANCH")]
    pub develop_branch: Option<String>,

    /// Override the release branch from the config
    #[arg(long, value_name = "BRANCH")]
    pub release_branch: Option<String>,

    /// Audit only the develop branch
    #[arg(long, conflicts_with = "release_only")]
    pub develop_only: bool,

    /// Audit only the release branch
    #[arg(long)]
    pub release_only: bool,

    /// Window start (YYYY-MM-DD or RFC 3339, UTC); defaults to four weeks before --until
    #[arg(long, value_name = "DATE")]
    pub since: Option<String>,

    /// Window end (YYYY-MM-DD or RFC 3339, UTC); defaults to now
    #[arg(long, value_name = "DATE")]
    pub until: Option<String>,

    /// Explicit JQL for the ticket search
    #[arg(long, value_name = "JQL")]
    pub jql: Option<String>,

    /// Release label substituted into the JQL template
    #[arg(long, value_name = "VERSION")]
    pub fix_version: Option<String>,

    /// Reuse cached API responses younger than this
    #[arg(long, value_name = "HOURS", default_value_t = 12)]
    pub cache_ttl_hours: u64,

    /// Ignore cached commits and tickets
    #[arg(long)]
    pub force_refresh: bool,

    /// Directory for CSV and Markdown outputs
    #[arg(short = 'o', long, value_name = "DIR", default_value = "data/outputs")]
    pub output_dir: PathBuf,

    /// Generate the optional LLM-written release narrative
    #[arg(long)]
    pub write_llm_summary: bool,

    /// Model for the narrative (default: config llm_model, else gpt-4o-mini)
    #[arg(long, value_name = "MODEL")]
    pub llm_model: Option<String>,

    /// Max completion tokens for the narrative
    #[arg(long, value_name = "TOKENS", default_value_t = 1200)]
    pub llm_max_tokens: u32,

    /// Hard cap on estimated narrative spend (cents)
    #[arg(long, value_name = "CENTS", default_value_t = 10)]
    pub llm_budget_cents: u64,

    /// Highlights per repo included in the narrative context
    #[arg(long, value_name = "N", default_value_t = 15)]
    pub llm_top_n: usize,

    /// Base file name for the narrative Markdown
    #[arg(long, value_name = "NAME", default_value = "release_audit_llm")]
    pub llm_report_name: String,
}

/// Which configured branches an audit covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchMode {
    Both,
    DevelopOnly,
    ReleaseOnly,
}

impl AuditArgs {
    fn branch_mode(&self) -> BranchMode {
        if self.develop_only {
            BranchMode::DevelopOnly
        } else if self.release_only {
            BranchMode::ReleaseOnly
        } else {
            BranchMode::Both
        }
    }
}

fn defined(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Branches to audit, release first. CLI overrides win over the config.
pub fn resolve_branches(
    config: &AuditConfig,
    develop_override: Option<&str>,
    release_override: Option<&str>,
    mode: BranchMode,
) -> Result<Vec<String>, AuditError> {
    let develop = defined(develop_override).or(defined(config.develop_branch.as_deref()));
    let release = defined(release_override).or(defined(config.release_branch.as_deref()));

    let branches = match mode {
        BranchMode::DevelopOnly => {
            let branch = develop.ok_or_else(|| AuditError::Config("Develop branch not defined".to_string()))?;
            tracing::info!("--develop-only: release branch skipped");
            vec![branch.to_string()]
        }
        BranchMode::ReleaseOnly => {
            let branch = release.ok_or_else(|| AuditError::Config("Release branch not defined".to_string()))?;
            tracing::info!("--release-only: develop branch skipped");
            vec![branch.to_string()]
        }
        BranchMode::Both => {
            let mut branches = Vec::new();
            match release {
                Some(branch) => branches.push(branch.to_string()),
                None => tracing::info!("release branch not defined; skipping"),
            }
            match develop {
                Some(branch) if !branches.iter().any(|b| b == branch) => branches.push(branch.to_string()),
                Some(_) => {}
                None => tracing::info!("develop branch not defined; skipping"),
            }
            branches
        }
    };

    if branches.is_empty() {
        return Err(AuditError::Config("no branch to audit".to_string()));
    }
    Ok(branches)
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, AuditError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            AuditError::Config(format!("invalid date '{value}', expected YYYY-MM-DD or RFC 3339"))
        })
}

/// Window from optional bounds; a missing bound is filled with a four week span.
pub fn resolve_window(
    since: Option<&str>,
    until: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TimeWindow, AuditError> {
    let window = match (since.map(parse_instant).transpose()?, until.map(parse_instant).transpose()?) {
        (None, None) => TimeWindow::last_four_weeks(now),
        (Some(since), None) => TimeWindow::new(since, now),
        (None, Some(until)) => TimeWindow::new(until - Duration::weeks(4), until),
        (Some(since), Some(until)) => TimeWindow::new(since, until),
    };
    if window.since > window.until {
        return Err(AuditError::Config(format!(
            "window start {} is after its end {}",
            window.since.to_rfc3339(),
            window.until.to_rfc3339()
        )));
    }
    Ok(window)
}

/// Strip surrounding whitespace and quotes; empty means unset.
pub fn clean_fix_version(raw: Option<&str>) -> Option<String> {
    raw.map(|v| v.trim().trim_matches(|c: char| c == '"' || c == '\'').trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// JQL for the ticket search: explicit query, else the template filled with
/// the fix version, else a plain `fixVersion` query.
pub fn resolve_jql(explicit: Option<&str>, template: Option<&str>, fix_version: Option<&str>) -> Option<String> {
    if let Some(jql) = defined(explicit) {
        return Some(jql.to_string());
    }
    let template = defined(template);
    match (template, defined(fix_version)) {
        (Some(template), Some(version)) => Some(render_jql(template, version)),
        (None, Some(version)) => Some(format!("fixVersion = \"{version}\"")),
        (Some(template), None) if !template.contains("{fix_version}") => Some(template.to_string()),
        _ => None,
    }
}

/// Commits across units, first occurrence of each id kept.
fn unique_commits(units: &[RepoCommits]) -> Vec<CommitRecord> {
    let mut seen = HashSet::new();
    units
        .iter()
        .flat_map(|unit| unit.commits.iter())
        .filter(|commit| seen.insert(commit.id.as_str()))
        .cloned()
        .collect()
}

pub fn run(args: AuditArgs, settings: &Settings) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config = load_config(&cwd, args.config.as_deref())?;

    let branches = resolve_branches(
        &config,
        args.develop_branch.as_deref(),
        args.release_branch.as_deref(),
        args.branch_mode(),
    )?;
    println!("Branches resolved: {}", branches.join(", "));

    let window = resolve_window(args.since.as_deref(), args.until.as_deref(), Utc::now())?;
    println!("Commit window: {} to {}", window.since.to_rfc3339(), window.until.to_rfc3339());

    let repos = config.repo_refs()?;
    println!("Repos: {}", repos.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "));

    let store = CacheStore::open(&settings.cache_dir, settings.cache_backend)?;
    let bitbucket = BitbucketClient::new(settings)?;

    let units: Vec<(&RepoRef, &str)> = repos
        .iter()
        .flat_map(|repo| branches.iter().map(move |branch| (repo, branch.as_str())))
        .collect();
    let ttl_hours = args.cache_ttl_hours;
    let force_refresh = args.force_refresh;

    let fetched = units
        .par_iter()
        .map(|&(repo, branch)| -> Result<(RepoCommits, Provenance)> {
            let feed = bitbucket.commits(&repo.project, &repo.repo, branch);
            let (commits, provenance) = fetch_commits_cached(
                &store,
                &feed,
                &repo.project,
                &repo.repo,
                branch,
                &window,
                ttl_hours,
                force_refresh,
            )
            .with_context(|| format!("Failed fetching commits for {repo} {branch}"))?;
            let unit = RepoCommits {
                project: repo.project.clone(),
                repo: repo.repo.clone(),
                branch: branch.to_string(),
                commits,
            };
            Ok((unit, provenance))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut runs = Vec::with_capacity(fetched.len());
    let mut commit_units = Vec::with_capacity(fetched.len());
    for (unit, provenance) in fetched {
        let csv_path = args.output_dir.join(commits_file_name(&unit, &window));
        write_commits_csv(&csv_path, &unit.commits)?;
        println!(
            "{}/{} {}: {} ({} commits)",
            unit.project,
            unit.repo,
            unit.branch,
            provenance,
            unit.commits.len()
        );
        tracing::info!(project = %unit.project, repo = %unit.repo, branch = %unit.branch, %provenance, count = unit.commits.len(), "commits collected");
        runs.push(RepoRun {
            project: unit.project.clone(),
            repo: unit.repo.clone(),
            branch: unit.branch.clone(),
            count: unit.commits.len(),
            window,
            csv_path,
            provenance,
        });
        commit_units.push(unit);
    }

    let summary_path = args.output_dir.join(SUMMARY_CSV);
    summary_table(&runs).write(&summary_path)?;
    println!("Summary written to {}", summary_path.display());

    let fix_version = clean_fix_version(args.fix_version.as_deref().or(config.fix_version.as_deref()));
    let jql = resolve_jql(args.jql.as_deref(), settings.default_jql.as_deref(), fix_version.as_deref());
    let reconciliation = match jql {
        Some(jql) => Some(compare_with_jira(
            settings,
            &store,
            &jql,
            &commit_units,
            ttl_hours,
            force_refresh,
            &args.output_dir,
        )?),
        None => {
            println!("Jira comparison skipped (no --jql, DEFAULT_JQL, or fix version)");
            None
        }
    };

    let markdown = render_audit_markdown(&runs, &window, fix_version.as_deref(), reconciliation.as_ref());
    let markdown_path = args.output_dir.join(AUDIT_MARKDOWN);
    write_atomic(&markdown_path, markdown.as_bytes())?;
    println!("Report written to {}", markdown_path.display());

    if !args.write_llm_summary {
        println!("LLM summary not requested (use --write-llm-summary to enable).");
        return Ok(());
    }

    let request = NarrativeRequest {
        model: args
            .llm_model
            .clone()
            .or_else(|| config.llm_model.clone())
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        max_tokens: args.llm_max_tokens,
        budget_cents: args.llm_budget_cents,
        top_n_per_repo: args.llm_top_n,
        fix_version,
        branches_label: branches.join(", "),
        force_refresh: false,
    };
    match write_llm_summary(
        settings,
        &store,
        reconciliation.as_ref(),
        &commit_units,
        &window,
        &request,
        &args.output_dir,
        &args.llm_report_name,
    ) {
        Ok(path) => println!("LLM summary written: {}", path.display()),
        Err(err) => {
            tracing::warn!("LLM summary skipped: {err:#}");
            println!("LLM summary skipped: {err:#}");
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn compare_with_jira(
    settings: &Settings,
    store: &CacheStore,
    jql: &str,
    units: &[RepoCommits],
    ttl_hours: u64,
    force_refresh: bool,
    output_dir: &Path,
) -> Result<ReconciliationResult> {
    let jira = JiraClient::new(settings)?;
    jira.validate_jql(jql)?;
    let (tickets, provenance) = fetch_tickets_cached(store, &jira, jql, ttl_hours, force_refresh)?;
    println!("Jira search: {} ({} issues)", provenance, tickets.len());

    let result = reconcile(&tickets, &unique_commits(units));
    let files = write_reconciliation(output_dir, &result)?;
    println!(
        "Jira comparison: {} match(es), {} issue(s) missing in repo, {} orphan commit(s)",
        result.matches.len(),
        result.missing_in_source.len(),
        result.orphan_commits.len()
    );
    tracing::debug!(missing = %files.missing.display(), orphans = %files.orphans.display(), "reconciliation written");
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
fn write_llm_summary(
    settings: &Settings,
    store: &CacheStore,
    reconciliation: Option<&ReconciliationResult>,
    units: &[RepoCommits],
    window: &TimeWindow,
    request: &NarrativeRequest,
    output_dir: &Path,
    report_name: &str,
) -> Result<PathBuf> {
    let generator = OpenAiClient::new(settings)?;
    let narrative = NarrativeBuilder::new(store, &generator).build(reconciliation, units, window, request)?;

    let mut costs = CostSession::new();
    if let Some(usage) = narrative.usage {
        costs.record("release narrative", &request.model, usage);
    }
    costs.log_summary();

    write_narrative(output_dir, report_name, &narrative.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(release: Option<&str>, develop: Option<&str>) -> AuditConfig {
        AuditConfig {
            repos: BTreeMap::from([("MOB/app".to_string(), "App".to_string())]),
            release_branch: release.map(str::to_string),
            develop_branch: develop.map(str::to_string),
            ..AuditConfig::default()
        }
    }

    #[test]
    fn both_branches_release_first() {
        let cfg = config(Some("release/1.2"), Some("develop"));
        assert_eq!(
            resolve_branches(&cfg, None, None, BranchMode::Both).unwrap(),
            vec!["release/1.2", "develop"]
        );
    }

    #[test]
    fn undefined_branch_is_skipped() {
        let cfg = config(None, Some("develop"));
        assert_eq!(resolve_branches(&cfg, None, None, BranchMode::Both).unwrap(), vec!["develop"]);
        assert!(resolve_branches(&cfg, None, None, BranchMode::ReleaseOnly).is_err());
    }

    #[test]
    fn overrides_win_over_config() {
        let cfg = config(Some("release/1.2"), Some("develop"));
        assert_eq!(
            resolve_branches(&cfg, Some("main"), None, BranchMode::DevelopOnly).unwrap(),
            vec!["main"]
        );
        assert_eq!(
            resolve_branches(&cfg, None, Some(" "), BranchMode::ReleaseOnly).unwrap(),
            vec!["release/1.2"]
        );
    }

    #[test]
    fn fix_version_is_cleaned() {
        assert_eq!(clean_fix_version(Some("  \"1.2.0\" ")).as_deref(), Some("1.2.0"));
        assert_eq!(clean_fix_version(Some("'R55'")).as_deref(), Some("R55"));
        assert_eq!(clean_fix_version(Some(" \"\" ")), None);
        assert_eq!(clean_fix_version(None), None);
    }

    #[test]
    fn jql_resolution_order() {
        assert_eq!(
            resolve_jql(Some("  project = MOB "), Some("x"), Some("1.2")).as_deref(),
            Some("project = MOB")
        );
        assert_eq!(
            resolve_jql(None, Some("fixVersion = \"{fix_version}\" AND project = MOB"), Some("1.2")).as_deref(),
            Some("fixVersion = \"1.2\" AND project = MOB")
        );
        assert_eq!(resolve_jql(None, None, Some("1.2")).as_deref(), Some("fixVersion = \"1.2\""));
        assert_eq!(resolve_jql(None, Some("fixVersion = {fix_version}"), None), None);
        assert_eq!(resolve_jql(Some(" "), None, None), None);
    }

    #[test]
    fn window_defaults_and_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let default = resolve_window(None, None, now).unwrap();
        assert_eq!(default.until, now);
        assert_eq!(default.since, now - Duration::weeks(4));

        let explicit = resolve_window(Some("2024-04-01"), Some("2024-04-15T08:30:00Z"), now).unwrap();
        assert_eq!(explicit.since, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
        assert_eq!(explicit.until, Utc.with_ymd_and_hms(2024, 4, 15, 8, 30, 0).unwrap());

        let until_only = resolve_window(None, Some("2024-04-29"), now).unwrap();
        assert_eq!(until_only.since, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());

        assert!(resolve_window(Some("2024-05-02"), Some("2024-05-01"), now).is_err());
        assert!(resolve_window(Some("yesterday"), None, now).is_err());
    }

    #[test]
    fn commits_shared_by_branches_are_reconciled_once() {
        let commit = |id: &str| CommitRecord {
            id: id.to_string(),
            display_id: id.to_string(),
            author: String::new(),
            author_email: String::new(),
            author_timestamp: 0,
            message: String::new(),
            extracted_keys: Vec::new(),
            link: None,
        };
        let unit = |branch: &str, ids: &[&str]| RepoCommits {
            project: "MOB".to_string(),
            repo: "app".to_string(),
            branch: branch.to_string(),
            commits: ids.iter().map(|id| commit(id)).collect(),
        };
        let units = vec![unit("release", &["a", "b"]), unit("develop", &["b", "c"])];
        let ids: Vec<String> = unique_commits(&units).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
