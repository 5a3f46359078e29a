//! Markdown audit summary and narrative output

use anyhow::Result;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::domain::{ReconciliationResult, RepoRun, TimeWindow};
use crate::utils::write_atomic;

pub const MISSING_CSV: &str = "missing_in_repo.csv";
pub const ORPHANS_CSV: &str = "orphan_commits.csv";
pub const MATCHES_CSV: &str = "matches.csv";

pub fn render_audit_markdown(
    runs: &[RepoRun],
    window: &TimeWindow,
    fix_version: Option<&str>,
    reconciliation: Option<&ReconciliationResult>,
) -> String {
    let mut md = String::from("# Release audit\n\n");
    if let Some(version) = fix_version.filter(|v| !v.is_empty()) {
        let _ = writeln!(md, "Fix version: `{version}`  ");
    }
    let _ = writeln!(md, "Window: {} to {}\n", window.since.to_rfc3339(), window.until.to_rfc3339());

    md.push_str("| Project | Repo | Branch | Count | Source |\n|---|---|---|---|---|\n");
    for run in runs {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} |",
            cell(&run.project),
            cell(&run.repo),
            cell(&run.branch),
            run.count,
            run.provenance
        );
    }
    md.push('\n');

    match reconciliation {
        Some(result) => {
            let _ = writeln!(
                md,
                "**Jira comparison:** {} issue(s) missing in repo · {} orphan commit(s) · {} match(es).\n",
                result.missing_in_source.len(),
                result.orphan_commits.len(),
                result.matches.len()
            );
            let _ = writeln!(md, "- [Missing in repo CSV]({MISSING_CSV})");
            let _ = writeln!(md, "- [Orphan commits CSV]({ORPHANS_CSV})");
            let _ = writeln!(md, "- [Matches CSV]({MATCHES_CSV})");
        }
        None => md.push_str("**Jira comparison:** skipped (no JQL or fix version).\n"),
    }
    md
}

fn cell(value: &str) -> String {
    value.replace('|', "\\|")
}

/// Write the generated narrative to `<dir>/<base_name>.md`.
pub fn write_narrative(dir: &Path, base_name: &str, text: &str) -> Result<PathBuf> {
    let path = dir.join(format!("{base_name}.md"));
    let mut body = text.trim_end().to_string();
    body.push('\n');
    write_atomic(&path, body.as_bytes())?;
    Ok(path)
}
