//! Output rendering (CSV tables, Markdown summary)

pub mod csv;
pub mod markdown;

use anyhow::Result;
use std::path::{Path, PathBuf};

pub use self::csv::{commits_table, escape_field, CsvTable};
pub use markdown::{render_audit_markdown, write_narrative};

use crate::domain::{CommitRecord, ReconciliationResult, RepoCommits, TimeWindow};
use crate::utils::file_safe;

pub const SUMMARY_CSV: &str = "summary.csv";
pub const AUDIT_MARKDOWN: &str = "release_audit.md";

/// `commits_<project>_<repo>_<branch>_<since>_<until>.csv`
pub fn commits_file_name(unit: &RepoCommits, window: &TimeWindow) -> String {
    format!(
        "commits_{}_{}_{}_{}_{}.csv",
        file_safe(&unit.project),
        file_safe(&unit.repo),
        file_safe(&unit.branch),
        window.since.format("%Y%m%d"),
        window.until.format("%Y%m%d")
    )
}

pub fn write_commits_csv(path: &Path, commits: &[CommitRecord]) -> Result<()> {
    commits_table(commits).write(path)
}

/// Paths of the three reconciliation tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationFiles {
    pub matches: PathBuf,
    pub missing: PathBuf,
    pub orphans: PathBuf,
}

pub fn write_reconciliation(dir: &Path, result: &ReconciliationResult) -> Result<ReconciliationFiles> {
    let files = ReconciliationFiles {
        matches: dir.join(markdown::MATCHES_CSV),
        missing: dir.join(markdown::MISSING_CSV),
        orphans: dir.join(markdown::ORPHANS_CSV),
    };
    self::csv::matches_table(&result.matches).write(&files.matches)?;
    self::csv::missing_table(&result.missing_in_source).write(&files.missing)?;
    self::csv::orphans_table(&result.orphan_commits).write(&files.orphans)?;
    Ok(files)
}
