//! CSV tables for the audit outputs.
//!
//! Fields are quoted only when they contain a comma, quote, or line break.

use anyhow::Result;
use std::path::Path;

use crate::domain::{CommitRecord, MatchRecord, RepoRun, TicketRecord};
use crate::utils::write_atomic;

/// Header plus rows, rendered with `\n` line endings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    header: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new(header: &[&'static str]) -> Self {
        Self { header: header.to_vec(), rows: Vec::new() }
    }

    pub fn push(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.header.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, self.header.iter().copied());
        for row in &self.rows {
            push_line(&mut out, row.iter().map(String::as_str));
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes())
    }
}

fn push_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn commits_table(commits: &[CommitRecord]) -> CsvTable {
    let mut table =
        CsvTable::new(&["id", "displayId", "author", "authorTimestamp", "message", "jira_keys"]);
    for c in commits {
        table.push(vec![
            c.id.clone(),
            c.display_id.clone(),
            c.author.clone(),
            c.author_timestamp.to_string(),
            c.message.clone(),
            c.extracted_keys.join(","),
        ]);
    }
    table
}

pub fn summary_table(runs: &[RepoRun]) -> CsvTable {
    let mut table = CsvTable::new(&[
        "project", "repo", "branch", "count", "since_iso", "until_iso", "csv_path", "source",
    ]);
    for run in runs {
        table.push(vec![
            run.project.clone(),
            run.repo.clone(),
            run.branch.clone(),
            run.count.to_string(),
            run.window.since.to_rfc3339(),
            run.window.until.to_rfc3339(),
            run.csv_path.display().to_string(),
            run.provenance.to_string(),
        ]);
    }
    table
}

pub fn matches_table(matches: &[MatchRecord]) -> CsvTable {
    let mut table = CsvTable::new(&["key", "commit_id", "author", "summary"]);
    for m in matches {
        table.push(vec![m.key.clone(), m.commit_id.clone(), m.author.clone(), m.summary.clone()]);
    }
    table
}

pub fn missing_table(tickets: &[TicketRecord]) -> CsvTable {
    let mut table = CsvTable::new(&[
        "key", "summary", "status", "issuetype", "assignee", "fixVersions", "updated", "link",
    ]);
    for t in tickets {
        table.push(vec![
            t.key.clone(),
            t.summary.clone(),
            t.status.clone(),
            t.issue_type.clone(),
            t.assignee.clone(),
            t.fix_versions.join(","),
            t.updated.clone().unwrap_or_default(),
            t.link.clone().unwrap_or_default(),
        ]);
    }
    table
}

pub fn orphans_table(commits: &[CommitRecord]) -> CsvTable {
    let mut table =
        CsvTable::new(&["id", "displayId", "author", "authorTimestamp", "message", "link"]);
    for c in commits {
        table.push(vec![
            c.id.clone(),
            c.display_id.clone(),
            c.author.clone(),
            c.author_timestamp.to_string(),
            c.first_line().to_string(),
            c.link.clone().unwrap_or_default(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn commits_table_layout() {
        let commit = CommitRecord {
            id: "abc123".to_string(),
            display_id: "abc".to_string(),
            author: "Ann".to_string(),
            author_email: "ann@x.io".to_string(),
            author_timestamp: 1_700_000_000_000,
            message: "MOB-1, MOB-2: fix".to_string(),
            extracted_keys: vec!["MOB-1".to_string(), "MOB-2".to_string()],
            link: None,
        };
        let rendered = commits_table(&[commit]).render();
        assert_eq!(
            rendered,
            "id,displayId,author,authorTimestamp,message,jira_keys\n\
             abc123,abc,Ann,1700000000000,\"MOB-1, MOB-2: fix\",\"MOB-1,MOB-2\"\n"
        );
    }

    #[test]
    fn empty_table_is_header_only() {
        let table = matches_table(&[]);
        assert!(table.is_empty());
        assert_eq!(table.render(), "key,commit_id,author,summary\n");
    }
}
