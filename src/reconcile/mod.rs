//! Ticket/commit reconciliation.
//!
//! Every ticket ends up either matched by at least one commit or in
//! `missing_in_source`. Every commit either contributes one match per known
//! ticket key it mentions, or lands in `orphan_commits`.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use crate::domain::{CommitRecord, MatchRecord, ReconciliationResult, TicketRecord};
use crate::keys;

pub fn reconcile(tickets: &[TicketRecord], commits: &[CommitRecord]) -> ReconciliationResult {
    let mut by_key: BTreeMap<&str, &TicketRecord> = BTreeMap::new();
    for ticket in tickets {
        if by_key.insert(ticket.key.as_str(), ticket).is_some() {
            tracing::warn!(key = %ticket.key, "duplicate ticket key; keeping the last one");
        }
    }

    let mut result = ReconciliationResult::default();
    let mut matched: HashSet<&str> = HashSet::new();

    for commit in commits {
        let ids = commit_keys(commit);
        let mut hit = false;
        for id in ids.iter() {
            if let Some((&key, ticket)) = by_key.get_key_value(id.as_str()) {
                hit = true;
                matched.insert(key);
                result.matches.push(MatchRecord {
                    key: key.to_string(),
                    commit_id: commit.id.clone(),
                    author: commit.author.clone(),
                    summary: ticket.summary.clone(),
                });
            }
        }
        if !hit {
            result.orphan_commits.push(commit.clone());
        }
    }

    result.missing_in_source = by_key
        .into_iter()
        .filter(|(key, _)| !matched.contains(key))
        .map(|(_, ticket)| ticket.clone())
        .collect();

    tracing::debug!(
        matches = result.matches.len(),
        missing = result.missing_in_source.len(),
        orphans = result.orphan_commits.len(),
        "reconciled"
    );
    result
}

/// Attached keys, or keys extracted from the message when none are attached.
fn commit_keys(commit: &CommitRecord) -> Cow<'_, [String]> {
    if commit.extracted_keys.is_empty() {
        Cow::Owned(keys::extract(&commit.message))
    } else {
        Cow::Borrowed(&commit.extracted_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(id: &str, message: &str) -> CommitRecord {
        CommitRecord {
            id: id.to_string(),
            display_id: id.to_string(),
            author: format!("{id}-author"),
            author_email: String::new(),
            author_timestamp: 0,
            message: message.to_string(),
            extracted_keys: keys::extract(message),
            link: None,
        }
    }

    #[test]
    fn matches_missing_and_orphans() {
        let tickets = vec![TicketRecord::new("ABC-1", "Login"), TicketRecord::new("ABC-2", "Logout")];
        let commits = vec![commit("c1", "fix ABC-1"), commit("c2", "no ticket")];

        let result = reconcile(&tickets, &commits);
        assert_eq!(
            result.matches,
            vec![MatchRecord {
                key: "ABC-1".to_string(),
                commit_id: "c1".to_string(),
                author: "c1-author".to_string(),
                summary: "Login".to_string(),
            }]
        );
        assert_eq!(result.missing_in_source.len(), 1);
        assert_eq!(result.missing_in_source[0].key, "ABC-2");
        assert_eq!(result.orphan_commits.len(), 1);
        assert_eq!(result.orphan_commits[0].id, "c2");
    }

    #[test]
    fn one_match_per_commit_key_pair() {
        let tickets = vec![TicketRecord::new("A-1", "a"), TicketRecord::new("B-2", "b")];
        let commits = vec![commit("c1", "A-1 and B-2"), commit("c2", "follow-up A-1")];
        let result = reconcile(&tickets, &commits);
        let pairs: Vec<(&str, &str)> =
            result.matches.iter().map(|m| (m.commit_id.as_str(), m.key.as_str())).collect();
        assert_eq!(pairs, vec![("c1", "A-1"), ("c1", "B-2"), ("c2", "A-1")]);
        assert!(result.missing_in_source.is_empty());
        assert!(result.orphan_commits.is_empty());
    }

    #[test]
    fn keys_outside_the_ticket_set_are_orphans() {
        let tickets = vec![TicketRecord::new("ABC-1", "x")];
        let commits = vec![commit("c1", "OTHER-9 only")];
        let result = reconcile(&tickets, &commits);
        assert!(result.matches.is_empty());
        assert_eq!(result.orphan_commits[0].id, "c1");
        assert_eq!(result.missing_in_source[0].key, "ABC-1");
    }

    #[test]
    fn falls_back_to_message_when_no_keys_attached() {
        let tickets = vec![TicketRecord::new("ABC-7", "x")];
        let mut bare = commit("c1", "ABC-7 done");
        bare.extracted_keys.clear();
        let result = reconcile(&tickets, &[bare]);
        assert_eq!(result.matches.len(), 1);
    }

    #[test]
    fn duplicate_ticket_keys_keep_the_last() {
        let tickets = vec![TicketRecord::new("ABC-1", "first"), TicketRecord::new("ABC-1", "second")];
        let result = reconcile(&tickets, &[commit("c1", "ABC-1")]);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].summary, "second");

        let unmatched = reconcile(&tickets, &[]);
        assert_eq!(unmatched.missing_in_source.len(), 1);
        assert_eq!(unmatched.missing_in_source[0].summary, "second");
    }

    #[test]
    fn missing_tickets_are_sorted_by_key() {
        let tickets = vec![TicketRecord::new("Z-1", ""), TicketRecord::new("A-1", ""), TicketRecord::new("M-1", "")];
        let result = reconcile(&tickets, &[]);
        let keys: Vec<&str> = result.missing_in_source.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["A-1", "M-1", "Z-1"]);
    }

    #[test]
    fn every_ticket_and_commit_lands_in_exactly_one_bucket() {
        let tickets: Vec<TicketRecord> =
            (1..=6).map(|i| TicketRecord::new(format!("P-{i}"), "")).collect();
        let commits = vec![
            commit("a", "P-1"),
            commit("b", "P-2 P-3"),
            commit("c", "nothing"),
            commit("d", "Q-1"),
            commit("e", "P-2 again"),
        ];
        let result = reconcile(&tickets, &commits);

        let matched: HashSet<&str> = result.matches.iter().map(|m| m.key.as_str()).collect();
        let missing: HashSet<&str> = result.missing_in_source.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(matched, HashSet::from(["P-1", "P-2", "P-3"]));
        assert_eq!(missing, HashSet::from(["P-4", "P-5", "P-6"]));
        assert_eq!(result.matches.len(), 4);
        assert!(matched.is_disjoint(&missing));
        assert_eq!(matched.len() + missing.len(), tickets.len());

        let matched_commits: HashSet<&str> = result.matches.iter().map(|m| m.commit_id.as_str()).collect();
        let orphans: HashSet<&str> = result.orphan_commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(matched_commits, HashSet::from(["a", "b", "e"]));
        assert_eq!(orphans, HashSet::from(["c", "d"]));
        assert!(matched_commits.is_disjoint(&orphans));
        assert_eq!(matched_commits.len() + orphans.len(), commits.len());
    }
}
