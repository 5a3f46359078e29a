//! Ticket key extraction from free text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Whole-word `PROJ-123` style ticket keys.
static TICKET_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z][A-Z0-9]*-\d+)\b").unwrap());

/// Extract ticket keys from `text`, in order of first occurrence, without duplicates.
pub fn extract(text: &str) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut keys = Vec::new();
    for cap in TICKET_KEY.captures_iter(text) {
        if let Some(key) = cap.get(1) {
            if seen.insert(key.as_str()) {
                keys.push(key.as_str().to_string());
            }
        }
    }
    keys
}

/// Whether `token` as a whole is a ticket key.
pub fn is_key(token: &str) -> bool {
    TICKET_KEY.find(token).is_some_and(|m| m.start() == 0 && m.end() == token.len())
}
