//! release-audit: cross-reference Jira tickets against Bitbucket commits
//!
//! The core is a cache-backed fetch/reconcile engine: commits are collected
//! through a time-windowed paginated fetcher, tagged with the ticket keys found
//! in their messages, and reconciled against the tickets of a release. Every
//! remote call goes through a durable TTL cache keyed by a canonical request
//! fingerprint.

pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod keys;
pub mod narrative;
pub mod reconcile;
pub mod render;
pub mod utils;

pub use error::AuditError;
