//! Typed error conditions that callers branch on.
//!
//! Everything else travels as `anyhow::Error` with context attached.

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum AuditError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid repo '{0}', expected PROJECT/REPO")]
    InvalidRepo(String),

    #[error("{service} API error ({status}): {body}")]
    Api { service: &'static str, status: u16, body: String },

    #[error(
        "estimated LLM cost ~{estimated_cents}¢ exceeds budget ({budget_cents}¢); \
         raise --llm-budget-cents or lower --llm-top-n"
    )]
    BudgetExceeded { estimated_cents: u64, budget_cents: u64 },

    #[error("LLM returned an empty summary")]
    EmptyNarrative,
}

impl AuditError {
    /// Build an API error, keeping at most 500 characters of the response body.
    pub fn api(service: &'static str, status: u16, body: &str) -> Self {
        let body: String = body.chars().take(500).collect::<String>().replace('\n', " ");
        Self::Api { service, status, body }
    }
}
