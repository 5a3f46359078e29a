//! Prompt text for the release narrative

use anyhow::Result;

use super::NarrativeContext;

pub const SYSTEM_PROMPT: &str = "You are a release auditor. Write concise, accurate summaries from \
structured context. Prioritize clarity, business impact, and testing guidance. Avoid guessing. \
If information is missing, state that briefly and continue.";

const INSTRUCTIONS: &str = "Write a release narrative with the following sections:

1) Executive Summary (5-8 bullets)
   - Call out which repos saw the most change and why (based on commit text).
   - Mention major themes: features, fixes, refactors.
2) Repo Highlights
   - For each repo, list 3-5 notable items: \"**<short id>**: <one-line summary>\".
3) Potential Risks & Test Focus
   - Deduce plausible risk areas (e.g., payment flows, data migrations).
   - Recommend specific test areas.
4) Notable Cross-Repo Links (if detected)
   - List stories/terms appearing across multiple repos, if any.

Constraints:
- Use only what's in CONTEXT.
- Don't invent Jira details you don't see.
- Keep total length under ~700 words.";

/// System and user prompt for `context`.
pub fn build_prompts(context: &NarrativeContext) -> Result<(String, String)> {
    let json = serde_json::to_string_pretty(context)?;
    let user = format!("CONTEXT (JSON):\n{json}\n\n{INSTRUCTIONS}");
    Ok((SYSTEM_PROMPT.to_string(), user))
}
