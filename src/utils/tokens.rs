//! Token estimation

/// Estimate tokens using a simple heuristic (chars / 4), never less than one.
///
/// Counts Unicode code points, not bytes, so multi-byte text is not over-counted.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}
