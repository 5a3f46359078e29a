//! Path-safe naming

/// Replace path separators and whitespace so `name` can be used as a file name segment.
pub fn file_safe(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') || c.is_whitespace() { '_' } else { c })
        .collect()
}
