//! Free-text normalization

/// Trim surrounding whitespace and keep at most `max_chars` characters.
///
/// Truncation counts Unicode scalar values, so multi-byte input never splits.
pub fn clamp_text(value: &str, max_chars: usize) -> String {
    let trimmed = value.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => trimmed[..byte_idx].to_string(),
        None => trimmed.to_string(),
    }
}

/// Same as [`clamp_text`] for optional input; absent input becomes empty.
pub fn clamp_opt(value: Option<&str>, max_chars: usize) -> String {
    value.map(|v| clamp_text(v, max_chars)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(clamp_text("  smoke near station \n", 50), "smoke near station");
    }

    #[test]
    fn test_truncates_to_limit() {
        assert_eq!(clamp_text("abcdefgh", 5), "abcde");
        assert_eq!(clamp_text("abc", 3), "abc");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let clamped = clamp_text("आग लगी है", 3);
        assert_eq!(clamped.chars().count(), 3);
    }

    #[test]
    fn test_trim_happens_before_truncation() {
        assert_eq!(clamp_text("     fire", 4), "fire");
    }

    #[test]
    fn test_clamp_opt() {
        assert_eq!(clamp_opt(None, 10), "");
        assert_eq!(clamp_opt(Some(" x "), 10), "x");
    }
}
