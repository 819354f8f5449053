//! Shared utility functions

/// Truncate a string to a byte budget, cutting at a valid char boundary.
/// Returns the input unchanged when it already fits.
pub fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Collapse all runs of whitespace (including newlines) into single spaces
/// and trim the ends. Used for link text and similar inline fragments.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_exact_fit() {
        let s = "a".repeat(10);
        assert_eq!(truncate_to_bytes(&s, 10), s);
    }

    #[test]
    fn truncate_cuts_one_past_budget() {
        let s = "a".repeat(11);
        assert_eq!(truncate_to_bytes(&s, 10).len(), 10);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // "é" is two bytes; a budget landing mid-char must back up
        let s = "ééééé";
        let out = truncate_to_bytes(s, 5);
        assert_eq!(out, "éé");
        assert!(s.starts_with(out));
    }

    #[test]
    fn collapse_whitespace_flattens_newlines() {
        assert_eq!(collapse_whitespace("  a \n b\t\tc "), "a b c");
    }
}
