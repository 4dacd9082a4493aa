//! Common utilities

/// Truncate string to max bytes at a valid UTF-8 boundary,
/// returning (truncated_string, was_truncated)
pub fn truncate_string(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_string(), false);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    (s[..end].to_string(), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        let s = "hello world";
        let (truncated, was_truncated) = truncate_string(s, 5);
        assert_eq!(truncated, "hello");
        assert!(was_truncated);

        let (not_truncated, was_truncated) = truncate_string(s, 100);
        assert_eq!(not_truncated, s);
        assert!(!was_truncated);
    }

    #[test]
    fn test_truncate_string_utf8() {
        let s = "你好世界";
        let (truncated, _) = truncate_string(s, 6);
        assert_eq!(truncated, "你好"); // Each Chinese char is 3 bytes
    }
}
