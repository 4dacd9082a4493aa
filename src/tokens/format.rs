//! Human-readable token count formatting
//!
//! Golden-output semantics: below 1,000 the raw count is printed; at 1,000
//! and above the count is scaled to k/M/B, rounded to one decimal place,
//! with a trailing `.0` dropped.

/// Format a token count for display, e.g. `1500 -> "1.5k tokens"`
pub fn format_token_count(tokens: usize) -> String {
    if tokens < 1_000 {
        return format!("{} tokens", tokens);
    }

    let (scaled, suffix) = if tokens >= 1_000_000_000 {
        (tokens as f64 / 1_000_000_000.0, "B")
    } else if tokens >= 1_000_000 {
        (tokens as f64 / 1_000_000.0, "M")
    } else {
        (tokens as f64 / 1_000.0, "k")
    };

    let rounded = (scaled * 10.0).round() / 10.0;
    if (rounded - rounded.trunc()).abs() < f64::EPSILON {
        format!("{}{} tokens", rounded.trunc() as u64, suffix)
    } else {
        format!("{:.1}{} tokens", rounded, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_thousand_raw() {
        assert_eq!(format_token_count(0), "0 tokens");
        assert_eq!(format_token_count(1), "1 tokens");
        assert_eq!(format_token_count(999), "999 tokens");
    }

    #[test]
    fn test_kilo_one_decimal() {
        assert_eq!(format_token_count(1500), "1.5k tokens");
        assert_eq!(format_token_count(1234), "1.2k tokens");
        assert_eq!(format_token_count(1260), "1.3k tokens");
    }

    #[test]
    fn test_trailing_zero_dropped() {
        assert_eq!(format_token_count(1000), "1k tokens");
        assert_eq!(format_token_count(2000), "2k tokens");
        assert_eq!(format_token_count(2_000_000), "2M tokens");
    }

    #[test]
    fn test_mega_and_giga() {
        assert_eq!(format_token_count(1_500_000), "1.5M tokens");
        assert_eq!(format_token_count(2_500_000_000), "2.5B tokens");
    }

    #[test]
    fn test_rounding_up_crosses_unit() {
        // 999_950 rounds to 1000.0k -> rendered as 1000k, not 1M; the
        // scale is chosen before rounding
        assert_eq!(format_token_count(999_950), "1000k tokens");
    }
}
