//! Pattern compilation
//!
//! A pattern is a glob by default. Two escapes exist:
//! - `/body/flags` is compiled as a regular expression (flag `i` supported)
//! - a leading `(?i)` forces case-insensitive glob matching
//!
//! Compiled matchers are memoized per engine in a bounded LRU keyed by the
//! pattern source string.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
    #[error("invalid regex pattern '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}

#[derive(Debug, Clone)]
enum Matcher {
    Glob(GlobMatcher),
    Regex(Regex),
}

/// A compiled include/exclude pattern
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    matcher: Arc<Matcher>,
}

impl CompiledPattern {
    /// Compile a pattern source string
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let matcher = if let Some((body, flags)) = split_regex_literal(pattern) {
            let expr = if flags.contains('i') {
                format!("(?i){}", body)
            } else {
                body.to_string()
            };
            let regex = Regex::new(&expr).map_err(|e| PatternError::InvalidRegex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            Matcher::Regex(regex)
        } else {
            let (glob_source, case_insensitive) = match pattern.strip_prefix("(?i)") {
                Some(rest) => (rest, true),
                None => (pattern, false),
            };
            let glob = GlobBuilder::new(glob_source)
                .literal_separator(true)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| PatternError::InvalidGlob {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
            Matcher::Glob(glob.compile_matcher())
        };

        Ok(Self {
            source: pattern.to_string(),
            matcher: Arc::new(matcher),
        })
    }

    /// The original pattern source string
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match against a '/'-normalized path relative to the workspace root
    pub fn matches(&self, relative_path: &str) -> bool {
        match self.matcher.as_ref() {
            Matcher::Glob(glob) => glob.is_match(relative_path),
            Matcher::Regex(regex) => regex.is_match(relative_path),
        }
    }
}

/// Split a `/body/flags` regex literal into (body, flags)
fn split_regex_literal(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let close = rest.rfind('/')?;
    let body = &rest[..close];
    if body.is_empty() {
        return None;
    }
    let flags = &rest[close + 1..];
    if flags.chars().all(|c| c.is_ascii_alphabetic()) {
        Some((body, flags))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        let p = CompiledPattern::compile("src/**/*.ts").unwrap();
        assert!(p.matches("src/index.ts"));
        assert!(p.matches("src/deep/nested/mod.ts"));
        assert!(!p.matches("lib/index.ts"));
        assert!(!p.matches("src/index.rs"));
    }

    #[test]
    fn test_glob_literal_separator() {
        // '*' must not cross directory boundaries
        let p = CompiledPattern::compile("src/*.ts").unwrap();
        assert!(p.matches("src/index.ts"));
        assert!(!p.matches("src/nested/index.ts"));
    }

    #[test]
    fn test_regex_literal() {
        let p = CompiledPattern::compile("/\\.test\\.[jt]s$/").unwrap();
        assert!(p.matches("src/index.test.ts"));
        assert!(p.matches("a/b.test.js"));
        assert!(!p.matches("src/index.ts"));
    }

    #[test]
    fn test_regex_case_insensitive_flag() {
        let p = CompiledPattern::compile("/readme/i").unwrap();
        assert!(p.matches("README.md"));
        assert!(p.matches("docs/readme.txt"));
    }

    #[test]
    fn test_case_insensitive_glob_marker() {
        let p = CompiledPattern::compile("(?i)**/*.MD").unwrap();
        assert!(p.matches("docs/readme.md"));
        assert!(p.matches("CHANGELOG.MD"));
    }

    #[test]
    fn test_invalid_glob_reports_source() {
        let err = CompiledPattern::compile("src/[").unwrap_err();
        assert!(err.to_string().contains("src/["));
    }

    #[test]
    fn test_invalid_regex_reports_source() {
        let err = CompiledPattern::compile("/([unclosed/").unwrap_err();
        assert!(err.to_string().contains("([unclosed"));
    }

    #[test]
    fn test_bare_slashes_not_regex() {
        // "//" has an empty body and falls back to glob parsing
        assert!(split_regex_literal("//").is_none());
        assert!(split_regex_literal("/a/i").is_some());
        assert!(split_regex_literal("src/a.rs").is_none());
    }

    #[test]
    fn test_source_preserved() {
        let p = CompiledPattern::compile("**/*.rs").unwrap();
        assert_eq!(p.source(), "**/*.rs");
    }
}
