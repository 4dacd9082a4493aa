//! Path normalization utilities
//!
//! All filter decisions and digest records use paths relative to the
//! workspace root with '/' as separator, regardless of platform.

use std::path::Path;

/// Normalize a path to use '/' as separator (for cross-platform consistency)
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Make a path relative to the root directory
///
/// Returns `None` when the path is not under the root. Callers treat that
/// as an invalid selection, not an error.
pub fn make_relative(path: &Path, root: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(|p| normalize_path(p))
}

/// Count the path segments below the root ("src/a/b.rs" has 3)
pub fn depth_below_root(relative: &str) -> usize {
    if relative.is_empty() {
        return 0;
    }
    relative.split('/').filter(|s| !s.is_empty()).count()
}

/// Check if a path is a symbolic link (without following it)
pub fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}
