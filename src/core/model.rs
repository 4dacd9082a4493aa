//! Digest data model
//!
//! The types in this module are the binding contract consumed by output
//! formatting and downstream tooling; field names are stable.

use serde::{Deserialize, Serialize};

/// How normalized content was decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Utf8,
    /// Lossy UTF-8 conversion was applied
    Lossy,
    /// Content is binary; the record carries a placeholder instead of text
    Binary,
}

/// Pipeline phase. Phases only advance forward within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPhase {
    Scanning,
    Processing,
    Analyzing,
    Generating,
    Formatting,
    Complete,
}

impl std::fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GenerationPhase::Scanning => "scanning",
            GenerationPhase::Processing => "processing",
            GenerationPhase::Analyzing => "analyzing",
            GenerationPhase::Generating => "generating",
            GenerationPhase::Formatting => "formatting",
            GenerationPhase::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}

/// A coarse-grained progress snapshot emitted to the progress sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub phase: GenerationPhase,
    pub files_processed: usize,
    pub total_files: usize,
    pub tokens_processed: usize,
    pub time_elapsed_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
}

/// One fully processed file in the digest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the workspace root, '/'-separated
    pub relative_path: String,
    pub absolute_path: String,
    pub content: String,
    pub language_id: String,
    pub encoding: ContentEncoding,
    pub tokens: usize,
    pub truncated: bool,
    pub redacted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub size: u64,
    pub lines: usize,
    pub processing_time_ms: i64,
}

/// Headline counters for the whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestOverview {
    /// Every path the caller selected, in or out of scope
    pub total_files: usize,
    pub included_files: usize,
    pub skipped_files: usize,
    pub binary_files: usize,
    pub total_tokens: usize,
}

/// Advisory diagnostics accumulated during the run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestStatistics {
    /// Files that produced a FileRecord (zero-token records included)
    pub files_processed: usize,
    pub total_tokens: usize,
    pub processing_time_ms: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// The aggregated output of one `generate` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestResult {
    pub files: Vec<FileRecord>,
    pub overview: DigestOverview,
    pub statistics: DigestStatistics,
    /// Whether redaction was requested for the run (not whether any
    /// substitution actually occurred)
    pub redaction_applied: bool,
    pub truncation_applied: bool,
    /// RFC3339 timestamp
    pub generated_at: String,
    pub generator_version: String,
}

impl DigestResult {
    pub fn empty() -> Self {
        Self {
            files: Vec::new(),
            overview: DigestOverview::default(),
            statistics: DigestStatistics::default(),
            redaction_applied: false,
            truncation_applied: false,
            generated_at: chrono::Utc::now().to_rfc3339(),
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
