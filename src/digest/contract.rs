//! Collaborator contracts for the digest pipeline
//!
//! The orchestrator treats these as opaque seams: content normalization,
//! secret redaction, error reporting, progress delivery and configuration
//! snapshots all live behind traits so real implementations and test
//! doubles are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::model::{ContentEncoding, GenerationProgress};

/// Error type for normalizer failures (boxed at the seam)
pub type NormalizeError = Box<dyn std::error::Error + Send + Sync>;

/// Normalized text produced from a raw file
#[derive(Debug, Clone)]
pub struct NormalizedContent {
    pub content: String,
    pub encoding: ContentEncoding,
    pub language_id: String,
    pub is_truncated: bool,
    /// Raw size on disk in bytes
    pub size: u64,
    pub processing_time_ms: i64,
}

/// Turns raw bytes into normalized text (binary detection, truncation,
/// encoding handling). May fail per file; the orchestrator isolates such
/// failures.
#[async_trait]
pub trait ContentNormalizer: Send + Sync {
    async fn normalize(&self, path: &Path) -> Result<NormalizedContent, NormalizeError>;
}

/// Replaces secret-looking substrings with a placeholder. Pure and total:
/// must not fail.
pub trait Redactor: Send + Sync {
    fn redact(&self, content: &str) -> String;
}

/// Fire-and-forget error sink; the pipeline never consumes a return value
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &str, context: &str);
}

/// Fire-and-forget progress sink; must not block the pipeline
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: GenerationProgress);
}

/// A no-op sink for callers that do not observe progress
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _progress: GenerationProgress) {}
}

/// How binary files are treated by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryFilePolicy {
    /// Emit a placeholder record with no content
    #[default]
    Placeholder,
    /// Fail normalization for binary files (the file is dropped with an
    /// error entry)
    Skip,
}

/// Configuration snapshot for one digest run, consulted once per run
#[derive(Debug, Clone, Default)]
pub struct DigestConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
    pub respect_gitignore: bool,
    pub max_depth: Option<usize>,
    pub max_files: Option<usize>,
    pub max_tokens: Option<usize>,
    pub binary_file_policy: BinaryFilePolicy,
}

/// Supplies the configuration snapshot for a run
pub trait ConfigProvider: Send + Sync {
    fn snapshot(&self) -> DigestConfig;
}

/// A provider wrapping an already-built snapshot
pub struct StaticConfig(pub DigestConfig);

impl ConfigProvider for StaticConfig {
    fn snapshot(&self) -> DigestConfig {
        self.0.clone()
    }
}
