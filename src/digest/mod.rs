//! Digest orchestration - the end-to-end pipeline
//!
//! `contract` defines the collaborator seams, `fs` provides the
//! filesystem-backed implementations, and `orchestrator` coordinates
//! filtering, normalization, token analysis and aggregation.

pub mod contract;
pub mod fs;
pub mod orchestrator;

pub use contract::{
    BinaryFilePolicy, ConfigProvider, ContentNormalizer, DigestConfig, ErrorReporter,
    NormalizeError, NormalizedContent, NullProgressSink, ProgressSink, Redactor, StaticConfig,
};
pub use fs::{FsNormalizer, FsNormalizerConfig, GitignoreOracle, RegexRedactor, TracingReporter};
pub use orchestrator::{
    DigestError, DigestOrchestrator, GenerateOptions, DEFAULT_MAX_CONCURRENCY,
};
