//! Filter decision engine - layered include/exclude classification
//!
//! Provides:
//! - Pattern compilation (glob, `/regex/flags`, `(?i)` globs) with a
//!   bounded per-engine cache
//! - The precedence chain: include, exclude, gitignore, depth, symlink
//! - Batched classification with a single ignore-oracle lookup per batch

pub mod engine;
pub mod pattern;

pub use engine::{
    BatchMetrics, FilterEngine, FilterError, FilterOptions, FilterReason, FilterResult,
    IgnoreOracle, MetricsHook, OracleError,
};
pub use pattern::{CompiledPattern, PatternError};
