//! Filter decision engine
//!
//! Classifies candidate paths as in or out of scope for a digest run using
//! a layered precedence policy: include patterns, exclude patterns,
//! version-control ignore rules, depth limits, symlink policy. The first
//! failing check wins and is recorded as the decision reason.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::core::lru::LruCache;
use crate::core::paths::{depth_below_root, is_symlink, make_relative};
use crate::filter::pattern::{CompiledPattern, PatternError};

/// Default bound on the compiled-pattern cache
pub const DEFAULT_PATTERN_CACHE_ENTRIES: usize = 64;

/// Per-call filtering configuration. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Ordered include patterns; empty means "everything is a candidate"
    pub include: Vec<String>,
    /// Ordered exclude patterns
    pub exclude: Vec<String>,
    pub use_gitignore: bool,
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
}

/// Why a path was included or dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterReason {
    Included,
    Excluded,
    Gitignored,
    DepthLimit,
    SymlinkSkipped,
}

/// The classification for a single path under a given configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub included: bool,
    pub reason: FilterReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,
}

impl FilterResult {
    fn included() -> Self {
        Self {
            included: true,
            reason: FilterReason::Included,
            matched_pattern: None,
        }
    }

    fn dropped(reason: FilterReason, matched_pattern: Option<String>) -> Self {
        Self {
            included: false,
            reason,
            matched_pattern,
        }
    }
}

/// Error type for ignore oracles (boxed, like other collaborator seams)
pub type OracleError = Box<dyn std::error::Error + Send + Sync>;

/// External service answering "is this path ignored by VCS ignore rules?"
///
/// Consulted once per batch, never once per path. A failing oracle never
/// fails a filter call: the engine fails open and logs a diagnostic.
#[async_trait]
pub trait IgnoreOracle: Send + Sync {
    async fn is_ignored_batch(
        &self,
        paths: &[PathBuf],
    ) -> Result<HashMap<PathBuf, bool>, OracleError>;
}

/// Counters handed to the metrics hook, once per batch
#[derive(Debug, Clone)]
pub struct BatchMetrics {
    pub batch_size: usize,
    pub included: usize,
    pub oracle_consulted: bool,
    pub oracle_failed: bool,
}

pub type MetricsHook = Arc<dyn Fn(&BatchMetrics) + Send + Sync>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// The filter decision engine. One instance owns one pattern cache; the
/// cache persists across runs and is explicitly clearable.
pub struct FilterEngine {
    root: PathBuf,
    oracle: Option<Arc<dyn IgnoreOracle>>,
    metrics_hook: Option<MetricsHook>,
    cache: Mutex<LruCache<String, CompiledPattern>>,
}

impl FilterEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            oracle: None,
            metrics_hook: None,
            cache: Mutex::new(LruCache::new(DEFAULT_PATTERN_CACHE_ENTRIES)),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn IgnoreOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_metrics_hook(mut self, hook: MetricsHook) -> Self {
        self.metrics_hook = Some(hook);
        self
    }

    pub fn with_cache_capacity(mut self, max_cache_entries: usize) -> Self {
        self.cache = Mutex::new(LruCache::new(max_cache_entries));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compile a pattern, memoized by source string
    pub fn compile_pattern(&self, pattern: &str) -> Result<CompiledPattern, PatternError> {
        let mut cache = self.cache.lock().expect("pattern cache mutex poisoned");
        if let Some(compiled) = cache.get(&pattern.to_string()) {
            return Ok(compiled.clone());
        }
        let compiled = CompiledPattern::compile(pattern)?;
        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    }

    /// Number of compiled patterns currently resident
    pub fn cached_patterns(&self) -> usize {
        self.cache.lock().expect("pattern cache mutex poisoned").len()
    }

    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .expect("pattern cache mutex poisoned")
            .clear();
    }

    /// Classify a single file path
    pub async fn should_include_file(
        &self,
        path: &Path,
        options: &FilterOptions,
    ) -> Result<FilterResult, FilterError> {
        let mut results = self.batch_filter(&[path.to_path_buf()], options).await?;
        Ok(results
            .remove(&path.to_path_buf())
            .unwrap_or_else(|| FilterResult::dropped(FilterReason::Excluded, None)))
    }

    /// Classify a single directory path (depth limits apply)
    pub async fn should_include_directory(
        &self,
        path: &Path,
        options: &FilterOptions,
    ) -> Result<FilterResult, FilterError> {
        let compiled = self.compile_options(options)?;
        let ignored = self.lookup_ignored(&[path.to_path_buf()], options).await.0;
        Ok(self.decide(path, true, options, &compiled, &ignored))
    }

    /// Classify a batch of file paths. The ignore oracle is consulted once
    /// for the whole batch; the metrics hook fires once regardless of
    /// outcome.
    pub async fn batch_filter(
        &self,
        paths: &[PathBuf],
        options: &FilterOptions,
    ) -> Result<HashMap<PathBuf, FilterResult>, FilterError> {
        let compiled = self.compile_options(options)?;
        let (ignored, oracle_consulted, oracle_failed) =
            self.lookup_ignored(paths, options).await;

        let mut results = HashMap::with_capacity(paths.len());
        let mut included = 0usize;
        for path in paths {
            let result = self.decide(path, false, options, &compiled, &ignored);
            if result.included {
                included += 1;
            }
            results.insert(path.clone(), result);
        }

        if let Some(hook) = &self.metrics_hook {
            hook(&BatchMetrics {
                batch_size: paths.len(),
                included,
                oracle_consulted,
                oracle_failed,
            });
        }

        Ok(results)
    }

    /// Classify a path and return the evaluation steps for diagnostics
    pub async fn explain_decision(
        &self,
        path: &Path,
        options: &FilterOptions,
    ) -> Result<(FilterResult, Vec<String>), FilterError> {
        let compiled = self.compile_options(options)?;
        let (ignored, oracle_consulted, _) = self.lookup_ignored(&[path.to_path_buf()], options).await;

        let mut steps = Vec::new();
        let relative = match make_relative(path, &self.root) {
            Some(r) => r,
            None => {
                steps.push(format!(
                    "path is outside the workspace root {}",
                    self.root.display()
                ));
                return Ok((FilterResult::dropped(FilterReason::Excluded, None), steps));
            }
        };
        steps.push(format!("relative path: {}", relative));

        if !compiled.include.is_empty() {
            match compiled.include.iter().find(|p| p.matches(&relative)) {
                Some(p) => steps.push(format!("include pattern '{}' matched", p.source())),
                None => {
                    steps.push("no include pattern matched".to_string());
                    return Ok((
                        FilterResult::dropped(
                            FilterReason::Excluded,
                            compiled.include.first().map(|p| p.source().to_string()),
                        ),
                        steps,
                    ));
                }
            }
        } else {
            steps.push("no include patterns configured".to_string());
        }

        if let Some(p) = compiled.exclude.iter().find(|p| p.matches(&relative)) {
            steps.push(format!("exclude pattern '{}' matched", p.source()));
            return Ok((
                FilterResult::dropped(
                    FilterReason::Excluded,
                    Some(p.source().to_string()),
                ),
                steps,
            ));
        }
        steps.push("no exclude pattern matched".to_string());

        if options.use_gitignore {
            if !oracle_consulted {
                steps.push("gitignore requested but no oracle configured".to_string());
            } else if ignored.get(path).copied().unwrap_or(false) {
                steps.push("path is gitignored".to_string());
                return Ok((FilterResult::dropped(FilterReason::Gitignored, None), steps));
            } else {
                steps.push("path is not gitignored".to_string());
            }
        }

        if !options.follow_symlinks && is_symlink(path) {
            steps.push("path is a symlink and follow_symlinks is off".to_string());
            return Ok((
                FilterResult::dropped(FilterReason::SymlinkSkipped, None),
                steps,
            ));
        }

        steps.push("included".to_string());
        Ok((FilterResult::included(), steps))
    }

    fn compile_options(&self, options: &FilterOptions) -> Result<CompiledOptions, FilterError> {
        let include = options
            .include
            .iter()
            .map(|p| self.compile_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;
        let exclude = options
            .exclude
            .iter()
            .map(|p| self.compile_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledOptions { include, exclude })
    }

    /// One oracle lookup per batch. A throwing oracle fails open: every
    /// path in the batch is treated as not ignored and a single diagnostic
    /// is logged.
    async fn lookup_ignored(
        &self,
        paths: &[PathBuf],
        options: &FilterOptions,
    ) -> (HashMap<PathBuf, bool>, bool, bool) {
        if !options.use_gitignore {
            return (HashMap::new(), false, false);
        }
        let Some(oracle) = &self.oracle else {
            return (HashMap::new(), false, false);
        };
        match oracle.is_ignored_batch(paths).await {
            Ok(map) => (map, true, false),
            Err(e) => {
                tracing::warn!(
                    batch_size = paths.len(),
                    error = %e,
                    "ignore oracle failed for batch, treating all paths as not ignored"
                );
                (HashMap::new(), true, true)
            }
        }
    }

    /// Evaluate the precedence chain for one path
    fn decide(
        &self,
        path: &Path,
        is_directory: bool,
        options: &FilterOptions,
        compiled: &CompiledOptions,
        ignored: &HashMap<PathBuf, bool>,
    ) -> FilterResult {
        let Some(relative) = make_relative(path, &self.root) else {
            // Outside the workspace root: invalid selection, not an error
            return FilterResult::dropped(FilterReason::Excluded, None);
        };

        // 1. Include: configured and none matched
        if !compiled.include.is_empty()
            && !compiled.include.iter().any(|p| p.matches(&relative))
        {
            return FilterResult::dropped(
                FilterReason::Excluded,
                compiled.include.first().map(|p| p.source().to_string()),
            );
        }

        // 2. Exclude: first matching pattern wins
        if let Some(p) = compiled.exclude.iter().find(|p| p.matches(&relative)) {
            return FilterResult::dropped(
                FilterReason::Excluded,
                Some(p.source().to_string()),
            );
        }

        // 3. Gitignore
        if options.use_gitignore && ignored.get(path).copied().unwrap_or(false) {
            return FilterResult::dropped(FilterReason::Gitignored, None);
        }

        // 4. Depth (directories only)
        if is_directory {
            if let Some(max_depth) = options.max_depth {
                if depth_below_root(&relative) > max_depth {
                    return FilterResult::dropped(FilterReason::DepthLimit, None);
                }
            }
        }

        // 5. Symlink policy
        if !options.follow_symlinks && is_symlink(path) {
            return FilterResult::dropped(FilterReason::SymlinkSkipped, None);
        }

        FilterResult::included()
    }
}

struct CompiledOptions {
    include: Vec<CompiledPattern>,
    exclude: Vec<CompiledPattern>,
}
