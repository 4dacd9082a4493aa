//! Digest orchestrator
//!
//! Coordinates the end-to-end run: batch filtering, per-file content
//! normalization, token analysis and redaction under a bounded worker
//! pool, with strict per-file failure isolation and deterministic output
//! ordering. Phases advance monotonically: scanning, processing,
//! analyzing, generating, formatting, complete.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::model::{
    ContentEncoding, DigestOverview, DigestResult, DigestStatistics, FileRecord,
    GenerationPhase, GenerationProgress,
};
use crate::core::paths::make_relative;
use crate::digest::contract::{
    ContentNormalizer, DigestConfig, ErrorReporter, NullProgressSink, ProgressSink, Redactor,
};
use crate::filter::{FilterEngine, FilterError, FilterOptions};
use crate::tokens::{AnalyzeOptions, BudgetOverrides, TokenEngine, TokenError};

/// Default bound on in-flight per-file tasks
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Fatal failures of a whole `generate` call. Per-file problems never
/// surface here; they land in `statistics.errors`.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("filter engine failed: {0}")]
    Filter(#[from] FilterError),
    #[error("no token adapters are available")]
    NoAdapters,
    #[error("digest generation was cancelled")]
    Cancelled,
}

/// Per-run options beyond the configuration snapshot
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub apply_redaction: bool,
    pub max_concurrency: usize,
    pub preferred_adapters: Vec<String>,
    pub cancel: Option<CancellationToken>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            apply_redaction: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            preferred_adapters: Vec::new(),
            cancel: None,
        }
    }
}

/// The digest orchestrator. Engines are shared and may be reused across
/// runs; their caches persist between runs.
pub struct DigestOrchestrator {
    filter: Arc<FilterEngine>,
    tokens: Arc<TokenEngine>,
    normalizer: Arc<dyn ContentNormalizer>,
    redactor: Arc<dyn Redactor>,
    reporter: Arc<dyn ErrorReporter>,
    progress: Arc<dyn ProgressSink>,
}

/// Outcome of one per-file task
enum FileOutcome {
    Record {
        record: Box<FileRecord>,
        /// Estimation-failure message to surface in statistics.errors
        statistics_error: Option<String>,
    },
    /// Normalization failed; the message goes to statistics.errors
    NormalizeFailed(String),
    /// Cancellation observed before the task started
    Cancelled,
}

impl DigestOrchestrator {
    pub fn new(
        filter: Arc<FilterEngine>,
        tokens: Arc<TokenEngine>,
        normalizer: Arc<dyn ContentNormalizer>,
        redactor: Arc<dyn Redactor>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            filter,
            tokens,
            normalizer,
            redactor,
            reporter,
            progress: Arc::new(NullProgressSink),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Generate a digest for the selected absolute paths
    pub async fn generate(
        &self,
        root: &Path,
        selected: Vec<PathBuf>,
        config: &DigestConfig,
        options: &GenerateOptions,
    ) -> Result<DigestResult, DigestError> {
        let started = Instant::now();
        let total_files = selected.len();

        if self.tokens.list_adapters().is_empty() {
            return Err(DigestError::NoAdapters);
        }

        let mut progress = ProgressTracker::new(self.progress.clone(), started, total_files);
        progress.phase(GenerationPhase::Scanning, None);

        // Batch-classify the whole selection; not-included paths are
        // dropped silently and only counted
        let filter_options = FilterOptions {
            include: config.include.clone(),
            exclude: config.exclude.clone(),
            use_gitignore: config.respect_gitignore,
            follow_symlinks: config.follow_symlinks,
            max_depth: config.max_depth,
        };
        let decisions = self.filter.batch_filter(&selected, &filter_options).await?;

        let mut statistics = DigestStatistics::default();
        let mut included: Vec<PathBuf> = selected
            .iter()
            .filter(|p| decisions.get(*p).map(|d| d.included).unwrap_or(false))
            .cloned()
            .collect();

        if let Some(max_files) = config.max_files {
            if included.len() > max_files {
                statistics.warnings.push(format!(
                    "file limit reached: processing {} of {} selected files",
                    max_files,
                    included.len()
                ));
                included.truncate(max_files);
            }
        }
        let included_files = included.len();

        progress.phase(GenerationPhase::Processing, None);

        let budget = BudgetOverrides {
            limit: config.max_tokens,
            ..Default::default()
        };
        let analyze_options = AnalyzeOptions {
            preferred_adapters: options.preferred_adapters.clone(),
            budget,
            cancel: options.cancel.clone(),
        };

        let files_done = AtomicUsize::new(0);
        let tokens_done = AtomicUsize::new(0);

        // Bounded worker pool; `buffered` preserves selection order in
        // the collected results regardless of completion order
        let outcomes: Vec<FileOutcome> = stream::iter(included.iter().map(|path| {
            self.process_file(
                root,
                path,
                &analyze_options,
                options,
                &progress,
                &files_done,
                &tokens_done,
            )
        }))
        .buffered(options.max_concurrency.max(1))
        .collect()
        .await;

        if let Some(cancel) = &options.cancel {
            if cancel.is_cancelled() {
                return Err(DigestError::Cancelled);
            }
        }

        progress.phase(GenerationPhase::Analyzing, None);

        let mut files = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                FileOutcome::Record {
                    record,
                    statistics_error,
                } => {
                    if let Some(message) = statistics_error {
                        statistics.errors.push(message);
                    }
                    files.push(*record);
                }
                FileOutcome::NormalizeFailed(message) => statistics.errors.push(message),
                FileOutcome::Cancelled => return Err(DigestError::Cancelled),
            }
        }

        progress.phase(GenerationPhase::Generating, None);

        // Running-total budget check: the file that crosses the limit gets
        // the warning; the run continues
        let mut truncation_applied = false;
        let mut running_total = 0usize;
        let limit = config.max_tokens;
        for record in &mut files {
            running_total += record.tokens;
            let exceeded_cumulative = limit.map(|l| running_total > l).unwrap_or(false);
            let flagged = record
                .warnings
                .iter()
                .any(|w| w.contains("exceeds the budget"));
            if exceeded_cumulative && !flagged {
                record
                    .warnings
                    .push(format!("token budget exceeded at {} cumulative tokens", running_total));
                truncation_applied = true;
            }
            if flagged {
                truncation_applied = true;
            }
            if record.truncated {
                truncation_applied = true;
            }
        }

        let binary_files = files
            .iter()
            .filter(|f| f.encoding == ContentEncoding::Binary)
            .count();
        let total_tokens: usize = files.iter().map(|f| f.tokens).sum();

        statistics.files_processed = files.len();
        statistics.total_tokens = total_tokens;
        statistics.processing_time_ms = started.elapsed().as_millis() as i64;

        let overview = DigestOverview {
            total_files,
            included_files,
            skipped_files: total_files - included_files,
            binary_files,
            total_tokens,
        };

        progress.phase(GenerationPhase::Formatting, None);

        let result = DigestResult {
            files,
            overview,
            statistics,
            redaction_applied: options.apply_redaction,
            truncation_applied,
            generated_at: chrono::Utc::now().to_rfc3339(),
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        progress.phase(GenerationPhase::Complete, None);
        Ok(result)
    }

    /// Steps 3-6 for one included file. Failures are isolated: a
    /// normalizer error drops the file, an estimation error keeps it with
    /// zero tokens.
    #[allow(clippy::too_many_arguments)]
    async fn process_file(
        &self,
        root: &Path,
        path: &Path,
        analyze_options: &AnalyzeOptions,
        options: &GenerateOptions,
        progress: &ProgressTracker,
        files_done: &AtomicUsize,
        tokens_done: &AtomicUsize,
    ) -> FileOutcome {
        if let Some(cancel) = &options.cancel {
            if cancel.is_cancelled() {
                return FileOutcome::Cancelled;
            }
        }

        let relative = make_relative(path, root).unwrap_or_else(|| path.display().to_string());
        let task_started = Instant::now();

        let normalized = match self.normalizer.normalize(path).await {
            Ok(n) => n,
            Err(e) => {
                let message = format!("Error processing {}: {}", relative, e);
                self.reporter.report(&message, "content-normalization");
                tracing::debug!(path = %relative, "normalization failed, file dropped");
                return FileOutcome::NormalizeFailed(message);
            }
        };

        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let tokens = match self.tokens.analyze(&normalized.content, analyze_options).await {
            Ok(analysis) => {
                warnings.extend(analysis.warnings);
                analysis.tokens
            }
            Err(TokenError::Cancelled) => return FileOutcome::Cancelled,
            Err(e) => {
                // Estimation failure keeps the file with zero tokens
                let message = format!("Failed to estimate tokens for {}: {}", relative, e);
                errors.push(message.clone());
                return self.finish_record(
                    relative,
                    path,
                    normalized,
                    0,
                    warnings,
                    errors,
                    Some(message),
                    options,
                    task_started,
                    progress,
                    files_done,
                    tokens_done,
                );
            }
        };

        self.finish_record(
            relative,
            path,
            normalized,
            tokens,
            warnings,
            errors,
            None,
            options,
            task_started,
            progress,
            files_done,
            tokens_done,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_record(
        &self,
        relative: String,
        path: &Path,
        normalized: crate::digest::contract::NormalizedContent,
        tokens: usize,
        warnings: Vec<String>,
        errors: Vec<String>,
        statistics_error: Option<String>,
        options: &GenerateOptions,
        task_started: Instant,
        progress: &ProgressTracker,
        files_done: &AtomicUsize,
        tokens_done: &AtomicUsize,
    ) -> FileOutcome {
        let content = if options.apply_redaction {
            self.redactor.redact(&normalized.content)
        } else {
            normalized.content.clone()
        };

        let lines = content.lines().count();
        let record = FileRecord {
            relative_path: relative.clone(),
            absolute_path: path.display().to_string(),
            content,
            language_id: normalized.language_id,
            encoding: normalized.encoding,
            tokens,
            truncated: normalized.is_truncated,
            redacted: options.apply_redaction,
            warnings,
            errors,
            size: normalized.size,
            lines,
            processing_time_ms: task_started.elapsed().as_millis() as i64,
        };

        let done = files_done.fetch_add(1, Ordering::SeqCst) + 1;
        let tokens_total = tokens_done.fetch_add(tokens, Ordering::SeqCst) + tokens;
        progress.processing_update(done, tokens_total, Some(relative));

        FileOutcome::Record {
            record: Box::new(record),
            statistics_error,
        }
    }
}

/// Emits progress records; phases only ever advance
struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    started: Instant,
    total_files: usize,
    current_phase: std::sync::Mutex<GenerationPhase>,
    files_processed: AtomicUsize,
    tokens_processed: AtomicUsize,
}

impl ProgressTracker {
    fn new(sink: Arc<dyn ProgressSink>, started: Instant, total_files: usize) -> Self {
        Self {
            sink,
            started,
            total_files,
            current_phase: std::sync::Mutex::new(GenerationPhase::Scanning),
            files_processed: AtomicUsize::new(0),
            tokens_processed: AtomicUsize::new(0),
        }
    }

    fn phase(&mut self, phase: GenerationPhase, current_file: Option<String>) {
        {
            let mut current = self.current_phase.lock().expect("phase lock poisoned");
            if phase < *current {
                return;
            }
            *current = phase;
        }
        self.emit(phase, current_file);
    }

    fn processing_update(&self, files: usize, tokens: usize, current_file: Option<String>) {
        self.files_processed.store(files, Ordering::SeqCst);
        self.tokens_processed.store(tokens, Ordering::SeqCst);
        self.emit(GenerationPhase::Processing, current_file);
    }

    fn emit(&self, phase: GenerationPhase, current_file: Option<String>) {
        self.sink.report(GenerationProgress {
            phase,
            files_processed: self.files_processed.load(Ordering::SeqCst),
            total_files: self.total_files,
            tokens_processed: self.tokens_processed.load(Ordering::SeqCst),
            time_elapsed_ms: self.started.elapsed().as_millis() as i64,
            current_file,
        });
    }
}
