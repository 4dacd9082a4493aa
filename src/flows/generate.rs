//! Digest generation flow - the end-to-end `generate` command
//!
//! Wires the filesystem collaborators into the orchestrator: scans the
//! workspace (or takes an explicit selection), runs the pipeline, renders
//! the digest to stdout and optional statistics to stderr.

use anyhow::{Context, Result};
use colored::Colorize;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::render::{RenderConfig, Renderer};
use crate::digest::{
    BinaryFilePolicy, DigestConfig, DigestOrchestrator, FsNormalizer, FsNormalizerConfig,
    GenerateOptions, GitignoreOracle, RegexRedactor, TracingReporter,
};
use crate::filter::FilterEngine;
use crate::tokens::{
    format_token_count, Encoding, HeuristicAdapter, TiktokenAdapter, TokenEngine,
    TokenEngineConfig,
};

/// Options for the generate command
#[derive(Debug, Clone, Default)]
pub struct GenerateFlowOptions {
    /// Explicit file selection, relative to root; empty means scan
    pub paths: Vec<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
    pub no_gitignore: bool,
    pub max_depth: Option<usize>,
    pub max_files: Option<usize>,
    pub max_tokens: Option<usize>,
    pub skip_binary: bool,
    pub redact: bool,
    pub adapters: Vec<String>,
    pub max_concurrency: Option<usize>,
    pub stats: bool,
}

impl GenerateFlowOptions {
    fn digest_config(&self) -> DigestConfig {
        DigestConfig {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            follow_symlinks: self.follow_symlinks,
            respect_gitignore: !self.no_gitignore,
            max_depth: self.max_depth,
            max_files: self.max_files,
            max_tokens: self.max_tokens,
            binary_file_policy: if self.skip_binary {
                BinaryFilePolicy::Skip
            } else {
                BinaryFilePolicy::Placeholder
            },
        }
    }
}

/// Build the standard engine stack for a workspace root
pub fn build_orchestrator(root: &Path, config: &DigestConfig) -> DigestOrchestrator {
    let mut filter = FilterEngine::new(root);
    if config.respect_gitignore {
        filter = filter.with_oracle(Arc::new(GitignoreOracle::new(root)));
    }

    let tokens = TokenEngine::new(TokenEngineConfig::default());
    tokens.register_adapter(Arc::new(TiktokenAdapter::new(Encoding::Cl100k)));
    tokens.register_adapter(Arc::new(TiktokenAdapter::new(Encoding::O200k)));
    tokens.register_adapter(Arc::new(HeuristicAdapter));

    let normalizer = FsNormalizer::new(FsNormalizerConfig {
        binary_policy: config.binary_file_policy,
        ..Default::default()
    });

    DigestOrchestrator::new(
        Arc::new(filter),
        Arc::new(tokens),
        Arc::new(normalizer),
        Arc::new(RegexRedactor),
        Arc::new(TracingReporter),
    )
}

/// Walk the workspace and collect candidate files in stable order
pub fn scan_selection(root: &Path, config: &DigestConfig) -> Vec<PathBuf> {
    let respect = config.respect_gitignore;
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .follow_links(config.follow_symlinks)
        .git_ignore(respect)
        .git_global(respect)
        .git_exclude(respect);

    if let Some(depth) = config.max_depth {
        builder.max_depth(Some(depth + 1));
    }

    let mut selection: Vec<PathBuf> = builder
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
        .collect();

    selection.sort();
    selection
}

/// Run the generate command
pub async fn run_generate(
    root: &Path,
    options: GenerateFlowOptions,
    render_config: RenderConfig,
) -> Result<()> {
    let config = options.digest_config();

    let selection: Vec<PathBuf> = if options.paths.is_empty() {
        scan_selection(root, &config)
    } else {
        options
            .paths
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
            .collect()
    };

    let orchestrator = build_orchestrator(root, &config);

    let cancel = CancellationToken::new();
    let generate_options = GenerateOptions {
        apply_redaction: options.redact,
        max_concurrency: options
            .max_concurrency
            .unwrap_or(crate::digest::DEFAULT_MAX_CONCURRENCY),
        preferred_adapters: options.adapters.clone(),
        cancel: Some(cancel.clone()),
    };

    let result = tokio::select! {
        result = orchestrator.generate(root, selection, &config, &generate_options) => {
            result.context("digest generation failed")?
        }
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            anyhow::bail!("digest generation was cancelled");
        }
    };

    if options.stats {
        eprintln!("{}", "Digest statistics:".bold());
        eprintln!(
            "   Files: {} included, {} skipped of {} selected",
            result.overview.included_files,
            result.overview.skipped_files,
            result.overview.total_files
        );
        eprintln!(
            "   Tokens: {}",
            format_token_count(result.overview.total_tokens)
        );
        if result.overview.binary_files > 0 {
            eprintln!("   Binary files: {}", result.overview.binary_files);
        }
        eprintln!("   Time: {} ms", result.statistics.processing_time_ms);
        for warning in &result.statistics.warnings {
            eprintln!("   {} {}", "warning:".yellow(), warning);
        }
        for error in &result.statistics.errors {
            eprintln!("   {} {}", "error:".red(), error);
        }
        eprintln!();
    }

    let renderer = Renderer::with_config(render_config);
    println!("{}", renderer.render(&result));

    Ok(())
}
