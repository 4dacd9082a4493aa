//! CLI module - Command-line interface definitions and handlers

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::render::{OutputFormat, RenderConfig};
use crate::flows::explain::ExplainFlowOptions;
use crate::flows::generate::GenerateFlowOptions;

/// repodigest - turn a repository into a token-budgeted, machine-readable digest.
#[derive(Parser, Debug)]
#[command(name = "repodigest")]
#[command(
    author,
    version,
    about,
    long_about = r#"repodigest walks a workspace, filters files through layered include/exclude
rules, estimates token cost per file, and emits a structured digest.

Output formats:
- jsonl: one JSON object per file record, then a summary line (best for piping)
- json: the full digest as a single JSON document
- md: human-friendly Markdown

Examples:
    repodigest generate
    repodigest generate --include "src/**/*.rs" --max-tokens 50000
    repodigest generate --redact --stats
    repodigest explain src/main.rs --exclude "**/*.log"
    repodigest adapters --warmup
"#
)]
pub struct Cli {
    /// Root directory for all operations.
    #[arg(
        long,
        global = true,
        default_value = ".",
        value_name = "ROOT",
        long_help = "Root directory for all operations (defaults to the current directory).\n\n\
All paths emitted in the digest are relative to this root, and positional paths\n\
are interpreted relative to it."
    )]
    pub root: PathBuf,

    /// Output format (jsonl/json/md).
    #[arg(
        long,
        global = true,
        default_value = "jsonl",
        value_name = "FORMAT",
        long_help = "Select the output format.\n\n\
Supported values:\n\
- jsonl (default)\n\
- json\n\
- md (markdown)\n\n\
Tip: Prefer jsonl when you want stable, line-oriented output for piping and prompts."
    )]
    pub format: String,

    /// Disable colored output (when applicable).
    #[arg(
        long,
        global = true,
        long_help = "Disable colored output. This is useful when piping to files or when your\n\
terminal does not support ANSI colors."
    )]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(
        short,
        long,
        global = true,
        long_help = "Reduce non-essential output. Machine-readable results are still printed\n\
to stdout."
    )]
    pub quiet: bool,

    /// Verbose mode (more diagnostics).
    #[arg(
        short,
        long,
        global = true,
        long_help = "Enable more detailed diagnostics on stderr. Intended for debugging."
    )]
    pub verbose: bool,

    /// Pretty-print JSON/JSONL output with indentation.
    #[arg(
        long,
        global = true,
        long_help = "Pretty-print JSON and JSONL output with indentation for human readability.\n\n\
Has no effect on the md format."
    )]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a digest of the workspace.
    #[command(
        long_about = "Walk the workspace (or take an explicit file selection), filter files,\n\
estimate token cost and emit a structured digest on stdout.\n\n\
Filtering precedence: include patterns, then exclude patterns, then gitignore,\n\
then depth and symlink rules. Patterns are globs by default; wrap a pattern in\n\
slashes for regex (e.g. '/\\.(test|spec)\\./'), append 'i' for case-insensitive.\n\n\
Examples:\n\
  repodigest generate\n\
  repodigest generate src/main.rs README.md\n\
  repodigest generate --include \"src/**/*.rs\" --exclude \"**/*_test.rs\"\n\
  repodigest generate --max-tokens 50000 --redact --stats\n"
    )]
    Generate {
        /// Explicit files to digest (relative to ROOT). Empty means scan.
        #[arg(value_name = "PATHS")]
        paths: Vec<PathBuf>,

        /// Include patterns (glob by default, /regex/ supported).
        #[arg(
            long,
            value_name = "PATTERN",
            long_help = "Include patterns. When any are given, only matching files are kept.\n\n\
Globs by default ('src/**/*.rs'). Wrap in slashes for regex, append 'i' after\n\
the closing slash (or prefix '(?i)' to a glob) for case-insensitive matching."
        )]
        include: Vec<String>,

        /// Exclude patterns; exclude wins over include.
        #[arg(long, value_name = "PATTERN")]
        exclude: Vec<String>,

        /// Follow symbolic links instead of skipping them.
        #[arg(long)]
        follow_symlinks: bool,

        /// Disable .gitignore handling.
        #[arg(long)]
        no_gitignore: bool,

        /// Maximum directory depth below ROOT.
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Cap on the number of files processed.
        #[arg(
            long,
            value_name = "N",
            long_help = "Process at most N files, in selection order. When the cap is hit a\n\
warning is attached to the digest statistics."
        )]
        max_files: Option<usize>,

        /// Token budget for the run.
        #[arg(
            long,
            value_name = "N",
            long_help = "Token budget for the run. Exceeding the budget flags the digest\n\
(truncation_applied) and attaches warnings; processing continues."
        )]
        max_tokens: Option<usize>,

        /// Drop binary files instead of emitting placeholder records.
        #[arg(long)]
        skip_binary: bool,

        /// Redact secret-looking content before it enters the digest.
        #[arg(
            long,
            long_help = "Replace secret-looking substrings (API keys, tokens, passwords) with\n\
a placeholder before file content is stored in the digest."
        )]
        redact: bool,

        /// Preferred token adapters, tried first (comma-separated).
        #[arg(
            long,
            value_name = "NAMES",
            value_delimiter = ',',
            long_help = "Comma-separated adapter names to try first, ahead of registration\n\
order. Available: cl100k, o200k, heuristic."
        )]
        adapters: Vec<String>,

        /// Maximum concurrent per-file tasks.
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,

        /// Show run statistics on stderr.
        #[arg(long)]
        stats: bool,
    },

    /// Explain why a path is included or excluded.
    #[command(
        long_about = "Trace a single path through the filter precedence chain and print the\n\
decision together with every evaluation step.\n\n\
Examples:\n\
  repodigest explain src/main.rs\n\
  repodigest explain build/out.js --exclude \"build/**\"\n"
    )]
    Explain {
        /// Path to explain (relative to ROOT unless absolute).
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Include patterns to evaluate against.
        #[arg(long, value_name = "PATTERN")]
        include: Vec<String>,

        /// Exclude patterns to evaluate against.
        #[arg(long, value_name = "PATTERN")]
        exclude: Vec<String>,

        /// Follow symbolic links instead of skipping them.
        #[arg(long)]
        follow_symlinks: bool,

        /// Disable .gitignore handling.
        #[arg(long)]
        no_gitignore: bool,

        /// Maximum directory depth below ROOT.
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,
    },

    /// List token adapters and their availability.
    #[command(
        long_about = "List the registered token adapters with availability and any reported\n\
token ceiling.\n\n\
Example:\n\
  repodigest adapters --warmup\n"
    )]
    Adapters {
        /// Run adapter warmup before reporting availability.
        #[arg(long)]
        warmup: bool,
    },
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Parse output format
    let format: OutputFormat = cli.format.parse().unwrap_or_default();
    let render_config = RenderConfig::with_pretty(format, cli.pretty);

    // Get absolute root path
    let root = cli.root.canonicalize().unwrap_or(cli.root);

    match cli.command {
        Commands::Generate {
            paths,
            include,
            exclude,
            follow_symlinks,
            no_gitignore,
            max_depth,
            max_files,
            max_tokens,
            skip_binary,
            redact,
            adapters,
            max_concurrency,
            stats,
        } => {
            let options = GenerateFlowOptions {
                paths,
                include,
                exclude,
                follow_symlinks,
                no_gitignore,
                max_depth,
                max_files,
                max_tokens,
                skip_binary,
                redact,
                adapters,
                max_concurrency,
                stats,
            };
            crate::flows::generate::run_generate(&root, options, render_config).await
        }

        Commands::Explain {
            path,
            include,
            exclude,
            follow_symlinks,
            no_gitignore,
            max_depth,
        } => {
            let options = ExplainFlowOptions {
                path,
                include,
                exclude,
                follow_symlinks,
                no_gitignore,
                max_depth,
            };
            crate::flows::explain::run_explain(&root, options, render_config).await
        }

        Commands::Adapters { warmup } => {
            crate::flows::adapters::run_adapters(warmup, render_config).await
        }
    }
}
