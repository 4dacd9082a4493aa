//! Filter explanation flow
//!
//! Traces a single path through the filter precedence chain and prints
//! the decision with the evaluation steps.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::render::{OutputFormat, RenderConfig};
use crate::digest::GitignoreOracle;
use crate::filter::{FilterEngine, FilterOptions, FilterResult};

/// Options for the explain command
#[derive(Debug, Clone, Default)]
pub struct ExplainFlowOptions {
    pub path: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
    pub no_gitignore: bool,
    pub max_depth: Option<usize>,
}

/// The decision and its evaluation trace
#[derive(Debug, Serialize)]
pub struct Explanation {
    pub path: String,
    #[serde(flatten)]
    pub result: FilterResult,
    pub trace: Vec<String>,
}

/// Run the explain command
pub async fn run_explain(
    root: &Path,
    options: ExplainFlowOptions,
    render_config: RenderConfig,
) -> Result<()> {
    let mut engine = FilterEngine::new(root);
    if !options.no_gitignore {
        engine = engine.with_oracle(Arc::new(GitignoreOracle::new(root)));
    }

    let filter_options = FilterOptions {
        include: options.include,
        exclude: options.exclude,
        use_gitignore: !options.no_gitignore,
        follow_symlinks: options.follow_symlinks,
        max_depth: options.max_depth,
    };

    let absolute = if options.path.is_absolute() {
        options.path.clone()
    } else {
        root.join(&options.path)
    };

    let (result, trace) = engine
        .explain_decision(&absolute, &filter_options)
        .await
        .context("filter explanation failed")?;

    let explanation = Explanation {
        path: options.path.display().to_string(),
        result,
        trace,
    };

    match render_config.format {
        OutputFormat::Markdown => {
            let verdict = if explanation.result.included {
                "included"
            } else {
                "excluded"
            };
            println!("`{}`: **{}**", explanation.path, verdict);
            if let Some(pattern) = &explanation.result.matched_pattern {
                println!("- matched pattern: `{}`", pattern);
            }
            println!();
            for step in &explanation.trace {
                println!("- {}", step);
            }
        }
        _ => {
            let output = if render_config.pretty {
                serde_json::to_string_pretty(&explanation)?
            } else {
                serde_json::to_string(&explanation)?
            };
            println!("{}", output);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterReason;

    #[test]
    fn test_explanation_serializes_flat() {
        let explanation = Explanation {
            path: "src/index.test.ts".to_string(),
            result: FilterResult {
                included: false,
                reason: FilterReason::Excluded,
                matched_pattern: Some("**/*.test.ts".to_string()),
            },
            trace: vec!["exclude pattern matched".to_string()],
        };

        let json = serde_json::to_value(&explanation).unwrap();
        assert_eq!(json["included"], false);
        assert_eq!(json["reason"], "excluded");
        assert_eq!(json["matched_pattern"], "**/*.test.ts");
    }
}
