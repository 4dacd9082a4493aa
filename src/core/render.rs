//! Renderer module
//!
//! Renders a DigestResult to different output formats: jsonl, json, md

use crate::core::model::{ContentEncoding, DigestResult};
use crate::tokens::format_token_count;
use serde::Serialize;
use std::io::Write;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jsonl,
    Json,
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(OutputFormat::Jsonl),
            "json" => Ok(OutputFormat::Json),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Render configuration combining format and options
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl RenderConfig {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            pretty: false,
        }
    }

    /// Create a new render config with pretty option
    pub fn with_pretty(format: OutputFormat, pretty: bool) -> Self {
        Self { format, pretty }
    }
}

/// Trailing summary line emitted in jsonl mode after the file records
#[derive(Serialize)]
struct JsonlSummary<'a> {
    kind: &'static str,
    overview: &'a crate::core::model::DigestOverview,
    statistics: &'a crate::core::model::DigestStatistics,
    redaction_applied: bool,
    truncation_applied: bool,
    generated_at: &'a str,
    generator_version: &'a str,
}

/// Renderer for digest results
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            config: RenderConfig::new(format),
        }
    }

    /// Create a new renderer with render config
    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Render a digest result to a string
    pub fn render(&self, result: &DigestResult) -> String {
        match self.config.format {
            OutputFormat::Jsonl => self.render_jsonl(result),
            OutputFormat::Json => self.render_json(result),
            OutputFormat::Markdown => self.render_markdown(result),
        }
    }

    /// Render to a writer
    pub fn render_to<W: Write>(&self, result: &DigestResult, mut writer: W) -> std::io::Result<()> {
        let output = self.render(result);
        writer.write_all(output.as_bytes())
    }

    /// Render as JSON Lines: one object per file record, then a summary line
    fn render_jsonl(&self, result: &DigestResult) -> String {
        let mut lines: Vec<String> = result
            .files
            .iter()
            .filter_map(|record| {
                if self.config.pretty {
                    serde_json::to_string_pretty(record).ok()
                } else {
                    serde_json::to_string(record).ok()
                }
            })
            .collect();

        let summary = JsonlSummary {
            kind: "summary",
            overview: &result.overview,
            statistics: &result.statistics,
            redaction_applied: result.redaction_applied,
            truncation_applied: result.truncation_applied,
            generated_at: &result.generated_at,
            generator_version: &result.generator_version,
        };
        if let Ok(line) = if self.config.pretty {
            serde_json::to_string_pretty(&summary)
        } else {
            serde_json::to_string(&summary)
        } {
            lines.push(line);
        }

        lines.join(if self.config.pretty { "\n\n" } else { "\n" })
    }

    /// Render the whole result as a single JSON document
    fn render_json(&self, result: &DigestResult) -> String {
        if self.config.pretty {
            serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
        } else {
            serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string())
        }
    }

    /// Render as Markdown
    fn render_markdown(&self, result: &DigestResult) -> String {
        let mut output = String::new();

        output.push_str("# Repository Digest\n\n");
        output.push_str(&format!(
            "- Files: {} included, {} skipped of {} selected\n",
            result.overview.included_files,
            result.overview.skipped_files,
            result.overview.total_files
        ));
        output.push_str(&format!(
            "- Tokens: {}\n",
            format_token_count(result.overview.total_tokens)
        ));
        if result.overview.binary_files > 0 {
            output.push_str(&format!("- Binary files: {}\n", result.overview.binary_files));
        }
        if result.redaction_applied {
            output.push_str("- Redaction applied\n");
        }
        if result.truncation_applied {
            output.push_str("- Truncation applied\n");
        }
        output.push('\n');

        if !result.statistics.errors.is_empty() {
            output.push_str("## Errors\n\n");
            for error in &result.statistics.errors {
                output.push_str(&format!("- {}\n", error));
            }
            output.push('\n');
        }

        if !result.statistics.warnings.is_empty() {
            output.push_str("## Warnings\n\n");
            for warning in &result.statistics.warnings {
                output.push_str(&format!("- {}\n", warning));
            }
            output.push('\n');
        }

        if !result.files.is_empty() {
            output.push_str("## Files\n\n");
            for record in &result.files {
                output.push_str(&format!(
                    "### `{}` ({})\n",
                    record.relative_path,
                    format_token_count(record.tokens)
                ));
                if record.encoding == ContentEncoding::Binary {
                    output.push_str("\n> Binary file, content omitted\n");
                } else {
                    output.push_str(&format!("\n```{}\n", record.language_id));
                    output.push_str(&record.content);
                    if !record.content.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str("```\n");
                }
                if record.truncated {
                    output.push_str("\n> Content was truncated\n");
                }
                for warning in &record.warnings {
                    output.push_str(&format!("\n> Warning: {}\n", warning));
                }
                output.push('\n');
            }
        }

        output
    }
}
