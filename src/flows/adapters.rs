//! Adapter listing flow
//!
//! Reports the registered token adapters, their availability and any
//! reported token ceiling.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::core::render::{OutputFormat, RenderConfig};
use crate::tokens::{format_token_count, Encoding, HeuristicAdapter, TiktokenAdapter, TokenEngine, TokenEngineConfig};

#[derive(Debug, Serialize)]
struct AdapterInfo {
    name: String,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

/// Run the adapters command
pub async fn run_adapters(warmup: bool, render_config: RenderConfig) -> Result<()> {
    let engine = TokenEngine::new(TokenEngineConfig::default());
    engine.register_adapter(Arc::new(TiktokenAdapter::new(Encoding::Cl100k)));
    engine.register_adapter(Arc::new(TiktokenAdapter::new(Encoding::O200k)));
    engine.register_adapter(Arc::new(HeuristicAdapter));

    if warmup {
        engine.warm_startup().await;
    }

    let infos: Vec<AdapterInfo> = engine
        .adapters_snapshot()
        .iter()
        .map(|adapter| AdapterInfo {
            name: adapter.name().to_string(),
            available: adapter.is_available(),
            max_tokens: adapter.max_tokens(),
        })
        .collect();

    match render_config.format {
        OutputFormat::Markdown => {
            println!("## Token adapters\n");
            for info in &infos {
                let status = if info.available { "available" } else { "unavailable" };
                match info.max_tokens {
                    Some(limit) => println!(
                        "- `{}`: {} (ceiling {})",
                        info.name,
                        status,
                        format_token_count(limit)
                    ),
                    None => println!("- `{}`: {}", info.name, status),
                }
            }
        }
        OutputFormat::Json => {
            let output = if render_config.pretty {
                serde_json::to_string_pretty(&infos)?
            } else {
                serde_json::to_string(&infos)?
            };
            println!("{}", output);
        }
        OutputFormat::Jsonl => {
            for info in &infos {
                if render_config.pretty {
                    println!("{}", serde_json::to_string_pretty(info)?);
                } else {
                    println!("{}", serde_json::to_string(info)?);
                }
            }
        }
    }

    Ok(())
}
