//! Token budget engine - pluggable estimation for LLM context budgeting
//!
//! Provides:
//! - The `TokenAdapter` trait with tiktoken and heuristic implementations
//! - The estimation engine: fallback chain, result cache, budget math
//! - Human-readable token count formatting

pub mod adapter;
pub mod engine;
pub mod format;

pub use adapter::{
    estimate_tokens_heuristic, AdapterError, Encoding, HeuristicAdapter, TiktokenAdapter,
    TokenAdapter,
};
pub use engine::{
    AnalyzeOptions, BudgetOverrides, TokenAnalysis, TokenBudget, TokenEngine, TokenEngineConfig,
    TokenError,
};
pub use format::format_token_count;
