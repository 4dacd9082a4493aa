//! Token budget engine
//!
//! Runs content through an ordered chain of estimation adapters with
//! fallback, caches results, and enforces a resolved token budget. One
//! engine instance owns one result cache; the cache persists across runs
//! and is explicitly clearable.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use xxhash_rust::xxh3::Xxh3;

use crate::core::lru::LruCache;
use crate::tokens::adapter::TokenAdapter;
use crate::tokens::format::format_token_count;

/// Engine default budget ceiling when neither the caller nor the adapter
/// supplies one
pub const DEFAULT_MAX_TOKENS: usize = 100_000;

/// Engine default warn ratio
pub const DEFAULT_WARN_RATIO: f64 = 0.8;

/// Default bound on the analysis result cache
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;

/// Default concurrency for batch analysis
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Engine-level configuration
#[derive(Debug, Clone)]
pub struct TokenEngineConfig {
    pub default_max_tokens: usize,
    pub default_warn_ratio: f64,
    pub fail_on_exceed: bool,
    pub cache_max_entries: usize,
    pub batch_concurrency: usize,
}

impl Default for TokenEngineConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: DEFAULT_MAX_TOKENS,
            default_warn_ratio: DEFAULT_WARN_RATIO,
            fail_on_exceed: false,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

/// Per-call budget overrides; unset fields fall back to the adapter
/// ceiling, then the engine defaults
#[derive(Debug, Clone, Default)]
pub struct BudgetOverrides {
    pub limit: Option<usize>,
    pub warn_at: Option<usize>,
    pub warn_ratio: Option<f64>,
    pub fail_on_exceed: Option<bool>,
}

/// The budget a single analysis was evaluated against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    pub limit: usize,
    pub warn_at: usize,
    pub warn_ratio: f64,
    pub fail_on_exceed: bool,
}

/// Per-call analysis options
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Adapters to try first, by name, ahead of registration order
    pub preferred_adapters: Vec<String>,
    pub budget: BudgetOverrides,
    pub cancel: Option<CancellationToken>,
}

/// Immutable result of one analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAnalysis {
    pub tokens: usize,
    pub adapter_used: String,
    pub cache_hit: bool,
    pub exceeded_budget: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub budget: TokenBudget,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no token adapters are registered")]
    NoAdapters,
    #[error("all token adapters failed: {}", attempts.join("; "))]
    AllAdaptersFailed { attempts: Vec<String> },
    #[error("token count {tokens} exceeds the budget limit {limit}")]
    BudgetExceeded { tokens: usize, limit: usize },
    #[error("token analysis was cancelled")]
    Cancelled,
}

#[derive(Clone)]
struct CachedAnalysis {
    tokens: usize,
    adapter_used: String,
}

/// The token budget engine
pub struct TokenEngine {
    config: TokenEngineConfig,
    adapters: RwLock<Vec<Arc<dyn TokenAdapter>>>,
    cache: Mutex<LruCache<u64, CachedAnalysis>>,
}

impl TokenEngine {
    pub fn new(config: TokenEngineConfig) -> Self {
        let cache_entries = config.cache_max_entries;
        Self {
            config,
            adapters: RwLock::new(Vec::new()),
            cache: Mutex::new(LruCache::new(cache_entries)),
        }
    }

    /// Append an adapter to the registry (ordered; first registered wins
    /// ties during resolution)
    pub fn register_adapter(&self, adapter: Arc<dyn TokenAdapter>) {
        self.adapters
            .write()
            .expect("adapter registry lock poisoned")
            .push(adapter);
    }

    /// Remove an adapter by name; returns whether one was removed
    pub fn remove_adapter(&self, name: &str) -> bool {
        let mut adapters = self.adapters.write().expect("adapter registry lock poisoned");
        let before = adapters.len();
        adapters.retain(|a| a.name() != name);
        adapters.len() != before
    }

    /// Adapter names in registration order
    pub fn list_adapters(&self) -> Vec<String> {
        self.adapters
            .read()
            .expect("adapter registry lock poisoned")
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    /// A snapshot of the registered adapters in registration order
    pub fn adapters_snapshot(&self) -> Vec<Arc<dyn TokenAdapter>> {
        self.adapters
            .read()
            .expect("adapter registry lock poisoned")
            .clone()
    }

    /// Run every adapter's warmup hook concurrently. Failures are logged,
    /// not propagated; an unavailable adapter is skipped at analysis time.
    pub async fn warm_startup(&self) {
        let adapters: Vec<_> = self
            .adapters
            .read()
            .expect("adapter registry lock poisoned")
            .clone();
        let warmups = adapters.iter().map(|a| async move {
            if let Err(e) = a.warmup().await {
                tracing::warn!(adapter = a.name(), error = %e, "adapter warmup failed");
            }
        });
        futures::future::join_all(warmups).await;
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("token cache mutex poisoned").clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().expect("token cache mutex poisoned").len()
    }

    /// Analyze one piece of normalized content
    pub async fn analyze(
        &self,
        content: &str,
        options: &AnalyzeOptions,
    ) -> Result<TokenAnalysis, TokenError> {
        // Empty content short-circuits without consulting any adapter
        if content.is_empty() {
            let budget = self.resolve_budget(&options.budget, None);
            return Ok(TokenAnalysis {
                tokens: 0,
                adapter_used: "noop".to_string(),
                cache_hit: false,
                exceeded_budget: false,
                warnings: Vec::new(),
                budget,
            });
        }

        let candidates = self.resolve_candidates(options);
        if candidates.is_empty() {
            return Err(TokenError::NoAdapters);
        }

        let key = cache_key(content, &candidates);
        let cached = {
            let mut cache = self.cache.lock().expect("token cache mutex poisoned");
            cache.get(&key).cloned()
        };

        let (tokens, adapter_used, cache_hit) = match cached {
            Some(entry) => (entry.tokens, entry.adapter_used, true),
            None => {
                let (tokens, adapter_used) =
                    self.estimate_with_fallback(content, &candidates, options).await?;
                let mut cache = self.cache.lock().expect("token cache mutex poisoned");
                cache.insert(
                    key,
                    CachedAnalysis {
                        tokens,
                        adapter_used: adapter_used.clone(),
                    },
                );
                (tokens, adapter_used, false)
            }
        };

        let adapter_ceiling = candidates
            .iter()
            .find(|a| a.name() == adapter_used)
            .and_then(|a| a.max_tokens());
        let budget = self.resolve_budget(&options.budget, adapter_ceiling);
        self.apply_budget(tokens, adapter_used, cache_hit, budget)
    }

    /// Analyze many contents with bounded concurrency, returning results in
    /// input order
    pub async fn analyze_batch(
        &self,
        contents: &[String],
        options: &AnalyzeOptions,
    ) -> Result<Vec<TokenAnalysis>, TokenError> {
        stream::iter(contents.iter().map(|c| self.analyze(c, options)))
            .buffered(self.config.batch_concurrency.max(1))
            .try_collect()
            .await
    }

    /// Resolution order: per-call preferred list, then registration order,
    /// duplicates removed keeping the first occurrence
    fn resolve_candidates(&self, options: &AnalyzeOptions) -> Vec<Arc<dyn TokenAdapter>> {
        let registered: Vec<_> = self
            .adapters
            .read()
            .expect("adapter registry lock poisoned")
            .clone();

        let mut ordered: Vec<Arc<dyn TokenAdapter>> = Vec::new();
        for name in &options.preferred_adapters {
            if let Some(adapter) = registered.iter().find(|a| a.name() == name) {
                if !ordered.iter().any(|a| a.name() == adapter.name()) {
                    ordered.push(adapter.clone());
                }
            }
        }
        for adapter in registered {
            if !ordered.iter().any(|a| a.name() == adapter.name()) {
                ordered.push(adapter);
            }
        }
        ordered
    }

    /// Try adapters in order; skip unavailable, fall through on error,
    /// poll cancellation before each attempt
    async fn estimate_with_fallback(
        &self,
        content: &str,
        candidates: &[Arc<dyn TokenAdapter>],
        options: &AnalyzeOptions,
    ) -> Result<(usize, String), TokenError> {
        let mut attempts = Vec::new();
        for adapter in candidates {
            if let Some(cancel) = &options.cancel {
                if cancel.is_cancelled() {
                    return Err(TokenError::Cancelled);
                }
            }
            if !adapter.is_available() {
                attempts.push(format!("{}: unavailable", adapter.name()));
                continue;
            }
            match adapter.estimate_tokens(content).await {
                Ok(tokens) => return Ok((tokens, adapter.name().to_string())),
                Err(e) => {
                    tracing::debug!(adapter = adapter.name(), error = %e, "adapter failed, trying next");
                    attempts.push(format!("{}: {}", adapter.name(), e));
                }
            }
        }
        Err(TokenError::AllAdaptersFailed { attempts })
    }

    /// `limit = explicit ?? adapter ceiling ?? engine default`, warn ratio
    /// clamped to [0.1, 0.99]
    fn resolve_budget(
        &self,
        overrides: &BudgetOverrides,
        adapter_ceiling: Option<usize>,
    ) -> TokenBudget {
        let limit = overrides
            .limit
            .or(adapter_ceiling)
            .unwrap_or(self.config.default_max_tokens);
        let warn_ratio = overrides
            .warn_ratio
            .unwrap_or(self.config.default_warn_ratio)
            .clamp(0.1, 0.99);
        let warn_at = overrides
            .warn_at
            .unwrap_or_else(|| (limit as f64 * warn_ratio).floor() as usize);
        let fail_on_exceed = overrides.fail_on_exceed.unwrap_or(self.config.fail_on_exceed);
        TokenBudget {
            limit,
            warn_at,
            warn_ratio,
            fail_on_exceed,
        }
    }

    fn apply_budget(
        &self,
        tokens: usize,
        adapter_used: String,
        cache_hit: bool,
        budget: TokenBudget,
    ) -> Result<TokenAnalysis, TokenError> {
        let mut warnings = Vec::new();
        let mut exceeded_budget = false;

        if tokens >= budget.warn_at {
            warnings.push(format!(
                "{} is near the budget limit of {}",
                format_token_count(tokens),
                format_token_count(budget.limit)
            ));
        }
        if tokens > budget.limit {
            exceeded_budget = true;
            warnings.push(format!(
                "{} exceeds the budget limit of {}",
                format_token_count(tokens),
                format_token_count(budget.limit)
            ));
            if budget.fail_on_exceed {
                return Err(TokenError::BudgetExceeded {
                    tokens,
                    limit: budget.limit,
                });
            }
        }

        Ok(TokenAnalysis {
            tokens,
            adapter_used,
            cache_hit,
            exceeded_budget,
            warnings,
            budget,
        })
    }
}

/// Cache key over content plus the ordered candidate adapter names, so an
/// entry is adapter-set-specific
fn cache_key(content: &str, candidates: &[Arc<dyn TokenAdapter>]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(content.as_bytes());
    for adapter in candidates {
        hasher.update(b"\0");
        hasher.update(adapter.name().as_bytes());
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::adapter::AdapterError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAdapter {
        name: String,
        tokens: usize,
        available: bool,
        max_tokens: Option<usize>,
        calls: AtomicUsize,
    }

    impl FixedAdapter {
        fn new(name: &str, tokens: usize) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                tokens,
                available: true,
                max_tokens: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn unavailable(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                tokens: 0,
                available: false,
                max_tokens: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn with_ceiling(name: &str, tokens: usize, ceiling: usize) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                tokens,
                available: true,
                max_tokens: Some(ceiling),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenAdapter for FixedAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn max_tokens(&self) -> Option<usize> {
            self.max_tokens
        }

        async fn estimate_tokens(&self, _content: &str) -> Result<usize, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tokens)
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl TokenAdapter for FailingAdapter {
        fn name(&self) -> &str {
            "failing"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn estimate_tokens(&self, _content: &str) -> Result<usize, AdapterError> {
            Err("estimator crashed".into())
        }
    }

    fn engine() -> TokenEngine {
        TokenEngine::new(TokenEngineConfig::default())
    }

    #[tokio::test]
    async fn test_empty_content_short_circuits() {
        let engine = engine();
        // No adapters registered: empty content still succeeds
        let analysis = engine.analyze("", &AnalyzeOptions::default()).await.unwrap();
        assert_eq!(analysis.tokens, 0);
        assert_eq!(analysis.adapter_used, "noop");
        assert!(!analysis.cache_hit);
    }

    #[tokio::test]
    async fn test_no_adapters_fails() {
        let engine = engine();
        let err = engine.analyze("text", &AnalyzeOptions::default()).await;
        assert!(matches!(err, Err(TokenError::NoAdapters)));
    }

    #[tokio::test]
    async fn test_cache_idempotence() {
        let engine = engine();
        let adapter = FixedAdapter::new("fixed", 42);
        engine.register_adapter(adapter.clone());

        let first = engine.analyze("content", &AnalyzeOptions::default()).await.unwrap();
        let second = engine.analyze("content", &AnalyzeOptions::default()).await.unwrap();

        assert_eq!(first.tokens, 42);
        assert_eq!(second.tokens, 42);
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        // The second call never reached the adapter
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_is_adapter_set_specific() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::new("a", 10));
        engine.register_adapter(FixedAdapter::new("b", 20));

        let default_set = engine.analyze("x", &AnalyzeOptions::default()).await.unwrap();
        assert_eq!(default_set.tokens, 10);

        // Preferring "b" changes the candidate order, so the cache entry
        // does not apply
        let preferred = AnalyzeOptions {
            preferred_adapters: vec!["b".to_string()],
            ..Default::default()
        };
        let other = engine.analyze("x", &preferred).await.unwrap();
        assert_eq!(other.tokens, 20);
        assert!(!other.cache_hit);
    }

    #[tokio::test]
    async fn test_fallback_skips_unavailable_and_failing() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::unavailable("offline"));
        engine.register_adapter(Arc::new(FailingAdapter));
        engine.register_adapter(FixedAdapter::new("working", 7));

        let analysis = engine.analyze("text", &AnalyzeOptions::default()).await.unwrap();
        assert_eq!(analysis.tokens, 7);
        assert_eq!(analysis.adapter_used, "working");
    }

    #[tokio::test]
    async fn test_all_adapters_failed_aggregates() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::unavailable("offline"));
        engine.register_adapter(Arc::new(FailingAdapter));

        let err = engine.analyze("text", &AnalyzeOptions::default()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("offline: unavailable"));
        assert!(message.contains("failing"));
    }

    #[tokio::test]
    async fn test_cancellation_before_adapter_attempt() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::new("fixed", 1));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = AnalyzeOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        let err = engine.analyze("text", &options).await;
        assert!(matches!(err, Err(TokenError::Cancelled)));
    }

    #[tokio::test]
    async fn test_budget_math_literal() {
        // Adapter returns 1200, limit 1000, warn at 800: exceeded, two
        // warnings in order
        let engine = engine();
        engine.register_adapter(FixedAdapter::new("fixed", 1200));

        let options = AnalyzeOptions {
            budget: BudgetOverrides {
                limit: Some(1000),
                warn_at: Some(800),
                ..Default::default()
            },
            ..Default::default()
        };
        let analysis = engine.analyze("text", &options).await.unwrap();

        assert!(analysis.exceeded_budget);
        assert_eq!(analysis.warnings.len(), 2);
        assert!(analysis.warnings[0].contains("near the budget"));
        assert!(analysis.warnings[1].contains("exceeds the budget"));
    }

    #[tokio::test]
    async fn test_fail_on_exceed() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::new("fixed", 1200));

        let options = AnalyzeOptions {
            budget: BudgetOverrides {
                limit: Some(1000),
                fail_on_exceed: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = engine.analyze("text", &options).await;
        assert!(matches!(
            err,
            Err(TokenError::BudgetExceeded { tokens: 1200, limit: 1000 })
        ));
    }

    #[tokio::test]
    async fn test_budget_resolution_precedence() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::with_ceiling("ceiling", 10, 4096));

        // No explicit limit: adapter ceiling wins over engine default
        let analysis = engine.analyze("text", &AnalyzeOptions::default()).await.unwrap();
        assert_eq!(analysis.budget.limit, 4096);

        // Explicit limit wins over the ceiling
        let options = AnalyzeOptions {
            budget: BudgetOverrides {
                limit: Some(50),
                ..Default::default()
            },
            ..Default::default()
        };
        let analysis = engine.analyze("other", &options).await.unwrap();
        assert_eq!(analysis.budget.limit, 50);
    }

    #[tokio::test]
    async fn test_warn_ratio_clamped() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::new("fixed", 1));

        let options = AnalyzeOptions {
            budget: BudgetOverrides {
                limit: Some(1000),
                warn_ratio: Some(5.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let analysis = engine.analyze("text", &options).await.unwrap();
        assert!((analysis.budget.warn_ratio - 0.99).abs() < f64::EPSILON);
        assert_eq!(analysis.budget.warn_at, 990);
    }

    #[tokio::test]
    async fn test_preferred_order_dedup() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::new("a", 1));
        engine.register_adapter(FixedAdapter::new("b", 2));

        let options = AnalyzeOptions {
            preferred_adapters: vec!["b".to_string(), "b".to_string(), "a".to_string()],
            ..Default::default()
        };
        let candidates = engine.resolve_candidates(&options);
        let names: Vec<_> = candidates.iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let engine = engine();
        engine.register_adapter(Arc::new(LengthAdapter));

        let contents: Vec<String> = vec!["a".into(), "bbb".into(), "cc".into()];
        let analyses = engine
            .analyze_batch(&contents, &AnalyzeOptions::default())
            .await
            .unwrap();
        let tokens: Vec<_> = analyses.iter().map(|a| a.tokens).collect();
        assert_eq!(tokens, vec![1, 3, 2]);
    }

    struct LengthAdapter;

    #[async_trait]
    impl TokenAdapter for LengthAdapter {
        fn name(&self) -> &str {
            "length"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn estimate_tokens(&self, content: &str) -> Result<usize, AdapterError> {
            Ok(content.len())
        }
    }

    #[tokio::test]
    async fn test_register_remove_list() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::new("a", 1));
        engine.register_adapter(FixedAdapter::new("b", 2));
        assert_eq!(engine.list_adapters(), vec!["a", "b"]);

        assert!(engine.remove_adapter("a"));
        assert!(!engine.remove_adapter("a"));
        assert_eq!(engine.list_adapters(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_cache_bounded() {
        let engine = TokenEngine::new(TokenEngineConfig {
            cache_max_entries: 2,
            ..Default::default()
        });
        engine.register_adapter(Arc::new(LengthAdapter));

        for content in ["one", "two", "three", "four"] {
            engine.analyze(content, &AnalyzeOptions::default()).await.unwrap();
        }
        assert_eq!(engine.cache_len(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let engine = engine();
        engine.register_adapter(Arc::new(LengthAdapter));
        engine.analyze("abc", &AnalyzeOptions::default()).await.unwrap();
        assert_eq!(engine.cache_len(), 1);
        engine.clear_cache();
        assert_eq!(engine.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_two_engines_never_share_caches() {
        let first = engine();
        let second = engine();
        first.register_adapter(Arc::new(LengthAdapter));
        second.register_adapter(Arc::new(LengthAdapter));

        first.analyze("abc", &AnalyzeOptions::default()).await.unwrap();
        assert_eq!(first.cache_len(), 1);
        assert_eq!(second.cache_len(), 0);

        let analysis = second.analyze("abc", &AnalyzeOptions::default()).await.unwrap();
        assert!(!analysis.cache_hit);
    }

    #[tokio::test]
    async fn test_warm_startup_runs() {
        let engine = engine();
        engine.register_adapter(FixedAdapter::new("a", 1));
        engine.register_adapter(FixedAdapter::unavailable("b"));
        engine.warm_startup().await;
    }
}
