//! Token estimation adapters
//!
//! An adapter is a pluggable strategy for estimating the token cost of
//! text. Built-in adapters cover tiktoken (cl100k_base for GPT-4/Claude,
//! o200k_base for GPT-4o) and a fast char-class heuristic that needs no
//! BPE encoding.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};

/// Error type for adapter estimation failures
pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;

/// A pluggable token estimation strategy
#[async_trait]
pub trait TokenAdapter: Send + Sync {
    /// Unique adapter name used for resolution and cache keys
    fn name(&self) -> &str;

    /// Whether the adapter can currently serve estimates
    fn is_available(&self) -> bool;

    /// An optional ceiling this adapter's target model supports
    fn max_tokens(&self) -> Option<usize> {
        None
    }

    /// Estimate the token cost of normalized content
    async fn estimate_tokens(&self, content: &str) -> Result<usize, AdapterError>;

    /// One-time initialization hook (loading encodings, etc.)
    async fn warmup(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

// Lazy-initialized BPE encodings (loaded once on first use)
static CL100K_BPE: Lazy<Result<CoreBPE, String>> =
    Lazy::new(|| cl100k_base().map_err(|e| format!("Failed to load cl100k_base: {}", e)));

static O200K_BPE: Lazy<Result<CoreBPE, String>> =
    Lazy::new(|| o200k_base().map_err(|e| format!("Failed to load o200k_base: {}", e)));

/// Which tiktoken encoding backs a [`TiktokenAdapter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// cl100k_base (GPT-4, GPT-3.5-turbo, Claude 3 approximation)
    #[default]
    Cl100k,
    /// o200k_base (GPT-4o native)
    O200k,
}

impl Encoding {
    fn bpe(&self) -> &'static Result<CoreBPE, String> {
        match self {
            Encoding::Cl100k => &CL100K_BPE,
            Encoding::O200k => &O200K_BPE,
        }
    }
}

/// Accurate BPE-based estimation via tiktoken
pub struct TiktokenAdapter {
    name: String,
    encoding: Encoding,
    max_tokens: Option<usize>,
}

impl TiktokenAdapter {
    pub fn new(encoding: Encoding) -> Self {
        let name = match encoding {
            Encoding::Cl100k => "cl100k",
            Encoding::O200k => "o200k",
        };
        Self {
            name: name.to_string(),
            encoding,
            max_tokens: None,
        }
    }

    /// Attach a model context ceiling reported through `max_tokens()`
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
impl TokenAdapter for TiktokenAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.encoding.bpe().is_ok()
    }

    fn max_tokens(&self) -> Option<usize> {
        self.max_tokens
    }

    async fn estimate_tokens(&self, content: &str) -> Result<usize, AdapterError> {
        match self.encoding.bpe() {
            Ok(bpe) => Ok(bpe.encode_with_special_tokens(content).len()),
            Err(e) => Err(e.clone().into()),
        }
    }

    async fn warmup(&self) -> Result<(), AdapterError> {
        match self.encoding.bpe() {
            Ok(_) => Ok(()),
            Err(e) => Err(e.clone().into()),
        }
    }
}

/// Fast heuristic estimation (no BPE encoding)
///
/// The heuristic accounts for:
/// - ASCII text: ~4 characters per token
/// - Code symbols: ~2 characters per token
/// - CJK characters: ~1.5 characters per token
/// - Other Unicode: ~2 characters per token
pub struct HeuristicAdapter;

#[async_trait]
impl TokenAdapter for HeuristicAdapter {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn estimate_tokens(&self, content: &str) -> Result<usize, AdapterError> {
        Ok(estimate_tokens_heuristic(content))
    }
}

/// Estimate tokens with character-class ratios
pub fn estimate_tokens_heuristic(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let mut ascii_chars = 0usize;
    let mut cjk_chars = 0usize;
    let mut other_unicode = 0usize;
    let mut whitespace = 0usize;
    let mut code_symbols = 0usize;

    for c in text.chars() {
        if c.is_ascii_whitespace() {
            whitespace += 1;
        } else if c.is_ascii() {
            if is_code_symbol(c) {
                code_symbols += 1;
            } else {
                ascii_chars += 1;
            }
        } else if is_cjk_char(c) {
            cjk_chars += 1;
        } else {
            other_unicode += 1;
        }
    }

    let ascii_tokens = (ascii_chars + whitespace).div_ceil(4);
    let symbol_tokens = code_symbols.div_ceil(2);
    let cjk_tokens = (cjk_chars * 2).div_ceil(3); // ~1.5 chars per token
    let other_tokens = other_unicode.div_ceil(2);

    ascii_tokens + symbol_tokens + cjk_tokens + other_tokens
}

/// Check if a character is a common code symbol/operator
#[inline]
fn is_code_symbol(c: char) -> bool {
    matches!(
        c,
        '(' | ')'
            | '['
            | ']'
            | '{'
            | '}'
            | '<'
            | '>'
            | '='
            | '+'
            | '-'
            | '*'
            | '/'
            | '%'
            | '&'
            | '|'
            | '^'
            | '!'
            | '~'
            | '?'
            | ':'
            | ';'
            | ','
            | '.'
            | '@'
            | '#'
            | '$'
            | '\\'
            | '"'
            | '\''
            | '`'
    )
}

/// Check if a character is CJK (Chinese/Japanese/Korean)
#[inline]
fn is_cjk_char(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FFF).contains(&cp)      // CJK Unified Ideographs
        || (0x3400..=0x4DBF).contains(&cp)  // CJK Extension A
        || (0x3000..=0x303F).contains(&cp)  // CJK Symbols and Punctuation
        || (0x3040..=0x309F).contains(&cp)  // Hiragana
        || (0x30A0..=0x30FF).contains(&cp)  // Katakana
        || (0xAC00..=0xD7AF).contains(&cp)  // Hangul Syllables
        || (0xFF00..=0xFFEF).contains(&cp) // Fullwidth Forms
}
