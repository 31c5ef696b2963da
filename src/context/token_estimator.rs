//! Token estimation using tiktoken
//!
//! Exact counts come from a BPE encoder when the model family has one;
//! every other model (and any encoder failure) degrades to a
//! four-characters-per-token approximation.

use once_cell::sync::Lazy;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, p50k_base, CoreBPE};
use tracing::warn;

/// Characters per token used by the approximation fallback
pub const CHARS_PER_TOKEN: usize = 4;

/// Context budget returned for unrecognized models
pub const DEFAULT_MAX_CONTEXT: usize = 4096;

/// Known context budgets, first exact match wins
const MODEL_MAX_TOKENS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4o-16k", 16_384),
    ("gpt-4", 8_192),
    ("gpt-4-32k", 32_768),
    ("claude-instant-1", 100_000),
    ("claude-1", 100_000),
    ("claude-2", 100_000),
    ("claude-3-opus-20240229", 200_000),
    ("claude-3-sonnet-20240229", 180_000),
    ("claude-3-haiku-20240307", 150_000),
    ("gemini-pro", 32_768),
    ("gemini-ultra", 32_768),
    ("default-8k", 8_192),
    ("default-16k", 16_384),
    ("default-32k", 32_768),
    ("default", DEFAULT_MAX_CONTEXT),
];

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }

    /// Cut `text` down to at most `max_tokens` tokens
    fn truncate(&self, text: &str, max_tokens: usize) -> String;
}

/// BPE families we can load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Cl100k,
    P50k,
}

static CL100K: Lazy<Option<Arc<CoreBPE>>> = Lazy::new(|| load_bpe(Encoding::Cl100k));
static P50K: Lazy<Option<Arc<CoreBPE>>> = Lazy::new(|| load_bpe(Encoding::P50k));

fn load_bpe(encoding: Encoding) -> Option<Arc<CoreBPE>> {
    let loaded = match encoding {
        Encoding::Cl100k => cl100k_base(),
        Encoding::P50k => p50k_base(),
    };
    match loaded {
        Ok(bpe) => Some(Arc::new(bpe)),
        Err(e) => {
            warn!("Failed to load {:?} tokenizer, using approximation: {}", encoding, e);
            None
        }
    }
}

impl Encoding {
    /// Encoding family for a model identifier, if one applies
    pub fn for_model(model: &str) -> Option<Self> {
        let model = model.to_ascii_lowercase();
        if model.starts_with("text-davinci") || model.starts_with("code-") {
            return Some(Encoding::P50k);
        }
        if model.contains("gpt-4")
            || model.contains("gpt-3.5")
            || model.contains("claude")
            || model.contains("gemini")
        {
            return Some(Encoding::Cl100k);
        }
        None
    }

    fn bpe(self) -> Option<Arc<CoreBPE>> {
        match self {
            Encoding::Cl100k => CL100K.clone(),
            Encoding::P50k => P50K.clone(),
        }
    }
}

/// Tiktoken-based token estimator
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    /// Create an estimator for an encoding family, `None` if it fails to load
    pub fn for_encoding(encoding: Encoding) -> Option<Self> {
        encoding.bpe().map(|bpe| Self { bpe })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        match self.bpe.decode(tokens[..max_tokens].to_vec()) {
            Ok(decoded) => decoded,
            Err(e) => {
                // A cut in the middle of a multi-byte sequence fails to decode
                warn!("Token-exact truncation failed, cutting by characters: {}", e);
                CharRatioEstimator::default().truncate(text, max_tokens)
            }
        }
    }
}

/// Length-based estimator: one token per `chars_per_token` characters
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / self.chars_per_token
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let max_chars = max_tokens.saturating_mul(self.chars_per_token);
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => text[..byte_idx].to_string(),
            None => text.to_string(),
        }
    }
}

/// Pick the best estimator available for `model`
pub fn estimator_for_model(model: &str) -> Arc<dyn TokenEstimator> {
    match Encoding::for_model(model).and_then(TiktokenEstimator::for_encoding) {
        Some(estimator) => Arc::new(estimator),
        None => Arc::new(CharRatioEstimator::default()),
    }
}

/// Count tokens in `text` for `model`. Never fails.
pub fn count_tokens(text: &str, model: &str) -> usize {
    estimator_for_model(model).estimate(text)
}

/// Context window budget for `model`
pub fn max_context(model: &str) -> usize {
    MODEL_MAX_TOKENS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, budget)| *budget)
        .unwrap_or(DEFAULT_MAX_CONTEXT)
}
