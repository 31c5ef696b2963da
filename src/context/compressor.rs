//! Conversation compression into a running summary
//!
//! An LLM produces the summary when one is configured. Any failure (no
//! credential, transport error, bad payload, timeout) falls back to a
//! deterministic keyword digest of the input, so compression never fails.

use super::completion::{ChatMessage, CompletionClient, CompletionError, OpenAiCompletionClient};
use crate::config::CompressorConfig;
use crate::memory::models::{CompactContext, Turn};
use crate::metrics::METRICS;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Summary budget used by `create_compact_context`
pub const DEFAULT_SUMMARY_TOKENS: usize = 1500;

/// Keywords reported by the fallback digest
const FALLBACK_KEYWORDS: usize = 20;

/// Words must be longer than this to count as keywords
const MIN_KEYWORD_CHARS: usize = 4;

const SYSTEM_PROMPT: &str = "You are an expert at summarizing complex conversations. \
Produce a concise summary that keeps every piece of key information.";

/// Produces summaries of conversation text
pub struct ContextCompressor {
    client: Option<Arc<dyn CompletionClient>>,
    timeout: Duration,
}

impl ContextCompressor {
    /// Create a compressor; `None` means offline (fallback digest only)
    pub fn new(client: Option<Arc<dyn CompletionClient>>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Compressor without an LLM backend
    pub fn offline() -> Self {
        Self::new(None, Duration::from_secs(0))
    }

    /// Resolve the LLM backend once, from the presence of an API key
    pub fn from_config(config: &CompressorConfig) -> Self {
        let client: Option<Arc<dyn CompletionClient>> = if config.api_key.is_some() {
            match OpenAiCompletionClient::new(config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("Compressor LLM client unavailable, using fallback summaries: {}", e);
                    None
                }
            }
        } else {
            info!("No compressor API key configured, using fallback summaries");
            None
        };
        Self::new(client, config.timeout())
    }

    /// Whether summaries come from an LLM
    pub fn is_llm_backed(&self) -> bool {
        self.client.is_some()
    }

    /// Summarize `conversation_text` in at most `max_output_tokens` tokens
    pub async fn compress(&self, conversation_text: &str, max_output_tokens: usize) -> String {
        let start = Instant::now();

        let Some(client) = &self.client else {
            debug!("Compressing offline ({} chars)", conversation_text.len());
            METRICS.record_compression("fallback", start.elapsed().as_secs_f64());
            return fallback_summary(conversation_text);
        };

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(conversation_text)),
        ];

        let outcome = tokio::time::timeout(self.timeout, client.complete(&messages, max_output_tokens))
            .await
            .unwrap_or(Err(CompletionError::Timeout(self.timeout)));

        match outcome {
            Ok(summary) => {
                METRICS.record_compression("llm", start.elapsed().as_secs_f64());
                debug!("Compressed {} chars into {} chars", conversation_text.len(), summary.len());
                summary
            }
            Err(e) => {
                warn!("Context compression failed, using fallback summary: {}", e);
                METRICS.record_compression("fallback", start.elapsed().as_secs_f64());
                fallback_summary(conversation_text)
            }
        }
    }

    /// Summarize all but the last `max_recent` turns.
    ///
    /// The split point is always `turns.len() - max_recent`.
    pub async fn create_compact_context(&self, turns: &[Turn], max_recent: usize) -> CompactContext {
        if turns.len() <= max_recent {
            return CompactContext {
                summary: None,
                recent_messages: turns.to_vec(),
            };
        }

        let split = turns.len() - max_recent;
        let (older, recent) = turns.split_at(split);
        let summary = self.compress(&format_turns_for_summary(older), DEFAULT_SUMMARY_TOKENS).await;

        CompactContext {
            summary: Some(summary),
            recent_messages: recent.to_vec(),
        }
    }
}

fn build_prompt(conversation_text: &str) -> String {
    format!(
        "Summarize the following conversation into a SHORT and INFORMATIVE summary.\n\
         Focus on:\n\
         1. The main topics and questions raised by the user\n\
         2. Key conclusions and decisions\n\
         3. Important details about projects, code or other technical components\n\
         4. Context that will matter for future reference\n\n\
         Avoid repetition and unimportant detail. The summary should be brief but substantive.\n\n\
         CONVERSATION:\n{}\n\nSUMMARY:",
        conversation_text
    )
}

/// Render turns as alternating `USER:` / `<AGENT>:` lines
pub fn format_turns_for_summary(turns: &[Turn]) -> String {
    let mut text = String::new();
    for turn in turns {
        let agent = if turn.agent.is_empty() { "AGENT".to_string() } else { turn.agent.to_uppercase() };
        text.push_str(&format!("USER: {}\n", turn.message));
        text.push_str(&format!("{}: {}\n\n", agent, turn.response_text()));
    }
    text
}

/// Deterministic digest: the longest distinct words plus a word count
pub fn fallback_summary(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();

    let mut distinct: Vec<&str> = words
        .iter()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|w| !w.is_empty())
        .collect();
    distinct.sort_unstable();
    distinct.dedup();
    distinct.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));

    let mut keywords: Vec<String> = Vec::new();
    for word in distinct.into_iter().take(FALLBACK_KEYWORDS) {
        if word.chars().count() > MIN_KEYWORD_CHARS {
            let lowered = word.to_lowercase();
            if !keywords.contains(&lowered) {
                keywords.push(lowered);
            }
        }
    }

    if keywords.is_empty() {
        format!("The conversation has approximately {} words.", words.len())
    } else {
        format!(
            "The conversation covers these key terms: {}. The conversation has approximately {} words.",
            keywords.join(", "),
            words.len()
        )
    }
}
