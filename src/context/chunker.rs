//! Structural text chunking
//!
//! Splits text into token-bounded chunks, descending through
//! headers -> paragraphs -> sentences -> words only while the current unit
//! is still over budget. Paragraphs, sentences and words are packed
//! greedily: a unit joins the running chunk while the result still fits,
//! otherwise the running chunk is flushed and the unit seeds the next one.
//! A single word is never split, so one oversized word becomes its own
//! over-budget chunk rather than losing data.

use super::models::{assign_ids, Chunk, ChunkKind, ChunkMetadata};
use super::token_estimator::{estimator_for_model, TokenEstimator};
use crate::error::{ContextError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}[ \t]+\S").expect("heading pattern is valid"));
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"));
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("sentence pattern is valid"));

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";

/// Heading-delimited slice of the input
#[derive(Debug)]
struct Section {
    heading: Option<String>,
    text: String,
}

/// Greedy packer shared by the paragraph, sentence and word levels.
///
/// Tokens are counted incrementally: each piece adds its own estimate plus
/// one token of slack for the join, and the running text is only
/// re-estimated as a whole once that bound crosses the budget.
struct Accumulator<'a> {
    separator: &'static str,
    text: String,
    indices: Vec<usize>,
    /// Upper bound on the tokens in `text`
    tokens: usize,
    estimator: &'a dyn TokenEstimator,
    max_tokens: usize,
}

impl<'a> Accumulator<'a> {
    fn new(separator: &'static str, estimator: &'a dyn TokenEstimator, max_tokens: usize) -> Self {
        Self {
            separator,
            text: String::new(),
            indices: Vec::new(),
            tokens: 0,
            estimator,
            max_tokens,
        }
    }

    /// Append `piece` if the result stays within budget
    fn try_append(&mut self, piece: &str, index: usize) -> bool {
        if self.text.is_empty() {
            return false;
        }

        let joined_len = self.text.len();
        self.text.push_str(self.separator);
        self.text.push_str(piece);

        let bound = self.tokens + self.estimator.estimate(&self.text[joined_len..]) + 1;
        let tokens = if bound <= self.max_tokens {
            bound
        } else {
            self.estimator.estimate(&self.text)
        };

        if tokens <= self.max_tokens {
            self.tokens = tokens;
            self.indices.push(index);
            true
        } else {
            self.text.truncate(joined_len);
            false
        }
    }

    fn seed(&mut self, piece: &str, index: usize) {
        self.text = piece.to_string();
        self.indices = vec![index];
        self.tokens = self.estimator.estimate(piece);
    }

    /// Emit the running chunk if there is one
    fn flush(&mut self) -> Option<(String, Vec<usize>)> {
        self.tokens = 0;
        let text = std::mem::take(&mut self.text);
        let indices = std::mem::take(&mut self.indices);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some((trimmed.to_string(), indices))
        }
    }
}

/// Splits text along its structure into token-bounded chunks
pub struct StructuralChunker {
    estimator: Arc<dyn TokenEstimator>,
    max_tokens: usize,
}

impl StructuralChunker {
    /// Create a chunker with an explicit estimator
    pub fn new(estimator: Arc<dyn TokenEstimator>, max_tokens: usize) -> Self {
        Self {
            estimator,
            max_tokens,
        }
    }

    /// Create a chunker that counts tokens the way `model` does
    pub fn for_model(model: &str, max_tokens: usize) -> Self {
        Self::new(estimator_for_model(model), max_tokens)
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Split `text` into ordered chunks with positional IDs
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let total = self.estimator.estimate(text);
        if total <= self.max_tokens {
            let mut chunks = vec![Chunk::new(
                text.to_string(),
                ChunkMetadata::new(ChunkKind::Full),
                total,
            )];
            assign_ids(&mut chunks);
            return chunks;
        }

        let mut chunks = Vec::new();
        for (section_idx, section) in split_sections(text).iter().enumerate() {
            self.split_section(section_idx, section, &mut chunks);
        }

        if chunks.is_empty() {
            // Over budget yet structurally empty, e.g. pure whitespace
            let trimmed = text.trim().to_string();
            let tokens = self.estimator.estimate(&trimmed);
            chunks.push(Chunk::new(trimmed, ChunkMetadata::new(ChunkKind::Full), tokens));
        }

        assign_ids(&mut chunks);
        debug!(
            "Chunked {} tokens into {} chunks (budget {})",
            total,
            chunks.len(),
            self.max_tokens
        );
        chunks
    }

    /// Fuse adjacent chunks in one left-to-right greedy pass.
    ///
    /// A chunk joins its predecessor when the pair, separated by a blank
    /// line, still fits the budget. IDs are reassigned afterwards.
    pub fn merge(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let before = chunks.len();
        let mut merged: Vec<Chunk> = Vec::with_capacity(before);

        for chunk in chunks {
            if let Some(last) = merged.last_mut() {
                let combined = format!("{}{}{}", last.text, PARAGRAPH_SEPARATOR, chunk.text);
                let tokens = self.estimator.estimate(&combined);
                if tokens <= self.max_tokens {
                    last.metadata = last.metadata.combine(&chunk.metadata);
                    last.text = combined;
                    last.token_count = tokens;
                    continue;
                }
            }
            merged.push(chunk);
        }

        assign_ids(&mut merged);
        debug!("Merged {} chunks into {}", before, merged.len());
        merged
    }

    fn split_section(&self, section_idx: usize, section: &Section, out: &mut Vec<Chunk>) {
        let text = section.text.trim();
        let tokens = self.estimator.estimate(text);
        if tokens <= self.max_tokens {
            out.push(Chunk::new(
                text.to_string(),
                ChunkMetadata::new(ChunkKind::Section)
                    .with_section(section_idx, section.heading.clone()),
                tokens,
            ));
            return;
        }

        let base = ChunkMetadata::new(ChunkKind::Paragraphs)
            .with_section(section_idx, section.heading.clone());
        let estimator = self.estimator.as_ref();
        let mut acc = Accumulator::new(PARAGRAPH_SEPARATOR, estimator, self.max_tokens);

        for (para_idx, paragraph) in split_paragraphs(text).into_iter().enumerate() {
            if estimator.estimate(paragraph) > self.max_tokens {
                self.flush_into(&mut acc, &base, out, |meta, indices| meta.with_paragraphs(indices));
                self.split_paragraph(&base, para_idx, paragraph, out);
                continue;
            }
            if !acc.try_append(paragraph, para_idx) {
                self.flush_into(&mut acc, &base, out, |meta, indices| meta.with_paragraphs(indices));
                acc.seed(paragraph, para_idx);
            }
        }
        self.flush_into(&mut acc, &base, out, |meta, indices| meta.with_paragraphs(indices));
    }

    fn split_paragraph(
        &self,
        section_meta: &ChunkMetadata,
        para_idx: usize,
        paragraph: &str,
        out: &mut Vec<Chunk>,
    ) {
        let mut base = section_meta.clone().with_paragraphs(vec![para_idx]);
        base.kind = ChunkKind::Sentences;
        let estimator = self.estimator.as_ref();
        let mut acc = Accumulator::new(SENTENCE_SEPARATOR, estimator, self.max_tokens);

        for (sentence_idx, sentence) in split_sentences(paragraph).into_iter().enumerate() {
            if estimator.estimate(sentence) > self.max_tokens {
                self.flush_into(&mut acc, &base, out, |meta, indices| meta.with_sentences(indices));
                self.split_sentence(&base, sentence_idx, sentence, out);
                continue;
            }
            if !acc.try_append(sentence, sentence_idx) {
                self.flush_into(&mut acc, &base, out, |meta, indices| meta.with_sentences(indices));
                acc.seed(sentence, sentence_idx);
            }
        }
        self.flush_into(&mut acc, &base, out, |meta, indices| meta.with_sentences(indices));
    }

    fn split_sentence(
        &self,
        paragraph_meta: &ChunkMetadata,
        sentence_idx: usize,
        sentence: &str,
        out: &mut Vec<Chunk>,
    ) {
        let mut base = paragraph_meta.clone().with_sentences(vec![sentence_idx]);
        base.kind = ChunkKind::SentenceFragment;
        let mut acc = Accumulator::new(SENTENCE_SEPARATOR, self.estimator.as_ref(), self.max_tokens);

        for word in sentence.split_whitespace() {
            if !acc.try_append(word, sentence_idx) {
                self.flush_into(&mut acc, &base, out, |meta, _| meta);
                acc.seed(word, sentence_idx);
            }
        }
        self.flush_into(&mut acc, &base, out, |meta, _| meta);
    }

    fn flush_into<F>(&self, acc: &mut Accumulator<'_>, base: &ChunkMetadata, out: &mut Vec<Chunk>, tag: F)
    where
        F: FnOnce(ChunkMetadata, Vec<usize>) -> ChunkMetadata,
    {
        if let Some((text, indices)) = acc.flush() {
            let tokens = self.estimator.estimate(&text);
            out.push(Chunk::new(text, tag(base.clone(), indices), tokens));
        }
    }
}

/// Chunk `text` so each piece fits `max_tokens` for `model`
pub fn chunk_text_by_structure(text: &str, max_tokens: usize, model: &str) -> Vec<Chunk> {
    StructuralChunker::for_model(model, max_tokens).chunk(text)
}

/// Chunk `text` on the blocking thread pool, merging afterwards if asked
pub async fn chunk_text_blocking(text: String, max_tokens: usize, model: String, merge: bool) -> Result<Vec<Chunk>> {
    tokio::task::spawn_blocking(move || {
        let chunker = StructuralChunker::for_model(&model, max_tokens);
        let chunks = chunker.chunk(&text);
        if merge {
            chunker.merge(chunks)
        } else {
            chunks
        }
    })
    .await
    .map_err(|e| ContextError::Internal(format!("Chunking task failed: {}", e)))
}

/// Greedily fuse adjacent chunks without exceeding `max_tokens` for `model`
pub fn merge_chunks(chunks: Vec<Chunk>, max_tokens: usize, model: &str) -> Vec<Chunk> {
    StructuralChunker::for_model(model, max_tokens).merge(chunks)
}

/// Pack whitespace-separated words into pieces of roughly `max_length`
/// characters. Words longer than `max_length` are kept whole.
pub fn chunk_words(text: &str, max_length: usize) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut size = 0;

    for word in text.split_whitespace() {
        let len = word.chars().count();
        if size + len > max_length && !current.is_empty() {
            result.push(current.join(" "));
            current.clear();
            size = 0;
        }
        current.push(word);
        size += len + 1;
    }

    if !current.is_empty() {
        result.push(current.join(" "));
    }
    result
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut heading = None;

    for line in text.split_inclusive('\n') {
        if HEADING.is_match(line) {
            if !current.trim().is_empty() {
                sections.push(Section {
                    heading: heading.take(),
                    text: std::mem::take(&mut current),
                });
            }
            current.clear();
            heading = Some(line.trim().trim_start_matches('#').trim().to_string());
        }
        current.push_str(line);
    }

    if !current.trim().is_empty() {
        sections.push(Section { heading, text: current });
    }
    sections
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_END.find_iter(text) {
        let sentence = text[start..boundary.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}
