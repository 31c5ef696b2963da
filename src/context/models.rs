//! Data models for structural chunking

use serde::{Deserialize, Serialize};

/// Which structural level produced a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// The whole input fit the budget
    Full,
    /// One heading-delimited section
    Section,
    /// One or more paragraphs of a section
    Paragraphs,
    /// One or more sentences of a paragraph
    Sentences,
    /// Word-packed piece of a single oversized sentence
    SentenceFragment,
    /// Fusion of chunks of differing kinds
    Mixed,
}

/// Provenance of a chunk within its source text.
///
/// Indices are diagnostic only. Paragraph indices are relative to the
/// section, sentence indices to the paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paragraphs: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sentences: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
}

impl ChunkMetadata {
    pub fn new(kind: ChunkKind) -> Self {
        Self {
            kind,
            sections: Vec::new(),
            paragraphs: Vec::new(),
            sentences: Vec::new(),
            heading: None,
        }
    }

    pub fn with_section(mut self, section: usize, heading: Option<String>) -> Self {
        self.sections = vec![section];
        self.heading = heading;
        self
    }

    pub fn with_paragraphs(mut self, paragraphs: Vec<usize>) -> Self {
        self.paragraphs = paragraphs;
        self
    }

    pub fn with_sentences(mut self, sentences: Vec<usize>) -> Self {
        self.sentences = sentences;
        self
    }

    /// Combine provenance of two adjacent chunks
    pub fn combine(&self, next: &ChunkMetadata) -> ChunkMetadata {
        let kind = if self.kind == next.kind {
            self.kind
        } else {
            ChunkKind::Mixed
        };
        ChunkMetadata {
            kind,
            sections: merge_indices(&self.sections, &next.sections),
            paragraphs: merge_indices(&self.paragraphs, &next.paragraphs),
            sentences: merge_indices(&self.sentences, &next.sentences),
            heading: self.heading.clone().or_else(|| next.heading.clone()),
        }
    }
}

fn merge_indices(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut merged = a.to_vec();
    for idx in b {
        if !merged.contains(idx) {
            merged.push(*idx);
        }
    }
    merged
}

/// A token-bounded span of source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Positional identifier (`chunk_1`, `chunk_2`, ...), assigned last
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub token_count: usize,
}

impl Chunk {
    pub fn new(text: String, metadata: ChunkMetadata, token_count: usize) -> Self {
        Self {
            id: String::new(),
            text,
            metadata,
            token_count,
        }
    }
}

/// Assign `chunk_1..chunk_n` in order
pub fn assign_ids(chunks: &mut [Chunk]) {
    for (idx, chunk) in chunks.iter_mut().enumerate() {
        chunk.id = format!("chunk_{}", idx + 1);
    }
}
