//! Data types for text units, chunks, and search results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for chunk ids derived with UUIDv5.
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6a1c_37f2_4b0e_4d6e_9f55_2c1e_8a90_d3b7);

/// A body of raw text read from a source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextUnit {
    /// Opaque identifier of the source, usually a file path.
    pub source: String,
    /// 1-based page number when the loader splits by page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// The extracted text.
    pub text: String,
}

impl TextUnit {
    /// Create a unit covering a whole document.
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self { source: source.into(), page: None, text: text.into() }
    }

    /// Create a unit covering a single page.
    pub fn page(source: impl Into<String>, page: usize, text: impl Into<String>) -> Self {
        Self { source: source.into(), page: Some(page), text: text.into() }
    }

    /// The identifier chunks of this unit refer back to.
    ///
    /// Page-level units get a `#page=N` suffix so their chunk ids stay distinct.
    pub fn source_ref(&self) -> String {
        match self.page {
            Some(page) => format!("{}#page={page}", self.source),
            None => self.source.clone(),
        }
    }
}

/// A bounded slice of a [`TextUnit`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Stable identifier: the same source, position and text always map to the same id.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The [`TextUnit::source_ref`] of the parent unit.
    pub source: String,
    /// Position of the chunk within its unit.
    pub index: usize,
}

impl Chunk {
    /// Create a chunk, deriving its id from source, index and text.
    pub fn new(source: impl Into<String>, index: usize, text: impl Into<String>) -> Self {
        let source = source.into();
        let text = text.into();
        let name = format!("{source}\u{0}{index}\u{0}{text}");
        let id = Uuid::new_v5(&CHUNK_NAMESPACE, name.as_bytes()).to_string();
        Self { id, text, source, index }
    }
}

/// A [`Chunk`] paired with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    /// The embedded chunk.
    pub chunk: Chunk,
    /// The embedding of `chunk.text`.
    pub vector: Vec<f32>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_stable() {
        let a = Chunk::new("doc.pdf", 0, "hello");
        let b = Chunk::new("doc.pdf", 0, "hello");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn chunk_ids_differ_by_position_and_text() {
        let a = Chunk::new("doc.pdf", 0, "hello");
        assert_ne!(a.id, Chunk::new("doc.pdf", 1, "hello").id);
        assert_ne!(a.id, Chunk::new("doc.pdf", 0, "hullo").id);
        assert_ne!(a.id, Chunk::new("other.pdf", 0, "hello").id);
    }

    #[test]
    fn page_units_have_distinct_source_refs() {
        assert_eq!(TextUnit::new("a.pdf", "x").source_ref(), "a.pdf");
        assert_eq!(TextUnit::page("a.pdf", 2, "x").source_ref(), "a.pdf#page=2");
    }
}
