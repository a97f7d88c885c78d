//! Recursive character text splitting.
//!
//! [`RecursiveCharacterSplitter`] splits a [`TextUnit`] on an ordered list of
//! separators, falling back to lower-priority separators only for pieces that
//! are still too long, then merges the pieces into chunks that share a fixed
//! number of trailing characters with their predecessor.
//!
//! All lengths are counted in `char`s.

use regex::Regex;

use crate::document::{Chunk, TextUnit};
use crate::error::{RagError, Result};

/// A strategy for splitting text units into chunks.
///
/// Implementations must be deterministic: the same unit always produces the
/// same chunk sequence.
pub trait TextSplitter: Send + Sync {
    /// Split a unit into an ordered sequence of chunks.
    ///
    /// Returns an empty `Vec` if the unit has no non-whitespace text.
    fn split(&self, unit: &TextUnit) -> Vec<Chunk>;
}

/// A boundary the splitter may cut at.
///
/// The matched separator stays attached to the end of the preceding piece,
/// so no text is lost.
#[derive(Debug, Clone)]
pub enum Separator {
    /// A fixed string such as `"\n\n"`.
    Literal(String),
    /// A regular expression. It must not match the empty string.
    Regex(Regex),
}

impl Separator {
    /// Convenience constructor for a literal separator.
    pub fn literal(s: impl Into<String>) -> Self {
        Separator::Literal(s.into())
    }

    /// Compile a regex separator.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Split`] if the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Separator::Regex)
            .map_err(|e| RagError::Split(format!("invalid separator pattern '{pattern}': {e}")))
    }

    fn is_present(&self, text: &str) -> bool {
        match self {
            Separator::Literal(s) => text.contains(s.as_str()),
            Separator::Regex(re) => re.is_match(text),
        }
    }

    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let ends: Vec<usize> = match self {
            Separator::Literal(s) => {
                text.match_indices(s.as_str()).map(|(pos, m)| pos + m.len()).collect()
            }
            Separator::Regex(re) => re.find_iter(text).map(|m| m.end()).collect(),
        };

        let mut result = Vec::with_capacity(ends.len() + 1);
        let mut start = 0;
        for end in ends {
            if end > start {
                result.push(&text[start..end]);
                start = end;
            }
        }
        if start < text.len() {
            result.push(&text[start..]);
        }
        result
    }

    fn matches_empty(&self) -> bool {
        match self {
            Separator::Literal(s) => s.is_empty(),
            Separator::Regex(re) => re.is_match(""),
        }
    }
}

/// Configuration for [`RecursiveCharacterSplitter`].
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Separators tried in priority order.
    pub separators: Vec<Separator>,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Number of characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            separators: ["\n\n", "\n", ". ", " "].into_iter().map(Separator::literal).collect(),
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl SplitterConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> SplitterConfigBuilder {
        SplitterConfigBuilder::default()
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Split("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Split(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.iter().any(Separator::matches_empty) {
            return Err(RagError::Split("separators must not match the empty string".to_string()));
        }
        Ok(())
    }
}

/// Builder for a validated [`SplitterConfig`].
#[derive(Debug, Clone, Default)]
pub struct SplitterConfigBuilder {
    config: SplitterConfig,
}

impl SplitterConfigBuilder {
    /// Replace the separator list.
    pub fn separators(mut self, separators: Vec<Separator>) -> Self {
        self.config.separators = separators;
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Build the [`SplitterConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Split`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - a separator matches the empty string
    pub fn build(self) -> Result<SplitterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Splits text hierarchically on an ordered separator list.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{RecursiveCharacterSplitter, SplitterConfig, TextSplitter};
///
/// let config = SplitterConfig::builder().chunk_size(500).chunk_overlap(50).build()?;
/// let splitter = RecursiveCharacterSplitter::new(config)?;
/// let chunks = splitter.split(&unit);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    config: SplitterConfig,
}

impl RecursiveCharacterSplitter {
    /// Create a splitter, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Split`] if the configuration is invalid.
    pub fn new(config: SplitterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Return the splitter configuration.
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Pieces are cut small enough that the overlap prefix still fits.
        let limit = self.config.chunk_size - self.config.chunk_overlap;
        let mut pieces = Vec::new();
        split_pieces(text, limit, &self.config.separators, &mut pieces);

        merge_pieces(&pieces, self.config.chunk_size, self.config.chunk_overlap)
    }
}

impl TextSplitter for RecursiveCharacterSplitter {
    fn split(&self, unit: &TextUnit) -> Vec<Chunk> {
        let source = unit.source_ref();
        self.split_text(&unit.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk::new(source.clone(), i, text))
            .collect()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s`, or all of `s` if it is shorter.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

/// Cut `text` into pieces of at most `limit` chars where separators allow.
///
/// Uses the first separator that occurs in `text`; pieces still over the limit
/// recurse with the separators after it. Text with no applicable separator is
/// kept whole.
fn split_pieces<'a>(text: &'a str, limit: usize, separators: &[Separator], out: &mut Vec<&'a str>) {
    if char_len(text) <= limit {
        out.push(text);
        return;
    }

    let Some(pos) = separators.iter().position(|s| s.is_present(text)) else {
        out.push(text);
        return;
    };

    let remaining = &separators[pos + 1..];
    for segment in separators[pos].split(text) {
        split_pieces(segment, limit, remaining, out);
    }
}

/// Greedily merge pieces into chunks of at most `chunk_size` chars.
///
/// Each chunk after the first starts with the trailing `chunk_overlap` chars
/// of its predecessor when that prefix and the next piece fit together.
fn merge_pieces(pieces: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    // True while `current` holds only carried-over overlap.
    let mut fresh = true;

    for piece in pieces {
        let piece_len = char_len(piece);
        if piece_len == 0 {
            continue;
        }

        if !fresh && current_len + piece_len <= chunk_size {
            current.push_str(piece);
            current_len += piece_len;
            continue;
        }

        if !fresh {
            let finished = std::mem::take(&mut current);
            current = tail_chars(&finished, chunk_overlap).to_string();
            current_len = char_len(&current);
            chunks.push(finished);
        }

        if current_len + piece_len > chunk_size {
            current.clear();
            current_len = 0;
        }
        current.push_str(piece);
        current_len += piece_len;
        fresh = false;
    }

    if !fresh {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> RecursiveCharacterSplitter {
        let config =
            SplitterConfig::builder().chunk_size(size).chunk_overlap(overlap).build().unwrap();
        RecursiveCharacterSplitter::new(config).unwrap()
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = SplitterConfig::builder().chunk_size(0).chunk_overlap(0).build().unwrap_err();
        assert!(matches!(err, RagError::Split(_)));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = SplitterConfig::builder().chunk_size(10).chunk_overlap(10).build().unwrap_err();
        assert!(matches!(err, RagError::Split(_)));
    }

    #[test]
    fn rejects_empty_separator() {
        let config = SplitterConfig {
            separators: vec![Separator::literal("")],
            chunk_size: 10,
            chunk_overlap: 0,
        };
        assert!(RecursiveCharacterSplitter::new(config).is_err());
        let config = SplitterConfig {
            separators: vec![Separator::regex("x*").unwrap()],
            chunk_size: 10,
            chunk_overlap: 0,
        };
        assert!(RecursiveCharacterSplitter::new(config).is_err());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let s = splitter(20, 5);
        assert!(s.split_text("").is_empty());
        assert!(s.split_text("  \n\n  ").is_empty());
    }

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(splitter(100, 10).split_text("hello world"), vec!["hello world"]);
    }

    #[test]
    fn separator_stays_with_preceding_piece() {
        let sep = Separator::literal(". ");
        assert_eq!(sep.split("a. b. c"), vec!["a. ", "b. ", "c"]);
        let re = Separator::regex(r"\n+").unwrap();
        assert_eq!(re.split("a\n\nb\nc"), vec!["a\n\n", "b\n", "c"]);
    }

    #[test]
    fn oversized_piece_without_separator_is_emitted_whole() {
        let long = "x".repeat(50);
        let chunks = splitter(10, 2).split_text(&long);
        assert_eq!(chunks, vec![long]);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = splitter(20, 5).split_text(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
        }
        for pair in chunks.windows(2) {
            let tail = tail_chars(&pair[0], 5);
            assert!(pair[1].starts_with(tail), "{:?} does not start with {tail:?}", pair[1]);
        }
    }

    #[test]
    fn overlap_counts_characters_not_bytes() {
        let text = "héllo wörld ünïcode tëxt ïs fïne hère";
        let chunks = splitter(12, 3).split_text(text);
        for pair in chunks.windows(2) {
            assert!(pair[1].starts_with(tail_chars(&pair[0], 3)));
        }
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 12);
        }
    }

    #[test]
    fn higher_priority_separator_wins() {
        let text = "first paragraph here.\n\nsecond paragraph here.";
        let chunks = splitter(30, 0).split_text(text);
        assert_eq!(chunks, vec!["first paragraph here.\n\n", "second paragraph here."]);
    }

    #[test]
    fn zero_overlap_concatenates_back_to_source() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = splitter(15, 0).split_text(text);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunks_carry_source_and_index() {
        let unit = TextUnit::page("book.pdf", 3, "aaa bbb ccc ddd eee fff");
        let chunks = splitter(8, 0).split(&unit);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.source, "book.pdf#page=3");
        }
    }
}
