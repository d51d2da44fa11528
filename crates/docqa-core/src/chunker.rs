//! Splits extracted document text into overlapping word-bounded chunks.
//!
//! Two strategies share one output shape ([`ChunkDraft`]):
//! - `Words`: a sliding window of `chunk_size` words with stride `chunk_size - overlap`.
//! - `Sentences`: whole sentences are accumulated until the next one would push the
//!   running word count past `chunk_size`; the next chunk is seeded with the last
//!   `overlap` words of the emitted one plus the sentence that overflowed.
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::ChunkDraft;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Words,
    #[default]
    Sentences,
}

/// Validated chunking parameters.
///
/// Sentence mode keeps sentences whole except one longer than `chunk_size`:
/// that sentence is cut into `chunk_size`-word pieces, trading sentence
/// integrity for a bound of `chunk_size + overlap` words per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    strategy: ChunkStrategy,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize, strategy: ChunkStrategy) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, overlap, strategy })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.overlap, settings.strategy)
    }

    pub fn strategy(&self) -> ChunkStrategy { self.strategy }

    pub fn chunk(&self, text: &str) -> Vec<ChunkDraft> {
        match self.strategy {
            ChunkStrategy::Words => self.split_words(text),
            ChunkStrategy::Sentences => self.split_sentences(text),
        }
    }

    fn split_words(&self, text: &str) -> Vec<ChunkDraft> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let stride = self.chunk_size - self.overlap;
        (0..words.len())
            .step_by(stride)
            .enumerate()
            .map(|(i, start)| draft(i, &words[start..(start + self.chunk_size).min(words.len())]))
            .collect()
    }

    fn split_sentences(&self, text: &str) -> Vec<ChunkDraft> {
        let mut drafts = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for sentence in self.sentence_units(text) {
            if !current.is_empty() && current.len() + sentence.len() > self.chunk_size {
                drafts.push(draft(drafts.len(), &current));
                let keep_from = current.len().saturating_sub(self.overlap);
                current.drain(..keep_from);
            }
            current.extend(sentence);
        }
        if !current.is_empty() {
            drafts.push(draft(drafts.len(), &current));
        }
        drafts
    }

    /// Sentences as word lists. A sentence longer than `chunk_size` is cut into
    /// `chunk_size`-word pieces so no chunk grows without bound.
    fn sentence_units<'a>(&self, text: &'a str) -> Vec<Vec<&'a str>> {
        let mut units = Vec::new();
        for sentence in text.unicode_sentences() {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            if words.is_empty() { continue; }
            if words.len() <= self.chunk_size {
                units.push(words);
            } else {
                units.extend(words.chunks(self.chunk_size).map(|piece| piece.to_vec()));
            }
        }
        units
    }
}

/// Word-window chunking with the given parameters.
pub fn chunk_words(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<ChunkDraft>> {
    Ok(Chunker::new(chunk_size, overlap, ChunkStrategy::Words)?.chunk(text))
}

/// Sentence-aware chunking with the given parameters.
pub fn chunk_sentences(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<ChunkDraft>> {
    Ok(Chunker::new(chunk_size, overlap, ChunkStrategy::Sentences)?.chunk(text))
}

fn draft(chunk_index: usize, words: &[&str]) -> ChunkDraft {
    let text = words.join(" ");
    let char_count = text.chars().count();
    ChunkDraft { chunk_index, text, word_count: words.len(), char_count }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(drafts: &[ChunkDraft]) -> Vec<&str> {
        drafts.iter().map(|d| d.text.as_str()).collect()
    }

    #[test]
    fn word_windows_overlap_by_one() {
        let drafts = chunk_words("a b c d e f g h", 4, 1).unwrap();
        assert_eq!(texts(&drafts), vec!["a b c d", "d e f g", "g h"]);
        assert_eq!(drafts.iter().map(|d| d.chunk_index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(drafts[2].word_count, 2);
        assert_eq!(drafts[2].char_count, 3);
    }

    #[test]
    fn word_windows_emit_trailing_partial_window() {
        let drafts = chunk_words("a b c d e f g", 4, 1).unwrap();
        assert_eq!(texts(&drafts), vec!["a b c d", "d e f g", "g"]);
        assert_eq!(drafts[2].chunk_index, 2);
        assert_eq!(drafts[2].word_count, 1);
    }

    #[test]
    fn empty_and_whitespace_text_yield_no_chunks() {
        assert!(chunk_words("", 4, 1).unwrap().is_empty());
        assert!(chunk_words("  \n\t ", 4, 1).unwrap().is_empty());
        assert!(chunk_sentences("", 4, 1).unwrap().is_empty());
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        assert!(matches!(chunk_words("a b", 4, 4), Err(Error::InvalidConfig(_))));
        assert!(matches!(chunk_words("a b", 4, 9), Err(Error::InvalidConfig(_))));
        assert!(matches!(Chunker::new(0, 0, ChunkStrategy::Words), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn word_chunks_cover_input_in_order() {
        let text = (0..97).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let original: Vec<&str> = text.split_whitespace().collect();
        for (size, overlap) in [(10, 0), (10, 3), (7, 6), (1, 0), (200, 20)] {
            let drafts = chunk_words(&text, size, overlap).unwrap();
            let mut rebuilt: Vec<&str> = Vec::new();
            for (i, d) in drafts.iter().enumerate() {
                assert_eq!(d.chunk_index, i);
                let words: Vec<&str> = d.text.split_whitespace().collect();
                let skip = if i == 0 { 0 } else { overlap.min(words.len()) };
                rebuilt.extend(&words[skip..]);
            }
            assert_eq!(rebuilt, original, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn sentences_seed_next_chunk_with_overlap_words() {
        let text = "One two three. Four five six. Seven eight nine.";
        let drafts = chunk_sentences(text, 6, 2).unwrap();
        assert_eq!(texts(&drafts), vec!["One two three. Four five six.", "five six. Seven eight nine."]);
        assert_eq!(drafts[1].word_count, 5);
    }

    #[test]
    fn sentences_stay_whole_when_they_fit() {
        let drafts = chunk_sentences("Short one. Another short one.", 50, 5).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].text, "Short one. Another short one.");
        assert_eq!(drafts[0].chunk_index, 0);
    }

    #[test]
    fn oversized_sentence_is_cut_to_chunk_size() {
        let text = (0..25).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let drafts = chunk_sentences(&text, 10, 0).unwrap();
        assert_eq!(drafts.iter().map(|d| d.word_count).collect::<Vec<_>>(), vec![10, 10, 5]);
    }
}
