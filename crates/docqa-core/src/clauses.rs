//! Sentence-level clause extraction run over each chunk at ingest time.

use unicode_segmentation::UnicodeSegmentation;

use crate::fallback::WithFallback;
use crate::text::{key_phrases, truncate_chars};
use crate::traits::ClauseClassifier;
use crate::types::{Chunk, ClauseRecord, ClauseType};

pub const MIN_CLAUSE_CHARS: usize = 20;
pub const MAX_SUMMARY_CHARS: usize = 500;
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

const EXCLUSION_TERMS: &[&str] = &["exclude", "not cover", "exception"];
const COVERAGE_TERMS: &[&str] = &["cover", "benefit", "eligible"];
const CONDITION_TERMS: &[&str] = &["condition", "require", "must", "shall"];

/// Keyword classifier. Exclusion terms are checked before coverage terms since
/// "not cover" also contains "cover".
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleClauseClassifier;

impl RuleClauseClassifier {
    pub fn label(sentence: &str) -> ClauseType {
        let lower = sentence.to_lowercase();
        let has = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));
        if has(EXCLUSION_TERMS) {
            ClauseType::Exclusion
        } else if has(COVERAGE_TERMS) {
            ClauseType::Coverage
        } else if has(CONDITION_TERMS) {
            ClauseType::Condition
        } else {
            ClauseType::General
        }
    }
}

impl ClauseClassifier for RuleClauseClassifier {
    fn classify(&self, sentence: &str, _domain: Option<&str>) -> anyhow::Result<(ClauseType, f32)> {
        Ok((Self::label(sentence), DEFAULT_IMPORTANCE))
    }
}

/// Classify every sentence of at least [`MIN_CLAUSE_CHARS`] characters in `chunk`.
///
/// A classifier error on one sentence falls back to the keyword rules for that
/// sentence only.
pub fn extract_clauses(
    chunk: &Chunk,
    classifier: &WithFallback<dyn ClauseClassifier>,
    domain: Option<&str>,
) -> Vec<ClauseRecord> {
    let mut out = Vec::new();
    for (i, sentence) in chunk.text.unicode_sentences().enumerate() {
        let sentence = sentence.trim();
        if sentence.chars().count() < MIN_CLAUSE_CHARS {
            continue;
        }
        let ((clause_type, importance), _) = classifier.run(
            |c| c.classify(sentence, domain),
            || (RuleClauseClassifier::label(sentence), DEFAULT_IMPORTANCE),
        );
        out.push(ClauseRecord {
            clause_id: format!("{}_c{i}", chunk.chunk_id),
            document_id: chunk.document_id.clone(),
            chunk_id: chunk.chunk_id.clone(),
            clause_type,
            summary: truncate_chars(sentence, MAX_SUMMARY_CHARS).to_string(),
            key_terms: key_phrases(sentence),
            importance: importance.clamp(0.0, 1.0),
        });
    }
    out
}
