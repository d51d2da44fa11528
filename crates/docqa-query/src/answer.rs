use docqa_core::text::truncate_chars;
use docqa_core::types::{Decision, GeneratedAnswer, ScoredCandidate, TokenUsage};

pub const INSUFFICIENT_INFORMATION: &str =
    "Insufficient information: no relevant document excerpts were found for this question.";
pub const NO_EVIDENCE_CONFIDENCE: f32 = 0.1;
/// Ceiling on confidence for keyword-matched answers.
pub const RULE_CONFIDENCE_CAP: f32 = 0.7;

const NEGATIVE_MARKERS: &[&str] = &["excluded", "not covered", "exceptions"];
const POSITIVE_MARKERS: &[&str] = &["covered", "includes", "benefits"];

/// Keyword match against the top-ranked excerpt; never fails.
pub fn rule_based_answer(query: &str, evidence: &[ScoredCandidate]) -> GeneratedAnswer {
    let Some(best) = evidence.first() else {
        return GeneratedAnswer {
            answer: INSUFFICIENT_INFORMATION.to_string(),
            decision: Some(Decision::Unclear),
            confidence: NO_EVIDENCE_CONFIDENCE,
            reasoning: "No relevant document excerpts found for the query.".to_string(),
            supporting_evidence: Vec::new(),
            conflicting_evidence: Vec::new(),
            key_factors: vec!["Insufficient information".to_string()],
            limitations: vec!["No relevant documents found".to_string()],
            token_usage: Some(TokenUsage::default()),
        };
    };

    let text = best.chunk.text.as_str();
    let text_lower = text.to_lowercase();
    let mut decision = Decision::Unclear;
    if query.to_lowercase().contains("cover") {
        // negatives first: "not covered" contains "covered"
        if NEGATIVE_MARKERS.iter().any(|m| text_lower.contains(m)) {
            decision = Decision::No;
        } else if POSITIVE_MARKERS.iter().any(|m| text_lower.contains(m)) {
            decision = Decision::Yes;
        }
    }

    let confidence = if best.combined_score.is_finite() {
        best.combined_score.clamp(0.0, RULE_CONFIDENCE_CAP)
    } else {
        0.0
    };

    GeneratedAnswer {
        answer: format!("Based on the most relevant document section, {}...", truncate_chars(text, 200)),
        decision: Some(decision),
        confidence,
        reasoning: "Answer generated based on keyword matching and document similarity.".to_string(),
        supporting_evidence: vec![format!("{}...", truncate_chars(text, 100))],
        conflicting_evidence: Vec::new(),
        key_factors: vec!["Document similarity score".to_string(), "Keyword matching".to_string()],
        limitations: vec!["Rule-based analysis".to_string(), "Limited context understanding".to_string()],
        token_usage: Some(TokenUsage::default()),
    }
}

#[cfg(test)]
mod tests {
    use docqa_core::types::Chunk;

    use super::*;

    fn candidate(text: &str, score: f32) -> ScoredCandidate {
        let mut c = ScoredCandidate::new(
            Chunk {
                chunk_id: "d_0".into(),
                document_id: "d".into(),
                chunk_index: 0,
                text: text.into(),
                word_count: 0,
                char_count: 0,
                page_number: None,
                section: None,
                key_phrases: vec![],
            },
            score,
        );
        c.combined_score = score;
        c
    }

    #[test]
    fn no_evidence_is_insufficient_information() {
        let a = rule_based_answer("Is flood covered?", &[]);
        assert_eq!(a.answer, INSUFFICIENT_INFORMATION);
        assert_eq!(a.decision, Some(Decision::Unclear));
        assert!((a.confidence - 0.1).abs() < 1e-6);
        assert!(a.supporting_evidence.is_empty());
    }

    #[test]
    fn coverage_keywords_decide() {
        let yes = rule_based_answer("Does it cover dental?", &[candidate("Dental care is covered in full.", 0.9)]);
        assert_eq!(yes.decision, Some(Decision::Yes));
        assert!((yes.confidence - RULE_CONFIDENCE_CAP).abs() < 1e-6);

        let no = rule_based_answer("Does it cover dental?", &[candidate("Dental care is not covered.", 0.4)]);
        assert_eq!(no.decision, Some(Decision::No));
        assert!((no.confidence - 0.4).abs() < 1e-6);

        let other = rule_based_answer("Who is the insurer?", &[candidate("Benefits are covered.", 0.4)]);
        assert_eq!(other.decision, Some(Decision::Unclear));
    }

    #[test]
    fn negative_scores_clamp_to_zero() {
        let a = rule_based_answer("anything", &[candidate("text", -3.2)]);
        assert_eq!(a.confidence, 0.0);
        assert!(a.answer.starts_with("Based on the most relevant document section, text"));
    }
}
