//! Prompt-driven adapters over a raw [`TextCompletion`] backend.
//!
//! Both adapters ask for a JSON object and take the first `{` through the
//! last `}` of the completion. Anything that does not parse is an error; the
//! orchestrator's fallback wrapper turns it into the rule-based result.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use docqa_core::text::truncate_chars;
use docqa_core::traits::{AnswerGenerator, IntentExtractor, TextCompletion};
use docqa_core::types::{Decision, GeneratedAnswer, ScoredCandidate, StructuredQuery, TokenUsage};

const EXCERPT_CHARS: usize = 500;
const DEFAULT_CONFIDENCE: f32 = 0.5;

pub struct LlmIntentExtractor {
    backend: Arc<dyn TextCompletion>,
}

impl LlmIntentExtractor {
    pub fn new(backend: Arc<dyn TextCompletion>) -> Self { Self { backend } }
}

impl IntentExtractor for LlmIntentExtractor {
    fn extract(&self, query: &str, domain: Option<&str>) -> Result<StructuredQuery> {
        let completion = self.backend.complete(&intent_prompt(query, domain))?;
        let json = extract_json_object(&completion.text)?;
        serde_json::from_value(json).context("intent response does not match the expected schema")
    }
}

pub struct LlmAnswerGenerator {
    backend: Arc<dyn TextCompletion>,
}

impl LlmAnswerGenerator {
    pub fn new(backend: Arc<dyn TextCompletion>) -> Self { Self { backend } }
}

impl AnswerGenerator for LlmAnswerGenerator {
    fn generate(&self, query: &str, evidence: &[ScoredCandidate], domain: Option<&str>) -> Result<GeneratedAnswer> {
        let completion = self.backend.complete(&answer_prompt(query, evidence, domain))?;
        let json = extract_json_object(&completion.text)?;
        let mut answer = parse_answer(&json)?;
        answer.token_usage = Some(TokenUsage { total_tokens: completion.total_tokens });
        Ok(answer)
    }
}

pub fn intent_prompt(query: &str, domain: Option<&str>) -> String {
    let domain_context = domain.map(|d| format!(" in the {d} domain")).unwrap_or_default();
    format!(
        r#"You are an expert document analysis assistant. Extract structured information from the following natural language query{domain_context}.

Query: "{query}"

Please provide a JSON response with the following structure:
{{
    "intent": "coverage_check|exclusion_check|condition_check|general_inquiry",
    "subject": "the main subject or entity being asked about",
    "keywords": ["key", "terms", "to", "search"],
    "question_type": "yes_no|conditional|explanatory",
    "entities": ["specific", "named", "entities"],
    "context_clues": ["additional", "context", "information"]
}}

Response:
"#
    )
}

pub fn answer_prompt(query: &str, evidence: &[ScoredCandidate], domain: Option<&str>) -> String {
    let domain_context = domain.map(|d| format!(" This is in the {d} domain.")).unwrap_or_default();
    let context = prepare_context(evidence);
    format!(
        r#"You are an expert document analyst. Based on the provided document excerpts, answer the user's question with high accuracy and provide clear reasoning.{domain_context}

Question: {query}

Document Excerpts:
{context}

Please provide a comprehensive JSON response with:
{{
    "answer": "Direct answer to the question",
    "decision": "Yes/No/Partial/Unclear (if applicable)",
    "confidence": 0.85,
    "reasoning": "Detailed explanation of how you arrived at this answer",
    "supporting_evidence": ["List of key phrases or clauses that support the answer"],
    "conflicting_evidence": ["Any contradictory information found"],
    "key_factors": ["Important factors that influenced the decision"],
    "limitations": ["Any limitations or assumptions in the analysis"]
}}

Response:
"#
    )
}

/// Numbered excerpts annotated with their combined score.
pub fn prepare_context(evidence: &[ScoredCandidate]) -> String {
    evidence
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[{}] (Relevance: {:.3}) {}...",
                i + 1,
                c.combined_score,
                truncate_chars(&c.chunk.text, EXCERPT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn extract_json_object(text: &str) -> Result<Value> {
    let start = text.find('{').ok_or_else(|| anyhow!("completion contains no JSON object"))?;
    let end = text.rfind('}').ok_or_else(|| anyhow!("completion contains no JSON object"))?;
    if end < start {
        return Err(anyhow!("completion contains no JSON object"));
    }
    serde_json::from_str(&text[start..=end]).context("completion JSON is malformed")
}

/// Accepts "Yes", "no", "Partial coverage", "Unclear (if applicable)" and similar.
pub fn parse_decision(raw: &str) -> Option<Decision> {
    let lower = raw.trim().to_lowercase();
    if lower.starts_with("yes") {
        Some(Decision::Yes)
    } else if lower.starts_with("no") {
        Some(Decision::No)
    } else if lower.starts_with("partial") {
        Some(Decision::Partial)
    } else if lower.starts_with("unclear") {
        Some(Decision::Unclear)
    } else {
        None
    }
}

fn parse_answer(json: &Value) -> Result<GeneratedAnswer> {
    let answer = json
        .get("answer")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("answer response has no \"answer\" string"))?
        .to_string();

    let confidence = json
        .get("confidence")
        .and_then(Value::as_f64)
        .map_or(DEFAULT_CONFIDENCE, |c| c as f32)
        .clamp(0.0, 1.0);

    Ok(GeneratedAnswer {
        answer,
        decision: json.get("decision").and_then(Value::as_str).and_then(parse_decision),
        confidence,
        reasoning: json.get("reasoning").and_then(Value::as_str).unwrap_or_default().to_string(),
        supporting_evidence: string_list(json, "supporting_evidence"),
        conflicting_evidence: string_list(json, "conflicting_evidence"),
        key_factors: string_list(json, "key_factors"),
        limitations: string_list(json, "limitations"),
        token_usage: None,
    })
}

fn string_list(json: &Value, key: &str) -> Vec<String> {
    json.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_found_inside_chatter() {
        let v = extract_json_object("Sure! Here you go:\n{\"answer\": \"yes\", \"x\": {\"y\": 1}}\nThanks").unwrap();
        assert_eq!(v["x"]["y"], 1);
        assert!(extract_json_object("no braces here").is_err());
        assert!(extract_json_object("} backwards {").is_err());
    }

    #[test]
    fn decisions_parse_leniently() {
        assert_eq!(parse_decision(" Yes"), Some(Decision::Yes));
        assert_eq!(parse_decision("No, it is excluded"), Some(Decision::No));
        assert_eq!(parse_decision("partial"), Some(Decision::Partial));
        assert_eq!(parse_decision("Unclear (if applicable)"), Some(Decision::Unclear));
        assert_eq!(parse_decision("maybe"), None);
    }

    #[test]
    fn answer_fields_default_when_missing() {
        let a = parse_answer(&serde_json::json!({"answer": "Covered.", "confidence": 3.0})).unwrap();
        assert_eq!(a.confidence, 1.0);
        assert!(a.decision.is_none());
        assert!(a.key_factors.is_empty());
        assert!(parse_answer(&serde_json::json!({"decision": "Yes"})).is_err());
    }
}
