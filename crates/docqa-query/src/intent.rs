use docqa_core::types::{QueryIntent, QuestionType, StructuredQuery};

const MAX_KEYWORDS: usize = 10;
const SUBJECT_CHARS: usize = 50;
const KEYWORD_STOPLIST: &[&str] = &["does", "this", "what", "are", "the", "conditions", "coverage", "policy"];

/// Keyword rules; never fails.
pub fn rule_based_intent(query: &str, domain: Option<&str>) -> StructuredQuery {
    let lower = query.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let intent = if has_any(&["cover", "covered", "coverage"]) {
        QueryIntent::CoverageCheck
    } else if has_any(&["exclude", "excluded", "exclusion"]) {
        QueryIntent::ExclusionCheck
    } else if has_any(&["condition", "requirement", "prerequisite"]) {
        QueryIntent::ConditionCheck
    } else {
        QueryIntent::GeneralInquiry
    };

    let trimmed = lower.trim_start();
    let question_type = if ["does", "is", "can", "will", "would"].iter().any(|p| trimmed.starts_with(p)) {
        QuestionType::YesNo
    } else if has_any(&["if", "when", "under what"]) {
        QuestionType::Conditional
    } else {
        QuestionType::Explanatory
    };

    let keywords = query
        .split_whitespace()
        .filter(|w| w.chars().count() > 3 && !KEYWORD_STOPLIST.contains(&w.to_lowercase().as_str()))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect();

    let subject = if query.chars().count() > SUBJECT_CHARS {
        format!("{}...", docqa_core::text::truncate_chars(query, SUBJECT_CHARS))
    } else {
        query.to_string()
    };

    StructuredQuery {
        intent,
        subject,
        keywords,
        question_type,
        entities: Vec::new(),
        context_clues: domain.map(|d| vec![d.to_string()]).unwrap_or_default(),
    }
}
