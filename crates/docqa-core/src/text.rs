//! Lightweight text heuristics used at ingest time: key phrases, section
//! headings and page estimates.

use std::collections::HashMap;

pub const MAX_KEY_PHRASES: usize = 10;

const STOP_WORDS: &[&str] = &[
    "a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

const HEADING_MARKERS: &[&str] = &["section", "article", "clause", "chapter", "part", "schedule"];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercased alphanumeric tokens, punctuation stripped from both ends.
pub fn normalized_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Up to [`MAX_KEY_PHRASES`] phrases, in order of first appearance.
///
/// Multi-word runs of content words (no stop words, no punctuation break) come
/// first; remaining room is filled with the most frequent single content words
/// longer than four characters.
pub fn key_phrases(text: &str) -> Vec<String> {
    let mut phrases: Vec<String> = Vec::new();
    let mut run: Vec<String> = Vec::new();

    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        let breaks_after = raw.ends_with(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')'));
        if word.is_empty() || is_stop_word(&word) || word.chars().all(|c| c.is_ascii_digit()) {
            flush(&mut run, &mut phrases);
            continue;
        }
        run.push(word);
        if breaks_after {
            flush(&mut run, &mut phrases);
        }
    }
    flush(&mut run, &mut phrases);
    phrases.truncate(MAX_KEY_PHRASES);

    if phrases.len() < MAX_KEY_PHRASES {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (pos, w) in normalized_tokens(text).into_iter().enumerate() {
            if w.chars().count() > 4 && !is_stop_word(&w) {
                counts.entry(w).or_insert((0, pos)).0 += 1;
            }
        }
        let mut singles: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        singles.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        for (w, _) in singles {
            if phrases.len() >= MAX_KEY_PHRASES { break; }
            if !phrases.iter().any(|p| p.split(' ').any(|t| t == w)) {
                phrases.push(w);
            }
        }
    }
    phrases
}

/// Long runs are cut into pieces of at most four words; single-word leftovers are dropped.
fn flush(run: &mut Vec<String>, phrases: &mut Vec<String>) {
    for piece in run.chunks(4).filter(|p| p.len() >= 2) {
        let phrase = piece.join(" ");
        if !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
    }
    run.clear();
}

/// Nearest heading-like marker inside a chunk.
///
/// Recognizes `Section 4.2`-style references (section, article, clause, chapter,
/// part, schedule followed by a numbering token) and otherwise the first run of
/// two or more upper-case words.
pub fn detect_section(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    for pair in words.windows(2) {
        let marker = pair[0].trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        let number = pair[1].trim_end_matches(|c: char| matches!(c, '.' | ',' | ':' | ';' | ')'));
        if HEADING_MARKERS.contains(&marker.as_str()) && is_numbering(number) {
            let marker = pair[0].trim_matches(|c: char| !c.is_alphanumeric());
            return Some(format!("{marker} {number}"));
        }
    }

    let mut run: Vec<&str> = Vec::new();
    for w in &words {
        let bare = w.trim_matches(|c: char| !c.is_alphanumeric());
        let upper = bare.chars().count() >= 2
            && bare.chars().any(char::is_alphabetic)
            && bare.chars().all(|c| !c.is_lowercase());
        if upper {
            run.push(bare);
        } else if run.len() >= 2 {
            break;
        } else {
            run.clear();
        }
    }
    (run.len() >= 2).then(|| run.join(" "))
}

fn is_numbering(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => token.chars().all(|c| c.is_ascii_digit() || c == '.'),
        // Roman numerals and single-letter parts (`Part IV`, `Schedule A`).
        Some(_) => token.len() <= 4 && token.chars().all(|c| "IVXLCDM".contains(c) || (token.len() == 1 && c.is_ascii_uppercase())),
        None => false,
    }
}

/// Linear page estimate: `min(floor(index * pages / chunks) + 1, pages)`.
pub fn estimate_page(chunk_index: usize, total_chunks: usize, total_pages: Option<u32>) -> Option<u32> {
    let pages = total_pages.filter(|p| *p > 0)?;
    if total_chunks == 0 {
        return Some(1);
    }
    let estimate = (chunk_index as u64 * u64::from(pages)) / total_chunks as u64 + 1;
    Some(estimate.min(u64::from(pages)) as u32)
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_are_content_word_runs() {
        let phrases = key_phrases("The policy covers emergency dental treatment for the insured person.");
        assert_eq!(phrases[0], "policy covers emergency dental");
        assert_eq!(phrases[1], "insured person");
        assert!(phrases.contains(&"treatment".to_string()));
    }

    #[test]
    fn phrases_capped_at_ten() {
        let text = (0..40).map(|i| format!("alpha{i} beta{i}.")).collect::<Vec<_>>().join(" ");
        assert_eq!(key_phrases(&text).len(), MAX_KEY_PHRASES);
    }

    #[test]
    fn section_marker_is_detected() {
        assert_eq!(detect_section("as described in Section 4.2: Exclusions apply").as_deref(), Some("Section 4.2"));
        assert_eq!(detect_section("GENERAL EXCLUSIONS The insurer will not pay").as_deref(), Some("GENERAL EXCLUSIONS"));
        assert_eq!(detect_section("plain prose without headings"), None);
    }

    #[test]
    fn page_estimate_interpolates_and_clamps() {
        assert_eq!(estimate_page(0, 10, Some(5)), Some(1));
        assert_eq!(estimate_page(5, 10, Some(5)), Some(3));
        assert_eq!(estimate_page(9, 10, Some(5)), Some(5));
        assert_eq!(estimate_page(3, 10, None), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
