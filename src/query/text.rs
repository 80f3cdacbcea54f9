//! Full-text matching and relevance scoring for `$text`

use bson::{Bson, Document};
use docql::TextSearch;
use std::collections::HashMap;

use super::value::path_values;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "with",
];

/// Split text into comparable terms
pub fn tokenize(text: &str, case_sensitive: bool) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .filter(|word| !STOP_WORDS.contains(&word.to_lowercase().as_str()))
        .map(|word| {
            let word = if case_sensitive {
                word.to_string()
            } else {
                word.to_lowercase()
            };
            stem(&word)
        })
        .collect()
}

/// Light plural folding so "courses" finds "course"
fn stem(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Relevance of a document for a search, or `None` if it does not match
///
/// Each indexed field contributes `0.5 + 0.5 * hits / tokens` for every
/// distinct search term it contains, so short fields dense in search terms
/// rank higher.
pub fn score(search: &TextSearch, doc: &Document, fields: &[String]) -> Option<f64> {
    let terms: Vec<String> = search
        .terms
        .iter()
        .flat_map(|t| tokenize(t, search.case_sensitive))
        .collect();
    let excluded: Vec<String> = search
        .excluded
        .iter()
        .flat_map(|t| tokenize(t, search.case_sensitive))
        .collect();

    let mut total = 0.0;
    let mut matched = false;
    for field in fields {
        for value in path_values(doc, field) {
            for text in strings(value) {
                let tokens = tokenize(text, search.case_sensitive);
                if tokens.is_empty() {
                    continue;
                }
                if excluded.iter().any(|e| tokens.contains(e)) {
                    return None;
                }
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for token in &tokens {
                    *counts.entry(token.as_str()).or_default() += 1;
                }
                for term in &terms {
                    if let Some(hits) = counts.get(term.as_str()) {
                        matched = true;
                        total += 0.5 + 0.5 * (*hits as f64) / (tokens.len() as f64);
                    }
                }
            }
        }
    }
    matched.then_some(total)
}

fn strings(value: &Bson) -> Vec<&str> {
    match value {
        Bson::String(s) => vec![s.as_str()],
        Bson::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Bson::String(s) => Some(s.as_str()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn search(raw: &str) -> TextSearch {
        match docql::filter(&doc! { "$text": { "$search": raw } }).unwrap() {
            docql::Filter::Text(search) => search,
            other => panic!("unexpected filter {:?}", other),
        }
    }

    fn fields() -> Vec<String> {
        vec!["title".to_string(), "description".to_string()]
    }

    #[test]
    fn test_tokenize_drops_stop_words() {
        assert_eq!(tokenize("Introduction to the Courses", false), vec!["introduction", "course"]);
    }

    #[test]
    fn test_score_ranks_denser_matches() {
        let focused = doc! { "title": "Python", "description": "Python for data" };
        let passing = doc! { "title": "Web Development", "description": "Some python and lots of other topics" };
        let s1 = score(&search("python"), &focused, &fields()).unwrap();
        let s2 = score(&search("python"), &passing, &fields()).unwrap();
        assert!(s1 > s2);
        assert!(score(&search("rust"), &focused, &fields()).is_none());
    }

    #[test]
    fn test_excluded_terms() {
        let d = doc! { "title": "Python for Web", "description": "" };
        assert!(score(&search("python -web"), &d, &fields()).is_none());
    }
}
