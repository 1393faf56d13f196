//! Sentence-builder generation
//!
//! Students rebuild a sentence from shuffled word tiles, so only clean,
//! pedagogically sound sentences are usable. Punctuation rides along as
//! its own token. The fallback bank serves the relaxed pass.

use crate::engine::normalize;
use crate::engine::options;
use lessonpipe_common::models::SentenceBuilderItem;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Upper bound of the sentence-builder target window
pub const MAX_SENTENCE_ITEMS: usize = 10;

const FALLBACK_SENTENCES: &[&str] = &[
    "Can you open the window, please?",
    "I think you already know the answer.",
    "What did you do in the morning?",
    "She goes to school every day.",
    "We had a great time at the party.",
    "Please write your name on the paper.",
    "I want to learn a new language.",
    "The weather is very nice today.",
];

static INTERROGATIVE_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(can|could|what|why|how|where|when|who|do|does|did|is|are|am|will|would|shall|should|have|has|had)\b",
    )
    .unwrap()
});

/// Capitalize the first letter and convert interrogative-lead statements
/// into questions.
fn polish(sentence: &str) -> String {
    let mut s = normalize::clean_sentence(sentence);
    if let Some(first) = s.chars().next() {
        if first.is_lowercase() {
            s = first.to_uppercase().collect::<String>() + &s[first.len_utf8()..];
        }
    }
    if s.ends_with('.') && INTERROGATIVE_LEAD.is_match(&s) {
        s.pop();
        s.push('?');
    }
    s
}

fn usable(sentence: &str) -> bool {
    let words = sentence.split_whitespace().count();
    if !(4..=12).contains(&words) {
        return false;
    }
    sentence.ends_with(['.', '!', '?'])
}

/// Two morphological variants of a content word, as extra tiles
fn distractors_for(tokens: &[String]) -> Option<Vec<String>> {
    let content = tokens.iter().find(|t| t.len() > 4)?;
    let variants = vec![options::to_ing(content), options::pluralize(content)];
    let folded: HashSet<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    let variants: Vec<String> = variants
        .into_iter()
        .filter(|v| !folded.contains(&v.to_lowercase()))
        .collect();
    (!variants.is_empty()).then_some(variants)
}

fn build_item(sentence: &str) -> Option<SentenceBuilderItem> {
    let polished = polish(sentence);
    if !usable(&polished) {
        return None;
    }
    let tokens = normalize::tokenize_with_punctuation(&polished);
    if tokens.is_empty() {
        return None;
    }
    let distractors = distractors_for(&tokens);
    Some(SentenceBuilderItem {
        english_sentence: polished,
        distractors,
        // Filled in afterwards by the translation stage
        translation: None,
        sentence_tokens: tokens,
    })
}

pub fn generate_sentence_items(selected: &[String], relaxed: bool) -> Vec<SentenceBuilderItem> {
    let mut items = Vec::new();
    let mut used: HashSet<String> = HashSet::new();

    for sentence in selected {
        if items.len() >= MAX_SENTENCE_ITEMS {
            break;
        }
        if let Some(item) = build_item(sentence) {
            if used.insert(item.english_sentence.to_lowercase()) {
                items.push(item);
            }
        }
    }

    if relaxed {
        for fallback in FALLBACK_SENTENCES {
            if items.len() >= MAX_SENTENCE_ITEMS {
                break;
            }
            if let Some(item) = build_item(fallback) {
                if used.insert(item.english_sentence.to_lowercase()) {
                    items.push(item);
                }
            }
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polish_capitalizes_and_converts_questions() {
        assert_eq!(
            polish("can you open the window."),
            "Can you open the window?"
        );
        assert_eq!(
            polish("the weather is nice today"),
            "The weather is nice today."
        );
    }

    #[test]
    fn test_tokens_keep_punctuation_separate() {
        let items =
            generate_sentence_items(&["Can you open the window, please?".to_string()], false);
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert!(item.sentence_tokens.contains(&",".to_string()));
        assert!(item.sentence_tokens.contains(&"?".to_string()));
        assert_eq!(
            normalize::detokenize(&item.sentence_tokens),
            item.english_sentence
        );
    }

    #[test]
    fn test_rejects_fragments() {
        let items = generate_sentence_items(&["Too short.".to_string()], false);
        assert!(items.is_empty());
    }

    #[test]
    fn test_relaxed_pass_fills_from_bank() {
        let items = generate_sentence_items(&[], true);
        assert!(items.len() >= 6);
        for item in &items {
            assert!(!item.english_sentence.ends_with(' '));
            assert!(!item.english_sentence.contains(".."));
        }
    }
}
