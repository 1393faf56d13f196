//! Teachable-sentence selection
//!
//! The LLM path is preferred when configured; the heuristic keeps
//! sentences that carry at least one extracted vocabulary item, fall
//! inside the length bounds, and do not look like classroom commands or
//! name-droppings.

use crate::engine::normalize;
use crate::engine::vocabulary::VocabItem;
use std::collections::HashSet;

/// Default number of sentences selected per lesson
pub const MAX_SENTENCES: usize = 10;

const COMMAND_LEADS: &[&str] = &[
    "open", "close", "repeat", "listen", "say", "answer", "look", "start", "begin", "write",
];

/// Does the sentence read like a short classroom command
/// ("open the camera please")?
fn looks_like_command(sentence: &str) -> bool {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    if words.len() > 6 {
        return false;
    }
    words
        .first()
        .map(|w| {
            let folded = w.to_lowercase();
            COMMAND_LEADS.iter().any(|c| folded.starts_with(c))
        })
        .unwrap_or(false)
}

/// Mid-sentence capitalized tokens are usually participant names
fn contains_probable_name(sentence: &str) -> bool {
    normalize::word_tokens(sentence)
        .iter()
        .skip(1)
        .any(|w| w.chars().next().is_some_and(|c| c.is_uppercase()) && w.to_uppercase() != *w)
}

pub struct SentenceExtractor;

impl SentenceExtractor {
    /// Select up to [`MAX_SENTENCES`] practice-worthy sentences. With
    /// `relaxed`, the vocabulary-containment requirement is dropped so a
    /// thin transcript can still fill the exercise floors.
    pub fn extract(
        candidates: &[String],
        vocabulary: &[VocabItem],
        relaxed: bool,
    ) -> Vec<String> {
        let vocab: HashSet<String> = vocabulary.iter().map(|v| v.word.to_lowercase()).collect();
        let mut selected = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for sentence in candidates {
            if selected.len() >= MAX_SENTENCES {
                break;
            }
            let word_count = sentence.split_whitespace().count();
            if !(4..=20).contains(&word_count) {
                continue;
            }
            if looks_like_command(sentence) {
                continue;
            }
            if contains_probable_name(sentence) {
                continue;
            }
            if !relaxed {
                let carries_vocab = normalize::word_tokens(sentence)
                    .iter()
                    .any(|w| vocab.contains(&w.to_lowercase()));
                if !carries_vocab {
                    continue;
                }
            }
            let key = sentence.to_lowercase();
            if seen.insert(key) {
                selected.push(sentence.clone());
            }
        }

        selected
    }
}
