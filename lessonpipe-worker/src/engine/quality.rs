//! Sanitization and the quality gate
//!
//! Every generated item passes structural validation before it is emitted;
//! anything that fails is dropped, and the drop count feeds the quality
//! score. A failing score never blocks persistence, it only flips
//! `quality_passed`.

use crate::engine::normalize;
use lessonpipe_common::models::{
    ClozeItem, ExerciseCounts, Flashcard, GrammarItem, SentenceBuilderItem,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Below this per-type count the engine retries with relaxed heuristics
pub const HARD_FLOOR: usize = 3;

/// Per-type target windows (inclusive)
pub const FLASHCARD_WINDOW: (usize, usize) = (8, 15);
pub const CLOZE_WINDOW: (usize, usize) = (6, 10);
pub const GRAMMAR_WINDOW: (usize, usize) = (6, 10);
pub const SENTENCE_WINDOW: (usize, usize) = (6, 10);

const BLANK: &str = "_____";

static DOUBLE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?,;:]{2,}").unwrap());

/// Stray or doubled punctuation in a human-facing string
pub fn has_punctuation_defect(text: &str) -> bool {
    DOUBLE_PUNCT.is_match(text) || text != text.trim_end() || text.trim().is_empty()
}

fn options_are_valid(options: &[String]) -> bool {
    if options.len() != 4 {
        return false;
    }
    if options.iter().any(|o| o.trim().is_empty()) {
        return false;
    }
    let folded: HashSet<String> = options.iter().map(|o| o.to_lowercase()).collect();
    folded.len() == options.len()
}

pub fn flashcard_is_valid(card: &Flashcard, seen_words: &mut HashSet<String>) -> bool {
    if card.word.trim().is_empty() || card.example_sentence.trim().is_empty() {
        return false;
    }
    if has_punctuation_defect(&card.example_sentence) {
        return false;
    }
    seen_words.insert(card.word.to_lowercase())
}

pub fn cloze_is_valid(item: &ClozeItem) -> bool {
    if item.sentence.matches(BLANK).count() != 1 {
        return false;
    }
    if !options_are_valid(&item.options) {
        return false;
    }
    if !item.options.contains(&item.answer) {
        return false;
    }
    if item.explanation.trim().is_empty() {
        return false;
    }
    // The blank must be unambiguous: restoring the answer yields a sentence
    // where it appears as exactly one token.
    let restored = item.sentence.replace(BLANK, &item.answer);
    normalize::token_occurrences(&restored, &item.answer) == 1
}

pub fn grammar_is_valid(item: &GrammarItem) -> bool {
    item.prompt.matches(BLANK).count() == 1
        && options_are_valid(&item.options)
        && item.correct_index < item.options.len()
        && !item.explanation.trim().is_empty()
}

pub fn sentence_item_is_valid(item: &SentenceBuilderItem) -> bool {
    if item.english_sentence.trim().is_empty() || item.sentence_tokens.is_empty() {
        return false;
    }
    if has_punctuation_defect(&item.english_sentence) {
        return false;
    }
    if item.sentence_tokens.iter().any(|t| t.trim().is_empty()) {
        return false;
    }
    // Tiles must rebuild the sentence
    normalize::detokenize(&item.sentence_tokens) == item.english_sentence
}

/// Outcome of one sanitization pass
pub struct Sanitized {
    pub flashcards: Vec<Flashcard>,
    pub cloze: Vec<ClozeItem>,
    pub grammar: Vec<GrammarItem>,
    pub sentence: Vec<SentenceBuilderItem>,
    pub dropped: usize,
}

pub fn sanitize(
    flashcards: Vec<Flashcard>,
    cloze: Vec<ClozeItem>,
    grammar: Vec<GrammarItem>,
    sentence: Vec<SentenceBuilderItem>,
) -> Sanitized {
    let before = flashcards.len() + cloze.len() + grammar.len() + sentence.len();

    let mut seen_words = HashSet::new();
    let flashcards: Vec<_> = flashcards
        .into_iter()
        .filter(|c| flashcard_is_valid(c, &mut seen_words))
        .collect();
    let cloze: Vec<_> = cloze.into_iter().filter(cloze_is_valid).collect();
    let grammar: Vec<_> = grammar.into_iter().filter(grammar_is_valid).collect();
    let sentence: Vec<_> = sentence.into_iter().filter(sentence_item_is_valid).collect();

    let after = flashcards.len() + cloze.len() + grammar.len() + sentence.len();
    Sanitized {
        flashcards,
        cloze,
        grammar,
        sentence,
        dropped: before - after,
    }
}

fn in_window(count: usize, window: (usize, usize)) -> bool {
    (window.0..=window.1).contains(&count)
}

/// Inputs to the scoring formula beyond the counts themselves
pub struct ScoreInputs {
    /// Fraction of flashcards carrying a translation, 0.0..=1.0
    pub translation_coverage: f64,
    /// At least one cloze or grammar item derives from a mistake pair
    pub mistake_derived_present: bool,
    /// Sanitization dropped nothing
    pub clean_sanitization: bool,
}

/// Score 0..=100: +15 per type inside its window, +20 weighted by flashcard
/// translation coverage, +10 for a mistake-derived item, +10 for a clean
/// sanitization pass.
pub fn quality_score(counts: &ExerciseCounts, inputs: &ScoreInputs) -> u32 {
    let mut score = 0.0;
    if in_window(counts.flashcards, FLASHCARD_WINDOW) {
        score += 15.0;
    }
    if in_window(counts.cloze, CLOZE_WINDOW) {
        score += 15.0;
    }
    if in_window(counts.grammar, GRAMMAR_WINDOW) {
        score += 15.0;
    }
    if in_window(counts.sentence, SENTENCE_WINDOW) {
        score += 15.0;
    }
    score += 20.0 * inputs.translation_coverage.clamp(0.0, 1.0);
    if inputs.mistake_derived_present {
        score += 10.0;
    }
    if inputs.clean_sanitization {
        score += 10.0;
    }
    score.round() as u32
}
