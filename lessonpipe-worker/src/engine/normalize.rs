//! Transcript normalization and sentence splitting
//!
//! Lesson transcripts arrive as noisy speaker-labelled text. This module
//! strips the labels and fillers, splits punctuation-aware sentence
//! candidates, and cleans individual sentences for use in exercises.

use once_cell::sync::Lazy;
use regex::Regex;

/// Sentence candidates shorter than this are rejected
pub const MIN_SENTENCE_CHARS: usize = 12;
/// Sentence candidates longer than this are rejected
pub const MAX_SENTENCE_CHARS: usize = 280;

// Anchored to line starts so mid-sentence phrases like "new words:" survive
static SPEAKER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[A-Za-z][A-Za-z .']{0,40}:\s*").unwrap());
static FILLER_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(okay|ok|yeah|uh|um|hmm|you know)\b[, ]*").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z']+").unwrap());
static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z']+|[.,!?;:]").unwrap());
static LEADING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^[,;:!?."']+"#).unwrap());
static TRAILING_COMMA_TERM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ ,;:]+([.!?])$").unwrap());

/// Remove `Speaker Name:` prefixes anywhere in the text
pub fn strip_speaker_labels(text: &str) -> String {
    SPEAKER_LABEL.replace_all(text, "").into_owned()
}

/// Strip labels and conversational fillers, collapse whitespace
pub fn normalize(text: &str) -> String {
    let text = strip_speaker_labels(text);
    let text = FILLER_WORD.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Punctuation-aware split into sentence candidates within length bounds
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    normalized
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(clean_sentence)
        .filter(|s| {
            let len = s.chars().count();
            len >= MIN_SENTENCE_CHARS && len <= MAX_SENTENCE_CHARS
        })
        .filter(|s| WORD.is_match(s))
        .collect()
}

/// Clean one sentence for human-facing use: collapsed whitespace, no stray
/// leading punctuation, exactly one terminator, no trailing whitespace.
pub fn clean_sentence(sentence: &str) -> String {
    let s = WHITESPACE.replace_all(sentence.trim(), " ");
    let s = LEADING_PUNCT.replace(&s, "");
    let s = TRAILING_COMMA_TERM.replace(&s, "$1");
    let mut s = s.trim().to_string();
    // Collapse runs of terminators left behind by the splitter
    while s.ends_with("..") || s.ends_with(".!") || s.ends_with(".?") {
        s.pop();
    }
    if !s.ends_with(['.', '!', '?']) {
        s = s.trim_end_matches([',', ';', ':']).trim_end().to_string();
        s.push('.');
    }
    s
}

/// Alphabetic word tokens (case preserved)
pub fn word_tokens(text: &str) -> Vec<String> {
    WORD.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Words plus punctuation marks as separate tokens, for sentence-builder
/// tiles
pub fn tokenize_with_punctuation(sentence: &str) -> Vec<String> {
    TOKEN
        .find_iter(sentence)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Rebuild a sentence from word/punctuation tokens
pub fn detokenize(tokens: &[String]) -> String {
    let mut out = String::new();
    for token in tokens {
        let is_punct = token.chars().all(|c| ".,!?;:".contains(c));
        if !out.is_empty() && !is_punct {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

/// How many times `word` appears as a standalone token (case-folded)
pub fn token_occurrences(sentence: &str, word: &str) -> usize {
    let folded = word.to_lowercase();
    word_tokens(sentence)
        .iter()
        .filter(|t| t.to_lowercase() == folded)
        .count()
}
