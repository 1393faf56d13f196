//! Cloze exercise generation
//!
//! A cloze blanks exactly one token of a sentence that carries either a
//! mistake correction or a vocabulary item. The blanked token must occur
//! exactly once in the sentence so the blank is unambiguous. The relaxed
//! pass draws on a bank of clean practice sentences when the transcript
//! alone cannot reach the floor.

use crate::engine::mistakes::Mistake;
use crate::engine::normalize;
use crate::engine::options;
use crate::engine::vocabulary::VocabItem;
use lessonpipe_common::models::ClozeItem;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use regex::Regex;
use std::collections::HashSet;

/// Upper bound of the cloze target window
pub const MAX_CLOZE: usize = 10;

/// (sentence, blank target) pairs for the relaxed pass
const FALLBACK_CLOZE: &[(&str, &str)] = &[
    ("I think you already know the answer.", "answer"),
    ("Can you open the window for me?", "window"),
    ("She goes to school every morning.", "school"),
    ("We had a great time at the party.", "party"),
    ("Please write your name on the paper.", "paper"),
    ("I want to learn a new language.", "language"),
];

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z']+").unwrap());

/// Replace the single occurrence of `target` (as a token) with a blank.
/// Returns the blanked sentence and the token exactly as it appeared.
fn blank_token(sentence: &str, target: &str) -> Option<(String, String)> {
    if normalize::token_occurrences(sentence, target) != 1 {
        return None;
    }
    let folded = target.to_lowercase();
    let matched = WORD
        .find_iter(sentence)
        .find(|m| m.as_str().to_lowercase() == folded)?;
    let mut blanked = String::with_capacity(sentence.len());
    blanked.push_str(&sentence[..matched.start()]);
    blanked.push_str("_____");
    blanked.push_str(&sentence[matched.end()..]);
    Some((blanked, matched.as_str().to_string()))
}

struct ClozeTarget {
    word: String,
    student_error: Option<String>,
    explanation: String,
}

fn targets_from_mistakes(mistakes: &[Mistake]) -> Vec<ClozeTarget> {
    mistakes
        .iter()
        .filter_map(|m| {
            // A multi-word correction still has one word worth blanking
            let word = normalize::word_tokens(&m.correct)
                .into_iter()
                .find(|w| w.len() > 3)?;
            Some(ClozeTarget {
                explanation: m
                    .rule
                    .clone()
                    .unwrap_or_else(|| format!("The correct form is {}.", m.correct)),
                student_error: (!m.incorrect.contains(' ')).then(|| m.incorrect.clone()),
                word,
            })
        })
        .collect()
}

fn targets_from_vocab(vocabulary: &[VocabItem]) -> Vec<ClozeTarget> {
    vocabulary
        .iter()
        .filter(|v| v.word.len() > 3)
        .map(|v| ClozeTarget {
            word: v.word.clone(),
            student_error: None,
            explanation: match &v.definition {
                Some(definition) => format!("{}: {definition}", v.word),
                None => format!("The missing word is {}.", v.word),
            },
        })
        .collect()
}

pub fn generate_cloze(
    mistakes: &[Mistake],
    vocabulary: &[VocabItem],
    sentences: &[String],
    rng: &mut StdRng,
    relaxed: bool,
) -> Vec<ClozeItem> {
    let neighbors: Vec<String> = vocabulary.iter().map(|v| v.word.clone()).collect();
    let mut items: Vec<ClozeItem> = Vec::new();
    let mut used_sentences: HashSet<String> = HashSet::new();
    let mut used_words: HashSet<String> = HashSet::new();

    let mut targets = targets_from_mistakes(mistakes);
    targets.extend(targets_from_vocab(vocabulary));

    for target in &targets {
        if items.len() >= MAX_CLOZE {
            break;
        }
        let folded = target.word.to_lowercase();
        if !used_words.insert(folded.clone()) {
            continue;
        }
        let Some((sentence, blanked)) = sentences
            .iter()
            .filter(|s| !used_sentences.contains(&s.to_lowercase()))
            .find_map(|s| blank_token(s, &target.word).map(|b| (s.clone(), b)))
        else {
            continue;
        };
        let (blanked_sentence, answer) = blanked;
        used_sentences.insert(sentence.to_lowercase());

        let (choices, _) = options::build_options(
            &answer,
            target.student_error.as_deref(),
            &neighbors,
            rng,
        );
        items.push(ClozeItem {
            sentence: blanked_sentence,
            options: choices,
            answer,
            explanation: target.explanation.clone(),
        });
    }

    if relaxed {
        for (sentence, word) in FALLBACK_CLOZE {
            if items.len() >= MAX_CLOZE {
                break;
            }
            if !used_words.insert(word.to_string()) {
                continue;
            }
            if !used_sentences.insert(sentence.to_lowercase()) {
                continue;
            }
            let Some((blanked_sentence, answer)) = blank_token(sentence, word) else {
                continue;
            };
            let (choices, _) = options::build_options(&answer, None, &neighbors, rng);
            items.push(ClozeItem {
                sentence: blanked_sentence,
                options: choices,
                answer,
                explanation: format!("The missing word is {word}."),
            });
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessonpipe_common::models::Difficulty;
    use rand::SeedableRng;

    fn vocab(word: &str) -> VocabItem {
        VocabItem {
            word: word.to_string(),
            definition: None,
            category: None,
            difficulty: Difficulty::Beginner,
            from_correction: false,
        }
    }

    #[test]
    fn test_blank_token_requires_unique_occurrence() {
        assert!(blank_token("I eat breakfast before breakfast club.", "breakfast").is_none());
        let (blanked, answer) =
            blank_token("I eat Breakfast at eight.", "breakfast").unwrap();
        assert_eq!(blanked, "I eat _____ at eight.");
        assert_eq!(answer, "Breakfast");
    }

    #[test]
    fn test_generates_cloze_from_vocab_sentences() {
        let mut rng = StdRng::seed_from_u64(11);
        let sentences = vec!["The weather is very nice today.".to_string()];
        let items = generate_cloze(&[], &[vocab("weather")], &sentences, &mut rng, false);

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.sentence.matches("_____").count(), 1);
        assert_eq!(item.options.len(), 4);
        assert!(item.options.contains(&item.answer));
        assert!(!item.explanation.is_empty());
    }

    #[test]
    fn test_mistake_corrections_rank_before_vocab() {
        let mut rng = StdRng::seed_from_u64(11);
        let mistakes = vec![Mistake {
            incorrect: "goed".to_string(),
            correct: "went".to_string(),
            kind: crate::engine::mistakes::MistakeKind::Grammar,
            rule: Some("Use the correct verb tense (present/past).".to_string()),
            context: String::new(),
            difficulty: Difficulty::Beginner,
            confidence: 0.8,
        }];
        let sentences = vec![
            "She went home after the lesson.".to_string(),
            "The weather is very nice today.".to_string(),
        ];
        let items = generate_cloze(&mistakes, &[vocab("weather")], &sentences, &mut rng, false);

        assert_eq!(items[0].answer, "went");
        assert!(items[0].options.iter().any(|o| o == "goed"));
    }

    #[test]
    fn test_relaxed_pass_draws_on_fallback_bank() {
        let mut rng = StdRng::seed_from_u64(11);
        let items = generate_cloze(&[], &[], &[], &mut rng, true);
        assert!(items.len() >= 3);
        for item in &items {
            assert_eq!(item.sentence.matches("_____").count(), 1);
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let sentences = vec!["The weather is very nice today.".to_string()];
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            generate_cloze(&[], &[vocab("weather")], &sentences, &mut rng, false)
                .into_iter()
                .map(|i| i.options)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(5), run(5));
    }
}
