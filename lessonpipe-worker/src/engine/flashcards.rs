//! Flashcard generation
//!
//! Each vocabulary item becomes a card with an example sentence pulled
//! from the lesson itself: preferably one of the selected teachable
//! sentences, otherwise any transcript sentence containing the word, and
//! as a last resort a neutral practice line so the card is never empty.

use crate::engine::normalize;
use crate::engine::vocabulary::VocabItem;
use lessonpipe_common::models::Flashcard;

/// Upper bound of the flashcard target window
pub const MAX_FLASHCARDS: usize = 15;

fn example_for(word: &str, selected: &[String], all_sentences: &[String]) -> String {
    let folded = word.to_lowercase();
    let containing = |sentences: &[String]| {
        sentences
            .iter()
            .filter(|s| normalize::token_occurrences(s, &folded) > 0)
            .min_by_key(|s| s.split_whitespace().count())
            .cloned()
    };

    if let Some(example) = containing(selected) {
        return example;
    }
    if let Some(example) = containing(all_sentences) {
        return example;
    }
    // Case-folded substring match catches inflected forms
    if let Some(example) = all_sentences
        .iter()
        .find(|s| s.to_lowercase().contains(&folded))
    {
        return example.clone();
    }
    format!("We practiced the word {word} in this lesson.")
}

pub fn generate_flashcards(
    vocabulary: &[VocabItem],
    selected: &[String],
    all_sentences: &[String],
) -> Vec<Flashcard> {
    let mut cards = Vec::new();
    for item in vocabulary {
        if cards.len() >= MAX_FLASHCARDS {
            break;
        }
        if item.word.trim().is_empty() {
            continue;
        }
        cards.push(Flashcard {
            word: item.word.clone(),
            // Filled in afterwards by the translation stage
            translation: None,
            example_sentence: normalize::clean_sentence(&example_for(
                &item.word,
                selected,
                all_sentences,
            )),
            category: item.category.clone(),
            difficulty: item.difficulty,
        });
    }
    cards
}
