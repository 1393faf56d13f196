//! Vocabulary extraction
//!
//! The LLM path is preferred when configured; this heuristic extractor is
//! the deterministic fallback. It favors mid-frequency content words (the
//! ones a learner actually met more than once without them being function
//! words), plus anything the teacher called out explicitly.

use crate::engine::mistakes::Mistake;
use crate::engine::normalize;
use lessonpipe_common::models::Difficulty;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Default number of vocabulary items requested per lesson
pub const MAX_VOCAB_ITEMS: usize = 15;

/// A candidate teaching word with its provenance
#[derive(Debug, Clone)]
pub struct VocabItem {
    pub word: String,
    pub definition: Option<String>,
    pub category: Option<String>,
    pub difficulty: Difficulty,
    pub from_correction: bool,
}

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
        "does", "did", "will", "would", "can", "could", "should", "may", "might", "must", "i",
        "you", "he", "she", "it", "we", "they", "this", "that", "these", "those", "okay", "ok",
        "hi", "hello", "bye", "yeah", "uh", "um", "hmm", "right", "with", "from", "your", "what",
        "when", "where", "there", "here", "very", "just", "like", "about", "because", "them",
        "then", "than", "some", "every", "please", "thank", "thanks", "good", "yes", "not",
        "don't", "want", "know", "think", "going", "really",
    ]
    .into_iter()
    .collect()
});

static EXPLICIT_VOCAB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:important|key|vocabulary|new)\s+words?\s*[:\-]\s*([^.!?]+)").unwrap());

/// Word difficulty from length, the same grading the generators use
pub fn word_difficulty(word: &str) -> Difficulty {
    match word.chars().count() {
        0..=4 => Difficulty::Beginner,
        5..=7 => Difficulty::Intermediate,
        _ => Difficulty::Advanced,
    }
}

pub struct VocabularyExtractor;

impl VocabularyExtractor {
    /// Extract up to [`MAX_VOCAB_ITEMS`] items. Corrections rank highest,
    /// then explicitly called-out words, then mid-frequency content words.
    pub fn extract(transcript: &str, mistakes: &[Mistake]) -> Vec<VocabItem> {
        let cleaned = normalize::normalize(transcript);
        let mut items: Vec<VocabItem> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // 1) Corrected usage: the words the student actually got wrong.
        for mistake in mistakes {
            let correct = mistake.correct.to_lowercase();
            for word in normalize::word_tokens(&correct) {
                if word.len() < 3 || STOPWORDS.contains(word.as_str()) {
                    continue;
                }
                if seen.insert(word.clone()) {
                    items.push(VocabItem {
                        difficulty: word_difficulty(&word),
                        word,
                        definition: None,
                        category: Some("corrected_usage".to_string()),
                        from_correction: true,
                    });
                    if items.len() >= MAX_VOCAB_ITEMS {
                        return items;
                    }
                }
                break; // one word per correction is enough
            }
        }

        // 2) Explicit mentions: "new words: salad, camera, open"
        for capture in EXPLICIT_VOCAB.captures_iter(&cleaned) {
            for raw in capture[1].split([',', ';']) {
                let word = raw.trim().to_lowercase();
                if word.len() < 3 || word.contains(' ') || STOPWORDS.contains(word.as_str()) {
                    continue;
                }
                if seen.insert(word.clone()) {
                    items.push(VocabItem {
                        difficulty: word_difficulty(&word),
                        word,
                        definition: None,
                        category: Some("explicit_vocabulary".to_string()),
                        from_correction: false,
                    });
                    if items.len() >= MAX_VOCAB_ITEMS {
                        return items;
                    }
                }
            }
        }

        // 3) Mid-frequency content words.
        let mut frequency: HashMap<String, usize> = HashMap::new();
        for token in normalize::word_tokens(&cleaned) {
            let folded = token.to_lowercase();
            if folded.len() < 4 || STOPWORDS.contains(folded.as_str()) {
                continue;
            }
            // Mid-sentence capitalized tokens are usually names
            if token.chars().next().is_some_and(|c| c.is_uppercase()) {
                continue;
            }
            *frequency.entry(folded).or_default() += 1;
        }

        let mut content: Vec<(String, usize)> = frequency.into_iter().collect();
        // Bias toward mid-frequency words: repeated enough to matter, not
        // so frequent that they are discourse glue.
        content.sort_by(|(word_a, freq_a), (word_b, freq_b)| {
            mid_frequency_score(*freq_b)
                .cmp(&mid_frequency_score(*freq_a))
                .then(word_b.len().cmp(&word_a.len()))
                .then(word_a.cmp(word_b))
        });

        for (word, _) in content {
            if items.len() >= MAX_VOCAB_ITEMS {
                break;
            }
            if seen.insert(word.clone()) {
                items.push(VocabItem {
                    difficulty: word_difficulty(&word),
                    word,
                    definition: None,
                    category: Some("content_word".to_string()),
                    from_correction: false,
                });
            }
        }

        items
    }
}

fn mid_frequency_score(freq: usize) -> usize {
    match freq {
        2..=6 => 3,
        7..=10 => 2,
        1 => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_repeated_content_words() {
        let transcript = "Teacher: Today we talk about breakfast. I eat breakfast early. \
                          Breakfast is important. The weather is nice. The weather changed.";
        let items = VocabularyExtractor::extract(transcript, &[]);
        let words: Vec<_> = items.iter().map(|i| i.word.as_str()).collect();
        assert!(words.contains(&"breakfast"));
        assert!(words.contains(&"weather"));
    }

    #[test]
    fn test_extract_skips_stopwords_and_names() {
        let transcript =
            "Khadija: I think that they would have been there. Please thank them for it.";
        let items = VocabularyExtractor::extract(transcript, &[]);
        assert!(items.iter().all(|i| i.word != "khadija"));
        assert!(items.iter().all(|i| i.word != "that"));
    }

    #[test]
    fn test_explicit_vocabulary_is_picked_up() {
        let transcript = "Teacher: New words: salad, camera, open. Let us practice them today.";
        let items = VocabularyExtractor::extract(transcript, &[]);
        let explicit: Vec<_> = items
            .iter()
            .filter(|i| i.category.as_deref() == Some("explicit_vocabulary"))
            .map(|i| i.word.as_str())
            .collect();
        assert!(explicit.contains(&"salad"));
        assert!(explicit.contains(&"camera"));
    }

    #[test]
    fn test_corrections_rank_first() {
        use crate::engine::mistakes::{Mistake, MistakeKind};
        let mistakes = vec![Mistake {
            incorrect: "speaked".to_string(),
            correct: "spoke".to_string(),
            kind: MistakeKind::Grammar,
            rule: None,
            context: String::new(),
            difficulty: Difficulty::Beginner,
            confidence: 0.5,
        }];
        let transcript = "Teacher: We practiced speaking about travel plans yesterday evening.";
        let items = VocabularyExtractor::extract(transcript, &mistakes);
        assert_eq!(items[0].word, "spoke");
        assert!(items[0].from_correction);
    }

    #[test]
    fn test_caps_at_limit() {
        let mut transcript = String::new();
        for i in 0..40 {
            transcript.push_str(&format!("wordnumber{i} wordnumber{i} interesting. "));
        }
        let items = VocabularyExtractor::extract(&transcript, &[]);
        assert!(items.len() <= MAX_VOCAB_ITEMS);
    }
}
