//! Distractor and option-list construction
//!
//! Multiple-choice options are built from the answer's own morphology
//! (inflections, a transposition misspelling, capitalization), the
//! student's incorrect form when one exists, and lexical neighbors from the
//! extracted vocabulary. Options are alphabetic tokens of similar length,
//! distinct from each other and from the answer.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Backfill words when a target yields too few viable distractors
const FALLBACK_WORDS: &[&str] = &[
    "morning", "window", "answer", "question", "paper", "weather", "language", "school", "party",
    "breakfast",
];

pub fn to_ing(word: &str) -> String {
    let w = word.to_lowercase();
    if w.ends_with('e') && w.len() > 2 {
        format!("{}ing", &w[..w.len() - 1])
    } else {
        format!("{w}ing")
    }
}

pub fn to_past(word: &str) -> String {
    let w = word.to_lowercase();
    if w.ends_with('e') {
        format!("{w}d")
    } else if w.ends_with('y') && w.len() > 1 && !is_vowel(w.as_bytes()[w.len() - 2]) {
        format!("{}ied", &w[..w.len() - 1])
    } else {
        format!("{w}ed")
    }
}

pub fn pluralize(word: &str) -> String {
    let w = word.to_lowercase();
    if w.ends_with('y') && w.len() > 1 && !is_vowel(w.as_bytes()[w.len() - 2]) {
        format!("{}ies", &w[..w.len() - 1])
    } else if w.ends_with('s')
        || w.ends_with("ch")
        || w.ends_with("sh")
        || w.ends_with('x')
        || w.ends_with('z')
    {
        format!("{w}es")
    } else {
        format!("{w}s")
    }
}

/// Swap the second and third characters, a common typo shape
pub fn transpose_misspelling(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() > 3 {
        let mut swapped = chars.clone();
        swapped.swap(1, 2);
        let candidate: String = swapped.into_iter().collect();
        if !candidate.eq_ignore_ascii_case(word) {
            return candidate;
        }
    }
    if chars.len() > 1 {
        chars[..chars.len() - 1].iter().collect()
    } else {
        word.to_string()
    }
}

pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn is_vowel(b: u8) -> bool {
    matches!(b.to_ascii_lowercase(), b'a' | b'e' | b'i' | b'o' | b'u')
}

fn is_alpha_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic() || c == '\'')
}

/// Same surface class as the answer: alphabetic and of comparable length
fn is_viable_distractor(candidate: &str, answer: &str) -> bool {
    is_alpha_token(candidate)
        && !candidate.eq_ignore_ascii_case(answer)
        && candidate.len().abs_diff(answer.len()) <= 4
}

fn push_unique(options: &mut Vec<String>, candidate: String, answer: &str) {
    if options.len() >= 4 {
        return;
    }
    if !is_viable_distractor(&candidate, answer) {
        return;
    }
    if options.iter().any(|o| o.eq_ignore_ascii_case(&candidate)) {
        return;
    }
    options.push(candidate);
}

/// Build a four-option list for `answer`, returning the options and the
/// index of the answer. Distractor preference order: the student's
/// incorrect form, morphological relatives, lexical neighbors, then the
/// fallback bank.
pub fn build_options(
    answer: &str,
    student_error: Option<&str>,
    neighbors: &[String],
    rng: &mut StdRng,
) -> (Vec<String>, usize) {
    let mut options: Vec<String> = vec![answer.to_string()];

    if let Some(error) = student_error {
        // Only single-token errors make believable options
        if !error.contains(' ') {
            push_unique(&mut options, error.to_string(), answer);
        }
    }

    for candidate in [
        to_ing(answer),
        to_past(answer),
        pluralize(answer),
        transpose_misspelling(answer),
        capitalize(answer),
    ] {
        push_unique(&mut options, candidate, answer);
    }

    for neighbor in neighbors {
        push_unique(&mut options, neighbor.clone(), answer);
    }

    for fallback in FALLBACK_WORDS {
        push_unique(&mut options, fallback.to_string(), answer);
    }

    options.truncate(4);
    options.shuffle(rng);
    let correct_index = options
        .iter()
        .position(|o| o == answer)
        .unwrap_or_default();
    (options, correct_index)
}

/// Concept-targeted option sets for grammar drills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarConcept {
    ThirdPerson,
    Article,
    Preposition,
    General,
}

/// Option list keyed to the grammar point being drilled. Falls back to
/// [`build_options`] when the concept gives too few distinct forms.
pub fn build_grammar_options(
    answer: &str,
    concept: GrammarConcept,
    student_error: Option<&str>,
    neighbors: &[String],
    rng: &mut StdRng,
) -> (Vec<String>, usize) {
    let candidates: Vec<String> = match concept {
        GrammarConcept::ThirdPerson => {
            let base = answer.trim_end_matches('s');
            vec![
                base.to_string(),
                format!("{base}s"),
                to_ing(base),
                to_past(base),
            ]
        }
        GrammarConcept::Preposition => ["to", "at", "in", "on", "for", "with"]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        GrammarConcept::Article => vec![
            "a".to_string(),
            "an".to_string(),
            "the".to_string(),
            "some".to_string(),
        ],
        GrammarConcept::General => Vec::new(),
    };

    let mut options: Vec<String> = vec![answer.to_string()];
    for candidate in candidates {
        if options.len() >= 4 {
            break;
        }
        if candidate.eq_ignore_ascii_case(answer) {
            continue;
        }
        if is_alpha_token(&candidate)
            && !options.iter().any(|o| o.eq_ignore_ascii_case(&candidate))
        {
            options.push(candidate);
        }
    }

    if options.len() < 4 {
        return build_options(answer, student_error, neighbors, rng);
    }

    options.truncate(4);
    options.shuffle(rng);
    let correct_index = options
        .iter()
        .position(|o| o == answer)
        .unwrap_or_default();
    (options, correct_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_morphology() {
        assert_eq!(to_ing("make"), "making");
        assert_eq!(to_ing("go"), "going");
        assert_eq!(to_past("study"), "studied");
        assert_eq!(to_past("play"), "played");
        assert_eq!(to_past("like"), "liked");
        assert_eq!(pluralize("city"), "cities");
        assert_eq!(pluralize("watch"), "watches");
        assert_eq!(pluralize("book"), "books");
    }

    #[test]
    fn test_build_options_distinct_and_contains_answer() {
        let mut rng = StdRng::seed_from_u64(7);
        let neighbors = vec!["window".to_string(), "morning".to_string()];
        let (options, correct_index) =
            build_options("camera", Some("cemera"), &neighbors, &mut rng);

        assert_eq!(options.len(), 4);
        assert_eq!(options[correct_index], "camera");
        let mut folded: Vec<String> = options.iter().map(|o| o.to_lowercase()).collect();
        folded.sort();
        folded.dedup();
        assert_eq!(folded.len(), 4);
        assert!(options.iter().any(|o| o == "cemera"));
    }

    #[test]
    fn test_build_options_is_deterministic_per_seed() {
        let neighbors = vec!["window".to_string()];
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(
            build_options("answer", None, &neighbors, &mut a),
            build_options("answer", None, &neighbors, &mut b)
        );
    }

    #[test]
    fn test_grammar_options_third_person() {
        let mut rng = StdRng::seed_from_u64(1);
        let (options, correct_index) =
            build_grammar_options("goes", GrammarConcept::ThirdPerson, None, &[], &mut rng);
        assert_eq!(options.len(), 4);
        assert_eq!(options[correct_index], "goes");
        assert!(options.iter().any(|o| o == "go"));
    }
}
