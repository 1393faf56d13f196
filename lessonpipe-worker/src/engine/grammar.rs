//! Grammar multiple-choice generation
//!
//! Questions are seeded from mistake pairs so the correct option is the
//! teacher's form and a wrong option is the student's. The template bank
//! backfills when the lesson produced too few usable mistakes; it is also
//! the relaxed second pass.

use crate::engine::mistakes::{GrammarDetail, Mistake};
use crate::engine::normalize;
use crate::engine::options::{self, GrammarConcept};
use lessonpipe_common::models::GrammarItem;
use rand::rngs::StdRng;
use std::collections::HashSet;

/// Upper bound of the grammar target window
pub const MAX_GRAMMAR: usize = 10;

/// (prompt-with-blank, answer, concept)
const TEMPLATES: &[(&str, &str, GrammarConcept)] = &[
    ("She _____ to school every day.", "goes", GrammarConcept::ThirdPerson),
    ("They _____ the book every week.", "read", GrammarConcept::General),
    ("I _____ an apple for breakfast.", "eat", GrammarConcept::General),
    ("He is _____ doctor.", "a", GrammarConcept::Article),
    ("We walked _____ the station together.", "to", GrammarConcept::Preposition),
    ("The children _____ in the garden now.", "play", GrammarConcept::General),
];

fn concept_for(detail: GrammarDetail) -> GrammarConcept {
    match detail {
        GrammarDetail::VerbTense | GrammarDetail::Plural => GrammarConcept::ThirdPerson,
        GrammarDetail::Article => GrammarConcept::Article,
        GrammarDetail::Preposition => GrammarConcept::Preposition,
        GrammarDetail::None => GrammarConcept::General,
    }
}

/// Build a prompt containing exactly one blank for the target token. When
/// the mistake has usable context the prompt comes from it; otherwise the
/// correct phrase itself is blanked.
fn prompt_for(mistake: &Mistake, target: &str) -> Option<String> {
    let context = normalize::clean_sentence(&mistake.context);
    if normalize::token_occurrences(&context, target) == 1
        && context.split_whitespace().count() >= 4
    {
        return blank_in(&context, target);
    }
    let phrase = normalize::clean_sentence(&mistake.correct);
    if normalize::token_occurrences(&phrase, target) == 1
        && phrase.split_whitespace().count() >= 3
    {
        return blank_in(&phrase, target);
    }
    None
}

fn blank_in(sentence: &str, target: &str) -> Option<String> {
    let folded = target.to_lowercase();
    let mut replaced = None;
    let mut out = Vec::new();
    for token in sentence.split_whitespace() {
        let bare: String = token
            .chars()
            .filter(|c| c.is_ascii_alphabetic() || *c == '\'')
            .collect();
        if replaced.is_none() && bare.to_lowercase() == folded {
            out.push(token.replace(&bare, "_____"));
            replaced = Some(());
        } else {
            out.push(token.to_string());
        }
    }
    replaced.map(|_| out.join(" "))
}

pub fn generate_grammar(
    mistakes: &[Mistake],
    neighbors: &[String],
    rng: &mut StdRng,
    relaxed: bool,
) -> Vec<GrammarItem> {
    let mut items = Vec::new();
    let mut used_answers: HashSet<String> = HashSet::new();

    for mistake in mistakes {
        if items.len() >= MAX_GRAMMAR {
            break;
        }
        // The first content token of the correction is the grammar point
        let Some(target) = normalize::word_tokens(&mistake.correct)
            .into_iter()
            .find(|w| w.len() >= 2)
        else {
            continue;
        };
        if !used_answers.insert(target.to_lowercase()) {
            continue;
        }
        let Some(prompt) = prompt_for(mistake, &target) else {
            continue;
        };

        let concept = concept_for(mistake.grammar_detail());
        let student_error = (!mistake.incorrect.contains(' '))
            .then_some(mistake.incorrect.as_str());
        let (choices, correct_index) =
            options::build_grammar_options(&target, concept, student_error, neighbors, rng);

        items.push(GrammarItem {
            prompt,
            options: choices,
            correct_index,
            explanation: mistake
                .rule
                .clone()
                .unwrap_or_else(|| format!("The correct form is {target}.")),
        });
    }

    if relaxed {
        for (prompt, answer, concept) in TEMPLATES {
            if items.len() >= MAX_GRAMMAR {
                break;
            }
            if !used_answers.insert(answer.to_lowercase()) {
                continue;
            }
            let (choices, correct_index) =
                options::build_grammar_options(answer, *concept, None, neighbors, rng);
            items.push(GrammarItem {
                prompt: prompt.to_string(),
                options: choices,
                correct_index,
                explanation: format!("The correct form is {answer}."),
            });
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mistakes::MistakeExtractor;
    use rand::SeedableRng;

    #[test]
    fn test_mistake_seeded_question_contains_both_forms() {
        let transcript = "\
Teacher: How was your weekend?
Omar: She go to school early.
Teacher: It should be 'she goes to school early'.";
        let mistakes = MistakeExtractor::extract(transcript);
        let mut rng = StdRng::seed_from_u64(3);
        let items = generate_grammar(&mistakes, &[], &mut rng, false);

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.prompt.matches("_____").count(), 1);
        assert_eq!(item.options.len(), 4);
        assert!(item.correct_index < item.options.len());
        // The correct option is the teacher's form
        assert_eq!(item.options[item.correct_index].to_lowercase(), "she");
    }

    #[test]
    fn test_relaxed_pass_backfills_from_templates() {
        let mut rng = StdRng::seed_from_u64(3);
        let items = generate_grammar(&[], &[], &mut rng, true);
        assert!(items.len() >= 3);
        for item in &items {
            assert_eq!(item.prompt.matches("_____").count(), 1);
            assert!(item.correct_index < item.options.len());
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            generate_grammar(&[], &[], &mut rng, true)
                .into_iter()
                .map(|i| (i.options, i.correct_index))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
    }
}
