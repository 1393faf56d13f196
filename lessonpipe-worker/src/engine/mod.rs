//! Exercise generation engine
//!
//! Converts a lesson transcript into the four-type exercise document with
//! a quality gate. The pipeline is deterministic for a fixed summary id
//! and fixed collaborator responses: the only randomness is option
//! shuffling, seeded from the summary id, and the LLM/translator seams are
//! capabilities that either answer or deterministically route to the
//! heuristic path.

pub mod cloze;
pub mod flashcards;
pub mod grammar;
pub mod llm;
pub mod mistakes;
pub mod normalize;
pub mod options;
pub mod quality;
pub mod sentence_builder;
pub mod sentences;
pub mod translate;
pub mod vocabulary;

use lessonpipe_common::config::EngineConfig;
use lessonpipe_common::models::{
    Difficulty, ExerciseCounts, ExerciseDocument, ExerciseMetadata, ExerciseSource,
    ExerciseSources,
};
use mistakes::{Mistake, MistakeExtractor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vocabulary::{VocabItem, VocabularyExtractor};

pub use llm::{ChatCompletionsModel, LanguageModel};
pub use translate::{HttpTranslator, Translator};
pub use vocabulary::word_difficulty;

/// Transcripts shorter than this are a data-validity fault, not engine input
pub const MIN_TRANSCRIPT_CHARS: usize = 100;

/// Identity of the lesson being processed, used for seeding and labeling
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub summary_id: i64,
    pub user_id: String,
    pub teacher_id: String,
    pub class_id: String,
    pub meeting_date: String,
}

/// The exercise generation engine. Construct once, call
/// [`ExerciseEngine::generate`] per transcript.
pub struct ExerciseEngine {
    quality_min: u32,
    language_model: Option<Arc<dyn LanguageModel>>,
    translator: Option<Arc<dyn Translator>>,
}

impl ExerciseEngine {
    pub fn new(
        quality_min: u32,
        language_model: Option<Arc<dyn LanguageModel>>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Self {
        Self {
            quality_min,
            language_model,
            translator,
        }
    }

    /// Wire up the production collaborators from configuration. An absent
    /// LLM key or target language disables that capability.
    pub fn from_config(config: &EngineConfig) -> Self {
        let language_model = ChatCompletionsModel::from_config(config)
            .map(|m| Arc::new(m) as Arc<dyn LanguageModel>);
        let translator = config
            .translation_target_language
            .as_deref()
            .and_then(HttpTranslator::new)
            .map(|t| Arc::new(t) as Arc<dyn Translator>);
        Self::new(config.quality_min, language_model, translator)
    }

    /// Run the full pipeline. Always returns a complete document, however
    /// thin the transcript; quality problems surface in the metadata.
    pub async fn generate(&self, transcript: &str, context: &EngineContext) -> ExerciseDocument {
        let mut rng = StdRng::seed_from_u64(context.summary_id as u64);

        // Stage 1: normalization
        let all_sentences = normalize::split_sentences(transcript);

        // Stage 4 feeds stage 2, so mistakes come first
        let mistake_list = MistakeExtractor::extract(transcript);

        // Stage 2: vocabulary, LLM preferred
        let (vocab, vocab_source) = self.vocabulary(transcript, &mistake_list).await;

        // Stage 3: teachable sentences, LLM preferred
        let (selected, sentence_source) = self.sentences(&all_sentences, &vocab).await;

        debug!(
            summary_id = context.summary_id,
            sentences = all_sentences.len(),
            selected = selected.len(),
            vocabulary = vocab.len(),
            mistakes = mistake_list.len(),
            "Extraction complete"
        );

        // Stage 6: construction
        let neighbors: Vec<String> = vocab.iter().map(|v| v.word.clone()).collect();
        let flashcards = flashcards::generate_flashcards(&vocab, &selected, &all_sentences);
        let cloze_items =
            cloze::generate_cloze(&mistake_list, &vocab, &all_sentences, &mut rng, false);
        let grammar_items = grammar::generate_grammar(&mistake_list, &neighbors, &mut rng, false);
        let sentence_items = sentence_builder::generate_sentence_items(&selected, false);

        // Stage 7: sanitization
        let mut sanitized =
            quality::sanitize(flashcards, cloze_items, grammar_items, sentence_items);
        let first_pass_dropped = sanitized.dropped;

        // Stage 8 (hard floor): a second pass with relaxed heuristics for
        // any type that came up short.
        if sanitized.flashcards.len() < quality::HARD_FLOOR {
            let relaxed_vocab = relaxed_vocabulary(transcript, &vocab);
            let refill =
                flashcards::generate_flashcards(&relaxed_vocab, &selected, &all_sentences);
            sanitized = resanitize_with(sanitized, |s| s.flashcards = refill);
        }
        if sanitized.cloze.len() < quality::HARD_FLOOR {
            let refill =
                cloze::generate_cloze(&mistake_list, &vocab, &all_sentences, &mut rng, true);
            sanitized = resanitize_with(sanitized, |s| s.cloze = refill);
        }
        if sanitized.grammar.len() < quality::HARD_FLOOR {
            let refill = grammar::generate_grammar(&mistake_list, &neighbors, &mut rng, true);
            sanitized = resanitize_with(sanitized, |s| s.grammar = refill);
        }
        if sanitized.sentence.len() < quality::HARD_FLOOR {
            let relaxed_selected =
                sentences::SentenceExtractor::extract(&all_sentences, &vocab, true);
            let refill = sentence_builder::generate_sentence_items(&relaxed_selected, true);
            sanitized = resanitize_with(sanitized, |s| s.sentence = refill);
        }

        // Stage 5: translation (after construction so only emitted items
        // cost a call)
        let mut flashcards = sanitized.flashcards;
        let mut sentence_items = sanitized.sentence;
        if let Some(translator) = &self.translator {
            for card in flashcards.iter_mut() {
                card.translation = translator.translate(&card.word).await;
            }
            for item in sentence_items.iter_mut() {
                item.translation = translator.translate(&item.english_sentence).await;
            }
        }
        let translation_coverage = if flashcards.is_empty() {
            0.0
        } else {
            flashcards.iter().filter(|c| c.translation.is_some()).count() as f64
                / flashcards.len() as f64
        };
        let translation_present =
            !flashcards.is_empty() && flashcards.iter().all(|c| c.translation.is_some());

        let counts = ExerciseCounts {
            flashcards: flashcards.len(),
            cloze: sanitized.cloze.len(),
            grammar: sanitized.grammar.len(),
            sentence: sentence_items.len(),
        };

        let mistake_derived_present = !mistake_list.is_empty()
            && (!sanitized.grammar.is_empty() || !sanitized.cloze.is_empty());
        let score = quality::quality_score(
            &counts,
            &quality::ScoreInputs {
                translation_coverage,
                mistake_derived_present,
                clean_sanitization: first_pass_dropped == 0,
            },
        );
        let quality_passed = score >= self.quality_min;

        if !quality_passed {
            warn!(
                summary_id = context.summary_id,
                score,
                quality_min = self.quality_min,
                "Exercise set below quality threshold, emitting anyway"
            );
        }

        info!(
            summary_id = context.summary_id,
            class_id = %context.class_id,
            flashcards = counts.flashcards,
            cloze = counts.cloze,
            grammar = counts.grammar,
            sentence = counts.sentence,
            score,
            "Exercise generation complete"
        );

        ExerciseDocument {
            flashcards,
            cloze: sanitized.cloze,
            grammar: sanitized.grammar,
            sentence: sentence_items,
            counts,
            metadata: ExerciseMetadata {
                quality_passed,
                quality_score: score,
                vocabulary_count: vocab.len(),
                sentences_count: selected.len(),
                translation_present,
                sources: ExerciseSources {
                    flashcards: vocab_source,
                    cloze: ExerciseSource::Heuristic,
                    grammar: ExerciseSource::Heuristic,
                    sentence: sentence_source,
                },
            },
        }
    }

    async fn vocabulary(
        &self,
        transcript: &str,
        mistake_list: &[Mistake],
    ) -> (Vec<VocabItem>, ExerciseSource) {
        if let Some(model) = &self.language_model {
            match model
                .extract_vocabulary(transcript, vocabulary::MAX_VOCAB_ITEMS)
                .await
            {
                Ok(suggestions) if !suggestions.is_empty() => {
                    let items = suggestions
                        .into_iter()
                        .map(|s| VocabItem {
                            difficulty: s
                                .difficulty
                                .as_deref()
                                .map(parse_difficulty)
                                .unwrap_or_else(|| word_difficulty(&s.word)),
                            word: s.word.trim().to_lowercase(),
                            definition: s.definition,
                            category: Some("llm".to_string()),
                            from_correction: false,
                        })
                        .collect();
                    return (items, ExerciseSource::Llm);
                }
                Ok(_) => {
                    warn!("LLM vocabulary extraction returned nothing, using heuristic");
                }
                Err(e) => {
                    warn!(error = %e, "LLM vocabulary extraction failed, using heuristic");
                }
            }
        }
        (
            VocabularyExtractor::extract(transcript, mistake_list),
            ExerciseSource::Heuristic,
        )
    }

    async fn sentences(
        &self,
        candidates: &[String],
        vocab: &[VocabItem],
    ) -> (Vec<String>, ExerciseSource) {
        if let Some(model) = &self.language_model {
            match model
                .select_sentences(candidates, sentences::MAX_SENTENCES)
                .await
            {
                Ok(selected) if !selected.is_empty() => {
                    return (selected, ExerciseSource::Llm);
                }
                Ok(_) => {
                    warn!("LLM sentence selection returned nothing, using heuristic");
                }
                Err(e) => {
                    warn!(error = %e, "LLM sentence selection failed, using heuristic");
                }
            }
        }
        (
            sentences::SentenceExtractor::extract(candidates, vocab, false),
            ExerciseSource::Heuristic,
        )
    }
}

fn parse_difficulty(s: &str) -> Difficulty {
    match s.to_lowercase().as_str() {
        "beginner" | "easy" => Difficulty::Beginner,
        "advanced" | "hard" => Difficulty::Advanced,
        _ => Difficulty::Intermediate,
    }
}

/// Relaxed vocabulary for the flashcard floor pass: any distinct content
/// token of three or more letters, transcript order.
fn relaxed_vocabulary(transcript: &str, existing: &[VocabItem]) -> Vec<VocabItem> {
    let mut items: Vec<VocabItem> = existing.to_vec();
    let mut seen: std::collections::HashSet<String> =
        existing.iter().map(|v| v.word.to_lowercase()).collect();
    for token in normalize::word_tokens(&normalize::normalize(transcript)) {
        if items.len() >= vocabulary::MAX_VOCAB_ITEMS {
            break;
        }
        let folded = token.to_lowercase();
        if folded.len() < 3 {
            continue;
        }
        if seen.insert(folded.clone()) {
            items.push(VocabItem {
                difficulty: word_difficulty(&folded),
                word: folded,
                definition: None,
                category: Some("content_word".to_string()),
                from_correction: false,
            });
        }
    }
    items
}

/// Swap one list inside a sanitized bundle and re-run the validators over
/// the result, keeping the original drop count for the quality score.
fn resanitize_with(
    sanitized: quality::Sanitized,
    apply: impl FnOnce(&mut quality::Sanitized),
) -> quality::Sanitized {
    let mut bundle = sanitized;
    let dropped = bundle.dropped;
    apply(&mut bundle);
    let mut redone = quality::sanitize(
        bundle.flashcards,
        bundle.cloze,
        bundle.grammar,
        bundle.sentence,
    );
    redone.dropped = dropped;
    redone
}
