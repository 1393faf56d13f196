//! Mistake extraction from teacher-correction patterns
//!
//! Speakers are parsed line by line; the first label seen becomes the
//! Teacher, the second the Student. Corrections come from explicit pair
//! patterns ("don't say X, say Y") and from "it should be X" forms, which
//! attach to the student's most recent utterance.

use lessonpipe_common::models::Difficulty;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

const MAX_MISTAKES: usize = 15;
const MAX_TEXT_LEN: usize = 180;

/// Classification of what went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MistakeKind {
    Grammar,
    Vocabulary,
    Spelling,
    Unknown,
}

impl MistakeKind {
    pub fn rule(&self, detail: GrammarDetail) -> Option<String> {
        match (self, detail) {
            (MistakeKind::Grammar, GrammarDetail::VerbTense) => {
                Some("Use the correct verb tense (present/past).".to_string())
            }
            (MistakeKind::Grammar, GrammarDetail::Article) => {
                Some("Use articles (a/an/the) correctly.".to_string())
            }
            (MistakeKind::Grammar, GrammarDetail::Plural) => {
                Some("Use the plural form when needed.".to_string())
            }
            (MistakeKind::Grammar, GrammarDetail::Preposition) => {
                Some("Use correct prepositions.".to_string())
            }
            (MistakeKind::Grammar, GrammarDetail::None) => {
                Some("Follow standard grammar rules.".to_string())
            }
            (MistakeKind::Spelling, _) => Some("Check the spelling.".to_string()),
            _ => None,
        }
    }
}

/// Finer-grained grammar point, used to pick option sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarDetail {
    VerbTense,
    Article,
    Plural,
    Preposition,
    None,
}

/// One observed correction
#[derive(Debug, Clone)]
pub struct Mistake {
    pub incorrect: String,
    pub correct: String,
    pub kind: MistakeKind,
    pub rule: Option<String>,
    /// Teacher utterance the correction was found in
    pub context: String,
    pub difficulty: Difficulty,
    /// Token-overlap similarity between the two forms, 0.3..=1.0
    pub confidence: f64,
}

impl Mistake {
    /// Grammar detail re-derived from the pair, for the grammar generator
    pub fn grammar_detail(&self) -> GrammarDetail {
        classify(&self.incorrect, &self.correct).1
    }
}

static PAIR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)(?:don't say|not)\s+['"](.+?)['"]\s*,?\s*(?:say|use)\s+['"](.+?)['"]"#)
            .unwrap(),
        Regex::new(r#"(?i)instead of\s+['"](.+?)['"]\s*,?\s*(?:use|say)\s+['"](.+?)['"]"#).unwrap(),
        Regex::new(r#"(?i)['"](.+?)['"]\s+should be\s+['"](.+?)['"]"#).unwrap(),
    ]
});

static CORRECTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)(?:it )?should be\s+['"](.+?)['"]"#).unwrap(),
        Regex::new(r"(?i)(?:correct|correction)\s*[:]\s*(.+?)(?:[.!?]|$)").unwrap(),
    ]
});

static SPEAKER_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^:]{1,40}):\s*(.*)$").unwrap());
static SMART_QUOTES: Lazy<Regex> = Lazy::new(|| Regex::new("[\u{2018}\u{2019}\u{201c}\u{201d}]").unwrap());
static VERB_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(go|goes|went|going|eat|ate|eats|play|plays|played|playing|speak|spoke|speaks)\b").unwrap());
static ARTICLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(a|an|the)\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Teacher,
    Student,
    Unknown,
}

fn clean_fragment(s: &str) -> String {
    let s = SMART_QUOTES.replace_all(s, "");
    let s = s.trim().trim_matches([' ', '.', ',', ':', ';', '!', '?', '(', ')', '[', ']', '"', '\'']);
    let out = s.split_whitespace().collect::<Vec<_>>().join(" ");
    out.chars().take(MAX_TEXT_LEN).collect()
}

fn phrase_difficulty(text: &str) -> Difficulty {
    match text.split_whitespace().count() {
        0..=2 => Difficulty::Beginner,
        3..=5 => Difficulty::Intermediate,
        _ => Difficulty::Advanced,
    }
}

fn overlap_confidence(incorrect: &str, correct: &str) -> f64 {
    if incorrect.is_empty() || correct.is_empty() {
        return 0.3;
    }
    let inc: HashSet<String> = incorrect.to_lowercase().split_whitespace().map(String::from).collect();
    let cor: HashSet<String> = correct.to_lowercase().split_whitespace().map(String::from).collect();
    let shared = inc.intersection(&cor).count() as f64;
    let total = inc.len().max(cor.len()).max(1) as f64;
    (shared / total + 0.2).clamp(0.3, 1.0)
}

/// Looks like a one-slip typo: single tokens at edit distance one or a
/// single transposition.
fn is_near_miss(incorrect: &str, correct: &str) -> bool {
    if incorrect.contains(' ') || correct.contains(' ') {
        return false;
    }
    let a: Vec<char> = incorrect.to_lowercase().chars().collect();
    let b: Vec<char> = correct.to_lowercase().chars().collect();
    if a.len().abs_diff(b.len()) > 1 {
        return false;
    }
    if a.len() == b.len() {
        let diffs: Vec<usize> = (0..a.len()).filter(|&i| a[i] != b[i]).collect();
        match diffs.len() {
            1 => true,
            2 => diffs[1] == diffs[0] + 1 && a[diffs[0]] == b[diffs[1]] && a[diffs[1]] == b[diffs[0]],
            _ => false,
        }
    } else {
        let (short, long) = if a.len() < b.len() { (&a, &b) } else { (&b, &a) };
        let mut i = 0;
        let mut j = 0;
        let mut skipped = false;
        while i < short.len() && j < long.len() {
            if short[i] == long[j] {
                i += 1;
                j += 1;
            } else if skipped {
                return false;
            } else {
                skipped = true;
                j += 1;
            }
        }
        true
    }
}

fn classify(incorrect: &str, correct: &str) -> (MistakeKind, GrammarDetail) {
    let joined = format!("{incorrect} {correct}");

    if VERB_MARKERS.is_match(&joined) {
        return (MistakeKind::Grammar, GrammarDetail::VerbTense);
    }
    if ARTICLE.is_match(incorrect) != ARTICLE.is_match(correct) {
        return (MistakeKind::Grammar, GrammarDetail::Article);
    }
    if incorrect.ends_with('s') != correct.ends_with('s') && is_near_miss(incorrect, correct) {
        return (MistakeKind::Grammar, GrammarDetail::Plural);
    }
    if correct.contains("to ") && !incorrect.contains("to ") {
        return (MistakeKind::Grammar, GrammarDetail::Preposition);
    }
    if is_near_miss(incorrect, correct) {
        return (MistakeKind::Spelling, GrammarDetail::None);
    }
    if !incorrect.contains(' ') && !correct.contains(' ') {
        return (MistakeKind::Vocabulary, GrammarDetail::None);
    }
    (MistakeKind::Unknown, GrammarDetail::None)
}

pub struct MistakeExtractor;

impl MistakeExtractor {
    pub fn extract(transcript: &str) -> Vec<Mistake> {
        let utterances = parse_utterances(transcript);

        let mut mistakes = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut last_student = String::new();

        for (role, content) in &utterances {
            match role {
                Role::Student => {
                    last_student = content.clone();
                    continue;
                }
                Role::Unknown => continue,
                Role::Teacher => {}
            }

            for pattern in PAIR_PATTERNS.iter() {
                for capture in pattern.captures_iter(content) {
                    let incorrect = clean_fragment(&capture[1]);
                    let correct = clean_fragment(&capture[2]);
                    push_mistake(&mut mistakes, &mut seen, incorrect, correct, content);
                    if mistakes.len() >= MAX_MISTAKES {
                        return mistakes;
                    }
                }
            }

            for pattern in CORRECTION_PATTERNS.iter() {
                for capture in pattern.captures_iter(content) {
                    let correct = clean_fragment(&capture[1]);
                    let incorrect = clean_fragment(&last_student);
                    push_mistake(&mut mistakes, &mut seen, incorrect, correct, content);
                    if mistakes.len() >= MAX_MISTAKES {
                        return mistakes;
                    }
                }
            }
        }

        mistakes
    }
}

fn parse_utterances(transcript: &str) -> Vec<(Role, String)> {
    let mut roles: HashMap<String, Role> = HashMap::new();
    let mut teacher_seen = false;
    let mut student_seen = false;
    let mut last_role = Role::Unknown;
    let mut utterances: Vec<(Role, String)> = Vec::new();

    for line in transcript.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(capture) = SPEAKER_LINE.captures(line) {
            let label = capture[1].to_lowercase();
            let content = capture[2].to_string();
            let role = *roles.entry(label).or_insert_with(|| {
                if !teacher_seen {
                    teacher_seen = true;
                    Role::Teacher
                } else if !student_seen {
                    student_seen = true;
                    Role::Student
                } else {
                    last_role
                }
            });
            last_role = role;
            utterances.push((role, content));
        } else if let Some((role, content)) = utterances.last_mut() {
            // Continuation line: merge with the previous utterance
            let _ = role;
            content.push(' ');
            content.push_str(line);
        } else {
            utterances.push((Role::Unknown, line.to_string()));
        }
    }

    utterances
}

fn push_mistake(
    mistakes: &mut Vec<Mistake>,
    seen: &mut HashSet<(String, String)>,
    incorrect: String,
    correct: String,
    context: &str,
) {
    if incorrect.is_empty() || correct.is_empty() {
        return;
    }
    if incorrect.eq_ignore_ascii_case(&correct) {
        return;
    }
    let key = (incorrect.to_lowercase(), correct.to_lowercase());
    if !seen.insert(key) {
        return;
    }

    let (kind, detail) = classify(&incorrect, &correct);
    let context_snippet: String = context.chars().take(120).collect();

    mistakes.push(Mistake {
        confidence: (overlap_confidence(&incorrect, &correct) * 100.0).round() / 100.0,
        difficulty: phrase_difficulty(&correct),
        rule: kind.rule(detail),
        kind,
        incorrect,
        correct,
        context: context_snippet,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_pattern_extraction() {
        let transcript = "\
Teacher: Good morning, how are you?
Sara: I am fine teacher.
Teacher: Don't say 'I goed home', say 'I went home'.";
        let mistakes = MistakeExtractor::extract(transcript);
        assert_eq!(mistakes.len(), 1);
        assert_eq!(mistakes[0].incorrect, "I goed home");
        assert_eq!(mistakes[0].correct, "I went home");
        assert_eq!(mistakes[0].kind, MistakeKind::Grammar);
        assert!(mistakes[0].rule.is_some());
    }

    #[test]
    fn test_should_be_attaches_to_last_student_utterance() {
        let transcript = "\
Teacher: Tell me about your morning.
Omar: She go to school.
Teacher: Almost. It should be 'she goes to school'.";
        let mistakes = MistakeExtractor::extract(transcript);
        assert_eq!(mistakes.len(), 1);
        assert_eq!(mistakes[0].incorrect, "She go to school");
        assert_eq!(mistakes[0].correct, "she goes to school");
    }

    #[test]
    fn test_student_lines_never_produce_corrections() {
        let transcript = "\
Teacher: Let us begin.
Maya: My friend said 'hello', say 'goodbye' is hard.";
        let mistakes = MistakeExtractor::extract(transcript);
        assert!(mistakes.is_empty());
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let transcript = "\
Teacher: Not 'speaked', say 'spoke'. Again: not 'speaked', say 'spoke'.
Lina: Spoke.";
        let mistakes = MistakeExtractor::extract(transcript);
        assert_eq!(mistakes.len(), 1);
    }

    #[test]
    fn test_spelling_near_miss_classification() {
        let (kind, _) = classify("recieve", "receive");
        assert_eq!(kind, MistakeKind::Spelling);

        let (kind, _) = classify("big", "large");
        assert_eq!(kind, MistakeKind::Vocabulary);
    }

    #[test]
    fn test_confidence_reflects_overlap() {
        let high = overlap_confidence("she go to school", "she goes to school");
        let low = overlap_confidence("completely different", "another phrase entirely");
        assert!(high > low);
    }
}
