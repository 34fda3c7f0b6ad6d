//! Curated lesson question bank, loaded from a CSV file at init time.
//! Read-only; no mutation at runtime.

use crate::state::{LessonAnswerOption, LessonQuestion};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, serde::Deserialize)]
struct LessonRow {
    topic: String,
    question_text: String,
    answer_1: String,
    answer_1_correct: bool,
    answer_2: String,
    answer_2_correct: bool,
    answer_3: String,
    answer_3_correct: bool,
    explanation: String,
    #[serde(default = "default_difficulty")]
    difficulty: String,
}

fn default_difficulty() -> String {
    "Reasonably Challenging".to_string()
}

pub struct LessonBank {
    by_topic: HashMap<String, Vec<LessonQuestion>>,
}

impl LessonBank {
    /// Parse a CSV file with quoted-field support into a topic-indexed bank.
    pub fn load_from_csv(path: &Path) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let mut by_topic: HashMap<String, Vec<LessonQuestion>> = HashMap::new();

        for record in reader.deserialize() {
            let row: LessonRow = record?;
            let question = LessonQuestion {
                topic: row.topic.clone(),
                question_text: row.question_text,
                answers: vec![
                    LessonAnswerOption { text: row.answer_1, is_correct: row.answer_1_correct },
                    LessonAnswerOption { text: row.answer_2, is_correct: row.answer_2_correct },
                    LessonAnswerOption { text: row.answer_3, is_correct: row.answer_3_correct },
                ],
                explanation: row.explanation,
                difficulty: row.difficulty,
            };
            by_topic.entry(normalize_topic(&row.topic)).or_default().push(question);
        }

        Ok(LessonBank { by_topic })
    }

    /// Case-insensitive, whitespace-tolerant topic match with a partial-match
    /// fallback.
    pub fn questions_for_topic(&self, topic: &str) -> Vec<LessonQuestion> {
        let normalized = normalize_topic(topic);
        if let Some(exact) = self.by_topic.get(&normalized) {
            return exact.clone();
        }
        self.by_topic
            .iter()
            .filter(|(key, _)| key.contains(&normalized) || normalized.contains(key.as_str()))
            .flat_map(|(_, questions)| questions.clone())
            .collect()
    }

    pub fn available_count_for_topic(&self, topic: &str) -> usize {
        self.questions_for_topic(topic).len()
    }
}

fn normalize_topic(topic: &str) -> String {
    topic.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bank() -> LessonBank {
        let mut by_topic = HashMap::new();
        by_topic.insert(
            "fractions".to_string(),
            vec![LessonQuestion {
                topic: "Fractions".to_string(),
                question_text: "What is one half of one half?".to_string(),
                answers: vec![
                    LessonAnswerOption { text: "One quarter".to_string(), is_correct: true },
                    LessonAnswerOption { text: "One third".to_string(), is_correct: false },
                    LessonAnswerOption { text: "One half".to_string(), is_correct: false },
                ],
                explanation: "Multiplying 1/2 by 1/2 gives 1/4.".to_string(),
                difficulty: "easy".to_string(),
            }],
        );
        LessonBank { by_topic }
    }

    #[test]
    fn topic_match_is_case_and_whitespace_tolerant() {
        let bank = sample_bank();
        assert_eq!(bank.questions_for_topic("  Fractions  ").len(), 1);
        assert_eq!(bank.questions_for_topic("FRACTIONS").len(), 1);
    }

    #[test]
    fn partial_match_fallback_finds_substring_topics() {
        let bank = sample_bank();
        assert_eq!(bank.questions_for_topic("fraction").len(), 1);
    }

    #[test]
    fn unknown_topic_returns_empty() {
        let bank = sample_bank();
        assert_eq!(bank.questions_for_topic("astrophysics").len(), 0);
    }
}
