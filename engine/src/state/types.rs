use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Metadata, NarrativeElements, SensoryDetails};

/// One of the four chapter archetypes the planner sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterType {
    Story,
    Lesson,
    Reflect,
    Conclusion,
}

impl ChapterType {
    /// Canonical lowercased string form used for comparisons and storage
    /// (invariant 6).
    pub fn as_canonical_str(&self) -> &'static str {
        match self {
            ChapterType::Story => "story",
            ChapterType::Lesson => "lesson",
            ChapterType::Reflect => "reflect",
            ChapterType::Conclusion => "conclusion",
        }
    }

    /// Parse from an arbitrarily-cased string, defaulting to `Story` if the
    /// value is unrecognized. Used during reconstruction to tolerate stored
    /// data from before a casing convention was settled.
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "lesson" => ChapterType::Lesson,
            "reflect" => ChapterType::Reflect,
            "conclusion" => ChapterType::Conclusion,
            _ => ChapterType::Story,
        }
    }

    /// Normalizes in place; a no-op for values already canonical, but cheap
    /// insurance during reconstruct() against stored mixed-case values.
    pub fn canonicalize(&mut self) {
        *self = Self::from_str_lossy(self.as_canonical_str());
    }
}

/// The four categories a first-chapter agency offer can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgencyCategory {
    Companion,
    Ability,
    Artifact,
    Profession,
}

impl AgencyCategory {
    /// Category-specific phrasing used when weaving agency into an image
    /// prompt.
    pub fn weave_phrase(&self) -> &'static str {
        match self {
            AgencyCategory::Companion => "accompanied by",
            AgencyCategory::Ability => "with the power of",
            AgencyCategory::Artifact => "wielding",
            AgencyCategory::Profession => "as a",
        }
    }
}

/// The first-chapter commitment that threads through the rest of the
/// adventure. Set exactly once (invariant 5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub category: AgencyCategory,
    pub name: String,
    pub visual_details: String,
    pub choice_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonQuestion {
    pub topic: String,
    pub question_text: String,
    pub answers: Vec<LessonAnswerOption>,
    pub explanation: String,
    pub difficulty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonAnswerOption {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryChoice {
    pub chosen_path: String,
    pub choice_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonAnswer {
    pub chosen_answer_text: String,
    pub is_correct: bool,
}

/// Tagged response variant recorded against a completed chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response_type", rename_all = "snake_case")]
pub enum Response {
    Story(StoryChoice),
    Lesson(LessonAnswer),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_number: usize,
    pub chapter_type: ChapterType,
    pub content: String,
    pub question: Option<LessonQuestion>,
    pub response: Option<Response>,
    pub chosen_path: Option<String>,
}

/// Deep, serializable view of `AdventureState`, used both for `snapshot()`
/// and as the persisted shape handed to the State Store Adapter. Does not carry `pending_summary_tasks` or `summary_lock`: those are
/// process-local concerns, not durable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub story_length: usize,
    pub planned_chapter_types: Vec<ChapterType>,
    pub chapters: Vec<Chapter>,
    pub chapter_summaries: Vec<String>,
    pub summary_chapter_titles: Vec<String>,
    pub metadata: Metadata,
    pub selected_narrative_elements: NarrativeElements,
    pub selected_sensory_details: SensoryDetails,
    pub protagonist_description: String,
    pub character_visuals: HashMap<String, String>,
}
