mod types;

pub use types::{
    Agency, AgencyCategory, Chapter, ChapterType, LessonAnswer, LessonAnswerOption, LessonQuestion,
    Response, StateSnapshot, StoryChoice,
};

use crate::error::StateReconstructionWarning;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::Mutex;

/// A deferred unit of background work created at choice-time but not started
/// until streaming of the current chapter has finished.
///
/// Boxing the future is the usual shape for a trait object that needs to
/// carry an async closure.
pub type DeferredTask =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// A handle to a background task spawned via `tokio::spawn`, tracked so that
/// `reveal_summary` can await every one of them before persisting the final state.
pub type PendingTaskHandle = tokio::task::JoinHandle<()>;

/// The single source of truth for one adventure.
///
/// All mutation that touches `chapter_summaries`, `summary_chapter_titles`,
/// `character_visuals`, or `pending_summary_tasks` must happen while holding
/// `summary_lock`. The lock lives on the struct itself rather than behind a
/// module-level singleton, so two concurrent adventures never contend with
/// each other's critical sections.
pub struct AdventureState {
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

    /// Background task join handles awaited at `reveal_summary`.
    pub pending_summary_tasks: Vec<PendingTaskHandle>,

    /// Guards every field listed above. `tokio::sync::Mutex` rather than `std`
    /// because critical sections span `.await` points (LLM calls).
    pub summary_lock: Mutex<()>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Metadata {
    pub agency: Option<Agency>,
    pub non_random_elements: HashMap<String, serde_json::Value>,
    pub reflect_challenge_history: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    pub client_uuid: String,
}

fn default_difficulty() -> String {
    "Reasonably Challenging".to_string()
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NarrativeElements {
    #[serde(default)]
    pub settings: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub plot_twists: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SensoryDetails {
    #[serde(default)]
    pub visuals: Vec<String>,
    #[serde(default)]
    pub sounds: Vec<String>,
    #[serde(default)]
    pub smells: Vec<String>,
}

/// User-facing statistics, derived on demand from state — never stored
/// redundantly.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Statistics {
    pub chapters_completed: usize,
    pub questions_answered: usize,
    pub correct_answers: usize,
}

impl AdventureState {
    pub fn new(
        story_length: usize,
        planned_chapter_types: Vec<ChapterType>,
        client_uuid: String,
        protagonist_description: String,
        selected_narrative_elements: NarrativeElements,
        selected_sensory_details: SensoryDetails,
    ) -> Self {
        AdventureState {
            story_length,
            planned_chapter_types,
            chapters: Vec::new(),
            chapter_summaries: Vec::new(),
            summary_chapter_titles: Vec::new(),
            metadata: Metadata {
                agency: None,
                non_random_elements: HashMap::new(),
                reflect_challenge_history: Vec::new(),
                difficulty: default_difficulty(),
                client_uuid,
            },
            selected_narrative_elements,
            selected_sensory_details,
            protagonist_description,
            character_visuals: HashMap::new(),
            pending_summary_tasks: Vec::new(),
            summary_lock: Mutex::new(()),
        }
    }

    /// Number of chapters the client should ever see, excluding any internal
    /// SUMMARY bookkeeping.
    pub fn visible_chapter_count(&self) -> usize {
        self.story_length.min(self.chapters.len())
    }

    /// Append a fully-streamed chapter. Caller must hold `summary_lock`.
    pub fn append_chapter(&mut self, chapter: Chapter) {
        debug_assert!(self.chapters.len() < self.story_length, "chapters must never exceed story_length");
        self.chapters.push(chapter);
    }

    /// Record a user's response against the most recent (in-flight) chapter.
    pub fn record_response(&mut self, response: Response) -> crate::error::Result<(), StateReconstructionWarning> {
        match self.chapters.last_mut() {
            Some(chapter) => {
                chapter.response = Some(response);
                Ok(())
            }
            None => Err(StateReconstructionWarning(
                "record_response called with no chapters present".to_string(),
            )),
        }
    }

    /// Append a chapter summary/title pair. Caller must hold `summary_lock`.
    pub fn add_summary(&mut self, title: String, text: String) {
        self.summary_chapter_titles.push(title);
        self.chapter_summaries.push(text);
    }

    /// Merge newly-extracted character visuals. Caller must hold `summary_lock`.
    /// Returns classification labels (`new`/`updated`/`unchanged`) for logging.
    pub fn update_character_visuals(&mut self, delta: HashMap<String, String>) -> Vec<(String, &'static str)> {
        let mut classifications = Vec::with_capacity(delta.len());
        for (name, visual) in delta {
            match self.character_visuals.get(&name) {
                None => {
                    classifications.push((name.clone(), "new"));
                    self.character_visuals.insert(name, visual);
                }
                Some(existing) if existing != &visual => {
                    classifications.push((name.clone(), "updated"));
                    self.character_visuals.insert(name, visual);
                }
                Some(_) => classifications.push((name, "unchanged")),
            }
        }
        classifications
    }

    /// Commit the agency chosen in chapter 1. Invariant 5: set exactly once.
    pub fn commit_agency(&mut self, agency: Agency) {
        if self.metadata.agency.is_none() {
            self.metadata.agency = Some(agency);
        }
    }

    pub fn statistics(&self) -> Statistics {
        let mut questions_answered = 0;
        let mut correct_answers = 0;
        for chapter in &self.chapters {
            if let Some(Response::Lesson(LessonAnswer { is_correct, .. })) = &chapter.response {
                questions_answered += 1;
                if *is_correct {
                    correct_answers += 1;
                }
            }
        }
        Statistics {
            chapters_completed: self.visible_chapter_count(),
            questions_answered,
            correct_answers,
        }
    }

    /// Deep, serializable view of the state.
    /// Does not require `summary_lock` to be held by the caller in the generic
    /// case, but callers wanting a point-in-time consistent view (e.g. before
    /// persisting) should acquire it briefly first.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            story_length: self.story_length,
            planned_chapter_types: self.planned_chapter_types.clone(),
            chapters: self.chapters.clone(),
            chapter_summaries: self.chapter_summaries.clone(),
            summary_chapter_titles: self.summary_chapter_titles.clone(),
            metadata: self.metadata.clone(),
            selected_narrative_elements: self.selected_narrative_elements.clone(),
            selected_sensory_details: self.selected_sensory_details.clone(),
            protagonist_description: self.protagonist_description.clone(),
            character_visuals: self.character_visuals.clone(),
        }
    }

    /// Rebuild state from a persisted snapshot. Strictly read-only with
    /// respect to external systems: no LLM calls, no storage writes.
    /// Canonicalizes chapter-type casing and coerces the final chapter to
    /// CONCLUSION regardless of what was stored, per the counting rule.
    pub fn reconstruct(mut snapshot: StateSnapshot) -> (Self, Vec<StateReconstructionWarning>) {
        let mut warnings = Vec::new();

        for chapter_type in snapshot.planned_chapter_types.iter_mut() {
            chapter_type.canonicalize();
        }
        for chapter in snapshot.chapters.iter_mut() {
            chapter.chapter_type.canonicalize();
            if chapter.chapter_number == snapshot.story_length
                && chapter.chapter_type != ChapterType::Conclusion
            {
                warnings.push(StateReconstructionWarning(format!(
                    "chapter {} disagreed with CONCLUSION coercion at final position",
                    chapter.chapter_number
                )));
                chapter.chapter_type = ChapterType::Conclusion;
            }
        }

        if snapshot.metadata.difficulty.trim().is_empty() {
            snapshot.metadata.difficulty = default_difficulty();
        }

        let state = AdventureState {
            story_length: snapshot.story_length,
            planned_chapter_types: snapshot.planned_chapter_types,
            chapters: snapshot.chapters,
            chapter_summaries: snapshot.chapter_summaries,
            summary_chapter_titles: snapshot.summary_chapter_titles,
            metadata: snapshot.metadata,
            selected_narrative_elements: snapshot.selected_narrative_elements,
            selected_sensory_details: snapshot.selected_sensory_details,
            protagonist_description: snapshot.protagonist_description,
            character_visuals: snapshot.character_visuals,
            pending_summary_tasks: Vec::new(),
            summary_lock: Mutex::new(()),
        };

        (state, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> AdventureState {
        AdventureState::new(
            10,
            vec![ChapterType::Story; 10],
            "client-1".to_string(),
            "a weary traveler in a patched cloak".to_string(),
            NarrativeElements::default(),
            SensoryDetails::default(),
        )
    }

    #[test]
    fn visible_chapter_count_excludes_nothing_beyond_story_length() {
        let mut state = sample_state();
        for n in 1..=10 {
            state.append_chapter(Chapter {
                chapter_number: n,
                chapter_type: ChapterType::Story,
                content: String::new(),
                question: None,
                response: None,
                chosen_path: None,
            });
        }
        assert_eq!(state.visible_chapter_count(), 10);
    }

    #[test]
    fn commit_agency_is_idempotent() {
        let mut state = sample_state();
        let first = Agency {
            category: AgencyCategory::Ability,
            name: "Dream Walker".to_string(),
            visual_details: "ethereal blue cloak".to_string(),
            choice_text: "As a Dream Walker".to_string(),
        };
        let second = Agency {
            category: AgencyCategory::Artifact,
            name: "Should Not Apply".to_string(),
            visual_details: String::new(),
            choice_text: String::new(),
        };
        state.commit_agency(first.clone());
        state.commit_agency(second);
        assert_eq!(state.metadata.agency, Some(first));
    }

    #[test]
    fn update_character_visuals_classifies_new_updated_unchanged() {
        let mut state = sample_state();
        let mut delta = HashMap::new();
        delta.insert("Protagonist".to_string(), "cloak, green eyes".to_string());
        let first_pass = state.update_character_visuals(delta);
        assert_eq!(first_pass, vec![("Protagonist".to_string(), "new")]);

        let mut delta2 = HashMap::new();
        delta2.insert("Protagonist".to_string(), "cloak, green eyes".to_string());
        let second_pass = state.update_character_visuals(delta2);
        assert_eq!(second_pass, vec![("Protagonist".to_string(), "unchanged")]);

        let mut delta3 = HashMap::new();
        delta3.insert("Protagonist".to_string(), "torn cloak, green eyes".to_string());
        let third_pass = state.update_character_visuals(delta3);
        assert_eq!(third_pass, vec![("Protagonist".to_string(), "updated")]);
    }

    #[test]
    fn reconstruct_coerces_final_chapter_to_conclusion() {
        let mut snapshot = StateSnapshot {
            story_length: 10,
            planned_chapter_types: vec![ChapterType::Story; 10],
            chapters: vec![Chapter {
                chapter_number: 10,
                chapter_type: ChapterType::Story,
                content: "the end".to_string(),
                question: None,
                response: None,
                chosen_path: None,
            }],
            chapter_summaries: Vec::new(),
            summary_chapter_titles: Vec::new(),
            metadata: Metadata {
                agency: None,
                non_random_elements: HashMap::new(),
                reflect_challenge_history: Vec::new(),
                difficulty: "".to_string(),
                client_uuid: "client-1".to_string(),
            },
            selected_narrative_elements: NarrativeElements::default(),
            selected_sensory_details: SensoryDetails::default(),
            protagonist_description: String::new(),
            character_visuals: HashMap::new(),
        };
        snapshot.metadata.difficulty = String::new();
        let (state, warnings) = AdventureState::reconstruct(snapshot);
        assert_eq!(state.chapters[0].chapter_type, ChapterType::Conclusion);
        assert_eq!(state.metadata.difficulty, default_difficulty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn statistics_counts_only_lesson_responses() {
        let mut state = sample_state();
        state.append_chapter(Chapter {
            chapter_number: 1,
            chapter_type: ChapterType::Lesson,
            content: String::new(),
            question: None,
            response: Some(Response::Lesson(LessonAnswer {
                chosen_answer_text: "42".to_string(),
                is_correct: true,
            })),
            chosen_path: None,
        });
        state.append_chapter(Chapter {
            chapter_number: 2,
            chapter_type: ChapterType::Story,
            content: String::new(),
            question: None,
            response: Some(Response::Story(crate::state::types::StoryChoice {
                chosen_path: "A".to_string(),
                choice_text: "Go left".to_string(),
            })),
            chosen_path: Some("A".to_string()),
        });
        let stats = state.statistics();
        assert_eq!(stats.questions_answered, 1);
        assert_eq!(stats.correct_answers, 1);
    }
}
