//! Prompt Builder (C3): assembles the system and user prompts for each
//! chapter type and narrative phase, consuming the current `AdventureState`.

mod templates;

use crate::error::{PromptError, Result};
use crate::state::{AdventureState, Agency, ChapterType, LessonQuestion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Narrative phase a chapter falls into, by a fixed monotone partition of
/// `[1, story_length]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativePhase {
    Exposition,
    Rising,
    Trials,
    Climax,
    Return,
}

impl NarrativePhase {
    pub fn for_chapter(chapter_number: usize, story_length: usize) -> Self {
        let ratio = (chapter_number as f64 - 1.0) / story_length.max(1) as f64;
        match ratio {
            r if r < 0.2 => NarrativePhase::Exposition,
            r if r < 0.5 => NarrativePhase::Rising,
            r if r < 0.7 => NarrativePhase::Trials,
            r if r < 0.9 => NarrativePhase::Climax,
            _ => NarrativePhase::Return,
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            NarrativePhase::Exposition => templates::PHASE_GUIDANCE_EXPOSITION,
            NarrativePhase::Rising => templates::PHASE_GUIDANCE_RISING,
            NarrativePhase::Trials => templates::PHASE_GUIDANCE_TRIALS,
            NarrativePhase::Climax => templates::PHASE_GUIDANCE_CLIMAX,
            NarrativePhase::Return => templates::PHASE_GUIDANCE_RETURN,
        }
    }

    /// Plot-twist guidance is only emitted in Rising/Trials/Climax.
    fn wants_plot_twist_guidance(&self) -> bool {
        matches!(self, NarrativePhase::Rising | NarrativePhase::Trials | NarrativePhase::Climax)
    }
}

/// A fully assembled prompt pair ready to hand to the LLM Gateway.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Builds prompts for a specific adventure, holding only the read-only
/// context needed across chapters (topic string for Exposition phase
/// interpolation).
pub struct PromptBuilder {
    pub adventure_topic: String,
}

impl PromptBuilder {
    pub fn new(adventure_topic: String) -> Self {
        PromptBuilder { adventure_topic }
    }

    fn world_setting(&self, state: &AdventureState) -> String {
        state
            .selected_narrative_elements
            .settings
            .first()
            .cloned()
            .unwrap_or_else(|| "an uncharted realm".to_string())
    }

    fn themes(&self, state: &AdventureState) -> String {
        if state.selected_narrative_elements.themes.is_empty() {
            "courage, curiosity, and kindness".to_string()
        } else {
            state.selected_narrative_elements.themes.join(", ")
        }
    }

    fn phase_guidance(&self, phase: NarrativePhase) -> String {
        let base = phase.guidance().replace("{adventure_topic}", &self.adventure_topic);
        if phase.wants_plot_twist_guidance() {
            format!("{base} {}", templates::PLOT_TWIST_GUIDANCE)
        } else {
            base
        }
    }

    /// Build the prompt for the given chapter number and type. `seed_rng`
    /// drives the REFLECT challenge-template selection so it can be made
    /// deterministic by callers that seed it from the session. `question`
    /// is the LESSON question for this chapter, supplied by the caller
    /// (the planner picks it before the chapter is generated, so it can't be
    /// read back out of `state.chapters` — that chapter hasn't been
    /// appended yet); ignored for every other chapter type.
    pub fn build(
        &self,
        state: &AdventureState,
        chapter_number: usize,
        chapter_type: ChapterType,
        reflect_seed: u64,
        question: Option<&LessonQuestion>,
    ) -> Result<(Prompt, Option<String>)> {
        let phase = NarrativePhase::for_chapter(chapter_number, state.story_length);
        match chapter_type {
            ChapterType::Story => Ok((self.build_story(state, chapter_number, phase)?, None)),
            ChapterType::Lesson => {
                let question = question.ok_or(PromptError::MissingQuestion(chapter_number))?;
                Ok((self.build_lesson(state, question)?, None))
            }
            ChapterType::Reflect => self.build_reflect(state, chapter_number, reflect_seed),
            ChapterType::Conclusion => Ok((self.build_conclusion(state)?, None)),
        }
    }

    fn build_story(
        &self,
        state: &AdventureState,
        chapter_number: usize,
        phase: NarrativePhase,
    ) -> Result<Prompt> {
        let system = templates::story_system(
            &state.protagonist_description,
            &self.world_setting(state),
            &self.themes(state),
        );
        let mut user = templates::story_user(
            &self.phase_guidance(phase),
            if phase.wants_plot_twist_guidance() { templates::PLOT_TWIST_GUIDANCE } else { "" },
        );
        if chapter_number == 1 {
            user.push_str("\n\n");
            user.push_str(templates::first_chapter_agency_offer());
        }
        // A STORY chapter immediately following a LESSON (i.e. not diverted
        // through REFLECT) still needs to acknowledge the learning outcome.
        if let Some(prior) = state.chapters.last() {
            if prior.chapter_number == chapter_number - 1 && prior.chapter_type == ChapterType::Lesson {
                if let Ok(fragment) = self.consequence_fragment(state, prior.chapter_number) {
                    user.push_str("\n\n");
                    user.push_str(&fragment);
                }
            }
        }
        Ok(Prompt { system, user })
    }

    fn build_lesson(&self, state: &AdventureState, question: &LessonQuestion) -> Result<Prompt> {
        let system = templates::story_system(
            &state.protagonist_description,
            &self.world_setting(state),
            &self.themes(state),
        );
        let user = templates::lesson_user(&question.question_text, &question.topic);
        Ok(Prompt { system, user })
    }

    fn build_reflect(
        &self,
        state: &AdventureState,
        chapter_number: usize,
        reflect_seed: u64,
    ) -> Result<(Prompt, Option<String>)> {
        let prior = state
            .chapters
            .iter()
            .find(|c| c.chapter_number == chapter_number - 1)
            .ok_or(PromptError::MissingQuestion(chapter_number))?;
        let question = prior.question.as_ref().ok_or(PromptError::MissingQuestion(chapter_number))?;
        let response = prior.response.as_ref().ok_or(PromptError::MissingResponse(chapter_number))?;
        let was_correct = match response {
            crate::state::Response::Lesson(ans) => ans.is_correct,
            _ => false,
        };

        let template = if was_correct {
            let mut rng = StdRng::seed_from_u64(reflect_seed);
            let options = templates::reflect_correct_templates();
            options[rng.gen_range(0..options.len())]
        } else {
            templates::reflect_incorrect_template()
        };

        let system = templates::story_system(
            &state.protagonist_description,
            &self.world_setting(state),
            &self.themes(state),
        );
        let user = templates::reflect_user(template, &question.question_text, was_correct, &question.explanation);
        Ok((Prompt { system, user }, Some(template.to_string())))
    }

    fn build_conclusion(&self, state: &AdventureState) -> Result<Prompt> {
        let agency = state.metadata.agency.as_ref();
        let system = templates::story_system(
            &state.protagonist_description,
            &self.world_setting(state),
            &self.themes(state),
        );
        let agency_name = agency.map(|a: &Agency| a.name.as_str()).unwrap_or("their journey");
        let user = templates::conclusion_user(agency_name);
        Ok(Prompt { system, user })
    }

    /// Build the consequence fragment injected into the chapter immediately
    /// after a LESSON: the verbatim question and verbatim explanation.
    pub fn consequence_fragment(&self, state: &AdventureState, lesson_chapter_number: usize) -> Result<String> {
        let chapter = state
            .chapters
            .iter()
            .find(|c| c.chapter_number == lesson_chapter_number)
            .ok_or(PromptError::MissingQuestion(lesson_chapter_number))?;
        let question = chapter.question.as_ref().ok_or(PromptError::MissingQuestion(lesson_chapter_number))?;
        Ok(format!(
            "Earlier, the reader was asked: \"{}\"\nExplanation: {}",
            question.question_text, question.explanation
        ))
    }

    pub fn summary_prompt(&self, content: &str, choice_text: &str, choice_context: &str) -> String {
        templates::summary_prompt(content, choice_text, choice_context)
    }

    pub fn character_visual_update_prompt(&self, content: &str) -> String {
        templates::CHARACTER_VISUAL_UPDATE_PROMPT.replace("{content}", content)
    }

    pub fn image_scene_description_prompt(&self, content: &str) -> String {
        templates::image_scene_description_prompt(content)
    }

    pub fn image_synthesis_meta_prompt(
        &self,
        scene_description: &str,
        protagonist_or_evolved: &str,
        agency_phrase: &str,
        sensory_visual: Option<&str>,
        supporting_characters: &[(String, String)],
    ) -> String {
        templates::image_synthesis_meta_prompt(
            scene_description,
            protagonist_or_evolved,
            agency_phrase,
            sensory_visual,
            supporting_characters,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AdventureState, Chapter, LessonAnswer, LessonQuestion, NarrativeElements, Response, SensoryDetails};

    fn state_with_lesson(chapter_number: usize, is_correct: bool) -> AdventureState {
        let mut state = AdventureState::new(
            10,
            vec![ChapterType::Story; 10],
            "client-1".to_string(),
            "a weary traveler".to_string(),
            NarrativeElements::default(),
            SensoryDetails::default(),
        );
        state.append_chapter(Chapter {
            chapter_number,
            chapter_type: ChapterType::Lesson,
            content: "the object glowed".to_string(),
            question: Some(LessonQuestion {
                topic: "math".to_string(),
                question_text: "What is 6 times 7?".to_string(),
                answers: vec![],
                explanation: "6 times 7 is 42.".to_string(),
                difficulty: "easy".to_string(),
            }),
            response: Some(Response::Lesson(LessonAnswer {
                chosen_answer_text: "42".to_string(),
                is_correct,
            })),
            chosen_path: None,
        });
        state
    }

    #[test]
    fn lesson_prompt_embeds_question_verbatim() {
        let builder = PromptBuilder::new("mathematics".to_string());
        let state = AdventureState::new(
            10,
            vec![ChapterType::Story; 10],
            "client-1".to_string(),
            "a weary traveler".to_string(),
            NarrativeElements::default(),
            SensoryDetails::default(),
        );
        let question = LessonQuestion {
            topic: "math".to_string(),
            question_text: "What is 6 times 7?".to_string(),
            answers: vec![],
            explanation: "6 times 7 is 42.".to_string(),
            difficulty: "easy".to_string(),
        };
        let (prompt, _) = builder.build(&state, 2, ChapterType::Lesson, 1, Some(&question)).unwrap();
        assert!(prompt.user.contains("What is 6 times 7?"));
    }

    #[test]
    fn missing_question_is_a_prompt_contract_violation() {
        let builder = PromptBuilder::new("mathematics".to_string());
        let state = AdventureState::new(
            10,
            vec![ChapterType::Story; 10],
            "client-1".to_string(),
            "a weary traveler".to_string(),
            NarrativeElements::default(),
            SensoryDetails::default(),
        );
        let err = builder.build(&state, 1, ChapterType::Lesson, 1, None).unwrap_err();
        assert_eq!(err.kind(), "prompt");
    }

    #[test]
    fn reflect_prompt_uses_correct_template_set_when_answer_was_right() {
        let builder = PromptBuilder::new("mathematics".to_string());
        let mut state = state_with_lesson(2, true);
        state.append_chapter(Chapter {
            chapter_number: 3,
            chapter_type: ChapterType::Reflect,
            content: String::new(),
            question: None,
            response: None,
            chosen_path: None,
        });
        let (_, template) = builder.build(&state, 3, ChapterType::Reflect, 99, None).unwrap();
        assert!(templates::reflect_correct_templates().contains(&template.unwrap().as_str()));
    }

    #[test]
    fn first_chapter_story_prompt_includes_agency_offer() {
        let builder = PromptBuilder::new("mathematics".to_string());
        let state = AdventureState::new(
            10,
            vec![ChapterType::Story; 10],
            "client-1".to_string(),
            "a weary traveler".to_string(),
            NarrativeElements::default(),
            SensoryDetails::default(),
        );
        let (prompt, _) = builder.build(&state, 1, ChapterType::Story, 1, None).unwrap();
        assert!(prompt.user.contains("four distinct paths"));
        assert!(prompt.system.contains("a weary traveler"));
    }

    #[test]
    fn story_prompt_after_lesson_injects_consequence_fragment() {
        let builder = PromptBuilder::new("mathematics".to_string());
        let state = state_with_lesson(2, true);
        let (prompt, _) = builder.build(&state, 3, ChapterType::Story, 1, None).unwrap();
        assert!(prompt.user.contains("What is 6 times 7?"));
        assert!(prompt.user.contains("6 times 7 is 42."));
    }
}
