//! End-to-end scenario tests exercising components that don't require a
//! live LLM vendor or Postgres instance: the paragraph-reformatting
//! pipeline (S5) via a fake backend, and agency commit (S3) via the Choice
//! Processor acting on real `AdventureState`.

use async_trait::async_trait;
use futures_core::stream::BoxStream;
use learning_odyssey_engine::choice::apply_story_choice;
use learning_odyssey_engine::error::LlmError;
use learning_odyssey_engine::llm::{LlmBackend, LlmGateway, UseCase};
use learning_odyssey_engine::state::{AdventureState, Chapter, ChapterType, NarrativeElements, SensoryDetails};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A backend whose `stream` returns a single, dense, unbroken block of text
/// (no double-newlines, many sentences) and whose `complete` (used by the
/// reformatter) always succeeds on the first call with a paragraph-broken
/// version.
struct DenseTextBackend {
    complete_calls: AtomicUsize,
}

#[async_trait]
impl LlmBackend for DenseTextBackend {
    async fn stream(&self, _system: &str, _prompt: &str, _model: &str) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let sentence = "The lantern flickered as Mira stepped forward. ";
        let dense = sentence.repeat(20); // ~900 chars, >=8 sentences, zero double-newlines
        let stream = futures::stream::once(async move { Ok(dense) });
        Ok(Box::pin(stream))
    }

    async fn complete(&self, _system: &str, _prompt: &str, _model: &str) -> Result<String, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok("The lantern flickered as Mira stepped forward.\n\nShe crossed the threshold into the dark.".to_string())
    }
}

#[tokio::test]
async fn s5_reformat_trigger_invoked_on_dense_unbroken_narrative() {
    let backend = Box::new(DenseTextBackend { complete_calls: AtomicUsize::new(0) });
    let gateway = LlmGateway::new(backend, "reasoning-model".to_string(), "utility-model".to_string(), 3);

    let result = gateway.stream_collected("system", "prompt", UseCase::StoryGeneration).await.unwrap();

    assert!(result.contains("\n\n"), "reformatted text must contain a paragraph break");
}

struct PassthroughBackend;

#[async_trait]
impl LlmBackend for PassthroughBackend {
    async fn stream(&self, _system: &str, _prompt: &str, _model: &str) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let stream = futures::stream::once(async { Ok("Short narrative.\n\nAlready paragraphed.".to_string()) });
        Ok(Box::pin(stream))
    }

    async fn complete(&self, _system: &str, _prompt: &str, _model: &str) -> Result<String, LlmError> {
        unreachable!("reformatter must not be invoked when paragraphs are already present")
    }
}

#[tokio::test]
async fn reformat_not_invoked_when_double_newline_already_present() {
    let gateway = LlmGateway::new(Box::new(PassthroughBackend), "r".to_string(), "u".to_string(), 3);
    let result = gateway.stream_collected("system", "prompt", UseCase::StoryGeneration).await.unwrap();
    assert_eq!(result, "Short narrative.\n\nAlready paragraphed.");
}

fn fresh_state() -> AdventureState {
    AdventureState::new(
        10,
        vec![ChapterType::Story; 10],
        "client-s3".to_string(),
        "a weary traveler in a patched cloak".to_string(),
        NarrativeElements::default(),
        SensoryDetails::default(),
    )
}

#[tokio::test]
async fn s3_agency_commit_from_first_chapter_story_choice() {
    let mut state = fresh_state();
    state.append_chapter(Chapter {
        chapter_number: 1,
        chapter_type: ChapterType::Story,
        content: "Four paths lay before you...".to_string(),
        question: None,
        response: None,
        chosen_path: None,
    });

    let choice_text = "As a Dream Walker [ethereal blue cloak, starlit eyes] - wander between realities";
    apply_story_choice(&mut state, "A", choice_text).await.unwrap();

    let agency = state.metadata.agency.expect("agency must be committed after chapter 1 choice");
    assert_eq!(agency.name, "Dream Walker");
    assert_eq!(agency.visual_details, "ethereal blue cloak, starlit eyes");
    assert_eq!(agency.choice_text, choice_text);

    match &state.chapters[0].response {
        Some(learning_odyssey_engine::state::Response::Story(s)) => {
            assert_eq!(s.chosen_path, "A");
            assert_eq!(s.choice_text, choice_text);
        }
        _ => panic!("expected a recorded story response"),
    }
}

#[tokio::test]
async fn agency_is_not_overwritten_by_a_later_chapter_choice() {
    let mut state = fresh_state();
    state.append_chapter(Chapter {
        chapter_number: 1,
        chapter_type: ChapterType::Story,
        content: String::new(),
        question: None,
        response: None,
        chosen_path: None,
    });
    apply_story_choice(&mut state, "A", "As a Dream Walker [blue cloak] - wander").await.unwrap();

    state.append_chapter(Chapter {
        chapter_number: 2,
        chapter_type: ChapterType::Story,
        content: String::new(),
        question: None,
        response: None,
        chosen_path: None,
    });
    apply_story_choice(&mut state, "B", "Venture into the woods [green cloak]").await.unwrap();

    assert_eq!(state.metadata.agency.unwrap().name, "Dream Walker");
}

#[tokio::test]
async fn statistics_never_exceed_story_length() {
    let mut state = fresh_state();
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
    let stats = state.statistics();
    assert!(stats.chapters_completed <= state.story_length);
}
