//! Stream Handler (C7): drives chapter generation, paces word delivery,
//! appends completed chapters, launches deferred background tasks, and
//! fans out image requests.

use crate::choice::build_deferred_tasks;
use crate::config::EngineConfig;
use crate::error::{LlmError, Result};
use crate::image::ImageSynthesizer;
use crate::llm::{LlmGateway, UseCase};
use crate::prompts::PromptBuilder;
use crate::state::{AdventureState, Chapter, ChapterType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Outbound events the Stream Handler emits toward the Session Coordinator.
/// Transport-agnostic: C9 owns the actual WebSocket framing.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    ChapterUpdate { current_chapter: usize, total_chapters: usize, chapter_type: String },
    TextFragment { text: String },
    ChapterComplete { chapter_number: usize },
    ImageUpdate { chapter_number: usize, image_payload: String },
    AgencyImageUpdate { option_index: usize, image_payload: String },
    StoryComplete,
    LoadingPhrase { text: String },
}

/// How often the loader rotation ticks while a chapter is being generated.
const LOADING_PHRASE_INTERVAL: Duration = Duration::from_secs(5);

pub struct StreamHandler {
    pub gateway: Arc<LlmGateway>,
    pub prompts: Arc<PromptBuilder>,
    pub images: Arc<ImageSynthesizer>,
    pub config: Arc<EngineConfig>,
}

impl StreamHandler {
    /// Drive one chapter end-to-end: send `chapter_update`, stream content,
    /// append the chapter, launch deferred tasks, and kick off image
    /// generation. Returns once the chapter's own streaming work is done;
    /// image and deferred-task futures are spawned, not awaited here.
    pub async fn run_chapter(
        &self,
        state: &mut AdventureState,
        chapter_number: usize,
        chapter_type: ChapterType,
        question: Option<crate::state::LessonQuestion>,
        out: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let total_chapters = state.story_length;
        out.send(StreamEvent::ChapterUpdate {
            current_chapter: chapter_number,
            total_chapters,
            chapter_type: chapter_type.as_canonical_str().to_string(),
        })
        .await
        .ok();

        let reflect_seed = crate::planner::seed_from_client_uuid(&state.metadata.client_uuid) ^ (chapter_number as u64);
        let (prompt, reflect_template) =
            self.prompts.build(state, chapter_number, chapter_type, reflect_seed, question.as_ref())?;
        if let Some(template) = reflect_template {
            state.metadata.reflect_challenge_history.push(template);
        }

        let timeout = if chapter_type == ChapterType::Conclusion {
            self.config.conclusion_stream_timeout
        } else {
            self.config.standard_llm_timeout
        };

        let content = tokio::time::timeout(
            timeout,
            self.generate_with_loading_phrases(&prompt.system, &prompt.user, out),
        )
        .await
        .map_err(|_| crate::error::EngineError::Llm(LlmError::Timeout(timeout)))?
        .map_err(crate::error::EngineError::Llm)?;

        self.pace_delivery(&content, out).await;

        let chapter = Chapter {
            chapter_number,
            chapter_type,
            content: content.clone(),
            question,
            response: None,
            chosen_path: None,
        };
        {
            let _guard = state.summary_lock.lock().await;
            state.append_chapter(chapter);
        }

        out.send(StreamEvent::ChapterComplete { chapter_number }).await.ok();

        if chapter_type == ChapterType::Conclusion {
            out.send(StreamEvent::StoryComplete).await.ok();
        }

        Ok(())
    }

    /// Drive the narrative LLM call while emitting `loading_phrase` events on
    /// a fixed rotation until it resolves. The ticker is purely
    /// cosmetic: it never delays or gates the generation call itself, so a
    /// fast response short-circuits the race before any phrase is sent.
    async fn generate_with_loading_phrases(
        &self,
        system: &str,
        user: &str,
        out: &mpsc::Sender<StreamEvent>,
    ) -> Result<String, LlmError> {
        let generation = self.gateway.stream_collected(system, user, UseCase::StoryGeneration);
        tokio::pin!(generation);

        let mut tick = 0usize;
        loop {
            tokio::select! {
                biased;
                result = &mut generation => return result,
                _ = tokio::time::sleep(LOADING_PHRASE_INTERVAL) => {
                    let text = crate::content::phrase_for_tick(tick).to_string();
                    tick += 1;
                    out.send(StreamEvent::LoadingPhrase { text }).await.ok();
                }
            }
        }
    }

    /// Forward text fragments to the consumer with a pacing floor of
    /// ~20ms/word (configurable), never blocking on background work.
    async fn pace_delivery(&self, content: &str, out: &mpsc::Sender<StreamEvent>) {
        for word in content.split_inclusive(' ') {
            out.send(StreamEvent::TextFragment { text: word.to_string() }).await.ok();
            tokio::time::sleep(self.config.word_pace).await;
        }
    }

    /// Launch the two deferred task factories for the chapter just streamed,
    /// recording their join handles in `pending_summary_tasks`. Must be
    /// called only after `run_chapter`'s streaming has completed for this
    /// chapter.
    ///
    /// Takes the shared `Arc<Mutex<AdventureState>>` (rather than a borrowed
    /// guard) because the spawned tasks outlive this call: they re-acquire
    /// the lock themselves once their LLM call returns, to merge the summary
    /// and character-visual results back into state.
    pub async fn launch_deferred_tasks(
        &self,
        state: Arc<tokio::sync::Mutex<AdventureState>>,
        chapter_number: usize,
        choice_text: String,
        choice_context: String,
    ) {
        let content = {
            let guard = state.lock().await;
            guard
                .chapters
                .iter()
                .find(|c| c.chapter_number == chapter_number)
                .map(|c| c.content.clone())
                .unwrap_or_default()
        };

        let tasks = build_deferred_tasks(
            self.gateway.clone(),
            self.prompts.clone(),
            state.clone(),
            content,
            choice_text,
            choice_context,
            chapter_number,
        );

        let mut guard = state.lock().await;
        for task in tasks {
            let handle = tokio::spawn(task());
            guard.pending_summary_tasks.push(handle);
        }
    }

    /// Kick off the image pipeline for chapter `n >= 2`: scene description,
    /// synthesis, then the image request, delivered via `out` whenever it
    /// arrives (may be after `chapter_complete`). Always asynchronous with
    /// respect to narrative streaming.
    pub fn spawn_chapter_image(&self, state: Arc<tokio::sync::Mutex<AdventureState>>, chapter_number: usize, out: mpsc::Sender<StreamEvent>) {
        let gateway = self.gateway.clone();
        let prompts = self.prompts.clone();
        let images = self.images.clone();
        tokio::spawn(async move {
            let state_guard = state.lock().await;
            let chapter = match state_guard.chapters.iter().find(|c| c.chapter_number == chapter_number) {
                Some(c) => c.clone(),
                None => return,
            };
            let gathered = images.gather_inputs(&gateway, &prompts, &state_guard, &chapter).await;
            drop(state_guard);

            let Ok(inputs) = gathered else { return };
            if let Ok(payload) = images.synthesize_and_request(&gateway, &prompts, &inputs).await {
                out.send(StreamEvent::ImageUpdate { chapter_number, image_payload: payload }).await.ok();
            }
        });
    }

    /// Chapter 1 special case: spawn up to four agency images, one per
    /// offered option, delivered indexed by option.
    pub fn spawn_agency_images(&self, option_prompts: Vec<String>, out: mpsc::Sender<StreamEvent>) {
        for (index, visual_prompt) in option_prompts.into_iter().enumerate() {
            let gateway = self.gateway.clone();
            let images = self.images.clone();
            let out = out.clone();
            tokio::spawn(async move {
                let styled = format!("{visual_prompt}. Style: a colorful storybook illustration.");
                let synth = gateway.complete("", &styled, UseCase::ImagePromptSynthesis).await;
                let Ok(final_prompt) = synth else { return };
                if let Ok(payload) = images.request_image(&final_prompt).await {
                    out.send(StreamEvent::AgencyImageUpdate { option_index: index, image_payload: payload }).await.ok();
                }
            });
        }
    }

    /// Await all `pending_summary_tasks` under the summary-drain deadline.
    ///
    /// Takes the shared `Arc<Mutex<AdventureState>>` and releases it before
    /// awaiting the drained handles: each background task re-acquires that
    /// same lock to merge its result, so holding it across the `join_all`
    /// would deadlock the drain against the very tasks it's waiting on.
    pub async fn drain_pending_tasks(&self, state: &Arc<tokio::sync::Mutex<AdventureState>>) {
        let handles: Vec<_> = {
            let mut guard = state.lock().await;
            let _summary_guard = guard.summary_lock.lock().await;
            guard.pending_summary_tasks.drain(..).collect()
        };
        let drain = futures::future::join_all(handles);
        let _ = tokio::time::timeout(self.config.summary_drain_timeout, drain).await;
    }
}
