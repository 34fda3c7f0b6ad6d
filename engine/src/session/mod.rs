//! Session Coordinator (C9): owns the lifecycle of one adventure, decodes
//! inbound client messages, dispatches to the Choice Processor and Stream
//! Handler, and emits outbound messages. Transport-agnostic: the server
//! crate owns the actual WebSocket framing and wraps this coordinator.

mod messages;

pub use messages::{InboundMessage, OutboundMessage};

use crate::choice;
use crate::config::{Environment, EngineConfig};
use crate::content::{LessonBank, StoryCatalog};
use crate::error::{EngineError, ProtocolError, Result};
use crate::image::ImageSynthesizer;
use crate::llm::LlmGateway;
use crate::planner;
use crate::prompts::PromptBuilder;
use crate::state::{AdventureState, ChapterType, Metadata, NarrativeElements, SensoryDetails};
use crate::store::StateStore;
use crate::stream::{StreamEvent, StreamHandler};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Everything a session needs that is shared across the process (one
/// instance backs many concurrent sessions).
pub struct SessionContext {
    pub config: Arc<EngineConfig>,
    pub gateway: Arc<LlmGateway>,
    pub images: Arc<ImageSynthesizer>,
    pub store: Arc<StateStore>,
    pub stories: Arc<StoryCatalog>,
    pub lessons: Arc<LessonBank>,
}

/// One adventure's in-process coordinator. Owns the `AdventureState` behind
/// a mutex (so the Stream Handler's image-fan-out tasks can read it
/// concurrently with the main message loop) and a channel toward the
/// transport layer.
pub struct SessionCoordinator {
    ctx: Arc<SessionContext>,
    state: Arc<Mutex<AdventureState>>,
    stream: StreamHandler,
    prompts: Arc<PromptBuilder>,
    stored_state_id: Option<uuid::Uuid>,
}

impl SessionCoordinator {
    /// Start a brand new adventure, or resume one if `resume` is set and the
    /// store reports an active adventure for this client.
    pub async fn start(
        ctx: Arc<SessionContext>,
        story_category: &str,
        lesson_topic: &str,
        client_uuid: &str,
        resume: bool,
    ) -> Result<Self> {
        let state = if resume {
            match ctx.store.active_for_client(client_uuid).await.map_err(EngineError::Store)? {
                Some(state_id) => {
                    let snapshot = ctx.store.load(state_id).await.map_err(EngineError::Store)?;
                    let (state, _warnings) = AdventureState::reconstruct(snapshot);
                    (state, Some(state_id))
                }
                None => (Self::new_state(&ctx, story_category, lesson_topic, client_uuid)?, None),
            }
        } else {
            (Self::new_state(&ctx, story_category, lesson_topic, client_uuid)?, None)
        };

        let (state, stored_state_id) = state;

        let prompts = Arc::new(PromptBuilder::new(lesson_topic.to_string()));
        let stream = StreamHandler {
            gateway: ctx.gateway.clone(),
            prompts: prompts.clone(),
            images: ctx.images.clone(),
            config: ctx.config.clone(),
        };

        Ok(SessionCoordinator {
            ctx,
            state: Arc::new(Mutex::new(state)),
            stream,
            prompts,
            stored_state_id,
        })
    }

    fn new_state(
        ctx: &Arc<SessionContext>,
        story_category: &str,
        lesson_topic: &str,
        client_uuid: &str,
    ) -> Result<AdventureState> {
        let category = ctx.stories.get(story_category);
        let available_lessons = ctx.lessons.available_count_for_topic(lesson_topic);
        let seed = planner::seed_from_client_uuid(client_uuid);
        let (planned_types, _relaxation) = planner::plan(ctx.config.story_length, available_lessons, seed);

        let protagonist_description = category
            .and_then(|c| c.protagonist_description_candidates.first().cloned())
            .unwrap_or_else(|| "a curious young adventurer".to_string());

        let narrative_elements = category
            .map(|c| NarrativeElements {
                settings: c.settings.clone(),
                themes: c.themes.clone(),
                plot_twists: c.plot_twists.clone(),
            })
            .unwrap_or_default();

        let sensory_details = category
            .map(|c| SensoryDetails {
                visuals: c.sensory_details.visuals.clone(),
                sounds: c.sensory_details.sounds.clone(),
                smells: c.sensory_details.smells.clone(),
            })
            .unwrap_or_default();

        let mut state = AdventureState::new(
            ctx.config.story_length,
            planned_types,
            client_uuid.to_string(),
            protagonist_description,
            narrative_elements,
            sensory_details,
        );
        state.metadata = Metadata {
            agency: None,
            non_random_elements: Default::default(),
            reflect_challenge_history: Vec::new(),
            difficulty: "Reasonably Challenging".to_string(),
            client_uuid: client_uuid.to_string(),
        };
        Ok(state)
    }

    /// Decode and dispatch one inbound message, driving whatever C6/C7 work
    /// it implies, and forwarding outbound events to `out`.
    pub async fn handle_message(&mut self, message: InboundMessage, out: &mpsc::Sender<OutboundMessage>) -> Result<()> {
        match message {
            InboundMessage::Choice { chosen_path, choice_text } => {
                self.handle_choice(chosen_path, choice_text, out).await
            }
            InboundMessage::ClientPing => Ok(()),
            InboundMessage::Start { .. } => Err(EngineError::Protocol(ProtocolError::UnexpectedMessage(
                "start received after session already began".to_string(),
            ))),
        }
    }

    /// Disambiguate the unified `choice` message against the in-flight
    /// chapter's type: `"reveal_summary"` always wins, a LESSON
    /// chapter expects an integer answer index, anything else is a story
    /// choice.
    async fn handle_choice(
        &mut self,
        chosen_path: String,
        choice_text: String,
        out: &mpsc::Sender<OutboundMessage>,
    ) -> Result<()> {
        if chosen_path == "reveal_summary" {
            return self.handle_reveal_summary(out).await;
        }

        let current_chapter_type = {
            let state = self.state.lock().await;
            state.chapters.last().map(|c| c.chapter_type)
        };

        match current_chapter_type {
            Some(ChapterType::Lesson) => {
                let index: usize = chosen_path.parse().map_err(|_| {
                    EngineError::Protocol(ProtocolError::Malformed(format!(
                        "expected an integer answer index for a LESSON chapter, got '{chosen_path}'"
                    )))
                })?;
                self.handle_lesson_answer(index, out).await
            }
            _ => self.handle_story_choice(chosen_path, choice_text, out).await,
        }
    }

    /// Run the very first chapter, which the client never explicitly
    /// requests via `choice` (it is produced immediately after `start`).
    pub async fn run_first_chapter(&mut self, out: &mpsc::Sender<OutboundMessage>) -> Result<()> {
        self.run_next_chapter(out).await
    }

    async fn handle_story_choice(
        &mut self,
        chosen_path: String,
        choice_text: String,
        out: &mpsc::Sender<OutboundMessage>,
    ) -> Result<()> {
        let chapter_number = {
            let mut state = self.state.lock().await;
            choice::apply_story_choice(&mut state, &chosen_path, &choice_text).await?;
            state.chapters.last().map(|c| c.chapter_number).unwrap_or(0)
        };
        self.after_response(chapter_number, choice_text, out).await
    }

    async fn handle_lesson_answer(&mut self, answer_index: usize, out: &mpsc::Sender<OutboundMessage>) -> Result<()> {
        let (chapter_number, choice_text) = {
            let mut state = self.state.lock().await;
            choice::apply_lesson_answer(&mut state, answer_index).await?;
            let chapter = state.chapters.last();
            let chapter_number = chapter.map(|c| c.chapter_number).unwrap_or(0);
            let choice_text = chapter
                .and_then(|c| c.response.as_ref())
                .map(|r| match r {
                    crate::state::Response::Lesson(ans) => ans.chosen_answer_text.clone(),
                    _ => String::new(),
                })
                .unwrap_or_default();
            (chapter_number, choice_text)
        };
        self.after_response(chapter_number, choice_text, out).await
    }

    async fn handle_reveal_summary(&mut self, out: &mpsc::Sender<OutboundMessage>) -> Result<()> {
        let pending_final_chapter = {
            let mut state = self.state.lock().await;
            choice::apply_reveal_summary(&mut state).await?;
            // The CONCLUSION chapter never goes through `after_response` (the
            // client jumps straight to `reveal_summary` instead of a `choice`
            // against it), so its summary/visual deferred tasks haven't been
            // launched yet. Launch them here, unless this is a repeated
            // `reveal_summary` call and they already have been.
            if state.chapter_summaries.len() < state.chapters.len() {
                state.chapters.last().map(|c| c.chapter_number)
            } else {
                None
            }
        };

        if let Some(chapter_number) = pending_final_chapter {
            self.stream
                .launch_deferred_tasks(
                    self.state.clone(),
                    chapter_number,
                    choice::PLACEHOLDER_CHOICE_TEXT.to_string(),
                    choice::PLACEHOLDER_CHOICE_TEXT.to_string(),
                )
                .await;
        }

        self.stream.drain_pending_tasks(&self.state).await;

        let state_guard = self.state.lock().await;
        let snapshot = state_guard.snapshot();
        let client_uuid = state_guard.metadata.client_uuid.clone();
        drop(state_guard);

        let state_id = self
            .ctx
            .store
            .store(self.stored_state_id, &snapshot, Environment::Development, &client_uuid, true)
            .await
            .map_err(EngineError::Store)?;
        self.stored_state_id = Some(state_id);

        out.send(OutboundMessage::SummaryReady { state_id }).await.ok();
        Ok(())
    }

    /// Launch deferred tasks for the just-completed chapter, persist
    /// incrementally, then advance the planner and stream the next chapter.
    async fn after_response(
        &mut self,
        chapter_number: usize,
        choice_text: String,
        out: &mpsc::Sender<OutboundMessage>,
    ) -> Result<()> {
        self.stream
            .launch_deferred_tasks(self.state.clone(), chapter_number, choice_text.clone(), choice_text)
            .await;
        self.persist_incremental().await?;

        if chapter_number < self.ctx.config.story_length {
            self.run_next_chapter(out).await?;
        }
        Ok(())
    }

    async fn persist_incremental(&mut self) -> Result<()> {
        let (snapshot, client_uuid) = {
            let state = self.state.lock().await;
            (state.snapshot(), state.metadata.client_uuid.clone())
        };
        let state_id = self
            .ctx
            .store
            .store(self.stored_state_id, &snapshot, Environment::Development, &client_uuid, false)
            .await
            .map_err(EngineError::Store)?;
        self.stored_state_id = Some(state_id);
        Ok(())
    }

    async fn run_next_chapter(&mut self, out: &mpsc::Sender<OutboundMessage>) -> Result<()> {
        let (chapter_number, chapter_type, question) = {
            let state = self.state.lock().await;
            let chapter_number = state.chapters.len() + 1;
            let chapter_type = state
                .planned_chapter_types
                .get(chapter_number - 1)
                .copied()
                .unwrap_or(ChapterType::Story);
            let question = if chapter_type == ChapterType::Lesson {
                self.next_question(&state, chapter_number)
            } else {
                None
            };
            (chapter_number, chapter_type, question)
        };

        let (internal_tx, mut internal_rx) = mpsc::channel(64);
        let relay_out = out.clone();
        let relay = tokio::spawn(async move {
            while let Some(event) = internal_rx.recv().await {
                let outbound = match event {
                    StreamEvent::ChapterUpdate { current_chapter, total_chapters, chapter_type } => {
                        OutboundMessage::ChapterUpdate { current_chapter, total_chapters, chapter_type }
                    }
                    StreamEvent::TextFragment { text } => OutboundMessage::TextFragment { text },
                    StreamEvent::ChapterComplete { chapter_number } => OutboundMessage::ChapterComplete { chapter_number },
                    StreamEvent::ImageUpdate { chapter_number, image_payload } => {
                        OutboundMessage::ImageUpdate { chapter_number, image_payload }
                    }
                    StreamEvent::AgencyImageUpdate { option_index, image_payload } => {
                        OutboundMessage::AgencyImageUpdate { option_index, image_payload }
                    }
                    StreamEvent::StoryComplete => OutboundMessage::StoryComplete,
                    StreamEvent::LoadingPhrase { text } => OutboundMessage::LoadingPhrase { text },
                };
                if relay_out.send(outbound).await.is_err() {
                    break;
                }
            }
        });

        {
            let mut state = self.state.lock().await;
            self.stream.run_chapter(&mut state, chapter_number, chapter_type, question, &internal_tx).await?;
        }
        drop(internal_tx);
        relay.await.ok();

        if chapter_number >= 2 {
            self.stream.spawn_chapter_image(self.state.clone(), chapter_number, {
                let (tx, mut rx) = mpsc::channel(8);
                let forward = out.clone();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if let StreamEvent::ImageUpdate { chapter_number, image_payload } = event {
                            forward.send(OutboundMessage::ImageUpdate { chapter_number, image_payload }).await.ok();
                        }
                    }
                });
                tx
            });
        } else {
            let chapter_one_content = {
                let state = self.state.lock().await;
                state.chapters.first().map(|c| c.content.clone()).unwrap_or_default()
            };
            let option_prompts: Vec<String> = choice::extract_agency_option_visuals(&chapter_one_content)
                .into_iter()
                .map(|visual| format!("A character portrait featuring: {visual}"))
                .collect();
            if !option_prompts.is_empty() {
                self.stream.spawn_agency_images(option_prompts, {
                    let (tx, mut rx) = mpsc::channel(8);
                    let forward = out.clone();
                    tokio::spawn(async move {
                        while let Some(event) = rx.recv().await {
                            if let StreamEvent::AgencyImageUpdate { option_index, image_payload } = event {
                                forward.send(OutboundMessage::AgencyImageUpdate { option_index, image_payload }).await.ok();
                            }
                        }
                    });
                    tx
                });
            }
        }

        self.persist_incremental().await?;
        Ok(())
    }

    fn next_question(&self, state: &AdventureState, chapter_number: usize) -> Option<crate::state::LessonQuestion> {
        let already_used: std::collections::HashSet<&str> = state
            .chapters
            .iter()
            .filter_map(|c| c.question.as_ref())
            .map(|q| q.question_text.as_str())
            .collect();
        self.ctx
            .lessons
            .questions_for_topic(&self.prompts.adventure_topic)
            .into_iter()
            .find(|q| !already_used.contains(q.question_text.as_str()))
            .or_else(|| {
                tracing::warn!(chapter_number, "no unused lesson question available; chapter will proceed without one");
                None
            })
    }
}
