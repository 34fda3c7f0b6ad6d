//! Image Prompt Synthesizer (C5): two-step synthesis of the final image
//! prompt, then fan-out to the image generation endpoint.

use crate::error::ImageError;
use crate::llm::{LlmGateway, UseCase};
use crate::prompts::PromptBuilder;
use crate::state::{AdventureState, Chapter};
use std::time::Duration;

/// The inputs gathered in Step 1 before synthesis.
pub struct SceneInputs {
    pub scene_description: String,
    pub protagonist_or_evolved: String,
    pub agency_phrase: String,
    pub sensory_visual: Option<String>,
    /// Evolved `character_visuals` entries for non-protagonist characters
    /// whose name appears in the chapter content.
    pub supporting_character_visuals: Vec<(String, String)>,
}

pub struct ImageSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    max_retries: u32,
}

impl ImageSynthesizer {
    pub fn new(endpoint: String, api_key: String, timeout: Duration, max_retries: u32) -> Self {
        ImageSynthesizer { client: reqwest::Client::new(), endpoint, api_key, timeout, max_retries }
    }

    /// Step 1: gather the inputs relevant to the just-completed chapter.
    pub async fn gather_inputs(
        &self,
        gateway: &LlmGateway,
        prompts: &PromptBuilder,
        state: &AdventureState,
        chapter: &Chapter,
    ) -> Result<SceneInputs, ImageError> {
        let scene_prompt = prompts.image_scene_description_prompt(&chapter.content);
        let scene_description = gateway
            .complete("", &scene_prompt, UseCase::ImageSceneDescription)
            .await
            .map_err(|e| ImageError::Generation(e.to_string()))?;

        let protagonist_or_evolved = evolved_protagonist_visual(state);

        let agency_phrase = state
            .metadata
            .agency
            .as_ref()
            .map(|a| format!("{} ({})", a.category.weave_phrase(), a.name))
            .unwrap_or_else(|| "on their own".to_string());

        let sensory_visual = state.selected_sensory_details.visuals.first().cloned();

        let supporting_character_visuals = relevant_supporting_visuals(state, chapter);

        Ok(SceneInputs {
            scene_description,
            protagonist_or_evolved,
            agency_phrase,
            sensory_visual,
            supporting_character_visuals,
        })
    }

    /// Step 2: synthesize the final 30-50 word prompt and request the image.
    pub async fn synthesize_and_request(
        &self,
        gateway: &LlmGateway,
        prompts: &PromptBuilder,
        inputs: &SceneInputs,
    ) -> Result<String, ImageError> {
        let meta_prompt = prompts.image_synthesis_meta_prompt(
            &inputs.scene_description,
            &inputs.protagonist_or_evolved,
            &inputs.agency_phrase,
            inputs.sensory_visual.as_deref(),
            &inputs.supporting_character_visuals,
        );
        let final_prompt = gateway
            .complete("", &meta_prompt, UseCase::ImagePromptSynthesis)
            .await
            .map_err(|e| ImageError::Generation(e.to_string()))?;

        self.request_image(&final_prompt).await
    }

    /// Call the image generation endpoint with exponential backoff, robust
    /// null-checking of the response payload.
    pub async fn request_image(&self, prompt: &str) -> Result<String, ImageError> {
        let mut delay = Duration::from_millis(1000);
        let mut last_err = None;
        for attempt in 0..self.max_retries.max(1) {
            let result = tokio::time::timeout(self.timeout, self.call_endpoint(prompt)).await;
            match result {
                Ok(Ok(payload)) => return Ok(payload),
                Ok(Err(e)) => last_err = Some(e),
                Err(_) => last_err = Some(ImageError::Timeout(self.timeout)),
            }
            if attempt + 1 < self.max_retries {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
        Err(last_err.unwrap_or(ImageError::EmptyPayload))
    }

    async fn call_endpoint(&self, prompt: &str) -> Result<String, ImageError> {
        let body = serde_json::json!({ "prompt": prompt, "n": 1, "size": "1024x1024" });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ImageError::Generation(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageError::Generation(format!("endpoint returned {}", response.status())));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ImageError::Generation(e.to_string()))?;

        // Defensive walking of the payload: vendor response shapes vary and
        // the field we want may be absent entirely.
        value
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|first| first.get("url").or_else(|| first.get("b64_json")))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(ImageError::EmptyPayload)
    }
}

/// Resolve the visual description to use: evolved `character_visuals` entry
/// for the protagonist overrides the base `protagonist_description` when
/// present.
fn evolved_protagonist_visual(state: &AdventureState) -> String {
    state
        .character_visuals
        .get("Protagonist")
        .cloned()
        .unwrap_or_else(|| state.protagonist_description.clone())
}

/// Evolved visuals for characters other than the protagonist whose name is
/// mentioned in the chapter's content, so secondary-character appearances
/// stay consistent across illustrations.
fn relevant_supporting_visuals(state: &AdventureState, chapter: &Chapter) -> Vec<(String, String)> {
    let mut visuals: Vec<(String, String)> = state
        .character_visuals
        .iter()
        .filter(|(name, _)| name.as_str() != "Protagonist" && chapter.content.contains(name.as_str()))
        .map(|(name, visual)| (name.clone(), visual.clone()))
        .collect();
    visuals.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    visuals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AgencyCategory, NarrativeElements, SensoryDetails};

    #[test]
    fn evolved_visual_overrides_base_description_when_present() {
        let mut state = AdventureState::new(
            10,
            vec![],
            "client-1".to_string(),
            "a weary traveler".to_string(),
            NarrativeElements::default(),
            SensoryDetails::default(),
        );
        assert_eq!(evolved_protagonist_visual(&state), "a weary traveler");
        state.character_visuals.insert("Protagonist".to_string(), "a traveler in a starlit cloak".to_string());
        assert_eq!(evolved_protagonist_visual(&state), "a traveler in a starlit cloak");
    }

    #[test]
    fn supporting_visuals_exclude_protagonist_and_unmentioned_characters() {
        let mut state = AdventureState::new(
            10,
            vec![],
            "client-1".to_string(),
            "a weary traveler".to_string(),
            NarrativeElements::default(),
            SensoryDetails::default(),
        );
        state.character_visuals.insert("Protagonist".to_string(), "a traveler in a starlit cloak".to_string());
        state.character_visuals.insert("Mira".to_string(), "a lantern-keeper with silver hair".to_string());
        state.character_visuals.insert("Oren".to_string(), "a stooped old mapmaker".to_string());

        let chapter = Chapter {
            chapter_number: 1,
            chapter_type: crate::state::ChapterType::Story,
            content: "Mira held the lantern aloft.".to_string(),
            question: None,
            response: None,
            chosen_path: None,
        };

        let visuals = relevant_supporting_visuals(&state, &chapter);
        assert_eq!(visuals, vec![("Mira".to_string(), "a lantern-keeper with silver hair".to_string())]);
    }

    #[test]
    fn agency_phrase_defaults_when_unset() {
        let state = AdventureState::new(
            10,
            vec![],
            "client-1".to_string(),
            "a weary traveler".to_string(),
            NarrativeElements::default(),
            SensoryDetails::default(),
        );
        assert!(state.metadata.agency.is_none());
        let _ = AgencyCategory::Ability; // category weave phrasing exercised in prompts::templates tests
    }
}
