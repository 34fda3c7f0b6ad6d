//! Choice Processor (C6): applies a user's choice to state, commits agency
//! on the first chapter, and builds the deferred task factories that run
//! after streaming completes.

use crate::error::{ProtocolError, Result};
use crate::llm::{LlmGateway, UseCase};
use crate::prompts::PromptBuilder;
use crate::state::{Agency, AgencyCategory, AdventureState, DeferredTask, LessonAnswer, Response, StoryChoice};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const PLACEHOLDER_CHOSEN_PATH: &str = "end_of_story";
pub const PLACEHOLDER_CHOICE_TEXT: &str = "End of story";

/// Record a story choice against the in-flight chapter. On chapter 1, also
/// parses and commits the agency offer.
pub async fn apply_story_choice(state: &mut AdventureState, chosen_path: &str, choice_text: &str) -> Result<()> {
    {
        let _guard = state.summary_lock.lock().await;
        state.record_response(Response::Story(StoryChoice {
            chosen_path: chosen_path.to_string(),
            choice_text: choice_text.to_string(),
        }))
        .map_err(|w| ProtocolError::Malformed(w.0))?;

        let is_first_chapter = state.chapters.last().map(|c| c.chapter_number == 1).unwrap_or(false);
        if is_first_chapter {
            if let Some(agency) = parse_agency_choice(choice_text) {
                state.commit_agency(agency);
            }
        }
    }
    Ok(())
}

/// Record a lesson answer, computing correctness from the chapter's
/// `LessonQuestion`.
pub async fn apply_lesson_answer(state: &mut AdventureState, answer_index: usize) -> Result<()> {
    let (chosen_answer_text, is_correct) = {
        let chapter = state
            .chapters
            .last()
            .ok_or_else(|| ProtocolError::UnexpectedMessage("lesson answer with no active chapter".to_string()))?;
        let question = chapter
            .question
            .as_ref()
            .ok_or_else(|| ProtocolError::UnexpectedMessage("lesson answer on a non-LESSON chapter".to_string()))?;
        let option = question
            .answers
            .get(answer_index)
            .ok_or_else(|| ProtocolError::Malformed(format!("answer index {answer_index} out of range")))?;
        (option.text.clone(), option.is_correct)
    };

    let _guard = state.summary_lock.lock().await;
    state
        .record_response(Response::Lesson(LessonAnswer { chosen_answer_text, is_correct }))
        .map_err(|w| ProtocolError::Malformed(w.0))?;
    Ok(())
}

/// Treat the CONCLUSION chapter as having "responded" with a placeholder
/// choice so the uniform post-response pipeline (summary + visuals) runs for
/// it too.
pub async fn apply_reveal_summary(state: &mut AdventureState) -> Result<()> {
    let already_responded = state.chapters.last().map(|c| c.response.is_some()).unwrap_or(true);
    if already_responded {
        return Ok(());
    }
    let _guard = state.summary_lock.lock().await;
    state
        .record_response(Response::Story(StoryChoice {
            chosen_path: PLACEHOLDER_CHOSEN_PATH.to_string(),
            choice_text: PLACEHOLDER_CHOICE_TEXT.to_string(),
        }))
        .map_err(|w| ProtocolError::Malformed(w.0))?;
    Ok(())
}

/// Parse a first-chapter agency choice of the form:
/// `"As a Dream Walker [ethereal blue cloak, starlit eyes] - wander between realities"`.
fn parse_agency_choice(choice_text: &str) -> Option<Agency> {
    let bracket_start = choice_text.find('[')?;
    let bracket_end = choice_text.find(']')?;
    if bracket_end <= bracket_start {
        return None;
    }
    let visual_details = choice_text[bracket_start + 1..bracket_end].trim().to_string();
    let before_bracket = choice_text[..bracket_start].trim();
    let name = before_bracket
        .rsplit(' ')
        .take_while(|w| w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join(" ");
    let name = if name.is_empty() { before_bracket.to_string() } else { name };

    let lowered = before_bracket.to_lowercase();
    const ABILITY_NAME_SUFFIXES: &[&str] = &["walker", "seer", "whisperer", "runner", "shifter", "weaver"];
    let category = if lowered.contains("companion") || lowered.contains("alongside") || lowered.contains("accompanied") {
        AgencyCategory::Companion
    } else if lowered.contains("ability") || lowered.contains("power") || ABILITY_NAME_SUFFIXES.iter().any(|s| lowered.ends_with(s)) {
        AgencyCategory::Ability
    } else if lowered.contains("artifact") || lowered.contains("wielding") || lowered.contains("wield") {
        AgencyCategory::Artifact
    } else {
        AgencyCategory::Profession
    };

    Some(Agency { category, name, visual_details, choice_text: choice_text.to_string() })
}

/// Scan chapter 1's narrative for the bracketed visual detail of each of the
/// (up to four) agency options it offers, so the Stream Handler can request
/// one preview image per option before the reader has chosen any of them.
/// Best-effort: malformed or missing brackets just yield fewer images.
pub fn extract_agency_option_visuals(chapter_content: &str) -> Vec<String> {
    let mut visuals = Vec::new();
    let mut remainder = chapter_content;
    while visuals.len() < 4 {
        let Some(start) = remainder.find('[') else { break };
        let Some(end_rel) = remainder[start..].find(']') else { break };
        let end = start + end_rel;
        let detail = remainder[start + 1..end].trim();
        if !detail.is_empty() {
            visuals.push(detail.to_string());
        }
        remainder = &remainder[end + 1..];
    }
    visuals
}

/// Build the two deferred task factories for the just-completed chapter.
/// The Stream Handler invokes these only after streaming
/// finishes; they must not start earlier, to avoid contending with the
/// word-paced delivery loop.
///
/// Both factories re-acquire `state`'s own `summary_lock` once their LLM call
/// returns, so the merge into `chapter_summaries`/`summary_chapter_titles`/
/// `character_visuals` is never concurrent with another background task's
/// merge.
pub fn build_deferred_tasks(
    gateway: Arc<LlmGateway>,
    prompts: Arc<PromptBuilder>,
    state: Arc<Mutex<AdventureState>>,
    chapter_content: String,
    choice_text: String,
    choice_context: String,
    chapter_number: usize,
) -> Vec<DeferredTask> {
    let summary_gateway = gateway.clone();
    let summary_prompts = prompts.clone();
    let summary_content = chapter_content.clone();
    let summary_state = state.clone();
    let summary_task: DeferredTask = Box::new(move || {
        Box::pin(async move {
            let prompt = summary_prompts.summary_prompt(&summary_content, &choice_text, &choice_context);
            let (title, text) = match summary_gateway.complete("", &prompt, UseCase::SummaryGeneration).await {
                Ok(response) => parse_title_and_summary(&response, chapter_number),
                Err(error) => {
                    tracing::warn!(chapter_number, %error, "summary generation failed; using placeholder");
                    placeholder_summary(chapter_number)
                }
            };
            let mut adventure = summary_state.lock().await;
            let _guard = adventure.summary_lock.lock().await;
            adventure.add_summary(title, text);
        })
    });

    let visual_gateway = gateway;
    let visual_prompts = prompts;
    let visual_state = state;
    let visual_task: DeferredTask = Box::new(move || {
        Box::pin(async move {
            let prompt = visual_prompts.character_visual_update_prompt(&chapter_content);
            let response = match visual_gateway.complete("", &prompt, UseCase::CharacterVisualUpdate).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::warn!(chapter_number, %error, "character visual update failed; leaving visuals unchanged");
                    return;
                }
            };
            let delta = parse_character_visuals(&response);
            if delta.is_empty() {
                return;
            }
            let mut adventure = visual_state.lock().await;
            let _guard = adventure.summary_lock.lock().await;
            for (name, classification) in adventure.update_character_visuals(delta) {
                tracing::debug!(chapter_number, character = %name, classification, "character visual merged");
            }
        })
    });

    vec![summary_task, visual_task]
}

/// Parse the JSON object of `{character name: visual description}` the
/// `CHARACTER_VISUAL_UPDATE_PROMPT` asks for, tolerating a markdown code
/// fence around it. Returns an empty map (no-op merge) on any malformed
/// response rather than propagating a parse error into the background task.
pub fn parse_character_visuals(response: &str) -> HashMap<String, String> {
    let trimmed = response.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim())
        .and_then(|s| s.strip_suffix("```"))
        .map(|s| s.trim())
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced).unwrap_or_default()
}

/// Parse the `TITLE:` / `SUMMARY:` sections required by the summary prompt.
/// Falls back to a placeholder if the response doesn't honor
/// the exact headers — background-task failures must never crash the
/// adventure.
pub fn parse_title_and_summary(response: &str, chapter_number: usize) -> (String, String) {
    let title = response
        .lines()
        .find_map(|line| line.strip_prefix("TITLE:"))
        .map(|t| t.trim().to_string());
    let summary = response
        .lines()
        .find_map(|line| line.strip_prefix("SUMMARY:"))
        .map(|s| s.trim().to_string());

    match (title, summary) {
        (Some(t), Some(s)) if !t.is_empty() && !s.is_empty() => (t, s),
        _ => placeholder_summary(chapter_number),
    }
}

fn placeholder_summary(chapter_number: usize) -> (String, String) {
    (format!("Chapter {chapter_number}"), format!("Summary for Chapter {chapter_number}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_agency_option_visuals_finds_up_to_four_brackets() {
        let content = "You may become:\n\
            As a Dream Walker [ethereal blue cloak, starlit eyes] - wander between realities\n\
            Alongside a Fox Spirit [russet fur, amber eyes] - a clever companion\n\
            Wielding the Moonblade [silver hilt, faint blue glow] - a weapon of old\n\
            As a Cartographer [ink-stained fingers, a satchel of maps] - a mapmaker's trade";
        let visuals = extract_agency_option_visuals(content);
        assert_eq!(visuals.len(), 4);
        assert_eq!(visuals[0], "ethereal blue cloak, starlit eyes");
        assert_eq!(visuals[3], "ink-stained fingers, a satchel of maps");
    }

    #[test]
    fn extract_agency_option_visuals_stops_at_four_even_with_more_brackets() {
        let content = "[a] [b] [c] [d] [e]";
        assert_eq!(extract_agency_option_visuals(content).len(), 4);
    }

    #[test]
    fn extract_agency_option_visuals_empty_when_no_brackets() {
        assert!(extract_agency_option_visuals("no brackets here").is_empty());
    }

    #[test]
    fn s3_parses_ability_agency_choice() {
        let choice_text = "As a Dream Walker [ethereal blue cloak, starlit eyes] - wander between realities";
        let agency = parse_agency_choice(choice_text).unwrap();
        assert_eq!(agency.name, "Dream Walker");
        assert_eq!(agency.visual_details, "ethereal blue cloak, starlit eyes");
        assert_eq!(agency.choice_text, choice_text);
    }

    #[test]
    fn parse_title_and_summary_honors_exact_headers() {
        let response = "TITLE: The Whispering Grove\nSUMMARY: Mira ventured deeper into the grove.";
        let (title, summary) = parse_title_and_summary(response, 3);
        assert_eq!(title, "The Whispering Grove");
        assert_eq!(summary, "Mira ventured deeper into the grove.");
    }

    #[test]
    fn parse_title_and_summary_falls_back_to_placeholder_on_malformed_response() {
        let (title, summary) = parse_title_and_summary("This chapter was about a forest.", 4);
        assert_eq!(title, "Chapter 4");
        assert_eq!(summary, "Summary for Chapter 4");
    }

    #[test]
    fn parse_character_visuals_reads_plain_json() {
        let response = r#"{"Mira": "silver hair, green cloak", "Orin": "tall, scarred hands"}"#;
        let delta = parse_character_visuals(response);
        assert_eq!(delta.get("Mira").unwrap(), "silver hair, green cloak");
        assert_eq!(delta.get("Orin").unwrap(), "tall, scarred hands");
    }

    #[test]
    fn parse_character_visuals_strips_markdown_fence() {
        let response = "```json\n{\"Mira\": \"silver hair\"}\n```";
        let delta = parse_character_visuals(response);
        assert_eq!(delta.get("Mira").unwrap(), "silver hair");
    }

    #[test]
    fn parse_character_visuals_returns_empty_on_malformed_response() {
        let delta = parse_character_visuals("not json at all");
        assert!(delta.is_empty());
    }
}
