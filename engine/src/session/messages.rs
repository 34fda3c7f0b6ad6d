//! Wire message shapes for the Session Coordinator. Internal
//! field names stay snake_case; the camelCase boundary transform happens in
//! the server crate's serde layer, not here.

use serde::{Deserialize, Serialize};

/// `chosen_path` on `Choice` disambiguates itself at interpretation time:
/// `"A"|"B"|"C"` for a story choice, an integer index for a
/// lesson answer, or the literal `"reveal_summary"`. The Session Coordinator
/// resolves which kind applies by consulting the in-flight chapter's type,
/// since the wire format carries only one inbound shape for all three.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Start {
        story_category: String,
        lesson_topic: String,
        client_uuid: String,
        #[serde(default)]
        resume: bool,
    },
    Choice {
        chosen_path: String,
        choice_text: String,
    },
    ClientPing,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ChapterUpdate {
        current_chapter: usize,
        total_chapters: usize,
        chapter_type: String,
    },
    TextFragment {
        text: String,
    },
    ChapterComplete {
        chapter_number: usize,
    },
    ImageUpdate {
        chapter_number: usize,
        image_payload: String,
    },
    AgencyImageUpdate {
        option_index: usize,
        image_payload: String,
    },
    StoryComplete,
    SummaryReady {
        state_id: uuid::Uuid,
    },
    LoadingPhrase {
        text: String,
    },
    Error {
        kind: String,
        message: String,
    },
}
