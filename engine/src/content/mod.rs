//! Static Content Loaders (C10): read-only YAML story catalog and CSV
//! lesson bank, the two external data sources read at adventure init.
//! Out of scope for behavioral guarantees, but the engine still
//! owns the parsing discipline since there's no separate content service in
//! this deployment shape.

pub mod lesson_bank;
pub mod loading_phrases;
pub mod story_catalog;

pub use lesson_bank::LessonBank;
pub use loading_phrases::{phrase_for_tick, LOADING_PHRASES};
pub use story_catalog::{ContentError, StoryCatalog, StoryCategory};
