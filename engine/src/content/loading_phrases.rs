//! Curated loading-phrase rotation shown to the client while a chapter's
//! narrative is being generated. A plain `&'static [&'static str]`, no loader
//! or parsing step needed since this isn't user-editable content.

pub const LOADING_PHRASES: [&str; 45] = [
    "Gathering starlight for the next page...",
    "Consulting the storyteller's compass...",
    "Sketching the next scene...",
    "Waking the narrator...",
    "Weaving a new thread into the tale...",
    "Listening for what happens next...",
    "Unrolling the next chapter...",
    "Letting the plot twist take shape...",
    "Asking the characters what they'd do...",
    "Polishing a turn of phrase...",
    "Summoning the right words...",
    "Checking the map for the next waypoint...",
    "Tuning the world's colors...",
    "Following the thread of the story...",
    "Letting the ink dry on the last page...",
    "Finding the next door to open...",
    "Listening to the wind for clues...",
    "Stirring the cauldron of ideas...",
    "Counting the steps to the next scene...",
    "Lining up the choices ahead...",
    "Sharpening a pencil for the next page...",
    "Waiting for the fog to clear...",
    "Letting the story catch its breath...",
    "Tracing the path forward...",
    "Gathering the threads of the plot...",
    "Checking in with the protagonist...",
    "Turning the page...",
    "Listening for the next heartbeat of the story...",
    "Dusting off an old legend...",
    "Letting the world breathe for a moment...",
    "Readying the next illustration...",
    "Finding the right note to end the scene on...",
    "Consulting the stars for guidance...",
    "Letting the characters settle into the scene...",
    "Preparing the next trial...",
    "Weighing the consequences of your choice...",
    "Rounding the next bend in the road...",
    "Letting the dust settle...",
    "Gathering courage for the next chapter...",
    "Checking the compass one more time...",
    "Following the footprints ahead...",
    "Letting the story find its footing...",
    "Stitching together the next scene...",
    "Listening for distant thunder...",
    "Almost there...",
];

/// Index into the fixed rotation for the `n`th tick of a loader. Wraps around rather than
/// requiring the caller to track how many phrases remain.
pub fn phrase_for_tick(tick: usize) -> &'static str {
    LOADING_PHRASES[tick % LOADING_PHRASES.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_forty_five_phrases_are_curated() {
        assert_eq!(LOADING_PHRASES.len(), 45);
    }

    #[test]
    fn phrase_rotation_wraps_around() {
        assert_eq!(phrase_for_tick(0), phrase_for_tick(45));
        assert_ne!(phrase_for_tick(0), phrase_for_tick(1));
    }
}
