//! Static prompt template bodies: one function per chapter-type/phase
//! concern, each returning a format string with named placeholders.

pub fn story_system(protagonist_description: &str, world_setting: &str, themes: &str) -> String {
    format!(
        "You are the narrator of an interactive educational adventure.\n\
         The protagonist: {protagonist_description}\n\
         World setting: {world_setting}\n\
         Themes: {themes}\n\
         Write vivid, age-appropriate prose. Never break character. Never mention \
         that this is a game, a prompt, or an AI system."
    )
}

pub fn story_user(phase_guidance: &str, choice_instructions: &str) -> String {
    format!(
        "Continue the adventure.\n{phase_guidance}\n\
         End the chapter with exactly three distinct choices labeled A, B, and C, \
         wrapped as:\n<CHOICES>\nA) ...\nB) ...\nC) ...\n</CHOICES>\n{choice_instructions}"
    )
}

pub fn first_chapter_agency_offer() -> &'static str {
    "This is the opening chapter. Offer the protagonist exactly four distinct paths \
     to personal agency, one from each category: a companion, an ability, an artifact, \
     and a profession. Each option must be phrased as a choice the reader can make, and \
     must include a bracketed visual detail, e.g. \"As a Dream Walker [ethereal blue \
     cloak, starlit eyes] - wander between realities\"."
}

pub fn lesson_user(question_text: &str, topic: &str) -> String {
    format!(
        "Using the Story Object Method, introduce a concrete in-world object or moment \
         that naturally motivates the following question. The narrative must contain this \
         question verbatim, phrased exactly as given, and must NOT reveal or hint at any \
         answer option:\n\nQuestion: \"{question_text}\"\nTopic: {topic}\n\n\
         Do not present multiple-choice answers in the prose; the reader will answer \
         separately."
    )
}

pub fn reflect_correct_templates() -> &'static [&'static str] {
    &["confidence_test", "application", "connection_making", "teaching_moment"]
}

pub fn reflect_incorrect_template() -> &'static str {
    "educational_recovery"
}

pub fn reflect_user(
    template: &str,
    prior_question: &str,
    was_correct: bool,
    explanation_guidance: &str,
) -> String {
    let correctness = if was_correct { "answered correctly" } else { "answered incorrectly" };
    format!(
        "The reader just {correctness} on: \"{prior_question}\"\n\
         Write a short reflective passage using the '{template}' approach.\n\
         Explanation guidance: {explanation_guidance}\n\
         End with a single open choice that lets the reader proceed, wrapped in \
         <CHOICES>...</CHOICES> if a decision point makes sense, or simply continue the \
         narrative into the next beat otherwise."
    )
}

pub fn conclusion_user(agency_name: &str) -> String {
    format!(
        "Write the final chapter. Resolve the adventure meaningfully, giving clear \
         narrative weight to the protagonist's commitment to \"{agency_name}\" established \
         in chapter one. Do not present any choices; this is the ending."
    )
}

pub const PHASE_GUIDANCE_EXPOSITION: &str =
    "We are in the Exposition: establish {adventure_topic}, the setting, and the stakes.";
pub const PHASE_GUIDANCE_RISING: &str = "We are in the Rising Action: raise tension, introduce complications.";
pub const PHASE_GUIDANCE_TRIALS: &str = "We are in the Trials: the protagonist faces a difficult test.";
pub const PHASE_GUIDANCE_CLIMAX: &str = "We are in the Climax: the central conflict comes to a head.";
pub const PHASE_GUIDANCE_RETURN: &str = "We are in the Return: begin resolving threads toward the ending.";

pub const PLOT_TWIST_GUIDANCE: &str =
    "If it serves the story, you may introduce a plot twist drawn from the adventure's \
     established plot-twist elements.";

pub fn summary_prompt(content: &str, choice_text: &str, choice_context: &str) -> String {
    format!(
        "Summarize the following chapter in 70-100 words and give it a short title.\n\n\
         Chapter content:\n{content}\n\nThe reader chose: {choice_text}\nContext: {choice_context}\n\n\
         Respond in EXACTLY this format:\n\
         INCORRECT FORMAT EXAMPLE (do not do this):\nThis chapter was about a forest.\n\n\
         CORRECT FORMAT EXAMPLE:\nTITLE: The Whispering Grove\nSUMMARY: Mira ventured into the \
         whispering grove and ... (70-100 words)\n\n\
         Now produce your own TITLE: and SUMMARY: sections for the chapter above."
    )
}

pub const CHARACTER_VISUAL_UPDATE_PROMPT: &str =
    "Read the chapter content below and extract a mapping of character name to a concise \
     visual description (appearance only, no personality). Respond as a JSON object mapping \
     character names to visual description strings, with no other text.\n\nChapter content:\n{content}";

pub fn image_scene_description_prompt(content: &str) -> String {
    format!(
        "In 50 words or fewer, describe the single most visually striking moment of this \
         chapter in concrete, visually specific terms suitable for an illustrator. Do not \
         mention names of abstract concepts; describe what is physically seen.\n\nChapter:\n{content}"
    )
}

pub fn image_synthesis_meta_prompt(
    scene_description: &str,
    protagonist_or_evolved: &str,
    agency_phrase: &str,
    sensory_visual: Option<&str>,
    supporting_characters: &[(String, String)],
) -> String {
    let sensory_clause = match sensory_visual {
        Some(detail) if !detail.trim().is_empty() => format!(" Include this sensory visual detail if it fits the scene: {detail}."),
        _ => String::new(),
    };
    let supporting_clause = if supporting_characters.is_empty() {
        String::new()
    } else {
        let joined = supporting_characters
            .iter()
            .map(|(name, visual)| format!("{name} appears as {visual}"))
            .collect::<Vec<_>>()
            .join("; ");
        format!(" Other characters in the scene: {joined}.")
    };
    format!(
        "You are an Expert Prompt Engineer for a children's storybook illustrator. Merge the \
         following into a single coherent 30-50 word image prompt. The scene description is \
         the primary focus. The character appears as: {protagonist_or_evolved}. \
         The character is {agency_phrase}.{sensory_clause}{supporting_clause} Style: a colorful \
         storybook illustration.\n\nScene: {scene_description}"
    )
}
