//! System prompt assembly: base persona, style guide and retrieved context.

use crate::types::Style;

/// Persona used by the chat and proxy endpoints when the client sends none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
    You are ChatMig, a clear and empathetic migration advisor. \
    Give operational steps, requirements, documents, indicative costs and timelines. \
    Point out risks or limitations and how to verify them with the official authority. \
    No filler.";

/// Persona for the session-aware agent endpoints.
pub const DEFAULT_AGENT_PROMPT: &str = "\
    You are **ChatMig**, an expert assistant on migration from Latin America to the \
    United States, Spain and the rest of Europe. You answer in a clear, empathetic \
    and direct tone. You provide:\n\
    - requirements/documents\n- approximate costs\n- estimated timelines\n\
    - actionable steps (checklist)\n\
    Include one short quote in «» when it adds value. Avoid filler.";

/// Persona for the retrieval-augmented endpoints.
pub const DEFAULT_KNOWLEDGE_PROMPT: &str = "\
    You are ChatMig, a migration advisor grounded in a curated knowledge base. \
    Prefer the supplied context when it is relevant, say so when it is missing or \
    incomplete, and never invent legal requirements. \
    Answer didactically, concretely and with empathy.";

/// Target length used by the agent and knowledge endpoints when the style omits one.
pub const DEFAULT_LENGTH_WORDS: u32 = 1000;

/// Renders the "Style guide:" block.
///
/// With no style and no default length there is nothing to say and the
/// result is empty. `default_length` fills in a missing `length_words`.
///
/// # Examples
///
/// ```
/// use chatmig_relay::prompt::style_block;
/// use chatmig_relay::types::Style;
///
/// assert_eq!(style_block(None, None), "");
///
/// let style = Style { tone: Some("warm".into()), use_emojis: Some(false), ..Style::default() };
/// let block = style_block(Some(&style), None);
/// assert!(block.starts_with("Style guide:\nTone: warm.\nDo not use emojis."));
/// ```
pub fn style_block(style: Option<&Style>, default_length: Option<u32>) -> String {
    if style.is_none() && default_length.is_none() {
        return String::new();
    }
    let empty = Style::default();
    let style = style.unwrap_or(&empty);

    let mut lines = Vec::new();
    if let Some(length) = style.length_words.filter(|words| *words > 0).or(default_length) {
        lines.push(format!("Target length: ~{length} words (±20%)."));
    }
    if let Some(format) = style.format {
        lines.push(format!(
            "Structure: use {}; avoid filler and repetition.",
            format.as_str()
        ));
    }
    if let Some(tone) = non_blank(&style.tone) {
        lines.push(format!("Tone: {tone}."));
    }
    if let Some(audience) = non_blank(&style.audience) {
        lines.push(format!("Audience: {audience}."));
    }
    if let Some(language) = non_blank(&style.language) {
        lines.push(format!("Language: {language}."));
    }
    match style.use_emojis {
        Some(true) => lines.push("Use emojis sparingly.".to_string()),
        Some(false) => lines.push("Do not use emojis.".to_string()),
        None => {}
    }
    if let Some(guidelines) = non_blank(&style.guidelines) {
        lines.push(guidelines.to_string());
    }
    lines.push(
        "Explain the reasoning behind each step and give 1-2 concrete examples.".to_string(),
    );
    lines.push(
        "Point out risks or limitations and how to verify them with the official authority."
            .to_string(),
    );

    format!("Style guide:\n{}", lines.join("\n"))
}

/// Renders retrieved passages as `[Context #n] <content>` blocks.
pub fn context_block<'a, I>(passages: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    passages
        .into_iter()
        .enumerate()
        .map(|(index, content)| format!("[Context #{}] {content}", index + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Joins the non-empty prompt sections with blank lines.
///
/// `context` is introduced by a header so the model knows it may be partial;
/// an empty context string is still announced, which tells the model that
/// retrieval found nothing.
pub fn compose_system_prompt(base: &str, style: &str, context: Option<&str>) -> String {
    let mut sections: Vec<String> = Vec::new();
    if !base.trim().is_empty() {
        sections.push(base.trim().to_string());
    }
    if !style.trim().is_empty() {
        sections.push(style.to_string());
    }
    if let Some(context) = context {
        sections.push(format!("External context (may be incomplete):\n{context}"));
    }
    sections.join("\n\n")
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StyleFormat;

    #[test]
    fn full_style_renders_every_hint_in_order() {
        let style = Style {
            tone: Some("warm".into()),
            use_emojis: Some(true),
            length_words: Some(300),
            format: Some(StyleFormat::Bullets),
            audience: Some("beginners".into()),
            language: Some("es".into()),
            guidelines: Some("Cite official sources.".into()),
        };
        assert_eq!(
            style_block(Some(&style), Some(1000)),
            "Style guide:\n\
             Target length: ~300 words (±20%).\n\
             Structure: use bullets; avoid filler and repetition.\n\
             Tone: warm.\n\
             Audience: beginners.\n\
             Language: es.\n\
             Use emojis sparingly.\n\
             Cite official sources.\n\
             Explain the reasoning behind each step and give 1-2 concrete examples.\n\
             Point out risks or limitations and how to verify them with the official authority."
        );
    }

    #[test]
    fn default_length_applies_without_style() {
        let block = style_block(None, Some(1000));
        assert!(block.starts_with("Style guide:\nTarget length: ~1000 words (±20%).\nExplain"));
    }

    #[test]
    fn context_passages_are_numbered() {
        assert_eq!(
            context_block(["visa D7", "NIE appointment"]),
            "[Context #1] visa D7\n\n[Context #2] NIE appointment"
        );
        assert_eq!(context_block(Vec::<&str>::new()), "");
    }

    #[test]
    fn compose_skips_blank_sections() {
        assert_eq!(compose_system_prompt("", "", None), "");
        assert_eq!(compose_system_prompt(" base ", "", None), "base");
        assert_eq!(
            compose_system_prompt("base", "Style guide:\nTone: x.", Some("[Context #1] c")),
            "base\n\nStyle guide:\nTone: x.\n\n\
             External context (may be incomplete):\n[Context #1] c"
        );
    }
}
