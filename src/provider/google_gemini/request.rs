use crate::provider::GenerationSettings;
use crate::types::{AdapterRequest, Role};

use super::types::{GeminiContent, GeminiGenerateContentBody, GeminiGenerationConfig, GeminiPart};

/// Builds a `generateContent` body.
///
/// Gemini only knows `user` and `model`; the system prompt is passed in as an
/// already tagged leading user turn.
pub(crate) fn build_gemini_body<'a>(
    request: &'a AdapterRequest,
    system_turn: Option<&'a str>,
    generation: GenerationSettings,
) -> GeminiGenerateContentBody<'a> {
    let mut contents = Vec::with_capacity(request.conversation.len() + 1);
    if let Some(system) = system_turn {
        contents.push(text_content("user", system));
    }
    for message in &request.conversation {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant | Role::System => "model",
        };
        contents.push(text_content(role, &message.content));
    }
    GeminiGenerateContentBody {
        contents,
        generation_config: GeminiGenerationConfig {
            temperature: generation.temperature,
            top_p: generation.top_p,
            max_output_tokens: generation.max_tokens,
        },
    }
}

fn text_content<'a>(role: &'static str, text: &'a str) -> GeminiContent<'a> {
    GeminiContent {
        role,
        parts: vec![GeminiPart { text }],
    }
}
