use crate::provider::GenerationSettings;
use crate::types::AdapterRequest;

use super::types::{OpenAiChatBody, OpenAiMessage};

/// Builds the Chat Completions body; a non-empty system prompt goes first.
pub(crate) fn build_openai_body<'a>(
    request: &'a AdapterRequest,
    model: &'a str,
    generation: GenerationSettings,
    stream: bool,
) -> OpenAiChatBody<'a> {
    let mut messages = Vec::with_capacity(request.conversation.len() + 1);
    if !request.system_prompt.trim().is_empty() {
        messages.push(OpenAiMessage {
            role: "system",
            content: &request.system_prompt,
        });
    }
    messages.extend(request.conversation.iter().map(|message| OpenAiMessage {
        role: message.role.as_str(),
        content: &message.content,
    }));

    OpenAiChatBody {
        model,
        messages,
        temperature: generation.temperature,
        top_p: generation.top_p,
        max_tokens: generation.max_tokens,
        stream,
    }
}
