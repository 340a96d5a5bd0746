use crate::provider::GenerationSettings;
use crate::types::{AdapterRequest, Role};

use super::types::{AnthropicMessage, AnthropicMessagesBody, AnthropicTextBlock};

/// Builds the Messages API body.
///
/// The system prompt travels as a leading user turn tagged `[system]`; every
/// non-assistant turn is sent as `user`.
pub(crate) fn build_anthropic_body<'a>(
    request: &'a AdapterRequest,
    system_turn: Option<&'a str>,
    model: &'a str,
    generation: GenerationSettings,
    stream: bool,
) -> AnthropicMessagesBody<'a> {
    let mut messages = Vec::with_capacity(request.conversation.len() + 1);
    if let Some(system) = system_turn {
        messages.push(text_message("user", system));
    }
    for message in &request.conversation {
        let role = match message.role {
            Role::Assistant => "assistant",
            Role::User | Role::System => "user",
        };
        messages.push(text_message(role, &message.content));
    }
    AnthropicMessagesBody {
        model,
        max_tokens: generation.max_tokens,
        temperature: generation.temperature,
        top_p: generation.top_p,
        stream,
        messages,
    }
}

fn text_message<'a>(role: &'static str, text: &'a str) -> AnthropicMessage<'a> {
    AnthropicMessage {
        role,
        content: vec![AnthropicTextBlock { kind: "text", text }],
    }
}
