use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::prompt::{compose_system_prompt, style_block};
use crate::types::{AdapterRequest, Message, Role, Sampling, Style};

use super::{ndjson_response, ApiError, AppState};

/// Body accepted by the chat and proxy endpoints.
///
/// Either a full `messages` list, a bare `query`, or both (the query is then
/// appended as the final user turn). Sampling fields override the configured
/// defaults for this request only.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ChatBody {
    pub(crate) provider: Option<String>,
    pub(crate) model: Option<String>,
    pub(crate) messages: Vec<Message>,
    pub(crate) query: Option<String>,
    pub(crate) style: Option<Style>,
    pub(crate) temperature: Option<f32>,
    pub(crate) top_p: Option<f32>,
    pub(crate) max_tokens: Option<u32>,
}

impl ChatBody {
    /// Splits off the first system message, folds in the style guide and
    /// rejects requests with nothing to answer.
    pub(crate) fn into_adapter_request(
        self,
        default_system: &str,
    ) -> Result<AdapterRequest, ApiError> {
        let sampling = Sampling {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        };
        sampling.check()?;

        let mut system = None;
        let mut conversation = Vec::with_capacity(self.messages.len() + 1);
        for message in self.messages {
            match message.role {
                Role::System => {
                    if system.is_none() {
                        system = Some(message.content);
                    }
                }
                Role::User | Role::Assistant => conversation.push(message),
            }
        }
        if let Some(query) = self.query.map(|query| query.trim().to_string()) {
            if !query.is_empty() {
                conversation.push(Message::user(query));
            }
        }
        if conversation.iter().all(|message| message.content.trim().is_empty()) {
            return Err(ApiError::empty_query());
        }

        let base = system.unwrap_or_else(|| default_system.to_string());
        let style = style_block(self.style.as_ref(), None);
        Ok(AdapterRequest::new(
            conversation,
            self.model,
            compose_system_prompt(&base, &style, None),
        )
        .with_sampling(sampling))
    }
}

pub(crate) async fn complete_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(mut body) = payload?;
    let provider = body.provider.take();
    let request = body.into_adapter_request(&state.prompts.system_prompt)?;
    let events = state.normalizer.run(provider.as_deref(), request);
    Ok(ndjson_response(events))
}
