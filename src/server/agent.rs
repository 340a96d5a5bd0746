use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::normalizer::Transcript;
use crate::prompt::{compose_system_prompt, style_block};
use crate::provider::EventStream;
use crate::session::DynSessionStore;
use crate::types::{AdapterRequest, DeltaEvent, Message, Style};

use super::{ndjson_response, ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AgentBody {
    pub(crate) query: String,
    pub(crate) session_id: Option<String>,
    pub(crate) style: Option<Style>,
    pub(crate) provider: Option<String>,
    pub(crate) model: Option<String>,
}

/// A validated agent turn.
struct AgentTurn {
    query: String,
    session_id: Option<String>,
    provider: Option<String>,
    request: AdapterRequest,
}

impl AgentTurn {
    fn prepare(body: AgentBody, state: &AppState) -> Result<Self, ApiError> {
        let query = body.query.trim().to_string();
        if query.is_empty() {
            return Err(ApiError::empty_query());
        }
        let session_id = body
            .session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let mut conversation = session_id
            .as_deref()
            .map(|id| state.sessions.history(id))
            .unwrap_or_default();
        conversation.push(Message::user(query.clone()));

        let style = style_block(
            body.style.as_ref(),
            Some(state.prompts.default_length_words),
        );
        let system_prompt = compose_system_prompt(&state.prompts.agent_prompt, &style, None);
        Ok(Self {
            query,
            session_id,
            provider: body.provider,
            request: AdapterRequest::new(conversation, body.model, system_prompt),
        })
    }
}

/// Passes events through unchanged and stores the turn once the stream ends
/// cleanly, just before `done` is forwarded.
fn remember_on_completion(
    events: EventStream,
    sessions: DynSessionStore,
    session_id: Option<String>,
    query: String,
) -> EventStream {
    let Some(session_id) = session_id else {
        return events;
    };
    Box::pin(async_stream::stream! {
        let mut events = events;
        let mut transcript = Transcript::default();
        while let Some(event) = events.next().await {
            transcript.observe(&event);
            if matches!(event, DeltaEvent::Done) {
                if let Some(answer) = transcript.answer() {
                    debug!(session = %session_id, "remembering agent turn");
                    sessions.remember(&session_id, &query, answer);
                }
            }
            yield event;
        }
    })
}

pub(crate) async fn complete_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AgentBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let turn = AgentTurn::prepare(body, &state)?;
    let events = state.normalizer.run(turn.provider.as_deref(), turn.request);
    Ok(ndjson_response(remember_on_completion(
        events,
        state.sessions.clone(),
        turn.session_id,
        turn.query,
    )))
}

pub(crate) async fn complete(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AgentBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let turn = AgentTurn::prepare(body, &state)?;
    let answer = state
        .normalizer
        .complete(turn.provider.as_deref(), turn.request)
        .await?;
    let answer = answer.trim().to_string();
    if let Some(session_id) = &turn.session_id {
        if !answer.is_empty() {
            state.sessions.remember(session_id, &turn.query, &answer);
        }
    }
    Ok(Json(json!({ "answer": answer })))
}
