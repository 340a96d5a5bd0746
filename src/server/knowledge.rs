use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::prompt::{compose_system_prompt, context_block, style_block};
use crate::retrieval::{clamp_top_k, retrieve_or_empty, RetrievedChunk};
use crate::types::{AdapterRequest, Message, Style};

use super::{ndjson_response, ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct KnowledgeBody {
    pub(crate) query: String,
    pub(crate) top_k: Option<i64>,
    pub(crate) style: Option<Style>,
    pub(crate) provider: Option<String>,
    pub(crate) model: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct KnowledgeAnswer {
    answer: String,
    retrieved: Vec<RetrievedChunk>,
}

/// Retrieves context (best effort) and builds the adapter request around it.
///
/// Retrieval is skipped when the provider key is not registered.
async fn prepare(
    body: KnowledgeBody,
    state: &AppState,
) -> Result<(Option<String>, AdapterRequest, Vec<RetrievedChunk>), ApiError> {
    let query = body.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::empty_query());
    }
    // Unknown providers are answered without touching retrieval.
    let retrieved = if state.normalizer.registry().resolve(body.provider.as_deref()).is_ok() {
        let top_k = clamp_top_k(body.top_k);
        retrieve_or_empty(state.retriever.as_ref(), &query, top_k).await
    } else {
        Vec::new()
    };
    let context = context_block(retrieved.iter().map(|chunk| chunk.content.as_str()));
    let style = style_block(
        body.style.as_ref(),
        Some(state.prompts.default_length_words),
    );
    let system_prompt =
        compose_system_prompt(&state.prompts.knowledge_prompt, &style, Some(&context));
    let request = AdapterRequest::new(vec![Message::user(query)], body.model, system_prompt);
    Ok((body.provider, request, retrieved))
}

pub(crate) async fn complete_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<KnowledgeBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let (provider, request, _) = prepare(body, &state).await?;
    Ok(ndjson_response(state.normalizer.run(provider.as_deref(), request)))
}

pub(crate) async fn complete(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<KnowledgeBody>, JsonRejection>,
) -> Result<Json<KnowledgeAnswer>, ApiError> {
    let Json(body) = payload?;
    let (provider, request, retrieved) = prepare(body, &state).await?;
    let answer = state.normalizer.complete(provider.as_deref(), request).await?;
    Ok(Json(KnowledgeAnswer {
        answer: answer.trim().to_string(),
        retrieved,
    }))
}
