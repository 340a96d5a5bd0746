use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde_json::{json, Value};

use super::chat::ChatBody;
use super::{ndjson_response, ApiError, AppState};

/// `POST /proxy/{provider}/stream`: the provider comes from the path.
pub(crate) async fn stream(
    State(state): State<Arc<AppState>>,
    provider: Result<Path<String>, PathRejection>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Path(provider) = provider?;
    let Json(body) = payload?;
    let request = body.into_adapter_request(&state.prompts.system_prompt)?;
    Ok(ndjson_response(state.normalizer.run(Some(&provider), request)))
}

/// `POST /proxy/{provider}/complete`: buffered, answers `{"text": ...}` with the
/// text trimmed.
pub(crate) async fn complete(
    State(state): State<Arc<AppState>>,
    provider: Result<Path<String>, PathRejection>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(provider) = provider?;
    let Json(body) = payload?;
    let request = body.into_adapter_request(&state.prompts.system_prompt)?;
    let text = state.normalizer.complete(Some(&provider), request).await?;
    Ok(Json(json!({ "text": text.trim() })))
}
