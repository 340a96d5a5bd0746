use std::collections::HashMap;

use crate::error::RelayError;
use crate::provider::{classify_status, raw_error_message};

use super::types::GeminiErrorBody;

/// Parses error payloads returned by the Gemini API.
///
/// The HTTP status wins over the `error.code` echoed in the body.
pub(crate) fn parse_gemini_error(
    status: u16,
    headers: &HashMap<String, String>,
    body: &str,
) -> RelayError {
    let message = serde_json::from_str::<GeminiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .map(|error| error.describe())
        .unwrap_or_else(|| raw_error_message(body));
    classify_status("google", status, message, headers)
}
