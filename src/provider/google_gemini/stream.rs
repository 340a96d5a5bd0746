use crate::error::RelayError;
use crate::provider::Frame;

use super::types::GeminiGenerateContentResponse;

/// Maps one `streamGenerateContent?alt=sse` chunk onto its text parts.
pub(crate) fn parse_chunk(_event: Option<&str>, data: &str) -> Option<Frame> {
    let chunk: GeminiGenerateContentResponse = serde_json::from_str(data).ok()?;
    if let Some(error) = &chunk.error {
        return Some(Frame::Failed(RelayError::provider("google", error.describe())));
    }
    let texts = chunk.first_candidate_texts();
    if texts.is_empty() {
        None
    } else {
        Some(Frame::Text(texts))
    }
}
