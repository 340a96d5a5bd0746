use crate::error::RelayError;
use crate::provider::Frame;

use super::types::OpenAiStreamChunk;

/// Maps one Chat Completions `data:` frame.
///
/// Frames that fail to parse or carry no text yield `None` and are skipped.
pub(crate) fn parse_chunk(
    provider: &'static str,
    _event: Option<&str>,
    data: &str,
) -> Option<Frame> {
    let chunk: OpenAiStreamChunk = serde_json::from_str(data).ok()?;
    if let Some(error) = chunk.error {
        return Some(Frame::Failed(RelayError::provider(provider, error.describe())));
    }
    let texts: Vec<String> = chunk
        .choices
        .into_iter()
        .take(1)
        .filter_map(|choice| choice.delta)
        .filter_map(|delta| delta.content)
        .filter(|content| !content.is_empty())
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(Frame::Text(texts))
    }
}
