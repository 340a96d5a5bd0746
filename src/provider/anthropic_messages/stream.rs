use crate::error::RelayError;
use crate::provider::Frame;

use super::types::AnthropicStreamEvent;

/// Maps one Messages API stream event.
///
/// The event name comes from the SSE `event:` line when present, otherwise from
/// the payload's `type`. Text may arrive as `delta.text`, `content_block.text`,
/// or inside a full `message.content` array; unknown shapes are skipped.
pub(crate) fn parse_event(
    provider: &'static str,
    event: Option<&str>,
    data: &str,
) -> Option<Frame> {
    let parsed: AnthropicStreamEvent = serde_json::from_str(data).ok()?;
    let kind = event.or(parsed.kind.as_deref()).unwrap_or_default();
    match kind {
        "message_stop" => return Some(Frame::End),
        "error" => {
            let message = parsed
                .error
                .map(|error| error.describe())
                .unwrap_or_else(|| "stream error".to_string());
            return Some(Frame::Failed(RelayError::provider(provider, message)));
        }
        "ping" => return None,
        _ => {}
    }

    let inline = parsed
        .delta
        .and_then(|delta| delta.text)
        .or_else(|| parsed.content_block.and_then(|block| block.text))
        .filter(|text| !text.is_empty());
    let texts = match inline {
        Some(text) => vec![text],
        None => parsed.message.map(|message| message.text_blocks())?,
    };
    if texts.is_empty() {
        None
    } else {
        Some(Frame::Text(texts))
    }
}
