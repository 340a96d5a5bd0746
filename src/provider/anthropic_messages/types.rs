use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub(crate) struct AnthropicTextBlock<'a> {
    #[serde(rename = "type")]
    pub(crate) kind: &'static str,
    pub(crate) text: &'a str,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub(crate) struct AnthropicMessage<'a> {
    pub(crate) role: &'static str,
    pub(crate) content: Vec<AnthropicTextBlock<'a>>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub(crate) struct AnthropicMessagesBody<'a> {
    pub(crate) model: &'a str,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) top_p: Option<f32>,
    pub(crate) stream: bool,
    pub(crate) messages: Vec<AnthropicMessage<'a>>,
}

/// Content block as it appears in responses and stream events.
#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct AnthropicContentBlock {
    #[serde(rename = "type", default)]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) text: Option<String>,
}

impl AnthropicContentBlock {
    fn is_text(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == "text")
    }
}

/// Full message object, returned by buffered calls and by `message_start`.
#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct AnthropicMessageResponse {
    #[serde(default)]
    pub(crate) content: Vec<AnthropicContentBlock>,
}

impl AnthropicMessageResponse {
    /// Non-empty text blocks, in order.
    pub(crate) fn text_blocks(self) -> Vec<String> {
        self.content
            .into_iter()
            .filter(AnthropicContentBlock::is_text)
            .filter_map(|block| block.text)
            .filter(|text| !text.is_empty())
            .collect()
    }
}

/// One typed stream event. Only the fields that can carry text are modeled.
#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct AnthropicStreamEvent {
    #[serde(rename = "type", default)]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) delta: Option<AnthropicContentBlock>,
    #[serde(default)]
    pub(crate) content_block: Option<AnthropicContentBlock>,
    #[serde(default)]
    pub(crate) message: Option<AnthropicMessageResponse>,
    #[serde(default)]
    pub(crate) error: Option<AnthropicErrorDetail>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct AnthropicErrorBody {
    #[serde(default)]
    pub(crate) error: Option<AnthropicErrorDetail>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct AnthropicErrorDetail {
    #[serde(rename = "type", default)]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

impl AnthropicErrorDetail {
    pub(crate) fn describe(&self) -> String {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        match &self.kind {
            Some(kind) => format!("{message} ({kind})"),
            None => message,
        }
    }
}
