use serde::{Deserialize, Serialize};

/// Outgoing chat message; the canonical roles map one-to-one.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub(crate) struct OpenAiMessage<'a> {
    pub(crate) role: &'static str,
    pub(crate) content: &'a str,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub(crate) struct OpenAiChatBody<'a> {
    pub(crate) model: &'a str,
    pub(crate) messages: Vec<OpenAiMessage<'a>>,
    pub(crate) temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) top_p: Option<f32>,
    pub(crate) max_tokens: u32,
    pub(crate) stream: bool,
}

/// One `data:` frame of a streamed completion.
#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct OpenAiStreamChunk {
    #[serde(default)]
    pub(crate) choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    pub(crate) error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct OpenAiStreamChoice {
    #[serde(default)]
    pub(crate) delta: Option<OpenAiDelta>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct OpenAiDelta {
    #[serde(default)]
    pub(crate) content: Option<String>,
}

/// Buffered (non-streaming) completion.
#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct OpenAiChatResponse {
    #[serde(default)]
    pub(crate) choices: Vec<OpenAiResponseChoice>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct OpenAiResponseChoice {
    #[serde(default)]
    pub(crate) message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct OpenAiResponseMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
}

impl OpenAiChatResponse {
    /// Text of the first choice, verbatim.
    pub(crate) fn text(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.content.as_deref())
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct OpenAiErrorBody {
    #[serde(default)]
    pub(crate) error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct OpenAiErrorDetail {
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) code: Option<serde_json::Value>,
}

impl OpenAiErrorDetail {
    pub(crate) fn describe(&self) -> String {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        match &self.code {
            Some(serde_json::Value::String(code)) => format!("{message} ({code})"),
            Some(serde_json::Value::Number(code)) => format!("{message} ({code})"),
            _ => message,
        }
    }
}
