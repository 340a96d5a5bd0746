use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub(crate) struct GeminiPart<'a> {
    pub(crate) text: &'a str,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub(crate) struct GeminiContent<'a> {
    pub(crate) role: &'static str,
    pub(crate) parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiGenerationConfig {
    pub(crate) temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) top_p: Option<f32>,
    pub(crate) max_output_tokens: u32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiGenerateContentBody<'a> {
    pub(crate) contents: Vec<GeminiContent<'a>>,
    pub(crate) generation_config: GeminiGenerationConfig,
}

/// Shape shared by buffered responses and every SSE chunk.
#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct GeminiGenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub(crate) error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct GeminiCandidateContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct GeminiResponsePart {
    #[serde(default)]
    pub(crate) text: Option<String>,
}

impl GeminiGenerateContentResponse {
    /// Non-empty text parts of the first candidate.
    pub(crate) fn first_candidate_texts(self) -> Vec<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .filter(|text| !text.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct GeminiErrorBody {
    #[serde(default)]
    pub(crate) error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub(crate) struct GeminiErrorDetail {
    #[serde(default)]
    pub(crate) code: Option<u16>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
}

impl GeminiErrorDetail {
    pub(crate) fn describe(&self) -> String {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());
        match &self.status {
            Some(status) => format!("{message} ({status})"),
            None => message,
        }
    }
}
