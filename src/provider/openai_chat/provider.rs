use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::RelayError;
use crate::http::{post_json_stream_with_headers, post_json_with_headers, DynHttpTransport};
use crate::provider::{
    guard_stream, require_api_key, sse_fragments, EventStream, FragmentStream, GenerationSettings,
    ProviderAdapter,
};
use crate::types::AdapterRequest;

use super::error::parse_openai_error;
use super::request::build_openai_body;
use super::stream::parse_chunk;
use super::types::OpenAiChatResponse;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const MISTRAL_DEFAULT_MODEL: &str = "mistral-small";

/// Adapter for OpenAI-compatible Chat Completions endpoints.
///
/// OpenAI and Mistral speak the same protocol and differ only in name, base
/// URL, and default model.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    pub(crate) name: &'static str,
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: String,
    pub(crate) generation: GenerationSettings,
    pub(crate) request_timeout: Option<Duration>,
}

impl OpenAiChatAdapter {
    /// 创建 OpenAI Adapter
    pub fn openai(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self::compatible("openai", transport, api_key, OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL)
    }

    /// 创建 Mistral Adapter
    pub fn mistral(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self::compatible("mistral", transport, api_key, MISTRAL_BASE_URL, MISTRAL_DEFAULT_MODEL)
    }

    /// Any other vendor exposing `/v1/chat/completions`.
    pub fn compatible(
        name: &'static str,
        transport: DynHttpTransport,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name,
            transport,
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            generation: GenerationSettings::default(),
            request_timeout: None,
        }
    }

    /// 自定义 base_url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 设置默认模型
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    /// Deadline for buffered completions.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers.insert("Accept".to_string(), "text/event-stream".to_string());
        headers
    }

    fn resolve_model<'a>(&'a self, request: &'a AdapterRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.default_model)
    }

    async fn open_stream(self, request: AdapterRequest) -> Result<FragmentStream, RelayError> {
        require_api_key(self.name, &self.api_key)?;
        let model = self.resolve_model(&request);
        debug!(provider = self.name, model, "opening chat completions stream");
        let generation = self.generation.with_overrides(&request.sampling);
        let body = build_openai_body(&request, model, generation, true);
        let response = post_json_stream_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(),
            &body,
        )
        .await?;
        if !response.is_success() {
            let status = response.status;
            let headers = response.headers.clone();
            let text = response.collect_error_text().await;
            return Err(parse_openai_error(self.name, status, &headers, &text));
        }
        let provider = self.name;
        Ok(sse_fragments(response.body, provider, move |event, data| {
            parse_chunk(provider, event, data)
        }))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiChatAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn stream(&self, request: AdapterRequest) -> EventStream {
        let adapter = self.clone();
        guard_stream(self.name, async move { adapter.open_stream(request).await })
    }

    async fn complete(&self, request: AdapterRequest) -> Result<String, RelayError> {
        require_api_key(self.name, &self.api_key)?;
        let model = self.resolve_model(&request);
        let generation = self.generation.with_overrides(&request.sampling);
        let body = build_openai_body(&request, model, generation, false);
        let mut headers = self.build_headers();
        headers.insert("Accept".to_string(), "application/json".to_string());
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            headers,
            &body,
            self.request_timeout,
        )
        .await?;
        let status = response.status;
        let response_headers = response.headers.clone();
        let text = response.into_string()?;
        if !(200..300).contains(&status) {
            return Err(parse_openai_error(self.name, status, &response_headers, &text));
        }
        let parsed: OpenAiChatResponse =
            serde_json::from_str(&text).map_err(|err| RelayError::Provider {
                provider: self.name,
                message: format!("failed to parse completion: {err}"),
            })?;
        Ok(parsed.text().unwrap_or_default())
    }
}
