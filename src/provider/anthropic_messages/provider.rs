use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::RelayError;
use crate::http::{post_json_stream_with_headers, post_json_with_headers, DynHttpTransport};
use crate::provider::{
    guard_stream, require_api_key, sse_fragments, system_turn, EventStream, FragmentStream,
    GenerationSettings, ProviderAdapter,
};
use crate::types::AdapterRequest;

use super::error::parse_anthropic_error;
use super::request::build_anthropic_body;
use super::stream::parse_event;
use super::types::AnthropicMessageResponse;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
pub const ANTHROPIC_DEFAULT_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "anthropic";

/// Anthropic Messages Adapter（兼容 Claude 3.x Messages API）
#[derive(Clone)]
pub struct AnthropicMessagesAdapter {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) version: String,
    pub(crate) default_model: String,
    pub(crate) generation: GenerationSettings,
    pub(crate) request_timeout: Option<Duration>,
}

impl AnthropicMessagesAdapter {
    /// 使用默认 base_url 与 anthropic-version 创建 Adapter
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key: api_key.into(),
            version: ANTHROPIC_DEFAULT_VERSION.to_string(),
            default_model: ANTHROPIC_DEFAULT_MODEL.to_string(),
            generation: GenerationSettings::default(),
            request_timeout: None,
        }
    }

    /// 自定义 base_url，便于接入代理或兼容层
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 自定义 Anthropic API 版本（anthropic-version）
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 设置默认模型名称
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), self.api_key.clone());
        headers.insert("anthropic-version".to_string(), self.version.clone());
        headers
    }

    fn resolve_model<'a>(&'a self, request: &'a AdapterRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.default_model)
    }

    async fn open_stream(self, request: AdapterRequest) -> Result<FragmentStream, RelayError> {
        require_api_key(PROVIDER, &self.api_key)?;
        let model = self.resolve_model(&request);
        debug!(provider = PROVIDER, model, "opening messages stream");
        let system = system_turn(&request.system_prompt);
        let generation = self.generation.with_overrides(&request.sampling);
        let body = build_anthropic_body(&request, system.as_deref(), model, generation, true);
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
            return Err(parse_anthropic_error(status, &headers, &text));
        }
        Ok(sse_fragments(response.body, PROVIDER, |event, data| {
            parse_event(PROVIDER, event, data)
        }))
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicMessagesAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn stream(&self, request: AdapterRequest) -> EventStream {
        let adapter = self.clone();
        guard_stream(PROVIDER, async move { adapter.open_stream(request).await })
    }

    async fn complete(&self, request: AdapterRequest) -> Result<String, RelayError> {
        require_api_key(PROVIDER, &self.api_key)?;
        let model = self.resolve_model(&request);
        let system = system_turn(&request.system_prompt);
        let generation = self.generation.with_overrides(&request.sampling);
        let body = build_anthropic_body(&request, system.as_deref(), model, generation, false);
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(),
            &body,
            self.request_timeout,
        )
        .await?;
        let status = response.status;
        let headers = response.headers.clone();
        let text = response.into_string()?;
        if !(200..300).contains(&status) {
            return Err(parse_anthropic_error(status, &headers, &text));
        }
        let parsed: AnthropicMessageResponse =
            serde_json::from_str(&text).map_err(|err| RelayError::Provider {
                provider: PROVIDER,
                message: format!("failed to parse message: {err}"),
            })?;
        Ok(parsed.text_blocks().concat())
    }
}
