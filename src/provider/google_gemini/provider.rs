use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use crate::error::RelayError;
use crate::http::{post_json_stream_with_headers, post_json_with_headers, DynHttpTransport};
use crate::provider::{
    guard_stream, require_api_key, sse_fragments, system_turn, EventStream, FragmentStream,
    GenerationSettings, ProviderAdapter,
};
use crate::types::AdapterRequest;

use super::error::parse_gemini_error;
use super::request::build_gemini_body;
use super::stream::parse_chunk;
use super::types::GeminiGenerateContentResponse;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";

const PROVIDER: &str = "google";

/// Google Gemini GenerateContent adapter.
///
/// The API key travels in the `key` query parameter.
#[derive(Clone)]
pub struct GoogleGeminiAdapter {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: String,
    pub(crate) generation: GenerationSettings,
    pub(crate) request_timeout: Option<Duration>,
}

impl GoogleGeminiAdapter {
    /// Creates an adapter that targets the default Generative Language endpoint.
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: GEMINI_DEFAULT_MODEL.to_string(),
            generation: GenerationSettings::default(),
            request_timeout: None,
        }
    }

    /// Overrides the base URL, making it easier to point at proxies or compatibility layers.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model used when the request omits one, such as `gemini-2.0-flash`.
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

    /// Builds `{base}/models/{model}:{method}` with the query pairs appended.
    pub(crate) fn endpoint(
        &self,
        model: &str,
        method: &str,
        sse: bool,
    ) -> Result<String, RelayError> {
        let base = self.base_url.trim_end_matches('/');
        let model_path = normalize_model(model);
        let raw = if base.ends_with("/v1beta") || base.ends_with("/v1") {
            format!("{base}/{model_path}:{method}")
        } else {
            format!("{base}/v1beta/{model_path}:{method}")
        };
        let mut url = Url::parse(&raw).map_err(|err| RelayError::InvalidConfig {
            field: "google.base_url".to_string(),
            reason: err.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            if sse {
                query.append_pair("alt", "sse");
            }
            query.append_pair("key", &self.api_key);
        }
        Ok(url.into())
    }

    fn resolve_model<'a>(&'a self, request: &'a AdapterRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.default_model)
    }

    async fn open_stream(self, request: AdapterRequest) -> Result<FragmentStream, RelayError> {
        require_api_key(PROVIDER, &self.api_key)?;
        let model = self.resolve_model(&request);
        debug!(provider = PROVIDER, model, "opening streamGenerateContent");
        let url = self.endpoint(model, "streamGenerateContent", true)?;
        let system = system_turn(&request.system_prompt);
        let generation = self.generation.with_overrides(&request.sampling);
        let body = build_gemini_body(&request, system.as_deref(), generation);
        let response =
            post_json_stream_with_headers(self.transport.as_ref(), url, HashMap::new(), &body)
                .await?;
        if !response.is_success() {
            let status = response.status;
            let headers = response.headers.clone();
            let text = response.collect_error_text().await;
            return Err(parse_gemini_error(status, &headers, &text));
        }
        Ok(sse_fragments(response.body, PROVIDER, parse_chunk))
    }
}

/// Accepts both `gemini-1.5-flash` and `models/gemini-1.5-flash`.
fn normalize_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl ProviderAdapter for GoogleGeminiAdapter {
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
        let url = self.endpoint(model, "generateContent", false)?;
        let system = system_turn(&request.system_prompt);
        let generation = self.generation.with_overrides(&request.sampling);
        let body = build_gemini_body(&request, system.as_deref(), generation);
        let response = post_json_with_headers(
            self.transport.as_ref(),
            url,
            HashMap::new(),
            &body,
            self.request_timeout,
        )
        .await?;
        let status = response.status;
        let headers = response.headers.clone();
        let text = response.into_string()?;
        if !(200..300).contains(&status) {
            return Err(parse_gemini_error(status, &headers, &text));
        }
        let parsed: GeminiGenerateContentResponse =
            serde_json::from_str(&text).map_err(|err| RelayError::Provider {
                provider: PROVIDER,
                message: format!("failed to parse Gemini response: {err}"),
            })?;
        Ok(parsed.first_candidate_texts().concat())
    }
}
