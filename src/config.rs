use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::http::DynHttpTransport;
use crate::prompt::{
    DEFAULT_AGENT_PROMPT, DEFAULT_KNOWLEDGE_PROMPT, DEFAULT_LENGTH_WORDS, DEFAULT_SYSTEM_PROMPT,
};
use crate::provider::anthropic_messages::{AnthropicMessagesAdapter, ANTHROPIC_DEFAULT_VERSION};
use crate::provider::google_gemini::GoogleGeminiAdapter;
use crate::provider::openai_chat::OpenAiChatAdapter;
use crate::provider::{DynAdapter, GenerationSettings};
use crate::registry::AdapterRegistry;
use crate::retrieval::{DynRetriever, NoRetriever, SupabaseRetriever, DEFAULT_EMBED_MODEL};
use crate::session::{DEFAULT_MAX_PAIRS, DEFAULT_MAX_SESSIONS};

/// 单个供应商的配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Empty means "not configured"; requests then fail with an auth error event.
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_pairs: usize,
    pub max_sessions: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_pairs: DEFAULT_MAX_PAIRS,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

/// Vector-store lookup; disabled unless both Supabase fields are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub embed_model: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
        }
    }
}

impl RetrievalSettings {
    pub fn is_enabled(&self) -> bool {
        non_blank(&self.supabase_url).is_some() && non_blank(&self.supabase_key).is_some()
    }
}

/// Per-client fixed-window limiter on the `/proxy` routes; off by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window_ms: u64,
    /// Requests admitted per client and window.
    pub max_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: 15_000,
            max_requests: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub system_prompt: String,
    pub agent_prompt: String,
    pub knowledge_prompt: String,
    pub default_length_words: u32,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            agent_prompt: DEFAULT_AGENT_PROMPT.to_string(),
            knowledge_prompt: DEFAULT_KNOWLEDGE_PROMPT.to_string(),
            default_length_words: DEFAULT_LENGTH_WORDS,
        }
    }
}

/// Complete relay configuration.
///
/// # Examples
///
/// ```
/// use chatmig_relay::config::Settings;
///
/// let raw = r#"{"openai":{"api_key":"sk"},"request_timeout_secs":10}"#;
/// let settings: Settings = serde_json::from_str(raw).unwrap();
/// assert_eq!(settings.openai.api_key, "sk");
/// assert_eq!(settings.session.max_pairs, 12);
/// settings.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub anthropic_version: String,
    pub mistral: ProviderSettings,
    pub google: ProviderSettings,
    pub generation: GenerationSettings,
    /// Deadline for buffered (non-streaming) upstream calls.
    pub request_timeout_secs: u64,
    /// Longest allowed silence between two streamed fragments.
    pub stream_idle_timeout_secs: u64,
    pub session: SessionSettings,
    pub retrieval: RetrievalSettings,
    pub prompts: PromptSettings,
    pub rate_limit: RateLimitSettings,
    pub allowed_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai: ProviderSettings::default(),
            anthropic: ProviderSettings::default(),
            anthropic_version: ANTHROPIC_DEFAULT_VERSION.to_string(),
            mistral: ProviderSettings::default(),
            google: ProviderSettings::default(),
            generation: GenerationSettings::default(),
            request_timeout_secs: 30,
            stream_idle_timeout_secs: 60,
            session: SessionSettings::default(),
            retrieval: RetrievalSettings::default(),
            prompts: PromptSettings::default(),
            rate_limit: RateLimitSettings::default(),
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    /// Checks ranges and URLs.
    ///
    /// Missing API keys are not an error: the affected provider reports an
    /// auth failure per request instead.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), RelayError> {
        let temperature = self.generation.temperature;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid("generation.temperature", "must be between 0 and 2"));
        }
        if self.generation.top_p.is_some_and(|top_p| !(0.0..=1.0).contains(&top_p)) {
            return Err(invalid("generation.top_p", "must be between 0 and 1"));
        }
        if self.generation.max_tokens == 0 {
            return Err(invalid("generation.max_tokens", "must be greater than 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than 0"));
        }
        if self.stream_idle_timeout_secs == 0 {
            return Err(invalid("stream_idle_timeout_secs", "must be greater than 0"));
        }
        if self.session.max_pairs == 0 {
            return Err(invalid("session.max_pairs", "must be greater than 0"));
        }
        if self.session.max_sessions == 0 {
            return Err(invalid("session.max_sessions", "must be greater than 0"));
        }
        if self.rate_limit.enabled {
            if self.rate_limit.window_ms == 0 {
                return Err(invalid("rate_limit.window_ms", "must be greater than 0"));
            }
            if self.rate_limit.max_requests == 0 {
                return Err(invalid("rate_limit.max_requests", "must be greater than 0"));
            }
        }
        for (name, provider) in [
            ("openai", &self.openai),
            ("anthropic", &self.anthropic),
            ("mistral", &self.mistral),
            ("google", &self.google),
        ] {
            if let Some(base_url) = non_blank(&provider.base_url) {
                check_url(&format!("{name}.base_url"), base_url)?;
            }
        }
        match (
            non_blank(&self.retrieval.supabase_url),
            non_blank(&self.retrieval.supabase_key),
        ) {
            (Some(url), Some(_)) => check_url("retrieval.supabase_url", url)?,
            (Some(_), None) => {
                return Err(invalid("retrieval.supabase_key", "required when supabase_url is set"));
            }
            _ => {}
        }
        if self.allowed_origins.iter().any(|origin| origin.trim().is_empty()) {
            return Err(invalid("allowed_origins", "entries must not be blank"));
        }
        Ok(())
    }
}

/// 根据配置构建 AdapterRegistry
///
/// Registers `openai`, `anthropic`, `mistral` and `google`, plus `gemini` as an
/// alias sharing the Google adapter.
pub fn build_registry(settings: &Settings, transport: DynHttpTransport) -> AdapterRegistry {
    let generation = settings.generation;
    let timeout = settings.request_timeout();

    let openai = configure_openai(
        OpenAiChatAdapter::openai(transport.clone(), settings.openai.api_key.clone()),
        &settings.openai,
    )
    .with_generation(generation)
    .with_request_timeout(timeout);

    let mistral = configure_openai(
        OpenAiChatAdapter::mistral(transport.clone(), settings.mistral.api_key.clone()),
        &settings.mistral,
    )
    .with_generation(generation)
    .with_request_timeout(timeout);

    let mut anthropic =
        AnthropicMessagesAdapter::new(transport.clone(), settings.anthropic.api_key.clone())
            .with_version(settings.anthropic_version.clone())
            .with_generation(generation)
            .with_request_timeout(timeout);
    if let Some(base_url) = non_blank(&settings.anthropic.base_url) {
        anthropic = anthropic.with_base_url(base_url);
    }
    if let Some(model) = non_blank(&settings.anthropic.default_model) {
        anthropic = anthropic.with_default_model(model);
    }

    let mut google = GoogleGeminiAdapter::new(transport, settings.google.api_key.clone())
        .with_generation(generation)
        .with_request_timeout(timeout);
    if let Some(base_url) = non_blank(&settings.google.base_url) {
        google = google.with_base_url(base_url);
    }
    if let Some(model) = non_blank(&settings.google.default_model) {
        google = google.with_default_model(model);
    }
    let google: DynAdapter = Arc::new(google);

    AdapterRegistry::builder()
        .register("openai", Arc::new(openai))
        .register("anthropic", Arc::new(anthropic))
        .register("mistral", Arc::new(mistral))
        .register("google", google.clone())
        .register("gemini", google)
        .build()
}

/// Supabase retrieval when configured, otherwise [`NoRetriever`].
pub fn build_retriever(settings: &Settings, transport: DynHttpTransport) -> DynRetriever {
    let retrieval = &settings.retrieval;
    match (
        non_blank(&retrieval.supabase_url),
        non_blank(&retrieval.supabase_key),
    ) {
        (Some(url), Some(key)) => {
            let mut retriever =
                SupabaseRetriever::new(transport, settings.openai.api_key.clone(), url, key)
                    .with_embed_model(retrieval.embed_model.clone())
                    .with_timeout(settings.request_timeout());
            if let Some(base_url) = non_blank(&settings.openai.base_url) {
                retriever = retriever.with_openai_base_url(base_url);
            }
            Arc::new(retriever)
        }
        _ => Arc::new(NoRetriever),
    }
}

fn configure_openai(
    mut adapter: OpenAiChatAdapter,
    settings: &ProviderSettings,
) -> OpenAiChatAdapter {
    if let Some(base_url) = non_blank(&settings.base_url) {
        adapter = adapter.with_base_url(base_url);
    }
    if let Some(model) = non_blank(&settings.default_model) {
        adapter = adapter.with_default_model(model);
    }
    adapter
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn check_url(field: &str, value: &str) -> Result<(), RelayError> {
    let url = Url::parse(value).map_err(|err| invalid(field, &err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(field, &format!("unsupported scheme {other}"))),
    }
}

fn invalid(field: &str, reason: &str) -> RelayError {
    RelayError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
