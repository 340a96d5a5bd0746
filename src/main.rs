use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use chatmig_relay::config::Settings;
use chatmig_relay::http::reqwest::default_dyn_transport;
use chatmig_relay::server::{build_app, serve, AppState};

/// ChatMig LLM relay: one NDJSON streaming API in front of several providers.
#[derive(Parser)]
#[command(name = "chatmig-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON settings file; flags and environment variables override it
    #[arg(short, long, env = "CHATMIG_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP API host
    #[arg(long, env = "CHATMIG_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP API port
    #[arg(long, env = "CHATMIG_PORT", default_value = "8787")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CHATMIG_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// TCP connect timeout for upstream calls, in seconds
    #[arg(long, env = "CHATMIG_CONNECT_TIMEOUT", default_value = "10")]
    connect_timeout_secs: u64,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,
    #[arg(long, env = "OPENAI_BASE_URL")]
    openai_base_url: Option<String>,
    #[arg(long, env = "OPENAI_MODEL")]
    openai_model: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    anthropic_base_url: Option<String>,
    #[arg(long, env = "ANTHROPIC_MODEL")]
    anthropic_model: Option<String>,
    #[arg(long, env = "ANTHROPIC_VERSION")]
    anthropic_version: Option<String>,

    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    mistral_api_key: Option<String>,
    #[arg(long, env = "MISTRAL_BASE_URL")]
    mistral_base_url: Option<String>,
    #[arg(long, env = "MISTRAL_MODEL")]
    mistral_model: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,
    #[arg(long, env = "GEMINI_API_BASE")]
    gemini_base_url: Option<String>,
    #[arg(long, env = "GEMINI_MODEL")]
    gemini_model: Option<String>,

    /// Sampling temperature for every provider
    #[arg(long, env = "CHATMIG_TEMPERATURE")]
    temperature: Option<f32>,
    /// Nucleus sampling for every provider; unset leaves the provider default
    #[arg(long, env = "CHATMIG_TOP_P")]
    top_p: Option<f32>,
    /// Completion token ceiling for every provider
    #[arg(long, env = "CHATMIG_MAX_TOKENS")]
    max_tokens: Option<u32>,
    /// Deadline for non-streaming upstream calls, in seconds
    #[arg(long, env = "CHATMIG_REQUEST_TIMEOUT")]
    request_timeout_secs: Option<u64>,
    /// Longest silence tolerated between streamed fragments, in seconds
    #[arg(long, env = "CHATMIG_STREAM_IDLE_TIMEOUT")]
    stream_idle_timeout_secs: Option<u64>,

    #[arg(long, env = "CHATMIG_SYSTEM_PROMPT")]
    system_prompt: Option<String>,
    #[arg(long, env = "CHATMIG_DEFAULT_LENGTH_WORDS")]
    default_length_words: Option<u32>,

    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,
    #[arg(long, env = "EMBED_MODEL")]
    embed_model: Option<String>,

    /// Per-client request limit on the /proxy routes ("1" or "true" to enable)
    #[arg(long, env = "ENABLE_RATE_LIMIT", value_parser = BoolishValueParser::new())]
    enable_rate_limit: bool,
    /// Rate-limit window, in milliseconds
    #[arg(long, env = "RL_WINDOW_MS")]
    rate_limit_window_ms: Option<u64>,
    /// Requests admitted per client and window
    #[arg(long, env = "RL_MAX")]
    rate_limit_max: Option<u32>,

    /// Allowed CORS origins, comma separated
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Option<Vec<String>>,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_json::from_str::<Settings>(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Settings::default(),
        };

        override_string(&mut settings.openai.api_key, &self.openai_api_key);
        override_option(&mut settings.openai.base_url, &self.openai_base_url);
        override_option(&mut settings.openai.default_model, &self.openai_model);

        override_string(&mut settings.anthropic.api_key, &self.anthropic_api_key);
        override_option(&mut settings.anthropic.base_url, &self.anthropic_base_url);
        override_option(&mut settings.anthropic.default_model, &self.anthropic_model);
        override_string(&mut settings.anthropic_version, &self.anthropic_version);

        override_string(&mut settings.mistral.api_key, &self.mistral_api_key);
        override_option(&mut settings.mistral.base_url, &self.mistral_base_url);
        override_option(&mut settings.mistral.default_model, &self.mistral_model);

        override_string(&mut settings.google.api_key, &self.gemini_api_key);
        override_option(&mut settings.google.base_url, &self.gemini_base_url);
        override_option(&mut settings.google.default_model, &self.gemini_model);

        if let Some(temperature) = self.temperature {
            settings.generation.temperature = temperature;
        }
        if self.top_p.is_some() {
            settings.generation.top_p = self.top_p;
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.generation.max_tokens = max_tokens;
        }
        if let Some(secs) = self.request_timeout_secs {
            settings.request_timeout_secs = secs;
        }
        if let Some(secs) = self.stream_idle_timeout_secs {
            settings.stream_idle_timeout_secs = secs;
        }

        override_string(&mut settings.prompts.system_prompt, &self.system_prompt);
        if let Some(words) = self.default_length_words {
            settings.prompts.default_length_words = words;
        }

        override_option(&mut settings.retrieval.supabase_url, &self.supabase_url);
        override_option(&mut settings.retrieval.supabase_key, &self.supabase_key);
        override_string(&mut settings.retrieval.embed_model, &self.embed_model);

        if self.enable_rate_limit {
            settings.rate_limit.enabled = true;
        }
        if let Some(window_ms) = self.rate_limit_window_ms {
            settings.rate_limit.window_ms = window_ms;
        }
        if let Some(max) = self.rate_limit_max {
            settings.rate_limit.max_requests = max;
        }

        if let Some(origins) = &self.allowed_origins {
            settings.allowed_origins = origins
                .iter()
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        Ok(settings)
    }
}

fn override_string(target: &mut String, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|value| !value.trim().is_empty()) {
        *target = value.to_string();
    }
}

fn override_option(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|value| !value.trim().is_empty()) {
        *target = Some(value.to_string());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be loaded before clap reads the environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let settings = cli.settings()?;
    settings.validate().context("Invalid configuration")?;

    let transport = default_dyn_transport(Duration::from_secs(cli.connect_timeout_secs))
        .context("Failed to build HTTP client")?;
    let state = Arc::new(AppState::from_settings(&settings, transport));
    info!(
        providers = ?state.normalizer.registry().keys(),
        retrieval = settings.retrieval.is_enabled(),
        rate_limit = settings.rate_limit.enabled,
        "relay configured"
    );

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let app = build_app(state, settings.allowed_origins.clone());
    serve(listener, app).await.context("Server error")?;
    info!("relay stopped");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
