use std::env;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use futures_util::StreamExt;
use chatmig_relay::config::{build_registry, ProviderSettings, Settings};
use chatmig_relay::http::reqwest::default_dyn_transport;
use chatmig_relay::types::{AdapterRequest, DeltaEvent, Message};
use chatmig_relay::StreamNormalizer;

fn load_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn live_settings() -> Settings {
    let provider = |key: &str, base: &str, model: &str| ProviderSettings {
        api_key: load_env_var(key).unwrap_or_default(),
        base_url: load_env_var(base),
        default_model: load_env_var(model),
    };
    Settings {
        openai: provider("OPENAI_API_KEY", "OPENAI_BASE_URL", "OPENAI_MODEL"),
        anthropic: provider("ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL", "ANTHROPIC_MODEL"),
        mistral: provider("MISTRAL_API_KEY", "MISTRAL_BASE_URL", "MISTRAL_MODEL"),
        google: provider("GEMINI_API_KEY", "GEMINI_API_BASE", "GEMINI_MODEL"),
        ..Settings::default()
    }
}

#[tokio::test]
#[ignore = "requires provider API keys"]
async fn live_providers_stream_and_complete() {
    let _ = dotenv();
    let settings = live_settings();
    let transport = default_dyn_transport(Duration::from_secs(10)).expect("transport");
    let normalizer = StreamNormalizer::new(Arc::new(build_registry(&settings, transport)))
        .with_idle_timeout(Duration::from_secs(60));

    let configured = [
        ("openai", &settings.openai),
        ("anthropic", &settings.anthropic),
        ("mistral", &settings.mistral),
        ("google", &settings.google),
    ];
    for (key, provider) in configured {
        if provider.api_key.is_empty() {
            eprintln!("skip {key}: no API key");
            continue;
        }
        let request = AdapterRequest::new(
            vec![Message::user("Reply with the single word: pong")],
            None,
            "You are a terse assistant.",
        );

        let events: Vec<DeltaEvent> = normalizer.run(Some(key), request.clone()).collect().await;
        assert_eq!(events.last(), Some(&DeltaEvent::Done), "{key}: {events:?}");
        assert!(
            !events.iter().any(|event| matches!(event, DeltaEvent::Error { .. })),
            "{key}: {events:?}"
        );
        let streamed: String = events
            .iter()
            .filter_map(|event| match event {
                DeltaEvent::Delta { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert!(streamed.to_lowercase().contains("pong"), "{key}: {streamed}");

        let buffered = normalizer
            .complete(Some(key), request)
            .await
            .unwrap_or_else(|err| panic!("{key} complete failed: {err}"));
        assert!(buffered.to_lowercase().contains("pong"), "{key}: {buffered}");
    }
}
