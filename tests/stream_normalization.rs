mod common;

use std::sync::Arc;

use chatmig_relay::config::build_registry;
use chatmig_relay::http::DynHttpTransport;
use chatmig_relay::types::{AdapterRequest, DeltaEvent, Message};
use chatmig_relay::StreamNormalizer;
use common::*;
use futures_util::StreamExt;

fn normalizer(transport: Arc<ScriptedTransport>) -> StreamNormalizer {
    let transport: DynHttpTransport = transport;
    StreamNormalizer::new(Arc::new(build_registry(&settings(), transport)))
}

fn request() -> AdapterRequest {
    AdapterRequest::new(
        vec![Message::user("¿Qué visado necesito?")],
        None,
        "You are a test persona.",
    )
}

async fn collect(normalizer: &StreamNormalizer, key: Option<&str>) -> Vec<DeltaEvent> {
    normalizer.run(key, request()).collect().await
}

fn deltas(events: &[DeltaEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            DeltaEvent::Delta { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

/// `delta* error? done`, with exactly one `done` at the end.
fn assert_grammar(events: &[DeltaEvent]) {
    assert_eq!(events.last(), Some(&DeltaEvent::Done), "stream must end with done: {events:?}");
    let body = &events[..events.len() - 1];
    assert!(!body.contains(&DeltaEvent::Done), "done must appear once: {events:?}");
    let errors = body
        .iter()
        .filter(|event| matches!(event, DeltaEvent::Error { .. }))
        .count();
    assert!(errors <= 1, "at most one error: {events:?}");
    if errors == 1 {
        assert!(
            matches!(body.last(), Some(DeltaEvent::Error { .. })),
            "error must directly precede done: {events:?}"
        );
    }
}

#[tokio::test]
async fn every_provider_streams_the_canonical_grammar() {
    let transport = shared(
        ScriptedTransport::new()
            .stream(OPENAI_BASE, 200, openai_sse(&["Ho", "la"]))
            .stream(MISTRAL_BASE, 200, openai_sse(&["Bon", "jour"]))
            .stream(ANTHROPIC_BASE, 200, anthropic_sse(&["Hel", "lo"]))
            .stream(GOOGLE_BASE, 200, gemini_sse(&["Ciao", " mondo"])),
    );
    let normalizer = normalizer(transport.clone());

    let cases = [
        ("openai", vec!["Ho", "la"]),
        ("mistral", vec!["Bon", "jour"]),
        ("anthropic", vec!["Hel", "lo"]),
        ("google", vec!["Ciao", " mondo"]),
    ];
    for (key, expected) in cases {
        let events = collect(&normalizer, Some(key)).await;
        assert_grammar(&events);
        assert_eq!(deltas(&events), expected, "provider {key}");
        assert!(!events.iter().any(|event| matches!(event, DeltaEvent::Error { .. })));
    }
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn provider_keys_are_case_insensitive_and_default_to_openai() {
    let transport = shared(ScriptedTransport::new().stream(OPENAI_BASE, 200, openai_sse(&["ok"])));
    let normalizer = normalizer(transport.clone());

    assert_eq!(deltas(&collect(&normalizer, None).await), vec!["ok"]);
    assert_eq!(deltas(&collect(&normalizer, Some("  OpenAI ")).await), vec!["ok"]);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn gemini_alias_reaches_the_google_adapter() {
    let transport = shared(ScriptedTransport::new().stream(GOOGLE_BASE, 200, gemini_sse(&["sí"])));
    let normalizer = normalizer(transport.clone());

    let events = collect(&normalizer, Some("gemini")).await;
    assert_eq!(events, vec![DeltaEvent::delta("sí"), DeltaEvent::Done]);
    let url = &transport.requests()[0].url;
    assert!(url.contains(":streamGenerateContent?alt=sse&key=g-key"), "{url}");
}

#[tokio::test]
async fn unknown_provider_explains_itself_without_calling_upstream() {
    let transport = shared(ScriptedTransport::new());
    let normalizer = normalizer(transport.clone());

    let events = collect(&normalizer, Some("cohere")).await;
    assert_eq!(
        events,
        vec![DeltaEvent::delta("unsupported provider: cohere"), DeltaEvent::Done]
    );
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn non_success_status_becomes_a_single_error_event() {
    let transport = shared(
        ScriptedTransport::new()
            .stream(OPENAI_BASE, 500, r#"{"error":{"message":"overloaded"}}"#)
            .stream(
                ANTHROPIC_BASE,
                429,
                r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#,
            )
            .stream(
                GOOGLE_BASE,
                403,
                r#"{"error":{"code":403,"message":"denied","status":"PERMISSION_DENIED"}}"#,
            ),
    );
    let normalizer = normalizer(transport);

    for key in ["openai", "anthropic", "google"] {
        let events = collect(&normalizer, Some(key)).await;
        assert_grammar(&events);
        assert_eq!(events.len(), 2, "{key}: {events:?}");
        assert!(matches!(events[0], DeltaEvent::Error { .. }), "{key}: {events:?}");
    }
}

#[tokio::test]
async fn missing_api_key_fails_without_network() {
    let transport = shared(ScriptedTransport::new());
    let mut settings = settings();
    settings.mistral.api_key.clear();
    let dyn_transport: DynHttpTransport = transport.clone();
    let normalizer = StreamNormalizer::new(Arc::new(build_registry(&settings, dyn_transport)));

    let events = collect(&normalizer, Some("mistral")).await;
    assert_grammar(&events);
    assert!(matches!(&events[0], DeltaEvent::Error { error } if error.contains("mistral")));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let body = sse(&[
        "{not json",
        r#"{"choices":[{"delta":{"content":"a"}}]}"#,
        r#"{"choices":[]}"#,
        r#"{"choices":[{"delta":{"content":"b"}}]}"#,
        "[DONE]",
    ]);
    let transport = shared(ScriptedTransport::new().stream(OPENAI_BASE, 200, body));
    let normalizer = normalizer(transport);

    let events = collect(&normalizer, Some("openai")).await;
    assert_eq!(
        events,
        vec![DeltaEvent::delta("a"), DeltaEvent::delta("b"), DeltaEvent::Done]
    );
}

#[tokio::test]
async fn in_band_error_stops_the_stream() {
    let body = sse(&[
        r#"{"choices":[{"delta":{"content":"partial"}}]}"#,
        r#"{"error":{"message":"context length exceeded"}}"#,
        r#"{"choices":[{"delta":{"content":"never"}}]}"#,
    ]);
    let transport = shared(ScriptedTransport::new().stream(OPENAI_BASE, 200, body));
    let normalizer = normalizer(transport);

    let events = collect(&normalizer, Some("openai")).await;
    assert_grammar(&events);
    assert_eq!(deltas(&events), vec!["partial"]);
    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn streamed_text_matches_buffered_completion() {
    let transport = shared(
        ScriptedTransport::new()
            .stream(OPENAI_BASE, 200, openai_sse(&["Necesitas ", "un visado ", "D7."]))
            .json(OPENAI_BASE, 200, openai_json("Necesitas un visado D7.")),
    );
    let normalizer = normalizer(transport.clone());

    let streamed: String = deltas(&collect(&normalizer, Some("openai")).await).concat();
    let buffered = normalizer
        .complete(Some("openai"), request())
        .await
        .expect("buffered completion");
    assert_eq!(streamed, buffered);

    let stream_body = transport.request_json(0);
    let buffered_body = transport.request_json(1);
    assert_eq!(stream_body["stream"], true);
    assert_eq!(buffered_body["stream"], false);
    assert_eq!(stream_body["messages"], buffered_body["messages"]);
    assert_eq!(stream_body["messages"][0]["role"], "system");
}

#[tokio::test]
async fn surrounding_whitespace_survives_both_paths() {
    let transport = shared(
        ScriptedTransport::new()
            .stream(OPENAI_BASE, 200, openai_sse(&["\n\nHola", " mundo\n"]))
            .json(OPENAI_BASE, 200, openai_json("\n\nHola mundo\n")),
    );
    let normalizer = normalizer(transport);

    let streamed: String = deltas(&collect(&normalizer, Some("openai")).await).concat();
    let buffered = normalizer
        .complete(Some("openai"), request())
        .await
        .expect("buffered completion");
    assert_eq!(streamed, "\n\nHola mundo\n");
    assert_eq!(streamed, buffered);
}
