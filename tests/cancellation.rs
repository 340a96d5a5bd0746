mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chatmig_relay::config::build_registry;
use chatmig_relay::error::RelayError;
use chatmig_relay::http::{
    DynHttpTransport, HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};
use chatmig_relay::server::{build_app, ndjson_response, AppState};
use chatmig_relay::types::{AdapterRequest, DeltaEvent, Message};
use chatmig_relay::StreamNormalizer;
use common::{settings, sse};
use futures_util::{stream, StreamExt};
use tower::ServiceExt;

/// Sets its flag when the upstream body that owns it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Streams one delta and then never finishes.
#[derive(Default)]
struct HangingTransport {
    dropped: Arc<AtomicBool>,
}

impl HangingTransport {
    fn body_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for HangingTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, RelayError> {
        Err(RelayError::transport("buffered calls are not scripted"))
    }

    async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, RelayError> {
        let head = sse(&[r#"{"choices":[{"delta":{"content":"Hola"}}]}"#]).into_bytes();
        let guard = DropFlag(self.dropped.clone());
        let body: HttpBodyStream = Box::pin(
            stream::iter(vec![Ok(head)])
                .chain(stream::pending())
                .map(move |chunk| {
                    let _held = &guard;
                    chunk
                }),
        );
        Ok(HttpStreamResponse {
            status: 200,
            headers: HashMap::new(),
            body,
        })
    }
}

fn request() -> AdapterRequest {
    AdapterRequest::new(vec![Message::user("hola")], None, "")
}

fn normalizer(transport: Arc<HangingTransport>) -> StreamNormalizer {
    let transport: DynHttpTransport = transport;
    StreamNormalizer::new(Arc::new(build_registry(&settings(), transport)))
}

#[tokio::test]
async fn dropping_the_event_stream_releases_the_upstream_body() {
    let transport = Arc::new(HangingTransport::default());
    let normalizer = normalizer(transport.clone());

    let mut events = normalizer.run(Some("openai"), request());
    assert_eq!(events.next().await, Some(DeltaEvent::delta("Hola")));
    assert!(!transport.body_dropped());

    drop(events);
    assert!(transport.body_dropped());
}

#[tokio::test]
async fn dropping_the_ndjson_body_releases_the_upstream_body() {
    let transport = Arc::new(HangingTransport::default());
    let normalizer = normalizer(transport.clone());

    let response = ndjson_response(normalizer.run(Some("openai"), request()));
    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.expect("first chunk").expect("bytes");
    assert_eq!(&first[..], b"{\"type\":\"delta\",\"content\":\"Hola\"}\n");
    assert!(!transport.body_dropped());

    drop(body);
    assert!(transport.body_dropped());
}

#[tokio::test]
async fn client_disconnect_on_a_route_releases_the_upstream_body() {
    let transport = Arc::new(HangingTransport::default());
    let dyn_transport: DynHttpTransport = transport.clone();
    let state = Arc::new(AppState::from_settings(&settings(), dyn_transport));
    let app = build_app(state, Vec::new());

    let request = Request::builder()
        .method("POST")
        .uri("/proxy/openai/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"query":"hola"}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    assert!(body.next().await.is_some());
    assert!(!transport.body_dropped());

    drop(body);
    assert!(transport.body_dropped());
}
