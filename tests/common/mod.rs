#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatmig_relay::config::{ProviderSettings, Settings};
use chatmig_relay::error::RelayError;
use chatmig_relay::http::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};
use futures_util::stream;
use parking_lot::Mutex;

pub const OPENAI_BASE: &str = "http://openai.test/v1";
pub const ANTHROPIC_BASE: &str = "http://anthropic.test";
pub const MISTRAL_BASE: &str = "http://mistral.test/v1";
pub const GOOGLE_BASE: &str = "http://google.test/v1beta";
pub const SUPABASE_BASE: &str = "http://supabase.test";

/// Canned answer for every request whose URL starts with `prefix`.
struct Route {
    prefix: String,
    status: u16,
    stream_body: String,
    body: String,
}

/// Transport double: serves scripted bodies by URL prefix and records every
/// request. Streaming bodies are cut into small chunks so frames straddle
/// chunk boundaries.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Vec<Route>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, prefix: &str, status: u16, body: impl Into<String>) -> Self {
        self.upsert(prefix, status).stream_body = body.into();
        self
    }

    pub fn json(mut self, prefix: &str, status: u16, body: impl Into<String>) -> Self {
        self.upsert(prefix, status).body = body.into();
        self
    }

    fn upsert(&mut self, prefix: &str, status: u16) -> &mut Route {
        let index = match self.routes.iter().position(|route| route.prefix == prefix) {
            Some(index) => index,
            None => {
                self.routes.push(Route {
                    prefix: prefix.to_string(),
                    status,
                    stream_body: String::new(),
                    body: String::new(),
                });
                self.routes.len() - 1
            }
        };
        let route = &mut self.routes[index];
        route.status = status;
        route
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn request_json(&self, index: usize) -> serde_json::Value {
        let requests = self.requests.lock();
        let body = requests[index].body.as_deref().expect("request body");
        serde_json::from_slice(body).expect("json body")
    }

    fn find(&self, url: &str) -> Result<&Route, RelayError> {
        self.routes
            .iter()
            .find(|route| url.starts_with(&route.prefix))
            .ok_or_else(|| RelayError::transport(format!("no scripted route for {url}")))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RelayError> {
        self.requests.lock().push(request.clone());
        let route = self.find(&request.url)?;
        Ok(HttpResponse {
            status: route.status,
            headers: HashMap::new(),
            body: route.body.as_bytes().to_vec(),
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, RelayError> {
        self.requests.lock().push(request.clone());
        let route = self.find(&request.url)?;
        let chunks: Vec<Result<Vec<u8>, RelayError>> = route
            .stream_body
            .as_bytes()
            .chunks(11)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(HttpStreamResponse {
            status: route.status,
            headers: HashMap::new(),
            body: Box::pin(stream::iter(chunks)),
        })
    }
}

/// Settings pointing every provider at a scripted host.
pub fn settings() -> Settings {
    let provider = |key: &str, base: &str| ProviderSettings {
        api_key: key.to_string(),
        base_url: Some(base.to_string()),
        default_model: None,
    };
    Settings {
        openai: provider("sk-openai", OPENAI_BASE),
        anthropic: provider("sk-anthropic", ANTHROPIC_BASE),
        mistral: provider("sk-mistral", MISTRAL_BASE),
        google: provider("g-key", GOOGLE_BASE),
        ..Settings::default()
    }
}

pub fn with_retrieval(mut settings: Settings) -> Settings {
    settings.retrieval.supabase_url = Some(SUPABASE_BASE.to_string());
    settings.retrieval.supabase_key = Some("service-role".to_string());
    settings
}

pub fn shared(transport: ScriptedTransport) -> Arc<ScriptedTransport> {
    Arc::new(transport)
}

/// Joins `data:` payloads into an SSE body.
pub fn sse(frames: &[&str]) -> String {
    frames.iter().map(|frame| format!("data: {frame}\n\n")).collect()
}

pub fn openai_sse(fragments: &[&str]) -> String {
    let role = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
    let mut frames: Vec<String> = vec![role.to_string()];
    frames.extend(fragments.iter().map(|text| {
        serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": text } }] }).to_string()
    }));
    frames.push("[DONE]".to_string());
    let refs: Vec<&str> = frames.iter().map(String::as_str).collect();
    sse(&refs)
}

pub fn anthropic_sse(fragments: &[&str]) -> String {
    let mut body = String::from(
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"content\":[]}}\n\n",
    );
    for text in fragments {
        let data = serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": text }
        });
        body.push_str(&format!("event: content_block_delta\ndata: {data}\n\n"));
    }
    body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    body
}

pub fn gemini_sse(fragments: &[&str]) -> String {
    let frames: Vec<String> = fragments
        .iter()
        .map(|text| {
            serde_json::json!({
                "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
            })
            .to_string()
        })
        .collect();
    let refs: Vec<&str> = frames.iter().map(String::as_str).collect();
    sse(&refs)
}

pub fn openai_json(text: &str) -> String {
    serde_json::json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
    })
    .to_string()
}
