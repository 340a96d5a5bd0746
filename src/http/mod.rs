//! Transport seam between the adapters and the concrete HTTP client.
//!
//! Adapters only ever talk to [`HttpTransport`]; production wires in
//! [`reqwest::ReqwestTransport`], tests wire in a scripted double that records
//! every request it receives.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;

use crate::error::RelayError;

/// Largest error body read back from a failed streaming call.
const MAX_ERROR_BODY_BYTES: usize = 16 * 1024;

/// HTTP methods understood by the transport abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Minimal HTTP request representation shared across adapters.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// Whole-request deadline; `None` leaves the call unbounded.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a POST request with a JSON request body.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatmig_relay::http::{HttpMethod, HttpRequest};
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.method, HttpMethod::Post);
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body: Some(body),
            timeout: None,
        }
    }

    /// Merges additional headers into the request, replacing duplicates.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use chatmig_relay::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec())
    ///     .with_headers(HashMap::from([("Authorization".into(), "Bearer test".into())]));
    /// assert_eq!(request.headers.get("Authorization"), Some(&"Bearer test".to_string()));
    /// assert!(request.headers.contains_key("Content-Type"));
    /// ```
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets the whole-request deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the body as UTF-8 text, mostly useful for assertions in tests.
    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts the body into a UTF-8 string.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatmig_relay::http::HttpResponse;
    ///
    /// let response = HttpResponse {
    ///     status: 200,
    ///     headers: Default::default(),
    ///     body: b"ok".to_vec(),
    /// };
    /// assert_eq!(response.into_string().unwrap(), "ok");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the body is not valid UTF-8.
    pub fn into_string(self) -> Result<String, RelayError> {
        String::from_utf8(self.body).map_err(|err| RelayError::transport(err.to_string()))
    }
}

/// HTTP response that carries a streaming body.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

impl HttpStreamResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drains the body of a failed call so its error payload can be decoded.
    ///
    /// Reading stops after a bounded number of bytes; invalid UTF-8 is replaced
    /// rather than reported, since the text only feeds a diagnostic.
    pub async fn collect_error_text(mut self) -> String {
        let mut bytes = Vec::new();
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(chunk) => {
                    bytes.extend_from_slice(&chunk);
                    if bytes.len() >= MAX_ERROR_BODY_BYTES {
                        bytes.truncate(MAX_ERROR_BODY_BYTES);
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Alias for the body stream returned by [`HttpTransport::send_stream`].
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, RelayError>> + Send>>;

/// Transport abstraction used to decouple adapters from the concrete HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves when the full response is available.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use chatmig_relay::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
    /// # use chatmig_relay::error::RelayError;
    /// # use futures_util::stream;
    /// struct MemoryTransport;
    ///
    /// #[async_trait]
    /// impl HttpTransport for MemoryTransport {
    ///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RelayError> {
    ///         Ok(HttpResponse { status: 200, headers: request.headers, body: b"ok".to_vec() })
    ///     }
    ///     async fn send_stream(
    ///         &self,
    ///         request: HttpRequest,
    ///     ) -> Result<HttpStreamResponse, RelayError> {
    ///         let body = Box::pin(stream::empty());
    ///         Ok(HttpStreamResponse { status: 200, headers: request.headers, body })
    ///     }
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let response = MemoryTransport
    ///     .send(HttpRequest::post_json("https://example.com", br"{}".to_vec()))
    ///     .await
    ///     .unwrap();
    /// assert_eq!(response.status, 200);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Implementations map network failures to [`RelayError::Transport`] and
    /// deadline expiry to [`RelayError::Timeout`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RelayError>;

    /// Sends a request and returns as soon as the status line and headers arrive.
    ///
    /// # Errors
    ///
    /// Implementations return [`RelayError::Transport`] for network failures.
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, RelayError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

fn encode_json<T: Serialize>(body: &T) -> Result<Vec<u8>, RelayError> {
    serde_json::to_vec(body).map_err(|err| RelayError::Validation {
        message: format!("failed to serialize request: {err}"),
    })
}

/// Serializes a body to JSON, attaches headers, and issues a buffered POST.
///
/// # Errors
///
/// Returns [`RelayError::Validation`] if serialization fails or forwards the error
/// raised by [`HttpTransport::send`].
pub async fn post_json_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
    timeout: Option<Duration>,
) -> Result<HttpResponse, RelayError> {
    let request = HttpRequest::post_json(url, encode_json(body)?)
        .with_headers(headers)
        .with_timeout(timeout);
    transport.send(request).await
}

/// Issues a JSON POST request and returns the streaming response.
///
/// Streaming calls carry no whole-request deadline; stalls are policed per
/// fragment by the normalizer instead.
///
/// # Errors
///
/// Returns [`RelayError::Validation`] when serialization fails or propagates any
/// error from [`HttpTransport::send_stream`].
pub async fn post_json_stream_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
) -> Result<HttpStreamResponse, RelayError> {
    let request = HttpRequest::post_json(url, encode_json(body)?).with_headers(headers);
    transport.send_stream(request).await
}

pub mod reqwest;
