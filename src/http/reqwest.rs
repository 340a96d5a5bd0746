use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method};

use crate::error::RelayError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};

/// Production [`HttpTransport`] backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps an existing client, e.g. one configured with a proxy.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client with a bounded connect phase.
    ///
    /// Only connection establishment is bounded here: per-request deadlines
    /// travel on [`HttpRequest::timeout`] so streaming calls can stay open.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, RelayError> {
        Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map(Self::new)
            .map_err(|err| RelayError::transport(format!("failed to create reqwest client: {err}")))
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }

    fn build_request(
        &self,
        mut request: HttpRequest,
    ) -> Result<reqwest::RequestBuilder, RelayError> {
        let mut builder = self.client.request(Self::method(request.method), &request.url);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in request.headers.drain() {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| RelayError::transport(format!("invalid header name: {err}")))?;
            let header_value = reqwest::header::HeaderValue::from_str(&value).map_err(|err| {
                RelayError::transport(format!("invalid header value for {header_name}: {err}"))
            })?;
            builder = builder.header(header_name, header_value);
        }

        if let Some(body) = request.body.take() {
            builder = builder.body(body);
        }

        Ok(builder)
    }

    fn headers_to_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

/// Keeps URLs out of client-visible diagnostics: Gemini carries its API key in
/// the query string.
fn map_reqwest_error(err: reqwest::Error) -> RelayError {
    let err = err.without_url();
    if err.is_timeout() {
        RelayError::Timeout {
            message: err.to_string(),
        }
    } else {
        RelayError::transport(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RelayError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, RelayError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(map_reqwest_error));
        let body: HttpBodyStream = Box::pin(stream);

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Convenience constructor for a shareable transport.
pub fn default_dyn_transport(connect_timeout: Duration) -> Result<DynHttpTransport, RelayError> {
    Ok(Arc::new(ReqwestTransport::with_connect_timeout(
        connect_timeout,
    )?))
}
