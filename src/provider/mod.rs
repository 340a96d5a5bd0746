use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::http::HttpBodyStream;
use crate::sse::{SseDecoder, SseFrame};
use crate::types::{AdapterRequest, DeltaEvent, Sampling};

pub mod anthropic_messages;
pub mod google_gemini;
pub mod openai_chat;

/// Canonical events produced by an adapter. Never contains `done`; the
/// normalizer owns the terminal marker.
pub type EventStream = Pin<Box<dyn Stream<Item = DeltaEvent> + Send>>;

/// Raw text fragments pulled out of a provider stream.
pub(crate) type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Unified adapter trait; every upstream vendor implements it to join the registry.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry key, e.g. `anthropic`.
    fn name(&self) -> &'static str;

    /// Model used when the request does not name one.
    fn default_model(&self) -> &str;

    /// Opens one upstream streaming call and yields canonical events lazily.
    ///
    /// Every failure (missing key, non-2xx, broken connection) is reported as a
    /// single trailing [`DeltaEvent::Error`]; nothing is raised to the caller.
    /// Each call opens a fresh upstream connection.
    fn stream(&self, request: AdapterRequest) -> EventStream;

    /// Buffered, non-streaming variant bounded by the request timeout.
    ///
    /// The text is returned verbatim and equals the concatenated deltas of the
    /// matching stream; callers trim for presentation.
    async fn complete(&self, request: AdapterRequest) -> Result<String, RelayError>;
}

/// Thread-safe adapter handle.
pub type DynAdapter = Arc<dyn ProviderAdapter>;

/// Global sampling knobs shared by every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Nucleus sampling; omitted from upstream bodies when `None`.
    pub top_p: Option<f32>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: 2048,
            top_p: None,
        }
    }
}

impl GenerationSettings {
    /// Applies a request's overrides on top of the configured values.
    pub fn with_overrides(self, sampling: &Sampling) -> Self {
        Self {
            temperature: sampling.temperature.unwrap_or(self.temperature),
            max_tokens: sampling.max_tokens.unwrap_or(self.max_tokens),
            top_p: sampling.top_p.or(self.top_p),
        }
    }
}

/// What one provider frame contributes to the answer.
#[derive(Debug)]
pub(crate) enum Frame {
    /// Non-empty text spans, in order.
    Text(Vec<String>),
    /// The provider signalled the end of the answer.
    End,
    /// The provider reported an in-band error.
    Failed(RelayError),
}

/// Converts the adapter's fallible opening step plus its fragment stream into
/// an infallible [`EventStream`].
pub(crate) fn guard_stream<F>(provider: &'static str, open: F) -> EventStream
where
    F: Future<Output = Result<FragmentStream, RelayError>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut fragments = match open.await {
            Ok(fragments) => fragments,
            Err(err) => {
                warn!(provider, error = %err, "upstream stream could not be opened");
                yield DeltaEvent::error(err.diagnostic());
                return;
            }
        };
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => {
                    if !text.is_empty() {
                        yield DeltaEvent::delta(text);
                    }
                }
                Err(err) => {
                    warn!(provider, error = %err, "upstream stream failed");
                    yield DeltaEvent::error(err.diagnostic());
                    return;
                }
            }
        }
    })
}

/// Decodes an SSE body and maps every frame through `parse`.
///
/// `parse` returning `None` means "skip this frame"; that is how malformed or
/// uninteresting frames are tolerated without aborting the stream.
pub(crate) fn sse_fragments<P>(
    body: HttpBodyStream,
    provider: &'static str,
    parse: P,
) -> FragmentStream
where
    P: Fn(Option<&str>, &str) -> Option<Frame> + Send + 'static,
{
    let mut decoder = SseDecoder::new(body, provider);
    Box::pin(async_stream::stream! {
        while let Some(frame) = decoder.next().await {
            let (event, data) = match frame {
                Ok(SseFrame::Data { event, data }) => (event, data),
                Ok(SseFrame::Done) => return,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            match parse(event.as_deref(), &data) {
                Some(Frame::Text(texts)) => {
                    for text in texts {
                        yield Ok(text);
                    }
                }
                Some(Frame::End) => return,
                Some(Frame::Failed(err)) => {
                    yield Err(err);
                    return;
                }
                None => debug!(provider, "skipping frame without text"),
            }
        }
    })
}

/// Maps a failed upstream status onto the error taxonomy.
pub(crate) fn classify_status(
    provider: &'static str,
    status: u16,
    message: String,
    headers: &HashMap<String, String>,
) -> RelayError {
    match status {
        401 | 403 => RelayError::Auth {
            message: format!("{provider}: {message}"),
        },
        429 => RelayError::RateLimit {
            message: format!("{provider}: {message}"),
            retry_after: retry_after_from_headers(headers),
        },
        _ => RelayError::Upstream {
            provider,
            status,
            message,
        },
    }
}

/// Numeric `Retry-After` header, if present; HTTP-date values are ignored.
fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Fails fast when the adapter was configured without credentials.
pub(crate) fn require_api_key(provider: &'static str, api_key: &str) -> Result<(), RelayError> {
    if api_key.trim().is_empty() {
        Err(RelayError::Auth {
            message: format!("no API key configured for {provider}"),
        })
    } else {
        Ok(())
    }
}

/// Leading user turn for vendors without a system role: `"[system]\n<prompt>"`,
/// or `None` for a blank prompt.
pub(crate) fn system_turn(system_prompt: &str) -> Option<String> {
    if system_prompt.trim().is_empty() {
        None
    } else {
        Some(format!("[system]\n{system_prompt}"))
    }
}

/// Short fallback text for error bodies that are not structured JSON.
pub(crate) fn raw_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty error body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn body(chunks: &[&str]) -> HttpBodyStream {
        let chunks: Vec<Result<Vec<u8>, RelayError>> =
            chunks.iter().map(|chunk| Ok(chunk.as_bytes().to_vec())).collect();
        Box::pin(stream::iter(chunks))
    }

    fn echo(_event: Option<&str>, data: &str) -> Option<Frame> {
        match data {
            "stop" => Some(Frame::End),
            "fail" => Some(Frame::Failed(RelayError::provider("test", "in-band"))),
            "skip" => None,
            text => Some(Frame::Text(vec![text.to_string()])),
        }
    }

    #[tokio::test]
    async fn guard_stream_converts_open_failure_into_single_error() {
        let events: Vec<_> = guard_stream("test", async {
            Err::<FragmentStream, _>(RelayError::transport("refused"))
        })
        .collect()
        .await;
        assert_eq!(events, vec![DeltaEvent::error("transport error: refused")]);
    }

    #[tokio::test]
    async fn sse_fragments_skip_and_stop() {
        let fragments = sse_fragments(
            body(&["data: a\n\ndata: skip\n\ndata: b\n\ndata: stop\n\ndata: c\n\n"]),
            "test",
            echo,
        );
        let events: Vec<_> = guard_stream("test", async move { Ok(fragments) })
            .collect()
            .await;
        assert_eq!(events, vec![DeltaEvent::delta("a"), DeltaEvent::delta("b")]);
    }

    #[tokio::test]
    async fn in_band_failure_ends_stream_with_error() {
        let body = body(&["data: a\n\ndata: fail\n\ndata: b\n\n"]);
        let fragments = sse_fragments(body, "test", echo);
        let events: Vec<_> = guard_stream("test", async move { Ok(fragments) })
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                DeltaEvent::delta("a"),
                DeltaEvent::error("provider test error: in-band")
            ]
        );
    }

    #[test]
    fn request_overrides_replace_only_what_they_set() {
        let configured = GenerationSettings::default();
        let merged = configured.with_overrides(&Sampling {
            temperature: Some(0.2),
            top_p: Some(0.95),
            max_tokens: None,
        });
        assert_eq!(merged.temperature, 0.2);
        assert_eq!(merged.top_p, Some(0.95));
        assert_eq!(merged.max_tokens, configured.max_tokens);
        assert_eq!(configured.with_overrides(&Sampling::default()), configured);
    }

    #[test]
    fn system_turn_is_tagged_and_skips_blank_prompts() {
        assert_eq!(system_turn("be brief").as_deref(), Some("[system]\nbe brief"));
        assert_eq!(system_turn(" \n"), None);
    }

    #[test]
    fn classify_status_maps_auth_and_rate_limits() {
        let headers = HashMap::from([("Retry-After".to_string(), "12".to_string())]);
        assert!(matches!(
            classify_status("openai", 401, "bad key".into(), &HashMap::new()),
            RelayError::Auth { .. }
        ));
        match classify_status("openai", 429, "slow".into(), &headers) {
            RelayError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(12)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            classify_status("openai", 503, "down".into(), &HashMap::new()),
            RelayError::Upstream { status: 503, .. }
        ));
    }
}
