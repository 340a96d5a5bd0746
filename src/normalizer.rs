//! Enforces the canonical event grammar on top of any adapter.
//!
//! Whatever the adapter does (yield nothing, emit a stray `done`, stall, or
//! panic halfway through), the caller sees `delta* error? done` with exactly
//! one trailing `done`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::provider::EventStream;
use crate::registry::{selected_key, AdapterRegistry};
use crate::types::{AdapterRequest, DeltaEvent};

/// Selects an adapter by key and runs it under the event grammar.
#[derive(Clone)]
pub struct StreamNormalizer {
    registry: Arc<AdapterRegistry>,
    idle_timeout: Option<Duration>,
}

impl StreamNormalizer {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            idle_timeout: None,
        }
    }

    /// Maximum silence between two upstream fragments.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Streams one completion. Never fails: unknown keys produce a single
    /// explanatory `delta` followed by `done`, without contacting any upstream.
    pub fn run(&self, provider_key: Option<&str>, request: AdapterRequest) -> EventStream {
        let key = selected_key(provider_key);
        let Some(adapter) = self.registry.get(&key) else {
            warn!(provider = %key, "unsupported provider requested");
            return Box::pin(futures_util::stream::iter(vec![
                DeltaEvent::delta(format!("unsupported provider: {key}")),
                DeltaEvent::Done,
            ]));
        };
        debug!(provider = adapter.name(), "streaming completion");
        let opened = std::panic::catch_unwind(AssertUnwindSafe(|| adapter.stream(request)));
        match opened {
            Ok(inner) => normalize(inner, self.idle_timeout),
            Err(_) => {
                warn!(provider = adapter.name(), "adapter panicked while opening stream");
                Box::pin(futures_util::stream::iter(vec![
                    DeltaEvent::error("internal error while streaming"),
                    DeltaEvent::Done,
                ]))
            }
        }
    }

    /// Buffered completion through the same registry.
    ///
    /// # Errors
    ///
    /// Unknown keys yield [`RelayError::Validation`]; adapter failures propagate.
    pub async fn complete(
        &self,
        provider_key: Option<&str>,
        request: AdapterRequest,
    ) -> Result<String, RelayError> {
        self.registry.complete(provider_key, request).await
    }
}

/// Wraps an arbitrary event stream so it obeys `delta* error? done`.
///
/// Empty deltas are dropped, everything after the first `error` or `done` is
/// discarded, a panic becomes an `error`, and when `idle_timeout` is set a
/// stall longer than it becomes a timeout `error`.
pub fn normalize(inner: EventStream, idle_timeout: Option<Duration>) -> EventStream {
    Box::pin(async_stream::stream! {
        let mut inner = AssertUnwindSafe(inner).catch_unwind();
        loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, inner.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let err = RelayError::Timeout {
                            message: format!("no data received for {}s", limit.as_secs()),
                        };
                        warn!(error = %err, "upstream stream stalled");
                        yield DeltaEvent::error(err.diagnostic());
                        break;
                    }
                },
                None => inner.next().await,
            };
            match next {
                None => break,
                Some(Ok(DeltaEvent::Delta { content })) => {
                    if !content.is_empty() {
                        yield DeltaEvent::Delta { content };
                    }
                }
                Some(Ok(DeltaEvent::Error { error })) => {
                    yield DeltaEvent::Error { error };
                    break;
                }
                Some(Ok(DeltaEvent::Done)) => break,
                Some(Err(_)) => {
                    warn!("adapter stream panicked");
                    yield DeltaEvent::error("internal error while streaming");
                    break;
                }
            }
        }
        yield DeltaEvent::Done;
    })
}

/// Running accumulation of a normalized stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transcript {
    text: String,
    failed: bool,
    finished: bool,
}

impl Transcript {
    pub fn observe(&mut self, event: &DeltaEvent) {
        match event {
            DeltaEvent::Delta { content } => self.text.push_str(content),
            DeltaEvent::Error { .. } => self.failed = true,
            DeltaEvent::Done => self.finished = true,
        }
    }

    /// The trimmed answer, only when the stream reached `done` cleanly with
    /// non-empty text.
    pub fn answer(&self) -> Option<&str> {
        let text = self.text.trim();
        (self.finished && !self.failed && !text.is_empty()).then_some(text)
    }
}
