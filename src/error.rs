use std::time::Duration;

use thiserror::Error;

/// Upper bound on the diagnostic text carried by an `error` event.
const MAX_DIAGNOSTIC_CHARS: usize = 300;

/// Aggregates every failure mode the relay can observe.
///
/// Adapters never let these escape into the client stream directly: the
/// normalizer turns them into a single `error` event via [`RelayError::diagnostic`],
/// and the HTTP layer maps the few that can surface there onto status codes.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Reports invalid or missing credentials.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// Indicates that the provider throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        /// Raw message returned by the upstream provider.
        message: String,
        /// Optional wait duration suggested by the provider before retrying.
        retry_after: Option<Duration>,
    },
    /// Signals validation failures in the request payload.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
    /// Non-2xx answer from an upstream provider.
    #[error("{provider} upstream returned HTTP {status}: {message}")]
    Upstream {
        provider: &'static str,
        status: u16,
        message: String,
    },
    /// Wraps provider-defined errors that cannot be normalized.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Registry key of the provider, such as `anthropic`.
        provider: &'static str,
        /// Human-readable error message returned by the provider.
        message: String,
    },
    /// The upstream stopped producing fragments for longer than allowed.
    #[error("upstream timed out: {message}")]
    Timeout { message: String },
    /// Embedding or vector-store lookup failed.
    #[error("context retrieval failed: {message}")]
    Retrieval { message: String },
    /// Catches opaque or unexpected failures.
    #[error("unknown error: {message}")]
    Unknown { message: String },
}

impl RelayError {
    /// Creates an [`RelayError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatmig_relay::error::RelayError;
    ///
    /// let err = RelayError::transport("dns lookup failed");
    /// assert!(matches!(err, RelayError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`RelayError::Provider`] with the given provider key and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatmig_relay::error::RelayError;
    ///
    /// let err = RelayError::provider("mistral", "bad JSON payload");
    /// assert!(matches!(err, RelayError::Provider { provider: "mistral", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Short, single-line text suitable for an `error` event.
    ///
    /// Newlines are flattened and the text is cut at a fixed number of characters
    /// so a verbose upstream error page cannot flood the client stream.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatmig_relay::error::RelayError;
    ///
    /// let err = RelayError::Upstream {
    ///     provider: "openai",
    ///     status: 401,
    ///     message: "bad key".into(),
    /// };
    /// assert_eq!(err.diagnostic(), "openai upstream returned HTTP 401: bad key");
    /// ```
    pub fn diagnostic(&self) -> String {
        let mut text = match self {
            RelayError::RateLimit {
                message,
                retry_after: Some(wait),
            } => format!("rate limited: {message} (retry after {}s)", wait.as_secs()),
            other => other.to_string(),
        };
        text = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if text.chars().count() > MAX_DIAGNOSTIC_CHARS {
            text = text.chars().take(MAX_DIAGNOSTIC_CHARS).collect::<String>();
            text.push('…');
        }
        text
    }
}
