use std::collections::HashMap;

use crate::error::RelayError;
use crate::provider::{classify_status, raw_error_message};

use super::types::AnthropicErrorBody;

/// Parses error responses returned by the Anthropic Messages API.
pub(crate) fn parse_anthropic_error(
    status: u16,
    headers: &HashMap<String, String>,
    body: &str,
) -> RelayError {
    let message = serde_json::from_str::<AnthropicErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .map(|error| error.describe())
        .unwrap_or_else(|| raw_error_message(body));
    classify_status("anthropic", status, message, headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rate_limit_carries_retry_after() {
        let body =
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"Too many requests"}}"#;
        let headers = HashMap::from([("retry-after".to_string(), "30".to_string())]);
        match parse_anthropic_error(429, &headers, body) {
            RelayError::RateLimit {
                message,
                retry_after,
            } => {
                assert_eq!(message, "anthropic: Too many requests (rate_limit_error)");
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_body_still_produces_upstream_error() {
        match parse_anthropic_error(529, &HashMap::new(), "") {
            RelayError::Upstream { status, message, .. } => {
                assert_eq!(status, 529);
                assert_eq!(message, "empty error body");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
