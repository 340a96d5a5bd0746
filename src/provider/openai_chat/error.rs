use std::collections::HashMap;

use crate::error::RelayError;
use crate::provider::{classify_status, raw_error_message};

use super::types::OpenAiErrorBody;

/// Decodes a failed Chat Completions response (`{"error": {"message", "code"}}`).
pub(crate) fn parse_openai_error(
    provider: &'static str,
    status: u16,
    headers: &HashMap<String, String>,
    body: &str,
) -> RelayError {
    let message = serde_json::from_str::<OpenAiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .map(|error| error.describe())
        .unwrap_or_else(|| raw_error_message(body));
    classify_status(provider, status, message, headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_error_keeps_message_and_code() {
        let body = concat!(
            r#"{"error":{"message":"Incorrect API key provided","#,
            r#""type":"invalid_request_error","code":"invalid_api_key"}}"#,
        );
        match parse_openai_error("openai", 401, &HashMap::new(), body) {
            RelayError::Auth { message } => {
                assert_eq!(message, "openai: Incorrect API key provided (invalid_api_key)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unstructured_error_falls_back_to_raw_body() {
        match parse_openai_error("mistral", 502, &HashMap::new(), "<html>Bad gateway</html>") {
            RelayError::Upstream {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, "mistral");
                assert_eq!(status, 502);
                assert_eq!(message, "<html>Bad gateway</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
