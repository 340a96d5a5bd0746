//! Anthropic Messages adapter.

mod error;
mod provider;
mod request;
mod stream;
mod types;

pub use provider::{
    AnthropicMessagesAdapter, ANTHROPIC_BASE_URL, ANTHROPIC_DEFAULT_MODEL,
    ANTHROPIC_DEFAULT_VERSION,
};
