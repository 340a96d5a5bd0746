//! OpenAI-compatible Chat Completions adapter (OpenAI, Mistral).

mod error;
mod provider;
mod request;
mod stream;
mod types;

pub use provider::{
    OpenAiChatAdapter, MISTRAL_BASE_URL, MISTRAL_DEFAULT_MODEL, OPENAI_BASE_URL,
    OPENAI_DEFAULT_MODEL,
};
