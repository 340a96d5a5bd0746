//! Google Gemini `streamGenerateContent` adapter.

mod error;
mod provider;
mod request;
mod stream;
mod types;

pub use provider::{GoogleGeminiAdapter, GEMINI_BASE_URL, GEMINI_DEFAULT_MODEL};
