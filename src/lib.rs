//! Multi-provider LLM relay.
//!
//! Requests name a provider (`openai`, `anthropic`, `mistral`, `google`); the
//! matching [`provider::ProviderAdapter`] translates the canonical conversation
//! into that vendor's wire format, and the [`normalizer::StreamNormalizer`]
//! turns whatever comes back into the NDJSON `delta* error? done` protocol.

pub mod config;
pub mod error;
pub mod http;
pub mod normalizer;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod sse;
pub mod types;

pub use error::RelayError;
pub use normalizer::StreamNormalizer;
pub use provider::{DynAdapter, ProviderAdapter};
pub use registry::AdapterRegistry;
pub use types::*;
