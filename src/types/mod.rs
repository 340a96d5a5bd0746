//! Canonical, provider-agnostic data model.
//!
//! Adapters translate [`Message`] sequences into each vendor's wire format and
//! translate vendor stream fragments back into [`DeltaEvent`] values, so the
//! rest of the crate never sees provider-specific payloads.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Speaker of a canonical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation.
///
/// # Examples
///
/// ```
/// use chatmig_relay::types::{Message, Role};
///
/// let msg: Message = serde_json::from_str(r#"{"role":"user","content":"hola"}"#).unwrap();
/// assert_eq!(msg, Message::user("hola"));
/// assert_eq!(msg.role, Role::User);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Provider-agnostic unit of streamed output.
///
/// A well-formed stream matches `delta* error? done`: zero or more deltas, at
/// most one error, and exactly one trailing `done`. Serialization is the NDJSON
/// wire format, one object per line.
///
/// # Examples
///
/// ```
/// use chatmig_relay::types::DeltaEvent;
///
/// assert_eq!(
///     DeltaEvent::delta("¡hola!").to_ndjson_line(),
///     "{\"type\":\"delta\",\"content\":\"¡hola!\"}\n"
/// );
/// assert_eq!(
///     DeltaEvent::error("boom").to_ndjson_line(),
///     "{\"type\":\"error\",\"error\":\"boom\"}\n"
/// );
/// assert_eq!(DeltaEvent::Done.to_ndjson_line(), "{\"type\":\"done\"}\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeltaEvent {
    /// A fragment of answer text.
    Delta { content: String },
    /// The attempt failed; text is a short diagnostic, not answer content.
    Error { error: String },
    /// Terminal marker.
    Done,
}

impl DeltaEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        Self::Delta {
            content: content.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Encodes the event as one newline-terminated NDJSON line.
    pub fn to_ndjson_line(&self) -> String {
        // Serializing a string-only enum cannot fail; fall back to a literal
        // terminator rather than panicking inside a response body.
        let mut line =
            serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"type":"done"}"#));
        line.push('\n');
        line
    }
}

/// Per-request sampling overrides; `None` keeps the configured value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sampling {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Sampling {
    /// Rejects values no provider accepts.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatmig_relay::types::Sampling;
    ///
    /// assert!(Sampling { top_p: Some(0.9), ..Sampling::default() }.check().is_ok());
    /// assert!(Sampling { temperature: Some(3.0), ..Sampling::default() }.check().is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] naming the offending field.
    pub fn check(&self) -> Result<(), RelayError> {
        let invalid = |message: &str| {
            Err(RelayError::Validation {
                message: message.to_string(),
            })
        };
        if self.temperature.is_some_and(|value| !(0.0..=2.0).contains(&value)) {
            return invalid("temperature must be between 0 and 2");
        }
        if self.top_p.is_some_and(|value| !(0.0..=1.0).contains(&value)) {
            return invalid("top_p must be between 0 and 1");
        }
        if self.max_tokens == Some(0) {
            return invalid("max_tokens must be greater than 0");
        }
        Ok(())
    }
}

/// Input handed to a provider adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterRequest {
    /// Conversation turns, excluding the system prompt.
    pub conversation: Vec<Message>,
    /// Model override; adapters fall back to their default when `None`.
    pub model: Option<String>,
    /// System prompt; may be empty.
    pub system_prompt: String,
    pub sampling: Sampling,
}

impl AdapterRequest {
    pub fn new(
        conversation: Vec<Message>,
        model: Option<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            conversation,
            model: model.filter(|model| !model.trim().is_empty()),
            system_prompt: system_prompt.into(),
            sampling: Sampling::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Layout hint folded into the style guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleFormat {
    Sections,
    Bullets,
    Paragraphs,
}

impl StyleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            StyleFormat::Sections => "sections",
            StyleFormat::Bullets => "bullets",
            StyleFormat::Paragraphs => "paragraphs",
        }
    }
}

/// Free-form display hints supplied by the client.
///
/// None of these fields change control flow; they are only rendered into the
/// system prompt by [`crate::prompt::style_block`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    pub tone: Option<String>,
    pub use_emojis: Option<bool>,
    pub length_words: Option<u32>,
    pub format: Option<StyleFormat>,
    pub audience: Option<String>,
    pub language: Option<String>,
    pub guidelines: Option<String>,
}
