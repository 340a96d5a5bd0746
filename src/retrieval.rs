//! Best-effort knowledge retrieval: embed the query, then ask a vector store
//! for its nearest neighbours.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::http::{post_json_with_headers, DynHttpTransport, HttpResponse};

pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 24;

/// One retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub similarity: f64,
}

/// Source of context passages for the knowledge endpoints.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Up to `top_k` passages, most similar first.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RelayError>;
}

pub type DynRetriever = Arc<dyn ContextRetriever>;

/// Clamps a requested `top_k` into `1..=24`, defaulting to 5.
pub fn clamp_top_k(top_k: Option<i64>) -> usize {
    match top_k {
        Some(value) => value.clamp(1, MAX_TOP_K as i64) as usize,
        None => DEFAULT_TOP_K,
    }
}

/// Runs `retriever`, swallowing any failure into an empty result.
pub async fn retrieve_or_empty(
    retriever: &dyn ContextRetriever,
    query: &str,
    top_k: usize,
) -> Vec<RetrievedChunk> {
    match retriever.retrieve(query, top_k).await {
        Ok(chunks) => {
            debug!(count = chunks.len(), "retrieved context");
            chunks
        }
        Err(err) => {
            warn!(error = %err, "context retrieval failed, continuing without context");
            Vec::new()
        }
    }
}

/// Used when no vector store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetriever;

#[async_trait]
impl ContextRetriever for NoRetriever {
    async fn retrieve(
        &self,
        _query: &str,
        _top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RelayError> {
        Ok(Vec::new())
    }
}

/// OpenAI embeddings plus the Supabase `match_knowledge` RPC.
pub struct SupabaseRetriever {
    transport: DynHttpTransport,
    openai_base_url: String,
    openai_api_key: String,
    embed_model: String,
    supabase_url: String,
    supabase_key: String,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct MatchKnowledgeRequest<'a> {
    query_embedding: &'a [f32],
    match_count: usize,
}

impl SupabaseRetriever {
    pub fn new(
        transport: DynHttpTransport,
        openai_api_key: impl Into<String>,
        supabase_url: impl Into<String>,
        supabase_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            openai_base_url: crate::provider::openai_chat::OPENAI_BASE_URL.to_string(),
            openai_api_key: openai_api_key.into(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            supabase_url: supabase_url.into(),
            supabase_key: supabase_key.into(),
            timeout: None,
        }
    }

    pub fn with_openai_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base_url = base_url.into();
        self
    }

    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn embeddings_endpoint(&self) -> String {
        let base = self.openai_base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/embeddings")
        } else {
            format!("{base}/v1/embeddings")
        }
    }

    fn rpc_endpoint(&self) -> String {
        format!(
            "{}/rest/v1/rpc/match_knowledge",
            self.supabase_url.trim_end_matches('/')
        )
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>, RelayError> {
        let headers = HashMap::from([(
            "Authorization".to_string(),
            format!("Bearer {}", self.openai_api_key),
        )]);
        let body = EmbeddingRequest {
            model: &self.embed_model,
            input: query,
        };
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.embeddings_endpoint(),
            headers,
            &body,
            self.timeout,
        )
        .await?;
        let parsed: EmbeddingResponse = decode("embeddings", response)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| RelayError::Retrieval {
                message: "embeddings response carried no vectors".to_string(),
            })
    }

    async fn match_knowledge(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RelayError> {
        let headers = HashMap::from([
            ("apikey".to_string(), self.supabase_key.clone()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.supabase_key),
            ),
        ]);
        let body = MatchKnowledgeRequest {
            query_embedding: embedding,
            match_count: top_k,
        };
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.rpc_endpoint(),
            headers,
            &body,
            self.timeout,
        )
        .await?;
        decode("match_knowledge", response)
    }
}

fn decode<T>(step: &str, response: HttpResponse) -> Result<T, RelayError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status;
    let text = response.into_string()?;
    if !(200..300).contains(&status) {
        return Err(RelayError::Retrieval {
            message: format!("{step} returned HTTP {status}"),
        });
    }
    serde_json::from_str(&text).map_err(|err| RelayError::Retrieval {
        message: format!("{step} response was not understood: {err}"),
    })
}

#[async_trait]
impl ContextRetriever for SupabaseRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RelayError> {
        let embedding = self.embed(query).await?;
        let mut chunks = self.match_knowledge(&embedding, top_k).await?;
        chunks.truncate(top_k);
        Ok(chunks)
    }
}
