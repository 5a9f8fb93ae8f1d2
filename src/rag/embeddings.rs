//! Batched HTTP client for the external embedding/rerank model server (§4.1).
//!
//! The server itself is an external collaborator exposing `/embed`,
//! `/sparse-embed` and `/late-interaction-embed`; this module is only the
//! client side of that contract, generalized from the teacher's
//! `EmbeddingModelType` table (which wrapped the local `fastembed` models)
//! into a static table of remote model names, since encoding now happens on
//! the other side of an HTTP call rather than in-process.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::types::{AppError, Result, SparseVector};
use crate::utils::config::EmbeddingConfig;

/// A batch is never larger than this, regardless of waste ratio.
pub const MAX_BATCH_SIZE: usize = 50;
/// A batch closes before exceeding this fraction of wasted padding.
pub const MAX_WASTE_RATIO: f32 = 0.10;
/// Retry budget for a single batch dispatch.
pub const MAX_RETRIES: u32 = 5;

/// Encoding kind, used to pick the server endpoint and to build the sticky
/// routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncodeKind {
    Dense,
    Sparse,
    LateInteraction,
}

impl EncodeKind {
    fn path(self) -> &'static str {
        match self {
            Self::Dense => "/embed",
            Self::Sparse => "/sparse-embed",
            Self::LateInteraction => "/late-interaction-embed",
        }
    }
}

/// Metadata describing a model the server can run, surfaced to clients via
/// `GET /utility/encoding-models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub dimensions: usize,
    pub max_context_length: usize,
    pub multilingual: bool,
}

/// Static table of dense models the server is assumed to host, generalized
/// from the teacher's `EmbeddingModelType::all()`/`dimensions()` pair.
pub fn dense_models() -> Vec<ModelDescriptor> {
    vec![
        named("bge-small-en-v1.5", 384, 512, false),
        named("bge-base-en-v1.5", 768, 512, false),
        named("bge-large-en-v1.5", 1024, 512, false),
        named("multilingual-e5-large", 1024, 512, true),
        named("nomic-embed-text-v1.5", 768, 8192, false),
    ]
}

/// Sparse (SPLADE-family) models.
pub fn sparse_models() -> Vec<ModelDescriptor> {
    vec![named("splade-pp-en-v1", 30522, 512, false)]
}

/// Late-interaction (ColBERT-family) reranker models.
pub fn reranker_models() -> Vec<ModelDescriptor> {
    vec![named("colbert-v2.0", 128, 512, false)]
}

fn named(name: &'static str, dimensions: usize, max_context_length: usize, multilingual: bool) -> ModelDescriptor {
    ModelDescriptor {
        name: name.to_string(),
        dimensions,
        max_context_length,
        multilingual,
    }
}

/// Model name wrapper accepted from collection settings; round-trips through
/// `Display`/`FromStr` so it behaves like the enum it's standing in for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName(pub String);

impl Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ModelName {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

#[derive(Serialize)]
struct EmbedRequestBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct DenseEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct SparseEmbedResponse {
    embeddings: Vec<SparseVectorWire>,
}

#[derive(Deserialize)]
struct SparseVectorWire {
    indices: Vec<u32>,
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct LateInteractionEmbedResponse {
    embeddings: Vec<Vec<Vec<f32>>>,
}

/// HTTP client for the embedding/rerank server, with length-bucketed
/// batching and sticky routing.
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("embedding client config is always valid");
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn encode_dense(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        self.encode_batched(texts, model, EncodeKind::Dense, |bytes| {
            let parsed: DenseEmbedResponse = serde_json::from_slice(bytes)?;
            Ok(parsed.embeddings)
        })
        .await
    }

    pub async fn encode_sparse(&self, texts: &[String], model: &str) -> Result<Vec<SparseVector>> {
        self.encode_batched(texts, model, EncodeKind::Sparse, |bytes| {
            let parsed: SparseEmbedResponse = serde_json::from_slice(bytes)?;
            Ok(parsed
                .embeddings
                .into_iter()
                .map(|w| SparseVector { indices: w.indices, values: w.values })
                .collect())
        })
        .await
    }

    pub async fn encode_late_interaction(&self, texts: &[String], model: &str) -> Result<Vec<Vec<Vec<f32>>>> {
        self.encode_batched(texts, model, EncodeKind::LateInteraction, |bytes| {
            let parsed: LateInteractionEmbedResponse = serde_json::from_slice(bytes)?;
            Ok(parsed.embeddings)
        })
        .await
    }

    /// Shared batching/dispatch/reassembly machinery for all three encode
    /// kinds: sort by length, pack greedily under `MAX_BATCH_SIZE` and
    /// `MAX_WASTE_RATIO`, dispatch each batch with retries, then restore
    /// the caller's original order.
    async fn encode_batched<T: Clone>(
        &self,
        texts: &[String],
        model: &str,
        kind: EncodeKind,
        parse: impl Fn(&[u8]) -> Result<Vec<T>>,
    ) -> Result<Vec<T>>
    where
        T: Default,
    {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches = build_batches(texts);
        let mut out: Vec<Option<T>> = (0..texts.len()).map(|_| None).collect();

        for batch in batches {
            let batch_texts: Vec<String> = batch.iter().map(|&(_, ref t)| t.clone()).collect();
            let payload = self.dispatch(model, kind, &batch_texts).await?;
            let results = parse(&payload)?;
            if results.len() != batch.len() {
                return Err(AppError::BackendUnavailable(format!(
                    "embedding server returned {} vectors for a batch of {}",
                    results.len(),
                    batch.len()
                )));
            }
            for ((original_idx, _), value) in batch.into_iter().zip(results) {
                out[original_idx] = Some(value);
            }
        }

        Ok(out.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    async fn dispatch(&self, model: &str, kind: EncodeKind, batch: &[String]) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, kind.path());
        let routing_key = format!("{model}:{}", uuid::Uuid::new_v4());
        let body = EmbedRequestBody { model, input: batch };

        let mut retry = 0u32;
        loop {
            let mut req = self
                .client
                .post(&url)
                .header("X-Routing-Key", &routing_key)
                .json(&body);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }

            let outcome = req.send().await;
            match outcome {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp.bytes().await?.to_vec());
                }
                Ok(resp) if resp.status().is_server_error() => {
                    if retry >= MAX_RETRIES {
                        return Err(AppError::BackendUnavailable(format!(
                            "embedding server returned {} after {} retries",
                            resp.status(),
                            retry
                        )));
                    }
                }
                Ok(resp) => {
                    let status = resp.status();
                    return Err(AppError::BackendUnavailable(format!(
                        "embedding server rejected the request: {status}"
                    )));
                }
                Err(err) if is_retryable(&err) => {
                    if retry >= MAX_RETRIES {
                        return Err(AppError::from(err));
                    }
                }
                Err(err) => return Err(AppError::from(err)),
            }

            retry += 1;
            tokio::time::sleep(Duration::from_secs(retry as u64)).await;
        }
    }
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.status() == Some(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Greedily pack `(original_index, text)` pairs into length-bucketed
/// batches: sorted longest-first, a batch closes when adding the next item
/// would push its size past [`MAX_BATCH_SIZE`] or its padding-waste ratio
/// past [`MAX_WASTE_RATIO`].
fn build_batches(texts: &[String]) -> Vec<Vec<(usize, String)>> {
    let mut indexed: Vec<(usize, String)> = texts.iter().cloned().enumerate().collect();
    indexed.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut batches: Vec<Vec<(usize, String)>> = Vec::new();
    let mut current: Vec<(usize, String)> = Vec::new();
    let mut max_len: usize = 0;
    let mut sum_len: usize = 0;

    for item in indexed {
        let item_len = item.1.len();
        let candidate_max = if current.is_empty() { item_len } else { max_len };
        let candidate_size = current.len() + 1;
        let candidate_sum = sum_len + item_len;
        let waste = waste_ratio(candidate_max, candidate_size, candidate_sum);

        let would_overflow = candidate_size > MAX_BATCH_SIZE || (!current.is_empty() && waste > MAX_WASTE_RATIO);
        if would_overflow {
            batches.push(std::mem::take(&mut current));
            max_len = 0;
            sum_len = 0;
        }

        if current.is_empty() {
            max_len = item_len;
        }
        sum_len += item_len;
        current.push(item);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn waste_ratio(max_len: usize, size: usize, sum_len: usize) -> f32 {
    let denom = (max_len * size) as f32;
    if denom == 0.0 {
        return 0.0;
    }
    (denom - sum_len as f32) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lens: &[usize]) -> Vec<String> {
        lens.iter().map(|&n| "a".repeat(n)).collect()
    }

    #[test]
    fn single_short_batch_has_zero_waste() {
        let batches = build_batches(&texts(&[10, 10, 10]));
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn batch_splits_on_waste_ratio() {
        // One very long item followed by many very short ones blows the
        // waste ratio well past 10% almost immediately.
        let mut lens = vec![1000];
        lens.extend(std::iter::repeat(10).take(20));
        let batches = build_batches(&texts(&lens));
        assert!(batches.len() > 1);
        // the longest item seeds its own first batch
        assert_eq!(batches[0].len(), 1);
    }

    #[test]
    fn batch_splits_on_max_size() {
        let lens = vec![50; 120];
        let batches = build_batches(&texts(&lens));
        assert!(batches.iter().all(|b| b.len() <= MAX_BATCH_SIZE));
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 120);
    }

    #[test]
    fn batching_preserves_every_original_index_exactly_once() {
        let lens = vec![5, 50, 12, 400, 3, 3, 3, 800, 1];
        let batches = build_batches(&texts(&lens));
        let mut seen: Vec<usize> = batches.iter().flatten().map(|(i, _)| *i).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..lens.len()).collect::<Vec<_>>());
    }

    #[test]
    fn waste_ratio_is_zero_for_uniform_lengths() {
        assert_eq!(waste_ratio(10, 4, 40), 0.0);
    }

    #[test]
    fn waste_ratio_matches_closed_form() {
        // maxLen=100, size=2, sum=110 -> (200-110)/200 = 0.45
        let w = waste_ratio(100, 2, 110);
        assert!((w - 0.45).abs() < 1e-6);
    }
}
