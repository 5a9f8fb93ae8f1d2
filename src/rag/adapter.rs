//! Per-collection linear projection adapter (§4.7).
//!
//! State machine `Uninitialized -> Initialized(I, 0) -> Trained(W, b)`. The
//! matrix math (forward pass, gradient, Adam step) is hand-rolled over plain
//! `Vec<f32>` rather than pulled in from a tensor crate: D is small (a dense
//! embedding dimension, a few hundred to low thousands), the model is a
//! single affine layer, and no other example in this corpus reaches for
//! `ndarray`/`candle` next to an HTTP-RAG-server dependency stack, so adding
//! one here would be an unjustified, unused-everywhere-else dependency.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;

use crate::db::document_store::DocumentStoreExt;
use crate::db::DocumentStore;
use crate::types::{AdapterRecord, AppError, Result};

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;
const ADAM_LR: f32 = 1e-4;
const MAX_BATCH_SIZE: usize = 32;
const SAFETY_THRESHOLD: f32 = 0.75;

/// One collection's trained (or still-identity) linear projection, plus the
/// Adam optimizer moments needed to resume training.
#[derive(Debug, Clone)]
pub struct LinearAdapter {
    dim: usize,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    training_count: u64,
    m_weights: Vec<Vec<f32>>,
    v_weights: Vec<Vec<f32>>,
    m_bias: Vec<f32>,
    v_bias: Vec<f32>,
    step: u64,
}

impl LinearAdapter {
    /// `Initialized(I, 0)`: identity weights, zero bias.
    pub fn identity(dim: usize) -> Self {
        let mut weights = vec![vec![0.0f32; dim]; dim];
        for (i, row) in weights.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self {
            dim,
            weights,
            bias: vec![0.0; dim],
            training_count: 0,
            m_weights: vec![vec![0.0; dim]; dim],
            v_weights: vec![vec![0.0; dim]; dim],
            m_bias: vec![0.0; dim],
            v_bias: vec![0.0; dim],
            step: 0,
        }
    }

    pub fn training_count(&self) -> u64 {
        self.training_count
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Forward pass plus L2 normalization. Fails with `DimensionMismatch` if
    /// `q.len() != D`.
    pub fn transform(&self, q: &[f32]) -> Result<Vec<f32>> {
        if q.len() != self.dim {
            return Err(AppError::DimensionMismatch { expected: self.dim, actual: q.len() });
        }
        let p = self.forward(q);
        Ok(l2_normalize(&p))
    }

    fn forward(&self, q: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(self.bias.iter())
            .map(|(row, b)| dot(row, q) + b)
            .collect()
    }

    /// One `fit` call: both `Q` and `C` are L2-normalized row-wise, then
    /// trained for `epochs` passes with shuffled batches of
    /// `min(MAX_BATCH_SIZE, |Q|)`, minimizing negative cosine similarity
    /// between the (normalized) prediction and the (normalized) target via
    /// Adam. `training_count` advances by one per call, not per epoch.
    pub fn train(&mut self, q_batch: &[Vec<f32>], c_batch: &[Vec<f32>], epochs: usize) -> Result<()> {
        if q_batch.len() != c_batch.len() {
            return Err(AppError::Validation(
                "adapter training requires matching query/target batch sizes".to_string(),
            ));
        }
        for row in q_batch.iter().chain(c_batch.iter()) {
            if row.len() != self.dim {
                return Err(AppError::DimensionMismatch { expected: self.dim, actual: row.len() });
            }
        }
        if q_batch.is_empty() {
            return Ok(());
        }

        let q_norm: Vec<Vec<f32>> = q_batch.iter().map(|v| l2_normalize(v)).collect();
        let c_norm: Vec<Vec<f32>> = c_batch.iter().map(|v| l2_normalize(v)).collect();
        let batch_size = MAX_BATCH_SIZE.min(q_norm.len());

        let mut rng = rand::rng();
        let mut indices: Vec<usize> = (0..q_norm.len()).collect();

        for _ in 0..epochs {
            indices.shuffle(&mut rng);
            for chunk in indices.chunks(batch_size) {
                self.train_step(chunk, &q_norm, &c_norm);
            }
        }

        self.training_count += 1;
        Ok(())
    }

    fn train_step(&mut self, indices: &[usize], q_norm: &[Vec<f32>], c_norm: &[Vec<f32>]) {
        let mut grad_w = vec![vec![0.0f32; self.dim]; self.dim];
        let mut grad_b = vec![0.0f32; self.dim];

        for &idx in indices {
            let q = &q_norm[idx];
            let target = &c_norm[idx];
            let p = self.forward(q);
            let p_norm = l2_norm(&p).max(1e-12);
            let p_hat: Vec<f32> = p.iter().map(|x| x / p_norm).collect();
            let cos = dot(&p_hat, target);

            // d(-cos)/dp = -(target - cos * p_hat) / ||p||
            let dloss_dp: Vec<f32> = p_hat
                .iter()
                .zip(target.iter())
                .map(|(ph, t)| -(t - cos * ph) / p_norm)
                .collect();

            for i in 0..self.dim {
                grad_b[i] += dloss_dp[i];
                for j in 0..self.dim {
                    grad_w[i][j] += dloss_dp[i] * q[j];
                }
            }
        }

        let n = indices.len().max(1) as f32;
        for row in grad_w.iter_mut() {
            row.iter_mut().for_each(|g| *g /= n);
        }
        grad_b.iter_mut().for_each(|g| *g /= n);

        self.step += 1;
        let t = self.step as f32;
        let bias_correction1 = 1.0 - ADAM_BETA1.powf(t);
        let bias_correction2 = 1.0 - ADAM_BETA2.powf(t);

        for i in 0..self.dim {
            for j in 0..self.dim {
                let g = grad_w[i][j];
                self.m_weights[i][j] = ADAM_BETA1 * self.m_weights[i][j] + (1.0 - ADAM_BETA1) * g;
                self.v_weights[i][j] = ADAM_BETA2 * self.v_weights[i][j] + (1.0 - ADAM_BETA2) * g * g;
                let m_hat = self.m_weights[i][j] / bias_correction1;
                let v_hat = self.v_weights[i][j] / bias_correction2;
                self.weights[i][j] -= ADAM_LR * m_hat / (v_hat.sqrt() + ADAM_EPS);
            }

            let g = grad_b[i];
            self.m_bias[i] = ADAM_BETA1 * self.m_bias[i] + (1.0 - ADAM_BETA1) * g;
            self.v_bias[i] = ADAM_BETA2 * self.v_bias[i] + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = self.m_bias[i] / bias_correction1;
            let v_hat = self.v_bias[i] / bias_correction2;
            self.bias[i] -= ADAM_LR * m_hat / (v_hat.sqrt() + ADAM_EPS);
        }
    }

    pub fn to_record(&self, collection_id: &str) -> AdapterRecord {
        AdapterRecord {
            collection_id: collection_id.to_string(),
            weights: self.weights.clone(),
            bias: self.bias.clone(),
            input_dim: self.dim,
            output_dim: self.dim,
            training_count: self.training_count,
        }
    }

    pub fn from_record(record: &AdapterRecord) -> Self {
        let dim = record.input_dim;
        Self {
            dim,
            weights: record.weights.clone(),
            bias: record.bias.clone(),
            training_count: record.training_count,
            m_weights: vec![vec![0.0; dim]; dim],
            v_weights: vec![vec![0.0; dim]; dim],
            m_bias: vec![0.0; dim],
            v_bias: vec![0.0; dim],
            step: 0,
        }
    }
}

/// Cosine similarity between `original` and `transformed`, classified
/// `isSafe = cos >= 0.75`. Diagnostic only; never gates the query path.
pub fn safety_analysis(original: &[f32], transformed: &[f32]) -> (f32, bool) {
    let a = l2_normalize(original);
    let b = l2_normalize(transformed);
    let cos = dot(&a, &b);
    (cos, cos >= SAFETY_THRESHOLD)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v).max(1e-12);
    v.iter().map(|x| x / norm).collect()
}

/// Persistence backend for adapter records (§4.7): file or document store,
/// selected by `AdapterConfig::use_document_store`.
#[async_trait::async_trait]
pub trait AdapterPersistence: Send + Sync {
    async fn load(&self, collection_id: &str) -> Result<Option<AdapterRecord>>;
    async fn save(&self, collection_id: &str, record: &AdapterRecord) -> Result<()>;
}

pub struct FileAdapterPersistence {
    storage_path: PathBuf,
}

impl FileAdapterPersistence {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self { storage_path: storage_path.into() }
    }

    fn path_for(&self, collection_id: &str) -> PathBuf {
        self.storage_path.join(format!("{collection_id}.json"))
    }
}

#[async_trait::async_trait]
impl AdapterPersistence for FileAdapterPersistence {
    async fn load(&self, collection_id: &str) -> Result<Option<AdapterRecord>> {
        let path = self.path_for(collection_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::from(e)),
        }
    }

    async fn save(&self, collection_id: &str, record: &AdapterRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.storage_path).await?;
        let path = self.path_for(collection_id);
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

pub struct DocumentStoreAdapterPersistence {
    store: Arc<dyn DocumentStore>,
}

impl DocumentStoreAdapterPersistence {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn key_for(collection_id: &str) -> String {
        format!("adapter:{collection_id}")
    }
}

#[async_trait::async_trait]
impl AdapterPersistence for DocumentStoreAdapterPersistence {
    async fn load(&self, collection_id: &str) -> Result<Option<AdapterRecord>> {
        self.store.get_json(&Self::key_for(collection_id)).await
    }

    async fn save(&self, collection_id: &str, record: &AdapterRecord) -> Result<()> {
        self.store.put_json(&Self::key_for(collection_id), record).await
    }
}

/// Per-collection adapter cache backed by one [`AdapterPersistence`].
/// Re-loading from storage restores `Trained` state directly, per §4.7's
/// monotonic-transitions note.
pub struct AdapterService {
    persistence: Box<dyn AdapterPersistence>,
    cache: RwLock<std::collections::HashMap<String, LinearAdapter>>,
}

impl AdapterService {
    pub fn new(persistence: Box<dyn AdapterPersistence>) -> Self {
        Self { persistence, cache: RwLock::new(std::collections::HashMap::new()) }
    }

    /// Load-or-initialize the adapter for `collection_id`. `dim` is used
    /// only the first time this collection is seen.
    pub async fn get_or_init(&self, collection_id: &str, dim: usize) -> Result<LinearAdapter> {
        if let Some(adapter) = self.cache.read().get(collection_id).cloned() {
            return Ok(adapter);
        }
        let adapter = match self.persistence.load(collection_id).await? {
            Some(record) => LinearAdapter::from_record(&record),
            None => LinearAdapter::identity(dim),
        };
        self.cache.write().insert(collection_id.to_string(), adapter.clone());
        Ok(adapter)
    }

    /// Apply the adapter transform if a trained adapter exists
    /// (`training_count > 0`); on any error, the query engine falls back to
    /// the untransformed vector (§4.5 step 3).
    pub async fn transform_or_identity(&self, collection_id: &str, q: &[f32]) -> Vec<f32> {
        match self.get_or_init(collection_id, q.len()).await {
            Ok(adapter) if adapter.training_count() > 0 => {
                adapter.transform(q).unwrap_or_else(|_| q.to_vec())
            }
            _ => q.to_vec(),
        }
    }

    /// Train on a single feedback pair and persist the result.
    pub async fn train_with_feedback(&self, collection_id: &str, query_vec: &[f32], chunk_vec: &[f32]) -> Result<()> {
        let mut adapter = self.get_or_init(collection_id, query_vec.len()).await?;
        adapter.train(&[query_vec.to_vec()], &[chunk_vec.to_vec()], 3)?;
        let record = adapter.to_record(collection_id);
        self.persistence.save(collection_id, &record).await?;
        self.cache.write().insert(collection_id.to_string(), adapter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_adapter_is_a_no_op() {
        let adapter = LinearAdapter::identity(3);
        let q = vec![1.0, 2.0, 3.0];
        let out = adapter.transform(&q).unwrap();
        let expected = l2_normalize(&q);
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn transform_rejects_wrong_dimension() {
        let adapter = LinearAdapter::identity(3);
        let err = adapter.transform(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn training_count_advances_once_per_call() {
        let mut adapter = LinearAdapter::identity(4);
        let q = vec![vec![1.0, 0.0, 0.0, 0.0]];
        let c = vec![vec![0.0, 1.0, 0.0, 0.0]];
        adapter.train(&q, &c, 3).unwrap();
        assert_eq!(adapter.training_count(), 1);
        adapter.train(&q, &c, 3).unwrap();
        assert_eq!(adapter.training_count(), 2);
    }

    #[test]
    fn training_moves_prediction_toward_target() {
        let mut adapter = LinearAdapter::identity(4);
        let q = vec![1.0, 0.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0, 0.0];
        let before = safety_analysis(&q, &adapter.transform(&q).unwrap()).0;
        for _ in 0..50 {
            adapter.train(&[q.clone()], &[c.clone()], 3).unwrap();
        }
        let after_cos_to_target = {
            let out = adapter.transform(&q).unwrap();
            dot(&l2_normalize(&out), &l2_normalize(&c))
        };
        assert!(after_cos_to_target > 0.5);
        let _ = before;
    }

    #[test]
    fn safety_analysis_matches_threshold() {
        let (cos, safe) = safety_analysis(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((cos - 1.0).abs() < 1e-6);
        assert!(safe);
        let (_, unsafe_) = safety_analysis(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(!unsafe_);
    }
}
