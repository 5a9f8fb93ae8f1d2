//! Evaluator (§4.9): retrieval-quality test cases and runs.

use std::sync::Arc;

use crate::db::DocumentStoreExt;
use crate::rag::search::{QueryEngine, SearchOptions};
use crate::types::{AppError, EvalCaseResult, EvalRun, EvalTestCase, Result};

pub struct Evaluator {
    document_store: Arc<dyn crate::db::DocumentStore>,
    query_engine: Arc<QueryEngine>,
}

const EVAL_TOP_K: usize = 5;

impl Evaluator {
    pub fn new(document_store: Arc<dyn crate::db::DocumentStore>, query_engine: Arc<QueryEngine>) -> Self {
        Self { document_store, query_engine }
    }

    pub async fn create_test_case(
        &self,
        collection_id: &str,
        owner_id: &str,
        query: &str,
        expected_chunk_ids: Vec<String>,
    ) -> Result<EvalTestCase> {
        let case = EvalTestCase {
            id: uuid::Uuid::new_v4().to_string(),
            collection_id: collection_id.to_string(),
            owner_id: owner_id.to_string(),
            query: query.to_string(),
            expected_chunk_ids,
            created_at: chrono::Utc::now(),
        };
        self.document_store.put_json(&format!("eval-case:{}", case.id), &case).await?;
        Ok(case)
    }

    pub async fn list_test_cases(&self, collection_id: &str, owner_id: &str) -> Result<Vec<EvalTestCase>> {
        let keys = self.document_store.list_prefix("eval-case:").await?;
        let mut cases = Vec::new();
        for key in keys {
            if let Some(case) = self.document_store.get_json::<EvalTestCase>(&key).await? {
                if case.collection_id == collection_id && case.owner_id == owner_id {
                    cases.push(case);
                }
            }
        }
        cases.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(cases)
    }

    /// Run every test case for `(collection_id, owner_id)` against the query
    /// engine with `top_k=5`, aggregate Hit/Recall@K/MRR, persist an
    /// [`EvalRun`] and return it.
    pub async fn run(&self, collection_id: &str, owner_id: &str) -> Result<EvalRun> {
        let cases = self.list_test_cases(collection_id, owner_id).await?;
        if cases.is_empty() {
            return Err(AppError::Validation(format!(
                "no eval test cases registered for collection {collection_id}, owner {owner_id}"
            )));
        }

        let mut results = Vec::with_capacity(cases.len());
        for case in &cases {
            let opts = SearchOptions {
                owner_id: Some(owner_id.to_string()),
                resource_id: None,
                top_k: Some(EVAL_TOP_K),
                use_feedback: false,
                analytics: false,
            };
            let hits = self.query_engine.search(&case.query, collection_id, &opts).await?;
            let retrieved_chunk_ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
            results.push(score_case(case, &retrieved_chunk_ids));
        }

        let hit_count = results.iter().filter(|r| r.hit).count();
        let total_cases = results.len();
        let overall_accuracy = hit_count as f64 / total_cases as f64;
        let average_recall = results.iter().map(|r| r.recall).sum::<f64>() / total_cases as f64;
        let mrr = results.iter().map(|r| r.reciprocal_rank).sum::<f64>() / total_cases as f64;
        let failed_cases: Vec<EvalCaseResult> = results.iter().filter(|r| !r.hit).cloned().collect();

        let run = EvalRun {
            id: uuid::Uuid::new_v4().to_string(),
            collection_id: collection_id.to_string(),
            owner_id: owner_id.to_string(),
            overall_accuracy,
            average_recall,
            mrr,
            hit_count,
            total_cases,
            failed_cases,
            ran_at: chrono::Utc::now(),
        };
        self.document_store.put_json(&format!("eval-run:{}", run.id), &run).await?;
        Ok(run)
    }
}

fn score_case(case: &EvalTestCase, retrieved: &[String]) -> EvalCaseResult {
    let expected: std::collections::HashSet<&String> = case.expected_chunk_ids.iter().collect();
    let hit = retrieved.iter().any(|id| expected.contains(id));
    let matched = retrieved.iter().filter(|id| expected.contains(id)).count();
    let recall = if expected.is_empty() {
        0.0
    } else {
        matched as f64 / expected.len() as f64
    };
    let reciprocal_rank = retrieved
        .iter()
        .position(|id| expected.contains(id))
        .map(|pos| 1.0 / (pos + 1) as f64)
        .unwrap_or(0.0);

    EvalCaseResult {
        test_case_id: case.id.clone(),
        query: case.query.clone(),
        hit,
        recall,
        reciprocal_rank,
        retrieved_chunk_ids: retrieved.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(expected: Vec<&str>) -> EvalTestCase {
        EvalTestCase {
            id: "case-1".to_string(),
            collection_id: "c1".to_string(),
            owner_id: "alice".to_string(),
            query: "what is rust".to_string(),
            expected_chunk_ids: expected.into_iter().map(String::from).collect(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn hit_true_when_any_expected_id_retrieved() {
        let c = case(vec!["a", "b"]);
        let result = score_case(&c, &["x".to_string(), "b".to_string()]);
        assert!(result.hit);
    }

    #[test]
    fn recall_is_fraction_of_expected_found() {
        let c = case(vec!["a", "b", "c", "d"]);
        let result = score_case(&c, &["a".to_string(), "c".to_string()]);
        assert!((result.recall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn reciprocal_rank_uses_first_hit_position() {
        let c = case(vec!["b"]);
        let result = score_case(&c, &["x".to_string(), "y".to_string(), "b".to_string()]);
        assert!((result.reciprocal_rank - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn no_hit_gives_zero_reciprocal_rank() {
        let c = case(vec!["z"]);
        let result = score_case(&c, &["x".to_string(), "y".to_string()]);
        assert!(!result.hit);
        assert_eq!(result.reciprocal_rank, 0.0);
    }
}
