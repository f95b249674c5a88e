use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::models::result::ExamResult;

/// Persists graded results. The session engine does not report Submitted
/// until `persist` has been acknowledged.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn persist(&self, result: &ExamResult) -> Result<(), ApiError>;
    async fn fetch(&self, result_id: &str) -> Result<ExamResult, ApiError>;
}

pub struct InMemoryResultStore {
    results: RwLock<HashMap<String, ExamResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn persist(&self, result: &ExamResult) -> Result<(), ApiError> {
        let mut results = self.results.write().await;
        results.insert(result.id.clone(), result.clone());
        Ok(())
    }

    async fn fetch(&self, result_id: &str) -> Result<ExamResult, ApiError> {
        let results = self.results.read().await;
        results
            .get(result_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("result {}", result_id)))
    }
}
