use async_trait::async_trait;

use crate::CoreResult;

/// Write-once storage for generated documents such as receipts.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a document and return a reference that can be recorded elsewhere
    async fn store(&self, document: &[u8]) -> CoreResult<String>;

    /// Load a previously stored document
    async fn fetch(&self, reference: &str) -> CoreResult<Option<Vec<u8>>>;
}
