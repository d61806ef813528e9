use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::debug;
use uuid::Uuid;
use wayfare_core::{CoreError, CoreResult, DocumentStore};

/// Receipt documents kept next to the reservations they belong to.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Pool<Postgres>,
}

impl PgDocumentStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn store(&self, document: &[u8]) -> CoreResult<String> {
        let reference = format!("receipt:{}", Uuid::new_v4());

        sqlx::query("INSERT INTO receipt_documents (reference, body) VALUES ($1, $2)")
            .bind(&reference)
            .bind(document)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::DocumentError(e.to_string()))?;

        debug!(reference = %reference, bytes = document.len(), "Document stored");
        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> CoreResult<Option<Vec<u8>>> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT body FROM receipt_documents WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::DocumentError(e.to_string()))
    }
}
