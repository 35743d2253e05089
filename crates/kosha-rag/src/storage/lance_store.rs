use anyhow::{Context, Result};
use arrow_array::{RecordBatch, RecordBatchIterator};
use arrow_schema::Schema;
use std::path::Path;
use std::sync::Arc;

/// Shared LanceDB connection. Repositories own their schemas and row
/// codecs; the store only manages the connection and table lifecycle.
pub struct LanceStore {
    db: lancedb::Connection,
    dimension: usize,
}

impl LanceStore {
    pub async fn connect(path: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path.to_str().unwrap_or("."))
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;
        Ok(Self { db, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Create the table if missing, seeding it with a throwaway row so the
    /// schema materializes, then deleting the seed.
    pub(crate) async fn ensure_table(
        &self,
        name: &str,
        schema: Arc<Schema>,
        seed: RecordBatch,
        seed_predicate: &str,
    ) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&name.to_string()) {
            return Ok(());
        }

        let batches = RecordBatchIterator::new(vec![Ok(seed)], schema);
        self.db
            .create_table(name, Box::new(batches))
            .execute()
            .await
            .with_context(|| format!("Failed to create {name} table"))?;

        let table = self.db.open_table(name).execute().await?;
        table.delete(seed_predicate).await.ok();
        Ok(())
    }

    pub(crate) async fn table(&self, name: &str) -> Result<lancedb::Table> {
        self.db
            .open_table(name)
            .execute()
            .await
            .with_context(|| format!("Failed to open {name} table"))
    }

    pub(crate) async fn add_batch(
        &self,
        name: &str,
        schema: Arc<Schema>,
        batch: RecordBatch,
    ) -> Result<()> {
        let table = self.table(name).await?;
        let rows = batch.num_rows();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .with_context(|| format!("Failed to insert into {name}"))?;
        tracing::debug!(table = name, rows, "Inserted rows into LanceDB");
        Ok(())
    }

    pub(crate) async fn delete_where(&self, name: &str, predicate: &str) -> Result<usize> {
        let table = self.table(name).await?;
        let before = table.count_rows(None).await.unwrap_or(0);
        table.delete(predicate).await?;
        let after = table.count_rows(None).await.unwrap_or(0);
        Ok(before.saturating_sub(after))
    }

    pub(crate) async fn count(&self, name: &str) -> Result<usize> {
        let table = self.table(name).await?;
        Ok(table.count_rows(None).await?)
    }

    pub(crate) async fn count_where(&self, name: &str, predicate: &str) -> Result<usize> {
        let table = self.table(name).await?;
        Ok(table.count_rows(Some(predicate.to_string())).await?)
    }

    /// Build the IVF-PQ index once a table is large enough for it to pay
    /// off. Below the threshold the flat scan is faster anyway.
    pub async fn create_index_if_needed(&self, name: &str) -> Result<()> {
        let count = self.count(name).await?;
        if count >= 1_000 {
            let table = self.table(name).await?;
            table
                .create_index(&["embedding"], lancedb::index::Index::Auto)
                .execute()
                .await
                .with_context(|| format!("Failed to create vector index on {name}"))?;
            tracing::info!(table = name, rows = count, "Created IVF-PQ index");
        }
        Ok(())
    }
}
