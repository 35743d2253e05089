use anyhow::{Context, Result};
use arrow_array::{Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use crate::storage::{
    embedding_array, embedding_field, read_embedding, read_opt_string, read_string,
    read_string_list, read_u32, read_u32_list, read_vector_score, sql_quote, string_list_array,
    string_list_field, u32_list_array, u32_list_field, Candidate, LanceStore, RowValidator,
};
use crate::types::CatalogEntry;

const TABLE: &str = "catalog";

/// Typed access to the document catalog.
pub struct CatalogRepository {
    store: Arc<LanceStore>,
}

impl CatalogRepository {
    pub fn new(store: Arc<LanceStore>) -> Self {
        Self { store }
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("hash", DataType::Utf8, false),
            Field::new("origin_hash", DataType::Utf8, true),
            Field::new("text", DataType::Utf8, false),
            embedding_field(self.store.dimension()),
            u32_list_field("concept_ids"),
            u32_list_field("category_ids"),
            string_list_field("filename_tags"),
            Field::new("author", DataType::Utf8, true),
            Field::new("year", DataType::Utf8, true),
            Field::new("publisher", DataType::Utf8, true),
            Field::new("isbn", DataType::Utf8, true),
        ]))
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let seed = CatalogEntry {
            id: 0,
            title: String::new(),
            source: "__seed__".to_string(),
            hash: String::new(),
            origin_hash: None,
            text: String::new(),
            embedding: vec![0.0; self.store.dimension()],
            concept_ids: vec![],
            category_ids: vec![],
            filename_tags: vec![],
            author: None,
            year: None,
            publisher: None,
            isbn: None,
        };
        let batch = self.to_batch(&[seed])?;
        self.store
            .ensure_table(TABLE, self.schema(), batch, "source = '__seed__'")
            .await
    }

    fn to_batch(&self, entries: &[CatalogEntry]) -> Result<RecordBatch> {
        let ids: Vec<u32> = entries.iter().map(|e| e.id).collect();
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
        let hashes: Vec<&str> = entries.iter().map(|e| e.hash.as_str()).collect();
        let origin_hashes: Vec<Option<&str>> =
            entries.iter().map(|e| e.origin_hash.as_deref()).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        let embeddings: Vec<&[f32]> = entries.iter().map(|e| e.embedding.as_slice()).collect();
        let concept_ids: Vec<&[u32]> = entries.iter().map(|e| e.concept_ids.as_slice()).collect();
        let category_ids: Vec<&[u32]> = entries.iter().map(|e| e.category_ids.as_slice()).collect();
        let filename_tags: Vec<&[String]> =
            entries.iter().map(|e| e.filename_tags.as_slice()).collect();
        let authors: Vec<Option<&str>> = entries.iter().map(|e| e.author.as_deref()).collect();
        let years: Vec<Option<&str>> = entries.iter().map(|e| e.year.as_deref()).collect();
        let publishers: Vec<Option<&str>> =
            entries.iter().map(|e| e.publisher.as_deref()).collect();
        let isbns: Vec<Option<&str>> = entries.iter().map(|e| e.isbn.as_deref()).collect();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(hashes)),
                Arc::new(StringArray::from(origin_hashes)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embedding_array(&embeddings, self.store.dimension())),
                Arc::new(u32_list_array(&concept_ids)),
                Arc::new(u32_list_array(&category_ids)),
                Arc::new(string_list_array(&filename_tags)),
                Arc::new(StringArray::from(authors)),
                Arc::new(StringArray::from(years)),
                Arc::new(StringArray::from(publishers)),
                Arc::new(StringArray::from(isbns)),
            ],
        )
        .context("Failed to build catalog RecordBatch")
    }

    /// Insert catalog rows. Validation failures are fatal here; a
    /// malformed row must never reach storage.
    pub async fn insert(&self, entries: &[CatalogEntry], validator: &RowValidator) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        for entry in entries {
            let what = format!("catalog {}", entry.id);
            validator.check_embedding(&what, &entry.embedding).map_err(anyhow::Error::from)?;
            validator.check_concept_ids(&what, &entry.concept_ids).map_err(anyhow::Error::from)?;
            validator.check_category_ids(&what, &entry.category_ids).map_err(anyhow::Error::from)?;
            if entry.category_ids.is_empty() {
                anyhow::bail!("catalog {}: at least one category is required", entry.id);
            }
        }
        let batch = self.to_batch(entries)?;
        self.store.add_batch(TABLE, self.schema(), batch).await
    }

    pub async fn delete_by_source(&self, source: &str) -> Result<usize> {
        self.store
            .delete_where(TABLE, &format!("source = '{}'", sql_quote(source)))
            .await
    }

    pub async fn find_by_id(&self, id: u32) -> Result<Option<CatalogEntry>> {
        let entries = self.query(Some(&format!("id = {id}")), 1).await?;
        Ok(entries.into_iter().next())
    }

    pub async fn find_by_ids(&self, ids: &[u32]) -> Result<Vec<CatalogEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
        self.query(Some(&format!("id IN ({list})")), ids.len()).await
    }

    pub async fn find_by_source(&self, source: &str) -> Result<Option<CatalogEntry>> {
        let entries = self
            .query(Some(&format!("source = '{}'", sql_quote(source))), 1)
            .await?;
        Ok(entries.into_iter().next())
    }

    /// Documents carrying a category. Bounded by the category's document
    /// count through the `category_ids` predicate.
    pub async fn find_by_category(&self, category_id: u32) -> Result<Vec<CatalogEntry>> {
        self.query(Some(&format!("array_has(category_ids, {category_id})")), usize::MAX)
            .await
    }

    /// Unique concept ids across all documents in a category, in first-seen
    /// order.
    pub async fn get_concepts_in_category(&self, category_id: u32) -> Result<Vec<u32>> {
        let table = self.store.table(TABLE).await?;
        let results = table
            .query()
            .only_if(format!("array_has(category_ids, {category_id})"))
            .select(lancedb::query::Select::columns(&["concept_ids"]))
            .execute()
            .await
            .context("Failed to query concepts in category")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                for id in read_u32_list(batch, "concept_ids", row) {
                    if seen.insert(id) {
                        out.push(id);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Ids of documents whose source contains a substring. Used to scope
    /// chunk search to matching documents.
    pub async fn find_ids_by_source_filter(&self, filter: &str) -> Result<Vec<u32>> {
        let table = self.store.table(TABLE).await?;
        let results = table
            .query()
            .only_if(format!("source LIKE '%{}%'", sql_quote(filter)))
            .select(lancedb::query::Select::columns(&["id", "source"]))
            .execute()
            .await
            .context("Failed to query ids by source filter")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut ids = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                if read_string(batch, "source", row) != "__seed__" {
                    ids.push(read_u32(batch, "id", row));
                }
            }
        }
        Ok(ids)
    }

    /// All rows, for cache rebuilds and statistics recompute. Explicitly a
    /// full read; only the refresh path calls it.
    pub async fn find_all(&self) -> Result<Vec<CatalogEntry>> {
        self.query(None, usize::MAX).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(TABLE).await
    }

    /// ANN candidate retrieval for hybrid search.
    pub async fn ann_candidates(
        &self,
        vector: &[f32],
        k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<Candidate>> {
        let table = self.store.table(TABLE).await?;
        let mut query = table
            .query()
            .nearest_to(vector)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k);
        if let Some(filter) = source_filter {
            query = query.only_if(format!("source LIKE '%{}%'", sql_quote(filter)));
        }
        let results = query.execute().await.context("Catalog ANN search failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut candidates = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                candidates.push(Candidate {
                    id: read_u32(batch, "id", row),
                    catalog_id: read_u32(batch, "id", row),
                    title: read_string(batch, "title", row),
                    text: read_string(batch, "text", row),
                    source: read_string(batch, "source", row),
                    page_number: None,
                    concept_ids: read_u32_list(batch, "concept_ids", row),
                    category_ids: read_u32_list(batch, "category_ids", row),
                    vector_score: read_vector_score(batch, row),
                });
            }
        }
        Ok(candidates)
    }

    async fn query(&self, predicate: Option<&str>, limit: usize) -> Result<Vec<CatalogEntry>> {
        let table = self.store.table(TABLE).await?;
        let mut query = table.query();
        if let Some(pred) = predicate {
            query = query.only_if(pred.to_string());
        }
        if limit != usize::MAX {
            query = query.limit(limit);
        }
        let results = query.execute().await.context("Catalog query failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut entries = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let entry = self.entry_from_row(batch, row);
                if entry.source == "__seed__" {
                    continue;
                }
                if entry.embedding.len() != self.store.dimension() {
                    tracing::warn!(id = entry.id, "Skipping catalog row with bad embedding dimension");
                    continue;
                }
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn entry_from_row(&self, batch: &RecordBatch, row: usize) -> CatalogEntry {
        CatalogEntry {
            id: read_u32(batch, "id", row),
            title: read_string(batch, "title", row),
            source: read_string(batch, "source", row),
            hash: read_string(batch, "hash", row),
            origin_hash: read_opt_string(batch, "origin_hash", row),
            text: read_string(batch, "text", row),
            embedding: read_embedding(batch, row),
            concept_ids: read_u32_list(batch, "concept_ids", row),
            category_ids: read_u32_list(batch, "category_ids", row),
            filename_tags: read_string_list(batch, "filename_tags", row),
            author: read_opt_string(batch, "author", row),
            year: read_opt_string(batch, "year", row),
            publisher: read_opt_string(batch, "publisher", row),
            isbn: read_opt_string(batch, "isbn", row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Batch codec round-trip without touching a database: the write path
    // and read path must agree on the column layout.
    #[tokio::test]
    async fn test_batch_codec_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LanceStore::connect(dir.path(), 4).await.unwrap());
        let repo = CatalogRepository::new(store);
        let entry = CatalogEntry {
            id: crate::ident::hash_name("/library/distributed-systems--consensus--raft.pdf"),
            title: "Distributed Systems".to_string(),
            source: "/library/distributed-systems--consensus--raft.pdf".to_string(),
            hash: "abc123".to_string(),
            origin_hash: None,
            text: "A survey of consensus algorithms.".to_string(),
            embedding: vec![0.1, 0.2, 0.3, 0.4],
            concept_ids: vec![11, 22],
            category_ids: vec![33],
            filename_tags: vec!["consensus".to_string(), "raft".to_string()],
            author: Some("Jane Roe".to_string()),
            year: None,
            publisher: None,
            isbn: None,
        };

        let batch = repo.to_batch(std::slice::from_ref(&entry)).unwrap();
        let back = repo.entry_from_row(&batch, 0);
        assert_eq!(back.id, entry.id);
        assert_eq!(back.title, entry.title);
        assert_eq!(back.concept_ids, entry.concept_ids);
        assert_eq!(back.category_ids, entry.category_ids);
        assert_eq!(back.filename_tags, entry.filename_tags);
        assert_eq!(back.author, entry.author);
        assert_eq!(back.year, None);
        assert_eq!(back.embedding, entry.embedding);
    }
}
