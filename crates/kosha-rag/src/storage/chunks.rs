use anyhow::{Context, Result};
use arrow_array::{Array, BooleanArray, Float32Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use crate::ident::hash_name;
use crate::storage::{
    embedding_array, embedding_field, read_bool, read_embedding, read_f32, read_string,
    read_u32, read_u32_list, read_vector_score, u32_list_array, u32_list_field, Candidate,
    LanceStore, RowValidator,
};
use crate::types::{Chunk, Concept};

const TABLE: &str = "chunks";

/// Typed access to chunk rows.
pub struct ChunkRepository {
    store: Arc<LanceStore>,
}

impl ChunkRepository {
    pub fn new(store: Arc<LanceStore>) -> Self {
        Self { store }
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("catalog_id", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("page_number", DataType::UInt32, false),
            Field::new("loc", DataType::Utf8, false),
            embedding_field(self.store.dimension()),
            u32_list_field("concept_ids"),
            u32_list_field("category_ids"),
            Field::new("concept_density", DataType::Float32, false),
            Field::new("is_toc", DataType::Boolean, false),
            Field::new("is_front_matter", DataType::Boolean, false),
            Field::new("is_back_matter", DataType::Boolean, false),
            Field::new("is_meta_content", DataType::Boolean, false),
            Field::new("is_reference", DataType::Boolean, false),
            Field::new("contains_citations", DataType::Boolean, false),
            Field::new("has_math", DataType::Boolean, false),
            Field::new("has_extraction_issues", DataType::Boolean, false),
        ]))
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let seed = Chunk {
            id: 0,
            catalog_id: 0,
            text: String::new(),
            page_number: 0,
            loc: "__seed__".to_string(),
            embedding: vec![0.0; self.store.dimension()],
            concept_ids: vec![],
            category_ids: vec![],
            concept_density: 0.0,
            is_toc: false,
            is_front_matter: false,
            is_back_matter: false,
            is_meta_content: false,
            is_reference: false,
            contains_citations: false,
            has_math: false,
            has_extraction_issues: false,
        };
        let batch = self.to_batch(&[seed])?;
        self.store
            .ensure_table(TABLE, self.schema(), batch, "loc = '__seed__'")
            .await
    }

    fn to_batch(&self, chunks: &[Chunk]) -> Result<RecordBatch> {
        let embeddings: Vec<&[f32]> = chunks.iter().map(|c| c.embedding.as_slice()).collect();
        let concept_ids: Vec<&[u32]> = chunks.iter().map(|c| c.concept_ids.as_slice()).collect();
        let category_ids: Vec<&[u32]> = chunks.iter().map(|c| c.category_ids.as_slice()).collect();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(chunks.iter().map(|c| c.id).collect::<Vec<_>>()))
                    as Arc<dyn Array>,
                Arc::new(UInt32Array::from(
                    chunks.iter().map(|c| c.catalog_id).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(UInt32Array::from(
                    chunks.iter().map(|c| c.page_number).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    chunks.iter().map(|c| c.loc.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(embedding_array(&embeddings, self.store.dimension())),
                Arc::new(u32_list_array(&concept_ids)),
                Arc::new(u32_list_array(&category_ids)),
                Arc::new(Float32Array::from(
                    chunks.iter().map(|c| c.concept_density).collect::<Vec<_>>(),
                )),
                Arc::new(BooleanArray::from(
                    chunks.iter().map(|c| c.is_toc).collect::<Vec<_>>(),
                )),
                Arc::new(BooleanArray::from(
                    chunks.iter().map(|c| c.is_front_matter).collect::<Vec<_>>(),
                )),
                Arc::new(BooleanArray::from(
                    chunks.iter().map(|c| c.is_back_matter).collect::<Vec<_>>(),
                )),
                Arc::new(BooleanArray::from(
                    chunks.iter().map(|c| c.is_meta_content).collect::<Vec<_>>(),
                )),
                Arc::new(BooleanArray::from(
                    chunks.iter().map(|c| c.is_reference).collect::<Vec<_>>(),
                )),
                Arc::new(BooleanArray::from(
                    chunks.iter().map(|c| c.contains_citations).collect::<Vec<_>>(),
                )),
                Arc::new(BooleanArray::from(
                    chunks.iter().map(|c| c.has_math).collect::<Vec<_>>(),
                )),
                Arc::new(BooleanArray::from(
                    chunks.iter().map(|c| c.has_extraction_issues).collect::<Vec<_>>(),
                )),
            ],
        )
        .context("Failed to build chunk RecordBatch")
    }

    pub async fn insert(&self, chunks: &[Chunk], validator: &RowValidator) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        for chunk in chunks {
            let what = format!("chunk {}", chunk.id);
            validator.check_embedding(&what, &chunk.embedding).map_err(anyhow::Error::from)?;
            validator.check_concept_ids(&what, &chunk.concept_ids).map_err(anyhow::Error::from)?;
            validator.check_category_ids(&what, &chunk.category_ids).map_err(anyhow::Error::from)?;
            if !(0.0..=1.0).contains(&chunk.concept_density) {
                anyhow::bail!("chunk {}: concept_density out of range", chunk.id);
            }
        }
        let batch = self.to_batch(chunks)?;
        self.store.add_batch(TABLE, self.schema(), batch).await
    }

    pub async fn delete_by_catalog_id(&self, catalog_id: u32) -> Result<usize> {
        self.store
            .delete_where(TABLE, &format!("catalog_id = {catalog_id}"))
            .await
    }

    /// Chunks where a concept occurs, best first by concept density.
    ///
    /// The concept's own embedding is the ANN probe: `3 * limit`
    /// candidates come back from the index, get filtered to rows that
    /// actually carry the concept id, and are ranked by density. The
    /// chunk table is never scanned.
    pub async fn find_by_concept(&self, concept: &Concept, limit: usize) -> Result<Vec<Chunk>> {
        let candidates = self
            .query_nearest(&concept.embedding, limit.saturating_mul(3), None)
            .await?;

        let mut matching: Vec<Chunk> = candidates
            .into_iter()
            .filter(|c| c.concept_ids.contains(&concept.id))
            .collect();
        matching.sort_by(|a, b| {
            b.concept_density
                .partial_cmp(&a.concept_density)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matching.truncate(limit);
        Ok(matching)
    }

    /// Name-keyed variant of [`Self::find_by_concept`]. Unknown concepts
    /// yield no chunks rather than an error; the tool layer decides how
    /// to surface that.
    pub async fn find_by_concept_name(
        &self,
        concepts: &crate::storage::ConceptRepository,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let Some(concept) = concepts.find_by_name(name).await? else {
            return Ok(Vec::new());
        };
        self.find_by_concept(&concept, limit).await
    }

    /// Chunks of one document, reading order. The catalog id is the hash
    /// of the source locator, so no catalog lookup is needed.
    pub async fn find_by_source(&self, source: &str, limit: usize) -> Result<Vec<Chunk>> {
        self.find_by_catalog_id(hash_name(source), limit).await
    }

    pub async fn find_by_catalog_id(&self, catalog_id: u32, limit: usize) -> Result<Vec<Chunk>> {
        let mut chunks = self
            .query_where(&format!("catalog_id = {catalog_id}"), limit)
            .await?;
        chunks.sort_by_key(|c| (c.page_number, c.loc.clone()));
        Ok(chunks)
    }

    pub async fn count_chunks(&self) -> Result<usize> {
        self.store.count(TABLE).await
    }

    pub async fn count_by_catalog_id(&self, catalog_id: u32) -> Result<usize> {
        self.store
            .count_where(TABLE, &format!("catalog_id = {catalog_id}"))
            .await
    }

    /// ANN candidate retrieval for hybrid search. Meta-content rows are
    /// excluded up front; they carry no retrieval signal.
    pub async fn ann_candidates(
        &self,
        vector: &[f32],
        k: usize,
        predicate: Option<&str>,
    ) -> Result<Vec<Candidate>> {
        let base = "is_meta_content = false AND is_reference = false";
        let full = match predicate {
            Some(p) => format!("{base} AND {p}"),
            None => base.to_string(),
        };
        let table = self.store.table(TABLE).await?;
        let query = table
            .query()
            .nearest_to(vector)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .only_if(full);
        let results = query.execute().await.context("Chunk ANN search failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut candidates = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                candidates.push(Candidate {
                    id: read_u32(batch, "id", row),
                    catalog_id: read_u32(batch, "catalog_id", row),
                    title: String::new(),
                    text: read_string(batch, "text", row),
                    source: String::new(),
                    page_number: Some(read_u32(batch, "page_number", row)),
                    concept_ids: read_u32_list(batch, "concept_ids", row),
                    category_ids: read_u32_list(batch, "category_ids", row),
                    vector_score: read_vector_score(batch, row),
                });
            }
        }
        Ok(candidates)
    }

    async fn query_nearest(
        &self,
        vector: &[f32],
        k: usize,
        predicate: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        let table = self.store.table(TABLE).await?;
        let mut query = table
            .query()
            .nearest_to(vector)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k);
        if let Some(pred) = predicate {
            query = query.only_if(pred.to_string());
        }
        let results = query.execute().await.context("Chunk ANN search failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;
        Ok(self.rows_from_batches(&batches))
    }

    async fn query_where(&self, predicate: &str, limit: usize) -> Result<Vec<Chunk>> {
        let table = self.store.table(TABLE).await?;
        let query = table.query().only_if(predicate.to_string()).limit(limit);
        let results = query.execute().await.context("Chunk query failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;
        Ok(self.rows_from_batches(&batches))
    }

    fn rows_from_batches(&self, batches: &[RecordBatch]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for batch in batches {
            for row in 0..batch.num_rows() {
                let chunk = chunk_from_row(batch, row);
                if chunk.loc == "__seed__" {
                    continue;
                }
                if chunk.embedding.len() != self.store.dimension() {
                    tracing::warn!(id = chunk.id, "Skipping chunk row with bad embedding dimension");
                    continue;
                }
                chunks.push(chunk);
            }
        }
        chunks
    }
}

fn chunk_from_row(batch: &RecordBatch, row: usize) -> Chunk {
    Chunk {
        id: read_u32(batch, "id", row),
        catalog_id: read_u32(batch, "catalog_id", row),
        text: read_string(batch, "text", row),
        page_number: read_u32(batch, "page_number", row),
        loc: read_string(batch, "loc", row),
        embedding: read_embedding(batch, row),
        concept_ids: read_u32_list(batch, "concept_ids", row),
        category_ids: read_u32_list(batch, "category_ids", row),
        concept_density: read_f32(batch, "concept_density", row),
        is_toc: read_bool(batch, "is_toc", row),
        is_front_matter: read_bool(batch, "is_front_matter", row),
        is_back_matter: read_bool(batch, "is_back_matter", row),
        is_meta_content: read_bool(batch, "is_meta_content", row),
        is_reference: read_bool(batch, "is_reference", row),
        contains_citations: read_bool(batch, "contains_citations", row),
        has_math: read_bool(batch, "has_math", row),
        has_extraction_issues: read_bool(batch, "has_extraction_issues", row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk(id: u32) -> Chunk {
        Chunk {
            id,
            catalog_id: 77,
            text: "gradient descent converges under convexity".to_string(),
            page_number: 12,
            loc: format!("p12.c{id}"),
            embedding: vec![0.5, 0.5, 0.5, 0.5],
            concept_ids: vec![1, 2],
            category_ids: vec![9],
            concept_density: 0.5,
            is_toc: false,
            is_front_matter: false,
            is_back_matter: false,
            is_meta_content: false,
            is_reference: false,
            contains_citations: true,
            has_math: true,
            has_extraction_issues: false,
        }
    }

    #[tokio::test]
    async fn test_batch_codec_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LanceStore::connect(dir.path(), 4).await.unwrap());
        let repo = ChunkRepository::new(store);

        let chunk = sample_chunk(5);
        let batch = repo.to_batch(std::slice::from_ref(&chunk)).unwrap();
        let back = chunk_from_row(&batch, 0);
        assert_eq!(back.id, 5);
        assert_eq!(back.catalog_id, 77);
        assert_eq!(back.category_ids, vec![9]);
        assert!((back.concept_density - 0.5).abs() < 1e-6);
        assert!(back.has_math);
        assert!(back.contains_citations);
        assert!(!back.is_meta_content);
    }

    // The concept probe must stay within its candidate cap: at most
    // 3 * limit rows come back from the index and at most `limit` survive,
    // ordered by concept density. The chunk table is never enumerated.
    #[tokio::test]
    async fn test_find_by_concept_cap_and_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LanceStore::connect(dir.path(), 4).await.unwrap());
        let repo = ChunkRepository::new(store);
        repo.ensure_table().await.unwrap();

        let mut validator = RowValidator::new(4);
        validator.concept_ids.extend([1, 2]);
        validator.category_ids.insert(9);

        let mut rows = Vec::new();
        for i in 0..20u32 {
            let mut chunk = sample_chunk(i + 1);
            // Half the rows carry concept 1, with varying density.
            chunk.concept_ids = if i % 2 == 0 { vec![1] } else { vec![2] };
            chunk.concept_density = (i as f32) / 20.0;
            chunk.embedding = vec![0.5, 0.5, 0.1 + i as f32 / 100.0, 0.5];
            rows.push(chunk);
        }
        repo.insert(&rows, &validator).await.unwrap();

        let concept = Concept {
            id: 1,
            name: "gradient descent".to_string(),
            concept_type: crate::types::ConceptType::Thematic,
            catalog_ids: vec![77],
            related_concepts: vec![],
            synonyms: vec![],
            broader_terms: vec![],
            narrower_terms: vec![],
            weight: 0.5,
            chunk_count: 10,
            enrichment_source: crate::types::EnrichmentSource::Corpus,
            embedding: vec![0.5, 0.5, 0.15, 0.5],
        };

        let found = repo.find_by_concept(&concept, 3).await.unwrap();
        assert!(found.len() <= 3);
        assert!(found.iter().all(|c| c.concept_ids.contains(&1)));
        for pair in found.windows(2) {
            assert!(pair[0].concept_density >= pair[1].concept_density);
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_bad_density() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LanceStore::connect(dir.path(), 4).await.unwrap());
        let repo = ChunkRepository::new(store);
        repo.ensure_table().await.unwrap();

        let mut validator = RowValidator::new(4);
        validator.concept_ids.extend([1, 2]);
        validator.category_ids.insert(9);

        let mut chunk = sample_chunk(1);
        chunk.concept_density = 1.5;
        assert!(repo.insert(&[chunk], &validator).await.is_err());
    }
}
