use anyhow::{Context, Result};
use arrow_array::{Array, Float32Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use crate::ident::hash_name;
use crate::storage::{
    embedding_array, embedding_field, read_embedding, read_f32, read_string, read_string_list,
    read_u32, read_u32_list, read_vector_score, string_list_array, string_list_field,
    u32_list_array, u32_list_field, LanceStore, RowValidator,
};
use crate::types::{Concept, ConceptType, EnrichmentSource};

const TABLE: &str = "concepts";

/// Typed access to the concept index. Concepts carry no category column
/// anywhere in this schema; that neutrality is deliberate.
pub struct ConceptRepository {
    store: Arc<LanceStore>,
}

impl ConceptRepository {
    pub fn new(store: Arc<LanceStore>) -> Self {
        Self { store }
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("type", DataType::Utf8, false),
            u32_list_field("catalog_ids"),
            string_list_field("related_concepts"),
            string_list_field("synonyms"),
            string_list_field("broader_terms"),
            string_list_field("narrower_terms"),
            Field::new("weight", DataType::Float32, false),
            Field::new("chunk_count", DataType::UInt32, false),
            Field::new("enrichment_source", DataType::Utf8, false),
            embedding_field(self.store.dimension()),
        ]))
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let seed = Concept {
            id: 0,
            name: "__seed__".to_string(),
            concept_type: ConceptType::Thematic,
            catalog_ids: vec![],
            related_concepts: vec![],
            synonyms: vec![],
            broader_terms: vec![],
            narrower_terms: vec![],
            weight: 0.0,
            chunk_count: 0,
            enrichment_source: EnrichmentSource::Corpus,
            embedding: vec![0.0; self.store.dimension()],
        };
        let batch = self.to_batch(&[seed])?;
        self.store
            .ensure_table(TABLE, self.schema(), batch, "name = '__seed__'")
            .await
    }

    fn to_batch(&self, concepts: &[Concept]) -> Result<RecordBatch> {
        let embeddings: Vec<&[f32]> = concepts.iter().map(|c| c.embedding.as_slice()).collect();
        let catalog_ids: Vec<&[u32]> = concepts.iter().map(|c| c.catalog_ids.as_slice()).collect();
        let related: Vec<&[String]> = concepts.iter().map(|c| c.related_concepts.as_slice()).collect();
        let synonyms: Vec<&[String]> = concepts.iter().map(|c| c.synonyms.as_slice()).collect();
        let broader: Vec<&[String]> = concepts.iter().map(|c| c.broader_terms.as_slice()).collect();
        let narrower: Vec<&[String]> = concepts.iter().map(|c| c.narrower_terms.as_slice()).collect();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(concepts.iter().map(|c| c.id).collect::<Vec<_>>()))
                    as Arc<dyn Array>,
                Arc::new(StringArray::from(
                    concepts.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    concepts.iter().map(|c| c.concept_type.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(u32_list_array(&catalog_ids)),
                Arc::new(string_list_array(&related)),
                Arc::new(string_list_array(&synonyms)),
                Arc::new(string_list_array(&broader)),
                Arc::new(string_list_array(&narrower)),
                Arc::new(Float32Array::from(
                    concepts.iter().map(|c| c.weight).collect::<Vec<_>>(),
                )),
                Arc::new(UInt32Array::from(
                    concepts.iter().map(|c| c.chunk_count).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    concepts
                        .iter()
                        .map(|c| c.enrichment_source.as_str())
                        .collect::<Vec<_>>(),
                )),
                Arc::new(embedding_array(&embeddings, self.store.dimension())),
            ],
        )
        .context("Failed to build concept RecordBatch")
    }

    /// Replace-or-insert by id. Lance has no in-place update; delete then
    /// add, the same way re-ingesting a source replaces its rows.
    pub async fn upsert(&self, concepts: &[Concept], validator: &RowValidator) -> Result<()> {
        if concepts.is_empty() {
            return Ok(());
        }
        for concept in concepts {
            let what = format!("concept '{}'", concept.name);
            validator.check_embedding(&what, &concept.embedding).map_err(anyhow::Error::from)?;
            if !(0.0..=1.0).contains(&concept.weight) {
                anyhow::bail!("concept '{}': weight out of range", concept.name);
            }
        }
        let ids: Vec<String> = concepts.iter().map(|c| c.id.to_string()).collect();
        self.store
            .delete_where(TABLE, &format!("id IN ({})", ids.join(", ")))
            .await?;
        let batch = self.to_batch(concepts)?;
        self.store.add_batch(TABLE, self.schema(), batch).await
    }

    /// Exact lookup. Names are content-addressed, so this is an id probe,
    /// not a string scan.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Concept>> {
        self.find_by_id(hash_name(name)).await
    }

    pub async fn find_by_id(&self, id: u32) -> Result<Option<Concept>> {
        let concepts = self.query(Some(&format!("id = {id}")), 1).await?;
        Ok(concepts.into_iter().next())
    }

    pub async fn find_by_ids(&self, ids: &[u32]) -> Result<Vec<Concept>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
        self.query(Some(&format!("id IN ({list})")), ids.len()).await
    }

    /// Nearest concepts to a named one, excluding itself.
    pub async fn find_related(&self, name: &str, k: usize) -> Result<Vec<Concept>> {
        let Some(concept) = self.find_by_name(name).await? else {
            return Ok(Vec::new());
        };
        let hits = self
            .query_nearest(&concept.embedding, k + 1, Some(&format!("id != {}", concept.id)))
            .await?;
        Ok(hits.into_iter().map(|(c, _)| c).take(k).collect())
    }

    /// ANN over concept embeddings; returns similarity alongside each hit.
    pub async fn search_concepts(&self, vector: &[f32], k: usize) -> Result<Vec<(Concept, f32)>> {
        self.query_nearest(vector, k, None).await
    }

    /// All rows, for cache rebuilds only.
    pub async fn find_all(&self) -> Result<Vec<Concept>> {
        self.query(None, usize::MAX).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(TABLE).await
    }

    async fn query_nearest(
        &self,
        vector: &[f32],
        k: usize,
        predicate: Option<&str>,
    ) -> Result<Vec<(Concept, f32)>> {
        let table = self.store.table(TABLE).await?;
        let mut query = table
            .query()
            .nearest_to(vector)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k);
        if let Some(pred) = predicate {
            query = query.only_if(pred.to_string());
        }
        let results = query.execute().await.context("Concept ANN search failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut hits = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let concept = concept_from_row(batch, row);
                if concept.name == "__seed__" {
                    continue;
                }
                if concept.embedding.len() != self.store.dimension() {
                    tracing::warn!(id = concept.id, "Skipping concept row with bad embedding dimension");
                    continue;
                }
                let score = read_vector_score(batch, row);
                hits.push((concept, score));
            }
        }
        Ok(hits)
    }

    async fn query(&self, predicate: Option<&str>, limit: usize) -> Result<Vec<Concept>> {
        let table = self.store.table(TABLE).await?;
        let mut query = table.query();
        if let Some(pred) = predicate {
            query = query.only_if(pred.to_string());
        }
        if limit != usize::MAX {
            query = query.limit(limit);
        }
        let results = query.execute().await.context("Concept query failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut concepts = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let concept = concept_from_row(batch, row);
                if concept.name == "__seed__" {
                    continue;
                }
                if concept.embedding.len() != self.store.dimension() {
                    tracing::warn!(id = concept.id, "Skipping concept row with bad embedding dimension");
                    continue;
                }
                concepts.push(concept);
            }
        }
        Ok(concepts)
    }
}

fn concept_from_row(batch: &RecordBatch, row: usize) -> Concept {
    Concept {
        id: read_u32(batch, "id", row),
        name: read_string(batch, "name", row),
        concept_type: ConceptType::from_str_or_default(&read_string(batch, "type", row)),
        catalog_ids: read_u32_list(batch, "catalog_ids", row),
        related_concepts: read_string_list(batch, "related_concepts", row),
        synonyms: read_string_list(batch, "synonyms", row),
        broader_terms: read_string_list(batch, "broader_terms", row),
        narrower_terms: read_string_list(batch, "narrower_terms", row),
        weight: read_f32(batch, "weight", row),
        chunk_count: read_u32(batch, "chunk_count", row),
        enrichment_source: EnrichmentSource::from_str_or_default(&read_string(
            batch,
            "enrichment_source",
            row,
        )),
        embedding: read_embedding(batch, row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_codec_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LanceStore::connect(dir.path(), 4).await.unwrap());
        let repo = ConceptRepository::new(store);

        let concept = Concept {
            id: hash_name("optimization"),
            name: "optimization".to_string(),
            concept_type: ConceptType::Terminology,
            catalog_ids: vec![100, 200],
            related_concepts: vec!["gradient descent".to_string()],
            synonyms: vec!["optimisation".to_string()],
            broader_terms: vec!["numerical methods".to_string()],
            narrower_terms: vec!["convex optimization".to_string()],
            weight: 0.8,
            chunk_count: 42,
            enrichment_source: EnrichmentSource::Hybrid,
            embedding: vec![0.1, 0.2, 0.3, 0.4],
        };

        let batch = repo.to_batch(std::slice::from_ref(&concept)).unwrap();
        let back = concept_from_row(&batch, 0);
        assert_eq!(back.id, concept.id);
        assert_eq!(back.concept_type, ConceptType::Terminology);
        assert_eq!(back.catalog_ids, vec![100, 200]);
        assert_eq!(back.synonyms, vec!["optimisation"]);
        assert_eq!(back.enrichment_source, EnrichmentSource::Hybrid);
        assert_eq!(back.chunk_count, 42);
    }

    #[tokio::test]
    async fn test_upsert_rejects_out_of_range_weight() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LanceStore::connect(dir.path(), 4).await.unwrap());
        let repo = ConceptRepository::new(store);
        repo.ensure_table().await.unwrap();

        let mut concept = Concept {
            id: 1,
            name: "broken".to_string(),
            concept_type: ConceptType::Thematic,
            catalog_ids: vec![],
            related_concepts: vec![],
            synonyms: vec![],
            broader_terms: vec![],
            narrower_terms: vec![],
            weight: 0.5,
            chunk_count: 0,
            enrichment_source: EnrichmentSource::Corpus,
            embedding: vec![0.0; 4],
        };
        concept.weight = 2.0;
        assert!(repo.upsert(&[concept], &RowValidator::new(4)).await.is_err());
    }
}
