use anyhow::{Context, Result};
use arrow_array::{Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use crate::storage::{
    embedding_array, embedding_field, read_embedding, read_string, read_u32, read_u32_list,
    u32_list_array, u32_list_field, LanceStore, RowValidator,
};
use crate::types::{Visual, VisualType};

const TABLE: &str = "visuals";

/// Typed access to extracted visuals. Visuals link to chunks only through
/// `catalog_id`; no chunk ids are stored here.
pub struct VisualRepository {
    store: Arc<LanceStore>,
}

impl VisualRepository {
    pub fn new(store: Arc<LanceStore>) -> Self {
        Self { store }
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("catalog_id", DataType::UInt32, false),
            Field::new("catalog_title", DataType::Utf8, false),
            Field::new("visual_type", DataType::Utf8, false),
            Field::new("page_number", DataType::UInt32, false),
            Field::new("description", DataType::Utf8, false),
            u32_list_field("concept_ids"),
            Field::new("image_path", DataType::Utf8, false),
            embedding_field(self.store.dimension()),
        ]))
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let seed = Visual {
            id: 0,
            catalog_id: 0,
            catalog_title: String::new(),
            visual_type: VisualType::Figure,
            page_number: 0,
            description: String::new(),
            concept_ids: vec![],
            image_path: "__seed__".to_string(),
            embedding: vec![0.0; self.store.dimension()],
        };
        let batch = self.to_batch(&[seed])?;
        self.store
            .ensure_table(TABLE, self.schema(), batch, "image_path = '__seed__'")
            .await
    }

    fn to_batch(&self, visuals: &[Visual]) -> Result<RecordBatch> {
        let embeddings: Vec<&[f32]> = visuals.iter().map(|v| v.embedding.as_slice()).collect();
        let concept_ids: Vec<&[u32]> = visuals.iter().map(|v| v.concept_ids.as_slice()).collect();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(visuals.iter().map(|v| v.id).collect::<Vec<_>>()))
                    as Arc<dyn Array>,
                Arc::new(UInt32Array::from(
                    visuals.iter().map(|v| v.catalog_id).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    visuals.iter().map(|v| v.catalog_title.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    visuals.iter().map(|v| v.visual_type.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(UInt32Array::from(
                    visuals.iter().map(|v| v.page_number).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    visuals.iter().map(|v| v.description.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(u32_list_array(&concept_ids)),
                Arc::new(StringArray::from(
                    visuals.iter().map(|v| v.image_path.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(embedding_array(&embeddings, self.store.dimension())),
            ],
        )
        .context("Failed to build visual RecordBatch")
    }

    pub async fn insert(&self, visuals: &[Visual], validator: &RowValidator) -> Result<()> {
        if visuals.is_empty() {
            return Ok(());
        }
        for visual in visuals {
            let what = format!("visual {}", visual.id);
            validator.check_embedding(&what, &visual.embedding).map_err(anyhow::Error::from)?;
            validator.check_concept_ids(&what, &visual.concept_ids).map_err(anyhow::Error::from)?;
        }
        let batch = self.to_batch(visuals)?;
        self.store.add_batch(TABLE, self.schema(), batch).await
    }

    pub async fn delete_by_catalog_id(&self, catalog_id: u32) -> Result<usize> {
        self.store
            .delete_where(TABLE, &format!("catalog_id = {catalog_id}"))
            .await
    }

    pub async fn find_by_ids(&self, ids: &[u32]) -> Result<Vec<Visual>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
        self.query(Some(&format!("id IN ({list})")), ids.len()).await
    }

    pub async fn find_by_catalog_id(&self, catalog_id: u32) -> Result<Vec<Visual>> {
        let mut visuals = self
            .query(Some(&format!("catalog_id = {catalog_id}")), usize::MAX)
            .await?;
        visuals.sort_by_key(|v| v.page_number);
        Ok(visuals)
    }

    pub async fn find_by_visual_type(&self, visual_type: VisualType, limit: usize) -> Result<Vec<Visual>> {
        self.query(
            Some(&format!("visual_type = '{}'", visual_type.as_str())),
            limit,
        )
        .await
    }

    pub async fn find_all(&self, limit: usize) -> Result<Vec<Visual>> {
        self.query(None, limit).await
    }

    /// Top visuals for a concept: ANN with the concept's embedding, then
    /// filter to rows actually tagged with the concept id.
    pub async fn find_by_concept(&self, concept_id: u32, vector: &[f32], limit: usize) -> Result<Vec<Visual>> {
        let table = self.store.table(TABLE).await?;
        let query = table
            .query()
            .nearest_to(vector)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(limit.saturating_mul(3));
        let results = query.execute().await.context("Visual ANN search failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut visuals: Vec<Visual> = self
            .rows_from_batches(&batches)
            .into_iter()
            .filter(|v| v.concept_ids.contains(&concept_id))
            .collect();
        visuals.truncate(limit);
        Ok(visuals)
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(TABLE).await
    }

    async fn query(&self, predicate: Option<&str>, limit: usize) -> Result<Vec<Visual>> {
        let table = self.store.table(TABLE).await?;
        let mut query = table.query();
        if let Some(pred) = predicate {
            query = query.only_if(pred.to_string());
        }
        if limit != usize::MAX {
            query = query.limit(limit);
        }
        let results = query.execute().await.context("Visual query failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;
        Ok(self.rows_from_batches(&batches))
    }

    fn rows_from_batches(&self, batches: &[RecordBatch]) -> Vec<Visual> {
        let mut visuals = Vec::new();
        for batch in batches {
            for row in 0..batch.num_rows() {
                let visual = visual_from_row(batch, row);
                if visual.image_path == "__seed__" {
                    continue;
                }
                if visual.embedding.len() != self.store.dimension() {
                    tracing::warn!(id = visual.id, "Skipping visual row with bad embedding dimension");
                    continue;
                }
                visuals.push(visual);
            }
        }
        visuals
    }
}

fn visual_from_row(batch: &RecordBatch, row: usize) -> Visual {
    Visual {
        id: read_u32(batch, "id", row),
        catalog_id: read_u32(batch, "catalog_id", row),
        catalog_title: read_string(batch, "catalog_title", row),
        visual_type: VisualType::parse(&read_string(batch, "visual_type", row))
            .unwrap_or(VisualType::Figure),
        page_number: read_u32(batch, "page_number", row),
        description: read_string(batch, "description", row),
        concept_ids: read_u32_list(batch, "concept_ids", row),
        image_path: read_string(batch, "image_path", row),
        embedding: read_embedding(batch, row),
    }
}
