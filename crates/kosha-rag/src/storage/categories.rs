use anyhow::{Context, Result};
use arrow_array::{Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use crate::ident::{hash_name, normalize_name};
use crate::storage::{
    embedding_array, embedding_field, read_embedding, read_opt_u32, read_string,
    read_string_list, read_u32, read_u32_list, sql_quote, string_list_array, string_list_field,
    u32_list_array, u32_list_field, LanceStore, RowValidator,
};
use crate::types::Category;

const TABLE: &str = "categories";

/// Typed access to category rows. The table is small (one row per
/// category); operations that sort or match aliases read it whole, which
/// is bounded by the category count, not the corpus size.
pub struct CategoryRepository {
    store: Arc<LanceStore>,
}

impl CategoryRepository {
    pub fn new(store: Arc<LanceStore>) -> Self {
        Self { store }
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("description", DataType::Utf8, false),
            Field::new("parent_id", DataType::UInt32, true),
            string_list_field("aliases"),
            u32_list_field("related_category_ids"),
            Field::new("document_count", DataType::UInt32, false),
            Field::new("chunk_count", DataType::UInt32, false),
            Field::new("concept_count", DataType::UInt32, false),
            embedding_field(self.store.dimension()),
        ]))
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let seed = Category {
            id: 0,
            name: "__seed__".to_string(),
            description: String::new(),
            parent_id: None,
            aliases: vec![],
            related_category_ids: vec![],
            document_count: 0,
            chunk_count: 0,
            concept_count: 0,
            embedding: vec![0.0; self.store.dimension()],
        };
        let batch = self.to_batch(&[seed])?;
        self.store
            .ensure_table(TABLE, self.schema(), batch, "name = '__seed__'")
            .await
    }

    fn to_batch(&self, categories: &[Category]) -> Result<RecordBatch> {
        let embeddings: Vec<&[f32]> = categories.iter().map(|c| c.embedding.as_slice()).collect();
        let aliases: Vec<&[String]> = categories.iter().map(|c| c.aliases.as_slice()).collect();
        let related: Vec<&[u32]> = categories
            .iter()
            .map(|c| c.related_category_ids.as_slice())
            .collect();
        let parent_ids: Vec<Option<u32>> = categories.iter().map(|c| c.parent_id).collect();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(UInt32Array::from(
                    categories.iter().map(|c| c.id).collect::<Vec<_>>(),
                )) as Arc<dyn Array>,
                Arc::new(StringArray::from(
                    categories.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    categories.iter().map(|c| c.description.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(UInt32Array::from(parent_ids)),
                Arc::new(string_list_array(&aliases)),
                Arc::new(u32_list_array(&related)),
                Arc::new(UInt32Array::from(
                    categories.iter().map(|c| c.document_count).collect::<Vec<_>>(),
                )),
                Arc::new(UInt32Array::from(
                    categories.iter().map(|c| c.chunk_count).collect::<Vec<_>>(),
                )),
                Arc::new(UInt32Array::from(
                    categories.iter().map(|c| c.concept_count).collect::<Vec<_>>(),
                )),
                Arc::new(embedding_array(&embeddings, self.store.dimension())),
            ],
        )
        .context("Failed to build category RecordBatch")
    }

    pub async fn upsert(&self, categories: &[Category], validator: &RowValidator) -> Result<()> {
        if categories.is_empty() {
            return Ok(());
        }
        for category in categories {
            let what = format!("category '{}'", category.name);
            validator.check_embedding(&what, &category.embedding).map_err(anyhow::Error::from)?;
            if category.name.trim().is_empty() {
                anyhow::bail!("category {}: empty name", category.id);
            }
        }
        let ids: Vec<String> = categories.iter().map(|c| c.id.to_string()).collect();
        self.store
            .delete_where(TABLE, &format!("id IN ({})", ids.join(", ")))
            .await?;
        let batch = self.to_batch(categories)?;
        self.store.add_batch(TABLE, self.schema(), batch).await
    }

    pub async fn find_all(&self) -> Result<Vec<Category>> {
        self.query(None).await
    }

    pub async fn find_by_id(&self, id: u32) -> Result<Option<Category>> {
        let rows = self.query(Some(&format!("id = {id}"))).await?;
        Ok(rows.into_iter().next())
    }

    /// Exact lookup by normalized name: an id probe, since the id is the
    /// hash of the name.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Category>> {
        self.find_by_id(hash_name(name)).await
    }

    /// Alias resolution reads the whole (small) table; alias lists are
    /// nested, which Lance predicates cannot reach into portably.
    pub async fn find_by_alias(&self, alias: &str) -> Result<Option<Category>> {
        let wanted = normalize_name(alias);
        let rows = self.query(None).await?;
        Ok(rows
            .into_iter()
            .find(|c| c.aliases.iter().any(|a| normalize_name(a) == wanted)))
    }

    pub async fn find_root_categories(&self) -> Result<Vec<Category>> {
        let rows = self.query(Some("parent_id IS NULL")).await?;
        Ok(rows)
    }

    pub async fn find_children(&self, parent_id: u32) -> Result<Vec<Category>> {
        self.query(Some(&format!("parent_id = {parent_id}"))).await
    }

    /// Categories ordered by document count, most populated first.
    pub async fn get_top_categories(&self, limit: usize) -> Result<Vec<Category>> {
        let mut rows = self.query(None).await?;
        rows.sort_by(|a, b| b.document_count.cmp(&a.document_count).then(a.name.cmp(&b.name)));
        rows.truncate(limit);
        Ok(rows)
    }

    pub async fn search_by_name(&self, substring: &str) -> Result<Vec<Category>> {
        let needle = sql_quote(&normalize_name(substring));
        self.query(Some(&format!("name LIKE '%{needle}%'"))).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.count(TABLE).await
    }

    async fn query(&self, predicate: Option<&str>) -> Result<Vec<Category>> {
        let table = self.store.table(TABLE).await?;
        let mut query = table.query();
        if let Some(pred) = predicate {
            query = query.only_if(pred.to_string());
        }
        let results = query.execute().await.context("Category query failed")?;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        let mut categories = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let category = category_from_row(batch, row);
                if category.name == "__seed__" {
                    continue;
                }
                if category.embedding.len() != self.store.dimension() {
                    tracing::warn!(id = category.id, "Skipping category row with bad embedding dimension");
                    continue;
                }
                categories.push(category);
            }
        }
        Ok(categories)
    }
}

fn category_from_row(batch: &RecordBatch, row: usize) -> Category {
    Category {
        id: read_u32(batch, "id", row),
        name: read_string(batch, "name", row),
        description: read_string(batch, "description", row),
        parent_id: read_opt_u32(batch, "parent_id", row),
        aliases: read_string_list(batch, "aliases", row),
        related_category_ids: read_u32_list(batch, "related_category_ids", row),
        document_count: read_u32(batch, "document_count", row),
        chunk_count: read_u32(batch, "chunk_count", row),
        concept_count: read_u32(batch, "concept_count", row),
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
        let repo = CategoryRepository::new(store);

        let category = Category {
            id: hash_name("software engineering"),
            name: "software engineering".to_string(),
            description: "Building software that lasts".to_string(),
            parent_id: Some(hash_name("engineering")),
            aliases: vec!["swe".to_string()],
            related_category_ids: vec![hash_name("distributed systems")],
            document_count: 12,
            chunk_count: 900,
            concept_count: 74,
            embedding: vec![0.1, 0.2, 0.3, 0.4],
        };

        let batch = repo.to_batch(std::slice::from_ref(&category)).unwrap();
        let back = category_from_row(&batch, 0);
        assert_eq!(back.id, category.id);
        assert_eq!(back.parent_id, category.parent_id);
        assert_eq!(back.aliases, vec!["swe"]);
        assert_eq!(back.document_count, 12);
        assert_eq!(back.related_category_ids, category.related_category_ids);
    }

    #[tokio::test]
    async fn test_upsert_rejects_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LanceStore::connect(dir.path(), 4).await.unwrap());
        let repo = CategoryRepository::new(store);
        repo.ensure_table().await.unwrap();

        let category = Category {
            id: 1,
            name: "  ".to_string(),
            description: String::new(),
            parent_id: None,
            aliases: vec![],
            related_category_ids: vec![],
            document_count: 0,
            chunk_count: 0,
            concept_count: 0,
            embedding: vec![0.0; 4],
        };
        assert!(repo.upsert(&[category], &RowValidator::new(4)).await.is_err());
    }
}
