//! Columnar storage over LanceDB.
//!
//! Five tables (catalog, chunks, concepts, categories, visuals), each with
//! a fixed-dimension embedding column indexed by the store's native ANN.
//! Id arrays are native `List<UInt32>` columns. Every row passes a
//! validator: fatal on write, skip-and-warn on read.

pub mod catalog;
pub mod categories;
pub mod chunks;
pub mod concepts;
pub mod lance_store;
pub mod visuals;

pub use catalog::CatalogRepository;
pub use categories::CategoryRepository;
pub use chunks::ChunkRepository;
pub use concepts::ConceptRepository;
pub use lance_store::LanceStore;
pub use visuals::VisualRepository;

use std::collections::HashSet;
use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder, UInt32Builder};
use arrow_array::{Array, BooleanArray, FixedSizeListArray, Float32Array, ListArray, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field};

use crate::error::EngineError;

/// A row admitted to hybrid scoring after ANN retrieval.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: u32,
    pub catalog_id: u32,
    /// Display title; empty for chunk rows (resolved from the catalog).
    pub title: String,
    pub text: String,
    pub source: String,
    pub page_number: Option<u32>,
    pub concept_ids: Vec<u32>,
    /// Empty for concept rows; concepts are category-agnostic.
    pub category_ids: Vec<u32>,
    /// 1 - cosine distance from the ANN probe, clipped at 0.
    pub vector_score: f32,
}

/// Known identifier sets used to validate rows on the write path.
#[derive(Debug, Default, Clone)]
pub struct RowValidator {
    pub dimension: usize,
    pub concept_ids: HashSet<u32>,
    pub category_ids: HashSet<u32>,
}

impl RowValidator {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn check_embedding(&self, what: &str, embedding: &[f32]) -> Result<(), EngineError> {
        if embedding.len() != self.dimension {
            return Err(EngineError::Validation(format!(
                "{what}: embedding dimension {} != {}",
                embedding.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    pub fn check_concept_ids(&self, what: &str, ids: &[u32]) -> Result<(), EngineError> {
        if let Some(missing) = ids.iter().find(|id| !self.concept_ids.contains(id)) {
            return Err(EngineError::Validation(format!(
                "{what}: concept id {missing} does not resolve"
            )));
        }
        Ok(())
    }

    pub fn check_category_ids(&self, what: &str, ids: &[u32]) -> Result<(), EngineError> {
        if let Some(missing) = ids.iter().find(|id| !self.category_ids.contains(id)) {
            return Err(EngineError::Validation(format!(
                "{what}: category id {missing} does not resolve"
            )));
        }
        Ok(())
    }
}

// ── Arrow column helpers ───────────────────────────────────────────────────

pub(crate) fn embedding_field(dimension: usize) -> Field {
    Field::new(
        "embedding",
        DataType::FixedSizeList(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimension as i32,
        ),
        true,
    )
}

pub(crate) fn u32_list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::UInt32, true))),
        true,
    )
}

pub(crate) fn string_list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
        true,
    )
}

pub(crate) fn embedding_array(vectors: &[&[f32]], dimension: usize) -> FixedSizeListArray {
    let flat: Vec<f32> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
    let values = Float32Array::from(flat);
    FixedSizeListArray::new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension as i32,
        Arc::new(values) as Arc<dyn Array>,
        None,
    )
}

pub(crate) fn u32_list_array(rows: &[&[u32]]) -> ListArray {
    let mut builder = ListBuilder::new(UInt32Builder::new());
    for row in rows {
        for value in *row {
            builder.values().append_value(*value);
        }
        builder.append(true);
    }
    builder.finish()
}

pub(crate) fn string_list_array(rows: &[&[String]]) -> ListArray {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for row in rows {
        for value in *row {
            builder.values().append_value(value);
        }
        builder.append(true);
    }
    builder.finish()
}

// ── Batch readers ──────────────────────────────────────────────────────────

pub(crate) fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

pub(crate) fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
}

pub(crate) fn read_string(batch: &RecordBatch, name: &str, row: usize) -> String {
    string_column(batch, name).map_or_else(String::new, |c| {
        if c.is_null(row) {
            String::new()
        } else {
            c.value(row).to_string()
        }
    })
}

pub(crate) fn read_opt_string(batch: &RecordBatch, name: &str, row: usize) -> Option<String> {
    string_column(batch, name).and_then(|c| {
        if c.is_null(row) || c.value(row).is_empty() {
            None
        } else {
            Some(c.value(row).to_string())
        }
    })
}

pub(crate) fn read_u32(batch: &RecordBatch, name: &str, row: usize) -> u32 {
    u32_column(batch, name).map_or(0, |c| if c.is_null(row) { 0 } else { c.value(row) })
}

pub(crate) fn read_opt_u32(batch: &RecordBatch, name: &str, row: usize) -> Option<u32> {
    u32_column(batch, name).and_then(|c| if c.is_null(row) { None } else { Some(c.value(row)) })
}

pub(crate) fn read_f32(batch: &RecordBatch, name: &str, row: usize) -> f32 {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .map_or(0.0, |c| if c.is_null(row) { 0.0 } else { c.value(row) })
}

pub(crate) fn read_bool(batch: &RecordBatch, name: &str, row: usize) -> bool {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
        .map_or(false, |c| !c.is_null(row) && c.value(row))
}

pub(crate) fn read_u32_list(batch: &RecordBatch, name: &str, row: usize) -> Vec<u32> {
    let Some(list) = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<ListArray>())
    else {
        return Vec::new();
    };
    if list.is_null(row) {
        return Vec::new();
    }
    let values = list.value(row);
    let Some(values) = values.as_any().downcast_ref::<UInt32Array>() else {
        return Vec::new();
    };
    (0..values.len()).filter(|i| !values.is_null(*i)).map(|i| values.value(i)).collect()
}

pub(crate) fn read_string_list(batch: &RecordBatch, name: &str, row: usize) -> Vec<String> {
    let Some(list) = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<ListArray>())
    else {
        return Vec::new();
    };
    if list.is_null(row) {
        return Vec::new();
    }
    let values = list.value(row);
    let Some(values) = values.as_any().downcast_ref::<StringArray>() else {
        return Vec::new();
    };
    (0..values.len())
        .filter(|i| !values.is_null(*i))
        .map(|i| values.value(i).to_string())
        .collect()
}

pub(crate) fn read_embedding(batch: &RecordBatch, row: usize) -> Vec<f32> {
    let Some(list) = batch
        .column_by_name("embedding")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
    else {
        return Vec::new();
    };
    if list.is_null(row) {
        return Vec::new();
    }
    let values = list.value(row);
    let Some(values) = values.as_any().downcast_ref::<Float32Array>() else {
        return Vec::new();
    };
    (0..values.len()).map(|i| values.value(i)).collect()
}

/// ANN distance column: score = 1 - cosine distance, clipped at 0.
pub(crate) fn read_vector_score(batch: &RecordBatch, row: usize) -> f32 {
    batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .map_or(0.0, |d| (1.0 - d.value(row)).max(0.0))
}

/// Escape a string literal for use in a Lance SQL predicate.
pub(crate) fn sql_quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::Schema;

    #[test]
    fn test_u32_list_round_trip() {
        let rows: Vec<&[u32]> = vec![&[3_842_615_478, 1_829_374_562], &[], &[7]];
        let array = u32_list_array(&rows);
        let schema = Arc::new(Schema::new(vec![u32_list_field("concept_ids")]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(array)]).unwrap();

        assert_eq!(read_u32_list(&batch, "concept_ids", 0), vec![3_842_615_478, 1_829_374_562]);
        assert!(read_u32_list(&batch, "concept_ids", 1).is_empty());
        assert_eq!(read_u32_list(&batch, "concept_ids", 2), vec![7]);
    }

    #[test]
    fn test_embedding_round_trip() {
        let a = [0.1f32, 0.2, 0.3, 0.4];
        let b = [0.5f32, 0.6, 0.7, 0.8];
        let vectors: Vec<&[f32]> = vec![&a, &b];
        let array = embedding_array(&vectors, 4);
        let schema = Arc::new(Schema::new(vec![embedding_field(4)]));
        let batch = RecordBatch::try_new(schema, vec![Arc::new(array)]).unwrap();

        assert_eq!(read_embedding(&batch, 0), a.to_vec());
        assert_eq!(read_embedding(&batch, 1), b.to_vec());
    }

    #[test]
    fn test_validator_rejects_wrong_dimension() {
        let validator = RowValidator::new(4);
        assert!(validator.check_embedding("chunk 9", &[0.0; 4]).is_ok());
        let err = validator.check_embedding("chunk 9", &[0.0; 3]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_validator_rejects_unresolvable_ids() {
        let mut validator = RowValidator::new(4);
        validator.concept_ids.insert(11);
        validator.category_ids.insert(22);

        assert!(validator.check_concept_ids("catalog 1", &[11]).is_ok());
        assert!(validator.check_concept_ids("catalog 1", &[11, 99]).is_err());
        assert!(validator.check_category_ids("catalog 1", &[22]).is_ok());
        assert!(validator.check_category_ids("catalog 1", &[33]).is_err());
    }

    #[test]
    fn test_sql_quote_escapes_single_quotes() {
        assert_eq!(sql_quote("o'reilly"), "o''reilly");
    }
}
