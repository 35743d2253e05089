//! Tool surface exposed to the host.
//!
//! Every tool takes a JSON object and returns a JSON document; the host
//! owns transport and request framing. Definitions are published as
//! JSON-schema blocks so a host can list and validate calls up front.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::cache::{CategoryCache, ConceptCache};
use crate::error::EngineError;
use crate::search::{HybridSearchService, SearchContext, SearchRequest};
use crate::storage::{
    CatalogRepository, ChunkRepository, ConceptRepository, VisualRepository,
};
use crate::types::{CatalogEntry, Chunk, SearchResult, Visual, VisualType};

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The engine's tool catalog.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "concept_search".to_string(),
            description: "Find documents, chunks, and images carrying a concept".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "concept": {"type": "string", "description": "Concept name (exact)"},
                    "limit": {"type": "integer", "default": 10},
                    "source_filter": {"type": "string", "description": "Substring filter on the document source"}
                },
                "required": ["concept"]
            }),
        },
        ToolDefinition {
            name: "catalog_search".to_string(),
            description: "Hybrid search over document summaries".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "limit": {"type": "integer", "default": 5},
                    "debug": {"type": "boolean", "default": false}
                },
                "required": ["text"]
            }),
        },
        ToolDefinition {
            name: "chunks_search".to_string(),
            description: "Chunks within a single document, ranked by hybrid score".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "catalog_id": {"type": "integer"},
                    "text": {"type": "string"},
                    "limit": {"type": "integer", "default": 10}
                },
                "required": ["catalog_id"]
            }),
        },
        ToolDefinition {
            name: "broad_chunks_search".to_string(),
            description: "Hybrid chunk search across all documents".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "limit": {"type": "integer", "default": 10},
                    "source_filter": {"type": "string"},
                    "debug": {"type": "boolean", "default": false}
                },
                "required": ["text"]
            }),
        },
        ToolDefinition {
            name: "extract_concepts".to_string(),
            description: "Concepts and ingestion metadata for one document".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source": {"type": "string", "description": "Document source locator"}
                },
                "required": ["source"]
            }),
        },
        ToolDefinition {
            name: "category_search".to_string(),
            description: "Documents and concepts for a category (by name, id, or alias)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string"},
                    "includeChildren": {"type": "boolean", "default": false},
                    "limit": {"type": "integer", "default": 10}
                },
                "required": ["category"]
            }),
        },
        ToolDefinition {
            name: "list_categories".to_string(),
            description: "All categories with precomputed statistics".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sortBy": {"type": "string", "enum": ["name", "popularity", "documentCount"], "default": "name"},
                    "limit": {"type": "integer", "default": 50}
                }
            }),
        },
        ToolDefinition {
            name: "list_concepts_in_category".to_string(),
            description: "Concepts aggregated across a category's documents".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string"},
                    "sortBy": {"type": "string", "enum": ["name", "weight", "chunkCount"], "default": "weight"},
                    "limit": {"type": "integer", "default": 50}
                },
                "required": ["category"]
            }),
        },
        ToolDefinition {
            name: "get_visuals".to_string(),
            description: "Visuals by ids, document, or type".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "ids": {"type": "array", "items": {"type": "integer"}},
                    "catalog_id": {"type": "integer"},
                    "visual_type": {"type": "string", "enum": ["diagram", "flowchart", "chart", "table", "figure"]},
                    "limit": {"type": "integer", "default": 20}
                }
            }),
        },
    ]
}

pub struct ToolSurface {
    hybrid: Arc<HybridSearchService>,
    catalog: Arc<CatalogRepository>,
    chunks: Arc<ChunkRepository>,
    concepts: Arc<ConceptRepository>,
    visuals: Arc<VisualRepository>,
    concept_cache: Arc<ConceptCache>,
    category_cache: Arc<CategoryCache>,
}

impl ToolSurface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hybrid: Arc<HybridSearchService>,
        catalog: Arc<CatalogRepository>,
        chunks: Arc<ChunkRepository>,
        concepts: Arc<ConceptRepository>,
        visuals: Arc<VisualRepository>,
        concept_cache: Arc<ConceptCache>,
        category_cache: Arc<CategoryCache>,
    ) -> Self {
        Self {
            hybrid,
            catalog,
            chunks,
            concepts,
            visuals,
            concept_cache,
            category_cache,
        }
    }

    pub async fn handle(
        &self,
        tool: &str,
        params: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match tool {
            "concept_search" => self.concept_search(params, cancel).await,
            "catalog_search" => self.catalog_search(params, cancel).await,
            "chunks_search" => self.chunks_search(params, cancel).await,
            "broad_chunks_search" => self.broad_chunks_search(params, cancel).await,
            "extract_concepts" => self.extract_concepts(params).await,
            "category_search" => self.category_search(params).await,
            "list_categories" => self.list_categories(params),
            "list_concepts_in_category" => self.list_concepts_in_category(params).await,
            "get_visuals" => self.get_visuals(params).await,
            other => Err(EngineError::InvalidArguments(format!("unknown tool: {other}"))),
        }
    }

    async fn concept_search(
        &self,
        params: &Value,
        _cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let name = required_str(params, "concept")?;
        let limit = optional_usize(params, "limit", 10)?;
        let source_filter = optional_str(params, "source_filter")?;

        let concept = self
            .concepts
            .find_by_name(name)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| {
                let suggestion = self
                    .concept_cache
                    .search_by_name(name)
                    .first()
                    .map(|c| c.name.clone());
                match suggestion {
                    Some(hint) => EngineError::not_found_with_hint("concept", name, hint),
                    None => EngineError::not_found("concept", name),
                }
            })?;

        let mut sources = self
            .catalog
            .find_by_ids(&concept.catalog_ids)
            .await
            .map_err(storage_error)?;
        if let Some(filter) = &source_filter {
            sources.retain(|entry| entry.source.contains(filter.as_str()));
        }
        let allowed: std::collections::HashSet<u32> = sources.iter().map(|e| e.id).collect();

        let mut matching_chunks = self
            .chunks
            .find_by_concept(&concept, limit)
            .await
            .map_err(storage_error)?;
        if source_filter.is_some() {
            matching_chunks.retain(|c| allowed.contains(&c.catalog_id));
        }

        let images = self
            .visuals
            .find_by_concept(concept.id, &concept.embedding, limit.min(6))
            .await
            .map_err(storage_error)?;

        Ok(json!({
            "concept": concept.name,
            "type": concept.concept_type.as_str(),
            "weight": concept.weight,
            "synonyms": concept.synonyms,
            "broader_terms": concept.broader_terms,
            "narrower_terms": concept.narrower_terms,
            "related_concepts": concept.related_concepts,
            "sources": sources.iter().map(catalog_summary_json).collect::<Vec<_>>(),
            "chunks": matching_chunks.iter().map(chunk_json).collect::<Vec<_>>(),
            "images": images.iter().map(visual_json).collect::<Vec<_>>(),
        }))
    }

    async fn catalog_search(
        &self,
        params: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let text = required_str(params, "text")?;
        let limit = optional_usize(params, "limit", 5)?;
        let debug = optional_bool(params, "debug", false)?;

        let request = SearchRequest {
            text: text.to_string(),
            limit,
            debug,
            ..SearchRequest::default()
        };
        let results = self
            .hybrid
            .search(SearchContext::Catalog, &request, cancel)
            .await?;
        Ok(json!({
            "results": results.iter().map(search_result_json).collect::<Vec<_>>(),
            "count": results.len(),
        }))
    }

    async fn chunks_search(
        &self,
        params: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let catalog_id = required_u32(params, "catalog_id")?;
        let limit = optional_usize(params, "limit", 10)?;
        let text = optional_str(params, "text")?;

        let entry = self
            .catalog
            .find_by_id(catalog_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| EngineError::not_found("document", catalog_id.to_string()))?;

        let chunk_values: Vec<Value> = match text {
            Some(text) if !text.trim().is_empty() => {
                let request = SearchRequest {
                    text,
                    limit,
                    catalog_id: Some(catalog_id),
                    ..SearchRequest::default()
                };
                let results = self
                    .hybrid
                    .search(SearchContext::Chunk, &request, cancel)
                    .await?;
                results.iter().map(search_result_json).collect()
            }
            _ => {
                let rows = self
                    .chunks
                    .find_by_catalog_id(catalog_id, limit)
                    .await
                    .map_err(storage_error)?;
                rows.iter().map(chunk_json).collect()
            }
        };

        Ok(json!({
            "catalog_id": catalog_id,
            "title": entry.title,
            "chunks": chunk_values,
        }))
    }

    async fn broad_chunks_search(
        &self,
        params: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let text = required_str(params, "text")?;
        let limit = optional_usize(params, "limit", 10)?;
        let debug = optional_bool(params, "debug", false)?;
        let source_filter = optional_str(params, "source_filter")?;

        let request = SearchRequest {
            text: text.to_string(),
            limit,
            source_filter,
            debug,
            ..SearchRequest::default()
        };
        let mut results = self
            .hybrid
            .search(SearchContext::Chunk, &request, cancel)
            .await?;
        self.resolve_chunk_titles(&mut results).await?;

        Ok(json!({
            "results": results.iter().map(search_result_json).collect::<Vec<_>>(),
            "count": results.len(),
        }))
    }

    async fn extract_concepts(&self, params: &Value) -> Result<Value, EngineError> {
        let source = required_str(params, "source")?;
        let entry = self
            .catalog
            .find_by_source(source)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| EngineError::not_found("document", source))?;

        let concepts = self
            .concepts
            .find_by_ids(&entry.concept_ids)
            .await
            .map_err(storage_error)?;

        Ok(json!({
            "catalog_id": entry.id,
            "title": entry.title,
            "hash": entry.hash,
            "filename_tags": entry.filename_tags,
            "categories": self.category_cache.get_names(&entry.category_ids),
            "author": entry.author,
            "year": entry.year,
            "publisher": entry.publisher,
            "isbn": entry.isbn,
            "concepts": concepts.iter().map(|c| json!({
                "name": c.name,
                "type": c.concept_type.as_str(),
                "weight": c.weight,
                "chunk_count": c.chunk_count,
                "enrichment_source": c.enrichment_source.as_str(),
                "synonyms": c.synonyms,
                "broader_terms": c.broader_terms,
                "narrower_terms": c.narrower_terms,
                "related_concepts": c.related_concepts,
            })).collect::<Vec<_>>(),
        }))
    }

    async fn category_search(&self, params: &Value) -> Result<Value, EngineError> {
        let raw = required_str(params, "category")?;
        let include_children = optional_bool(params, "includeChildren", false)?;
        let limit = optional_usize(params, "limit", 10)?;

        let category_id = self.resolve_category(raw)?;
        let mut ids = vec![category_id];
        if include_children {
            ids.extend(self.category_cache.get_children(category_id));
        }

        let mut documents: Vec<CatalogEntry> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for id in &ids {
            for entry in self
                .catalog
                .find_by_category(*id)
                .await
                .map_err(storage_error)?
            {
                if seen.insert(entry.id) {
                    documents.push(entry);
                }
            }
        }
        documents.truncate(limit);

        let mut concept_ids = Vec::new();
        let mut concept_seen = std::collections::HashSet::new();
        for id in &ids {
            for concept_id in self
                .catalog
                .get_concepts_in_category(*id)
                .await
                .map_err(storage_error)?
            {
                if concept_seen.insert(concept_id) {
                    concept_ids.push(concept_id);
                }
            }
        }

        Ok(json!({
            "category": self.category_cache.get_name(category_id),
            "category_id": category_id,
            "path": self.category_cache.get_hierarchy_path_names(category_id),
            "documents": documents.iter().map(catalog_summary_json).collect::<Vec<_>>(),
            "concepts": self.concept_cache.get_names(&concept_ids),
        }))
    }

    fn list_categories(&self, params: &Value) -> Result<Value, EngineError> {
        let sort_by = optional_str(params, "sortBy")?.unwrap_or_else(|| "name".to_string());
        let limit = optional_usize(params, "limit", 50)?;

        let mut categories = self.category_cache.export_all();
        match sort_by.as_str() {
            "name" => categories.sort_by(|a, b| a.name.cmp(&b.name)),
            // Popularity weighs actual usage volume; documentCount only
            // counts catalog membership.
            "popularity" => categories.sort_by(|a, b| {
                b.chunk_count.cmp(&a.chunk_count).then(a.name.cmp(&b.name))
            }),
            "documentCount" => categories.sort_by(|a, b| {
                b.document_count.cmp(&a.document_count).then(a.name.cmp(&b.name))
            }),
            other => {
                return Err(EngineError::InvalidArguments(format!(
                    "sortBy must be name, popularity, or documentCount; got '{other}'"
                )))
            }
        }
        categories.truncate(limit);

        Ok(json!({
            "categories": categories.iter().map(|c| json!({
                "id": c.id,
                "name": c.name,
                "description": c.description,
                "parent_id": c.parent_id,
                "document_count": c.document_count,
                "chunk_count": c.chunk_count,
                "concept_count": c.concept_count,
            })).collect::<Vec<_>>(),
            "count": categories.len(),
        }))
    }

    async fn list_concepts_in_category(&self, params: &Value) -> Result<Value, EngineError> {
        let raw = required_str(params, "category")?;
        let sort_by = optional_str(params, "sortBy")?.unwrap_or_else(|| "weight".to_string());
        let limit = optional_usize(params, "limit", 50)?;

        let category_id = self.resolve_category(raw)?;
        let concept_ids = self
            .catalog
            .get_concepts_in_category(category_id)
            .await
            .map_err(storage_error)?;

        let mut concepts: Vec<_> = concept_ids
            .iter()
            .filter_map(|id| self.concept_cache.get(*id))
            .collect();
        match sort_by.as_str() {
            "name" => concepts.sort_by(|a, b| a.name.cmp(&b.name)),
            "weight" => concepts.sort_by(|a, b| {
                b.weight
                    .partial_cmp(&a.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            }),
            "chunkCount" => concepts.sort_by(|a, b| {
                b.chunk_count.cmp(&a.chunk_count).then(a.name.cmp(&b.name))
            }),
            other => {
                return Err(EngineError::InvalidArguments(format!(
                    "sortBy must be name, weight, or chunkCount; got '{other}'"
                )))
            }
        }
        concepts.truncate(limit);

        Ok(json!({
            "category": self.category_cache.get_name(category_id),
            "category_id": category_id,
            "concepts": concepts.iter().map(|c| json!({
                "name": c.name,
                "type": c.concept_type.as_str(),
                "weight": c.weight,
                "chunk_count": c.chunk_count,
            })).collect::<Vec<_>>(),
        }))
    }

    async fn get_visuals(&self, params: &Value) -> Result<Value, EngineError> {
        let limit = optional_usize(params, "limit", 20)?;

        let visuals: Vec<Visual> = if let Some(ids) = params.get("ids").and_then(Value::as_array) {
            let ids: Vec<u32> = ids
                .iter()
                .map(|v| {
                    v.as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| EngineError::InvalidArguments("ids must be u32 integers".into()))
                })
                .collect::<Result<_, _>>()?;
            self.visuals.find_by_ids(&ids).await.map_err(storage_error)?
        } else if let Some(catalog_id) = params.get("catalog_id") {
            let id = catalog_id
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| EngineError::InvalidArguments("catalog_id must be a u32".into()))?;
            self.visuals
                .find_by_catalog_id(id)
                .await
                .map_err(storage_error)?
        } else if let Some(kind) = params.get("visual_type").and_then(Value::as_str) {
            let visual_type = VisualType::parse(kind).ok_or_else(|| {
                EngineError::InvalidArguments(format!("unknown visual_type: {kind}"))
            })?;
            self.visuals
                .find_by_visual_type(visual_type, limit)
                .await
                .map_err(storage_error)?
        } else {
            self.visuals.find_all(limit).await.map_err(storage_error)?
        };

        let mut visuals = visuals;
        visuals.truncate(limit);
        Ok(json!({
            "visuals": visuals.iter().map(visual_json).collect::<Vec<_>>(),
            "count": visuals.len(),
        }))
    }

    /// Category lookup by name, numeric id, or alias.
    fn resolve_category(&self, raw: &str) -> Result<u32, EngineError> {
        if let Some(id) = self.category_cache.get_id(raw) {
            return Ok(id);
        }
        if let Ok(id) = raw.trim().parse::<u32>() {
            if self.category_cache.contains(id) {
                return Ok(id);
            }
        }
        if let Some(id) = self.category_cache.get_id_by_alias(raw) {
            return Ok(id);
        }
        let suggestion = self
            .category_cache
            .search_by_name(raw)
            .first()
            .map(|c| c.name.clone());
        Err(match suggestion {
            Some(hint) => EngineError::not_found_with_hint("category", raw, hint),
            None => EngineError::not_found("category", raw),
        })
    }

    /// Chunk results carry no display title of their own; resolve through
    /// the owning catalog entries in one batch.
    async fn resolve_chunk_titles(&self, results: &mut [SearchResult]) -> Result<(), EngineError> {
        let ids: Vec<u32> = {
            let mut seen = std::collections::HashSet::new();
            results
                .iter()
                .map(|r| r.catalog_id)
                .filter(|id| seen.insert(*id))
                .collect()
        };
        let entries = self.catalog.find_by_ids(&ids).await.map_err(storage_error)?;
        let by_id: std::collections::HashMap<u32, &CatalogEntry> =
            entries.iter().map(|e| (e.id, e)).collect();
        for result in results.iter_mut() {
            if let Some(entry) = by_id.get(&result.catalog_id) {
                result.title = entry.title.clone();
                result.source = entry.source.clone();
            }
        }
        Ok(())
    }
}

fn storage_error(e: anyhow::Error) -> EngineError {
    EngineError::Storage(e.to_string())
}

// ── Param helpers ──────────────────────────────────────────────────────────

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, EngineError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| EngineError::InvalidArguments(format!("'{key}' is required")))
}

fn optional_str(params: &Value, key: &str) -> Result<Option<String>, EngineError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(EngineError::InvalidArguments(format!("'{key}' must be a string"))),
    }
}

fn required_u32(params: &Value, key: &str) -> Result<u32, EngineError> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| EngineError::InvalidArguments(format!("'{key}' must be a u32")))
}

fn optional_usize(params: &Value, key: &str, default: usize) -> Result<usize, EngineError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| EngineError::InvalidArguments(format!("'{key}' must be an integer"))),
    }
}

fn optional_bool(params: &Value, key: &str, default: bool) -> Result<bool, EngineError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| EngineError::InvalidArguments(format!("'{key}' must be a boolean"))),
    }
}

// ── JSON shapes ────────────────────────────────────────────────────────────

fn catalog_summary_json(entry: &CatalogEntry) -> Value {
    json!({
        "catalog_id": entry.id,
        "title": entry.title,
        "filename_tags": entry.filename_tags,
        "author": entry.author,
        "year": entry.year,
    })
}

fn chunk_json(chunk: &Chunk) -> Value {
    json!({
        "id": chunk.id,
        "catalog_id": chunk.catalog_id,
        "text": chunk.text,
        "page_number": chunk.page_number,
        "loc": chunk.loc,
        "concept_density": chunk.concept_density,
        "has_math": chunk.has_math,
        "has_extraction_issues": chunk.has_extraction_issues,
    })
}

fn visual_json(visual: &Visual) -> Value {
    json!({
        "id": visual.id,
        "catalog_id": visual.catalog_id,
        "catalog_title": visual.catalog_title,
        "visual_type": visual.visual_type.as_str(),
        "page_number": visual.page_number,
        "description": visual.description,
        "image_path": visual.image_path,
    })
}

fn search_result_json(result: &SearchResult) -> Value {
    let mut value = json!({
        "id": result.id,
        "catalog_id": result.catalog_id,
        "title": result.title,
        "text": result.text,
        "score": result.score,
    });
    if let Some(page) = result.page_number {
        value["page_number"] = json!(page);
    }
    if let Some(debug) = &result.debug {
        value["debug"] = json!({
            "signals": debug.signals,
            "matched_concepts": debug.matched_concepts,
            "expanded_terms": debug.expanded_terms,
        });
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_catalog_is_complete() {
        let names: Vec<String> = tool_definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "concept_search",
                "catalog_search",
                "chunks_search",
                "broad_chunks_search",
                "extract_concepts",
                "category_search",
                "list_categories",
                "list_concepts_in_category",
                "get_visuals",
            ]
        );
    }

    #[test]
    fn test_every_tool_schema_is_an_object() {
        for tool in tool_definitions() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            assert!(!tool.description.is_empty());
        }
    }

    #[test]
    fn test_param_helpers() {
        let params = json!({"text": "query", "limit": 3, "debug": true, "empty": ""});
        assert_eq!(required_str(&params, "text").unwrap(), "query");
        assert!(required_str(&params, "missing").is_err());
        assert!(required_str(&params, "empty").is_err());
        assert_eq!(optional_usize(&params, "limit", 10).unwrap(), 3);
        assert_eq!(optional_usize(&params, "absent", 10).unwrap(), 10);
        assert!(optional_bool(&params, "debug", false).unwrap());
        assert!(optional_usize(&params, "text", 1).is_err());
    }

    #[test]
    fn test_search_result_json_shape() {
        let result = SearchResult {
            id: 5,
            catalog_id: 7,
            title: "T".to_string(),
            text: "body".to_string(),
            source: "/x".to_string(),
            page_number: Some(3),
            score: 0.75,
            debug: None,
        };
        let value = search_result_json(&result);
        assert_eq!(value["catalog_id"], 7);
        assert_eq!(value["page_number"], 3);
        assert!(value.get("debug").is_none());
        // The internal source locator is not leaked by default shapes.
        assert!(value.get("source").is_none());
    }
}
