//! Concept-centric retrieval engine for a personal library of long-form
//! documents. Combines dense-vector similarity with lexical scoring,
//! concept-graph expansion, and lexical-ontology enrichment over a
//! LanceDB columnar store, exposed as a tool surface for an LLM host.

pub mod cache;
pub mod config;
pub mod container;
pub mod embeddings;
pub mod error;
pub mod ident;
pub mod ingest;
pub mod search;
pub mod storage;
pub mod tools;
pub mod types;
pub mod wordnet;

// Re-export primary types for convenience
pub use config::EngineConfig;
pub use container::{ApplicationContainer, Capabilities, CorpusStats};
pub use error::EngineError;
pub use search::{HybridSearchService, SearchContext, SearchRequest};
pub use tools::{tool_definitions, ToolDefinition, ToolSurface};
pub use types::{
    CatalogEntry, Category, Chunk, Concept, ConceptType, DocumentKind, EnrichmentSource,
    SearchResult, Visual, VisualType,
};

// Re-export common types
pub use anyhow::{Error, Result};
