//! Composition root.
//!
//! Owns construction, cache initialization, post-ingestion refresh, and
//! shutdown. Everything downstream receives its collaborators through
//! constructor parameters; nothing reaches for module-level state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cache::{CategoryCache, ConceptCache};
use crate::config::EngineConfig;
use crate::embeddings::EmbeddingModel;
use crate::ingest::{
    ConceptExtractor, DocumentLoader, IngestReport, IngestionPipeline, VisualExtractor,
};
use crate::search::{HybridSearchService, QueryExpander, RepositoryCandidates};
use crate::storage::{
    CatalogRepository, CategoryRepository, ChunkRepository, ConceptRepository, LanceStore,
    RowValidator, VisualRepository,
};
use crate::tools::ToolSurface;
use crate::wordnet::{Lexicon, WordNetService};

const RELATED_CATEGORIES_CAP: usize = 5;

/// External capabilities the engine consumes but never implements.
pub struct Capabilities {
    pub loader: Arc<dyn DocumentLoader>,
    pub concept_extractor: Arc<dyn ConceptExtractor>,
    pub visual_extractor: Option<Arc<dyn VisualExtractor>>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub lexicon: Arc<dyn Lexicon>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorpusStats {
    pub documents: usize,
    pub chunks: usize,
    pub concepts: usize,
    pub categories: usize,
    pub visuals: usize,
}

pub struct ApplicationContainer {
    config: EngineConfig,
    store: Arc<LanceStore>,
    catalog: Arc<CatalogRepository>,
    chunks: Arc<ChunkRepository>,
    concepts: Arc<ConceptRepository>,
    categories: Arc<CategoryRepository>,
    visuals: Arc<VisualRepository>,
    concept_cache: Arc<ConceptCache>,
    category_cache: Arc<CategoryCache>,
    wordnet: Arc<WordNetService>,
    pipeline: IngestionPipeline,
    tools: ToolSurface,
    shutdown: CancellationToken,
}

impl ApplicationContainer {
    pub async fn new(config: EngineConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;
        anyhow::ensure!(
            capabilities.embedder.dimension() == config.embedding.dimension,
            "embedder dimension {} does not match configured dimension {}",
            capabilities.embedder.dimension(),
            config.embedding.dimension,
        );

        let store = Arc::new(
            LanceStore::connect(&config.data_dir.join("lance_data"), config.embedding.dimension)
                .await
                .context("Failed to initialize LanceDB store")?,
        );

        let catalog = Arc::new(CatalogRepository::new(store.clone()));
        let chunks = Arc::new(ChunkRepository::new(store.clone()));
        let concepts = Arc::new(ConceptRepository::new(store.clone()));
        let categories = Arc::new(CategoryRepository::new(store.clone()));
        let visuals = Arc::new(VisualRepository::new(store.clone()));
        catalog.ensure_table().await?;
        chunks.ensure_table().await?;
        concepts.ensure_table().await?;
        categories.ensure_table().await?;
        visuals.ensure_table().await?;

        let concept_cache = Arc::new(ConceptCache::new());
        let category_cache = Arc::new(CategoryCache::new());
        let wordnet = Arc::new(WordNetService::new(capabilities.lexicon.clone(), &config.wordnet));

        let expander = Arc::new(QueryExpander::new(
            concepts.clone(),
            concept_cache.clone(),
            wordnet.clone(),
            capabilities.embedder.clone(),
            config.clone(),
        ));
        let candidate_source = Arc::new(RepositoryCandidates {
            catalog: catalog.clone(),
            chunks: chunks.clone(),
            concepts: concepts.clone(),
        });
        let hybrid = Arc::new(HybridSearchService::new(
            capabilities.embedder.clone(),
            expander,
            candidate_source,
            concept_cache.clone(),
            config.clone(),
        ));

        let pipeline = IngestionPipeline::new(
            capabilities.loader,
            capabilities.concept_extractor,
            capabilities.visual_extractor,
            capabilities.embedder,
            wordnet.clone(),
            catalog.clone(),
            chunks.clone(),
            concepts.clone(),
            categories.clone(),
            visuals.clone(),
            concept_cache.clone(),
            category_cache.clone(),
            config.clone(),
        );

        let tools = ToolSurface::new(
            hybrid,
            catalog.clone(),
            chunks.clone(),
            concepts.clone(),
            visuals.clone(),
            concept_cache.clone(),
            category_cache.clone(),
        );

        Ok(Self {
            config,
            store,
            catalog,
            chunks,
            concepts,
            categories,
            visuals,
            concept_cache,
            category_cache,
            wordnet,
            pipeline,
            tools,
            shutdown: CancellationToken::new(),
        })
    }

    /// Build the identifier caches and start the WordNet prewarm in the
    /// background. Prewarm never blocks query traffic.
    pub async fn initialize(&self) -> Result<()> {
        self.concept_cache.refresh(&self.concepts).await?;
        self.category_cache.refresh(&self.categories).await?;

        let wordnet = self.wordnet.clone();
        let concept_cache = self.concept_cache.clone();
        let cancel = self.shutdown.clone();
        let concurrency = self.config.wordnet.prewarm_concurrency;
        tokio::spawn(async move {
            let terms = concept_cache.all_names();
            wordnet.prewarm_cache(&terms, concurrency, &cancel).await;
        });
        Ok(())
    }

    /// Ingest a document, then rebuild caches and recompute category
    /// statistics from the new corpus state.
    pub async fn ingest(&self, source: &str) -> Result<IngestReport> {
        let report = self.pipeline.ingest(source).await?;
        self.refresh().await?;
        Ok(report)
    }

    /// Rebuild identity caches and category statistics after writes.
    pub async fn refresh(&self) -> Result<()> {
        self.concept_cache.refresh(&self.concepts).await?;
        self.category_cache.refresh(&self.categories).await?;
        self.recompute_category_stats().await?;
        self.category_cache.refresh(&self.categories).await?;
        self.store.create_index_if_needed("chunks").await.ok();
        self.store.create_index_if_needed("catalog").await.ok();
        self.store.create_index_if_needed("concepts").await.ok();
        Ok(())
    }

    pub fn tools(&self) -> &ToolSurface {
        &self.tools
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel background work. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        tracing::info!("Engine shutdown requested");
    }

    pub async fn corpus_stats(&self) -> Result<CorpusStats> {
        Ok(CorpusStats {
            documents: self.catalog.count().await?,
            chunks: self.chunks.count_chunks().await?,
            concepts: self.concepts.count().await?,
            categories: self.categories.count().await?,
            visuals: self.visuals.count().await?,
        })
    }

    /// Recompute per-category document/chunk/concept counts and the
    /// co-occurrence top-k from the current catalog. Statistics are never
    /// maintained incrementally during query.
    async fn recompute_category_stats(&self) -> Result<()> {
        let entries = self.catalog.find_all().await?;
        let existing = self.categories.find_all().await?;
        if existing.is_empty() {
            return Ok(());
        }

        let mut document_counts: HashMap<u32, u32> = HashMap::new();
        let mut chunk_counts: HashMap<u32, u32> = HashMap::new();
        let mut concept_sets: HashMap<u32, HashSet<u32>> = HashMap::new();
        let mut co_occurrence: HashMap<u32, HashMap<u32, u32>> = HashMap::new();

        for entry in &entries {
            let entry_chunks = self.chunks.count_by_catalog_id(entry.id).await? as u32;
            for category_id in &entry.category_ids {
                *document_counts.entry(*category_id).or_insert(0) += 1;
                *chunk_counts.entry(*category_id).or_insert(0) += entry_chunks;
                concept_sets
                    .entry(*category_id)
                    .or_default()
                    .extend(entry.concept_ids.iter().copied());
                for other in &entry.category_ids {
                    if other != category_id {
                        *co_occurrence
                            .entry(*category_id)
                            .or_default()
                            .entry(*other)
                            .or_insert(0) += 1;
                    }
                }
            }
        }

        let mut updated = Vec::with_capacity(existing.len());
        for mut category in existing {
            category.document_count = document_counts.get(&category.id).copied().unwrap_or(0);
            category.chunk_count = chunk_counts.get(&category.id).copied().unwrap_or(0);
            category.concept_count =
                concept_sets.get(&category.id).map_or(0, |s| s.len() as u32);

            let mut related: Vec<(u32, u32)> = co_occurrence
                .get(&category.id)
                .map(|m| m.iter().map(|(id, n)| (*id, *n)).collect())
                .unwrap_or_default();
            related.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            category.related_category_ids = related
                .into_iter()
                .take(RELATED_CATEGORIES_CAP)
                .map(|(id, _)| id)
                .collect();
            updated.push(category);
        }

        let validator = RowValidator::new(self.config.embedding.dimension);
        self.categories.upsert(&updated, &validator).await?;
        tracing::debug!(categories = updated.len(), "Category statistics recomputed");
        Ok(())
    }
}
