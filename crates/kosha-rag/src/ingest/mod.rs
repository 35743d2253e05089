//! Ingestion pipeline.
//!
//! Turns a loaded document into catalog, chunk, concept, category, and
//! visual rows: math cleanup, meta-content and reference tagging, paper
//! vs book detection, metadata extraction, concept wiring, and the
//! source-keyed replacement that makes re-ingestion idempotent.

pub mod chunker;
pub mod content_metadata;
pub mod math;
pub mod meta_content;
pub mod paper_detector;
pub mod paper_metadata;
pub mod references;

pub use chunker::PageChunker;
pub use content_metadata::{BookMetadata, ContentMetadataExtractor};
pub use math::{MathAnalysis, MathHandler, MathType};
pub use meta_content::{MetaContentDetector, MetaContentFlags};
pub use paper_detector::{DetectionInput, PaperClassification, PaperDetector};
pub use paper_metadata::{ExtractedField, PaperMetadata, PaperMetadataExtractor};
pub use references::{PageText, ReferencesDetection, ReferencesDetector};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::{CategoryCache, ConceptCache};
use crate::config::EngineConfig;
use crate::embeddings::EmbeddingModel;
use crate::ident::{hash_name, normalize_name, IdRegistry};
use crate::storage::{
    CatalogRepository, CategoryRepository, ChunkRepository, ConceptRepository, RowValidator,
    VisualRepository,
};
use crate::types::{
    CatalogEntry, Category, Chunk, Concept, ConceptType, DocumentKind, EnrichmentSource, Visual,
    VisualType,
};
use crate::wordnet::WordNetService;

const SUMMARY_INPUT_CHARS: usize = 6_000;
const FALLBACK_SUMMARY_CHARS: usize = 1_200;
const METADATA_CONFIDENCE_THRESHOLD: f32 = 0.6;
const RELATED_CONCEPTS_CAP: usize = 10;
const SYNONYM_CAP: usize = 8;
const HIERARCHY_TERM_CAP: usize = 5;

// ── External capabilities ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub producer: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub pages: Vec<PageText>,
    pub metadata: PdfMetadata,
}

/// Raw document access (PDF/EPUB extraction lives outside the engine).
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<LoadedDocument>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedConcept {
    pub name: String,
    #[serde(rename = "type")]
    pub concept_type: ConceptType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedConcepts {
    pub primary_concepts: Vec<ExtractedConcept>,
    pub categories: Vec<String>,
    /// Enriched document summary, when the extractor produces one.
    pub summary: Option<String>,
}

/// LLM-backed concept extraction (external).
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    async fn extract(&self, title: &str, text: &str) -> Result<ExtractedConcepts>;
}

#[derive(Debug, Clone)]
pub struct ExtractedVisual {
    pub visual_type: VisualType,
    pub page_number: u32,
    pub description: String,
    pub image_path: String,
}

/// Diagram/figure extraction (external).
#[async_trait]
pub trait VisualExtractor: Send + Sync {
    async fn extract(&self, source: &str, catalog_id: u32) -> Result<Vec<ExtractedVisual>>;
}

// ── Filename contract ──────────────────────────────────────────────────────

/// Split a file name into its display name and `--`-separated tags:
/// "clean-code--craftsmanship--refactoring.pdf" yields
/// ("clean-code", ["craftsmanship", "refactoring"]).
pub fn parse_filename(filename: &str) -> (String, Vec<String>) {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);

    match stem.split_once("--") {
        Some((name, rest)) => {
            let tags = rest
                .split("--")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            (name.trim().to_string(), tags)
        }
        None => (stem.trim().to_string(), Vec::new()),
    }
}

// ── Pipeline ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub catalog_id: u32,
    pub title: String,
    pub kind: DocumentKind,
    pub chunk_count: usize,
    pub concept_count: usize,
    pub new_categories: usize,
    pub visual_count: usize,
    pub references: ReferencesDetection,
    /// Pages flagged with extraction damage; non-fatal.
    pub extraction_warnings: usize,
}

pub struct IngestionPipeline {
    loader: Arc<dyn DocumentLoader>,
    concept_extractor: Arc<dyn ConceptExtractor>,
    visual_extractor: Option<Arc<dyn VisualExtractor>>,
    embedder: Arc<dyn EmbeddingModel>,
    wordnet: Arc<WordNetService>,
    catalog: Arc<CatalogRepository>,
    chunks: Arc<ChunkRepository>,
    concepts: Arc<ConceptRepository>,
    categories: Arc<CategoryRepository>,
    visuals: Arc<VisualRepository>,
    concept_cache: Arc<ConceptCache>,
    category_cache: Arc<CategoryCache>,
    chunker: PageChunker,
    config: EngineConfig,
}

impl IngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        concept_extractor: Arc<dyn ConceptExtractor>,
        visual_extractor: Option<Arc<dyn VisualExtractor>>,
        embedder: Arc<dyn EmbeddingModel>,
        wordnet: Arc<WordNetService>,
        catalog: Arc<CatalogRepository>,
        chunks: Arc<ChunkRepository>,
        concepts: Arc<ConceptRepository>,
        categories: Arc<CategoryRepository>,
        visuals: Arc<VisualRepository>,
        concept_cache: Arc<ConceptCache>,
        category_cache: Arc<CategoryCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            loader,
            concept_extractor,
            visual_extractor,
            embedder,
            wordnet,
            catalog,
            chunks,
            concepts,
            categories,
            visuals,
            concept_cache,
            category_cache,
            chunker: PageChunker::new(1_600, 80),
            config,
        }
    }

    /// Ingest one document, replacing any earlier rows for the same
    /// source. The caller refreshes the identifier caches afterwards.
    pub async fn ingest(&self, source: &str) -> Result<IngestReport> {
        let doc = self
            .loader
            .load(source)
            .await
            .with_context(|| format!("Failed to load document: {source}"))?;
        anyhow::ensure!(!doc.pages.is_empty(), "document has no pages: {source}");

        let catalog_id = hash_name(source);
        let filename = source.rsplit('/').next().unwrap_or(source);
        let (base_name, filename_tags) = parse_filename(filename);

        let total_pages = doc
            .pages
            .iter()
            .map(|p| p.page_number)
            .max()
            .unwrap_or(doc.pages.len() as u32);
        let full_text: String = doc
            .pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let first_pages: String = doc
            .pages
            .iter()
            .take(3)
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let classification = PaperDetector::classify(&DetectionInput {
            filename,
            first_pages: &first_pages,
            full_text: &full_text,
            page_count: total_pages,
            pdf_producer: doc.metadata.producer.as_deref(),
        });
        let references = ReferencesDetector::detect_references_start(&doc.pages);

        // Chunk pages with classification flags; embeddings come later.
        let (mut chunk_rows, extraction_warnings) =
            self.build_chunks(source, catalog_id, &doc.pages, total_pages, &classification, &references);

        // Concepts and categories from the external extractor.
        let summary_input = truncate_chars(&full_text, SUMMARY_INPUT_CHARS);
        let extracted = self
            .concept_extractor
            .extract(&base_name, summary_input)
            .await
            .context("Concept extraction failed")?;
        let mut category_names = extracted.categories.clone();
        if category_names.is_empty() {
            category_names.push("uncategorized".to_string());
        }

        // Identity registration with collision detection against the
        // existing corpus. A collision is fatal, never silent.
        let mut category_registry = IdRegistry::new();
        let existing_categories = self.category_cache.export_all();
        category_registry
            .seed(existing_categories.iter().map(|c| c.name.as_str()))
            .map_err(anyhow::Error::from)?;
        let mut category_ids = Vec::new();
        for name in &category_names {
            let id = category_registry.register(name).map_err(anyhow::Error::from)?;
            if !category_ids.contains(&id) {
                category_ids.push(id);
            }
        }

        let mut concept_registry = IdRegistry::new();
        let existing_concept_names = self.concept_cache.all_names();
        concept_registry
            .seed(existing_concept_names.iter().map(String::as_str))
            .map_err(anyhow::Error::from)?;
        let mut doc_concepts: Vec<(u32, ExtractedConcept)> = Vec::new();
        for concept in &extracted.primary_concepts {
            let id = concept_registry.register(&concept.name).map_err(anyhow::Error::from)?;
            if !doc_concepts.iter().any(|(existing, _)| *existing == id) {
                doc_concepts.push((id, concept.clone()));
            }
        }

        // Tag chunks with the concepts they mention; density follows.
        let concept_norms: Vec<(u32, String)> = doc_concepts
            .iter()
            .map(|(id, c)| (*id, normalize_name(&c.name)))
            .collect();
        for chunk in &mut chunk_rows {
            let haystack = chunk.text.to_lowercase();
            chunk.concept_ids = concept_norms
                .iter()
                .filter(|(_, name)| haystack.contains(name.as_str()))
                .map(|(id, _)| *id)
                .collect();
            chunk.concept_density = if concept_norms.is_empty() {
                0.0
            } else {
                chunk.concept_ids.len() as f32 / concept_norms.len() as f32
            };
            chunk.category_ids = category_ids.clone();
        }

        let concept_rows = self
            .build_concepts(catalog_id, &doc_concepts, &chunk_rows)
            .await?;

        // Document metadata: papers read LaTeX front matter, books read
        // the copyright page.
        let (title, author, year, publisher, isbn) =
            self.extract_metadata(&classification, &first_pages, &chunk_rows, &base_name);

        let summary = extracted
            .summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| truncate_chars(&full_text, FALLBACK_SUMMARY_CHARS).to_string());

        // Embeddings for every row kind.
        let chunk_texts: Vec<&str> = chunk_rows.iter().map(|c| c.text.as_str()).collect();
        let chunk_embeddings = self
            .embedder
            .embed_documents(&chunk_texts)
            .await
            .context("Chunk embedding failed")?;
        for (chunk, embedding) in chunk_rows.iter_mut().zip(chunk_embeddings) {
            chunk.embedding = embedding;
        }
        let catalog_embedding = self
            .embedder
            .embed_document(&summary)
            .await
            .context("Summary embedding failed")?;

        let catalog_entry = CatalogEntry {
            id: catalog_id,
            title,
            source: source.to_string(),
            hash: hex::encode(Sha256::digest(full_text.as_bytes())),
            origin_hash: None,
            text: summary,
            embedding: catalog_embedding,
            concept_ids: doc_concepts.iter().map(|(id, _)| *id).collect(),
            category_ids: category_ids.clone(),
            filename_tags,
            author,
            year,
            publisher,
            isbn,
        };

        // New categories get rows; statistics are recomputed at refresh.
        let new_category_rows = self.build_categories(&category_names, &category_ids).await?;

        // Validator knows every id that will resolve after this write.
        let mut validator = RowValidator::new(self.config.embedding.dimension);
        validator.concept_ids = self.concept_cache.all_ids();
        validator
            .concept_ids
            .extend(doc_concepts.iter().map(|(id, _)| *id));
        validator.category_ids = self.category_cache.all_ids();
        validator.category_ids.extend(category_ids.iter().copied());

        // Replace-then-insert keeps re-ingestion idempotent.
        self.catalog.delete_by_source(source).await?;
        self.chunks.delete_by_catalog_id(catalog_id).await?;
        self.visuals.delete_by_catalog_id(catalog_id).await?;

        self.categories.upsert(&new_category_rows, &validator).await?;
        self.concepts.upsert(&concept_rows, &validator).await?;
        self.catalog.insert(std::slice::from_ref(&catalog_entry), &validator).await?;
        self.chunks.insert(&chunk_rows, &validator).await?;

        let visual_count = self
            .ingest_visuals(source, &catalog_entry, &concept_norms, &validator)
            .await?;

        tracing::info!(
            source,
            catalog_id,
            kind = %classification.kind,
            chunks = chunk_rows.len(),
            concepts = concept_rows.len(),
            "Document ingested"
        );

        Ok(IngestReport {
            catalog_id,
            title: catalog_entry.title,
            kind: classification.kind,
            chunk_count: chunk_rows.len(),
            concept_count: concept_rows.len(),
            new_categories: new_category_rows.len(),
            visual_count,
            references,
            extraction_warnings,
        })
    }

    fn build_chunks(
        &self,
        source: &str,
        catalog_id: u32,
        pages: &[PageText],
        total_pages: u32,
        classification: &PaperClassification,
        references: &ReferencesDetection,
    ) -> (Vec<Chunk>, usize) {
        let mut rows = Vec::new();
        let mut warnings = 0usize;

        for page in pages {
            let page_analysis = MathHandler::analyze(&page.text);
            if page_analysis.has_extraction_issues {
                warnings += 1;
                tracing::warn!(
                    source,
                    page = page.page_number,
                    "Extraction damage detected; recovering math symbols"
                );
            }
            let cleaned = MathHandler::clean(&page.text);

            for (index, segment) in self.chunker.split(&cleaned).into_iter().enumerate() {
                let meta = MetaContentDetector::classify(
                    &segment,
                    page.page_number,
                    total_pages,
                    classification.kind,
                );
                let is_reference = references
                    .starts_at_page
                    .is_some_and(|start| page.page_number >= start);
                let analysis = MathHandler::analyze(&segment);
                let loc = format!("p{}.c{}", page.page_number, index);
                let contains_citations = ReferencesDetector::contains_citations(&segment);

                rows.push(Chunk {
                    id: hash_name(&format!("{source}#{loc}")),
                    catalog_id,
                    text: segment,
                    page_number: page.page_number,
                    loc,
                    embedding: Vec::new(),
                    concept_ids: Vec::new(),
                    category_ids: Vec::new(),
                    concept_density: 0.0,
                    is_toc: meta.is_toc,
                    is_front_matter: meta.is_front_matter,
                    is_back_matter: meta.is_back_matter,
                    is_meta_content: meta.is_meta_content,
                    is_reference,
                    contains_citations,
                    has_math: analysis.has_math,
                    has_extraction_issues: page_analysis.has_extraction_issues,
                });
            }
        }
        (rows, warnings)
    }

    /// Build concept rows: merge document membership into existing rows,
    /// wire co-occurrence, and enrich from the lexical ontology.
    async fn build_concepts(
        &self,
        catalog_id: u32,
        doc_concepts: &[(u32, ExtractedConcept)],
        chunk_rows: &[Chunk],
    ) -> Result<Vec<Concept>> {
        // Per-concept chunk membership for co-occurrence counting.
        let membership: HashMap<u32, HashSet<u32>> = doc_concepts
            .iter()
            .map(|(id, _)| {
                let chunks: HashSet<u32> = chunk_rows
                    .iter()
                    .filter(|c| c.concept_ids.contains(id))
                    .map(|c| c.id)
                    .collect();
                (*id, chunks)
            })
            .collect();

        let mut rows = Vec::with_capacity(doc_concepts.len());
        for (id, extracted) in doc_concepts {
            let existing = self.concepts.find_by_id(*id).await?;
            let in_chunks = membership.get(id).map_or(0, HashSet::len) as u32;

            // Co-occurring document concepts, most shared chunks first.
            let mut co: Vec<(String, usize)> = doc_concepts
                .iter()
                .filter(|(other, _)| other != id)
                .filter_map(|(other, other_extracted)| {
                    let shared = membership
                        .get(id)
                        .zip(membership.get(other))
                        .map_or(0, |(a, b)| a.intersection(b).count());
                    (shared > 0).then(|| (other_extracted.name.clone(), shared))
                })
                .collect();
            co.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

            let mut related_concepts: Vec<String> =
                existing.as_ref().map_or_else(Vec::new, |e| e.related_concepts.clone());
            for (name, _) in co {
                if !related_concepts.iter().any(|r| normalize_name(r) == normalize_name(&name)) {
                    related_concepts.push(name);
                }
            }
            related_concepts.truncate(RELATED_CONCEPTS_CAP);

            let mut catalog_ids = existing.as_ref().map_or_else(Vec::new, |e| e.catalog_ids.clone());
            let re_ingest = catalog_ids.contains(&catalog_id);
            if !re_ingest {
                catalog_ids.push(catalog_id);
            }

            let chunk_count = match &existing {
                Some(e) if re_ingest => e.chunk_count,
                Some(e) => e.chunk_count + in_chunks,
                None => in_chunks,
            };

            // Ontology enrichment; empty results leave a corpus-only row.
            let related_terms = self.wordnet.get_all_related_terms(&extracted.name).await;
            let mut synonyms = related_terms.synonyms;
            synonyms.truncate(SYNONYM_CAP);
            let mut broader = related_terms.broader;
            broader.truncate(HIERARCHY_TERM_CAP);
            let mut narrower = related_terms.narrower;
            narrower.truncate(HIERARCHY_TERM_CAP);
            let enrichment_source =
                if synonyms.is_empty() && broader.is_empty() && narrower.is_empty() {
                    EnrichmentSource::Corpus
                } else {
                    EnrichmentSource::Hybrid
                };

            let embedding = match &existing {
                Some(e) => e.embedding.clone(),
                None => self
                    .embedder
                    .embed_document(&extracted.name)
                    .await
                    .context("Concept embedding failed")?,
            };

            rows.push(Concept {
                id: *id,
                name: extracted.name.clone(),
                concept_type: extracted.concept_type,
                catalog_ids,
                related_concepts,
                synonyms,
                broader_terms: broader,
                narrower_terms: narrower,
                weight: 0.0, // normalized below
                chunk_count,
                enrichment_source,
                embedding,
            });
        }

        // Document frequency normalized against the strongest concept in
        // this write set.
        let max_df = rows.iter().map(|r| r.catalog_ids.len()).max().unwrap_or(1).max(1);
        for row in &mut rows {
            row.weight = (row.catalog_ids.len() as f32 / max_df as f32).min(1.0);
        }
        Ok(rows)
    }

    async fn build_categories(
        &self,
        names: &[String],
        ids: &[u32],
    ) -> Result<Vec<Category>> {
        let mut rows = Vec::new();
        for (name, id) in names.iter().zip(ids) {
            if self.category_cache.contains(*id) {
                continue;
            }
            let embedding = self
                .embedder
                .embed_document(name)
                .await
                .context("Category embedding failed")?;
            rows.push(Category {
                id: *id,
                name: name.clone(),
                description: String::new(),
                parent_id: None,
                aliases: Vec::new(),
                related_category_ids: Vec::new(),
                document_count: 0,
                chunk_count: 0,
                concept_count: 0,
                embedding,
            });
        }
        Ok(rows)
    }

    fn extract_metadata(
        &self,
        classification: &PaperClassification,
        first_pages: &str,
        chunk_rows: &[Chunk],
        base_name: &str,
    ) -> (String, Option<String>, Option<String>, Option<String>, Option<String>) {
        let take = |field: Option<ExtractedField>| {
            field.filter(|f| f.confidence >= METADATA_CONFIDENCE_THRESHOLD).map(|f| f.value)
        };

        match classification.kind {
            DocumentKind::Paper | DocumentKind::Magazine | DocumentKind::Article => {
                let meta = PaperMetadataExtractor::extract(first_pages);
                let title = take(meta.title).unwrap_or_else(|| base_name.to_string());
                let author = (meta.authors_confidence >= METADATA_CONFIDENCE_THRESHOLD
                    && !meta.authors.is_empty())
                .then(|| meta.authors.join(", "));
                let year = take(meta.year);
                let publisher = take(meta.venue);
                (title, author, year, publisher, None)
            }
            _ => {
                let meta = ContentMetadataExtractor::extract(chunk_rows);
                let title = take(meta.title).unwrap_or_else(|| base_name.to_string());
                (
                    title,
                    take(meta.author),
                    take(meta.year),
                    take(meta.publisher),
                    take(meta.isbn),
                )
            }
        }
    }

    async fn ingest_visuals(
        &self,
        source: &str,
        entry: &CatalogEntry,
        concept_norms: &[(u32, String)],
        validator: &RowValidator,
    ) -> Result<usize> {
        let Some(extractor) = &self.visual_extractor else {
            return Ok(0);
        };
        let extracted = extractor
            .extract(source, entry.id)
            .await
            .context("Visual extraction failed")?;
        if extracted.is_empty() {
            return Ok(0);
        }

        let mut rows = Vec::with_capacity(extracted.len());
        for (index, visual) in extracted.into_iter().enumerate() {
            let haystack = visual.description.to_lowercase();
            let concept_ids: Vec<u32> = concept_norms
                .iter()
                .filter(|(_, name)| haystack.contains(name.as_str()))
                .map(|(id, _)| *id)
                .collect();
            let embedding = self
                .embedder
                .embed_document(&visual.description)
                .await
                .context("Visual embedding failed")?;
            rows.push(Visual {
                id: hash_name(&format!("{source}#visual:{}:{index}", visual.page_number)),
                catalog_id: entry.id,
                catalog_title: entry.title.clone(),
                visual_type: visual.visual_type,
                page_number: visual.page_number,
                description: visual.description,
                concept_ids,
                image_path: visual.image_path,
                embedding,
            });
        }
        let count = rows.len();
        self.visuals.insert(&rows, validator).await?;
        Ok(count)
    }
}

/// Char-boundary-safe prefix.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::HashedEmbedder;
    use crate::storage::LanceStore;
    use crate::wordnet::testing::StaticLexicon;

    struct StubLoader;

    #[async_trait]
    impl DocumentLoader for StubLoader {
        async fn load(&self, _source: &str) -> Result<LoadedDocument> {
            let page = |n: u32, text: &str| PageText {
                page_number: n,
                text: text.to_string(),
            };
            Ok(LoadedDocument {
                pages: vec![
                    page(
                        1,
                        "Optimization techniques for API gateway deployments are discussed \
                         at length, covering both theory and operational practice in detail.",
                    ),
                    page(
                        2,
                        "The optimization of routing tables inside an API gateway follows \
                         the same gradient of tradeoffs seen in distributed control planes.",
                    ),
                ],
                metadata: PdfMetadata::default(),
            })
        }
    }

    struct StubExtractor;

    #[async_trait]
    impl ConceptExtractor for StubExtractor {
        async fn extract(&self, _title: &str, _text: &str) -> Result<ExtractedConcepts> {
            Ok(ExtractedConcepts {
                primary_concepts: vec![
                    ExtractedConcept {
                        name: "optimization".to_string(),
                        concept_type: ConceptType::Thematic,
                    },
                    ExtractedConcept {
                        name: "API gateway".to_string(),
                        concept_type: ConceptType::Terminology,
                    },
                ],
                categories: vec![
                    "software engineering".to_string(),
                    "distributed systems".to_string(),
                ],
                summary: Some("A study of optimization in API gateways.".to_string()),
            })
        }
    }

    async fn pipeline_on(dir: &std::path::Path) -> (IngestionPipeline, Arc<CatalogRepository>, Arc<ChunkRepository>, Arc<ConceptRepository>) {
        let mut config = EngineConfig::default();
        config.embedding.dimension = 4;
        config.data_dir = dir.to_path_buf();

        let store = Arc::new(LanceStore::connect(dir, 4).await.unwrap());
        let catalog = Arc::new(CatalogRepository::new(store.clone()));
        let chunks = Arc::new(ChunkRepository::new(store.clone()));
        let concepts = Arc::new(ConceptRepository::new(store.clone()));
        let categories = Arc::new(CategoryRepository::new(store.clone()));
        let visuals = Arc::new(VisualRepository::new(store.clone()));
        catalog.ensure_table().await.unwrap();
        chunks.ensure_table().await.unwrap();
        concepts.ensure_table().await.unwrap();
        categories.ensure_table().await.unwrap();
        visuals.ensure_table().await.unwrap();

        let pipeline = IngestionPipeline::new(
            Arc::new(StubLoader),
            Arc::new(StubExtractor),
            None,
            Arc::new(HashedEmbedder::new(4)),
            Arc::new(crate::wordnet::WordNetService::new(
                Arc::new(StaticLexicon::sample()),
                &config.wordnet,
            )),
            catalog.clone(),
            chunks.clone(),
            concepts.clone(),
            categories.clone(),
            visuals.clone(),
            Arc::new(ConceptCache::new()),
            Arc::new(CategoryCache::new()),
            config,
        );
        (pipeline, catalog, chunks, concepts)
    }

    const SOURCE: &str = "/library/gateways--networking--performance.pdf";

    #[tokio::test]
    async fn test_ingest_wires_categories_concepts_and_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, catalog, chunks, concepts) = pipeline_on(dir.path()).await;

        let report = pipeline.ingest(SOURCE).await.unwrap();
        assert_eq!(report.catalog_id, hash_name(SOURCE));
        assert!(report.chunk_count > 0);
        assert_eq!(report.concept_count, 2);
        assert_eq!(report.new_categories, 2);

        let entry = catalog.find_by_source(SOURCE).await.unwrap().unwrap();
        assert_eq!(entry.filename_tags, vec!["networking", "performance"]);
        assert_eq!(
            entry.category_ids,
            vec![hash_name("software engineering"), hash_name("distributed systems")]
        );

        // Chunks inherit the document's categories verbatim.
        let chunk_rows = chunks.find_by_catalog_id(entry.id, 100).await.unwrap();
        assert!(!chunk_rows.is_empty());
        for chunk in &chunk_rows {
            assert_eq!(chunk.category_ids, entry.category_ids);
        }

        // Concepts carry document membership but no category.
        let concept = concepts.find_by_name("optimization").await.unwrap().unwrap();
        assert!(concept.catalog_ids.contains(&entry.id));
        assert!(concept.weight > 0.0);
    }

    #[tokio::test]
    async fn test_reingest_replaces_rows() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, catalog, chunks, _) = pipeline_on(dir.path()).await;

        let first = pipeline.ingest(SOURCE).await.unwrap();
        let second = pipeline.ingest(SOURCE).await.unwrap();
        assert_eq!(first.catalog_id, second.catalog_id);

        // One catalog row and one set of chunks, not two.
        assert!(catalog.find_by_source(SOURCE).await.unwrap().is_some());
        assert_eq!(catalog.count().await.unwrap(), 1);
        let chunk_rows = chunks
            .find_by_catalog_id(first.catalog_id, 1000)
            .await
            .unwrap();
        assert_eq!(chunk_rows.len(), second.chunk_count);
    }

    #[tokio::test]
    async fn test_ids_are_stable_across_independent_stores() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let (pipeline_a, catalog_a, _, concepts_a) = pipeline_on(dir_a.path()).await;
        let (pipeline_b, catalog_b, _, concepts_b) = pipeline_on(dir_b.path()).await;

        pipeline_a.ingest(SOURCE).await.unwrap();
        pipeline_b.ingest(SOURCE).await.unwrap();

        let entry_a = catalog_a.find_by_source(SOURCE).await.unwrap().unwrap();
        let entry_b = catalog_b.find_by_source(SOURCE).await.unwrap().unwrap();
        assert_eq!(entry_a.id, entry_b.id);
        assert_eq!(entry_a.category_ids, entry_b.category_ids);

        let concept_a = concepts_a.find_by_name("API gateway").await.unwrap().unwrap();
        let concept_b = concepts_b.find_by_name("api  GATEWAY").await.unwrap().unwrap();
        assert_eq!(concept_a.id, concept_b.id);
    }

    #[test]
    fn test_parse_filename_tags() {
        let (name, tags) = parse_filename("clean-code--craftsmanship--refactoring.pdf");
        assert_eq!(name, "clean-code");
        assert_eq!(tags, vec!["craftsmanship", "refactoring"]);

        let (name, tags) = parse_filename("plain-title.pdf");
        assert_eq!(name, "plain-title");
        assert!(tags.is_empty());

        let (name, tags) = parse_filename("/abs/path/book--topic.epub");
        assert_eq!(name, "book");
        assert_eq!(tags, vec!["topic"]);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("αβγδ", 2), "αβ");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
