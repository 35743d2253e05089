//! Hybrid search orchestration.
//!
//! Candidate retrieval happens before any scoring; scoring is synchronous
//! and order-independent; final ordering is by hybrid score with a vector
//! tie-break and stable insertion order after that. Signal failures zero
//! the signal; retrieval failures surface as `SearchError`; cancellation
//! discards everything.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::ConceptCache;
use crate::config::EngineConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::EngineError;
use crate::search::expand::{ExpandedQuery, QueryExpander};
use crate::search::scoring::compute_signals;
use crate::search::weights::{SearchContext, WeightProfile};
use crate::storage::{Candidate, CatalogRepository, ChunkRepository, ConceptRepository};
use crate::types::{SearchDebug, SearchResult};

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub text: String,
    pub limit: usize,
    /// Substring match against the document source locator.
    pub source_filter: Option<String>,
    /// Restrict chunk search to one document.
    pub catalog_id: Option<u32>,
    /// Restrict to candidates carrying this category.
    pub category_id: Option<u32>,
    pub debug: bool,
}

/// ANN candidate retrieval per context; implemented over the
/// repositories and stubbed in tests.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(
        &self,
        context: SearchContext,
        vector: &[f32],
        k: usize,
        request: &SearchRequest,
    ) -> Result<Vec<Candidate>>;
}

/// Production candidate source backed by the Lance repositories.
pub struct RepositoryCandidates {
    pub catalog: Arc<CatalogRepository>,
    pub chunks: Arc<ChunkRepository>,
    pub concepts: Arc<ConceptRepository>,
}

#[async_trait]
impl CandidateSource for RepositoryCandidates {
    async fn candidates(
        &self,
        context: SearchContext,
        vector: &[f32],
        k: usize,
        request: &SearchRequest,
    ) -> Result<Vec<Candidate>> {
        match context {
            SearchContext::Catalog => {
                self.catalog
                    .ann_candidates(vector, k, request.source_filter.as_deref())
                    .await
            }
            SearchContext::Chunk => {
                let mut predicate = request.catalog_id.map(|id| format!("catalog_id = {id}"));
                if predicate.is_none() {
                    if let Some(filter) = &request.source_filter {
                        let ids = self.catalog.find_ids_by_source_filter(filter).await?;
                        if ids.is_empty() {
                            return Ok(Vec::new());
                        }
                        let list = ids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
                        predicate = Some(format!("catalog_id IN ({list})"));
                    }
                }
                self.chunks.ann_candidates(vector, k, predicate.as_deref()).await
            }
            SearchContext::Concept => {
                let hits = self.concepts.search_concepts(vector, k).await?;
                Ok(hits
                    .into_iter()
                    .map(|(concept, score)| {
                        // The scored text is the concept's own lexical
                        // neighborhood; concepts have no body text.
                        let mut text = concept.name.clone();
                        for extra in concept.synonyms.iter().chain(&concept.related_concepts) {
                            text.push(' ');
                            text.push_str(extra);
                        }
                        Candidate {
                            id: concept.id,
                            catalog_id: 0,
                            title: concept.name,
                            text,
                            source: String::new(),
                            page_number: None,
                            concept_ids: vec![concept.id],
                            category_ids: Vec::new(),
                            vector_score: score,
                        }
                    })
                    .collect())
            }
        }
    }
}

pub struct HybridSearchService {
    embedder: Arc<dyn EmbeddingModel>,
    expander: Arc<QueryExpander>,
    source: Arc<dyn CandidateSource>,
    concept_cache: Arc<ConceptCache>,
    config: EngineConfig,
}

impl HybridSearchService {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        expander: Arc<QueryExpander>,
        source: Arc<dyn CandidateSource>,
        concept_cache: Arc<ConceptCache>,
        config: EngineConfig,
    ) -> Self {
        Self {
            embedder,
            expander,
            source,
            concept_cache,
            config,
        }
    }

    pub async fn search(
        &self,
        context: SearchContext,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let expanded = self.expander.expand(&request.text).await;
        let weights = WeightProfile::dynamic(context, &expanded);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Candidate retrieval. Unlike expansion, a failure here is fatal
        // for the query: there is nothing to score.
        let embed_timeout = Duration::from_millis(self.config.embedding.timeout_ms);
        let vector = match tokio::time::timeout(
            embed_timeout,
            self.embedder.embed_query(&request.text),
        )
        .await
        {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => return Err(EngineError::Search(format!("query embedding failed: {e}"))),
            Err(_) => return Err(EngineError::Search("query embedding timed out".into())),
        };

        let limit = if request.limit == 0 {
            self.config.search.default_limit
        } else {
            request.limit
        };
        let k = (limit * self.config.search.candidate_multiplier)
            .max(self.config.search.candidate_floor);

        let ann_timeout = Duration::from_millis(self.config.search.ann_timeout_ms);
        let mut candidates = match tokio::time::timeout(
            ann_timeout,
            self.source.candidates(context, &vector, k, request),
        )
        .await
        {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => return Err(EngineError::Search(format!("candidate retrieval failed: {e}"))),
            Err(_) => return Err(EngineError::Search("candidate retrieval timed out".into())),
        };

        if let Some(category_id) = request.category_id {
            // Chunk and catalog rows carry (inherited) category_ids.
            // Concepts are category-agnostic and pass through unfiltered.
            if context != SearchContext::Concept {
                candidates.retain(|c| c.category_ids.contains(&category_id));
            }
        }

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let titles = self.title_texts(&candidates, context);
        let signals = compute_signals(&candidates, &titles, &expanded);

        let mut ranked: Vec<(usize, f32)> = signals
            .iter()
            .enumerate()
            .map(|(i, s)| (i, weights.hybrid_score(s)))
            .collect();
        // Stable sort keeps insertion order as the final tie-break.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    signals[b.0]
                        .vector
                        .partial_cmp(&signals[a.0].vector)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        ranked.truncate(limit);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let results = ranked
            .into_iter()
            .map(|(i, score)| {
                let candidate = &candidates[i];
                let debug = request.debug.then(|| SearchDebug {
                    signals: signals[i],
                    matched_concepts: expanded
                        .concept_matches
                        .iter()
                        .map(|m| m.name.clone())
                        .collect(),
                    expanded_terms: expanded
                        .ontology_terms
                        .iter()
                        .map(|t| t.term.clone())
                        .collect(),
                });
                SearchResult {
                    id: candidate.id,
                    catalog_id: candidate.catalog_id,
                    title: candidate.title.clone(),
                    text: candidate.text.clone(),
                    source: candidate.source.clone(),
                    page_number: candidate.page_number,
                    score,
                    debug,
                }
            })
            .collect();
        Ok(results)
    }

    fn title_texts(&self, candidates: &[Candidate], context: SearchContext) -> Vec<String> {
        match context {
            SearchContext::Chunk => candidates
                .iter()
                .map(|c| self.concept_cache.get_names(&c.concept_ids).join(" "))
                .collect(),
            _ => candidates.iter().map(|c| c.title.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::HashedEmbedder;
    use crate::search::expand::{ConceptSearch, QueryExpander};
    use crate::types::Concept;
    use crate::wordnet::testing::StaticLexicon;
    use crate::wordnet::WordNetService;

    struct NoConcepts;

    #[async_trait]
    impl ConceptSearch for NoConcepts {
        async fn search_concepts(&self, _v: &[f32], _k: usize) -> Result<Vec<(Concept, f32)>> {
            Ok(Vec::new())
        }
    }

    struct StubSource {
        candidates: Vec<Candidate>,
    }

    #[async_trait]
    impl CandidateSource for StubSource {
        async fn candidates(
            &self,
            _context: SearchContext,
            _vector: &[f32],
            _k: usize,
            _request: &SearchRequest,
        ) -> Result<Vec<Candidate>> {
            Ok(self.candidates.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl CandidateSource for FailingSource {
        async fn candidates(
            &self,
            _context: SearchContext,
            _vector: &[f32],
            _k: usize,
            _request: &SearchRequest,
        ) -> Result<Vec<Candidate>> {
            anyhow::bail!("store unavailable")
        }
    }

    fn candidate(id: u32, text: &str, title: &str, vector: f32) -> Candidate {
        Candidate {
            id,
            catalog_id: id,
            title: title.to_string(),
            text: text.to_string(),
            source: format!("/lib/{id}.pdf"),
            page_number: None,
            concept_ids: vec![],
            category_ids: vec![],
            vector_score: vector,
        }
    }

    fn service(source: Arc<dyn CandidateSource>) -> HybridSearchService {
        let config = EngineConfig::default();
        let embedder = Arc::new(HashedEmbedder::new(8));
        let wordnet = Arc::new(WordNetService::new(
            Arc::new(StaticLexicon::sample()),
            &config.wordnet,
        ));
        let expander = Arc::new(QueryExpander::new(
            Arc::new(NoConcepts),
            Arc::new(ConceptCache::new()),
            wordnet,
            embedder.clone(),
            config.clone(),
        ));
        HybridSearchService::new(
            embedder,
            expander,
            source,
            Arc::new(ConceptCache::new()),
            config,
        )
    }

    fn request(text: &str, limit: usize) -> SearchRequest {
        SearchRequest {
            text: text.to_string(),
            limit,
            ..SearchRequest::default()
        }
    }

    #[tokio::test]
    async fn test_results_ranked_and_truncated() {
        let source = Arc::new(StubSource {
            candidates: vec![
                candidate(1, "nothing about the topic", "Cooking", 0.1),
                candidate(2, "gradient descent and convex optimization", "Optimization", 0.9),
                candidate(3, "a gradient appears once", "Misc", 0.5),
            ],
        });
        let service = service(source);
        let results = service
            .search(
                SearchContext::Catalog,
                &request("gradient descent", 2),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_tie_breaks_by_vector_then_insertion_order() {
        // Identical text and title: bm25/title/concept/wordnet all tie,
        // vector decides; a full tie keeps insertion order.
        let source = Arc::new(StubSource {
            candidates: vec![
                candidate(1, "same text", "Same", 0.4),
                candidate(2, "same text", "Same", 0.8),
                candidate(3, "same text", "Same", 0.4),
            ],
        });
        let service = service(source);
        let results = service
            .search(
                SearchContext::Catalog,
                &request("same text", 3),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(results[0].id, 2);
        assert_eq!(results[1].id, 1);
        assert_eq!(results[2].id, 3);
    }

    #[tokio::test]
    async fn test_retrieval_failure_surfaces_as_search_error() {
        let service = service(Arc::new(FailingSource));
        let err = service
            .search(
                SearchContext::Catalog,
                &request("anything", 5),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Search(_)));
    }

    #[tokio::test]
    async fn test_cancellation_returns_no_partial_result() {
        let source = Arc::new(StubSource {
            candidates: vec![candidate(1, "text", "T", 0.5)],
        });
        let service = service(source);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = service
            .search(SearchContext::Catalog, &request("text", 5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_debug_payload_attached_on_request() {
        let source = Arc::new(StubSource {
            candidates: vec![candidate(1, "structure of data", "Structures", 0.7)],
        });
        let service = service(source);
        let mut req = request("structure", 5);
        req.debug = true;
        let results = service
            .search(SearchContext::Catalog, &req, &CancellationToken::new())
            .await
            .unwrap();

        let debug = results[0].debug.as_ref().expect("debug payload");
        assert!(debug.signals.vector > 0.0);
        // "structure" expands through the lexicon fixture.
        assert!(debug.expanded_terms.iter().any(|t| t == "data structure"));
    }

    #[tokio::test]
    async fn test_zero_limit_falls_back_to_default() {
        let source = Arc::new(StubSource {
            candidates: (0..30).map(|i| candidate(i, "text", "T", 0.5)).collect(),
        });
        let service = service(source);
        let results = service
            .search(
                SearchContext::Catalog,
                &request("text", 0),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), EngineConfig::default().search.default_limit);
    }
}
