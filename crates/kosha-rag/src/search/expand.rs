//! Query expansion over the concept index and the lexical ontology.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::ConceptCache;
use crate::config::EngineConfig;
use crate::embeddings::EmbeddingModel;
use crate::ident::normalize_name;
use crate::storage::ConceptRepository;
use crate::types::Concept;
use crate::wordnet::{SelectionContext, SynsetStrategy, WordNetService};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "how",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was", "were",
    "what", "when", "where", "which", "who", "why", "will", "with",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMatch {
    pub id: u32,
    pub name: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OntologySource {
    Synonym,
    Broader,
    Narrower,
}

impl OntologySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synonym => "synonym",
            Self::Broader => "broader",
            Self::Narrower => "narrower",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyTerm {
    pub term: String,
    pub source: OntologySource,
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub original: String,
    pub terms: Vec<String>,
    pub concept_matches: Vec<ConceptMatch>,
    pub ontology_terms: Vec<OntologyTerm>,
}

/// Concept lookup surface the expander needs; implemented by the concept
/// repository and stubbed in tests.
#[async_trait]
pub trait ConceptSearch: Send + Sync {
    async fn search_concepts(&self, vector: &[f32], k: usize) -> Result<Vec<(Concept, f32)>>;
}

#[async_trait]
impl ConceptSearch for ConceptRepository {
    async fn search_concepts(&self, vector: &[f32], k: usize) -> Result<Vec<(Concept, f32)>> {
        ConceptRepository::search_concepts(self, vector, k).await
    }
}

/// Tokenize a query: lowercase alphanumeric terms with stopwords removed,
/// deduplicated in order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

pub struct QueryExpander {
    concepts: Arc<dyn ConceptSearch>,
    concept_cache: Arc<ConceptCache>,
    wordnet: Arc<WordNetService>,
    embedder: Arc<dyn EmbeddingModel>,
    config: EngineConfig,
}

impl QueryExpander {
    pub fn new(
        concepts: Arc<dyn ConceptSearch>,
        concept_cache: Arc<ConceptCache>,
        wordnet: Arc<WordNetService>,
        embedder: Arc<dyn EmbeddingModel>,
        config: EngineConfig,
    ) -> Self {
        Self {
            concepts,
            concept_cache,
            wordnet,
            embedder,
            config,
        }
    }

    /// Expand a query. Expansion is best-effort: a timed-out embedding or
    /// ontology lookup degrades the result, it never fails the query.
    pub async fn expand(&self, query: &str) -> ExpandedQuery {
        let terms = query_terms(query);
        let mut expanded = ExpandedQuery {
            original: query.to_string(),
            terms: terms.clone(),
            concept_matches: Vec::new(),
            ontology_terms: Vec::new(),
        };

        // Concept matches via embedding similarity.
        let embed_timeout = Duration::from_millis(self.config.embedding.timeout_ms);
        match tokio::time::timeout(embed_timeout, self.embedder.embed_query(query)).await {
            Ok(Ok(vector)) => {
                match self
                    .concepts
                    .search_concepts(&vector, self.config.search.max_concept_matches)
                    .await
                {
                    Ok(hits) => {
                        for (concept, similarity) in hits {
                            if similarity < self.config.search.concept_match_threshold {
                                continue;
                            }
                            // Corpus-enriched ontology forms ride along at
                            // the concept's match weight.
                            for synonym in &concept.synonyms {
                                expanded.ontology_terms.push(OntologyTerm {
                                    term: synonym.clone(),
                                    source: OntologySource::Synonym,
                                    weight: similarity,
                                });
                            }
                            for broader in &concept.broader_terms {
                                expanded.ontology_terms.push(OntologyTerm {
                                    term: broader.clone(),
                                    source: OntologySource::Broader,
                                    weight: similarity * 0.6,
                                });
                            }
                            for narrower in &concept.narrower_terms {
                                expanded.ontology_terms.push(OntologyTerm {
                                    term: narrower.clone(),
                                    source: OntologySource::Narrower,
                                    weight: similarity * 0.6,
                                });
                            }
                            expanded.concept_matches.push(ConceptMatch {
                                id: concept.id,
                                name: concept.name,
                                weight: similarity,
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Concept match failed; expansion degraded");
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Query embedding failed; expansion degraded");
            }
            Err(_) => {
                tracing::warn!("Query embedding timed out; expansion degraded");
            }
        }

        // Ontology lookups for salient terms not already covered by a
        // matched concept.
        let concept_names: Vec<String> = expanded
            .concept_matches
            .iter()
            .map(|m| normalize_name(&m.name))
            .collect();
        // Disambiguation context: the other query terms, the matched
        // concepts, and their co-occurrence neighborhood from the graph.
        let ctx = SelectionContext {
            query_terms: terms.clone(),
            domain_hints: expanded.concept_matches.iter().map(|m| m.name.clone()).collect(),
            related_terms: expanded
                .concept_matches
                .iter()
                .flat_map(|m| self.concept_cache.related_names(&m.name))
                .collect(),
        };
        for term in &terms {
            if concept_names.iter().any(|n| n.contains(term.as_str())) {
                continue;
            }
            let synonyms = self
                .wordnet
                .get_synonyms(term, SynsetStrategy::ContextAware, &ctx)
                .await;
            for synonym in synonyms {
                expanded.ontology_terms.push(OntologyTerm {
                    term: synonym,
                    source: OntologySource::Synonym,
                    weight: 1.0,
                });
            }
            for broader in self.wordnet.get_broader_terms(term, 1).await {
                expanded.ontology_terms.push(OntologyTerm {
                    term: broader,
                    source: OntologySource::Broader,
                    weight: 0.6,
                });
            }
            for narrower in self.wordnet.get_narrower_terms(term, 1).await {
                expanded.ontology_terms.push(OntologyTerm {
                    term: narrower,
                    source: OntologySource::Narrower,
                    weight: 0.6,
                });
            }
        }

        self.dedup_and_cap(&mut expanded);
        expanded
    }

    /// Drop terms already present in the query, keep the strongest entry
    /// per term, and cap each ontology source.
    fn dedup_and_cap(&self, expanded: &mut ExpandedQuery) {
        let query_terms: HashSet<String> = expanded.terms.iter().cloned().collect();
        let mut best: Vec<OntologyTerm> = Vec::new();
        for term in expanded.ontology_terms.drain(..) {
            let key = normalize_name(&term.term);
            if key.is_empty() || query_terms.contains(&key) {
                continue;
            }
            match best.iter_mut().find(|t| normalize_name(&t.term) == key) {
                Some(existing) => {
                    if term.weight > existing.weight {
                        *existing = term;
                    }
                }
                None => best.push(term),
            }
        }

        let caps = [
            (OntologySource::Synonym, self.config.search.max_synonyms),
            (OntologySource::Broader, self.config.search.max_broader_terms),
            (OntologySource::Narrower, self.config.search.max_narrower_terms),
        ];
        let mut capped = Vec::new();
        for (source, cap) in caps {
            let mut of_source: Vec<OntologyTerm> =
                best.iter().filter(|t| t.source == source).cloned().collect();
            of_source.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
            of_source.truncate(cap);
            capped.extend(of_source);
        }
        expanded.ontology_terms = capped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::testing::HashedEmbedder;
    use crate::ident::hash_name;
    use crate::types::{ConceptType, EnrichmentSource};
    use crate::wordnet::testing::StaticLexicon;

    struct StubConcepts {
        hits: Vec<(Concept, f32)>,
    }

    #[async_trait]
    impl ConceptSearch for StubConcepts {
        async fn search_concepts(&self, _vector: &[f32], _k: usize) -> Result<Vec<(Concept, f32)>> {
            Ok(self.hits.clone())
        }
    }

    fn concept(name: &str, synonyms: &[&str]) -> Concept {
        Concept {
            id: hash_name(name),
            name: name.to_string(),
            concept_type: ConceptType::Thematic,
            catalog_ids: vec![1],
            related_concepts: vec![],
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            broader_terms: vec!["numerical methods".to_string()],
            narrower_terms: vec![],
            weight: 0.5,
            chunk_count: 1,
            enrichment_source: EnrichmentSource::Corpus,
            embedding: vec![0.0; 8],
        }
    }

    fn expander(hits: Vec<(Concept, f32)>) -> QueryExpander {
        let config = EngineConfig::default();
        QueryExpander::new(
            Arc::new(StubConcepts { hits }),
            Arc::new(ConceptCache::new()),
            Arc::new(WordNetService::new(
                Arc::new(StaticLexicon::sample()),
                &config.wordnet,
            )),
            Arc::new(HashedEmbedder::new(8)),
            config,
        )
    }

    #[test]
    fn test_query_terms_drop_stopwords_and_dedup() {
        assert_eq!(
            query_terms("What is the the gradient of a function?"),
            vec!["gradient", "function"]
        );
    }

    #[tokio::test]
    async fn test_concept_match_above_threshold_expands() {
        let expander = expander(vec![
            (concept("optimization", &["optimisation"]), 0.9),
            (concept("cooking", &[]), 0.2), // below threshold
        ]);
        let expanded = expander.expand("optimization methods").await;

        assert_eq!(expanded.concept_matches.len(), 1);
        assert_eq!(expanded.concept_matches[0].name, "optimization");
        assert!(expanded
            .ontology_terms
            .iter()
            .any(|t| t.term == "optimisation" && t.source == OntologySource::Synonym));
        assert!(expanded
            .ontology_terms
            .iter()
            .any(|t| t.term == "numerical methods" && t.source == OntologySource::Broader));
    }

    #[tokio::test]
    async fn test_wordnet_terms_for_unmatched_query_words() {
        let expander = expander(vec![]);
        let expanded = expander.expand("structure").await;

        assert!(expanded.concept_matches.is_empty());
        assert!(expanded
            .ontology_terms
            .iter()
            .any(|t| t.term == "data structure" && t.source == OntologySource::Synonym));
        assert!(expanded
            .ontology_terms
            .iter()
            .any(|t| t.term == "entity" && t.source == OntologySource::Broader));
    }

    #[tokio::test]
    async fn test_expansion_is_idempotent_on_original() {
        let expander = expander(vec![(concept("optimization", &["optimisation"]), 0.9)]);
        let first = expander.expand("optimization methods").await;
        let second = expander.expand(&first.original).await;

        let names = |e: &ExpandedQuery| -> Vec<String> {
            e.concept_matches.iter().map(|m| m.name.clone()).collect()
        };
        let terms = |e: &ExpandedQuery| -> Vec<(String, &'static str)> {
            let mut v: Vec<(String, &'static str)> = e
                .ontology_terms
                .iter()
                .map(|t| (t.term.clone(), t.source.as_str()))
                .collect();
            v.sort();
            v
        };
        assert_eq!(names(&first), names(&second));
        assert_eq!(terms(&first), terms(&second));
    }

    #[tokio::test]
    async fn test_caps_bound_each_source() {
        let many: Vec<&str> = vec!["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8"];
        let expander = expander(vec![(concept("optimization", &many), 0.9)]);
        let expanded = expander.expand("optimization").await;

        let synonyms = expanded
            .ontology_terms
            .iter()
            .filter(|t| t.source == OntologySource::Synonym)
            .count();
        assert!(synonyms <= EngineConfig::default().search.max_synonyms);
    }
}
