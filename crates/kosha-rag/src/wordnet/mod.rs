//! Lexical-ontology service.
//!
//! Wraps an external WordNet-like database behind the `Lexicon` trait and
//! adds hierarchy navigation, a TTL+LRU response cache, and a bounded
//! concurrent prewarm. Lookups are suspend points with a hard timeout; a
//! timed-out lookup degrades to an empty result and never fails a query.

pub mod strategy;

pub use strategy::{SelectionContext, SynsetStrategy};

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::WordNetConfig;
use crate::ident::normalize_name;

/// One sense of a word: its member words, gloss, and hierarchy links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synset {
    pub id: String,
    pub words: Vec<String>,
    pub definition: String,
    /// Ids of broader (hypernym) synsets.
    pub hypernyms: Vec<String>,
    /// Ids of narrower (hyponym) synsets.
    pub hyponyms: Vec<String>,
}

/// Seam to the external lexical database.
#[async_trait]
pub trait Lexicon: Send + Sync {
    async fn synsets(&self, term: &str) -> Result<Vec<Synset>>;
    async fn synset_by_id(&self, id: &str) -> Result<Option<Synset>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelatedTerms {
    pub synonyms: Vec<String>,
    pub broader: Vec<String>,
    pub narrower: Vec<String>,
}

struct CachedEntry {
    at: Instant,
    terms: RelatedTerms,
}

pub struct WordNetService {
    lexicon: Arc<dyn Lexicon>,
    cache: RwLock<LruCache<String, CachedEntry>>,
    ttl: Duration,
    lookup_timeout: Duration,
    max_depth: usize,
}

impl WordNetService {
    pub fn new(lexicon: Arc<dyn Lexicon>, config: &WordNetConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_size.max(1)).expect("cache size is nonzero");
        Self {
            lexicon,
            cache: RwLock::new(LruCache::new(capacity)),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms),
            max_depth: config.max_depth,
        }
    }

    /// All senses of a term. A lookup that times out degrades to empty.
    pub async fn get_synsets(&self, term: &str) -> Vec<Synset> {
        match tokio::time::timeout(self.lookup_timeout, self.lexicon.synsets(term)).await {
            Ok(Ok(synsets)) => synsets,
            Ok(Err(e)) => {
                tracing::warn!(term, error = %e, "Lexicon lookup failed; degrading to empty");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(term, "Lexicon lookup timed out; degrading to empty");
                Vec::new()
            }
        }
    }

    /// Synonyms of the selected sense, minus the term itself.
    pub async fn get_synonyms(
        &self,
        term: &str,
        strategy: SynsetStrategy,
        ctx: &SelectionContext,
    ) -> Vec<String> {
        let synsets = self.get_synsets(term).await;
        let Some(selected) = strategy.select(&synsets, ctx) else {
            return Vec::new();
        };
        let own = normalize_name(term);
        selected
            .words
            .iter()
            .filter(|w| normalize_name(w) != own)
            .cloned()
            .collect()
    }

    /// Hypernym BFS up to `depth`, nearest ancestors first.
    pub async fn get_broader_terms(&self, term: &str, depth: usize) -> Vec<String> {
        self.walk_hierarchy(term, depth, Direction::Broader).await
    }

    /// Hyponym BFS up to `depth`.
    pub async fn get_narrower_terms(&self, term: &str, depth: usize) -> Vec<String> {
        self.walk_hierarchy(term, depth, Direction::Narrower).await
    }

    /// Synonyms, broader, and narrower terms in one cached fan-out.
    pub async fn get_all_related_terms(&self, term: &str) -> RelatedTerms {
        let key = normalize_name(term);
        if let Some(entry) = self.cache.write().get(&key) {
            if entry.at.elapsed() < self.ttl {
                return entry.terms.clone();
            }
        }

        let ctx = SelectionContext::default();
        let (synonyms, broader, narrower) = tokio::join!(
            self.get_synonyms(term, SynsetStrategy::First, &ctx),
            self.get_broader_terms(term, self.max_depth),
            self.get_narrower_terms(term, self.max_depth),
        );
        let terms = RelatedTerms {
            synonyms,
            broader,
            narrower,
        };
        self.cache.write().put(
            key,
            CachedEntry {
                at: Instant::now(),
                terms: terms.clone(),
            },
        );
        terms
    }

    /// Shortest hypernym path between two terms, found by bidirectional
    /// ancestor expansion bounded by `max_depth` on each side. Returns
    /// representative words from `a` up to the common ancestor and back
    /// down to `b`.
    pub async fn find_hierarchy_path(&self, a: &str, b: &str) -> Option<Vec<String>> {
        let up_a = self.ancestor_chains(a).await;
        let up_b = self.ancestor_chains(b).await;

        for (i, id_a) in up_a.iter().enumerate() {
            if let Some(j) = up_b.iter().position(|(id_b, _)| id_b == &id_a.0) {
                let mut path: Vec<String> =
                    up_a[..=i].iter().map(|(_, word)| word.clone()).collect();
                let down: Vec<String> = up_b[..j].iter().rev().map(|(_, word)| word.clone()).collect();
                path.extend(down);
                return Some(path);
            }
        }
        None
    }

    /// Warm the related-terms cache for a concept vocabulary. Lookups run
    /// with a bounded in-flight count and the call returns only after all
    /// settle (or the token cancels).
    pub async fn prewarm_cache(
        &self,
        terms: &[String],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> usize {
        let mut unique: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for term in terms {
            let key = normalize_name(term);
            if !key.is_empty() && seen.insert(key) {
                unique.push(term.clone());
            }
        }

        let total = unique.len();
        let mut warmed = 0usize;
        let mut lookups = stream::iter(unique)
            .map(|term| async move {
                self.get_all_related_terms(&term).await;
            })
            .buffer_unordered(concurrency.max(1));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(warmed, total, "WordNet prewarm cancelled");
                    break;
                }
                next = lookups.next() => {
                    match next {
                        Some(()) => warmed += 1,
                        None => break,
                    }
                }
            }
        }
        tracing::debug!(warmed, total, "WordNet prewarm settled");
        warmed
    }

    async fn walk_hierarchy(&self, term: &str, depth: usize, direction: Direction) -> Vec<String> {
        let synsets = self.get_synsets(term).await;
        let mut frontier: Vec<String> = synsets
            .iter()
            .flat_map(|s| direction.links(s).iter().cloned())
            .collect();
        let mut visited: std::collections::HashSet<String> =
            synsets.iter().map(|s| s.id.clone()).collect();
        let own = normalize_name(term);
        let mut out = Vec::new();

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for id in frontier.drain(..) {
                if !visited.insert(id.clone()) {
                    continue;
                }
                let synset = match tokio::time::timeout(
                    self.lookup_timeout,
                    self.lexicon.synset_by_id(&id),
                )
                .await
                {
                    Ok(Ok(Some(synset))) => synset,
                    Ok(Ok(None)) => continue,
                    Ok(Err(e)) => {
                        tracing::warn!(id, error = %e, "Lexicon hierarchy lookup failed");
                        continue;
                    }
                    Err(_) => {
                        tracing::warn!(id, "Lexicon hierarchy lookup timed out");
                        continue;
                    }
                };
                if let Some(word) = synset.words.first() {
                    if normalize_name(word) != own && !out.contains(word) {
                        out.push(word.clone());
                    }
                }
                next.extend(direction.links(&synset).iter().cloned());
            }
            frontier = next;
        }
        out
    }

    /// (synset id, representative word) ancestors of a term's first
    /// sense, self first, bounded by `max_depth`.
    async fn ancestor_chains(&self, term: &str) -> Vec<(String, String)> {
        let synsets = self.get_synsets(term).await;
        let Some(first) = synsets.first() else {
            return Vec::new();
        };
        let mut out = vec![(
            first.id.clone(),
            first.words.first().cloned().unwrap_or_else(|| term.to_string()),
        )];
        let mut current = first.hypernyms.clone();
        for _ in 0..self.max_depth {
            let Some(id) = current.first().cloned() else { break };
            let synset = match tokio::time::timeout(
                self.lookup_timeout,
                self.lexicon.synset_by_id(&id),
            )
            .await
            {
                Ok(Ok(Some(s))) => s,
                _ => break,
            };
            out.push((
                synset.id.clone(),
                synset.words.first().cloned().unwrap_or_default(),
            ));
            current = synset.hypernyms.clone();
        }
        out
    }
}

enum Direction {
    Broader,
    Narrower,
}

impl Direction {
    fn links<'a>(&self, synset: &'a Synset) -> &'a [String] {
        match self {
            Self::Broader => &synset.hypernyms,
            Self::Narrower => &synset.hyponyms,
        }
    }
}
