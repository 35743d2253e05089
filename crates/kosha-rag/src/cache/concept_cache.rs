use std::collections::HashMap;

use anyhow::Result;
use parking_lot::RwLock;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::ident::{hash_name, normalize_name};
use crate::storage::ConceptRepository;
use crate::types::{Concept, ConceptType};

/// Concept metadata held in memory; embeddings stay in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptInfo {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub concept_type: ConceptType,
    pub weight: f32,
    pub chunk_count: u32,
    pub catalog_ids: Vec<u32>,
}

impl From<&Concept> for ConceptInfo {
    fn from(c: &Concept) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            concept_type: c.concept_type,
            weight: c.weight,
            chunk_count: c.chunk_count,
            catalog_ids: c.catalog_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConceptCacheStats {
    pub concepts: usize,
    pub relations: usize,
}

struct State {
    by_id: HashMap<u32, ConceptInfo>,
    by_name: HashMap<String, u32>,
    graph: DiGraph<u32, f32>,
    node_of: HashMap<u32, NodeIndex>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            graph: DiGraph::new(),
            node_of: HashMap::new(),
        }
    }
}

/// Bidirectional id <-> name map for concepts, plus the co-occurrence
/// adjacency rebuilt from the `related_concepts` columns at load. Related
/// concepts are always resolved through the cache by id, never by
/// following shared pointers; cycles in the relation graph are fine.
pub struct ConceptCache {
    state: RwLock<State>,
}

impl ConceptCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    pub async fn refresh(&self, repo: &ConceptRepository) -> Result<()> {
        let concepts = repo.find_all().await?;
        self.rebuild_from(&concepts);
        tracing::info!(concepts = concepts.len(), "Concept cache rebuilt");
        Ok(())
    }

    pub fn rebuild_from(&self, concepts: &[Concept]) {
        let mut state = State::default();
        for concept in concepts {
            state.by_id.insert(concept.id, ConceptInfo::from(concept));
            state.by_name.insert(normalize_name(&concept.name), concept.id);
            let node = state.graph.add_node(concept.id);
            state.node_of.insert(concept.id, node);
        }

        // Edges point from a concept to each related concept, weighted by
        // rank (earlier = stronger co-occurrence). Dangling names are
        // skipped: the relation only exists once both ends are indexed.
        for concept in concepts {
            let Some(&from) = state.node_of.get(&concept.id) else { continue };
            for (rank, related) in concept.related_concepts.iter().enumerate() {
                let related_id = hash_name(related);
                if related_id == concept.id {
                    continue;
                }
                if let Some(&to) = state.node_of.get(&related_id) {
                    state.graph.add_edge(from, to, 1.0 / (rank as f32 + 1.0));
                }
            }
        }

        *self.state.write() = state;
    }

    pub fn get_id(&self, name: &str) -> Option<u32> {
        self.state.read().by_name.get(&normalize_name(name)).copied()
    }

    pub fn get_name(&self, id: u32) -> Option<String> {
        self.state.read().by_id.get(&id).map(|c| c.name.clone())
    }

    pub fn get(&self, id: u32) -> Option<ConceptInfo> {
        self.state.read().by_id.get(&id).cloned()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.state.read().by_id.contains_key(&id)
    }

    pub fn get_names(&self, ids: &[u32]) -> Vec<String> {
        let state = self.state.read();
        ids.iter()
            .map(|id| {
                state
                    .by_id
                    .get(id)
                    .map_or_else(|| id.to_string(), |c| c.name.clone())
            })
            .collect()
    }

    /// Directly related concept ids, strongest co-occurrence first.
    pub fn related_ids(&self, id: u32) -> Vec<u32> {
        let state = self.state.read();
        let Some(&node) = state.node_of.get(&id) else {
            return Vec::new();
        };
        let mut weighted: Vec<(u32, f32)> = state
            .graph
            .edges(node)
            .map(|edge| (state.graph[edge.target()], *edge.weight()))
            .collect();
        weighted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        weighted.into_iter().map(|(id, _)| id).collect()
    }

    pub fn related_names(&self, name: &str) -> Vec<String> {
        match self.get_id(name) {
            Some(id) => self.get_names(&self.related_ids(id)),
            None => Vec::new(),
        }
    }

    pub fn search_by_name(&self, substring: &str) -> Vec<ConceptInfo> {
        let needle = normalize_name(substring);
        let state = self.state.read();
        let mut hits: Vec<ConceptInfo> = state
            .by_id
            .values()
            .filter(|c| normalize_name(&c.name).contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name));
        hits
    }

    pub fn export_all(&self) -> Vec<ConceptInfo> {
        let state = self.state.read();
        let mut all: Vec<ConceptInfo> = state.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn all_ids(&self) -> std::collections::HashSet<u32> {
        self.state.read().by_id.keys().copied().collect()
    }

    pub fn all_names(&self) -> Vec<String> {
        let state = self.state.read();
        state.by_id.values().map(|c| c.name.clone()).collect()
    }

    pub fn get_stats(&self) -> ConceptCacheStats {
        let state = self.state.read();
        ConceptCacheStats {
            concepts: state.by_id.len(),
            relations: state.graph.edge_count(),
        }
    }
}

impl Default for ConceptCache {
    fn default() -> Self {
        Self::new()
    }
}
