use std::collections::HashMap;

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ident::normalize_name;
use crate::storage::CategoryRepository;
use crate::types::Category;

/// Category metadata held in memory; embeddings stay in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub parent_id: Option<u32>,
    pub aliases: Vec<String>,
    pub related_category_ids: Vec<u32>,
    pub document_count: u32,
    pub chunk_count: u32,
    pub concept_count: u32,
}

impl From<&Category> for CategoryInfo {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            description: c.description.clone(),
            parent_id: c.parent_id,
            aliases: c.aliases.clone(),
            related_category_ids: c.related_category_ids.clone(),
            document_count: c.document_count,
            chunk_count: c.chunk_count,
            concept_count: c.concept_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryCacheStats {
    pub categories: usize,
    pub aliases: usize,
    pub roots: usize,
}

#[derive(Default)]
struct State {
    by_id: HashMap<u32, CategoryInfo>,
    by_name: HashMap<String, u32>,
    by_alias: HashMap<String, u32>,
    children: HashMap<u32, Vec<u32>>,
}

/// Bidirectional id <-> name map for categories, with alias resolution
/// and the parent hierarchy. Read-only during query time.
pub struct CategoryCache {
    state: RwLock<State>,
}

impl CategoryCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Rebuild from storage. Call after any write that changes the
    /// category identity set.
    pub async fn refresh(&self, repo: &CategoryRepository) -> Result<()> {
        let categories = repo.find_all().await?;
        self.rebuild_from(&categories)?;
        tracing::info!(categories = categories.len(), "Category cache rebuilt");
        Ok(())
    }

    /// Validates the parent hierarchy while building: every parent must
    /// resolve and the parent relation must be acyclic.
    pub fn rebuild_from(&self, categories: &[Category]) -> Result<(), EngineError> {
        let mut state = State::default();
        for category in categories {
            state.by_id.insert(category.id, CategoryInfo::from(category));
            state.by_name.insert(normalize_name(&category.name), category.id);
            for alias in &category.aliases {
                state.by_alias.insert(normalize_name(alias), category.id);
            }
        }

        for category in categories {
            if let Some(parent) = category.parent_id {
                if !state.by_id.contains_key(&parent) {
                    return Err(EngineError::Validation(format!(
                        "category '{}' has unresolvable parent {parent}",
                        category.name
                    )));
                }
                state.children.entry(parent).or_default().push(category.id);
            }
        }

        // Walk each parent chain; revisiting a node within one walk means
        // the hierarchy has a cycle.
        for category in categories {
            let mut seen = vec![category.id];
            let mut current = category.parent_id;
            while let Some(parent) = current {
                if seen.contains(&parent) {
                    return Err(EngineError::Validation(format!(
                        "category hierarchy cycle through '{}'",
                        category.name
                    )));
                }
                seen.push(parent);
                current = state.by_id.get(&parent).and_then(|c| c.parent_id);
            }
        }

        for children in state.children.values_mut() {
            children.sort_unstable();
        }

        *self.state.write() = state;
        Ok(())
    }

    pub fn get_id(&self, name: &str) -> Option<u32> {
        self.state.read().by_name.get(&normalize_name(name)).copied()
    }

    pub fn get_name(&self, id: u32) -> Option<String> {
        self.state.read().by_id.get(&id).map(|c| c.name.clone())
    }

    pub fn get_id_by_alias(&self, alias: &str) -> Option<u32> {
        self.state.read().by_alias.get(&normalize_name(alias)).copied()
    }

    pub fn get(&self, id: u32) -> Option<CategoryInfo> {
        self.state.read().by_id.get(&id).cloned()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.state.read().by_id.contains_key(&id)
    }

    /// Batch name resolution; unknown ids resolve to their decimal form
    /// rather than dropping out, so positions stay aligned.
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

    pub fn get_children(&self, id: u32) -> Vec<u32> {
        self.state.read().children.get(&id).cloned().unwrap_or_default()
    }

    /// Names from the root of the hierarchy down to the given category.
    pub fn get_hierarchy_path_names(&self, id: u32) -> Vec<String> {
        let state = self.state.read();
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(cid) = current {
            let Some(info) = state.by_id.get(&cid) else { break };
            path.push(info.name.clone());
            current = info.parent_id;
        }
        path.reverse();
        path
    }

    pub fn get_top_categories(&self, k: usize) -> Vec<CategoryInfo> {
        let state = self.state.read();
        let mut all: Vec<CategoryInfo> = state.by_id.values().cloned().collect();
        all.sort_by(|a, b| b.document_count.cmp(&a.document_count).then(a.name.cmp(&b.name)));
        all.truncate(k);
        all
    }

    pub fn search_by_name(&self, substring: &str) -> Vec<CategoryInfo> {
        let needle = normalize_name(substring);
        let state = self.state.read();
        let mut hits: Vec<CategoryInfo> = state
            .by_id
            .values()
            .filter(|c| normalize_name(&c.name).contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name));
        hits
    }

    pub fn export_all(&self) -> Vec<CategoryInfo> {
        let state = self.state.read();
        let mut all: Vec<CategoryInfo> = state.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn all_ids(&self) -> std::collections::HashSet<u32> {
        self.state.read().by_id.keys().copied().collect()
    }

    pub fn get_stats(&self) -> CategoryCacheStats {
        let state = self.state.read();
        CategoryCacheStats {
            categories: state.by_id.len(),
            aliases: state.by_alias.len(),
            roots: state.by_id.values().filter(|c| c.parent_id.is_none()).count(),
        }
    }
}

impl Default for CategoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::hash_name;

    fn category(name: &str, parent: Option<&str>, docs: u32) -> Category {
        Category {
            id: hash_name(name),
            name: name.to_string(),
            description: String::new(),
            parent_id: parent.map(hash_name),
            aliases: vec![],
            related_category_ids: vec![],
            document_count: docs,
            chunk_count: 0,
            concept_count: 0,
            embedding: vec![0.0; 4],
        }
    }

    #[test]
    fn test_name_and_alias_resolution() {
        let cache = CategoryCache::new();
        let mut cat = category("Software Engineering", None, 5);
        cat.aliases.push("SWE".to_string());
        cache.rebuild_from(&[cat]).unwrap();

        let id = hash_name("software engineering");
        assert_eq!(cache.get_id("  software   ENGINEERING "), Some(id));
        assert_eq!(cache.get_id_by_alias("swe"), Some(id));
        assert_eq!(cache.get_name(id).as_deref(), Some("Software Engineering"));
        assert_eq!(cache.get_id("nonexistent"), None);
    }

    #[test]
    fn test_hierarchy_paths_and_children() {
        let cache = CategoryCache::new();
        cache
            .rebuild_from(&[
                category("engineering", None, 1),
                category("software engineering", Some("engineering"), 2),
                category("distributed systems", Some("software engineering"), 3),
            ])
            .unwrap();

        let leaf = hash_name("distributed systems");
        assert_eq!(
            cache.get_hierarchy_path_names(leaf),
            vec!["engineering", "software engineering", "distributed systems"]
        );
        assert_eq!(
            cache.get_children(hash_name("engineering")),
            vec![hash_name("software engineering")]
        );
    }

    #[test]
    fn test_unresolvable_parent_is_rejected() {
        let cache = CategoryCache::new();
        let err = cache
            .rebuild_from(&[category("orphan", Some("missing parent"), 0)])
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_hierarchy_cycle_is_rejected() {
        let cache = CategoryCache::new();
        let mut a = category("alpha", Some("beta"), 0);
        let mut b = category("beta", Some("alpha"), 0);
        a.parent_id = Some(hash_name("beta"));
        b.parent_id = Some(hash_name("alpha"));
        let err = cache.rebuild_from(&[a, b]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_top_categories_ordering() {
        let cache = CategoryCache::new();
        cache
            .rebuild_from(&[
                category("small", None, 1),
                category("large", None, 10),
                category("medium", None, 5),
            ])
            .unwrap();
        let top: Vec<String> = cache
            .get_top_categories(2)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(top, vec!["large", "medium"]);
    }

    #[test]
    fn test_stats() {
        let cache = CategoryCache::new();
        let mut cat = category("root", None, 1);
        cat.aliases.push("r".to_string());
        cache
            .rebuild_from(&[cat, category("child", Some("root"), 1)])
            .unwrap();
        let stats = cache.get_stats();
        assert_eq!(stats.categories, 2);
        assert_eq!(stats.aliases, 1);
        assert_eq!(stats.roots, 1);
    }
}
