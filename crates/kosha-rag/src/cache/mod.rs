//! In-memory identifier caches.
//!
//! One singleton per identifier namespace, built at startup and rebuilt
//! only by an explicit `refresh()` after ingestion writes. All getters are
//! O(1); queries never touch storage to resolve a name.

pub mod category_cache;
pub mod concept_cache;

pub use category_cache::{CategoryCache, CategoryCacheStats, CategoryInfo};
pub use concept_cache::{ConceptCache, ConceptCacheStats, ConceptInfo};
