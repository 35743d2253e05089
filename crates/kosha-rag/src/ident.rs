//! Content-addressed identifiers.
//!
//! Every category, concept, document, chunk, and visual id is the FNV-1a
//! 32-bit hash of a normalized name. The same name always hashes to the
//! same id, across rebuilds and across machines, so nothing ever needs an
//! id-mapping file.

use std::collections::HashMap;

use unicode_normalization::UnicodeNormalization;

use crate::error::EngineError;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Canonical form used for hashing: Unicode NFC, lowercase, trimmed,
/// interior whitespace collapsed to single spaces.
pub fn normalize_name(name: &str) -> String {
    let nfc: String = name.nfc().collect();
    let lowered = nfc.to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// FNV-1a 32-bit over the UTF-8 bytes of the normalized name.
pub fn hash_name(name: &str) -> u32 {
    let normalized = normalize_name(name);
    let mut hash = FNV_OFFSET_BASIS;
    for byte in normalized.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Tracks which normalized name owns each id within one namespace
/// (categories and concepts keep separate registries). Collisions between
/// distinct names are a hard ingestion error, never silently mangled.
#[derive(Debug, Default)]
pub struct IdRegistry {
    owners: HashMap<u32, String>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name and return its id, or fail if a different
    /// normalized name already hashes to the same id.
    pub fn register(&mut self, name: &str) -> Result<u32, EngineError> {
        let normalized = normalize_name(name);
        let id = hash_name(&normalized);
        match self.owners.get(&id) {
            Some(existing) if *existing != normalized => Err(EngineError::IdCollision {
                id,
                first: existing.clone(),
                second: normalized,
            }),
            Some(_) => Ok(id),
            None => {
                self.owners.insert(id, normalized);
                Ok(id)
            }
        }
    }

    /// Seed the registry with names already present in storage so that a
    /// rebuild detects collisions against the existing corpus too.
    pub fn seed<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) -> Result<(), EngineError> {
        for name in names {
            self.register(name)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
