use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub wordnet: WordNetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector dimension of the external embedding service. Every stored
    /// embedding must match it exactly.
    pub dimension: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
    /// Candidate set is max(limit * candidate_multiplier, candidate_floor).
    pub candidate_multiplier: usize,
    pub candidate_floor: usize,
    /// Minimum embedding similarity for a concept to count as matched
    /// during query expansion.
    pub concept_match_threshold: f32,
    pub max_concept_matches: usize,
    /// Caps applied per ontology source when merging expansion terms.
    pub max_synonyms: usize,
    pub max_broader_terms: usize,
    pub max_narrower_terms: usize,
    pub ann_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordNetConfig {
    pub lookup_timeout_ms: u64,
    pub prewarm_concurrency: usize,
    pub cache_size: usize,
    pub cache_ttl_secs: u64,
    /// Hypernym/hyponym BFS depth bound.
    pub max_depth: usize,
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.search.default_limit == 0 {
            return Err("search.default_limit must be > 0".into());
        }
        if self.search.candidate_multiplier == 0 {
            return Err("search.candidate_multiplier must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.concept_match_threshold) {
            return Err("search.concept_match_threshold must be in [0.0, 1.0]".into());
        }
        if self.wordnet.prewarm_concurrency == 0 {
            return Err("wordnet.prewarm_concurrency must be > 0".into());
        }
        if self.wordnet.cache_size == 0 {
            return Err("wordnet.cache_size must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kosha-rag");

        Self {
            data_dir,
            embedding: EmbeddingConfig {
                dimension: 768,
                timeout_ms: 2_000,
            },
            search: SearchConfig {
                default_limit: 10,
                candidate_multiplier: 4,
                candidate_floor: 100,
                concept_match_threshold: 0.55,
                max_concept_matches: 8,
                max_synonyms: 5,
                max_broader_terms: 3,
                max_narrower_terms: 3,
                ann_timeout_ms: 2_000,
            },
            wordnet: WordNetConfig {
                lookup_timeout_ms: 500,
                prewarm_concurrency: 10,
                cache_size: 4_096,
                cache_ttl_secs: 3_600,
                max_depth: 3,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let mut config = EngineConfig::default();
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = EngineConfig::default();
        config.search.concept_match_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
