//! Per-context weight profiles and query-driven adjustment.

use serde::{Deserialize, Serialize};

use crate::search::expand::ExpandedQuery;
use crate::types::SignalScores;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchContext {
    Catalog,
    Chunk,
    Concept,
}

impl SearchContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Chunk => "chunk",
            Self::Concept => "concept",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightProfile {
    pub vector: f32,
    pub bm25: f32,
    pub title: f32,
    pub concept: f32,
    pub wordnet: f32,
}

impl WeightProfile {
    /// Static defaults per context.
    pub fn base(context: SearchContext) -> Self {
        match context {
            SearchContext::Catalog => Self {
                vector: 0.25,
                bm25: 0.20,
                title: 0.25,
                concept: 0.20,
                wordnet: 0.10,
            },
            SearchContext::Chunk => Self {
                vector: 0.30,
                bm25: 0.25,
                title: 0.15,
                concept: 0.20,
                wordnet: 0.10,
            },
            SearchContext::Concept => Self {
                vector: 0.40,
                bm25: 0.15,
                title: 0.15,
                concept: 0.25,
                wordnet: 0.05,
            },
        }
    }

    /// Base profile adjusted by query shape, then renormalized to sum 1.
    pub fn dynamic(context: SearchContext, expanded: &ExpandedQuery) -> Self {
        let mut profile = Self::base(context);
        let term_count = expanded.terms.len();
        let concept_matches = expanded.concept_matches.len();
        let strong_concept_signal = concept_matches >= 2;

        if term_count == 1 {
            if concept_matches == 0 {
                profile.wordnet *= 2.0;
                profile.concept *= 0.5;
            } else {
                profile.wordnet *= 1.5;
            }
        } else if term_count <= 2 && concept_matches == 0 {
            profile.wordnet *= 1.5;
            profile.bm25 *= 1.1;
        } else if term_count > 2 && strong_concept_signal {
            profile.wordnet *= 0.75;
            profile.concept *= 1.25;
        }

        profile.normalize();
        profile
    }

    pub fn sum(&self) -> f32 {
        self.vector + self.bm25 + self.title + self.concept + self.wordnet
    }

    fn normalize(&mut self) {
        let total = self.sum();
        if total > 0.0 {
            self.vector /= total;
            self.bm25 /= total;
            self.title /= total;
            self.concept /= total;
            self.wordnet /= total;
        }
    }

    pub fn hybrid_score(&self, signals: &SignalScores) -> f32 {
        self.vector * signals.vector
            + self.bm25 * signals.bm25
            + self.title * signals.title
            + self.concept * signals.concept
            + self.wordnet * signals.wordnet
    }
}
