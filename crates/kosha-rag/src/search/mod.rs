//! Hybrid search: query expansion, per-signal scoring, dynamic weights,
//! and the orchestrating service.

pub mod expand;
pub mod hybrid;
pub mod scoring;
pub mod weights;

pub use expand::{ConceptMatch, ExpandedQuery, OntologySource, OntologyTerm, QueryExpander};
pub use hybrid::{CandidateSource, HybridSearchService, RepositoryCandidates, SearchRequest};
pub use weights::{SearchContext, WeightProfile};
