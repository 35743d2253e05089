//! Per-candidate signal scorers.
//!
//! All scorers are synchronous pure functions over the candidate pool;
//! scoring never suspends. Each signal lands in [0, 1] so the weighted
//! sum stays comparable across queries, and a larger per-signal score can
//! never lower the hybrid score.

use std::collections::{HashMap, HashSet};

use crate::ident::normalize_name;
use crate::search::expand::{ExpandedQuery, OntologySource};
use crate::storage::Candidate;
use crate::types::SignalScores;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// BM25 statistics over one candidate pool. Document frequency and length
/// normalization come from the pool itself, which keeps scoring
/// deterministic and order-independent for a fixed candidate set.
pub struct Bm25Scorer {
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avgdl: f32,
    doc_freq: HashMap<String, usize>,
    n: usize,
}

impl Bm25Scorer {
    pub fn new(texts: &[&str]) -> Self {
        let mut term_freqs = Vec::with_capacity(texts.len());
        let mut doc_lens = Vec::with_capacity(texts.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let tokens = tokenize(text);
            doc_lens.push(tokens.len());
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let n = texts.len();
        let avgdl = if n == 0 {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f32 / n as f32
        };

        Self {
            term_freqs,
            doc_lens,
            avgdl,
            doc_freq,
            n,
        }
    }

    /// Weighted Okapi BM25 for one pool member.
    pub fn score(&self, index: usize, terms: &[(String, f32)]) -> f32 {
        if index >= self.term_freqs.len() || self.avgdl == 0.0 {
            return 0.0;
        }
        let freqs = &self.term_freqs[index];
        let dl = self.doc_lens[index] as f32;

        let mut score = 0.0;
        for (term, weight) in terms {
            let tf = *freqs.get(term).unwrap_or(&0) as f32;
            if tf == 0.0 {
                continue;
            }
            let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
            let idf = ((self.n as f32 - df + 0.5) / (df + 0.5) + 1.0).ln();
            let tf_component =
                (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / self.avgdl));
            score += weight * idf * tf_component;
        }
        score
    }
}

/// Min-max normalize raw scores to [0, 1]. All-identical nonzero scores
/// map to 0.5 so a uniform pool still contributes signal.
fn normalize(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw.iter().copied().fold(f32::MIN, f32::max);
    let min = raw.iter().copied().fold(f32::MAX, f32::min);
    if max <= 0.0 {
        return vec![0.0; raw.len()];
    }
    if (max - min).abs() < 1e-9 {
        return vec![0.5; raw.len()];
    }
    raw.iter().map(|s| (s - min) / (max - min)).collect()
}

/// BM25 query terms with their weights: query terms get a concept boost
/// when they coincide with a matched concept, ontology terms ride along
/// at their expansion weight.
fn bm25_terms(expanded: &ExpandedQuery) -> Vec<(String, f32)> {
    let mut terms: Vec<(String, f32)> = Vec::new();
    for term in &expanded.terms {
        let boost = expanded
            .concept_matches
            .iter()
            .filter(|m| normalize_name(&m.name).contains(term.as_str()))
            .map(|m| m.weight)
            .fold(0.0f32, f32::max);
        terms.push((term.clone(), (1.0 + boost).max(1.0)));
    }
    for ontology in &expanded.ontology_terms {
        for token in tokenize(&ontology.term) {
            if !terms.iter().any(|(t, _)| *t == token) {
                terms.push((token, ontology.weight.min(1.0)));
            }
        }
    }
    terms
}

/// Tiered title match: exact phrase beats full coverage beats partial.
pub fn title_score(title: &str, query_terms: &[String]) -> f32 {
    if query_terms.is_empty() || title.is_empty() {
        return 0.0;
    }
    let normalized_title = normalize_name(title);
    let phrase = query_terms.join(" ");
    if normalized_title.contains(&phrase) {
        return 1.0;
    }
    let title_tokens: HashSet<String> = tokenize(title).into_iter().collect();
    let matched = query_terms.iter().filter(|t| title_tokens.contains(*t)).count();
    let coverage = matched as f32 / query_terms.len() as f32;
    if coverage >= 1.0 {
        0.8
    } else if coverage >= 0.5 {
        0.4
    } else {
        0.8 * coverage
    }
}

/// Overlap between matched concepts and the candidate's concepts,
/// relative to the match set.
pub fn concept_score(candidate_concepts: &[u32], matched: &[u32]) -> f32 {
    if matched.is_empty() {
        return 0.0;
    }
    let candidate: HashSet<u32> = candidate_concepts.iter().copied().collect();
    let hits = matched.iter().filter(|id| candidate.contains(id)).count();
    hits as f32 / matched.len() as f32
}

/// Capped sum of ontology-term hits in the candidate text, scaled by each
/// term's weight and averaged over the query length.
pub fn wordnet_bonus(text: &str, expanded: &ExpandedQuery) -> f32 {
    if expanded.ontology_terms.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let mut bonus = 0.0;
    for term in &expanded.ontology_terms {
        if haystack.contains(&term.term.to_lowercase()) {
            let factor = match term.source {
                OntologySource::Synonym => 1.0,
                OntologySource::Broader | OntologySource::Narrower => 0.6,
            };
            bonus += factor * term.weight;
        }
    }
    (bonus / expanded.terms.len().max(1) as f32).min(1.0)
}

/// Compute all five signals for a candidate pool. `titles[i]` is the text
/// scored by the title signal for `candidates[i]` (the catalog title, the
/// chunk's concept names, or the concept name, by context).
pub fn compute_signals(
    candidates: &[Candidate],
    titles: &[String],
    expanded: &ExpandedQuery,
) -> Vec<SignalScores> {
    let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
    let bm25 = Bm25Scorer::new(&texts);
    let terms = bm25_terms(expanded);
    let matched_ids: Vec<u32> = expanded.concept_matches.iter().map(|m| m.id).collect();

    let raw_bm25: Vec<f32> = (0..candidates.len()).map(|i| bm25.score(i, &terms)).collect();
    let norm_bm25 = normalize(&raw_bm25);

    candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            let scores = SignalScores {
                vector: candidate.vector_score.clamp(0.0, 1.0),
                bm25: norm_bm25.get(i).copied().unwrap_or(0.0),
                title: title_score(titles.get(i).map_or("", String::as_str), &expanded.terms),
                concept: concept_score(&candidate.concept_ids, &matched_ids),
                wordnet: wordnet_bonus(&candidate.text, expanded),
            };
            sanitize(scores)
        })
        .collect()
}

/// A scorer that produced a non-finite value contributes 0 for that
/// signal; the candidate stays in the pool.
fn sanitize(mut scores: SignalScores) -> SignalScores {
    for value in [
        &mut scores.vector,
        &mut scores.bm25,
        &mut scores.title,
        &mut scores.concept,
        &mut scores.wordnet,
    ] {
        if !value.is_finite() {
            tracing::warn!("Signal produced a non-finite score; zeroing");
            *value = 0.0;
        } else {
            *value = value.clamp(0.0, 1.0);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::expand::{ConceptMatch, OntologyTerm};

    fn expanded(terms: &[&str]) -> ExpandedQuery {
        ExpandedQuery {
            original: terms.join(" "),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            concept_matches: vec![],
            ontology_terms: vec![],
        }
    }

    fn candidate(id: u32, text: &str, concepts: &[u32], vector: f32) -> Candidate {
        Candidate {
            id,
            catalog_id: id,
            title: String::new(),
            text: text.to_string(),
            source: String::new(),
            page_number: None,
            concept_ids: concepts.to_vec(),
            category_ids: vec![],
            vector_score: vector,
        }
    }

    #[test]
    fn test_bm25_prefers_matching_document() {
        let scorer = Bm25Scorer::new(&[
            "gradient descent converges on convex functions",
            "a recipe for sourdough bread with a long fermentation",
            "stochastic gradient descent with momentum",
        ]);
        let terms = vec![("gradient".to_string(), 1.0), ("descent".to_string(), 1.0)];
        let s0 = scorer.score(0, &terms);
        let s1 = scorer.score(1, &terms);
        let s2 = scorer.score(2, &terms);
        assert!(s0 > s1);
        assert!(s2 > s1);
        assert_eq!(s1, 0.0);
    }

    #[test]
    fn test_title_score_tiers() {
        let terms = vec!["distributed".to_string(), "systems".to_string()];
        assert_eq!(title_score("Distributed Systems", &terms), 1.0);
        assert_eq!(title_score("Systems, Distributed and Otherwise", &terms), 0.8);
        let half = vec!["distributed".to_string(), "consensus".to_string()];
        assert_eq!(title_score("Distributed Computing", &half), 0.4);
        let quarter = vec![
            "a1".to_string(),
            "b2".to_string(),
            "c3".to_string(),
            "distributed".to_string(),
        ];
        let partial = title_score("Distributed Computing", &quarter);
        assert!((partial - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_concept_score_is_overlap_over_matches() {
        assert_eq!(concept_score(&[1, 2, 3], &[1, 2]), 1.0);
        assert_eq!(concept_score(&[1], &[1, 2]), 0.5);
        assert_eq!(concept_score(&[9], &[1, 2]), 0.0);
        assert_eq!(concept_score(&[1], &[]), 0.0);
    }

    #[test]
    fn test_wordnet_bonus_scales_by_source() {
        let mut query = expanded(&["car"]);
        query.ontology_terms = vec![
            OntologyTerm {
                term: "automobile".to_string(),
                source: OntologySource::Synonym,
                weight: 1.0,
            },
            OntologyTerm {
                term: "vehicle".to_string(),
                source: OntologySource::Broader,
                weight: 1.0,
            },
        ];
        let synonym_hit = wordnet_bonus("the automobile industry", &query);
        let broader_hit = wordnet_bonus("a vehicle registry", &query);
        assert!((synonym_hit - 1.0).abs() < 1e-6);
        assert!((broader_hit - 0.6).abs() < 1e-6);
        assert_eq!(wordnet_bonus("nothing relevant here", &query), 0.0);
    }

    #[test]
    fn test_bm25_terms_carry_concept_boost() {
        let mut query = expanded(&["decorator", "pattern"]);
        query.concept_matches = vec![ConceptMatch {
            id: 1,
            name: "decorator pattern".to_string(),
            weight: 0.8,
        }];
        let terms = bm25_terms(&query);
        let decorator = terms.iter().find(|(t, _)| t == "decorator").unwrap();
        assert!((decorator.1 - 1.8).abs() < 1e-6);
    }

    #[test]
    fn test_compute_signals_monotonicity() {
        // Candidate 0 dominates candidate 1 on every raw input, so its
        // hybrid-relevant signals must all be >= candidate 1's.
        let query = expanded(&["gradient", "descent"]);
        let candidates = vec![
            candidate(1, "gradient descent in practice", &[], 0.9),
            candidate(2, "unrelated prose about birds", &[], 0.2),
        ];
        let titles = vec!["Gradient Descent".to_string(), "Birds".to_string()];
        let signals = compute_signals(&candidates, &titles, &query);
        assert!(signals[0].vector >= signals[1].vector);
        assert!(signals[0].bm25 >= signals[1].bm25);
        assert!(signals[0].title >= signals[1].title);
        assert!(signals[0].concept >= signals[1].concept);
        assert!(signals[0].wordnet >= signals[1].wordnet);
    }

    #[test]
    fn test_signals_are_clamped_to_unit_interval() {
        let query = expanded(&["x"]);
        let candidates = vec![candidate(1, "x x x", &[], 1.7)];
        let titles = vec!["x".to_string()];
        let signals = compute_signals(&candidates, &titles, &query);
        assert!(signals[0].vector <= 1.0);
        assert!(signals[0].bm25 <= 1.0);
    }
}
