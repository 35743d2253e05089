//! Synset selection strategies.
//!
//! A term maps to several senses; which one the engine picks changes the
//! expansion. Dispatch is a tagged enum, not an inheritance tree.

use crate::wordnet::Synset;

/// Query-side context available when disambiguating a term.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    pub query_terms: Vec<String>,
    pub domain_hints: Vec<String>,
    pub related_terms: Vec<String>,
}

const TECHNICAL_INDICATORS: &[&str] = &[
    "algorithm",
    "computation",
    "computer",
    "data",
    "engineering",
    "function",
    "mathematics",
    "model",
    "network",
    "process",
    "programming",
    "software",
    "structure",
    "system",
    "theory",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynsetStrategy {
    /// Most-common sense: the lexicon's first synset. Deterministic.
    #[default]
    First,
    /// Scores candidate senses against the query context and picks the
    /// argmax; ties fall back to lexicon order.
    ContextAware,
}

impl SynsetStrategy {
    pub fn select<'a>(&self, candidates: &'a [Synset], ctx: &SelectionContext) -> Option<&'a Synset> {
        match self {
            Self::First => candidates.first(),
            Self::ContextAware => {
                let mut best: Option<(&Synset, f32)> = None;
                for synset in candidates {
                    let score = context_score(synset, ctx);
                    match best {
                        Some((_, top)) if score <= top => {}
                        _ => best = Some((synset, score)),
                    }
                }
                best.map(|(s, _)| s)
            }
        }
    }
}

fn context_score(synset: &Synset, ctx: &SelectionContext) -> f32 {
    let definition = synset.definition.to_lowercase();
    let words: Vec<String> = synset.words.iter().map(|w| w.to_lowercase()).collect();

    let term_overlap = ctx
        .query_terms
        .iter()
        .filter(|t| definition.contains(&t.to_lowercase()))
        .count() as f32;
    let technical_hits = TECHNICAL_INDICATORS
        .iter()
        .filter(|t| definition.contains(*t))
        .count() as f32;
    let domain_hits = ctx
        .domain_hints
        .iter()
        .filter(|h| {
            let h = h.to_lowercase();
            definition.contains(&h) || words.iter().any(|w| w.contains(&h))
        })
        .count() as f32;
    let related_hits = ctx
        .related_terms
        .iter()
        .filter(|r| {
            let r = r.to_lowercase();
            words.iter().any(|w| *w == r)
        })
        .count() as f32;

    3.0 * term_overlap + 1.0 * technical_hits + 2.0 * domain_hits + 1.5 * related_hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synset(id: &str, words: &[&str], definition: &str) -> Synset {
        Synset {
            id: id.to_string(),
            words: words.iter().map(|w| w.to_string()).collect(),
            definition: definition.to_string(),
            hypernyms: vec![],
            hyponyms: vec![],
        }
    }

    #[test]
    fn test_first_strategy_takes_lexicon_order() {
        let candidates = vec![
            synset("bank.n.01", &["bank"], "sloping land beside a body of water"),
            synset("bank.n.02", &["bank"], "a financial institution"),
        ];
        let selected = SynsetStrategy::First
            .select(&candidates, &SelectionContext::default())
            .unwrap();
        assert_eq!(selected.id, "bank.n.01");
    }

    #[test]
    fn test_context_aware_prefers_matching_definition() {
        let candidates = vec![
            synset("tree.n.01", &["tree"], "a tall perennial woody plant"),
            synset(
                "tree.n.02",
                &["tree", "tree diagram"],
                "a data structure in computer science placing nodes in a hierarchy",
            ),
        ];
        let ctx = SelectionContext {
            query_terms: vec!["binary".to_string(), "structure".to_string()],
            domain_hints: vec![],
            related_terms: vec![],
        };
        let selected = SynsetStrategy::ContextAware.select(&candidates, &ctx).unwrap();
        assert_eq!(selected.id, "tree.n.02");
    }

    #[test]
    fn test_context_aware_uses_related_terms() {
        let candidates = vec![
            synset("pipe.n.01", &["pipe", "tobacco pipe"], "a tube for smoking"),
            synset("pipe.n.02", &["pipe", "pipeline"], "a long tube for conveying fluids"),
        ];
        let ctx = SelectionContext {
            query_terms: vec![],
            domain_hints: vec![],
            related_terms: vec!["pipeline".to_string()],
        };
        let selected = SynsetStrategy::ContextAware.select(&candidates, &ctx).unwrap();
        assert_eq!(selected.id, "pipe.n.02");
    }

    #[test]
    fn test_tie_falls_back_to_lexicon_order() {
        let candidates = vec![
            synset("a.n.01", &["a"], "first sense"),
            synset("a.n.02", &["a"], "second sense"),
        ];
        let selected = SynsetStrategy::ContextAware
            .select(&candidates, &SelectionContext::default())
            .unwrap();
        assert_eq!(selected.id, "a.n.01");
    }
}
