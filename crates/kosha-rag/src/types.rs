use serde::{Deserialize, Serialize};

/// Category attached to documents (and inherited by their chunks).
/// The id is the FNV-1a hash of the normalized name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub parent_id: Option<u32>,
    pub aliases: Vec<String>,
    /// Top-k co-occurring categories, recomputed at each rebuild.
    pub related_category_ids: Vec<u32>,
    pub document_count: u32,
    pub chunk_count: u32,
    pub concept_count: u32,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConceptType {
    Thematic,
    Terminology,
}

impl ConceptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thematic => "thematic",
            Self::Terminology => "terminology",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "terminology" => Self::Terminology,
            _ => Self::Thematic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentSource {
    Corpus,
    Wordnet,
    Hybrid,
}

impl EnrichmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Corpus => "corpus",
            Self::Wordnet => "wordnet",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "wordnet" => Self::Wordnet,
            "hybrid" => Self::Hybrid,
            _ => Self::Corpus,
        }
    }
}

/// A concept mined from the corpus. Deliberately category-agnostic:
/// cross-domain membership is discovered by joining `catalog_ids` against
/// the owning documents' `category_ids`, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub concept_type: ConceptType,
    /// Documents in which this concept occurs.
    pub catalog_ids: Vec<u32>,
    /// Co-occurring concept names, most frequent first.
    pub related_concepts: Vec<String>,
    pub synonyms: Vec<String>,
    pub broader_terms: Vec<String>,
    pub narrower_terms: Vec<String>,
    /// Frequency-derived importance in [0, 1].
    pub weight: f32,
    pub chunk_count: u32,
    pub enrichment_source: EnrichmentSource,
    pub embedding: Vec<f32>,
}

/// One document in the library. `text` holds the enriched summary used
/// for retrieval, not the raw document body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u32,
    pub title: String,
    /// Absolute source locator. Internal; tools expose `catalog_id`.
    pub source: String,
    /// Content checksum of the ingested document.
    pub hash: String,
    pub origin_hash: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
    pub concept_ids: Vec<u32>,
    /// 1..N categories, owned by the document.
    pub category_ids: Vec<u32>,
    /// Tokens after the first `--` separator in the file name.
    pub filename_tags: Vec<String>,
    pub author: Option<String>,
    pub year: Option<String>,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
}

/// A retrievable passage. `category_ids` are inherited verbatim from the
/// parent catalog entry at write time and never edited independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u32,
    pub catalog_id: u32,
    pub text: String,
    pub page_number: u32,
    pub loc: String,
    pub embedding: Vec<f32>,
    pub concept_ids: Vec<u32>,
    pub category_ids: Vec<u32>,
    pub concept_density: f32,
    pub is_toc: bool,
    pub is_front_matter: bool,
    pub is_back_matter: bool,
    pub is_meta_content: bool,
    pub is_reference: bool,
    pub contains_citations: bool,
    pub has_math: bool,
    pub has_extraction_issues: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualType {
    Diagram,
    Flowchart,
    Chart,
    Table,
    Figure,
}

impl VisualType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagram => "diagram",
            Self::Flowchart => "flowchart",
            Self::Chart => "chart",
            Self::Table => "table",
            Self::Figure => "figure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "diagram" => Some(Self::Diagram),
            "flowchart" => Some(Self::Flowchart),
            "chart" => Some(Self::Chart),
            "table" => Some(Self::Table),
            "figure" => Some(Self::Figure),
            _ => None,
        }
    }
}

/// Extracted figure/diagram record. Visuals associate to chunks only
/// through `catalog_id`; chunk ids are never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visual {
    pub id: u32,
    pub catalog_id: u32,
    pub catalog_title: String,
    pub visual_type: VisualType,
    /// Page number, or chapter index for EPUB; 0 when unknown.
    pub page_number: u32,
    pub description: String,
    pub concept_ids: Vec<u32>,
    pub image_path: String,
    pub embedding: Vec<f32>,
}

/// Whole-document classification produced at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Book,
    Paper,
    Magazine,
    Article,
    Unknown,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Paper => "paper",
            Self::Magazine => "magazine",
            Self::Article => "article",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-signal scores for one candidate, each normalized to [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SignalScores {
    pub vector: f32,
    pub bm25: f32,
    pub title: f32,
    pub concept: f32,
    pub wordnet: f32,
}

/// Debug payload attached to results when the caller asks for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDebug {
    pub signals: SignalScores,
    pub matched_concepts: Vec<String>,
    pub expanded_terms: Vec<String>,
}

/// One ranked result from hybrid search, in any context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: u32,
    pub catalog_id: u32,
    pub title: String,
    pub text: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<SearchDebug>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_serialization_has_no_category_field() {
        let concept = Concept {
            id: 1,
            name: "optimization".into(),
            concept_type: ConceptType::Thematic,
            catalog_ids: vec![3_842_615_478, 1_829_374_562],
            related_concepts: vec![],
            synonyms: vec![],
            broader_terms: vec![],
            narrower_terms: vec![],
            weight: 0.5,
            chunk_count: 0,
            enrichment_source: EnrichmentSource::Corpus,
            embedding: vec![0.0; 4],
        };
        let json = serde_json::to_value(&concept).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("category_id"));
        assert!(!obj.contains_key("category_ids"));
        assert_eq!(obj["type"], "thematic");

        // Id arrays serialize as raw integers, not quoted strings.
        let ids = obj["catalog_ids"].as_array().unwrap();
        assert!(ids.iter().all(|v| v.is_u64()));
    }

    #[test]
    fn test_document_kind_round_trip() {
        for kind in [
            DocumentKind::Book,
            DocumentKind::Paper,
            DocumentKind::Magazine,
            DocumentKind::Article,
            DocumentKind::Unknown,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            let back: DocumentKind = serde_json::from_str(&json).unwrap();
            assert_eq!(kind, back);
        }
    }
}
