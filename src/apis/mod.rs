pub mod arxiv;
pub mod crossref;
pub mod openalex;
pub mod semantic_scholar;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one of the bibliographic indexes a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Crossref,
    Arxiv,
    Openalex,
    SemanticScholar,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Crossref,
        SourceKind::Arxiv,
        SourceKind::Openalex,
        SourceKind::SemanticScholar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Crossref => "crossref",
            SourceKind::Arxiv => "arxiv",
            SourceKind::Openalex => "openalex",
            SourceKind::SemanticScholar => "semantic_scholar",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), affiliation: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_alex_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

/// Topic tag reported by OpenAlex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A normalized paper record. Adapters produce one per upstream hit; the
/// reconciliation step folds duplicates into a single canonical instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    pub sources: BTreeSet<SourceKind>,
    #[serde(default)]
    pub source_ids: SourceIds,
    #[serde(default)]
    pub metadata: PaperMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concepts: Option<Vec<Concept>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s2_fields_of_study: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s2_tldr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s2_influential_citation_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_summary: Option<String>,
}

impl Paper {
    /// Start a record contributed by `source`; all optional fields empty.
    pub fn new(source: SourceKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            year: None,
            abstract_text: None,
            venue: None,
            sources: BTreeSet::from([source]),
            source_ids: SourceIds::default(),
            metadata: PaperMetadata::default(),
            concepts: None,
            s2_fields_of_study: None,
            s2_tldr: None,
            s2_influential_citation_count: None,
            generated_summary: None,
        }
    }

    pub fn citations(&self) -> u64 {
        self.metadata.citation_count.unwrap_or(0)
    }

    pub fn is_open_access(&self) -> bool {
        self.metadata.is_open_access.unwrap_or(false)
    }
}

/// Trim and drop empty strings coming back from upstream payloads.
pub(crate) fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{kind} returned HTTP {status}")]
    Status { kind: SourceKind, status: u16 },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Turn a non-2xx response into a `SourceError::Status`.
pub(crate) fn check_status(
    kind: SourceKind,
    resp: reqwest::Response,
) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(SourceError::Status { kind, status: status.as_u16() })
    }
}

/// Cap every upstream accepts for a single page of results.
pub const MAX_RESULTS_CAP: u32 = 100;

#[async_trait]
pub trait PaperSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Run a free-text search. `max_results` is clamped to the source cap.
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Paper>, SourceError>;
}

pub(crate) fn build_http_client(
    user_agent: &str,
    timeout: std::time::Duration,
) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("arxiv".parse::<SourceKind>(), Ok(SourceKind::Arxiv));
        assert_eq!("Semantic_Scholar".parse::<SourceKind>(), Ok(SourceKind::SemanticScholar));
        assert!("pubmed".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_paper_serializes_camel_case() {
        let mut p = Paper::new(SourceKind::Openalex, "W1", "A Title");
        p.source_ids.open_alex_id = Some("W1".into());
        p.metadata.citation_count = Some(3);
        p.abstract_text = Some("text".into());
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["sourceIds"]["openAlexId"], "W1");
        assert_eq!(json["metadata"]["citationCount"], 3);
        assert_eq!(json["abstract"], "text");
        assert_eq!(json["sources"][0], "openalex");
        assert!(json.get("venue").is_none());
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Attention\n   Is  All "), "Attention Is All");
    }
}
