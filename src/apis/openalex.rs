use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{
    build_http_client, check_status, non_empty, Author, Concept, Paper, PaperSource,
    SourceError, SourceKind, MAX_RESULTS_CAP,
};
use async_trait::async_trait;
use serde::Deserialize;

pub const BASE_URL: &str = "https://api.openalex.org";

pub struct OpenAlexClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAlexClient {
    /// `email` opts into the polite pool via the User-Agent `mailto`.
    pub fn new(
        base_url: impl Into<String>,
        email: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let ua = match email {
            Some(ref e) => format!("paper-federate/0.1 (mailto:{})", e),
            None => "paper-federate/0.1".to_string(),
        };
        Ok(Self {
            client: build_http_client(&ua, timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[derive(Deserialize)]
struct OAResponse {
    #[serde(default)]
    results: Vec<OAWork>,
}

#[derive(Deserialize)]
struct OAWork {
    id: Option<String>,
    display_name: Option<String>,
    title: Option<String>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    authorships: Option<Vec<OAAuthorship>>,
    publication_year: Option<i32>,
    doi: Option<String>,
    host_venue: Option<OAVenue>,
    primary_location: Option<OALocation>,
    open_access: Option<OAOpenAccess>,
    cited_by_count: Option<u64>,
    concepts: Option<Vec<OAConcept>>,
}

#[derive(Deserialize)]
struct OAAuthorship {
    author: Option<OAAuthor>,
}
#[derive(Deserialize)]
struct OAAuthor {
    display_name: Option<String>,
}
#[derive(Deserialize)]
struct OAVenue {
    display_name: Option<String>,
}
#[derive(Deserialize)]
struct OALocation {
    landing_page_url: Option<String>,
    pdf_url: Option<String>,
    source: Option<OAVenue>,
}
#[derive(Deserialize)]
struct OAOpenAccess {
    is_oa: Option<bool>,
}
#[derive(Deserialize)]
struct OAConcept {
    id: Option<String>,
    display_name: Option<String>,
    level: Option<u32>,
    score: Option<f64>,
}

/// OpenAlex ships abstracts as `word -> [positions]`; put the words back in
/// position order.
fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> Option<String> {
    let words: BTreeMap<usize, &str> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();
    if words.is_empty() {
        return None;
    }
    Some(words.into_values().collect::<Vec<_>>().join(" "))
}

/// `https://openalex.org/W2741809807` -> `W2741809807`.
fn short_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

fn work_to_paper(idx: usize, w: &OAWork) -> Option<Paper> {
    let title = non_empty(w.display_name.as_deref()).or_else(|| non_empty(w.title.as_deref()))?;
    let openalex_id = non_empty(w.id.as_deref()).map(|id| short_id(&id).to_string());
    let id = openalex_id.clone().unwrap_or_else(|| format!("openalex-{}", idx));

    let mut paper = Paper::new(SourceKind::Openalex, id, title);
    paper.abstract_text = w.abstract_inverted_index.as_ref().and_then(rebuild_abstract);
    paper.authors = w.authorships.as_ref()
        .map(|a| a.iter()
            .filter_map(|a| a.author.as_ref().and_then(|a| non_empty(a.display_name.as_deref())))
            .map(Author::named)
            .collect())
        .unwrap_or_default();
    paper.year = w.publication_year;
    paper.venue = w.host_venue.as_ref()
        .and_then(|v| non_empty(v.display_name.as_deref()))
        .or_else(|| w.primary_location.as_ref()
            .and_then(|l| l.source.as_ref())
            .and_then(|s| non_empty(s.display_name.as_deref())));
    paper.metadata.citation_count = w.cited_by_count;
    paper.metadata.is_open_access = w.open_access.as_ref().and_then(|oa| oa.is_oa);
    paper.metadata.url = w.primary_location.as_ref()
        .and_then(|l| non_empty(l.landing_page_url.as_deref()))
        .or_else(|| non_empty(w.doi.as_deref()));
    paper.metadata.pdf_url = w.primary_location.as_ref()
        .and_then(|l| non_empty(l.pdf_url.as_deref()));
    paper.concepts = w.concepts.as_ref().map(|concepts| {
        concepts.iter()
            .filter_map(|c| Some(Concept {
                id: non_empty(c.id.as_deref())?,
                name: c.display_name.clone().unwrap_or_default(),
                level: c.level,
                score: c.score,
            }))
            .collect()
    });
    paper.source_ids.open_alex_id = openalex_id;
    Some(paper)
}

#[async_trait]
impl PaperSource for OpenAlexClient {
    fn kind(&self) -> SourceKind { SourceKind::Openalex }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Paper>, SourceError> {
        let per_page = max_results.min(MAX_RESULTS_CAP).to_string();
        let resp = self.client
            .get(format!("{}/works", self.base_url))
            .query(&[
                ("search", query),
                ("per-page", per_page.as_str()),
                ("sort", "relevance_score:desc"),
            ])
            .send().await?;
        let resp: OAResponse = check_status(self.kind(), resp)?.json().await?;
        Ok(resp.results.iter().enumerate().filter_map(|(i, w)| work_to_paper(i, w)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<Paper> {
        let resp: OAResponse = serde_json::from_str(json).unwrap();
        resp.results.iter().enumerate().filter_map(|(i, w)| work_to_paper(i, w)).collect()
    }

    #[test]
    fn test_work_to_paper() {
        let papers = parse(r#"{"results":[{
            "id":"https://openalex.org/W2741809807",
            "display_name":"Attention Is All You Need",
            "abstract_inverted_index":{"models":[2],"The":[0],"dominant":[1]},
            "authorships":[{"author":{"display_name":"Ashish Vaswani"}},{"author":{}}],
            "publication_year":2017,
            "doi":"https://doi.org/10.48550/arxiv.1706.03762",
            "primary_location":{"landing_page_url":"https://arxiv.org/abs/1706.03762",
                                "pdf_url":"https://arxiv.org/pdf/1706.03762",
                                "source":{"display_name":"arXiv"}},
            "open_access":{"is_oa":true},
            "cited_by_count":90000,
            "concepts":[{"id":"https://openalex.org/C154945302","display_name":"Artificial intelligence","level":1,"score":0.61}]
        }]}"#);
        let p = &papers[0];
        assert_eq!(p.id, "W2741809807");
        assert_eq!(p.source_ids.open_alex_id.as_deref(), Some("W2741809807"));
        assert_eq!(p.source_ids.doi, None);
        assert_eq!(p.abstract_text.as_deref(), Some("The dominant models"));
        assert_eq!(p.authors.len(), 1);
        assert_eq!(p.venue.as_deref(), Some("arXiv"));
        assert_eq!(p.metadata.is_open_access, Some(true));
        assert_eq!(p.metadata.url.as_deref(), Some("https://arxiv.org/abs/1706.03762"));
        assert_eq!(p.metadata.citation_count, Some(90000));
        let concepts = p.concepts.as_ref().unwrap();
        assert_eq!(concepts[0].name, "Artificial intelligence");
        assert_eq!(concepts[0].level, Some(1));
    }

    #[test]
    fn test_host_venue_preferred_and_doi_url_fallback() {
        let papers = parse(r#"{"results":[{
            "id":"https://openalex.org/W1",
            "title":"Fallback Title",
            "doi":"https://doi.org/10.1/abc",
            "host_venue":{"display_name":"Nature"},
            "primary_location":{"source":{"display_name":"Ignored"}}
        }]}"#);
        let p = &papers[0];
        assert_eq!(p.title, "Fallback Title");
        assert_eq!(p.venue.as_deref(), Some("Nature"));
        assert_eq!(p.metadata.url.as_deref(), Some("https://doi.org/10.1/abc"));
        assert_eq!(p.abstract_text, None);
    }

    #[test]
    fn test_rebuild_abstract_repeated_word() {
        let mut index = HashMap::new();
        index.insert("the".to_string(), vec![0, 2]);
        index.insert("cat".to_string(), vec![1]);
        index.insert("mat".to_string(), vec![3]);
        assert_eq!(rebuild_abstract(&index).as_deref(), Some("the cat the mat"));
    }
}
