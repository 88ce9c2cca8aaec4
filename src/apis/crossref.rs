use std::time::Duration;

use super::{
    build_http_client, check_status, non_empty, Author, Paper, PaperSource, SourceError,
    SourceKind, MAX_RESULTS_CAP,
};
use async_trait::async_trait;
use serde::Deserialize;

pub const BASE_URL: &str = "https://api.crossref.org";

pub struct CrossRefClient {
    client: reqwest::Client,
    base_url: String,
}

impl CrossRefClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_http_client("paper-federate/0.1", timeout)?,
            base_url: base_url.into(),
        })
    }
}

#[derive(Deserialize)]
struct CRResponse {
    message: CRMessage,
}
#[derive(Deserialize)]
struct CRMessage {
    #[serde(default)]
    items: Vec<CRItem>,
}
#[derive(Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    title: Option<Vec<String>>,
    author: Option<Vec<CRAuthor>>,
    #[serde(rename = "container-title")]
    container_title: Option<Vec<String>>,
    #[serde(rename = "is-referenced-by-count")]
    citation_count: Option<u64>,
    published: Option<CRDate>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    link: Option<Vec<CRLink>>,
}
#[derive(Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    #[serde(default)]
    affiliation: Vec<CRAffiliation>,
}
#[derive(Deserialize)]
struct CRAffiliation {
    name: Option<String>,
}
#[derive(Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts")]
    date_parts: Option<Vec<Vec<Option<i32>>>>,
}
#[derive(Deserialize)]
struct CRLink {
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "content-type")]
    content_type: Option<String>,
}

/// PDF link: an explicit `application/pdf` link wins, else a work URL that
/// points at a PDF.
fn extract_pdf_url(item: &CRItem) -> Option<String> {
    item.link
        .as_ref()
        .and_then(|links| {
            links
                .iter()
                .find(|l| l.content_type.as_deref() == Some("application/pdf"))
        })
        .and_then(|l| l.url.clone())
        .or_else(|| item.url.clone().filter(|u| u.contains(".pdf")))
}

fn item_to_paper(item: &CRItem) -> Option<Paper> {
    let title = item.title.as_ref()
        .and_then(|t| t.first())
        .and_then(|t| non_empty(Some(t)))?;
    let doi = non_empty(item.doi.as_deref());
    let id = match (&doi, &item.url) {
        (Some(doi), _) => doi.clone(),
        (None, Some(url)) => format!("crossref:{}", url),
        (None, None) => return None,
    };

    let mut paper = Paper::new(SourceKind::Crossref, id, title);
    paper.authors = item.author.as_ref()
        .map(|a| a.iter().filter_map(|a| {
            let name = format!("{} {}",
                a.given.as_deref().unwrap_or(""),
                a.family.as_deref().unwrap_or("")).trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(Author {
                name,
                affiliation: a.affiliation.first().and_then(|af| non_empty(af.name.as_deref())),
            })
        }).collect())
        .unwrap_or_default();
    paper.year = item.published.as_ref()
        .and_then(|d| d.date_parts.as_ref())
        .and_then(|p| p.first())
        .and_then(|p| p.first())
        .copied()
        .flatten();
    paper.abstract_text = non_empty(item.abstract_text.as_deref());
    paper.venue = item.container_title.as_ref()
        .and_then(|c| c.first())
        .and_then(|c| non_empty(Some(c)));
    paper.metadata.citation_count = Some(item.citation_count.unwrap_or(0));
    paper.metadata.pdf_url = extract_pdf_url(item);
    paper.metadata.url = doi.as_ref().map(|d| format!("https://doi.org/{}", d));
    paper.source_ids.doi = doi;
    Some(paper)
}

#[async_trait]
impl PaperSource for CrossRefClient {
    fn kind(&self) -> SourceKind { SourceKind::Crossref }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Paper>, SourceError> {
        let rows = max_results.min(MAX_RESULTS_CAP).to_string();
        let resp = self.client
            .get(format!("{}/works", self.base_url))
            .query(&[
                ("query", query),
                ("rows", rows.as_str()),
                ("sort", "relevance"),
                ("order", "desc"),
            ])
            .send().await?;
        let resp: CRResponse = check_status(self.kind(), resp)?.json().await?;
        Ok(resp.message.items.iter().filter_map(item_to_paper).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<Paper> {
        let resp: CRResponse = serde_json::from_str(json).unwrap();
        resp.message.items.iter().filter_map(item_to_paper).collect()
    }

    #[test]
    fn test_item_to_paper() {
        let papers = parse(r#"{"message":{"items":[{
            "DOI":"10.1000/x",
            "title":["Deep Residual Learning"],
            "author":[{"given":"Kaiming","family":"He","affiliation":[{"name":"MSRA"}]},{"family":"Zhang"}],
            "container-title":["CVPR"],
            "published":{"date-parts":[[2016,6,1]]},
            "is-referenced-by-count":42,
            "link":[{"URL":"https://x/y.html","content-type":"text/html"},
                    {"URL":"https://x/y.pdf","content-type":"application/pdf"}]
        }]}}"#);
        assert_eq!(papers.len(), 1);
        let p = &papers[0];
        assert_eq!(p.id, "10.1000/x");
        assert_eq!(p.source_ids.doi.as_deref(), Some("10.1000/x"));
        assert_eq!(p.authors[0].name, "Kaiming He");
        assert_eq!(p.authors[0].affiliation.as_deref(), Some("MSRA"));
        assert_eq!(p.authors[1].name, "Zhang");
        assert_eq!(p.year, Some(2016));
        assert_eq!(p.venue.as_deref(), Some("CVPR"));
        assert_eq!(p.metadata.citation_count, Some(42));
        assert_eq!(p.metadata.pdf_url.as_deref(), Some("https://x/y.pdf"));
        assert_eq!(p.metadata.url.as_deref(), Some("https://doi.org/10.1000/x"));
        assert!(p.sources.contains(&SourceKind::Crossref));
    }

    #[test]
    fn test_pdf_url_falls_back_to_work_url() {
        let papers = parse(r#"{"message":{"items":[{
            "URL":"https://host/paper.pdf","title":["No DOI here"]
        }]}}"#);
        assert_eq!(papers[0].id, "crossref:https://host/paper.pdf");
        assert_eq!(papers[0].metadata.pdf_url.as_deref(), Some("https://host/paper.pdf"));
        assert_eq!(papers[0].metadata.citation_count, Some(0));
    }

    #[test]
    fn test_untitled_items_dropped() {
        let papers = parse(r#"{"message":{"items":[{"DOI":"10.1/a","title":[]},{"DOI":"10.1/b"}]}}"#);
        assert!(papers.is_empty());
    }
}
