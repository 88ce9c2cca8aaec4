use std::time::Duration;

use super::{
    build_http_client, check_status, non_empty, Author, Paper, PaperSource, SourceError,
    SourceKind, MAX_RESULTS_CAP,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

pub const BASE_URL: &str = "https://api.semanticscholar.org";

const FIELDS: &str = "title,abstract,year,venue,authors,citationCount,externalIds,\
fieldsOfStudy,tldr,influentialCitationCount,openAccessPdf";

pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_http_client("paper-federate/0.1", timeout)?,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct S2SearchResponse {
    data: Option<Vec<S2Paper>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    authors: Option<Vec<S2Author>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    venue: Option<String>,
    external_ids: Option<S2ExternalIds>,
    citation_count: Option<u64>,
    influential_citation_count: Option<u64>,
    fields_of_study: Option<Vec<String>>,
    tldr: Option<S2Tldr>,
    open_access_pdf: Option<S2Pdf>,
}

#[derive(Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

#[derive(Deserialize)]
struct S2Tldr {
    text: Option<String>,
}

#[derive(Deserialize)]
struct S2Pdf {
    url: Option<String>,
}

fn s2_to_paper(p: &S2Paper) -> Option<Paper> {
    let title = non_empty(p.title.as_deref())?;
    let paper_id = non_empty(p.paper_id.as_deref())?;

    let mut paper = Paper::new(SourceKind::SemanticScholar, paper_id.clone(), title);
    paper.authors = p.authors.as_ref()
        .map(|a| a.iter()
            .filter_map(|a| non_empty(a.name.as_deref()))
            .map(Author::named)
            .collect())
        .unwrap_or_default();
    paper.abstract_text = non_empty(p.abstract_text.as_deref());
    paper.year = p.year;
    paper.venue = non_empty(p.venue.as_deref());
    paper.source_ids.doi = p.external_ids.as_ref().and_then(|e| non_empty(e.doi.as_deref()));
    paper.source_ids.arxiv_id = p.external_ids.as_ref().and_then(|e| non_empty(e.arxiv.as_deref()));
    paper.metadata.citation_count = p.citation_count;
    paper.metadata.url = Some(format!("https://www.semanticscholar.org/paper/{}", paper_id));
    paper.metadata.pdf_url = p.open_access_pdf.as_ref().and_then(|pdf| non_empty(pdf.url.as_deref()));
    if paper.metadata.pdf_url.is_some() {
        paper.metadata.is_open_access = Some(true);
    }
    paper.s2_fields_of_study = p.fields_of_study.clone().filter(|f| !f.is_empty());
    paper.s2_tldr = p.tldr.as_ref().and_then(|t| non_empty(t.text.as_deref()));
    paper.s2_influential_citation_count = p.influential_citation_count;
    paper.source_ids.semantic_scholar_id = Some(paper_id);
    Some(paper)
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    fn kind(&self) -> SourceKind {
        SourceKind::SemanticScholar
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Paper>, SourceError> {
        let url = format!("{}/graph/v1/paper/search", self.base_url);
        let limit = max_results.min(MAX_RESULTS_CAP).to_string();
        let resp = self.add_auth(
            self.client.get(&url)
                .query(&[
                    ("query", query),
                    ("limit", limit.as_str()),
                    ("fields", FIELDS),
                ])
        ).send().await?;

        // Keyless access is routinely refused; the source is optional.
        if resp.status() == StatusCode::FORBIDDEN {
            tracing::warn!(
                source = self.name(),
                has_api_key = self.api_key.is_some(),
                "Semantic Scholar refused the request (API key required or rate limited)"
            );
            return Ok(Vec::new());
        }

        let resp: S2SearchResponse = check_status(self.kind(), resp)?.json().await?;
        Ok(resp.data.unwrap_or_default().iter().filter_map(s2_to_paper).collect())
    }
}
