use std::time::Duration;

use super::{
    build_http_client, check_status, collapse_whitespace, Author, Paper, PaperSource,
    SourceError, SourceKind, MAX_RESULTS_CAP,
};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

pub const BASE_URL: &str = "https://export.arxiv.org";

pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_http_client("paper-federate/0.1", timeout)?,
            base_url: base_url.into(),
        })
    }
}

/// `all:` query requiring every whitespace-separated term.
fn search_query(query: &str) -> String {
    format!("all:{}", query.split_whitespace().collect::<Vec<_>>().join(" AND "))
}

#[async_trait]
impl PaperSource for ArxivClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Paper>, SourceError> {
        let max = max_results.min(MAX_RESULTS_CAP).to_string();
        let sq = search_query(query);
        let resp = self.client
            .get(format!("{}/api/query", self.base_url))
            .query(&[
                ("search_query", sq.as_str()),
                ("start", "0"),
                ("max_results", max.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await?;
        let body = check_status(self.kind(), resp)?.text().await?;
        parse_atom_feed(&body)
    }
}

/// Strip the abstract-page prefix from an Atom `<id>`.
fn arxiv_id_from_url(id: &str) -> Option<&str> {
    ["http://arxiv.org/abs/", "https://arxiv.org/abs/"]
        .iter()
        .find_map(|prefix| id.strip_prefix(prefix))
        .filter(|s| !s.is_empty())
}

#[derive(Default)]
struct EntryFields {
    id: String,
    title: String,
    summary: String,
    published: String,
    doi: String,
    journal_ref: String,
    authors: Vec<Author>,
    author_name: String,
    author_affiliation: String,
}

impl EntryFields {
    fn text_target(&mut self, tag: &str, in_author: bool) -> Option<&mut String> {
        match (tag, in_author) {
            ("name", true) => Some(&mut self.author_name),
            ("affiliation", true) => Some(&mut self.author_affiliation),
            ("id", false) => Some(&mut self.id),
            ("title", false) => Some(&mut self.title),
            ("summary", false) => Some(&mut self.summary),
            ("published", false) => Some(&mut self.published),
            ("doi", false) => Some(&mut self.doi),
            ("journal_ref", false) => Some(&mut self.journal_ref),
            _ => None,
        }
    }

    fn into_paper(self) -> Option<Paper> {
        let arxiv_id = arxiv_id_from_url(self.id.trim())?.to_string();
        let title = collapse_whitespace(&self.title);
        if title.is_empty() {
            return None;
        }
        let mut paper = Paper::new(SourceKind::Arxiv, arxiv_id.clone(), title);
        paper.authors = self.authors;
        paper.year = self.published.trim().get(..4).and_then(|y| y.parse().ok());
        let summary = collapse_whitespace(&self.summary);
        paper.abstract_text = (!summary.is_empty()).then_some(summary);
        let journal_ref = collapse_whitespace(&self.journal_ref);
        paper.venue = (!journal_ref.is_empty()).then_some(journal_ref);
        let doi = self.doi.trim();
        if !doi.is_empty() {
            paper.source_ids.doi = Some(doi.to_string());
        }
        paper.metadata.pdf_url = Some(format!("https://arxiv.org/pdf/{}.pdf", arxiv_id));
        paper.metadata.url = Some(format!("https://arxiv.org/abs/{}", arxiv_id));
        paper.metadata.is_open_access = Some(true);
        paper.source_ids.arxiv_id = Some(arxiv_id);
        Some(paper)
    }
}

/// Parse an arXiv Atom feed. Entries without a usable id or title are
/// skipped (the API reports query errors as such an entry); malformed XML
/// fails the whole feed.
pub(crate) fn parse_atom_feed(xml: &str) -> Result<Vec<Paper>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut papers = Vec::new();
    let mut entry: Option<EntryFields> = None;
    let mut in_author = false;
    let mut current_tag = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if tag == "entry" {
                    entry = Some(EntryFields::default());
                } else if entry.is_some() {
                    if tag == "author" {
                        in_author = true;
                    }
                    current_tag = tag;
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(target) = entry
                    .as_mut()
                    .and_then(|fields| fields.text_target(&current_tag, in_author))
                {
                    let text = e.unescape().map_err(|err| {
                        SourceError::Parse(format!("bad text in arXiv feed: {}", err))
                    })?;
                    target.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if tag == "entry" {
                    if let Some(paper) = entry.take().and_then(EntryFields::into_paper) {
                        papers.push(paper);
                    }
                    in_author = false;
                } else if tag == "author" && in_author {
                    in_author = false;
                    if let Some(fields) = entry.as_mut() {
                        let name = collapse_whitespace(&fields.author_name);
                        let affiliation = collapse_whitespace(&fields.author_affiliation);
                        if !name.is_empty() {
                            fields.authors.push(Author {
                                name,
                                affiliation: (!affiliation.is_empty()).then_some(affiliation),
                            });
                        }
                        fields.author_name.clear();
                        fields.author_affiliation.clear();
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <id>http://arxiv.org/api/feed-id</id>
  <title>ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <title>Attention Is All
      You Need</title>
    <summary>  The dominant sequence transduction models are based on
      complex recurrent networks.  </summary>
    <published>2017-06-12T17:57:34Z</published>
    <author><name>Ashish Vaswani</name><arxiv:affiliation>Google Brain</arxiv:affiliation></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:doi>10.48550/arXiv.1706.03762</arxiv:doi>
    <arxiv:journal_ref>NeurIPS 2017</arxiv:journal_ref>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9711200v3</id>
    <title>The Large N Limit of Superconformal Field Theories</title>
    <published>1997-11-27T00:00:00Z</published>
    <author><name>Juan Maldacena</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_atom_feed() {
        let papers = parse_atom_feed(SAMPLE_ATOM).unwrap();
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(p.id, "1706.03762v7");
        assert_eq!(p.title, "Attention Is All You Need");
        assert_eq!(
            p.abstract_text.as_deref(),
            Some("The dominant sequence transduction models are based on complex recurrent networks.")
        );
        assert_eq!(p.year, Some(2017));
        assert_eq!(p.authors.len(), 2);
        assert_eq!(p.authors[0].affiliation.as_deref(), Some("Google Brain"));
        assert_eq!(p.authors[1].affiliation, None);
        assert_eq!(p.source_ids.doi.as_deref(), Some("10.48550/arXiv.1706.03762"));
        assert_eq!(p.venue.as_deref(), Some("NeurIPS 2017"));
        assert_eq!(p.metadata.pdf_url.as_deref(), Some("https://arxiv.org/pdf/1706.03762v7.pdf"));

        let old_style = &papers[1];
        assert_eq!(old_style.source_ids.arxiv_id.as_deref(), Some("hep-th/9711200v3"));
        assert_eq!(old_style.abstract_text, None);
    }

    #[test]
    fn test_unversioned_id_urls() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>http://arxiv.org/abs/1706.03762</id>
            <title>Attention Is All You Need</title>
        </entry></feed>"#;
        let papers = parse_atom_feed(xml).unwrap();
        let p = &papers[0];
        assert_eq!(p.source_ids.arxiv_id.as_deref(), Some("1706.03762"));
        assert_eq!(p.metadata.pdf_url.as_deref(), Some("https://arxiv.org/pdf/1706.03762.pdf"));
        assert_eq!(p.metadata.url.as_deref(), Some("https://arxiv.org/abs/1706.03762"));
        assert_eq!(p.year, None);
    }

    #[test]
    fn test_error_entry_skipped() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>http://arxiv.org/api/errors#incorrect_id_format</id>
            <title>Error</title>
        </entry></feed>"#;
        assert!(parse_atom_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml_is_error() {
        let xml = "<feed><entry><id>http://arxiv.org/abs/1</title></entry></feed>";
        assert!(matches!(parse_atom_feed(xml), Err(SourceError::Parse(_))));
    }

    #[test]
    fn test_search_query_joins_terms() {
        assert_eq!(search_query("transformer  attention"), "all:transformer AND attention");
    }
}
