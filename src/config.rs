use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::apis::{self, PaperSource, SourceKind};
use crate::summary::{NoBackfill, SummaryBackfill, TldrBackfill};

pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 20;

/// How papers without an abstract get a `generatedSummary`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackfillMode {
    #[default]
    Tldr,
    None,
}

impl std::str::FromStr for BackfillMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tldr" => Ok(BackfillMode::Tldr),
            "none" | "off" => Ok(BackfillMode::None),
            other => Err(format!("unknown backfill mode: {}", other)),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub semantic_scholar_api_key: Option<String>,
    pub openalex_email: Option<String>,
    /// Lowercased source names from `PAPER_SEARCH_SOURCES`; empty enables all.
    pub enabled_source_names: Vec<String>,
    pub request_timeout: Duration,
    pub rate_limit_per_minute: u32,
    pub backfill: BackfillMode,
    pub crossref_url: String,
    pub arxiv_url: String,
    pub openalex_url: String,
    pub semantic_scholar_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            semantic_scholar_api_key: None,
            openalex_email: None,
            enabled_source_names: Vec::new(),
            request_timeout: crate::search::DEFAULT_TIMEOUT,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            backfill: BackfillMode::default(),
            crossref_url: apis::crossref::BASE_URL.to_string(),
            arxiv_url: apis::arxiv::BASE_URL.to_string(),
            openalex_url: apis::openalex::BASE_URL.to_string(),
            semantic_scholar_url: apis::semantic_scholar::BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self {
            semantic_scholar_api_key: non_empty_var("SEMANTIC_SCHOLAR_API_KEY"),
            openalex_email: non_empty_var("OPENALEX_EMAIL"),
            enabled_source_names: std::env::var("PAPER_SEARCH_SOURCES")
                .map(|s| parse_source_list(&s))
                .unwrap_or_default(),
            ..Self::default()
        };

        if let Some(secs) = non_empty_var("PAPER_SEARCH_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("PAPER_SEARCH_TIMEOUT_SECS is not a number: {}", secs))?;
            anyhow::ensure!(secs > 0, "PAPER_SEARCH_TIMEOUT_SECS must be positive");
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = non_empty_var("PAPER_SEARCH_RATE_LIMIT") {
            let limit: u32 = limit
                .parse()
                .with_context(|| format!("PAPER_SEARCH_RATE_LIMIT is not a number: {}", limit))?;
            anyhow::ensure!(limit > 0, "PAPER_SEARCH_RATE_LIMIT must be positive");
            config.rate_limit_per_minute = limit;
        }

        if let Some(mode) = non_empty_var("PAPER_SEARCH_BACKFILL") {
            config.backfill = mode
                .parse()
                .map_err(anyhow::Error::msg)
                .context("PAPER_SEARCH_BACKFILL must be `tldr` or `none`")?;
        }

        for name in &config.enabled_source_names {
            if name.parse::<SourceKind>().is_err() {
                tracing::warn!(source = %name, "PAPER_SEARCH_SOURCES names an unknown source");
            }
        }

        Ok(config)
    }

    /// Point every adapter at one mock server, with short timeouts.
    pub fn for_testing(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            request_timeout: Duration::from_secs(5),
            crossref_url: base_url.clone(),
            arxiv_url: base_url.clone(),
            openalex_url: base_url.clone(),
            semantic_scholar_url: base_url,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self, kind: SourceKind) -> bool {
        self.enabled_source_names.is_empty()
            || self.enabled_source_names.iter().any(|n| n == kind.as_str())
    }

    /// Build the enabled adapters, in fan-out order.
    pub fn build_sources(&self) -> anyhow::Result<Vec<Arc<dyn PaperSource>>> {
        let timeout = self.request_timeout;
        let mut sources: Vec<Arc<dyn PaperSource>> = Vec::new();

        for kind in SourceKind::ALL {
            if !self.is_enabled(kind) {
                continue;
            }
            let source: Arc<dyn PaperSource> = match kind {
                SourceKind::Crossref => {
                    Arc::new(apis::crossref::CrossRefClient::new(&self.crossref_url, timeout)?)
                }
                SourceKind::Arxiv => {
                    Arc::new(apis::arxiv::ArxivClient::new(&self.arxiv_url, timeout)?)
                }
                SourceKind::Openalex => Arc::new(apis::openalex::OpenAlexClient::new(
                    &self.openalex_url,
                    self.openalex_email.clone(),
                    timeout,
                )?),
                SourceKind::SemanticScholar => {
                    Arc::new(apis::semantic_scholar::SemanticScholarClient::new(
                        &self.semantic_scholar_url,
                        self.semantic_scholar_api_key.clone(),
                        timeout,
                    )?)
                }
            };
            sources.push(source);
        }

        Ok(sources)
    }

    pub fn build_backfill(&self) -> Arc<dyn SummaryBackfill> {
        match self.backfill {
            BackfillMode::Tldr => Arc::new(TldrBackfill::default()),
            BackfillMode::None => Arc::new(NoBackfill),
        }
    }

    /// Return a list of source status descriptions.
    pub fn source_status(&self) -> Vec<SourceStatus> {
        SourceKind::ALL
            .into_iter()
            .map(|kind| {
                let enabled = self.is_enabled(kind);
                let note = if !enabled {
                    "Disabled by PAPER_SEARCH_SOURCES filter".to_string()
                } else {
                    match kind {
                        SourceKind::SemanticScholar if self.semantic_scholar_api_key.is_some() => {
                            "API key set".into()
                        }
                        SourceKind::SemanticScholar => "No API key (rate limited, may refuse)".into(),
                        SourceKind::Openalex if self.openalex_email.is_some() => {
                            "Polite pool email set".into()
                        }
                        SourceKind::Openalex => "No email (common pool)".into(),
                        SourceKind::Arxiv => "Atom feed, no API key required".into(),
                        SourceKind::Crossref => "No API key required".into(),
                    }
                };
                SourceStatus { name: kind.as_str().to_string(), enabled, note }
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub enabled: bool,
    pub note: String,
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_source_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
