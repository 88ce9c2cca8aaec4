use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::apis::{Paper, PaperSource, SourceKind};
use crate::error::SearchError;
use crate::filter::{apply_filters, rank_by_citations, SearchFilters};
use crate::reconcile::reconcile;
use crate::summary::{SummaryBackfill, TldrBackfill};

pub const DEFAULT_MAX_RESULTS: u32 = 20;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<SearchFilters>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    /// Per-source result count; absent or zero means the default.
    pub fn effective_max_results(&self) -> u32 {
        match self.max_results {
            Some(n) if n > 0 => n,
            _ => DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub papers: Vec<Paper>,
    pub total_results: usize,
    pub query: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Records gathered from one fan-out, in adapter invocation order.
#[derive(Debug, Default)]
pub struct FanOutOutcome {
    pub papers: Vec<Paper>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Keep the adapters named in `names`, in their configured order. `None`
/// selects every adapter; unknown names are logged and skipped.
pub fn select_sources(
    sources: &[Arc<dyn PaperSource>],
    names: Option<&[String]>,
) -> Vec<Arc<dyn PaperSource>> {
    let Some(names) = names else {
        return sources.to_vec();
    };

    let mut wanted = BTreeSet::new();
    for name in names {
        match name.parse::<SourceKind>() {
            Ok(kind) => {
                wanted.insert(kind);
            }
            Err(e) => tracing::warn!(source = %name, "Ignoring source filter entry: {}", e),
        }
    }

    sources
        .iter()
        .filter(|s| wanted.contains(&s.kind()))
        .cloned()
        .collect()
}

/// Query every adapter at once and wait for all of them. Each call is cut
/// off at `deadline`; a failed or late adapter contributes nothing.
pub async fn fan_out(
    sources: &[Arc<dyn PaperSource>],
    query: &str,
    max_results: u32,
    deadline: Instant,
) -> FanOutOutcome {
    let calls = sources.iter().map(|source| async move {
        let started = Instant::now();
        match tokio::time::timeout_at(deadline, source.search(query, max_results)).await {
            Ok(Ok(papers)) => {
                tracing::info!(
                    source = source.name(),
                    count = papers.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Source search finished"
                );
                Some(papers)
            }
            Ok(Err(e)) => {
                tracing::warn!(source = source.name(), error = %e, "Source search failed");
                None
            }
            Err(_) => {
                tracing::warn!(source = source.name(), "Source search hit the request deadline");
                None
            }
        }
    });

    let mut outcome = FanOutOutcome::default();
    for result in join_all(calls).await {
        match result {
            Some(papers) => {
                outcome.succeeded += 1;
                outcome.papers.extend(papers);
            }
            None => outcome.failed += 1,
        }
    }
    outcome
}

/// The full pipeline: validate, fan out, reconcile, filter and rank, then
/// backfill summaries.
pub struct PaperSearch {
    sources: Vec<Arc<dyn PaperSource>>,
    backfill: Arc<dyn SummaryBackfill>,
    timeout: Duration,
}

impl PaperSearch {
    pub fn new(sources: Vec<Arc<dyn PaperSource>>) -> Self {
        Self {
            sources,
            backfill: Arc::new(TldrBackfill::default()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_backfill(mut self, backfill: Arc<dyn SummaryBackfill>) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sources(&self) -> &[Arc<dyn PaperSource>] {
        &self.sources
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let deadline = Instant::now() + self.timeout;
        let filters = request.filters.clone().unwrap_or_default();
        let selected = select_sources(&self.sources, filters.sources.as_deref());
        let max_results = request.effective_max_results();

        tracing::info!(
            query,
            max_results,
            sources = ?selected.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Starting federated search"
        );

        let outcome = fan_out(&selected, query, max_results, deadline).await;
        if outcome.succeeded == 0 && outcome.failed > 0 {
            return Err(SearchError::AllSourcesFailed { failed: outcome.failed });
        }

        let candidates = outcome.papers.len();
        let mut papers = apply_filters(reconcile(outcome.papers), &filters);
        rank_by_citations(&mut papers);

        if tokio::time::timeout_at(deadline, self.backfill.backfill(&mut papers))
            .await
            .is_err()
        {
            tracing::warn!("Summary backfill hit the request deadline");
        }

        tracing::info!(
            candidates,
            returned = papers.len(),
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "Federated search complete"
        );

        Ok(SearchResponse {
            total_results: papers.len(),
            papers,
            query: request.query.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}
