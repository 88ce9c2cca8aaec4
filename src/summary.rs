//! Summary backfill for papers that came back without an abstract.

use async_trait::async_trait;

use crate::apis::Paper;

/// Fills `generated_summary` on papers lacking an abstract. Works on a
/// slice: implementations can neither drop nor add entries.
#[async_trait]
pub trait SummaryBackfill: Send + Sync {
    async fn backfill(&self, papers: &mut [Paper]);
}

/// Leaves every paper untouched.
pub struct NoBackfill;

#[async_trait]
impl SummaryBackfill for NoBackfill {
    async fn backfill(&self, _papers: &mut [Paper]) {}
}

/// Builds summaries from metadata already on the record: the Semantic
/// Scholar TL;DR when present, else a one-line synopsis from venue, year
/// and the strongest OpenAlex concepts.
pub struct TldrBackfill {
    pub max_concepts: usize,
}

impl Default for TldrBackfill {
    fn default() -> Self {
        Self { max_concepts: 3 }
    }
}

impl TldrBackfill {
    fn summarize(&self, paper: &Paper) -> Option<String> {
        if let Some(tldr) = &paper.s2_tldr {
            return Some(tldr.clone());
        }

        let mut concepts: Vec<_> = paper.concepts.as_deref().unwrap_or(&[]).iter().collect();
        if concepts.is_empty() {
            return None;
        }
        concepts.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let topics: Vec<&str> = concepts
            .iter()
            .take(self.max_concepts)
            .map(|c| c.name.as_str())
            .filter(|n| !n.is_empty())
            .collect();
        if topics.is_empty() {
            return None;
        }

        let mut summary = String::from("Work");
        if let Some(venue) = &paper.venue {
            summary.push_str(&format!(" published in {}", venue));
        }
        if let Some(year) = paper.year {
            summary.push_str(&format!(" ({})", year));
        }
        summary.push_str(&format!(" on {}.", topics.join(", ")));
        Some(summary)
    }
}

#[async_trait]
impl SummaryBackfill for TldrBackfill {
    async fn backfill(&self, papers: &mut [Paper]) {
        let mut filled = 0usize;
        for paper in papers.iter_mut() {
            if paper.abstract_text.is_some() || paper.generated_summary.is_some() {
                continue;
            }
            if let Some(summary) = self.summarize(paper) {
                paper.generated_summary = Some(summary);
                filled += 1;
            }
        }
        tracing::debug!(filled, total = papers.len(), "Summary backfill done");
    }
}
