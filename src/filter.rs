use serde::{Deserialize, Serialize};

use crate::apis::Paper;

/// Optional constraints supplied with a search request. All present
/// constraints must hold for a paper to be kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    /// Restrict the fan-out to these sources (default: all).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_citations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open_access_only: Option<bool>,
}

impl SearchFilters {
    /// Papers without a year pass both year bounds; a missing citation
    /// count counts as zero.
    pub fn admits(&self, paper: &Paper) -> bool {
        if let (Some(min), Some(year)) = (self.min_year, paper.year) {
            if year < min {
                return false;
            }
        }
        if let (Some(max), Some(year)) = (self.max_year, paper.year) {
            if year > max {
                return false;
            }
        }
        if let Some(min) = self.min_citations {
            if paper.citations() < min {
                return false;
            }
        }
        if self.is_open_access_only == Some(true) && !paper.is_open_access() {
            return false;
        }
        true
    }
}

pub fn apply_filters(papers: Vec<Paper>, filters: &SearchFilters) -> Vec<Paper> {
    papers.into_iter().filter(|p| filters.admits(p)).collect()
}

/// Citation count descending. `sort_by` is stable, so ties keep merge order.
pub fn rank_by_citations(papers: &mut [Paper]) {
    papers.sort_by(|a, b| b.citations().cmp(&a.citations()));
}
