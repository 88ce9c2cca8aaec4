use thiserror::Error;

/// Request-level failures of a federated search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Query is required")]
    EmptyQuery,

    #[error("all {failed} selected sources failed")]
    AllSourcesFailed { failed: usize },
}

impl SearchError {
    /// Whether the caller, rather than the upstreams, is at fault.
    pub fn is_user_error(&self) -> bool {
        matches!(self, SearchError::EmptyQuery)
    }
}
