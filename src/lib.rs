//! Federated academic paper search.
//!
//! A query fans out to CrossRef, arXiv, OpenAlex and Semantic Scholar; the
//! records that come back are reconciled into one canonical entry per work,
//! filtered, ranked by citation count and, where no abstract exists, given a
//! generated summary.

pub mod apis;
pub mod config;
pub mod error;
pub mod filter;
pub mod reconcile;
pub mod search;
pub mod server;
pub mod summary;

pub use apis::{Paper, PaperSource, SourceError, SourceKind};
pub use config::Config;
pub use error::SearchError;
pub use search::{PaperSearch, SearchRequest, SearchResponse};
