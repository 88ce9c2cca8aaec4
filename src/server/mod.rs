pub mod http;
pub mod mcp;

pub use http::AppState;
pub use mcp::PaperSearchServer;
