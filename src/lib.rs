// Re-export modules
pub mod config;
pub mod crawlers;
pub mod filter;
pub mod frontier;
pub mod parsers;
pub mod results;
pub mod sink;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{Cardinality, CrawlConfig, Engine, FieldSpec, FollowMode, RenderOptions, ScopeRules};
pub use crawlers::controller::{CrawlState, Crawler};
pub use crawlers::crawler::{RenderSession, Renderer};
pub use crawlers::web::WebDriverRenderer;
pub use frontier::{CrawlTarget, Frontier};
pub use results::{
    CrawlReport, ExtractedRecord, FailureCause, FieldValue, PageFailure, RenderFailure,
    RenderedPage,
};
pub use sink::RecordSink;

use thiserror::Error;

/// Setup-time errors. A crawl that hits one of these never starts and ends in
/// [`CrawlState::Failed`]; per-page problems are [`RenderFailure`]s instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid seed URL {url}: {reason}")]
    InvalidSeed { url: String, reason: String },

    #[error("Invalid selector for {name}: {selector}")]
    InvalidSelector { name: String, selector: String },

    #[error("Invalid URL pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start browser session at {endpoint}: {reason}")]
    SessionStart { endpoint: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrawlError {
    pub fn config(message: impl Into<String>) -> Self {
        CrawlError::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
