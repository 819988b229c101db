use crate::results::{RenderFailure, RenderedPage};
use crate::CrawlError;
use async_trait::async_trait;
use url::Url;

/// Source of browser sessions.
///
/// The controller opens one session per worker before the crawl starts; an error
/// here is a setup failure and fails the whole crawl.
#[async_trait]
pub trait Renderer: Send + Sync {
    type Session: RenderSession;

    async fn open_session(&self) -> Result<Self::Session, CrawlError>;
}

/// A live browser session owned by exactly one worker
#[async_trait]
pub trait RenderSession: Send {
    /// Fetch `url`, let client-side script run until the page settles, and serialize the DOM
    async fn render(&mut self, url: &Url) -> Result<RenderedPage, RenderFailure>;

    /// Release the session. Called on every worker exit path.
    async fn close(self);
}
