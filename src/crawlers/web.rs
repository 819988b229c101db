//! WebDriver-backed renderer.
//!
//! Each session is one browser driven through a WebDriver server (ChromeDriver,
//! geckodriver, WebKitWebDriver). Pages are loaded, given time for client-side
//! script to settle, optionally scrolled to trigger lazy content, and serialized.
//! Lost sessions are replaced once per page before the page is reported failed.
//!
//! Uncaught page errors are collected from the moment the document is ready until
//! it is serialized; any such error fails the page with `ScriptError`. WebDriver
//! offers no hook before the first script runs, so errors thrown while the
//! document is still loading only surface when they break our own commands.

use crate::config::{Engine, RenderOptions};
use crate::crawlers::crawler::{RenderSession, Renderer};
use crate::results::{FailureCause, RenderFailure, RenderedPage};
use crate::CrawlError;
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// Interval between `document.readyState` polls
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

const READY_STATE_SCRIPT: &str = "return document.readyState";
const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body ? document.body.scrollHeight : 0);";

const INSTALL_ERROR_COLLECTOR_SCRIPT: &str = r#"
if (!window.__renderCrawlErrors) {
    window.__renderCrawlErrors = [];
    window.addEventListener('error', function (e) {
        window.__renderCrawlErrors.push(String(e.message || e));
    });
    window.addEventListener('unhandledrejection', function (e) {
        window.__renderCrawlErrors.push('Unhandled rejection: ' + String(e.reason));
    });
}
"#;
const READ_ERRORS_SCRIPT: &str = "return window.__renderCrawlErrors || [];";

/// Opens browser sessions against a WebDriver server
#[derive(Debug, Clone)]
pub struct WebDriverRenderer {
    options: RenderOptions,
}

impl WebDriverRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    type Session = WebDriverSession;

    async fn open_session(&self) -> Result<Self::Session, CrawlError> {
        let client = connect(&self.options).await?;
        Ok(WebDriverSession {
            client,
            options: self.options.clone(),
        })
    }
}

/// Page-load and script timeout handed to the driver.
///
/// Kept below the render timeout so the driver abandons a hung navigation before
/// the next page is sent to the same session.
pub fn driver_timeout_ms(options: &RenderOptions) -> u64 {
    (options.timeout_ms - options.timeout_ms / 10).max(1)
}

/// Browser capabilities for the configured engine
pub fn capabilities(options: &RenderOptions) -> Map<String, Value> {
    let mut caps = Map::new();
    let driver_timeout = driver_timeout_ms(options);
    caps.insert(
        "timeouts".to_string(),
        json!({ "pageLoad": driver_timeout, "script": driver_timeout }),
    );
    match options.engine {
        Engine::Chromium => {
            let mut args = vec!["--disable-gpu", "--no-sandbox"];
            if options.headless {
                args.push("--headless=new");
            }
            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
        Engine::Firefox => {
            let args: Vec<&str> = if options.headless { vec!["-headless"] } else { vec![] };
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
        Engine::Webkit => {
            let mut args = vec!["--automation"];
            if options.headless {
                args.push("--headless");
            }
            caps.insert("webkitgtk:browserOptions".to_string(), json!({ "args": args }));
        }
    }
    caps
}

async fn connect(options: &RenderOptions) -> Result<Client, CrawlError> {
    let mut builder = ClientBuilder::native();
    builder.capabilities(capabilities(options));

    match builder.connect(&options.webdriver_url).await {
        Ok(client) => {
            ::log::debug!(
                "Connected to WebDriver at {} ({:?})",
                options.webdriver_url,
                options.engine
            );
            Ok(client)
        }
        Err(e) => {
            ::log::error!(
                "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
            );
            Err(CrawlError::SessionStart {
                endpoint: options.webdriver_url.clone(),
                reason: e.to_string(),
            })
        }
    }
}

/// Why a single render attempt stopped
enum StepError {
    /// A WebDriver command failed during the named step
    Command { step: &'static str, error: CmdError },
    /// The page's own scripts threw after the document was ready
    PageScript(Vec<String>),
}

impl StepError {
    fn at(step: &'static str) -> impl FnOnce(CmdError) -> StepError {
        move |error| StepError::Command { step, error }
    }

    fn step(&self) -> &'static str {
        match self {
            StepError::Command { step, .. } => *step,
            StepError::PageScript(_) => "running page scripts",
        }
    }

    fn session_lost(&self) -> bool {
        match self {
            StepError::Command { error, .. } => {
                let message = error.to_string();
                message.contains("Unable to find session") || message.contains("invalid session id")
            }
            StepError::PageScript(_) => false,
        }
    }

    fn into_failure(self, url: &Url) -> RenderFailure {
        match self {
            StepError::Command { step, error } => {
                RenderFailure::new(url, classify(&error), format!("{}: {}", step, error))
            }
            StepError::PageScript(errors) => RenderFailure::new(
                url,
                FailureCause::Script,
                format!("page script threw: {}", errors.join("; ")),
            ),
        }
    }
}

/// Error messages recorded by the injected collector
fn page_errors(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.as_str())
                .map(|e| e.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Map a WebDriver error onto the per-page failure taxonomy
pub fn classify(error: &CmdError) -> FailureCause {
    classify_message(&error.to_string())
}

fn classify_message(message: &str) -> FailureCause {
    let message = message.to_ascii_lowercase();
    if message.contains("javascript error") || message.contains("unexpected alert") {
        FailureCause::Script
    } else if message.contains("timeout") || message.contains("timed out") {
        FailureCause::Timeout
    } else {
        FailureCause::Network
    }
}

/// One browser session, owned by a single worker
pub struct WebDriverSession {
    client: Client,
    options: RenderOptions,
}

impl WebDriverSession {
    async fn render_once(&self, url: &Url) -> Result<RenderedPage, StepError> {
        self.client
            .goto(url.as_str())
            .await
            .map_err(StepError::at("navigating"))?;

        self.wait_until_ready().await?;
        self.client
            .execute(INSTALL_ERROR_COLLECTOR_SCRIPT, vec![])
            .await
            .map_err(StepError::at("installing error collector"))?;
        sleep(self.options.settle_delay()).await;

        for _ in 0..self.options.scrolls {
            self.client
                .execute(SCROLL_SCRIPT, vec![])
                .await
                .map_err(StepError::at("scrolling"))?;
            sleep(self.options.settle_delay()).await;
        }

        let errors = self
            .client
            .execute(READ_ERRORS_SCRIPT, vec![])
            .await
            .map_err(StepError::at("reading page errors"))?;
        let errors = page_errors(&errors);
        if !errors.is_empty() {
            return Err(StepError::PageScript(errors));
        }

        let final_url = self
            .client
            .current_url()
            .await
            .map_err(StepError::at("reading final URL"))?;
        let html = self
            .client
            .source()
            .await
            .map_err(StepError::at("getting source"))?;

        Ok(RenderedPage::new(url.clone(), final_url, html))
    }

    /// Poll until the document reports `complete`; the caller bounds the wait
    async fn wait_until_ready(&self) -> Result<(), StepError> {
        loop {
            let state = self
                .client
                .execute(READY_STATE_SCRIPT, vec![])
                .await
                .map_err(StepError::at("waiting for document"))?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Replace a session the WebDriver server no longer knows about
    async fn reconnect(&mut self) -> bool {
        ::log::warn!("Attempting to reconnect WebDriver session");
        match connect(&self.options).await {
            Ok(client) => {
                let stale = std::mem::replace(&mut self.client, client);
                if let Err(e) = stale.close().await {
                    ::log::debug!("Closing lost session failed: {}", e);
                }
                ::log::info!("Successfully reconnected to WebDriver");
                true
            }
            Err(e) => {
                ::log::error!("Failed to reconnect to WebDriver: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl RenderSession for WebDriverSession {
    /// Unbounded on its own: the controller wraps every call in the render timeout.
    async fn render(&mut self, url: &Url) -> Result<RenderedPage, RenderFailure> {
        let started = std::time::Instant::now();
        ::log::debug!("RENDER: {}", url);

        let mut reconnected = false;
        loop {
            let error = match self.render_once(url).await {
                Ok(page) => {
                    ::log::debug!(
                        "Rendered {} in {:.2} seconds",
                        url,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(page);
                }
                Err(error) => error,
            };

            if !reconnected && error.session_lost() {
                ::log::warn!("Lost session while {} {}", error.step(), url);
                reconnected = true;
                if self.reconnect().await {
                    continue;
                }
            }
            return Err(error.into_failure(url));
        }
    }

    async fn close(self) {
        if let Err(e) = self.client.close().await {
            ::log::warn!("Failed to close browser session: {}", e);
        }
    }
}
