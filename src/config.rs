use crate::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Configuration for a crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlConfig {
    /// URLs to start crawling from
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Fields to pull out of every rendered page, keyed by field name
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,

    /// Which discovered links are eligible for crawling
    #[serde(default)]
    pub scope: ScopeRules,

    /// CSS selector for elements carrying outbound links
    #[serde(default = "default_link_selector")]
    pub link_selector: String,

    /// Whether to follow every in-scope link or only the first one
    #[serde(default)]
    pub follow: FollowMode,

    /// Rendering engine options
    #[serde(default)]
    pub render: RenderOptions,

    /// Number of concurrent workers, each holding one browser session
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Stop after this many pages have been dequeued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,

    /// Stop before visiting anything more than this many hops from a seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

/// How a single field is extracted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// CSS selector evaluated against the rendered document
    pub selector: String,

    #[serde(default)]
    pub cardinality: Cardinality,

    /// Read this attribute instead of the element text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl FieldSpec {
    pub fn single(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            cardinality: Cardinality::Single,
            attribute: None,
        }
    }

    pub fn all(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            cardinality: Cardinality::All,
            attribute: None,
        }
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// First match, or an empty string
    #[default]
    Single,
    /// Every match in document order
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FollowMode {
    /// Enqueue every in-scope link on the page
    #[default]
    All,
    /// Enqueue only the first in-scope link ("next page" crawling)
    First,
}

/// Filters restricting which discovered links are crawled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRules {
    /// Only follow links with the same scheme, host and port as the page they were found on
    #[serde(default = "default_same_origin_only")]
    pub same_origin_only: bool,

    /// Path prefixes (or full URL prefixes) a link must start with; empty allows everything
    #[serde(default)]
    pub allow_prefixes: Vec<String>,

    /// File extensions that are never crawled
    #[serde(default = "default_deny_extensions")]
    pub deny_extensions: Vec<String>,

    /// Regex patterns for URLs to include (if empty, all URLs are included unless excluded)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude (these take precedence over include patterns)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for ScopeRules {
    fn default() -> Self {
        Self {
            same_origin_only: default_same_origin_only(),
            allow_prefixes: Vec::new(),
            deny_extensions: default_deny_extensions(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

/// Options for the rendering engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    #[serde(default)]
    pub engine: Engine,

    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Wait after the document reports ready, and after every scroll pass
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Scroll-to-bottom passes to trigger lazily loaded content
    #[serde(default)]
    pub scrolls: u32,

    /// Upper bound for a whole render, navigation included
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            engine: Engine::default(),
            headless: default_headless(),
            settle_delay_ms: default_settle_delay_ms(),
            scrolls: 0,
            timeout_ms: default_timeout_ms(),
            webdriver_url: default_webdriver_url(),
        }
    }
}

impl RenderOptions {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

fn default_max_concurrency() -> usize {
    1
}

fn default_same_origin_only() -> bool {
    true
}

fn default_deny_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "png", "gif", "css", "js", "ico", "svg", "woff", "woff2", "ttf", "eot",
        "pdf", "zip",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}

fn default_headless() -> bool {
    true
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    45_000
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            fields: BTreeMap::new(),
            scope: ScopeRules::default(),
            link_selector: default_link_selector(),
            follow: FollowMode::default(),
            render: RenderOptions::default(),
            max_concurrency: default_max_concurrency(),
            max_pages: None,
            max_depth: None,
        }
    }
}

impl CrawlConfig {
    /// Create a configuration with default values for the given seeds
    pub fn new<S: AsRef<str>>(seeds: &[S]) -> Self {
        Self {
            seeds: seeds.iter().map(|s| s.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_field(mut self, name: &str, spec: FieldSpec) -> Self {
        self.fields.insert(name.to_string(), spec);
        self
    }

    pub fn with_scope(mut self, scope: ScopeRules) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_follow(mut self, follow: FollowMode) -> Self {
        self.follow = follow;
        self
    }

    pub fn with_render(mut self, render: RenderOptions) -> Self {
        self.render = render;
        self
    }

    pub fn with_max_concurrency(mut self, value: usize) -> Self {
        self.max_concurrency = value;
        self
    }

    pub fn with_max_pages(mut self, value: usize) -> Self {
        self.max_pages = Some(value);
        self
    }

    pub fn with_max_depth(mut self, value: usize) -> Self {
        self.max_depth = Some(value);
        self
    }

    /// Parse the seeds into absolute http(s) URLs
    pub fn seed_urls(&self) -> Result<Vec<Url>> {
        self.seeds.iter().map(|seed| parse_seed(seed)).collect()
    }

    /// Check everything that can be checked before a browser is started
    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(CrawlError::config("at least one seed URL is required"));
        }
        self.seed_urls()?;

        if self.max_concurrency == 0 {
            return Err(CrawlError::config("maxConcurrency must be at least 1"));
        }
        if self.render.timeout_ms == 0 {
            return Err(CrawlError::config("render.timeoutMs must be greater than 0"));
        }
        if Url::parse(&self.render.webdriver_url).is_err() {
            return Err(CrawlError::config(format!(
                "render.webdriverUrl is not a URL: {}",
                self.render.webdriver_url
            )));
        }
        Ok(())
    }
}

fn parse_seed(seed: &str) -> Result<Url> {
    let url = Url::parse(seed).map_err(|e| CrawlError::InvalidSeed {
        url: seed.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(CrawlError::InvalidSeed {
            url: seed.to_string(),
            reason: format!("unsupported scheme {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_with_defaults() {
        let config = CrawlConfig::from_json(
            r#"{
                "seeds": ["https://example.com/dynamic-page"],
                "fields": {
                    "title": { "selector": "title" },
                    "paragraphs": { "selector": "p", "cardinality": "all" }
                },
                "scope": { "sameOriginOnly": true, "allowPrefixes": ["/docs"], "denyExtensions": ["pdf"] },
                "render": { "engine": "firefox", "headless": false, "settleDelayMs": 250 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.seeds, vec!["https://example.com/dynamic-page"]);
        assert_eq!(config.fields["title"], FieldSpec::single("title"));
        assert_eq!(config.fields["paragraphs"], FieldSpec::all("p"));
        assert_eq!(config.scope.allow_prefixes, vec!["/docs"]);
        assert_eq!(config.scope.deny_extensions, vec!["pdf"]);
        assert_eq!(config.render.engine, Engine::Firefox);
        assert!(!config.render.headless);
        assert_eq!(config.render.settle_delay(), Duration::from_millis(250));
        assert_eq!(config.render.webdriver_url, "http://localhost:4444");
        assert_eq!(config.link_selector, "a[href]");
        assert_eq!(config.follow, FollowMode::All);
        assert_eq!(config.max_concurrency, 1);
        assert!(config.max_pages.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_seeds() {
        let config = CrawlConfig::new(&["not a url"]);
        assert!(matches!(
            config.validate(),
            Err(CrawlError::InvalidSeed { .. })
        ));

        let config = CrawlConfig::new(&["ftp://example.com/file"]);
        assert!(matches!(
            config.validate(),
            Err(CrawlError::InvalidSeed { .. })
        ));

        let config = CrawlConfig::new::<&str>(&[]);
        assert!(matches!(config.validate(), Err(CrawlError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = CrawlConfig::new(&["https://example.com"]).with_max_concurrency(0);
        assert!(matches!(config.validate(), Err(CrawlError::Config(_))));
    }
}
