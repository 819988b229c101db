use crate::crawlers::controller::CrawlState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// A fetched and rendered page, alive for a single crawl step
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL that was requested
    pub url: Url,

    /// URL the browser ended up on after redirects
    pub final_url: Url,

    /// Serialized DOM after client-side rendering
    pub html: String,
}

impl RenderedPage {
    pub fn new(url: Url, final_url: Url, html: String) -> Self {
        Self {
            url,
            final_url,
            html,
        }
    }
}

/// Why a page could not be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// DNS, connection or WebDriver transport failure
    Network,
    /// The page did not settle within the render budget
    Timeout,
    /// Script inside the page threw while rendering
    Script,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Network => write!(f, "NetworkError"),
            FailureCause::Timeout => write!(f, "RenderTimeout"),
            FailureCause::Script => write!(f, "ScriptError"),
        }
    }
}

/// A render that did not produce a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub url: Url,
    pub cause: FailureCause,
    pub message: String,
}

impl RenderFailure {
    pub fn new(url: &Url, cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            url: url.clone(),
            cause,
            message: message.into(),
        }
    }

    pub fn timeout(url: &Url) -> Self {
        Self::new(url, FailureCause::Timeout, "render did not finish in time")
    }
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rendering {}: {}", self.cause, self.url, self.message)
    }
}

/// Value extracted for one declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    All(Vec<String>),
}

/// Fields extracted from one successfully rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Final URL of the page the record came from
    pub url: String,

    /// Extracted values keyed by field name
    pub fields: BTreeMap<String, FieldValue>,
}

impl ExtractedRecord {
    pub fn new(url: String, fields: BTreeMap<String, FieldValue>) -> Self {
        Self { url, fields }
    }

    /// Value of a `single` field; `None` if the field is unknown or not single
    pub fn single(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Single(value)) => Some(value),
            _ => None,
        }
    }

    /// Values of an `all` field; `None` if the field is unknown or not `all`
    pub fn all(&self, name: &str) -> Option<&[String]> {
        match self.fields.get(name) {
            Some(FieldValue::All(values)) => Some(values),
            _ => None,
        }
    }
}

/// A page that was dequeued but could not be rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub url: String,
    pub cause: FailureCause,
    pub message: String,
}

impl From<RenderFailure> for PageFailure {
    fn from(failure: RenderFailure) -> Self {
        Self {
            url: failure.url.to_string(),
            cause: failure.cause,
            message: failure.message,
        }
    }
}

/// Summary returned when a crawl finishes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub state: CrawlState,
    pub pages_visited: usize,
    pub pages_succeeded: usize,
    pub failures: Vec<PageFailure>,
    pub records_emitted: usize,
    /// URLs left in the frontier when the crawl ended
    pub pending: usize,
}

impl CrawlReport {
    pub fn pages_failed(&self) -> usize {
        self.failures.len()
    }

    /// Failure counts per cause
    pub fn failures_by_cause(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.cause.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} visited, {} succeeded, {} failed, {} records emitted",
            self.state,
            self.pages_visited,
            self.pages_succeeded,
            self.pages_failed(),
            self.records_emitted
        )?;
        for (cause, count) in self.failures_by_cause() {
            write!(f, ", {} {}", count, cause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_flat_values() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), FieldValue::Single("Demo".to_string()));
        fields.insert(
            "paragraphs".to_string(),
            FieldValue::All(vec!["Hello".to_string(), "World".to_string()]),
        );
        let record = ExtractedRecord::new("https://example.com/".to_string(), fields);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fields"]["title"], "Demo");
        assert_eq!(json["fields"]["paragraphs"][1], "World");
        assert_eq!(record.single("title"), Some("Demo"));
        assert_eq!(record.all("title"), None);
        assert_eq!(record.all("paragraphs").map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_report_groups_failures() {
        let url = Url::parse("https://example.com/a").unwrap();
        let report = CrawlReport {
            state: CrawlState::Completed,
            pages_visited: 3,
            pages_succeeded: 1,
            failures: vec![
                RenderFailure::timeout(&url).into(),
                RenderFailure::new(&url, FailureCause::Network, "refused").into(),
            ],
            records_emitted: 1,
            pending: 0,
        };

        assert_eq!(report.pages_failed(), 2);
        let by_cause = report.failures_by_cause();
        assert_eq!(by_cause["RenderTimeout"], 1);
        assert_eq!(by_cause["NetworkError"], 1);
        assert_eq!(
            report.to_string(),
            "Completed: 3 visited, 1 succeeded, 2 failed, 1 records emitted, 1 NetworkError, 1 RenderTimeout"
        );
    }
}
