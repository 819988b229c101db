use crate::config::ScopeRules;
use crate::utils::path_extension;
use regex::Regex;
use url::Url;

/// Compiled form of [`ScopeRules`] deciding which discovered links may be crawled
#[derive(Debug)]
pub struct ScopeFilter {
    rules: ScopeRules,
    deny_extensions: Vec<String>,
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self {
            deny_extensions: normalize_extensions(&ScopeRules::default().deny_extensions),
            rules: ScopeRules::default(),
            include_regexes: Vec::new(),
            exclude_regexes: Vec::new(),
        }
    }
}

impl ScopeFilter {
    /// Create a new scope filter from configuration
    pub fn new(rules: ScopeRules) -> Result<Self, regex::Error> {
        // Compile regex patterns
        let mut include_regexes = Vec::with_capacity(rules.include_patterns.len());
        for pattern in &rules.include_patterns {
            include_regexes.push(Regex::new(pattern)?);
        }

        let mut exclude_regexes = Vec::with_capacity(rules.exclude_patterns.len());
        for pattern in &rules.exclude_patterns {
            exclude_regexes.push(Regex::new(pattern)?);
        }

        Ok(Self {
            deny_extensions: normalize_extensions(&rules.deny_extensions),
            rules,
            include_regexes,
            exclude_regexes,
        })
    }

    /// Determine if a link found on `page_url` should be crawled
    pub fn should_crawl(&self, url: &Url, page_url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        if self.rules.same_origin_only && url.origin() != page_url.origin() {
            return false;
        }

        if !self.is_in_prefix_scope(url) {
            return false;
        }

        if let Some(ext) = path_extension(url) {
            if self.deny_extensions.contains(&ext) {
                return false;
            }
        }

        // Check regex exclusions (these take precedence)
        let url_str = url.as_str();
        if self.exclude_regexes.iter().any(|regex| regex.is_match(url_str)) {
            return false;
        }

        // If include patterns are specified, at least one must match
        self.include_regexes.is_empty()
            || self.include_regexes.iter().any(|regex| regex.is_match(url_str))
    }

    /// Prefixes containing a scheme are matched against the whole URL, others against the path
    fn is_in_prefix_scope(&self, url: &Url) -> bool {
        if self.rules.allow_prefixes.is_empty() {
            return true;
        }
        self.rules.allow_prefixes.iter().any(|prefix| {
            if prefix.contains("://") {
                url.as_str().starts_with(prefix.as_str())
            } else {
                url.path().starts_with(prefix.as_str())
            }
        })
    }
}

fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn rules() -> ScopeRules {
        ScopeRules {
            same_origin_only: false,
            allow_prefixes: vec![],
            deny_extensions: vec![],
            include_patterns: vec![],
            exclude_patterns: vec![],
        }
    }

    #[test]
    fn test_default_filter() {
        let filter = ScopeFilter::default();
        let page = url("https://example.com/index");

        // Common file types should be excluded
        assert!(!filter.should_crawl(&url("https://example.com/image.jpg"), &page));

        // Same-origin pages are allowed, other hosts are not
        assert!(filter.should_crawl(&url("https://example.com/page.html"), &page));
        assert!(!filter.should_crawl(&url("https://other.com/page.html"), &page));

        // Non-web schemes never pass
        assert!(!filter.should_crawl(&url("mailto:someone@example.com"), &page));
    }

    #[test]
    fn test_same_origin_compares_scheme_and_port() {
        let filter = ScopeFilter::new(ScopeRules {
            same_origin_only: true,
            ..rules()
        })
        .unwrap();
        let page = url("https://example.com/");

        assert!(filter.should_crawl(&url("https://EXAMPLE.com/a"), &page));
        assert!(!filter.should_crawl(&url("http://example.com/a"), &page));
        assert!(!filter.should_crawl(&url("https://example.com:8443/a"), &page));
        assert!(!filter.should_crawl(&url("https://sub.example.com/a"), &page));
    }

    #[test]
    fn test_prefix_restriction() {
        let filter = ScopeFilter::new(ScopeRules {
            allow_prefixes: vec!["/docs".to_string(), "https://blog.example.com/posts".to_string()],
            ..rules()
        })
        .unwrap();
        let page = url("https://example.com/");

        assert!(filter.should_crawl(&url("https://example.com/docs/page"), &page));
        assert!(filter.should_crawl(&url("https://blog.example.com/posts/1"), &page));
        assert!(!filter.should_crawl(&url("https://example.com/blog/post"), &page));
        assert!(!filter.should_crawl(&url("https://blog.example.com/about"), &page));
    }

    #[test]
    fn test_deny_extensions_ignore_case_and_dot() {
        let filter = ScopeFilter::new(ScopeRules {
            deny_extensions: vec![".PDF".to_string(), "zip".to_string()],
            ..rules()
        })
        .unwrap();
        let page = url("https://example.com/");

        assert!(!filter.should_crawl(&url("https://example.com/report.pdf"), &page));
        assert!(!filter.should_crawl(&url("https://example.com/a/archive.ZIP?dl=1"), &page));
        assert!(filter.should_crawl(&url("https://example.com/report.html"), &page));
    }

    #[test]
    fn test_regex_patterns() {
        let filter = ScopeFilter::new(ScopeRules {
            include_patterns: vec![r"/docs/.*\.html$".to_string()],
            exclude_patterns: vec![r"/docs/draft/".to_string()],
            ..rules()
        })
        .unwrap();
        let page = url("https://example.com/");

        // Matching include pattern should be allowed
        assert!(filter.should_crawl(&url("https://example.com/docs/page.html"), &page));

        // Non-matching include pattern should be excluded
        assert!(!filter.should_crawl(&url("https://example.com/docs/page.txt"), &page));

        // Matching exclude pattern should be excluded even if it matches include
        assert!(!filter.should_crawl(&url("https://example.com/docs/draft/page.html"), &page));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = ScopeFilter::new(ScopeRules {
            exclude_patterns: vec!["(".to_string()],
            ..rules()
        });
        assert!(result.is_err());
    }
}
