use crate::config::{FollowMode, ScopeRules};
use crate::filter::ScopeFilter;
use crate::parsers::html::parse_selector;
use crate::results::RenderedPage;
use crate::CrawlError;
use scraper::{Html, Selector};
use url::Url;

/// Chooses which links on a rendered page are worth crawling next
pub struct LinkPolicy {
    selector: Selector,
    filter: ScopeFilter,
    follow: FollowMode,
}

impl LinkPolicy {
    pub fn new(link_selector: &str, scope: &ScopeRules, follow: FollowMode) -> Result<Self, CrawlError> {
        Ok(Self {
            selector: parse_selector("links", link_selector)?,
            filter: ScopeFilter::new(scope.clone())?,
            follow,
        })
    }

    pub fn next_links(&self, page: &RenderedPage) -> Vec<Url> {
        let doc = Html::parse_document(&page.html);
        self.next_links_in(&doc, &page.final_url)
    }

    /// In-scope absolute links in document order; duplicates are left for the frontier
    pub fn next_links_in(&self, doc: &Html, base: &Url) -> Vec<Url> {
        let candidates = doc
            .select(&self.selector)
            .filter_map(|element| element.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .filter_map(|href| match base.join(href) {
                Ok(resolved) => Some(resolved),
                Err(e) => {
                    ::log::debug!("Skipping unresolvable link {:?} on {}: {}", href, base, e);
                    None
                }
            })
            .filter(|resolved| {
                let keep = self.filter.should_crawl(resolved, base);
                if !keep {
                    ::log::trace!("Scope rejected: {}", resolved);
                }
                keep
            });

        let links: Vec<Url> = match self.follow {
            FollowMode::All => candidates.collect(),
            FollowMode::First => candidates.take(1).collect(),
        };

        ::log::debug!("Found {} in-scope links on {}", links.len(), base);
        links
    }
}
