//! Breadth-first crawl frontier.
//!
//! Holds the URLs waiting to be visited and the ones already dequeued. Every
//! check-and-insert and every pop-and-mark-visited happens under one lock, so
//! concurrent workers can share a single `Frontier` without ever visiting a URL
//! twice.

use crate::utils::normalize_url;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use url::Url;

/// A URL waiting to be crawled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    /// URL to render: the first form offered, without its fragment
    pub url: Url,

    /// Number of hops from the seed that led here
    pub depth: usize,
}

/// Limits that end a crawl while work is still pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    /// Most targets ever handed out
    pub max_pages: Option<usize>,
    /// Deepest target handed out
    pub max_depth: Option<usize>,
}

/// Result of asking the frontier for work
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue {
    /// A target, now marked visited and counted as in flight
    Target(CrawlTarget),
    /// Nothing pending right now
    Empty,
    /// `max_pages` targets were already handed out; the rest stay pending
    PageLimit,
    /// The next target lies deeper than `max_depth`; it stays pending
    DepthExceeded,
}

#[derive(Debug, Default)]
struct FrontierState {
    pending: VecDeque<CrawlTarget>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    in_flight: usize,
}

#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a URL unless it is already pending or visited. Returns whether it was added.
    ///
    /// Duplicates are detected on the normalized form; the target keeps the URL as
    /// offered so a page that only exists at `/docs/` is still requested there.
    pub fn offer(&self, url: &Url, depth: usize) -> bool {
        let key = normalize_url(url).as_str().to_string();
        let mut url = url.clone();
        url.set_fragment(None);

        let admitted = {
            let mut state = self.lock();
            if state.visited.contains(&key) || state.queued.contains(&key) {
                false
            } else {
                state.queued.insert(key);
                state.pending.push_back(CrawlTarget { url, depth });
                true
            }
        };

        if admitted {
            self.changed.notify_waiters();
        }
        admitted
    }

    pub fn has_next(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Pop the oldest pending target and mark it visited
    pub fn next(&self) -> Option<CrawlTarget> {
        match self.next_within(&Budget::default()) {
            Dequeue::Target(target) => Some(target),
            _ => None,
        }
    }

    /// Like [`Frontier::next`], but checks the budget under the same lock.
    ///
    /// A returned target counts as in flight until [`Frontier::complete`] is called.
    pub fn next_within(&self, budget: &Budget) -> Dequeue {
        let mut state = self.lock();

        let Some(front) = state.pending.front() else {
            return Dequeue::Empty;
        };
        if budget.max_pages.is_some_and(|max| state.visited.len() >= max) {
            return Dequeue::PageLimit;
        }
        if budget.max_depth.is_some_and(|max| front.depth > max) {
            return Dequeue::DepthExceeded;
        }

        let Some(target) = state.pending.pop_front() else {
            return Dequeue::Empty;
        };
        let key = normalize_url(&target.url).as_str().to_string();
        state.queued.remove(&key);
        state.visited.insert(key);
        state.in_flight += 1;
        Dequeue::Target(target)
    }

    /// Mark a target handed out by `next` as fully processed
    pub fn complete(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    /// No pending targets and nothing in flight that could still offer more
    pub fn is_exhausted(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.in_flight == 0
    }

    /// Resolves on the next `offer` or `complete` made after this call.
    ///
    /// Create the future before re-checking the frontier so no wakeup is lost.
    pub fn changed(&self) -> tokio::sync::futures::Notified<'_> {
        self.changed.notified()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn visited_len(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        let key = normalize_url(url);
        self.lock().visited.contains(key.as_str())
    }

    /// Snapshot of the pending URLs in dequeue order
    pub fn pending_urls(&self) -> Vec<Url> {
        self.lock().pending.iter().map(|t| t.url.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_offer_twice_dequeues_once() {
        let frontier = Frontier::new();
        assert!(frontier.offer(&url("https://example.com/a"), 0));
        assert!(!frontier.offer(&url("https://example.com/a"), 0));
        assert!(!frontier.offer(&url("https://EXAMPLE.com/a/#top"), 1));

        assert_eq!(frontier.next().map(|t| t.url), Some(url("https://example.com/a")));
        assert!(frontier.next().is_none());
        assert!(!frontier.has_next());
    }

    #[test]
    fn test_target_keeps_offered_form() {
        let frontier = Frontier::new();
        assert!(frontier.offer(&url("https://example.com/docs/#intro"), 0));
        assert!(!frontier.offer(&url("https://example.com/docs"), 0));

        let target = frontier.next().unwrap();
        assert_eq!(target.url, url("https://example.com/docs/"));
        frontier.complete();

        assert!(frontier.is_visited(&url("https://example.com/docs")));
        assert!(!frontier.offer(&url("https://example.com/docs#top"), 1));
        assert!(frontier.is_exhausted());
    }

    #[test]
    fn test_visited_never_readmitted() {
        let frontier = Frontier::new();
        frontier.offer(&url("https://example.com/a"), 0);
        let target = frontier.next().unwrap();
        frontier.complete();

        assert!(frontier.is_visited(&target.url));
        assert!(!frontier.offer(&url("https://example.com/a/"), 1));
        assert!(frontier.is_exhausted());
    }

    #[test]
    fn test_breadth_first_order() {
        let frontier = Frontier::new();
        frontier.offer(&url("https://example.com/"), 0);

        let root = frontier.next().unwrap();
        frontier.offer(&url("https://example.com/a"), root.depth + 1);
        frontier.offer(&url("https://example.com/b"), root.depth + 1);
        frontier.complete();

        let a = frontier.next().unwrap();
        frontier.offer(&url("https://example.com/a/deep"), a.depth + 1);
        frontier.complete();

        let order: Vec<(String, usize)> = std::iter::from_fn(|| frontier.next())
            .map(|t| (t.url.path().to_string(), t.depth))
            .collect();
        assert_eq!(
            order,
            vec![("/b".to_string(), 1), ("/a/deep".to_string(), 2)]
        );
    }

    #[test]
    fn test_depth_limit_leaves_target_pending() {
        let frontier = Frontier::new();
        frontier.offer(&url("https://example.com/deep"), 3);

        let shallow = Budget {
            max_depth: Some(2),
            ..Budget::default()
        };
        let deep = Budget {
            max_depth: Some(3),
            ..Budget::default()
        };
        assert_eq!(frontier.next_within(&shallow), Dequeue::DepthExceeded);
        assert_eq!(frontier.pending_len(), 1);
        assert!(matches!(frontier.next_within(&deep), Dequeue::Target(_)));
        assert_eq!(frontier.next_within(&deep), Dequeue::Empty);
    }

    #[test]
    fn test_page_limit_counts_dequeued_targets() {
        let frontier = Frontier::new();
        for path in ["a", "b", "c"] {
            frontier.offer(&url(&format!("https://example.com/{}", path)), 0);
        }
        let budget = Budget {
            max_pages: Some(2),
            ..Budget::default()
        };

        assert!(matches!(frontier.next_within(&budget), Dequeue::Target(_)));
        assert!(matches!(frontier.next_within(&budget), Dequeue::Target(_)));
        assert_eq!(frontier.next_within(&budget), Dequeue::PageLimit);
        assert_eq!(frontier.visited_len(), 2);
        assert_eq!(frontier.pending_len(), 1);
    }

    #[test]
    fn test_in_flight_blocks_exhaustion() {
        let frontier = Frontier::new();
        frontier.offer(&url("https://example.com/"), 0);
        let _ = frontier.next().unwrap();

        assert!(!frontier.has_next());
        assert!(!frontier.is_exhausted());
        frontier.complete();
        assert!(frontier.is_exhausted());
    }

    #[test]
    fn test_concurrent_offers_and_pops_visit_each_url_once() {
        let frontier = Arc::new(Frontier::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let frontier = Arc::clone(&frontier);
                std::thread::spawn(move || {
                    let mut popped = Vec::new();
                    for i in 0..100 {
                        frontier.offer(&url(&format!("https://example.com/{}", i)), 0);
                        if let Some(target) = frontier.next() {
                            popped.push(target.url.to_string());
                            frontier.complete();
                        }
                    }
                    popped
                })
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.extend(std::iter::from_fn(|| frontier.next()).map(|t| t.url.to_string()));

        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 100);
        assert_eq!(unique.len(), 100);
    }

    #[tokio::test]
    async fn test_changed_wakes_on_offer() {
        let frontier = Arc::new(Frontier::new());
        let waiter = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move {
                let changed = frontier.changed();
                if !frontier.has_next() {
                    changed.await;
                }
                frontier.next()
            })
        };

        tokio::task::yield_now().await;
        frontier.offer(&url("https://example.com/late"), 0);

        let target = waiter.await.unwrap();
        assert_eq!(target.map(|t| t.url.path().to_string()), Some("/late".to_string()));
    }
}
