//! Crawl controller.
//!
//! Drives the loop: dequeue a target, render it, extract a record, emit it,
//! and offer the discovered links back to the frontier. Runs a pool of workers,
//! each owning one browser session for the whole crawl.

use crate::config::CrawlConfig;
use crate::crawlers::crawler::{RenderSession, Renderer};
use crate::frontier::{Budget, CrawlTarget, Dequeue, Frontier};
use crate::parsers::{self, Extractor, LinkPolicy};
use crate::results::{CrawlReport, PageFailure, RenderFailure};
use crate::sink::RecordSink;
use crate::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlState {
    Idle,
    Running,
    /// The frontier ran dry with nothing left in flight
    Completed,
    /// Cancelled, out of budget, or the sink went away
    Stopped,
    /// Could not start: bad configuration or no browser session
    Failed,
}

/// Crawls from a set of seeds using one renderer session per worker
pub struct Crawler<R: Renderer> {
    config: CrawlConfig,
    renderer: R,
    cancel: CancellationToken,
    state: Mutex<CrawlState>,
}

/// Everything the workers share for the duration of one run
struct WorkerContext<S> {
    frontier: Frontier,
    extractor: Extractor,
    links: LinkPolicy,
    sink: S,
    budget: Budget,
    render_timeout: Duration,
    stop: CancellationToken,
    succeeded: AtomicUsize,
    emitted: AtomicUsize,
    failures: Mutex<Vec<PageFailure>>,
}

/// Marks a dequeued target as finished even if the worker unwinds
struct InFlight<'a>(&'a Frontier);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.complete();
    }
}

impl<R> Crawler<R>
where
    R: Renderer,
    R::Session: 'static,
{
    pub fn new(config: CrawlConfig, renderer: R) -> Self {
        Self {
            config,
            renderer,
            cancel: CancellationToken::new(),
            state: Mutex::new(CrawlState::Idle),
        }
    }

    /// Use an externally owned token instead of a fresh one
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn state(&self) -> CrawlState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: CrawlState) {
        ::log::debug!("Crawl state -> {:?}", state);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Token that stops the crawl when cancelled.
    ///
    /// Workers check it before every dequeue, so each finishes at most the
    /// render it is already waiting on.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop; same as cancelling [`Crawler::cancellation_token`]
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run the crawl to completion, emitting one record per rendered page.
    ///
    /// Only setup problems are returned as errors; page failures end up in the report.
    pub async fn run<S>(&self, sink: S) -> Result<CrawlReport>
    where
        S: RecordSink + 'static,
    {
        if self.state() != CrawlState::Idle {
            return Err(CrawlError::config("a crawler can only be run once"));
        }

        let (context, sessions) = match self.setup(sink).await {
            Ok(ready) => ready,
            Err(e) => {
                ::log::error!("Crawl failed to start: {}", e);
                self.set_state(CrawlState::Failed);
                return Err(e);
            }
        };

        self.set_state(CrawlState::Running);
        ::log::info!(
            "Starting crawl of {} seed(s) with {} worker(s)",
            context.frontier.pending_len(),
            sessions.len()
        );

        let mut workers = JoinSet::new();
        for (worker_id, session) in sessions.into_iter().enumerate() {
            workers.spawn(worker_loop(worker_id, Arc::clone(&context), session));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                ::log::error!("Worker task ended abnormally: {}", e);
            }
        }

        let state = if context.stop.is_cancelled() {
            CrawlState::Stopped
        } else {
            CrawlState::Completed
        };
        self.set_state(state);

        let failures = context
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let report = CrawlReport {
            state,
            pages_visited: context.frontier.visited_len(),
            pages_succeeded: context.succeeded.load(Ordering::SeqCst),
            failures,
            records_emitted: context.emitted.load(Ordering::SeqCst),
            pending: context.frontier.pending_len(),
        };
        ::log::info!("Crawl finished - {}", report);
        Ok(report)
    }

    /// Validate, compile, seed the frontier and open one session per worker
    async fn setup<S>(&self, sink: S) -> Result<(Arc<WorkerContext<S>>, Vec<R::Session>)> {
        self.config.validate()?;
        let seeds = self.config.seed_urls()?;
        let extractor = Extractor::new(&self.config.fields)?;
        let links = LinkPolicy::new(
            &self.config.link_selector,
            &self.config.scope,
            self.config.follow,
        )?;

        let mut sessions = Vec::with_capacity(self.config.max_concurrency);
        for worker_id in 0..self.config.max_concurrency {
            match self.renderer.open_session().await {
                Ok(session) => {
                    ::log::debug!("Worker {} session opened", worker_id);
                    sessions.push(session);
                }
                Err(e) => {
                    for session in sessions {
                        session.close().await;
                    }
                    return Err(e);
                }
            }
        }

        let frontier = Frontier::new();
        for seed in &seeds {
            frontier.offer(seed, 0);
        }

        let context = WorkerContext {
            frontier,
            extractor,
            links,
            sink,
            budget: Budget {
                max_pages: self.config.max_pages,
                max_depth: self.config.max_depth,
            },
            render_timeout: self.config.render.timeout(),
            stop: self.cancel.child_token(),
            succeeded: AtomicUsize::new(0),
            emitted: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        };
        Ok((Arc::new(context), sessions))
    }
}

/// Main processing loop for a worker
///
/// Runs until the frontier is exhausted or the crawl is stopped, then closes the session.
async fn worker_loop<S, T>(worker_id: usize, context: Arc<WorkerContext<S>>, mut session: T)
where
    S: RecordSink,
    T: RenderSession,
{
    ::log::debug!("Worker {} starting processing loop", worker_id);

    loop {
        if context.stop.is_cancelled() {
            ::log::info!("Worker {} observed stop signal", worker_id);
            break;
        }

        // Registered before looking at the frontier so a concurrent offer is not missed
        let changed = context.frontier.changed();

        match context.frontier.next_within(&context.budget) {
            Dequeue::Target(target) => {
                let _in_flight = InFlight(&context.frontier);
                if !process_target(worker_id, &context, &mut session, target).await {
                    context.stop.cancel();
                }
            }
            Dequeue::Empty => {
                if context.frontier.is_exhausted() {
                    ::log::debug!("Worker {} found the frontier exhausted", worker_id);
                    break;
                }
                tokio::select! {
                    _ = changed => {}
                    _ = context.stop.cancelled() => {}
                }
            }
            Dequeue::PageLimit => {
                ::log::info!("Worker {} reached the page limit", worker_id);
                context.stop.cancel();
            }
            Dequeue::DepthExceeded => {
                ::log::info!("Worker {} reached the depth limit", worker_id);
                context.stop.cancel();
            }
        }
    }

    session.close().await;
    ::log::debug!("Worker {} closed its session", worker_id);
}

/// Render one target and feed its results onward. Returns false when the sink is gone.
async fn process_target<S, T>(
    worker_id: usize,
    context: &WorkerContext<S>,
    session: &mut T,
    target: CrawlTarget,
) -> bool
where
    S: RecordSink,
    T: RenderSession,
{
    ::log::info!(
        "Worker {} rendering {} (depth {})",
        worker_id,
        target.url,
        target.depth
    );

    let rendered = match tokio::time::timeout(context.render_timeout, session.render(&target.url))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(RenderFailure::timeout(&target.url)),
    };

    let page = match rendered {
        Ok(page) => page,
        Err(failure) => {
            ::log::warn!("Worker {} failed: {}", worker_id, failure);
            context
                .failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(failure.into());
            return true;
        }
    };
    context.succeeded.fetch_add(1, Ordering::SeqCst);

    let (record, links) = parsers::parse_page(&page, &context.extractor, &context.links);

    if let Err(e) = context.sink.emit(record).await {
        ::log::error!("Worker {} failed to emit record: {}", worker_id, e);
        return false;
    }
    context.emitted.fetch_add(1, Ordering::SeqCst);

    let mut queued = 0;
    for link in &links {
        if context.frontier.offer(link, target.depth + 1) {
            ::log::debug!("Queuing link for crawling: {}", link);
            queued += 1;
        }
    }
    ::log::debug!(
        "Worker {} queued {} of {} links from {}",
        worker_id,
        queued,
        links.len(),
        page.final_url
    );
    true
}
