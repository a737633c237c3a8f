//! Concurrent harvesting of every message reachable from a table of contents.
//!
//! One harvest fetches the table of contents, resolves its links to page
//! URLs, then fetches and parses those pages in parallel. An admission gate
//! (a semaphore with `concurrency` permits) bounds how many page tasks exist
//! at once, and all tasks feed one bounded channel whose capacity gives the
//! consumer backpressure over every producer.
//!
//! ```rust,no_run
//! use oerr_core::{Fetcher, HarvestConfig, Harvester};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> oerr_core::Result<()> {
//! let config = HarvestConfig::default();
//! let harvester = Arc::new(Harvester::new(Fetcher::from_config(&config)?, config));
//! let mut stream = harvester.spawn(CancellationToken::new(), oerr_core::config::DEFAULT_TOC_URL);
//! while let Some(message) = stream.recv().await {
//!     println!("{}", message.id);
//! }
//! let report = stream.finish().await?;
//! println!("{} pages, {} messages", report.pages_fetched, report.messages);
//! # Ok(())
//! # }
//! ```

use crate::config::{HarvestConfig, MAX_CONCURRENCY};
use crate::entries::parse_messages;
use crate::fetcher::PageSource;
use crate::links::parse_links;
use crate::types::{Link, Message};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Counts gathered over one harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// Page URLs left after filtering the table of contents
    pub pages_discovered: usize,
    /// Pages fetched and parsed to the end
    pub pages_fetched: usize,
    /// Pages whose fetch or parse failed
    pub pages_failed: usize,
    /// Messages sent to the output channel
    pub messages: usize,
}

/// Fetches a table of contents and every page it links to.
pub struct Harvester<S: PageSource> {
    source: Arc<S>,
    config: HarvestConfig,
}

impl<S: PageSource + 'static> Harvester<S> {
    /// Create a harvester reading pages from `source`.
    pub fn new(source: S, config: HarvestConfig) -> Self {
        Self::with_shared_source(Arc::new(source), config)
    }

    /// Create a harvester over a source the caller keeps a handle to.
    pub const fn with_shared_source(source: Arc<S>, config: HarvestConfig) -> Self {
        Self { source, config }
    }

    /// Settings in effect.
    pub const fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Turn raw table-of-contents links into the page URLs worth fetching.
    ///
    /// Fragments are dropped, fragment-only links and excluded pages are
    /// skipped, links are resolved against `toc`, and each page appears once.
    pub fn page_urls(&self, toc: &Url, links: &[Link]) -> Vec<Url> {
        let directory = directory_of(toc);
        let mut seen = HashSet::new();
        let mut pages = Vec::new();

        for link in links {
            let link = link.split('#').next().unwrap_or_default().trim();
            if link.is_empty() || self.is_excluded(link) {
                continue;
            }

            let mut page = match toc.join(link) {
                Ok(page) => page,
                Err(e) => {
                    warn!(link, error = %e, "Skipping unresolvable link");
                    continue;
                },
            };
            page.set_fragment(None);

            if page == *toc {
                continue;
            }
            if self.config.same_directory_only && !page.as_str().starts_with(&directory) {
                debug!(%page, "Skipping link outside the table of contents");
                continue;
            }
            if seen.insert(page.as_str().to_string()) {
                pages.push(page);
            }
        }
        pages
    }

    fn is_excluded(&self, link: &str) -> bool {
        let path = link.split('?').next().unwrap_or_default();
        let file = path.rsplit('/').next().unwrap_or(path);
        self.config.excluded_pages.iter().any(|p| p == file)
    }

    /// Run one harvest, sending every message to `out`.
    ///
    /// `out` is dropped when this returns, and every page task holds its own
    /// clone, so the receiving side sees the end of the stream exactly when
    /// all tasks have finished. A failed page does not stop the others; the
    /// first failure is returned once everything has drained. Messages
    /// already sent stay valid either way.
    #[instrument(skip(self, cancel, out), fields(toc = %toc_url))]
    pub async fn harvest(
        &self,
        cancel: &CancellationToken,
        toc_url: &str,
        out: mpsc::Sender<Message>,
    ) -> Result<HarvestReport> {
        let toc = Url::parse(toc_url)?;
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            body = self.source.fetch_page(toc.as_str()) => body?,
        };
        let links = parse_links(&body);
        let pages = self.page_urls(&toc, &links);

        let report = HarvestReport {
            pages_discovered: pages.len(),
            ..HarvestReport::default()
        };
        info!(
            links = links.len(),
            pages = pages.len(),
            "Discovered pages"
        );

        // Cancelled on the first closed-stream error so no further pages start.
        let pages_cancel = cancel.child_token();
        let mut tally = Tally::new(report, pages_cancel.clone());
        let gate = Arc::new(Semaphore::new(
            self.config.concurrency.clamp(1, MAX_CONCURRENCY),
        ));
        let mut tasks = JoinSet::new();
        'admit: for page in pages {
            let permit = loop {
                tokio::select! {
                    biased;
                    () = pages_cancel.cancelled() => break 'admit,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => tally.settle(joined),
                    permit = Arc::clone(&gate).acquire_owned() => break permit
                        .map_err(|_| Error::Other("admission gate closed".to_string()))?,
                }
            };

            let source = Arc::clone(&self.source);
            let out = out.clone();
            let cancel = pages_cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let url = page.to_string();
                harvest_page(source, page, out, cancel)
                    .await
                    .map_err(|e| (url, e))
            });
        }
        drop(out);

        while let Some(joined) = tasks.join_next().await {
            tally.settle(joined);
        }

        let Tally {
            report,
            first_error,
            ..
        } = tally;
        if cancel.is_cancelled() {
            info!(?report, "Harvest cancelled");
            return Err(Error::Cancelled);
        }
        info!(?report, "Harvest finished");
        first_error.map_or(Ok(report), Err)
    }

    /// Start a harvest in the background and hand back its message stream.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken, toc_url: &str) -> HarvestStream {
        let (tx, rx) = mpsc::channel(self.config.channel_depth.max(1));
        let toc_url = toc_url.to_string();
        let task = tokio::spawn(async move { self.harvest(&cancel, &toc_url, tx).await });
        HarvestStream { messages: rx, task }
    }
}

/// Receiving end of a background harvest.
pub struct HarvestStream {
    messages: mpsc::Receiver<Message>,
    task: JoinHandle<Result<HarvestReport>>,
}

impl HarvestStream {
    /// Next message, or `None` once every page task has finished.
    pub async fn recv(&mut self) -> Option<Message> {
        self.messages.recv().await
    }

    /// Wait for the harvest to end and return its outcome.
    ///
    /// Messages not yet received are dropped.
    pub async fn finish(self) -> Result<HarvestReport> {
        drop(self.messages);
        self.task.await?
    }

    /// Split into the raw channel and the task handle.
    pub fn into_parts(self) -> (mpsc::Receiver<Message>, JoinHandle<Result<HarvestReport>>) {
        (self.messages, self.task)
    }
}

type PageOutcome = std::result::Result<std::result::Result<usize, (String, Error)>, JoinError>;

struct Tally {
    report: HarvestReport,
    first_error: Option<Error>,
    pages_cancel: CancellationToken,
}

impl Tally {
    const fn new(report: HarvestReport, pages_cancel: CancellationToken) -> Self {
        Self {
            report,
            first_error: None,
            pages_cancel,
        }
    }

    fn settle(&mut self, joined: PageOutcome) {
        match joined {
            Ok(Ok(count)) => {
                self.report.pages_fetched += 1;
                self.report.messages += count;
            },
            Ok(Err((url, error))) => {
                self.report.pages_failed += 1;
                match error {
                    Error::Cancelled => {},
                    Error::StreamClosed => {
                        if !self.pages_cancel.is_cancelled() {
                            debug!(url, "Consumer gone, stopping page admission");
                            self.pages_cancel.cancel();
                        }
                        self.first_error.get_or_insert(Error::StreamClosed);
                    },
                    error => {
                        warn!(url, error = %error, "Page failed");
                        self.first_error.get_or_insert(error);
                    },
                }
            },
            Err(join_error) => {
                self.report.pages_failed += 1;
                warn!(error = %join_error, "Page task aborted");
                self.first_error.get_or_insert(Error::from(join_error));
            },
        }
    }
}

async fn harvest_page<S: PageSource + ?Sized + 'static>(
    source: Arc<S>,
    page: Url,
    out: mpsc::Sender<Message>,
    cancel: CancellationToken,
) -> Result<usize> {
    let body = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        body = source.fetch_page(page.as_str()) => body?,
    };

    // The parsed document is not Send; it lives and dies on a blocking thread
    // that forwards each message as soon as it is built.
    let runtime = Handle::current();
    let count = tokio::task::spawn_blocking(move || {
        parse_messages(&body, |message| {
            runtime.block_on(forward(&out, &cancel, message))
        })
    })
    .await??;

    debug!(%page, count, "Page harvested");
    Ok(count)
}

async fn forward(
    out: &mpsc::Sender<Message>,
    cancel: &CancellationToken,
    message: Message,
) -> Result<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        sent = out.send(message) => sent.map_err(|_| Error::StreamClosed),
    }
}

/// The table of contents' URL up to and including the last `/` of its path.
fn directory_of(toc: &Url) -> String {
    let mut directory = toc.clone();
    directory.set_query(None);
    directory.set_fragment(None);
    let text = directory.as_str();
    match text.rfind('/') {
        Some(i) => text[..=i].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TOC_URL: &str = "http://docs.test/book/toc.htm";

    fn entry_page(codes: &[u32]) -> String {
        let entries: String = codes
            .iter()
            .map(|code| {
                format!(
                    r#"<div class="msgentry"><dl><dt>ORA-{code:05}: message {code}</dt>
                    <dd><div class="msgexplan"><span>Cause:</span> cause {code}</div></dd>
                    <dd><div class="msgaction"><span>Action:</span> action {code}</div></dd>
                    </dl></div>"#
                )
            })
            .collect();
        format!("<html><body><div class=\"msgset\">{entries}</div></body></html>")
    }

    fn toc_page(count: usize) -> String {
        let items: String = (0..count)
            .map(|i| format!(r#"<li><a href="e{i}.htm#start">Chapter {i}</a></li>"#))
            .collect();
        format!(
            r#"<html><body><ul><li><a href="title.htm">Title</a></li>{items}<li><a href="index.htm">Index</a></li></ul></body></html>"#
        )
    }

    /// Serves pages from memory and records how many fetches overlap.
    #[derive(Default)]
    struct MockSource {
        pages: HashMap<String, String>,
        failing: HashSet<String>,
        delay: Duration,
        hang: bool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fetches: AtomicUsize,
    }

    impl MockSource {
        fn with_pages(count: usize) -> Self {
            let mut pages = HashMap::new();
            pages.insert(TOC_URL.to_string(), toc_page(count));
            for i in 0..count {
                let code = u32::try_from(i).unwrap();
                pages.insert(
                    format!("http://docs.test/book/e{i}.htm"),
                    entry_page(&[code * 10, code * 10 + 1]),
                );
            }
            Self {
                pages,
                ..Self::default()
            }
        }
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PageSource for MockSource {
        async fn fetch_page(&self, url: &str) -> Result<String> {
            let is_toc = url == TOC_URL;
            let _guard = if is_toc {
                None
            } else {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(current, Ordering::SeqCst);
                Some(InFlight(&self.in_flight))
            };

            if !is_toc {
                if self.hang {
                    std::future::pending::<()>().await;
                }
                tokio::time::sleep(self.delay).await;
            }

            if self.failing.contains(url) {
                return Err(Error::Fetch {
                    url: url.to_string(),
                    status: 500,
                });
            }
            self.pages.get(url).cloned().ok_or_else(|| Error::Fetch {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn harvester(source: Arc<MockSource>) -> Arc<Harvester<MockSource>> {
        Arc::new(Harvester::with_shared_source(
            source,
            HarvestConfig::default(),
        ))
    }

    async fn drain(stream: &mut HarvestStream) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(message) = stream.recv().await {
            out.push(message);
        }
        out
    }

    #[test]
    fn test_page_urls_filtering() {
        let harvester = Harvester::new(MockSource::default(), HarvestConfig::default());
        let toc = Url::parse(TOC_URL).unwrap();
        let links: Vec<String> = [
            "title.htm",
            "preface.htm#sthref1",
            "intro.htm",
            "index.htm",
            "#top",
            "toc.htm",
            "e0.htm",
            "e0.htm#ORA-00017",
            "e900.htm",
            "../../dcommon/html/cpyr.htm",
            "http://elsewhere.test/e1.htm",
            "http://docs.test/book/e1500.htm",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        let pages: Vec<String> = harvester
            .page_urls(&toc, &links)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            pages,
            vec![
                "http://docs.test/book/e0.htm",
                "http://docs.test/book/e900.htm",
                "http://docs.test/book/e1500.htm",
            ]
        );
    }

    #[test]
    fn test_page_urls_without_directory_restriction() {
        let config = HarvestConfig {
            same_directory_only: false,
            ..HarvestConfig::default()
        };
        let harvester = Harvester::new(MockSource::default(), config);
        let toc = Url::parse(TOC_URL).unwrap();
        let pages = harvester.page_urls(&toc, &["../shared/e1.htm".to_string()]);
        assert_eq!(pages[0].as_str(), "http://docs.test/shared/e1.htm");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_harvests_every_page() {
        let source = Arc::new(MockSource::with_pages(5));
        let mut stream = harvester(Arc::clone(&source)).spawn(CancellationToken::new(), TOC_URL);

        let messages = drain(&mut stream).await;
        let report = stream.finish().await.unwrap();

        assert_eq!(messages.len(), 10);
        assert_eq!(
            report,
            HarvestReport {
                pages_discovered: 5,
                pages_fetched: 5,
                pages_failed: 0,
                messages: 10,
            }
        );
        let mut codes: Vec<u32> = messages.iter().map(|m| m.id.code).collect();
        codes.sort_unstable();
        assert_eq!(codes, vec![0, 1, 10, 11, 20, 21, 30, 31, 40, 41]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_messages_within_a_page_keep_document_order() {
        let mut source = MockSource::with_pages(1);
        source.pages.insert(
            "http://docs.test/book/e0.htm".to_string(),
            entry_page(&[5, 3, 9, 1]),
        );
        let mut stream = harvester(Arc::new(source)).spawn(CancellationToken::new(), TOC_URL);

        let codes: Vec<u32> = drain(&mut stream).await.iter().map(|m| m.id.code).collect();
        stream.finish().await.unwrap();
        assert_eq!(codes, vec![5, 3, 9, 1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_admission_gate_bounds_in_flight_fetches() {
        let mut source = MockSource::with_pages(40);
        source.delay = Duration::from_millis(20);
        let source = Arc::new(source);
        let mut stream = harvester(Arc::clone(&source)).spawn(CancellationToken::new(), TOC_URL);

        let messages = drain(&mut stream).await;
        stream.finish().await.unwrap();

        let max_seen = source.max_in_flight.load(Ordering::SeqCst);
        assert_eq!(messages.len(), 80);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 40);
        assert!(max_seen <= 8, "Max concurrent was {max_seen}, should be <= 8");
        assert!(max_seen > 1, "Fetches never overlapped");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unvalidated_concurrency_is_still_capped() {
        let mut source = MockSource::with_pages(40);
        source.delay = Duration::from_millis(20);
        let source = Arc::new(source);
        let config = HarvestConfig {
            concurrency: 32,
            ..HarvestConfig::default()
        };
        let harvester = Arc::new(Harvester::with_shared_source(Arc::clone(&source), config));
        let mut stream = harvester.spawn(CancellationToken::new(), TOC_URL);

        assert_eq!(drain(&mut stream).await.len(), 80);
        stream.finish().await.unwrap();
        let max_seen = source.max_in_flight.load(Ordering::SeqCst);
        assert!(max_seen <= MAX_CONCURRENCY, "Max concurrent was {max_seen}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_page_does_not_stop_siblings() {
        let mut source = MockSource::with_pages(6);
        source
            .failing
            .insert("http://docs.test/book/e2.htm".to_string());
        let mut stream = harvester(Arc::new(source)).spawn(CancellationToken::new(), TOC_URL);

        let messages = drain(&mut stream).await;
        let result = stream.finish().await;

        assert_eq!(messages.len(), 10, "five healthy pages, two entries each");
        match result {
            Err(Error::Fetch { url, status }) => {
                assert_eq!(url, "http://docs.test/book/e2.htm");
                assert_eq!(status, 500);
            },
            other => panic!("Expected the failed page's error, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_toc_failure_closes_empty_stream() {
        let source = MockSource::default();
        let mut stream = harvester(Arc::new(source)).spawn(CancellationToken::new(), TOC_URL);

        assert!(drain(&mut stream).await.is_empty());
        assert!(matches!(
            stream.finish().await,
            Err(Error::Fetch { status: 404, .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_invalid_toc_url() {
        let source = Arc::new(MockSource::default());
        let (tx, _rx) = mpsc::channel(1);
        let result = harvester(source)
            .harvest(&CancellationToken::new(), "not a url", tx)
            .await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancellation_stops_hanging_fetches() {
        let mut source = MockSource::with_pages(20);
        source.hang = true;
        let source = Arc::new(source);
        let cancel = CancellationToken::new();
        let mut stream = harvester(Arc::clone(&source)).spawn(cancel.clone(), TOC_URL);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 8);
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), async {
            let messages = drain(&mut stream).await;
            (messages, stream.finish().await)
        })
        .await
        .expect("harvest should stop promptly after cancellation");

        assert!(outcome.0.is_empty());
        assert!(matches!(outcome.1, Err(Error::Cancelled)));
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = harvester(Arc::new(MockSource::with_pages(3))).spawn(cancel, TOC_URL);
        assert!(matches!(stream.finish().await, Err(Error::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dropped_consumer_ends_harvest() {
        let source = Arc::new(MockSource::with_pages(10));
        let stream = harvester(source).spawn(CancellationToken::new(), TOC_URL);
        let (rx, task) = stream.into_parts();
        drop(rx);

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("harvest should notice the consumer is gone")
            .unwrap();
        assert!(matches!(result, Err(Error::StreamClosed)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dropped_consumer_stops_admitting_pages() {
        let mut source = MockSource::with_pages(40);
        source.delay = Duration::from_millis(10);
        let source = Arc::new(source);
        let stream = harvester(Arc::clone(&source)).spawn(CancellationToken::new(), TOC_URL);
        let (rx, task) = stream.into_parts();
        drop(rx);

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("harvest should notice the consumer is gone")
            .unwrap();

        assert!(matches!(result, Err(Error::StreamClosed)));
        let fetched = source.fetches.load(Ordering::SeqCst);
        assert!(fetched < 40, "Fetched all {fetched} pages after the consumer left");
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    }
}
