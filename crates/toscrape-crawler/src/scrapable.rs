use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Scraping logic plugged into [`crawl_site`](crate::crawl_site).
///
/// Each worker thread owns its own instance, built from a shared `Config`.
pub trait Scrapable {
    type Config: Clone + Send + 'static;

    fn new(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// URLs the crawl starts from.
    fn seed(&self) -> Vec<String>;

    /// Processes one downloaded page, follow-up URLs go through `ctx`.
    fn scrap(&mut self, page: String, ctx: ScrapingContext) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLocation {
    Url(String),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ScrapingContext {
    location: Rc<PageLocation>,
    tx_url: Option<CountedTx>,
}

impl ScrapingContext {
    pub fn new(location: Rc<PageLocation>, tx_url: CountedTx) -> Self {
        Self {
            location,
            tx_url: Some(tx_url),
        }
    }

    /// A context for a page scraped outside of a crawl, follow-up URLs are only logged.
    pub fn with_location(location: PageLocation) -> Self {
        Self {
            location: Rc::new(location),
            tx_url: None,
        }
    }

    pub fn location(&self) -> Rc<PageLocation> {
        self.location.clone()
    }

    /// Queues `url` for download, returns whether it was accepted.
    pub fn send_url(&self, url: String) -> bool {
        match &self.tx_url {
            Some(tx_url) => tx_url.send(url),
            None => {
                log::info!("Not crawling, next page would be: {url}");
                false
            }
        }
    }
}

/// URL sender that keeps track of how many pages are in flight.
#[derive(Debug, Clone)]
pub struct CountedTx {
    tx: mpsc::UnboundedSender<String>,
    counter: Arc<AtomicUsize>,
    sent: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
    limit: Option<usize>,
}

impl CountedTx {
    pub fn new(tx: mpsc::UnboundedSender<String>, counter: Arc<AtomicUsize>) -> Self {
        Self {
            tx,
            counter,
            sent: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicUsize::new(0)),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn send(&self, s: String) -> bool {
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        if matches!(self.limit, Some(limit) if n >= limit) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            log::info!("Page limit reached, dropping: {s}");
            return false;
        }

        // Counted before sending so that a page is never seen as done while queued
        self.counter.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(s) {
            Ok(()) => true,
            Err(e) => {
                self.counter.fetch_sub(1, Ordering::SeqCst);
                log::error!("Couldn't send data: {e}");
                false
            }
        }
    }

    /// Number of URLs refused because of the page limit, shared by all clones.
    pub fn dropped_counter(&self) -> Arc<AtomicUsize> {
        self.dropped.clone()
    }
}
