use std::io::prelude::*;
use std::pin::pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Error, Result};
use crossbeam_channel::TrySendError;
use flate2::read::GzDecoder;
use futures::{try_join, StreamExt};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::{CrawlerConfig, OnError};
use crate::scrapable::{CountedTx, PageLocation, Scrapable, ScrapingContext};

const DONE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const PAGE_SEND_RETRY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages_downloaded: usize,
    pub pages_scraped: usize,
    pub urls_dropped: usize,
}

#[derive(Debug, Clone)]
struct Page {
    page: String,
    location: PageLocation,
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Page> {
    let resp = client.get(url).send().await?.error_for_status()?;

    // Relative links are resolved against where the page was actually served from
    let location = PageLocation::Url(resp.url().to_string());

    let page = match resp.headers().get(CONTENT_TYPE) {
        Some(c) if c == "application/x-gzip" || c == "application/gzip" => {
            let compressed = resp.bytes().await?;
            let mut gz = GzDecoder::new(&compressed[..]);
            let mut page = String::new();
            gz.read_to_string(&mut page)?;
            page
        }
        _ => resp.text().await?,
    };

    Ok(Page { page, location })
}

/// Hands a page to the workers without blocking the runtime while the buffer is full.
///
/// Returns `false` once every worker is gone.
async fn send_page(tx_page: &crossbeam_channel::Sender<Page>, mut page: Page) -> bool {
    loop {
        match tx_page.try_send(page) {
            Ok(()) => return true,
            Err(TrySendError::Full(p)) => {
                page = p;
                sleep(PAGE_SEND_RETRY).await;
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

fn stop_workers(tx_stop: &crossbeam_channel::Sender<()>, num_workers: usize) {
    for _ in 0..num_workers {
        tx_stop.send(()).ok();
    }
}

/// Crawls pages starting from the scraper's seed until no URL is left to download.
///
/// Pages are downloaded one at a time and scraped by `crawler_conf.num_workers`
/// threads, each owning its own `T`.
pub async fn crawl_site<T>(
    crawler_conf: &CrawlerConfig,
    scraper_conf: &T::Config,
) -> anyhow::Result<CrawlStats>
where
    T: Scrapable + 'static,
{
    let num_workers = crawler_conf.num_workers.max(1);
    let pages_in = Arc::new(AtomicUsize::new(0));
    let pages_out = Arc::new(AtomicUsize::new(0));

    let (tx_stop, rx_stop) = crossbeam_channel::unbounded::<()>();
    let (tx_url, rx_url) = mpsc::unbounded_channel::<String>();
    let (tx_page, rx_page) = crossbeam_channel::bounded::<Page>(crawler_conf.page_buffer);

    let tx_url = CountedTx::new(tx_url, pages_in.clone()).with_limit(crawler_conf.max_pages);

    let client = reqwest::ClientBuilder::new()
        .user_agent(&crawler_conf.user_agent)
        .gzip(true)
        .deflate(true)
        .build()?;

    // Seed

    let scraper = T::new(scraper_conf)?;
    for url in scraper.seed() {
        tx_url.send(url);
    }
    drop(scraper);

    // Workers

    let stop = Arc::new(AtomicBool::new(false));
    let mut workers = vec![];
    for id in 0..num_workers {
        let rx_stop = rx_stop.clone();
        let rx_page = rx_page.clone();
        let tx_url = tx_url.clone();
        let pages_out = pages_out.clone();
        let scraper_conf = scraper_conf.clone();
        let on_scrap_error = crawler_conf.on_scrap_error;
        let stop = stop.clone();
        let worker = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || {
                let run = || {
                    let mut scraper = T::new(&scraper_conf)?;
                    loop {
                        crossbeam_channel::select! {
                            recv(rx_page) -> page => {
                                let Ok(Page { page, location }) = page else { break };
                                let location = Rc::new(location);
                                let ctx = ScrapingContext::new(location.clone(), tx_url.clone());
                                let res = scraper.scrap(page, ctx);
                                pages_out.fetch_add(1, Ordering::SeqCst);
                                if let Err(e) = res {
                                    match on_scrap_error {
                                        OnError::SkipAndLog => {
                                            log::error!("Skipping scrap for page {location:?} got: {e}");
                                        }
                                        OnError::Fail => {
                                            return Err(e.context(format!("Couldn't scrap {location:?}")));
                                        }
                                    }
                                }
                            },
                            recv(rx_stop) -> _ => break,
                        }
                    }
                    Ok::<(), Error>(())
                };
                let res = run();
                if res.is_err() {
                    stop.store(true, Ordering::SeqCst);
                }
                res
            })?;
        workers.push(worker);
    }
    drop(rx_page);

    let workers = async move {
        tokio::task::spawn_blocking(move || {
            for w in workers {
                w.join()
                    .map_err(|_| anyhow!("Worker thread panicked"))??;
            }
            Ok::<(), Error>(())
        })
        .await?
    };

    // Downloader

    let pages_in_c = pages_in.clone();
    let stop_c = stop.clone();
    let tx_stop_c = tx_stop.clone();
    let client = &client;
    let downloader = async move {
        let mut downloads = pin!(UnboundedReceiverStream::new(rx_url).then(move |url| async move {
            let page = download(client, &url).await;
            (url, page)
        }));

        let mut pages_downloaded = 0;
        while let Some((url, page)) = downloads.next().await {
            match page {
                Ok(page) => {
                    log::debug!("Downloaded {url}");
                    pages_downloaded += 1;
                    if !send_page(&tx_page, page).await {
                        break;
                    }
                }
                Err(e) => {
                    pages_in_c.fetch_sub(1, Ordering::SeqCst);
                    match crawler_conf.on_dl_error {
                        OnError::SkipAndLog => log::warn!("Skipping URL {url} got: {e}"),
                        OnError::Fail => {
                            stop_c.store(true, Ordering::SeqCst);
                            stop_workers(&tx_stop_c, num_workers);
                            return Err(e.context(format!("Couldn't download {url}")));
                        }
                    }
                }
            }
        }
        Ok::<_, Error>(pages_downloaded)
    };

    // Completion

    let pages_out_c = pages_out.clone();
    let done = async move {
        loop {
            if crawler_conf.handle_sigint {
                if timeout(DONE_POLL_INTERVAL, tokio::signal::ctrl_c())
                    .await
                    .is_ok()
                {
                    stop.store(true, Ordering::SeqCst);
                    stop_workers(&tx_stop, num_workers);
                    return Err::<(), _>(anyhow!("Interrupted"));
                }
            } else {
                sleep(DONE_POLL_INTERVAL).await;
            }

            if stop.load(Ordering::SeqCst)
                || pages_out_c.load(Ordering::SeqCst) == pages_in.load(Ordering::SeqCst)
            {
                stop_workers(&tx_stop, num_workers);
                return Ok::<_, Error>(());
            }
        }
    };

    // Workers hold the remaining URL senders, the download stream ends with them
    let urls_dropped = tx_url.dropped_counter();
    drop(tx_url);

    let (_, pages_downloaded, _) = try_join!(workers, downloader, done)?;

    Ok(CrawlStats {
        pages_downloaded,
        pages_scraped: pages_out.load(Ordering::SeqCst),
        urls_dropped: urls_dropped.load(Ordering::SeqCst),
    })
}
