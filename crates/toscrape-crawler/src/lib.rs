mod config;
mod crawler;
mod scrapable;

pub use config::{CrawlerConfig, OnError};
pub use crawler::{crawl_site, CrawlStats};
pub use scrapable::{CountedTx, PageLocation, Scrapable, ScrapingContext};

pub use anyhow;
