use anyhow::Context;
use crossbeam_channel::Sender;
use scraper::Html;
use toscrape_crawler::{PageLocation, Scrapable, ScrapingContext};
use url::Url;

use crate::quotes::{self, FollowRequest, PageOutput, Record, SEED_URL};

#[derive(Debug, Clone)]
pub struct QuotesScraperConfig {
    /// First page of the crawl
    pub seed: String,
    /// Base URL for pages that were not downloaded (local files), defaults to `seed`
    pub base_url: Option<String>,
    /// Where extracted records are sent
    pub tx_record: Sender<Record>,
}

impl QuotesScraperConfig {
    pub fn new(tx_record: Sender<Record>) -> Self {
        Self {
            seed: SEED_URL.to_string(),
            base_url: None,
            tx_record,
        }
    }
}

pub struct QuotesScraper {
    seed: Url,
    base_url: Url,
    tx_record: Sender<Record>,
}

impl QuotesScraper {
    fn base_url_for(&self, location: &PageLocation) -> anyhow::Result<Url> {
        match location {
            PageLocation::Url(url) => {
                Url::parse(url).with_context(|| format!("Invalid page URL: {url}"))
            }
            PageLocation::Path(_) => Ok(self.base_url.clone()),
        }
    }
}

impl Scrapable for QuotesScraper {
    type Config = QuotesScraperConfig;

    fn new(config: &QuotesScraperConfig) -> anyhow::Result<Self> {
        let seed = quotes::start(&config.seed)
            .with_context(|| format!("Invalid seed URL: {}", config.seed))?
            .url;
        let base_url = match &config.base_url {
            Some(url) => Url::parse(url).with_context(|| format!("Invalid base URL: {url}"))?,
            None => seed.clone(),
        };

        Ok(Self {
            seed,
            base_url,
            tx_record: config.tx_record.clone(),
        })
    }

    fn seed(&self) -> Vec<String> {
        vec![self.seed.to_string()]
    }

    fn scrap(&mut self, page: String, ctx: ScrapingContext) -> anyhow::Result<()> {
        let base_url = self.base_url_for(&ctx.location())?;
        let document = Html::parse_document(&page);
        let PageOutput { records, follow } = quotes::extract(&document, &base_url);

        log::info!("Scraped {} quote(s) from {base_url}", records.len());
        for record in records {
            self.tx_record
                .send(record)
                .map_err(|_| anyhow::anyhow!("Record sink is closed"))?;
        }

        match follow {
            Some(FollowRequest { url }) => {
                ctx.send_url(url.into());
            }
            None => log::info!("No next page after {base_url}"),
        }

        Ok(())
    }
}

/// Scraps a single page outside of a crawl.
pub fn scrap_page(
    config: &QuotesScraperConfig,
    page: String,
    location: PageLocation,
) -> anyhow::Result<()> {
    let mut scraper = QuotesScraper::new(config)?;
    scraper.scrap(page, ScrapingContext::with_location(location))
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;

    const PAGE: &str = r#"
        <div class="quote"><span class="text">Be yourself...</span>
          <span>by <small class="author">Oscar Wilde</small></span></div>
        <ul class="pager"><li class="next"><a href="/page/3/">Next</a></li></ul>
    "#;

    #[test]
    fn seed_defaults_to_quotes_site() {
        let (tx, _rx) = unbounded();
        let scraper = QuotesScraper::new(&QuotesScraperConfig::new(tx)).unwrap();
        assert_eq!(scraper.seed(), vec!["http://quotes.toscrape.com/".to_string()]);
    }

    #[test]
    fn invalid_seed_is_rejected() {
        let (tx, _rx) = unbounded();
        let conf = QuotesScraperConfig {
            seed: "quotes".into(),
            ..QuotesScraperConfig::new(tx)
        };
        assert!(QuotesScraper::new(&conf).is_err());
    }

    #[test]
    fn local_page_uses_base_url() {
        let (tx, rx) = unbounded();
        let conf = QuotesScraperConfig {
            base_url: Some("http://quotes.toscrape.com/page/2/".into()),
            ..QuotesScraperConfig::new(tx)
        };
        let scraper = QuotesScraper::new(&conf).unwrap();
        let base = scraper
            .base_url_for(&PageLocation::Path("page-2.html".into()))
            .unwrap();
        assert_eq!(base.as_str(), "http://quotes.toscrape.com/page/2/");

        scrap_page(&conf, PAGE.to_string(), PageLocation::Path("page-2.html".into())).unwrap();
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![Record {
                text: Some("Be yourself...".into()),
                author: Some("Oscar Wilde".into()),
            }]
        );
    }

    #[test]
    fn closed_sink_fails_scrap() {
        let (tx, rx) = unbounded();
        drop(rx);
        let conf = QuotesScraperConfig::new(tx);
        let res = scrap_page(&conf, PAGE.to_string(), PageLocation::Path("page.html".into()));
        assert!(res.is_err());
    }
}
