use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use tokio::runtime;
use toscrape_crawler::{crawl_site, CrawlerConfig, OnError, PageLocation};
use toscrape_spider::writer::FileMode;
use toscrape_spider::{
    scrap_page, OutputFormat, QuotesScraper, QuotesScraperConfig, RecordWriter,
    RecordWriterConfig, SEED_URL,
};

/// Quotes to Scrape crawler
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "crawl")]
    Crawl(CrawlArgs),
    #[command(name = "scrap")]
    Scrap(ScrapArgs),
    #[command(hide = true)]
    Completion,
}

/// Crawl quotes pages, following next page links, and export their quotes
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Path to the output file, records are written to stdout when missing
    #[arg(long, short)]
    pub output_file: Option<PathBuf>,
    /// Optional record writer yaml configuration file
    #[arg(env = "TOSCRAPE_WRITER_CONFIG", long)]
    pub writer_config: Option<PathBuf>,
    /// Override writer's output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
    /// Override how the output file is opened
    #[arg(long, value_enum)]
    pub file_mode: Option<FileMode>,
    /// First page to crawl
    #[arg(long, default_value = SEED_URL)]
    pub seed: String,
    /// Optional default crawler yaml configuration file
    #[arg(env = "TOSCRAPE_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override crawler's page buffer size
    #[arg(long)]
    pub page_buffer: Option<usize>,
    /// Override crawler's number of CPU workers used to parse pages
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// Override crawler's maximum number of pages to download
    #[arg(long)]
    pub max_pages: Option<usize>,
    /// No SIGINT handling
    #[arg(long)]
    pub no_sigint: bool,
    /// Override crawler's download error handling strategy
    #[arg(value_enum, long)]
    pub on_dl_error: Option<OnError>,
    /// Override crawler's scrap error handling strategy
    #[arg(value_enum, long)]
    pub on_scrap_error: Option<OnError>,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(page_buffer) = args.page_buffer {
            conf.page_buffer = page_buffer;
        }
        if let Some(num_workers) = args.num_workers {
            conf.num_workers = num_workers;
        }
        if let Some(max_pages) = args.max_pages {
            conf.max_pages = Some(max_pages);
        }
        if let Some(on_dl_error) = args.on_dl_error {
            conf.on_dl_error = on_dl_error;
        }
        if let Some(on_scrap_error) = args.on_scrap_error {
            conf.on_scrap_error = on_scrap_error;
        }
        if args.no_sigint {
            conf.handle_sigint = false;
        }
        Ok(conf)
    }
}

impl TryFrom<&CrawlArgs> for RecordWriterConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = load_writer_config(args.writer_config.as_ref())?;
        if let Some(format) = args.format {
            conf.format = format;
        }
        if let Some(file_mode) = args.file_mode {
            conf.file_mode = file_mode;
        }
        Ok(conf)
    }
}

fn load_writer_config(path: Option<&PathBuf>) -> anyhow::Result<RecordWriterConfig> {
    match path.map(File::open) {
        Some(file) => Ok(serde_yaml::from_reader(file?)?),
        None => Ok(RecordWriterConfig::default()),
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let crawler_conf = CrawlerConfig::try_from(&args)?;
    let writer_conf = RecordWriterConfig::try_from(&args)?;
    let writer = RecordWriter::spawn(&writer_conf, args.output_file.as_deref())?;
    let scraper_conf = QuotesScraperConfig {
        seed: args.seed,
        ..QuotesScraperConfig::new(writer.sender())
    };

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let res = rt.block_on(crawl_site::<QuotesScraper>(&crawler_conf, &scraper_conf));

    drop(scraper_conf);
    let written = writer.finish()?;
    let stats = res?;

    log::info!(
        "Scraped {} page(s), wrote {written} record(s)",
        stats.pages_scraped
    );
    if stats.urls_dropped > 0 {
        log::warn!("Page limit reached, {} page(s) not crawled", stats.urls_dropped);
    }
    Ok(())
}

/// Scrap a single page and print its quotes to stdout
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("page").required(true))]
pub struct ScrapArgs {
    /// A local html page to scrap
    #[arg(group = "page", long)]
    pub file: Option<PathBuf>,
    /// A distant html page to scrap
    #[arg(group = "page", long)]
    pub url: Option<String>,
    /// URL the local page was saved from, used to resolve the next page link
    #[arg(long, conflicts_with = "url")]
    pub base_url: Option<String>,
    /// Optional record writer yaml configuration file
    #[arg(env = "TOSCRAPE_WRITER_CONFIG", long)]
    pub writer_config: Option<PathBuf>,
    /// Override writer's output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
    /// Custom user agent to download the page
    #[arg(long, conflicts_with = "file")]
    pub ua: Option<String>,
}

pub fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let mut writer_conf = load_writer_config(args.writer_config.as_ref())?;
    if let Some(format) = args.format {
        writer_conf.format = format;
    }

    let (page, location) = if let Some(url) = args.url {
        let mut builder = reqwest::blocking::ClientBuilder::new();
        if let Some(ua) = args.ua {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;
        let resp = client.get(&url).send()?.error_for_status()?;
        let location = PageLocation::Url(resp.url().to_string());
        (resp.text()?, location)
    } else if let Some(path) = args.file {
        let page = fs::read_to_string(&path)?;
        (page, PageLocation::Path(path))
    } else {
        anyhow::bail!("Missing `url` or `file`");
    };

    let writer = RecordWriter::spawn(&writer_conf, None)?;
    let scraper_conf = QuotesScraperConfig {
        base_url: args.base_url,
        ..QuotesScraperConfig::new(writer.sender())
    };

    let res = scrap_page(&scraper_conf, page, location);
    drop(scraper_conf);
    writer.finish()?;
    res
}

fn init_logger(default_filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                init_logger("toscrape_spider=info,toscrape_crawler=info,toscrape_cli=info");
            }
            crawl(args)
        }
        SubCommand::Scrap(args) => {
            init_logger("toscrape_spider=info,toscrape_crawler=info");
            scrap(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "toscrape", &mut io::stdout());
            Ok(())
        }
    }
}
