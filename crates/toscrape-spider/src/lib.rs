pub mod document;
pub mod quotes;
mod spider;
pub mod writer;

pub use quotes::{extract, start, FollowRequest, PageOutput, Record, SEED_URL};
pub use spider::{scrap_page, QuotesScraper, QuotesScraperConfig};
pub use writer::{OutputFormat, RecordWriter, RecordWriterConfig};
