use std::cmp;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_page_buffer")]
    pub page_buffer: usize,

    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Maximum number of pages queued during a crawl, unbounded when `None`
    #[serde(default)]
    pub max_pages: Option<usize>,

    #[serde(default = "default_on_dl_error")]
    pub on_dl_error: OnError,

    #[serde(default = "default_on_scrap_error")]
    pub on_scrap_error: OnError,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            page_buffer: default_page_buffer(),
            num_workers: default_num_workers(),
            max_pages: None,
            on_dl_error: default_on_dl_error(),
            on_scrap_error: default_on_scrap_error(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

fn default_user_agent() -> String {
    String::from("toscrape-bot")
}

fn default_page_buffer() -> usize {
    10_000
}

fn default_num_workers() -> usize {
    cmp::max(1, num_cpus::get().saturating_sub(2))
}

fn default_on_dl_error() -> OnError {
    OnError::SkipAndLog
}

fn default_on_scrap_error() -> OnError {
    OnError::SkipAndLog
}

fn default_handle_sigint() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}
