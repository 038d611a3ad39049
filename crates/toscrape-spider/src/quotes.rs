//! Quote extraction rule for `quotes.toscrape.com` pages.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::document::{Marker, PageDocument, PageElement};

/// Where a crawl of the quotes site starts.
pub const SEED_URL: &str = "http://quotes.toscrape.com/";

const QUOTE: Marker = Marker::class("div", "quote");
const QUOTE_TEXT: Marker = Marker::class("span", "text");
const AUTHOR: Marker = Marker::class("small", "author");
const NEXT_PAGE: Marker = Marker::class("li", "next");
const LINK: Marker = Marker::tag("a");

/// One quotation and its author, either may be missing from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub text: Option<String>,
    pub author: Option<String>,
}

/// The next page to download and process with [`extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRequest {
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageOutput {
    pub records: Vec<Record>,
    pub follow: Option<FollowRequest>,
}

/// The request a crawl starts with.
pub fn start(seed_url: &str) -> Result<FollowRequest, url::ParseError> {
    Ok(FollowRequest {
        url: Url::parse(seed_url)?,
    })
}

/// Extracts the quotes of a page and the link to its next page.
///
/// Missing elements never fail the extraction, they show up as `None` fields
/// or as an absent follow-up request which ends the crawl.
pub fn extract<D: PageDocument>(document: &D, base_url: &Url) -> PageOutput {
    let records = document
        .find_all(&QUOTE)
        .into_iter()
        .map(|quote| Record {
            text: first_text_of(&quote, &QUOTE_TEXT),
            author: first_text_of(&quote, &AUTHOR),
        })
        .collect();

    let follow = next_page(document).and_then(|href| match base_url.join(href) {
        Ok(url) => Some(FollowRequest { url }),
        Err(e) => {
            log::warn!("Ignoring next page link {href:?} on {base_url}: {e}");
            None
        }
    });

    PageOutput { records, follow }
}

fn first_text_of<'a, E: PageElement<'a>>(elem: &E, marker: &Marker) -> Option<String> {
    elem.find_all(marker)
        .into_iter()
        .find_map(|found| found.first_text())
        .map(str::to_string)
}

fn next_page<D: PageDocument>(document: &D) -> Option<&str> {
    document
        .find_all(&NEXT_PAGE)
        .into_iter()
        .flat_map(|next| next.find_all(&LINK))
        .find_map(|link| link.attr("href"))
}
