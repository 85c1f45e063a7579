//! Link extraction from fetched documents (spec.md §6 "Scraper
//! interface"; SPEC_FULL §11 sitemap/CSS hints).

mod css;
mod dispatch;
mod html;
mod sitemap;

use wm_types::{LinkType, RequestHead, ResponseHead, UrlEncoding};
use wm_frontier::UrlInfo;

pub use dispatch::DefaultScraper;

/// One discovered URL plus the provenance the Processor needs to build
/// its child [`wm_types::UrlRecord`] (spec.md §4.9 step 7).
#[derive(Debug, Clone)]
pub struct ScrapedUrl {
    pub info: UrlInfo,
    pub inline: bool,
    pub link_type: LinkType,
}

/// The result of scraping one document: every discovered URL plus the
/// encoding they were parsed under.
#[derive(Debug)]
pub struct ScrapeResult {
    pub urls: Vec<ScrapedUrl>,
    pub encoding: UrlEncoding,
}

impl ScrapeResult {
    pub fn inline_urls(&self) -> impl Iterator<Item = &ScrapedUrl> {
        self.urls.iter().filter(|u| u.inline)
    }

    pub fn linked_urls(&self) -> impl Iterator<Item = &ScrapedUrl> {
        self.urls.iter().filter(|u| !u.inline)
    }
}

/// spec.md §6 "Scraper interface": `scrape(request, response) ->
/// {inline_urls, linked_urls, encoding, link_type?}|None`. `link_type`
/// is carried per discovered URL here rather than once per call, since
/// one document (an HTML page linking to a script and a stylesheet)
/// can yield URLs of more than one origin in a single scrape.
pub trait Scraper: Send + Sync {
    fn scrape(&self, request: &RequestHead, response: &ResponseHead, body: &[u8]) -> Option<ScrapeResult>;
}
