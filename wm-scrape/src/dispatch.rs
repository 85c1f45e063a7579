//! Default [`Scraper`] implementation (spec.md §6): dispatches on
//! `Content-Type`, falling back to sniffing the body when the header is
//! absent or generic.

use wm_types::{RequestHead, ResponseHead, UrlEncoding};

use crate::{css, html, sitemap, ScrapeResult, Scraper};

#[derive(Default)]
pub struct DefaultScraper;

impl Scraper for DefaultScraper {
    fn scrape(&self, request: &RequestHead, response: &ResponseHead, body: &[u8]) -> Option<ScrapeResult> {
        let text = std::str::from_utf8(body).ok()?;
        let content_type = response.header("Content-Type").unwrap_or_default();
        let base = &request.url;

        let urls = if content_type.contains("css") {
            css::extract(text, base)
        } else if content_type.contains("xml") || sitemap::looks_like_sitemap(text) {
            sitemap::extract(text, base)
        } else if content_type.contains("html") || content_type.is_empty() {
            html::extract(text, base)
        } else {
            return None;
        };

        if urls.is_empty() {
            return None;
        }

        Some(ScrapeResult { urls, encoding: UrlEncoding::Utf8 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn response(content_type: &str) -> ResponseHead {
        ResponseHead {
            status_code: 200,
            reason: "OK".into(),
            headers: vec![("Content-Type".into(), content_type.into())],
            http_1_0: false,
        }
    }

    #[test]
    fn dispatches_html_by_content_type() {
        let request = RequestHead::get(Url::parse("http://host.test/page.html").unwrap());
        let result = DefaultScraper
            .scrape(&request, &response("text/html; charset=utf-8"), br#"<a href="a">x</a>"#)
            .unwrap();
        assert_eq!(result.urls.len(), 1);
    }

    #[test]
    fn dispatches_sitemap_by_body_sniff_when_content_type_is_xml() {
        let request = RequestHead::get(Url::parse("http://host.test/sitemap.xml").unwrap());
        let xml = b"<urlset><url><loc>http://host.test/a</loc></url></urlset>";
        let result = DefaultScraper.scrape(&request, &response("application/xml"), xml).unwrap();
        assert_eq!(result.urls.len(), 1);
    }

    #[test]
    fn no_extractable_links_returns_none() {
        let request = RequestHead::get(Url::parse("http://host.test/page.html").unwrap());
        let result = DefaultScraper.scrape(&request, &response("text/html"), b"<p>no links here</p>");
        assert!(result.is_none());
    }
}
