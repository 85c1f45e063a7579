//! `<loc>` extraction from sitemap.xml documents (SPEC_FULL §11
//! "sitemap link scraping hints"). Hand-rolled tag scan, not a general
//! XML parser: sitemaps are a closed, well-known tag vocabulary.

use url::Url;
use wm_types::LinkType;

use crate::ScrapedUrl;

/// Sitemap entries are linked pages, never inline page requisites.
pub fn extract(body: &str, base: &Url) -> Vec<ScrapedUrl> {
    let mut found = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<loc>") {
        let after_open = &rest[start + "<loc>".len()..];
        let Some(end) = after_open.find("</loc>") else { break };
        let raw = after_open[..end].trim();
        if let Some(info) = wm_frontier::UrlInfo::parse(raw, Some(base)) {
            found.push(ScrapedUrl { info, inline: false, link_type: LinkType::Sitemap });
        }
        rest = &after_open[end + "</loc>".len()..];
    }
    found
}

/// A cheap structural check used by the dispatcher when Content-Type
/// doesn't disambiguate: sitemap documents declare a `urlset` or
/// `sitemapindex` root element.
#[must_use]
pub fn looks_like_sitemap(body: &str) -> bool {
    body.contains("<urlset") || body.contains("<sitemapindex")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://host.test/sitemap.xml").unwrap()
    }

    #[test]
    fn extracts_every_loc_entry() {
        let xml = "<urlset><url><loc>http://host.test/a</loc></url>\
                   <url><loc>http://host.test/b</loc></url></urlset>";
        let found = extract(xml, &base());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|u| !u.inline && u.link_type == LinkType::Sitemap));
    }

    #[test]
    fn looks_like_sitemap_detects_urlset_root() {
        assert!(looks_like_sitemap("<urlset></urlset>"));
        assert!(!looks_like_sitemap("<html></html>"));
    }
}
