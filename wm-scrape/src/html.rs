//! HTML anchor/img/script/link extraction (spec.md §6 "Scraper
//! interface"; grounded on the teacher's HTML-walking pattern in its
//! Markdown extractor, adapted from full-document conversion to pure
//! link harvesting).

use scraper::{Html, Selector};
use url::Url;
use wm_types::LinkType;

use crate::ScrapedUrl;

/// Anchors are "linked" documents; everything else that makes a page
/// render correctly (images, scripts, stylesheets) is a page requisite
/// and scraped as `inline`.
pub fn extract(body: &str, base: &Url) -> Vec<ScrapedUrl> {
    let document = Html::parse_document(body);
    let mut found = Vec::new();

    push_attr(&document, "a[href]", "href", base, false, LinkType::Html, &mut found);
    push_attr(&document, "img[src]", "src", base, true, LinkType::Html, &mut found);
    push_attr(&document, "script[src]", "src", base, true, LinkType::JavaScript, &mut found);
    push_attr(
        &document,
        "link[rel=stylesheet][href]",
        "href",
        base,
        true,
        LinkType::Css,
        &mut found,
    );

    found
}

fn push_attr(
    document: &Html,
    selector: &str,
    attr: &str,
    base: &Url,
    inline: bool,
    link_type: LinkType,
    out: &mut Vec<ScrapedUrl>,
) {
    let Ok(selector) = Selector::parse(selector) else { return };
    for element in document.select(&selector) {
        let Some(raw) = element.value().attr(attr) else { continue };
        let Some(info) = wm_frontier::UrlInfo::parse(raw, Some(base)) else { continue };
        out.push(ScrapedUrl { info, inline, link_type });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://host.test/dir/page.html").unwrap()
    }

    #[test]
    fn anchor_is_linked_not_inline() {
        let found = extract(r#"<a href="other.html">link</a>"#, &base());
        assert_eq!(found.len(), 1);
        assert!(!found[0].inline);
        assert_eq!(found[0].link_type, LinkType::Html);
        assert_eq!(found[0].info.url.as_str(), "http://host.test/dir/other.html");
    }

    #[test]
    fn image_and_script_are_inline_page_requisites() {
        let found = extract(
            r#"<img src="logo.png"><script src="app.js"></script>"#,
            &base(),
        );
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|u| u.inline));
        assert!(found.iter().any(|u| u.link_type == LinkType::Html));
        assert!(found.iter().any(|u| u.link_type == LinkType::JavaScript));
    }

    #[test]
    fn stylesheet_link_tag_tagged_css() {
        let found = extract(r#"<link rel="stylesheet" href="style.css">"#, &base());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].link_type, LinkType::Css);
        assert!(found[0].inline);
    }
}
