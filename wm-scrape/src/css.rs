//! CSS `url(...)` reference extraction (SPEC_FULL §11 "CSS link
//! scraping hints"). Scans byte-for-byte rather than pulling in a full
//! CSS parser, matching the manual-parser style the rest of this
//! workspace uses for its wire formats.

use url::Url;
use wm_types::LinkType;

use crate::ScrapedUrl;

/// Every `url(...)` reference in a stylesheet body is a page requisite.
pub fn extract(body: &str, base: &Url) -> Vec<ScrapedUrl> {
    let mut found = Vec::new();
    let bytes = body.as_bytes();
    let mut i = 0;
    while let Some(offset) = find_subslice(&bytes[i..], b"url(") {
        let start = i + offset + 4;
        let Some(end_offset) = find_subslice(&bytes[start..], b")") else { break };
        let end = start + end_offset;
        let raw = body[start..end].trim();
        let raw = raw.trim_matches(['"', '\'', ' ']);
        if !raw.is_empty() {
            if let Some(info) = wm_frontier::UrlInfo::parse(raw, Some(base)) {
                found.push(ScrapedUrl { info, inline: true, link_type: LinkType::Css });
            }
        }
        i = end + 1;
    }
    found
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://host.test/css/site.css").unwrap()
    }

    #[test]
    fn extracts_quoted_and_unquoted_url_references() {
        let css = r#"body { background: url("bg.png"); } .a { background: url(bg2.png); }"#;
        let found = extract(css, &base());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|u| u.inline && u.link_type == LinkType::Css));
        assert_eq!(found[0].info.url.as_str(), "http://host.test/css/bg.png");
        assert_eq!(found[1].info.url.as_str(), "http://host.test/css/bg2.png");
    }

    #[test]
    fn no_url_references_yields_empty_vec() {
        assert!(extract("body { color: red; }", &base()).is_empty());
    }
}
