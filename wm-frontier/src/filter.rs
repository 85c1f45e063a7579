//! The URL Filter chain (spec.md §4.9 step 1/step 7, §6 "URL Filter
//! interface"): each filter answers `test(url_info, url_record) -> bool`;
//! the chain (demux) returns both the aggregate verdict and a per-filter
//! map for observability.

use wm_types::UrlRecord;

use crate::url_info::UrlInfo;

/// One admissibility test against a discovered or re-checked-out URL.
pub trait UrlFilter: Send + Sync {
    /// A short, stable name this filter is reported under in
    /// [`FilterChain::test`]'s per-filter map.
    fn name(&self) -> &'static str;
    fn test(&self, info: &UrlInfo, record: &UrlRecord) -> bool;
}

/// Caps recursion depth. `max_level = None` means unbounded.
pub struct LevelFilter {
    pub max_level: Option<u32>,
}

impl UrlFilter for LevelFilter {
    fn name(&self) -> &'static str {
        "level"
    }

    fn test(&self, _info: &UrlInfo, record: &UrlRecord) -> bool {
        self.max_level.is_none_or(|max| record.level <= max)
    }
}

/// Bounds the number of attempts a URL may be retried. Per SPEC_FULL §12
/// ("open question" resolution), `max_tries = 0` means unlimited,
/// applied consistently here and at the Processor's error-path re-check.
pub struct TriesFilter {
    pub max_tries: u32,
}

impl UrlFilter for TriesFilter {
    fn name(&self) -> &'static str {
        "tries"
    }

    fn test(&self, _info: &UrlInfo, record: &UrlRecord) -> bool {
        self.max_tries == 0 || record.try_count < self.max_tries
    }
}

/// Restricts fetches to an allowed scheme set (typically `http`/`https`,
/// plus `ftp` when FTP mirroring is enabled).
pub struct SchemeFilter {
    pub allowed: Vec<String>,
}

impl UrlFilter for SchemeFilter {
    fn name(&self) -> &'static str {
        "scheme"
    }

    fn test(&self, info: &UrlInfo, _record: &UrlRecord) -> bool {
        self.allowed.iter().any(|s| s.eq_ignore_ascii_case(info.url.scheme()))
    }
}

/// Keeps a crawl within the seed's own host(s) ("span hosts" off by
/// default); an empty `allowed_hosts` set disables the restriction.
pub struct SpanHostsFilter {
    pub allowed_hosts: Vec<String>,
}

impl UrlFilter for SpanHostsFilter {
    fn name(&self) -> &'static str {
        "span_hosts"
    }

    fn test(&self, info: &UrlInfo, _record: &UrlRecord) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let Some(host) = info.url.host_str() else { return false };
        self.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
    }
}

/// The verdict for one URL against every filter in the chain.
#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub allowed: bool,
    /// `(filter name, passed)` for every filter consulted, in chain
    /// order — the "per-filter map for observability" spec.md §6 asks for.
    pub per_filter: Vec<(&'static str, bool)>,
}

/// An ordered sequence of [`UrlFilter`]s; a URL is admissible only if
/// every filter passes.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn UrlFilter>>,
}

impl FilterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, filter: impl UrlFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    #[must_use]
    pub fn test(&self, info: &UrlInfo, record: &UrlRecord) -> FilterVerdict {
        let mut per_filter = Vec::with_capacity(self.filters.len());
        let mut allowed = true;
        for filter in &self.filters {
            let passed = filter.test(info, record);
            per_filter.push((filter.name(), passed));
            allowed &= passed;
        }
        FilterVerdict { allowed, per_filter }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wm_types::UrlEncoding;

    fn info(url: &str) -> UrlInfo {
        UrlInfo { url: Url::parse(url).unwrap(), encoding: UrlEncoding::Utf8 }
    }

    #[test]
    fn tries_zero_means_unlimited() {
        let filter = TriesFilter { max_tries: 0 };
        let mut record = UrlRecord::seed("http://host/a");
        record.try_count = 1000;
        assert!(filter.test(&info("http://host/a"), &record));
    }

    #[test]
    fn chain_fails_fast_reports_every_filter() {
        let chain = FilterChain::new()
            .with(SchemeFilter { allowed: vec!["http".into(), "https".into()] })
            .with(LevelFilter { max_level: Some(1) });
        let mut record = UrlRecord::seed("ftp://host/a");
        record.level = 5;
        let verdict = chain.test(&info("ftp://host/a"), &record);
        assert!(!verdict.allowed);
        assert_eq!(verdict.per_filter, vec![("scheme", false), ("level", false)]);
    }

    #[test]
    fn span_hosts_empty_allows_any_host() {
        let filter = SpanHostsFilter { allowed_hosts: vec![] };
        assert!(filter.test(&info("http://anywhere.test/"), &UrlRecord::seed("http://anywhere.test/")));
    }
}
