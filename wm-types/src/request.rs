//! Per-fetch request/response values (not persisted; see spec.md §3).

/// HTTP method. FTP sessions ignore this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Head,
    Post,
}

impl RequestMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Head => "HEAD",
            RequestMethod::Post => "POST",
        }
    }
}

/// A request's method/URL/header/body-producing fields, independent of
/// the wire representation (HTTP or FTP) that will serialize it.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: RequestMethod,
    pub url: url::Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RequestHead {
    #[must_use]
    pub fn get(url: url::Url) -> Self {
        Self {
            method: RequestMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace an existing header (case-insensitively) or append it.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if let Some(existing) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            existing.1 = value.into();
        } else {
            self.headers.push((name, value.into()));
        }
    }
}

/// The status line and headers of a response, before the body is read.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status_code: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    /// Parsed off the status line (`HTTP/1.0` vs `HTTP/1.1`); governs
    /// the §4.6 "close if HTTP/1.0 without explicit keep-alive" release
    /// rule.
    pub http_1_0: bool,
}

impl ResponseHead {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status_code, 200..=299 | 304)
    }

    /// True for the status codes the Processor treats as permanently
    /// un-retriable (spec.md §4.9 step 5).
    #[must_use]
    pub fn is_permanent_failure(&self) -> bool {
        matches!(self.status_code, 401 | 403 | 404 | 405 | 410)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut req = RequestHead::get(url::Url::parse("http://host/").unwrap());
        req.set_header("Accept-Encoding", "identity");
        req.set_header("accept-encoding", "gzip, deflate");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("ACCEPT-ENCODING"), Some("gzip, deflate"));
    }
}
