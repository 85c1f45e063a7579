//! Shared cookie jar (spec.md §4.7 "Cookies"): attaches cookie headers
//! before a request is sent and extracts `Set-Cookie` back into the jar
//! after a response is received. Shared across sessions, so add/extract
//! is serialized behind a single lock (spec.md §5 "Shared-resource
//! policy").

use std::sync::Mutex;

use cookie_store::CookieStore;
use tracing::debug;
use url::Url;
use wm_types::{RequestHead, ResponseHead};

/// A cookie jar shared by every [`WebClient`](crate::client::WebClient)
/// fetch.
pub struct CookieJar {
    store: Mutex<CookieStore>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self { store: Mutex::new(CookieStore::default()) }
    }

    /// Computes and attaches the `Cookie` header for `request`, keyed by
    /// `request`'s own URL (the spec's "(request, referrer-host)" pair
    /// collapses to a per-request lookup since `cookie_store` already
    /// scopes by domain/path; the stable referrer-host is retained by the
    /// caller only to decide *whether* to send third-party cookies, which
    /// this engine does not special-case beyond domain matching).
    pub fn attach(&self, request: &mut RequestHead) {
        let store = self.store.lock().unwrap();
        let pairs: Vec<(String, String)> = store
            .get_request_values(&request.url)
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        drop(store);

        if pairs.is_empty() {
            return;
        }
        let header = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        request.set_header("Cookie", header);
    }

    /// Extracts any `Set-Cookie` headers in `response` back into the jar,
    /// scoped to `url`.
    pub fn extract(&self, response: &ResponseHead, url: &Url) {
        let mut store = self.store.lock().unwrap();
        for (name, value) in &response.headers {
            if !name.eq_ignore_ascii_case("set-cookie") {
                continue;
            }
            match cookie::Cookie::parse(value.clone()) {
                Ok(parsed) => {
                    if let Err(e) = store.insert_raw(&parsed, url) {
                        debug!(url = %url, error = %e, "rejected Set-Cookie");
                    }
                }
                Err(e) => debug!(url = %url, error = %e, "malformed Set-Cookie header"),
            }
        }
    }
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracted_cookie_is_attached_to_a_later_request() {
        let jar = CookieJar::new();
        let url = Url::parse("http://host.test/").unwrap();
        let response = ResponseHead {
            status_code: 200,
            reason: "OK".into(),
            headers: vec![("Set-Cookie".into(), "session=abc123; Path=/".into())],
            http_1_0: false,
        };
        jar.extract(&response, &url);

        let mut request = RequestHead::get(url);
        jar.attach(&mut request);
        assert_eq!(request.header("Cookie"), Some("session=abc123"));
    }

    #[test]
    fn no_cookie_header_when_jar_is_empty() {
        let jar = CookieJar::new();
        let mut request = RequestHead::get(Url::parse("http://host.test/").unwrap());
        jar.attach(&mut request);
        assert_eq!(request.header("Cookie"), None);
    }
}
