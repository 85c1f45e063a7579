//! HTTP Session: one request/response exchange over a pooled Connection
//! (spec.md §4.6).

use std::time::Duration;

use tracing::warn;
use wm_http::Body;
use wm_net::{ConnectionPool, Leased};
use wm_types::{FetchError, RequestHead, RequestMethod, ResponseHead};

use crate::recorder::Recorder;

/// One logical HTTP exchange: check out a Connection, write the request,
/// read the response head, then (on [`HttpSession::download`]) drain and
/// decode the body under an outer wall-clock timer.
pub struct HttpSession<'a> {
    pool: &'a ConnectionPool,
    leased: Option<Leased>,
    method_is_head: bool,
    http_1_0: bool,
    ignore_length: bool,
    spill_threshold: usize,
}

impl<'a> HttpSession<'a> {
    #[must_use]
    pub fn new(pool: &'a ConnectionPool, spill_threshold: usize) -> Self {
        Self {
            pool,
            leased: None,
            method_is_head: false,
            http_1_0: false,
            ignore_length: false,
            spill_threshold,
        }
    }

    /// Forces read-until-close body framing regardless of
    /// `Content-Length`, used by the Processor for known-broken servers.
    #[must_use]
    pub fn ignore_length(mut self, ignore: bool) -> Self {
        self.ignore_length = ignore;
        self
    }

    /// Checks out a Connection, connects it if fresh, writes `request`,
    /// and reads the response head.
    pub async fn start(
        &mut self,
        request: &RequestHead,
        keep_alive: bool,
        recorder: &dyn Recorder,
    ) -> Result<ResponseHead, FetchError> {
        self.method_is_head = matches!(request.method, RequestMethod::Head);

        let host = request.url.host_str().unwrap_or_default().to_string();
        let port = request
            .url
            .port_or_known_default()
            .unwrap_or(if request.url.scheme() == "https" { 443 } else { 80 });
        let use_ssl = request.url.scheme() == "https";

        let leased = self
            .pool
            .acquire(&host, port, use_ssl, None)
            .await
            .map_err(FetchError::Network)?;
        self.leased = Some(leased);

        let target = match request.url.query() {
            Some(q) => format!("{}?{q}", request.url.path()),
            None => request.url.path().to_string(),
        };

        recorder.pre_request(request);
        {
            let conn = &mut self.leased.as_mut().expect("just set").conn;
            wm_http::write_request(conn, request, &target, keep_alive).await?;
        }
        recorder.request(request);

        let head = {
            let conn = &mut self.leased.as_mut().expect("just set").conn;
            wm_http::read_head(conn).await?
        };
        self.http_1_0 = head.http_1_0;
        recorder.pre_response(&head);
        Ok(head)
    }

    /// Drains and decodes the body under `duration_timeout`, then decides
    /// whether the Connection returns to the pool (spec.md §4.6 "Connection
    /// release policy").
    pub async fn download(
        mut self,
        head: &mut ResponseHead,
        duration_timeout: Option<Duration>,
        recorder: &dyn Recorder,
    ) -> Result<Body, FetchError> {
        let mut leased = self.leased.take().expect("start must be called before download");

        let read = wm_http::read_body(&mut leased.conn, head, self.method_is_head, self.ignore_length, self.spill_threshold);
        let result = match duration_timeout {
            Some(d) => match tokio::time::timeout(d, read).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::DurationTimeout),
            },
            None => read.await,
        };

        let reuse = result.is_ok() && should_reuse(head, self.http_1_0, self.ignore_length);
        self.pool.release(&leased.key, leased.conn, reuse);

        recorder.response(head);
        result
    }
}

impl Drop for HttpSession<'_> {
    /// A Session destroyed without `download` being called force-recycles
    /// its Connection rather than leaking the slot back to the pool in an
    /// indeterminate state.
    fn drop(&mut self) {
        if let Some(mut leased) = self.leased.take() {
            warn!(host = %leased.key.host, "HTTP session dropped before download; force-recycling connection");
            leased.conn.close();
            self.pool.release(&leased.key, leased.conn, false);
        }
    }
}

fn should_reuse(head: &ResponseHead, http_1_0: bool, ignore_length: bool) -> bool {
    if ignore_length {
        return false;
    }
    if let Some(value) = head.header("Connection") {
        if value.eq_ignore_ascii_case("close") {
            return false;
        }
        if http_1_0 && !value.eq_ignore_ascii_case("keep-alive") {
            return false;
        }
    } else if http_1_0 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_with(headers: &[(&str, &str)]) -> ResponseHead {
        ResponseHead {
            status_code: 200,
            reason: "OK".into(),
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            http_1_0: false,
        }
    }

    #[test]
    fn explicit_connection_close_prevents_reuse() {
        let head = head_with(&[("Connection", "close")]);
        assert!(!should_reuse(&head, false, false));
    }

    #[test]
    fn http_1_0_without_keep_alive_prevents_reuse() {
        let head = head_with(&[]);
        assert!(!should_reuse(&head, true, false));
    }

    #[test]
    fn http_1_0_with_keep_alive_allows_reuse() {
        let head = head_with(&[("Connection", "keep-alive")]);
        assert!(should_reuse(&head, true, false));
    }

    #[test]
    fn ignore_length_always_prevents_reuse() {
        let head = head_with(&[]);
        assert!(!should_reuse(&head, false, true));
    }

    #[test]
    fn http_1_1_with_no_connection_header_allows_reuse() {
        let head = head_with(&[]);
        assert!(should_reuse(&head, false, false));
    }
}
