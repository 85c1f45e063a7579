//! Processor: produces one final status per URL record (spec.md §4.9).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;
use wm_frontier::{payload_digest, FilterChain, Statistics, UrlInfo, UrlTable, UrlUpdate, Waiter};
use wm_net::ConnectionPool;
use wm_robots::RobotsChecker;
use wm_scrape::Scraper;
use wm_session::{FtpDownloadSession, FtpFetch, NullRecorder};
use wm_types::{FetchError, NetworkError, RequestHead, RequestMethod, Status, UrlRecord};
use wm_web::WebClient;

use crate::writer::Writer;

/// Knobs the Processor consults per spec.md §4.9 and SPEC_FULL §10.3;
/// a subset of [`wm_config::EngineConfig`] the Engine resolves once at
/// startup.
pub struct ProcessorConfig {
    pub user_agent: String,
    pub compression: bool,
    pub robots_enabled: bool,
    pub duration_timeout: Option<Duration>,
    pub retry_connrefused: bool,
    pub retry_dns_error: bool,
    pub waiter_base: Duration,
    pub waiter_max: Duration,
    pub ftp_user: Option<String>,
    pub ftp_pass: Option<String>,
    pub spill_threshold: usize,
}

/// Orchestrates one URL record end to end: filter, fetch (HTTP or
/// FTP), classify, write, scrape, enqueue children.
pub struct Processor<'a> {
    table: &'a UrlTable,
    filters: &'a FilterChain,
    web: &'a WebClient,
    ftp_pool: &'a ConnectionPool,
    robots: Option<&'a RobotsChecker<'a>>,
    scraper: &'a dyn Scraper,
    writer: &'a dyn Writer,
    stats: &'a Statistics,
    config: ProcessorConfig,
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl<'a> Processor<'a> {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        table: &'a UrlTable,
        filters: &'a FilterChain,
        web: &'a WebClient,
        ftp_pool: &'a ConnectionPool,
        robots: Option<&'a RobotsChecker<'a>>,
        scraper: &'a dyn Scraper,
        writer: &'a dyn Writer,
        stats: &'a Statistics,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            table,
            filters,
            web,
            ftp_pool,
            robots,
            scraper,
            writer,
            stats,
            config,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the full per-URL pipeline and writes the final status (and
    /// any discovered children) back to the URL Table.
    pub async fn process(&self, record: UrlRecord) {
        let span = tracing::info_span!("process", url = %record.url);
        let _enter = span.enter();

        let Some(url) = Url::parse(&record.url).ok() else {
            warn!("unparseable URL record, marking skipped");
            let _ = self.table.check_in(&record.url, Status::Skipped, &UrlUpdate::default());
            return;
        };
        let info = UrlInfo { url: url.clone(), encoding: record.url_encoding };

        // Step 1: re-consult the filter chain (defense in depth; it was
        // already consulted once when the record was enqueued).
        let verdict = self.filters.test(&info, &record);
        if !verdict.allowed {
            debug!(?verdict.per_filter, "filtered out, skipping");
            let _ = self.table.check_in(&record.url, Status::Skipped, &UrlUpdate::default());
            return;
        }

        // Step 2: build the Request.
        let mut request = self.build_request(&url, &record);
        self.writer.process_request(&mut request);

        // Step 3: robots gate.
        if self.config.robots_enabled && matches!(url.scheme(), "http" | "https") {
            if let Some(robots) = self.robots {
                match robots.can_fetch(&url).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("robots.txt disallows, skipping");
                        let _ = self.table.check_in(&record.url, Status::Skipped, &UrlUpdate::default());
                        return;
                    }
                    Err(e) => {
                        self.on_transport_error(&record, &e);
                        return;
                    }
                }
            }
        }

        let host = url.host_str().unwrap_or_default().to_string();

        // spec.md §4.9 step 4: sleep for the per-host politeness delay
        // before issuing the request.
        tokio::time::sleep(self.wait_duration(&host)).await;

        let outcome = match url.scheme() {
            "ftp" => self.fetch_ftp(&url, &request).await,
            _ => self.fetch_http(&request).await,
        };

        match outcome {
            Ok(FetchResult { head, body }) => {
                self.classify_response(&record, &request, head, body, &host).await;
            }
            Err(e) => self.on_transport_error(&record, &e),
        }
    }

    fn build_request(&self, url: &Url, record: &UrlRecord) -> RequestHead {
        let mut request = match &record.post_data {
            Some(data) => {
                let mut req = RequestHead::get(url.clone());
                req.method = RequestMethod::Post;
                req.body = Some(data.clone().into_bytes());
                req.set_header("Content-Type", "application/x-www-form-urlencoded");
                req
            }
            None => RequestHead::get(url.clone()),
        };
        if let Some(referrer) = &record.referrer {
            request.set_header("Referer", referrer.clone());
        }
        request.set_header("User-Agent", self.config.user_agent.clone());
        if self.config.compression {
            request.set_header("Accept-Encoding", "gzip, deflate");
        }
        request
    }

    async fn fetch_http(&self, request: &RequestHead) -> Result<FetchResult, FetchError> {
        let outcome = self.web.fetch(request.clone(), self.config.duration_timeout, &NullRecorder).await?;
        Ok(FetchResult { head: outcome.head, body: outcome.body })
    }

    async fn fetch_ftp(&self, url: &Url, _request: &RequestHead) -> Result<FetchResult, FetchError> {
        let port = url.port_or_known_default().unwrap_or(21);
        let host = url.host_str().unwrap_or_default();
        let user = self.config.ftp_user.as_deref();
        let pass = self.config.ftp_pass.as_deref();

        let mut session = FtpDownloadSession::new(self.ftp_pool, self.config.spill_threshold);
        let is_directory = url.path().is_empty() || url.path().ends_with('/');
        let path = if url.path().is_empty() { "/" } else { url.path() };

        let result = if is_directory {
            session.list_directory(host, port, user, pass, path, &NullRecorder).await
        } else {
            session.retrieve_file(host, port, user, pass, path, None, &NullRecorder).await.map(FtpFetch::File)
        };

        session.release();

        let response_head = |content_type: &str| wm_types::ResponseHead {
            status_code: 226,
            reason: "Transfer complete".to_string(),
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            http_1_0: false,
        };

        match result {
            Ok(FtpFetch::File(body)) => Ok(FetchResult { head: response_head("application/octet-stream"), body }),
            Ok(FtpFetch::Listing { raw, .. }) => Ok(FetchResult { head: response_head("text/plain"), body: raw }),
            Err(e) => Err(e),
        }
    }

    async fn classify_response(
        &self,
        record: &UrlRecord,
        request: &RequestHead,
        response: wm_types::ResponseHead,
        mut body: wm_http::Body,
        host: &str,
    ) {
        let status_code = response.status_code;
        self.stats.record_status(status_code);

        if response.is_success() {
            self.writer.process_response(&response);
            let bytes = body.read_all().unwrap_or_default();
            let digest = payload_digest(&bytes);
            match self.table.get_revisit_id(&record.url, &digest) {
                Ok(Some(_warc_id)) => {
                    info!("revisit: identical payload digest as a prior fetch");
                    self.stats.record_duplicate(bytes.len() as u64);
                }
                Ok(None) => self.stats.record_file(bytes.len() as u64),
                Err(e) => warn!(error = %e, "revisit lookup failed"),
            }

            if let Err(e) = self.writer.save_document(request, &response, &mut body) {
                warn!(error = %e, "failed to save document");
            }

            if let Some(scraped) = self.scraper.scrape(request, &response, &bytes) {
                self.enqueue_children(record, &scraped);
            }

            let _ = self.table.check_in(
                &record.url,
                Status::Done,
                &UrlUpdate { status_code: Some(status_code), ..Default::default() },
            );
            self.reset_waiter(host);
        } else if response.is_permanent_failure() {
            self.writer.discard_document(request, &response);
            self.stats.record_skipped();
            self.note_status_exit_category(status_code);
            let _ = self.table.check_in(
                &record.url,
                Status::Skipped,
                &UrlUpdate { status_code: Some(status_code), ..Default::default() },
            );
            self.reset_waiter(host);
        } else {
            self.writer.discard_document(request, &response);
            self.stats.record_error();
            self.note_status_exit_category(status_code);
            let _ = self.table.check_in(
                &record.url,
                Status::Error,
                &UrlUpdate { status_code: Some(status_code), ..Default::default() },
            );
            self.increment_waiter(host);
        }
    }

    /// Folds a document response's status code into the exit-code
    /// severity table (spec.md §4.9 step 5 "increment server-error
    /// counter", §4.10's `server_error` category 8).
    fn note_status_exit_category(&self, status_code: u16) {
        if (500..600).contains(&status_code) {
            self.stats.note_exit_category(8);
        }
    }

    fn enqueue_children(&self, parent: &UrlRecord, scraped: &wm_scrape::ScrapeResult) {
        let mut children = Vec::new();
        for found in &scraped.urls {
            let mut record = parent.child(found.info.url.as_str(), found.inline, Some(found.link_type));
            record.url_encoding = scraped.encoding;
            let verdict = self.filters.test(&found.info, &record);
            if !verdict.allowed {
                continue;
            }
            children.push(record);
        }
        if let Err(e) = self.table.add_many(children) {
            warn!(error = %e, "failed to enqueue discovered URLs");
        }
    }

    fn on_transport_error(&self, record: &UrlRecord, error: &FetchError) {
        use wm_frontier::FrontierError;

        let status = match error {
            FetchError::Network(NetworkError::ConnectionRefused) if !self.config.retry_connrefused => Status::Skipped,
            FetchError::Network(NetworkError::DnsNotFound) if !self.config.retry_dns_error => Status::Skipped,
            _ => {
                self.stats.note_exit_category(error.exit_category());
                if let Some(host) = Url::parse(&record.url).ok().and_then(|u| u.host_str().map(str::to_string)) {
                    self.increment_waiter(&host);
                }
                Status::Error
            }
        };

        match status {
            Status::Skipped => self.stats.record_skipped(),
            Status::Error => self.stats.record_error(),
            _ => {}
        }

        debug!(error = %error, ?status, "transport exception");
        let result: Result<(), FrontierError> = self.table.check_in(&record.url, status, &UrlUpdate::default());
        if let Err(e) = result {
            warn!(error = %e, "failed to record transport exception");
        }
    }

    fn reset_waiter(&self, host: &str) {
        self.waiters.lock().unwrap().entry(host.to_string()).or_insert_with(|| self.new_waiter()).reset();
    }

    fn increment_waiter(&self, host: &str) {
        self.waiters.lock().unwrap().entry(host.to_string()).or_insert_with(|| self.new_waiter()).increment();
    }

    fn new_waiter(&self) -> Waiter {
        Waiter::new(self.config.waiter_base, self.config.waiter_max)
    }

    /// The delay a subsequent fetch to `host` should sleep before
    /// starting (spec.md §4.9 step 4 "sleep for `Waiter.get()`").
    pub fn wait_duration(&self, host: &str) -> Duration {
        self.waiters.lock().unwrap().entry(host.to_string()).or_insert_with(|| self.new_waiter()).get()
    }
}

struct FetchResult {
    head: wm_types::ResponseHead,
    body: wm_http::Body,
}
