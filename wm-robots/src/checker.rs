//! Per-origin robots.txt cache and the `can_fetch` gate the Processor
//! consults before every fetch (spec.md §4.8).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;
use url::Url;
use wm_session::NullRecorder;
use wm_types::{FetchError, RequestHead};
use wm_web::WebClient;

use crate::rules::Robots;

/// Keys the Robots Pool by `(scheme, host, port)`, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OriginKey {
    scheme: String,
    host: String,
    port: u16,
}

impl OriginKey {
    fn for_url(url: &Url) -> Option<Self> {
        Some(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_string(),
            port: url.port_or_known_default()?,
        })
    }

    fn robots_url(&self) -> Url {
        let authority = format!("{}://{}:{}/robots.txt", self.scheme, self.host, self.port);
        Url::parse(&authority).expect("scheme/host/port always produce a valid URL")
    }
}

/// A per-origin cache mapping `(scheme, host, port)` to a parsed
/// robots.txt ruleset. Missing key means "fetch required"; an installed
/// empty ruleset means "allow all" (used after fetch failures other than
/// a 5xx, per spec.md §4.8).
#[derive(Default)]
pub struct RobotsPool {
    entries: Mutex<HashMap<OriginKey, Robots>>,
}

impl RobotsPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Gates fetches on robots.txt, fetching and caching per origin through
/// the [`WebClient`] (so redirects/cookies on the robots.txt request
/// itself are handled transparently, same as any other fetch).
pub struct RobotsChecker<'a> {
    pool: RobotsPool,
    client: &'a WebClient,
    user_agent: String,
    timeout: Duration,
}

impl<'a> RobotsChecker<'a> {
    #[must_use]
    pub fn new(client: &'a WebClient, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self { pool: RobotsPool::new(), client, user_agent: user_agent.into(), timeout }
    }

    /// Answers whether `url` may be fetched, fetching and caching
    /// robots.txt for its origin on first use.
    pub async fn can_fetch(&self, url: &Url) -> Result<bool, FetchError> {
        let Some(key) = OriginKey::for_url(url) else {
            return Ok(true);
        };

        if let Some(robots) = self.pool.entries.lock().unwrap().get(&key) {
            return Ok(robots.is_allowed(url.path(), &self.user_agent));
        }

        let robots = self.fetch_and_parse(&key).await?;
        let allowed = robots.is_allowed(url.path(), &self.user_agent);
        self.pool.entries.lock().unwrap().insert(key, robots);
        Ok(allowed)
    }

    async fn fetch_and_parse(&self, key: &OriginKey) -> Result<Robots, FetchError> {
        let request = RequestHead::get(key.robots_url()).with_header("User-Agent", self.user_agent.clone());
        let outcome = self.client.fetch(request, Some(self.timeout), &NullRecorder).await;

        match outcome {
            Ok(mut outcome) if (200..300).contains(&outcome.head.status_code) => {
                use std::io::Read;
                let mut text = String::new();
                match outcome.body.read_to_string(&mut text) {
                    Ok(_) => Ok(Robots::parse(&text)),
                    Err(e) => {
                        debug!(error = %e, "robots.txt body unreadable, defaulting to allow-all");
                        Ok(Robots::allow_all())
                    }
                }
            }
            Ok(outcome) if (500..600).contains(&outcome.head.status_code) => {
                Err(FetchError::Server(outcome.head.status_code))
            }
            Ok(_) => Ok(Robots::allow_all()),
            Err(FetchError::Server(code)) => Err(FetchError::Server(code)),
            Err(e) => {
                debug!(error = %e, "robots.txt fetch failed, defaulting to allow-all");
                Ok(Robots::allow_all())
            }
        }
    }
}
