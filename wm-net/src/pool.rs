//! Keyed connection pool: per-host and global caps, keep-alive reuse,
//! happy-eyeballs dialing, and optional HTTP-proxy tunneling
//! (spec.md §4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use tokio::sync::Notify;
use tracing::{debug, warn};
use wm_types::NetworkError;

use crate::connection::{ConnState, Connection};
use crate::dns;
use crate::happy_eyeballs::{self, HappyEyeballsTable};
use crate::tls::VerifyMode;

/// Identifies one logical destination. A proxy deployment maps many
/// logical `(host, port, tls)` triples onto one physical `HostKey` by
/// supplying a caller override (spec.md §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Optional HTTP proxy configuration, consulted by [`ConnectionPool::acquire`].
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

struct HostPoolInner {
    ready: Mutex<Vec<Connection>>,
    busy: AtomicUsize,
    notify: Notify,
}

impl HostPoolInner {
    fn new() -> Self {
        Self {
            ready: Mutex::new(Vec::new()),
            busy: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }
}

pub struct ConnectionPoolConfig {
    pub max_count: usize,
    pub max_host_count: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub happy_eyeballs_ttl: Duration,
    pub verify_mode: VerifyMode,
    pub proxy: Option<ProxyConfig>,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_count: 200,
            max_host_count: 6,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            happy_eyeballs_ttl: Duration::from_secs(600),
            verify_mode: VerifyMode::Full,
            proxy: None,
        }
    }
}

/// A connection checked out of the pool. On drop without an explicit
/// [`ConnectionPool::release`] call, the connection is simply discarded
/// (closed) rather than returned — callers that want reuse must release
/// explicitly, matching the spec's "connection release policy" being a
/// deliberate decision made by the session, not an accident of scope
/// exit.
pub struct Leased {
    pub key: HostKey,
    pub conn: Connection,
}

pub struct ConnectionPool {
    config: ConnectionPoolConfig,
    pools: Mutex<HashMap<HostKey, Arc<HostPoolInner>>>,
    eyeballs: HappyEyeballsTable,
    total_busy: AtomicUsize,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(config: ConnectionPoolConfig) -> Self {
        Self {
            config,
            pools: Mutex::new(HashMap::new()),
            eyeballs: HappyEyeballsTable::new(),
            total_busy: AtomicUsize::new(0),
        }
    }

    fn pool_for(&self, key: &HostKey) -> Arc<HostPoolInner> {
        let mut pools = self.pools.lock().unwrap();
        pools
            .entry(key.clone())
            .or_insert_with(|| Arc::new(HostPoolInner::new()))
            .clone()
    }

    /// Acquires a connection to `(host, port)`. `host_key` lets a caller
    /// (the HTTP-proxy path) key the pool by the *logical* destination
    /// while the physical dial target is the proxy.
    pub async fn acquire(
        &self,
        host: &str,
        port: u16,
        use_ssl: bool,
        host_key: Option<HostKey>,
    ) -> Result<Leased, NetworkError> {
        let key = host_key.unwrap_or_else(|| HostKey {
            host: host.to_string(),
            port,
            tls: use_ssl,
        });
        let pool = self.pool_for(&key);

        loop {
            {
                let mut ready = pool.ready.lock().unwrap();
                if let Some(conn) = ready.pop() {
                    pool.busy.fetch_add(1, Ordering::SeqCst);
                    self.total_busy.fetch_add(1, Ordering::SeqCst);
                    debug!(host = %key.host, port = key.port, "reusing pooled connection");
                    return Ok(Leased { key, conn });
                }
                let busy = pool.busy.load(Ordering::SeqCst);
                if busy < self.config.max_host_count {
                    pool.busy.fetch_add(1, Ordering::SeqCst);
                    self.total_busy.fetch_add(1, Ordering::SeqCst);
                    // fall through to dial, outside the lock
                } else {
                    drop(ready);
                    pool.notify.notified().await;
                    continue;
                }
            }

            match self.dial(&key).await {
                Ok(conn) => return Ok(Leased { key, conn }),
                Err(e) => {
                    pool.busy.fetch_sub(1, Ordering::SeqCst);
                    self.total_busy.fetch_sub(1, Ordering::SeqCst);
                    pool.notify.notify_one();
                    return Err(e);
                }
            }
        }
    }

    async fn dial(&self, key: &HostKey) -> Result<Connection, NetworkError> {
        let (dial_host, dial_port) = match &self.config.proxy {
            Some(proxy) => (proxy.host.as_str(), proxy.port),
            None => (key.host.as_str(), key.port),
        };

        let resolved = dns::resolve(dial_host, dial_port).await?;
        let cfg = &self.config;
        let (mut conn, _addr) = happy_eyeballs::dial(&resolved, &self.eyeballs, cfg.happy_eyeballs_ttl, || {
            Connection::new(cfg.connect_timeout, cfg.read_timeout, cfg.write_timeout)
        })
        .await?;

        match &self.config.proxy {
            Some(proxy) => {
                if key.tls {
                    tunnel_connect(&mut conn, &key.host, key.port, proxy).await?;
                    conn = conn.start_tls(&key.host, self.config.verify_mode).await?;
                }
                // Plaintext-through-proxy requests are serialized with
                // absolute-URI form by the HTTP stream layer; no CONNECT
                // needed here.
                Ok(conn)
            }
            None => {
                if key.tls {
                    conn = conn.start_tls(&key.host, self.config.verify_mode).await?;
                }
                Ok(conn)
            }
        }
    }

    /// Returns `conn` to the pool for `key`, or closes it.
    pub fn release(&self, key: &HostKey, mut conn: Connection, reuse: bool) {
        let pool = self.pool_for(key);
        pool.busy.fetch_sub(1, Ordering::SeqCst);
        self.total_busy.fetch_sub(1, Ordering::SeqCst);

        if reuse && conn.state() != ConnState::Dead {
            pool.ready.lock().unwrap().push(conn);
        } else {
            conn.close();
        }
        pool.notify.notify_one();

        if self.total_busy.load(Ordering::SeqCst) + self.ready_count() > self.config.max_count {
            self.clean(false);
        }
    }

    fn ready_count(&self) -> usize {
        let pools = self.pools.lock().unwrap();
        pools.values().map(|p| p.ready.lock().unwrap().len()).sum()
    }

    /// Drops closed connections (or, if `force`, all idle ones) and
    /// removes empty host pools.
    pub fn clean(&self, force: bool) {
        let mut pools = self.pools.lock().unwrap();
        pools.retain(|_key, pool| {
            let mut ready = pool.ready.lock().unwrap();
            if force {
                ready.clear();
            } else {
                ready.retain(|c| c.state() != ConnState::Dead);
            }
            !(ready.is_empty() && pool.busy.load(Ordering::SeqCst) == 0)
        });
    }
}

/// Sends `CONNECT host:port HTTP/1.1` over `conn` (already connected to
/// the proxy) and expects a `200` reply before the connection is treated
/// as tunneled (spec.md §4.3/§6).
async fn tunnel_connect(
    conn: &mut Connection,
    target_host: &str,
    target_port: u16,
    proxy: &ProxyConfig,
) -> Result<(), NetworkError> {
    let mut request = format!("CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\n");
    if let Some((user, pass)) = &proxy.credentials {
        let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");

    conn.write(request.as_bytes()).await?;

    let status_line = conn.read_line(8192).await?;
    let code: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| NetworkError::Other(format!("malformed CONNECT reply: {status_line}")))?;

    // Drain headers up to the blank line.
    loop {
        let line = conn.read_line(8192).await?;
        if line.is_empty() {
            break;
        }
    }

    if code != 200 {
        warn!(code, "proxy CONNECT rejected");
        return Err(NetworkError::Other(format!("proxy CONNECT failed with status {code}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_respects_per_host_cap() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                // Keep the socket open (held alive); don't respond.
                held.push(socket);
            }
        });

        let pool = ConnectionPool::new(ConnectionPoolConfig {
            max_host_count: 2,
            max_count: 10,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            ..Default::default()
        });

        let a = pool.acquire(&addr.ip().to_string(), addr.port(), false, None).await.unwrap();
        let b = pool.acquire(&addr.ip().to_string(), addr.port(), false, None).await.unwrap();

        // A third acquire must block until a release happens.
        let pool = Arc::new(pool);
        let pool2 = pool.clone();
        let host = addr.ip().to_string();
        let port = addr.port();
        let third = tokio::spawn(async move { pool2.acquire(&host, port, false, None).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!third.is_finished());

        pool.release(&a.key, a.conn, false);
        let res = tokio::time::timeout(Duration::from_secs(2), third).await;
        assert!(res.is_ok(), "third acquire should unblock after release");
        drop(b);
    }
}
