//! Dual-stack dialing strategy: races IPv4 and IPv6 connects and remembers
//! the winning family for the host pair (spec.md §4.3).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;
use wm_types::NetworkError;

use crate::connection::Connection;
use crate::dns::ResolvedHost;

/// Normalizes a pair of addresses so that `(a, b)` and `(b, a)` hash
/// identically.
fn pair_key(a: IpAddr, b: IpAddr) -> (IpAddr, IpAddr) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

struct Entry {
    winner: Family,
    expires_at: Instant,
}

/// Caches which address family won the race for a given host pair, with a
/// TTL, so that repeat dials to the same host skip the race.
#[derive(Default)]
pub struct HappyEyeballsTable {
    entries: Mutex<HashMap<(IpAddr, IpAddr), Entry>>,
}

impl HappyEyeballsTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, a: IpAddr, b: IpAddr) -> Option<Family> {
        let key = pair_key(a, b);
        let entries = self.entries.lock().unwrap();
        entries.get(&key).and_then(|entry| {
            (entry.expires_at > Instant::now()).then_some(entry.winner)
        })
    }

    fn put(&self, a: IpAddr, b: IpAddr, winner: Family, ttl: Duration) {
        let key = pair_key(a, b);
        self.entries.lock().unwrap().insert(
            key,
            Entry {
                winner,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Dials `resolved`, racing IPv4 against IPv6 when both are present.
///
/// `make` constructs a fresh, unconnected [`Connection`] for each dial
/// attempt (connections are cheap value types carrying only timeouts).
pub async fn dial(
    resolved: &ResolvedHost,
    table: &HappyEyeballsTable,
    cache_ttl: Duration,
    make: impl Fn() -> Connection,
) -> Result<(Connection, SocketAddr), NetworkError> {
    match (resolved.v4.first(), resolved.v6.first()) {
        (Some(&v4), None) => dial_one(make(), v4).await,
        (None, Some(&v6)) => dial_one(make(), v6).await,
        (None, None) => Err(NetworkError::DnsNotFound),
        (Some(&v4), Some(&v6)) => {
            if let Some(winner) = table.get(v4.ip(), v6.ip()) {
                let addr = if winner == Family::V4 { v4 } else { v6 };
                return dial_one(make(), addr).await;
            }
            race(make, v4, v6, table, cache_ttl).await
        }
    }
}

async fn dial_one(mut conn: Connection, addr: SocketAddr) -> Result<(Connection, SocketAddr), NetworkError> {
    conn.connect(addr).await?;
    Ok((conn, addr))
}

async fn race(
    make: impl Fn() -> Connection,
    v4: SocketAddr,
    v6: SocketAddr,
    table: &HappyEyeballsTable,
    cache_ttl: Duration,
) -> Result<(Connection, SocketAddr), NetworkError> {
    let v4_fut = dial_one(make(), v4);
    let v6_fut = dial_one(make(), v6);
    tokio::pin!(v4_fut);
    tokio::pin!(v6_fut);

    let mut v4_done = false;
    let mut v6_done = false;
    let mut first_error: Option<NetworkError> = None;

    // The loser's connect future is simply dropped on return, cancelling
    // its in-flight dial (or, if it raced to completion anyway, dropping
    // the resulting socket) — there is no separate "close in the
    // background" step to perform since cancellation already releases it.
    loop {
        tokio::select! {
            res = &mut v4_fut, if !v4_done => {
                v4_done = true;
                match res {
                    Ok((conn, addr)) => {
                        table.put(v4.ip(), v6.ip(), Family::V4, cache_ttl);
                        return Ok((conn, addr));
                    }
                    Err(e) => {
                        debug!(%v4, error = %e, "happy-eyeballs v4 dial failed");
                        first_error.get_or_insert(e);
                        if v6_done { return Err(first_error.unwrap()); }
                    }
                }
            }
            res = &mut v6_fut, if !v6_done => {
                v6_done = true;
                match res {
                    Ok((conn, addr)) => {
                        table.put(v4.ip(), v6.ip(), Family::V6, cache_ttl);
                        return Ok((conn, addr));
                    }
                    Err(e) => {
                        debug!(%v6, error = %e, "happy-eyeballs v6 dial failed");
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                        if v4_done { return Err(first_error.unwrap()); }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "::1".parse().unwrap();
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn table_expires_entries() {
        let table = HappyEyeballsTable::new();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        table.put(a, b, Family::V4, Duration::from_millis(10));
        assert_eq!(table.get(a, b), Some(Family::V4));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(table.get(a, b), None);
    }
}
