//! DNS resolution split by address family, for happy-eyeballs dialing.

use std::net::{IpAddr, SocketAddr};
use wm_types::NetworkError;

/// A DNS answer set for one `(host, port)` pair, split by family.
#[derive(Debug, Clone)]
pub struct ResolvedHost {
    pub v4: Vec<SocketAddr>,
    pub v6: Vec<SocketAddr>,
}

impl ResolvedHost {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    #[must_use]
    pub fn all(&self) -> Vec<SocketAddr> {
        self.v4.iter().chain(self.v6.iter()).copied().collect()
    }
}

/// Resolves `host:port`, separating IPv4 and IPv6 answers so the caller
/// can run happy-eyeballs dialing (spec.md §4.3).
pub async fn resolve(host: &str, port: u16) -> Result<ResolvedHost, NetworkError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        let addr = SocketAddr::new(ip, port);
        return Ok(match ip {
            IpAddr::V4(_) => ResolvedHost { v4: vec![addr], v6: vec![] },
            IpAddr::V6(_) => ResolvedHost { v4: vec![], v6: vec![addr] },
        });
    }

    let lookup = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| NetworkError::DnsNotFound)?;

    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for addr in lookup {
        if addr.is_ipv4() {
            v4.push(addr);
        } else {
            v6.push(addr);
        }
    }

    if v4.is_empty() && v6.is_empty() {
        return Err(NetworkError::DnsNotFound);
    }
    Ok(ResolvedHost { v4, v6 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_ipv4_resolves_without_lookup() {
        let resolved = resolve("127.0.0.1", 80).await.unwrap();
        assert_eq!(resolved.v4.len(), 1);
        assert!(resolved.v6.is_empty());
    }

    #[tokio::test]
    async fn literal_ipv6_resolves_without_lookup() {
        let resolved = resolve("::1", 80).await.unwrap();
        assert!(resolved.v4.is_empty());
        assert_eq!(resolved.v6.len(), 1);
    }
}
