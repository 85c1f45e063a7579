//! Connections, the connection pool, happy-eyeballs dialing, and
//! HTTP-proxy tunneling (spec.md §4.2-§4.3).

mod connection;
mod dns;
mod happy_eyeballs;
mod pool;
pub mod tls;

pub use connection::{ConnState, Connection};
pub use dns::{resolve, ResolvedHost};
pub use happy_eyeballs::HappyEyeballsTable;
pub use pool::{ConnectionPool, ConnectionPoolConfig, HostKey, Leased, ProxyConfig};
pub use tls::VerifyMode;
