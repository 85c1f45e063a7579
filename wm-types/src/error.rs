//! Error taxonomy, per the transport/protocol boundary described in the
//! mirroring engine's design: `NetworkError` is the base for transport
//! failures, `FetchError` adds the protocol- and session-level kinds a
//! [`crate::Status`] transition is derived from.

use thiserror::Error;

/// Transport-level failures, raised while dialing or reading/writing a
/// [`Connection`](../wm_net/struct.Connection.html).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("connection refused")]
    ConnectionRefused,

    #[error("DNS lookup found no address for host")]
    DnsNotFound,

    #[error("network operation timed out")]
    NetworkTimedOut,

    #[error("TLS certificate verification failed: {0}")]
    SslVerificationError(String),

    #[error("network error: {0}")]
    Other(String),
}

/// The full error taxonomy a [`Session`](../wm_session/struct.Session.html)
/// or [`Processor`](../wm_engine/struct.Processor.html) classifies against.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Malformed framing: invalid status line, invalid chunk size, invalid
    /// redirect `Location`, too many redirects, zlib/gzip failure, and so
    /// on.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A 5xx encountered while fetching `robots.txt`; distinguished from a
    /// generic document fetch failure so the Processor can retry the
    /// robots lookup instead of failing the URL outright.
    #[error("server error fetching robots.txt: HTTP {0}")]
    Server(u16),

    /// FTP login refusal after a full credential exchange.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The outer wall-clock budget for a full body download elapsed.
    #[error("duration timeout exceeded")]
    DurationTimeout,
}

impl FetchError {
    /// Exit-code category, per the mirroring engine's severity table.
    /// Lower numbers are less severe; the Engine reports the maximum
    /// category seen across the whole crawl.
    #[must_use]
    pub fn exit_category(&self) -> u8 {
        match self {
            FetchError::Protocol(_) => 7,
            FetchError::Server(_) => 8,
            FetchError::Authentication(_) => 6,
            FetchError::DurationTimeout => 4,
            FetchError::Network(NetworkError::SslVerificationError(_)) => 5,
            FetchError::Network(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_categories_match_severity_table() {
        assert_eq!(FetchError::Network(NetworkError::ConnectionRefused).exit_category(), 4);
        assert_eq!(
            FetchError::Network(NetworkError::SslVerificationError("x".into())).exit_category(),
            5
        );
        assert_eq!(FetchError::Authentication("no".into()).exit_category(), 6);
        assert_eq!(FetchError::Protocol("bad chunk".into()).exit_category(), 7);
        assert_eq!(FetchError::Server(503).exit_category(), 8);
    }
}
