//! Protocol Session and Client (spec.md §4.6): one request/response
//! exchange over a checked-out [`wm_net::Connection`], including
//! recorder notification and connection release policy.

mod ftp;
mod http;
mod recorder;

pub use ftp::{FtpDownloadSession, FtpFetch};
pub use http::HttpSession;
pub use recorder::{NullRecorder, Recorder};
