//! Core domain types for the mirroring engine.
//!
//! This crate has no IO and no async: it is the shared vocabulary that
//! every other crate in the workspace builds requests, records, and
//! error values out of.

mod error;
mod record;
mod request;

pub use error::{FetchError, NetworkError};
pub use record::{LinkType, Status, UrlEncoding, UrlRecord};
pub use request::{RequestHead, RequestMethod, ResponseHead};

/// Recursion depth. Seeds are level 0.
pub type Level = u32;
