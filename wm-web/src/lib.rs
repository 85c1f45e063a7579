//! Web Client decorators around the HTTP Session: redirect tracking,
//! cookie injection/extraction, and basic-auth retry (spec.md §4.7).

mod client;
mod cookies;
mod redirect;

pub use client::{FetchOutcome, LoopType, WebClient, WebClientConfig};
pub use cookies::CookieJar;
pub use redirect::{RedirectKind, RedirectTracker};
