//! The URL Table, URL Filter chain, politeness Waiter, payload digests,
//! and crawl Statistics (spec.md §2 items 1 and 10).

mod digest;
mod filter;
mod stats;
mod table;
mod url_info;
mod waiter;

pub use digest::payload_digest;
pub use filter::{
    FilterChain, FilterVerdict, LevelFilter, SchemeFilter, SpanHostsFilter, TriesFilter, UrlFilter,
};
pub use stats::Statistics;
pub use table::{FrontierError, UrlTable, UrlUpdate, VisitRecord};
pub use url_info::UrlInfo;
pub use waiter::Waiter;
