//! Per-host robots.txt fetch-and-cache, gated in front of the Web Client
//! (spec.md §4.8).

mod checker;
mod rules;

pub use checker::{RobotsChecker, RobotsPool};
pub use rules::Robots;
