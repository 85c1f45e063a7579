//! The URL Table's per-URL record and status machine (see spec.md §3).

use crate::Level;
use serde::{Deserialize, Serialize};

/// A URL record's lifecycle state.
///
/// Transitions: `Todo -> InProgress -> {Done, Error, Skipped}`; `Error`
/// may be re-checked-out back to `InProgress`; on engine start any
/// residual `InProgress` is reset to `Todo` (crash recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    InProgress,
    Done,
    Error,
    Skipped,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Error => "error",
            Status::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Status::Todo),
            "in_progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            "error" => Ok(Status::Error),
            "skipped" => Ok(Status::Skipped),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Origin hint for a discovered URL: what kind of document produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Html,
    Css,
    JavaScript,
    Sitemap,
}

/// The byte-level encoding used to parse/serialize a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlEncoding {
    Utf8,
    Latin1,
}

impl Default for UrlEncoding {
    fn default() -> Self {
        UrlEncoding::Utf8
    }
}

/// The durable, per-URL state kept in the URL Table.
///
/// `url` is the primary key; duplicate inserts are no-ops (first writer
/// wins). `try_count` is monotonic. `level` of a child is
/// `parent.level + 1`; inline children inherit `top_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub url: String,
    pub status: Status,
    pub try_count: u32,
    pub level: Level,
    pub top_url: String,
    pub status_code: Option<u16>,
    pub referrer: Option<String>,
    pub inline: bool,
    pub link_type: Option<LinkType>,
    pub url_encoding: UrlEncoding,
    pub post_data: Option<String>,
}

impl UrlRecord {
    /// A new seed record: level 0, its own `top_url`, not inline.
    #[must_use]
    pub fn seed(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            top_url: url.clone(),
            url,
            status: Status::Todo,
            try_count: 0,
            level: 0,
            status_code: None,
            referrer: None,
            inline: false,
            link_type: None,
            url_encoding: UrlEncoding::Utf8,
            post_data: None,
        }
    }

    /// A record discovered while processing `self`, per spec.md §4.9 step 7.
    #[must_use]
    pub fn child(
        &self,
        url: impl Into<String>,
        inline: bool,
        link_type: Option<LinkType>,
    ) -> Self {
        Self {
            url: url.into(),
            status: Status::Todo,
            try_count: 0,
            level: self.level + 1,
            top_url: self.top_url.clone(),
            status_code: None,
            referrer: Some(self.url.clone()),
            inline,
            link_type,
            url_encoding: UrlEncoding::Utf8,
            post_data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_inherits_top_url_and_bumps_level() {
        let mut parent = UrlRecord::seed("http://host/a.html");
        parent.level = 3;
        let child = parent.child("http://host/b.html", false, Some(LinkType::Html));
        assert_eq!(child.level, 4);
        assert_eq!(child.top_url, "http://host/a.html");
        assert_eq!(child.referrer.as_deref(), Some("http://host/a.html"));
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            Status::Todo,
            Status::InProgress,
            Status::Done,
            Status::Error,
            Status::Skipped,
        ] {
            let parsed: Status = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
