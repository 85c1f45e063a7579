//! The URL Table: a durable, concurrency-safe work queue over a per-URL
//! state machine (spec.md §3 "URL Record", §4.1, §6 persistence schema).
//!
//! Backed by a single-writer SQLite connection behind a mutex, with
//! write-ahead journaling enabled — the spec's "single-writer SQL
//! connection with WAL" option. `check_out` runs its select-then-update
//! inside one transaction so concurrent workers never observe the same
//! URL `in_progress` (spec.md §8's pairwise-distinct-checkout invariant).

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use wm_types::{Level, LinkType, Status, UrlEncoding, UrlRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS urls (
    url TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    try_count INTEGER NOT NULL DEFAULT 0,
    level INTEGER NOT NULL DEFAULT 0,
    top_url TEXT NOT NULL,
    status_code INTEGER,
    referrer TEXT,
    inline INTEGER NOT NULL DEFAULT 0,
    link_type TEXT,
    url_encoding TEXT NOT NULL DEFAULT 'utf8',
    post_data TEXT
);
CREATE TABLE IF NOT EXISTS visits (
    url TEXT NOT NULL,
    warc_id TEXT NOT NULL,
    payload_digest TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS urls_status_idx ON urls(status);
CREATE INDEX IF NOT EXISTS visits_url_digest_idx ON visits(url, payload_digest);
";

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error("no matching URL record found")]
    NotFound,
}

/// A partial update to merge into an existing [`UrlRecord`]; `None`
/// fields are left unchanged (spec.md §4.1 `update_one`/`check_in`).
#[derive(Debug, Clone, Default)]
pub struct UrlUpdate {
    pub status_code: Option<u16>,
    pub referrer: Option<String>,
    pub inline: Option<bool>,
    pub link_type: Option<LinkType>,
    pub url_encoding: Option<UrlEncoding>,
    pub post_data: Option<String>,
}

/// A dedup record ingested for revisit checking (spec.md §4.1
/// `add_visits`, §6 `visits` table).
#[derive(Debug, Clone)]
pub struct VisitRecord {
    pub url: String,
    pub warc_id: String,
    pub payload_digest: String,
}

pub struct UrlTable {
    conn: Mutex<Connection>,
}

impl UrlTable {
    /// Opens (creating if absent) a durable URL Table at `path`, with WAL
    /// journaling enabled.
    pub fn open(path: &Path) -> Result<Self, FrontierError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// An in-memory table, for tests and single-process dry runs that
    /// don't need a durable frontier across restarts.
    pub fn in_memory() -> Result<Self, FrontierError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Inserts each record with `status=todo` if its URL is absent;
    /// existing URLs are left untouched (first writer wins). Returns the
    /// subset of URLs actually inserted.
    pub fn add_many(&self, records: impl IntoIterator<Item = UrlRecord>) -> Result<Vec<String>, FrontierError> {
        let conn = self.conn.lock().unwrap();
        let mut inserted = Vec::new();
        for record in records {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO urls
                 (url, status, try_count, level, top_url, status_code, referrer, inline, link_type, url_encoding, post_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.url,
                    record.status.as_str(),
                    record.try_count,
                    record.level,
                    record.top_url,
                    record.status_code,
                    record.referrer,
                    record.inline as i64,
                    record.link_type.map(link_type_str),
                    url_encoding_str(record.url_encoding),
                    record.post_data,
                ],
            )?;
            if changed == 1 {
                inserted.push(record.url);
            }
        }
        Ok(inserted)
    }

    /// Atomically selects one record with `status` (and `level < limit`
    /// if given), flips it to `in_progress`, and returns a snapshot.
    pub fn check_out(&self, status: Status, level_limit: Option<Level>) -> Result<UrlRecord, FrontierError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("BEGIN IMMEDIATE")?;

        let found = (|| -> Result<UrlRecord, FrontierError> {
            let url: Option<String> = match level_limit {
                Some(limit) => conn
                    .query_row(
                        "SELECT url FROM urls WHERE status = ?1 AND level < ?2 LIMIT 1",
                        params![status.as_str(), limit],
                        |row| row.get(0),
                    )
                    .optional()?,
                None => conn
                    .query_row(
                        "SELECT url FROM urls WHERE status = ?1 LIMIT 1",
                        params![status.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?,
            };
            let url = url.ok_or(FrontierError::NotFound)?;
            conn.execute(
                "UPDATE urls SET status = ?1 WHERE url = ?2",
                params![Status::InProgress.as_str(), url],
            )?;
            read_record(&conn, &url)?.ok_or(FrontierError::NotFound)
        })();

        match &found {
            Ok(_) => conn.execute_batch("COMMIT")?,
            Err(_) => conn.execute_batch("ROLLBACK")?,
        }
        found
    }

    /// Sets the final `status` and merges `update`; implicitly bumps
    /// `try_count` when `new_status` is `Done` or `Error` (spec.md §4.1).
    pub fn check_in(&self, url: &str, new_status: Status, update: &UrlUpdate) -> Result<(), FrontierError> {
        let conn = self.conn.lock().unwrap();
        let bump = matches!(new_status, Status::Done | Status::Error);
        conn.execute(
            "UPDATE urls SET
                status = ?1,
                try_count = try_count + ?2,
                status_code = COALESCE(?3, status_code),
                referrer = COALESCE(?4, referrer),
                inline = COALESCE(?5, inline),
                link_type = COALESCE(?6, link_type),
                url_encoding = COALESCE(?7, url_encoding),
                post_data = COALESCE(?8, post_data)
             WHERE url = ?9",
            params![
                new_status.as_str(),
                i64::from(bump),
                update.status_code,
                update.referrer,
                update.inline.map(|b| b as i64),
                update.link_type.map(link_type_str),
                update.url_encoding.map(url_encoding_str),
                update.post_data,
                url,
            ],
        )?;
        Ok(())
    }

    /// Partial update without a status change (spec.md §4.1 `update_one`).
    pub fn update_one(&self, url: &str, update: &UrlUpdate) -> Result<(), FrontierError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE urls SET
                status_code = COALESCE(?1, status_code),
                referrer = COALESCE(?2, referrer),
                inline = COALESCE(?3, inline),
                link_type = COALESCE(?4, link_type),
                url_encoding = COALESCE(?5, url_encoding),
                post_data = COALESCE(?6, post_data)
             WHERE url = ?7",
            params![
                update.status_code,
                update.referrer,
                update.inline.map(|b| b as i64),
                update.link_type.map(link_type_str),
                update.url_encoding.map(url_encoding_str),
                update.post_data,
                url,
            ],
        )?;
        Ok(())
    }

    /// Bulk-resets every `in_progress` record to `todo`; called once at
    /// engine start to recover from a prior crash (spec.md §4.1 `release`).
    pub fn release(&self) -> Result<usize, FrontierError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE urls SET status = ?1 WHERE status = ?2",
            params![Status::Todo.as_str(), Status::InProgress.as_str()],
        )?;
        Ok(n)
    }

    /// Ingests prior-visit records for revisit/dedup decisions (spec.md
    /// §4.1 `add_visits`, SPEC_FULL §11).
    pub fn add_visits(&self, visits: impl IntoIterator<Item = VisitRecord>) -> Result<(), FrontierError> {
        let conn = self.conn.lock().unwrap();
        for visit in visits {
            conn.execute(
                "INSERT INTO visits (url, warc_id, payload_digest) VALUES (?1, ?2, ?3)",
                params![visit.url, visit.warc_id, visit.payload_digest],
            )?;
        }
        Ok(())
    }

    /// Answers whether a freshly computed `payload_digest` for `url`
    /// matches a prior visit, returning that visit's `warc_id`.
    pub fn get_revisit_id(&self, url: &str, payload_digest: &str) -> Result<Option<String>, FrontierError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT warc_id FROM visits WHERE url = ?1 AND payload_digest = ?2 LIMIT 1",
            params![url, payload_digest],
            |row| row.get(0),
        )
        .optional()
        .map_err(FrontierError::from)
    }

    /// Reads one record by URL without changing its status, for tests
    /// and diagnostics.
    pub fn get(&self, url: &str) -> Result<Option<UrlRecord>, FrontierError> {
        let conn = self.conn.lock().unwrap();
        read_record(&conn, url)
    }
}

fn read_record(conn: &Connection, url: &str) -> Result<Option<UrlRecord>, FrontierError> {
    conn.query_row(
        "SELECT url, status, try_count, level, top_url, status_code, referrer, inline, link_type, url_encoding, post_data
         FROM urls WHERE url = ?1",
        params![url],
        |row| {
            let status_str: String = row.get(1)?;
            let link_type_col: Option<String> = row.get(8)?;
            let encoding_str: String = row.get(9)?;
            Ok(UrlRecord {
                url: row.get(0)?,
                status: status_str.parse().unwrap_or(Status::Todo),
                try_count: row.get(2)?,
                level: row.get(3)?,
                top_url: row.get(4)?,
                status_code: row.get(5)?,
                referrer: row.get(6)?,
                inline: row.get::<_, i64>(7)? != 0,
                link_type: link_type_col.as_deref().and_then(link_type_from_str),
                url_encoding: url_encoding_from_str(&encoding_str),
                post_data: row.get(10)?,
            })
        },
    )
    .optional()
    .map_err(FrontierError::from)
}

fn link_type_str(lt: LinkType) -> &'static str {
    match lt {
        LinkType::Html => "html",
        LinkType::Css => "css",
        LinkType::JavaScript => "javascript",
        LinkType::Sitemap => "sitemap",
    }
}

fn link_type_from_str(s: &str) -> Option<LinkType> {
    match s {
        "html" => Some(LinkType::Html),
        "css" => Some(LinkType::Css),
        "javascript" => Some(LinkType::JavaScript),
        "sitemap" => Some(LinkType::Sitemap),
        _ => None,
    }
}

fn url_encoding_str(e: UrlEncoding) -> &'static str {
    match e {
        UrlEncoding::Utf8 => "utf8",
        UrlEncoding::Latin1 => "latin1",
    }
}

fn url_encoding_from_str(s: &str) -> UrlEncoding {
    match s {
        "latin1" => UrlEncoding::Latin1,
        _ => UrlEncoding::Utf8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_is_a_no_op() {
        let table = UrlTable::in_memory().unwrap();
        let inserted = table.add_many([UrlRecord::seed("http://host/a")]).unwrap();
        assert_eq!(inserted, vec!["http://host/a"]);
        let inserted_again = table.add_many([UrlRecord::seed("http://host/a")]).unwrap();
        assert!(inserted_again.is_empty());
    }

    #[test]
    fn check_out_transitions_to_in_progress_and_check_in_bumps_try_count() {
        let table = UrlTable::in_memory().unwrap();
        table.add_many([UrlRecord::seed("http://host/a")]).unwrap();

        let record = table.check_out(Status::Todo, None).unwrap();
        assert_eq!(record.status, Status::InProgress);
        assert_eq!(record.try_count, 0);

        table.check_in("http://host/a", Status::Done, &UrlUpdate { status_code: Some(200), ..Default::default() }).unwrap();
        let record = table.get("http://host/a").unwrap().unwrap();
        assert_eq!(record.status, Status::Done);
        assert_eq!(record.try_count, 1);
        assert_eq!(record.status_code, Some(200));
    }

    #[test]
    fn check_out_on_empty_frontier_is_not_found() {
        let table = UrlTable::in_memory().unwrap();
        assert!(matches!(table.check_out(Status::Todo, None), Err(FrontierError::NotFound)));
    }

    #[test]
    fn release_resets_in_progress_to_todo() {
        let table = UrlTable::in_memory().unwrap();
        table.add_many([UrlRecord::seed("http://host/a")]).unwrap();
        table.check_out(Status::Todo, None).unwrap();
        assert_eq!(table.release().unwrap(), 1);
        let record = table.get("http://host/a").unwrap().unwrap();
        assert_eq!(record.status, Status::Todo);
    }

    #[test]
    fn level_limit_excludes_deeper_records() {
        let table = UrlTable::in_memory().unwrap();
        let mut deep = UrlRecord::seed("http://host/deep");
        deep.level = 5;
        table.add_many([deep]).unwrap();
        assert!(matches!(table.check_out(Status::Todo, Some(2)), Err(FrontierError::NotFound)));
    }

    #[test]
    fn revisit_lookup_matches_on_url_and_digest() {
        let table = UrlTable::in_memory().unwrap();
        table
            .add_visits([VisitRecord { url: "http://host/a".into(), warc_id: "warc-1".into(), payload_digest: "abc".into() }])
            .unwrap();
        assert_eq!(table.get_revisit_id("http://host/a", "abc").unwrap(), Some("warc-1".to_string()));
        assert_eq!(table.get_revisit_id("http://host/a", "xyz").unwrap(), None);
    }
}
