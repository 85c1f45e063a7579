//! Writer session interface (spec.md §6) and a default filesystem
//! implementation, grounded on the original implementation's
//! `BaseFileWriterSession` (`examples/original_source/wpull/writer.py`):
//! map a URL path onto a local path under the mirror directory,
//! falling back to `index.html` for directory-shaped URLs.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use wm_http::Body;
use wm_types::{RequestHead, ResponseHead};

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to write file {path}: {source}")]
    WriteFile { path: PathBuf, #[source] source: std::io::Error },
}

/// spec.md §6 "Writer session interface". Implementations decide where
/// (and whether) a fetched document is committed to storage.
pub trait Writer: Send + Sync {
    /// May rewrite `request` before it is sent, e.g. to set an FTP
    /// resume offset from an existing partial file on disk.
    fn process_request(&self, _request: &mut RequestHead) {}

    /// Called once the response head is known, before the body is read.
    fn process_response(&self, _response: &ResponseHead) {}

    /// Commits an accepted document to storage, returning the path it
    /// was written to.
    fn save_document(
        &self,
        request: &RequestHead,
        response: &ResponseHead,
        body: &mut Body,
    ) -> Result<Option<PathBuf>, WriterError>;

    /// Called for a document the Processor decided not to keep
    /// (permanent failures, transient errors).
    fn discard_document(&self, _request: &RequestHead, _response: &ResponseHead) {}

    /// A path for an out-of-band resource tied to `request`'s URL, such
    /// as a `.orig` copy kept alongside a rewritten document.
    fn extra_resource_path(&self, request: &RequestHead, suffix: &str) -> Option<PathBuf> {
        let mut path = url_to_path(&request.url, self.root());
        path.as_mut_os_string().push(suffix);
        Some(path)
    }

    /// The mirror root documents are written under.
    fn root(&self) -> &Path;
}

/// Writes accepted documents under a mirror directory named after the
/// URL's host and path, the convention the original tool's path namer
/// uses.
pub struct FsWriter {
    root: PathBuf,
}

impl FsWriter {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Writer for FsWriter {
    fn save_document(
        &self,
        request: &RequestHead,
        _response: &ResponseHead,
        body: &mut Body,
    ) -> Result<Option<PathBuf>, WriterError> {
        let path = url_to_path(&request.url, &self.root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| WriterError::CreateDir { path: parent.to_path_buf(), source })?;
        }

        body.seek(SeekFrom::Start(0)).map_err(|source| WriterError::WriteFile { path: path.clone(), source })?;
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes).map_err(|source| WriterError::WriteFile { path: path.clone(), source })?;

        std::fs::write(&path, &bytes).map_err(|source| WriterError::WriteFile { path: path.clone(), source })?;
        Ok(Some(path))
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Maps a URL onto a filesystem path: `host/path/segments`, with a
/// trailing-slash or empty path resolving to `index.html` so
/// `http://host/` and `http://host/dir/` don't collide with their
/// parent directory.
fn url_to_path(url: &url::Url, root: &Path) -> PathBuf {
    let mut path = root.to_path_buf();
    path.push(url.host_str().unwrap_or("unknown-host"));

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty() && *seg != "..").collect())
        .unwrap_or_default();

    if segments.is_empty() {
        path.push("index.html");
        return path;
    }

    for segment in &segments[..segments.len() - 1] {
        path.push(segment);
    }

    let last = segments[segments.len() - 1];
    if url.path().ends_with('/') {
        path.push(last);
        path.push("index.html");
    } else {
        path.push(last);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn root_path_becomes_index_html() {
        let path = url_to_path(&Url::parse("http://host.test/").unwrap(), Path::new("/mirror"));
        assert_eq!(path, PathBuf::from("/mirror/host.test/index.html"));
    }

    #[test]
    fn directory_shaped_path_gets_index_html() {
        let path = url_to_path(&Url::parse("http://host.test/dir/").unwrap(), Path::new("/mirror"));
        assert_eq!(path, PathBuf::from("/mirror/host.test/dir/index.html"));
    }

    #[test]
    fn file_shaped_path_keeps_its_name() {
        let path = url_to_path(&Url::parse("http://host.test/a/b.html").unwrap(), Path::new("/mirror"));
        assert_eq!(path, PathBuf::from("/mirror/host.test/a/b.html"));
    }

    #[test]
    fn parent_traversal_segments_are_dropped() {
        let path = url_to_path(&Url::parse("http://host.test/a/../b.html").unwrap(), Path::new("/mirror"));
        assert_eq!(path, PathBuf::from("/mirror/host.test/b.html"));
    }

    #[test]
    fn save_document_writes_body_to_the_mapped_path() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FsWriter::new(dir.path());
        let request = RequestHead::get(Url::parse("http://host.test/a.html").unwrap());
        let response = ResponseHead { status_code: 200, reason: "OK".into(), headers: Vec::new(), http_1_0: false };
        let mut body = Body::Memory(std::io::Cursor::new(b"hello".to_vec()));
        let path = writer.save_document(&request, &response, &mut body).unwrap().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }
}
