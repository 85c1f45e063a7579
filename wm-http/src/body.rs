//! The seekable response body handle a [`Response`](crate::Response) owns
//! until the Processor finishes scraping and writing it (spec.md §3).

use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// A fully-buffered, decoded response body. Small bodies stay in memory;
/// bodies larger than the sink's spill threshold move to a temp file so a
/// crawl with many large documents does not exhaust memory.
pub enum Body {
    Memory(Cursor<Vec<u8>>),
    Disk(std::fs::File),
}

impl Body {
    #[must_use]
    pub fn empty() -> Self {
        Body::Memory(Cursor::new(Vec::new()))
    }

    pub fn len(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    /// Reads the whole body into memory, restoring the original position.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let pos = self.stream_position()?;
        self.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(buf)
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Memory(cursor) => cursor.read(buf),
            Body::Disk(file) => file.read(buf),
        }
    }
}

impl Seek for Body {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Body::Memory(cursor) => cursor.seek(pos),
            Body::Disk(file) => file.seek(pos),
        }
    }
}

/// Accumulates decoded body bytes during the async download, spilling to
/// a temp file once `spill_threshold` bytes have been buffered.
pub struct BodySink {
    mem: Vec<u8>,
    disk: Option<tokio::fs::File>,
    disk_path: Option<std::path::PathBuf>,
    spill_threshold: usize,
}

impl BodySink {
    #[must_use]
    pub fn new(spill_threshold: usize) -> Self {
        Self {
            mem: Vec::new(),
            disk: None,
            disk_path: None,
            spill_threshold,
        }
    }

    pub async fn push(&mut self, chunk: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;

        if let Some(file) = &mut self.disk {
            file.write_all(chunk).await?;
            return Ok(());
        }

        self.mem.extend_from_slice(chunk);
        if self.mem.len() > self.spill_threshold {
            let tmp = tempfile::NamedTempFile::new()?;
            let (std_file, path) = tmp.keep().map_err(|e| e.error)?;
            let mut file = tokio::fs::File::from_std(std_file);
            file.write_all(&self.mem).await?;
            self.mem.clear();
            self.disk = Some(file);
            self.disk_path = Some(path);
        }
        Ok(())
    }

    /// Finalizes the sink into a rewound, readable [`Body`].
    pub async fn finish(self) -> io::Result<Body> {
        use tokio::io::AsyncWriteExt;

        match self.disk {
            Some(mut file) => {
                file.flush().await?;
                let mut std_file = file.into_std().await;
                std_file.seek(SeekFrom::Start(0))?;
                Ok(Body::Disk(std_file))
            }
            None => Ok(Body::Memory(Cursor::new(self.mem))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn small_body_stays_in_memory() {
        let mut sink = BodySink::new(1024);
        sink.push(b"hello world").await.unwrap();
        let mut body = sink.finish().await.unwrap();
        assert!(matches!(body, Body::Memory(_)));
        assert_eq!(body.read_all().unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn large_body_spills_to_disk() {
        let mut sink = BodySink::new(8);
        sink.push(b"0123456789").await.unwrap();
        let mut body = sink.finish().await.unwrap();
        assert!(matches!(body, Body::Disk(_)));
        assert_eq!(body.read_all().unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn read_all_restores_position() {
        let mut sink = BodySink::new(1024);
        sink.push(b"abcdef").await.unwrap();
        let mut body = sink.finish().await.unwrap();
        body.seek(SeekFrom::Start(2)).unwrap();
        let _ = body.read_all().unwrap();
        assert_eq!(body.stream_position().unwrap(), 2);
    }
}
