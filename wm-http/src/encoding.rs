//! `Content-Encoding: gzip` / `deflate` decoding, via the same
//! `async-compression` crate family `reqwest`'s gzip/deflate features wrap.

use async_compression::tokio::bufread::{DeflateDecoder, GzipDecoder, ZlibDecoder};
use tokio::io::{AsyncReadExt, BufReader};
use wm_types::FetchError;

use crate::body::{Body, BodySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            Some("gzip") | Some("x-gzip") => ContentEncoding::Gzip,
            Some("deflate") => ContentEncoding::Deflate,
            _ => ContentEncoding::Identity,
        }
    }
}

/// Decodes an already-downloaded, framed `body` according to `encoding`,
/// spilling to disk past `spill_threshold` bytes the same way the raw
/// download sink does.
///
/// `deflate` bodies are ambiguous in the wild between raw DEFLATE and
/// zlib-wrapped DEFLATE; a zlib header is tried first and, on failure,
/// the body is re-read as raw DEFLATE (spec.md §4.4 decoding note).
pub async fn decode(mut body: Body, encoding: ContentEncoding, spill_threshold: usize) -> Result<Body, FetchError> {
    match encoding {
        ContentEncoding::Identity => Ok(body),
        ContentEncoding::Gzip => {
            let raw = body.read_all().map_err(|e| FetchError::Protocol(e.to_string()))?;
            let mut decoder = GzipDecoder::new(BufReader::new(&raw[..]));
            let mut sink = BodySink::new(spill_threshold);
            let mut buf = [0u8; 8192];
            loop {
                let n = decoder
                    .read(&mut buf)
                    .await
                    .map_err(|e| FetchError::Protocol(format!("gzip decode error: {e}")))?;
                if n == 0 {
                    break;
                }
                sink.push(&buf[..n]).await.map_err(|e| FetchError::Protocol(e.to_string()))?;
            }
            sink.finish().await.map_err(|e| FetchError::Protocol(e.to_string()))
        }
        ContentEncoding::Deflate => {
            let raw = body.read_all().map_err(|e| FetchError::Protocol(e.to_string()))?;
            match decode_zlib(&raw, spill_threshold).await {
                Ok(body) => Ok(body),
                Err(_) => decode_raw_deflate(&raw, spill_threshold).await,
            }
        }
    }
}

async fn decode_zlib(raw: &[u8], spill_threshold: usize) -> Result<Body, FetchError> {
    let mut decoder = ZlibDecoder::new(BufReader::new(raw));
    let mut sink = BodySink::new(spill_threshold);
    let mut buf = [0u8; 8192];
    loop {
        let n = decoder
            .read(&mut buf)
            .await
            .map_err(|e| FetchError::Protocol(format!("zlib decode error: {e}")))?;
        if n == 0 {
            break;
        }
        sink.push(&buf[..n]).await.map_err(|e| FetchError::Protocol(e.to_string()))?;
    }
    sink.finish().await.map_err(|e| FetchError::Protocol(e.to_string()))
}

async fn decode_raw_deflate(raw: &[u8], spill_threshold: usize) -> Result<Body, FetchError> {
    let mut decoder = DeflateDecoder::new(BufReader::new(raw));
    let mut sink = BodySink::new(spill_threshold);
    let mut buf = [0u8; 8192];
    loop {
        let n = decoder
            .read(&mut buf)
            .await
            .map_err(|e| FetchError::Protocol(format!("raw deflate decode error: {e}")))?;
        if n == 0 {
            break;
        }
        sink.push(&buf[..n]).await.map_err(|e| FetchError::Protocol(e.to_string()))?;
    }
    sink.finish().await.map_err(|e| FetchError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parsing_is_case_insensitive() {
        assert_eq!(ContentEncoding::from_header(Some("GZIP")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header(Some(" deflate ")), ContentEncoding::Deflate);
        assert_eq!(ContentEncoding::from_header(Some("br")), ContentEncoding::Identity);
        assert_eq!(ContentEncoding::from_header(None), ContentEncoding::Identity);
    }

    #[tokio::test]
    async fn identity_passes_body_through_unchanged() {
        let mut sink = BodySink::new(1024);
        sink.push(b"plain text").await.unwrap();
        let body = sink.finish().await.unwrap();
        let mut decoded = decode(body, ContentEncoding::Identity, 1024).await.unwrap();
        assert_eq!(decoded.read_all().unwrap(), b"plain text");
    }
}
