//! Chunked transfer-coding reader (RFC 9112 §7.1), including trailers.

use wm_net::Connection;
use wm_types::{FetchError, NetworkError};

use crate::body::BodySink;

/// Reads a chunked body from `conn` into `sink`, returning any trailer
/// headers. Tolerant of bare-LF line endings; a chunk-extension after
/// `;` on the size line is accepted and ignored. A stream that ends
/// without the terminating `0\r\n` chunk is a [`FetchError::Protocol`]
/// error, matching the spec's "missing terminator" edge case.
pub async fn read_chunked_body(
    conn: &mut Connection,
    sink: &mut BodySink,
    max_line: usize,
) -> Result<Vec<(String, String)>, FetchError> {
    loop {
        let size_line = conn.read_line(max_line).await.map_err(map_net)?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| FetchError::Protocol(format!("invalid chunk size: {size_line:?}")))?;

        if size == 0 {
            return read_trailers(conn, max_line).await;
        }

        let mut remaining = size;
        let mut buf = vec![0u8; 8192.min(size.max(1))];
        while remaining > 0 {
            let want = remaining.min(buf.len());
            let n = conn.read(&mut buf[..want]).await.map_err(map_net)?;
            if n == 0 {
                return Err(FetchError::Protocol("connection closed mid-chunk".into()));
            }
            sink.push(&buf[..n]).await.map_err(|e| FetchError::Protocol(e.to_string()))?;
            remaining -= n;
        }

        // Consume the CRLF (or bare LF) after the chunk data.
        let trailing = conn.read_line(2).await.map_err(map_net)?;
        if !trailing.is_empty() {
            return Err(FetchError::Protocol("malformed chunk terminator".into()));
        }
    }
}

async fn read_trailers(conn: &mut Connection, max_line: usize) -> Result<Vec<(String, String)>, FetchError> {
    let mut trailers = Vec::new();
    loop {
        let line = conn.read_line(max_line).await.map_err(map_net)?;
        if line.is_empty() {
            return Ok(trailers);
        }
        match line.split_once(':') {
            Some((name, value)) => trailers.push((name.trim().to_string(), value.trim().to_string())),
            None => return Err(FetchError::Protocol(format!("malformed trailer line: {line:?}"))),
        }
    }
}

fn map_net(e: NetworkError) -> FetchError {
    FetchError::Network(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn serve(bytes: &'static [u8]) -> Connection {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(bytes).await.unwrap();
        });
        let mut conn = Connection::new(Duration::from_secs(2), Duration::from_secs(2), Duration::from_secs(2));
        conn.connect(addr).await.unwrap();
        conn
    }

    #[tokio::test]
    async fn decodes_two_chunks_and_terminator() {
        let mut conn = serve(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n").await;
        let mut sink = BodySink::new(1024);
        let trailers = read_chunked_body(&mut conn, &mut sink, 8192).await.unwrap();
        assert!(trailers.is_empty());
        let mut body = sink.finish().await.unwrap();
        assert_eq!(body.read_all().unwrap(), b"Wikipedia");
    }

    #[tokio::test]
    async fn collects_trailer_headers() {
        let mut conn = serve(b"3\r\nfoo\r\n0\r\nX-Checksum: abc\r\n\r\n").await;
        let mut sink = BodySink::new(1024);
        let trailers = read_chunked_body(&mut conn, &mut sink, 8192).await.unwrap();
        assert_eq!(trailers, vec![("X-Checksum".to_string(), "abc".to_string())]);
    }

    #[tokio::test]
    async fn missing_terminator_is_protocol_error() {
        let mut conn = serve(b"3\r\nfoo\r\n").await;
        let mut sink = BodySink::new(1024);
        let err = read_chunked_body(&mut conn, &mut sink, 8192).await.unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }
}
