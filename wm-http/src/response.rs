//! Status-line and header parsing, and the body-framing decision
//! (spec.md §4.4 "Reading"): chunked transfer wins over `Content-Length`
//! even when both are present, else `Content-Length` governs, else the
//! body runs until the connection closes.

use wm_net::Connection;
use wm_types::{FetchError, NetworkError, ResponseHead};

use crate::body::{Body, BodySink};
use crate::chunked::read_chunked_body;
use crate::encoding::{self, ContentEncoding};

const MAX_HEADER_LINE: usize = 1 << 20;

/// Reads and parses the status line and header block from `conn`.
pub async fn read_head(conn: &mut Connection) -> Result<ResponseHead, FetchError> {
    let status_line = conn.read_line(MAX_HEADER_LINE).await.map_err(map_net)?;
    let (http_1_0, status_code, reason) = parse_status_line(&status_line)?;

    let mut headers = Vec::new();
    loop {
        let line = conn.read_line(MAX_HEADER_LINE).await.map_err(map_net)?;
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((name, value)) => headers.push((name.trim().to_string(), value.trim().to_string())),
            None => return Err(FetchError::Protocol(format!("malformed header line: {line:?}"))),
        }
    }

    Ok(ResponseHead { status_code, reason, headers, http_1_0 })
}

fn parse_status_line(line: &str) -> Result<(bool, u16, String), FetchError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(FetchError::Protocol(format!("malformed status line: {line:?}")));
    }
    let http_1_0 = version == "HTTP/1.0";
    let code: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| FetchError::Protocol(format!("malformed status line: {line:?}")))?;
    let reason = parts.next().unwrap_or("").to_string();
    Ok((http_1_0, code, reason))
}

/// True when the response carries no body per RFC 9112 §6.3, independent
/// of any framing headers present.
fn has_no_body(method_is_head: bool, head: &ResponseHead) -> bool {
    method_is_head || matches!(head.status_code, 100..=199 | 204 | 304)
}

/// Reads, frames, and decodes the body following `head`, merging any
/// chunked trailer into `head.headers` once the body is fully read
/// (spec.md §4.4 "merge trailer into response headers").
///
/// `ignore_length` forces read-until-close framing even when
/// `Content-Length` is present (used for HTTP/0.9-ish or deliberately
/// broken servers the engine still wants to salvage what it can from).
pub async fn read_body(
    conn: &mut Connection,
    head: &mut ResponseHead,
    method_is_head: bool,
    ignore_length: bool,
    spill_threshold: usize,
) -> Result<Body, FetchError> {
    if has_no_body(method_is_head, head) {
        return Ok(Body::empty());
    }

    let transfer_encoding = head.header("Transfer-Encoding").map(str::to_ascii_lowercase);
    let is_chunked = transfer_encoding.as_deref().is_some_and(|v| v.contains("chunked"));

    let mut sink = BodySink::new(spill_threshold);
    let trailers = if is_chunked {
        read_chunked_body(conn, &mut sink, MAX_HEADER_LINE).await?
    } else if !ignore_length && head.header("Content-Length").is_some() {
        let len: u64 = head
            .header("Content-Length")
            .unwrap()
            .trim()
            .parse()
            .map_err(|_| FetchError::Protocol("invalid Content-Length".into()))?;
        read_exact_len(conn, &mut sink, len).await?;
        Vec::new()
    } else {
        read_until_close(conn, &mut sink).await?;
        Vec::new()
    };
    head.headers.extend(trailers);

    let body = sink.finish().await.map_err(|e| FetchError::Protocol(e.to_string()))?;
    let encoding = ContentEncoding::from_header(head.header("Content-Encoding"));
    encoding::decode(body, encoding, spill_threshold).await
}

async fn read_exact_len(conn: &mut Connection, sink: &mut BodySink, len: u64) -> Result<(), FetchError> {
    let mut remaining = len;
    let mut buf = vec![0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = conn.read(&mut buf[..want]).await.map_err(map_net)?;
        if n == 0 {
            return Err(FetchError::Protocol("connection closed before Content-Length satisfied".into()));
        }
        sink.push(&buf[..n]).await.map_err(|e| FetchError::Protocol(e.to_string()))?;
        remaining -= n as u64;
    }
    Ok(())
}

async fn read_until_close(conn: &mut Connection, sink: &mut BodySink) -> Result<(), FetchError> {
    let mut buf = vec![0u8; 8192];
    loop {
        let n = conn.read(&mut buf).await.map_err(map_net)?;
        if n == 0 {
            return Ok(());
        }
        sink.push(&buf[..n]).await.map_err(|e| FetchError::Protocol(e.to_string()))?;
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
    async fn parses_status_line_and_headers() {
        let mut conn = serve(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello").await;
        let mut head = read_head(&mut conn).await.unwrap();
        assert_eq!(head.status_code, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.header("Content-Type"), Some("text/plain"));
        assert!(!head.http_1_0);

        let mut body = read_body(&mut conn, &mut head, false, false, 1 << 20).await.unwrap();
        assert_eq!(body.read_all().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn malformed_status_line_is_protocol_error() {
        let mut conn = serve(b"not a status line\r\n\r\n").await;
        let err = read_head(&mut conn).await.unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[tokio::test]
    async fn chunked_wins_over_content_length_when_both_present() {
        let mut conn = serve(
            b"HTTP/1.1 200 OK\r\nContent-Length: 999\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ntest\r\n0\r\n\r\n",
        )
        .await;
        let mut head = read_head(&mut conn).await.unwrap();
        let mut body = read_body(&mut conn, &mut head, false, false, 1 << 20).await.unwrap();
        assert_eq!(body.read_all().unwrap(), b"test");
    }

    #[tokio::test]
    async fn chunked_trailer_is_merged_into_response_headers() {
        let mut conn = serve(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ntest\r\n0\r\nAnimal: dolphin\r\n\r\n",
        )
        .await;
        let mut head = read_head(&mut conn).await.unwrap();
        let mut body = read_body(&mut conn, &mut head, false, false, 1 << 20).await.unwrap();
        assert_eq!(body.read_all().unwrap(), b"test");
        assert_eq!(head.header("Animal"), Some("dolphin"));
    }

    #[tokio::test]
    async fn head_response_has_no_body_even_with_content_length() {
        let mut conn = serve(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n").await;
        let mut head = read_head(&mut conn).await.unwrap();
        let mut body = read_body(&mut conn, &mut head, true, false, 1 << 20).await.unwrap();
        assert_eq!(body.read_all().unwrap(), b"");
    }

    #[tokio::test]
    async fn no_framing_headers_reads_until_close() {
        let mut conn = serve(b"HTTP/1.0 200 OK\r\n\r\nall the bytes").await;
        let mut head = read_head(&mut conn).await.unwrap();
        assert!(head.http_1_0);
        let mut body = read_body(&mut conn, &mut head, false, false, 1 << 20).await.unwrap();
        assert_eq!(body.read_all().unwrap(), b"all the bytes");
    }
}
