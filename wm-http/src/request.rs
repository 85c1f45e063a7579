//! Request-line and header serialization (spec.md §4.4 "Writing").

use wm_net::Connection;
use wm_types::{FetchError, NetworkError, RequestHead};

/// Writes `req` to `conn` as an HTTP/1.1 request.
///
/// `target` is the request-target: an absolute-form URI when talking to
/// an HTTP proxy in plaintext, otherwise the origin-form path+query.
/// `keep_alive` controls whether a `Connection: close` header is sent;
/// the caller decides this once per request based on pool/session policy,
/// not on anything derived here.
pub async fn write_request(
    conn: &mut Connection,
    req: &RequestHead,
    target: &str,
    keep_alive: bool,
) -> Result<(), FetchError> {
    let mut out = String::new();
    out.push_str(req.method.as_str());
    out.push(' ');
    out.push_str(target);
    out.push_str(" HTTP/1.1\r\n");

    let mut wrote_host = false;
    let mut wrote_connection = false;
    for (name, value) in &req.headers {
        if name.eq_ignore_ascii_case("host") {
            wrote_host = true;
        }
        if name.eq_ignore_ascii_case("connection") {
            wrote_connection = true;
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }

    if !wrote_host {
        let host = req.url.host_str().unwrap_or_default();
        match req.url.port() {
            Some(port) => out.push_str(&format!("Host: {host}:{port}\r\n")),
            None => out.push_str(&format!("Host: {host}\r\n")),
        }
    }
    if !wrote_connection {
        out.push_str(if keep_alive { "Connection: keep-alive\r\n" } else { "Connection: close\r\n" });
    }

    if let Some(body) = &req.body {
        if req.header("Content-Length").is_none() {
            out.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
    }

    out.push_str("\r\n");

    conn.write(out.as_bytes()).await.map_err(map_net)?;
    if let Some(body) = &req.body {
        conn.write(body).await.map_err(map_net)?;
    }
    conn.note_request();
    Ok(())
}

fn map_net(e: NetworkError) -> FetchError {
    FetchError::Network(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn serializes_get_with_default_host_and_connection_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let mut conn = Connection::new(Duration::from_secs(2), Duration::from_secs(2), Duration::from_secs(2));
        conn.connect(addr).await.unwrap();

        let req = RequestHead::get(url::Url::parse("http://example.test/path?q=1").unwrap());
        write_request(&mut conn, &req, "/path?q=1", false).await.unwrap();

        let received = server.await.unwrap();
        assert!(received.starts_with("GET /path?q=1 HTTP/1.1\r\n"));
        assert!(received.contains("Host: example.test\r\n"));
        assert!(received.contains("Connection: close\r\n"));
        assert!(received.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn body_present_adds_content_length() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let mut conn = Connection::new(Duration::from_secs(2), Duration::from_secs(2), Duration::from_secs(2));
        conn.connect(addr).await.unwrap();

        let mut req = RequestHead::get(url::Url::parse("http://example.test/submit").unwrap());
        req.method = wm_types::RequestMethod::Post;
        req.body = Some(b"a=1".to_vec());
        write_request(&mut conn, &req, "/submit", true).await.unwrap();

        let received = server.await.unwrap();
        assert!(received.contains("Content-Length: 3\r\n"));
        assert!(received.contains("Connection: keep-alive\r\n"));
        assert!(received.ends_with("a=1"));
    }
}
