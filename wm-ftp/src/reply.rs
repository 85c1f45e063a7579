//! FTP control-stream reply parsing (RFC 959 §4.2, spec.md §4.5).
//!
//! A reply is one or more lines; a continuation line is `NNN-text`, the
//! final line is `NNN text` with the same three-digit code followed by a
//! space (or standing alone).

use wm_net::Connection;
use wm_types::{FetchError, NetworkError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpReply {
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        matches!(self.code, 100..=399)
    }
}

/// Reads one complete (possibly multi-line) reply from the control
/// connection.
pub async fn read_reply(conn: &mut Connection) -> Result<FtpReply, FetchError> {
    let first = conn.read_line(4096).await.map_err(map_net)?;
    let (code, rest, multiline) = split_reply_line(&first)?;

    let mut lines = vec![rest];
    if !multiline {
        return Ok(FtpReply { code, lines });
    }

    let prefix_final = format!("{code} ");
    loop {
        let line = conn.read_line(4096).await.map_err(map_net)?;
        if line.starts_with(&prefix_final) {
            lines.push(line[prefix_final.len()..].to_string());
            break;
        }
        lines.push(line);
    }
    Ok(FtpReply { code, lines })
}

/// Splits `NNN-text` or `NNN text` (or bare `NNN`) into `(code, text,
/// is_multiline_start)`.
fn split_reply_line(line: &str) -> Result<(u16, String, bool), FetchError> {
    if line.len() < 3 {
        return Err(FetchError::Protocol(format!("malformed FTP reply: {line:?}")));
    }
    let (code_str, tail) = line.split_at(3);
    let code: u16 = code_str
        .parse()
        .map_err(|_| FetchError::Protocol(format!("malformed FTP reply code: {line:?}")))?;

    match tail.chars().next() {
        Some('-') => Ok((code, tail[1..].to_string(), true)),
        Some(' ') => Ok((code, tail[1..].to_string(), false)),
        None => Ok((code, String::new(), false)),
        _ => Err(FetchError::Protocol(format!("malformed FTP reply: {line:?}"))),
    }
}

/// Sends `line` (without the trailing CRLF) on the control connection.
pub async fn send_command(conn: &mut Connection, line: &str) -> Result<(), FetchError> {
    let mut out = line.to_string();
    out.push_str("\r\n");
    conn.write(out.as_bytes()).await.map_err(map_net)
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
    async fn parses_single_line_reply() {
        let mut conn = serve(b"230 Login successful.\r\n").await;
        let reply = read_reply(&mut conn).await.unwrap();
        assert_eq!(reply.code, 230);
        assert_eq!(reply.message(), "Login successful.");
    }

    #[tokio::test]
    async fn parses_multiline_reply_until_matching_final_line() {
        let mut conn = serve(b"211-Features:\r\n PASV\r\n MLSD\r\n211 End\r\n").await;
        let reply = read_reply(&mut conn).await.unwrap();
        assert_eq!(reply.code, 211);
        assert_eq!(reply.lines, vec!["Features:", " PASV", " MLSD", "End"]);
    }

    #[tokio::test]
    async fn malformed_reply_is_protocol_error() {
        let mut conn = serve(b"nope\r\n").await;
        let err = read_reply(&mut conn).await.unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }
}
