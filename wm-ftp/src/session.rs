//! FTP control+data session orchestration (spec.md §4.5):
//! `USER/PASS` → `TYPE I` → `PASV` → optional `SIZE`/`REST` →
//! `RETR`/`MLSD`/`LIST` → data channel drain → final control reply.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracing::{debug, warn};
use wm_net::Connection;
use wm_types::FetchError;

use crate::reply::{read_reply, send_command, FtpReply};

const DEFAULT_USER: &str = "anonymous";
const DEFAULT_PASS: &str = "wmirror@anonymous.invalid";

/// What kind of listing command produced a data channel, so the caller
/// knows which parser to run over the drained bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Mlsd,
    List,
}

/// An established FTP control connection, with remembered credentials so
/// a Connection handed back by the pool does not need to re-login
/// (spec.md §4.5 "Authentication").
pub struct FtpSession<'a> {
    conn: &'a mut Connection,
    authenticated: Option<(String, String)>,
}

impl<'a> FtpSession<'a> {
    #[must_use]
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn, authenticated: None }
    }

    /// `USER` (optionally `PASS`), skipped if this session already
    /// authenticated with the same credentials.
    pub async fn login(&mut self, user: Option<&str>, pass: Option<&str>) -> Result<(), FetchError> {
        let user = user.unwrap_or(DEFAULT_USER).to_string();
        let pass = pass.unwrap_or(DEFAULT_PASS).to_string();

        if self.authenticated.as_ref() == Some(&(user.clone(), pass.clone())) {
            return Ok(());
        }

        send_command(self.conn, &format!("USER {user}")).await?;
        let reply = read_reply(self.conn).await?;
        match reply.code {
            230 => {}
            331 => {
                send_command(self.conn, &format!("PASS {pass}")).await?;
                let reply = read_reply(self.conn).await?;
                if reply.code != 230 {
                    return Err(FetchError::Authentication(reply.message()));
                }
            }
            _ => return Err(FetchError::Authentication(reply.message())),
        }
        self.authenticated = Some((user, pass));
        Ok(())
    }

    pub async fn set_binary_type(&mut self) -> Result<(), FetchError> {
        send_command(self.conn, "TYPE I").await?;
        expect_code(self.conn, 200).await
    }

    /// `PASV` → parses `(h1,h2,h3,h4,p1,p2)` from the reply text.
    pub async fn pasv(&mut self) -> Result<SocketAddr, FetchError> {
        send_command(self.conn, "PASV").await?;
        let reply = read_reply(self.conn).await?;
        if reply.code != 227 {
            return Err(FetchError::Protocol(format!("PASV refused: {}", reply.message())));
        }
        parse_pasv_address(&reply.message())
    }

    /// `SIZE path` → `Some(size)`, or `None` if the server errors (the
    /// spec treats this as "unknown size", not a hard failure).
    pub async fn size(&mut self, path: &str) -> Result<Option<u64>, FetchError> {
        send_command(self.conn, &format!("SIZE {path}")).await?;
        let reply = read_reply(self.conn).await?;
        if reply.code != 213 {
            return Ok(None);
        }
        Ok(reply.message().trim().parse().ok())
    }

    /// `REST offset` → `true` only on a `350` reply; per spec.md's open
    /// question resolution, any other reply abandons the restart rather
    /// than erroring, so the caller re-issues `RETR` from offset 0.
    pub async fn rest(&mut self, offset: u64) -> Result<bool, FetchError> {
        send_command(self.conn, &format!("REST {offset}")).await?;
        let reply = read_reply(self.conn).await?;
        if reply.code == 350 {
            Ok(true)
        } else {
            warn!(offset, code = reply.code, "REST not honored, abandoning restart");
            Ok(false)
        }
    }

    /// Issues `RETR path`, expecting `150` or `125` ("transfer starting").
    pub async fn retr(&mut self, path: &str) -> Result<(), FetchError> {
        send_command(self.conn, &format!("RETR {path}")).await?;
        expect_transfer_starting(self.conn).await
    }

    /// Tries `MLSD path` first; on `500`/`502` (command unrecognized or
    /// not implemented) falls back to `LIST path`.
    pub async fn list(&mut self, path: &str) -> Result<ListingKind, FetchError> {
        send_command(self.conn, &format!("MLSD {path}")).await?;
        let reply = read_reply(self.conn).await?;
        match reply.code {
            150 | 125 => Ok(ListingKind::Mlsd),
            500 | 502 => {
                debug!("MLSD unsupported, falling back to LIST");
                send_command(self.conn, &format!("LIST {path}")).await?;
                expect_transfer_starting(self.conn).await?;
                Ok(ListingKind::List)
            }
            _ => Err(FetchError::Protocol(format!("MLSD refused: {}", reply.message()))),
        }
    }

    /// Reads the final control reply after the data channel has been
    /// drained, expecting `226` (transfer complete).
    pub async fn finish_transfer(&mut self) -> Result<FtpReply, FetchError> {
        let reply = read_reply(self.conn).await?;
        if reply.code != 226 {
            return Err(FetchError::Protocol(format!("transfer did not complete cleanly: {}", reply.message())));
        }
        Ok(reply)
    }
}

async fn expect_code(conn: &mut Connection, expected: u16) -> Result<(), FetchError> {
    let reply = read_reply(conn).await?;
    if reply.code != expected {
        return Err(FetchError::Protocol(format!("expected {expected}, got {}: {}", reply.code, reply.message())));
    }
    Ok(())
}

async fn expect_transfer_starting(conn: &mut Connection) -> Result<(), FetchError> {
    let reply = read_reply(conn).await?;
    if !matches!(reply.code, 150 | 125) {
        return Err(FetchError::Protocol(format!("transfer did not start: {}", reply.message())));
    }
    Ok(())
}

/// Parses `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2).` (or any text
/// containing a parenthesized 6-tuple) into a socket address.
fn parse_pasv_address(message: &str) -> Result<SocketAddr, FetchError> {
    let open = message.find('(').ok_or_else(|| FetchError::Protocol(format!("malformed PASV reply: {message:?}")))?;
    let close = message[open..]
        .find(')')
        .map(|i| i + open)
        .ok_or_else(|| FetchError::Protocol(format!("malformed PASV reply: {message:?}")))?;

    let parts: Vec<u16> = message[open + 1..close]
        .split(',')
        .map(str::trim)
        .map(|s| s.parse())
        .collect::<Result<_, _>>()
        .map_err(|_| FetchError::Protocol(format!("malformed PASV address: {message:?}")))?;

    if parts.len() != 6 {
        return Err(FetchError::Protocol(format!("malformed PASV address: {message:?}")));
    }
    let ip = Ipv4Addr::new(parts[0] as u8, parts[1] as u8, parts[2] as u8, parts[3] as u8);
    let port = (parts[4] << 8) | parts[5];
    Ok(SocketAddr::new(IpAddr::V4(ip), port))
}

/// Dials the passive-mode data channel directly; unlike the HTTP
/// Connection pool, FTP data channels are single-use and torn down after
/// one transfer, so pooling them would only add bookkeeping.
pub async fn dial_data_channel(addr: SocketAddr, connect_timeout: Duration, read_timeout: Duration) -> Result<Connection, FetchError> {
    let mut conn = Connection::new(connect_timeout, read_timeout, read_timeout);
    conn.connect(addr).await.map_err(FetchError::Network)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_pasv_reply() {
        let addr = parse_pasv_address("Entering Passive Mode (192,168,1,5,200,15)").unwrap();
        assert_eq!(addr, SocketAddr::from(([192, 168, 1, 5], 200 * 256 + 15)));
    }

    #[test]
    fn rejects_malformed_pasv_reply() {
        assert!(parse_pasv_address("no parens here").is_err());
        assert!(parse_pasv_address("(1,2,3,4,5)").is_err());
    }
}
