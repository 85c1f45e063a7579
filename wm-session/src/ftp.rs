//! FTP download/listing session built over a pooled control Connection
//! and an ephemeral passive-mode data Connection (spec.md §4.5).

use std::time::Duration;

use tracing::debug;
use wm_ftp::{dial_data_channel, FtpSession as FtpControl, ListingKind};
use wm_http::{Body, BodySink};
use wm_net::{ConnectionPool, Leased};
use wm_types::FetchError;

use crate::recorder::Recorder;

pub struct FtpDownloadSession<'a> {
    pool: &'a ConnectionPool,
    leased: Option<Leased>,
    data_connect_timeout: Duration,
    data_read_timeout: Duration,
    spill_threshold: usize,
}

/// The outcome of fetching one FTP path: either a file body or a parsed
/// directory listing, mirroring spec.md §4.5 step 7's `RETR` vs
/// `MLSD`/`LIST` branch.
pub enum FtpFetch {
    File(Body),
    Listing { kind: ListingKind, raw: Body },
}

impl<'a> FtpDownloadSession<'a> {
    #[must_use]
    pub fn new(pool: &'a ConnectionPool, spill_threshold: usize) -> Self {
        Self {
            pool,
            leased: None,
            data_connect_timeout: Duration::from_secs(30),
            data_read_timeout: Duration::from_secs(30),
            spill_threshold,
        }
    }

    async fn control(
        &mut self,
        host: &str,
        port: u16,
        user: Option<&str>,
        pass: Option<&str>,
    ) -> Result<(), FetchError> {
        if self.leased.is_none() {
            let leased = self.pool.acquire(host, port, false, None).await.map_err(FetchError::Network)?;
            self.leased = Some(leased);
            let conn = &mut self.leased.as_mut().unwrap().conn;
            let mut ftp = FtpControl::new(conn);
            ftp.login(user, pass).await?;
            ftp.set_binary_type().await?;
        }
        Ok(())
    }

    /// Fetches `path` as a file: `SIZE` (best-effort), optional `REST`
    /// resume, `RETR`, data-channel drain.
    pub async fn retrieve_file(
        &mut self,
        host: &str,
        port: u16,
        user: Option<&str>,
        pass: Option<&str>,
        path: &str,
        resume_offset: Option<u64>,
        recorder: &dyn Recorder,
    ) -> Result<Body, FetchError> {
        self.control(host, port, user, pass).await?;
        recorder.begin_control();

        let conn = &mut self.leased.as_mut().expect("control just ran").conn;
        let mut ftp = FtpControl::new(conn);

        let _size = ftp.size(path).await?;

        if let Some(offset) = resume_offset {
            if !ftp.rest(offset).await? {
                debug!(path, "server ignored REST, restarting from 0");
            }
        }

        let data_addr = ftp.pasv().await?;
        ftp.retr(path).await?;

        let mut data_conn = dial_data_channel(data_addr, self.data_connect_timeout, self.data_read_timeout).await?;
        let mut sink = BodySink::new(self.spill_threshold);
        drain_data_channel(&mut data_conn, &mut sink).await?;
        data_conn.close();

        ftp.finish_transfer().await?;
        recorder.end_control();

        sink.finish().await.map_err(|e| FetchError::Protocol(e.to_string()))
    }

    /// Fetches a directory listing for `path`, trying `MLSD` before
    /// falling back to `LIST`.
    pub async fn list_directory(
        &mut self,
        host: &str,
        port: u16,
        user: Option<&str>,
        pass: Option<&str>,
        path: &str,
        recorder: &dyn Recorder,
    ) -> Result<FtpFetch, FetchError> {
        self.control(host, port, user, pass).await?;
        recorder.begin_control();

        let conn = &mut self.leased.as_mut().expect("control just ran").conn;
        let mut ftp = FtpControl::new(conn);

        let data_addr = ftp.pasv().await?;
        let kind = ftp.list(path).await?;

        let mut data_conn = dial_data_channel(data_addr, self.data_connect_timeout, self.data_read_timeout).await?;
        let mut sink = BodySink::new(self.spill_threshold);
        drain_data_channel(&mut data_conn, &mut sink).await?;
        data_conn.close();

        ftp.finish_transfer().await?;
        recorder.end_control();

        let raw = sink.finish().await.map_err(|e| FetchError::Protocol(e.to_string()))?;
        Ok(FtpFetch::Listing { kind, raw })
    }

    /// Releases the control connection back to the pool for reuse by a
    /// subsequent fetch to the same host.
    pub fn release(mut self) {
        if let Some(leased) = self.leased.take() {
            let reuse = leased.conn.state() != wm_net::ConnState::Dead;
            self.pool.release(&leased.key, leased.conn, reuse);
        }
    }
}

impl Drop for FtpDownloadSession<'_> {
    fn drop(&mut self) {
        if let Some(mut leased) = self.leased.take() {
            tracing::warn!(host = %leased.key.host, "FTP session dropped before release; force-recycling connection");
            leased.conn.close();
            self.pool.release(&leased.key, leased.conn, false);
        }
    }
}

async fn drain_data_channel(conn: &mut wm_net::Connection, sink: &mut BodySink) -> Result<(), FetchError> {
    let mut buf = [0u8; 8192];
    loop {
        let n = conn.read(&mut buf).await.map_err(FetchError::Network)?;
        if n == 0 {
            break;
        }
        sink.push(&buf[..n]).await.map_err(|e| FetchError::Protocol(e.to_string()))?;
    }
    Ok(())
}
