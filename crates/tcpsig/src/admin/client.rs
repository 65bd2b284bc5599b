//! Unix-socket client for the admin protocol.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use zeroize::Zeroize;

use super::frame;
use super::message::{SIGMSG_HDRLEN, SigMsgHdr, SigMsgType, StatusBlock};
use super::protocol::{AdminReply, decode_entry};
use super::request::AdminRequest;
use crate::error::{Error, Result};
use crate::key::SaKey;
use crate::store::SaEntry;

/// Key-management client.
///
/// Requests on one client are serialized; use several clients for
/// concurrent requests.
#[derive(Debug)]
pub struct AdminClient {
    stream: Mutex<UnixStream>,
    seq: AtomicU32,
    pid: u32,
}

impl AdminClient {
    /// Connect to a server listening on `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream: Mutex::new(stream),
            seq: AtomicU32::new(1),
            pid: std::process::id(),
        })
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and collect its reply.
    pub async fn request(&self, request: &AdminRequest) -> Result<AdminReply> {
        let seq = self.next_seq();
        let mut builder = request.to_builder();
        builder.set_seq(seq);
        builder.set_pid(self.pid);
        let mut msg = builder.finish();

        let mut stream = self.stream.lock().await;
        let sent = stream.write_all(&msg).await;
        msg.zeroize();
        sent?;

        let mut reply = AdminReply::ok();
        loop {
            let buf = frame::read_message(&mut *stream)
                .await?
                .ok_or_else(|| Error::InvalidMessage("connection closed before reply".into()))?;
            let hdr = *SigMsgHdr::from_bytes(&buf)?;
            if hdr.seq != seq {
                return Err(Error::InvalidMessage(format!(
                    "reply sequence {} does not match request {}",
                    hdr.seq, seq
                )));
            }

            let payload = &buf[SIGMSG_HDRLEN..];
            if request.kind() == SigMsgType::DUMP && !hdr.is_done() {
                reply.entries.push(decode_entry(payload)?);
                continue;
            }

            let status = StatusBlock::from_bytes(payload)?;
            reply.status = status.status;
            reply.diagnostic = status.diagnostic();
            return Ok(reply);
        }
    }

    /// Add an SA using the whole of `key`.
    pub async fn add(&self, src: SocketAddr, dst: SocketAddr, key: &[u8]) -> Result<()> {
        let key = SaKey::from_slice(key)?;
        self.request(&AdminRequest::Add { src, dst, key })
            .await?
            .into_result()
            .map(drop)
    }

    /// Check whether an SA applies to `(src, dst)`.
    pub async fn get(&self, src: SocketAddr, dst: SocketAddr) -> Result<()> {
        self.request(&AdminRequest::Get { src, dst })
            .await?
            .into_result()
            .map(drop)
    }

    /// Remove all SAs.
    pub async fn flush(&self) -> Result<()> {
        self.request(&AdminRequest::Flush)
            .await?
            .into_result()
            .map(drop)
    }

    /// List all SAs.
    pub async fn dump(&self) -> Result<Vec<SaEntry>> {
        self.request(&AdminRequest::Dump).await?.into_result()
    }
}
