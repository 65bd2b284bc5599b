//! Unix-socket server for the admin protocol.

use std::fs;
use std::future::Future;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use super::frame;
use super::protocol::{AdminProtocol, AdminReply, encode_reply};
use crate::error::Result;

/// Serves admin requests on a Unix stream socket.
///
/// Each accepted connection is handled on its own task. A connection may
/// carry any number of requests; each gets exactly one reply (a DUMP reply
/// being a run of messages).
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tcpsig::admin::{AdminProtocol, AdminServer};
/// use tcpsig::KeyStore;
///
/// let protocol = AdminProtocol::new(Arc::new(KeyStore::new()));
/// let server = AdminServer::bind("/run/tcpsig.sock", protocol)?;
/// server.run_until(tokio::signal::ctrl_c()).await?;
/// ```
#[derive(Debug)]
pub struct AdminServer {
    listener: UnixListener,
    path: PathBuf,
    protocol: AdminProtocol,
}

impl AdminServer {
    /// Bind to `path`, replacing a stale socket file left there.
    ///
    /// Fails with `AddrInUse` when `path` is not a socket or a server is
    /// still accepting on it. Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>, protocol: AdminProtocol) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        remove_stale_socket(&path)?;
        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "admin socket listening");
        Ok(Self {
            listener,
            path,
            protocol,
        })
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until an accept error occurs.
    pub async fn run(&self) -> Result<()> {
        loop {
            let (stream, _) = self.listener.accept().await?;
            let protocol = self.protocol.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, protocol).await {
                    warn!(error = %e, "admin connection failed");
                }
            });
        }
    }

    /// Accept connections until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!(path = %self.path.display(), "admin socket shutting down");
                Ok(())
            }
        }
    }
}

impl Drop for AdminServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Remove a socket file nobody listens on any more.
fn remove_stale_socket(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if !meta.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("{} exists and is not a socket", path.display()),
        )
        .into());
    }

    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("{} is in use by a running server", path.display()),
        )
        .into()),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            debug!(path = %path.display(), "removing stale admin socket");
            fs::remove_file(path)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn serve_connection(mut stream: UnixStream, protocol: AdminProtocol) -> Result<()> {
    debug!("admin connection accepted");

    while let Some(hdr) = frame::read_header(&mut stream).await? {
        // A bad length loses framing: answer it, then drop the connection.
        if let Err(e) = frame::check_len(&hdr) {
            warn!(seq = hdr.seq, error = %e, "malformed admin frame");
            let reply = encode_reply(&hdr, &AdminReply::from_error(&e));
            stream.write_all(&reply).await?;
            return Ok(());
        }

        let mut msg = frame::read_body(&mut stream, &hdr).await?;
        let reply = protocol.handle_message(&mut msg);
        stream.write_all(&reply).await?;
    }

    debug!("admin connection closed");
    Ok(())
}
