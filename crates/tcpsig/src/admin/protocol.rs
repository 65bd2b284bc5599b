//! Request handling against a [`KeyStore`].

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};
use zeroize::{Zeroize, Zeroizing};

use super::ExtensionKind;
use super::builder::MessageBuilder;
use super::ext::{ExtIter, KeyExtHdr, SockAddrExt};
use super::message::{SIGM_F_MULTI, SIGM_F_REPLY, SIGMSG_HDRLEN, SigMsgHdr, SigMsgType};
use super::request::AdminRequest;
use crate::addr::AddressFamily;
use crate::diagnostic::Diagnostic;
use crate::error::{Error, Result};
use crate::store::{KeyStore, SaEntry};

/// Outcome of one admin request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminReply {
    /// Zero or a positive errno value.
    pub status: i32,
    /// Reason for a failed request.
    pub diagnostic: Diagnostic,
    /// SAs listed by DUMP.
    pub entries: Vec<SaEntry>,
}

impl AdminReply {
    /// A successful reply.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A failed reply carrying the error's status pair.
    pub fn from_error(err: &Error) -> Self {
        Self {
            status: err.errno(),
            diagnostic: err.diagnostic(),
            entries: Vec::new(),
        }
    }

    /// Check if the request succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Convert a failed reply into an error.
    pub fn into_result(self) -> Result<Vec<SaEntry>> {
        if self.is_ok() {
            Ok(self.entries)
        } else {
            Err(Error::from_status(self.status, self.diagnostic))
        }
    }
}

/// Executes admin requests against a store.
#[derive(Debug, Clone)]
pub struct AdminProtocol {
    store: Arc<KeyStore>,
}

impl AdminProtocol {
    /// Create a handler for `store`.
    pub fn new(store: Arc<KeyStore>) -> Self {
        Self { store }
    }

    /// Get the backing store.
    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    /// Execute one request.
    pub fn handle(&self, request: AdminRequest) -> AdminReply {
        let result = match request {
            AdminRequest::Add { src, dst, key } => self.store.insert(src, dst, key),
            AdminRequest::Get { src, dst } => self.store.get(&src, &dst),
            AdminRequest::Flush => {
                self.store.flush();
                Ok(())
            }
            AdminRequest::Dump => {
                return AdminReply {
                    entries: self.store.snapshot(),
                    ..AdminReply::ok()
                };
            }
        };

        match result {
            Ok(()) => AdminReply::ok(),
            Err(e) => AdminReply::from_error(&e),
        }
    }

    /// Handle one framed request message and return the encoded reply.
    ///
    /// The request buffer is zeroed once decoded, so key bytes do not
    /// outlive the copy taken for the SA.
    pub fn handle_message(&self, msg: &mut [u8]) -> Vec<u8> {
        let hdr = match SigMsgHdr::from_bytes(msg) {
            Ok(h) => *h,
            Err(e) => {
                warn!(error = %e, "unreadable admin message");
                msg.zeroize();
                return encode_reply(&SigMsgHdr::default(), &AdminReply::from_error(&e));
            }
        };

        let decoded = if hdr.len as usize != msg.len() {
            Err(Error::InvalidMessage(format!(
                "header length {} does not match frame length {}",
                hdr.len,
                msg.len()
            )))
        } else {
            AdminRequest::parse(hdr.kind, &msg[SIGMSG_HDRLEN..])
        };
        msg.zeroize();

        let reply = match decoded {
            Ok(request) => {
                debug!(
                    kind = SigMsgType::name(hdr.kind),
                    seq = hdr.seq,
                    "admin request"
                );
                self.handle(request)
            }
            Err(e) => AdminReply::from_error(&e),
        };

        if !reply.is_ok() {
            warn!(
                kind = SigMsgType::name(hdr.kind),
                seq = hdr.seq,
                status = reply.status,
                diagnostic = %reply.diagnostic,
                "admin request rejected"
            );
        }
        encode_reply(&hdr, &reply)
    }
}

/// Encode the reply to the request with header `req`.
///
/// DUMP replies are a run of multipart entry messages followed by a DONE
/// message with the status; every other reply is a single message.
pub fn encode_reply(req: &SigMsgHdr, reply: &AdminReply) -> Vec<u8> {
    let mut out = Vec::new();

    if req.kind == SigMsgType::DUMP {
        for entry in &reply.entries {
            let mut builder = MessageBuilder::new(SigMsgType::DUMP, SIGM_F_REPLY | SIGM_F_MULTI);
            builder.set_seq(req.seq);
            builder.set_pid(req.pid);
            builder.append_addr(ExtensionKind::Source, &entry.src);
            builder.append_addr(ExtensionKind::Destination, &entry.dst);
            builder.push_key(
                entry.key_bits,
                entry.key.as_deref().map(Vec::as_slice).unwrap_or_default(),
            );
            out.extend_from_slice(&builder.finish());
        }

        let mut done = MessageBuilder::new(SigMsgType::DONE, SIGM_F_REPLY | SIGM_F_MULTI);
        done.set_seq(req.seq);
        done.set_pid(req.pid);
        done.append_status(reply.status, reply.diagnostic);
        out.extend_from_slice(&done.finish());
        return out;
    }

    let mut builder = MessageBuilder::new(req.kind, SIGM_F_REPLY);
    builder.set_seq(req.seq);
    builder.set_pid(req.pid);
    builder.append_status(reply.status, reply.diagnostic);
    out.extend_from_slice(&builder.finish());
    out
}

/// Decode one DUMP entry message payload.
pub fn decode_entry(payload: &[u8]) -> Result<SaEntry> {
    let mut src: Option<SocketAddr> = None;
    let mut dst: Option<SocketAddr> = None;
    let mut key: Option<(u16, &[u8])> = None;

    for ext in ExtIter::new(payload) {
        let (kind, data) = ext?;
        match ExtensionKind::from_u16(kind) {
            Some(ExtensionKind::Source) => {
                src = Some(SockAddrExt::from_bytes(data)?.to_socket_addr()?)
            }
            Some(ExtensionKind::Destination) => {
                dst = Some(SockAddrExt::from_bytes(data)?.to_socket_addr()?)
            }
            Some(ExtensionKind::Key) => {
                let (hdr, bytes) = KeyExtHdr::split(data)?;
                key = Some((hdr.bits, bytes));
            }
            None => {}
        }
    }

    let src = src.ok_or(Error::MissingExtension(ExtensionKind::Source))?;
    let dst = dst.ok_or(Error::MissingExtension(ExtensionKind::Destination))?;
    let (key_bits, bytes) = key.ok_or(Error::MissingExtension(ExtensionKind::Key))?;

    let len = usize::from(key_bits).div_ceil(8);
    Ok(SaEntry {
        family: AddressFamily::of(&src),
        src,
        dst,
        key_bits,
        key: (!bytes.is_empty())
            .then(|| Zeroizing::new(bytes[..len.min(bytes.len())].to_vec())),
    })
}
