//! Message builder for constructing admin messages.

use std::net::SocketAddr;

use zerocopy::{Immutable, IntoBytes};

use super::ExtensionKind;
use super::ext::{EXT_HDRLEN, ExtHdr, KeyExtHdr, MAX_EXT_PAYLOAD, SockAddrExt, ext_align};
use super::message::{SIGMSG_HDRLEN, SigMsgHdr, StatusBlock, sigmsg_align};
use crate::diagnostic::Diagnostic;
use crate::error::{Error, Result};
use crate::key::MAX_KEY_LEN;

/// Builder for constructing admin messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(kind: u16, flags: u16) -> Self {
        let mut buf = vec![0u8; SIGMSG_HDRLEN];
        buf[..std::mem::size_of::<SigMsgHdr>()]
            .copy_from_slice(SigMsgHdr::new(kind, flags).as_bytes());
        Self { buf }
    }

    /// Append raw bytes to the message (with alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        let aligned = sigmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append a fixed-size wire struct.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.append_bytes(data.as_bytes());
    }

    /// Append a reply status block.
    pub fn append_status(&mut self, status: i32, diagnostic: Diagnostic) {
        self.append(&StatusBlock::new(status, diagnostic));
    }

    /// Append an extension with the given kind and payload.
    ///
    /// Fails with [`Error::InvalidExtension`] when the payload does not fit
    /// the 16-bit extension length.
    pub fn append_ext(&mut self, kind: u16, data: &[u8]) -> Result<()> {
        if data.len() > MAX_EXT_PAYLOAD {
            return Err(Error::InvalidExtension(format!(
                "extension {} payload of {} bytes exceeds {}",
                kind,
                data.len(),
                MAX_EXT_PAYLOAD
            )));
        }
        self.push_ext(kind, &[data]);
        Ok(())
    }

    /// Append a source or destination address extension.
    pub fn append_addr(&mut self, kind: ExtensionKind, addr: &SocketAddr) {
        self.push_ext(kind.raw(), &[SockAddrExt::new(addr).as_bytes()]);
    }

    /// Append a key extension. `key` may be empty to report only the length.
    ///
    /// The key is copied straight into the message buffer, which is grown
    /// beforehand so no reallocation leaves a stale copy behind.
    pub fn append_key(&mut self, bits: u16, key: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_LEN {
            return Err(Error::InvalidKeyLength {
                bits,
                len: key.len(),
            });
        }
        self.push_key(bits, key);
        Ok(())
    }

    /// Append a key extension for key bytes already bounded by an `SaKey`.
    pub(crate) fn push_key(&mut self, bits: u16, key: &[u8]) {
        debug_assert!(key.len() <= MAX_KEY_LEN);
        let hdr = KeyExtHdr { bits, pad: 0 };
        self.push_ext(ExtensionKind::Key.raw(), &[hdr.as_bytes(), key]);
    }

    /// Write one extension made of `parts`, reserving its padded size first.
    fn push_ext(&mut self, kind: u16, parts: &[&[u8]]) {
        let data_len: usize = parts.iter().map(|p| p.len()).sum();
        debug_assert!(data_len <= MAX_EXT_PAYLOAD);
        self.buf.reserve(ext_align(EXT_HDRLEN + data_len));

        self.buf
            .extend_from_slice(ExtHdr::new(kind, data_len).as_bytes());
        for part in parts {
            self.buf.extend_from_slice(part);
        }
        let aligned = ext_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        let bytes = seq.to_ne_bytes();
        self.buf[8..12].copy_from_slice(&bytes);
    }

    /// Set the sender identifier.
    pub fn set_pid(&mut self, pid: u32) {
        let bytes = pid.to_ne_bytes();
        self.buf[12..16].copy_from_slice(&bytes);
    }

    /// Finalize and return the message bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }
}
