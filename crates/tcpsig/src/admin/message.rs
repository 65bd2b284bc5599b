//! Admin message header, reply status and message iteration.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::diagnostic::Diagnostic;
use crate::error::{Error, Result};

/// Message alignment.
pub const SIGMSG_ALIGNTO: usize = 4;

/// Align a length to SIGMSG_ALIGNTO boundary.
#[inline]
pub const fn sigmsg_align(len: usize) -> usize {
    (len + SIGMSG_ALIGNTO - 1) & !(SIGMSG_ALIGNTO - 1)
}

/// Size of the message header.
pub const SIGMSG_HDRLEN: usize = sigmsg_align(std::mem::size_of::<SigMsgHdr>());

/// Largest message accepted from a peer.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Message header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SigMsgHdr {
    /// Length of message including header.
    pub len: u32,
    /// Message type, one of [`SigMsgType`].
    pub kind: u16,
    /// `SIGM_F_*` flags.
    pub flags: u16,
    /// Sequence number, echoed in replies.
    pub seq: u32,
    /// Sender identifier, echoed in replies.
    pub pid: u32,
}

impl SigMsgHdr {
    /// Create a new message header.
    pub fn new(kind: u16, flags: u16) -> Self {
        Self {
            len: SIGMSG_HDRLEN as u32,
            kind,
            flags,
            seq: 0,
            pid: 0,
        }
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.len as usize).saturating_sub(SIGMSG_HDRLEN)
    }

    /// Check if this is the end of a DUMP.
    pub fn is_done(&self) -> bool {
        self.kind == SigMsgType::DONE
    }

    /// Check if this message is part of a multipart reply.
    pub fn is_multi(&self) -> bool {
        self.flags & SIGM_F_MULTI != 0
    }

    /// Check if this message is a reply.
    pub fn is_reply(&self) -> bool {
        self.flags & SIGM_F_REPLY != 0
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Admin message types.
pub struct SigMsgType;

impl SigMsgType {
    /// Add an SA.
    pub const ADD: u16 = 1;
    /// Query whether an SA applies to a pair.
    pub const GET: u16 = 2;
    /// Remove all SAs.
    pub const FLUSH: u16 = 3;
    /// List all SAs.
    pub const DUMP: u16 = 4;
    /// End of a DUMP reply.
    pub const DONE: u16 = 5;

    /// Name of a message type, for logging.
    pub fn name(kind: u16) -> &'static str {
        match kind {
            Self::ADD => "ADD",
            Self::GET => "GET",
            Self::FLUSH => "FLUSH",
            Self::DUMP => "DUMP",
            Self::DONE => "DONE",
            _ => "UNKNOWN",
        }
    }
}

/// Message flags.
pub const SIGM_F_REQUEST: u16 = 0x01;
pub const SIGM_F_REPLY: u16 = 0x02;
pub const SIGM_F_MULTI: u16 = 0x04;

/// Reply status, the first payload item of every reply except DUMP entries.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct StatusBlock {
    /// Zero on success, otherwise a positive errno value.
    pub status: i32,
    /// [`Diagnostic`] code.
    pub diagnostic: u16,
    /// Padding.
    pub pad: u16,
}

impl StatusBlock {
    /// Create a status block.
    pub fn new(status: i32, diagnostic: Diagnostic) -> Self {
        Self {
            status,
            diagnostic: diagnostic.code(),
            pad: 0,
        }
    }

    /// Parse from a reply payload.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }

    /// Check if the request succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Decode the diagnostic code; unknown codes read as `None`.
    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic::from_u16(self.diagnostic)
    }

    /// Convert a failed status into an error.
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::from_status(self.status, self.diagnostic()))
        }
    }
}

/// Iterator over admin messages in a buffer.
pub struct MessageIter<'a> {
    data: &'a [u8],
}

impl<'a> MessageIter<'a> {
    /// Create a new message iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<(&'a SigMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < SIGMSG_HDRLEN {
            return None;
        }

        let header = match SigMsgHdr::from_bytes(self.data) {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };

        let msg_len = header.len as usize;
        if msg_len < SIGMSG_HDRLEN || msg_len > self.data.len() {
            self.data = &[];
            return Some(Err(Error::InvalidMessage(format!(
                "invalid message length: {}",
                msg_len
            ))));
        }

        let payload = &self.data[SIGMSG_HDRLEN..msg_len];
        let aligned_len = sigmsg_align(msg_len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok((header, payload)))
    }
}
