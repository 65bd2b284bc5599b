//! TCP segment layout as seen by the signature engine.
//!
//! A [`Segment`] is the TCP header (fixed part plus options) followed by a
//! chain of payload chunks. Only [`ChunkKind::Data`] chunks carry segment
//! bytes; control chunks ride along in the chain and are skipped when
//! hashing.

use bytes::{Bytes, BytesMut};
use zerocopy::network_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Length of the fixed TCP header.
pub const TCP_HEADER_LEN: usize = 20;

/// Longest TCP header (data offset 15).
pub const TCP_MAX_HEADER_LEN: usize = 60;

/// TCP option kind of the MD5 signature option (RFC 2385).
pub const TCPOPT_SIGNATURE: u8 = 19;

/// Length of the signature option (kind, length, 16-byte digest).
pub const TCPOLEN_SIGNATURE: u8 = 18;

/// Option space reserved for the signature, padded to a 32-bit boundary.
pub const TCPOLEN_SIGLEN: usize = 20;

/// Length of a signature digest.
pub const DIGEST_LEN: usize = 16;

const TCPOPT_EOL: u8 = 0;
const TCPOPT_NOP: u8 = 1;

/// Fixed TCP header (mirrors struct tcphdr, network byte order).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct TcpHeader {
    /// Source port.
    pub src_port: U16,
    /// Destination port.
    pub dst_port: U16,
    /// Sequence number.
    pub seq: U32,
    /// Acknowledgment number.
    pub ack: U32,
    /// Data offset (high nibble) and reserved bits.
    pub off_x2: u8,
    /// Control flags.
    pub flags: u8,
    /// Receive window.
    pub window: U16,
    /// Checksum.
    pub checksum: U16,
    /// Urgent pointer.
    pub urgent: U16,
}

impl TcpHeader {
    /// Data offset in 32-bit words.
    pub fn data_offset(&self) -> u8 {
        self.off_x2 >> 4
    }

    /// Set the data offset, keeping the reserved bits.
    pub fn set_data_offset(&mut self, words: u8) {
        self.off_x2 = (words << 4) | (self.off_x2 & 0x0f);
    }

    /// Header length in bytes, including options.
    pub fn header_len(&self) -> usize {
        usize::from(self.data_offset()) * 4
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Kind of a payload chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Segment payload bytes.
    Data,
    /// Ancillary buffer that is not part of the payload.
    Control,
}

/// One buffer in a segment's payload chain.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk kind.
    pub kind: ChunkKind,
    /// Chunk bytes.
    pub bytes: Bytes,
}

/// A TCP segment: header followed by a payload chain.
#[derive(Debug, Clone)]
pub struct Segment {
    fixed: TcpHeader,
    options: BytesMut,
    chain: Vec<Chunk>,
}

impl Segment {
    /// Create a segment from its header bytes (fixed header plus options).
    ///
    /// The data offset must be at least 5 and must not claim more bytes
    /// than supplied; bytes past the data offset are ignored.
    pub fn new(header: &[u8]) -> Result<Self> {
        let fixed = *TcpHeader::from_bytes(header)?;
        let off = fixed.data_offset();
        if off < 5 {
            return Err(Error::InvalidSegment(format!("data offset {} below 5", off)));
        }
        if fixed.header_len() > header.len() {
            return Err(Error::InvalidSegment(format!(
                "data offset {} claims {} header bytes, {} supplied",
                off,
                fixed.header_len(),
                header.len()
            )));
        }
        Ok(Self {
            fixed,
            options: BytesMut::from(&header[TCP_HEADER_LEN..fixed.header_len()]),
            chain: Vec::new(),
        })
    }

    /// Append a data chunk to the payload.
    pub fn push_data(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
        self.chain.push(Chunk {
            kind: ChunkKind::Data,
            bytes: bytes.into(),
        });
        self
    }

    /// Append a control chunk (not part of the payload).
    pub fn push_control(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
        self.chain.push(Chunk {
            kind: ChunkKind::Control,
            bytes: bytes.into(),
        });
        self
    }

    /// Builder-style [`push_data`](Self::push_data).
    pub fn with_data(mut self, bytes: impl Into<Bytes>) -> Self {
        self.push_data(bytes);
        self
    }

    /// Fixed TCP header.
    pub fn tcp_header(&self) -> &TcpHeader {
        &self.fixed
    }

    /// Option bytes between the fixed header and the data offset.
    pub fn options(&self) -> &[u8] {
        &self.options
    }

    /// Serialize the header (fixed part plus options).
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.fixed.header_len());
        out.extend_from_slice(self.fixed.as_bytes());
        out.extend_from_slice(&self.options);
        out
    }

    /// Payload chain.
    pub fn chain(&self) -> &[Chunk] {
        &self.chain
    }

    /// Data chunks in order.
    pub fn data(&self) -> impl Iterator<Item = &[u8]> {
        self.chain
            .iter()
            .filter(|c| c.kind == ChunkKind::Data)
            .map(|c| c.bytes.as_ref())
    }

    /// Total payload length (data chunks only).
    pub fn payload_len(&self) -> usize {
        self.data().map(<[u8]>::len).sum()
    }

    /// Find the signature option and return its digest.
    pub fn signature(&self) -> Result<Option<[u8; DIGEST_LEN]>> {
        find_signature(&self.options)
    }

    /// Append a signature option (`NOP, NOP, kind, len, digest`) after the
    /// existing options and raise the data offset by five words.
    ///
    /// The existing option list must not be EOL-terminated, otherwise the
    /// appended option would be unreachable. The checksum is left
    /// untouched; callers recompute it afterwards.
    pub fn write_signature(&mut self, digest: &[u8; DIGEST_LEN]) -> Result<()> {
        let off = self.fixed.data_offset();
        let new_off = signed_data_offset(off)?;
        if list_terminated(&self.options)? {
            return Err(Error::InvalidSegment(
                "option list ends with EOL before signature space".into(),
            ));
        }

        self.options.extend_from_slice(&[
            TCPOPT_NOP,
            TCPOPT_NOP,
            TCPOPT_SIGNATURE,
            TCPOLEN_SIGNATURE,
        ]);
        self.options.extend_from_slice(digest);
        self.fixed.set_data_offset(new_off);
        Ok(())
    }
}

/// Data offset a header will have once the signature option is added.
pub(crate) fn signed_data_offset(off: u8) -> Result<u8> {
    let new_off = off + (TCPOLEN_SIGLEN / 4) as u8;
    if usize::from(new_off) * 4 > TCP_MAX_HEADER_LEN {
        return Err(Error::NoOptionSpace { data_offset: off });
    }
    Ok(new_off)
}

/// Check an option list for an EOL, validating lengths on the way.
fn list_terminated(mut options: &[u8]) -> Result<bool> {
    while let Some(&kind) = options.first() {
        match kind {
            TCPOPT_EOL => return Ok(true),
            TCPOPT_NOP => options = &options[1..],
            _ => options = &options[option_len(options, kind)?..],
        }
    }
    Ok(false)
}

fn option_len(options: &[u8], kind: u8) -> Result<usize> {
    let len = match options.get(1) {
        Some(&len) => usize::from(len),
        None => return Err(Error::InvalidSegment("truncated TCP option".into())),
    };
    if len < 2 || len > options.len() {
        return Err(Error::InvalidSegment(format!(
            "TCP option {} has bad length {}",
            kind, len
        )));
    }
    Ok(len)
}

/// Walk a TCP option list looking for the signature option.
///
/// Returns an error for options whose length runs past the list or is
/// shorter than two bytes, and for a signature option of the wrong length.
pub fn find_signature(mut options: &[u8]) -> Result<Option<[u8; DIGEST_LEN]>> {
    while let Some(&kind) = options.first() {
        match kind {
            TCPOPT_EOL => break,
            TCPOPT_NOP => {
                options = &options[1..];
                continue;
            }
            _ => {}
        }

        let len = option_len(options, kind)?;
        if kind == TCPOPT_SIGNATURE {
            if len != usize::from(TCPOLEN_SIGNATURE) {
                return Err(Error::InvalidSegment(format!(
                    "signature option length {}",
                    len
                )));
            }
            let mut digest = [0u8; DIGEST_LEN];
            digest.copy_from_slice(&options[2..len]);
            return Ok(Some(digest));
        }

        options = &options[len..];
    }
    Ok(None)
}
