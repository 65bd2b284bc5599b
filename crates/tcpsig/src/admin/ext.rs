//! Message extensions (type-length-value records after the header).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use zerocopy::network_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::addr::AddressFamily;
use crate::error::{Error, Result};

/// Extension alignment.
pub const EXT_ALIGNTO: usize = 4;

/// Align a length to EXT_ALIGNTO boundary.
#[inline]
pub const fn ext_align(len: usize) -> usize {
    (len + EXT_ALIGNTO - 1) & !(EXT_ALIGNTO - 1)
}

/// Size of the extension header.
pub const EXT_HDRLEN: usize = 4;

/// Largest payload an extension can carry.
pub const MAX_EXT_PAYLOAD: usize = u16::MAX as usize - EXT_HDRLEN;

/// Extension header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ExtHdr {
    /// Length including header, excluding padding.
    pub len: u16,
    /// Extension kind.
    pub kind: u16,
}

impl ExtHdr {
    /// Create a new extension header.
    pub fn new(kind: u16, data_len: usize) -> Self {
        debug_assert!(data_len <= MAX_EXT_PAYLOAD);
        Self {
            len: (EXT_HDRLEN + data_len) as u16,
            kind,
        }
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.len as usize).saturating_sub(EXT_HDRLEN)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Iterator over the extensions of a message payload.
///
/// Unlike a best-effort attribute walk, a malformed extension is reported
/// and ends the iteration.
pub struct ExtIter<'a> {
    data: &'a [u8],
}

impl<'a> ExtIter<'a> {
    /// Create a new extension iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for ExtIter<'a> {
    /// Returns (extension kind, payload data).
    type Item = Result<(u16, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let hdr = match ExtHdr::from_bytes(self.data) {
            Ok(h) => h,
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };

        let len = hdr.len as usize;
        if len < EXT_HDRLEN || len > self.data.len() {
            self.data = &[];
            return Some(Err(Error::InvalidExtension(format!(
                "extension {} has length {}",
                hdr.kind, len
            ))));
        }

        let kind = hdr.kind;
        let payload = &self.data[EXT_HDRLEN..len];
        let aligned_len = ext_align(len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok((kind, payload)))
    }
}

/// Address extension payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SockAddrExt {
    /// Raw address family (`AF_INET` or `AF_INET6`).
    pub family: u16,
    /// Port, network byte order. Zero is a wildcard.
    pub port: U16,
    /// Address; IPv4 uses the first four bytes.
    pub addr: [u8; 16],
}

impl SockAddrExt {
    /// Encode a socket address.
    pub fn new(addr: &SocketAddr) -> Self {
        let mut raw = [0u8; 16];
        match addr.ip() {
            IpAddr::V4(v4) => raw[..4].copy_from_slice(&v4.octets()),
            IpAddr::V6(v6) => raw.copy_from_slice(&v6.octets()),
        }
        Self {
            family: AddressFamily::of(addr).raw(),
            port: U16::new(addr.port()),
            addr: raw,
        }
    }

    /// Parse from an extension payload (copied; no alignment needed).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| {
                Error::InvalidExtension(format!(
                    "address extension is {} bytes, need {}",
                    data.len(),
                    std::mem::size_of::<Self>()
                ))
            })
    }

    /// Decode into a socket address.
    pub fn to_socket_addr(&self) -> Result<SocketAddr> {
        let ip = match AddressFamily::from_raw(self.family)? {
            AddressFamily::Inet => {
                IpAddr::V4(Ipv4Addr::new(self.addr[0], self.addr[1], self.addr[2], self.addr[3]))
            }
            AddressFamily::Inet6 => IpAddr::V6(Ipv6Addr::from(self.addr)),
        };
        Ok(SocketAddr::new(ip, self.port.get()))
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }
}

/// Key extension header, followed by the key bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct KeyExtHdr {
    /// Key length in bits.
    pub bits: u16,
    /// Padding.
    pub pad: u16,
}

impl KeyExtHdr {
    /// Split a key extension payload into its header and key bytes.
    pub fn split(data: &[u8]) -> Result<(Self, &[u8])> {
        Self::read_from_prefix(data).map_err(|_| {
            Error::InvalidExtension(format!("key extension is {} bytes", data.len()))
        })
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }
}
