//! Address families and SA address matching.
//!
//! An SA stores a `(src, dst)` pair of socket addresses. A stored port of
//! zero is a wildcard. An SA stored as IPv6 whose two addresses are both
//! IPv4-mapped (`::ffff:a.b.c.d`) also answers plain IPv4 probes, so a
//! single key configured on a dual-stack listener covers its IPv4 path.
//! The reverse never holds: an IPv4 SA does not match an IPv6 probe.

use std::fmt;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Address family of an SA or socket address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4.
    Inet,
    /// IPv6.
    Inet6,
}

impl AddressFamily {
    /// Parse from a raw `AF_*` value.
    pub fn from_raw(value: u16) -> Result<Self> {
        match i32::from(value) {
            libc::AF_INET => Ok(Self::Inet),
            libc::AF_INET6 => Ok(Self::Inet6),
            _ => Err(Error::UnsupportedFamily(value)),
        }
    }

    /// Raw `AF_*` value.
    pub fn raw(self) -> u16 {
        match self {
            Self::Inet => libc::AF_INET as u16,
            Self::Inet6 => libc::AF_INET6 as u16,
        }
    }

    /// Family of a socket address.
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Self::Inet,
            SocketAddr::V6(_) => Self::Inet6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inet => "inet",
            Self::Inet6 => "inet6",
        })
    }
}

/// Compare one stored address against a probe.
///
/// Addresses compare exactly; a stored port of zero matches any port.
#[inline]
fn endpoint_matches(stored: &SocketAddr, probe: &SocketAddr) -> bool {
    stored.ip() == probe.ip() && (stored.port() == 0 || stored.port() == probe.port())
}

/// Convert an IPv4-mapped IPv6 socket address to plain IPv4, keeping the port.
fn unmap(addr: &SocketAddr) -> Option<SocketAddr> {
    match addr {
        SocketAddr::V6(v6) => v6
            .ip()
            .to_ipv4_mapped()
            .map(|v4| SocketAddr::V4(SocketAddrV4::new(v4, v6.port()))),
        SocketAddr::V4(_) => None,
    }
}

/// Check whether an SA stored as `(sa_src, sa_dst)` applies to `(src, dst)`.
///
/// Both sides must match. When the probe is IPv4 and the SA is IPv6 with
/// two IPv4-mapped addresses, the stored addresses are unmapped first.
pub fn matches(sa_src: &SocketAddr, sa_dst: &SocketAddr, src: &SocketAddr, dst: &SocketAddr) -> bool {
    if AddressFamily::of(sa_src) == AddressFamily::of(src)
        && AddressFamily::of(sa_dst) == AddressFamily::of(dst)
    {
        return endpoint_matches(sa_src, src) && endpoint_matches(sa_dst, dst);
    }

    if src.is_ipv4()
        && dst.is_ipv4()
        && let (Some(mapped_src), Some(mapped_dst)) = (unmap(sa_src), unmap(sa_dst))
    {
        return endpoint_matches(&mapped_src, src) && endpoint_matches(&mapped_dst, dst);
    }

    false
}

/// Unmap a pair whose two addresses are IPv4-mapped IPv6 addresses.
///
/// A dual-stack socket reports an IPv4 peer as `::ffff:a.b.c.d`; such a
/// connection is IPv4 on the wire. Any other pair is returned unchanged.
pub fn unmap_pair(src: &SocketAddr, dst: &SocketAddr) -> (SocketAddr, SocketAddr) {
    match (unmap(src), unmap(dst)) {
        (Some(src), Some(dst)) => (src, dst),
        _ => (*src, *dst),
    }
}

/// Normalize a socket address for duplicate detection.
///
/// IPv4-mapped IPv6 addresses collapse to IPv4; flow info and scope id are
/// dropped.
pub fn normalize(addr: &SocketAddr) -> (IpAddr, u16) {
    match unmap(addr) {
        Some(v4) => (v4.ip(), v4.port()),
        None => (addr.ip(), addr.port()),
    }
}

/// Exact tuple equality after normalization, used to detect duplicate SAs.
pub fn same_pair(a_src: &SocketAddr, a_dst: &SocketAddr, b_src: &SocketAddr, b_dst: &SocketAddr) -> bool {
    normalize(a_src) == normalize(b_src) && normalize(a_dst) == normalize(b_dst)
}
