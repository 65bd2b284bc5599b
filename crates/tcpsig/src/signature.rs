//! Segment signing and verification.
//!
//! The digest covers, in order:
//!
//! 1. the IP pseudo-header (addresses, protocol, TCP length),
//! 2. the fixed 20-byte TCP header with a zero checksum,
//! 3. the payload (data chunks only),
//! 4. the shared key.
//!
//! TCP options are not part of the digest. When signing, the header is
//! hashed with the data offset it will have once the signature option has
//! been added, so sender and receiver hash the same value.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tcpsig::{Connection, KeyStore, Segment, SignatureEngine};
//!
//! let store = Arc::new(KeyStore::new());
//! store.add("10.0.0.1:0".parse()?, "10.0.0.2:0".parse()?, b"secret", 48)?;
//!
//! let engine = SignatureEngine::new(store);
//! let conn = Connection::new("10.0.0.1:179".parse()?, "10.0.0.2:40000".parse()?);
//!
//! let mut segment = Segment::new(&header)?.with_data(payload);
//! engine.sign(&mut segment, &conn)?;
//! ```

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use md5::{Digest as _, Md5};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zerocopy::IntoBytes;
use zerocopy::network_endian::U16;

use crate::addr;
use crate::connection::{Direction, TcpConnection};
use crate::error::{Error, Result};
use crate::segment::{DIGEST_LEN, Segment, signed_data_offset};
use crate::store::KeyStore;

const IPPROTO_TCP: u8 = libc::IPPROTO_TCP as u8;

/// A 16-byte segment digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Compare against claimed digest bytes in constant time.
    pub fn ct_matches(&self, claimed: &[u8; DIGEST_LEN]) -> bool {
        self.0[..].ct_eq(&claimed[..]).into()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<Digest> for [u8; DIGEST_LEN] {
    fn from(d: Digest) -> Self {
        d.0
    }
}

/// Compute the digest of `segment` sent from `src` to `dst`.
///
/// `data_offset` is the data offset hashed in the header (in 32-bit words);
/// the TCP length in the pseudo-header is derived from it and the payload
/// length. The segment itself is not modified.
pub fn segment_digest(
    segment: &Segment,
    src: &SocketAddr,
    dst: &SocketAddr,
    data_offset: u8,
    key: &[u8],
) -> Result<Digest> {
    let tcp_len = usize::from(data_offset) * 4 + segment.payload_len();

    let mut hasher = Md5::new();
    match (src.ip(), dst.ip()) {
        (IpAddr::V4(s), IpAddr::V4(d)) => {
            let len = u16::try_from(tcp_len).map_err(|_| {
                Error::InvalidSegment(format!("TCP length {} exceeds IPv4 limit", tcp_len))
            })?;
            hasher.update(s.octets());
            hasher.update(d.octets());
            hasher.update([0, IPPROTO_TCP]);
            hasher.update(len.to_be_bytes());
        }
        (IpAddr::V6(s), IpAddr::V6(d)) => {
            let len = u32::try_from(tcp_len).map_err(|_| {
                Error::InvalidSegment(format!("TCP length {} out of range", tcp_len))
            })?;
            hasher.update(s.octets());
            hasher.update(d.octets());
            hasher.update(len.to_be_bytes());
            hasher.update(u32::from(IPPROTO_TCP).to_be_bytes());
        }
        _ => {
            return Err(Error::InvalidSegment(format!(
                "address family mismatch: {} -> {}",
                src, dst
            )));
        }
    }

    let mut header = *segment.tcp_header();
    header.checksum = U16::new(0);
    header.set_data_offset(data_offset);
    hasher.update(header.as_bytes());

    for chunk in segment.data() {
        hasher.update(chunk);
    }
    hasher.update(key);

    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&hasher.finalize());
    Ok(Digest(digest))
}

/// Signs outbound and verifies inbound segments against a [`KeyStore`].
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    store: Arc<KeyStore>,
}

impl SignatureEngine {
    /// Create an engine backed by `store`.
    pub fn new(store: Arc<KeyStore>) -> Self {
        Self { store }
    }

    /// Get the backing store.
    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    /// Compute the digest of `segment` travelling in `dir` on `conn`.
    ///
    /// The SA is resolved through the connection's cache. A connection
    /// whose endpoints are both IPv4-mapped is treated as IPv4. Fails with
    /// [`Error::NoKey`] when no SA applies.
    pub fn compute<C>(&self, segment: &Segment, conn: &C, dir: Direction) -> Result<Digest>
    where
        C: TcpConnection + ?Sized,
    {
        let (local, remote) = (conn.local_addr(), conn.remote_addr());
        if local.is_ipv4() != remote.is_ipv4() {
            return Err(Error::InvalidSegment(format!(
                "connection endpoints differ in family: {} / {}",
                local, remote
            )));
        }

        let data_offset = match dir {
            Direction::Inbound => segment.tcp_header().data_offset(),
            Direction::Outbound => signed_data_offset(segment.tcp_header().data_offset())?,
        };

        let (src, dst) = dir.endpoints(local, remote);
        let (src, dst) = addr::unmap_pair(&src, &dst);
        let sa = conn
            .sa_cache()
            .acquire(dir, &self.store, &src, &dst)
            .ok_or(Error::NoKey { src, dst })?;

        segment_digest(segment, &src, &dst, data_offset, sa.key())
    }

    /// Recompute the inbound digest of `segment` and compare it with
    /// `claimed` in constant time.
    ///
    /// A mismatch is `Ok(false)`; a missing SA is [`Error::NoKey`].
    pub fn verify<C>(&self, segment: &Segment, conn: &C, claimed: &[u8; DIGEST_LEN]) -> Result<bool>
    where
        C: TcpConnection + ?Sized,
    {
        let digest = self.compute(segment, conn, Direction::Inbound)?;
        Ok(digest.ct_matches(claimed))
    }

    /// Compute the outbound digest and append the signature option.
    pub fn sign<C>(&self, segment: &mut Segment, conn: &C) -> Result<Digest>
    where
        C: TcpConnection + ?Sized,
    {
        let digest = self.compute(segment, conn, Direction::Outbound)?;
        segment.write_signature(digest.as_bytes())?;
        debug!(
            local = %conn.local_addr(),
            remote = %conn.remote_addr(),
            "segment signed"
        );
        Ok(digest)
    }

    /// Verify the signature option carried by an inbound segment.
    ///
    /// Fails with [`Error::MissingSignatureOption`] when the option is
    /// absent and [`Error::SignatureMismatch`] when the digest differs.
    pub fn check_inbound<C>(&self, segment: &Segment, conn: &C) -> Result<()>
    where
        C: TcpConnection + ?Sized,
    {
        let Some(claimed) = segment.signature()? else {
            warn!(
                local = %conn.local_addr(),
                remote = %conn.remote_addr(),
                "segment without signature option on signed connection"
            );
            return Err(Error::MissingSignatureOption);
        };

        if !self.verify(segment, conn, &claimed)? {
            warn!(
                local = %conn.local_addr(),
                remote = %conn.remote_addr(),
                "TCP signature mismatch"
            );
            return Err(Error::SignatureMismatch);
        }
        Ok(())
    }
}
