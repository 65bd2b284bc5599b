//! Per-connection SA references.
//!
//! A connection resolves its inbound and outbound SA once and keeps the held
//! reference until it is dropped. A cached SA that has since been flushed
//! out of its table is discarded and the lookup is repeated.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::store::{KeyStore, SaRef};

/// Direction of a segment relative to the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Received from the peer; the SA is looked up as `(remote, local)`.
    Inbound,
    /// Sent to the peer; the SA is looked up as `(local, remote)`.
    Outbound,
}

impl Direction {
    /// Order a connection's endpoints as `(source, destination)`.
    pub fn endpoints(self, local: SocketAddr, remote: SocketAddr) -> (SocketAddr, SocketAddr) {
        match self {
            Self::Inbound => (remote, local),
            Self::Outbound => (local, remote),
        }
    }
}

/// Cached SA references of one connection, one per direction.
#[derive(Debug, Default)]
pub struct SaCache {
    inbound: Mutex<Option<SaRef>>,
    outbound: Mutex<Option<SaRef>>,
}

impl SaCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, dir: Direction) -> MutexGuard<'_, Option<SaRef>> {
        let slot = match dir {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        };
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached SA for `dir`, resolving it from `store` on first
    /// use or when the cached one has been detached.
    ///
    /// Nothing is cached when no SA applies.
    pub fn acquire(
        &self,
        dir: Direction,
        store: &KeyStore,
        src: &SocketAddr,
        dst: &SocketAddr,
    ) -> Option<SaRef> {
        let mut slot = self.slot(dir);

        if let Some(sa) = slot.as_ref() {
            if !sa.is_detached() {
                return Some(sa.clone());
            }
            debug!(sa = sa.id(), ?dir, "dropping detached SA from connection cache");
            *slot = None;
        }

        let sa = store.find(src, dst)?;
        debug!(sa = sa.id(), ?dir, %src, %dst, "cached SA for connection");
        *slot = Some(sa.clone());
        Some(sa)
    }

    /// Check whether an SA is cached for `dir`.
    pub fn is_cached(&self, dir: Direction) -> bool {
        self.slot(dir).is_some()
    }

    /// Release both cached references.
    pub fn release(&self) {
        self.slot(Direction::Inbound).take();
        self.slot(Direction::Outbound).take();
    }
}

/// A TCP connection as seen by the signature engine.
pub trait TcpConnection {
    /// Local socket address.
    fn local_addr(&self) -> SocketAddr;

    /// Remote socket address.
    fn remote_addr(&self) -> SocketAddr;

    /// Per-connection SA cache.
    fn sa_cache(&self) -> &SaCache;
}

/// A minimal connection: an address pair and its SA cache.
///
/// Dropping the connection releases its cached SAs.
#[derive(Debug)]
pub struct Connection {
    local: SocketAddr,
    remote: SocketAddr,
    cache: SaCache,
}

impl Connection {
    /// Create a connection between `local` and `remote`.
    pub fn new(local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            local,
            remote,
            cache: SaCache::new(),
        }
    }

    /// The same connection seen from the peer's side.
    pub fn mirrored(&self) -> Self {
        Self::new(self.remote, self.local)
    }
}

impl TcpConnection for Connection {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn sa_cache(&self) -> &SaCache {
        &self.cache
    }
}
