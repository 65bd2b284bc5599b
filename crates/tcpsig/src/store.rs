//! The SA table.
//!
//! A [`KeyStore`] holds every Security Association configured for one
//! network stack. The whole table sits behind a single read-write lock:
//! lookups share it, `add` and `flush` take it exclusively.
//!
//! Lookups hand out [`SaRef`] guards. A guard counts as a holder of the SA
//! for as long as it lives; dropping it releases the hold without touching
//! the table lock. The hold is taken while the read lock is still held, so
//! a concurrent `flush` (which needs the write lock) always sees a
//! consistent holder count.
//!
//! # Example
//!
//! ```ignore
//! use tcpsig::KeyStore;
//!
//! let store = KeyStore::new();
//! store.add("10.0.0.1:0".parse()?, "10.0.0.2:179".parse()?, b"secret", 48)?;
//!
//! if let Some(sa) = store.find(&"10.0.0.1:4001".parse()?, &"10.0.0.2:179".parse()?) {
//!     println!("{} -> {} ({} bit key)", sa.src(), sa.dst(), sa.key_bits());
//! }
//! ```

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, trace};
use zeroize::Zeroizing;

use crate::addr::{self, AddressFamily};
use crate::config::{Config, FlushPolicy};
use crate::error::{Error, Result};
use crate::key::SaKey;

/// A Security Association: an address pair bound to a shared key.
///
/// Everything except the holder count and the detached flag is immutable
/// once the SA is linked into a table.
#[derive(Debug)]
pub struct SecurityAssociation {
    id: u64,
    family: AddressFamily,
    src: SocketAddr,
    dst: SocketAddr,
    key: SaKey,
    holders: AtomicUsize,
    detached: AtomicBool,
}

impl SecurityAssociation {
    /// Table-unique identifier, assigned on insertion.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address family shared by both addresses.
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Source address (port 0 is a wildcard).
    pub fn src(&self) -> SocketAddr {
        self.src
    }

    /// Destination address (port 0 is a wildcard).
    pub fn dst(&self) -> SocketAddr {
        self.dst
    }

    /// Key length in bits.
    pub fn key_bits(&self) -> u16 {
        self.key.bits()
    }

    /// Current number of holders.
    pub fn holders(&self) -> usize {
        self.holders.load(Ordering::Acquire)
    }

    /// True once the SA has been flushed out of its table.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Check whether this SA applies to a `(src, dst)` pair.
    pub fn matches(&self, src: &SocketAddr, dst: &SocketAddr) -> bool {
        addr::matches(&self.src, &self.dst, src, dst)
    }

    pub(crate) fn key(&self) -> &[u8] {
        self.key.expose()
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }
}

/// A held reference to an SA.
///
/// The SA cannot be freed while any `SaRef` to it exists. Cloning takes an
/// additional hold; dropping releases one.
#[derive(Debug)]
pub struct SaRef {
    sa: Arc<SecurityAssociation>,
}

impl SaRef {
    fn acquire(sa: &Arc<SecurityAssociation>) -> Self {
        sa.holders.fetch_add(1, Ordering::AcqRel);
        Self { sa: Arc::clone(sa) }
    }

    /// Check whether two guards refer to the same SA.
    pub fn ptr_eq(&self, other: &SaRef) -> bool {
        Arc::ptr_eq(&self.sa, &other.sa)
    }
}

impl Clone for SaRef {
    fn clone(&self) -> Self {
        Self::acquire(&self.sa)
    }
}

impl Deref for SaRef {
    type Target = SecurityAssociation;

    fn deref(&self) -> &Self::Target {
        &self.sa
    }
}

impl Drop for SaRef {
    fn drop(&mut self) {
        let prev = self.sa.holders.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 && self.sa.is_detached() {
            trace!(sa = self.sa.id, "last hold on detached SA released");
        }
    }
}

/// A copy of one SA, as reported by DUMP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaEntry {
    /// Address family.
    pub family: AddressFamily,
    /// Source address.
    pub src: SocketAddr,
    /// Destination address.
    pub dst: SocketAddr,
    /// Key length in bits.
    pub key_bits: u16,
    /// Key bytes, present only when the store is configured to dump keys.
    pub key: Option<Zeroizing<Vec<u8>>>,
}

/// Outcome of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Idle SAs unlinked and freed.
    pub removed: usize,
    /// Busy SAs unlinked; freed on last release.
    pub detached: usize,
    /// Busy SAs left in the table.
    pub retained: usize,
}

/// The SA table of one network stack.
#[derive(Debug)]
pub struct KeyStore {
    config: Config,
    table: RwLock<Vec<Arc<SecurityAssociation>>>,
    next_id: AtomicU64,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore {
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create an empty store.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            table: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the store configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<SecurityAssociation>>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<SecurityAssociation>>> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of linked SAs.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the table holds no SAs.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Find the first SA applying to `(src, dst)` and hold it.
    pub fn find(&self, src: &SocketAddr, dst: &SocketAddr) -> Option<SaRef> {
        let table = self.read();
        table
            .iter()
            .find(|sa| sa.matches(src, dst))
            .map(SaRef::acquire)
    }

    /// Report whether an SA applies to `(src, dst)`.
    pub fn get(&self, src: &SocketAddr, dst: &SocketAddr) -> Result<()> {
        match self.find(src, dst) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound {
                src: *src,
                dst: *dst,
            }),
        }
    }

    /// Add an SA for `(src, dst)` using the first `ceil(key_bits / 8)` bytes
    /// of `key`.
    ///
    /// At most one SA may exist per normalized pair. The duplicate check
    /// runs once under the read lock before the key is copied and again
    /// under the write lock before the SA is linked, so two racing adds for
    /// the same pair cannot both succeed.
    pub fn add(&self, src: SocketAddr, dst: SocketAddr, key: &[u8], key_bits: u16) -> Result<()> {
        let family = check_family(&src, &dst)?;
        self.precheck(&src, &dst)?;

        let key = SaKey::copy_from(key, key_bits)?;
        self.link(family, src, dst, key)
    }

    /// Add an SA with an already copied key.
    ///
    /// Same checks as [`add`](Self::add); used by the admin protocol, which
    /// copies the key out of the request buffer while decoding it.
    pub fn insert(&self, src: SocketAddr, dst: SocketAddr, key: SaKey) -> Result<()> {
        let family = check_family(&src, &dst)?;
        self.precheck(&src, &dst)?;
        self.link(family, src, dst, key)
    }

    /// Duplicate check under the read lock, ahead of taking the write lock.
    fn precheck(&self, src: &SocketAddr, dst: &SocketAddr) -> Result<()> {
        if contains_pair(&self.read(), src, dst) {
            debug!(%src, %dst, "rejecting duplicate SA");
            return Err(Error::DuplicateSa {
                src: *src,
                dst: *dst,
            });
        }
        Ok(())
    }

    fn link(&self, family: AddressFamily, src: SocketAddr, dst: SocketAddr, key: SaKey) -> Result<()> {
        let mut table = self.write();
        if contains_pair(&table, &src, &dst) {
            debug!(%src, %dst, "rejecting duplicate SA");
            return Err(Error::DuplicateSa { src, dst });
        }
        if let Some(max) = self.config.max_entries
            && table.len() >= max
        {
            return Err(Error::ResourceExhausted(format!(
                "SA table full ({} entries)",
                max
            )));
        }
        table
            .try_reserve(1)
            .map_err(|e| Error::ResourceExhausted(format!("SA table: {}", e)))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bits = key.bits();
        table.push(Arc::new(SecurityAssociation {
            id,
            family,
            src,
            dst,
            key,
            holders: AtomicUsize::new(0),
            detached: AtomicBool::new(false),
        }));
        debug!(sa = id, %src, %dst, bits, "SA added");
        Ok(())
    }

    /// Remove SAs from the table.
    ///
    /// Idle SAs are unlinked and freed. Busy SAs are detached or retained
    /// according to [`Config::flush_policy`].
    pub fn flush(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let policy = self.config.flush_policy;

        let mut table = self.write();
        table.retain(|sa| {
            if sa.holders() == 0 {
                sa.detach();
                report.removed += 1;
                return false;
            }
            match policy {
                FlushPolicy::Detach => {
                    sa.detach();
                    report.detached += 1;
                    false
                }
                FlushPolicy::Retain => {
                    report.retained += 1;
                    true
                }
            }
        });
        drop(table);

        info!(
            removed = report.removed,
            detached = report.detached,
            retained = report.retained,
            "SA table flushed"
        );
        report
    }

    /// Unlink and detach every SA regardless of policy.
    ///
    /// Called when the owning network stack goes away.
    pub fn clear(&self) -> usize {
        let mut table = self.write();
        for sa in table.iter() {
            sa.detach();
        }
        let count = table.len();
        table.clear();
        count
    }

    /// Copy every linked SA for a DUMP reply.
    ///
    /// Key bytes are included only when [`Config::dump_keys`] is set.
    pub fn snapshot(&self) -> Vec<SaEntry> {
        let table = self.read();
        table
            .iter()
            .map(|sa| SaEntry {
                family: sa.family,
                src: sa.src,
                dst: sa.dst,
                key_bits: sa.key_bits(),
                key: self
                    .config
                    .dump_keys
                    .then(|| Zeroizing::new(sa.key().to_vec())),
            })
            .collect()
    }
}

fn check_family(src: &SocketAddr, dst: &SocketAddr) -> Result<AddressFamily> {
    let family = AddressFamily::of(src);
    if family != AddressFamily::of(dst) {
        return Err(Error::AddressFamilyMismatch {
            src: family.raw(),
            dst: AddressFamily::of(dst).raw(),
        });
    }
    Ok(family)
}

fn contains_pair(table: &[Arc<SecurityAssociation>], src: &SocketAddr, dst: &SocketAddr) -> bool {
    table
        .iter()
        .any(|sa| addr::same_pair(&sa.src, &sa.dst, src, dst))
}
