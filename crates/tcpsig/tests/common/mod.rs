//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Global counter for unique socket names.
static SOCKET_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Parse a socket address literal.
pub fn sa(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// A unique admin socket path in the temp directory, removed on drop.
pub struct TestSocket {
    path: PathBuf,
}

impl TestSocket {
    /// Create a new unique socket path.
    pub fn new(prefix: &str) -> Self {
        let id = SOCKET_COUNTER.fetch_add(1, Ordering::SeqCst);
        let name = format!("tcpsig-test-{}-{}-{}.sock", prefix, std::process::id(), id);
        Self {
            path: std::env::temp_dir().join(name),
        }
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TestSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A fixed 20-byte TCP header with the given ports and data offset.
pub fn tcp_header(src_port: u16, dst_port: u16, data_offset: u8) -> Vec<u8> {
    let mut h = vec![0u8; usize::from(data_offset) * 4];
    h[0..2].copy_from_slice(&src_port.to_be_bytes());
    h[2..4].copy_from_slice(&dst_port.to_be_bytes());
    h[4..8].copy_from_slice(&1000u32.to_be_bytes());
    h[12] = data_offset << 4;
    h[13] = 0x02;
    h[14..16].copy_from_slice(&16384u16.to_be_bytes());
    h
}
