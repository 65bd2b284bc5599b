//! Key-management protocol.
//!
//! A key manager talks to a [`KeyStore`](crate::KeyStore) with four
//! requests: ADD, GET, FLUSH and DUMP. Each request is one framed message:
//! a 16-byte header followed by type-length-value extensions carrying the
//! source address, destination address and key. Every request is answered
//! with a `(status, diagnostic)` pair; DUMP additionally streams one
//! message per SA before its final DONE message.
//!
//! ```text
//! +--------+------+-------+-----+-----+---------------------------+
//! | len:32 | kind | flags | seq | pid | extensions...             |
//! +--------+------+-------+-----+-----+---------------------------+
//!                                      | len:16 | kind:16 | body  |
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tcpsig::admin::AdminClient;
//!
//! let client = AdminClient::connect("/run/tcpsig.sock").await?;
//! client.add("10.0.0.1:0".parse()?, "10.0.0.2:179".parse()?, b"secret").await?;
//!
//! for sa in client.dump().await? {
//!     println!("{} -> {} ({} bits)", sa.src, sa.dst, sa.key_bits);
//! }
//! ```

mod builder;
mod ext;
mod message;
mod protocol;
mod request;

#[cfg(feature = "admin-socket")]
mod client;
#[cfg(feature = "admin-socket")]
mod frame;
#[cfg(feature = "admin-socket")]
mod server;

use std::fmt;

pub use builder::MessageBuilder;
pub use ext::{EXT_HDRLEN, ExtHdr, ExtIter, KeyExtHdr, MAX_EXT_PAYLOAD, SockAddrExt, ext_align};
pub use message::{
    MAX_MESSAGE_LEN, MessageIter, SIGM_F_MULTI, SIGM_F_REPLY, SIGM_F_REQUEST, SIGMSG_HDRLEN,
    SigMsgHdr, SigMsgType, StatusBlock, sigmsg_align,
};
pub use protocol::{AdminProtocol, AdminReply, decode_entry, encode_reply};
pub use request::AdminRequest;

#[cfg(feature = "admin-socket")]
pub use client::AdminClient;
#[cfg(feature = "admin-socket")]
pub use server::AdminServer;

/// Extension kinds understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ExtensionKind {
    /// Source socket address.
    Source = 1,
    /// Destination socket address.
    Destination = 2,
    /// Key material.
    Key = 3,
}

impl ExtensionKind {
    /// Parse from a raw extension kind; unknown kinds are `None`.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Source),
            2 => Some(Self::Destination),
            3 => Some(Self::Key),
            _ => None,
        }
    }

    /// Raw extension kind.
    pub fn raw(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Destination => "destination",
            Self::Key => "key",
        })
    }
}
