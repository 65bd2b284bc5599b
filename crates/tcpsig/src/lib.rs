//! RFC 2385 TCP segment signatures ("TCP-MD5").
//!
//! This crate holds the per-stack table of Security Associations (an
//! address pair bound to a shared key), the engine that signs outbound and
//! verifies inbound TCP segments with those keys, and the key-management
//! protocol used to populate the table.
//!
//! # Features
//!
//! - `admin-socket` (default) - Async Unix-socket server and client for
//!   the key-management protocol
//!
//! # Example
//!
//! ```ignore
//! use tcpsig::{Connection, NetStack, Segment};
//!
//! let stack = NetStack::new();
//! stack
//!     .key_store()
//!     .add("10.0.0.1:0".parse()?, "10.0.0.2:179".parse()?, b"secret", 48)?;
//!
//! let engine = stack.signature_engine();
//! let conn = Connection::new("10.0.0.1:40000".parse()?, "10.0.0.2:179".parse()?);
//!
//! // outbound
//! let mut segment = Segment::new(&header)?.with_data(payload);
//! engine.sign(&mut segment, &conn)?;
//!
//! // inbound
//! engine.check_inbound(&received, &conn)?;
//! ```
//!
//! # Key management
//!
//! ```ignore
//! use tcpsig::admin::{AdminClient, AdminServer};
//!
//! let server = AdminServer::bind("/run/tcpsig.sock", stack.admin())?;
//! tokio::spawn(server.run_until(tokio::signal::ctrl_c()));
//!
//! let client = AdminClient::connect("/run/tcpsig.sock").await?;
//! client.add("10.0.0.1:0".parse()?, "10.0.0.2:0".parse()?, b"secret").await?;
//! ```

pub mod addr;
pub mod admin;
pub mod config;
pub mod connection;
pub mod diagnostic;
pub mod error;
pub mod key;
pub mod segment;
pub mod signature;
pub mod stack;
pub mod store;

pub use addr::AddressFamily;
pub use config::{Config, FlushPolicy};
pub use connection::{Connection, Direction, SaCache, TcpConnection};
pub use diagnostic::Diagnostic;
pub use error::{Error, Result};
pub use key::{MAX_KEY_LEN, SaKey};
pub use segment::{ChunkKind, Segment, TcpHeader};
pub use signature::{Digest, SignatureEngine};
pub use stack::NetStack;
pub use store::{FlushReport, KeyStore, SaEntry, SaRef, SecurityAssociation};
