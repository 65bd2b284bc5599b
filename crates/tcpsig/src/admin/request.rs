//! Typed admin requests.

use std::net::SocketAddr;

use super::ExtensionKind;
use super::builder::MessageBuilder;
use super::ext::{ExtIter, KeyExtHdr, SockAddrExt};
use super::message::{SIGM_F_REQUEST, SigMsgType};
use crate::error::{Error, Result};
use crate::key::SaKey;

/// A decoded key-management request.
#[derive(Debug, Clone)]
pub enum AdminRequest {
    /// Add an SA for a pair.
    Add {
        /// Source address.
        src: SocketAddr,
        /// Destination address.
        dst: SocketAddr,
        /// Key material.
        key: SaKey,
    },
    /// Ask whether an SA applies to a pair.
    Get {
        /// Source address.
        src: SocketAddr,
        /// Destination address.
        dst: SocketAddr,
    },
    /// Remove all SAs.
    Flush,
    /// List all SAs.
    Dump,
}

/// Extensions of one request, before validation.
#[derive(Default)]
struct Extensions<'a> {
    src: Option<SockAddrExt>,
    dst: Option<SockAddrExt>,
    key: Option<&'a [u8]>,
}

impl<'a> Extensions<'a> {
    fn collect(payload: &'a [u8]) -> Result<Self> {
        let mut exts = Self::default();
        for ext in ExtIter::new(payload) {
            let (kind, data) = ext?;
            match ExtensionKind::from_u16(kind) {
                Some(ExtensionKind::Source) => {
                    set_once(&mut exts.src, SockAddrExt::from_bytes(data)?, kind)?
                }
                Some(ExtensionKind::Destination) => {
                    set_once(&mut exts.dst, SockAddrExt::from_bytes(data)?, kind)?
                }
                Some(ExtensionKind::Key) => set_once(&mut exts.key, data, kind)?,
                None => {}
            }
        }
        Ok(exts)
    }

    /// Validate the address pair: presence, matching families, then a
    /// supported family.
    fn pair(&self) -> Result<(SocketAddr, SocketAddr)> {
        let src = self
            .src
            .ok_or(Error::MissingExtension(ExtensionKind::Source))?;
        let dst = self
            .dst
            .ok_or(Error::MissingExtension(ExtensionKind::Destination))?;
        if src.family != dst.family {
            return Err(Error::AddressFamilyMismatch {
                src: src.family,
                dst: dst.family,
            });
        }
        Ok((src.to_socket_addr()?, dst.to_socket_addr()?))
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, kind: u16) -> Result<()> {
    if slot.is_some() {
        return Err(Error::InvalidExtension(format!(
            "extension {} given twice",
            kind
        )));
    }
    *slot = Some(value);
    Ok(())
}

impl AdminRequest {
    /// Decode a request from its message type and payload.
    ///
    /// Required extensions are checked in the order source, destination,
    /// key; then the address families; then the key length. Unknown
    /// extension kinds are ignored.
    pub fn parse(kind: u16, payload: &[u8]) -> Result<Self> {
        match kind {
            SigMsgType::ADD => {
                let exts = Extensions::collect(payload)?;
                if exts.src.is_none() {
                    return Err(Error::MissingExtension(ExtensionKind::Source));
                }
                if exts.dst.is_none() {
                    return Err(Error::MissingExtension(ExtensionKind::Destination));
                }
                let key = exts
                    .key
                    .ok_or(Error::MissingExtension(ExtensionKind::Key))?;
                let (src, dst) = exts.pair()?;

                let (hdr, bytes) = KeyExtHdr::split(key)?;
                let key = SaKey::copy_from(bytes, hdr.bits)?;
                Ok(Self::Add { src, dst, key })
            }
            SigMsgType::GET => {
                let (src, dst) = Extensions::collect(payload)?.pair()?;
                Ok(Self::Get { src, dst })
            }
            SigMsgType::FLUSH => Ok(Self::Flush),
            SigMsgType::DUMP => Ok(Self::Dump),
            other => Err(Error::InvalidMessage(format!(
                "unknown request type {}",
                other
            ))),
        }
    }

    /// Message type of this request.
    pub fn kind(&self) -> u16 {
        match self {
            Self::Add { .. } => SigMsgType::ADD,
            Self::Get { .. } => SigMsgType::GET,
            Self::Flush => SigMsgType::FLUSH,
            Self::Dump => SigMsgType::DUMP,
        }
    }

    /// Encode as a request message.
    ///
    /// An ADD message carries the key; callers should zero the returned
    /// buffer once it has been sent.
    pub fn to_builder(&self) -> MessageBuilder {
        let mut builder = MessageBuilder::new(self.kind(), SIGM_F_REQUEST);
        match self {
            Self::Add { src, dst, key } => {
                builder.append_addr(ExtensionKind::Source, src);
                builder.append_addr(ExtensionKind::Destination, dst);
                builder.push_key(key.bits(), key.expose());
            }
            Self::Get { src, dst } => {
                builder.append_addr(ExtensionKind::Source, src);
                builder.append_addr(ExtensionKind::Destination, dst);
            }
            Self::Flush | Self::Dump => {}
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostic;

    fn sa(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn payload(builder: MessageBuilder) -> Vec<u8> {
        builder.finish()[crate::admin::SIGMSG_HDRLEN..].to_vec()
    }

    fn diag(kind: u16, builder: MessageBuilder) -> Diagnostic {
        AdminRequest::parse(kind, &payload(builder))
            .unwrap_err()
            .diagnostic()
    }

    #[test]
    fn test_parse_add() {
        let req = AdminRequest::Add {
            src: sa("10.0.0.1:0"),
            dst: sa("10.0.0.2:179"),
            key: SaKey::from_slice(b"secret").unwrap(),
        };
        let parsed = AdminRequest::parse(SigMsgType::ADD, &payload(req.to_builder())).unwrap();
        match parsed {
            AdminRequest::Add { src, dst, key } => {
                assert_eq!(src, sa("10.0.0.1:0"));
                assert_eq!(dst, sa("10.0.0.2:179"));
                assert_eq!(key.bits(), 48);
                assert_eq!(key.expose(), b"secret");
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_missing_extension_order() {
        let b = MessageBuilder::new(SigMsgType::ADD, SIGM_F_REQUEST);
        assert_eq!(diag(SigMsgType::ADD, b), Diagnostic::MissingSrc);

        let mut b = MessageBuilder::new(SigMsgType::ADD, SIGM_F_REQUEST);
        b.append_key(8, b"k").unwrap();
        b.append_addr(ExtensionKind::Source, &sa("10.0.0.1:0"));
        assert_eq!(diag(SigMsgType::ADD, b), Diagnostic::MissingDst);

        let mut b = MessageBuilder::new(SigMsgType::ADD, SIGM_F_REQUEST);
        b.append_addr(ExtensionKind::Source, &sa("10.0.0.1:0"));
        b.append_addr(ExtensionKind::Destination, &sa("10.0.0.2:0"));
        assert_eq!(diag(SigMsgType::ADD, b), Diagnostic::MissingKey);
    }

    #[test]
    fn test_family_checks() {
        let mut b = MessageBuilder::new(SigMsgType::ADD, SIGM_F_REQUEST);
        b.append_addr(ExtensionKind::Source, &sa("10.0.0.1:0"));
        b.append_addr(ExtensionKind::Destination, &sa("[2001:db8::2]:0"));
        b.append_key(8, b"k").unwrap();
        assert_eq!(diag(SigMsgType::ADD, b), Diagnostic::AfMismatch);

        let bogus = SockAddrExt {
            family: libc::AF_UNIX as u16,
            ..Default::default()
        };
        let mut b = MessageBuilder::new(SigMsgType::GET, SIGM_F_REQUEST);
        b.append_ext(ExtensionKind::Source.raw(), bogus.as_bytes())
            .unwrap();
        b.append_ext(ExtensionKind::Destination.raw(), bogus.as_bytes())
            .unwrap();
        let err = AdminRequest::parse(SigMsgType::GET, &payload(b)).unwrap_err();
        assert_eq!(err.diagnostic(), Diagnostic::BadSrcAf);
        assert_eq!(err.errno(), libc::EAFNOSUPPORT);
    }

    #[test]
    fn test_bad_key_length() {
        let mut b = MessageBuilder::new(SigMsgType::ADD, SIGM_F_REQUEST);
        b.append_addr(ExtensionKind::Source, &sa("10.0.0.1:0"));
        b.append_addr(ExtensionKind::Destination, &sa("10.0.0.2:0"));
        b.append_key(64, b"short").unwrap();
        assert_eq!(diag(SigMsgType::ADD, b), Diagnostic::BadKeyLen);
    }

    #[test]
    fn test_unknown_extensions_ignored() {
        let mut b = MessageBuilder::new(SigMsgType::GET, SIGM_F_REQUEST);
        b.append_ext(99, &[1, 2, 3]).unwrap();
        b.append_addr(ExtensionKind::Source, &sa("10.0.0.1:0"));
        b.append_addr(ExtensionKind::Destination, &sa("10.0.0.2:0"));
        assert!(matches!(
            AdminRequest::parse(SigMsgType::GET, &payload(b)).unwrap(),
            AdminRequest::Get { .. }
        ));
    }

    #[test]
    fn test_flush_dump_and_unknown() {
        assert!(matches!(
            AdminRequest::parse(SigMsgType::FLUSH, &[]).unwrap(),
            AdminRequest::Flush
        ));
        assert!(matches!(
            AdminRequest::parse(SigMsgType::DUMP, &[]).unwrap(),
            AdminRequest::Dump
        ));
        let err = AdminRequest::parse(77, &[]).unwrap_err();
        assert_eq!(err.diagnostic(), Diagnostic::BadMessage);
        assert_eq!(err.errno(), libc::EINVAL);
    }

    #[test]
    fn test_duplicate_extension_rejected() {
        let mut b = MessageBuilder::new(SigMsgType::GET, SIGM_F_REQUEST);
        b.append_addr(ExtensionKind::Source, &sa("10.0.0.1:0"));
        b.append_addr(ExtensionKind::Source, &sa("10.0.0.3:0"));
        b.append_addr(ExtensionKind::Destination, &sa("10.0.0.2:0"));
        assert_eq!(diag(SigMsgType::GET, b), Diagnostic::BadMessage);
    }
}
