//! Error types for SA store, signing and key-management operations.

use std::io;
use std::net::SocketAddr;

use crate::admin::ExtensionKind;
use crate::diagnostic::Diagnostic;

/// Result type for tcpsig operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing SAs or signing segments.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the admin transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid extension format.
    #[error("invalid extension: {0}")]
    InvalidExtension(String),

    /// A required extension was absent from an admin request.
    #[error("missing {0} extension")]
    MissingExtension(ExtensionKind),

    /// Source and destination use different address families.
    #[error("address family mismatch: source {src}, destination {dst}")]
    AddressFamilyMismatch {
        /// Raw source family.
        src: u16,
        /// Raw destination family.
        dst: u16,
    },

    /// Address family is neither AF_INET nor AF_INET6.
    #[error("unsupported address family {0}")]
    UnsupportedFamily(u16),

    /// Key is empty, too long, or inconsistent with its bit length.
    #[error("invalid key length: {bits} bits with {len} bytes")]
    InvalidKeyLength {
        /// Declared key length in bits.
        bits: u16,
        /// Key bytes supplied.
        len: usize,
    },

    /// An SA for the same address pair already exists.
    #[error("SA already exists for {src} -> {dst}")]
    DuplicateSa {
        /// Source address of the rejected SA.
        src: SocketAddr,
        /// Destination address of the rejected SA.
        dst: SocketAddr,
    },

    /// No SA matches the queried pair.
    #[error("no SA for {src} -> {dst}")]
    NotFound {
        /// Queried source.
        src: SocketAddr,
        /// Queried destination.
        dst: SocketAddr,
    },

    /// Table capacity reached or key allocation failed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Signing or verification was requested but no key is configured.
    #[error("no signature key configured for {src} -> {dst}")]
    NoKey {
        /// Source of the segment.
        src: SocketAddr,
        /// Destination of the segment.
        dst: SocketAddr,
    },

    /// The segment signature does not match the computed digest.
    #[error("TCP signature mismatch")]
    SignatureMismatch,

    /// A signed connection received a segment without a signature option.
    #[error("segment carries no TCP signature option")]
    MissingSignatureOption,

    /// The TCP header or segment layout cannot be signed or verified.
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    /// Not enough option space left in the header for the signature.
    #[error("no room for signature option (data offset {data_offset})")]
    NoOptionSpace {
        /// Current data offset in 32-bit words.
        data_offset: u8,
    },

    /// The peer rejected an admin request.
    #[error("{diagnostic}: {message} (errno {errno})")]
    Rejected {
        /// The errno value from the reply.
        errno: i32,
        /// Diagnostic code from the reply.
        diagnostic: Diagnostic,
        /// Human-readable error message.
        message: String,
    },
}

impl Error {
    /// Create a rejection from a reply status block.
    pub fn from_status(errno: i32, diagnostic: Diagnostic) -> Self {
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Rejected {
            errno,
            diagnostic,
            message,
        }
    }

    /// Diagnostic code reported to key-management clients for this error.
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            Self::MissingExtension(ExtensionKind::Source) => Diagnostic::MissingSrc,
            Self::MissingExtension(ExtensionKind::Destination) => Diagnostic::MissingDst,
            Self::MissingExtension(ExtensionKind::Key) => Diagnostic::MissingKey,
            Self::AddressFamilyMismatch { .. } => Diagnostic::AfMismatch,
            Self::UnsupportedFamily(_) => Diagnostic::BadSrcAf,
            Self::InvalidKeyLength { .. } => Diagnostic::BadKeyLen,
            Self::DuplicateSa { .. } => Diagnostic::DuplicateSa,
            Self::ResourceExhausted(_) => Diagnostic::NoMemory,
            Self::Truncated { .. } | Self::InvalidMessage(_) | Self::InvalidExtension(_) => {
                Diagnostic::BadMessage
            }
            Self::Rejected { diagnostic, .. } => *diagnostic,
            _ => Diagnostic::None,
        }
    }

    /// Positive errno value reported to key-management clients.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Self::UnsupportedFamily(_) => libc::EAFNOSUPPORT,
            Self::DuplicateSa { .. } => libc::EEXIST,
            Self::NotFound { .. } | Self::NoKey { .. } => libc::ENOENT,
            Self::ResourceExhausted(_) => libc::ENOMEM,
            Self::SignatureMismatch | Self::MissingSignatureOption => libc::EBADMSG,
            Self::NoOptionSpace { .. } => libc::EMSGSIZE,
            Self::Rejected { errno, .. } => *errno,
            Self::Truncated { .. }
            | Self::InvalidMessage(_)
            | Self::InvalidExtension(_)
            | Self::MissingExtension(_)
            | Self::AddressFamilyMismatch { .. }
            | Self::InvalidKeyLength { .. }
            | Self::InvalidSegment(_) => libc::EINVAL,
        }
    }

    /// Check if this is a "not found" error (ENOENT).
    pub fn is_not_found(&self) -> bool {
        self.errno() == libc::ENOENT && !matches!(self, Self::NoKey { .. })
    }

    /// Check if this is a "no key configured" error.
    pub fn is_no_key(&self) -> bool {
        matches!(self, Self::NoKey { .. })
    }

    /// Check if this is a duplicate SA error, local or reported by a server.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::DuplicateSa { .. }
                | Self::Rejected {
                    diagnostic: Diagnostic::DuplicateSa,
                    ..
                }
        )
    }

    /// Check if the segment failed authentication.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::SignatureMismatch | Self::MissingSignatureOption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (SocketAddr, SocketAddr) {
        ("10.0.0.1:0".parse().unwrap(), "10.0.0.2:0".parse().unwrap())
    }

    #[test]
    fn test_missing_extension_diagnostics() {
        assert_eq!(
            Error::MissingExtension(ExtensionKind::Source).diagnostic(),
            Diagnostic::MissingSrc
        );
        assert_eq!(
            Error::MissingExtension(ExtensionKind::Destination).diagnostic(),
            Diagnostic::MissingDst
        );
        assert_eq!(
            Error::MissingExtension(ExtensionKind::Key).diagnostic(),
            Diagnostic::MissingKey
        );
        assert_eq!(
            Error::MissingExtension(ExtensionKind::Key).errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn test_duplicate() {
        let (src, dst) = pair();
        let err = Error::DuplicateSa { src, dst };
        assert!(err.is_duplicate());
        assert_eq!(err.diagnostic(), Diagnostic::DuplicateSa);
        assert_eq!(err.to_string(), "SA already exists for 10.0.0.1:0 -> 10.0.0.2:0");

        assert!(Error::from_status(libc::EEXIST, Diagnostic::DuplicateSa).is_duplicate());
        assert!(!Error::Io(io::Error::from_raw_os_error(libc::EEXIST)).is_duplicate());
        assert!(!Error::from_status(libc::EEXIST, Diagnostic::None).is_duplicate());
    }

    #[test]
    fn test_no_key_is_not_not_found() {
        let (src, dst) = pair();
        let err = Error::NoKey { src, dst };
        assert!(err.is_no_key());
        assert!(!err.is_not_found());
        assert!(Error::NotFound { src, dst }.is_not_found());
    }

    #[test]
    fn test_family_errors() {
        let err = Error::AddressFamilyMismatch { src: 2, dst: 10 };
        assert_eq!(err.diagnostic(), Diagnostic::AfMismatch);
        assert_eq!(err.errno(), libc::EINVAL);

        let err = Error::UnsupportedFamily(1);
        assert_eq!(err.diagnostic(), Diagnostic::BadSrcAf);
        assert_eq!(err.errno(), libc::EAFNOSUPPORT);
    }

    #[test]
    fn test_from_status() {
        let err = Error::from_status(libc::EEXIST, Diagnostic::DuplicateSa);
        assert!(err.is_duplicate());
        assert_eq!(err.diagnostic(), Diagnostic::DuplicateSa);
        let msg = err.to_string();
        assert!(msg.contains("DUPLICATE_SA"));
        assert!(msg.contains("File exists"));
    }

    #[test]
    fn test_auth_failures() {
        assert!(Error::SignatureMismatch.is_auth_failure());
        assert!(Error::MissingSignatureOption.is_auth_failure());
        assert!(!Error::InvalidSegment("short".into()).is_auth_failure());
    }
}
