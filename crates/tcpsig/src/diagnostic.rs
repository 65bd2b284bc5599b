//! Diagnostic codes carried in key-management replies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic code explaining why an admin request was rejected.
///
/// Travels next to the errno status in every reply; `None` accompanies
/// successful replies and failures that need no further explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum Diagnostic {
    /// No diagnostic.
    #[default]
    None = 0,
    /// Source address extension missing.
    MissingSrc = 1,
    /// Destination address extension missing.
    MissingDst = 2,
    /// Key extension missing.
    MissingKey = 3,
    /// Source and destination families differ.
    AfMismatch = 4,
    /// Source family is not IPv4 or IPv6.
    BadSrcAf = 5,
    /// An SA already exists for the pair.
    DuplicateSa = 6,
    /// Key empty, too long, or shorter than its bit length.
    #[serde(rename = "BAD_KEYLEN")]
    BadKeyLen = 7,
    /// Table full or allocation failure.
    NoMemory = 8,
    /// Message or extension could not be decoded.
    BadMessage = 9,
}

impl Diagnostic {
    /// Parse from the raw wire value. Unknown codes map to `None`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::MissingSrc,
            2 => Self::MissingDst,
            3 => Self::MissingKey,
            4 => Self::AfMismatch,
            5 => Self::BadSrcAf,
            6 => Self::DuplicateSa,
            7 => Self::BadKeyLen,
            8 => Self::NoMemory,
            9 => Self::BadMessage,
            _ => Self::None,
        }
    }

    /// Raw wire value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Symbolic name, as printed by tools.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::MissingSrc => "MISSING_SRC",
            Self::MissingDst => "MISSING_DST",
            Self::MissingKey => "MISSING_KEY",
            Self::AfMismatch => "AF_MISMATCH",
            Self::BadSrcAf => "BAD_SRC_AF",
            Self::DuplicateSa => "DUPLICATE_SA",
            Self::BadKeyLen => "BAD_KEYLEN",
            Self::NoMemory => "NO_MEMORY",
            Self::BadMessage => "BAD_MESSAGE",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
