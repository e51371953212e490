//! Stable 16-byte type identities.
//!
//! Every registered runtime type carries a [`TypeGuid`] assigned once at
//! registration time. GUIDs are independent of textual type names, which
//! makes member-layout lookups robust against type renames.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphpackError, Result};

/// A stable 16-byte identifier for a runtime type.
///
/// Two distinct runtime types must never share a GUID; the registry enforces
/// this at registration time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeGuid(Uuid);

impl TypeGuid {
    /// Creates a GUID from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Creates a GUID from a 128-bit literal. Useful for compile-time
    /// well-known ids.
    pub const fn from_u128(v: u128) -> Self {
        Self(Uuid::from_u128(v))
    }

    /// Parses the hyphenated string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| GraphpackError::Decode(format!("Invalid type GUID '{s}': {e}")))
    }

    /// Returns the raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the canonical hyphenated string form. This is the form stored
    /// in the envelope's string table by user-record layouts.
    pub fn hyphenated(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Debug for TypeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeGuid({})", self.0)
    }
}

impl fmt::Display for TypeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn guid_string_round_trip() {
        let guid = TypeGuid::from_u128(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10);
        let text = guid.hyphenated();
        assert_eq!(TypeGuid::parse(&text).unwrap(), guid);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(TypeGuid::parse("not-a-guid").is_err());
    }
}
