//! Centralized error handling for Graphpack.
//!
//! All failure conditions are represented as `Result` values; the library
//! enforces this through `#![deny(clippy::panic)]` and
//! `#![deny(clippy::unwrap_used)]`.
//!
//! ## Error Categories
//!
//! - **Unserializable** ([`GraphpackError::Unserializable`]): an object was
//!   reached during the walk whose runtime type has no registered transformer.
//! - **Construction** ([`GraphpackError::Construction`]): a registered
//!   zero-argument constructor failed while building a shell.
//! - **Hook** ([`GraphpackError::Hook`]): a post-deserialization hook failed.
//! - **Decode** ([`GraphpackError::Decode`]): the envelope is structurally
//!   invalid (missing payloads, out-of-range ids, bad magic bytes).
//! - **Codec** ([`GraphpackError::Codec`]): bincode encoding/decoding of the
//!   envelope body failed.
//! - **Compression** ([`GraphpackError::Compression`]): body
//!   compression/decompression failed.
//! - **I/O** ([`GraphpackError::Io`]): low-level reader/writer failures.
//! - **Internal** ([`GraphpackError::Internal`]): logic errors (should not
//!   occur in production).
//!
//! Cancellation is *not* an error: a cancelled walk returns a partial result
//! with a status flag on the info record.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Graphpack operations.
pub type Result<T> = std::result::Result<T, GraphpackError>;

/// The master error enum covering all failure domains in Graphpack.
///
/// This type is `Clone` so errors can be stored for later analysis or shared
/// between the mapper and its caller. I/O errors are wrapped in `Arc` to make
/// cloning cheap.
#[derive(Debug, Clone)]
pub enum GraphpackError {
    /// No transformer is registered for the runtime type of an encountered
    /// object. The walk stops and the partial envelope is discarded.
    Unserializable(String),

    /// A zero-argument constructor failed during shell construction.
    /// Carries the type name and the inner failure.
    Construction(String),

    /// A post-deserialization hook failed. The inner message propagates
    /// unwrapped.
    Hook(String),

    /// The envelope is malformed: wrong magic bytes, version mismatch,
    /// out-of-range ids, or a box with no payload.
    Decode(String),

    /// Bincode encoding/decoding of the envelope body failed.
    Codec(String),

    /// Compression algorithm failure or unknown compression id.
    Compression(String),

    /// Low-level I/O failure while writing or reading envelope bytes.
    Io(Arc<io::Error>),

    /// Logic error in the mapper or registry. Indicates a bug; please report
    /// it with a minimal reproduction case.
    Internal(String),
}

impl fmt::Display for GraphpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unserializable(t) => write!(f, "No transformer registered for type: {t}"),
            Self::Construction(s) => write!(f, "Constructor Error: {s}"),
            Self::Hook(s) => write!(f, "Hook Error: {s}"),
            Self::Decode(s) => write!(f, "Decode Error: {s}"),
            Self::Codec(s) => write!(f, "Codec Error: {s}"),
            Self::Compression(s) => write!(f, "Compression Error: {s}"),
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for GraphpackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GraphpackError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
