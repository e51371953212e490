//! # Graphpack
//!
//! A self-describing binary serializer for in-memory *object graphs* —
//! including cycles, shared references, multi-dimensional arrays, generic
//! containers, and user-defined record types with named members. Identity is
//! preserved: if two fields of the graph refer to the same object,
//! deserialization yields two references to the same reconstructed object.
//!
//! ## Overview
//!
//! Graphpack is fundamentally different from tree-shaped serialization
//! libraries. Instead of recursing through values, it runs a two-pass
//! mapping engine:
//!
//! *   **Discovery walk (write side):** a breadth-first walker assigns every
//!     reachable object a dense integer *box id*, interns its runtime type,
//!     and asks the object's *transformer* to describe its contents in terms
//!     of other box ids. Repeated scalars share a box; shared composites
//!     share a box by pointer identity.
//! *   **Two-phase reconstruction (read side):** phase A builds a *shell*
//!     for every box in reverse id order; phase B wires references once all
//!     identities exist. Cycles need no special casing — a forward reference
//!     is just an id that resolves in phase B.
//!
//! The result is a compact envelope (the [`Bundle`]) of parallel interning
//! tables plus one tagged record per object, written to bytes by a thin
//! [`codec`].
//!
//! ### Key Pieces
//!
//! *   [`Obj`] — the dynamic object model: scalars, strings, blobs,
//!     sequences, maps, arrays, and user records with named members.
//! *   [`Registry`] — resolves runtime types to stable GUIDs, transformers,
//!     constructors, member descriptors, and post-deserialization hooks.
//! *   [`Mapper`] — one serialization or one deserialization session; owns
//!     every interning table.
//! *   [`Transformer`] — the per-type strategy trait; built-in
//!     implementations cover the core shapes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use graphpack::{Graphpack, Obj, RecordObj, RecordSpec, Registry, TypeGuid};
//!
//! // Register a record type once at startup.
//! let registry = Registry::global();
//! let node_guid = TypeGuid::from_u128(0x1234);
//! registry.register_record(RecordSpec::new("Node", node_guid).member("Next"))?;
//!
//! // Build a two-node cycle and round-trip it.
//! let ty = registry.try_type_for(node_guid).unwrap();
//! let a = RecordObj::new(ty.clone(), vec![Obj::Null]);
//! let b = RecordObj::new(ty, vec![Obj::Record(a.clone())]);
//! a.set(0, Obj::Record(b));
//!
//! let bytes = Graphpack::pack(&Obj::Record(a))?;
//! let root = Graphpack::unpack(&bytes)?;
//! ```
//!
//! ## Concurrency Model
//!
//! A mapper is single-threaded and cooperative: the only suspension point
//! is the cancellation check between queue items. The registry is a
//! process-wide singleton with a coarse lock around mutation; walks and
//! registration must not race — callers serialize them.
//!
//! ### Safety and Error Handling
//!
//! * **No Panics:** no `unwrap()` or `panic!()` in the library (enforced by
//!   clippy lints).
//! * **Comprehensive Errors:** all failures surface as a
//!   [`GraphpackError`].
//! * **Unknown types are tolerated:** decoding an envelope whose type table
//!   references an unregistered GUID maps the affected boxes to null and
//!   reports the GUIDs on the info record instead of aborting.

#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod bundle;
pub mod cancel;
pub mod codec;
pub mod compression;
pub mod error;
pub mod guid;
pub mod index;
pub mod inspector;
pub mod mapper;
pub mod object;
pub mod registry;
pub mod transform;
pub mod transform_impls;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod boxes;
#[doc(hidden)]
pub mod meta;

// --- RE-EXPORTS ---

pub use api::Graphpack;
pub use bundle::Bundle;
pub use cancel::CancelToken;
pub use error::{GraphpackError, Result};
pub use guid::TypeGuid;
pub use index::InterningIndex;
pub use inspector::GraphpackInspector;
pub use mapper::{MapInfo, Mapper, UnmapInfo};
pub use object::{ArrayObj, MapObj, Obj, RecordObj, RuntimeType, SeqObj, TypeHandle, TypeKind};
pub use registry::{RecordSpec, Registry};
pub use transform::Transformer;

#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Compressor;
pub use compression::{Compressor, NoCompression};
