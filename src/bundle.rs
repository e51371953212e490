//! Defines the logical wire schema of a Graphpack envelope.
//!
//! A [`Bundle`] is the outer record written to and read from bytes. It
//! collects every interning table (strings, GUIDs, type metadata, array
//! metadata, user-record layouts), the box list, and the root box id.
//!
//! ## Envelope Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ transformer_guids[]   16-byte GUIDs, position = id − 1   │
//! ├──────────────────────────────────────────────────────────┤
//! │ type_guids[]          16-byte GUIDs, position = id − 1   │
//! ├──────────────────────────────────────────────────────────┤
//! │ root_box_id           non-zero index into boxes          │
//! ├──────────────────────────────────────────────────────────┤
//! │ boxes[]               one record per reachable object    │
//! ├──────────────────────────────────────────────────────────┤
//! │ strings[]             member names, GUID strings, values │
//! ├──────────────────────────────────────────────────────────┤
//! │ storable_type_metadata[]   user-record layouts           │
//! ├──────────────────────────────────────────────────────────┤
//! │ type_metadata[]       recursive type descriptors         │
//! ├──────────────────────────────────────────────────────────┤
//! │ array_metadata[]      shared (rank, lengths, bounds)     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! All id fields are unsigned 32-bit; an id of 0 denotes absent/null and
//! must round-trip. Box ids are dense in `[1, N]` where `N` is the number of
//! reachable objects; box 0 is reserved for the null reference.
//!
//! A box carries exactly one payload. The wire field is `Option` only so
//! that a cancelled, partially-filled envelope survives re-encoding; a
//! strict decode rejects a missing payload as malformed.

use serde::{Deserialize, Serialize};

use crate::guid::TypeGuid;

/// The outer envelope record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Transformer GUIDs; position = transformer id − 1.
    pub transformer_guids: Vec<TypeGuid>,
    /// Base-type GUIDs; position = type id − 1.
    pub type_guids: Vec<TypeGuid>,
    /// Index of the root object's box. Non-zero in complete envelopes.
    pub root_box_id: u32,
    /// One record per reachable object, ordered by box id ascending.
    pub boxes: Vec<BoxRecord>,
    /// Interned strings; position = string id − 1.
    pub strings: Vec<String>,
    /// User-record layouts; position = layout id − 1.
    pub storable_type_metadata: Vec<StorableTypeLayoutRecord>,
    /// Recursive type descriptors; position = metadata id − 1.
    pub type_metadata: Vec<TypeMetadataRecord>,
    /// Shared array shapes; position = array-metadata id − 1.
    pub array_metadata: Vec<ArrayMetadataRecord>,
}

/// The wire record for one reachable object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxRecord {
    /// Id into [`Bundle::type_metadata`].
    pub type_metadata_id: u32,
    /// The single payload. `None` only in cancelled partial envelopes.
    pub payload: Option<BoxPayload>,
}

/// The three payload shapes a box can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoxPayload {
    /// A single scalar value.
    Scalar(ScalarValue),
    /// Arrays and containers.
    Repeated(RepeatedValue),
    /// User-record member values.
    Members(MemberValue),
}

/// Scalar slots; encoders pick the most compact applicable slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// Non-negative signed integers.
    Int(i64),
    /// Unsigned integers; also carries booleans (0/1) and interned string
    /// ids for string scalars.
    Uint(u64),
    /// Negative signed integers (zigzag-friendly slot).
    Zig(i64),
    /// Floats that survive an `f32` round trip.
    Float(f32),
    /// Full-width floats.
    Double(f64),
    /// Opaque byte blobs.
    Bytes(Vec<u8>),
}

/// Payload for arrays and containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatedValue {
    /// The element data.
    pub payload: RepeatedPayload,
    /// Box id of an attached comparer object; 0 = absent.
    pub comparer_box_id: u32,
    /// Type metadata id of the comparer; 0 = absent.
    pub comparer_type_metadata_id: u32,
    /// Id into [`Bundle::array_metadata`]; 0 for non-array containers.
    pub array_metadata_id: u32,
}

impl RepeatedValue {
    /// A plain container payload with no comparer and no array shape.
    pub fn plain(payload: RepeatedPayload) -> Self {
        Self {
            payload,
            comparer_box_id: 0,
            comparer_type_metadata_id: 0,
            array_metadata_id: 0,
        }
    }
}

/// Typed element storage for repeated values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RepeatedPayload {
    /// Child references by box id; 0 entries are null elements.
    BoxIds(Vec<u32>),
    /// Inline signed integers.
    Ints(Vec<i64>),
    /// Inline unsigned integers.
    Uints(Vec<u64>),
    /// Inline floats.
    Doubles(Vec<f64>),
    /// Inline booleans.
    Bools(Vec<bool>),
}

impl RepeatedPayload {
    /// Element count of the payload.
    pub fn len(&self) -> usize {
        match self {
            Self::BoxIds(v) => v.len(),
            Self::Ints(v) => v.len(),
            Self::Uints(v) => v.len(),
            Self::Doubles(v) => v.len(),
            Self::Bools(v) => v.len(),
        }
    }

    /// True when the payload holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Payload for user records: member values parallel to the flattened member
/// name list of the referenced layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberValue {
    /// Id into [`Bundle::storable_type_metadata`].
    pub storable_type_metadata_id: u32,
    /// Member values by box id, ancestors' members first.
    pub value_box_ids: Vec<u32>,
}

/// A recursive runtime-type descriptor.
///
/// For a plain type only `type_id` and `transformer_id` are meaningful. For
/// a constructed generic, `type_id` names the generic definition and
/// `generic_argument_ids` the argument metadatas in declaration order. For
/// an array, `type_id` names the array pseudo-type and the argument list is
/// the singleton element metadata. Metadatas form a DAG; cycles are
/// malformed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeMetadataRecord {
    /// Id into [`Bundle::type_guids`].
    pub type_id: u32,
    /// Ids into [`Bundle::type_metadata`].
    pub generic_argument_ids: Vec<u32>,
    /// Id into [`Bundle::transformer_guids`]; 0 = not yet supplied.
    pub transformer_id: u32,
}

/// A user-record layout: the record's GUID (as an interned string), its
/// storable parent layout, and its *own* member names. The flattened member
/// list is the ancestors' members followed by these, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorableTypeLayoutRecord {
    /// Id into [`Bundle::strings`] of the hyphenated type GUID.
    pub type_guid_string_id: u32,
    /// Id into [`Bundle::storable_type_metadata`]; 0 = no storable parent.
    pub parent_layout_id: u32,
    /// Ids into [`Bundle::strings`], declared order, own members only.
    pub member_name_string_ids: Vec<u32>,
}

/// A shared array shape. Interned on the full tuple so arrays with
/// coinciding shapes reference one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayMetadataRecord {
    /// Number of dimensions; equals `lengths.len()`.
    pub rank: u32,
    /// Per-dimension lengths; element count is their product.
    pub lengths: Vec<u32>,
    /// Per-dimension lower bounds; empty means all zero.
    pub lower_bounds: Vec<u32>,
}

impl ArrayMetadataRecord {
    /// Total element count described by this shape. Saturates on absurd
    /// shapes so hostile envelopes cannot overflow the check against the
    /// payload length.
    pub fn element_count(&self) -> u64 {
        self.lengths
            .iter()
            .fold(1u64, |acc, &l| acc.saturating_mul(u64::from(l)))
    }
}
