//! The in-memory object model walked by the mapper.
//!
//! Graphpack serializes *graphs*, not trees: objects may be shared, may form
//! cycles, and may reference themselves. The model is therefore built on
//! reference-counted nodes with interior mutability so that deserialization
//! can first construct every shell and wire the references afterwards.
//!
//! ## Identity
//!
//! Composite objects ([`SeqObj`], [`MapObj`], [`ArrayObj`], [`RecordObj`])
//! are keyed by `Rc` pointer identity: two fields holding the same `Rc`
//! serialize to one box and deserialize back to one shared object. Immutable
//! scalars (numbers, booleans, strings) are keyed by value instead — sharing
//! them is observationally invisible and shrinks envelopes with repeated
//! primitives.
//!
//! ## Runtime types
//!
//! A [`RuntimeType`] is an interned descriptor handed out by the registry.
//! Handles compare by pointer; the registry caches constructed generic and
//! array types so that structurally equal types share one handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{GraphpackError, Result};
use crate::guid::TypeGuid;

/// Shared handle to an interned runtime type descriptor.
pub type TypeHandle = Arc<RuntimeType>;

/// Structural category of a runtime type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// A non-generic, non-array type (scalars, generic definitions, user
    /// records, the array pseudo-type).
    Plain,
    /// A constructed generic type, e.g. `List<i64>`.
    Generic {
        /// The unconstructed generic-definition type.
        definition: TypeHandle,
        /// Constructed argument types in declaration order.
        args: Vec<TypeHandle>,
    },
    /// An array type; rank lives per-instance in array metadata.
    Array {
        /// The element type.
        elem: TypeHandle,
    },
}

/// An interned runtime type descriptor.
///
/// Only the registry creates these; identity is by `Arc` pointer.
#[derive(Debug)]
pub struct RuntimeType {
    name: String,
    guid: TypeGuid,
    kind: TypeKind,
}

impl RuntimeType {
    pub(crate) fn new(name: impl Into<String>, guid: TypeGuid, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            guid,
            kind,
        }
    }

    /// Diagnostic name, e.g. `"i64"`, `"List<i64>"`, `"Vec3[]"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The GUID of this type's *base*: for a plain type its own GUID, for a
    /// constructed generic the definition's GUID, for an array the array
    /// pseudo-type GUID.
    pub fn base_guid(&self) -> TypeGuid {
        self.guid
    }

    /// Structural category.
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// True for non-generic, non-array types.
    pub fn is_plain(&self) -> bool {
        matches!(self.kind, TypeKind::Plain)
    }
}

/// Pointer-identity comparison of type handles.
pub fn same_type(a: &TypeHandle, b: &TypeHandle) -> bool {
    Arc::ptr_eq(a, b)
}

/// A value in the object graph.
///
/// Cloning an `Obj` is cheap: composites clone the `Rc`, scalars copy.
#[derive(Clone)]
pub enum Obj {
    /// The absent reference. Serializes as box id 0.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar.
    Int(i64),
    /// Unsigned integer scalar.
    Uint(u64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar; interned by value during a walk.
    Str(Rc<str>),
    /// Opaque byte blob; identity-keyed like composites.
    Bytes(Rc<[u8]>),
    /// A generic container instance, e.g. `List<i64>`.
    Seq(Rc<SeqObj>),
    /// A keyed container instance with an optional comparer object.
    Map(Rc<MapObj>),
    /// A (possibly multi-dimensional) array instance.
    Array(Rc<ArrayObj>),
    /// A user record instance with named members.
    Record(Rc<RecordObj>),
}

/// A generic sequence container instance.
pub struct SeqObj {
    ty: TypeHandle,
    /// Element slots; filled in place during phase-B population.
    pub items: RefCell<Vec<Obj>>,
}

impl SeqObj {
    /// Creates a sequence of the given constructed container type.
    pub fn new(ty: TypeHandle, items: Vec<Obj>) -> Rc<Self> {
        Rc::new(Self {
            ty,
            items: RefCell::new(items),
        })
    }

    /// The constructed container type.
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// True when the sequence holds no elements.
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

/// A keyed container instance. Entries are an association list so that keys
/// of any object shape are representable.
pub struct MapObj {
    ty: TypeHandle,
    /// Optional comparer object carried alongside the entries.
    pub comparer: RefCell<Obj>,
    /// Key/value pairs in insertion order.
    pub entries: RefCell<Vec<(Obj, Obj)>>,
}

impl MapObj {
    /// Creates a map of the given constructed container type.
    pub fn new(ty: TypeHandle, entries: Vec<(Obj, Obj)>) -> Rc<Self> {
        Rc::new(Self {
            ty,
            comparer: RefCell::new(Obj::Null),
            entries: RefCell::new(entries),
        })
    }

    /// Creates a map carrying a comparer object.
    pub fn with_comparer(ty: TypeHandle, comparer: Obj, entries: Vec<(Obj, Obj)>) -> Rc<Self> {
        let map = Self::new(ty, entries);
        *map.comparer.borrow_mut() = comparer;
        map
    }

    /// The constructed container type.
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// True when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// A (possibly multi-dimensional) array instance.
///
/// Elements are stored flattened in row-major order; the shape lives in
/// `lengths`/`lower_bounds` and is interned as array metadata on the wire.
pub struct ArrayObj {
    ty: TypeHandle,
    lengths: Vec<u32>,
    lower_bounds: Vec<u32>,
    /// Flattened element slots.
    pub items: RefCell<Vec<Obj>>,
}

impl ArrayObj {
    /// Creates an array, validating that the element count equals the
    /// product of `lengths`.
    pub fn new(
        ty: TypeHandle,
        lengths: Vec<u32>,
        lower_bounds: Vec<u32>,
        items: Vec<Obj>,
    ) -> Result<Rc<Self>> {
        if !matches!(ty.kind(), TypeKind::Array { .. }) {
            return Err(GraphpackError::Internal(format!(
                "ArrayObj requires an array type, got {}",
                ty.name()
            )));
        }
        if !lower_bounds.is_empty() && lower_bounds.len() != lengths.len() {
            return Err(GraphpackError::Internal(
                "lower_bounds must be empty or match rank".into(),
            ));
        }
        let expected = lengths
            .iter()
            .fold(1u64, |acc, &l| acc.saturating_mul(u64::from(l)));
        if expected != items.len() as u64 {
            return Err(GraphpackError::Internal(format!(
                "Array element count {} does not match shape product {}",
                items.len(),
                expected
            )));
        }
        Ok(Rc::new(Self {
            ty,
            lengths,
            lower_bounds,
            items: RefCell::new(items),
        }))
    }

    /// Creates a rank-1 array with default lower bounds.
    pub fn rank1(ty: TypeHandle, items: Vec<Obj>) -> Result<Rc<Self>> {
        let len = items.len() as u32;
        Self::new(ty, vec![len], Vec::new(), items)
    }

    /// The constructed array type.
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// The element type.
    pub fn elem_ty(&self) -> &TypeHandle {
        match self.ty.kind() {
            TypeKind::Array { elem } => elem,
            // Constructor guarantees the array kind.
            _ => &self.ty,
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> u32 {
        self.lengths.len() as u32
    }

    /// Per-dimension lengths.
    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    /// Per-dimension lower bounds; empty means all zero.
    pub fn lower_bounds(&self) -> &[u32] {
        &self.lower_bounds
    }
}

/// A user record instance.
///
/// Field values are stored parallel to the registry's flattened member list
/// (ancestors' members first, then the type's own, in declared order).
pub struct RecordObj {
    ty: TypeHandle,
    /// Flattened member values.
    pub fields: RefCell<Vec<Obj>>,
}

impl RecordObj {
    /// Creates a record instance. `fields` must match the flattened member
    /// arity of the type's schema.
    pub fn new(ty: TypeHandle, fields: Vec<Obj>) -> Rc<Self> {
        Rc::new(Self {
            ty,
            fields: RefCell::new(fields),
        })
    }

    /// The record's runtime type.
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// Reads the member value at flat index `i`, or `Obj::Null` when out of
    /// range.
    pub fn get(&self, i: usize) -> Obj {
        self.fields.borrow().get(i).cloned().unwrap_or(Obj::Null)
    }

    /// Writes the member value at flat index `i`. Out-of-range writes are
    /// ignored.
    pub fn set(&self, i: usize, value: Obj) {
        let mut fields = self.fields.borrow_mut();
        if let Some(slot) = fields.get_mut(i) {
            *slot = value;
        }
    }
}

impl Obj {
    /// True for the absent reference.
    pub fn is_null(&self) -> bool {
        matches!(self, Obj::Null)
    }

    /// Borrows the record node, if this is a record.
    pub fn as_record(&self) -> Option<&Rc<RecordObj>> {
        match self {
            Obj::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Borrows the sequence node, if this is a sequence.
    pub fn as_seq(&self) -> Option<&Rc<SeqObj>> {
        match self {
            Obj::Seq(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows the map node, if this is a map.
    pub fn as_map(&self) -> Option<&Rc<MapObj>> {
        match self {
            Obj::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrows the array node, if this is an array.
    pub fn as_array(&self) -> Option<&Rc<ArrayObj>> {
        match self {
            Obj::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Extracts a signed integer scalar.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Obj::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Extracts an unsigned integer scalar.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Obj::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Extracts a boolean scalar.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Obj::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Extracts a float scalar.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Obj::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Extracts a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Obj::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extracts a byte blob.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Obj::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The identity test used by the box table: pointer identity for
    /// composites and blobs, value equality for scalar values and strings.
    pub fn same_identity(a: &Obj, b: &Obj) -> bool {
        match (a, b) {
            (Obj::Null, Obj::Null) => true,
            (Obj::Bool(x), Obj::Bool(y)) => x == y,
            (Obj::Int(x), Obj::Int(y)) => x == y,
            (Obj::Uint(x), Obj::Uint(y)) => x == y,
            (Obj::Float(x), Obj::Float(y)) => x.to_bits() == y.to_bits(),
            (Obj::Str(x), Obj::Str(y)) => x == y,
            (Obj::Bytes(x), Obj::Bytes(y)) => Rc::ptr_eq(x, y),
            (Obj::Seq(x), Obj::Seq(y)) => Rc::ptr_eq(x, y),
            (Obj::Map(x), Obj::Map(y)) => Rc::ptr_eq(x, y),
            (Obj::Array(x), Obj::Array(y)) => Rc::ptr_eq(x, y),
            (Obj::Record(x), Obj::Record(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }
}

// Debug stays shallow: a derived impl would recurse through RefCells and
// never terminate on cyclic graphs.
impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obj::Null => write!(f, "Null"),
            Obj::Bool(v) => write!(f, "Bool({v})"),
            Obj::Int(v) => write!(f, "Int({v})"),
            Obj::Uint(v) => write!(f, "Uint({v})"),
            Obj::Float(v) => write!(f, "Float({v})"),
            Obj::Str(s) => write!(f, "Str({s:?})"),
            Obj::Bytes(b) => write!(f, "Bytes(len={})", b.len()),
            Obj::Seq(s) => write!(f, "Seq({}, len={})", s.ty.name(), s.len()),
            Obj::Map(m) => write!(f, "Map({}, len={})", m.ty.name(), m.len()),
            Obj::Array(a) => write!(f, "Array({}, shape={:?})", a.ty.name(), a.lengths),
            Obj::Record(r) => {
                write!(f, "Record({}, arity={})", r.ty.name(), r.fields.borrow().len())
            }
        }
    }
}

impl fmt::Debug for SeqObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqObj({}, len={})", self.ty.name(), self.len())
    }
}

impl fmt::Debug for MapObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapObj({}, len={})", self.ty.name(), self.len())
    }
}

impl fmt::Debug for ArrayObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayObj({}, shape={:?})", self.ty.name(), self.lengths)
    }
}

impl fmt::Debug for RecordObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordObj({}, arity={})",
            self.ty.name(),
            self.fields.borrow().len()
        )
    }
}
