//! The box table: object identity and box-id assignment.
//!
//! Every distinct reachable object gets a fresh box id in order of first
//! discovery, starting at 1; id 0 is reserved for the null reference. The
//! table's key tests reference identity first and falls back to value
//! equality for scalar values and strings, so repeated primitives share one
//! box.

use std::collections::HashMap;
use std::rc::Rc;

use crate::bundle::{BoxPayload, BoxRecord};
use crate::error::{GraphpackError, Result};
use crate::index::XxBuildHasher;
use crate::object::Obj;

/// Identity key for the object→box-id map.
///
/// Composite objects and blobs key by their `Rc` allocation address; the
/// enum discriminant contributes the runtime-type component of the hash, so
/// an `Int(5)` and a `Uint(5)` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ObjKey {
    Ident(usize),
    Bool(bool),
    Int(i64),
    Uint(u64),
    FloatBits(u64),
    Str(Rc<str>),
}

impl ObjKey {
    /// Builds the key for a non-null object.
    pub fn of(obj: &Obj) -> Result<Self> {
        let key = match obj {
            Obj::Null => {
                return Err(GraphpackError::Internal(
                    "The null reference is never boxed".into(),
                ))
            }
            Obj::Bool(v) => Self::Bool(*v),
            Obj::Int(v) => Self::Int(*v),
            Obj::Uint(v) => Self::Uint(*v),
            Obj::Float(v) => Self::FloatBits(v.to_bits()),
            Obj::Str(s) => Self::Str(s.clone()),
            Obj::Bytes(b) => Self::Ident(Rc::as_ptr(b) as *const u8 as usize),
            Obj::Seq(s) => Self::Ident(Rc::as_ptr(s) as usize),
            Obj::Map(m) => Self::Ident(Rc::as_ptr(m) as usize),
            Obj::Array(a) => Self::Ident(Rc::as_ptr(a) as usize),
            Obj::Record(r) => Self::Ident(Rc::as_ptr(r) as usize),
        };
        Ok(key)
    }
}

/// A box under construction: type metadata assigned, payload pending until
/// the serialization driver asks the transformer to fill it.
#[derive(Debug, Clone)]
pub struct PendingBox {
    /// Id into the envelope's type-metadata list.
    pub type_metadata_id: u32,
    /// Filled by the driver after `fill_box`.
    pub payload: Option<BoxPayload>,
}

impl PendingBox {
    /// A partial box with the payload still empty.
    pub fn new(type_metadata_id: u32) -> Self {
        Self {
            type_metadata_id,
            payload: None,
        }
    }
}

/// Serialize-side table of assigned boxes.
#[derive(Debug, Default)]
pub(crate) struct BoxTable {
    ids: HashMap<ObjKey, u32, XxBuildHasher>,
    boxes: Vec<PendingBox>,
}

impl BoxTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id already assigned to this key, if any.
    pub fn lookup(&self, key: &ObjKey) -> Option<u32> {
        self.ids.get(key).copied()
    }

    /// Assigns the next dense id to a newly discovered object.
    pub fn insert(&mut self, key: ObjKey, pending: PendingBox) -> u32 {
        self.boxes.push(pending);
        let id = self.boxes.len() as u32;
        self.ids.insert(key, id);
        id
    }

    /// Total on assigned ids.
    pub fn get(&self, id: u32) -> Result<&PendingBox> {
        if id == 0 {
            return Err(GraphpackError::Internal("Box id 0 is the null reference".into()));
        }
        self.boxes
            .get(id as usize - 1)
            .ok_or_else(|| GraphpackError::Internal(format!("Box id {id} out of range")))
    }

    /// Stores the payload produced by a transformer's `fill_box`.
    pub fn set_payload(&mut self, id: u32, payload: BoxPayload) -> Result<()> {
        let b = self
            .boxes
            .get_mut(id as usize - 1)
            .ok_or_else(|| GraphpackError::Internal(format!("Box id {id} out of range")))?;
        b.payload = Some(payload);
        Ok(())
    }

    /// Number of assigned boxes.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Emits the wire box list, ordered by id ascending.
    pub fn records_out(&self) -> Vec<BoxRecord> {
        self.boxes
            .iter()
            .map(|b| BoxRecord {
                type_metadata_id: b.type_metadata_id,
                payload: b.payload.clone(),
            })
            .collect()
    }
}

/// Deserialize-side shell slots, indexed by box id.
#[derive(Debug, Clone)]
pub(crate) enum ShellSlot {
    /// Not yet materialized.
    Empty,
    /// The box's type did not resolve; the object is absent.
    Absent,
    /// Materialized shell.
    Ready(Obj),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn scalar_keys_intern_by_value() {
        assert_eq!(ObjKey::of(&Obj::Int(1000)).unwrap(), ObjKey::of(&Obj::Int(1000)).unwrap());
        assert_ne!(ObjKey::of(&Obj::Int(5)).unwrap(), ObjKey::of(&Obj::Uint(5)).unwrap());
        let a: Rc<str> = Rc::from("hello");
        let b: Rc<str> = Rc::from("hello");
        assert_eq!(
            ObjKey::of(&Obj::Str(a)).unwrap(),
            ObjKey::of(&Obj::Str(b)).unwrap()
        );
    }

    #[test]
    fn dense_ids_start_at_one() {
        let mut table = BoxTable::new();
        let id = table.insert(ObjKey::of(&Obj::Int(1)).unwrap(), PendingBox::new(1));
        assert_eq!(id, 1);
        let id = table.insert(ObjKey::of(&Obj::Int(2)).unwrap(), PendingBox::new(1));
        assert_eq!(id, 2);
        assert!(table.get(0).is_err());
        assert!(table.get(3).is_err());
    }
}
