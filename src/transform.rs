//! Defines the `Transformer` trait: the per-type strategy seam.
//!
//! A transformer produces and consumes boxes for objects of one runtime
//! type. The mapper never inspects object internals itself; it dispatches to
//! the transformer selected by the registry and drives the walk through the
//! ids the transformer reports back.
//!
//! Work is split across four calls so that cyclic graphs survive:
//!
//! - [`create_box`](Transformer::create_box) / [`fill_box`](Transformer::fill_box)
//!   on the write side: the former reserves a box with its type metadata and
//!   an empty payload, the latter fills the payload and may discover children
//!   via [`Mapper::box_id_for`](crate::mapper::Mapper::box_id_for).
//! - [`to_object`](Transformer::to_object) / [`fill_from_box`](Transformer::fill_from_box)
//!   on the read side: the former returns a *shell* (identity plus intrinsic
//!   scalars), the latter wires references once every shell exists.
//!
//! A type that cannot participate in cycles may do all read-side work in
//! `to_object` and inherit the no-op `fill_from_box`.

use std::fmt;

use crate::bundle::{BoxPayload, BoxRecord};
use crate::error::Result;
use crate::guid::TypeGuid;
use crate::mapper::{Mapper, PendingBox};
use crate::object::Obj;

/// A per-type serialization strategy.
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Stable identity of this transformer, registered once.
    fn guid(&self) -> TypeGuid;

    /// Returns a partial box for `obj`: type metadata id set, payload empty.
    /// Must not walk the object's children here.
    fn create_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<PendingBox>;

    /// Produces the payload for `obj`, calling
    /// [`Mapper::box_id_for`](crate::mapper::Mapper::box_id_for) for each
    /// referenced child.
    fn fill_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<BoxPayload>;

    /// Reconstructs the shell for a box: an object of the correct runtime
    /// type whose reference-typed contents may still be null.
    fn to_object(&self, record: &BoxRecord, mapper: &mut Mapper) -> Result<Obj>;

    /// Populates references on a shell by resolving child box ids through
    /// [`Mapper::object_for`](crate::mapper::Mapper::object_for). Default is
    /// a no-op for cycle-free types.
    fn fill_from_box(&self, obj: &Obj, record: &BoxRecord, mapper: &mut Mapper) -> Result<()> {
        let _ = (obj, record, mapper);
        Ok(())
    }
}
