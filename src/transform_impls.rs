//! Built-in transformers for the core object shapes.
//!
//! Scalars do all their work in `to_object` (they cannot participate in
//! cycles); sequences, maps, and reference arrays split shell construction
//! from reference wiring; primitive arrays inline their elements as typed
//! payloads and reconstruct whole in phase A.

use std::rc::Rc;

use crate::bundle::{
    ArrayMetadataRecord, BoxPayload, BoxRecord, MemberValue, RepeatedPayload, RepeatedValue,
    ScalarValue,
};
use crate::error::{GraphpackError, Result};
use crate::guid::TypeGuid;
use crate::mapper::{Mapper, PendingBox};
use crate::object::{ArrayObj, MapObj, Obj, SeqObj, TypeKind};
use crate::registry::wellknown;
use crate::transform::Transformer;

/// Stable GUIDs of the built-in transformers.
pub mod guids {
    use crate::guid::TypeGuid;

    /// Scalar transformer (bool, ints, floats, strings, blobs).
    pub const SCALAR: TypeGuid = TypeGuid::from_u128(0x3d48_7be0_52c6_4f02_9b11_78aa_e4c5_2001);
    /// Sequence transformer (`List<T>`).
    pub const SEQUENCE: TypeGuid = TypeGuid::from_u128(0x3d48_7be0_52c6_4f02_9b11_78aa_e4c5_2002);
    /// Map transformer (`Map<K, V>`).
    pub const MAP: TypeGuid = TypeGuid::from_u128(0x3d48_7be0_52c6_4f02_9b11_78aa_e4c5_2003);
    /// Array transformer.
    pub const ARRAY: TypeGuid = TypeGuid::from_u128(0x3d48_7be0_52c6_4f02_9b11_78aa_e4c5_2004);
    /// User-record transformer.
    pub const RECORD: TypeGuid = TypeGuid::from_u128(0x3d48_7be0_52c6_4f02_9b11_78aa_e4c5_2005);
}

fn scalar_of(record: &BoxRecord) -> Result<&ScalarValue> {
    match &record.payload {
        Some(BoxPayload::Scalar(v)) => Ok(v),
        _ => Err(GraphpackError::Decode(
            "Expected a scalar payload on this box".into(),
        )),
    }
}

fn repeated_of(record: &BoxRecord) -> Result<&RepeatedValue> {
    match &record.payload {
        Some(BoxPayload::Repeated(v)) => Ok(v),
        _ => Err(GraphpackError::Decode(
            "Expected a repeated payload on this box".into(),
        )),
    }
}

fn members_of(record: &BoxRecord) -> Result<&MemberValue> {
    match &record.payload {
        Some(BoxPayload::Members(v)) => Ok(v),
        _ => Err(GraphpackError::Decode(
            "Expected a member payload on this box".into(),
        )),
    }
}

/// Transformer for value scalars and byte blobs.
#[derive(Debug)]
pub struct ScalarTransformer;

impl Transformer for ScalarTransformer {
    fn guid(&self) -> TypeGuid {
        guids::SCALAR
    }

    fn create_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<PendingBox> {
        let registry = mapper.registry().clone();
        let ty = registry.runtime_type_of(obj)?;
        let metadata_id = mapper.metadata_id_for(&ty, Some(self.guid()))?;
        Ok(PendingBox::new(metadata_id))
    }

    fn fill_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<BoxPayload> {
        let value = match obj {
            Obj::Bool(b) => ScalarValue::Uint(u64::from(*b)),
            Obj::Int(v) if *v >= 0 => ScalarValue::Int(*v),
            Obj::Int(v) => ScalarValue::Zig(*v),
            Obj::Uint(v) => ScalarValue::Uint(*v),
            Obj::Float(v) => {
                let narrow = *v as f32;
                if f64::from(narrow).to_bits() == v.to_bits() {
                    ScalarValue::Float(narrow)
                } else {
                    ScalarValue::Double(*v)
                }
            }
            Obj::Str(s) => ScalarValue::Uint(u64::from(mapper.intern_string(s))),
            Obj::Bytes(b) => ScalarValue::Bytes(b.to_vec()),
            other => {
                return Err(GraphpackError::Internal(format!(
                    "Scalar transformer asked to fill {other:?}"
                )))
            }
        };
        Ok(BoxPayload::Scalar(value))
    }

    fn to_object(&self, record: &BoxRecord, mapper: &mut Mapper) -> Result<Obj> {
        let ty = mapper.type_for(record.type_metadata_id)?.ok_or_else(|| {
            GraphpackError::Internal("Scalar box reached to_object with an absent type".into())
        })?;
        let value = scalar_of(record)?.clone();
        let guid = ty.base_guid();
        let obj = if guid == wellknown::BOOL {
            match value {
                ScalarValue::Uint(0) => Obj::Bool(false),
                ScalarValue::Uint(1) => Obj::Bool(true),
                _ => return Err(GraphpackError::Decode("Malformed boolean scalar".into())),
            }
        } else if guid == wellknown::INT {
            match value {
                ScalarValue::Int(v) | ScalarValue::Zig(v) => Obj::Int(v),
                _ => return Err(GraphpackError::Decode("Malformed integer scalar".into())),
            }
        } else if guid == wellknown::UINT {
            match value {
                ScalarValue::Uint(v) => Obj::Uint(v),
                _ => return Err(GraphpackError::Decode("Malformed unsigned scalar".into())),
            }
        } else if guid == wellknown::FLOAT {
            match value {
                ScalarValue::Float(v) => Obj::Float(f64::from(v)),
                ScalarValue::Double(v) => Obj::Float(v),
                _ => return Err(GraphpackError::Decode("Malformed float scalar".into())),
            }
        } else if guid == wellknown::STRING {
            match value {
                ScalarValue::Uint(id) => {
                    let id = u32::try_from(id).map_err(|_| {
                        GraphpackError::Decode("String id exceeds the string table range".into())
                    })?;
                    Obj::Str(Rc::from(mapper.string(id)?))
                }
                _ => return Err(GraphpackError::Decode("Malformed string scalar".into())),
            }
        } else if guid == wellknown::BYTES {
            match value {
                ScalarValue::Bytes(v) => Obj::Bytes(Rc::from(v)),
                _ => return Err(GraphpackError::Decode("Malformed byte-blob scalar".into())),
            }
        } else {
            return Err(GraphpackError::Decode(format!(
                "Scalar transformer cannot rebuild type {}",
                ty.name()
            )));
        };
        Ok(obj)
    }
}

/// Transformer for generic sequence containers.
#[derive(Debug)]
pub struct SequenceTransformer;

impl Transformer for SequenceTransformer {
    fn guid(&self) -> TypeGuid {
        guids::SEQUENCE
    }

    fn create_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<PendingBox> {
        let seq = obj.as_seq().ok_or_else(|| {
            GraphpackError::Internal("Sequence transformer on a non-sequence".into())
        })?;
        let metadata_id = mapper.metadata_id_for(seq.ty(), Some(self.guid()))?;
        Ok(PendingBox::new(metadata_id))
    }

    fn fill_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<BoxPayload> {
        let seq = obj.as_seq().ok_or_else(|| {
            GraphpackError::Internal("Sequence transformer on a non-sequence".into())
        })?;
        let items = seq.items.borrow().clone();
        let mut ids = Vec::with_capacity(items.len());
        for item in &items {
            ids.push(mapper.box_id_for(item)?);
        }
        Ok(BoxPayload::Repeated(RepeatedValue::plain(
            RepeatedPayload::BoxIds(ids),
        )))
    }

    fn to_object(&self, record: &BoxRecord, mapper: &mut Mapper) -> Result<Obj> {
        let ty = mapper.type_for(record.type_metadata_id)?.ok_or_else(|| {
            GraphpackError::Internal("Sequence box reached to_object with an absent type".into())
        })?;
        let repeated = repeated_of(record)?;
        let len = match &repeated.payload {
            RepeatedPayload::BoxIds(ids) => ids.len(),
            _ => {
                return Err(GraphpackError::Decode(
                    "Sequence payload must reference elements by box id".into(),
                ))
            }
        };
        Ok(Obj::Seq(SeqObj::new(ty, vec![Obj::Null; len])))
    }

    fn fill_from_box(&self, obj: &Obj, record: &BoxRecord, mapper: &mut Mapper) -> Result<()> {
        let seq = obj.as_seq().ok_or_else(|| {
            GraphpackError::Internal("Sequence transformer on a non-sequence".into())
        })?;
        let ids = match &repeated_of(record)?.payload {
            RepeatedPayload::BoxIds(ids) => ids.clone(),
            _ => {
                return Err(GraphpackError::Decode(
                    "Sequence payload must reference elements by box id".into(),
                ))
            }
        };
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            resolved.push(mapper.object_for(id)?);
        }
        *seq.items.borrow_mut() = resolved;
        Ok(())
    }
}

/// Transformer for keyed containers. Entries are stored as interleaved
/// key/value box ids; an attached comparer rides in the dedicated wire
/// slots.
#[derive(Debug)]
pub struct MapTransformer;

impl Transformer for MapTransformer {
    fn guid(&self) -> TypeGuid {
        guids::MAP
    }

    fn create_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<PendingBox> {
        let map = obj
            .as_map()
            .ok_or_else(|| GraphpackError::Internal("Map transformer on a non-map".into()))?;
        let metadata_id = mapper.metadata_id_for(map.ty(), Some(self.guid()))?;
        Ok(PendingBox::new(metadata_id))
    }

    fn fill_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<BoxPayload> {
        let map = obj
            .as_map()
            .ok_or_else(|| GraphpackError::Internal("Map transformer on a non-map".into()))?;
        let entries = map.entries.borrow().clone();
        let mut ids = Vec::with_capacity(entries.len() * 2);
        for (key, value) in &entries {
            ids.push(mapper.box_id_for(key)?);
            ids.push(mapper.box_id_for(value)?);
        }
        let comparer = map.comparer.borrow().clone();
        let (comparer_box_id, comparer_type_metadata_id) = if comparer.is_null() {
            (0, 0)
        } else {
            let box_id = mapper.box_id_for(&comparer)?;
            (box_id, mapper.box_type_metadata_id(box_id)?)
        };
        Ok(BoxPayload::Repeated(RepeatedValue {
            payload: RepeatedPayload::BoxIds(ids),
            comparer_box_id,
            comparer_type_metadata_id,
            array_metadata_id: 0,
        }))
    }

    fn to_object(&self, record: &BoxRecord, mapper: &mut Mapper) -> Result<Obj> {
        let ty = mapper.type_for(record.type_metadata_id)?.ok_or_else(|| {
            GraphpackError::Internal("Map box reached to_object with an absent type".into())
        })?;
        match &repeated_of(record)?.payload {
            RepeatedPayload::BoxIds(ids) if ids.len() % 2 == 0 => {}
            RepeatedPayload::BoxIds(_) => {
                return Err(GraphpackError::Decode(
                    "Map payload holds an odd number of box ids".into(),
                ))
            }
            _ => {
                return Err(GraphpackError::Decode(
                    "Map payload must reference entries by box id".into(),
                ))
            }
        }
        Ok(Obj::Map(MapObj::new(ty, Vec::new())))
    }

    fn fill_from_box(&self, obj: &Obj, record: &BoxRecord, mapper: &mut Mapper) -> Result<()> {
        let map = obj
            .as_map()
            .ok_or_else(|| GraphpackError::Internal("Map transformer on a non-map".into()))?;
        let repeated = repeated_of(record)?.clone();
        let ids = match repeated.payload {
            RepeatedPayload::BoxIds(ids) => ids,
            _ => {
                return Err(GraphpackError::Decode(
                    "Map payload must reference entries by box id".into(),
                ))
            }
        };
        let mut entries = Vec::with_capacity(ids.len() / 2);
        for pair in ids.chunks_exact(2) {
            entries.push((mapper.object_for(pair[0])?, mapper.object_for(pair[1])?));
        }
        *map.entries.borrow_mut() = entries;
        if repeated.comparer_box_id != 0 {
            *map.comparer.borrow_mut() = mapper.object_for(repeated.comparer_box_id)?;
        }
        Ok(())
    }
}

/// Transformer for arrays of any rank.
///
/// Primitive element types inline their values as a typed payload and
/// rebuild whole during phase A; everything else stores box ids and wires
/// elements in phase B.
#[derive(Debug)]
pub struct ArrayTransformer;

impl Transformer for ArrayTransformer {
    fn guid(&self) -> TypeGuid {
        guids::ARRAY
    }

    fn create_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<PendingBox> {
        let arr = obj
            .as_array()
            .ok_or_else(|| GraphpackError::Internal("Array transformer on a non-array".into()))?;
        let metadata_id = mapper.metadata_id_for(arr.ty(), Some(self.guid()))?;
        Ok(PendingBox::new(metadata_id))
    }

    fn fill_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<BoxPayload> {
        let arr = obj
            .as_array()
            .ok_or_else(|| GraphpackError::Internal("Array transformer on a non-array".into()))?;
        let array_metadata_id = mapper.intern_array_metadata(ArrayMetadataRecord {
            rank: arr.rank(),
            lengths: arr.lengths().to_vec(),
            lower_bounds: arr.lower_bounds().to_vec(),
        });
        let items = arr.items.borrow().clone();
        let elem = arr.elem_ty().clone();
        let guid = elem.base_guid();

        let payload = if elem.is_plain() && guid == wellknown::INT {
            RepeatedPayload::Ints(collect_prim(&items, Obj::as_int, "i64")?)
        } else if elem.is_plain() && guid == wellknown::UINT {
            RepeatedPayload::Uints(collect_prim(&items, Obj::as_uint, "u64")?)
        } else if elem.is_plain() && guid == wellknown::FLOAT {
            RepeatedPayload::Doubles(collect_prim(&items, Obj::as_float, "f64")?)
        } else if elem.is_plain() && guid == wellknown::BOOL {
            RepeatedPayload::Bools(collect_prim(&items, Obj::as_bool, "bool")?)
        } else {
            let mut ids = Vec::with_capacity(items.len());
            for item in &items {
                ids.push(mapper.box_id_for(item)?);
            }
            RepeatedPayload::BoxIds(ids)
        };

        Ok(BoxPayload::Repeated(RepeatedValue {
            payload,
            comparer_box_id: 0,
            comparer_type_metadata_id: 0,
            array_metadata_id,
        }))
    }

    fn to_object(&self, record: &BoxRecord, mapper: &mut Mapper) -> Result<Obj> {
        let ty = mapper.type_for(record.type_metadata_id)?.ok_or_else(|| {
            GraphpackError::Internal("Array box reached to_object with an absent type".into())
        })?;
        if !matches!(ty.kind(), TypeKind::Array { .. }) {
            return Err(GraphpackError::Decode(format!(
                "Array transformer on non-array type {}",
                ty.name()
            )));
        }
        let repeated = repeated_of(record)?;
        if repeated.array_metadata_id == 0 {
            return Err(GraphpackError::Decode(
                "Array box is missing its array metadata".into(),
            ));
        }
        let meta = mapper.array_metadata(repeated.array_metadata_id)?;
        if meta.rank as usize != meta.lengths.len() {
            return Err(GraphpackError::Decode(
                "Array metadata rank does not match its lengths".into(),
            ));
        }
        if meta.element_count() != repeated.payload.len() as u64 {
            return Err(GraphpackError::Decode(
                "Array payload length does not match its shape".into(),
            ));
        }

        let items: Vec<Obj> = match &repeated.payload {
            RepeatedPayload::Ints(v) => v.iter().map(|&x| Obj::Int(x)).collect(),
            RepeatedPayload::Uints(v) => v.iter().map(|&x| Obj::Uint(x)).collect(),
            RepeatedPayload::Doubles(v) => v.iter().map(|&x| Obj::Float(x)).collect(),
            RepeatedPayload::Bools(v) => v.iter().map(|&x| Obj::Bool(x)).collect(),
            RepeatedPayload::BoxIds(ids) => vec![Obj::Null; ids.len()],
        };
        let arr = ArrayObj::new(ty, meta.lengths, meta.lower_bounds, items)
            .map_err(|e| GraphpackError::Decode(e.to_string()))?;
        Ok(Obj::Array(arr))
    }

    fn fill_from_box(&self, obj: &Obj, record: &BoxRecord, mapper: &mut Mapper) -> Result<()> {
        let arr = obj
            .as_array()
            .ok_or_else(|| GraphpackError::Internal("Array transformer on a non-array".into()))?;
        if let RepeatedPayload::BoxIds(ids) = &repeated_of(record)?.payload {
            let ids = ids.clone();
            let mut resolved = Vec::with_capacity(ids.len());
            for id in ids {
                resolved.push(mapper.object_for(id)?);
            }
            *arr.items.borrow_mut() = resolved;
        }
        Ok(())
    }
}

fn collect_prim<T>(
    items: &[Obj],
    extract: impl Fn(&Obj) -> Option<T>,
    expected: &str,
) -> Result<Vec<T>> {
    items
        .iter()
        .map(|item| {
            extract(item).ok_or_else(|| {
                GraphpackError::Internal(format!(
                    "Array element {item:?} does not match the {expected} element type"
                ))
            })
        })
        .collect()
}

/// Transformer for storable user records.
#[derive(Debug)]
pub struct RecordTransformer;

impl Transformer for RecordTransformer {
    fn guid(&self) -> TypeGuid {
        guids::RECORD
    }

    fn create_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<PendingBox> {
        let rec = obj
            .as_record()
            .ok_or_else(|| GraphpackError::Internal("Record transformer on a non-record".into()))?;
        let metadata_id = mapper.metadata_id_for(rec.ty(), Some(self.guid()))?;
        Ok(PendingBox::new(metadata_id))
    }

    fn fill_box(&self, obj: &Obj, mapper: &mut Mapper) -> Result<BoxPayload> {
        let rec = obj
            .as_record()
            .ok_or_else(|| GraphpackError::Internal("Record transformer on a non-record".into()))?;
        let registry = mapper.registry().clone();
        let schema = registry.schema_for(rec.ty().base_guid()).ok_or_else(|| {
            GraphpackError::Internal(format!("No schema registered for {}", rec.ty().name()))
        })?;
        let layout_id = mapper.layout_id_for_schema(&schema)?;

        let arity = rec.fields.borrow().len();
        if arity != schema.arity() {
            return Err(GraphpackError::Internal(format!(
                "Instance of {} has {} members, schema expects {}",
                rec.ty().name(),
                arity,
                schema.arity()
            )));
        }
        let mut value_box_ids = Vec::with_capacity(arity);
        for member in schema.members() {
            let value = member.get(rec);
            value_box_ids.push(mapper.box_id_for(&value)?);
        }
        Ok(BoxPayload::Members(MemberValue {
            storable_type_metadata_id: layout_id,
            value_box_ids,
        }))
    }

    fn to_object(&self, record: &BoxRecord, mapper: &mut Mapper) -> Result<Obj> {
        let ty = mapper.type_for(record.type_metadata_id)?.ok_or_else(|| {
            GraphpackError::Internal("Record box reached to_object with an absent type".into())
        })?;
        let registry = mapper.registry().clone();
        let schema = registry.schema_for(ty.base_guid()).ok_or_else(|| {
            GraphpackError::Decode(format!("No schema registered for {}", ty.name()))
        })?;
        schema
            .construct()
            .map_err(|e| GraphpackError::Construction(format!("{}: {e}", ty.name())))
    }

    fn fill_from_box(&self, obj: &Obj, record: &BoxRecord, mapper: &mut Mapper) -> Result<()> {
        let rec = obj
            .as_record()
            .ok_or_else(|| GraphpackError::Internal("Record transformer on a non-record".into()))?;
        let members = members_of(record)?.clone();
        let registry = mapper.registry().clone();
        let schema = registry.schema_for(rec.ty().base_guid()).ok_or_else(|| {
            GraphpackError::Decode(format!("No schema registered for {}", rec.ty().name()))
        })?;

        let refs = mapper.flat_member_refs(members.storable_type_metadata_id)?;
        if refs.len() != members.value_box_ids.len() {
            return Err(GraphpackError::Decode(format!(
                "Layout {} names {} members but the box stores {} values",
                members.storable_type_metadata_id,
                refs.len(),
                members.value_box_ids.len()
            )));
        }
        for (i, (guid_sid, name_sid)) in refs.iter().enumerate() {
            let key = mapper.member_joined_key(*guid_sid, *name_sid)?;
            // Members renamed or removed since the envelope was written are
            // skipped; name-keyed lookup is the versioning affordance.
            let Some(slot) = schema.slot_of_key(&key) else { continue };
            let value = mapper.object_for(members.value_box_ids[i])?;
            if let Some(member) = schema.members().get(slot) {
                member.set(rec, value);
            }
        }
        Ok(())
    }
}
