//! Type-metadata and member-layout encoding.
//!
//! Runtime types are never written to the wire by name. The metadata encoder
//! interns each *base* type (plain types, generic definitions, the array
//! pseudo-type) into the type-GUID table and describes constructed types as
//! recursive [`TypeMetadataRecord`]s over those base ids. The decoder
//! reverses the mapping, tolerating unknown GUIDs by resolving the affected
//! metadatas to the absent value.
//!
//! Member layouts give user records their wire shape: a GUID (stored as an
//! interned string), a parent layout link for the storable inheritance
//! chain, and the type's own member names. Instances store their values as a
//! parallel list of box ids against the flattened member list.

use std::collections::HashMap;
use std::rc::Rc;

use crate::bundle::{StorableTypeLayoutRecord, TypeMetadataRecord};
use crate::error::{GraphpackError, Result};
use crate::guid::TypeGuid;
use crate::index::{InterningIndex, XxBuildHasher};
use crate::object::{TypeHandle, TypeKind};
use crate::registry::{wellknown, Registry};

fn handle_addr(ty: &TypeHandle) -> usize {
    std::sync::Arc::as_ptr(ty) as usize
}

/// Serialize-side interner for base types, emitting the type-GUID table.
#[derive(Debug, Default)]
pub(crate) struct TypeTable {
    handles: Vec<TypeHandle>,
    by_ptr: HashMap<usize, u32, XxBuildHasher>,
}

impl TypeTable {
    fn index_of(&mut self, ty: &TypeHandle) -> u32 {
        if let Some(&id) = self.by_ptr.get(&handle_addr(ty)) {
            return id;
        }
        self.handles.push(ty.clone());
        let id = self.handles.len() as u32;
        self.by_ptr.insert(handle_addr(ty), id);
        id
    }

    fn guids(&self) -> Vec<TypeGuid> {
        self.handles.iter().map(|t| t.base_guid()).collect()
    }

    fn names(&self) -> Vec<String> {
        self.handles.iter().map(|t| t.name().to_string()).collect()
    }
}

/// Serialize-side type-metadata encoder.
#[derive(Debug)]
pub(crate) struct MetaEncoder {
    array_pseudo: TypeHandle,
    types: TypeTable,
    records: Vec<TypeMetadataRecord>,
    by_type: HashMap<usize, u32, XxBuildHasher>,
}

impl MetaEncoder {
    pub fn new(array_pseudo: TypeHandle) -> Self {
        Self {
            array_pseudo,
            types: TypeTable::default(),
            records: Vec::new(),
            by_type: HashMap::default(),
        }
    }

    /// Returns the metadata id for `ty`, constructing and interning the
    /// record on first encounter. A transformer id of 0 means "not yet
    /// supplied"; a later call that carries one backfills the cached record.
    pub fn metadata_id_for(&mut self, ty: &TypeHandle, transformer_id: u32) -> u32 {
        if let Some(&id) = self.by_type.get(&handle_addr(ty)) {
            let record = &mut self.records[id as usize - 1];
            if record.transformer_id == 0 && transformer_id != 0 {
                record.transformer_id = transformer_id;
            }
            return id;
        }

        let (type_id, generic_argument_ids) = match ty.kind() {
            TypeKind::Generic { definition, args } => {
                let base = self.types.index_of(definition);
                let arg_ids = args.iter().map(|a| self.metadata_id_for(a, 0)).collect();
                (base, arg_ids)
            }
            TypeKind::Array { elem } => {
                let pseudo = self.array_pseudo.clone();
                let base = self.types.index_of(&pseudo);
                let elem = elem.clone();
                (base, vec![self.metadata_id_for(&elem, 0)])
            }
            TypeKind::Plain => (self.types.index_of(ty), Vec::new()),
        };

        self.records.push(TypeMetadataRecord {
            type_id,
            generic_argument_ids,
            transformer_id,
        });
        let id = self.records.len() as u32;
        self.by_type.insert(handle_addr(ty), id);
        id
    }

    pub fn record(&self, id: u32) -> Result<&TypeMetadataRecord> {
        if id == 0 {
            return Err(GraphpackError::Decode("Type metadata id 0 is absent".into()));
        }
        self.records
            .get(id as usize - 1)
            .ok_or_else(|| GraphpackError::Decode(format!("Type metadata id {id} out of range")))
    }

    pub fn records_out(&self) -> Vec<TypeMetadataRecord> {
        self.records.clone()
    }

    pub fn type_guids(&self) -> Vec<TypeGuid> {
        self.types.guids()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types.names()
    }
}

#[derive(Debug, Clone)]
enum ResolveSlot {
    Unresolved,
    Visiting,
    Done(Option<TypeHandle>),
}

/// Deserialize-side type-metadata resolver.
#[derive(Debug)]
pub(crate) struct MetaDecoder {
    records: Vec<TypeMetadataRecord>,
    resolved: Vec<ResolveSlot>,
}

impl MetaDecoder {
    pub fn from_records(records: Vec<TypeMetadataRecord>) -> Self {
        let resolved = vec![ResolveSlot::Unresolved; records.len()];
        Self { records, resolved }
    }

    pub fn record(&self, id: u32) -> Result<&TypeMetadataRecord> {
        if id == 0 {
            return Err(GraphpackError::Decode("Type metadata id 0 is absent".into()));
        }
        self.records
            .get(id as usize - 1)
            .ok_or_else(|| GraphpackError::Decode(format!("Type metadata id {id} out of range")))
    }

    /// Resolves a metadata id back to a runtime type. Unknown base GUIDs
    /// yield `None`, and absence propagates: a generic whose argument is
    /// absent is itself absent. Cyclic metadata is structurally impossible
    /// in well-formed envelopes and is rejected.
    pub fn type_for(
        &mut self,
        id: u32,
        types: &[Option<TypeHandle>],
        registry: &Registry,
    ) -> Result<Option<TypeHandle>> {
        if id == 0 {
            return Err(GraphpackError::Decode("Type metadata id 0 is absent".into()));
        }
        let idx = id as usize - 1;
        match self.resolved.get(idx) {
            None => {
                return Err(GraphpackError::Decode(format!(
                    "Type metadata id {id} out of range"
                )))
            }
            Some(ResolveSlot::Done(ty)) => return Ok(ty.clone()),
            Some(ResolveSlot::Visiting) => {
                return Err(GraphpackError::Decode(format!(
                    "Type metadata id {id} participates in a cycle"
                )))
            }
            Some(ResolveSlot::Unresolved) => {}
        }
        self.resolved[idx] = ResolveSlot::Visiting;

        let record = self.records[idx].clone();
        let base = match record.type_id {
            0 => {
                return Err(GraphpackError::Decode(format!(
                    "Type metadata id {id} has no base type"
                )))
            }
            tid => types
                .get(tid as usize - 1)
                .ok_or_else(|| {
                    GraphpackError::Decode(format!("Type id {tid} out of range in metadata {id}"))
                })?
                .clone(),
        };

        let ty = match base {
            None => None,
            Some(base) => {
                if record.generic_argument_ids.is_empty() {
                    Some(base)
                } else {
                    let mut args = Vec::with_capacity(record.generic_argument_ids.len());
                    let mut absent = false;
                    for &arg_id in &record.generic_argument_ids {
                        match self.type_for(arg_id, types, registry)? {
                            Some(arg) => args.push(arg),
                            None => {
                                absent = true;
                                break;
                            }
                        }
                    }
                    if absent {
                        None
                    } else if base.base_guid() == wellknown::ARRAY && args.len() == 1 {
                        Some(registry.array_of(&args[0]))
                    } else {
                        Some(registry.generic(&base, &args))
                    }
                }
            }
        };

        self.resolved[idx] = ResolveSlot::Done(ty.clone());
        Ok(ty)
    }
}

/// Member layouts for storable user types; one per GUID per envelope.
#[derive(Debug, Default)]
pub(crate) struct LayoutTable {
    records: Vec<StorableTypeLayoutRecord>,
    by_guid: HashMap<TypeGuid, u32, XxBuildHasher>,
}

impl LayoutTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<StorableTypeLayoutRecord>) -> Self {
        Self {
            records,
            by_guid: HashMap::default(),
        }
    }

    /// Returns the layout id for a user-type GUID, lazily allocating an
    /// empty layout on first encounter. The second element is true when the
    /// layout was just created and still needs population.
    pub fn id_for(&mut self, guid: TypeGuid, guid_string_id: u32) -> (u32, bool) {
        if let Some(&id) = self.by_guid.get(&guid) {
            return (id, false);
        }
        self.records.push(StorableTypeLayoutRecord {
            type_guid_string_id: guid_string_id,
            parent_layout_id: 0,
            member_name_string_ids: Vec::new(),
        });
        let id = self.records.len() as u32;
        self.by_guid.insert(guid, id);
        (id, true)
    }

    /// Fills in the parent link and own member names of a freshly allocated
    /// layout.
    pub fn populate(&mut self, id: u32, parent_layout_id: u32, member_ids: Vec<u32>) -> Result<()> {
        let record = self
            .records
            .get_mut(id as usize - 1)
            .ok_or_else(|| GraphpackError::Internal(format!("Layout id {id} out of range")))?;
        record.parent_layout_id = parent_layout_id;
        record.member_name_string_ids = member_ids;
        Ok(())
    }

    pub fn record(&self, id: u32) -> Result<&StorableTypeLayoutRecord> {
        if id == 0 {
            return Err(GraphpackError::Decode("Layout id 0 is absent".into()));
        }
        self.records
            .get(id as usize - 1)
            .ok_or_else(|| GraphpackError::Decode(format!("Layout id {id} out of range")))
    }

    pub fn records_out(&self) -> Vec<StorableTypeLayoutRecord> {
        self.records.clone()
    }

    /// The flattened wire member list for a layout: ancestors' members
    /// first, each as `(declaring layout's GUID string id, name string id)`.
    pub fn flat_member_refs(&self, id: u32) -> Result<Vec<(u32, u32)>> {
        let mut chain = Vec::new();
        let mut cursor = id;
        while cursor != 0 {
            if chain.contains(&cursor) {
                return Err(GraphpackError::Decode(format!(
                    "Layout id {id} has a cyclic parent chain"
                )));
            }
            chain.push(cursor);
            cursor = self.record(cursor)?.parent_layout_id;
        }
        chain.reverse();

        let mut refs = Vec::new();
        for layout_id in chain {
            let record = self.record(layout_id)?;
            for &name_id in &record.member_name_string_ids {
                refs.push((record.type_guid_string_id, name_id));
            }
        }
        Ok(refs)
    }
}

/// Cache of canonical joined member keys (`"<guid>.<name>"`).
///
/// Member resolution during deserialization hits one joined key per wire
/// member per instance; caching on the `(guid string id, name string id)`
/// pair avoids re-allocating the key string for every instance.
#[derive(Debug, Default)]
pub(crate) struct MemberKeyCache {
    keys: HashMap<(u32, u32), Rc<str>, XxBuildHasher>,
}

impl MemberKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached joined key for a `(guid string id, name string
    /// id)` pair, building it on first use.
    pub fn joined(
        &mut self,
        guid_string_id: u32,
        name_string_id: u32,
        strings: &InterningIndex<String>,
    ) -> Result<Rc<str>> {
        if let Some(key) = self.keys.get(&(guid_string_id, name_string_id)) {
            return Ok(key.clone());
        }
        let guid = strings.value_of(guid_string_id)?;
        let name = strings.value_of(name_string_id)?;
        let key: Rc<str> = Rc::from(format!("{guid}.{name}"));
        self.keys.insert((guid_string_id, name_string_id), key.clone());
        Ok(key)
    }
}
