//! The mapping engine: discovery walk and two-phase reconstruction.
//!
//! One [`Mapper`] drives one serialization *or* one deserialization. Its
//! interning tables are created empty at construction, accumulate
//! monotonically during the session, and die with the mapper. The mapper is
//! single-threaded; the only suspension point is the cancellation check
//! between queue items and boxes.
//!
//! ## Serialization
//!
//! [`serialize_graph`](Mapper::serialize_graph) performs a breadth-first
//! discovery walk. Assigning a box id enqueues the object; draining the
//! queue asks each object's transformer to fill its box, which may assign
//! ids to children and thereby extend the queue. Box ids therefore equal
//! order of first discovery, which is part of the contract.
//!
//! ## Deserialization
//!
//! [`deserialize_graph`](Mapper::deserialize_graph) reconstructs in two
//! phases. Phase A walks box ids in reverse and builds a *shell* per box —
//! an object with the right identity but unpopulated references. Phase B
//! walks again and asks each transformer to wire references, which can now
//! all be resolved. This is what lets cycles survive: a container holding a
//! forward reference never has to recurse into an unfinished ancestor.
//! Post-deserialization hooks run last, in discovery order.

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::boxes::{BoxTable, ObjKey, ShellSlot};
use crate::bundle::{ArrayMetadataRecord, BoxRecord, Bundle, StorableTypeLayoutRecord};
use crate::cancel::CancelToken;
use crate::error::{GraphpackError, Result};
use crate::guid::TypeGuid;
use crate::index::InterningIndex;
use crate::meta::{LayoutTable, MemberKeyCache, MetaDecoder, MetaEncoder};
use crate::object::{Obj, TypeHandle};
use crate::registry::{RecordSchema, Registry};
use crate::transform::Transformer;

pub use crate::boxes::PendingBox;

/// Outcome of one serialization walk.
#[derive(Debug, Clone)]
pub struct MapInfo {
    /// Wall-clock time of the walk.
    pub duration: Duration,
    /// Number of boxed objects.
    pub object_count: usize,
    /// Names of the base types encountered, in interning order.
    pub type_names: Vec<String>,
    /// False when cancellation stopped the walk early; the envelope is then
    /// possibly incomplete.
    pub completed: bool,
}

/// Outcome of one deserialization.
#[derive(Debug, Clone)]
pub struct UnmapInfo {
    /// Wall-clock time of the reconstruction.
    pub duration: Duration,
    /// Number of materialized objects.
    pub object_count: usize,
    /// GUIDs present in the envelope but absent from the registry. Boxes of
    /// these types were mapped to the absent value.
    pub unknown_type_guids: Vec<TypeGuid>,
    /// False when cancellation stopped reconstruction early.
    pub completed: bool,
}

/// The object-graph mapper. See the module docs for the driving algorithms.
pub struct Mapper {
    registry: Arc<Registry>,
    cancel: CancelToken,
    strings: InterningIndex<String>,
    array_metas: InterningIndex<ArrayMetadataRecord>,
    layouts: LayoutTable,
    transformer_guids: InterningIndex<TypeGuid>,
    transformer_impls: Vec<Arc<dyn Transformer>>,
    // Write side.
    meta: MetaEncoder,
    boxes: BoxTable,
    queue: VecDeque<(Obj, u32)>,
    // Read side.
    decoder: Option<MetaDecoder>,
    types: Vec<Option<TypeHandle>>,
    wire_boxes: Vec<Rc<BoxRecord>>,
    shells: Vec<ShellSlot>,
    created_order: Vec<u32>,
    member_keys: MemberKeyCache,
    unknown_type_guids: Vec<TypeGuid>,
}

impl Mapper {
    /// Creates a mapper over the process-wide registry.
    pub fn new() -> Self {
        Self::with_registry(Registry::global())
    }

    /// Creates a mapper over an explicit registry.
    pub fn with_registry(registry: Arc<Registry>) -> Self {
        let array_pseudo = registry.builtins().array_ty;
        Self {
            registry,
            cancel: CancelToken::new(),
            strings: InterningIndex::new(),
            array_metas: InterningIndex::new(),
            layouts: LayoutTable::new(),
            transformer_guids: InterningIndex::new(),
            transformer_impls: Vec::new(),
            meta: MetaEncoder::new(array_pseudo),
            boxes: BoxTable::new(),
            queue: VecDeque::new(),
            decoder: None,
            types: Vec::new(),
            wire_boxes: Vec::new(),
            shells: Vec::new(),
            created_order: Vec::new(),
            member_keys: MemberKeyCache::new(),
            unknown_type_guids: Vec::new(),
        }
    }

    /// Attaches a cancellation token. Builder-style.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// The registry this mapper resolves types against.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // --- C5: box table operations -------------------------------------

    /// Returns the box id for an object, assigning a fresh id and enqueuing
    /// the object on first discovery. The null reference is id 0.
    pub fn box_id_for(&mut self, obj: &Obj) -> Result<u32> {
        if obj.is_null() {
            return Ok(0);
        }
        let key = ObjKey::of(obj)?;
        if let Some(id) = self.boxes.lookup(&key) {
            return Ok(id);
        }
        let ty = self.registry.runtime_type_of(obj)?;
        let info = self.registry.type_info(&ty);
        let transformer = info
            .transformer
            .ok_or_else(|| GraphpackError::Unserializable(ty.name().to_string()))?;
        let pending = transformer.create_box(obj, self)?;
        let id = self.boxes.insert(key, pending);
        trace!(box_id = id, ty = ty.name(), "discovered object");
        self.queue.push_back((obj.clone(), id));
        Ok(id)
    }

    /// Reads an assigned box. Total on ids handed out by
    /// [`box_id_for`](Self::box_id_for).
    pub fn box_for(&self, id: u32) -> Result<PendingBox> {
        self.boxes.get(id).cloned()
    }

    /// The type metadata id recorded on an assigned box.
    pub fn box_type_metadata_id(&self, id: u32) -> Result<u32> {
        Ok(self.boxes.get(id)?.type_metadata_id)
    }

    /// Lazily materializes the object for a box id during deserialization.
    /// Id 0 is the null reference; boxes of unresolved types yield null.
    pub fn object_for(&mut self, id: u32) -> Result<Obj> {
        if id == 0 {
            return Ok(Obj::Null);
        }
        let idx = id as usize - 1;
        match self.shells.get(idx) {
            None => {
                return Err(GraphpackError::Decode(format!("Box id {id} out of range")))
            }
            Some(ShellSlot::Ready(obj)) => return Ok(obj.clone()),
            Some(ShellSlot::Absent) => return Ok(Obj::Null),
            Some(ShellSlot::Empty) => {}
        }
        let record = self.wire_boxes[idx].clone();
        if self.type_for(record.type_metadata_id)?.is_none() {
            self.shells[idx] = ShellSlot::Absent;
            return Ok(Obj::Null);
        }
        let transformer = self.transformer_for_record(&record)?;
        let obj = transformer.to_object(&record, self)?;
        self.shells[idx] = ShellSlot::Ready(obj.clone());
        self.created_order.push(id);
        Ok(obj)
    }

    // --- Interning surfaces used by transformers ----------------------

    /// Interns a transformer GUID, keeping the implementation list aligned
    /// with the id sequence.
    pub fn transformer_id_for(&mut self, guid: TypeGuid) -> Result<u32> {
        let id = self.transformer_guids.index_of(&guid);
        if id as usize > self.transformer_impls.len() {
            let tf = self.registry.transformer_for(guid).ok_or_else(|| {
                GraphpackError::Internal(format!("Transformer {guid} is not registered"))
            })?;
            self.transformer_impls.push(tf);
        }
        Ok(id)
    }

    /// Returns the type metadata id for a runtime type, interning base types
    /// and the supplied transformer on first encounter. A transformer given
    /// now backfills a record interned earlier without one.
    pub fn metadata_id_for(
        &mut self,
        ty: &TypeHandle,
        transformer: Option<TypeGuid>,
    ) -> Result<u32> {
        let tid = match transformer {
            Some(guid) => self.transformer_id_for(guid)?,
            None => 0,
        };
        Ok(self.meta.metadata_id_for(ty, tid))
    }

    /// Resolves a type metadata id back to a runtime type during
    /// deserialization. `None` means the base GUID (or a dependency's) is
    /// not registered.
    pub fn type_for(&mut self, metadata_id: u32) -> Result<Option<TypeHandle>> {
        let decoder = self.decoder.as_mut().ok_or_else(|| {
            GraphpackError::Internal("type_for is a deserialization-side operation".into())
        })?;
        decoder.type_for(metadata_id, &self.types, &self.registry)
    }

    /// Interns a string value.
    pub fn intern_string(&mut self, s: &str) -> u32 {
        self.strings.index_of(&s.to_string())
    }

    /// Reads an interned string.
    pub fn string(&self, id: u32) -> Result<String> {
        self.strings.value_of(id).cloned()
    }

    /// Interns an array shape on the full (rank, lengths, lower_bounds)
    /// tuple so coinciding shapes share one record.
    pub fn intern_array_metadata(&mut self, meta: ArrayMetadataRecord) -> u32 {
        self.array_metas.index_of(&meta)
    }

    /// Reads an interned array shape.
    pub fn array_metadata(&self, id: u32) -> Result<ArrayMetadataRecord> {
        self.array_metas.value_of(id).cloned()
    }

    /// Ensures the layout chain for a record schema exists and is
    /// populated; returns the layout id. Ancestors get their own layouts,
    /// linked through `parent_layout_id`.
    pub fn layout_id_for_schema(&mut self, schema: &Arc<RecordSchema>) -> Result<u32> {
        let parent_id = match schema.ancestry().last() {
            Some(parent) => self.layout_id_for_schema(parent)?,
            None => 0,
        };
        let guid = schema.guid();
        let guid_sid = self.strings.index_of(&guid.hyphenated());
        let (id, fresh) = self.layouts.id_for(guid, guid_sid);
        if fresh {
            let member_ids: Vec<u32> = schema
                .own_members()
                .iter()
                .map(|name| self.strings.index_of(name))
                .collect();
            self.layouts.populate(id, parent_id, member_ids)?;
        }
        Ok(id)
    }

    /// Reads a layout record.
    pub fn layout(&self, id: u32) -> Result<StorableTypeLayoutRecord> {
        self.layouts.record(id).cloned()
    }

    /// The flattened wire member list of a layout, ancestors first, as
    /// `(declaring GUID string id, member name string id)` pairs.
    pub fn flat_member_refs(&self, layout_id: u32) -> Result<Vec<(u32, u32)>> {
        self.layouts.flat_member_refs(layout_id)
    }

    /// Cached canonical joined key for a member reference.
    pub fn member_joined_key(&mut self, guid_sid: u32, name_sid: u32) -> Result<Rc<str>> {
        self.member_keys.joined(guid_sid, name_sid, &self.strings)
    }

    // --- C6: serialization driver -------------------------------------

    /// Maps an object graph into an envelope.
    ///
    /// Returns the bundle and an info record. When the cancellation token
    /// fires mid-walk the envelope is returned as-is (possibly incomplete)
    /// with `completed == false`; cancellation is not an error.
    pub fn serialize_graph(&mut self, root: &Obj) -> Result<(Bundle, MapInfo)> {
        self.registry.update_registered_types()?;
        let start = Instant::now();
        debug!("starting discovery walk");

        let root_box_id = self.box_id_for(root)?;

        let mut completed = true;
        while let Some((obj, id)) = self.queue.pop_front() {
            if self.cancel.is_cancelled() {
                debug!(box_id = id, "walk cancelled; returning partial envelope");
                completed = false;
                break;
            }
            let metadata_id = self.boxes.get(id)?.type_metadata_id;
            let transformer_id = self.meta.record(metadata_id)?.transformer_id;
            let transformer = self.transformer_impl(transformer_id)?;
            let payload = transformer.fill_box(&obj, self)?;
            self.boxes.set_payload(id, payload)?;
        }

        let bundle = Bundle {
            transformer_guids: self.transformer_guids.values().to_vec(),
            type_guids: self.meta.type_guids(),
            root_box_id,
            boxes: self.boxes.records_out(),
            strings: self.strings.values().to_vec(),
            storable_type_metadata: self.layouts.records_out(),
            type_metadata: self.meta.records_out(),
            array_metadata: self.array_metas.values().to_vec(),
        };
        let info = MapInfo {
            duration: start.elapsed(),
            object_count: self.boxes.len(),
            type_names: self.meta.type_names(),
            completed,
        };
        debug!(
            objects = info.object_count,
            completed = info.completed,
            "discovery walk finished"
        );
        Ok((bundle, info))
    }

    // --- C7: deserialization driver -----------------------------------

    /// Reconstructs an object graph from an envelope.
    ///
    /// Unknown type GUIDs are tolerated: affected boxes map to the absent
    /// value and the GUIDs are reported on the info record. Cancellation
    /// returns `(None, info)` with `completed == false`.
    pub fn deserialize_graph(&mut self, bundle: &Bundle) -> Result<(Option<Obj>, UnmapInfo)> {
        self.registry.update_registered_types()?;
        let start = Instant::now();

        // Unknown transformer GUIDs are not legal: without the transformer
        // there is no way to interpret any box that names it.
        let mut impls = Vec::with_capacity(bundle.transformer_guids.len());
        for guid in &bundle.transformer_guids {
            let tf = self.registry.transformer_for(*guid).ok_or_else(|| {
                GraphpackError::Decode(format!("Unknown transformer GUID {guid}"))
            })?;
            impls.push(tf);
        }
        self.transformer_impls = impls;

        // Unknown type GUIDs leave absent slots and are reported.
        let mut types = Vec::with_capacity(bundle.type_guids.len());
        for guid in &bundle.type_guids {
            let ty = self.registry.try_type_for(*guid);
            if ty.is_none() {
                warn!(%guid, "unknown type GUID in envelope");
                self.unknown_type_guids.push(*guid);
            }
            types.push(ty);
        }
        self.types = types;

        self.strings = InterningIndex::from_values(bundle.strings.clone());
        self.array_metas = InterningIndex::from_values(bundle.array_metadata.clone());
        self.layouts = LayoutTable::from_records(bundle.storable_type_metadata.clone());
        self.decoder = Some(MetaDecoder::from_records(bundle.type_metadata.clone()));
        self.wire_boxes = bundle.boxes.iter().cloned().map(Rc::new).collect();
        self.shells = vec![ShellSlot::Empty; bundle.boxes.len()];

        let n = self.wire_boxes.len() as u32;

        // Phase A: construct every shell, reverse id order so leaf-heavy
        // graphs do not deepen the stack through to_object cascades.
        for id in (1..=n).rev() {
            if self.cancel.is_cancelled() {
                return Ok((None, self.partial_unmap_info(start)));
            }
            self.object_for(id)?;
        }

        // Phase B: wire references; every child id now resolves.
        for id in (1..=n).rev() {
            if self.cancel.is_cancelled() {
                return Ok((None, self.partial_unmap_info(start)));
            }
            let idx = id as usize - 1;
            let obj = match &self.shells[idx] {
                ShellSlot::Ready(obj) => obj.clone(),
                _ => continue,
            };
            let record = self.wire_boxes[idx].clone();
            let transformer = self.transformer_for_record(&record)?;
            transformer.fill_from_box(&obj, &record, self)?;
        }

        let root = self.object_for(bundle.root_box_id)?;
        self.run_hooks()?;

        let info = UnmapInfo {
            duration: start.elapsed(),
            object_count: self.created_order.len(),
            unknown_type_guids: self.unknown_type_guids.clone(),
            completed: true,
        };
        debug!(
            objects = info.object_count,
            unknown = info.unknown_type_guids.len(),
            "reconstruction finished"
        );
        Ok((Some(root), info))
    }

    fn partial_unmap_info(&self, start: Instant) -> UnmapInfo {
        debug!("reconstruction cancelled");
        UnmapInfo {
            duration: start.elapsed(),
            object_count: self.created_order.len(),
            unknown_type_guids: self.unknown_type_guids.clone(),
            completed: false,
        }
    }

    fn transformer_impl(&self, id: u32) -> Result<Arc<dyn Transformer>> {
        if id == 0 {
            return Err(GraphpackError::Internal(
                "Box metadata carries no transformer".into(),
            ));
        }
        self.transformer_impls
            .get(id as usize - 1)
            .cloned()
            .ok_or_else(|| GraphpackError::Internal(format!("Transformer id {id} out of range")))
    }

    fn transformer_for_record(&self, record: &BoxRecord) -> Result<Arc<dyn Transformer>> {
        let decoder = self.decoder.as_ref().ok_or_else(|| {
            GraphpackError::Internal("No decode state on this mapper".into())
        })?;
        let transformer_id = decoder.record(record.type_metadata_id)?.transformer_id;
        if transformer_id == 0 {
            return Err(GraphpackError::Decode(format!(
                "Type metadata {} carries no transformer",
                record.type_metadata_id
            )));
        }
        self.transformer_impls
            .get(transformer_id as usize - 1)
            .cloned()
            .ok_or_else(|| {
                GraphpackError::Decode(format!("Transformer id {transformer_id} out of range"))
            })
    }

    /// Hooks run in discovery order; within one object, ancestor hooks run
    /// root-to-derived, each type's hooks in registration order.
    fn run_hooks(&mut self) -> Result<()> {
        let order = self.created_order.clone();
        for id in order {
            let obj = match &self.shells[id as usize - 1] {
                ShellSlot::Ready(obj) => obj.clone(),
                _ => continue,
            };
            let Some(record) = obj.as_record() else { continue };
            let Some(schema) = self.registry.schema_for(record.ty().base_guid()) else {
                continue;
            };
            for ancestor in schema.ancestry() {
                for hook in ancestor.hooks() {
                    hook(&obj)?;
                }
            }
            for hook in schema.hooks() {
                hook(&obj)?;
            }
        }
        Ok(())
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}
