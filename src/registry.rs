//! The static type registry.
//!
//! The registry resolves a runtime type to its stable GUID, its transformer,
//! its zero-argument constructor, and (for storable user records) its member
//! descriptors and post-deserialization hooks. It is process-wide by
//! necessity — GUIDs are globally unique tokens — and is exposed as a
//! once-initialized singleton with a coarse lock around mutation and cheap
//! reads.
//!
//! Embedders that need isolation (tests, plugin hosts) can create a private
//! [`Registry`] and hand it to the mapper explicitly; both paths share the
//! same code.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{GraphpackError, Result};
use crate::guid::TypeGuid;
use crate::object::{Obj, RecordObj, RuntimeType, TypeHandle, TypeKind};
use crate::transform::Transformer;
use crate::transform_impls::{
    ArrayTransformer, MapTransformer, RecordTransformer, ScalarTransformer, SequenceTransformer,
};

/// Well-known GUIDs of the built-in types.
pub mod wellknown {
    use crate::guid::TypeGuid;

    /// Boolean scalar type.
    pub const BOOL: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1001);
    /// Signed integer scalar type.
    pub const INT: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1002);
    /// Unsigned integer scalar type.
    pub const UINT: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1003);
    /// Floating-point scalar type.
    pub const FLOAT: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1004);
    /// String scalar type.
    pub const STRING: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1005);
    /// Byte-blob scalar type.
    pub const BYTES: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1006);
    /// Generic sequence definition (`List<T>`).
    pub const LIST: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1007);
    /// Generic keyed-container definition (`Map<K, V>`).
    pub const MAP: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1008);
    /// The distinguished array pseudo-type.
    pub const ARRAY: TypeGuid = TypeGuid::from_u128(0x6f9c_1a42_8b0d_4e31_a57f_02c4_d9e8_1009);
}

/// Handles to the built-in types, cloned out of the registry.
#[derive(Debug, Clone)]
pub struct Builtins {
    /// Boolean scalar.
    pub bool_ty: TypeHandle,
    /// Signed integer scalar.
    pub int_ty: TypeHandle,
    /// Unsigned integer scalar.
    pub uint_ty: TypeHandle,
    /// Floating-point scalar.
    pub float_ty: TypeHandle,
    /// String scalar.
    pub string_ty: TypeHandle,
    /// Byte-blob scalar.
    pub bytes_ty: TypeHandle,
    /// `List<T>` generic definition.
    pub list_def: TypeHandle,
    /// `Map<K, V>` generic definition.
    pub map_def: TypeHandle,
    /// The array pseudo-type.
    pub array_ty: TypeHandle,
}

/// Canonical joined key for a `(declaring type GUID, member name)` pair.
pub fn member_key(owner: TypeGuid, name: &str) -> String {
    format!("{}.{}", owner.hyphenated(), name)
}

/// A zero-argument constructor for a storable user type.
pub type Constructor = Arc<dyn Fn() -> Result<Obj> + Send + Sync>;

/// A post-deserialization hook. Runs against the fully populated record;
/// failures propagate out of deserialization unwrapped.
pub type Hook = Arc<dyn Fn(&Obj) -> Result<()> + Send + Sync>;

/// A named member of a storable user type.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    name: String,
    owner: TypeGuid,
    index: usize,
}

impl MemberDescriptor {
    /// Declared member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// GUID of the type that declared this member.
    pub fn owner(&self) -> TypeGuid {
        self.owner
    }

    /// Position in the flattened member list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Reads this member from a record instance.
    pub fn get(&self, record: &RecordObj) -> Obj {
        record.get(self.index)
    }

    /// Writes this member on a record instance.
    pub fn set(&self, record: &RecordObj, value: Obj) {
        record.set(self.index, value);
    }
}

/// Registration input for a storable user type.
pub struct RecordSpec {
    name: String,
    guid: TypeGuid,
    parent: Option<TypeGuid>,
    members: Vec<String>,
    ctor: Option<Constructor>,
    hooks: Vec<Hook>,
}

impl RecordSpec {
    /// Starts a spec for a record type.
    pub fn new(name: impl Into<String>, guid: TypeGuid) -> Self {
        Self {
            name: name.into(),
            guid,
            parent: None,
            members: Vec::new(),
            ctor: None,
            hooks: Vec::new(),
        }
    }

    /// Declares the storable parent type. The parent must be registered
    /// first.
    pub fn parent(mut self, guid: TypeGuid) -> Self {
        self.parent = Some(guid);
        self
    }

    /// Appends an own member, in declared order.
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.members.push(name.into());
        self
    }

    /// Overrides the default constructor (which produces a record with all
    /// members null).
    pub fn ctor(mut self, ctor: Constructor) -> Self {
        self.ctor = Some(ctor);
        self
    }

    /// Appends a post-deserialization hook, in run order.
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }
}

/// Compiled descriptor of a storable user type.
pub struct RecordSchema {
    ty: TypeHandle,
    guid: TypeGuid,
    ancestry: Vec<Arc<RecordSchema>>,
    own_members: Vec<String>,
    flat: Vec<MemberDescriptor>,
    slots: HashMap<String, usize>,
    ctor: Constructor,
    hooks: Vec<Hook>,
}

impl std::fmt::Debug for RecordSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RecordSchema({}, guid={}, arity={})",
            self.ty.name(),
            self.guid,
            self.flat.len()
        )
    }
}

impl RecordSchema {
    /// The record's runtime type handle.
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// The record's GUID.
    pub fn guid(&self) -> TypeGuid {
        self.guid
    }

    /// Storable ancestors, root first, excluding this type.
    pub fn ancestry(&self) -> &[Arc<RecordSchema>] {
        &self.ancestry
    }

    /// Member names declared on this type only.
    pub fn own_members(&self) -> &[String] {
        &self.own_members
    }

    /// Flattened member list: ancestors' members first, then own.
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.flat
    }

    /// Flattened member count; the arity of instances.
    pub fn arity(&self) -> usize {
        self.flat.len()
    }

    /// Resolves a `(declaring type GUID, member name)` pair to its flat
    /// index.
    pub fn slot_of(&self, owner: TypeGuid, name: &str) -> Option<usize> {
        self.slot_of_key(&member_key(owner, name))
    }

    /// Resolves a canonical joined member key (`"<guid>.<name>"`) to its
    /// flat index. This is the hot path used by the record transformer; the
    /// mapper caches the joined key per envelope string-id pair.
    pub fn slot_of_key(&self, key: &str) -> Option<usize> {
        self.slots.get(key).copied()
    }

    /// Invokes the zero-argument constructor.
    pub fn construct(&self) -> Result<Obj> {
        (self.ctor)()
    }

    /// This type's own hooks, in registration order.
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }
}

/// Resolved information for one runtime type.
#[derive(Clone)]
pub struct TypeInfo {
    /// The queried type.
    pub ty: TypeHandle,
    /// GUID of the type's base (definition for generics, pseudo-type for
    /// arrays).
    pub guid: TypeGuid,
    /// The transformer selected for this type; absent when the type is not
    /// serializable.
    pub transformer: Option<Arc<dyn Transformer>>,
    /// The record schema, for storable user types.
    pub schema: Option<Arc<RecordSchema>>,
}

type Provider = Arc<dyn Fn(&Registry) -> Result<()> + Send + Sync>;

struct Inner {
    builtins: Builtins,
    by_guid: HashMap<TypeGuid, TypeHandle>,
    /// Transformer selected per *type* base GUID.
    transformers: HashMap<TypeGuid, Arc<dyn Transformer>>,
    /// Transformers by their own GUID; resolves the envelope's transformer
    /// table.
    transformers_by_guid: HashMap<TypeGuid, Arc<dyn Transformer>>,
    schemas: HashMap<TypeGuid, Arc<RecordSchema>>,
    generics: HashMap<(usize, Vec<usize>), TypeHandle>,
    arrays: HashMap<usize, TypeHandle>,
    record_transformer: Arc<dyn Transformer>,
    providers: Vec<Provider>,
    next_provider: usize,
}

fn handle_addr(ty: &TypeHandle) -> usize {
    Arc::as_ptr(ty) as usize
}

impl Inner {
    fn new() -> Self {
        let plain = |name: &str, guid: TypeGuid| -> TypeHandle {
            Arc::new(RuntimeType::new(name, guid, TypeKind::Plain))
        };

        let builtins = Builtins {
            bool_ty: plain("bool", wellknown::BOOL),
            int_ty: plain("i64", wellknown::INT),
            uint_ty: plain("u64", wellknown::UINT),
            float_ty: plain("f64", wellknown::FLOAT),
            string_ty: plain("string", wellknown::STRING),
            bytes_ty: plain("bytes", wellknown::BYTES),
            list_def: plain("List", wellknown::LIST),
            map_def: plain("Map", wellknown::MAP),
            array_ty: plain("Array", wellknown::ARRAY),
        };

        let mut by_guid = HashMap::new();
        for ty in [
            &builtins.bool_ty,
            &builtins.int_ty,
            &builtins.uint_ty,
            &builtins.float_ty,
            &builtins.string_ty,
            &builtins.bytes_ty,
            &builtins.list_def,
            &builtins.map_def,
            &builtins.array_ty,
        ] {
            by_guid.insert(ty.base_guid(), ty.clone());
        }

        let scalar: Arc<dyn Transformer> = Arc::new(ScalarTransformer);
        let mut transformers: HashMap<TypeGuid, Arc<dyn Transformer>> = HashMap::new();
        for guid in [
            wellknown::BOOL,
            wellknown::INT,
            wellknown::UINT,
            wellknown::FLOAT,
            wellknown::STRING,
            wellknown::BYTES,
        ] {
            transformers.insert(guid, scalar.clone());
        }
        let sequence: Arc<dyn Transformer> = Arc::new(SequenceTransformer);
        let map: Arc<dyn Transformer> = Arc::new(MapTransformer);
        let array: Arc<dyn Transformer> = Arc::new(ArrayTransformer);
        transformers.insert(wellknown::LIST, sequence.clone());
        transformers.insert(wellknown::MAP, map.clone());
        transformers.insert(wellknown::ARRAY, array.clone());

        let record_transformer: Arc<dyn Transformer> = Arc::new(RecordTransformer);
        let mut transformers_by_guid: HashMap<TypeGuid, Arc<dyn Transformer>> = HashMap::new();
        for tf in [&scalar, &sequence, &map, &array, &record_transformer] {
            transformers_by_guid.insert(tf.guid(), tf.clone());
        }

        Self {
            builtins,
            by_guid,
            transformers,
            transformers_by_guid,
            schemas: HashMap::new(),
            generics: HashMap::new(),
            arrays: HashMap::new(),
            record_transformer,
            providers: Vec::new(),
            next_provider: 0,
        }
    }
}

/// The type registry. See the module docs for the concurrency model.
pub struct Registry {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        write!(
            f,
            "Registry(types={}, schemas={})",
            inner.by_guid.len(),
            inner.schemas.len()
        )
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    /// Creates a private registry with the built-in types installed.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner::new()),
        })
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(Self::new).clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Handles to the built-in types.
    pub fn builtins(&self) -> Builtins {
        self.read().builtins.clone()
    }

    /// Registers a deferred registration callback. Providers run once, in
    /// registration order, on the next
    /// [`update_registered_types`](Self::update_registered_types) call.
    pub fn provide(&self, provider: impl Fn(&Registry) -> Result<()> + Send + Sync + 'static) {
        self.write().providers.push(Arc::new(provider));
    }

    /// Runs any providers that have not executed yet. Called by the mapper
    /// once at the start of each serialize and deserialize.
    pub fn update_registered_types(&self) -> Result<()> {
        loop {
            let next = {
                let mut inner = self.write();
                if inner.next_provider < inner.providers.len() {
                    let p = inner.providers[inner.next_provider].clone();
                    inner.next_provider += 1;
                    Some(p)
                } else {
                    None
                }
            };
            match next {
                Some(p) => p(self)?,
                None => return Ok(()),
            }
        }
    }

    /// Registers a storable user record type. Idempotent: re-registering an
    /// existing GUID returns the original handle unchanged.
    pub fn register_record(&self, spec: RecordSpec) -> Result<TypeHandle> {
        let mut inner = self.write();
        if let Some(existing) = inner.by_guid.get(&spec.guid) {
            return Ok(existing.clone());
        }

        let parent_schema = match spec.parent {
            Some(parent_guid) => Some(
                inner
                    .schemas
                    .get(&parent_guid)
                    .cloned()
                    .ok_or_else(|| {
                        GraphpackError::Internal(format!(
                            "Parent {parent_guid} of {} is not registered",
                            spec.name
                        ))
                    })?,
            ),
            None => None,
        };

        let ty: TypeHandle = Arc::new(RuntimeType::new(&spec.name, spec.guid, TypeKind::Plain));

        // Flattened member list: ancestors first, then own members.
        let mut flat: Vec<MemberDescriptor> = parent_schema
            .as_ref()
            .map(|p| p.flat.clone())
            .unwrap_or_default();
        for name in &spec.members {
            flat.push(MemberDescriptor {
                name: name.clone(),
                owner: spec.guid,
                index: flat.len(),
            });
        }
        let slots = flat
            .iter()
            .map(|m| (member_key(m.owner, &m.name), m.index))
            .collect();

        let ancestry = match &parent_schema {
            Some(p) => {
                let mut chain = p.ancestry.clone();
                chain.push(p.clone());
                chain
            }
            None => Vec::new(),
        };

        let ctor = match spec.ctor {
            Some(c) => c,
            None => {
                let ctor_ty = ty.clone();
                let arity = flat.len();
                Arc::new(move || {
                    Ok(Obj::Record(RecordObj::new(
                        ctor_ty.clone(),
                        vec![Obj::Null; arity],
                    )))
                }) as Constructor
            }
        };

        let schema = Arc::new(RecordSchema {
            ty: ty.clone(),
            guid: spec.guid,
            ancestry,
            own_members: spec.members,
            flat,
            slots,
            ctor,
            hooks: spec.hooks,
        });

        inner.by_guid.insert(spec.guid, ty.clone());
        inner.schemas.insert(spec.guid, schema);
        let record_tf = inner.record_transformer.clone();
        inner.transformers.insert(spec.guid, record_tf);
        Ok(ty)
    }

    /// Registers a plain type *without* a transformer. Instances of such a
    /// type are not serializable; encountering one raises an
    /// [`Unserializable`](GraphpackError::Unserializable) error.
    pub fn register_plain(&self, name: impl Into<String>, guid: TypeGuid) -> TypeHandle {
        let mut inner = self.write();
        if let Some(existing) = inner.by_guid.get(&guid) {
            return existing.clone();
        }
        let ty: TypeHandle = Arc::new(RuntimeType::new(name, guid, TypeKind::Plain));
        inner.by_guid.insert(guid, ty.clone());
        ty
    }

    /// Attaches a custom transformer to a registered type's base GUID and
    /// makes it resolvable by its own GUID.
    pub fn register_transformer(&self, type_guid: TypeGuid, transformer: Arc<dyn Transformer>) {
        let mut inner = self.write();
        inner
            .transformers_by_guid
            .insert(transformer.guid(), transformer.clone());
        inner.transformers.insert(type_guid, transformer);
    }

    /// Interns the constructed generic type `definition<args...>`.
    pub fn generic(&self, definition: &TypeHandle, args: &[TypeHandle]) -> TypeHandle {
        let key = (
            handle_addr(definition),
            args.iter().map(handle_addr).collect::<Vec<_>>(),
        );
        let mut inner = self.write();
        if let Some(ty) = inner.generics.get(&key) {
            return ty.clone();
        }
        let arg_names: Vec<&str> = args.iter().map(|a| a.name()).collect();
        let name = format!("{}<{}>", definition.name(), arg_names.join(", "));
        let ty: TypeHandle = Arc::new(RuntimeType::new(
            name,
            definition.base_guid(),
            TypeKind::Generic {
                definition: definition.clone(),
                args: args.to_vec(),
            },
        ));
        inner.generics.insert(key, ty.clone());
        ty
    }

    /// Interns the array type of `elem`.
    pub fn array_of(&self, elem: &TypeHandle) -> TypeHandle {
        let key = handle_addr(elem);
        let mut inner = self.write();
        if let Some(ty) = inner.arrays.get(&key) {
            return ty.clone();
        }
        let name = format!("{}[]", elem.name());
        let ty: TypeHandle = Arc::new(RuntimeType::new(
            name,
            wellknown::ARRAY,
            TypeKind::Array { elem: elem.clone() },
        ));
        inner.arrays.insert(key, ty.clone());
        ty
    }

    /// Interns `List<elem>`.
    pub fn list_of(&self, elem: &TypeHandle) -> TypeHandle {
        let def = self.read().builtins.list_def.clone();
        self.generic(&def, std::slice::from_ref(elem))
    }

    /// Interns `Map<key, value>`.
    pub fn map_of(&self, key: &TypeHandle, value: &TypeHandle) -> TypeHandle {
        let def = self.read().builtins.map_def.clone();
        self.generic(&def, &[key.clone(), value.clone()])
    }

    /// Resolves GUID, transformer, and schema for a runtime type.
    pub fn type_info(&self, ty: &TypeHandle) -> TypeInfo {
        let guid = ty.base_guid();
        let inner = self.read();
        TypeInfo {
            ty: ty.clone(),
            guid,
            transformer: inner.transformers.get(&guid).cloned(),
            schema: inner.schemas.get(&guid).cloned(),
        }
    }

    /// Looks up a registered type by GUID.
    pub fn try_type_for(&self, guid: TypeGuid) -> Option<TypeHandle> {
        self.read().by_guid.get(&guid).cloned()
    }

    /// Looks up a transformer by the *transformer's* GUID, as stored in the
    /// envelope's transformer table.
    pub fn transformer_for(&self, guid: TypeGuid) -> Option<Arc<dyn Transformer>> {
        self.read().transformers_by_guid.get(&guid).cloned()
    }

    /// Looks up a record schema by GUID.
    pub fn schema_for(&self, guid: TypeGuid) -> Option<Arc<RecordSchema>> {
        self.read().schemas.get(&guid).cloned()
    }

    /// True when `ty` is a registered storable user type.
    pub fn is_storable_user_type(&self, ty: &TypeHandle) -> bool {
        ty.is_plain() && self.read().schemas.contains_key(&ty.base_guid())
    }

    /// Resolves the runtime type of a live object.
    pub fn runtime_type_of(&self, obj: &Obj) -> Result<TypeHandle> {
        let inner = self.read();
        let builtins = &inner.builtins;
        let ty = match obj {
            Obj::Null => {
                return Err(GraphpackError::Internal(
                    "The null reference has no runtime type".into(),
                ))
            }
            Obj::Bool(_) => builtins.bool_ty.clone(),
            Obj::Int(_) => builtins.int_ty.clone(),
            Obj::Uint(_) => builtins.uint_ty.clone(),
            Obj::Float(_) => builtins.float_ty.clone(),
            Obj::Str(_) => builtins.string_ty.clone(),
            Obj::Bytes(_) => builtins.bytes_ty.clone(),
            Obj::Seq(s) => s.ty().clone(),
            Obj::Map(m) => m.ty().clone(),
            Obj::Array(a) => a.ty().clone(),
            Obj::Record(r) => r.ty().clone(),
        };
        Ok(ty)
    }
}
