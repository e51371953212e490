#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use graphpack::bundle::{BoxPayload, RepeatedPayload};
use graphpack::{
    codec, ArrayObj, Graphpack, MapObj, Mapper, Obj, RecordObj, RecordSpec, Registry, SeqObj,
    TypeGuid,
};

const NODE_GUID: TypeGuid = TypeGuid::from_u128(0xaaaa_0000_0000_0000_0000_0000_0000_0001);
const PAIR_GUID: TypeGuid = TypeGuid::from_u128(0xaaaa_0000_0000_0000_0000_0000_0000_0002);

fn registry_with_node() -> Arc<Registry> {
    let registry = Registry::new();
    registry
        .register_record(RecordSpec::new("Node", NODE_GUID).member("Next"))
        .unwrap();
    registry
}

fn registry_with_pair() -> Arc<Registry> {
    let registry = Registry::new();
    registry
        .register_record(RecordSpec::new("Pair", PAIR_GUID).member("A").member("B"))
        .unwrap();
    registry
}

/// Deterministic 15-bit PRNG for the large-array scenario.
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next(&mut self) -> i64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) & 0x7fff) as i64
    }
}

/// One box, one rank-1 array metadata, envelope well under the raw size.
#[test]
fn large_int_array_stays_compact() -> graphpack::Result<()> {
    let registry = Registry::new();
    let builtins = registry.builtins();
    let array_ty = registry.array_of(&builtins.int_ty);

    let mut rng = Lcg::new(1234);
    let values: Vec<Obj> = (0..8192).map(|_| Obj::Int(rng.next())).collect();
    let arr = ArrayObj::rank1(array_ty, values.clone())?;

    let mut mapper = Mapper::with_registry(registry.clone());
    let (bundle, info) = mapper.serialize_graph(&Obj::Array(arr))?;
    assert!(info.completed);
    assert_eq!(bundle.boxes.len(), 1);
    assert_eq!(bundle.array_metadata.len(), 1);
    assert_eq!(bundle.array_metadata[0].rank, 1);
    assert_eq!(bundle.array_metadata[0].lengths, vec![8192]);

    let bytes = codec::encode(&bundle)?;
    assert!(bytes.len() < 33 * 1024, "envelope is {} bytes", bytes.len());

    let decoded = codec::decode(&bytes)?;
    let mut mapper = Mapper::with_registry(registry);
    let (root, info) = mapper.deserialize_graph(&decoded)?;
    assert!(info.completed);
    let root = root.unwrap();
    let arr = root.as_array().unwrap();
    let items = arr.items.borrow();
    assert_eq!(items.len(), 8192);
    for (got, want) in items.iter().zip(&values) {
        assert_eq!(got.as_int(), want.as_int());
    }
    Ok(())
}

/// Rank-3 shape round-trips through one shared array metadata record.
#[test]
fn rank3_array_shape() -> graphpack::Result<()> {
    let registry = Registry::new();
    let builtins = registry.builtins();
    let array_ty = registry.array_of(&builtins.int_ty);

    let values: Vec<Obj> = (0..4096).map(Obj::Int).collect();
    let arr = ArrayObj::new(array_ty, vec![16, 16, 16], Vec::new(), values)?;

    let mut mapper = Mapper::with_registry(registry.clone());
    let (bundle, _) = mapper.serialize_graph(&Obj::Array(arr))?;
    assert_eq!(bundle.array_metadata.len(), 1);
    assert_eq!(bundle.array_metadata[0].rank, 3);
    assert_eq!(bundle.array_metadata[0].lengths, vec![16, 16, 16]);
    match &bundle.boxes[0].payload {
        Some(BoxPayload::Repeated(rv)) => match &rv.payload {
            RepeatedPayload::Ints(v) => assert_eq!(v.len(), 4096),
            other => panic!("expected inline ints, got {other:?}"),
        },
        other => panic!("expected repeated payload, got {other:?}"),
    }

    let mut mapper = Mapper::with_registry(registry);
    let (root, _) = mapper.deserialize_graph(&bundle)?;
    let root = root.unwrap();
    let arr = root.as_array().unwrap();
    assert_eq!(arr.rank(), 3);
    assert_eq!(arr.lengths(), &[16, 16, 16]);
    assert_eq!(arr.items.borrow().len(), 4096);
    Ok(())
}

/// A list of four equal strings shares one box and one table entry.
#[test]
fn shared_string_list() -> graphpack::Result<()> {
    let registry = Registry::new();
    let builtins = registry.builtins();
    let list_ty = registry.list_of(&builtins.string_ty);

    let items: Vec<Obj> = (0..4).map(|_| Obj::Str(Rc::from("hello"))).collect();
    let seq = SeqObj::new(list_ty, items);

    let mut mapper = Mapper::with_registry(registry.clone());
    let (bundle, _) = mapper.serialize_graph(&Obj::Seq(seq))?;

    assert_eq!(bundle.strings, vec!["hello".to_string()]);
    assert_eq!(bundle.boxes.len(), 2, "list box plus one shared string box");
    match &bundle.boxes[0].payload {
        Some(BoxPayload::Repeated(rv)) => {
            assert_eq!(rv.payload.len(), 4);
            match &rv.payload {
                RepeatedPayload::BoxIds(ids) => assert_eq!(ids, &vec![2, 2, 2, 2]),
                other => panic!("expected box ids, got {other:?}"),
            }
        }
        other => panic!("expected repeated payload, got {other:?}"),
    }

    let mut mapper = Mapper::with_registry(registry);
    let (root, _) = mapper.deserialize_graph(&bundle)?;
    let seq = root.unwrap();
    let seq = seq.as_seq().unwrap();
    for item in seq.items.borrow().iter() {
        assert_eq!(item.as_str(), Some("hello"));
    }
    Ok(())
}

/// Two occurrences of the same integer value intern to a single box.
#[test]
fn scalar_value_interning() -> graphpack::Result<()> {
    let registry = Registry::new();
    let builtins = registry.builtins();
    let list_ty = registry.list_of(&builtins.int_ty);
    let seq = SeqObj::new(list_ty, vec![Obj::Int(1000), Obj::Int(1000)]);

    let mut mapper = Mapper::with_registry(registry);
    let (bundle, _) = mapper.serialize_graph(&Obj::Seq(seq))?;
    assert_eq!(bundle.boxes.len(), 2, "list box plus one integer box");
    Ok(())
}

/// Box ids follow breadth-first discovery order.
#[test]
fn breadth_first_id_assignment() -> graphpack::Result<()> {
    let registry = registry_with_pair();
    let ty = registry.try_type_for(PAIR_GUID).unwrap();

    let c1 = RecordObj::new(ty.clone(), vec![Obj::Int(10), Obj::Int(11)]);
    let c2 = RecordObj::new(ty.clone(), vec![Obj::Int(12), Obj::Int(13)]);
    let root = RecordObj::new(ty, vec![Obj::Record(c1), Obj::Record(c2)]);

    let mut mapper = Mapper::with_registry(registry);
    let (bundle, _) = mapper.serialize_graph(&Obj::Record(root))?;
    assert_eq!(bundle.root_box_id, 1);
    assert_eq!(bundle.boxes.len(), 7);

    let members = |i: usize| match &bundle.boxes[i].payload {
        Some(BoxPayload::Members(mv)) => mv.value_box_ids.clone(),
        other => panic!("expected members payload, got {other:?}"),
    };
    assert_eq!(members(0), vec![2, 3], "root's children discovered first");
    assert_eq!(members(1), vec![4, 5], "then the first child's leaves");
    assert_eq!(members(2), vec![6, 7], "then the second child's leaves");
    Ok(())
}

/// A linked list produces one member box per node, each pointing at the
/// next node's id, with the terminal reference stored as 0.
#[test]
fn linked_list_wire_shape() -> graphpack::Result<()> {
    let registry = registry_with_node();
    let ty = registry.try_type_for(NODE_GUID).unwrap();

    let n4 = RecordObj::new(ty.clone(), vec![Obj::Null]);
    let n3 = RecordObj::new(ty.clone(), vec![Obj::Record(n4)]);
    let n2 = RecordObj::new(ty.clone(), vec![Obj::Record(n3)]);
    let n1 = RecordObj::new(ty, vec![Obj::Record(n2)]);

    let mut mapper = Mapper::with_registry(registry.clone());
    let (bundle, _) = mapper.serialize_graph(&Obj::Record(n1))?;
    assert_eq!(bundle.boxes.len(), 4);
    let next_of = |i: usize| match &bundle.boxes[i].payload {
        Some(BoxPayload::Members(mv)) => {
            assert_eq!(mv.value_box_ids.len(), 1, "Node declares a single member");
            mv.value_box_ids[0]
        }
        other => panic!("expected members payload, got {other:?}"),
    };
    assert_eq!(next_of(0), 2);
    assert_eq!(next_of(1), 3);
    assert_eq!(next_of(2), 4);
    assert_eq!(next_of(3), 0, "the terminal node stores the null id");

    assert_eq!(bundle.storable_type_metadata.len(), 1);
    let layout = &bundle.storable_type_metadata[0];
    let name = &bundle.strings[layout.member_name_string_ids[0] as usize - 1];
    assert_eq!(name, "Next");

    let mut mapper = Mapper::with_registry(registry);
    let (root, _) = mapper.deserialize_graph(&bundle)?;
    let mut cursor = root.unwrap();
    for _ in 0..4 {
        let rec = cursor.as_record().unwrap().clone();
        cursor = rec.get(0);
    }
    assert!(cursor.is_null());
    Ok(())
}

/// Shared references stay shared after a round trip.
#[test]
fn diamond_sharing_preserved() -> graphpack::Result<()> {
    let registry = registry_with_pair();
    let ty = registry.try_type_for(PAIR_GUID).unwrap();

    let shared = RecordObj::new(ty.clone(), vec![Obj::Int(1), Obj::Int(2)]);
    let root = RecordObj::new(
        ty,
        vec![Obj::Record(shared.clone()), Obj::Record(shared)],
    );

    let bytes = Graphpack::builder()
        .registry(registry.clone())
        .write(&Obj::Record(root))?
        .0;
    let (root, _) = Graphpack::builder().registry(registry).read(&bytes)?;
    let root = root.unwrap();
    let root = root.as_record().unwrap();
    let left = root.get(0);
    let right = root.get(1);
    assert!(!left.is_null());
    assert!(Obj::same_identity(&left, &right), "sharing must survive");
    Ok(())
}

/// A two-node cycle terminates and round-trips with identity intact.
#[test]
fn two_node_cycle_survives() -> graphpack::Result<()> {
    let registry = registry_with_node();
    let ty = registry.try_type_for(NODE_GUID).unwrap();

    let a = RecordObj::new(ty.clone(), vec![Obj::Null]);
    let b = RecordObj::new(ty, vec![Obj::Record(a.clone())]);
    a.set(0, Obj::Record(b));

    let bytes = Graphpack::builder()
        .registry(registry.clone())
        .write(&Obj::Record(a))?
        .0;
    let (root, _) = Graphpack::builder().registry(registry).read(&bytes)?;
    let root = root.unwrap();

    let a2 = root.as_record().unwrap();
    let next = a2.get(0);
    let b2 = next.as_record().unwrap();
    let back = b2.get(0);
    assert!(Obj::same_identity(&root, &back), "cycle must close on itself");
    Ok(())
}

/// A four-node cycle produces four member boxes referencing each other.
#[test]
fn four_node_cycle() -> graphpack::Result<()> {
    let registry = registry_with_node();
    let ty = registry.try_type_for(NODE_GUID).unwrap();

    let nodes: Vec<_> = (0..4)
        .map(|_| RecordObj::new(ty.clone(), vec![Obj::Null]))
        .collect();
    for i in 0..4 {
        nodes[i].set(0, Obj::Record(nodes[(i + 1) % 4].clone()));
    }

    let mut mapper = Mapper::with_registry(registry.clone());
    let (bundle, _) = mapper.serialize_graph(&Obj::Record(nodes[0].clone()))?;
    assert_eq!(bundle.boxes.len(), 4);
    let next_of = |i: usize| match &bundle.boxes[i].payload {
        Some(BoxPayload::Members(mv)) => mv.value_box_ids[0],
        other => panic!("expected members payload, got {other:?}"),
    };
    assert_eq!(next_of(0), 2);
    assert_eq!(next_of(1), 3);
    assert_eq!(next_of(2), 4);
    assert_eq!(next_of(3), 1, "the last node closes the cycle");

    let mut mapper = Mapper::with_registry(registry);
    let (root, _) = mapper.deserialize_graph(&bundle)?;
    let mut cursor = root.unwrap();
    let start = cursor.clone();
    for _ in 0..4 {
        let rec = cursor.as_record().unwrap().clone();
        cursor = rec.get(0);
    }
    assert!(Obj::same_identity(&cursor, &start));
    Ok(())
}

/// A sequence that contains itself round-trips to a sequence that contains
/// itself.
#[test]
fn self_referential_sequence() -> graphpack::Result<()> {
    let registry = Registry::new();
    let builtins = registry.builtins();
    let list_ty = registry.list_of(&builtins.string_ty);

    let seq = SeqObj::new(list_ty, Vec::new());
    seq.items.borrow_mut().push(Obj::Seq(seq.clone()));

    let bytes = Graphpack::builder()
        .registry(registry.clone())
        .write(&Obj::Seq(seq))?
        .0;
    let (root, _) = Graphpack::builder().registry(registry).read(&bytes)?;
    let root = root.unwrap();
    let inner = root.as_seq().unwrap().items.borrow()[0].clone();
    assert!(Obj::same_identity(&root, &inner));
    Ok(())
}

/// Two serializations of the same graph produce byte-identical envelopes.
#[test]
fn deterministic_envelopes() -> graphpack::Result<()> {
    let registry = registry_with_pair();
    let ty = registry.try_type_for(PAIR_GUID).unwrap();
    let builtins = registry.builtins();
    let list_ty = registry.list_of(&builtins.float_ty);

    let child = RecordObj::new(ty.clone(), vec![Obj::Str(Rc::from("x")), Obj::Float(2.5)]);
    let seq = SeqObj::new(list_ty, vec![Obj::Float(1.5), Obj::Float(1.5)]);
    let root = RecordObj::new(ty, vec![Obj::Record(child), Obj::Seq(seq)]);
    let root = Obj::Record(root);

    let first = Graphpack::builder().registry(registry.clone()).write(&root)?.0;
    let second = Graphpack::builder().registry(registry).write(&root)?.0;
    assert_eq!(first, second);
    Ok(())
}

/// Every interning table is duplicate-free and every box's metadata id is in
/// range.
#[test]
fn interning_tables_are_duplicate_free() -> graphpack::Result<()> {
    let registry = registry_with_pair();
    let ty = registry.try_type_for(PAIR_GUID).unwrap();
    let builtins = registry.builtins();
    let list_ty = registry.list_of(&builtins.string_ty);

    let a = RecordObj::new(ty.clone(), vec![Obj::Str(Rc::from("dup")), Obj::Int(-7)]);
    let b = RecordObj::new(ty.clone(), vec![Obj::Str(Rc::from("dup")), Obj::Bool(true)]);
    let seq = SeqObj::new(list_ty, vec![Obj::Record(a), Obj::Record(b.clone())]);
    let root = RecordObj::new(ty, vec![Obj::Seq(seq), Obj::Record(b)]);

    let mut mapper = Mapper::with_registry(registry);
    let (bundle, _) = mapper.serialize_graph(&Obj::Record(root))?;

    codec::validate(&bundle)?;

    let strings: HashSet<_> = bundle.strings.iter().collect();
    assert_eq!(strings.len(), bundle.strings.len());
    let guids: HashSet<_> = bundle.type_guids.iter().collect();
    assert_eq!(guids.len(), bundle.type_guids.len());
    let metas: HashSet<_> = bundle.type_metadata.iter().collect();
    assert_eq!(metas.len(), bundle.type_metadata.len());
    for b in &bundle.boxes {
        assert!(b.type_metadata_id >= 1);
        assert!(b.type_metadata_id as usize <= bundle.type_metadata.len());
    }
    Ok(())
}

/// Scalar slot selection round-trips every scalar shape.
#[test]
fn scalar_shapes_round_trip() -> graphpack::Result<()> {
    let registry = Registry::new();
    let builtins = registry.builtins();
    let list_ty = registry.list_of(&builtins.string_ty);

    let blob: Rc<[u8]> = Rc::from(vec![0u8, 1, 254, 255]);
    let seq = SeqObj::new(
        list_ty,
        vec![
            Obj::Bool(true),
            Obj::Bool(false),
            Obj::Int(-123456789),
            Obj::Int(42),
            Obj::Uint(u64::MAX),
            Obj::Float(0.5),
            Obj::Float(0.1),
            Obj::Str(Rc::from("scalar")),
            Obj::Bytes(blob),
            Obj::Null,
        ],
    );

    let bytes = Graphpack::builder()
        .registry(registry.clone())
        .write(&Obj::Seq(seq))?
        .0;
    let (root, _) = Graphpack::builder().registry(registry).read(&bytes)?;
    let root = root.unwrap();
    let items = root.as_seq().unwrap().items.borrow().clone();
    assert_eq!(items[0].as_bool(), Some(true));
    assert_eq!(items[1].as_bool(), Some(false));
    assert_eq!(items[2].as_int(), Some(-123456789));
    assert_eq!(items[3].as_int(), Some(42));
    assert_eq!(items[4].as_uint(), Some(u64::MAX));
    assert_eq!(items[5].as_float(), Some(0.5));
    assert_eq!(items[6].as_float(), Some(0.1));
    assert_eq!(items[7].as_str(), Some("scalar"));
    assert_eq!(items[8].as_bytes(), Some(&[0u8, 1, 254, 255][..]));
    assert!(items[9].is_null());
    Ok(())
}

/// Maps keep their entries and their comparer object.
#[test]
fn map_with_comparer_round_trip() -> graphpack::Result<()> {
    let registry = registry_with_pair();
    let ty = registry.try_type_for(PAIR_GUID).unwrap();
    let builtins = registry.builtins();
    let map_ty = registry.map_of(&builtins.string_ty, &builtins.int_ty);

    let comparer = RecordObj::new(ty, vec![Obj::Str(Rc::from("ordinal")), Obj::Bool(true)]);
    let map = MapObj::with_comparer(
        map_ty,
        Obj::Record(comparer),
        vec![
            (Obj::Str(Rc::from("x")), Obj::Int(1)),
            (Obj::Str(Rc::from("y")), Obj::Int(2)),
        ],
    );

    let bytes = Graphpack::builder()
        .registry(registry.clone())
        .write(&Obj::Map(map))?
        .0;
    let (root, _) = Graphpack::builder().registry(registry).read(&bytes)?;
    let root = root.unwrap();
    let map = root.as_map().unwrap();
    let entries = map.entries.borrow().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0.as_str(), Some("x"));
    assert_eq!(entries[0].1.as_int(), Some(1));
    assert_eq!(entries[1].0.as_str(), Some("y"));
    assert_eq!(entries[1].1.as_int(), Some(2));

    let comparer = map.comparer.borrow().clone();
    let comparer = comparer.as_record().unwrap().clone();
    assert_eq!(comparer.get(0).as_str(), Some("ordinal"));
    assert_eq!(comparer.get(1).as_bool(), Some(true));
    Ok(())
}

/// Arrays of records store box ids and wire elements in phase B.
#[test]
fn record_array_round_trip() -> graphpack::Result<()> {
    let registry = registry_with_node();
    let ty = registry.try_type_for(NODE_GUID).unwrap();
    let array_ty = registry.array_of(&ty);

    let shared = RecordObj::new(ty.clone(), vec![Obj::Null]);
    let items = vec![
        Obj::Record(shared.clone()),
        Obj::Record(shared),
        Obj::Record(RecordObj::new(ty, vec![Obj::Null])),
        Obj::Null,
    ];
    let arr = ArrayObj::rank1(array_ty, items)?;

    let bytes = Graphpack::builder()
        .registry(registry.clone())
        .write(&Obj::Array(arr))?
        .0;
    let (root, _) = Graphpack::builder().registry(registry).read(&bytes)?;
    let root = root.unwrap();
    let arr = root.as_array().unwrap();
    let items = arr.items.borrow().clone();
    assert_eq!(items.len(), 4);
    assert!(Obj::same_identity(&items[0], &items[1]));
    assert!(!Obj::same_identity(&items[0], &items[2]));
    assert!(items[3].is_null());
    Ok(())
}

/// Round trip through a real file using the reader/writer conveniences.
#[test]
fn file_round_trip() -> graphpack::Result<()> {
    let registry = registry_with_node();
    let ty = registry.try_type_for(NODE_GUID).unwrap();

    let tail = RecordObj::new(ty.clone(), vec![Obj::Null]);
    let head = RecordObj::new(ty, vec![Obj::Record(tail)]);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("graph.gpk");

    let mut file = std::fs::File::create(&path)?;
    Graphpack::builder()
        .registry(registry.clone())
        .write_to(&mut file, &Obj::Record(head))?;
    drop(file);

    let mut file = std::fs::File::open(&path)?;
    let (root, info) = Graphpack::builder()
        .registry(registry)
        .read_from(&mut file)?;
    assert!(info.completed);
    let head = root.unwrap();
    let head = head.as_record().unwrap();
    let tail = head.get(0);
    let tail = tail.as_record().unwrap();
    assert!(tail.get(0).is_null());
    Ok(())
}
