#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use graphpack::bundle::{BoxPayload, BoxRecord, Bundle, ScalarValue, TypeMetadataRecord};
use graphpack::{
    codec, CancelToken, Graphpack, GraphpackError, GraphpackInspector, Mapper, Obj, RecordObj,
    RecordSpec, Registry, SeqObj, TypeGuid,
};

const NODE_GUID: TypeGuid = TypeGuid::from_u128(0xcccc_0000_0000_0000_0000_0000_0000_0001);

fn sample_bytes(registry: &std::sync::Arc<Registry>) -> Vec<u8> {
    let builtins = registry.builtins();
    let list_ty = registry.list_of(&builtins.int_ty);
    let seq = SeqObj::new(list_ty, vec![Obj::Int(1), Obj::Int(2)]);
    Graphpack::builder()
        .registry(registry.clone())
        .write(&Obj::Seq(seq))
        .unwrap()
        .0
}

#[test]
fn header_round_trip() {
    let registry = Registry::new();
    let bytes = sample_bytes(&registry);
    assert_eq!(&bytes[0..4], b"GPK1");
    assert_eq!(bytes[6], 0, "no compression by default");
    assert!(codec::decode(&bytes).is_ok());
}

#[test]
fn wrong_magic_is_rejected() {
    let registry = Registry::new();
    let mut bytes = sample_bytes(&registry);
    bytes[0] = b'X';
    let err = codec::decode(&bytes).unwrap_err();
    assert!(matches!(err, GraphpackError::Decode(_)), "got {err}");
}

#[test]
fn unsupported_version_is_rejected() {
    let registry = Registry::new();
    let mut bytes = sample_bytes(&registry);
    bytes[4] = 99;
    let err = codec::decode(&bytes).unwrap_err();
    assert!(matches!(err, GraphpackError::Decode(_)), "got {err}");
}

#[test]
fn truncated_header_is_rejected() {
    let err = codec::decode(&[0x47, 0x50]).unwrap_err();
    assert!(matches!(err, GraphpackError::Decode(_)), "got {err}");
}

#[test]
fn box_without_payload_is_malformed() {
    let bundle = Bundle {
        type_guids: vec![TypeGuid::from_u128(1)],
        root_box_id: 1,
        boxes: vec![BoxRecord {
            type_metadata_id: 1,
            payload: None,
        }],
        type_metadata: vec![TypeMetadataRecord {
            type_id: 1,
            generic_argument_ids: Vec::new(),
            transformer_id: 0,
        }],
        ..Default::default()
    };
    let err = codec::validate(&bundle).unwrap_err();
    assert!(err.to_string().contains("no payload"), "got {err}");
}

#[test]
fn out_of_range_ids_are_malformed() {
    let bundle = Bundle {
        type_guids: vec![TypeGuid::from_u128(1)],
        root_box_id: 5,
        boxes: vec![BoxRecord {
            type_metadata_id: 1,
            payload: Some(BoxPayload::Scalar(ScalarValue::Uint(1))),
        }],
        type_metadata: vec![TypeMetadataRecord {
            type_id: 1,
            generic_argument_ids: Vec::new(),
            transformer_id: 0,
        }],
        ..Default::default()
    };
    let err = codec::validate(&bundle).unwrap_err();
    assert!(matches!(err, GraphpackError::Decode(_)), "got {err}");

    let bundle = Bundle {
        type_guids: Vec::new(),
        root_box_id: 1,
        boxes: vec![BoxRecord {
            type_metadata_id: 3,
            payload: Some(BoxPayload::Scalar(ScalarValue::Uint(1))),
        }],
        ..Default::default()
    };
    assert!(codec::validate(&bundle).is_err());
}

#[test]
fn metadata_cycle_is_rejected() -> graphpack::Result<()> {
    let registry = Registry::new();
    let bytes = sample_bytes(&registry);
    let mut bundle = codec::decode(&bytes)?;
    // Point the list's element argument back at the list metadata itself.
    // The element metadata interns first, so the list record sits at id 2.
    assert_eq!(bundle.type_metadata.len(), 2);
    bundle.type_metadata[1].generic_argument_ids = vec![2];

    let mut mapper = Mapper::with_registry(registry);
    let err = mapper.deserialize_graph(&bundle).unwrap_err();
    assert!(err.to_string().contains("cycle"), "got {err}");
    Ok(())
}

/// Cancellation before the walk drains leaves a partial envelope that a
/// strict decode refuses.
#[test]
fn cancelled_serialization_yields_partial_envelope() -> graphpack::Result<()> {
    let registry = Registry::new();
    registry.register_record(RecordSpec::new("Node", NODE_GUID).member("Next"))?;
    let ty = registry.try_type_for(NODE_GUID).unwrap();
    let rec = RecordObj::new(ty, vec![Obj::Null]);

    let token = CancelToken::new();
    token.cancel();
    let mut mapper = Mapper::with_registry(registry).with_cancel(token);
    let (bundle, info) = mapper.serialize_graph(&Obj::Record(rec))?;
    assert!(!info.completed);
    assert_eq!(bundle.boxes.len(), 1);
    assert!(bundle.boxes[0].payload.is_none());

    // The partial envelope still encodes, but strict decoding rejects it.
    let bytes = codec::encode(&bundle)?;
    let err = codec::decode(&bytes).unwrap_err();
    assert!(matches!(err, GraphpackError::Decode(_)), "got {err}");
    Ok(())
}

#[test]
fn cancelled_deserialization_returns_absent_root() -> graphpack::Result<()> {
    let registry = Registry::new();
    let bytes = sample_bytes(&registry);

    let token = CancelToken::new();
    token.cancel();
    let (root, info) = Graphpack::builder()
        .registry(registry)
        .cancel_token(token)
        .read(&bytes)?;
    assert!(root.is_none());
    assert!(!info.completed);
    Ok(())
}

#[test]
fn inspector_reports_structure() -> graphpack::Result<()> {
    let registry = Registry::new();
    let bytes = sample_bytes(&registry);
    let report = GraphpackInspector::inspect_bytes(&bytes)?;

    assert_eq!(report.root_box_id, 1);
    assert_eq!(report.box_count, 3, "list box plus two integer boxes");
    assert_eq!(report.boxes[0].payload_kind, "repeated");
    assert_eq!(report.boxes[0].child_count, 2);
    assert_eq!(report.boxes[1].payload_kind, "scalar");
    assert_eq!(report.boxes[1].scalar.as_deref(), Some("int:1"));
    Ok(())
}

#[cfg(feature = "lz4_flex")]
#[test]
fn lz4_body_round_trip() -> graphpack::Result<()> {
    let registry = Registry::new();
    let builtins = registry.builtins();
    let list_ty = registry.list_of(&builtins.int_ty);
    let seq = SeqObj::new(list_ty, (0..64).map(|_| Obj::Int(7)).collect());

    let (bytes, _) = Graphpack::builder()
        .registry(registry.clone())
        .compression(true)
        .write(&Obj::Seq(seq))?;
    assert_eq!(bytes[6], 1, "lz4 algorithm id in the header");

    let (root, _) = Graphpack::builder().registry(registry).read(&bytes)?;
    let root = root.unwrap();
    let seq = root.as_seq().unwrap();
    assert_eq!(seq.len(), 64);
    assert!(seq.items.borrow().iter().all(|i| i.as_int() == Some(7)));
    Ok(())
}
