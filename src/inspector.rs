//! Tools for inspecting the logical structure of envelopes.
//! Useful for debugging transformer output and verifying interning.

use serde::Serialize;

use crate::bundle::{BoxPayload, Bundle, RepeatedPayload, ScalarValue};
use crate::codec;
use crate::error::Result;

/// A structural report of an envelope.
#[derive(Debug, Serialize)]
pub struct BundleReport {
    /// Number of boxes.
    pub box_count: usize,
    /// Number of interned strings.
    pub string_count: usize,
    /// Number of base types.
    pub type_count: usize,
    /// Number of transformers.
    pub transformer_count: usize,
    /// Number of user-record layouts.
    pub layout_count: usize,
    /// Number of shared array shapes.
    pub array_metadata_count: usize,
    /// The root box id.
    pub root_box_id: u32,
    /// Per-box summaries, ordered by id.
    pub boxes: Vec<BoxInfo>,
}

/// Summary of a single box.
#[derive(Debug, Serialize)]
pub struct BoxInfo {
    /// The box id.
    pub id: u32,
    /// Id into the type-metadata table.
    pub type_metadata_id: u32,
    /// Payload shape: "scalar", "repeated", "members", or "missing".
    pub payload_kind: &'static str,
    /// Element or member count for repeated/member payloads.
    pub child_count: usize,
    /// Rendered value for scalar payloads.
    pub scalar: Option<String>,
}

/// The envelope inspector.
#[derive(Debug)]
pub struct GraphpackInspector;

impl GraphpackInspector {
    /// Analyzes encoded envelope bytes.
    pub fn inspect_bytes(bytes: &[u8]) -> Result<BundleReport> {
        let bundle = codec::decode(bytes)?;
        Ok(Self::inspect(&bundle))
    }

    /// Analyzes a decoded bundle.
    pub fn inspect(bundle: &Bundle) -> BundleReport {
        let boxes = bundle
            .boxes
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let (payload_kind, child_count, scalar) = match &b.payload {
                    None => ("missing", 0, None),
                    Some(BoxPayload::Scalar(v)) => ("scalar", 0, Some(render_scalar(v))),
                    Some(BoxPayload::Repeated(rv)) => {
                        let kind = match &rv.payload {
                            RepeatedPayload::BoxIds(_) => "repeated",
                            _ => "repeated-inline",
                        };
                        (kind, rv.payload.len(), None)
                    }
                    Some(BoxPayload::Members(mv)) => ("members", mv.value_box_ids.len(), None),
                };
                BoxInfo {
                    id: i as u32 + 1,
                    type_metadata_id: b.type_metadata_id,
                    payload_kind,
                    child_count,
                    scalar,
                }
            })
            .collect();

        BundleReport {
            box_count: bundle.boxes.len(),
            string_count: bundle.strings.len(),
            type_count: bundle.type_guids.len(),
            transformer_count: bundle.transformer_guids.len(),
            layout_count: bundle.storable_type_metadata.len(),
            array_metadata_count: bundle.array_metadata.len(),
            root_box_id: bundle.root_box_id,
            boxes,
        }
    }
}

fn render_scalar(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Int(v) => format!("int:{v}"),
        ScalarValue::Uint(v) => format!("uint:{v}"),
        ScalarValue::Zig(v) => format!("zig:{v}"),
        ScalarValue::Float(v) => format!("f32:{v}"),
        ScalarValue::Double(v) => format!("f64:{v}"),
        ScalarValue::Bytes(v) => format!("bytes[{}]", v.len()),
    }
}
