//! The physical envelope codec.
//!
//! A serialized envelope is a small fixed header followed by the
//! bincode-encoded [`Bundle`] body, optionally compressed as one block:
//!
//! ```text
//! Offset | Size | Field          | Description
//! -------|------|----------------|------------------------------------------
//! 0      | 4    | magic          | Magic bytes: "GPK1"
//! 4      | 2    | version        | Format version (u16 LE, currently 1)
//! 6      | 1    | compression_id | Body compression algorithm (0 = none)
//! 7      | ...  | body           | bincode(Bundle), possibly compressed
//! ```
//!
//! The codec is a thin mechanical layer: it moves bytes and checks
//! structure. Strict decoding validates every id range and rejects boxes
//! without a payload, so the mapper can trust the bundle it receives.

use std::io::{Read, Write};

use tracing::debug;

use crate::bundle::{BoxPayload, Bundle, RepeatedPayload};
use crate::compression::{Compressor, CompressorRegistry, NoCompression};
use crate::error::{GraphpackError, Result};

/// Magic bytes identifying the envelope format.
pub const MAGIC_BYTES: [u8; 4] = *b"GPK1";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// The fixed size of the envelope header.
/// Magic(4) + Version(2) + CompressionId(1) = 7
pub const HEADER_SIZE: usize = 7;

/// Encodes a bundle with no body compression.
pub fn encode(bundle: &Bundle) -> Result<Vec<u8>> {
    encode_with(bundle, &NoCompression)
}

/// Encodes a bundle, compressing the body with the given algorithm.
pub fn encode_with(bundle: &Bundle, compressor: &dyn Compressor) -> Result<Vec<u8>> {
    let body = bincode::serde::encode_to_vec(bundle, bincode::config::standard())
        .map_err(|e| GraphpackError::Codec(e.to_string()))?;
    let body = compressor.compress(&body)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.extend_from_slice(&MAGIC_BYTES);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(compressor.id());
    out.extend_from_slice(&body);
    debug!(bytes = out.len(), boxes = bundle.boxes.len(), "envelope encoded");
    Ok(out)
}

/// Decodes and structurally validates an envelope.
pub fn decode(bytes: &[u8]) -> Result<Bundle> {
    if bytes.len() < HEADER_SIZE {
        return Err(GraphpackError::Decode("Envelope shorter than its header".into()));
    }
    if bytes[0..4] != MAGIC_BYTES {
        return Err(GraphpackError::Decode("Wrong magic bytes".into()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(GraphpackError::Decode(format!(
            "Unsupported format version {version}"
        )));
    }
    let compression_id = bytes[6];

    let registry = CompressorRegistry::new();
    let compressor = registry.get(compression_id)?;
    let body = compressor.decompress(&bytes[HEADER_SIZE..])?;

    let (bundle, consumed): (Bundle, usize) =
        bincode::serde::decode_from_slice(&body, bincode::config::standard())
            .map_err(|e| GraphpackError::Codec(e.to_string()))?;
    if consumed != body.len() {
        return Err(GraphpackError::Decode(format!(
            "{} trailing bytes after the envelope body",
            body.len() - consumed
        )));
    }
    validate(&bundle)?;
    Ok(bundle)
}

/// Writes an encoded envelope to a writer.
pub fn write_to<W: Write>(writer: &mut W, bundle: &Bundle) -> Result<()> {
    let bytes = encode(bundle)?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Reads and decodes an envelope from a reader.
pub fn read_from<R: Read>(reader: &mut R) -> Result<Bundle> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes)
}

fn check_id(id: u32, len: usize, what: &str, required: bool) -> Result<()> {
    if id == 0 {
        if required {
            return Err(GraphpackError::Decode(format!("Missing required {what} id")));
        }
        return Ok(());
    }
    if id as usize > len {
        return Err(GraphpackError::Decode(format!(
            "{what} id {id} out of range (table holds {len})"
        )));
    }
    Ok(())
}

/// Structural validation of a decoded bundle: every id must land inside its
/// table, every box must carry exactly one payload, and array shapes must be
/// internally consistent.
pub fn validate(bundle: &Bundle) -> Result<()> {
    let boxes = bundle.boxes.len();
    let strings = bundle.strings.len();
    let layouts = bundle.storable_type_metadata.len();
    let metas = bundle.type_metadata.len();

    if bundle.root_box_id == 0 && boxes != 0 {
        return Err(GraphpackError::Decode(
            "Envelope has boxes but no root box id".into(),
        ));
    }
    check_id(bundle.root_box_id, boxes, "root box", false)?;

    for (i, meta) in bundle.type_metadata.iter().enumerate() {
        let id = i + 1;
        check_id(meta.type_id, bundle.type_guids.len(), "type", true)
            .map_err(|e| GraphpackError::Decode(format!("Type metadata {id}: {e}")))?;
        for &arg in &meta.generic_argument_ids {
            check_id(arg, metas, "type metadata", true)
                .map_err(|e| GraphpackError::Decode(format!("Type metadata {id}: {e}")))?;
        }
        check_id(
            meta.transformer_id,
            bundle.transformer_guids.len(),
            "transformer",
            false,
        )
        .map_err(|e| GraphpackError::Decode(format!("Type metadata {id}: {e}")))?;
    }

    for (i, layout) in bundle.storable_type_metadata.iter().enumerate() {
        let id = i + 1;
        check_id(layout.type_guid_string_id, strings, "string", true)
            .map_err(|e| GraphpackError::Decode(format!("Layout {id}: {e}")))?;
        check_id(layout.parent_layout_id, layouts, "layout", false)
            .map_err(|e| GraphpackError::Decode(format!("Layout {id}: {e}")))?;
        for &name in &layout.member_name_string_ids {
            check_id(name, strings, "string", true)
                .map_err(|e| GraphpackError::Decode(format!("Layout {id}: {e}")))?;
        }
    }

    for (i, meta) in bundle.array_metadata.iter().enumerate() {
        let id = i + 1;
        if meta.rank as usize != meta.lengths.len() {
            return Err(GraphpackError::Decode(format!(
                "Array metadata {id}: rank {} does not match {} lengths",
                meta.rank,
                meta.lengths.len()
            )));
        }
        if !meta.lower_bounds.is_empty() && meta.lower_bounds.len() != meta.lengths.len() {
            return Err(GraphpackError::Decode(format!(
                "Array metadata {id}: lower bounds do not match rank"
            )));
        }
    }

    for (i, b) in bundle.boxes.iter().enumerate() {
        let id = i + 1;
        check_id(b.type_metadata_id, metas, "type metadata", true)
            .map_err(|e| GraphpackError::Decode(format!("Box {id}: {e}")))?;
        let payload = b
            .payload
            .as_ref()
            .ok_or_else(|| GraphpackError::Decode(format!("Box {id} has no payload")))?;
        match payload {
            BoxPayload::Scalar(_) => {}
            BoxPayload::Repeated(rv) => {
                if let RepeatedPayload::BoxIds(ids) = &rv.payload {
                    for &child in ids {
                        check_id(child, boxes, "box", false)
                            .map_err(|e| GraphpackError::Decode(format!("Box {id}: {e}")))?;
                    }
                }
                check_id(rv.comparer_box_id, boxes, "box", false)
                    .map_err(|e| GraphpackError::Decode(format!("Box {id}: {e}")))?;
                check_id(rv.comparer_type_metadata_id, metas, "type metadata", false)
                    .map_err(|e| GraphpackError::Decode(format!("Box {id}: {e}")))?;
                check_id(rv.array_metadata_id, bundle.array_metadata.len(), "array metadata", false)
                    .map_err(|e| GraphpackError::Decode(format!("Box {id}: {e}")))?;
            }
            BoxPayload::Members(mv) => {
                check_id(mv.storable_type_metadata_id, layouts, "layout", true)
                    .map_err(|e| GraphpackError::Decode(format!("Box {id}: {e}")))?;
                for &child in &mv.value_box_ids {
                    check_id(child, boxes, "box", false)
                        .map_err(|e| GraphpackError::Decode(format!("Box {id}: {e}")))?;
                }
            }
        }
    }

    Ok(())
}
