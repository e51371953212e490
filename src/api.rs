//! High-level entry points combining the mapper and the codec.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::codec;
use crate::compression::NoCompression;
use crate::error::Result;
use crate::mapper::{MapInfo, Mapper, UnmapInfo};
use crate::object::Obj;
use crate::registry::Registry;

/// Builder-style facade over one pack or unpack operation.
#[derive(Debug, Default)]
pub struct Graphpack {
    use_compression: bool,
    registry: Option<Arc<Registry>>,
    cancel: Option<CancelToken>,
}

impl Graphpack {
    /// Starts a builder with default options.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Enables body compression (LZ4 when the `lz4_flex` feature is on;
    /// otherwise a no-op).
    pub fn compression(mut self, enable: bool) -> Self {
        self.use_compression = enable;
        self
    }

    /// Resolves types against an explicit registry instead of the global
    /// one.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attaches a cancellation token to the walk.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Serializes a graph to envelope bytes with default options.
    pub fn pack(root: &Obj) -> Result<Vec<u8>> {
        Self::default().write(root).map(|(bytes, _)| bytes)
    }

    /// Reconstructs a graph from envelope bytes with default options.
    pub fn unpack(bytes: &[u8]) -> Result<Option<Obj>> {
        Self::default().read(bytes).map(|(root, _)| root)
    }

    /// Serializes a graph to envelope bytes, returning the walk info.
    pub fn write(&self, root: &Obj) -> Result<(Vec<u8>, MapInfo)> {
        let mut mapper = self.mapper();
        let (bundle, info) = mapper.serialize_graph(root)?;

        let bytes = if self.use_compression {
            #[cfg(feature = "lz4_flex")]
            {
                codec::encode_with(&bundle, &crate::compression::Lz4Compressor)?
            }
            #[cfg(not(feature = "lz4_flex"))]
            {
                codec::encode_with(&bundle, &NoCompression)?
            }
        } else {
            codec::encode_with(&bundle, &NoCompression)?
        };
        Ok((bytes, info))
    }

    /// Serializes a graph directly into a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W, root: &Obj) -> Result<MapInfo> {
        let (bytes, info) = self.write(root)?;
        writer.write_all(&bytes)?;
        Ok(info)
    }

    /// Reconstructs a graph from envelope bytes, returning the
    /// reconstruction info.
    pub fn read(&self, bytes: &[u8]) -> Result<(Option<Obj>, UnmapInfo)> {
        let bundle = codec::decode(bytes)?;
        let mut mapper = self.mapper();
        mapper.deserialize_graph(&bundle)
    }

    /// Reconstructs a graph from a reader.
    pub fn read_from<R: Read>(&self, reader: &mut R) -> Result<(Option<Obj>, UnmapInfo)> {
        let bundle = codec::read_from(reader)?;
        let mut mapper = self.mapper();
        mapper.deserialize_graph(&bundle)
    }

    fn mapper(&self) -> Mapper {
        let mut mapper = match &self.registry {
            Some(registry) => Mapper::with_registry(registry.clone()),
            None => Mapper::new(),
        };
        if let Some(token) = &self.cancel {
            mapper = mapper.with_cancel(token.clone());
        }
        mapper
    }
}
