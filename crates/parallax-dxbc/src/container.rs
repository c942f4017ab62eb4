use core::fmt;

use crate::ctab::{parse_ctab_chunk, ConstantTable};
use crate::error::{read_slice, read_u32_le, DxbcError};
use crate::rdef::{parse_rdef_chunk, ResourceDefinitions};
use crate::FourCC;

// magic + checksum + reserved + total_size + chunk_count
const HEADER_LEN: usize = 4 + 16 + 4 + 4 + 4;

/// Upper bound on the chunk table. Real containers carry a handful of chunks; the cap keeps a
/// hostile header from driving a huge validation loop.
pub const MAX_CHUNK_COUNT: u32 = 4096;

/// One chunk inside a container.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Chunk identifier.
    pub fourcc: FourCC,
    /// Raw payload.
    pub data: &'a [u8],
}

impl fmt::Debug for Chunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("fourcc", &self.fourcc)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// A validated `DXBC` container.
///
/// All chunk offsets and sizes are checked against the declared `total_size` up front, so chunk
/// iteration afterwards cannot fail.
#[derive(Debug, Clone)]
pub struct ShaderContainer<'a> {
    chunks: Vec<Chunk<'a>>,
    total_size: u32,
}

impl<'a> ShaderContainer<'a> {
    /// Returns `true` if `bytes` starts with the container magic.
    pub fn is_container(bytes: &[u8]) -> bool {
        bytes.starts_with(&FourCC::DXBC.0)
    }

    /// Parses and validates a container.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DxbcError> {
        if bytes.len() < HEADER_LEN {
            return Err(DxbcError::MalformedHeader(format!(
                "need at least {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if !Self::is_container(bytes) {
            return Err(DxbcError::MalformedHeader("bad magic".into()));
        }

        let total_size = read_u32_le(bytes, 24)?;
        let chunk_count = read_u32_le(bytes, 28)?;
        if chunk_count > MAX_CHUNK_COUNT {
            return Err(DxbcError::MalformedOffsets(format!(
                "chunk_count {chunk_count} exceeds maximum {MAX_CHUNK_COUNT}"
            )));
        }
        if (total_size as usize) < HEADER_LEN || total_size as usize > bytes.len() {
            return Err(DxbcError::MalformedHeader(format!(
                "total_size {total_size} outside {HEADER_LEN}..={}",
                bytes.len()
            )));
        }
        let bytes = &bytes[..total_size as usize];

        let table_end = HEADER_LEN + chunk_count as usize * 4;
        if table_end > bytes.len() {
            return Err(DxbcError::MalformedOffsets(format!(
                "chunk offset table ends at {table_end}, but total_size is {total_size}"
            )));
        }

        let mut chunks = Vec::with_capacity(chunk_count as usize);
        for i in 0..chunk_count as usize {
            let chunk_offset = read_u32_le(bytes, HEADER_LEN + i * 4)? as usize;
            if chunk_offset < table_end {
                return Err(DxbcError::MalformedOffsets(format!(
                    "chunk {i} offset {chunk_offset} points into the header (need >= {table_end})"
                )));
            }
            let fourcc = FourCC(
                read_slice(bytes, chunk_offset, 4)?
                    .try_into()
                    .map_err(|_| DxbcError::MalformedOffsets(format!("chunk {i} fourcc")))?,
            );
            let size = read_u32_le(bytes, chunk_offset + 4)? as usize;
            let data = read_slice(bytes, chunk_offset + 8, size).map_err(|_| {
                DxbcError::MalformedOffsets(format!(
                    "chunk {i} ({fourcc}) data of {size} bytes at {} exceeds total_size {total_size}",
                    chunk_offset + 8
                ))
            })?;
            chunks.push(Chunk { fourcc, data });
        }

        Ok(Self { chunks, total_size })
    }

    /// Declared container size in bytes.
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    /// All chunks in file order.
    pub fn chunks(&self) -> &[Chunk<'a>] {
        &self.chunks
    }

    /// First chunk with the given identifier.
    pub fn get_chunk(&self, fourcc: FourCC) -> Option<Chunk<'a>> {
        self.chunks.iter().copied().find(|c| c.fourcc == fourcc)
    }

    /// Parses the first `RDEF` chunk, if present.
    pub fn resource_definitions(&self) -> Option<Result<ResourceDefinitions, DxbcError>> {
        self.get_chunk(FourCC::RDEF)
            .map(|chunk| parse_rdef_chunk(chunk.data))
    }

    /// Parses the first `CTAB` chunk, if present.
    pub fn constant_table(&self) -> Option<Result<ConstantTable, DxbcError>> {
        self.get_chunk(FourCC::CTAB)
            .map(|chunk| parse_ctab_chunk(chunk.data))
    }
}
