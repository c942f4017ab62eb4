use thiserror::Error;

use crate::FourCC;

/// Errors produced while parsing shader containers and reflection chunks.
///
/// Every variant carries enough context to locate the offending field; none of the parsers panic
/// on malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DxbcError {
    /// The fixed container header is missing or inconsistent.
    #[error("malformed DXBC header: {0}")]
    MalformedHeader(String),
    /// A chunk offset points outside the container or into the header.
    #[error("malformed DXBC chunk offsets: {0}")]
    MalformedOffsets(String),
    /// A read would run past the end of the available bytes.
    #[error("out of bounds: need {len} bytes at {offset}, buffer length is {available}")]
    OutOfBounds {
        /// Byte offset of the attempted read.
        offset: usize,
        /// Length of the attempted read.
        len: usize,
        /// Bytes actually available.
        available: usize,
    },
    /// A chunk parsed structurally but its contents are invalid.
    #[error("invalid {fourcc} chunk: {reason}")]
    InvalidChunk {
        /// Chunk identifier.
        fourcc: FourCC,
        /// What was wrong.
        reason: String,
    },
    /// A shader-model 2/3 token stream does not start with a recognised version token.
    #[error("unrecognised shader version token {0:#010x}")]
    BadVersionToken(u32),
}

impl DxbcError {
    pub(crate) fn invalid_chunk(fourcc: FourCC, reason: impl Into<String>) -> Self {
        Self::InvalidChunk {
            fourcc,
            reason: reason.into(),
        }
    }
}

/// Reads a little-endian `u32` at `offset`.
pub(crate) fn read_u32_le(bytes: &[u8], offset: usize) -> Result<u32, DxbcError> {
    let slice = read_slice(bytes, offset, 4)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Reads a little-endian `u16` at `offset`.
pub(crate) fn read_u16_le(bytes: &[u8], offset: usize) -> Result<u16, DxbcError> {
    let slice = read_slice(bytes, offset, 2)?;
    Ok(u16::from_le_bytes([slice[0], slice[1]]))
}

pub(crate) fn read_slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], DxbcError> {
    let oob = || DxbcError::OutOfBounds {
        offset,
        len,
        available: bytes.len(),
    };
    let end = offset.checked_add(len).ok_or_else(oob)?;
    bytes.get(offset..end).ok_or_else(oob)
}

/// Reads a NUL-terminated string starting at `offset`.
///
/// Non-UTF-8 bytes are replaced; a missing terminator is an error rather than an implicit
/// end-of-buffer string.
pub(crate) fn read_cstring(bytes: &[u8], offset: usize, fourcc: FourCC) -> Result<String, DxbcError> {
    let tail = bytes.get(offset..).ok_or(DxbcError::OutOfBounds {
        offset,
        len: 1,
        available: bytes.len(),
    })?;
    let Some(nul) = tail.iter().position(|&b| b == 0) else {
        return Err(DxbcError::invalid_chunk(
            fourcc,
            format!("unterminated string at offset {offset}"),
        ));
    };
    Ok(String::from_utf8_lossy(&tail[..nul]).into_owned())
}
