//! Shader model 2/3 token streams.
//!
//! The constant table is stored as a comment block (`0xFFFE` low word) right after the version
//! token, tagged with the `CTAB` fourcc.

use crate::ctab::{parse_ctab_chunk, ConstantTable};
use crate::error::{read_u32_le, DxbcError};
use crate::FourCC;

const VERTEX_VERSION_PREFIX: u32 = 0xFFFE;
const PIXEL_VERSION_PREFIX: u32 = 0xFFFF;
const COMMENT_OPCODE: u32 = 0xFFFE;
const END_TOKEN: u32 = 0x0000_FFFF;

/// Stage encoded in an SM2/SM3 version token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStreamStage {
    Vertex,
    Pixel,
}

/// Decodes the version token at the start of a token stream.
pub fn token_stream_stage(bytes: &[u8]) -> Result<(TokenStreamStage, u8, u8), DxbcError> {
    let version = read_u32_le(bytes, 0)?;
    let stage = match version >> 16 {
        VERTEX_VERSION_PREFIX => TokenStreamStage::Vertex,
        PIXEL_VERSION_PREFIX => TokenStreamStage::Pixel,
        _ => return Err(DxbcError::BadVersionToken(version)),
    };
    Ok((stage, ((version >> 8) & 0xFF) as u8, (version & 0xFF) as u8))
}

/// Locates the embedded `CTAB` comment block and returns its payload.
///
/// Only the comment run directly following the version token is scanned; the first real
/// instruction ends the search.
pub fn find_ctab_comment(bytes: &[u8]) -> Result<Option<&[u8]>, DxbcError> {
    token_stream_stage(bytes)?;

    let mut pos = 4usize;
    while pos + 4 <= bytes.len() {
        let token = read_u32_le(bytes, pos)?;
        if token == END_TOKEN || token & 0xFFFF != COMMENT_OPCODE {
            break;
        }
        let dwords = ((token >> 16) & 0x7FFF) as usize;
        let payload_start = pos + 4;
        let payload_end = payload_start + dwords * 4;
        if payload_end > bytes.len() {
            return Err(DxbcError::OutOfBounds {
                offset: payload_start,
                len: dwords * 4,
                available: bytes.len(),
            });
        }
        if dwords >= 1 && FourCC::from_u32_le(read_u32_le(bytes, payload_start)?) == FourCC::CTAB {
            return Ok(Some(&bytes[payload_start + 4..payload_end]));
        }
        pos = payload_end;
    }
    Ok(None)
}

/// Parses the embedded constant table, if the token stream carries one.
pub fn parse_token_stream_ctab(bytes: &[u8]) -> Result<Option<ConstantTable>, DxbcError> {
    find_ctab_comment(bytes)?
        .map(parse_ctab_chunk)
        .transpose()
}
