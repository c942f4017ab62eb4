//! `RDEF` resource definitions: constant buffers and the variables they contain.
//!
//! Only the constant-buffer half of the chunk is decoded; bound resources (textures, samplers)
//! carry no constants and are skipped.

use crate::error::{read_cstring, read_u16_le, read_u32_le, DxbcError};
use crate::FourCC;

const HEADER_LEN: usize = 28;
const CBUFFER_DESC_LEN: usize = 24;
const VARIABLE_DESC_LEN_SM4: usize = 24;
// Shader model 5 appends texture/sampler slot ranges to every variable.
const VARIABLE_DESC_LEN_SM5: usize = 40;
// Safety valve against absurd counts in hostile input.
const MAX_ENTRIES: u32 = 1 << 16;

/// Decoded `RDEF` constant-buffer layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDefinitions {
    /// Raw target token (`0xFFFE` vertex / `0xFFFF` pixel in the high half, version in the low).
    pub target: u32,
    /// Compiler string, if present.
    pub creator: Option<String>,
    /// Constant buffers in declaration order; the position is the buffer's slot index.
    pub constant_buffers: Vec<ConstantBufferDesc>,
}

impl ResourceDefinitions {
    /// Shader model major version encoded in the target token.
    pub fn shader_model_major(&self) -> u8 {
        ((self.target >> 8) & 0xFF) as u8
    }
}

/// One constant buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferDesc {
    pub name: String,
    /// Declared size in bytes.
    pub size: u32,
    pub variables: Vec<VariableDesc>,
}

/// One variable inside a constant buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDesc {
    pub name: String,
    /// Byte offset from the start of the buffer.
    pub start_offset: u32,
    /// Size in bytes.
    pub size: u32,
    pub flags: u32,
    /// Parameter class (scalar, vector, matrix rows/columns, ...), if a type record is present.
    pub class: Option<u16>,
    pub rows: u16,
    pub columns: u16,
}

/// Parses the payload of an `RDEF` chunk.
pub fn parse_rdef_chunk(bytes: &[u8]) -> Result<ResourceDefinitions, DxbcError> {
    let fourcc = FourCC::RDEF;
    if bytes.len() < HEADER_LEN {
        return Err(DxbcError::invalid_chunk(
            fourcc,
            format!("need {HEADER_LEN} header bytes, got {}", bytes.len()),
        ));
    }

    let cb_count = read_u32_le(bytes, 0)?;
    let cb_offset = read_u32_le(bytes, 4)? as usize;
    let target = read_u32_le(bytes, 16)?;
    let creator_offset = read_u32_le(bytes, 24)? as usize;

    if cb_count > MAX_ENTRIES {
        return Err(DxbcError::invalid_chunk(
            fourcc,
            format!("constant buffer count {cb_count} exceeds {MAX_ENTRIES}"),
        ));
    }

    let creator = (creator_offset != 0)
        .then(|| read_cstring(bytes, creator_offset, fourcc))
        .transpose()?;

    let major = (target >> 8) & 0xFF;
    let var_stride = if major >= 5 {
        VARIABLE_DESC_LEN_SM5
    } else {
        VARIABLE_DESC_LEN_SM4
    };

    let mut constant_buffers = Vec::with_capacity(cb_count as usize);
    for i in 0..cb_count as usize {
        let base = cb_offset + i * CBUFFER_DESC_LEN;
        let name_offset = read_u32_le(bytes, base)? as usize;
        let var_count = read_u32_le(bytes, base + 4)?;
        let var_offset = read_u32_le(bytes, base + 8)? as usize;
        let size = read_u32_le(bytes, base + 12)?;

        if var_count > MAX_ENTRIES {
            return Err(DxbcError::invalid_chunk(
                fourcc,
                format!("buffer {i} variable count {var_count} exceeds {MAX_ENTRIES}"),
            ));
        }

        let mut variables = Vec::with_capacity(var_count as usize);
        for v in 0..var_count as usize {
            let vbase = var_offset + v * var_stride;
            let vname_offset = read_u32_le(bytes, vbase)? as usize;
            let start_offset = read_u32_le(bytes, vbase + 4)?;
            let vsize = read_u32_le(bytes, vbase + 8)?;
            let flags = read_u32_le(bytes, vbase + 12)?;
            let type_offset = read_u32_le(bytes, vbase + 16)? as usize;

            let (class, rows, columns) = if type_offset == 0 {
                (None, 0, 0)
            } else {
                (
                    Some(read_u16_le(bytes, type_offset)?),
                    read_u16_le(bytes, type_offset + 4)?,
                    read_u16_le(bytes, type_offset + 6)?,
                )
            };

            variables.push(VariableDesc {
                name: read_cstring(bytes, vname_offset, fourcc)?,
                start_offset,
                size: vsize,
                flags,
                class,
                rows,
                columns,
            });
        }

        constant_buffers.push(ConstantBufferDesc {
            name: read_cstring(bytes, name_offset, fourcc)?,
            size,
            variables,
        });
    }

    Ok(ResourceDefinitions {
        target,
        creator,
        constant_buffers,
    })
}
