//! Legacy constant tables (`CTAB`), as emitted for shader models 1 to 3.
//!
//! All offsets inside the table are relative to the start of the `CTAB` payload.

use crate::error::{read_cstring, read_u16_le, read_u32_le, DxbcError};
use crate::FourCC;

const HEADER_LEN: usize = 28;
const CONSTANT_INFO_LEN: usize = 20;
const MAX_CONSTANTS: u32 = 1 << 14;

/// Register file a constant lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSet {
    Bool,
    Int4,
    Float4,
    Sampler,
    Unknown(u16),
}

impl RegisterSet {
    fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Bool,
            1 => Self::Int4,
            2 => Self::Float4,
            3 => Self::Sampler,
            other => Self::Unknown(other),
        }
    }
}

/// Parameter class of a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterClass {
    Scalar,
    Vector,
    MatrixRows,
    MatrixColumns,
    Object,
    Struct,
    Unknown(u16),
}

impl ParameterClass {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Scalar,
            1 => Self::Vector,
            2 => Self::MatrixRows,
            3 => Self::MatrixColumns,
            4 => Self::Object,
            5 => Self::Struct,
            other => Self::Unknown(other),
        }
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, Self::MatrixRows | Self::MatrixColumns)
    }
}

/// A decoded constant table.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantTable {
    pub creator: Option<String>,
    pub target: Option<String>,
    pub constants: Vec<CtabConstant>,
}

/// One entry in a constant table.
#[derive(Debug, Clone, PartialEq)]
pub struct CtabConstant {
    pub name: String,
    pub register_set: RegisterSet,
    pub register_index: u16,
    pub register_count: u16,
    pub class: ParameterClass,
    pub rows: u16,
    pub columns: u16,
    pub elements: u16,
    /// Default value, `register_count` float4 registers, if the compiler emitted one.
    pub default_value: Option<Vec<f32>>,
}

/// Parses the payload of a `CTAB` chunk (or of an SM2/SM3 `CTAB` comment block).
pub fn parse_ctab_chunk(bytes: &[u8]) -> Result<ConstantTable, DxbcError> {
    let fourcc = FourCC::CTAB;
    if bytes.len() < HEADER_LEN {
        return Err(DxbcError::invalid_chunk(
            fourcc,
            format!("need {HEADER_LEN} header bytes, got {}", bytes.len()),
        ));
    }

    let creator_offset = read_u32_le(bytes, 4)? as usize;
    let count = read_u32_le(bytes, 12)?;
    let info_offset = read_u32_le(bytes, 16)? as usize;
    let target_offset = read_u32_le(bytes, 24)? as usize;

    if count > MAX_CONSTANTS {
        return Err(DxbcError::invalid_chunk(
            fourcc,
            format!("constant count {count} exceeds {MAX_CONSTANTS}"),
        ));
    }

    let creator = (creator_offset != 0)
        .then(|| read_cstring(bytes, creator_offset, fourcc))
        .transpose()?;
    let target = (target_offset != 0)
        .then(|| read_cstring(bytes, target_offset, fourcc))
        .transpose()?;

    let mut constants = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let base = info_offset + i * CONSTANT_INFO_LEN;
        let name_offset = read_u32_le(bytes, base)? as usize;
        let register_set = RegisterSet::from_raw(read_u16_le(bytes, base + 4)?);
        let register_index = read_u16_le(bytes, base + 6)?;
        let register_count = read_u16_le(bytes, base + 8)?;
        let type_offset = read_u32_le(bytes, base + 12)? as usize;
        let default_offset = read_u32_le(bytes, base + 16)? as usize;

        let (class, rows, columns, elements) = if type_offset == 0 {
            (ParameterClass::Unknown(u16::MAX), 0, 0, 0)
        } else {
            (
                ParameterClass::from_raw(read_u16_le(bytes, type_offset)?),
                read_u16_le(bytes, type_offset + 4)?,
                read_u16_le(bytes, type_offset + 6)?,
                read_u16_le(bytes, type_offset + 8)?,
            )
        };

        let default_value = if default_offset == 0 {
            None
        } else {
            let floats = register_count as usize * 4;
            let mut values = Vec::with_capacity(floats);
            for f in 0..floats {
                values.push(f32::from_bits(read_u32_le(bytes, default_offset + f * 4)?));
            }
            Some(values)
        };

        constants.push(CtabConstant {
            name: read_cstring(bytes, name_offset, fourcc)?,
            register_set,
            register_index,
            register_count,
            class,
            rows,
            columns,
            elements,
            default_value,
        });
    }

    Ok(ConstantTable {
        creator,
        target,
        constants,
    })
}
