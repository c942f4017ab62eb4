//! Reflected shader identity and constant layout.

use parallax_dxbc::{
    parse_token_stream_ctab, ConstantTable, DxbcError, ParameterClass, RegisterSet,
    ResourceDefinitions, ShaderContainer,
};
use tracing::debug;

/// Seed for shader content hashes.
pub const SHADER_HASH_SEED: u32 = 0x5052_4C58;

/// Largest constant buffer a shader can declare, in `float4` registers.
pub const MAX_BUFFER_REGISTERS: u32 = 4096;

/// Seeded 32-bit content hash of shader bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHash(pub u32);

impl ShaderHash {
    pub fn of(bytecode: &[u8]) -> Self {
        Self(xxhash_rust::xxh32::xxh32(bytecode, SHADER_HASH_SEED))
    }
}

impl core::fmt::Display for ShaderHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
        ShaderStage::Compute,
    ];

    pub fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Hull => 1,
            ShaderStage::Domain => 2,
            ShaderStage::Geometry => 3,
            ShaderStage::Pixel => 4,
            ShaderStage::Compute => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantClass {
    Scalar,
    Vector,
    Matrix,
    Other,
}

impl ConstantClass {
    fn from_parameter_class(class: ParameterClass) -> Self {
        match class {
            ParameterClass::Scalar => ConstantClass::Scalar,
            ParameterClass::Vector => ConstantClass::Vector,
            ParameterClass::MatrixRows | ParameterClass::MatrixColumns => ConstantClass::Matrix,
            _ => ConstantClass::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderConstant {
    pub name: String,
    /// Byte offset within the owning buffer.
    pub offset: u32,
    /// Byte size.
    pub size: u32,
    pub register_index: u32,
    pub register_count: u32,
    pub class: ConstantClass,
}

/// Registers `[start, start + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRange {
    pub start: u32,
    pub count: u32,
}

/// One constant buffer as seen by a shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBuffer {
    /// Bind slot.
    pub index: u32,
    pub name: String,
    pub size: u32,
    pub constants: Vec<ShaderConstant>,
    /// Registers inside the buffer that no named constant covers.
    pub unaccounted: Vec<RegisterRange>,
}

/// Immutable reflection record of one shader, keyed by its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderRecord {
    pub hash: ShaderHash,
    pub stage: ShaderStage,
    /// Buffers in slot order. Register-file shaders expose a single buffer at slot 0.
    pub buffers: Vec<ShaderBuffer>,
}

impl ShaderRecord {
    /// Hashes and reflects `bytecode`.
    ///
    /// Accepts `DXBC` containers (constants from `RDEF`, else `CTAB`) and shader-model 2/3 token
    /// streams. Shaders without reflection data produce a record with no buffers.
    pub fn from_bytecode(stage: ShaderStage, bytecode: &[u8]) -> Result<Self, DxbcError> {
        let hash = ShaderHash::of(bytecode);
        let buffers = if ShaderContainer::is_container(bytecode) {
            let container = ShaderContainer::parse(bytecode)?;
            if let Some(defs) = container.resource_definitions().transpose()? {
                buffers_from_rdef(&defs)
            } else if let Some(table) = container.constant_table().transpose()? {
                buffers_from_ctab(&table)
            } else {
                Vec::new()
            }
        } else {
            parse_token_stream_ctab(bytecode)?
                .map(|table| buffers_from_ctab(&table))
                .unwrap_or_default()
        };

        debug!(
            %hash,
            ?stage,
            buffers = buffers.len(),
            "reflected shader"
        );
        Ok(Self {
            hash,
            stage,
            buffers,
        })
    }

    pub fn buffer(&self, index: u32) -> Option<&ShaderBuffer> {
        self.buffers.iter().find(|b| b.index == index)
    }

    /// Constants of the buffer bound at `index`; empty when the shader has no such buffer.
    pub fn constants_in(&self, index: u32) -> &[ShaderConstant] {
        self.buffer(index)
            .map(|b| b.constants.as_slice())
            .unwrap_or(&[])
    }

    /// All constants across buffers.
    pub fn constants(&self) -> impl Iterator<Item = &ShaderConstant> {
        self.buffers.iter().flat_map(|b| b.constants.iter())
    }
}

fn buffers_from_rdef(defs: &ResourceDefinitions) -> Vec<ShaderBuffer> {
    defs.constant_buffers
        .iter()
        .enumerate()
        .map(|(index, cb)| {
            let constants: Vec<ShaderConstant> = cb
                .variables
                .iter()
                .map(|var| ShaderConstant {
                    name: var.name.clone(),
                    offset: var.start_offset,
                    size: var.size,
                    register_index: var.start_offset / 16,
                    register_count: var.size.div_ceil(16),
                    class: var
                        .class
                        .map(|raw| ConstantClass::from_parameter_class(ParameterClass::from_raw(raw)))
                        .unwrap_or(ConstantClass::Other),
                })
                .collect();
            let unaccounted = unaccounted_ranges(cb.size.div_ceil(16), &constants);
            ShaderBuffer {
                index: index as u32,
                name: cb.name.clone(),
                size: cb.size,
                constants,
                unaccounted,
            }
        })
        .collect()
}

fn buffers_from_ctab(table: &ConstantTable) -> Vec<ShaderBuffer> {
    let constants: Vec<ShaderConstant> = table
        .constants
        .iter()
        .filter(|c| c.register_set == RegisterSet::Float4)
        .map(|c| ShaderConstant {
            name: c.name.clone(),
            offset: u32::from(c.register_index) * 16,
            size: u32::from(c.register_count) * 16,
            register_index: u32::from(c.register_index),
            register_count: u32::from(c.register_count),
            class: ConstantClass::from_parameter_class(c.class),
        })
        .collect();
    let registers = constants
        .iter()
        .map(|c| c.register_index + c.register_count)
        .max()
        .unwrap_or(0);
    let unaccounted = unaccounted_ranges(registers, &constants);
    vec![ShaderBuffer {
        index: 0,
        name: String::new(),
        size: registers * 16,
        constants,
        unaccounted,
    }]
}

fn unaccounted_ranges(registers: u32, constants: &[ShaderConstant]) -> Vec<RegisterRange> {
    let registers = registers.min(MAX_BUFFER_REGISTERS);
    let mut covered = vec![false; registers as usize];
    for c in constants {
        let end = c.register_index.saturating_add(c.register_count).min(registers);
        for reg in c.register_index.min(end)..end {
            covered[reg as usize] = true;
        }
    }

    let mut ranges: Vec<RegisterRange> = Vec::new();
    for (reg, _) in covered.iter().enumerate().filter(|(_, c)| !**c) {
        let reg = reg as u32;
        match ranges.last_mut() {
            Some(last) if last.start + last.count == reg => last.count += 1,
            _ => ranges.push(RegisterRange {
                start: reg,
                count: 1,
            }),
        }
    }
    ranges
}
