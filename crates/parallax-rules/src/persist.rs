//! Persisted rule-set blocks.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! config record      64 bytes
//! rule count         u32
//! rule records       count * 96 bytes
//! global count       u32
//! global indices     count * u32
//! trailing count     u32
//! trailing entries   count * u32           (constant-buffer flavor: fetched shader hashes)
//!                    count * (u32, u32)    (constant-register flavor: hash, rule index)
//! ```
//!
//! Every count is checked against the bytes that remain before its section is consumed. Parsing
//! stops at the first section that does not fit; earlier sections are still returned.

use bytemuck::{Pod, Zeroable};
use tracing::warn;

use crate::config::{RollImpl, StereoConfig};
use crate::error::{RuleSetError, Section};
use crate::math::Axis;
use crate::rule::{ModificationRule, NameMatch, ShaderRule};
use crate::shader::ShaderHash;

pub const CONFIG_RECORD_LEN: usize = core::mem::size_of::<ConfigRecord>();
pub const RULE_RECORD_LEN: usize = core::mem::size_of::<RuleRecord>();
pub const RULE_NAME_LEN: usize = 64;

const FLAG_TRACE_MODIFICATIONS: u32 = 1 << 0;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ConfigRecord {
    ipd: f32,
    world_scale: f32,
    convergence: f32,
    aspect_multiplier: f32,
    fov_h: f32,
    roll_impl: u32,
    separation_axis: u32,
    squash: f32,
    gui_depth: f32,
    hud_distance: f32,
    hud_depth: f32,
    frustum_asymmetry: f32,
    physical_screen_size: f32,
    lens_x_center_offset: f32,
    flags: u32,
    reserved: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RuleRecord {
    name: [u8; RULE_NAME_LEN],
    buffer_index: u32,
    buffer_size: u32,
    start_register: u32,
    use_name: u8,
    use_partial_name: u8,
    use_buffer_index: u8,
    use_buffer_size: u8,
    use_start_register: u8,
    pad0: [u8; 3],
    register_count: u32,
    operation: u32,
    transpose: u8,
    pad1: [u8; 3],
}

const _: () = assert!(CONFIG_RECORD_LEN == 64);
const _: () = assert!(RULE_RECORD_LEN == 96);

impl From<&StereoConfig> for ConfigRecord {
    fn from(c: &StereoConfig) -> Self {
        Self {
            ipd: c.ipd,
            world_scale: c.world_scale,
            convergence: c.convergence,
            aspect_multiplier: c.aspect_multiplier,
            fov_h: c.fov_h,
            roll_impl: c.roll_impl.to_raw(),
            separation_axis: c.separation_axis.index() as u32,
            squash: c.squash,
            gui_depth: c.gui_depth,
            hud_distance: c.hud_distance,
            hud_depth: c.hud_depth,
            frustum_asymmetry: c.frustum_asymmetry,
            physical_screen_size: c.physical_screen_size,
            lens_x_center_offset: c.lens_x_center_offset,
            flags: if c.trace_modifications {
                FLAG_TRACE_MODIFICATIONS
            } else {
                0
            },
            reserved: 0,
        }
    }
}

impl ConfigRecord {
    fn to_config(self) -> StereoConfig {
        let separation_axis = Axis::from_index(self.separation_axis).unwrap_or_else(|| {
            warn!(
                axis = self.separation_axis,
                "unknown separation axis in persisted config; using x"
            );
            Axis::X
        });
        StereoConfig {
            ipd: self.ipd,
            world_scale: self.world_scale,
            convergence: self.convergence,
            aspect_multiplier: self.aspect_multiplier,
            fov_h: self.fov_h,
            roll_impl: RollImpl::from_raw(self.roll_impl),
            separation_axis,
            squash: self.squash,
            gui_depth: self.gui_depth,
            hud_distance: self.hud_distance,
            hud_depth: self.hud_depth,
            frustum_asymmetry: self.frustum_asymmetry,
            physical_screen_size: self.physical_screen_size,
            lens_x_center_offset: self.lens_x_center_offset,
            trace_modifications: self.flags & FLAG_TRACE_MODIFICATIONS != 0,
        }
    }
}

impl From<&ModificationRule> for RuleRecord {
    fn from(rule: &ModificationRule) -> Self {
        let mut record = RuleRecord::zeroed();
        // Keep room for the terminator; never split a UTF-8 sequence.
        let mut len = rule.constant_name.len().min(RULE_NAME_LEN - 1);
        while !rule.constant_name.is_char_boundary(len) {
            len -= 1;
        }
        record.name[..len].copy_from_slice(&rule.constant_name.as_bytes()[..len]);

        record.use_name = u8::from(rule.name_match == NameMatch::Exact);
        record.use_partial_name = u8::from(rule.name_match == NameMatch::Partial);
        if let Some(index) = rule.buffer_index {
            record.use_buffer_index = 1;
            record.buffer_index = index;
        }
        if let Some(size) = rule.buffer_size {
            record.use_buffer_size = 1;
            record.buffer_size = size;
        }
        if let Some(register) = rule.start_register {
            record.use_start_register = 1;
            record.start_register = register;
        }
        record.register_count = rule.register_count;
        record.operation = rule.operation;
        record.transpose = u8::from(rule.transpose);
        record
    }
}

impl RuleRecord {
    fn to_rule(self) -> ModificationRule {
        let name_len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(RULE_NAME_LEN);
        // A record may enable both naming flags; substring matching subsumes the exact one.
        let name_match = if self.use_partial_name != 0 {
            NameMatch::Partial
        } else if self.use_name != 0 {
            NameMatch::Exact
        } else {
            NameMatch::Ignore
        };
        ModificationRule {
            constant_name: String::from_utf8_lossy(&self.name[..name_len]).into_owned(),
            name_match,
            start_register: (self.use_start_register != 0).then_some(self.start_register),
            buffer_index: (self.use_buffer_index != 0).then_some(self.buffer_index),
            buffer_size: (self.use_buffer_size != 0).then_some(self.buffer_size),
            register_count: self.register_count,
            operation: self.operation,
            transpose: self.transpose != 0,
        }
    }
}

/// Which trailing block a persisted rule set carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleSetFlavor {
    /// Constant-buffer pipelines: content hashes of fetched shaders.
    #[default]
    ConstantBuffers,
    /// Constant-register pipelines: shader-specific `(hash, rule index)` pairs.
    ConstantRegisters,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrailingBlock {
    FetchedShaders(Vec<ShaderHash>),
    ShaderRules(Vec<ShaderRule>),
}

/// A decoded (possibly partial) rule-set block.
///
/// Sections that were not present or did not fit are `None`; `error` says where parsing stopped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleSetBlock {
    pub config: Option<StereoConfig>,
    pub rules: Option<Vec<ModificationRule>>,
    pub global_indices: Option<Vec<u32>>,
    pub trailing: Option<TrailingBlock>,
    pub error: Option<RuleSetError>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, section: Section, len: usize) -> Result<&'a [u8], RuleSetError> {
        let available = self.remaining();
        if len > available {
            return Err(RuleSetError::Truncated {
                section,
                needed: len,
                available,
            });
        }
        let bytes = self.bytes;
        let out = &bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u32(&mut self, section: Section) -> Result<u32, RuleSetError> {
        let b = self.take(section, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a count and checks `count * record_len` fits in what remains.
    fn records(&mut self, section: Section, record_len: usize) -> Result<(u32, &'a [u8]), RuleSetError> {
        let count = self.u32(section)?;
        let available = self.remaining();
        let total = (count as usize)
            .checked_mul(record_len)
            .filter(|&total| total <= available)
            .ok_or(RuleSetError::CountOverflow {
                section,
                count,
                available,
            })?;
        Ok((count, self.take(section, total)?))
    }
}

fn read_u32s(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

impl RuleSetBlock {
    /// Decodes `bytes`, keeping every section up to the first one that does not fit.
    pub fn parse(bytes: &[u8], flavor: RuleSetFlavor) -> Self {
        let mut block = Self::default();
        if let Err(err) = block.parse_sections(bytes, flavor) {
            warn!(%err, "persisted rule set truncated");
            block.error = Some(err);
        }
        block
    }

    fn parse_sections(&mut self, bytes: &[u8], flavor: RuleSetFlavor) -> Result<(), RuleSetError> {
        let mut reader = Reader { bytes, pos: 0 };

        let config = reader.take(Section::Config, CONFIG_RECORD_LEN)?;
        self.config = Some(bytemuck::pod_read_unaligned::<ConfigRecord>(config).to_config());

        let (_, rules) = reader.records(Section::Rules, RULE_RECORD_LEN)?;
        self.rules = Some(
            rules
                .chunks_exact(RULE_RECORD_LEN)
                .map(|raw| bytemuck::pod_read_unaligned::<RuleRecord>(raw).to_rule())
                .collect(),
        );

        let (_, indices) = reader.records(Section::GlobalIndices, 4)?;
        self.global_indices = Some(read_u32s(indices).collect());

        self.trailing = Some(match flavor {
            RuleSetFlavor::ConstantBuffers => {
                let (_, hashes) = reader.records(Section::Trailing, 4)?;
                TrailingBlock::FetchedShaders(read_u32s(hashes).map(ShaderHash).collect())
            }
            RuleSetFlavor::ConstantRegisters => {
                let (_, pairs) = reader.records(Section::Trailing, 8)?;
                let words: Vec<u32> = read_u32s(pairs).collect();
                TrailingBlock::ShaderRules(
                    words
                        .chunks_exact(2)
                        .map(|pair| ShaderRule {
                            hash: ShaderHash(pair[0]),
                            rule_index: pair[1],
                        })
                        .collect(),
                )
            }
        });
        Ok(())
    }

    /// Encodes the present sections. Encoding stops at the first absent one.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let Some(config) = &self.config else {
            return out;
        };
        out.extend_from_slice(bytemuck::bytes_of(&ConfigRecord::from(config)));

        let Some(rules) = &self.rules else {
            return out;
        };
        out.extend_from_slice(&(rules.len() as u32).to_le_bytes());
        for rule in rules {
            out.extend_from_slice(bytemuck::bytes_of(&RuleRecord::from(rule)));
        }

        let Some(indices) = &self.global_indices else {
            return out;
        };
        out.extend_from_slice(&(indices.len() as u32).to_le_bytes());
        for index in indices {
            out.extend_from_slice(&index.to_le_bytes());
        }

        match &self.trailing {
            None => {}
            Some(TrailingBlock::FetchedShaders(hashes)) => {
                out.extend_from_slice(&(hashes.len() as u32).to_le_bytes());
                for hash in hashes {
                    out.extend_from_slice(&hash.0.to_le_bytes());
                }
            }
            Some(TrailingBlock::ShaderRules(pairs)) => {
                out.extend_from_slice(&(pairs.len() as u32).to_le_bytes());
                for pair in pairs {
                    out.extend_from_slice(&pair.hash.0.to_le_bytes());
                    out.extend_from_slice(&pair.rule_index.to_le_bytes());
                }
            }
        }
        out
    }
}
