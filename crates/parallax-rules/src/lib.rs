//! Constant modification rules for stereoscopic rendering.
//!
//! Shaders read their transforms from constant buffers (or, for shader model 2/3, from a flat
//! register file). This crate decides which of those constants to split per eye and how:
//!
//! - [`RuleRegistry`] holds authored [`ModificationRule`]s, reflects shaders into
//!   [`ShaderRecord`]s, and memoizes which rules apply to a buffer layout ([`RuleBinding`]).
//! - [`apply_to_buffer`] rewrites raw constant bytes into left and right variants.
//! - [`ViewMath`] computes the per-eye matrices the operations multiply by.
//! - [`RegisterShaderRules`] handles the register-file pipelines.
//! - [`RuleSetBlock`] reads and writes the persisted binary rule-set format.

#![forbid(unsafe_code)]

mod binding;
mod engine;
mod error;
mod registry;
mod rule;

pub mod config;
pub mod math;
pub mod modification;
pub mod persist;
pub mod register_rules;
pub mod shader;
pub mod view;

pub use crate::binding::{RuleBinding, RuleRegister, RuleSetIndex};
pub use crate::config::{ConfigError, RollImpl, StereoConfig};
pub use crate::engine::{apply_to_buffer, REGISTER_BYTES};
pub use crate::error::{RuleSetError, Section};
pub use crate::math::{Axis, Eye, Mat4};
pub use crate::modification::{MatrixOp, Modification, VectorOp};
pub use crate::persist::{RuleSetBlock, RuleSetFlavor, TrailingBlock};
pub use crate::register_rules::{RegisterConstantRule, RegisterShaderRules};
pub use crate::registry::{register_capacity, rule_register, RuleRegistry};
pub use crate::rule::{ModificationRule, NameMatch, ShaderRule};
pub use crate::shader::{
    ConstantClass, RegisterRange, ShaderBuffer, ShaderConstant, ShaderHash, ShaderRecord,
    ShaderStage,
};
pub use crate::view::{ViewMath, ViewMatrices, ViewScalars};
