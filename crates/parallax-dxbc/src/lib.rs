//! Bounds-checked readers for shader bytecode reflection data.
//!
//! The interception layer needs one thing from compiled shaders: where their named constants
//! live. This crate extracts that from
//!
//! - `DXBC` containers (`RDEF` constant buffers, or a `CTAB` chunk), and
//! - shader-model 2/3 token streams (`CTAB` embedded as a comment block).
//!
//! All parsers treat their input as untrusted and never panic or read out of bounds.

#![forbid(unsafe_code)]

mod container;
mod error;
mod fourcc;

pub mod ctab;
pub mod rdef;
pub mod sm2;

/// Helpers for building synthetic shader blobs in tests.
///
/// Available to this crate's tests and to other crates through the `test-utils` feature.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use crate::container::{Chunk, ShaderContainer, MAX_CHUNK_COUNT};
pub use crate::ctab::{parse_ctab_chunk, ConstantTable, CtabConstant, ParameterClass, RegisterSet};
pub use crate::error::DxbcError;
pub use crate::fourcc::FourCC;
pub use crate::rdef::{parse_rdef_chunk, ConstantBufferDesc, ResourceDefinitions, VariableDesc};
pub use crate::sm2::{parse_token_stream_ctab, token_stream_stage, TokenStreamStage};
