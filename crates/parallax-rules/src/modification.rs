//! Modification operations: how one constant is split into left and right variants.
//!
//! Operation ids are interpreted per register count; the same id means different things for a
//! vector and a matrix.

use tracing::debug;

use crate::math::{Eye, Mat4};
use crate::view::{EyePair, ViewMath};

/// Register count of a single `float4` constant.
pub const VECTOR_REGISTERS: u32 = 1;
/// Register count of a `float4x4` constant.
pub const MATRIX_REGISTERS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOp {
    None,
    /// Offset the separation-axis component by the eye separation.
    SimpleTranslate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixOp {
    None,
    SimpleTranslate,
    ViewProjectionTranslate,
    ViewProjectionTranslateNoRoll,
    ViewProjection,
    Hud,
    Gui,
    ConvergenceOffset,
    /// Leaves shadow-map matrices alone, translates everything else like
    /// [`MatrixOp::ViewProjectionTranslate`].
    ShadowFix,
}

/// A resolved operation for one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    Vector(VectorOp),
    Matrix(MatrixOp),
}

impl Modification {
    /// Resolves `operation` for a rule addressing `register_count` registers.
    ///
    /// Unknown ids and unsupported register counts yield `None`.
    pub fn create(register_count: u32, operation: u32) -> Option<Self> {
        let created = match register_count {
            VECTOR_REGISTERS => match operation {
                0 => Some(Modification::Vector(VectorOp::None)),
                1 => Some(Modification::Vector(VectorOp::SimpleTranslate)),
                _ => None,
            },
            MATRIX_REGISTERS => {
                let op = match operation {
                    0 => MatrixOp::None,
                    1 => MatrixOp::SimpleTranslate,
                    2 => MatrixOp::ViewProjectionTranslate,
                    3 => MatrixOp::ViewProjectionTranslateNoRoll,
                    4 => MatrixOp::ViewProjection,
                    5 => MatrixOp::Hud,
                    6 => MatrixOp::Gui,
                    7 => MatrixOp::ConvergenceOffset,
                    8 => MatrixOp::ShadowFix,
                    _ => return None,
                };
                Some(Modification::Matrix(op))
            }
            _ => None,
        };
        if created.is_none() {
            debug!(register_count, operation, "no modification for operation id");
        }
        created
    }

    pub fn register_count(self) -> u32 {
        match self {
            Modification::Vector(_) => VECTOR_REGISTERS,
            Modification::Matrix(_) => MATRIX_REGISTERS,
        }
    }

    /// Byte size of the constant this operation rewrites.
    pub fn byte_len(self) -> usize {
        self.register_count() as usize * 16
    }
}

impl VectorOp {
    pub fn apply(self, math: &ViewMath, input: [f32; 4]) -> ([f32; 4], [f32; 4]) {
        match self {
            VectorOp::None => (input, input),
            VectorOp::SimpleTranslate => {
                let axis = math.separation_axis().index();
                let separation = math.scalars().separation_world;
                let mut out = [input; 2];
                for eye in Eye::BOTH {
                    out[eye.index()][axis] += separation * eye.sign();
                }
                (out[0], out[1])
            }
        }
    }
}

impl MatrixOp {
    pub fn apply(self, math: &ViewMath, input: &Mat4) -> (Mat4, Mat4) {
        let m = math.matrices();
        let post = |pair: &EyePair| (*input * pair[0], *input * pair[1]);
        match self {
            MatrixOp::None => (*input, *input),
            MatrixOp::SimpleTranslate => post(&m.transform),
            MatrixOp::ViewProjectionTranslate => post(&m.view_projection_trans),
            MatrixOp::ViewProjectionTranslateNoRoll => post(&m.view_projection_trans_no_roll),
            MatrixOp::ViewProjection => post(&m.view_projection),
            MatrixOp::Hud => post(&m.hud),
            MatrixOp::Gui => post(&m.gui),
            MatrixOp::ConvergenceOffset => post(&m.convergence_off),
            MatrixOp::ShadowFix => {
                let m33 = input.m[3][3];
                let m10 = input.m[1][0];
                if (-10.0 < m33 && m33 < 10.0) || m10 > 1.0 {
                    (*input, *input)
                } else {
                    post(&m.view_projection_trans)
                }
            }
        }
    }
}
