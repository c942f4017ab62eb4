//! The view/projection matrix graph feeding the modification operations.
//!
//! Every stage depends only on stages computed before it, so [`ViewMath::recompute`] always walks
//! the graph in one fixed order. Partial updates are never attempted; any settings change triggers
//! a full recompute.

use tracing::{debug, warn};

use crate::config::{RollImpl, StereoConfig, IPD_DEFAULT};
use crate::math::{Axis, Eye, Mat4};

const NEAR: f32 = 0.1;
const FAR: f32 = 10.0;
const LEFT: f32 = -0.5;
const RIGHT: f32 = 0.5;

/// Scalar inputs of the graph, derived from a [`StereoConfig`] plus runtime head roll.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewScalars {
    /// Head roll in radians.
    pub roll: f32,
    /// Half the IPD, in world units.
    pub separation_world: f32,
    /// Half the deviation from the default IPD, in world units.
    pub separation_ipd_adjustment: f32,
    /// Vertical field of view in radians.
    pub fov_v: f32,
}

/// Matrices that come in a left/right pair, indexed by [`Eye::index`].
pub type EyePair = [Mat4; 2];

#[derive(Debug, Clone, PartialEq)]
pub struct ViewMatrices {
    pub basic_projection: Mat4,
    pub projection_inv: Mat4,
    pub projection_fov: Mat4,
    pub projection_conv: EyePair,
    pub convergence_off: EyePair,
    pub roll: Mat4,
    pub roll_negative: Mat4,
    pub roll_half: Mat4,
    pub transform: EyePair,
    pub view_projection_trans_no_roll: EyePair,
    pub view_projection: EyePair,
    pub view_projection_trans: EyePair,
    pub squash: Mat4,
    pub hud_distance: Mat4,
    pub hud_3d_depth: EyePair,
    pub hud_3d_depth_shift: EyePair,
    pub gui_3d_depth: EyePair,
    pub hud: EyePair,
    pub gui: EyePair,
}

impl Default for ViewMatrices {
    fn default() -> Self {
        let pair = [Mat4::IDENTITY; 2];
        Self {
            basic_projection: Mat4::IDENTITY,
            projection_inv: Mat4::IDENTITY,
            projection_fov: Mat4::IDENTITY,
            projection_conv: pair,
            convergence_off: pair,
            roll: Mat4::IDENTITY,
            roll_negative: Mat4::IDENTITY,
            roll_half: Mat4::IDENTITY,
            transform: pair,
            view_projection_trans_no_roll: pair,
            view_projection: pair,
            view_projection_trans: pair,
            squash: Mat4::IDENTITY,
            hud_distance: Mat4::IDENTITY,
            hud_3d_depth: pair,
            hud_3d_depth_shift: pair,
            gui_3d_depth: pair,
            hud: pair,
            gui: pair,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewMath {
    config: StereoConfig,
    scalars: ViewScalars,
    matrices: ViewMatrices,
}

impl ViewMath {
    pub fn new(config: StereoConfig) -> Self {
        let mut math = Self {
            scalars: ViewScalars {
                roll: 0.0,
                separation_world: 0.0,
                separation_ipd_adjustment: 0.0,
                fov_v: 0.0,
            },
            matrices: ViewMatrices::default(),
            config,
        };
        math.recompute();
        math
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    pub fn scalars(&self) -> &ViewScalars {
        &self.scalars
    }

    pub fn matrices(&self) -> &ViewMatrices {
        &self.matrices
    }

    pub fn separation_axis(&self) -> Axis {
        self.config.separation_axis
    }

    /// Replaces the settings and recomputes the whole graph.
    pub fn set_config(&mut self, config: StereoConfig) {
        self.config = config;
        self.recompute();
    }

    /// Updates head roll (radians) and recomputes.
    pub fn set_roll(&mut self, roll: f32) {
        self.scalars.roll = roll;
        self.recompute();
    }

    /// Recomputes every stage in dependency order.
    pub fn recompute(&mut self) {
        let c = &self.config;
        self.scalars.separation_world = c.ipd / 2.0 * c.world_scale;
        self.scalars.separation_ipd_adjustment = (c.ipd - IPD_DEFAULT) / 2.0 * c.world_scale;

        self.compute_basic_projection();
        self.compute_fov_projection();
        self.compute_converged_projections();
        self.compute_roll();
        self.compute_transforms();
        self.compute_view_projection();
        self.compute_view_projection_trans();
        self.compute_hud_gui();

        debug!(
            separation = self.scalars.separation_world,
            fov_v = self.scalars.fov_v,
            roll = self.scalars.roll,
            "view matrices recomputed"
        );
    }

    fn frustum_top(&self) -> f32 {
        0.5 / self.config.aspect_multiplier
    }

    fn compute_basic_projection(&mut self) {
        let t = self.frustum_top();
        let m = &mut self.matrices;
        m.basic_projection = Mat4::perspective_off_center_lh(LEFT, RIGHT, -t, t, NEAR, FAR);
        m.projection_inv = m.basic_projection.inverse().unwrap_or_else(|| {
            warn!("basic projection is singular; using identity inverse");
            Mat4::IDENTITY
        });
    }

    fn compute_fov_projection(&mut self) {
        let aspect = self.config.aspect_multiplier;
        let fov_v = 2.0 * ((self.config.fov_h.to_radians() / 2.0).tan() * aspect).atan();
        self.scalars.fov_v = fov_v;
        self.matrices.projection_fov = Mat4::perspective_fov_lh(fov_v, aspect, NEAR, FAR);
    }

    fn compute_converged_projections(&mut self) {
        let t = self.frustum_top();
        let screen_space_x = LEFT.abs() + RIGHT.abs();
        for eye in Eye::BOTH {
            let asymmetry_meters =
                self.config.frustum_asymmetry * eye.sign() / self.config.physical_screen_size;
            let asymmetry = asymmetry_meters * screen_space_x;
            self.matrices.projection_conv[eye.index()] = Mat4::perspective_off_center_lh(
                LEFT + asymmetry,
                RIGHT + asymmetry,
                -t,
                t,
                NEAR,
                FAR,
            );
            self.matrices.convergence_off[eye.index()] =
                Mat4::translation(asymmetry_meters * self.config.world_scale, 0.0, 0.0);
        }
    }

    fn compute_roll(&mut self) {
        let roll = self.scalars.roll;
        self.matrices.roll = Mat4::rotation_z(roll);
        self.matrices.roll_negative = Mat4::rotation_z(-roll);
        self.matrices.roll_half = Mat4::rotation_z(roll * 0.5);
    }

    fn compute_transforms(&mut self) {
        let separation = self.scalars.separation_world;
        let axis = self.config.separation_axis;
        let roll_translation = self.config.roll_impl == RollImpl::Translation;
        let m = &mut self.matrices;
        for eye in Eye::BOTH {
            let i = eye.index();
            let translate = Mat4::translation_along(axis, separation * eye.sign());
            // The no-roll variant is taken before roll is folded in.
            m.view_projection_trans_no_roll[i] =
                m.projection_inv * translate * m.projection_conv[i];
            m.transform[i] = if roll_translation {
                m.roll * translate
            } else {
                translate
            };
        }
    }

    fn compute_view_projection(&mut self) {
        let roll_translation = self.config.roll_impl == RollImpl::Translation;
        let m = &mut self.matrices;
        for i in 0..2 {
            m.view_projection[i] = if roll_translation {
                m.projection_inv * m.roll * m.projection_conv[i]
            } else {
                m.projection_inv * m.projection_conv[i]
            };
        }
    }

    fn compute_view_projection_trans(&mut self) {
        let m = &mut self.matrices;
        for i in 0..2 {
            m.view_projection_trans[i] = m.projection_inv * m.transform[i] * m.projection_conv[i];
        }
    }

    fn compute_hud_gui(&mut self) {
        let c = &self.config;
        let squash = c.squash;
        let hud_distance = c.hud_distance;
        let hud_depth = c.hud_depth;
        let additional = (1.5 - hud_distance) * c.lens_x_center_offset;
        let gui_depth = c.gui_depth + self.scalars.separation_ipd_adjustment;

        let m = &mut self.matrices;
        m.squash = Mat4::scaling(squash, squash, 1.0);
        m.hud_distance = Mat4::translation(0.0, 0.0, hud_distance);

        for eye in Eye::BOTH {
            let i = eye.index();
            // Depth offsets push the left image right and vice versa.
            let toward = -eye.sign();
            m.hud_3d_depth[i] = Mat4::translation(toward * hud_depth, 0.0, 0.0);
            m.hud_3d_depth_shift[i] = Mat4::translation(toward * (hud_depth + additional), 0.0, 0.0);
            m.gui_3d_depth[i] = Mat4::translation(toward * gui_depth, 0.0, 0.0);

            m.hud[i] = m.projection_inv
                * m.hud_3d_depth[i]
                * m.transform[i]
                * m.hud_distance
                * m.basic_projection;
            m.gui[i] = m.projection_inv * m.gui_3d_depth[i] * m.squash * m.basic_projection;
        }
    }
}

impl Default for ViewMath {
    fn default() -> Self {
        Self::new(StereoConfig::default())
    }
}
