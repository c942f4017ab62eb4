//! Separation and convergence settings.
//!
//! Defaults describe an average viewer; `PARALLAX_*` environment variables override individual
//! fields (see [`StereoConfig::from_env`]).

use thiserror::Error;

use crate::math::Axis;

/// Interpupillary distance assumed by the defaults, in meters.
pub const IPD_DEFAULT: f32 = 0.064;
pub const DEFAULT_CONVERGENCE: f32 = 3.0;
/// Horizontal field of view in degrees.
pub const DEFAULT_FOV_H: f32 = 110.0;
pub const DEFAULT_ASPECT_MULTIPLIER: f32 = 1.0;

pub const ENV_IPD: &str = "PARALLAX_IPD";
pub const ENV_WORLD_SCALE: &str = "PARALLAX_WORLD_SCALE";
pub const ENV_CONVERGENCE: &str = "PARALLAX_CONVERGENCE";
pub const ENV_ASPECT_MULTIPLIER: &str = "PARALLAX_ASPECT_MULTIPLIER";
pub const ENV_FOV_H: &str = "PARALLAX_FOV_H";
pub const ENV_ROLL_IMPL: &str = "PARALLAX_ROLL_IMPL";
pub const ENV_SEPARATION_AXIS: &str = "PARALLAX_SEPARATION_AXIS";
pub const ENV_SQUASH: &str = "PARALLAX_SQUASH";
pub const ENV_GUI_DEPTH: &str = "PARALLAX_GUI_DEPTH";
pub const ENV_HUD_DISTANCE: &str = "PARALLAX_HUD_DISTANCE";
pub const ENV_HUD_DEPTH: &str = "PARALLAX_HUD_DEPTH";
pub const ENV_TRACE_MODIFICATIONS: &str = "PARALLAX_TRACE_MODIFICATIONS";

/// How head roll is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollImpl {
    #[default]
    None,
    /// Roll folded into the per-eye translation matrices.
    Translation,
    /// Any other value from a persisted configuration; treated like `None`.
    Other(u32),
}

impl RollImpl {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => RollImpl::None,
            1 => RollImpl::Translation,
            other => RollImpl::Other(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            RollImpl::None => 0,
            RollImpl::Translation => 1,
            RollImpl::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var}: expected one of x, y, z, got {value:?}")]
    InvalidAxis { var: &'static str, value: String },
    #[error("{var}: {value} is out of range ({reason})")]
    OutOfRange {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StereoConfig {
    /// Interpupillary distance in meters.
    pub ipd: f32,
    /// Game units per meter.
    pub world_scale: f32,
    pub convergence: f32,
    pub aspect_multiplier: f32,
    /// Horizontal field of view in degrees.
    pub fov_h: f32,
    pub roll_impl: RollImpl,
    pub separation_axis: Axis,
    pub squash: f32,
    pub gui_depth: f32,
    pub hud_distance: f32,
    pub hud_depth: f32,
    /// Frustum asymmetry in meters.
    pub frustum_asymmetry: f32,
    /// Physical screen width in meters.
    pub physical_screen_size: f32,
    pub lens_x_center_offset: f32,
    /// Log every register the modification engine rewrites.
    pub trace_modifications: bool,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            ipd: IPD_DEFAULT,
            world_scale: 1.0,
            convergence: DEFAULT_CONVERGENCE,
            aspect_multiplier: DEFAULT_ASPECT_MULTIPLIER,
            fov_h: DEFAULT_FOV_H,
            roll_impl: RollImpl::None,
            separation_axis: Axis::X,
            squash: 1.0,
            gui_depth: 0.0,
            hud_distance: 1.0,
            hud_depth: 0.0,
            frustum_asymmetry: 0.0,
            physical_screen_size: 1.0,
            lens_x_center_offset: 0.0,
            trace_modifications: false,
        }
    }
}

impl StereoConfig {
    /// Defaults overridden by `PARALLAX_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`StereoConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let float = |var: &'static str, slot: &mut f32| -> Result<(), ConfigError> {
            if let Some(raw) = lookup(var) {
                let value = raw.trim();
                *slot = value
                    .parse::<f32>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ConfigError::InvalidNumber {
                        var,
                        value: raw.clone(),
                    })?;
            }
            Ok(())
        };

        float(ENV_IPD, &mut config.ipd)?;
        float(ENV_WORLD_SCALE, &mut config.world_scale)?;
        float(ENV_CONVERGENCE, &mut config.convergence)?;
        float(ENV_ASPECT_MULTIPLIER, &mut config.aspect_multiplier)?;
        float(ENV_FOV_H, &mut config.fov_h)?;
        float(ENV_SQUASH, &mut config.squash)?;
        float(ENV_GUI_DEPTH, &mut config.gui_depth)?;
        float(ENV_HUD_DISTANCE, &mut config.hud_distance)?;
        float(ENV_HUD_DEPTH, &mut config.hud_depth)?;

        if config.aspect_multiplier == 0.0 {
            return Err(ConfigError::OutOfRange {
                var: ENV_ASPECT_MULTIPLIER,
                value: config.aspect_multiplier.to_string(),
                reason: "must be non-zero",
            });
        }
        if !(0.0..180.0).contains(&config.fov_h) || config.fov_h == 0.0 {
            return Err(ConfigError::OutOfRange {
                var: ENV_FOV_H,
                value: config.fov_h.to_string(),
                reason: "must be within (0, 180) degrees",
            });
        }

        if let Some(raw) = lookup(ENV_ROLL_IMPL) {
            let value = raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: ENV_ROLL_IMPL,
                    value: raw.clone(),
                })?;
            config.roll_impl = RollImpl::from_raw(value);
        }

        if let Some(raw) = lookup(ENV_SEPARATION_AXIS) {
            config.separation_axis = match raw.trim().to_ascii_lowercase().as_str() {
                "x" => Axis::X,
                "y" => Axis::Y,
                "z" => Axis::Z,
                _ => {
                    return Err(ConfigError::InvalidAxis {
                        var: ENV_SEPARATION_AXIS,
                        value: raw,
                    })
                }
            };
        }

        config.trace_modifications = lookup(ENV_TRACE_MODIFICATIONS)
            .map(|raw| is_truthy(&raw))
            .unwrap_or(false);

        Ok(config)
    }
}

/// `1`, `true`, `yes` or `on` (case-insensitive).
pub fn env_var_truthy(name: &str) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };
    is_truthy(&raw)
}

fn is_truthy(raw: &str) -> bool {
    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        assert_eq!(
            StereoConfig::from_lookup(lookup(&[])).unwrap(),
            StereoConfig::default()
        );
    }

    #[test]
    fn overrides_apply() {
        let config = StereoConfig::from_lookup(lookup(&[
            (ENV_IPD, "0.07"),
            (ENV_WORLD_SCALE, " 2.5 "),
            (ENV_ROLL_IMPL, "1"),
            (ENV_SEPARATION_AXIS, "Y"),
            (ENV_TRACE_MODIFICATIONS, "on"),
        ]))
        .unwrap();
        assert_eq!(config.ipd, 0.07);
        assert_eq!(config.world_scale, 2.5);
        assert_eq!(config.roll_impl, RollImpl::Translation);
        assert_eq!(config.separation_axis, Axis::Y);
        assert!(config.trace_modifications);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert_eq!(
            StereoConfig::from_lookup(lookup(&[(ENV_IPD, "wide")])),
            Err(ConfigError::InvalidNumber {
                var: ENV_IPD,
                value: "wide".into()
            })
        );
        assert!(matches!(
            StereoConfig::from_lookup(lookup(&[(ENV_SEPARATION_AXIS, "w")])),
            Err(ConfigError::InvalidAxis { .. })
        ));
        assert!(matches!(
            StereoConfig::from_lookup(lookup(&[(ENV_FOV_H, "180")])),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            StereoConfig::from_lookup(lookup(&[(ENV_IPD, "NaN")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn truthy_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(is_truthy(raw), "{raw}");
        }
        for raw in ["0", "false", "", "enabled"] {
            assert!(!is_truthy(raw), "{raw}");
        }
    }
}
