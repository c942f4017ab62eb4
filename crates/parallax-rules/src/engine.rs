//! Applies resolved rule sets to raw constant bytes.

use tracing::{debug, warn};

use crate::binding::RuleSetIndex;
use crate::math::Mat4;
use crate::modification::Modification;
use crate::registry::RuleRegistry;

/// Bytes per `float4` register.
pub const REGISTER_BYTES: usize = 16;

/// Rewrites `left` and `right` in place for every `(rule, register)` pair of `rule_set`.
///
/// Input values are always read from `left`; each output is written to its own buffer at the same
/// offset. Pairs whose constant does not fit in `byte_len` are skipped. `right` is expected to
/// start as a copy of `left`. Returns the number of constants rewritten.
pub fn apply_to_buffer(
    registry: &RuleRegistry,
    rule_set: RuleSetIndex,
    left: &mut [u8],
    right: &mut [u8],
    byte_len: usize,
) -> usize {
    let byte_len = byte_len.min(left.len()).min(right.len());
    let math = registry.math();
    let trace = registry.config().trace_modifications;
    let mut applied = 0;

    for pair in registry.rule_set(rule_set) {
        let Some(rule) = registry.rule(pair.rule_index) else {
            warn!(rule = pair.rule_index, "rule set refers to a deleted rule");
            continue;
        };
        let Some(modification) = rule.modification() else {
            debug!(
                rule = pair.rule_index,
                operation = rule.operation,
                register_count = rule.register_count,
                "rule has no modification; skipped"
            );
            continue;
        };

        let offset = pair.register as usize * REGISTER_BYTES;
        let end = offset + modification.byte_len();
        if end > byte_len {
            continue;
        }

        match modification {
            Modification::Matrix(op) => {
                let Some(mut input) = Mat4::read_from(&left[offset..end]) else {
                    continue;
                };
                if rule.transpose {
                    input = input.transpose();
                }
                let (mut out_left, mut out_right) = op.apply(math, &input);
                if rule.transpose {
                    out_left = out_left.transpose();
                    out_right = out_right.transpose();
                }
                out_left.write_to(&mut left[offset..end]);
                out_right.write_to(&mut right[offset..end]);
            }
            Modification::Vector(op) => {
                let input: [f32; 4] = bytemuck::pod_read_unaligned(&left[offset..end]);
                let (out_left, out_right) = op.apply(math, input);
                left[offset..end].copy_from_slice(bytemuck::bytes_of(&out_left));
                right[offset..end].copy_from_slice(bytemuck::bytes_of(&out_right));
            }
        }
        applied += 1;

        if trace {
            debug!(
                rule = pair.rule_index,
                register = pair.register,
                offset,
                ?modification,
                "constant modified"
            );
        }
    }
    applied
}

impl RuleRegistry {
    /// See [`apply_to_buffer`].
    pub fn apply_to_buffer(
        &self,
        rule_set: RuleSetIndex,
        left: &mut [u8],
        right: &mut [u8],
        byte_len: usize,
    ) -> usize {
        apply_to_buffer(self, rule_set, left, right, byte_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ModificationRule;
    use crate::shader::ShaderStage;
    use parallax_dxbc::test_utils::{build_container, build_rdef, RdefVariableSpec};
    use parallax_dxbc::FourCC;
    use pretty_assertions::assert_eq;

    fn identity_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        Mat4::IDENTITY.write_to(&mut bytes);
        bytes
    }

    fn registry_with(rule: ModificationRule) -> (RuleRegistry, RuleSetIndex) {
        let vars = [RdefVariableSpec {
            name: "worldViewProj",
            offset: 0,
            size: 64,
            class: 3,
        }];
        let rdef = build_rdef(&[("PerFrame", 64, &vars[..])]);
        let blob = build_container(&[(FourCC::RDEF, rdef.as_slice())]);

        let mut registry = RuleRegistry::default();
        let hash = registry
            .register_shader(ShaderStage::Vertex, &blob)
            .unwrap()
            .hash;
        let index = registry.add_rule(rule);
        registry.enable_global(index).unwrap();
        let binding = registry.verify_binding(None, 64, 0, Some(hash));
        (registry, binding.rule_set)
    }

    #[test]
    fn simple_translate_splits_identity() {
        let (registry, rule_set) =
            registry_with(ModificationRule::matrix_named("worldViewProj", 1));
        let mut left = identity_bytes(64);
        let mut right = left.clone();

        assert_eq!(registry.apply_to_buffer(rule_set, &mut left, &mut right, 64), 1);
        assert_eq!(
            Mat4::read_from(&left),
            Some(Mat4::translation(-0.032, 0.0, 0.0))
        );
        assert_eq!(
            Mat4::read_from(&right),
            Some(Mat4::translation(0.032, 0.0, 0.0))
        );
    }

    #[test]
    fn transpose_wraps_the_operation() {
        let (registry, rule_set) = registry_with(ModificationRule {
            transpose: true,
            ..ModificationRule::matrix_named("worldViewProj", 1)
        });
        let mut left = identity_bytes(64);
        let mut right = left.clone();
        registry.apply_to_buffer(rule_set, &mut left, &mut right, 64);

        assert_eq!(
            Mat4::read_from(&left),
            Some(Mat4::translation(-0.032, 0.0, 0.0).transpose())
        );
    }

    #[test]
    fn empty_rule_set_leaves_buffers_untouched() {
        let registry = RuleRegistry::default();
        let mut left = identity_bytes(64);
        let mut right = vec![7u8; 64];
        for index in [RuleSetIndex::NotAddressed, RuleSetIndex::NoRules, RuleSetIndex::Index(3)] {
            assert_eq!(registry.apply_to_buffer(index, &mut left, &mut right, 64), 0);
        }
        assert_eq!(left, identity_bytes(64));
        assert_eq!(right, vec![7u8; 64]);
    }

    #[test]
    fn constants_past_byte_len_are_skipped() {
        let (registry, rule_set) =
            registry_with(ModificationRule::matrix_named("worldViewProj", 1));
        let mut left = identity_bytes(64);
        let mut right = left.clone();
        assert_eq!(registry.apply_to_buffer(rule_set, &mut left, &mut right, 48), 0);
        assert_eq!(left, identity_bytes(64));
    }

    #[test]
    fn missing_operation_is_a_no_op() {
        let (registry, rule_set) =
            registry_with(ModificationRule::matrix_named("worldViewProj", 99));
        let mut left = identity_bytes(64);
        let mut right = left.clone();
        assert_eq!(registry.apply_to_buffer(rule_set, &mut left, &mut right, 64), 0);
        assert_eq!(right, identity_bytes(64));
    }

    #[test]
    fn vector_rules_use_sixteen_bytes() {
        let (registry, rule_set) = registry_with(ModificationRule {
            register_count: 1,
            ..ModificationRule::matrix_named("worldViewProj", 1)
        });
        let mut left = vec![0u8; 16];
        left.copy_from_slice(bytemuck::bytes_of(&[1.0f32, 0.0, 0.0, 1.0]));
        let mut right = left.clone();
        assert_eq!(registry.apply_to_buffer(rule_set, &mut left, &mut right, 16), 1);
        let right: [f32; 4] = bytemuck::pod_read_unaligned(&right);
        assert_eq!(right, [1.0 + 0.032, 0.0, 0.0, 1.0]);
    }
}
