//! Rules for shaders whose constants live in a flat `float4` register file (shader model 2/3).
//!
//! Matching happens once per shader, when it is created. Afterwards the matched constants are
//! recomputed whenever the application writes registers they cover, and the current eye's variant
//! is substituted into the outgoing data.

use tracing::debug;

use crate::math::{Eye, Mat4};
use crate::modification::{Modification, MATRIX_REGISTERS, VECTOR_REGISTERS};
use crate::registry::RuleRegistry;
use crate::rule::ModificationRule;
use crate::shader::{ConstantClass, ShaderConstant, ShaderHash, ShaderRecord};

/// Floats per register.
const REGISTER_FLOATS: usize = 4;

/// One shader constant bound to the rule that modifies it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterConstantRule {
    pub name: String,
    pub register_index: u32,
    pub register_count: u32,
    pub rule_index: u32,
    pub modification: Modification,
    pub transpose: bool,
    /// Latest left and right variants, `register_count * 4` floats each.
    pub data: [Vec<f32>; 2],
}

impl RegisterConstantRule {
    fn float_range(&self) -> core::ops::Range<usize> {
        let start = self.register_index as usize * REGISTER_FLOATS;
        start..start + self.register_count as usize * REGISTER_FLOATS
    }

    fn overlaps(&self, start_register: u32, register_count: u32) -> bool {
        let end = start_register.saturating_add(register_count);
        let own_end = self.register_index + self.register_count;
        self.register_index < end && start_register < own_end
    }

    /// Recomputes both variants from the application's register file.
    fn recompute(&mut self, registry: &RuleRegistry, register_file: &[f32]) {
        let Some(input) = register_file.get(self.float_range()) else {
            return;
        };
        let math = registry.math();
        match self.modification {
            Modification::Matrix(op) => {
                let Some(mut matrix) = Mat4::from_floats(input) else {
                    return;
                };
                if self.transpose {
                    matrix = matrix.transpose();
                }
                let (mut left, mut right) = op.apply(math, &matrix);
                if self.transpose {
                    left = left.transpose();
                    right = right.transpose();
                }
                self.data = [left.to_floats().to_vec(), right.to_floats().to_vec()];
            }
            Modification::Vector(op) => {
                let Ok(vector) = <[f32; 4]>::try_from(input) else {
                    return;
                };
                let (left, right) = op.apply(math, vector);
                self.data = [left.to_vec(), right.to_vec()];
            }
        }
    }
}

/// Matched constant rules of one register-file shader.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterShaderRules {
    pub hash: ShaderHash,
    entries: Vec<RegisterConstantRule>,
}

fn eligible(constant: &ShaderConstant) -> bool {
    matches!(
        (constant.class, constant.register_count),
        (ConstantClass::Vector, VECTOR_REGISTERS) | (ConstantClass::Matrix, MATRIX_REGISTERS)
    )
}

fn rule_matches(rule: &ModificationRule, constant: &ShaderConstant) -> bool {
    rule.register_count == constant.register_count
        && (!rule.uses_name() || rule.name_matches(&constant.name))
        && rule
            .start_register
            .map_or(true, |start| start == constant.register_index)
}

impl RegisterShaderRules {
    /// Matches the constants of `record` against the registry.
    ///
    /// Shader-specific rules for the record's hash are tried first, then the globally enabled
    /// ones; the first matching rule wins for each constant.
    pub fn build(registry: &RuleRegistry, record: &ShaderRecord) -> Self {
        let candidates: Vec<u32> = registry
            .rules_for_shader(record.hash)
            .chain(registry.global_indices().iter().copied())
            .collect();

        let mut entries = Vec::new();
        for constant in record.constants().filter(|c| eligible(c)) {
            let matched = candidates.iter().find_map(|&index| {
                let rule = registry.rule(index)?;
                if !rule_matches(rule, constant) {
                    return None;
                }
                Some((index, rule, rule.modification()?))
            });
            let Some((rule_index, rule, modification)) = matched else {
                continue;
            };
            let floats = constant.register_count as usize * REGISTER_FLOATS;
            entries.push(RegisterConstantRule {
                name: constant.name.clone(),
                register_index: constant.register_index,
                register_count: constant.register_count,
                rule_index,
                modification,
                transpose: rule.transpose,
                data: [vec![0.0; floats], vec![0.0; floats]],
            });
        }

        debug!(
            hash = %record.hash,
            matched = entries.len(),
            "register shader rules built"
        );
        Self {
            hash: record.hash,
            entries,
        }
    }

    pub fn entries(&self) -> &[RegisterConstantRule] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recomputes every matched constant, e.g. after this shader becomes current.
    pub fn on_shader_set(&mut self, registry: &RuleRegistry, register_file: &[f32]) {
        for entry in &mut self.entries {
            entry.recompute(registry, register_file);
        }
    }

    /// Handles an application write of `data` to registers starting at `start_register`.
    ///
    /// `register_file` must already contain the written values. Returns the data to forward for
    /// `side`, or `None` when no matched constant overlaps the write.
    pub fn set_constants_f(
        &mut self,
        registry: &RuleRegistry,
        register_file: &[f32],
        start_register: u32,
        data: &[f32],
        side: Eye,
    ) -> Option<Vec<f32>> {
        let register_count = data.len().div_ceil(REGISTER_FLOATS) as u32;
        let write_start = start_register as usize * REGISTER_FLOATS;
        let write_end = write_start + data.len();

        let mut out: Option<Vec<f32>> = None;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.overlaps(start_register, register_count))
        {
            entry.recompute(registry, register_file);

            let range = entry.float_range();
            let from = range.start.max(write_start);
            let to = range.end.min(write_end);
            if from >= to {
                continue;
            }
            let variant = &entry.data[side.index()];
            let out = out.get_or_insert_with(|| data.to_vec());
            out[from - write_start..to - write_start]
                .copy_from_slice(&variant[from - range.start..to - range.start]);
        }
        out
    }

    /// Current variant of every matched constant for `side`, as `(start_register, floats)` writes.
    pub fn side_writes(&self, side: Eye) -> impl Iterator<Item = (u32, &[f32])> + '_ {
        self.entries
            .iter()
            .map(move |e| (e.register_index, e.data[side.index()].as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::NameMatch;
    use crate::shader::ShaderStage;
    use parallax_dxbc::test_utils::{build_ctab, build_sm3_vertex_shader, CtabConstantSpec};
    use pretty_assertions::assert_eq;

    fn sm3_registry() -> (RuleRegistry, ShaderRecord) {
        let ctab = build_ctab(
            "vs_3_0",
            &[
                CtabConstantSpec {
                    name: "matWorldViewProj",
                    register_index: 0,
                    register_count: 4,
                    class: 2,
                },
                CtabConstantSpec {
                    name: "vecEye",
                    register_index: 4,
                    register_count: 1,
                    class: 1,
                },
                CtabConstantSpec {
                    name: "matBones",
                    register_index: 8,
                    register_count: 8,
                    class: 2,
                },
            ],
        );
        let shader = build_sm3_vertex_shader(&ctab);
        let mut registry = RuleRegistry::default();
        let record = registry
            .register_shader(ShaderStage::Vertex, &shader)
            .unwrap();
        (registry, (*record).clone())
    }

    fn register_file_with_identity() -> Vec<f32> {
        let mut file = vec![0.0f32; 64 * 4];
        file[..16].copy_from_slice(&Mat4::IDENTITY.to_floats());
        file
    }

    #[test]
    fn shader_specific_rules_win_over_global() {
        let (mut registry, record) = sm3_registry();
        let global = registry.add_rule(ModificationRule {
            constant_name: "WorldViewProj".into(),
            name_match: NameMatch::Partial,
            register_count: 4,
            operation: 2,
            ..ModificationRule::default()
        });
        let specific = registry.add_rule(ModificationRule::matrix_named("matWorldViewProj", 1));
        registry.enable_global(global).unwrap();
        registry.add_shader_rule(record.hash, specific).unwrap();

        let rules = RegisterShaderRules::build(&registry, &record);
        assert_eq!(rules.entries().len(), 1);
        assert_eq!(rules.entries()[0].rule_index, specific);
    }

    #[test]
    fn ineligible_constants_are_skipped() {
        let (mut registry, record) = sm3_registry();
        // Only 1- and 4-register constants qualify, so a rule sized for the bone palette never
        // applies.
        let rule = registry.add_rule(ModificationRule {
            register_count: 8,
            operation: 1,
            ..ModificationRule::default()
        });
        registry.enable_global(rule).unwrap();
        assert!(RegisterShaderRules::build(&registry, &record).is_empty());
    }

    #[test]
    fn writes_substitute_the_current_side() {
        let (mut registry, record) = sm3_registry();
        let rule = registry.add_rule(ModificationRule::matrix_named("matWorldViewProj", 1));
        registry.enable_global(rule).unwrap();
        let mut rules = RegisterShaderRules::build(&registry, &record);

        let file = register_file_with_identity();
        let data = file[..16].to_vec();

        let left = rules
            .set_constants_f(&registry, &file, 0, &data, Eye::Left)
            .unwrap();
        assert_eq!(
            Mat4::from_floats(&left),
            Some(Mat4::translation(-0.032, 0.0, 0.0))
        );
        let right = rules
            .set_constants_f(&registry, &file, 0, &data, Eye::Right)
            .unwrap();
        assert_eq!(
            Mat4::from_floats(&right),
            Some(Mat4::translation(0.032, 0.0, 0.0))
        );

        // A write that misses every matched constant is forwarded unchanged.
        assert_eq!(
            rules.set_constants_f(&registry, &file, 4, &[1.0; 4], Eye::Left),
            None
        );
    }

    #[test]
    fn partial_overlap_only_replaces_written_registers() {
        let (mut registry, record) = sm3_registry();
        let rule = registry.add_rule(ModificationRule::matrix_named("matWorldViewProj", 1));
        registry.enable_global(rule).unwrap();
        let mut rules = RegisterShaderRules::build(&registry, &record);

        let file = register_file_with_identity();
        // Rows 3 and 4 (registers 3..5): translation row of the matrix plus the eye vector.
        let data = file[12..20].to_vec();
        let out = rules
            .set_constants_f(&registry, &file, 3, &data, Eye::Right)
            .unwrap();
        assert_eq!(&out[..4], &[0.032, 0.0, 0.0, 1.0]);
        assert_eq!(&out[4..], &data[4..]);
    }

    #[test]
    fn shader_set_recomputes_all_constants() {
        let (mut registry, record) = sm3_registry();
        let rule = registry.add_rule(ModificationRule::matrix_named("matWorldViewProj", 1));
        registry.enable_global(rule).unwrap();
        let mut rules = RegisterShaderRules::build(&registry, &record);

        rules.on_shader_set(&registry, &register_file_with_identity());
        let writes: Vec<(u32, Vec<f32>)> = rules
            .side_writes(Eye::Left)
            .map(|(reg, floats)| (reg, floats.to_vec()))
            .collect();
        assert_eq!(
            writes,
            vec![(0, Mat4::translation(-0.032, 0.0, 0.0).to_floats().to_vec())]
        );
    }
}
