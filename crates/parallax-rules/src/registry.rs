//! The rule registry: authored rules, global enablement, shader reflection cache, and memoized
//! per-resource rule bindings.
//!
//! One registry is owned by the interception layer and passed by reference. A single monotonic
//! update counter is bumped by every rule-set or enablement change; bindings computed under an
//! older counter value are re-verified on next use.

use std::sync::Arc;

use hashbrown::HashMap;
use parallax_dxbc::DxbcError;
use tracing::{debug, info};

use crate::binding::{RuleBinding, RuleRegister, RuleSetIndex};
use crate::config::StereoConfig;
use crate::error::RuleSetError;
use crate::persist::{RuleSetBlock, RuleSetFlavor, TrailingBlock};
use crate::rule::{ModificationRule, ShaderRule};
use crate::shader::{ShaderHash, ShaderRecord, ShaderStage, MAX_BUFFER_REGISTERS};
use crate::view::ViewMath;

/// Byte width to rule-register capacity. Rules address registers at a 32-byte granularity.
pub fn register_capacity(byte_width: u32) -> usize {
    (byte_width >> 5).min(MAX_BUFFER_REGISTERS) as usize
}

/// Rule register covering a constant that starts at `byte_offset`.
pub fn rule_register(byte_offset: u32) -> u32 {
    byte_offset >> 5
}

#[derive(Debug)]
pub struct RuleRegistry {
    rules: Vec<ModificationRule>,
    global_indices: Vec<u32>,
    shader_rules: Vec<ShaderRule>,
    fetched_shaders: Vec<ShaderHash>,
    update_counter: u64,
    rule_sets: Vec<Vec<RuleRegister>>,
    rule_set_lookup: HashMap<Vec<RuleRegister>, usize>,
    shaders: HashMap<ShaderHash, Arc<ShaderRecord>>,
    math: ViewMath,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new(StereoConfig::default())
    }
}

impl RuleRegistry {
    pub fn new(config: StereoConfig) -> Self {
        Self {
            rules: Vec::new(),
            global_indices: Vec::new(),
            shader_rules: Vec::new(),
            fetched_shaders: Vec::new(),
            update_counter: 0,
            rule_sets: Vec::new(),
            rule_set_lookup: HashMap::new(),
            shaders: HashMap::new(),
            math: ViewMath::new(config),
        }
    }

    pub fn update_counter(&self) -> u64 {
        self.update_counter
    }

    pub fn rules(&self) -> &[ModificationRule] {
        &self.rules
    }

    pub fn rule(&self, index: u32) -> Option<&ModificationRule> {
        self.rules.get(index as usize)
    }

    pub fn global_indices(&self) -> &[u32] {
        &self.global_indices
    }

    pub fn shader_rules(&self) -> &[ShaderRule] {
        &self.shader_rules
    }

    pub fn fetched_shaders(&self) -> &[ShaderHash] {
        &self.fetched_shaders
    }

    pub fn config(&self) -> &StereoConfig {
        self.math.config()
    }

    pub fn math(&self) -> &ViewMath {
        &self.math
    }

    /// Replaces the separation settings. Bindings stay valid; only the matrices change.
    pub fn set_config(&mut self, config: StereoConfig) {
        self.math.set_config(config);
    }

    /// Head roll from the tracking collaborator, in radians.
    pub fn set_roll(&mut self, roll: f32) {
        self.math.set_roll(roll);
    }

    fn bump(&mut self) {
        self.update_counter += 1;
        debug!(counter = self.update_counter, "rule set changed");
    }

    fn check_rule(&self, index: u32) -> Result<(), RuleSetError> {
        if (index as usize) < self.rules.len() {
            Ok(())
        } else {
            Err(RuleSetError::UnknownRule {
                index,
                len: self.rules.len(),
            })
        }
    }

    // Rule authoring.

    /// Appends a rule (not yet enabled) and returns its index.
    pub fn add_rule(&mut self, rule: ModificationRule) -> u32 {
        self.rules.push(rule);
        self.bump();
        (self.rules.len() - 1) as u32
    }

    pub fn replace_rule(&mut self, index: u32, rule: ModificationRule) -> Result<(), RuleSetError> {
        self.check_rule(index)?;
        self.rules[index as usize] = rule;
        self.bump();
        Ok(())
    }

    /// Removes a rule. Every index above it shifts down by one, in the global list and in the
    /// shader-specific pairs; references to the removed rule are dropped.
    pub fn delete_rule(&mut self, index: u32) -> Result<ModificationRule, RuleSetError> {
        self.check_rule(index)?;
        let removed = self.rules.remove(index as usize);
        let shift = |i: u32| if i > index { i - 1 } else { i };

        self.global_indices.retain(|&i| i != index);
        for i in &mut self.global_indices {
            *i = shift(*i);
        }
        self.shader_rules.retain(|r| r.rule_index != index);
        for r in &mut self.shader_rules {
            r.rule_index = shift(r.rule_index);
        }
        self.bump();
        Ok(removed)
    }

    /// Enables a rule for every shader. Enabling twice is a no-op.
    pub fn enable_global(&mut self, index: u32) -> Result<(), RuleSetError> {
        self.check_rule(index)?;
        if !self.global_indices.contains(&index) {
            self.global_indices.push(index);
            self.bump();
        }
        Ok(())
    }

    pub fn disable_global(&mut self, index: u32) {
        let before = self.global_indices.len();
        self.global_indices.retain(|&i| i != index);
        if self.global_indices.len() != before {
            self.bump();
        }
    }

    pub fn add_shader_rule(&mut self, hash: ShaderHash, index: u32) -> Result<(), RuleSetError> {
        self.check_rule(index)?;
        let pair = ShaderRule {
            hash,
            rule_index: index,
        };
        if !self.shader_rules.contains(&pair) {
            self.shader_rules.push(pair);
            self.bump();
        }
        Ok(())
    }

    pub fn remove_shader_rule(&mut self, hash: ShaderHash, index: u32) {
        let before = self.shader_rules.len();
        self.shader_rules
            .retain(|r| !(r.hash == hash && r.rule_index == index));
        if self.shader_rules.len() != before {
            self.bump();
        }
    }

    /// Shader-specific rule indices for `hash`, in authoring order.
    pub fn rules_for_shader(&self, hash: ShaderHash) -> impl Iterator<Item = u32> + '_ {
        self.shader_rules
            .iter()
            .filter(move |r| r.hash == hash)
            .map(|r| r.rule_index)
    }

    pub fn mark_fetched(&mut self, hash: ShaderHash) {
        if !self.fetched_shaders.contains(&hash) {
            self.fetched_shaders.push(hash);
            self.bump();
        }
    }

    pub fn is_fetched(&self, hash: ShaderHash) -> bool {
        self.fetched_shaders.contains(&hash)
    }

    /// Drops every rule, enablement, shader pair and cached rule set.
    pub fn clear(&mut self) {
        self.rules.clear();
        self.global_indices.clear();
        self.shader_rules.clear();
        self.fetched_shaders.clear();
        self.rule_sets.clear();
        self.rule_set_lookup.clear();
        self.bump();
    }

    /// Applies every section present in `block`. Absent sections keep their current values.
    pub fn import(&mut self, block: &RuleSetBlock) {
        if let Some(config) = &block.config {
            self.set_config(config.clone());
        }
        if let Some(rules) = &block.rules {
            self.rules = rules.clone();
        }
        if let Some(indices) = &block.global_indices {
            self.global_indices = indices.clone();
        }
        match &block.trailing {
            Some(TrailingBlock::FetchedShaders(hashes)) => self.fetched_shaders = hashes.clone(),
            Some(TrailingBlock::ShaderRules(pairs)) => self.shader_rules = pairs.clone(),
            None => {}
        }
        self.bump();
        info!(
            rules = self.rules.len(),
            global = self.global_indices.len(),
            truncated = block.error.is_some(),
            "imported rule set"
        );
    }

    pub fn export(&self, flavor: RuleSetFlavor) -> RuleSetBlock {
        RuleSetBlock {
            config: Some(self.config().clone()),
            rules: Some(self.rules.clone()),
            global_indices: Some(self.global_indices.clone()),
            trailing: Some(match flavor {
                RuleSetFlavor::ConstantBuffers => {
                    TrailingBlock::FetchedShaders(self.fetched_shaders.clone())
                }
                RuleSetFlavor::ConstantRegisters => {
                    TrailingBlock::ShaderRules(self.shader_rules.clone())
                }
            }),
            error: None,
        }
    }

    // Shader reflection cache.

    /// Reflects `bytecode`, reusing the cached record for identical content.
    pub fn register_shader(
        &mut self,
        stage: ShaderStage,
        bytecode: &[u8],
    ) -> Result<Arc<ShaderRecord>, DxbcError> {
        let hash = ShaderHash::of(bytecode);
        if let Some(record) = self.shaders.get(&hash) {
            return Ok(Arc::clone(record));
        }
        let record = Arc::new(ShaderRecord::from_bytecode(stage, bytecode)?);
        self.shaders.insert(hash, Arc::clone(&record));
        Ok(record)
    }

    pub fn shader(&self, hash: ShaderHash) -> Option<&Arc<ShaderRecord>> {
        self.shaders.get(&hash)
    }

    // Bindings.

    /// Rule/register pairs of a resolved rule set. Empty for the sentinels and unknown indices.
    pub fn rule_set(&self, index: RuleSetIndex) -> &[RuleRegister] {
        match index {
            RuleSetIndex::Index(i) => self.rule_sets.get(i).map(Vec::as_slice).unwrap_or(&[]),
            RuleSetIndex::NotAddressed | RuleSetIndex::NoRules => &[],
        }
    }

    /// Number of distinct rule lists cached so far.
    pub fn rule_set_count(&self) -> usize {
        self.rule_sets.len()
    }

    /// Makes a resource's binding current.
    ///
    /// `current` is returned unchanged when it is still valid. Otherwise the globally enabled rules
    /// are matched against a buffer of `byte_width` bytes bound at `buffer_index`, using the
    /// constant layout of `shader` (the shader bound at that slot, if known).
    pub fn verify_binding(
        &mut self,
        current: Option<RuleBinding>,
        byte_width: u32,
        buffer_index: u32,
        shader: Option<ShaderHash>,
    ) -> RuleBinding {
        if let Some(binding) = current {
            if binding.is_current(self.update_counter) {
                return binding;
            }
        }

        let candidates = self.match_global_rules(byte_width, buffer_index, shader);
        let rule_set = if candidates.is_empty() {
            RuleSetIndex::NoRules
        } else {
            RuleSetIndex::Index(self.intern_rule_set(candidates))
        };
        debug!(
            byte_width,
            buffer_index,
            ?shader,
            ?rule_set,
            "rule binding verified"
        );
        RuleBinding {
            rule_set,
            update_counter: self.update_counter,
        }
    }

    fn match_global_rules(
        &self,
        byte_width: u32,
        buffer_index: u32,
        shader: Option<ShaderHash>,
    ) -> Vec<RuleRegister> {
        let capacity = register_capacity(byte_width);
        // An unknown shader has no named constants; naming predicates then match nothing.
        let constants = shader
            .and_then(|hash| self.shaders.get(&hash))
            .map(|record| record.constants_in(buffer_index))
            .unwrap_or(&[]);

        let mut candidates = Vec::new();
        let mut bitmap = Vec::with_capacity(capacity);
        for &rule_index in &self.global_indices {
            let Some(rule) = self.rules.get(rule_index as usize) else {
                continue;
            };
            bitmap.clear();
            bitmap.resize(capacity, true);

            if rule.uses_name() {
                let mut named = vec![false; capacity];
                for constant in constants.iter().filter(|c| rule.name_matches(&c.name)) {
                    if let Some(slot) = named.get_mut(rule_register(constant.offset) as usize) {
                        *slot = true;
                    }
                }
                for (bit, hit) in bitmap.iter_mut().zip(named) {
                    *bit &= hit;
                }
            }

            if let Some(start) = rule.start_register {
                let start = start as usize;
                if start < capacity {
                    let keep = !rule.uses_name() || bitmap[start];
                    bitmap.fill(false);
                    bitmap[start] = keep;
                } else {
                    bitmap.fill(false);
                }
            }

            if rule.buffer_index.is_some_and(|index| index != buffer_index) {
                bitmap.fill(false);
            }
            if rule.buffer_size.is_some_and(|size| size != byte_width) {
                bitmap.fill(false);
            }

            candidates.extend(
                bitmap
                    .iter()
                    .enumerate()
                    .filter(|(_, set)| **set)
                    .map(|(register, _)| RuleRegister {
                        rule_index,
                        register: register as u32,
                    }),
            );
        }
        candidates
    }

    fn intern_rule_set(&mut self, candidates: Vec<RuleRegister>) -> usize {
        if let Some(&index) = self.rule_set_lookup.get(&candidates) {
            return index;
        }
        let index = self.rule_sets.len();
        self.rule_sets.push(candidates.clone());
        self.rule_set_lookup.insert(candidates, index);
        index
    }
}
