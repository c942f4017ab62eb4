/// Where a resource's applicable rules live in the registry's rule-set cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleSetIndex {
    /// Never verified.
    #[default]
    NotAddressed,
    /// Verified; no rule applies to this layout.
    NoRules,
    Index(usize),
}

/// Memoized rule resolution for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleBinding {
    pub rule_set: RuleSetIndex,
    /// Registry update counter the binding was computed under.
    pub update_counter: u64,
}

impl RuleBinding {
    /// A binding is reusable when it was verified and the registry has not changed since.
    pub fn is_current(&self, registry_counter: u64) -> bool {
        self.rule_set != RuleSetIndex::NotAddressed && self.update_counter >= registry_counter
    }
}

/// One `(rule, register)` candidate produced by binding verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleRegister {
    pub rule_index: u32,
    pub register: u32,
}
