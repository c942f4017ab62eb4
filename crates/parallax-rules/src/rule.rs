use crate::modification::Modification;
use crate::shader::ShaderHash;

/// How a rule's constant name is compared against reflected constant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMatch {
    /// The name is not used as a predicate.
    #[default]
    Ignore,
    Exact,
    /// The reflected name must contain the rule name.
    Partial,
}

/// A declarative constant modification rule.
///
/// Every `Option` predicate that is `None` always matches; predicates that are set must all
/// match. Contradictory predicates simply never match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModificationRule {
    pub constant_name: String,
    pub name_match: NameMatch,
    pub start_register: Option<u32>,
    /// Required owning constant-buffer slot.
    pub buffer_index: Option<u32>,
    /// Required owning constant-buffer size in bytes.
    pub buffer_size: Option<u32>,
    /// 1 for a vector, 4 for a matrix.
    pub register_count: u32,
    pub operation: u32,
    /// The constant is stored column-major and must be transposed around the operation.
    pub transpose: bool,
}

impl ModificationRule {
    /// Matrix rule keyed on an exact constant name.
    pub fn matrix_named(name: impl Into<String>, operation: u32) -> Self {
        Self {
            constant_name: name.into(),
            name_match: NameMatch::Exact,
            register_count: 4,
            operation,
            ..Self::default()
        }
    }

    pub fn uses_name(&self) -> bool {
        self.name_match != NameMatch::Ignore
    }

    /// Whether `name` satisfies the naming predicate. Always `true` when the name is unused.
    pub fn name_matches(&self, name: &str) -> bool {
        match self.name_match {
            NameMatch::Ignore => true,
            NameMatch::Exact => name == self.constant_name,
            NameMatch::Partial => name.contains(self.constant_name.as_str()),
        }
    }

    pub fn modification(&self) -> Option<Modification> {
        Modification::create(self.register_count, self.operation)
    }
}

/// A rule enabled only for one shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderRule {
    pub hash: ShaderHash,
    pub rule_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_predicates() {
        let mut rule = ModificationRule::matrix_named("ViewProj", 1);
        assert!(rule.name_matches("ViewProj"));
        assert!(!rule.name_matches("g_ViewProjMatrix"));

        rule.name_match = NameMatch::Partial;
        assert!(rule.name_matches("g_ViewProjMatrix"));
        assert!(!rule.name_matches("g_World"));

        rule.name_match = NameMatch::Ignore;
        assert!(!rule.uses_name());
        assert!(rule.name_matches("anything"));
    }
}
