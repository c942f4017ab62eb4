//! Per-object metadata attached by the interception layer.
//!
//! Application data set through the native private-data API lives next to the layer's own entries
//! under [`PrivateDataKey::User`], so both go away with the object.

use hashbrown::HashMap;
use parallax_rules::{RuleBinding, ShaderHash};

use crate::backend::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivateDataKey {
    /// Cached rule binding of a constant buffer.
    RulesBinding,
    /// The other eye's resource.
    Twin,
    /// View created for presenting this resource.
    PresentTargetView,
    /// Hash of a shader's bytecode.
    ShaderIdentity,
    /// Application-defined GUID key.
    User([u8; 16]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateDataValue {
    Binding(RuleBinding),
    Resource(ResourceId),
    Handle(u64),
    Shader(ShaderHash),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivateData {
    entries: HashMap<PrivateDataKey, PrivateDataValue>,
}

impl PrivateData {
    pub fn get(&self, key: PrivateDataKey) -> Option<&PrivateDataValue> {
        self.entries.get(&key)
    }

    pub fn set(&mut self, key: PrivateDataKey, value: PrivateDataValue) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: PrivateDataKey) -> Option<PrivateDataValue> {
        self.entries.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn binding(&self) -> Option<RuleBinding> {
        match self.get(PrivateDataKey::RulesBinding)? {
            PrivateDataValue::Binding(binding) => Some(*binding),
            _ => None,
        }
    }

    pub fn set_binding(&mut self, binding: RuleBinding) {
        self.set(PrivateDataKey::RulesBinding, PrivateDataValue::Binding(binding));
    }

    pub fn twin(&self) -> Option<ResourceId> {
        match self.get(PrivateDataKey::Twin)? {
            PrivateDataValue::Resource(id) => Some(*id),
            _ => None,
        }
    }

    pub fn shader_identity(&self) -> Option<ShaderHash> {
        match self.get(PrivateDataKey::ShaderIdentity)? {
            PrivateDataValue::Shader(hash) => Some(*hash),
            _ => None,
        }
    }
}
