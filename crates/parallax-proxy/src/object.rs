//! Proxy objects and their reference counting.
//!
//! Every native interface the application sees is represented by a [`ProxyObject`] in a
//! [`ProxyTable`]. Objects that live inside a container (a texture's surface levels) do not count
//! references themselves; [`RefCount::ForwardTo`] sends every retain and release to the container,
//! and the contained objects are destroyed together with it.

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parallax_rules::ShaderStage;
use tracing::debug;

use crate::backend::ResourceId;
use crate::call::InterfaceId;
use crate::error::ProxyError;
use crate::private_data::PrivateData;
use crate::stereo::StereoResourcePair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub u32);

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Device,
    Surface,
    Texture,
    Buffer,
    Shader(ShaderStage),
}

impl ObjectKind {
    pub fn interface(self) -> InterfaceId {
        match self {
            ObjectKind::Device => InterfaceId::Device,
            ObjectKind::Surface => InterfaceId::Surface,
            ObjectKind::Texture => InterfaceId::Texture,
            ObjectKind::Buffer => InterfaceId::Buffer,
            ObjectKind::Shader(_) => InterfaceId::Shader,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCount {
    Local(u32),
    ForwardTo(ProxyId),
}

#[derive(Debug)]
pub struct ProxyObject {
    pub kind: ObjectKind,
    /// The real object. `None` only for the device itself.
    pub native: Option<ResourceId>,
    pub refs: RefCount,
    pub device: Option<ProxyId>,
    pub stereo: Option<Arc<StereoResourcePair>>,
    pub metadata: PrivateData,
}

impl ProxyObject {
    pub fn new(kind: ObjectKind, native: Option<ResourceId>, refs: RefCount) -> Self {
        Self {
            kind,
            native,
            refs,
            device: None,
            stereo: None,
            metadata: PrivateData::default(),
        }
    }

    pub fn container(&self) -> Option<ProxyId> {
        match self.refs {
            RefCount::ForwardTo(container) => Some(container),
            RefCount::Local(_) => None,
        }
    }

    /// Whether this object owns its native resource (it is not a view into a container).
    pub fn owns_native(&self) -> bool {
        matches!(self.refs, RefCount::Local(_))
    }

    pub fn twin(&self) -> Option<ResourceId> {
        self.stereo.as_ref().and_then(|pair| pair.right())
    }
}

/// Result of a release.
#[derive(Debug)]
pub struct Released {
    /// Remaining count of the object that actually holds the references.
    pub count: u32,
    /// Objects removed from the table, owner first.
    pub destroyed: Vec<(ProxyId, ProxyObject)>,
}

#[derive(Debug, Default)]
pub struct ProxyTable {
    objects: HashMap<ProxyId, ProxyObject>,
    by_native: HashMap<ResourceId, ProxyId>,
    next_id: u32,
}

impl ProxyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: ProxyObject) -> ProxyId {
        self.next_id += 1;
        let id = ProxyId(self.next_id);
        if let (Some(native), true) = (object.native, object.owns_native()) {
            self.by_native.insert(native, id);
        }
        self.objects.insert(id, object);
        id
    }

    pub fn get(&self, id: ProxyId) -> Option<&ProxyObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ProxyId) -> Option<&mut ProxyObject> {
        self.objects.get_mut(&id)
    }

    pub fn object(&self, id: ProxyId) -> Result<&ProxyObject, ProxyError> {
        self.get(id).ok_or(ProxyError::UnknownObject(id))
    }

    /// Proxy owning the native resource `native`.
    pub fn find_native(&self, native: ResourceId) -> Option<ProxyId> {
        self.by_native.get(&native).copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ProxyId> + '_ {
        self.objects.keys().copied()
    }

    /// The object that holds the references for `id`, following container forwarding.
    fn owner(&self, id: ProxyId) -> Result<ProxyId, ProxyError> {
        let mut current = id;
        for _ in 0..=self.objects.len() {
            match self.object(current)?.refs {
                RefCount::Local(_) => return Ok(current),
                RefCount::ForwardTo(container) => current = container,
            }
        }
        Err(ProxyError::ForwardingCycle(id))
    }

    pub fn ref_count(&self, id: ProxyId) -> Result<u32, ProxyError> {
        let owner = self.owner(id)?;
        match self.object(owner)?.refs {
            RefCount::Local(count) => Ok(count),
            RefCount::ForwardTo(_) => Err(ProxyError::ForwardingCycle(id)),
        }
    }

    pub fn retain(&mut self, id: ProxyId) -> Result<u32, ProxyError> {
        let owner = self.owner(id)?;
        let object = self
            .objects
            .get_mut(&owner)
            .ok_or(ProxyError::UnknownObject(owner))?;
        match &mut object.refs {
            RefCount::Local(count) => {
                *count = count.saturating_add(1);
                Ok(*count)
            }
            RefCount::ForwardTo(_) => Err(ProxyError::ForwardingCycle(id)),
        }
    }

    /// Drops one reference. At zero the owner and everything forwarding to it leave the table.
    pub fn release(&mut self, id: ProxyId) -> Result<Released, ProxyError> {
        let owner = self.owner(id)?;
        let object = self
            .objects
            .get_mut(&owner)
            .ok_or(ProxyError::UnknownObject(owner))?;
        let count = match &mut object.refs {
            RefCount::Local(0) => return Err(ProxyError::CountUnderflow(owner)),
            RefCount::Local(count) => {
                *count -= 1;
                *count
            }
            RefCount::ForwardTo(_) => return Err(ProxyError::ForwardingCycle(id)),
        };
        let destroyed = if count == 0 {
            self.destroy(owner)
        } else {
            Vec::new()
        };
        Ok(Released { count, destroyed })
    }

    fn destroy(&mut self, owner: ProxyId) -> Vec<(ProxyId, ProxyObject)> {
        let mut destroyed = Vec::new();
        let mut pending = vec![owner];
        while let Some(id) = pending.pop() {
            let Some(object) = self.objects.remove(&id) else {
                continue;
            };
            if let (Some(native), true) = (object.native, object.owns_native()) {
                self.by_native.remove(&native);
            }
            pending.extend(
                self.objects
                    .iter()
                    .filter(|(_, o)| o.refs == RefCount::ForwardTo(id))
                    .map(|(&child, _)| child),
            );
            destroyed.push((id, object));
        }
        debug!(%owner, count = destroyed.len(), "proxy objects destroyed");
        destroyed
    }

    /// The device `id` belongs to, retained once.
    pub fn query_device(&mut self, id: ProxyId) -> Result<ProxyId, ProxyError> {
        let device = self
            .object(id)?
            .device
            .ok_or(ProxyError::WrongKind(id, "device child"))?;
        self.retain(device)?;
        Ok(device)
    }

    /// The container `id` lives in, retained once, or `None` for a standalone object.
    pub fn query_container(&mut self, id: ProxyId) -> Result<Option<ProxyId>, ProxyError> {
        let Some(container) = self.object(id)?.container() else {
            return Ok(None);
        };
        self.retain(container)?;
        Ok(Some(container))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};

    fn texture_with_surface(table: &mut ProxyTable) -> (ProxyId, ProxyId) {
        let texture = table.insert(ProxyObject::new(
            ObjectKind::Texture,
            Some(ResourceId(10)),
            RefCount::Local(1),
        ));
        let surface = table.insert(ProxyObject::new(
            ObjectKind::Surface,
            Some(ResourceId(10)),
            RefCount::ForwardTo(texture),
        ));
        (texture, surface)
    }

    #[test]
    fn contained_objects_forward_to_the_container() {
        let mut table = ProxyTable::new();
        let (texture, surface) = texture_with_surface(&mut table);

        assert_eq!(table.retain(surface), Ok(2));
        assert_eq!(table.ref_count(texture), Ok(2));
        assert_eq!(table.object(surface).unwrap().refs, RefCount::ForwardTo(texture));

        assert_eq!(table.release(surface).unwrap().count, 1);
        let released = table.release(texture).unwrap();
        assert_eq!(released.count, 0);
        let ids: Vec<ProxyId> = released.destroyed.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![texture, surface]);
        assert!(table.is_empty());
        assert_eq!(table.find_native(ResourceId(10)), None);
    }

    #[test]
    fn container_query_retains_once() {
        let mut table = ProxyTable::new();
        let (texture, surface) = texture_with_surface(&mut table);

        assert_eq!(table.query_container(surface), Ok(Some(texture)));
        assert_eq!(table.ref_count(texture), Ok(2));
        assert_eq!(table.query_container(texture), Ok(None));
        assert_eq!(table.ref_count(texture), Ok(2));
    }

    #[test]
    fn device_query_retains_the_device() {
        let mut table = ProxyTable::new();
        let device = table.insert(ProxyObject::new(ObjectKind::Device, None, RefCount::Local(1)));
        let mut buffer = ProxyObject::new(ObjectKind::Buffer, Some(ResourceId(1)), RefCount::Local(1));
        buffer.device = Some(device);
        let buffer = table.insert(buffer);

        assert_eq!(table.query_device(buffer), Ok(device));
        assert_eq!(table.ref_count(device), Ok(2));
        assert_eq!(
            table.query_device(device),
            Err(ProxyError::WrongKind(device, "device child"))
        );
    }

    #[test]
    fn released_objects_are_unknown() {
        let mut table = ProxyTable::new();
        let id = table.insert(ProxyObject::new(ObjectKind::Buffer, None, RefCount::Local(1)));
        table.release(id).unwrap();
        assert_eq!(table.retain(id), Err(ProxyError::UnknownObject(id)));
    }

    #[test]
    fn forwarding_cycles_are_detected() {
        let mut table = ProxyTable::new();
        let a = table.insert(ProxyObject::new(ObjectKind::Surface, None, RefCount::ForwardTo(ProxyId(2))));
        let _b = table.insert(ProxyObject::new(ObjectKind::Surface, None, RefCount::ForwardTo(a)));
        assert_eq!(table.retain(a), Err(ProxyError::ForwardingCycle(a)));
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        RetainTexture,
        RetainSurface,
        ReleaseTexture,
        ReleaseSurface,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::RetainTexture),
            Just(Op::RetainSurface),
            Just(Op::ReleaseTexture),
            Just(Op::ReleaseSurface),
        ]
    }

    #[test]
    fn refcount_forwarding_matches_a_single_counter() {
        let config = Config {
            cases: 256,
            failure_persistence: None,
            ..Config::default()
        };
        let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &[7; 32]);
        let mut runner = TestRunner::new_with_rng(config, rng);

        runner
            .run(&proptest::collection::vec(op(), 0..64), |ops| {
                let mut table = ProxyTable::new();
                let (texture, surface) = texture_with_surface(&mut table);
                let mut model: u32 = 1;

                for op in ops {
                    if model == 0 {
                        prop_assert!(table.is_empty());
                        break;
                    }
                    let result = match op {
                        Op::RetainTexture => table.retain(texture),
                        Op::RetainSurface => table.retain(surface),
                        Op::ReleaseTexture => table.release(texture).map(|r| r.count),
                        Op::ReleaseSurface => table.release(surface).map(|r| r.count),
                    };
                    model = match op {
                        Op::RetainTexture | Op::RetainSurface => model + 1,
                        Op::ReleaseTexture | Op::ReleaseSurface => model - 1,
                    };
                    prop_assert_eq!(result, Ok(model));
                    if model > 0 {
                        prop_assert_eq!(table.ref_count(surface), Ok(model));
                        prop_assert_eq!(table.object(surface).unwrap().refs, RefCount::ForwardTo(texture));
                    }
                }
                Ok(())
            })
            .unwrap();
    }
}
