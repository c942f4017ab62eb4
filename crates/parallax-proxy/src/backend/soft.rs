use hashbrown::HashMap;
use parallax_rules::ShaderStage;

use super::{
    BackendCaps, BackendError, GraphicsBackend, LockedRegion, Rect, ResourceDesc, ResourceId,
    CONSTANT_BUFFER_SLOTS, CONSTANT_REGISTERS,
};

const SHARED_HANDLE_BASE: u64 = 0x5000_0000;

#[derive(Debug)]
struct SoftResource {
    desc: ResourceDesc,
    data: Vec<u8>,
    locked: bool,
    priority: u32,
    preloads: u32,
    dc_releases: u32,
}

/// One recorded constant buffer bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferBind {
    pub stage: ShaderStage,
    pub start_slot: u32,
    pub buffers: Vec<Option<ResourceId>>,
}

/// Deterministic in-memory backend for tests and offline tools.
#[derive(Debug)]
pub struct SoftBackend {
    caps: BackendCaps,
    next_id: u32,
    resources: HashMap<ResourceId, SoftResource>,
    shaders: HashMap<ResourceId, (ShaderStage, Vec<u8>)>,
    constant_buffers: [Vec<Option<ResourceId>>; 6],
    bound_shaders: [Option<ResourceId>; 6],
    registers: [Vec<f32>; 6],
    bind_log: Vec<ConstantBufferBind>,
    failing_creates: u32,
}

impl Default for SoftBackend {
    fn default() -> Self {
        Self::new(BackendCaps::CONSTANT_BUFFERS | BackendCaps::CONSTANT_REGISTERS)
    }
}

impl SoftBackend {
    pub fn new(caps: BackendCaps) -> Self {
        Self {
            caps,
            next_id: 1,
            resources: HashMap::new(),
            shaders: HashMap::new(),
            constant_buffers: std::array::from_fn(|_| vec![None; CONSTANT_BUFFER_SLOTS]),
            bound_shaders: [None; 6],
            registers: std::array::from_fn(|_| vec![0.0; CONSTANT_REGISTERS * 4]),
            bind_log: Vec::new(),
            failing_creates: 0,
        }
    }

    /// Makes the next `count` resource creations fail with [`BackendError::OutOfMemory`].
    pub fn fail_next_creates(&mut self, count: u32) {
        self.failing_creates = count;
    }

    pub fn resource_data(&self, id: ResourceId) -> Option<&[u8]> {
        self.resources.get(&id).map(|r| r.data.as_slice())
    }

    pub fn is_locked(&self, id: ResourceId) -> bool {
        self.resources.get(&id).is_some_and(|r| r.locked)
    }

    pub fn priority(&self, id: ResourceId) -> Option<u32> {
        self.resources.get(&id).map(|r| r.priority)
    }

    /// `(preloads, dc_releases)` seen by `id`.
    pub fn housekeeping_calls(&self, id: ResourceId) -> Option<(u32, u32)> {
        self.resources.get(&id).map(|r| (r.preloads, r.dc_releases))
    }

    pub fn live_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn constant_buffers(&self, stage: ShaderStage) -> &[Option<ResourceId>] {
        &self.constant_buffers[stage.index()]
    }

    pub fn bound_shader(&self, stage: ShaderStage) -> Option<ResourceId> {
        self.bound_shaders[stage.index()]
    }

    pub fn shader_bytecode(&self, id: ResourceId) -> Option<&[u8]> {
        self.shaders.get(&id).map(|(_, bytes)| bytes.as_slice())
    }

    pub fn registers(&self, stage: ShaderStage) -> &[f32] {
        &self.registers[stage.index()]
    }

    pub fn bind_log(&self) -> &[ConstantBufferBind] {
        &self.bind_log
    }

    fn allocate_id(&mut self) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        id
    }

    fn resource(&self, id: ResourceId) -> Result<&SoftResource, BackendError> {
        self.resources
            .get(&id)
            .ok_or(BackendError::InvalidResource(id))
    }

    fn resource_mut(&mut self, id: ResourceId) -> Result<&mut SoftResource, BackendError> {
        self.resources
            .get_mut(&id)
            .ok_or(BackendError::InvalidResource(id))
    }
}

/// Byte ranges of each row of `rect` inside a resource laid out as `desc`.
fn row_ranges(
    desc: &ResourceDesc,
    rect: Rect,
) -> Result<impl Iterator<Item = core::ops::Range<usize>>, BackendError> {
    if !rect.fits(desc) {
        return Err(BackendError::OutOfBounds);
    }
    let pitch = desc.row_pitch();
    let bpp = desc.bytes_per_texel as usize;
    let start = rect.left as usize * bpp;
    let len = rect.width() as usize * bpp;
    Ok((rect.top as usize..rect.bottom as usize).map(move |y| {
        let offset = y * pitch + start;
        offset..offset + len
    }))
}

impl GraphicsBackend for SoftBackend {
    fn capabilities(&self) -> BackendCaps {
        self.caps
    }

    fn create_resource(
        &mut self,
        desc: &ResourceDesc,
        initial: Option<&[u8]>,
    ) -> Result<ResourceId, BackendError> {
        if self.failing_creates > 0 {
            self.failing_creates -= 1;
            return Err(BackendError::OutOfMemory);
        }
        let mut data = vec![0u8; desc.byte_len()];
        if let Some(initial) = initial {
            data.get_mut(..initial.len())
                .ok_or(BackendError::OutOfBounds)?
                .copy_from_slice(initial);
        }
        let id = self.allocate_id();
        self.resources.insert(
            id,
            SoftResource {
                desc: *desc,
                data,
                locked: false,
                priority: 0,
                preloads: 0,
                dc_releases: 0,
            },
        );
        Ok(id)
    }

    fn destroy_resource(&mut self, id: ResourceId) -> Result<(), BackendError> {
        if self.resources.remove(&id).is_some() || self.shaders.remove(&id).is_some() {
            Ok(())
        } else {
            Err(BackendError::InvalidResource(id))
        }
    }

    fn describe(&self, id: ResourceId) -> Result<ResourceDesc, BackendError> {
        Ok(self.resource(id)?.desc)
    }

    fn read(&self, id: ResourceId, rect: Option<Rect>) -> Result<Vec<u8>, BackendError> {
        let resource = self.resource(id)?;
        let rect = rect.unwrap_or_else(|| resource.desc.full_rect());
        let mut out = Vec::new();
        for range in row_ranges(&resource.desc, rect)? {
            out.extend_from_slice(&resource.data[range]);
        }
        Ok(out)
    }

    fn write(
        &mut self,
        id: ResourceId,
        rect: Option<Rect>,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let resource = self.resource_mut(id)?;
        let rect = rect.unwrap_or_else(|| resource.desc.full_rect());
        let expected = rect.width() as usize
            * rect.height() as usize
            * resource.desc.bytes_per_texel as usize;
        if data.len() != expected {
            return Err(BackendError::OutOfBounds);
        }
        let mut src = data;
        for range in row_ranges(&resource.desc, rect)? {
            let (row, rest) = src.split_at(range.len());
            resource.data[range].copy_from_slice(row);
            src = rest;
        }
        Ok(())
    }

    fn copy_region(
        &mut self,
        src: ResourceId,
        src_rect: Option<Rect>,
        dst: ResourceId,
        dst_x: u32,
        dst_y: u32,
    ) -> Result<(), BackendError> {
        let src_desc = self.resource(src)?.desc;
        let dst_desc = self.resource(dst)?.desc;
        if src_desc.bytes_per_texel != dst_desc.bytes_per_texel {
            return Err(BackendError::Unsupported("copy between texel sizes"));
        }
        let src_rect = src_rect.unwrap_or_else(|| src_desc.full_rect());
        let bytes = self.read(src, Some(src_rect))?;
        let dst_rect = Rect::new(
            dst_x,
            dst_y,
            dst_x.saturating_add(src_rect.width()),
            dst_y.saturating_add(src_rect.height()),
        );
        self.write(dst, Some(dst_rect), &bytes)
    }

    fn lock(&mut self, id: ResourceId, rect: Option<Rect>) -> Result<LockedRegion, BackendError> {
        let resource = self.resource_mut(id)?;
        if resource.locked {
            return Err(BackendError::InvalidState("resource already locked"));
        }
        let rect = rect.unwrap_or_else(|| resource.desc.full_rect());
        if !rect.fits(&resource.desc) {
            return Err(BackendError::OutOfBounds);
        }
        resource.locked = true;
        Ok(LockedRegion {
            resource: id,
            rect,
            row_pitch: resource.desc.row_pitch(),
        })
    }

    fn unlock(&mut self, id: ResourceId) -> Result<(), BackendError> {
        let resource = self.resource_mut(id)?;
        if !resource.locked {
            return Err(BackendError::InvalidState("resource not locked"));
        }
        resource.locked = false;
        Ok(())
    }

    fn set_priority(&mut self, id: ResourceId, priority: u32) -> Result<u32, BackendError> {
        let resource = self.resource_mut(id)?;
        Ok(core::mem::replace(&mut resource.priority, priority))
    }

    fn preload(&mut self, id: ResourceId) -> Result<(), BackendError> {
        self.resource_mut(id)?.preloads += 1;
        Ok(())
    }

    fn release_dc(&mut self, id: ResourceId) -> Result<(), BackendError> {
        self.resource_mut(id)?.dc_releases += 1;
        Ok(())
    }

    fn shared_handle(&self, id: ResourceId) -> Option<u64> {
        (self.caps.contains(BackendCaps::SHARED_HANDLES) && self.resources.contains_key(&id))
            .then(|| SHARED_HANDLE_BASE + u64::from(id.0))
    }

    fn bind_constant_buffers(
        &mut self,
        stage: ShaderStage,
        start_slot: u32,
        buffers: &[Option<ResourceId>],
    ) -> Result<(), BackendError> {
        if !self.caps.contains(BackendCaps::CONSTANT_BUFFERS) {
            return Err(BackendError::Unsupported("constant buffers"));
        }
        let start = start_slot as usize;
        let slots = self.constant_buffers[stage.index()]
            .get_mut(start..start + buffers.len())
            .ok_or(BackendError::OutOfBounds)?;
        for id in buffers.iter().flatten() {
            if !self.resources.contains_key(id) {
                return Err(BackendError::InvalidResource(*id));
            }
        }
        slots.copy_from_slice(buffers);
        self.bind_log.push(ConstantBufferBind {
            stage,
            start_slot,
            buffers: buffers.to_vec(),
        });
        Ok(())
    }

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        bytecode: &[u8],
    ) -> Result<ResourceId, BackendError> {
        if bytecode.is_empty() {
            return Err(BackendError::InvalidState("empty shader bytecode"));
        }
        let id = self.allocate_id();
        self.shaders.insert(id, (stage, bytecode.to_vec()));
        Ok(id)
    }

    fn set_shader(
        &mut self,
        stage: ShaderStage,
        shader: Option<ResourceId>,
    ) -> Result<(), BackendError> {
        if let Some(id) = shader {
            match self.shaders.get(&id) {
                Some((shader_stage, _)) if *shader_stage == stage => {}
                Some(_) => return Err(BackendError::InvalidState("shader stage mismatch")),
                None => return Err(BackendError::InvalidResource(id)),
            }
        }
        self.bound_shaders[stage.index()] = shader;
        Ok(())
    }

    fn set_shader_constants_f(
        &mut self,
        stage: ShaderStage,
        start_register: u32,
        data: &[f32],
    ) -> Result<(), BackendError> {
        if !self.caps.contains(BackendCaps::CONSTANT_REGISTERS) {
            return Err(BackendError::Unsupported("constant registers"));
        }
        let start = start_register as usize * 4;
        self.registers[stage.index()]
            .get_mut(start..start + data.len())
            .ok_or(BackendError::OutOfBounds)?
            .copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ResourceDesc;
    use pretty_assertions::assert_eq;

    #[test]
    fn region_copy_moves_only_the_rectangle() {
        let mut backend = SoftBackend::default();
        let desc = ResourceDesc::surface(4, 4, 0, 1);
        let src = backend
            .create_resource(&desc, Some(&(0u8..16).collect::<Vec<_>>()))
            .unwrap();
        let dst = backend.create_resource(&desc, None).unwrap();

        backend
            .copy_region(src, Some(Rect::new(1, 1, 3, 3)), dst, 0, 2)
            .unwrap();
        assert_eq!(
            backend.resource_data(dst).unwrap(),
            &[0, 0, 0, 0, 0, 0, 0, 0, 5, 6, 0, 0, 9, 10, 0, 0]
        );
    }

    #[test]
    fn double_lock_is_rejected() {
        let mut backend = SoftBackend::default();
        let id = backend
            .create_resource(&ResourceDesc::surface(2, 2, 0, 4), None)
            .unwrap();
        let region = backend.lock(id, None).unwrap();
        assert_eq!(region.row_pitch, 8);
        assert_eq!(
            backend.lock(id, None),
            Err(BackendError::InvalidState("resource already locked"))
        );
        backend.unlock(id).unwrap();
        assert!(backend.unlock(id).is_err());
    }

    #[test]
    fn failing_creates_are_consumed() {
        let mut backend = SoftBackend::default();
        backend.fail_next_creates(1);
        let desc = ResourceDesc::buffer(16, Default::default());
        assert_eq!(
            backend.create_resource(&desc, None),
            Err(BackendError::OutOfMemory)
        );
        assert!(backend.create_resource(&desc, None).is_ok());
    }

    #[test]
    fn writes_outside_the_resource_fail() {
        let mut backend = SoftBackend::default();
        let id = backend
            .create_resource(&ResourceDesc::buffer(8, Default::default()), None)
            .unwrap();
        assert_eq!(
            backend.write(id, Some(Rect::new(4, 0, 12, 1)), &[0; 8]),
            Err(BackendError::OutOfBounds)
        );
    }

    #[test]
    fn shared_handles_follow_capabilities() {
        let mut backend = SoftBackend::new(BackendCaps::SHARED_HANDLES);
        let id = backend
            .create_resource(&ResourceDesc::surface(1, 1, 0, 4), None)
            .unwrap();
        assert!(backend.shared_handle(id).is_some());
        assert_eq!(SoftBackend::default().shared_handle(id), None);
    }
}
