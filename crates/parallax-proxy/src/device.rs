//! The intercepted device: proxy objects, the rule registry and the render side behind one
//! dispatch entry point.

use std::sync::Arc;

use hashbrown::HashMap;
use parallax_rules::{
    Eye, RegisterShaderRules, RuleBinding, RuleRegistry, ShaderHash, ShaderStage,
};
use tracing::{debug, warn};

use crate::backend::{
    BackendError, BindFlags, GraphicsBackend, ResourceId, ResourceKind, Usage,
    CONSTANT_BUFFER_SLOTS, CONSTANT_REGISTERS,
};
use crate::call::{CallArgs, CallContext, CallOutput, MethodId, NativeResult};
use crate::dispatch::Dispatcher;
use crate::handlers;
use crate::object::{ObjectKind, ProxyId, ProxyObject, ProxyTable, RefCount};
use crate::private_data::{PrivateDataKey, PrivateDataValue};
use crate::scheduler::RenderSideScheduler;
use crate::stereo::StereoResourcePair;

/// CPU copy handed out while a constant buffer is mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct MapShadow {
    pub binding: Option<RuleBinding>,
    pub data: Vec<u8>,
    pub discard: bool,
}

#[derive(Debug)]
pub struct StereoDevice<B: GraphicsBackend> {
    pub(crate) backend: B,
    pub(crate) registry: RuleRegistry,
    pub(crate) objects: ProxyTable,
    pub(crate) scheduler: RenderSideScheduler,
    pub(crate) shadows: HashMap<ProxyId, MapShadow>,
    pub(crate) stage_shaders: [Option<ProxyId>; 6],
    pub(crate) register_files: [Vec<f32>; 6],
    pub(crate) register_rules: HashMap<ShaderHash, RegisterShaderRules>,
    dispatcher: Dispatcher<B>,
    device: ProxyId,
}

impl<B: GraphicsBackend> StereoDevice<B> {
    /// Wraps `backend` with the default set of handlers installed.
    pub fn new(backend: B, registry: RuleRegistry) -> Self {
        let mut dispatcher = Dispatcher::new();
        handlers::install(&mut dispatcher);

        let mut objects = ProxyTable::new();
        let device = objects.insert(ProxyObject::new(ObjectKind::Device, None, RefCount::Local(1)));
        Self {
            backend,
            registry,
            objects,
            scheduler: RenderSideScheduler::new(),
            shadows: HashMap::new(),
            stage_shaders: [None; 6],
            register_files: std::array::from_fn(|_| vec![0.0; CONSTANT_REGISTERS * 4]),
            register_rules: HashMap::new(),
            dispatcher,
            device,
        }
    }

    pub fn device_id(&self) -> ProxyId {
        self.device
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RuleRegistry {
        &mut self.registry
    }

    pub fn objects(&self) -> &ProxyTable {
        &self.objects
    }

    pub fn scheduler(&self) -> &RenderSideScheduler {
        &self.scheduler
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<B> {
        &mut self.dispatcher
    }

    /// Runs one intercepted call: its handler if any, then the native call unless suppressed.
    pub fn call(&mut self, ctx: &mut CallContext) -> NativeResult {
        if let Some(handler) = self.dispatcher.lookup(ctx.interface, ctx.method) {
            handler(self, ctx);
        }
        if !ctx.suppress {
            self.forward(ctx);
        }
        ctx.result
    }

    /// Switches the eye being rendered and rebinds everything that differs per eye.
    pub fn set_render_side(&mut self, side: Eye) {
        if !self.scheduler.set_side(side) {
            return;
        }
        let failed = self.scheduler.rebind_all(&mut self.backend);
        debug!(?side, failed, "render side changed");
        for stage in ShaderStage::ALL {
            self.push_register_rules(stage);
        }
    }

    /// Application view of a mapped constant buffer.
    pub fn mapped_mut(&mut self, resource: ProxyId) -> Option<&mut [u8]> {
        self.shadows
            .get_mut(&resource)
            .map(|shadow| shadow.data.as_mut_slice())
    }

    /// The shader currently bound to `stage`.
    pub fn stage_shader(&self, stage: ShaderStage) -> Option<ProxyId> {
        self.stage_shaders[stage.index()]
    }

    pub(crate) fn native_of(&self, id: ProxyId) -> Option<ResourceId> {
        self.objects.get(id)?.native
    }

    pub(crate) fn stage_shader_hash(&self, stage: ShaderStage) -> Option<ShaderHash> {
        let shader = self.stage_shaders[stage.index()]?;
        self.objects.get(shader)?.metadata.shader_identity()
    }

    /// Adds a proxy owning `native`, duplicating it when it is a surface or texture.
    pub(crate) fn wrap_resource(&mut self, native: ResourceId, kind: ResourceKind) -> ProxyId {
        let kind = match kind {
            ResourceKind::Buffer => ObjectKind::Buffer,
            ResourceKind::Texture2D => ObjectKind::Texture,
            ResourceKind::Surface => ObjectKind::Surface,
        };
        let mut object = ProxyObject::new(kind, Some(native), RefCount::Local(1));
        object.device = Some(self.device);
        let id = self.objects.insert(object);
        if kind != ObjectKind::Buffer {
            self.ensure_stereo(id);
        }
        id
    }

    /// Gives `id` a stereo pair unless it already has one or is immutable.
    pub(crate) fn ensure_stereo(&mut self, id: ProxyId) -> Option<Arc<StereoResourcePair>> {
        let object = self.objects.get(id)?;
        if let Some(pair) = &object.stereo {
            return Some(Arc::clone(pair));
        }
        let native = object.native?;
        let pair = match StereoResourcePair::create(&mut self.backend, native) {
            Ok(pair) => Arc::new(pair),
            Err(err) => {
                warn!(%id, %native, error = %err, "resource could not be described");
                return None;
            }
        };
        if pair.desc().usage == Usage::Immutable {
            return None;
        }
        let object = self.objects.get_mut(id)?;
        if let Some(right) = pair.right() {
            object
                .metadata
                .set(PrivateDataKey::Twin, PrivateDataValue::Resource(right));
        }
        object.stereo = Some(Arc::clone(&pair));
        Some(pair)
    }

    /// Whether `id` is a constant buffer the rule engine may rewrite.
    pub(crate) fn is_constant_buffer(&self, id: ProxyId) -> bool {
        let Some(native) = self.native_of(id) else {
            return false;
        };
        self.backend.describe(native).is_ok_and(|desc| {
            desc.kind == ResourceKind::Buffer && desc.bind.contains(BindFlags::CONSTANT_BUFFER)
        })
    }

    /// Makes the rule binding of constant buffer `id`, bound at `slot` of `stage`, current.
    ///
    /// `force` discards the cached binding, e.g. after the stage's shader changed.
    pub(crate) fn verify_buffer(
        &mut self,
        id: ProxyId,
        slot: u32,
        stage: ShaderStage,
        force: bool,
    ) -> Option<RuleBinding> {
        let native = self.native_of(id)?;
        let desc = self.backend.describe(native).ok()?;
        if desc.usage == Usage::Immutable {
            return None;
        }
        let shader = self.stage_shader_hash(stage);
        let object = self.objects.get_mut(id)?;
        let current = if force { None } else { object.metadata.binding() };
        let binding = self
            .registry
            .verify_binding(current, desc.width, slot, shader);
        object.metadata.set_binding(binding);
        Some(binding)
    }

    /// Binding of constant buffer `id` under the registry's current rules.
    ///
    /// A stale binding is re-verified at the slot the buffer is bound to. A stale binding of a
    /// buffer that is not bound anywhere resolves to no rules until it is bound again.
    pub(crate) fn current_binding(&mut self, id: ProxyId) -> Option<RuleBinding> {
        let binding = self.objects.get(id)?.metadata.binding()?;
        if binding.is_current(self.registry.update_counter()) {
            return Some(binding);
        }
        match self.scheduler.find_bound(id) {
            Some((stage, slot)) => self.verify_buffer(id, slot, stage, false),
            None => {
                debug!(%id, "stale rule binding on an unbound buffer");
                None
            }
        }
    }

    /// Sends the current side's matched register constants of `stage`'s shader.
    pub(crate) fn push_register_rules(&mut self, stage: ShaderStage) {
        let Some(hash) = self.stage_shader_hash(stage) else {
            return;
        };
        let Some(rules) = self.register_rules.get(&hash) else {
            return;
        };
        for (register, floats) in rules.side_writes(self.scheduler.side()) {
            if let Err(err) = self
                .backend
                .set_shader_constants_f(stage, register, floats)
            {
                warn!(?stage, register, error = %err, "register constant write failed");
            }
        }
    }

    /// Releases the native resources of objects that left the table.
    pub(crate) fn destroy_objects(&mut self, destroyed: Vec<(ProxyId, ProxyObject)>) {
        for (id, object) in destroyed {
            self.shadows.remove(&id);
            for stage in self.scheduler.forget(id) {
                if let Err(err) = self.scheduler.bind(
                    &mut self.backend,
                    stage,
                    0,
                    CONSTANT_BUFFER_SLOTS as u32,
                ) {
                    warn!(%id, ?stage, error = %err, "unbinding released buffer failed");
                }
            }
            for slot in &mut self.stage_shaders {
                if *slot == Some(id) {
                    *slot = None;
                }
            }
            if !object.owns_native() {
                continue;
            }
            if let Some(pair) = &object.stereo {
                pair.release_extras(&mut self.backend);
            }
            if let Some(native) = object.native {
                if let Err(err) = self.backend.destroy_resource(native) {
                    warn!(%id, %native, error = %err, "native resource release failed");
                }
            }
        }
    }

    /// The unmodified native call.
    fn forward(&mut self, ctx: &mut CallContext) {
        match self.native_call(ctx.method, ctx.this, &ctx.args) {
            Ok(output) => {
                ctx.result = NativeResult::Ok;
                ctx.output = output;
            }
            Err(result) => {
                debug!(method = ?ctx.method, ?result, "native call failed");
                ctx.result = result;
            }
        }
    }

    fn native_opt(&self, id: Option<ProxyId>) -> Result<ResourceId, NativeResult> {
        id.and_then(|id| self.native_of(id))
            .ok_or(NativeResult::InvalidCall)
    }

    fn native_call(
        &mut self,
        method: MethodId,
        this: Option<ProxyId>,
        args: &CallArgs,
    ) -> Result<CallOutput, NativeResult> {
        let backend_err = |err: BackendError| NativeResult::from(&err);
        let done = |()| CallOutput::None;

        match (method, args) {
            (MethodId::LockRect, CallArgs::Lock { rect }) => {
                let id = self.native_opt(this)?;
                self.backend.lock(id, *rect).map(CallOutput::Locked).map_err(backend_err)
            }
            (MethodId::UnlockRect, _) => {
                let id = self.native_opt(this)?;
                self.backend.unlock(id).map(done).map_err(backend_err)
            }
            (MethodId::SetPriority, CallArgs::Priority { priority: Some(priority) }) => {
                let id = self.native_opt(this)?;
                self.backend
                    .set_priority(id, *priority)
                    .map(CallOutput::Count)
                    .map_err(backend_err)
            }
            (MethodId::PreLoad, _) => {
                let id = self.native_opt(this)?;
                self.backend.preload(id).map(done).map_err(backend_err)
            }
            (MethodId::ReleaseDc, _) => {
                let id = self.native_opt(this)?;
                self.backend.release_dc(id).map(done).map_err(backend_err)
            }
            (
                MethodId::UpdateSubresource,
                CallArgs::UpdateSubresource {
                    dst,
                    rect,
                    data: Some(data),
                },
            ) => {
                let dst = self.native_opt(*dst)?;
                self.backend.write(dst, *rect, data).map(done).map_err(backend_err)
            }
            (
                MethodId::CopyResource | MethodId::CopySubresourceRegion,
                CallArgs::Copy {
                    dst,
                    src,
                    src_rect,
                    dst_x,
                    dst_y,
                },
            ) => {
                let src = self.native_opt(*src)?;
                let dst = self.native_opt(*dst)?;
                let result = if method == MethodId::CopyResource {
                    self.backend.copy_region(src, None, dst, 0, 0)
                } else {
                    self.backend.copy_region(src, *src_rect, dst, *dst_x, *dst_y)
                };
                result.map(done).map_err(backend_err)
            }
            (MethodId::Map, CallArgs::Map { resource, .. }) => {
                let id = self.native_opt(*resource)?;
                self.backend.lock(id, None).map(CallOutput::Locked).map_err(backend_err)
            }
            (MethodId::Unmap, CallArgs::Unmap { resource }) => {
                let id = self.native_opt(*resource)?;
                self.backend.unlock(id).map(done).map_err(backend_err)
            }
            (
                MethodId::SetConstantBuffers,
                CallArgs::SetConstantBuffers {
                    stage,
                    start_slot,
                    buffers: Some(buffers),
                },
            ) => {
                let natives = buffers
                    .iter()
                    .map(|b| b.map(|id| self.native_opt(Some(id))).transpose())
                    .collect::<Result<Vec<_>, _>>()?;
                self.backend
                    .bind_constant_buffers(*stage, *start_slot, &natives)
                    .map(done)
                    .map_err(backend_err)
            }
            (MethodId::SetShader, CallArgs::SetShader { stage, shader }) => {
                let shader = shader.map(|id| self.native_opt(Some(id))).transpose()?;
                self.backend.set_shader(*stage, shader).map(done).map_err(backend_err)
            }
            (
                MethodId::SetShaderConstantF,
                CallArgs::SetShaderConstantF {
                    stage,
                    start_register,
                    data: Some(data),
                },
            ) => self
                .backend
                .set_shader_constants_f(*stage, *start_register, data)
                .map(done)
                .map_err(backend_err),
            (
                MethodId::CreateResource,
                CallArgs::CreateResource {
                    desc: Some(desc),
                    initial,
                },
            ) => {
                let native = self
                    .backend
                    .create_resource(desc, initial.as_deref())
                    .map_err(backend_err)?;
                Ok(CallOutput::Object(self.wrap_resource(native, desc.kind)))
            }
            _ => Err(NativeResult::InvalidCall),
        }
    }
}
