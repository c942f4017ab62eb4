use parallax_dxbc::test_utils::{
    build_container, build_ctab, build_rdef, build_sm3_vertex_shader, CtabConstantSpec,
    RdefVariableSpec,
};
use parallax_dxbc::FourCC;
use parallax_rules::{Eye, Mat4, ModificationRule, RuleRegistry, RuleSetIndex, ShaderStage};
use pretty_assertions::assert_eq;

use super::*;

fn call(
    device: &mut StereoDevice<SoftBackend>,
    interface: InterfaceId,
    method: MethodId,
    this: Option<ProxyId>,
    args: CallArgs,
) -> CallContext {
    let mut ctx = CallContext::new(interface, method, this, args);
    device.call(&mut ctx);
    ctx
}

fn context_call(device: &mut StereoDevice<SoftBackend>, method: MethodId, args: CallArgs) -> CallContext {
    let this = Some(device.device_id());
    call(device, InterfaceId::Context, method, this, args)
}

fn create(device: &mut StereoDevice<SoftBackend>, desc: ResourceDesc) -> ProxyId {
    let this = Some(device.device_id());
    let ctx = call(
        device,
        InterfaceId::Device,
        MethodId::CreateResource,
        this,
        CallArgs::CreateResource {
            desc: Some(desc),
            initial: None,
        },
    );
    match ctx.output {
        CallOutput::Object(id) => id,
        other => panic!("resource creation failed: {:?} {other:?}", ctx.result),
    }
}

fn native(device: &StereoDevice<SoftBackend>, id: ProxyId) -> ResourceId {
    device.objects().get(id).unwrap().native.unwrap()
}

fn twin(device: &StereoDevice<SoftBackend>, id: ProxyId) -> ResourceId {
    device.objects().get(id).unwrap().twin().unwrap()
}

fn identity_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    Mat4::IDENTITY.write_to(&mut bytes);
    bytes
}

fn vertex_shader_blob() -> Vec<u8> {
    let vars = [RdefVariableSpec {
        name: "worldViewProj",
        offset: 0,
        size: 64,
        class: 3,
    }];
    let rdef = build_rdef(&[("PerFrame", 64, &vars[..])]);
    build_container(&[(FourCC::RDEF, rdef.as_slice())])
}

fn device_with_rule(name: &str) -> StereoDevice<SoftBackend> {
    let mut registry = RuleRegistry::default();
    let rule = registry.add_rule(ModificationRule::matrix_named(name, 1));
    registry.enable_global(rule).unwrap();
    StereoDevice::new(SoftBackend::default(), registry)
}

fn create_shader(device: &mut StereoDevice<SoftBackend>, bytecode: Vec<u8>) -> ProxyId {
    let this = Some(device.device_id());
    let ctx = call(
        device,
        InterfaceId::Device,
        MethodId::CreateShader,
        this,
        CallArgs::CreateShader {
            stage: ShaderStage::Vertex,
            bytecode: Some(bytecode),
        },
    );
    match ctx.output {
        CallOutput::Object(id) => id,
        other => panic!("shader creation failed: {other:?}"),
    }
}

/// Device with a bound vertex shader and one constant buffer in slot 0.
fn bound_constant_buffer() -> (StereoDevice<SoftBackend>, ProxyId) {
    let mut device = device_with_rule("worldViewProj");
    let shader = create_shader(&mut device, vertex_shader_blob());
    context_call(
        &mut device,
        MethodId::SetShader,
        CallArgs::SetShader {
            stage: ShaderStage::Vertex,
            shader: Some(shader),
        },
    );
    let cb = create(
        &mut device,
        ResourceDesc::buffer(64, BindFlags::CONSTANT_BUFFER),
    );
    let ctx = context_call(
        &mut device,
        MethodId::SetConstantBuffers,
        CallArgs::SetConstantBuffers {
            stage: ShaderStage::Vertex,
            start_slot: 0,
            buffers: Some(vec![Some(cb)]),
        },
    );
    assert_eq!(ctx.result, NativeResult::Ok);
    (device, cb)
}

fn assert_split(device: &StereoDevice<SoftBackend>, cb: ProxyId) {
    let backend = device.backend();
    assert_eq!(
        Mat4::read_from(backend.resource_data(native(device, cb)).unwrap()),
        Some(Mat4::translation(-0.032, 0.0, 0.0))
    );
    assert_eq!(
        Mat4::read_from(backend.resource_data(twin(device, cb)).unwrap()),
        Some(Mat4::translation(0.032, 0.0, 0.0))
    );
}

#[test]
fn surface_levels_forward_references_to_their_texture() {
    let mut device = StereoDevice::new(SoftBackend::default(), RuleRegistry::default());
    let texture = create(&mut device, ResourceDesc::texture2d(8, 8, 28, 4));
    let ctx = call(
        &mut device,
        InterfaceId::Texture,
        MethodId::GetSurfaceLevel,
        Some(texture),
        CallArgs::SurfaceLevel { level: Some(0) },
    );
    let CallOutput::Object(surface) = ctx.output else {
        panic!("no surface: {:?}", ctx.result);
    };
    assert_eq!(device.objects().ref_count(texture), Ok(2));

    let again = call(
        &mut device,
        InterfaceId::Texture,
        MethodId::GetSurfaceLevel,
        Some(texture),
        CallArgs::SurfaceLevel { level: Some(0) },
    );
    assert_eq!(again.output, CallOutput::Object(surface));

    let ctx = call(&mut device, InterfaceId::Surface, MethodId::AddRef, Some(surface), CallArgs::None);
    assert_eq!(ctx.output, CallOutput::Count(4));

    let ctx = call(
        &mut device,
        InterfaceId::Surface,
        MethodId::GetContainer,
        Some(surface),
        CallArgs::None,
    );
    assert_eq!(ctx.output, CallOutput::Object(texture));
    assert_eq!(device.objects().ref_count(texture), Ok(5));

    let ctx = call(
        &mut device,
        InterfaceId::Texture,
        MethodId::GetDevice,
        Some(texture),
        CallArgs::None,
    );
    assert_eq!(ctx.output, CallOutput::Object(device.device_id()));

    // Texture and its twin are live; everything goes once the count reaches zero.
    assert_eq!(device.backend().live_resources(), 2);
    for expected in (0..5).rev() {
        let ctx = call(&mut device, InterfaceId::Surface, MethodId::Release, Some(surface), CallArgs::None);
        assert_eq!(ctx.output, CallOutput::Count(expected));
    }
    assert!(device.objects().get(surface).is_none());
    assert_eq!(device.backend().live_resources(), 0);
}

#[test]
fn container_query_without_container_is_an_invalid_call() {
    let mut device = StereoDevice::new(SoftBackend::default(), RuleRegistry::default());
    let surface = create(&mut device, ResourceDesc::surface(4, 4, 21, 1));
    let ctx = call(
        &mut device,
        InterfaceId::Surface,
        MethodId::GetContainer,
        Some(surface),
        CallArgs::None,
    );
    assert_eq!(ctx.result, NativeResult::InvalidCall);
    assert_eq!(device.objects().ref_count(surface), Ok(1));
}

#[test]
fn locked_rect_is_replicated_to_both_eyes() {
    let mut device = StereoDevice::new(SoftBackend::default(), RuleRegistry::default());
    let surface = create(&mut device, ResourceDesc::surface(16, 16, 21, 1));
    let rect = Rect::new(0, 0, 10, 10);

    let ctx = call(
        &mut device,
        InterfaceId::Surface,
        MethodId::LockRect,
        Some(surface),
        CallArgs::Lock { rect: Some(rect) },
    );
    let CallOutput::Locked(region) = ctx.output else {
        panic!("lock failed: {:?}", ctx.result);
    };
    device
        .backend_mut()
        .write(region.resource, Some(rect), &[0x5A; 100])
        .unwrap();
    let ctx = call(&mut device, InterfaceId::Surface, MethodId::UnlockRect, Some(surface), CallArgs::None);
    assert_eq!(ctx.result, NativeResult::Ok);

    let left = device.backend().resource_data(native(&device, surface)).unwrap();
    let right = device.backend().resource_data(twin(&device, surface)).unwrap();
    assert_eq!(left, right);
    for (i, byte) in left.iter().enumerate() {
        let (x, y) = (i % 16, i / 16);
        let inside = x < 10 && y < 10;
        assert_eq!(*byte, if inside { 0x5A } else { 0 }, "pixel ({x}, {y})");
    }
}

#[test]
fn housekeeping_reaches_both_halves() {
    let mut device = StereoDevice::new(SoftBackend::default(), RuleRegistry::default());
    let surface = create(&mut device, ResourceDesc::surface(4, 4, 21, 1));
    let (left, right) = (native(&device, surface), twin(&device, surface));

    let ctx = call(
        &mut device,
        InterfaceId::Surface,
        MethodId::SetPriority,
        Some(surface),
        CallArgs::Priority { priority: Some(5) },
    );
    assert_eq!(ctx.output, CallOutput::Count(0));
    call(&mut device, InterfaceId::Surface, MethodId::PreLoad, Some(surface), CallArgs::None);
    call(&mut device, InterfaceId::Surface, MethodId::ReleaseDc, Some(surface), CallArgs::None);

    for id in [left, right] {
        assert_eq!(device.backend().priority(id), Some(5));
        assert_eq!(device.backend().housekeeping_calls(id), Some((1, 1)));
    }
}

#[test]
fn private_data_round_trips_through_the_proxy() {
    let mut device = StereoDevice::new(SoftBackend::default(), RuleRegistry::default());
    let surface = create(&mut device, ResourceDesc::surface(4, 4, 21, 1));
    let key = [0x11; 16];

    let set = call(
        &mut device,
        InterfaceId::Surface,
        MethodId::SetPrivateData,
        Some(surface),
        CallArgs::PrivateData {
            key: Some(key),
            data: Some(vec![1, 2, 3]),
        },
    );
    assert_eq!(set.result, NativeResult::Ok);

    let get = call(
        &mut device,
        InterfaceId::Surface,
        MethodId::GetPrivateData,
        Some(surface),
        CallArgs::PrivateData {
            key: Some(key),
            data: None,
        },
    );
    assert_eq!(get.output, CallOutput::Bytes(vec![1, 2, 3]));

    let free = CallArgs::PrivateData {
        key: Some(key),
        data: None,
    };
    let ctx = call(&mut device, InterfaceId::Surface, MethodId::FreePrivateData, Some(surface), free.clone());
    assert_eq!(ctx.result, NativeResult::Ok);
    let ctx = call(&mut device, InterfaceId::Surface, MethodId::FreePrivateData, Some(surface), free);
    assert_eq!(ctx.result, NativeResult::NotFound);
}

#[test]
fn constant_buffer_update_is_split_per_eye() {
    let (mut device, cb) = bound_constant_buffer();
    let binding = device.objects().get(cb).unwrap().metadata.binding().unwrap();
    assert!(matches!(binding.rule_set, RuleSetIndex::Index(_)));

    let ctx = context_call(
        &mut device,
        MethodId::UpdateSubresource,
        CallArgs::UpdateSubresource {
            dst: Some(cb),
            rect: None,
            data: Some(identity_bytes()),
        },
    );
    assert!(ctx.suppress);
    assert_eq!(ctx.result, NativeResult::Ok);
    assert_split(&device, cb);
}

#[test]
fn render_side_selects_the_bound_half() {
    let (mut device, cb) = bound_constant_buffer();
    let (left, right) = (native(&device, cb), twin(&device, cb));
    assert_eq!(device.backend().constant_buffers(ShaderStage::Vertex)[0], Some(left));

    device.set_render_side(Eye::Right);
    assert_eq!(device.backend().constant_buffers(ShaderStage::Vertex)[0], Some(right));

    // The application only ever sees its own buffer.
    let ctx = context_call(
        &mut device,
        MethodId::GetConstantBuffers,
        CallArgs::GetConstantBuffers {
            stage: ShaderStage::Vertex,
            start_slot: 0,
            count: 2,
        },
    );
    assert_eq!(ctx.output, CallOutput::Objects(vec![Some(cb), None]));
    assert_eq!(device.objects().ref_count(cb), Ok(2));
}

#[test]
fn mapped_constant_buffer_is_split_on_unmap() {
    let (mut device, cb) = bound_constant_buffer();
    let ctx = context_call(
        &mut device,
        MethodId::Map,
        CallArgs::Map {
            resource: Some(cb),
            discard: true,
        },
    );
    assert_eq!(ctx.output, CallOutput::Mapped { resource: cb, len: 64 });
    device
        .mapped_mut(cb)
        .unwrap()
        .copy_from_slice(&identity_bytes());

    let ctx = context_call(&mut device, MethodId::Unmap, CallArgs::Unmap { resource: Some(cb) });
    assert_eq!(ctx.result, NativeResult::Ok);
    assert!(!device.backend().is_locked(native(&device, cb)));
    assert!(device.mapped_mut(cb).is_none());
    assert_split(&device, cb);
}

#[test]
fn copies_carry_the_binding_and_the_twin() {
    let (mut device, src) = bound_constant_buffer();
    context_call(
        &mut device,
        MethodId::UpdateSubresource,
        CallArgs::UpdateSubresource {
            dst: Some(src),
            rect: None,
            data: Some(identity_bytes()),
        },
    );
    let dst = create(
        &mut device,
        ResourceDesc::buffer(64, BindFlags::CONSTANT_BUFFER),
    );
    context_call(
        &mut device,
        MethodId::SetConstantBuffers,
        CallArgs::SetConstantBuffers {
            stage: ShaderStage::Vertex,
            start_slot: 1,
            buffers: Some(vec![Some(dst)]),
        },
    );

    let ctx = context_call(
        &mut device,
        MethodId::CopyResource,
        CallArgs::Copy {
            dst: Some(dst),
            src: Some(src),
            src_rect: None,
            dst_x: 0,
            dst_y: 0,
        },
    );
    assert_eq!(ctx.result, NativeResult::Ok);
    assert_eq!(
        device.objects().get(dst).unwrap().metadata.binding(),
        device.objects().get(src).unwrap().metadata.binding()
    );
    assert_split(&device, dst);
}

#[test]
fn immutable_buffers_get_no_twin_or_binding() {
    let mut device = device_with_rule("worldViewProj");
    let desc = ResourceDesc {
        usage: Usage::Immutable,
        ..ResourceDesc::buffer(64, BindFlags::CONSTANT_BUFFER)
    };
    let cb = create(&mut device, desc);
    context_call(
        &mut device,
        MethodId::SetConstantBuffers,
        CallArgs::SetConstantBuffers {
            stage: ShaderStage::Vertex,
            start_slot: 0,
            buffers: Some(vec![Some(cb)]),
        },
    );
    let object = device.objects().get(cb).unwrap();
    assert!(object.stereo.is_none());
    assert_eq!(object.metadata.binding(), None);
    assert_eq!(device.backend().live_resources(), 1);
}

#[test]
fn missing_argument_slots_fall_back_to_forwarding() {
    let (mut device, _cb) = bound_constant_buffer();
    let before = device.backend().bind_log().len();
    let ctx = context_call(
        &mut device,
        MethodId::SetConstantBuffers,
        CallArgs::SetConstantBuffers {
            stage: ShaderStage::Vertex,
            start_slot: 0,
            buffers: None,
        },
    );
    assert!(!ctx.suppress);
    assert_eq!(ctx.result, NativeResult::InvalidCall);
    assert_eq!(device.backend().bind_log().len(), before);
}

#[test]
fn shader_switch_reverifies_bound_buffers() {
    let mut device = device_with_rule("worldViewProj");
    let cb = create(
        &mut device,
        ResourceDesc::buffer(64, BindFlags::CONSTANT_BUFFER),
    );
    // Bound before any shader: naming rules cannot match yet.
    context_call(
        &mut device,
        MethodId::SetConstantBuffers,
        CallArgs::SetConstantBuffers {
            stage: ShaderStage::Vertex,
            start_slot: 0,
            buffers: Some(vec![Some(cb)]),
        },
    );
    let binding = device.objects().get(cb).unwrap().metadata.binding().unwrap();
    assert_eq!(binding.rule_set, RuleSetIndex::NoRules);

    let shader = create_shader(&mut device, vertex_shader_blob());
    context_call(
        &mut device,
        MethodId::SetShader,
        CallArgs::SetShader {
            stage: ShaderStage::Vertex,
            shader: Some(shader),
        },
    );
    let object = device.objects().get(cb).unwrap();
    assert!(matches!(
        object.metadata.binding().unwrap().rule_set,
        RuleSetIndex::Index(_)
    ));
    assert!(object.metadata.shader_identity().is_some());
    assert_eq!(
        device.backend().bound_shader(ShaderStage::Vertex),
        Some(native(&device, shader))
    );
}

#[test]
fn register_constants_follow_the_render_side() {
    let mut device = device_with_rule("matWorldViewProj");
    let ctab = build_ctab(
        "vs_3_0",
        &[CtabConstantSpec {
            name: "matWorldViewProj",
            register_index: 0,
            register_count: 4,
            class: 2,
        }],
    );
    let shader = create_shader(&mut device, build_sm3_vertex_shader(&ctab));
    let this = Some(device.device_id());
    call(
        &mut device,
        InterfaceId::Device,
        MethodId::SetShader,
        this,
        CallArgs::SetShader {
            stage: ShaderStage::Vertex,
            shader: Some(shader),
        },
    );

    let ctx = call(
        &mut device,
        InterfaceId::Device,
        MethodId::SetShaderConstantF,
        this,
        CallArgs::SetShaderConstantF {
            stage: ShaderStage::Vertex,
            start_register: 0,
            data: Some(Mat4::IDENTITY.to_floats().to_vec()),
        },
    );
    assert!(ctx.suppress);
    let registers = |device: &StereoDevice<SoftBackend>| {
        Mat4::from_floats(&device.backend().registers(ShaderStage::Vertex)[..16])
    };
    assert_eq!(registers(&device), Some(Mat4::translation(-0.032, 0.0, 0.0)));

    device.set_render_side(Eye::Right);
    assert_eq!(registers(&device), Some(Mat4::translation(0.032, 0.0, 0.0)));

    // Registers no rule covers pass straight through.
    let ctx = call(
        &mut device,
        InterfaceId::Device,
        MethodId::SetShaderConstantF,
        this,
        CallArgs::SetShaderConstantF {
            stage: ShaderStage::Vertex,
            start_register: 8,
            data: Some(vec![1.0, 2.0, 3.0, 4.0]),
        },
    );
    assert!(!ctx.suppress);
    assert_eq!(
        &device.backend().registers(ShaderStage::Vertex)[32..36],
        &[1.0, 2.0, 3.0, 4.0]
    );
}

#[test]
fn handlers_can_be_replaced() {
    fn swallow(_: &mut StereoDevice<SoftBackend>, ctx: &mut CallContext) {
        ctx.complete(NativeResult::Ok, CallOutput::None);
    }

    let mut device = StereoDevice::new(SoftBackend::default(), RuleRegistry::default());
    let surface = create(&mut device, ResourceDesc::surface(4, 4, 21, 1));
    device
        .dispatcher_mut()
        .register(InterfaceId::Surface, MethodId::LockRect, swallow);

    let ctx = call(
        &mut device,
        InterfaceId::Surface,
        MethodId::LockRect,
        Some(surface),
        CallArgs::Lock { rect: None },
    );
    assert_eq!(ctx.output, CallOutput::None);
    assert!(!device.backend().is_locked(native(&device, surface)));
}

fn assert_unsplit(device: &StereoDevice<SoftBackend>, cb: ProxyId) {
    for resource in [native(device, cb), twin(device, cb)] {
        assert_eq!(
            Mat4::read_from(device.backend().resource_data(resource).unwrap()),
            Some(Mat4::IDENTITY),
            "{resource}"
        );
    }
}

#[test]
fn deleted_rule_no_longer_applies_to_bound_buffers() {
    let (mut device, cb) = bound_constant_buffer();
    let hud = device
        .registry_mut()
        .add_rule(ModificationRule::matrix_named("worldViewProj", 5));
    assert_eq!(hud, 1);
    // The HUD rule slides into index 0 but was never enabled.
    device.registry_mut().delete_rule(0).unwrap();

    let ctx = context_call(
        &mut device,
        MethodId::UpdateSubresource,
        CallArgs::UpdateSubresource {
            dst: Some(cb),
            rect: None,
            data: Some(identity_bytes()),
        },
    );
    assert_eq!(ctx.result, NativeResult::Ok);
    assert_unsplit(&device, cb);

    let binding = device.objects().get(cb).unwrap().metadata.binding().unwrap();
    assert_eq!(binding.rule_set, RuleSetIndex::NoRules);
    assert!(binding.is_current(device.registry().update_counter()));
}

#[test]
fn rules_cleared_while_mapped_are_not_applied_on_unmap() {
    let (mut device, cb) = bound_constant_buffer();
    let ctx = context_call(
        &mut device,
        MethodId::Map,
        CallArgs::Map {
            resource: Some(cb),
            discard: true,
        },
    );
    assert_eq!(ctx.result, NativeResult::Ok);
    device
        .mapped_mut(cb)
        .unwrap()
        .copy_from_slice(&identity_bytes());

    device.registry_mut().clear();
    let ctx = context_call(&mut device, MethodId::Unmap, CallArgs::Unmap { resource: Some(cb) });
    assert_eq!(ctx.result, NativeResult::Ok);
    assert!(!device.backend().is_locked(native(&device, cb)));
    assert_unsplit(&device, cb);
}

#[test]
fn released_bound_buffer_does_not_block_other_stages() {
    let (mut device, released) = bound_constant_buffer();
    let kept = create(
        &mut device,
        ResourceDesc::buffer(64, BindFlags::CONSTANT_BUFFER),
    );
    let ctx = context_call(
        &mut device,
        MethodId::SetConstantBuffers,
        CallArgs::SetConstantBuffers {
            stage: ShaderStage::Pixel,
            start_slot: 0,
            buffers: Some(vec![Some(kept)]),
        },
    );
    assert_eq!(ctx.result, NativeResult::Ok);
    let kept_twin = twin(&device, kept);

    let ctx = call(&mut device, InterfaceId::Buffer, MethodId::Release, Some(released), CallArgs::None);
    assert_eq!(ctx.output, CallOutput::Count(0));
    assert!(device.objects().get(released).is_none());
    assert_eq!(device.backend().constant_buffers(ShaderStage::Vertex)[0], None);

    device.set_render_side(Eye::Right);
    assert_eq!(device.backend().constant_buffers(ShaderStage::Pixel)[0], Some(kept_twin));

    let ctx = context_call(
        &mut device,
        MethodId::GetConstantBuffers,
        CallArgs::GetConstantBuffers {
            stage: ShaderStage::Vertex,
            start_slot: 0,
            count: 1,
        },
    );
    assert_eq!(ctx.output, CallOutput::Objects(vec![None]));
}
