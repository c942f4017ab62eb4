//! Shader creation and binding, and register-file constant writes.

use parallax_rules::{RegisterShaderRules, ShaderHash};
use tracing::{debug, warn};

use crate::backend::{BackendCaps, GraphicsBackend};
use crate::call::{CallArgs, CallContext, CallOutput, NativeResult};
use crate::device::StereoDevice;
use crate::object::{ObjectKind, ProxyObject, RefCount};
use crate::private_data::{PrivateDataKey, PrivateDataValue};

const CONTAINER_MAGIC: &[u8; 4] = b"DXBC";

pub(super) fn create_shader<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::CreateShader {
        stage,
        bytecode: Some(bytecode),
    } = &ctx.args
    else {
        return;
    };
    let stage = *stage;
    let bytecode = bytecode.clone();

    let native = match device.backend.create_shader(stage, &bytecode) {
        Ok(native) => native,
        Err(err) => return ctx.complete_with(Err(err)),
    };

    let hash = match device.registry.register_shader(stage, &bytecode) {
        Ok(record) => {
            let register_file = !bytecode.starts_with(CONTAINER_MAGIC)
                && device
                    .backend
                    .capabilities()
                    .contains(BackendCaps::CONSTANT_REGISTERS);
            if register_file && !device.register_rules.contains_key(&record.hash) {
                let rules = RegisterShaderRules::build(&device.registry, &record);
                if !rules.is_empty() {
                    device.register_rules.insert(record.hash, rules);
                }
            }
            record.hash
        }
        Err(err) => {
            warn!(?stage, error = %err, "shader reflection failed; no constants will match");
            ShaderHash::of(&bytecode)
        }
    };

    let mut object = ProxyObject::new(ObjectKind::Shader(stage), Some(native), RefCount::Local(1));
    object.device = Some(device.device_id());
    object
        .metadata
        .set(PrivateDataKey::ShaderIdentity, PrivateDataValue::Shader(hash));
    let id = device.objects.insert(object);
    debug!(%id, %hash, ?stage, "shader created");
    ctx.complete(NativeResult::Ok, CallOutput::Object(id));
}

/// Records the stage's shader and refreshes everything keyed on it. The native bind is forwarded.
pub(super) fn set_shader<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let CallArgs::SetShader { stage, shader } = ctx.args else {
        return;
    };
    if let Some(id) = shader {
        let valid = device
            .objects
            .get(id)
            .is_some_and(|o| o.kind == ObjectKind::Shader(stage));
        if !valid {
            return ctx.fail(NativeResult::InvalidCall);
        }
    }
    device.stage_shaders[stage.index()] = shader;
    let hash = device.stage_shader_hash(stage);

    let bound: Vec<_> = device.scheduler.table(stage).bound().collect();
    for (slot, buffer) in bound {
        let Some(object) = device.objects.get_mut(buffer) else {
            continue;
        };
        let changed = object.metadata.shader_identity() != hash;
        match hash {
            Some(hash) => object
                .metadata
                .set(PrivateDataKey::ShaderIdentity, PrivateDataValue::Shader(hash)),
            None => {
                object.metadata.remove(PrivateDataKey::ShaderIdentity);
            }
        }
        device.verify_buffer(buffer, slot, stage, changed);
    }

    if let Some(rules) = hash.and_then(|hash| device.register_rules.get_mut(&hash)) {
        rules.on_shader_set(&device.registry, &device.register_files[stage.index()]);
        device.push_register_rules(stage);
    }
}

pub(super) fn set_shader_constant_f<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::SetShaderConstantF {
        stage,
        start_register,
        data: Some(data),
    } = &ctx.args
    else {
        return;
    };
    let (stage, start_register) = (*stage, *start_register);
    let begin = start_register as usize * 4;
    let Some(registers) = device.register_files[stage.index()].get_mut(begin..begin + data.len())
    else {
        return ctx.fail(NativeResult::InvalidCall);
    };
    registers.copy_from_slice(data);

    let Some(hash) = device.stage_shader_hash(stage) else {
        return;
    };
    let Some(rules) = device.register_rules.get_mut(&hash) else {
        return;
    };
    let side = device.scheduler.side();
    let Some(out) = rules.set_constants_f(
        &device.registry,
        &device.register_files[stage.index()],
        start_register,
        data,
        side,
    ) else {
        return;
    };
    let outcome = device
        .backend
        .set_shader_constants_f(stage, start_register, &out);
    ctx.complete_with(outcome.map(|()| CallOutput::None));
}
