//! Constant buffer traffic: updates, copies, maps and binds.

use parallax_rules::{RuleBinding, RuleSetIndex};
use tracing::{debug, warn};

use crate::backend::{GraphicsBackend, CONSTANT_BUFFER_SLOTS};
use crate::call::{CallArgs, CallContext, CallOutput, MethodId, NativeResult};
use crate::device::{MapShadow, StereoDevice};
use crate::object::ObjectKind;

/// Rule set of a binding that actually has rules to apply.
fn active_rule_set(binding: Option<RuleBinding>) -> Option<RuleSetIndex> {
    match binding?.rule_set {
        index @ RuleSetIndex::Index(_) => Some(index),
        RuleSetIndex::NotAddressed | RuleSetIndex::NoRules => None,
    }
}

pub(super) fn update_subresource<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::UpdateSubresource {
        dst: Some(dst),
        rect,
        data: Some(data),
    } = &ctx.args
    else {
        return;
    };
    let (dst, rect) = (*dst, *rect);
    let data = data.clone();
    let binding = device.current_binding(dst);
    let Some(object) = device.objects.get(dst) else {
        return;
    };
    let (Some(native), twin) = (object.native, object.twin()) else {
        return;
    };
    let rule_set = active_rule_set(binding);

    if let (Some(rule_set), None) = (rule_set, rect) {
        if device.is_constant_buffer(dst) {
            let mut left = data.clone();
            let mut right = data.clone();
            let applied = device
                .registry
                .apply_to_buffer(rule_set, &mut left, &mut right, data.len());
            debug!(%dst, applied, "constant buffer update split per eye");

            let mut outcome = device.backend.write(native, None, &left);
            if let Some(twin) = twin.filter(|_| outcome.is_ok()) {
                outcome = device.backend.write(twin, None, &right);
            }
            return ctx.complete_with(outcome.map(|()| CallOutput::None));
        }
    }

    if let Some(twin) = twin {
        if let Err(err) = device.backend.write(twin, rect, &data) {
            warn!(%dst, %twin, ?rect, error = %err, "twin update failed");
        }
    }
}

/// `CopyResource` and `CopySubresourceRegion`.
pub(super) fn copy_resource<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::Copy {
        dst: Some(dst),
        src: Some(src),
        src_rect,
        dst_x,
        dst_y,
    } = ctx.args
    else {
        return;
    };
    let Some(source) = device.objects.get(src) else {
        return;
    };
    let (src_native, src_twin, src_binding) =
        (source.native, source.twin(), source.metadata.binding());
    let Some(target) = device.objects.get_mut(dst) else {
        return;
    };
    if let Some(binding) = src_binding {
        target.metadata.set_binding(binding);
    }
    let Some(dst_twin) = target.twin() else {
        return;
    };
    let Some(from) = src_twin.or(src_native) else {
        return;
    };

    let result = if ctx.method == MethodId::CopyResource {
        device.backend.copy_region(from, None, dst_twin, 0, 0)
    } else {
        device
            .backend
            .copy_region(from, src_rect, dst_twin, dst_x, dst_y)
    };
    if let Err(err) = result {
        warn!(%src, %dst, ?src_rect, error = %err, "twin copy failed");
    }
}

pub(super) fn map<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let CallArgs::Map {
        resource: Some(id),
        discard,
    } = ctx.args
    else {
        return;
    };
    if !device.is_constant_buffer(id) {
        return;
    }
    let binding = device.current_binding(id);
    let Some(native) = device.native_of(id) else {
        return;
    };
    if device.shadows.contains_key(&id) {
        return ctx.fail(NativeResult::InvalidCall);
    }

    if let Err(err) = device.backend.lock(native, None) {
        return ctx.complete_with(Err(err));
    }
    let data = if discard {
        device
            .backend
            .describe(native)
            .map(|desc| vec![0u8; desc.byte_len()])
    } else {
        device.backend.read(native, None)
    };
    let data = match data {
        Ok(data) => data,
        Err(err) => {
            if let Err(unlock_err) = device.backend.unlock(native) {
                warn!(%id, %native, error = %unlock_err, "unlock after failed map read failed");
            }
            return ctx.complete_with(Err(err));
        }
    };

    let len = data.len();
    device.shadows.insert(
        id,
        MapShadow {
            binding,
            data,
            discard,
        },
    );
    ctx.complete(NativeResult::Ok, CallOutput::Mapped { resource: id, len });
}

pub(super) fn unmap<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let CallArgs::Unmap { resource: Some(id) } = ctx.args else {
        return;
    };
    let Some(shadow) = device.shadows.remove(&id) else {
        return;
    };

    let counter = device.registry.update_counter();
    let binding = match shadow.binding {
        Some(binding) if binding.is_current(counter) => Some(binding),
        _ => device.current_binding(id),
    };
    let Some(object) = device.objects.get(id) else {
        return ctx.fail(NativeResult::InvalidCall);
    };
    let (Some(native), twin) = (object.native, object.twin()) else {
        return ctx.fail(NativeResult::InvalidCall);
    };

    let mut left = shadow.data;
    let mut right = left.clone();
    if let Some(rule_set) = active_rule_set(binding) {
        let len = left.len();
        device
            .registry
            .apply_to_buffer(rule_set, &mut left, &mut right, len);
    }

    if let Err(err) = device.backend.write(native, None, &left) {
        warn!(%id, %native, error = %err, "mapped data write failed");
    }
    let outcome = device.backend.unlock(native);
    if let Some(twin) = twin {
        if let Err(err) = device.backend.write(twin, None, &right) {
            warn!(%id, %twin, error = %err, "twin write after unmap failed");
        }
    }
    ctx.complete_with(outcome.map(|()| CallOutput::None));
}

/// Fills the stage's active table and binds the half of the current render side.
pub(super) fn set_constant_buffers<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::SetConstantBuffers {
        stage,
        start_slot,
        buffers: Some(buffers),
    } = &ctx.args
    else {
        return;
    };
    let (stage, start_slot) = (*stage, *start_slot);
    let buffers = buffers.clone();
    if start_slot as usize + buffers.len() > CONSTANT_BUFFER_SLOTS {
        return ctx.fail(NativeResult::InvalidCall);
    }

    for (offset, app) in buffers.iter().enumerate() {
        let slot = start_slot + offset as u32;
        let Some(id) = *app else {
            device
                .scheduler
                .table_mut(stage)
                .set(slot as usize, None, None, None);
            continue;
        };
        let Some(native) = device
            .objects
            .get(id)
            .filter(|o| o.kind == ObjectKind::Buffer)
            .and_then(|o| o.native)
        else {
            return ctx.fail(NativeResult::InvalidCall);
        };

        let right = if device.is_constant_buffer(id) {
            let pair = device.ensure_stereo(id);
            device.verify_buffer(id, slot, stage, false);
            pair.and_then(|pair| pair.right())
        } else {
            None
        };
        device
            .scheduler
            .table_mut(stage)
            .set(slot as usize, Some(id), Some(native), right);
    }

    let outcome = device
        .scheduler
        .bind(&mut device.backend, stage, start_slot, buffers.len() as u32);
    ctx.complete_with(outcome.map(|()| CallOutput::None));
}

/// Returns the application's buffers, never twins, each retained once.
pub(super) fn get_constant_buffers<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::GetConstantBuffers {
        stage,
        start_slot,
        count,
    } = ctx.args
    else {
        return;
    };
    let start = start_slot as usize;
    let Some(slots) = device
        .scheduler
        .table(stage)
        .app()
        .get(start..start + count as usize)
    else {
        return ctx.fail(NativeResult::InvalidCall);
    };
    let slots = slots.to_vec();
    for id in slots.iter().flatten() {
        if let Err(err) = device.objects.retain(*id) {
            warn!(%id, error = %err, "bound buffer vanished");
        }
    }
    ctx.complete(NativeResult::Ok, CallOutput::Objects(slots));
}
