//! Surface and texture calls: CPU locks, and housekeeping that must reach both eyes.

use std::sync::Arc;

use tracing::warn;

use crate::backend::{BackendError, GraphicsBackend, ResourceId};
use crate::call::{CallArgs, CallContext, CallOutput, NativeResult};
use crate::device::StereoDevice;
use crate::object::{ObjectKind, ProxyObject, RefCount};
use crate::private_data::{PrivateDataKey, PrivateDataValue};
use crate::stereo::StereoResourcePair;

fn pair_of<B: GraphicsBackend>(
    device: &StereoDevice<B>,
    ctx: &CallContext,
) -> Option<Arc<StereoResourcePair>> {
    device.objects.get(ctx.this?)?.stereo.clone()
}

pub(super) fn lock_rect<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let CallArgs::Lock { rect } = ctx.args else {
        return;
    };
    let Some(pair) = pair_of(device, ctx) else {
        return;
    };
    let outcome = pair
        .lock_rect(&mut device.backend, rect)
        .map(CallOutput::Locked);
    ctx.complete_with(outcome);
}

pub(super) fn unlock_rect<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let Some(pair) = pair_of(device, ctx) else {
        return;
    };
    let outcome = pair
        .unlock_rect(&mut device.backend)
        .map(|()| CallOutput::None);
    ctx.complete_with(outcome);
}

pub(super) fn set_private_data<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::PrivateData {
        key: Some(key),
        data: Some(data),
    } = &ctx.args
    else {
        return;
    };
    let Some(object) = ctx.this.and_then(|id| device.objects.get_mut(id)) else {
        return;
    };
    object
        .metadata
        .set(PrivateDataKey::User(*key), PrivateDataValue::Bytes(data.clone()));
    ctx.complete(NativeResult::Ok, CallOutput::None);
}

pub(super) fn get_private_data<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::PrivateData { key: Some(key), .. } = ctx.args else {
        return;
    };
    let Some(object) = ctx.this.and_then(|id| device.objects.get(id)) else {
        return;
    };
    match object.metadata.get(PrivateDataKey::User(key)) {
        Some(PrivateDataValue::Bytes(bytes)) => {
            let bytes = bytes.clone();
            ctx.complete(NativeResult::Ok, CallOutput::Bytes(bytes));
        }
        _ => ctx.fail(NativeResult::NotFound),
    }
}

pub(super) fn free_private_data<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::PrivateData { key: Some(key), .. } = ctx.args else {
        return;
    };
    let Some(object) = ctx.this.and_then(|id| device.objects.get_mut(id)) else {
        return;
    };
    match object.metadata.remove(PrivateDataKey::User(key)) {
        Some(_) => ctx.complete(NativeResult::Ok, CallOutput::None),
        None => ctx.fail(NativeResult::NotFound),
    }
}

/// Runs `op` on both halves of the pair; the left result is the one reported.
fn on_both_halves<B: GraphicsBackend, T>(
    device: &mut StereoDevice<B>,
    pair: &StereoResourcePair,
    mut op: impl FnMut(&mut B, ResourceId) -> Result<T, BackendError>,
) -> Result<T, BackendError> {
    let left = op(&mut device.backend, pair.left())?;
    if let Some(right) = pair.right() {
        if let Err(err) = op(&mut device.backend, right) {
            warn!(%right, error = %err, "twin housekeeping failed");
        }
    }
    Ok(left)
}

pub(super) fn set_priority<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::Priority {
        priority: Some(priority),
    } = ctx.args
    else {
        return;
    };
    let Some(pair) = pair_of(device, ctx) else {
        return;
    };
    let outcome = on_both_halves(device, &pair, |backend, id| {
        backend.set_priority(id, priority)
    });
    ctx.complete_with(outcome.map(CallOutput::Count));
}

pub(super) fn preload<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let Some(pair) = pair_of(device, ctx) else {
        return;
    };
    let outcome = on_both_halves(device, &pair, |backend, id| backend.preload(id));
    ctx.complete_with(outcome.map(|()| CallOutput::None));
}

pub(super) fn release_dc<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let Some(pair) = pair_of(device, ctx) else {
        return;
    };
    let outcome = on_both_halves(device, &pair, |backend, id| backend.release_dc(id));
    ctx.complete_with(outcome.map(|()| CallOutput::None));
}

/// Surface level 0 of a texture. The surface shares the texture's pair and forwards its
/// references to the texture.
pub(super) fn get_surface_level<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let CallArgs::SurfaceLevel { level: Some(level) } = ctx.args else {
        return;
    };
    let Some(texture_id) = ctx.this else {
        return;
    };
    let Some(texture) = device.objects.get(texture_id) else {
        return ctx.fail(NativeResult::InvalidCall);
    };
    if texture.kind != ObjectKind::Texture || level != 0 {
        return ctx.fail(NativeResult::InvalidCall);
    }

    let existing = device.objects.ids().find(|&id| {
        device.objects.get(id).is_some_and(|o| {
            o.kind == ObjectKind::Surface && o.refs == RefCount::ForwardTo(texture_id)
        })
    });
    let surface = match existing {
        Some(surface) => surface,
        None => {
            let mut surface =
                ProxyObject::new(ObjectKind::Surface, texture.native, RefCount::ForwardTo(texture_id));
            surface.device = texture.device;
            surface.stereo = texture.stereo.clone();
            device.objects.insert(surface)
        }
    };
    match device.objects.retain(surface) {
        Ok(_) => ctx.complete(NativeResult::Ok, CallOutput::Object(surface)),
        Err(_) => ctx.fail(NativeResult::InvalidCall),
    }
}
