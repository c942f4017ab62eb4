use tracing::debug;

use crate::backend::GraphicsBackend;
use crate::call::{CallContext, CallOutput, NativeResult};
use crate::device::StereoDevice;
use crate::error::ProxyError;

fn proxy_failure(ctx: &mut CallContext, err: ProxyError) {
    debug!(method = ?ctx.method, error = %err, "proxy call rejected");
    ctx.fail(NativeResult::InvalidCall);
}

pub(super) fn add_ref<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let Some(this) = ctx.this else { return };
    match device.objects.retain(this) {
        Ok(count) => ctx.complete(NativeResult::Ok, CallOutput::Count(count)),
        Err(err) => proxy_failure(ctx, err),
    }
}

pub(super) fn release<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let Some(this) = ctx.this else { return };
    match device.objects.release(this) {
        Ok(released) => {
            device.destroy_objects(released.destroyed);
            ctx.complete(NativeResult::Ok, CallOutput::Count(released.count));
        }
        Err(err) => proxy_failure(ctx, err),
    }
}

pub(super) fn get_device<B: GraphicsBackend>(device: &mut StereoDevice<B>, ctx: &mut CallContext) {
    let Some(this) = ctx.this else { return };
    match device.objects.query_device(this) {
        Ok(id) => ctx.complete(NativeResult::Ok, CallOutput::Object(id)),
        Err(err) => proxy_failure(ctx, err),
    }
}

pub(super) fn get_container<B: GraphicsBackend>(
    device: &mut StereoDevice<B>,
    ctx: &mut CallContext,
) {
    let Some(this) = ctx.this else { return };
    match device.objects.query_container(this) {
        Ok(Some(id)) => ctx.complete(NativeResult::Ok, CallOutput::Object(id)),
        Ok(None) => ctx.fail(NativeResult::InvalidCall),
        Err(err) => proxy_failure(ctx, err),
    }
}
