//! Default handlers for intercepted calls.

mod buffers;
mod lifetime;
mod shaders;
mod surface;

use crate::backend::GraphicsBackend;
use crate::call::{InterfaceId, MethodId};
use crate::dispatch::Dispatcher;

const RESOURCES: [InterfaceId; 3] = [InterfaceId::Surface, InterfaceId::Texture, InterfaceId::Buffer];

/// Registers every default handler on `dispatcher`.
pub fn install<B: GraphicsBackend>(dispatcher: &mut Dispatcher<B>) {
    let all = [
        InterfaceId::Device,
        InterfaceId::Surface,
        InterfaceId::Texture,
        InterfaceId::Buffer,
        InterfaceId::Shader,
    ];
    for interface in all {
        dispatcher.register(interface, MethodId::AddRef, lifetime::add_ref);
        dispatcher.register(interface, MethodId::Release, lifetime::release);
        if interface != InterfaceId::Device {
            dispatcher.register(interface, MethodId::GetDevice, lifetime::get_device);
        }
    }
    dispatcher.register(InterfaceId::Surface, MethodId::GetContainer, lifetime::get_container);

    for interface in [InterfaceId::Surface, InterfaceId::Texture] {
        dispatcher.register(interface, MethodId::LockRect, surface::lock_rect);
        dispatcher.register(interface, MethodId::UnlockRect, surface::unlock_rect);
    }
    for interface in RESOURCES {
        dispatcher.register(interface, MethodId::SetPrivateData, surface::set_private_data);
        dispatcher.register(interface, MethodId::GetPrivateData, surface::get_private_data);
        dispatcher.register(interface, MethodId::FreePrivateData, surface::free_private_data);
        dispatcher.register(interface, MethodId::SetPriority, surface::set_priority);
        dispatcher.register(interface, MethodId::PreLoad, surface::preload);
    }
    dispatcher.register(InterfaceId::Surface, MethodId::ReleaseDc, surface::release_dc);
    dispatcher.register(InterfaceId::Texture, MethodId::GetSurfaceLevel, surface::get_surface_level);

    dispatcher.register(InterfaceId::Context, MethodId::UpdateSubresource, buffers::update_subresource);
    dispatcher.register(InterfaceId::Context, MethodId::CopyResource, buffers::copy_resource);
    dispatcher.register(
        InterfaceId::Context,
        MethodId::CopySubresourceRegion,
        buffers::copy_resource,
    );
    dispatcher.register(InterfaceId::Context, MethodId::Map, buffers::map);
    dispatcher.register(InterfaceId::Context, MethodId::Unmap, buffers::unmap);
    dispatcher.register(
        InterfaceId::Context,
        MethodId::SetConstantBuffers,
        buffers::set_constant_buffers,
    );
    dispatcher.register(
        InterfaceId::Context,
        MethodId::GetConstantBuffers,
        buffers::get_constant_buffers,
    );

    dispatcher.register(InterfaceId::Device, MethodId::CreateShader, shaders::create_shader);
    dispatcher.register(InterfaceId::Context, MethodId::SetShader, shaders::set_shader);
    dispatcher.register(InterfaceId::Device, MethodId::SetShader, shaders::set_shader);
    dispatcher.register(
        InterfaceId::Device,
        MethodId::SetShaderConstantF,
        shaders::set_shader_constant_f,
    );
}
