//! Intercepted calls.
//!
//! Every application call becomes a [`CallContext`]: the interface and method being invoked, the
//! object it was invoked on, its arguments as typed slots, and the result the application will
//! see. Handlers may rewrite the arguments, fill in the output, or set `suppress` to skip the
//! native call entirely.

use parallax_rules::ShaderStage;

use crate::backend::{BackendError, LockedRegion, Rect, ResourceDesc};
use crate::object::ProxyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceId {
    Device,
    /// Immediate context of a constant-buffer API; shares the device object.
    Context,
    Surface,
    Texture,
    Buffer,
    Shader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodId {
    AddRef,
    Release,
    GetDevice,
    GetContainer,
    LockRect,
    UnlockRect,
    SetPrivateData,
    GetPrivateData,
    FreePrivateData,
    SetPriority,
    PreLoad,
    ReleaseDc,
    CreateResource,
    GetSurfaceLevel,
    CreateShader,
    UpdateSubresource,
    CopyResource,
    CopySubresourceRegion,
    Map,
    Unmap,
    SetConstantBuffers,
    GetConstantBuffers,
    SetShader,
    SetShaderConstantF,
}

/// Arguments of an intercepted call.
///
/// Slots the application may legitimately leave out, or that a caller could not decode, are
/// `Option`s. A handler that finds a required slot empty leaves the call to the native path.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CallArgs {
    #[default]
    None,
    Lock {
        /// `None` locks the whole surface.
        rect: Option<Rect>,
    },
    PrivateData {
        key: Option<[u8; 16]>,
        data: Option<Vec<u8>>,
    },
    Priority {
        priority: Option<u32>,
    },
    CreateResource {
        desc: Option<ResourceDesc>,
        initial: Option<Vec<u8>>,
    },
    SurfaceLevel {
        level: Option<u32>,
    },
    CreateShader {
        stage: ShaderStage,
        bytecode: Option<Vec<u8>>,
    },
    UpdateSubresource {
        dst: Option<ProxyId>,
        rect: Option<Rect>,
        data: Option<Vec<u8>>,
    },
    Copy {
        dst: Option<ProxyId>,
        src: Option<ProxyId>,
        src_rect: Option<Rect>,
        dst_x: u32,
        dst_y: u32,
    },
    Map {
        resource: Option<ProxyId>,
        discard: bool,
    },
    Unmap {
        resource: Option<ProxyId>,
    },
    SetConstantBuffers {
        stage: ShaderStage,
        start_slot: u32,
        buffers: Option<Vec<Option<ProxyId>>>,
    },
    GetConstantBuffers {
        stage: ShaderStage,
        start_slot: u32,
        count: u32,
    },
    SetShader {
        stage: ShaderStage,
        /// `None` unbinds the stage.
        shader: Option<ProxyId>,
    },
    SetShaderConstantF {
        stage: ShaderStage,
        start_register: u32,
        data: Option<Vec<f32>>,
    },
}

/// Values handed back to the application besides the result code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallOutput {
    #[default]
    None,
    Count(u32),
    Object(ProxyId),
    Objects(Vec<Option<ProxyId>>),
    Locked(LockedRegion),
    /// A constant buffer mapped into a shadow copy; see `StereoDevice::mapped_mut`.
    Mapped { resource: ProxyId, len: usize },
    Bytes(Vec<u8>),
}

/// Native result code returned to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NativeResult {
    #[default]
    Ok,
    InvalidCall,
    NotFound,
    OutOfMemory,
}

impl From<&BackendError> for NativeResult {
    fn from(err: &BackendError) -> Self {
        match err {
            BackendError::OutOfMemory => NativeResult::OutOfMemory,
            _ => NativeResult::InvalidCall,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    pub interface: InterfaceId,
    pub method: MethodId,
    /// Object the method was invoked on.
    pub this: Option<ProxyId>,
    pub args: CallArgs,
    /// Skip the native call; the handler fully replaced it.
    pub suppress: bool,
    pub result: NativeResult,
    pub output: CallOutput,
}

impl CallContext {
    pub fn new(
        interface: InterfaceId,
        method: MethodId,
        this: Option<ProxyId>,
        args: CallArgs,
    ) -> Self {
        Self {
            interface,
            method,
            this,
            args,
            suppress: false,
            result: NativeResult::Ok,
            output: CallOutput::None,
        }
    }

    /// Marks the call as handled with `result`.
    pub fn complete(&mut self, result: NativeResult, output: CallOutput) {
        self.suppress = true;
        self.result = result;
        self.output = output;
    }

    /// Marks the call as handled and failed.
    pub fn fail(&mut self, result: NativeResult) {
        self.complete(result, CallOutput::None);
    }

    /// Records the outcome of a backend operation that replaced the native call.
    pub fn complete_with(&mut self, outcome: Result<CallOutput, BackendError>) {
        match outcome {
            Ok(output) => self.complete(NativeResult::Ok, output),
            Err(err) => self.fail(NativeResult::from(&err)),
        }
    }
}
