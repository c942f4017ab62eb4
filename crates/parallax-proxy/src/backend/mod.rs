//! Native graphics API abstraction.
//!
//! The interception layer only ever talks to the real API through [`GraphicsBackend`]. Resources
//! are addressed by opaque [`ResourceId`]s; the backend owns their storage. For tests we provide a
//! deterministic in-memory backend.

mod soft;

use core::fmt;

use bitflags::bitflags;
use parallax_rules::ShaderStage;

pub use soft::{ConstantBufferBind, SoftBackend};

/// Constant buffer slots per shader stage.
pub const CONSTANT_BUFFER_SLOTS: usize = 14;

/// `float4` registers in a register-file stage.
pub const CONSTANT_REGISTERS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Texture2D,
    Surface,
}

/// Memory pool of a register-file era surface. Only `Default` resources live on the GPU and need
/// staging to be written from the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pool {
    #[default]
    Default,
    Managed,
    SystemMem,
    Scratch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Usage {
    #[default]
    Default,
    Immutable,
    Dynamic,
    Staging,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct BindFlags: u32 {
        const VERTEX_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const CONSTANT_BUFFER = 1 << 2;
        const SHADER_RESOURCE = 1 << 3;
        const RENDER_TARGET = 1 << 4;
        const DEPTH_STENCIL = 1 << 5;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct CpuAccess: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BackendCaps: u32 {
        /// Resources can be exported as cross-process shared handles.
        const SHARED_HANDLES = 1 << 0;
        /// Shaders read constants from bound buffers.
        const CONSTANT_BUFFERS = 1 << 1;
        /// Shaders read constants from a flat register file.
        const CONSTANT_REGISTERS = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDesc {
    pub kind: ResourceKind,
    /// Bytes for buffers, texels otherwise.
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub bytes_per_texel: u32,
    pub usage: Usage,
    pub pool: Pool,
    pub bind: BindFlags,
    pub cpu_access: CpuAccess,
}

impl ResourceDesc {
    pub fn buffer(byte_width: u32, bind: BindFlags) -> Self {
        Self {
            kind: ResourceKind::Buffer,
            width: byte_width,
            height: 1,
            format: 0,
            bytes_per_texel: 1,
            usage: Usage::Default,
            pool: Pool::Default,
            bind,
            cpu_access: CpuAccess::empty(),
        }
    }

    pub fn surface(width: u32, height: u32, format: u32, bytes_per_texel: u32) -> Self {
        Self {
            kind: ResourceKind::Surface,
            width,
            height,
            format,
            bytes_per_texel,
            usage: Usage::Default,
            pool: Pool::Default,
            bind: BindFlags::RENDER_TARGET,
            cpu_access: CpuAccess::empty(),
        }
    }

    pub fn texture2d(width: u32, height: u32, format: u32, bytes_per_texel: u32) -> Self {
        Self {
            kind: ResourceKind::Texture2D,
            bind: BindFlags::SHADER_RESOURCE,
            ..Self::surface(width, height, format, bytes_per_texel)
        }
    }

    pub fn row_pitch(&self) -> usize {
        self.width as usize * self.bytes_per_texel as usize
    }

    pub fn byte_len(&self) -> usize {
        self.row_pitch() * self.height as usize
    }

    pub fn full_rect(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// CPU-accessible copy of this description, used for lock staging.
    pub fn staging(&self) -> Self {
        Self {
            usage: Usage::Staging,
            pool: Pool::SystemMem,
            bind: BindFlags::empty(),
            cpu_access: CpuAccess::READ | CpuAccess::WRITE,
            ..*self
        }
    }
}

/// Half-open texel rectangle. Buffers use `left..right` as a byte range with `top = 0, bottom = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn fits(&self, desc: &ResourceDesc) -> bool {
        self.left <= self.right
            && self.top <= self.bottom
            && self.right <= desc.width
            && self.bottom <= desc.height
    }
}

/// CPU view handed out by [`GraphicsBackend::lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedRegion {
    pub resource: ResourceId,
    pub rect: Rect,
    pub row_pitch: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    InvalidResource(ResourceId),
    InvalidState(&'static str),
    OutOfBounds,
    OutOfMemory,
    Unsupported(&'static str),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidResource(id) => write!(f, "invalid resource {id}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::OutOfBounds => write!(f, "out of bounds"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
        }
    }
}

impl std::error::Error for BackendError {}

pub trait GraphicsBackend {
    fn capabilities(&self) -> BackendCaps;

    fn create_resource(
        &mut self,
        desc: &ResourceDesc,
        initial: Option<&[u8]>,
    ) -> Result<ResourceId, BackendError>;
    fn destroy_resource(&mut self, id: ResourceId) -> Result<(), BackendError>;
    fn describe(&self, id: ResourceId) -> Result<ResourceDesc, BackendError>;

    /// Reads `rect` (the whole resource when `None`) as tightly packed rows.
    fn read(&self, id: ResourceId, rect: Option<Rect>) -> Result<Vec<u8>, BackendError>;
    /// Writes tightly packed rows into `rect` (the whole resource when `None`).
    fn write(&mut self, id: ResourceId, rect: Option<Rect>, data: &[u8])
        -> Result<(), BackendError>;
    /// Copies `src_rect` of `src` into `dst` with its top-left corner at `(dst_x, dst_y)`.
    fn copy_region(
        &mut self,
        src: ResourceId,
        src_rect: Option<Rect>,
        dst: ResourceId,
        dst_x: u32,
        dst_y: u32,
    ) -> Result<(), BackendError>;

    fn lock(&mut self, id: ResourceId, rect: Option<Rect>) -> Result<LockedRegion, BackendError>;
    fn unlock(&mut self, id: ResourceId) -> Result<(), BackendError>;

    /// Sets the eviction priority of `id`, returning the previous one.
    fn set_priority(&mut self, id: ResourceId, priority: u32) -> Result<u32, BackendError>;
    fn preload(&mut self, id: ResourceId) -> Result<(), BackendError>;
    /// Releases a GDI device context previously obtained for surface `id`.
    fn release_dc(&mut self, id: ResourceId) -> Result<(), BackendError>;

    /// Cross-process handle of `id`, when the backend supports sharing.
    fn shared_handle(&self, _id: ResourceId) -> Option<u64> {
        None
    }

    fn bind_constant_buffers(
        &mut self,
        stage: ShaderStage,
        start_slot: u32,
        buffers: &[Option<ResourceId>],
    ) -> Result<(), BackendError>;

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        bytecode: &[u8],
    ) -> Result<ResourceId, BackendError>;
    fn set_shader(
        &mut self,
        stage: ShaderStage,
        shader: Option<ResourceId>,
    ) -> Result<(), BackendError>;
    fn set_shader_constants_f(
        &mut self,
        stage: ShaderStage,
        start_register: u32,
        data: &[f32],
    ) -> Result<(), BackendError>;
}
