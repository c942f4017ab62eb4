//! Transparent proxies for native graphics objects.
//!
//! [`StereoDevice`] receives every intercepted application call as a [`CallContext`], runs the
//! handler registered for its `(interface, method)` pair and forwards whatever the handler did not
//! replace to a [`GraphicsBackend`]. Along the way resources are duplicated per eye
//! ([`StereoResourcePair`]), constant data is split by the rules of a
//! [`parallax_rules::RuleRegistry`], and the [`RenderSideScheduler`] picks which half is bound.

#![forbid(unsafe_code)]

pub mod backend;
mod call;
mod device;
mod dispatch;
mod error;
mod handlers;
mod object;
mod private_data;
mod scheduler;
mod stereo;

pub use crate::backend::{
    BackendCaps, BackendError, BindFlags, CpuAccess, GraphicsBackend, LockedRegion, Pool, Rect,
    ResourceDesc, ResourceId, ResourceKind, SoftBackend, Usage,
};
pub use crate::call::{CallArgs, CallContext, CallOutput, InterfaceId, MethodId, NativeResult};
pub use crate::device::{MapShadow, StereoDevice};
pub use crate::dispatch::{Dispatcher, Handler};
pub use crate::error::ProxyError;
pub use crate::object::{ObjectKind, ProxyId, ProxyObject, ProxyTable, RefCount, Released};
pub use crate::private_data::{PrivateData, PrivateDataKey, PrivateDataValue};
pub use crate::scheduler::{ActiveTable, RenderSideScheduler};
pub use crate::stereo::StereoResourcePair;

#[cfg(test)]
mod tests;
