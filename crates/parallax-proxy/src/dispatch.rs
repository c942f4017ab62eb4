use hashbrown::HashMap;

use crate::backend::GraphicsBackend;
use crate::call::{CallContext, InterfaceId, MethodId};
use crate::device::StereoDevice;

pub type Handler<B> = fn(&mut StereoDevice<B>, &mut CallContext);

/// Intercepted `(interface, method)` pairs and their handlers. Anything else is forwarded.
pub struct Dispatcher<B: GraphicsBackend> {
    handlers: HashMap<(InterfaceId, MethodId), Handler<B>>,
}

impl<B: GraphicsBackend> Default for Dispatcher<B> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<B: GraphicsBackend> core::fmt::Debug for Dispatcher<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<B: GraphicsBackend> Dispatcher<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler`, returning the one it replaces.
    pub fn register(
        &mut self,
        interface: InterfaceId,
        method: MethodId,
        handler: Handler<B>,
    ) -> Option<Handler<B>> {
        self.handlers.insert((interface, method), handler)
    }

    pub fn unregister(&mut self, interface: InterfaceId, method: MethodId) -> Option<Handler<B>> {
        self.handlers.remove(&(interface, method))
    }

    pub fn lookup(&self, interface: InterfaceId, method: MethodId) -> Option<Handler<B>> {
        self.handlers.get(&(interface, method)).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
