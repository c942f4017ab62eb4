//! Left/right resource pairs and lock staging.
//!
//! A logical resource the application sees is backed by a left resource (the one it created) and,
//! when duplication succeeded, a right twin. CPU writes to GPU-resident surfaces go through a
//! staging resource and are replicated into both halves when the lock ends.

use std::sync::{Mutex, PoisonError};

use parallax_rules::Eye;
use tracing::{debug, warn};

use crate::backend::{
    BackendError, GraphicsBackend, LockedRegion, Pool, Rect, ResourceDesc, ResourceId, Usage,
};

#[derive(Debug, Default)]
struct LockState {
    pending: Vec<Rect>,
    full: bool,
    staging: Option<ResourceId>,
}

#[derive(Debug)]
pub struct StereoResourcePair {
    left: ResourceId,
    right: Option<ResourceId>,
    shared: [Option<u64>; 2],
    desc: ResourceDesc,
    lock: Mutex<LockState>,
}

impl StereoResourcePair {
    pub fn mono(left: ResourceId, desc: ResourceDesc) -> Self {
        Self {
            left,
            right: None,
            shared: [None; 2],
            desc,
            lock: Mutex::new(LockState::default()),
        }
    }

    /// Describes `left` and duplicates it into a right twin seeded with the same contents.
    ///
    /// Immutable resources stay mono. A failed duplication is logged and also yields a mono pair.
    pub fn create(
        backend: &mut dyn GraphicsBackend,
        left: ResourceId,
    ) -> Result<Self, BackendError> {
        let desc = backend.describe(left)?;
        let mut pair = Self::mono(left, desc);
        pair.shared[0] = backend.shared_handle(left);
        if desc.usage == Usage::Immutable {
            return Ok(pair);
        }

        let right = match backend.create_resource(&desc, None) {
            Ok(right) => right,
            Err(err) => {
                warn!(
                    %left,
                    width = desc.width,
                    height = desc.height,
                    format = desc.format,
                    error = %err,
                    "twin creation failed; resource stays mono"
                );
                return Ok(pair);
            }
        };
        if let Err(err) = backend.copy_region(left, None, right, 0, 0) {
            warn!(%left, %right, error = %err, "twin seeding failed");
        }
        pair.right = Some(right);
        pair.shared[1] = backend.shared_handle(right);
        debug!(%left, %right, ?desc.kind, "stereo pair created");
        Ok(pair)
    }

    pub fn left(&self) -> ResourceId {
        self.left
    }

    pub fn right(&self) -> Option<ResourceId> {
        self.right
    }

    pub fn is_stereo(&self) -> bool {
        self.right.is_some()
    }

    pub fn desc(&self) -> &ResourceDesc {
        &self.desc
    }

    pub fn shared_handles(&self) -> [Option<u64>; 2] {
        self.shared
    }

    /// Resource rendered for `eye`; mono pairs use the left one for both.
    pub fn side(&self, eye: Eye) -> ResourceId {
        match eye {
            Eye::Left => self.left,
            Eye::Right => self.right.unwrap_or(self.left),
        }
    }

    /// The other half of the pair, looked up from either side.
    pub fn twin_of(&self, id: ResourceId) -> Option<ResourceId> {
        let right = self.right?;
        if id == self.left {
            Some(right)
        } else if id == right {
            Some(self.left)
        } else {
            None
        }
    }

    /// Both halves, left first.
    pub fn halves(&self) -> impl Iterator<Item = ResourceId> {
        core::iter::once(self.left).chain(self.right)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LockState> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_pending_lock(&self) -> bool {
        let state = self.state();
        state.full || !state.pending.is_empty()
    }

    /// Locks `rect` (the whole surface when `None`) for CPU writes.
    pub fn lock_rect(
        &self,
        backend: &mut dyn GraphicsBackend,
        rect: Option<Rect>,
    ) -> Result<LockedRegion, BackendError> {
        if self.desc.pool != Pool::Default {
            return backend.lock(self.left, rect);
        }

        let mut state = self.state();
        let staging = match state.staging {
            Some(staging) => staging,
            None => {
                let staging = backend.create_resource(&self.desc.staging(), None)?;
                if let Err(err) = backend.copy_region(self.left, None, staging, 0, 0) {
                    warn!(left = %self.left, %staging, error = %err, "staging seed failed");
                }
                state.staging = Some(staging);
                staging
            }
        };
        let region = backend.lock(staging, rect)?;

        match rect {
            Some(rect) if !state.full => state.pending.push(rect),
            _ => {
                state.full = true;
                state.pending.clear();
            }
        }
        Ok(region)
    }

    /// Ends a lock and replicates the written region into both halves.
    pub fn unlock_rect(&self, backend: &mut dyn GraphicsBackend) -> Result<(), BackendError> {
        if self.desc.pool != Pool::Default {
            return backend.unlock(self.left);
        }

        let mut state = self.state();
        if !state.full && state.pending.is_empty() {
            return Ok(());
        }
        let Some(staging) = state.staging else {
            state.pending.clear();
            state.full = false;
            return Ok(());
        };
        backend.unlock(staging)?;

        let targets = self.right.into_iter().chain(core::iter::once(self.left));
        for target in targets {
            if state.full {
                self.replicate(backend, staging, None, target);
            } else {
                for &rect in &state.pending {
                    self.replicate(backend, staging, Some(rect), target);
                }
            }
        }
        state.pending.clear();
        state.full = false;
        Ok(())
    }

    fn replicate(
        &self,
        backend: &mut dyn GraphicsBackend,
        staging: ResourceId,
        rect: Option<Rect>,
        target: ResourceId,
    ) {
        let (x, y) = rect.map_or((0, 0), |r| (r.left, r.top));
        if let Err(err) = backend.copy_region(staging, rect, target, x, y) {
            warn!(
                %staging,
                %target,
                ?rect,
                width = self.desc.width,
                height = self.desc.height,
                format = self.desc.format,
                pool = ?self.desc.pool,
                usage = ?self.desc.usage,
                error = %err,
                "lock replication failed"
            );
        }
    }

    /// Destroys the twin and the staging resource. The left resource belongs to the caller.
    pub fn release_extras(&self, backend: &mut dyn GraphicsBackend) {
        let staging = self.state().staging.take();
        for id in self.right.into_iter().chain(staging) {
            if let Err(err) = backend.destroy_resource(id) {
                warn!(%id, error = %err, "failed to destroy stereo resource");
            }
        }
    }
}
