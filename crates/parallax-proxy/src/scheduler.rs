//! Which eye is being rendered, and the per-stage constant buffer tables bound for it.

use parallax_rules::{Eye, ShaderStage};
use tracing::{trace, warn};

use crate::backend::{BackendError, GraphicsBackend, ResourceId, CONSTANT_BUFFER_SLOTS};
use crate::object::ProxyId;

/// Constant buffers of one stage: the application's view plus the `2×N` native table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTable {
    app: [Option<ProxyId>; CONSTANT_BUFFER_SLOTS],
    halves: [[Option<ResourceId>; CONSTANT_BUFFER_SLOTS]; 2],
}

impl Default for ActiveTable {
    fn default() -> Self {
        Self {
            app: [None; CONSTANT_BUFFER_SLOTS],
            halves: [[None; CONSTANT_BUFFER_SLOTS]; 2],
        }
    }
}

impl ActiveTable {
    /// Fills `slot`. `right` falls back to `left` for mono buffers.
    pub fn set(
        &mut self,
        slot: usize,
        app: Option<ProxyId>,
        left: Option<ResourceId>,
        right: Option<ResourceId>,
    ) {
        if slot >= CONSTANT_BUFFER_SLOTS {
            return;
        }
        self.app[slot] = app;
        self.halves[Eye::Left.index()][slot] = left;
        self.halves[Eye::Right.index()][slot] = right.or(left);
    }

    pub fn app(&self) -> &[Option<ProxyId>] {
        &self.app
    }

    pub fn half(&self, eye: Eye) -> &[Option<ResourceId>] {
        &self.halves[eye.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.app.iter().all(Option::is_none)
    }

    /// Active slots as `(slot, buffer)`.
    pub fn bound(&self) -> impl Iterator<Item = (u32, ProxyId)> + '_ {
        self.app
            .iter()
            .enumerate()
            .filter_map(|(slot, id)| Some((slot as u32, (*id)?)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderSideScheduler {
    side: Eye,
    tables: [ActiveTable; 6],
}

impl RenderSideScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn side(&self) -> Eye {
        self.side
    }

    /// Returns whether the side changed.
    pub fn set_side(&mut self, side: Eye) -> bool {
        let changed = self.side != side;
        self.side = side;
        changed
    }

    pub fn table(&self, stage: ShaderStage) -> &ActiveTable {
        &self.tables[stage.index()]
    }

    pub fn table_mut(&mut self, stage: ShaderStage) -> &mut ActiveTable {
        &mut self.tables[stage.index()]
    }

    /// Binds `count` slots from `start_slot` of the current side's half.
    pub fn bind(
        &self,
        backend: &mut dyn GraphicsBackend,
        stage: ShaderStage,
        start_slot: u32,
        count: u32,
    ) -> Result<(), BackendError> {
        let start = start_slot as usize;
        let end = start + count as usize;
        let half = self
            .table(stage)
            .half(self.side)
            .get(start..end)
            .ok_or(BackendError::OutOfBounds)?;
        trace!(?stage, side = ?self.side, start_slot, ?half, "binding constant buffers");
        backend.bind_constant_buffers(stage, start_slot, half)
    }

    /// Rebinds every non-empty stage table for the current side.
    ///
    /// A stage that fails to bind is logged and skipped; the remaining stages are still rebound.
    /// Returns the number of failed stages.
    pub fn rebind_all(&self, backend: &mut dyn GraphicsBackend) -> usize {
        let mut failed = 0;
        for stage in ShaderStage::ALL {
            if self.table(stage).is_empty() {
                continue;
            }
            if let Err(err) = self.bind(backend, stage, 0, CONSTANT_BUFFER_SLOTS as u32) {
                warn!(?stage, side = ?self.side, error = %err, "constant buffer rebind failed");
                failed += 1;
            }
        }
        failed
    }

    /// First `(stage, slot)` where the application bound `id`.
    pub fn find_bound(&self, id: ProxyId) -> Option<(ShaderStage, u32)> {
        ShaderStage::ALL.into_iter().find_map(|stage| {
            self.table(stage)
                .bound()
                .find(|&(_, bound)| bound == id)
                .map(|(slot, _)| (stage, slot))
        })
    }

    /// Empties every slot holding `id`. Returns the stages that changed.
    pub fn forget(&mut self, id: ProxyId) -> Vec<ShaderStage> {
        let mut touched = Vec::new();
        for stage in ShaderStage::ALL {
            let table = self.table_mut(stage);
            let slots: Vec<u32> = table
                .bound()
                .filter(|&(_, bound)| bound == id)
                .map(|(slot, _)| slot)
                .collect();
            if slots.is_empty() {
                continue;
            }
            for slot in slots {
                table.set(slot as usize, None, None, None);
            }
            touched.push(stage);
        }
        touched
    }
}
