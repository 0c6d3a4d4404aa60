//! Layer Tree Host
//!
//! Owns the pending and active layer trees. A commit lands on the pending
//! tree; activation swaps it in as the new active tree. Twins are looked up
//! by [`LayerId`] in the other tree, never stored as references.

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::{HostState, TilingSettings};
use crate::content_source::ContentSource;
use crate::diagnostics::TilingSetDiagnostics;
use crate::error::{Result, TilingError};
use crate::eviction_queue::EvictionPriorityQueue;
use crate::geometry::{Region, Size};
use crate::layer::{DrawProperties, LayerProperties, PictureLayer};
use crate::memory::{MemoryAssignment, MemoryPolicy, assign_memory, usage_of};
use crate::occlusion::OcclusionSource;
use crate::priority::{TreeKind, TreePriority};
use crate::raster_queue::RasterPriorityQueue;
use crate::tiling_set::TilingSet;

/// Stable identity of a layer across both trees; ids are dense, small
/// integers handed out by the embedder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub u32);

impl LayerId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Layers of one tree, in slots indexed by [`LayerId`]
#[derive(Debug)]
pub struct LayerTree {
    kind: TreeKind,
    slots: Vec<Option<PictureLayer>>,
}

impl LayerTree {
    pub fn new(kind: TreeKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
        }
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    pub fn get(&self, id: LayerId) -> Option<&PictureLayer> {
        self.slots.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut PictureLayer> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Insert or replace the layer with the same id
    pub fn insert(&mut self, layer: PictureLayer) -> Option<PictureLayer> {
        let index = layer.id().index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].replace(layer)
    }

    pub fn remove(&mut self, id: LayerId) -> Option<PictureLayer> {
        self.slots.get_mut(id.index())?.take()
    }

    /// Layers in id order
    pub fn iter(&self) -> impl Iterator<Item = &PictureLayer> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PictureLayer> {
        self.slots.iter_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn did_become_active(&mut self) {
        self.kind = TreeKind::Active;
        for layer in self.iter_mut() {
            layer.did_become_active();
        }
    }
}

/// Pending and active trees plus the host state every layer reads
#[derive(Debug)]
pub struct LayerTreeHost {
    settings: TilingSettings,
    state: HostState,
    pending: Option<LayerTree>,
    active: LayerTree,
}

impl LayerTreeHost {
    pub fn new(settings: TilingSettings) -> Result<Self> {
        Self::with_state(settings, HostState::default())
    }

    pub fn with_state(settings: TilingSettings, state: HostState) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            state,
            pending: None,
            active: LayerTree::new(TreeKind::Active),
        })
    }

    pub fn settings(&self) -> &TilingSettings {
        &self.settings
    }

    pub fn state(&self) -> &HostState {
        &self.state
    }

    pub fn has_pending_tree(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_tree(&self) -> Option<&LayerTree> {
        self.pending.as_ref()
    }

    pub fn active_tree(&self) -> &LayerTree {
        &self.active
    }

    // ========================================================================
    // Host state
    // ========================================================================

    pub fn set_viewport_size(&mut self, viewport_size: Size) {
        self.state.viewport_size = viewport_size;
    }

    pub fn set_max_texture_size(&mut self, max_texture_size: i32) {
        self.state.max_texture_size = max_texture_size;
    }

    /// Switching raster mode invalidates every grid on both trees
    pub fn set_use_gpu_rasterization(&mut self, use_gpu_rasterization: bool) {
        if self.state.use_gpu_rasterization == use_gpu_rasterization {
            return;
        }
        self.state.use_gpu_rasterization = use_gpu_rasterization;
        tracing::info!(use_gpu_rasterization, "raster mode changed, dropping all tilings");
        for layer in self.layers_mut() {
            layer.remove_all_tilings();
        }
    }

    pub fn pinch_gesture_begin(&mut self) {
        self.state.pinch_gesture_active = true;
    }

    pub fn pinch_gesture_end(&mut self) {
        self.state.pinch_gesture_active = false;
    }

    pub fn set_requires_high_res_to_draw(&mut self, required: bool) {
        self.state.requires_high_res_to_draw = required;
    }

    pub fn set_tree_priority(&mut self, tree_priority: TreePriority) {
        self.state.tree_priority = tree_priority;
    }

    pub fn set_memory_policy(&mut self, memory_policy: MemoryPolicy) {
        self.state.memory_policy = memory_policy;
    }

    // ========================================================================
    // Layers
    // ========================================================================

    fn tree(&self, tree: TreeKind) -> Result<&LayerTree> {
        match tree {
            TreeKind::Active => Ok(&self.active),
            TreeKind::Pending => self.pending.as_ref().ok_or(TilingError::NoPendingTree),
        }
    }

    pub fn layer(&self, tree: TreeKind, id: LayerId) -> Result<&PictureLayer> {
        self.tree(tree)?
            .get(id)
            .ok_or(TilingError::LayerNotFound { id, tree })
    }

    /// The same layer on the other tree, if it exists there
    pub fn twin_of(&self, tree: TreeKind, id: LayerId) -> Option<&PictureLayer> {
        self.tree(tree.twin()).ok()?.get(id)
    }

    fn layers_mut(&mut self) -> impl Iterator<Item = &mut PictureLayer> {
        self.active
            .iter_mut()
            .chain(self.pending.iter_mut().flat_map(|pending| pending.iter_mut()))
    }

    fn tiling_sets(&self) -> impl Iterator<Item = &TilingSet> {
        self.active
            .iter()
            .chain(self.pending.iter().flat_map(|pending| pending.iter()))
            .map(PictureLayer::tilings)
    }

    /// Commit one layer to the pending tree
    ///
    /// Activation replaces the active tree with the pending one, so every
    /// layer that should survive must be committed before [`activate`](Self::activate).
    pub fn commit_layer(
        &mut self,
        id: LayerId,
        properties: LayerProperties,
        source: Rc<dyn ContentSource>,
        invalidation: &Region,
    ) -> Result<()> {
        let Self {
            settings,
            state,
            pending,
            active,
        } = self;
        let pending = pending.get_or_insert_with(|| LayerTree::new(TreeKind::Pending));

        if let Some(layer) = pending.get_mut(id) {
            layer.commit(properties, source, invalidation);
            return Ok(());
        }

        let mut layer = PictureLayer::new(id, TreeKind::Pending, properties, source);
        layer.add_invalidation(invalidation);
        if let Some(twin) = active.get(id) {
            layer.sync_from_twin(twin, settings, state)?;
        }
        tracing::debug!(?id, bounds = ?properties.bounds, "committed new pending layer");
        pending.insert(layer);
        Ok(())
    }

    /// Add a grid at `scale` to one layer; fails while the layer cannot have
    /// tilings
    pub fn add_tiling(&mut self, tree: TreeKind, id: LayerId, scale: f32) -> Result<()> {
        let Self {
            settings,
            state,
            pending,
            active,
        } = self;
        let layers = match tree {
            TreeKind::Active => active,
            TreeKind::Pending => pending.as_mut().ok_or(TilingError::NoPendingTree)?,
        };
        let layer = layers
            .get_mut(id)
            .ok_or(TilingError::LayerNotFound { id, tree })?;
        let grid = layer.add_tiling(scale, settings, state)?;
        tracing::debug!(?id, ?tree, scale = grid.contents_scale(), "added tiling");
        Ok(())
    }

    /// Per-frame scale and priority update of one layer
    ///
    /// When both trees are updated in a frame, update the active layer first;
    /// the pending layer then sees its twin's fresh scales.
    pub fn update_tiles(
        &mut self,
        tree: TreeKind,
        id: LayerId,
        draw: &DrawProperties,
        occlusion: &dyn OcclusionSource,
        resourceless_draw: bool,
    ) -> Result<()> {
        let Self {
            settings,
            state,
            pending,
            active,
        } = self;
        let (layers, twins) = match tree {
            TreeKind::Active => (active, pending.as_ref()),
            TreeKind::Pending => (
                pending.as_mut().ok_or(TilingError::NoPendingTree)?,
                Some(&*active),
            ),
        };
        let twin = twins.and_then(|twins| twins.get(id));
        let layer = layers
            .get_mut(id)
            .ok_or(TilingError::LayerNotFound { id, tree })?;
        layer.update_tiles(draw, occlusion, resourceless_draw, settings, state, twin)
    }

    /// Make the pending tree the active one
    pub fn activate(&mut self) -> Result<()> {
        let mut pending = self.pending.take().ok_or(TilingError::NoPendingTree)?;
        pending.did_become_active();
        let previous = std::mem::replace(&mut self.active, pending);
        tracing::info!(
            layers = self.active.len(),
            dropped = previous.len().saturating_sub(self.active.len()),
            "activated pending tree"
        );
        Ok(())
    }

    /// Drop unused grids of an active layer
    pub fn clean_up_tilings(&mut self, id: LayerId, used_scales: &[f32]) -> Result<()> {
        let Self {
            settings,
            state,
            pending,
            active,
        } = self;
        let twin = pending.as_ref().and_then(|pending| pending.get(id));
        let layer = active.get_mut(id).ok_or(TilingError::LayerNotFound {
            id,
            tree: TreeKind::Active,
        })?;
        layer.clean_up_tilings(used_scales, twin, settings, state);
        Ok(())
    }

    /// Drop every tile on both trees; grids and scales survive
    pub fn release_resources(&mut self) {
        for layer in self.layers_mut() {
            layer.release_resources();
        }
    }

    // ========================================================================
    // Queues
    // ========================================================================

    pub fn raster_queue(
        &self,
        tree: TreeKind,
        id: LayerId,
        include_non_ideal: bool,
    ) -> Result<RasterPriorityQueue> {
        Ok(self.layer(tree, id)?.raster_queue(include_non_ideal))
    }

    pub fn eviction_queue(&self, tree: TreeKind, id: LayerId) -> Result<EvictionPriorityQueue> {
        Ok(self.layer(tree, id)?.eviction_queue(self.state.tree_priority))
    }

    /// Raster queue over every layer of both trees; shared tiles once
    pub fn raster_queue_all(&self, include_non_ideal: bool) -> RasterPriorityQueue {
        RasterPriorityQueue::from_sets(
            self.tiling_sets(),
            include_non_ideal,
            self.state.tree_priority,
        )
    }

    /// Eviction queue over every layer of both trees; shared tiles once
    pub fn eviction_queue_all(&self) -> EvictionPriorityQueue {
        EvictionPriorityQueue::from_sets(self.tiling_sets(), self.state.tree_priority)
    }

    /// Every required tile of the pending tree can draw
    pub fn is_ready_to_activate(&self) -> bool {
        self.pending.as_ref().is_some_and(|pending| {
            pending
                .iter()
                .all(PictureLayer::all_tiles_required_for_activation_are_ready_to_draw)
        })
    }

    /// Grant raster memory across both trees under the memory policy
    pub fn manage_tiles(&self) -> MemoryAssignment {
        let mut seen = HashSet::new();
        let tiles: Vec<_> = self
            .tiling_sets()
            .flat_map(|set| set.all_tiles())
            .filter(|tile| seen.insert(tile.id()))
            .collect();
        let usage = usage_of(&tiles);
        let required: Vec<_> = tiles
            .into_iter()
            .filter(|tile| tile.required_for_activation())
            .collect();
        assign_memory(
            self.raster_queue_all(false),
            self.eviction_queue_all(),
            usage,
            &required,
            &self.state.memory_policy,
        )
    }

    pub fn diagnostics(&self, tree: TreeKind, id: LayerId) -> Result<TilingSetDiagnostics> {
        Ok(TilingSetDiagnostics::from_set(self.layer(tree, id)?.tilings()))
    }
}
