//! Picture Layer
//!
//! One layer instance on one tree: its recorded content, its tiling set, and
//! the per-frame work of choosing scales and prioritizing tiles.

use std::rc::Rc;

use crate::config::{HostState, TilingSettings};
use crate::content_source::ContentSource;
use crate::error::{Result, TilingError};
use crate::eviction_queue::EvictionPriorityQueue;
use crate::geometry::{Rect, Region, Size};
use crate::layer_tree::LayerId;
use crate::occlusion::OcclusionSource;
use crate::priority::{TreeKind, TreePriority};
use crate::raster_queue::RasterPriorityQueue;
use crate::scale_selector::IdealScales;
use crate::tile::{DrawInfo, Resource, TileCoord};
use crate::tile_grid::{ActivationRule, TileGrid};
use crate::tiling_set::{TilingContext, TilingSet};

/// Committed layer properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerProperties {
    pub bounds: Size,
    /// Drawn as a single-tile mask
    pub is_mask: bool,
    pub draws_content: bool,
    /// Overrides the tile size policy
    pub fixed_tile_size: Option<Size>,
}

impl LayerProperties {
    pub fn new(bounds: Size) -> Self {
        Self {
            bounds,
            is_mask: false,
            draws_content: true,
            fixed_tile_size: None,
        }
    }

    pub fn mask(bounds: Size) -> Self {
        Self {
            is_mask: true,
            ..Self::new(bounds)
        }
    }

    pub fn with_tile_size(mut self, tile_size: Size) -> Self {
        self.fixed_tile_size = Some(tile_size);
        self
    }
}

/// Per-frame geometry from the host's draw property computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawProperties {
    pub ideal: IdealScales,
    /// Visible part of the layer, in layer space
    pub visible_layer_rect: Rect,
}

impl DrawProperties {
    pub fn new(ideal: IdealScales, visible_layer_rect: Rect) -> Self {
        Self {
            ideal,
            visible_layer_rect,
        }
    }
}

fn tiling_context<'a>(
    properties: &LayerProperties,
    source: &'a Rc<dyn ContentSource>,
    settings: &'a TilingSettings,
    host: &'a HostState,
) -> TilingContext<'a> {
    TilingContext {
        settings,
        host,
        layer_bounds: properties.bounds,
        is_mask: properties.is_mask,
        fixed_tile_size: properties.fixed_tile_size,
        source,
    }
}

/// A tiled layer on one tree
#[derive(Debug)]
pub struct PictureLayer {
    id: LayerId,
    properties: LayerProperties,
    source: Rc<dyn ContentSource>,
    tilings: TilingSet,
    /// Content changed since the active twin was committed
    invalidation: Region,
    /// Last visible rect from a draw with resources
    visible_layer_rect: Rect,
    last_ideal: Option<IdealScales>,
}

impl PictureLayer {
    pub fn new(
        id: LayerId,
        tree: TreeKind,
        properties: LayerProperties,
        source: Rc<dyn ContentSource>,
    ) -> Self {
        Self {
            id,
            properties,
            source,
            tilings: TilingSet::new(tree),
            invalidation: Region::new(),
            visible_layer_rect: Rect::default(),
            last_ideal: None,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn tree(&self) -> TreeKind {
        self.tilings.tree()
    }

    pub fn properties(&self) -> &LayerProperties {
        &self.properties
    }

    pub fn bounds(&self) -> Size {
        self.properties.bounds
    }

    pub fn source(&self) -> &Rc<dyn ContentSource> {
        &self.source
    }

    pub fn tilings(&self) -> &TilingSet {
        &self.tilings
    }

    pub fn invalidation(&self) -> &Region {
        &self.invalidation
    }

    pub fn visible_layer_rect(&self) -> Rect {
        self.visible_layer_rect
    }

    fn context<'a>(&'a self, settings: &'a TilingSettings, host: &'a HostState) -> TilingContext<'a> {
        tiling_context(&self.properties, &self.source, settings, host)
    }

    /// Tiles may be created for this layer
    pub fn can_have_tilings(&self, settings: &TilingSettings, host: &HostState) -> bool {
        if self.source.solid_color().is_some() {
            return false;
        }
        if !self.properties.draws_content || !self.source.has_recordings() {
            return false;
        }
        if self.properties.bounds.is_empty() {
            return false;
        }
        if self.last_ideal.is_some_and(|ideal| !ideal.is_valid()) {
            return false;
        }
        let ctx = self.context(settings, host);
        ctx.maximum_contents_scale() >= ctx.minimum_contents_scale()
    }

    /// Add a grid at `scale` outside the per-frame scale selection
    pub fn add_tiling(
        &mut self,
        scale: f32,
        settings: &TilingSettings,
        host: &HostState,
    ) -> Result<&mut TileGrid> {
        if !self.can_have_tilings(settings, host) {
            return Err(TilingError::CannotHaveTilings(self.id));
        }
        let ctx = tiling_context(&self.properties, &self.source, settings, host);
        self.tilings.add_tiling(scale, &ctx)
    }

    /// Take a new commit of this (pending) layer
    pub fn commit(
        &mut self,
        properties: LayerProperties,
        source: Rc<dyn ContentSource>,
        invalidation: &Region,
    ) {
        let tiling_changed = properties.is_mask != self.properties.is_mask
            || properties.fixed_tile_size != self.properties.fixed_tile_size;
        self.properties = properties;
        self.source = source;
        self.invalidation.union_region(invalidation);
        if tiling_changed {
            self.tilings.remove_all_tilings();
        } else {
            self.tilings
                .update_layer(properties.bounds, &self.source, invalidation);
        }
    }

    /// Add to the region that must not be shared with the twin
    pub fn add_invalidation(&mut self, invalidation: &Region) {
        self.invalidation.union_region(invalidation);
    }

    /// Start a new pending layer from its active twin
    pub fn sync_from_twin(
        &mut self,
        twin: &PictureLayer,
        settings: &TilingSettings,
        host: &HostState,
    ) -> Result<()> {
        if !twin.can_have_tilings(settings, host) || !self.can_have_tilings(settings, host) {
            return Ok(());
        }
        twin.tilings.push_properties_to(&mut self.tilings);
        let ctx = tiling_context(&self.properties, &self.source, settings, host);
        self.tilings.sync_tilings(&twin.tilings, &ctx)
    }

    /// Which visible HIGH tiles must be ready before this layer can activate
    pub fn activation_rule(
        &self,
        twin: Option<&PictureLayer>,
        settings: &TilingSettings,
        host: &HostState,
    ) -> ActivationRule {
        if self.tree() != TreeKind::Pending {
            return ActivationRule::NotRequired;
        }
        if host.requires_high_res_to_draw {
            return ActivationRule::AllVisible;
        }
        match twin {
            Some(twin) if twin.can_have_tilings(settings, host) && twin.bounds() == self.bounds() => {
                ActivationRule::UnsharedVisible
            }
            _ => ActivationRule::AllVisible,
        }
    }

    /// Pick scales, manage grids and reprioritize every tile for this frame
    pub fn update_tiles(
        &mut self,
        draw: &DrawProperties,
        occlusion: &dyn OcclusionSource,
        resourceless_draw: bool,
        settings: &TilingSettings,
        host: &HostState,
        twin: Option<&PictureLayer>,
    ) -> Result<()> {
        self.last_ideal = Some(draw.ideal);
        if !self.can_have_tilings(settings, host) {
            self.tilings.remove_all_tilings();
            return Ok(());
        }
        if !resourceless_draw {
            self.visible_layer_rect = draw.visible_layer_rect;
        }

        let ctx = tiling_context(&self.properties, &self.source, settings, host);
        self.tilings.manage_tilings(&draw.ideal, &ctx)?;

        let activation = self.activation_rule(twin, settings, host);
        let twin = twin.filter(|twin| twin.can_have_tilings(settings, host));
        let invalidation = match (self.tree(), twin) {
            (TreeKind::Pending, _) => &self.invalidation,
            (TreeKind::Active, Some(twin)) => &twin.invalidation,
            (TreeKind::Active, None) => &self.invalidation,
        };
        let ideal_contents_scale = self.tilings.scales().ideal_contents_scale();
        self.tilings.update_tile_priorities(
            self.visible_layer_rect,
            ideal_contents_scale,
            occlusion,
            settings,
            twin.map(|twin| &twin.tilings),
            invalidation,
            activation,
        );
        Ok(())
    }

    /// Drop grids the last draw did not use and that fall outside the
    /// current ideal/raster range of this layer and its twin
    pub fn clean_up_tilings(
        &mut self,
        used_scales: &[f32],
        twin: Option<&PictureLayer>,
        settings: &TilingSettings,
        host: &HostState,
    ) {
        let create_low_res = self.context(settings, host).create_low_res();
        let twin = twin
            .filter(|twin| twin.can_have_tilings(settings, host))
            .map(|twin| &twin.tilings);
        self.tilings
            .clean_up_tilings(used_scales, twin, create_low_res);
    }

    /// Drop every tile (lost graphics context); scales are kept
    pub fn release_resources(&mut self) {
        self.tilings.release_resources();
    }

    /// Drop every grid and the scale state
    pub fn remove_all_tilings(&mut self) {
        self.tilings.remove_all_tilings();
    }

    pub fn raster_queue(&self, include_non_ideal: bool) -> RasterPriorityQueue {
        RasterPriorityQueue::new(&self.tilings, include_non_ideal)
    }

    pub fn eviction_queue(&self, tree_priority: TreePriority) -> EvictionPriorityQueue {
        EvictionPriorityQueue::new(&self.tilings, tree_priority)
    }

    pub fn all_tiles_required_for_activation_are_ready_to_draw(&self) -> bool {
        self.tilings
            .all_tiles()
            .iter()
            .filter(|tile| tile.required_for_activation())
            .all(|tile| tile.is_ready_to_draw())
    }

    /// Single resource a mask layer draws with, from the grid closest to the
    /// ideal scale
    pub fn mask_contents_resource(&self) -> Option<(f32, Resource)> {
        if !self.properties.is_mask {
            return None;
        }
        let ideal = self.tilings.scales().ideal_contents_scale();
        let grid = if ideal > 0.0 {
            let distance = |scale: f32| (scale / ideal).ln().abs();
            self.tilings.tilings().iter().min_by(|a, b| {
                distance(a.contents_scale()).total_cmp(&distance(b.contents_scale()))
            })?
        } else {
            self.tilings.high_res_tiling()?
        };
        let tile = grid.tile_at(TileCoord::new(0, 0))?;
        match tile.draw_info() {
            DrawInfo::Resource(resource) => Some((grid.contents_scale(), resource)),
            _ => None,
        }
    }

    /// Pending layer is now the active one
    pub fn did_become_active(&mut self) {
        self.tilings.did_become_active();
        self.invalidation.clear();
    }
}
