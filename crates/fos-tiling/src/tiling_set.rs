//! Tiling Set
//!
//! All grids of one layer instance on one tree, ordered by descending scale,
//! plus the scale-selection state that decides which grids must exist.
//! The twin set (same layer, other tree) is never stored here; callers pass it
//! in, resolved through the layer tree.

use std::rc::Rc;

use crate::config::{HostState, TilingSettings};
use crate::content_source::ContentSource;
use crate::error::{Result, TilingError};
use crate::geometry::{Rect, Region, Size};
use crate::occlusion::OcclusionSource;
use crate::priority::{TileResolution, TreeKind};
use crate::scale_selector::{IdealScales, ScaleSelector};
use crate::tile::Tile;
use crate::tile_grid::{ActivationRule, PriorityInputs, TileGrid};
use crate::tile_sizing::calculate_tile_size;

/// Relative difference under which two scales are the same grid
const SCALE_TOLERANCE: f32 = 1e-5;

/// True when two scales name the same grid
pub fn scales_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= SCALE_TOLERANCE * a.abs().max(b.abs())
}

/// Layer facts needed to size and scale grids
pub struct TilingContext<'a> {
    pub settings: &'a TilingSettings,
    pub host: &'a HostState,
    pub layer_bounds: Size,
    pub is_mask: bool,
    pub fixed_tile_size: Option<Size>,
    pub source: &'a Rc<dyn ContentSource>,
}

impl TilingContext<'_> {
    /// Tile size for a grid at `scale`
    pub fn tile_size_for(&self, scale: f32) -> Size {
        if let Some(fixed) = self.fixed_tile_size {
            return fixed;
        }
        calculate_tile_size(
            self.layer_bounds.scale_ceil(scale),
            self.settings,
            self.host,
            self.is_mask,
        )
    }

    /// Smallest scale any grid of this layer may use
    pub fn minimum_contents_scale(&self) -> f32 {
        let min_dimension = self.layer_bounds.width.min(self.layer_bounds.height);
        let setting = self.settings.minimum_contents_scale;
        if min_dimension <= 0 {
            return setting;
        }
        setting.max(1.0 / min_dimension as f32)
    }

    /// Largest scale any grid of this layer may use
    pub fn maximum_contents_scale(&self) -> f32 {
        if !self.is_mask {
            return f32::MAX;
        }
        let max_dimension = self.layer_bounds.width.max(self.layer_bounds.height);
        if max_dimension <= 0 {
            return f32::MAX;
        }
        let max_texture = self.host.max_texture_size;
        let mut scale = max_texture as f32 / max_dimension as f32;
        // Rounding must not push the content a texel past the limit
        while scale > 0.0 && (max_dimension as f32 * scale).ceil() as i32 > max_texture {
            scale = f32::from_bits(scale.to_bits() - 1);
        }
        scale
    }

    /// A LOW grid is wanted at all
    pub fn create_low_res(&self) -> bool {
        self.settings.create_low_res_tiling && !self.host.use_gpu_rasterization
    }
}

/// Grids of one layer instance, highest scale first
#[derive(Debug)]
pub struct TilingSet {
    tree: TreeKind,
    tilings: Vec<TileGrid>,
    scales: ScaleSelector,
}

impl TilingSet {
    pub fn new(tree: TreeKind) -> Self {
        Self {
            tree,
            tilings: Vec::new(),
            scales: ScaleSelector::new(),
        }
    }

    pub fn tree(&self) -> TreeKind {
        self.tree
    }

    pub fn scales(&self) -> &ScaleSelector {
        &self.scales
    }

    pub fn num_tilings(&self) -> usize {
        self.tilings.len()
    }

    pub fn tiling_at(&self, index: usize) -> Option<&TileGrid> {
        self.tilings.get(index)
    }

    pub fn tilings(&self) -> &[TileGrid] {
        &self.tilings
    }

    /// Scales of every grid, highest first
    pub fn tiling_scales(&self) -> Vec<f32> {
        self.tilings.iter().map(TileGrid::contents_scale).collect()
    }

    pub fn find_tiling_with_scale(&self, scale: f32) -> Option<&TileGrid> {
        self.tilings
            .iter()
            .find(|grid| scales_equal(grid.contents_scale(), scale))
    }

    fn position_of_scale(&self, scale: f32) -> Option<usize> {
        self.tilings
            .iter()
            .position(|grid| scales_equal(grid.contents_scale(), scale))
    }

    pub fn find_tiling_with_resolution(&self, resolution: TileResolution) -> Option<&TileGrid> {
        self.tilings.iter().find(|grid| grid.resolution() == resolution)
    }

    pub fn high_res_tiling(&self) -> Option<&TileGrid> {
        self.find_tiling_with_resolution(TileResolution::High)
    }

    pub fn low_res_tiling(&self) -> Option<&TileGrid> {
        self.find_tiling_with_resolution(TileResolution::Low)
    }

    /// Add an empty grid at `scale`
    pub fn add_tiling(&mut self, scale: f32, ctx: &TilingContext<'_>) -> Result<&mut TileGrid> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(TilingError::InvalidScale(scale));
        }
        if self.position_of_scale(scale).is_some() {
            return Err(TilingError::DuplicateScale(scale));
        }
        let grid = TileGrid::new(
            scale,
            ctx.layer_bounds,
            ctx.tile_size_for(scale),
            Rc::clone(ctx.source),
        );
        let index = self
            .tilings
            .iter()
            .position(|existing| existing.contents_scale() < scale)
            .unwrap_or(self.tilings.len());
        self.tilings.insert(index, grid);
        Ok(&mut self.tilings[index])
    }

    fn find_or_add(&mut self, scale: f32, ctx: &TilingContext<'_>) -> Result<usize> {
        if let Some(index) = self.position_of_scale(scale) {
            return Ok(index);
        }
        self.add_tiling(scale, ctx)?;
        self.position_of_scale(scale)
            .ok_or(TilingError::InvalidScale(scale))
    }

    pub fn remove_non_ideal_tilings(&mut self) {
        self.tilings
            .retain(|grid| grid.resolution() != TileResolution::NonIdeal);
    }

    /// Drop every grid and the scale state
    pub fn remove_all_tilings(&mut self) {
        if !self.tilings.is_empty() {
            tracing::debug!(tree = ?self.tree, tilings = self.tilings.len(), "removing all tilings");
        }
        self.tilings.clear();
        self.scales.reset();
    }

    /// Bring the grids in line with this frame's ideal scales
    pub fn manage_tilings(&mut self, ideal: &IdealScales, ctx: &TilingContext<'_>) -> Result<()> {
        self.scales
            .update_ideal(ideal, ctx.minimum_contents_scale());
        if self.scales.should_adjust(ctx, ideal.animating_transform) {
            let existing = self.tiling_scales();
            self.scales.recalculate(ctx, ideal, &existing);
        }
        let result = self.add_tilings_for_raster_scale(ctx, ideal.animating_transform);
        self.scales.finish_frame(ideal.animating_transform);
        result
    }

    fn add_tilings_for_raster_scale(
        &mut self,
        ctx: &TilingContext<'_>,
        animating: bool,
    ) -> Result<()> {
        for grid in &mut self.tilings {
            grid.set_resolution(TileResolution::NonIdeal);
        }

        let raster_scale = self.scales.raster_contents_scale();
        let low_res_scale = self.scales.low_res_raster_contents_scale();
        let has_low_res = !scales_equal(low_res_scale, raster_scale);

        self.find_or_add(raster_scale, ctx)?;

        let can_add_low_res =
            ctx.create_low_res() && !ctx.host.pinch_gesture_active && !animating && has_low_res;
        let low_res_index = match self.position_of_scale(low_res_scale) {
            Some(index) => Some(index),
            None if can_add_low_res => Some(self.find_or_add(low_res_scale, ctx)?),
            None => None,
        };
        if has_low_res {
            if let Some(index) = low_res_index {
                self.tilings[index].set_resolution(TileResolution::Low);
            }
        }

        if let Some(index) = self.position_of_scale(raster_scale) {
            self.tilings[index].set_resolution(TileResolution::High);
        }

        if self.tree == TreeKind::Pending {
            self.remove_non_ideal_tilings();
        }
        Ok(())
    }

    /// Drop grids nobody needs; `used_scales` are grids the last draw used
    pub fn clean_up_tilings(
        &mut self,
        used_scales: &[f32],
        twin: Option<&TilingSet>,
        create_low_res: bool,
    ) {
        let own = &self.scales;
        let mut min_acceptable = own.ideal_contents_scale().min(own.raster_contents_scale());
        let mut max_acceptable = own.ideal_contents_scale().max(own.raster_contents_scale());

        let mut twin_low_res_scale = None;
        if let Some(twin) = twin.filter(|twin| twin.scales.has_raster_scales()) {
            let scales = &twin.scales;
            min_acceptable = min_acceptable
                .min(scales.ideal_contents_scale())
                .min(scales.raster_contents_scale());
            max_acceptable = max_acceptable
                .max(scales.ideal_contents_scale())
                .max(scales.raster_contents_scale());
            twin_low_res_scale = twin.low_res_tiling().map(TileGrid::contents_scale);
        }

        let before = self.tilings.len();
        self.tilings.retain(|grid| {
            let scale = grid.contents_scale();
            if scale >= min_acceptable && scale <= max_acceptable {
                return true;
            }
            if create_low_res {
                if grid.resolution() == TileResolution::Low {
                    return true;
                }
                if twin_low_res_scale.is_some_and(|low| scales_equal(low, scale)) {
                    return true;
                }
            }
            used_scales.iter().any(|&used| scales_equal(used, scale))
        });

        if self.tilings.len() != before {
            tracing::debug!(
                tree = ?self.tree,
                removed = before - self.tilings.len(),
                min_acceptable,
                max_acceptable,
                "cleaned up tilings"
            );
        }
    }

    /// Copy scale-selection state onto `other` (a new twin of this layer)
    pub fn push_properties_to(&self, other: &mut TilingSet) {
        other.scales = self.scales.clone();
    }

    /// Create grids matching the twin's scales; their tiles are shared lazily
    pub fn sync_tilings(&mut self, twin: &TilingSet, ctx: &TilingContext<'_>) -> Result<()> {
        let mut added = 0;
        for twin_grid in &twin.tilings {
            if self.position_of_scale(twin_grid.contents_scale()).is_some() {
                continue;
            }
            let grid = self.add_tiling(twin_grid.contents_scale(), ctx)?;
            grid.set_resolution(twin_grid.resolution());
            added += 1;
        }
        if added > 0 {
            tracing::debug!(tree = ?self.tree, added, "synced tilings from twin");
        }
        Ok(())
    }

    /// New layer bounds or content for every grid
    pub fn update_layer(&mut self, layer_bounds: Size, source: &Rc<dyn ContentSource>, invalidation: &Region) {
        for grid in &mut self.tilings {
            grid.set_layer_bounds(layer_bounds);
            grid.set_content_source(Rc::clone(source));
            grid.remove_tiles_in_region(invalidation);
        }
    }

    /// Recompute live tiles and priorities of every grid
    #[allow(clippy::too_many_arguments)]
    pub fn update_tile_priorities(
        &mut self,
        visible_layer_rect: Rect,
        ideal_contents_scale: f32,
        occlusion: &dyn OcclusionSource,
        settings: &TilingSettings,
        twin: Option<&TilingSet>,
        invalidation: &Region,
        activation: ActivationRule,
    ) {
        let tree = self.tree;
        for grid in &mut self.tilings {
            let twin_grid = twin.and_then(|set| set.find_tiling_with_scale(grid.contents_scale()));
            let activation = match (activation, twin_grid) {
                (ActivationRule::UnsharedVisible, Some(twin_grid)) if twin_grid.is_empty() => {
                    ActivationRule::NotRequired
                }
                (rule, _) => rule,
            };
            let inputs = PriorityInputs {
                tree,
                visible_layer_rect,
                ideal_contents_scale,
                occlusion,
                settings,
                activation,
            };
            grid.update_tile_priorities(&inputs, twin_grid, invalidation);
        }
    }

    /// Clear every grid's tiles, keeping grids and scale state
    pub fn release_resources(&mut self) {
        let tiles: usize = self.tilings.iter().map(TileGrid::len).sum();
        for grid in &mut self.tilings {
            grid.reset();
        }
        tracing::debug!(tree = ?self.tree, tiles, "released tile resources");
    }

    /// This set now belongs to the active tree
    pub fn did_become_active(&mut self) {
        self.tree = TreeKind::Active;
        for grid in &self.tilings {
            grid.did_become_active();
        }
    }

    /// Every tile of every grid, grid by grid in row-major order
    pub fn all_tiles(&self) -> Vec<Rc<Tile>> {
        self.tilings.iter().flat_map(TileGrid::all_tiles).collect()
    }

    pub fn num_tiles(&self) -> usize {
        self.tilings.iter().map(TileGrid::len).sum()
    }
}
