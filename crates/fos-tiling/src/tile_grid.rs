//! Tile Grid
//!
//! A sparse grid of tiles covering a layer at one contents scale (a "tiling").
//! Cells without recorded content have no tile. Tiles can be shared with the
//! twin tree's grid at the same scale; a shared tile is held by both grids and
//! flagged `is_shared` until one of them lets go.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::config::TilingSettings;
use crate::content_source::ContentSource;
use crate::geometry::{Rect, Region, Size};
use crate::occlusion::OcclusionSource;
use crate::priority::{PriorityBin, TilePriority, TileResolution, TreeKind};
use crate::tile::{Tile, TileCoord};
use crate::tile_sizing::TilingData;

/// Which visible HIGH tiles a pending grid marks as required for activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivationRule {
    NotRequired,
    AllVisible,
    /// Only tiles the active tree cannot already draw
    UnsharedVisible,
}

/// Per-frame inputs to a priority update
pub struct PriorityInputs<'a> {
    pub tree: TreeKind,
    /// Layer-space visible rect
    pub visible_layer_rect: Rect,
    /// Ideal contents scale of the layer this frame
    pub ideal_contents_scale: f32,
    pub occlusion: &'a dyn OcclusionSource,
    pub settings: &'a TilingSettings,
    pub activation: ActivationRule,
}

/// One cell of a coverage walk
#[derive(Debug, Clone, Copy)]
pub struct Coverage<'a> {
    pub coord: TileCoord,
    /// None where nothing was recorded
    pub tile: Option<&'a Rc<Tile>>,
    /// Part of the destination rect this cell covers, in destination space
    pub geometry_rect: Rect,
}

/// Row-major walk over the cells covering a destination rect
pub struct CoverageIter<'a> {
    grid: &'a TileGrid,
    dest_rect: Rect,
    dest_to_content: f32,
    range: Option<(TileCoord, TileCoord)>,
    next: TileCoord,
}

impl<'a> Iterator for CoverageIter<'a> {
    type Item = Coverage<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (first, last) = self.range?;
        loop {
            if self.next.row > last.row {
                return None;
            }
            let coord = self.next;
            self.next.col += 1;
            if self.next.col > last.col {
                self.next = TileCoord::new(first.col, self.next.row + 1);
            }

            let geometry_rect = self
                .grid
                .data
                .tile_bounds(coord)
                .scale_to_enclosing(1.0 / self.dest_to_content)
                .intersect(&self.dest_rect);
            if geometry_rect.is_empty() {
                continue;
            }
            return Some(Coverage {
                coord,
                tile: self.grid.tiles.get(&coord),
                geometry_rect,
            });
        }
    }
}

/// Sparse grid of tiles at one scale
pub struct TileGrid {
    contents_scale: f32,
    layer_bounds: Size,
    data: TilingData,
    resolution: TileResolution,
    source: Rc<dyn ContentSource>,
    tiles: HashMap<TileCoord, Rc<Tile>>,
    can_require_tiles_for_activation: bool,
    /// Content-space priority rects from the last update
    visible_rect: Rect,
    soon_rect: Rect,
    live_tiles_rect: Rect,
}

impl TileGrid {
    /// Create an empty grid; tiles appear on the first priority update
    pub fn new(
        contents_scale: f32,
        layer_bounds: Size,
        tile_size: Size,
        source: Rc<dyn ContentSource>,
    ) -> Self {
        tracing::debug!(contents_scale, ?layer_bounds, ?tile_size, "creating tiling");
        Self {
            contents_scale,
            layer_bounds,
            data: TilingData::new(tile_size, layer_bounds.scale_ceil(contents_scale)),
            resolution: TileResolution::NonIdeal,
            source,
            tiles: HashMap::new(),
            can_require_tiles_for_activation: true,
            visible_rect: Rect::default(),
            soon_rect: Rect::default(),
            live_tiles_rect: Rect::default(),
        }
    }

    pub fn contents_scale(&self) -> f32 {
        self.contents_scale
    }

    pub fn layer_bounds(&self) -> Size {
        self.layer_bounds
    }

    pub fn tile_size(&self) -> Size {
        self.data.tile_size()
    }

    /// Whole grid in content space
    pub fn tiling_rect(&self) -> Rect {
        self.data.tiling_rect()
    }

    pub fn tiling_data(&self) -> &TilingData {
        &self.data
    }

    pub fn resolution(&self) -> TileResolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: TileResolution) {
        self.resolution = resolution;
    }

    pub fn can_require_tiles_for_activation(&self) -> bool {
        self.can_require_tiles_for_activation
    }

    pub fn set_can_require_tiles_for_activation(&mut self, can_require: bool) {
        self.can_require_tiles_for_activation = can_require;
    }

    pub fn live_tiles_rect(&self) -> Rect {
        self.live_tiles_rect
    }

    pub fn visible_rect(&self) -> Rect {
        self.visible_rect
    }

    /// Content snapshot new tiles are created from
    pub fn set_content_source(&mut self, source: Rc<dyn ContentSource>) {
        self.source = source;
    }

    /// Number of live tiles
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Get tile at coordinate
    pub fn tile_at(&self, coord: TileCoord) -> Option<&Rc<Tile>> {
        self.tiles.get(&coord)
    }

    /// Iterate live tiles (unordered)
    pub fn tiles(&self) -> impl Iterator<Item = &Rc<Tile>> {
        self.tiles.values()
    }

    /// Live tiles in row-major order
    pub fn all_tiles(&self) -> Vec<Rc<Tile>> {
        let mut tiles: Vec<_> = self.tiles.values().cloned().collect();
        tiles.sort_by_key(|tile| (tile.coord().row, tile.coord().col));
        tiles
    }

    /// Layer-space rect of a cell
    fn cell_layer_rect(&self, coord: TileCoord) -> Rect {
        self.data
            .tile_bounds(coord)
            .scale_to_enclosing(1.0 / self.contents_scale)
    }

    /// Existing tile, the twin's tile when it can be shared, a new tile when
    /// content was recorded in the cell, or None
    pub fn get_or_create_tile(
        &mut self,
        coord: TileCoord,
        twin: Option<&TileGrid>,
        invalidation: &Region,
    ) -> Option<Rc<Tile>> {
        if let Some(tile) = self.tiles.get(&coord) {
            return Some(Rc::clone(tile));
        }
        if !self.data.contains(coord) {
            return None;
        }

        let content_rect = self.data.tile_bounds(coord);
        let layer_rect = self.cell_layer_rect(coord);

        if let Some(twin_tile) = twin.and_then(|grid| grid.tile_at(coord)) {
            if twin_tile.content_rect() == content_rect && !invalidation.intersects(&layer_rect) {
                twin_tile.set_shared(true);
                tracing::trace!(
                    tile = twin_tile.id().0,
                    col = coord.col,
                    row = coord.row,
                    "sharing tile with twin"
                );
                self.tiles.insert(coord, Rc::clone(twin_tile));
                return Some(Rc::clone(twin_tile));
            }
        }

        if !self.source.has_recording_in(layer_rect) {
            return None;
        }

        let tile = Rc::new(Tile::new(
            coord,
            content_rect,
            self.contents_scale,
            Rc::clone(&self.source),
        ));
        tracing::trace!(tile = tile.id().0, col = coord.col, row = coord.row, "created tile");
        self.tiles.insert(coord, Rc::clone(&tile));
        Some(tile)
    }

    fn remove_tile(&mut self, coord: TileCoord) -> Option<Rc<Tile>> {
        let tile = self.tiles.remove(&coord)?;
        // The twin is now the only owner
        tile.set_shared(false);
        Some(tile)
    }

    /// Drop tiles whose layer rect intersects `region`
    pub fn remove_tiles_in_region(&mut self, region: &Region) {
        if region.is_empty() {
            return;
        }
        let doomed: Vec<_> = self
            .tiles
            .keys()
            .copied()
            .filter(|&coord| region.intersects(&self.cell_layer_rect(coord)))
            .collect();
        for coord in doomed {
            self.remove_tile(coord);
        }
    }

    /// Drop every tile and forget the live rect
    pub fn reset(&mut self) {
        let coords: Vec<_> = self.tiles.keys().copied().collect();
        for coord in coords {
            self.remove_tile(coord);
        }
        self.live_tiles_rect = Rect::default();
    }

    /// Follow new layer bounds; tiles whose cell changed are dropped
    pub fn set_layer_bounds(&mut self, layer_bounds: Size) {
        if layer_bounds == self.layer_bounds {
            return;
        }
        self.layer_bounds = layer_bounds;
        self.data = TilingData::new(
            self.data.tile_size(),
            layer_bounds.scale_ceil(self.contents_scale),
        );
        let stale: Vec<_> = self
            .tiles
            .iter()
            .filter(|(coord, tile)| {
                !self.data.contains(**coord) || tile.content_rect() != self.data.tile_bounds(**coord)
            })
            .map(|(coord, _)| *coord)
            .collect();
        for coord in stale {
            self.remove_tile(coord);
        }
        self.live_tiles_rect = self.live_tiles_rect.intersect(&self.tiling_rect());
    }

    /// Keep tiles inside `live_rect` and create the missing ones
    pub fn set_live_tiles_rect(
        &mut self,
        live_rect: Rect,
        twin: Option<&TileGrid>,
        invalidation: &Region,
    ) {
        let live_rect = live_rect.intersect(&self.tiling_rect());

        let outside: Vec<_> = self
            .tiles
            .iter()
            .filter(|(_, tile)| !tile.content_rect().intersects(&live_rect))
            .map(|(coord, _)| *coord)
            .collect();
        for coord in outside {
            self.remove_tile(coord);
        }

        for coord in self.data.coords_covering(live_rect) {
            self.get_or_create_tile(coord, twin, invalidation);
        }
        self.live_tiles_rect = live_rect;
    }

    /// Recompute live tiles and every tile's priority for one tree
    pub fn update_tile_priorities(
        &mut self,
        inputs: &PriorityInputs<'_>,
        twin: Option<&TileGrid>,
        invalidation: &Region,
    ) {
        let content_to_screen = inputs.ideal_contents_scale / self.contents_scale;
        let visible = inputs.visible_layer_rect.scale_to_enclosing(self.contents_scale);
        let soon_border = (inputs.settings.soon_border_distance as f32 / content_to_screen).ceil();
        let interest_padding =
            (inputs.settings.interest_area_padding as f32 / content_to_screen).ceil();

        self.visible_rect = visible;
        self.soon_rect = visible.expand(soon_border as i32);
        let interest = if visible.is_empty() {
            Rect::default()
        } else {
            visible.expand(interest_padding as i32)
        };
        self.set_live_tiles_rect(interest, twin, invalidation);

        let requires = self.can_require_tiles_for_activation
            && inputs.tree == TreeKind::Pending
            && self.resolution == TileResolution::High;

        for tile in self.tiles.values() {
            let bounds = tile.content_rect();
            let (priority, occluded) = if bounds.intersects(&visible) {
                let occluded = inputs.occlusion.is_occluded(tile.layer_rect(), inputs.tree);
                (TilePriority::new(PriorityBin::Now, self.resolution, 0.0), occluded)
            } else {
                let distance = visible.manhattan_distance(&bounds) as f32 * content_to_screen;
                let bin = if bounds.intersects(&self.soon_rect) {
                    PriorityBin::Soon
                } else {
                    PriorityBin::Eventually
                };
                (TilePriority::new(bin, self.resolution, distance), false)
            };
            tile.set_priority(inputs.tree, priority);
            tile.set_occluded(inputs.tree, occluded);

            if inputs.tree == TreeKind::Pending {
                let required = requires
                    && priority.bin == PriorityBin::Now
                    && match inputs.activation {
                        ActivationRule::NotRequired => false,
                        ActivationRule::AllVisible => true,
                        ActivationRule::UnsharedVisible => !tile.is_shared(),
                    };
                tile.set_required_for_activation(required);
            }
        }
    }

    /// Pending tiles take on their active role
    pub fn did_become_active(&self) {
        for tile in self.tiles.values() {
            tile.did_become_active();
        }
    }

    /// Walk the cells covering `dest_rect` given in `dest_scale` space
    pub fn coverage(&self, dest_rect: Rect, dest_scale: f32) -> CoverageIter<'_> {
        let dest_to_content = self.contents_scale / dest_scale;
        let content_rect = dest_rect.scale_to_enclosing(dest_to_content);
        let range = self.data.cell_range(content_rect);
        CoverageIter {
            grid: self,
            dest_rect,
            dest_to_content,
            range,
            next: range.map(|(first, _)| first).unwrap_or_default(),
        }
    }
}

impl Drop for TileGrid {
    fn drop(&mut self) {
        if !self.tiles.is_empty() {
            tracing::debug!(
                contents_scale = self.contents_scale,
                tiles = self.tiles.len(),
                "destroying tiling"
            );
        }
        for tile in self.tiles.values() {
            tile.set_shared(false);
        }
    }
}

impl fmt::Debug for TileGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileGrid")
            .field("contents_scale", &self.contents_scale)
            .field("resolution", &self.resolution)
            .field("tile_size", &self.data.tile_size())
            .field("tiling_rect", &self.tiling_rect())
            .field("live_tiles_rect", &self.live_tiles_rect)
            .field("tiles", &self.tiles.len())
            .finish()
    }
}
