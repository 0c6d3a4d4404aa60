//! Tiling Diagnostics
//!
//! Serializable snapshot of a layer's grids and tiles for inspection tools.

use serde::Serialize;

use crate::geometry::{Rect, Size};
use crate::priority::{TilePriority, TileResolution, TreeKind};
use crate::tile::{Tile, TileCoord, TileId};
use crate::tile_grid::TileGrid;
use crate::tiling_set::TilingSet;

/// One tile
#[derive(Debug, Clone, Serialize)]
pub struct TileDiagnostics {
    pub id: TileId,
    pub coord: TileCoord,
    pub content_rect: Rect,
    pub shared: bool,
    pub required_for_activation: bool,
    pub ready_to_draw: bool,
    pub raster_in_flight: bool,
    pub occluded: [bool; 2],
    /// Indexed by tree (pending, active)
    pub priority: [TilePriority; 2],
    pub bytes: usize,
}

impl TileDiagnostics {
    fn from_tile(tile: &Tile) -> Self {
        let trees = [TreeKind::Pending, TreeKind::Active];
        Self {
            id: tile.id(),
            coord: tile.coord(),
            content_rect: tile.content_rect(),
            shared: tile.is_shared(),
            required_for_activation: tile.required_for_activation(),
            ready_to_draw: tile.is_ready_to_draw(),
            raster_in_flight: tile.is_raster_in_flight(),
            occluded: trees.map(|tree| tile.is_occluded(tree)),
            priority: trees.map(|tree| tile.priority(tree)),
            bytes: tile.bytes_if_allocated(),
        }
    }
}

/// One grid
#[derive(Debug, Clone, Serialize)]
pub struct TilingDiagnostics {
    pub contents_scale: f32,
    pub resolution: TileResolution,
    pub tile_size: Size,
    pub live_tiles_rect: Rect,
    pub tiles: Vec<TileDiagnostics>,
}

impl TilingDiagnostics {
    fn from_grid(grid: &TileGrid) -> Self {
        Self {
            contents_scale: grid.contents_scale(),
            resolution: grid.resolution(),
            tile_size: grid.tile_size(),
            live_tiles_rect: grid.live_tiles_rect(),
            tiles: grid
                .all_tiles()
                .iter()
                .map(|tile| TileDiagnostics::from_tile(tile))
                .collect(),
        }
    }
}

/// Every grid of a tiling set, highest scale first
#[derive(Debug, Clone, Serialize)]
pub struct TilingSetDiagnostics {
    pub tree: TreeKind,
    pub ideal_contents_scale: f32,
    pub raster_contents_scale: f32,
    pub low_res_raster_contents_scale: f32,
    pub tilings: Vec<TilingDiagnostics>,
}

impl TilingSetDiagnostics {
    pub fn from_set(set: &TilingSet) -> Self {
        let scales = set.scales();
        Self {
            tree: set.tree(),
            ideal_contents_scale: scales.ideal_contents_scale(),
            raster_contents_scale: scales.raster_contents_scale(),
            low_res_raster_contents_scale: scales.low_res_raster_contents_scale(),
            tilings: set.tilings().iter().map(TilingDiagnostics::from_grid).collect(),
        }
    }

    pub fn num_tiles(&self) -> usize {
        self.tilings.iter().map(|tiling| tiling.tiles.len()).sum()
    }

    /// Tiles that hold a resource
    pub fn resident_bytes(&self) -> usize {
        self.tilings
            .iter()
            .flat_map(|tiling| &tiling.tiles)
            .map(|tile| tile.bytes)
            .sum()
    }
}
