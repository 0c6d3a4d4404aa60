//! Tile Sizing
//!
//! Tile size policy per layer, and the index math mapping content-space rects
//! to grid cells.

use crate::config::{HostState, TilingSettings};
use crate::geometry::{Rect, Size};
use crate::tile::TileCoord;

fn round_up(value: i32, multiple: i32) -> i32 {
    if multiple <= 0 {
        return value;
    }
    (value + multiple - 1) / multiple * multiple
}

/// Tile size for a layer whose content (at the raster scale) has `content_bounds`
pub fn calculate_tile_size(
    content_bounds: Size,
    settings: &TilingSettings,
    host: &HostState,
    is_mask: bool,
) -> Size {
    let max_texture = host.max_texture_size;

    // Masks are drawn as a single tile or not at all
    if is_mask {
        if content_bounds.width > max_texture || content_bounds.height > max_texture {
            return Size::default();
        }
        return content_bounds;
    }

    let mut default_size;
    if host.use_gpu_rasterization {
        let viewport = host.viewport_size;
        let mut divisor = 4;
        if content_bounds.width <= viewport.width / 2 {
            divisor = 2;
        }
        if content_bounds.width <= viewport.width / 4 {
            divisor = 1;
        }
        let height = round_up(viewport.height, divisor) / divisor + 2 * settings.gpu_tile_border;
        default_size = Size::new(viewport.width, height.max(settings.min_gpu_tile_height));
    } else {
        let untiled = settings.max_untiled_layer_size;
        default_size = settings.default_tile_size;

        // Narrow content grows tiles vertically, short content horizontally
        if content_bounds.width < default_size.width {
            default_size.height = untiled.height;
        }
        if content_bounds.height < default_size.height {
            default_size.width = untiled.width;
        }
        if content_bounds.width < untiled.width && content_bounds.height < untiled.height {
            default_size = untiled;
        }
    }

    let mut tile_size = default_size;
    if content_bounds.width < default_size.width {
        tile_size.width = round_up(tile_size.width.min(content_bounds.width), settings.tile_round_up)
            .min(default_size.width);
    }
    if content_bounds.height < default_size.height {
        tile_size.height =
            round_up(tile_size.height.min(content_bounds.height), settings.tile_round_up)
                .min(default_size.height);
    }

    tile_size.min(Size::new(max_texture, max_texture))
}

/// Grid index math for one tiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingData {
    tile_size: Size,
    tiling_size: Size,
}

impl TilingData {
    /// `tiling_size` is the content bounds at the grid's scale
    pub fn new(tile_size: Size, tiling_size: Size) -> Self {
        Self {
            tile_size,
            tiling_size,
        }
    }

    pub fn tile_size(&self) -> Size {
        self.tile_size
    }

    pub fn tiling_size(&self) -> Size {
        self.tiling_size
    }

    /// Whole grid in content space
    pub fn tiling_rect(&self) -> Rect {
        Rect::from_size(self.tiling_size)
    }

    fn num_tiles(extent: i32, tile: i32) -> i32 {
        if extent <= 0 || tile <= 0 {
            return 0;
        }
        (extent + tile - 1) / tile
    }

    pub fn num_tiles_x(&self) -> i32 {
        Self::num_tiles(self.tiling_size.width, self.tile_size.width)
    }

    pub fn num_tiles_y(&self) -> i32 {
        Self::num_tiles(self.tiling_size.height, self.tile_size.height)
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.col >= 0
            && coord.row >= 0
            && coord.col < self.num_tiles_x()
            && coord.row < self.num_tiles_y()
    }

    /// Content rect of a cell, clipped to the tiling
    pub fn tile_bounds(&self, coord: TileCoord) -> Rect {
        let cell = Rect::new(
            coord.col * self.tile_size.width,
            coord.row * self.tile_size.height,
            self.tile_size.width,
            self.tile_size.height,
        );
        cell.intersect(&self.tiling_rect())
    }

    /// Inclusive (first, last) cell coordinates covering `rect`, or None when
    /// it misses the grid
    pub fn cell_range(&self, rect: Rect) -> Option<(TileCoord, TileCoord)> {
        let clipped = rect.intersect(&self.tiling_rect());
        if clipped.is_empty() || self.tile_size.is_empty() {
            return None;
        }
        let first = TileCoord::new(
            clipped.x / self.tile_size.width,
            clipped.y / self.tile_size.height,
        );
        let last = TileCoord::new(
            (clipped.right() - 1) / self.tile_size.width,
            (clipped.bottom() - 1) / self.tile_size.height,
        );
        Some((first, last))
    }

    /// Cells covering `rect` in row-major order
    pub fn coords_covering(&self, rect: Rect) -> Vec<TileCoord> {
        let Some((first, last)) = self.cell_range(rect) else {
            return Vec::new();
        };
        let mut coords = Vec::new();
        for row in first.row..=last.row {
            for col in first.col..=last.col {
                coords.push(TileCoord::new(col, row));
            }
        }
        coords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_settings() -> TilingSettings {
        TilingSettings {
            default_tile_size: Size::new(100, 100),
            max_untiled_layer_size: Size::new(200, 200),
            ..TilingSettings::default()
        }
    }

    #[test]
    fn test_cpu_tile_sizes() {
        let settings = small_settings();
        let host = HostState {
            viewport_size: Size::new(1000, 1000),
            ..HostState::default()
        };
        let size = |w, h| calculate_tile_size(Size::new(w, h), &settings, &host, false);

        assert_eq!(size(10000, 10000), Size::new(100, 100));
        assert_eq!(size(42, 42), Size::new(64, 64));
        assert_eq!(size(191, 191), Size::new(192, 192));
        assert_eq!(size(199, 199), Size::new(200, 200));
    }

    #[test]
    fn test_gpu_tile_sizes() {
        let settings = small_settings();
        let mut host = HostState {
            viewport_size: Size::new(2000, 2000),
            use_gpu_rasterization: true,
            ..HostState::default()
        };
        assert_eq!(
            calculate_tile_size(Size::new(10000, 10000), &settings, &host, false),
            Size::new(2000, 502)
        );

        host.viewport_size = Size::new(1000, 1000);
        let size = |w, h| calculate_tile_size(Size::new(w, h), &settings, &host, false);
        assert_eq!(size(447, 10000), Size::new(448, 502));
        assert_eq!(size(447, 400), Size::new(448, 448));
        assert_eq!(size(500, 499), Size::new(512, 502));
    }

    #[test]
    fn test_mask_tile_size() {
        let settings = TilingSettings::default();
        let host = HostState {
            max_texture_size: 140,
            ..HostState::default()
        };
        assert_eq!(
            calculate_tile_size(Size::new(100, 120), &settings, &host, true),
            Size::new(100, 120)
        );
        assert!(calculate_tile_size(Size::new(150, 10), &settings, &host, true).is_empty());
    }

    #[test]
    fn test_tiling_data_cells() {
        let data = TilingData::new(Size::new(100, 100), Size::new(250, 400));
        assert_eq!(data.num_tiles_x(), 3);
        assert_eq!(data.num_tiles_y(), 4);
        assert_eq!(data.tile_bounds(TileCoord::new(2, 0)), Rect::new(200, 0, 50, 100));

        let coords = data.coords_covering(Rect::new(150, 50, 60, 100));
        assert_eq!(
            coords,
            vec![
                TileCoord::new(1, 0),
                TileCoord::new(2, 0),
                TileCoord::new(1, 1),
                TileCoord::new(2, 1),
            ]
        );
        assert!(data.coords_covering(Rect::new(300, 0, 10, 10)).is_empty());
    }

    #[test]
    fn test_empty_tile_size_has_no_cells() {
        let data = TilingData::new(Size::new(0, 0), Size::new(250, 400));
        assert_eq!(data.num_tiles_x(), 0);
        assert_eq!(data.cell_range(Rect::new(0, 0, 100, 100)), None);
        assert!(data.coords_covering(Rect::new(0, 0, 100, 100)).is_empty());
    }
}
