//! Tiling Configuration
//!
//! Static tiling policy (`TilingSettings`) and the per-frame facts the host
//! feeds in (`HostState`).

use serde::{Deserialize, Serialize};

use crate::error::{Result, TilingError};
use crate::geometry::Size;
use crate::memory::MemoryPolicy;
use crate::priority::TreePriority;

/// Tiling policy constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingSettings {
    /// Tile size for CPU-rasterized layers
    pub default_tile_size: Size,

    /// Layers below this size get a single tile
    pub max_untiled_layer_size: Size,

    /// Lowest contents scale any grid may use
    pub minimum_contents_scale: f32,

    /// Low-res grid scale relative to the high-res grid
    pub low_res_contents_scale_factor: f32,

    /// Keep a low-res grid alongside the high-res one
    pub create_low_res_tiling: bool,

    /// Page scale ratio a pinch may drift before a new grid is made
    pub max_scale_ratio_during_pinch: f32,

    /// Reuse an existing grid whose scale is within this ratio
    pub snap_to_existing_tiling_ratio: f32,

    /// Tiles within this many screen pixels of the viewport are SOON
    pub soon_border_distance: i32,

    /// Tiles are kept alive within this many screen pixels of the viewport
    pub interest_area_padding: i32,

    /// Tile dimensions clamped to content are rounded up to this multiple
    pub tile_round_up: i32,

    /// Minimum GPU tile height
    pub min_gpu_tile_height: i32,

    /// Border texels on each side of a GPU tile
    pub gpu_tile_border: i32,
}

impl Default for TilingSettings {
    fn default() -> Self {
        Self {
            default_tile_size: Size::new(256, 256),
            max_untiled_layer_size: Size::new(512, 512),
            minimum_contents_scale: 0.0625, // 1/16
            low_res_contents_scale_factor: 0.25,
            create_low_res_tiling: true,
            max_scale_ratio_during_pinch: 2.0,
            snap_to_existing_tiling_ratio: 1.2,
            soon_border_distance: 312,   // screen px
            interest_area_padding: 3000, // screen px
            tile_round_up: 64,
            min_gpu_tile_height: 256,
            gpu_tile_border: 1,
        }
    }
}

impl TilingSettings {
    /// Reject values the scale and tile math cannot work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |what| Err(TilingError::InvalidSettings(what));
        let positive = |size: Size| size.width > 0 && size.height > 0;

        if !positive(self.default_tile_size) {
            return invalid("default_tile_size must be positive");
        }
        if !positive(self.max_untiled_layer_size) {
            return invalid("max_untiled_layer_size must be positive");
        }
        if !(self.minimum_contents_scale.is_finite() && self.minimum_contents_scale > 0.0) {
            return invalid("minimum_contents_scale must be positive");
        }
        if !(self.low_res_contents_scale_factor > 0.0 && self.low_res_contents_scale_factor <= 1.0) {
            return invalid("low_res_contents_scale_factor must be in (0, 1]");
        }
        if !(self.max_scale_ratio_during_pinch.is_finite() && self.max_scale_ratio_during_pinch > 1.0)
        {
            return invalid("max_scale_ratio_during_pinch must be above 1");
        }
        if !(self.snap_to_existing_tiling_ratio.is_finite()
            && self.snap_to_existing_tiling_ratio >= 1.0)
        {
            return invalid("snap_to_existing_tiling_ratio must be at least 1");
        }
        if self.soon_border_distance < 0 || self.interest_area_padding < 0 {
            return invalid("border distances must not be negative");
        }
        if self.min_gpu_tile_height <= 0 || self.gpu_tile_border < 0 {
            return invalid("gpu tile sizes must not be negative");
        }
        Ok(())
    }
}

/// Host facts that change between frames
#[derive(Debug, Clone, PartialEq)]
pub struct HostState {
    /// Device viewport in pixels
    pub viewport_size: Size,

    /// Largest texture dimension the backend supports
    pub max_texture_size: i32,

    /// Rasterize on the GPU (no low-res grids, viewport-wide tiles)
    pub use_gpu_rasterization: bool,

    /// An interactive pinch zoom is in progress
    pub pinch_gesture_active: bool,

    /// Pending tree may not activate until high-res content is ready
    pub requires_high_res_to_draw: bool,

    /// Which tree wins for shared tiles
    pub tree_priority: TreePriority,

    /// Memory budget for tile resources
    pub memory_policy: MemoryPolicy,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            viewport_size: Size::new(1920, 1080),
            max_texture_size: 8192,
            use_gpu_rasterization: false,
            pinch_gesture_active: false,
            requires_high_res_to_draw: false,
            tree_priority: TreePriority::SamePriorityForBothTrees,
            memory_policy: MemoryPolicy::default(),
        }
    }
}
