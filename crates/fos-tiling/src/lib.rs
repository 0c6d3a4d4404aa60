//! fOS Tiling
//!
//! Multi-resolution tile cache for compositor picture layers.
//!
//! # Features
//! - Per-layer grids at several contents scales (HIGH, LOW, NON_IDEAL)
//! - Pending/active layer trees with tile sharing between twins
//! - Raster and eviction priority queues, single-layer or host-wide
//! - Memory assignment under soft/hard byte budgets
//!
//! # Example
//! ```rust,ignore
//! use fos_tiling::{LayerTreeHost, TilingSettings, LayerId, LayerProperties};
//!
//! let mut host = LayerTreeHost::new(TilingSettings::default())?;
//! host.commit_layer(LayerId(1), LayerProperties::new(bounds), source, &Region::new())?;
//! host.activate()?;
//! host.update_tiles(TreeKind::Active, LayerId(1), &draw, &NoOcclusion, false)?;
//! for tile in host.raster_queue_all(false) {
//!     RasterTask::new(&tile).run_and_complete();
//! }
//! ```

pub mod config;
pub mod content_source;
pub mod diagnostics;
pub mod error;
pub mod eviction_queue;
pub mod geometry;
pub mod layer;
pub mod layer_tree;
pub mod memory;
pub mod occlusion;
pub mod priority;
mod queue;
pub mod raster;
pub mod raster_queue;
pub mod scale_selector;
pub mod tile;
pub mod tile_grid;
pub mod tile_sizing;
pub mod tiling_set;

pub use config::{HostState, TilingSettings};
pub use content_source::{Color, ContentSource, RecordedContent};
pub use diagnostics::TilingSetDiagnostics;
pub use error::{Result, TilingError};
pub use eviction_queue::EvictionPriorityQueue;
pub use geometry::{Rect, Region, Size};
pub use layer::{DrawProperties, LayerProperties, PictureLayer};
pub use layer_tree::{LayerId, LayerTree, LayerTreeHost};
pub use memory::{MemoryAssignment, MemoryLimitPolicy, MemoryPolicy, MemoryUsage};
pub use occlusion::{NoOcclusion, OcclusionSource, OcclusionTracker};
pub use priority::{PriorityBin, TilePriority, TileResolution, TreeKind, TreePriority};
pub use raster::{RasterCompletion, RasterOutput, RasterTask};
pub use raster_queue::RasterPriorityQueue;
pub use scale_selector::{IdealScales, ScaleSelector};
pub use tile::{DrawInfo, Resource, Tile, TileCoord, TileId};
pub use tile_grid::{ActivationRule, TileGrid};
pub use tiling_set::{TilingContext, TilingSet};
