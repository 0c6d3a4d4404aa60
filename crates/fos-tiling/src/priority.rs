//! Tile Priority
//!
//! Per-tree tile priorities and the comparable keys that order the raster
//! and eviction traversals. Keys are plain values built by pure functions so
//! the queues only ever compare tuples.

use std::cmp::{Ordering, Reverse};

use serde::{Deserialize, Serialize};

use crate::tile::{Tile, TileCoord};

// ============================================================================
// Trees
// ============================================================================

/// Which of the two double-buffered trees a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeKind {
    Pending = 0,
    Active = 1,
}

impl TreeKind {
    /// Slot index for per-tree arrays
    pub fn index(self) -> usize {
        self as usize
    }

    /// The other tree
    pub fn twin(self) -> TreeKind {
        match self {
            TreeKind::Pending => TreeKind::Active,
            TreeKind::Active => TreeKind::Pending,
        }
    }
}

// ============================================================================
// Priority
// ============================================================================

/// Coarse urgency bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriorityBin {
    /// Visible now
    Now = 0,
    /// Close to the viewport
    Soon = 1,
    /// Anywhere else in the interest area
    Eventually = 2,
}

/// Resolution class of the grid a tile belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TileResolution {
    High = 0,
    Low = 1,
    NonIdeal = 2,
}

/// Priority of a tile for one tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TilePriority {
    pub bin: PriorityBin,
    pub resolution: TileResolution,
    /// Screen-space distance to the visible rect (0 when visible)
    pub distance_to_visible: f32,
}

impl TilePriority {
    pub fn new(bin: PriorityBin, resolution: TileResolution, distance_to_visible: f32) -> Self {
        Self {
            bin,
            resolution,
            distance_to_visible,
        }
    }

    /// Order used by the raster traversal (smaller is more important)
    pub fn compare(&self, other: &TilePriority) -> Ordering {
        self.bin
            .cmp(&other.bin)
            .then(self.resolution.cmp(&other.resolution))
            .then(self.distance_to_visible.total_cmp(&other.distance_to_visible))
    }

    pub fn is_higher_priority_than(&self, other: &TilePriority) -> bool {
        self.compare(other) == Ordering::Less
    }
}

impl Default for TilePriority {
    fn default() -> Self {
        Self::new(PriorityBin::Eventually, TileResolution::NonIdeal, f32::INFINITY)
    }
}

/// Which tree governs a tile that both trees reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreePriority {
    /// The more visible of the two priorities wins
    #[default]
    SamePriorityForBothTrees,
    /// Active tree wins
    SmoothnessTakesPriority,
    /// Pending tree wins
    NewContentTakesPriority,
}

impl TreePriority {
    /// Tree whose priority orders `tile`; `owner` is the tree asking.
    /// A shared tile the pending tree needs for activation is always ordered
    /// by the pending tree, so no mode can hide it from raster.
    pub fn governing_tree(self, tile: &Tile, owner: TreeKind) -> TreeKind {
        if !tile.is_shared() {
            return owner;
        }
        if tile.required_for_activation() {
            return TreeKind::Pending;
        }
        match self {
            TreePriority::SmoothnessTakesPriority => TreeKind::Active,
            TreePriority::NewContentTakesPriority => TreeKind::Pending,
            TreePriority::SamePriorityForBothTrees => tile.combined_priority().0,
        }
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Float wrapper with a total order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance(pub f32);

impl Eq for Distance {}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Raster order: most important first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RasterKey {
    pub bin: PriorityBin,
    pub resolution: TileResolution,
    pub distance: Distance,
    pub grid_rank: usize,
    pub coord: (i32, i32),
}

/// Eviction order: least valuable first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EvictionKey {
    /// Tiles needed for activation go last
    pub required: bool,
    pub bin: Reverse<PriorityBin>,
    pub resolution: Reverse<TileResolution>,
    pub grid_rank: usize,
    /// Occluded tiles (false) before unoccluded ones
    pub unoccluded: bool,
    pub distance: Reverse<Distance>,
    pub coord: (i32, i32),
}

fn coord_key(coord: TileCoord) -> (i32, i32) {
    (coord.row, coord.col)
}

/// Raster key of `tile` under `tree`'s priority
pub fn raster_key(tile: &Tile, tree: TreeKind, grid_rank: usize) -> RasterKey {
    let priority = tile.priority(tree);
    RasterKey {
        bin: priority.bin,
        resolution: priority.resolution,
        distance: Distance(priority.distance_to_visible),
        grid_rank,
        coord: coord_key(tile.coord()),
    }
}

/// Eviction key of `tile` under `tree`'s priority
pub fn eviction_key(tile: &Tile, tree: TreeKind, grid_rank: usize) -> EvictionKey {
    let priority = tile.priority(tree);
    EvictionKey {
        required: tile.required_for_activation(),
        bin: Reverse(priority.bin),
        resolution: Reverse(priority.resolution),
        grid_rank,
        unoccluded: !tile.is_occluded(tree),
        distance: Reverse(Distance(priority.distance_to_visible)),
        coord: coord_key(tile.coord()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        let now_high = TilePriority::new(PriorityBin::Now, TileResolution::High, 0.0);
        let now_low = TilePriority::new(PriorityBin::Now, TileResolution::Low, 0.0);
        let soon_high = TilePriority::new(PriorityBin::Soon, TileResolution::High, 10.0);
        let soon_far = TilePriority::new(PriorityBin::Soon, TileResolution::High, 200.0);

        assert!(now_high.is_higher_priority_than(&now_low));
        assert!(now_low.is_higher_priority_than(&soon_high));
        assert!(soon_high.is_higher_priority_than(&soon_far));
        assert!(!soon_far.is_higher_priority_than(&soon_far));
        assert!(soon_far.is_higher_priority_than(&TilePriority::default()));
    }

    #[test]
    fn test_distance_total_order() {
        assert!(Distance(1.0) < Distance(2.0));
        assert!(Distance(2.0) < Distance(f32::INFINITY));
        assert_eq!(Distance(0.0).cmp(&Distance(0.0)), Ordering::Equal);
    }

    #[test]
    fn test_required_tile_governed_by_pending() {
        use std::rc::Rc;

        use crate::content_source::{Color, ContentSource, RecordedContent};
        use crate::geometry::{Rect, Size};

        let source: Rc<dyn ContentSource> =
            Rc::new(RecordedContent::filled(Size::new(100, 100), Color::WHITE));
        let tile = Tile::new(TileCoord::new(0, 0), Rect::new(0, 0, 100, 100), 1.0, source);
        tile.set_shared(true);
        tile.set_priority(
            TreeKind::Active,
            TilePriority::new(PriorityBin::Now, TileResolution::NonIdeal, 0.0),
        );
        tile.set_priority(
            TreeKind::Pending,
            TilePriority::new(PriorityBin::Soon, TileResolution::High, 10.0),
        );

        let smoothness = TreePriority::SmoothnessTakesPriority;
        assert_eq!(smoothness.governing_tree(&tile, TreeKind::Pending), TreeKind::Active);
        assert_eq!(
            TreePriority::SamePriorityForBothTrees.governing_tree(&tile, TreeKind::Pending),
            TreeKind::Active
        );

        tile.set_required_for_activation(true);
        assert_eq!(smoothness.governing_tree(&tile, TreeKind::Active), TreeKind::Pending);
        assert_eq!(
            TreePriority::SamePriorityForBothTrees.governing_tree(&tile, TreeKind::Active),
            TreeKind::Pending
        );
    }

    #[test]
    fn test_tree_twin() {
        assert_eq!(TreeKind::Pending.twin(), TreeKind::Active);
        assert_eq!(TreeKind::Active.twin(), TreeKind::Pending);
        assert_eq!(TreeKind::Active.index(), 1);
    }
}
