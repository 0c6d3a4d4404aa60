//! Raster Priority Queue
//!
//! Tiles that still need raster work, most important first: NOW before SOON
//! before EVENTUALLY, HIGH before LOW before NON_IDEAL, then nearest to the
//! viewport.

use std::rc::Rc;

use crate::priority::{RasterKey, TileResolution, TreeKind, TreePriority, raster_key};
use crate::queue::{TileMerge, TileStream};
use crate::tile::Tile;
use crate::tiling_set::TilingSet;

/// Lazy raster-order traversal
pub struct RasterPriorityQueue {
    merge: TileMerge<RasterKey>,
}

impl RasterPriorityQueue {
    /// Traverse one tiling set under its own tree's priorities
    pub fn new(set: &TilingSet, include_non_ideal: bool) -> Self {
        Self::build([set], include_non_ideal, None)
    }

    /// Traverse several sets, possibly on both trees; a shared tile is only
    /// visited through the tree `tree_priority` says governs it
    pub fn from_sets<'a>(
        sets: impl IntoIterator<Item = &'a TilingSet>,
        include_non_ideal: bool,
        tree_priority: TreePriority,
    ) -> Self {
        Self::build(sets, include_non_ideal, Some(tree_priority))
    }

    fn build<'a>(
        sets: impl IntoIterator<Item = &'a TilingSet>,
        include_non_ideal: bool,
        tree_priority: Option<TreePriority>,
    ) -> Self {
        let mut streams = Vec::new();
        let mut rank = 0;
        for set in sets {
            let tree = set.tree();
            for grid in set.tilings() {
                let entries = grid
                    .tiles()
                    .filter(|tile| tile.needs_raster())
                    .filter(|tile| {
                        tree_priority.is_none_or(|mode| mode.governing_tree(tile, tree) == tree)
                    })
                    .filter(|tile| {
                        include_non_ideal
                            || tile.priority(tree).resolution != TileResolution::NonIdeal
                    })
                    .map(|tile| (raster_key(tile, tree, rank), Rc::clone(tile)))
                    .collect();
                streams.push(TileStream::new(tree, entries));
                rank += 1;
            }
        }
        Self {
            merge: TileMerge::new(streams),
        }
    }

    /// Most important remaining tile
    pub fn top(&self) -> Option<&Rc<Tile>> {
        self.merge.top().map(|(tile, _)| tile)
    }

    /// Like [`top`](Self::top), with the tree whose priority placed the tile
    pub fn top_with_tree(&self) -> Option<(&Rc<Tile>, TreeKind)> {
        self.merge.top()
    }

    pub fn pop(&mut self) -> Option<Rc<Tile>> {
        self.merge.pop().map(|(tile, _)| tile)
    }

    pub fn pop_with_tree(&mut self) -> Option<(Rc<Tile>, TreeKind)> {
        self.merge.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.merge.is_empty()
    }

    /// Tiles left in the traversal
    pub fn len(&self) -> usize {
        self.merge.remaining()
    }
}

impl Iterator for RasterPriorityQueue {
    type Item = Rc<Tile>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostState, TilingSettings};
    use crate::content_source::{Color, ContentSource, RecordedContent};
    use crate::geometry::{Rect, Region, Size};
    use crate::occlusion::NoOcclusion;
    use crate::priority::{PriorityBin, TreeKind};
    use crate::raster::RasterTask;
    use crate::scale_selector::IdealScales;
    use crate::tile_grid::ActivationRule;
    use crate::tiling_set::TilingContext;

    fn make_set(visible: Rect) -> TilingSet {
        let bounds = Size::new(2000, 2000);
        let settings = TilingSettings::default();
        let host = HostState::default();
        let source: Rc<dyn ContentSource> = Rc::new(RecordedContent::filled(bounds, Color::WHITE));
        let ctx = TilingContext {
            settings: &settings,
            host: &host,
            layer_bounds: bounds,
            is_mask: false,
            fixed_tile_size: None,
            source: &source,
        };
        let mut set = TilingSet::new(TreeKind::Active);
        set.manage_tilings(&IdealScales::uniform(1.0), &ctx).unwrap();
        set.update_tile_priorities(
            visible,
            1.0,
            &NoOcclusion,
            &settings,
            None,
            &Region::new(),
            ActivationRule::NotRequired,
        );
        set
    }

    #[test]
    fn test_raster_order() {
        let set = make_set(Rect::new(0, 0, 500, 500));
        let tiles: Vec<_> = RasterPriorityQueue::new(&set, false).collect();
        assert_eq!(tiles.len(), set.num_tiles());

        let priorities: Vec<_> = tiles.iter().map(|t| t.priority(TreeKind::Active)).collect();
        for pair in priorities.windows(2) {
            assert!(!pair[1].is_higher_priority_than(&pair[0]));
        }
        assert_eq!(priorities[0].bin, PriorityBin::Now);
        assert_eq!(priorities[0].resolution, TileResolution::High);
    }

    #[test]
    fn test_raster_queue_is_deterministic() {
        let set = make_set(Rect::new(300, 300, 700, 400));
        let first: Vec<_> = RasterPriorityQueue::new(&set, true).map(|t| t.id()).collect();
        let second: Vec<_> = RasterPriorityQueue::new(&set, true).map(|t| t.id()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_top_is_idempotent() {
        let set = make_set(Rect::new(0, 0, 500, 500));
        let mut queue = RasterPriorityQueue::new(&set, false);
        let top = queue.top().map(|t| t.id());
        assert_eq!(queue.top().map(|t| t.id()), top);
        assert_eq!(queue.pop().map(|t| t.id()), top);
    }

    #[test]
    fn test_skips_ready_and_in_flight_tiles() {
        let set = make_set(Rect::new(0, 0, 500, 500));
        let total = RasterPriorityQueue::new(&set, false).len();

        let mut queue = RasterPriorityQueue::new(&set, false);
        let first = queue.pop().unwrap();
        let second = queue.pop().unwrap();
        RasterTask::new(&first).run_and_complete();
        let _in_flight = RasterTask::new(&second);

        assert_eq!(RasterPriorityQueue::new(&set, false).len(), total - 2);
    }
}
