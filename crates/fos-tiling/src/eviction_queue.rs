//! Eviction Priority Queue
//!
//! Resourced tiles in reverse priority, least valuable first. Tiles required
//! for activation come last; within the same bin, resolution and grid,
//! occluded tiles come before visible ones.

use std::rc::Rc;

use crate::priority::{EvictionKey, TreeKind, TreePriority, eviction_key};
use crate::queue::{TileMerge, TileStream};
use crate::tile::Tile;
use crate::tiling_set::TilingSet;

/// Lazy eviction-order traversal
pub struct EvictionPriorityQueue {
    merge: TileMerge<EvictionKey>,
}

impl EvictionPriorityQueue {
    /// Traverse one tiling set; shared tiles governed by the twin tree are
    /// left to the twin's queue
    pub fn new(set: &TilingSet, tree_priority: TreePriority) -> Self {
        Self::from_sets([set], tree_priority)
    }

    /// Traverse several sets; every shared tile is visited once
    pub fn from_sets<'a>(
        sets: impl IntoIterator<Item = &'a TilingSet>,
        tree_priority: TreePriority,
    ) -> Self {
        let mut streams = Vec::new();
        let mut rank = 0;
        for set in sets {
            let tree = set.tree();
            for grid in set.tilings() {
                let entries = grid
                    .tiles()
                    .filter(|tile| tile.has_resource())
                    .filter(|tile| tree_priority.governing_tree(tile, tree) == tree)
                    .map(|tile| (eviction_key(tile, tree, rank), Rc::clone(tile)))
                    .collect();
                streams.push(TileStream::new(tree, entries));
                rank += 1;
            }
        }
        Self {
            merge: TileMerge::new(streams),
        }
    }

    /// Most evictable remaining tile
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

    pub fn len(&self) -> usize {
        self.merge.remaining()
    }
}

impl Iterator for EvictionPriorityQueue {
    type Item = Rc<Tile>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}
