//! Lazy Tile Merge
//!
//! K-way merge over per-grid tile streams. Each stream is sorted once by its
//! key; the merge only keeps stream heads in a heap, so taking the first few
//! tiles of a traversal costs little more than building the streams.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::priority::TreeKind;
use crate::tile::Tile;

/// Sorted tiles of one grid, keyed under `tree`'s priorities
pub(crate) struct TileStream<K> {
    tree: TreeKind,
    entries: Vec<(K, Rc<Tile>)>,
    cursor: usize,
}

impl<K: Ord + Copy> TileStream<K> {
    pub(crate) fn new(tree: TreeKind, mut entries: Vec<(K, Rc<Tile>)>) -> Self {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            tree,
            entries,
            cursor: 0,
        }
    }

    fn head(&self) -> Option<&(K, Rc<Tile>)> {
        self.entries.get(self.cursor)
    }
}

/// Merge of several streams, smallest key first
pub(crate) struct TileMerge<K> {
    streams: Vec<TileStream<K>>,
    heads: BinaryHeap<Reverse<(K, usize)>>,
}

impl<K: Ord + Copy> TileMerge<K> {
    pub(crate) fn new(streams: Vec<TileStream<K>>) -> Self {
        let heads = streams
            .iter()
            .enumerate()
            .filter_map(|(index, stream)| stream.head().map(|(key, _)| Reverse((*key, index))))
            .collect();
        Self { streams, heads }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Next tile and the tree whose priority placed it
    pub(crate) fn top(&self) -> Option<(&Rc<Tile>, TreeKind)> {
        let Reverse((_, index)) = self.heads.peek()?;
        let stream = &self.streams[*index];
        stream.head().map(|(_, tile)| (tile, stream.tree))
    }

    pub(crate) fn pop(&mut self) -> Option<(Rc<Tile>, TreeKind)> {
        let Reverse((_, index)) = self.heads.pop()?;
        let stream = &mut self.streams[index];
        let entry = stream.head().map(|(_, tile)| (Rc::clone(tile), stream.tree));
        stream.cursor += 1;
        if let Some((key, _)) = stream.head() {
            self.heads.push(Reverse((*key, index)));
        }
        entry
    }

    /// Tiles not yet popped
    pub(crate) fn remaining(&self) -> usize {
        self.streams
            .iter()
            .map(|stream| stream.entries.len() - stream.cursor)
            .sum()
    }
}
