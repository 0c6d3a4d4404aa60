//! Tile Occlusion
//!
//! Occlusion predicate consumed by priority updates. A tile is occluded for a
//! tree when opaque content drawn above the layer fully covers it.

use std::cell::Cell;

use crate::geometry::Rect;
use crate::priority::TreeKind;

/// Answers "is this layer-space rect hidden on `tree`"
pub trait OcclusionSource {
    fn is_occluded(&self, layer_rect: Rect, tree: TreeKind) -> bool;
}

/// Nothing is ever occluded
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOcclusion;

impl OcclusionSource for NoOcclusion {
    fn is_occluded(&self, _layer_rect: Rect, _tree: TreeKind) -> bool {
        false
    }
}

/// Occlusion statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OcclusionStats {
    pub queries: u64,
    pub occluded: u64,
}

impl OcclusionStats {
    pub fn occluded_ratio(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            self.occluded as f64 / self.queries as f64
        }
    }
}

/// Opaque rects above the layer, per tree
#[derive(Debug, Default)]
pub struct OcclusionTracker {
    /// Opaque occluders in layer space, indexed by tree
    occluders: [Vec<Rect>; 2],
    queries: Cell<u64>,
    occluded: Cell<u64>,
}

impl OcclusionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an opaque occluder on one tree
    pub fn add_occluder(&mut self, tree: TreeKind, rect: Rect) {
        if !rect.is_empty() {
            self.occluders[tree.index()].push(rect);
        }
    }

    /// Add an opaque occluder on both trees
    pub fn add_occluder_to_both(&mut self, rect: Rect) {
        self.add_occluder(TreeKind::Pending, rect);
        self.add_occluder(TreeKind::Active, rect);
    }

    /// Drop every occluder
    pub fn clear(&mut self) {
        for rects in &mut self.occluders {
            rects.clear();
        }
    }

    pub fn stats(&self) -> OcclusionStats {
        OcclusionStats {
            queries: self.queries.get(),
            occluded: self.occluded.get(),
        }
    }
}

impl OcclusionSource for OcclusionTracker {
    fn is_occluded(&self, layer_rect: Rect, tree: TreeKind) -> bool {
        self.queries.set(self.queries.get() + 1);
        let hidden = self.occluders[tree.index()]
            .iter()
            .any(|occluder| occluder.contains_rect(&layer_rect));
        if hidden {
            self.occluded.set(self.occluded.get() + 1);
        }
        hidden
    }
}
