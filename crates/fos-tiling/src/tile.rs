//! Tiles
//!
//! One cache entry: a rect of a layer at one contents scale, an optional
//! raster resource, and per-tree priority state. Tiles are reference counted
//! so the pending and active grids can hold the same tile; all mutable state
//! lives in cells because either owner may update it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::content_source::{Color, ContentSource};
use crate::geometry::{Rect, Size};
use crate::priority::{TilePriority, TreeKind};
use crate::raster::RasterOutput;

static NEXT_TILE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique tile identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileId(pub u64);

impl TileId {
    fn next() -> Self {
        TileId(NEXT_TILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Tile grid coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoord {
    pub col: i32,
    pub row: i32,
}

impl TileCoord {
    pub fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

/// Rasterized pixels attached to a tile
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: u64,
    pub size: Size,
    /// RGBA8 pixels
    pub pixels: Arc<Vec<u8>>,
}

impl Resource {
    pub fn new(size: Size, pixels: Vec<u8>) -> Self {
        Self {
            id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
            size,
            pixels: Arc::new(pixels),
        }
    }

    /// Memory held by the resource
    pub fn bytes(&self) -> usize {
        self.size.area() as usize * 4
    }
}

/// What a tile can currently draw
#[derive(Debug, Clone, Default)]
pub enum DrawInfo {
    /// Not ready
    #[default]
    None,
    Resource(Resource),
    /// Rasterization found a single color; no memory held
    SolidColor(Color),
}

/// Proof that a raster job was started against a given tile generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterTicket {
    pub tile: TileId,
    pub generation: u64,
}

/// A cache entry at one scale
pub struct Tile {
    id: TileId,
    coord: TileCoord,
    content_rect: Rect,
    contents_scale: f32,
    source: Rc<dyn ContentSource>,
    /// Indexed by `TreeKind::index`
    priorities: [Cell<TilePriority>; 2],
    occluded: [Cell<bool>; 2],
    required_for_activation: Cell<bool>,
    shared: Cell<bool>,
    draw_info: RefCell<DrawInfo>,
    /// Bumped whenever resources are dropped so stale raster results are rejected
    generation: Cell<u64>,
    raster_in_flight: Cell<bool>,
}

impl Tile {
    /// Create a tile covering `content_rect` at `contents_scale`
    pub fn new(
        coord: TileCoord,
        content_rect: Rect,
        contents_scale: f32,
        source: Rc<dyn ContentSource>,
    ) -> Self {
        Self {
            id: TileId::next(),
            coord,
            content_rect,
            contents_scale,
            source,
            priorities: [
                Cell::new(TilePriority::default()),
                Cell::new(TilePriority::default()),
            ],
            occluded: [Cell::new(false), Cell::new(false)],
            required_for_activation: Cell::new(false),
            shared: Cell::new(false),
            draw_info: RefCell::new(DrawInfo::None),
            generation: Cell::new(0),
            raster_in_flight: Cell::new(false),
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Rect in content space
    pub fn content_rect(&self) -> Rect {
        self.content_rect
    }

    pub fn contents_scale(&self) -> f32 {
        self.contents_scale
    }

    /// Layer-space rect enclosing this tile
    pub fn layer_rect(&self) -> Rect {
        self.content_rect.scale_to_enclosing(1.0 / self.contents_scale)
    }

    /// Content snapshot this tile rasterizes from
    pub fn source(&self) -> &Rc<dyn ContentSource> {
        &self.source
    }

    // ------------------------------------------------------------------------
    // Priority state
    // ------------------------------------------------------------------------

    pub fn priority(&self, tree: TreeKind) -> TilePriority {
        self.priorities[tree.index()].get()
    }

    pub fn set_priority(&self, tree: TreeKind, priority: TilePriority) {
        self.priorities[tree.index()].set(priority);
    }

    pub fn is_occluded(&self, tree: TreeKind) -> bool {
        self.occluded[tree.index()].get()
    }

    pub fn set_occluded(&self, tree: TreeKind, occluded: bool) {
        self.occluded[tree.index()].set(occluded);
    }

    /// Higher of the two tree priorities and the tree it belongs to; ties
    /// go to the active tree
    pub fn combined_priority(&self) -> (TreeKind, TilePriority) {
        let pending = self.priority(TreeKind::Pending);
        let active = self.priority(TreeKind::Active);
        if pending.is_higher_priority_than(&active) {
            (TreeKind::Pending, pending)
        } else {
            (TreeKind::Active, active)
        }
    }

    pub fn required_for_activation(&self) -> bool {
        self.required_for_activation.get()
    }

    pub fn set_required_for_activation(&self, required: bool) {
        self.required_for_activation.set(required);
    }

    /// Both trees reference this tile
    pub fn is_shared(&self) -> bool {
        self.shared.get()
    }

    pub fn set_shared(&self, shared: bool) {
        self.shared.set(shared);
    }

    /// Pending state becomes active state
    pub fn did_become_active(&self) {
        self.set_priority(TreeKind::Active, self.priority(TreeKind::Pending));
        self.set_priority(TreeKind::Pending, TilePriority::default());
        self.set_occluded(TreeKind::Active, self.is_occluded(TreeKind::Pending));
        self.set_occluded(TreeKind::Pending, false);
        self.required_for_activation.set(false);
        self.shared.set(false);
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    pub fn draw_info(&self) -> DrawInfo {
        self.draw_info.borrow().clone()
    }

    /// Holds pixel memory
    pub fn has_resource(&self) -> bool {
        matches!(*self.draw_info.borrow(), DrawInfo::Resource(_))
    }

    /// Can be drawn without further raster work
    pub fn is_ready_to_draw(&self) -> bool {
        !matches!(*self.draw_info.borrow(), DrawInfo::None)
    }

    pub fn is_raster_in_flight(&self) -> bool {
        self.raster_in_flight.get()
    }

    /// Not ready and nothing outstanding
    pub fn needs_raster(&self) -> bool {
        !self.is_ready_to_draw() && !self.raster_in_flight.get()
    }

    /// Bytes currently held by the tile
    pub fn bytes_if_allocated(&self) -> usize {
        match &*self.draw_info.borrow() {
            DrawInfo::Resource(resource) => resource.bytes(),
            _ => 0,
        }
    }

    /// Bytes a raster of this tile would need
    pub fn bytes_required(&self) -> usize {
        self.content_rect.size().area() as usize * 4
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Mark raster work as outstanding and hand out a ticket for it
    pub fn begin_raster(&self) -> RasterTicket {
        self.raster_in_flight.set(true);
        RasterTicket {
            tile: self.id,
            generation: self.generation.get(),
        }
    }

    /// Attach raster output; returns false when the ticket is stale
    pub fn complete_raster(&self, ticket: RasterTicket, output: RasterOutput) -> bool {
        if ticket.tile != self.id || ticket.generation != self.generation.get() {
            tracing::trace!(tile = self.id.0, "discarding stale raster result");
            return false;
        }
        let info = match output {
            RasterOutput::SolidColor(color) => DrawInfo::SolidColor(color),
            RasterOutput::Pixels { size, pixels } => DrawInfo::Resource(Resource::new(size, pixels)),
        };
        *self.draw_info.borrow_mut() = info;
        self.raster_in_flight.set(false);
        true
    }

    /// Drop pixels and invalidate outstanding raster work; returns bytes freed
    pub fn release_resources(&self) -> usize {
        let freed = self.bytes_if_allocated();
        *self.draw_info.borrow_mut() = DrawInfo::None;
        self.generation.set(self.generation.get() + 1);
        self.raster_in_flight.set(false);
        freed
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("id", &self.id)
            .field("coord", &self.coord)
            .field("content_rect", &self.content_rect)
            .field("contents_scale", &self.contents_scale)
            .field("shared", &self.shared.get())
            .field("required_for_activation", &self.required_for_activation.get())
            .field("ready", &self.is_ready_to_draw())
            .finish()
    }
}
