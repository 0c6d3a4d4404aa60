//! Raster Hand-off
//!
//! Raster work is produced by an external scheduler and attached to a tile
//! later. A task only holds a weak reference to its tile plus a generation
//! ticket, so a result arriving after the tile was evicted or dropped is
//! discarded instead of attached.

use std::rc::{Rc, Weak};
use std::time::Instant;

use crate::content_source::{Color, ContentSource};
use crate::geometry::{Rect, Size};
use crate::tile::{RasterTicket, Tile, TileId};

/// Output of one raster job
#[derive(Debug, Clone)]
pub enum RasterOutput {
    /// RGBA8 pixels for the tile's content rect
    Pixels { size: Size, pixels: Vec<u8> },
    /// The content was a single color
    SolidColor(Color),
}

/// What happened to a finished raster job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterCompletion {
    /// Output is now the tile's draw info
    Attached,
    /// Tile is gone or its resources were dropped since the job started
    Discarded,
}

/// One scheduled raster job
#[derive(Debug)]
pub struct RasterTask {
    tile: Weak<Tile>,
    tile_id: TileId,
    ticket: RasterTicket,
    content_rect: Rect,
    contents_scale: f32,
    source: Rc<dyn ContentSource>,
}

impl RasterTask {
    /// Start raster work for `tile`
    pub fn new(tile: &Rc<Tile>) -> Self {
        Self {
            tile: Rc::downgrade(tile),
            tile_id: tile.id(),
            ticket: tile.begin_raster(),
            content_rect: tile.content_rect(),
            contents_scale: tile.contents_scale(),
            source: Rc::clone(tile.source()),
        }
    }

    pub fn tile_id(&self) -> TileId {
        self.tile_id
    }

    pub fn ticket(&self) -> RasterTicket {
        self.ticket
    }

    /// Produce pixels for the tile's rect
    pub fn run(&self) -> RasterOutput {
        let start = Instant::now();
        let output = match self.source.solid_color() {
            Some(color) => RasterOutput::SolidColor(color),
            None => RasterOutput::Pixels {
                size: self.content_rect.size(),
                pixels: self.source.raster(self.content_rect, self.contents_scale),
            },
        };
        tracing::trace!(
            tile = self.tile_id.0,
            elapsed_us = start.elapsed().as_micros() as u64,
            "rasterized tile"
        );
        output
    }

    /// Hand the output back to the tile, if it still wants it
    pub fn complete(self, output: RasterOutput) -> RasterCompletion {
        let Some(tile) = self.tile.upgrade() else {
            tracing::trace!(tile = self.tile_id.0, "tile dropped before raster completed");
            return RasterCompletion::Discarded;
        };
        if tile.complete_raster(self.ticket, output) {
            RasterCompletion::Attached
        } else {
            RasterCompletion::Discarded
        }
    }

    /// Run and complete in one step
    pub fn run_and_complete(self) -> RasterCompletion {
        let output = self.run();
        self.complete(output)
    }
}
