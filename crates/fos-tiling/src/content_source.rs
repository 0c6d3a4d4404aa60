//! Content Source
//!
//! The immutable recording a layer is rasterized from. A commit hands the
//! pending layer a new snapshot; grids and tiles only ever hold shared
//! references to it.

use std::fmt;

use crate::geometry::{Rect, Size};

/// Color in RGBA
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Read-only recorded content of one layer
pub trait ContentSource: fmt::Debug {
    /// Layer-space bounds of the recording
    fn bounds(&self) -> Size;

    /// Anything was recorded at all
    fn has_recordings(&self) -> bool;

    /// Recorded content intersects `layer_rect`
    fn has_recording_in(&self, layer_rect: Rect) -> bool;

    /// The whole layer is one opaque color
    fn solid_color(&self) -> Option<Color>;

    /// Rasterize `content_rect` (content space at `contents_scale`) to RGBA8
    fn raster(&self, content_rect: Rect, contents_scale: f32) -> Vec<u8>;
}

/// Recorded filled rects, the minimal display list a layer can carry
#[derive(Debug, Clone, Default)]
pub struct RecordedContent {
    bounds: Size,
    recorded: Vec<(Rect, Color)>,
    solid_color: Option<Color>,
    has_recordings: bool,
}

impl RecordedContent {
    /// Content recorded over the whole layer
    pub fn filled(bounds: Size, color: Color) -> Self {
        let mut content = Self::empty(bounds);
        content.record(Rect::from_size(bounds), color);
        content
    }

    /// Nothing recorded
    pub fn empty(bounds: Size) -> Self {
        Self {
            bounds,
            ..Default::default()
        }
    }

    /// Claims recordings but none of them intersect any cell
    pub fn empty_with_recordings(bounds: Size) -> Self {
        Self {
            bounds,
            has_recordings: true,
            ..Default::default()
        }
    }

    /// A single solid color over the whole layer
    pub fn solid(bounds: Size, color: Color) -> Self {
        let mut content = Self::filled(bounds, color);
        content.solid_color = Some(color);
        content
    }

    /// Record a filled rect (clipped to the bounds)
    pub fn record(&mut self, rect: Rect, color: Color) {
        let clipped = rect.intersect(&Rect::from_size(self.bounds));
        if clipped.is_empty() {
            return;
        }
        self.recorded.push((clipped, color));
        self.has_recordings = true;
        self.solid_color = None;
    }

    /// Builder form of [`record`](Self::record)
    pub fn with_rect(mut self, rect: Rect, color: Color) -> Self {
        self.record(rect, color);
        self
    }
}

impl ContentSource for RecordedContent {
    fn bounds(&self) -> Size {
        self.bounds
    }

    fn has_recordings(&self) -> bool {
        self.has_recordings
    }

    fn has_recording_in(&self, layer_rect: Rect) -> bool {
        self.recorded.iter().any(|(r, _)| r.intersects(&layer_rect))
    }

    fn solid_color(&self) -> Option<Color> {
        self.solid_color
    }

    fn raster(&self, content_rect: Rect, contents_scale: f32) -> Vec<u8> {
        let width = content_rect.width.max(0) as usize;
        let height = content_rect.height.max(0) as usize;
        let mut pixels = vec![0u8; width * height * 4];

        // Later recordings paint over earlier ones
        for (layer_rect, color) in &self.recorded {
            let painted = layer_rect
                .scale_to_enclosing(contents_scale)
                .intersect(&content_rect);
            if painted.is_empty() {
                continue;
            }
            let bytes = color.to_bytes();
            for y in painted.y..painted.bottom() {
                let row = (y - content_rect.y) as usize;
                for x in painted.x..painted.right() {
                    let offset = (row * width + (x - content_rect.x) as usize) * 4;
                    pixels[offset..offset + 4].copy_from_slice(&bytes);
                }
            }
        }
        pixels
    }
}
