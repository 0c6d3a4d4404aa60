//! Raster Scale Selection
//!
//! Tracks the ideal scales a layer is drawn at and picks the raster scale of
//! its HIGH grid (and the LOW grid that goes with it). The raster scale lags
//! the ideal one on purpose during pinch zoom and transform animation so the
//! grids are not rebuilt every frame.

use serde::Serialize;

use crate::tiling_set::TilingContext;

/// Per-frame scale inputs from the host's draw properties
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdealScales {
    /// Overall scale the layer is drawn at
    pub contents_scale: f32,
    pub device_scale: f32,
    pub page_scale: f32,
    /// Largest scale an ongoing animation reaches, 0 when unknown
    pub maximum_animation_contents_scale: f32,
    pub animating_transform: bool,
}

impl IdealScales {
    /// Static scales with no animation
    pub fn new(contents_scale: f32, device_scale: f32, page_scale: f32) -> Self {
        Self {
            contents_scale,
            device_scale,
            page_scale,
            maximum_animation_contents_scale: 0.0,
            animating_transform: false,
        }
    }

    /// Everything at the given scale with device and page scale 1
    pub fn uniform(contents_scale: f32) -> Self {
        Self::new(contents_scale, 1.0, 1.0)
    }

    pub fn animating(mut self, maximum_animation_contents_scale: f32) -> Self {
        self.animating_transform = true;
        self.maximum_animation_contents_scale = maximum_animation_contents_scale;
        self
    }

    /// Scale left over after page and device scale
    pub fn source_scale(&self) -> f32 {
        self.contents_scale / self.page_scale / self.device_scale
    }

    /// Usable for tiling at all
    pub fn is_valid(&self) -> bool {
        let finite_positive = |v: f32| v.is_finite() && v > 0.0;
        finite_positive(self.contents_scale)
            && finite_positive(self.device_scale)
            && finite_positive(self.page_scale)
    }
}

/// Scale-selection state carried by a tiling set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScaleSelector {
    ideal_contents_scale: f32,
    ideal_page_scale: f32,
    ideal_device_scale: f32,
    ideal_source_scale: f32,

    // Zero until the first recalculation
    raster_contents_scale: f32,
    raster_page_scale: f32,
    raster_device_scale: f32,
    raster_source_scale: f32,
    low_res_raster_contents_scale: f32,

    raster_source_scale_is_fixed: bool,
    was_animating_transform: bool,
}

impl ScaleSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ideal_contents_scale(&self) -> f32 {
        self.ideal_contents_scale
    }

    pub fn ideal_page_scale(&self) -> f32 {
        self.ideal_page_scale
    }

    pub fn ideal_source_scale(&self) -> f32 {
        self.ideal_source_scale
    }

    pub fn raster_contents_scale(&self) -> f32 {
        self.raster_contents_scale
    }

    pub fn raster_page_scale(&self) -> f32 {
        self.raster_page_scale
    }

    pub fn raster_source_scale(&self) -> f32 {
        self.raster_source_scale
    }

    pub fn low_res_raster_contents_scale(&self) -> f32 {
        self.low_res_raster_contents_scale
    }

    pub fn raster_source_scale_is_fixed(&self) -> bool {
        self.raster_source_scale_is_fixed
    }

    pub fn was_animating_transform(&self) -> bool {
        self.was_animating_transform
    }

    pub fn has_raster_scales(&self) -> bool {
        self.raster_contents_scale > 0.0
    }

    /// Forget everything, as for a newly created layer
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record this frame's ideal scales, clamped to `minimum_contents_scale`
    pub fn update_ideal(&mut self, ideal: &IdealScales, minimum_contents_scale: f32) {
        self.ideal_contents_scale = ideal.contents_scale.max(minimum_contents_scale);
        self.ideal_page_scale = ideal.page_scale;
        self.ideal_device_scale = ideal.device_scale;
        self.ideal_source_scale = ideal.source_scale().max(minimum_contents_scale);
    }

    /// Remember the animation state seen this frame
    pub fn finish_frame(&mut self, animating: bool) {
        self.was_animating_transform = animating;
    }

    /// Current raster scales are stale for this frame
    pub fn should_adjust(&self, ctx: &TilingContext<'_>, animating: bool) -> bool {
        if !self.has_raster_scales() {
            return true;
        }
        if self.was_animating_transform != animating {
            return true;
        }
        if animating
            && ctx.host.use_gpu_rasterization
            && self.raster_contents_scale != self.ideal_contents_scale
        {
            return true;
        }

        let pinching = ctx.host.pinch_gesture_active;
        if pinching && self.raster_page_scale > 0.0 {
            // Need a lower-res grid, or the current one is too blurry
            let ratio = self.ideal_page_scale / self.raster_page_scale;
            if self.raster_page_scale > self.ideal_page_scale
                || ratio > ctx.settings.max_scale_ratio_during_pinch
            {
                return true;
            }
        }
        if !pinching && self.raster_page_scale != self.ideal_page_scale {
            return true;
        }
        if self.raster_device_scale != self.ideal_device_scale {
            return true;
        }
        !animating
            && !self.raster_source_scale_is_fixed
            && self.raster_source_scale != self.ideal_source_scale
    }

    /// Pick new raster and low-res scales; `existing_scales` are the grids the
    /// set already holds, used for snapping during pinch
    pub fn recalculate(
        &mut self,
        ctx: &TilingContext<'_>,
        ideal: &IdealScales,
        existing_scales: &[f32],
    ) {
        let settings = ctx.settings;
        let old_raster_contents_scale = self.raster_contents_scale;
        let old_raster_page_scale = self.raster_page_scale;
        let old_raster_source_scale = self.raster_source_scale;

        self.raster_device_scale = self.ideal_device_scale;
        self.raster_page_scale = self.ideal_page_scale;
        self.raster_source_scale = self.ideal_source_scale;
        self.raster_contents_scale = self.ideal_contents_scale;

        // A source scale that changes outside of animation stays put at 1
        if !self.raster_source_scale_is_fixed
            && old_raster_source_scale > 0.0
            && !ideal.animating_transform
            && !self.was_animating_transform
            && old_raster_source_scale != self.ideal_source_scale
        {
            self.raster_source_scale_is_fixed = true;
        }
        if self.raster_source_scale_is_fixed {
            self.raster_contents_scale /= self.raster_source_scale;
            self.raster_source_scale = 1.0;
        }

        if ctx.host.pinch_gesture_active && old_raster_contents_scale > 0.0 {
            let ratio = settings.max_scale_ratio_during_pinch;
            let zooming_out = old_raster_page_scale > self.ideal_page_scale;
            let mut desired = old_raster_contents_scale;
            if !(ratio.is_finite() && ratio > 1.0) {
                desired = self.ideal_contents_scale;
            } else if zooming_out {
                while desired > self.ideal_contents_scale {
                    desired /= ratio;
                }
            } else {
                while desired < self.ideal_contents_scale {
                    desired *= ratio;
                }
            }
            self.raster_contents_scale =
                snapped_contents_scale(desired, existing_scales, settings.snap_to_existing_tiling_ratio);
            self.raster_page_scale =
                self.raster_contents_scale / self.raster_device_scale / self.raster_source_scale;
        }

        // CPU raster does not follow the scale while animating
        if ideal.animating_transform && !ctx.host.use_gpu_rasterization {
            let maximum = ideal.maximum_animation_contents_scale;
            let fits_viewport = maximum > 0.0
                && ctx.layer_bounds.scale_ceil(maximum).area() <= ctx.host.viewport_size.area();
            self.raster_contents_scale = if fits_viewport {
                maximum
            } else {
                self.ideal_page_scale * self.ideal_device_scale
            };
        }

        self.raster_contents_scale = self
            .raster_contents_scale
            .max(ctx.minimum_contents_scale())
            .min(ctx.maximum_contents_scale());

        let raster_bounds = ctx.layer_bounds.scale_ceil(self.raster_contents_scale);
        let tile_size = ctx.tile_size_for(self.raster_contents_scale);
        let tile_covers_bounds =
            tile_size.width >= raster_bounds.width && tile_size.height >= raster_bounds.height;
        self.low_res_raster_contents_scale = if tile_size.is_empty() || tile_covers_bounds {
            self.raster_contents_scale
        } else {
            (self.raster_contents_scale * settings.low_res_contents_scale_factor)
                .max(ctx.minimum_contents_scale())
        };

        tracing::debug!(
            ideal = self.ideal_contents_scale,
            raster = self.raster_contents_scale,
            low_res = self.low_res_raster_contents_scale,
            source_fixed = self.raster_source_scale_is_fixed,
            "recalculated raster scales"
        );
    }
}

/// Closest existing scale to `desired` when within `snap_ratio`, else `desired`
pub fn snapped_contents_scale(desired: f32, existing_scales: &[f32], snap_ratio: f32) -> f32 {
    let mut snapped = desired;
    let mut best_ratio = snap_ratio;
    for &scale in existing_scales {
        let ratio = scale.max(desired) / scale.min(desired);
        if ratio < best_ratio {
            best_ratio = ratio;
            snapped = scale;
        }
    }
    snapped
}
