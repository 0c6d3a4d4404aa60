//! Shared fixtures for fos-tiling integration tests

#![allow(dead_code)]

use std::rc::Rc;

use fos_tiling::{
    Color, ContentSource, DrawProperties, IdealScales, LayerId, LayerProperties, LayerTreeHost,
    NoOcclusion, Rect, RecordedContent, Region, Size, TilingSettings, TreeKind,
};

pub const LAYER: LayerId = LayerId(1);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn filled(bounds: Size) -> Rc<dyn ContentSource> {
    Rc::new(RecordedContent::filled(bounds, Color::WHITE))
}

/// Host with one active layer of `properties`, not yet drawn
pub fn host_with_layer(settings: TilingSettings, properties: LayerProperties) -> anyhow::Result<LayerTreeHost> {
    let mut host = LayerTreeHost::new(settings)?;
    host.commit_layer(LAYER, properties, filled(properties.bounds), &Region::new())?;
    host.activate()?;
    Ok(host)
}

/// Draw the layer on `tree` at `ideal` with `visible` in view
pub fn draw(
    host: &mut LayerTreeHost,
    tree: TreeKind,
    ideal: IdealScales,
    visible: Rect,
) -> anyhow::Result<()> {
    let draw = DrawProperties::new(ideal, visible);
    host.update_tiles(tree, LAYER, &draw, &NoOcclusion, false)?;
    Ok(())
}

/// Grid scales of the layer on `tree`, highest first
pub fn scales(host: &LayerTreeHost, tree: TreeKind) -> Vec<f32> {
    host.layer(tree, LAYER)
        .map(|layer| layer.tilings().tiling_scales())
        .unwrap_or_default()
}

pub fn assert_scales(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "scales {actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "scales {actual:?} vs {expected:?}");
    }
}
