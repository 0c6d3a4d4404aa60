//! Host-level behavior: memory assignment, mask layers and configuration

mod common;

use common::{LAYER, draw, filled, host_with_layer, init_tracing};
use fos_tiling::{
    IdealScales, LayerProperties, LayerTreeHost, MemoryLimitPolicy, MemoryPolicy, RasterTask,
    Rect, Region, Size, TilingError, TilingSettings, TreeKind,
};

const TILE_BYTES: usize = 100 * 100 * 4;

fn policy(soft_tiles: usize, hard_tiles: usize) -> MemoryPolicy {
    MemoryPolicy {
        soft_limit_bytes: soft_tiles * TILE_BYTES,
        hard_limit_bytes: hard_tiles * TILE_BYTES,
        ..MemoryPolicy::default()
    }
}

// ============================================================================
// Memory
// ============================================================================

#[test]
fn test_visible_tiles_stop_at_hard_limit() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(400, 400)).with_tile_size(Size::new(100, 100));
    let mut host = host_with_layer(TilingSettings::default(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 400, 400))?;
    host.set_memory_policy(policy(2, 5));

    let assignment = host.manage_tiles();
    assert_eq!(assignment.tiles_to_raster.len(), 5);
    assert_eq!(assignment.usage.bytes, 5 * TILE_BYTES);
    assert!(assignment.over_budget);
    assert!(assignment.all_required_tiles_have_memory);
    for tile in &assignment.tiles_to_raster {
        RasterTask::new(tile).run_and_complete();
    }

    // Equally important tiles never evict each other
    let assignment = host.manage_tiles();
    assert!(assignment.tiles_to_raster.is_empty());
    assert_eq!(assignment.evicted, 0);
    assert!(assignment.over_budget);

    host.set_memory_policy(MemoryPolicy {
        limit_policy: MemoryLimitPolicy::AllowNothing,
        ..policy(2, 5)
    });
    let assignment = host.manage_tiles();
    assert_eq!(assignment.evicted, 5);
    assert_eq!(assignment.usage.bytes, 0);
    assert!(assignment.tiles_to_raster.is_empty());
    assert!(host.eviction_queue_all().is_empty());
    Ok(())
}

#[test]
fn test_required_tiles_without_memory_are_reported() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(400, 400)).with_tile_size(Size::new(100, 100));
    let mut host = LayerTreeHost::new(TilingSettings::default())?;
    host.commit_layer(LAYER, props, filled(props.bounds), &Region::new())?;
    draw(&mut host, TreeKind::Pending, IdealScales::uniform(1.0), Rect::new(0, 0, 400, 400))?;
    host.set_memory_policy(policy(5, 5));

    let assignment = host.manage_tiles();
    assert_eq!(assignment.tiles_to_raster.len(), 5);
    assert!(assignment.tiles_to_raster.iter().all(|tile| tile.required_for_activation()));
    assert!(assignment.over_budget);
    assert!(!assignment.all_required_tiles_have_memory);
    Ok(())
}

#[test]
fn test_prepaint_stops_at_soft_limit() -> anyhow::Result<()> {
    init_tracing();
    let settings = TilingSettings {
        create_low_res_tiling: false,
        ..TilingSettings::default()
    };
    let props = LayerProperties::new(Size::new(1000, 1000)).with_tile_size(Size::new(100, 100));
    let mut host = host_with_layer(settings, props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 100, 100))?;
    host.set_memory_policy(policy(3, 50));

    let assignment = host.manage_tiles();
    assert_eq!(assignment.tiles_to_raster.len(), 3);
    assert!(assignment.over_budget);
    Ok(())
}

#[test]
fn test_prepaint_only_policy_skips_eventually() -> anyhow::Result<()> {
    init_tracing();
    let settings = TilingSettings {
        create_low_res_tiling: false,
        ..TilingSettings::default()
    };
    let props = LayerProperties::new(Size::new(1000, 1000)).with_tile_size(Size::new(100, 100));
    let mut host = host_with_layer(settings, props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 100, 100))?;
    host.set_memory_policy(MemoryPolicy {
        limit_policy: MemoryLimitPolicy::AllowPrepaintOnly,
        ..MemoryPolicy::default()
    });

    let assignment = host.manage_tiles();
    assert!(!assignment.tiles_to_raster.is_empty());
    assert!(!assignment.over_budget);
    assert!(
        assignment
            .tiles_to_raster
            .iter()
            .all(|tile| tile.priority(TreeKind::Active).bin != fos_tiling::PriorityBin::Eventually)
    );
    Ok(())
}

// ============================================================================
// Masks
// ============================================================================

#[test]
fn test_mask_wider_than_texture_is_one_tile() -> anyhow::Result<()> {
    init_tracing();
    let bounds = Size::new(4000, 100);
    let mut host = LayerTreeHost::new(TilingSettings::default())?;
    host.set_max_texture_size(2048);
    host.commit_layer(LAYER, LayerProperties::mask(bounds), filled(bounds), &Region::new())?;
    host.activate()?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::from_size(bounds))?;

    let layer = host.layer(TreeKind::Active, LAYER)?;
    assert_eq!(layer.tilings().num_tilings(), 1);
    assert_eq!(layer.tilings().num_tiles(), 1);
    let tile = layer.tilings().all_tiles().remove(0);
    assert!(tile.content_rect().width <= 2048);
    assert!(layer.mask_contents_resource().is_none());

    RasterTask::new(&tile).run_and_complete();
    let (scale, resource) = layer.mask_contents_resource().expect("mask resource");
    assert!(scale < 1.0);
    assert!(resource.size.width <= 2048);
    assert_eq!(resource.size, tile.content_rect().size());
    Ok(())
}

#[test]
fn test_mask_beyond_minimum_scale_has_no_tilings() -> anyhow::Result<()> {
    init_tracing();
    let bounds = Size::new(40000, 100);
    let mut host = LayerTreeHost::new(TilingSettings::default())?;
    host.set_max_texture_size(2048);
    host.commit_layer(LAYER, LayerProperties::mask(bounds), filled(bounds), &Region::new())?;
    host.activate()?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::from_size(bounds))?;

    let layer = host.layer(TreeKind::Active, LAYER)?;
    assert!(!layer.can_have_tilings(host.settings(), host.state()));
    assert_eq!(layer.tilings().num_tilings(), 0);
    Ok(())
}

// ============================================================================
// Configuration and diagnostics
// ============================================================================

#[test]
fn test_settings_from_partial_json() -> anyhow::Result<()> {
    let json = r#"{
        "soon_border_distance": 100,
        "default_tile_size": { "width": 128, "height": 128 }
    }"#;
    let settings: TilingSettings = serde_json::from_str(json)?;
    assert_eq!(settings.soon_border_distance, 100);
    assert_eq!(settings.default_tile_size, Size::new(128, 128));
    assert_eq!(
        settings.interest_area_padding,
        TilingSettings::default().interest_area_padding
    );
    Ok(())
}

#[test]
fn test_host_rejects_invalid_settings() -> anyhow::Result<()> {
    let flat_pinch: TilingSettings =
        serde_json::from_str(r#"{ "max_scale_ratio_during_pinch": 1.0 }"#)?;
    assert!(matches!(
        LayerTreeHost::new(flat_pinch),
        Err(TilingError::InvalidSettings(_))
    ));

    let empty_tiles: TilingSettings =
        serde_json::from_str(r#"{ "default_tile_size": { "width": 0, "height": 0 } }"#)?;
    assert!(matches!(
        LayerTreeHost::new(empty_tiles),
        Err(TilingError::InvalidSettings(_))
    ));
    Ok(())
}

#[test]
fn test_diagnostics_serialize() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(400, 400)).with_tile_size(Size::new(100, 100));
    let mut host = host_with_layer(TilingSettings::default(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 400, 400))?;

    let diagnostics = host.diagnostics(TreeKind::Active, LAYER)?;
    assert_eq!(diagnostics.num_tiles(), 17);

    let value = serde_json::to_value(&diagnostics)?;
    assert_eq!(value["tree"], "Active");
    assert_eq!(value["tilings"][0]["resolution"], "High");
    assert_eq!(value["tilings"][0]["tiles"].as_array().map(Vec::len), Some(16));
    Ok(())
}
