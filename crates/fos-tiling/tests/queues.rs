//! Raster and eviction queue ordering through the layer tree host

mod common;

use std::collections::HashSet;

use common::{LAYER, draw, filled, host_with_layer, init_tracing};
use fos_tiling::{
    DrawProperties, IdealScales, LayerProperties, LayerTreeHost, OcclusionTracker, PriorityBin,
    RasterCompletion, RasterTask, Rect, Region, Size, TileResolution, TilingSettings, TreeKind,
    TreePriority,
};

fn no_low_res() -> TilingSettings {
    TilingSettings {
        create_low_res_tiling: false,
        ..TilingSettings::default()
    }
}

fn raster_everything(host: &LayerTreeHost) {
    let tiles: Vec<_> = host.raster_queue_all(true).collect();
    for tile in tiles {
        RasterTask::new(&tile).run_and_complete();
    }
}

/// Active and pending layers at scale 1 sharing every tile
fn shared_host() -> anyhow::Result<LayerTreeHost> {
    let props = LayerProperties::new(Size::new(400, 400)).with_tile_size(Size::new(100, 100));
    let visible = Rect::new(0, 0, 400, 400);
    let mut host = host_with_layer(TilingSettings::default(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), visible)?;
    host.commit_layer(LAYER, props, filled(props.bounds), &Region::new())?;
    draw(&mut host, TreeKind::Pending, IdealScales::uniform(1.0), visible)?;
    Ok(host)
}

// ============================================================================
// Raster queue
// ============================================================================

#[test]
fn test_raster_order_by_bin_then_distance() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(1000, 1000)).with_tile_size(Size::new(100, 100));
    let mut host = host_with_layer(no_low_res(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 300, 300))?;

    let tiles: Vec<_> = host.raster_queue(TreeKind::Active, LAYER, false)?.collect();
    assert_eq!(tiles.len(), 100);

    let priorities: Vec<_> = tiles.iter().map(|tile| tile.priority(TreeKind::Active)).collect();
    assert!(priorities[..9].iter().all(|p| p.bin == PriorityBin::Now));
    assert_eq!(priorities[9].bin, PriorityBin::Soon);
    assert_eq!(priorities[99].bin, PriorityBin::Eventually);
    for pair in priorities.windows(2) {
        assert!(pair[0].bin <= pair[1].bin);
        if pair[0].bin == pair[1].bin {
            assert!(pair[0].distance_to_visible <= pair[1].distance_to_visible);
        }
    }
    Ok(())
}

#[test]
fn test_raster_order_is_deterministic() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(1000, 1000));
    let mut host = host_with_layer(TilingSettings::default(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(100, 100, 300, 300))?;

    let first: Vec<_> = host.raster_queue_all(true).map(|tile| tile.id()).collect();
    let second: Vec<_> = host.raster_queue_all(true).map(|tile| tile.id()).collect();
    assert!(!first.is_empty());
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_rastered_tiles_leave_the_queue() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(600, 600));
    let mut host = host_with_layer(TilingSettings::default(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 600, 600))?;

    let mut queue = host.raster_queue_all(false);
    let first = queue.pop().expect("tile to raster");
    let remaining = queue.len();
    drop(queue);

    RasterTask::new(&first).run_and_complete();
    assert!(first.is_ready_to_draw());
    assert_eq!(host.raster_queue_all(false).len(), remaining);

    raster_everything(&host);
    assert!(host.raster_queue_all(true).is_empty());
    Ok(())
}

#[test]
fn test_shared_tiles_are_visited_once() -> anyhow::Result<()> {
    init_tracing();
    let mut host = shared_host()?;

    let visited: Vec<_> = {
        let mut queue = host.raster_queue_all(false);
        std::iter::from_fn(|| queue.pop_with_tree()).collect()
    };
    assert_eq!(visited.len(), 17);
    let ids: HashSet<_> = visited.iter().map(|(tile, _)| tile.id()).collect();
    assert_eq!(ids.len(), visited.len());
    // Equal priorities go to the active tree
    assert!(visited.iter().all(|(_, tree)| *tree == TreeKind::Active));

    host.set_tree_priority(TreePriority::NewContentTakesPriority);
    let mut queue = host.raster_queue_all(false);
    assert_eq!(queue.len(), 17);
    while let Some((_, tree)) = queue.pop_with_tree() {
        assert_eq!(tree, TreeKind::Pending);
    }

    raster_everything(&host);
    assert_eq!(host.eviction_queue_all().len(), 17);
    Ok(())
}

#[test]
fn test_required_tiles_survive_non_ideal_active_grid() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(400, 400)).with_tile_size(Size::new(100, 100));
    let visible = Rect::new(0, 0, 400, 400);
    let mut host = host_with_layer(TilingSettings::default(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), visible)?;
    host.commit_layer(LAYER, props, filled(props.bounds), &Region::new())?;
    host.set_requires_high_res_to_draw(true);
    draw(&mut host, TreeKind::Pending, IdealScales::uniform(1.0), visible)?;

    // Active zooms in, leaving its scale 1 grid non-ideal
    draw(&mut host, TreeKind::Active, IdealScales::new(2.0, 1.0, 2.0), visible)?;
    host.set_tree_priority(TreePriority::SmoothnessTakesPriority);

    let required: Vec<_> = host
        .layer(TreeKind::Pending, LAYER)?
        .tilings()
        .all_tiles()
        .into_iter()
        .filter(|tile| tile.required_for_activation())
        .collect();
    assert_eq!(required.len(), 16);
    assert!(required.iter().all(|tile| tile.is_shared()));
    assert!(
        required
            .iter()
            .all(|tile| tile.priority(TreeKind::Active).resolution == TileResolution::NonIdeal)
    );

    let queued: HashSet<_> = host.raster_queue_all(false).map(|tile| tile.id()).collect();
    assert!(required.iter().all(|tile| queued.contains(&tile.id())));

    let assignment = host.manage_tiles();
    assert!(assignment.all_required_tiles_have_memory);
    let scheduled: HashSet<_> = assignment.tiles_to_raster.iter().map(|tile| tile.id()).collect();
    assert!(required.iter().all(|tile| scheduled.contains(&tile.id())));

    for tile in &assignment.tiles_to_raster {
        RasterTask::new(tile).run_and_complete();
    }
    assert!(host.is_ready_to_activate());
    Ok(())
}

// ============================================================================
// Eviction queue
// ============================================================================

#[test]
fn test_occluded_tiles_evicted_first() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(1000, 1000)).with_tile_size(Size::new(102, 102));
    let mut host = host_with_layer(no_low_res(), props)?;

    let mut occlusion = OcclusionTracker::new();
    occlusion.add_occluder(TreeKind::Active, Rect::new(310, 0, 690, 1000));
    let draw = DrawProperties::new(IdealScales::uniform(1.0), Rect::new(0, 0, 1000, 1000));
    host.update_tiles(TreeKind::Active, LAYER, &draw, &occlusion, false)?;
    raster_everything(&host);

    let evicted: Vec<_> = host.eviction_queue(TreeKind::Active, LAYER)?.collect();
    assert_eq!(evicted.len(), 100);
    // Columns 4..=9 lie entirely right of x=310
    let occluded = evicted
        .iter()
        .take_while(|tile| tile.is_occluded(TreeKind::Active))
        .count();
    assert_eq!(occluded, 60);
    assert!(evicted[60..].iter().all(|tile| !tile.is_occluded(TreeKind::Active)));
    assert!(occlusion.stats().occluded >= 60);
    Ok(())
}

#[test]
fn test_eviction_prefers_far_tiles() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(1000, 1000)).with_tile_size(Size::new(100, 100));
    let mut host = host_with_layer(no_low_res(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 100, 100))?;
    raster_everything(&host);

    let evicted: Vec<_> = host.eviction_queue(TreeKind::Active, LAYER)?.collect();
    let last = evicted.last().expect("tiles");
    assert_eq!(last.priority(TreeKind::Active).bin, PriorityBin::Now);
    let first = evicted[0].priority(TreeKind::Active);
    assert_eq!(first.bin, PriorityBin::Eventually);
    for pair in evicted.windows(2) {
        let a = pair[0].priority(TreeKind::Active);
        let b = pair[1].priority(TreeKind::Active);
        if a.bin == b.bin {
            assert!(a.distance_to_visible >= b.distance_to_visible);
        }
    }
    Ok(())
}

// ============================================================================
// Raster completion
// ============================================================================

#[test]
fn test_raster_result_for_released_tile_is_discarded() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(600, 600));
    let mut host = host_with_layer(TilingSettings::default(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 600, 600))?;

    let tile = host.raster_queue_all(false).next().expect("tile");
    let task = RasterTask::new(&tile);
    drop(tile);

    let tilings = host.layer(TreeKind::Active, LAYER)?.tilings().num_tilings();
    host.release_resources();
    assert_eq!(task.run_and_complete(), RasterCompletion::Discarded);

    let layer = host.layer(TreeKind::Active, LAYER)?;
    assert_eq!(layer.tilings().num_tiles(), 0);
    assert_eq!(layer.tilings().num_tilings(), tilings);
    assert!(layer.tilings().scales().has_raster_scales());

    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 600, 600))?;
    assert!(host.layer(TreeKind::Active, LAYER)?.tilings().num_tiles() > 0);
    Ok(())
}

#[test]
fn test_raster_result_after_release_of_live_tile_is_discarded() -> anyhow::Result<()> {
    init_tracing();
    let props = LayerProperties::new(Size::new(600, 600));
    let mut host = host_with_layer(TilingSettings::default(), props)?;
    draw(&mut host, TreeKind::Active, IdealScales::uniform(1.0), Rect::new(0, 0, 600, 600))?;

    let tile = host.raster_queue_all(false).next().expect("tile");
    let task = RasterTask::new(&tile);
    assert!(tile.is_raster_in_flight());
    tile.release_resources();
    assert_eq!(task.run_and_complete(), RasterCompletion::Discarded);
    assert!(!tile.has_resource());
    assert!(tile.needs_raster());
    Ok(())
}
