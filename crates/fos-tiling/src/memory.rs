//! Tile Memory Assignment
//!
//! Grants raster memory to tiles in priority order under a byte and resource
//! budget, evicting less important tiles to make room.

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::eviction_queue::EvictionPriorityQueue;
use crate::priority::{PriorityBin, TilePriority};
use crate::raster_queue::RasterPriorityQueue;
use crate::tile::Tile;

/// Which bins may hold memory at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryLimitPolicy {
    AllowNothing = 0,
    /// NOW tiles only
    AllowAbsoluteMinimum = 1,
    /// NOW and SOON tiles
    AllowPrepaintOnly = 2,
    AllowAnything = 3,
}

impl MemoryLimitPolicy {
    pub fn allows(self, bin: PriorityBin) -> bool {
        match self {
            MemoryLimitPolicy::AllowNothing => false,
            MemoryLimitPolicy::AllowAbsoluteMinimum => bin == PriorityBin::Now,
            MemoryLimitPolicy::AllowPrepaintOnly => bin != PriorityBin::Eventually,
            MemoryLimitPolicy::AllowAnything => true,
        }
    }
}

/// Tile memory budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPolicy {
    /// Budget for prepaint (bytes)
    pub soft_limit_bytes: usize,
    /// Budget for tiles needed now (bytes)
    pub hard_limit_bytes: usize,
    /// Maximum number of resources
    pub num_resources_limit: usize,
    pub limit_policy: MemoryLimitPolicy,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            soft_limit_bytes: 64 * 1024 * 1024,  // 64MB
            hard_limit_bytes: 128 * 1024 * 1024, // 128MB
            num_resources_limit: 4096,
            limit_policy: MemoryLimitPolicy::AllowAnything,
        }
    }
}

/// Resource memory in use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub bytes: usize,
    pub resources: usize,
}

impl MemoryUsage {
    pub fn new(bytes: usize, resources: usize) -> Self {
        Self { bytes, resources }
    }

    /// Usage of a resource of `bytes`
    pub fn of(bytes: usize) -> Self {
        Self::new(bytes, 1)
    }

    pub fn add(&mut self, other: MemoryUsage) {
        self.bytes += other.bytes;
        self.resources += other.resources;
    }

    pub fn subtract(&mut self, other: MemoryUsage) {
        self.bytes = self.bytes.saturating_sub(other.bytes);
        self.resources = self.resources.saturating_sub(other.resources);
    }

    pub fn exceeds(&self, bytes_limit: usize, resources_limit: usize) -> bool {
        self.bytes > bytes_limit || self.resources > resources_limit
    }
}

/// Result of one memory assignment pass
#[derive(Debug, Default)]
pub struct MemoryAssignment {
    /// Tiles granted memory, in raster order
    pub tiles_to_raster: Vec<Rc<Tile>>,
    /// Tiles whose resources were released
    pub evicted: usize,
    /// Usage after eviction plus the granted tiles
    pub usage: MemoryUsage,
    /// Some tile that needed memory did not get it
    pub over_budget: bool,
    pub all_required_tiles_have_memory: bool,
}

/// Current usage of `tiles` (each tile once)
pub fn usage_of<'a>(tiles: impl IntoIterator<Item = &'a Rc<Tile>>) -> MemoryUsage {
    let mut usage = MemoryUsage::default();
    for tile in tiles {
        if tile.has_resource() {
            usage.add(MemoryUsage::of(tile.bytes_if_allocated()));
        }
    }
    usage
}

/// Release tiles from `eviction` until `usage` fits; only tiles strictly less
/// important than `protect` (when given) and not required for activation go
fn evict_until_within_limit(
    eviction: &mut EvictionPriorityQueue,
    usage: &mut MemoryUsage,
    bytes_limit: usize,
    resources_limit: usize,
    protect: Option<&TilePriority>,
    evicted: &mut usize,
) -> bool {
    while usage.exceeds(bytes_limit, resources_limit) {
        let Some((tile, tree)) = eviction.top_with_tree() else {
            return false;
        };
        if tile.required_for_activation() {
            return false;
        }
        if let Some(protect) = protect {
            if !protect.is_higher_priority_than(&tile.priority(tree)) {
                return false;
            }
        }
        if let Some(tile) = eviction.pop() {
            // Already released by an earlier pass
            if !tile.has_resource() {
                continue;
            }
            usage.subtract(MemoryUsage::of(tile.release_resources()));
            *evicted += 1;
        }
    }
    true
}

/// Hand out memory to the tiles in `raster` order. `required` is the pending
/// tree's required-for-activation set; each one must end up ready, in flight
/// or scheduled for `all_required_tiles_have_memory` to hold.
pub fn assign_memory(
    mut raster: RasterPriorityQueue,
    mut eviction: EvictionPriorityQueue,
    current_usage: MemoryUsage,
    required: &[Rc<Tile>],
    policy: &MemoryPolicy,
) -> MemoryAssignment {
    let mut assignment = MemoryAssignment {
        usage: current_usage,
        ..Default::default()
    };
    let resources_limit = policy.num_resources_limit;

    // Tiles in bins the policy no longer allows give their memory back first
    let mut disallowed = Vec::new();
    while let Some((tile, tree)) = eviction.top_with_tree() {
        if policy.limit_policy.allows(tile.priority(tree).bin) {
            break;
        }
        disallowed.push(Rc::clone(tile));
        eviction.pop();
    }
    for tile in disallowed {
        assignment
            .usage
            .subtract(MemoryUsage::of(tile.release_resources()));
        assignment.evicted += 1;
    }

    // The hard limit always holds
    if !evict_until_within_limit(
        &mut eviction,
        &mut assignment.usage,
        policy.hard_limit_bytes,
        resources_limit,
        None,
        &mut assignment.evicted,
    ) {
        assignment.over_budget = true;
    }

    while let Some((tile, tree)) = raster.pop_with_tree() {
        let priority = tile.priority(tree);
        if !policy.limit_policy.allows(priority.bin) {
            break;
        }

        let bytes_limit = if priority.bin == PriorityBin::Now {
            policy.hard_limit_bytes
        } else {
            policy.soft_limit_bytes
        };
        let mut needed = assignment.usage;
        needed.add(MemoryUsage::of(tile.bytes_required()));

        let mut fits = !needed.exceeds(bytes_limit, resources_limit);
        if !fits {
            let mut after_eviction = assignment.usage;
            let reserve = MemoryUsage::of(tile.bytes_required());
            // Evict against the limit minus what this tile needs
            fits = evict_until_within_limit(
                &mut eviction,
                &mut after_eviction,
                bytes_limit.saturating_sub(reserve.bytes),
                resources_limit.saturating_sub(reserve.resources),
                Some(&priority),
                &mut assignment.evicted,
            );
            assignment.usage = after_eviction;
        }

        if !fits {
            assignment.over_budget = true;
            break;
        }

        assignment.usage.add(MemoryUsage::of(tile.bytes_required()));
        assignment.tiles_to_raster.push(tile);
    }

    let scheduled: HashSet<_> = assignment.tiles_to_raster.iter().map(|tile| tile.id()).collect();
    assignment.all_required_tiles_have_memory = required.iter().all(|tile| {
        tile.is_ready_to_draw() || tile.is_raster_in_flight() || scheduled.contains(&tile.id())
    });
    if !assignment.all_required_tiles_have_memory {
        tracing::warn!(required = required.len(), "required tiles left without memory");
    }

    if assignment.usage.exceeds(policy.hard_limit_bytes, resources_limit) {
        tracing::warn!(
            bytes = assignment.usage.bytes,
            hard_limit = policy.hard_limit_bytes,
            "tile memory over hard limit"
        );
    }
    tracing::info!(
        scheduled = assignment.tiles_to_raster.len(),
        evicted = assignment.evicted,
        bytes = assignment.usage.bytes,
        over_budget = assignment.over_budget,
        "assigned tile memory"
    );
    assignment
}
