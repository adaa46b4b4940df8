//! Occupancy and history bookkeeping for negotiated congestion.
//!
//! Tracks how many committed nets use each wire and how often each wire has
//! been contested. History only ever grows, so a wire that keeps attracting
//! several nets becomes steadily more expensive to every later search.

use kestrel_common::{InternalError, KestrelResult};
use kestrel_config::CostWeights;
use kestrel_device::WireId;
use std::collections::HashMap;

/// Occupancy and history of one wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireUsage {
    /// Number of committed nets routed through the wire.
    pub occupancy: u32,
    /// Number of commits that left the wire shared.
    pub history: u32,
}

/// Per-wire usage for one cluster router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccupancyTable {
    usage: HashMap<WireId, WireUsage>,
}

impl OccupancyTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Usage of `wire`.
    pub fn usage(&self, wire: WireId) -> WireUsage {
        self.usage.get(&wire).copied().unwrap_or_default()
    }

    /// Number of committed nets using `wire`.
    pub fn occupancy(&self, wire: WireId) -> u32 {
        self.usage(wire).occupancy
    }

    /// Accumulated history of `wire`.
    pub fn history(&self, wire: WireId) -> u32 {
        self.usage(wire).history
    }

    /// Records one more net on each of `wires`, growing the history of every
    /// wire that ends up shared.
    pub fn claim(&mut self, wires: &[WireId]) {
        for &wire in wires {
            let u = self.usage.entry(wire).or_default();
            u.occupancy += 1;
            if u.occupancy > 1 {
                u.history += 1;
            }
        }
    }

    /// Removes one net from each of `wires`.
    pub fn release(&mut self, wires: &[WireId]) -> KestrelResult<()> {
        for &wire in wires {
            let u = self.usage.entry(wire).or_default();
            if u.occupancy == 0 {
                return Err(InternalError::new(format!(
                    "occupancy of wire {wire} would go negative"
                )));
            }
            u.occupancy -= 1;
        }
        Ok(())
    }

    /// Returns `true` if more than one net uses `wire`.
    pub fn is_contended(&self, wire: WireId) -> bool {
        self.occupancy(wire) > 1
    }

    /// Returns whether any wire is shared.
    pub fn has_congestion(&self) -> bool {
        self.usage.values().any(|u| u.occupancy > 1)
    }

    /// Number of shared wires.
    pub fn overused_count(&self) -> usize {
        self.usage.values().filter(|u| u.occupancy > 1).count()
    }

    /// Shared wires, in ID order.
    pub fn overused_wires(&self) -> Vec<WireId> {
        let mut wires: Vec<WireId> = self
            .usage
            .iter()
            .filter(|(_, u)| u.occupancy > 1)
            .map(|(&w, _)| w)
            .collect();
        wires.sort();
        wires
    }

    /// Search cost of entering `wire`.
    pub fn wire_cost(&self, wire: WireId, weights: &CostWeights) -> u32 {
        let u = self.usage(wire);
        weights
            .base
            .saturating_add(u.occupancy.saturating_mul(weights.occupancy))
            .saturating_add(u.history.saturating_mul(weights.history))
    }
}
