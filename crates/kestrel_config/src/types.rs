//! Configuration types deserialized from `kestrel.toml`.

use serde::Deserialize;

/// The top-level configuration parsed from `kestrel.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KestrelConfig {
    /// Cluster router settings.
    #[serde(default)]
    pub router: RouterConfig,
}

/// Settings for the intra-cluster router and routability checkers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Which routability checker the factory builds.
    pub strategy: Strategy,
    /// Enables conditional routing for cells that are not yet placed.
    pub incremental: bool,
    /// Iteration bound of the first negotiation pass.
    pub iterations: u32,
    /// Iteration bound of the second (conditional) negotiation pass.
    pub conditional_iterations: u32,
    /// Allows searches to traverse route-through connections.
    pub route_throughs: bool,
    /// Wire cost weights.
    pub cost: CostWeights,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Maze,
            incremental: true,
            iterations: 4,
            conditional_iterations: 4,
            route_throughs: false,
            cost: CostWeights::default(),
        }
    }
}

/// Routability checking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Negotiated-congestion maze routing.
    Maze,
    /// Precomputed routing-table lookup.
    Table,
    /// Runs both and reports disagreements.
    Compare,
}

/// Weights of the per-wire search cost.
///
/// A wire costs `base + occupancy * occ + history * hist`, or `invalidated`
/// when it is excluded from the current search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Fixed cost of entering any wire.
    pub base: u32,
    /// Multiplier on the wire's current occupancy.
    pub occupancy: u32,
    /// Multiplier on the wire's accumulated history.
    pub history: u32,
    /// Cost of a wire invalidated for one search.
    pub invalidated: u32,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            base: 1,
            occupancy: 4,
            history: 2,
            invalidated: 10_000,
        }
    }
}
