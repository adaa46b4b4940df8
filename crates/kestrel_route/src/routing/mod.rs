//! Intra-cluster maze routing with negotiated congestion.
//!
//! [`classify_cluster`] sorts the pins of every net touching a cluster by
//! where they must be reached; [`ClusterRouter`] then routes those nets
//! over the template's wire graph, raising the price of shared wires until
//! no wire carries two nets or the iteration bounds run out.

pub mod classify;
pub mod conditional;
pub(crate) mod maze;
pub mod maze_checker;
pub mod negotiation;
pub mod occupancy;

pub use classify::{classify_cluster, NetSource, PinMappings, SortedNetPins};
pub use conditional::Conditionals;
pub use maze_checker::MazeRoutabilityChecker;
pub use negotiation::{ClusterRouter, NetStatus, RouteStats};
pub use occupancy::{OccupancyTable, WireUsage};
