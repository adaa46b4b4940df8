//! Intra-cluster routing and routability checking for the Kestrel packer.
//!
//! While a packer fills a cluster it repeatedly asks whether the cells placed
//! so far can still be wired through the cluster's fixed interconnect. This
//! crate answers that question with one of two strategies behind a common
//! [`RoutabilityChecker`] trait:
//!
//! - [`MazeRoutabilityChecker`] routes every net with a negotiated-congestion
//!   maze router over the template's wire graph.
//! - [`TableRoutabilityChecker`] looks the placement up in routing tables
//!   precomputed per pin group of the template.
//!
//! Both report [`Routability::Conditional`] when the placement is routable
//! only if some unplaced cells later land on particular BELs, and both can
//! checkpoint and roll back so the packer can try a placement and back out.
//!
//! # Usage
//!
//! ```ignore
//! use kestrel_route::{RoutabilityCheckerFactory, Routability};
//!
//! let mut factory = RoutabilityCheckerFactory::new(config);
//! let mut checker = factory.create(&design, cluster)?;
//! checker.checkpoint();
//! design.place(cell, cluster, bel)?;
//! if checker.check(&design, &[cell])?.routability == Routability::Infeasible {
//!     design.unplace(cell);
//!     checker.rollback()?;
//! }
//! ```

#![warn(missing_docs)]

pub mod checker;
pub mod design;
pub mod ids;
pub mod netlist;
pub mod route_tree;
pub mod routing;
pub mod stacked_map;
pub mod table;

#[cfg(test)]
mod fixtures;

pub use checker::{
    check_clusters_parallel, ComparingChecker, Routability, RoutabilityChecker,
    RoutabilityCheckerFactory, RoutabilityResult,
};
pub use design::{Cluster, Location, PackDesign, PlacementError};
pub use ids::{CellId, CellPinId, ClusterId, LibCellId, NetId};
pub use netlist::{Cell, CellPin, LibCell, LibPin, Net, NetKind, Netlist, NetlistError, OperatingMode};
pub use route_tree::{NodeId, RouteForest, RouteNode};
pub use routing::{ClusterRouter, Conditionals, MazeRoutabilityChecker, OccupancyTable};
pub use stacked_map::StackedMap;
pub use table::{TableRoutabilityChecker, TemplateTables};
