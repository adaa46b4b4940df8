//! [`RoutabilityChecker`] backed by the negotiated-congestion router.

use crate::checker::{RoutabilityChecker, RoutabilityResult};
use crate::design::PackDesign;
use crate::ids::{CellId, ClusterId};
use crate::routing::negotiation::{ClusterRouter, RouterState};
use kestrel_common::{InternalError, KestrelResult};
use kestrel_config::RouterConfig;
use std::collections::BTreeSet;
use tracing::trace;

/// Answers routability queries by routing the whole cluster.
///
/// Nets touching a changed cell are unrouted first; every other committed
/// route is reused.
#[derive(Debug, Clone)]
pub struct MazeRoutabilityChecker {
    router: ClusterRouter,
    last: Option<RoutabilityResult>,
    checkpoints: Vec<(RouterState, Option<RoutabilityResult>)>,
}

impl MazeRoutabilityChecker {
    /// Creates a checker for `cluster`.
    pub fn new(cluster: ClusterId, config: RouterConfig) -> Self {
        Self {
            router: ClusterRouter::new(cluster, config),
            last: None,
            checkpoints: Vec::new(),
        }
    }

    /// The underlying router, for inspecting routes and occupancy.
    pub fn router(&self) -> &ClusterRouter {
        &self.router
    }
}

impl RoutabilityChecker for MazeRoutabilityChecker {
    fn check(&mut self, design: &PackDesign, changed: &[CellId]) -> KestrelResult<RoutabilityResult> {
        if changed.is_empty() {
            if let Some(last) = &self.last {
                return Ok(last.clone());
            }
        }

        let netlist = design.netlist();
        let nets: BTreeSet<_> = changed
            .iter()
            .flat_map(|&cell| netlist.cell(cell).pins.iter())
            .filter_map(|&pin| netlist.pin(pin).net)
            .collect();
        for &net in &nets {
            self.router.invalidate_net(net)?;
        }
        trace!(cluster = %self.router.cluster(), invalidated = nets.len(), "checking cluster");

        let routability = self.router.route_cluster(design)?;
        let result = RoutabilityResult::from_parts(routability, self.router.conditionals().clone());
        self.last = Some(result.clone());
        Ok(result)
    }

    fn checkpoint(&mut self) {
        self.checkpoints
            .push((self.router.state.clone(), self.last.clone()));
    }

    fn rollback(&mut self) -> KestrelResult<()> {
        let (state, last) = self
            .checkpoints
            .pop()
            .ok_or_else(|| InternalError::new("rollback without checkpoint"))?;
        self.router.state = state;
        self.last = last;
        Ok(())
    }
}
