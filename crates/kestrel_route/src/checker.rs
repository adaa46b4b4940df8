//! The routability-checker interface the packer drives, and the factory that
//! picks a strategy per cluster.
//!
//! A packer places a cell, calls [`RoutabilityChecker::check`] with the cells
//! it just changed and backs out with [`RoutabilityChecker::rollback`] when
//! the answer is [`Routability::Infeasible`]. Checkers own all of their
//! mutable state, so checkers of different clusters can run on different
//! threads (see [`check_clusters_parallel`]).

use crate::design::PackDesign;
use crate::ids::{CellId, ClusterId};
use crate::routing::{Conditionals, MazeRoutabilityChecker};
use crate::table::{TableRoutabilityChecker, TemplateTables};
use kestrel_common::KestrelResult;
use kestrel_config::{RouterConfig, Strategy};
use kestrel_device::TemplateId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Whether a cluster's current placement can be wired.
///
/// Variants are ordered from best to worst; [`meet`](Routability::meet)
/// keeps the worse of two verdicts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Routability {
    /// Every net can be routed as placed.
    Feasible,
    /// Routable once the listed unplaced cells land on one of their
    /// candidate BELs.
    Conditional,
    /// Not routable.
    Infeasible,
}

impl Routability {
    /// The worse of `self` and `other`.
    pub fn meet(self, other: Routability) -> Routability {
        self.max(other)
    }
}

/// Verdict of one check plus the placements a conditional verdict relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutabilityResult {
    /// The verdict.
    pub routability: Routability,
    /// Candidate BELs per unplaced cell; empty unless the verdict is
    /// [`Routability::Conditional`].
    pub conditionals: Conditionals,
}

impl RoutabilityResult {
    /// A feasible result.
    pub fn feasible() -> Self {
        Self {
            routability: Routability::Feasible,
            conditionals: Conditionals::new(),
        }
    }

    /// An infeasible result.
    pub fn infeasible() -> Self {
        Self {
            routability: Routability::Infeasible,
            conditionals: Conditionals::new(),
        }
    }

    /// A conditional result.
    pub fn conditional(conditionals: Conditionals) -> Self {
        Self {
            routability: Routability::Conditional,
            conditionals,
        }
    }

    /// Builds a result from a verdict, dropping `conditionals` unless the
    /// verdict is conditional.
    pub fn from_parts(routability: Routability, conditionals: Conditionals) -> Self {
        match routability {
            Routability::Conditional => Self::conditional(conditionals),
            Routability::Feasible => Self::feasible(),
            Routability::Infeasible => Self::infeasible(),
        }
    }
}

/// Incremental routability checking for one cluster.
pub trait RoutabilityChecker: Send {
    /// Re-validates the nets and pin groups touched by `changed` and returns
    /// the verdict for the whole cluster.
    ///
    /// Calling again with no changed cells returns the same result.
    fn check(&mut self, design: &PackDesign, changed: &[CellId]) -> KestrelResult<RoutabilityResult>;

    /// Saves the current state so a later [`rollback`](Self::rollback) can
    /// restore it. Checkpoints nest.
    fn checkpoint(&mut self);

    /// Restores the state saved by the most recent checkpoint.
    ///
    /// Fails with an internal error when there is no checkpoint.
    fn rollback(&mut self) -> KestrelResult<()>;
}

/// Runs the maze and table strategies side by side and reports the maze
/// verdict, logging every disagreement.
#[derive(Debug)]
pub struct ComparingChecker {
    maze: MazeRoutabilityChecker,
    table: TableRoutabilityChecker,
}

impl ComparingChecker {
    /// Pairs two checkers of the same cluster.
    pub fn new(maze: MazeRoutabilityChecker, table: TableRoutabilityChecker) -> Self {
        Self { maze, table }
    }
}

impl RoutabilityChecker for ComparingChecker {
    fn check(&mut self, design: &PackDesign, changed: &[CellId]) -> KestrelResult<RoutabilityResult> {
        let maze = self.maze.check(design, changed)?;
        let table = self.table.check(design, changed)?;
        if maze.routability != table.routability {
            warn!(
                cluster = %self.maze.router().cluster(),
                maze = ?maze.routability,
                table = ?table.routability,
                "routability strategies disagree"
            );
        }
        Ok(maze)
    }

    fn checkpoint(&mut self) {
        self.maze.checkpoint();
        self.table.checkpoint();
    }

    fn rollback(&mut self) -> KestrelResult<()> {
        self.maze.rollback()?;
        self.table.rollback()
    }
}

/// Creates checkers for the configured strategy, sharing routing tables
/// between clusters of the same template.
#[derive(Debug)]
pub struct RoutabilityCheckerFactory {
    config: RouterConfig,
    tables: HashMap<TemplateId, Arc<TemplateTables>>,
}

impl RoutabilityCheckerFactory {
    /// Creates a factory with no tables built yet.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            tables: HashMap::new(),
        }
    }

    /// The configuration handed to every checker.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Returns a checker for `cluster`.
    pub fn create(
        &mut self,
        design: &PackDesign,
        cluster: ClusterId,
    ) -> KestrelResult<Box<dyn RoutabilityChecker>> {
        Ok(match self.config.strategy {
            Strategy::Maze => Box::new(MazeRoutabilityChecker::new(cluster, self.config.clone())),
            Strategy::Table => {
                let tables = self.tables_for(design, cluster)?;
                Box::new(TableRoutabilityChecker::new(design, cluster, tables))
            }
            Strategy::Compare => {
                let tables = self.tables_for(design, cluster)?;
                Box::new(ComparingChecker::new(
                    MazeRoutabilityChecker::new(cluster, self.config.clone()),
                    TableRoutabilityChecker::new(design, cluster, tables),
                ))
            }
        })
    }

    /// The routing tables of `cluster`'s template, built on first use.
    pub fn tables_for(
        &mut self,
        design: &PackDesign,
        cluster: ClusterId,
    ) -> KestrelResult<Arc<TemplateTables>> {
        let template = design.template(cluster);
        if let Some(tables) = self.tables.get(&template.id()) {
            return Ok(Arc::clone(tables));
        }
        let tables = Arc::new(TemplateTables::build(template)?);
        info!(
            template = template.name(),
            groups = tables.len(),
            rows = tables.row_count(),
            "built routing tables"
        );
        self.tables.insert(template.id(), Arc::clone(&tables));
        Ok(tables)
    }
}

/// Runs `check` on every checker concurrently, one cluster per task.
///
/// Results come back in the order of `checkers`.
pub fn check_clusters_parallel(
    design: &PackDesign,
    checkers: &mut [Box<dyn RoutabilityChecker>],
    changed: &[CellId],
) -> KestrelResult<Vec<RoutabilityResult>> {
    checkers
        .par_iter_mut()
        .map(|checker| checker.check(design, changed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::slice;
    use crate::netlist::NetKind;
    use kestrel_device::BelId;
    use std::collections::BTreeSet;

    #[test]
    fn meet_keeps_the_worse_verdict() {
        use Routability::*;
        assert_eq!(Feasible.meet(Feasible), Feasible);
        assert_eq!(Feasible.meet(Conditional), Conditional);
        assert_eq!(Conditional.meet(Infeasible), Infeasible);
        assert_eq!(Infeasible.meet(Feasible), Infeasible);
    }

    #[test]
    fn routability_serializes_snake_case() {
        let json = serde_json::to_string(&Routability::Conditional).unwrap();
        assert_eq!(json, "\"conditional\"");
        let back: Routability = serde_json::from_str("\"infeasible\"").unwrap();
        assert_eq!(back, Routability::Infeasible);
    }

    #[test]
    fn from_parts_drops_conditionals_unless_conditional() {
        let mut c = Conditionals::new();
        c.insert(CellId::from_raw(0), BTreeSet::from([BelId::from_raw(1)]));
        assert!(RoutabilityResult::from_parts(Routability::Feasible, c.clone())
            .conditionals
            .is_empty());
        assert_eq!(
            RoutabilityResult::from_parts(Routability::Conditional, c.clone()).conditionals,
            c
        );
    }

    #[test]
    fn factory_shares_tables_per_template() {
        let mut s = slice();
        let template = Arc::clone(s.design.template(s.cluster));
        let other = s.design.add_cluster("slice_1", template);
        let mut factory = RoutabilityCheckerFactory::new(RouterConfig {
            strategy: Strategy::Table,
            ..RouterConfig::default()
        });
        let a = factory.tables_for(&s.design, s.cluster).unwrap();
        let b = factory.tables_for(&s.design, other).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn every_strategy_accepts_an_internal_net() {
        for strategy in [Strategy::Maze, Strategy::Table, Strategy::Compare] {
            let mut s = slice();
            let lut = s.add_cell("lut", s.lut_lib);
            let ff = s.add_cell("ff", s.ff_lib);
            s.net("n", NetKind::Signal, &[(lut, "O"), (ff, "D")]);
            s.design.place(lut, s.cluster, s.lut_bel).unwrap();
            s.design.place(ff, s.cluster, s.ff_bel).unwrap();

            let mut factory = RoutabilityCheckerFactory::new(RouterConfig {
                strategy,
                ..RouterConfig::default()
            });
            let mut checker = factory.create(&s.design, s.cluster).unwrap();
            let result = checker.check(&s.design, &[lut, ff]).unwrap();
            assert_eq!(result, RoutabilityResult::feasible(), "{strategy:?}");
        }
    }

    #[test]
    fn parallel_checks_keep_cluster_order() {
        let mut s = slice();
        let template = Arc::clone(s.design.template(s.cluster));
        let second = s.design.add_cluster("slice_1", template);
        let lut = s.add_cell("lut", s.lut_lib);
        let ff = s.add_cell("ff", s.ff_lib);
        s.net("n", NetKind::Signal, &[(lut, "O"), (ff, "D")]);
        s.design.place(lut, s.cluster, s.lut_bel).unwrap();
        s.design.place(ff, second, s.ff_bel).unwrap();

        let mut factory = RoutabilityCheckerFactory::new(RouterConfig::default());
        let mut checkers = vec![
            factory.create(&s.design, s.cluster).unwrap(),
            factory.create(&s.design, second).unwrap(),
        ];
        let results = check_clusters_parallel(&s.design, &mut checkers, &[lut, ff]).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.routability == Routability::Feasible));
    }
}
