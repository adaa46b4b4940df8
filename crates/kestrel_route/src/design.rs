//! The packer's view of a design under construction.
//!
//! A [`PackDesign`] pairs the netlist with the clusters being filled and the
//! tentative cell locations inside them. The packer mutates it with
//! [`place`](PackDesign::place) and [`unplace`](PackDesign::unplace) and then
//! asks a routability checker whether the affected cluster can still be
//! wired.

use crate::ids::{CellId, CellPinId, ClusterId, NetId};
use crate::netlist::Netlist;
use kestrel_device::{BelId, BelPinId, ClusterTemplate, Device, PinTemplateRef};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A cluster instance bound to its template.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// The ID assigned by the design.
    pub id: ClusterId,
    /// Instance name.
    pub name: String,
    /// Shared template describing the cluster's interconnect.
    pub template: Arc<ClusterTemplate>,
}

/// Where a cell currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// The cluster holding the cell.
    pub cluster: ClusterId,
    /// The BEL inside that cluster's template.
    pub bel: BelId,
}

/// Errors raised by placement changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// The cell already has a location.
    #[error("cell {cell} is already placed")]
    AlreadyPlaced {
        /// The cell.
        cell: CellId,
    },
    /// Another cell holds the BEL.
    #[error("BEL {bel} of cluster {cluster} is occupied")]
    BelOccupied {
        /// The cluster.
        cluster: ClusterId,
        /// The BEL.
        bel: BelId,
    },
}

/// The netlist plus clusters and tentative placements.
#[derive(Debug, Clone)]
pub struct PackDesign {
    device: Arc<Device>,
    netlist: Netlist,
    clusters: Vec<Cluster>,
    locations: HashMap<CellId, Location>,
    occupants: HashMap<(ClusterId, BelId), CellId>,
}

impl PackDesign {
    /// Creates a design with no clusters and nothing placed.
    pub fn new(device: Arc<Device>, netlist: Netlist) -> Self {
        Self {
            device,
            netlist,
            clusters: Vec::new(),
            locations: HashMap::new(),
            occupants: HashMap::new(),
        }
    }

    /// The device all templates belong to.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The netlist.
    pub fn netlist(&self) -> &Netlist {
        &self.netlist
    }

    /// Mutable access to the netlist.
    pub fn netlist_mut(&mut self) -> &mut Netlist {
        &mut self.netlist
    }

    /// Adds a cluster instance of `template`.
    pub fn add_cluster(
        &mut self,
        name: impl Into<String>,
        template: Arc<ClusterTemplate>,
    ) -> ClusterId {
        let id = ClusterId::from_raw(self.clusters.len() as u32);
        self.clusters.push(Cluster {
            id,
            name: name.into(),
            template,
        });
        id
    }

    /// Returns a cluster.
    pub fn cluster(&self, id: ClusterId) -> &Cluster {
        &self.clusters[id.index()]
    }

    /// All clusters.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// The template of a cluster.
    pub fn template(&self, id: ClusterId) -> &Arc<ClusterTemplate> {
        &self.cluster(id).template
    }

    /// Places `cell` on `bel` of `cluster`.
    pub fn place(
        &mut self,
        cell: CellId,
        cluster: ClusterId,
        bel: BelId,
    ) -> Result<(), PlacementError> {
        if self.locations.contains_key(&cell) {
            return Err(PlacementError::AlreadyPlaced { cell });
        }
        if self.occupants.contains_key(&(cluster, bel)) {
            return Err(PlacementError::BelOccupied { cluster, bel });
        }
        self.locations.insert(cell, Location { cluster, bel });
        self.occupants.insert((cluster, bel), cell);
        Ok(())
    }

    /// Removes `cell` from its location, returning where it was.
    pub fn unplace(&mut self, cell: CellId) -> Option<Location> {
        let loc = self.locations.remove(&cell)?;
        self.occupants.remove(&(loc.cluster, loc.bel));
        Some(loc)
    }

    /// Current location of `cell`.
    pub fn location(&self, cell: CellId) -> Option<Location> {
        self.locations.get(&cell).copied()
    }

    /// Returns `true` if `cell` is placed in `cluster`.
    pub fn is_in_cluster(&self, cell: CellId, cluster: ClusterId) -> bool {
        self.location(cell).is_some_and(|l| l.cluster == cluster)
    }

    /// Returns `true` if a cell holds `bel` of `cluster`.
    pub fn is_bel_occupied(&self, cluster: ClusterId, bel: BelId) -> bool {
        self.occupants.contains_key(&(cluster, bel))
    }

    /// The cell on `bel` of `cluster`, if any.
    pub fn cell_at(&self, cluster: ClusterId, bel: BelId) -> Option<CellId> {
        self.occupants.get(&(cluster, bel)).copied()
    }

    /// Cells placed in `cluster`, in ID order.
    pub fn cells_in(&self, cluster: ClusterId) -> Vec<CellId> {
        let set: BTreeSet<CellId> = self
            .occupants
            .iter()
            .filter(|((c, _), _)| *c == cluster)
            .map(|(_, &cell)| cell)
            .collect();
        set.into_iter().collect()
    }

    /// Nets connected to any cell placed in `cluster`, in ID order.
    pub fn nets_of_cluster(&self, cluster: ClusterId) -> BTreeSet<NetId> {
        self.cells_in(cluster)
            .into_iter()
            .flat_map(|cell| self.netlist.cell(cell).pins.iter().copied())
            .filter_map(|pin| self.netlist.pin(pin).net)
            .collect()
    }

    /// BEL pins `pin` may use given its cell's current BEL. Empty when the
    /// cell is unplaced.
    pub fn possible_bel_pins(&self, pin: CellPinId) -> Vec<BelPinId> {
        let cell = self.netlist.pin(pin).cell;
        let Some(loc) = self.location(cell) else {
            return Vec::new();
        };
        let template = self.template(loc.cluster);
        let bel_type = template.bel(loc.bel).bel_type;
        self.netlist
            .possible_pin_names(pin, bel_type)
            .iter()
            .filter_map(|&name| template.pin_of(loc.bel, name))
            .collect()
    }

    /// Pin templates `pin` could use over every anchor of its cell. Placed
    /// cells only consider the BEL type they sit on.
    pub fn possible_pin_templates(&self, pin: CellPinId) -> Vec<PinTemplateRef> {
        let cell = self.netlist.pin(pin).cell;
        let bel_types = match self.location(cell) {
            Some(loc) => vec![self.template(loc.cluster).bel(loc.bel).bel_type],
            None => self.netlist.lib_of(cell).anchors.clone(),
        };
        let mut refs = Vec::new();
        for bel_type in bel_types {
            for &name in self.netlist.possible_pin_names(pin, bel_type) {
                refs.push(PinTemplateRef {
                    bel_type,
                    pin: name,
                });
            }
        }
        refs
    }

    /// Site index of the BEL `cell` occupies.
    pub fn site_index(&self, cell: CellId) -> Option<u32> {
        let loc = self.location(cell)?;
        Some(self.template(loc.cluster).bel(loc.bel).site_index)
    }
}
