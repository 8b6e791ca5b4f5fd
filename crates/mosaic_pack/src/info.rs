//! Per-cell packing state, kept in a table parallel to the cell arena.
//!
//! The search mutates three things: the cluster being grown, the selectors'
//! own stacks, and this table. Every field here has an exact inverse
//! reachable through the engine's rollback path; nothing else in the
//! netlist is touched during packing.

use crate::chain::{CarryChainConnection, CarryChainId};
use crate::cluster::ClusterId;
use mosaic_arch::BelId;
use mosaic_netlist::{CellDesign, CellId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Packing state for one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackingInfo {
    /// `false` while the cell is bound into a (tentative or committed)
    /// cluster, or temporarily invalidated during a packing attempt.
    pub is_valid: bool,
    /// The cluster the cell is bound to, if any.
    pub cluster: Option<ClusterId>,
    /// The BEL the cell occupies within its cluster, if any.
    pub location: Option<BelId>,
    /// The carry chain the cell belongs to, if any.
    pub carry_chain: Option<CarryChainId>,
    /// Base gain assigned before packing starts.
    pub initial_gain: f64,
    /// Current gain used by selection heuristics.
    pub gain: f64,
    /// Direct carry connections this cell sources.
    pub sink_carry_chains: HashSet<CarryChainConnection>,
    /// Direct carry connections this cell sinks.
    pub source_carry_chains: HashSet<CarryChainConnection>,
}

impl Default for PackingInfo {
    fn default() -> Self {
        Self {
            is_valid: true,
            cluster: None,
            location: None,
            carry_chain: None,
            initial_gain: 0.0,
            gain: f64::MAX,
            sink_carry_chains: HashSet::new(),
            source_carry_chains: HashSet::new(),
        }
    }
}

/// Packing state for every cell of a design, indexed by [`CellId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackingState {
    infos: Vec<PackingInfo>,
}

impl PackingState {
    /// Creates a fresh state table with one default entry per design cell.
    pub fn new(design: &CellDesign) -> Self {
        Self {
            infos: (0..design.cell_count())
                .map(|_| PackingInfo::default())
                .collect(),
        }
    }

    /// Returns the info for `cell`.
    pub fn info(&self, cell: CellId) -> &PackingInfo {
        &self.infos[cell.as_raw() as usize]
    }

    /// Returns the mutable info for `cell`.
    pub fn info_mut(&mut self, cell: CellId) -> &mut PackingInfo {
        &mut self.infos[cell.as_raw() as usize]
    }

    /// Returns whether `cell` is currently selectable for packing.
    pub fn is_valid(&self, cell: CellId) -> bool {
        self.info(cell).is_valid
    }

    /// Sets the validity flag of `cell`.
    pub fn set_valid(&mut self, cell: CellId, valid: bool) {
        self.info_mut(cell).is_valid = valid;
    }

    /// Returns the cluster `cell` is bound to, if any.
    pub fn cluster_of(&self, cell: CellId) -> Option<ClusterId> {
        self.info(cell).cluster
    }

    /// Binds or unbinds the cluster of `cell`.
    pub fn set_cluster(&mut self, cell: CellId, cluster: Option<ClusterId>) {
        self.info_mut(cell).cluster = cluster;
    }

    /// Returns the BEL `cell` occupies, if any.
    pub fn location_of(&self, cell: CellId) -> Option<BelId> {
        self.info(cell).location
    }

    /// Sets or clears the BEL of `cell`.
    pub fn set_location(&mut self, cell: CellId, location: Option<BelId>) {
        self.info_mut(cell).location = location;
    }

    /// Returns the carry chain of `cell`, if any.
    pub fn carry_chain_of(&self, cell: CellId) -> Option<CarryChainId> {
        self.info(cell).carry_chain
    }

    /// Sets or clears the carry chain of `cell`.
    pub fn set_carry_chain(&mut self, cell: CellId, chain: Option<CarryChainId>) {
        self.info_mut(cell).carry_chain = chain;
    }

    /// Records a carry connection this cell sources.
    pub fn add_sink_carry_chain(&mut self, cell: CellId, connection: CarryChainConnection) {
        self.info_mut(cell).sink_carry_chains.insert(connection);
    }

    /// Records a carry connection this cell sinks.
    pub fn add_source_carry_chain(&mut self, cell: CellId, connection: CarryChainConnection) {
        self.info_mut(cell).source_carry_chains.insert(connection);
    }

    /// Restores `cell` to the unbound state: selectable, no cluster, no BEL.
    pub fn unbind(&mut self, cell: CellId) {
        let info = self.info_mut(cell);
        info.is_valid = true;
        info.cluster = None;
        info.location = None;
    }

    /// Returns the number of cells tracked.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}
