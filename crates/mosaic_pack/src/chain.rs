//! Carry chains and cluster chains.
//!
//! Carry chains are not explicit in the netlist; they are discovered by
//! matching net connections against the direct (non-fabric) connections the
//! pack unit templates advertise. Cells joined by a carry connection must
//! stay electrically contiguous, first as a [`CarryChain`] of cells during
//! packing, then as a [`ClusterChain`] of committed clusters with relative
//! offsets consumed by placement.

use crate::info::PackingState;
use mosaic_arch::PackUnitList;
use mosaic_netlist::{CellDesign, CellId, NetId, PinId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Add;

use crate::cluster::ClusterId;
use crate::design::ClusterDesign;

/// A relative position between chained clusters, in site-grid rows/columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Offset {
    /// Row displacement.
    pub rows: i32,
    /// Column displacement.
    pub cols: i32,
}

impl Offset {
    /// Creates an offset.
    pub fn new(rows: i32, cols: i32) -> Self {
        Self { rows, cols }
    }
}

impl Add for Offset {
    type Output = Offset;

    fn add(self, other: Offset) -> Offset {
        Offset {
            rows: self.rows + other.rows,
            cols: self.cols + other.cols,
        }
    }
}

/// Opaque, copyable ID for a carry chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct CarryChainId(u32);

impl CarryChainId {
    /// Creates an ID from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// Opaque, copyable ID for a cluster chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ClusterChainId(u32);

impl ClusterChainId {
    /// Creates an ID from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// One endpoint of a direct carry link, recorded on both the source and
/// sink cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarryChainConnection {
    /// The cell pin on this side of the link.
    pub cluster_pin: PinId,
    /// The cell on the far side of the link.
    pub end_cell: CellId,
}

/// An unordered set of cells requiring electrical carry continuity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarryChain {
    cells: Vec<CellId>,
    packed_cells: usize,
}

impl CarryChain {
    /// Returns the member cells in discovery order.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Returns `true` if `cell` belongs to this chain.
    pub fn contains(&self, cell: CellId) -> bool {
        self.cells.contains(&cell)
    }

    /// Returns the number of member cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the chain has been emptied by a merge.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns how many member cells have been committed into clusters.
    pub fn packed_cell_count(&self) -> usize {
        self.packed_cells
    }
}

/// Owns every carry chain of a design and implements chain merging.
#[derive(Debug, Default)]
pub struct CarryChainStore {
    chains: Vec<CarryChain>,
}

impl CarryChainStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chain with the given ID.
    pub fn chain(&self, id: CarryChainId) -> &CarryChain {
        &self.chains[id.as_raw() as usize]
    }

    /// Returns the number of chains ever created (including emptied ones).
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns `true` if no chains exist.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Records that a committed cluster consumed one cell of `chain`.
    pub fn increment_packed_cells(&mut self, id: CarryChainId) {
        self.chains[id.as_raw() as usize].packed_cells += 1;
    }

    /// Records a direct carry link from `source_pin` to `sink_pin`, merging
    /// the endpoint cells' chains into one. Idempotent under repeated calls
    /// for the same edge.
    pub fn connect(
        &mut self,
        design: &CellDesign,
        packing: &mut PackingState,
        source_pin: PinId,
        sink_pin: PinId,
    ) -> CarryChainId {
        let source = design.pin(source_pin).cell;
        let sink = design.pin(sink_pin).cell;

        let chain = match (packing.carry_chain_of(source), packing.carry_chain_of(sink)) {
            (Some(chain), other) => {
                self.add_cell(packing, chain, sink);
                if let Some(other) = other {
                    if other != chain {
                        self.absorb(packing, chain, other);
                    }
                }
                chain
            }
            (None, Some(chain)) => {
                self.add_cell(packing, chain, source);
                chain
            }
            (None, None) => {
                let chain = CarryChainId::from_raw(self.chains.len() as u32);
                self.chains.push(CarryChain::default());
                self.add_cell(packing, chain, source);
                self.add_cell(packing, chain, sink);
                chain
            }
        };

        packing.add_sink_carry_chain(
            source,
            CarryChainConnection {
                cluster_pin: source_pin,
                end_cell: sink,
            },
        );
        packing.add_source_carry_chain(
            sink,
            CarryChainConnection {
                cluster_pin: sink_pin,
                end_cell: source,
            },
        );

        chain
    }

    fn add_cell(&mut self, packing: &mut PackingState, chain: CarryChainId, cell: CellId) {
        let entry = &mut self.chains[chain.as_raw() as usize];
        if !entry.cells.contains(&cell) {
            entry.cells.push(cell);
        }
        packing.set_carry_chain(cell, Some(chain));
    }

    fn absorb(&mut self, packing: &mut PackingState, into: CarryChainId, other: CarryChainId) {
        let moved = std::mem::take(&mut self.chains[other.as_raw() as usize].cells);
        for cell in moved {
            self.add_cell(packing, into, cell);
        }
    }
}

/// An ordered offset map of committed clusters chained by carry continuity.
#[derive(Debug, Clone, Default)]
pub struct ClusterChain {
    clusters: Vec<(ClusterId, Offset)>,
}

impl ClusterChain {
    /// Returns the member clusters with their offsets, in absorption order.
    pub fn clusters(&self) -> &[(ClusterId, Offset)] {
        &self.clusters
    }

    /// Returns `true` if the chain has been emptied by a merge.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Owns every cluster chain of a packed design.
#[derive(Debug, Default)]
pub struct ClusterChainStore {
    chains: Vec<ClusterChain>,
}

impl ClusterChainStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain containing only `cluster` at offset zero.
    pub fn new_chain(&mut self, cluster: ClusterId) -> ClusterChainId {
        let id = ClusterChainId::from_raw(self.chains.len() as u32);
        self.chains.push(ClusterChain {
            clusters: vec![(cluster, Offset::default())],
        });
        id
    }

    /// Returns the chain with the given ID.
    pub fn chain(&self, id: ClusterChainId) -> &ClusterChain {
        &self.chains[id.as_raw() as usize]
    }

    /// Returns the number of chains ever created (including emptied ones).
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns `true` if no chains exist.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Returns the offset of `cluster` within chain `id`.
    ///
    /// # Panics
    ///
    /// Panics if the cluster is not in the chain.
    pub fn offset_of(&self, id: ClusterChainId, cluster: ClusterId) -> Offset {
        self.chain(id)
            .clusters
            .iter()
            .find(|(c, _)| *c == cluster)
            .map(|(_, o)| *o)
            .unwrap_or_else(|| panic!("cluster {cluster} is not in chain"))
    }

    /// Re-keys every cluster of `other` by `offset` into `into`, updating
    /// each moved cluster's chain reference, then empties `other`.
    pub fn absorb_group(
        &mut self,
        clusters: &mut ClusterDesign,
        into: ClusterChainId,
        other: ClusterChainId,
        offset: Offset,
    ) {
        assert_ne!(into, other, "a chain cannot absorb itself");
        let moved = std::mem::take(&mut self.chains[other.as_raw() as usize].clusters);
        for (cluster, off) in moved {
            clusters.cluster_mut(cluster).set_chain(Some(into));
            self.chains[into.as_raw() as usize]
                .clusters
                .push((cluster, off + offset));
        }
    }
}

/// Discovers carry chains by matching nets against template direct sinks.
///
/// This is a static pre-pass over the whole design, run once before the
/// backtracking search; nets are visited in name order for reproducibility.
pub struct CarryChainFinder;

impl CarryChainFinder {
    /// Scans `design` and records every discovered carry link in `chains`.
    pub fn find_carry_chains(
        units: &PackUnitList,
        design: &CellDesign,
        packing: &mut PackingState,
        chains: &mut CarryChainStore,
    ) {
        let mut net_ids: Vec<NetId> = design.nets.ids().collect();
        net_ids.sort_by(|a, b| design.net(*a).name.cmp(&design.net(*b).name));

        for net in net_ids {
            if design.net(net).is_static() {
                continue;
            }
            let Some(source_pin) = design.net_source_pin(net) else {
                continue;
            };
            let direct_sinks = Self::direct_sinks(units, design, source_pin);
            if direct_sinks.is_empty() {
                continue;
            }

            for sink_pin in design.net_sink_pins(net) {
                let sink_cell = design.pin(sink_pin).cell;
                let sink_kind = design.kind_of(sink_cell);
                let sink_pin_name = design.pin(sink_pin).name.clone();
                for (end_bel_kind, end_pin_name) in &direct_sinks {
                    let names = sink_kind.possible_bel_pin_names(&sink_pin_name, end_bel_kind);
                    if names.iter().any(|n| n == end_pin_name) {
                        chains.connect(design, packing, source_pin, sink_pin);
                        break;
                    }
                }
            }
        }
    }

    /// Returns the `(end BEL kind, end pin name)` of every template direct
    /// sink the source pin could drive.
    fn direct_sinks(
        units: &PackUnitList,
        design: &CellDesign,
        source_pin: PinId,
    ) -> Vec<(String, String)> {
        let cell = design.pin(source_pin).cell;
        let kind = design.kind_of(cell);
        let pin_name = &design.pin(source_pin).name;

        let mut out = Vec::new();
        for unit in units.units() {
            let template = &unit.template;
            for dc in &template.direct_sinks_of_cluster {
                let source_bel = template.bel(dc.cluster_pin.bel);
                if !kind.is_compatible_with(&source_bel.kind) {
                    continue;
                }
                let source_bel_pin = &template.bel_pin(dc.cluster_pin).name;
                let possible = kind.possible_bel_pin_names(pin_name, &source_bel.kind);
                if !possible.iter().any(|n| n == source_bel_pin) {
                    continue;
                }
                out.push((dc.end_pin.bel_kind.clone(), dc.end_pin.name.clone()));
            }
        }
        out
    }
}

/// Builds a lookup from carry chain ID to the committed clusters holding
/// its cells, useful for reporting.
pub fn clusters_of_chain(
    packing: &PackingState,
    chains: &CarryChainStore,
) -> HashMap<CarryChainId, Vec<ClusterId>> {
    let mut out: HashMap<CarryChainId, Vec<ClusterId>> = HashMap::new();
    for raw in 0..chains.len() {
        let id = CarryChainId::from_raw(raw as u32);
        let mut clusters = Vec::new();
        for &cell in chains.chain(id).cells() {
            if let Some(cluster) = packing.cluster_of(cell) {
                if !clusters.contains(&cluster) {
                    clusters.push(cluster);
                }
            }
        }
        out.insert(id, clusters);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;
    use crate::testutil;

    #[test]
    fn offset_addition() {
        let a = Offset::new(1, 0);
        let b = Offset::new(2, 3);
        assert_eq!(a + b, Offset::new(3, 3));
        assert_eq!(a + Offset::default(), a);
    }

    #[test]
    fn connect_builds_a_chain() {
        let fix = testutil::carry_pair();
        let mut packing = PackingState::new(&fix.design);
        let mut store = CarryChainStore::new();

        let chain = store.connect(&fix.design, &mut packing, fix.source_pin, fix.sink_pin);
        assert_eq!(store.chain(chain).len(), 2);
        assert_eq!(packing.carry_chain_of(fix.cells[0]), Some(chain));
        assert_eq!(packing.carry_chain_of(fix.cells[1]), Some(chain));

        // Connection endpoints recorded on both cells.
        assert_eq!(packing.info(fix.cells[0]).sink_carry_chains.len(), 1);
        assert_eq!(packing.info(fix.cells[1]).source_carry_chains.len(), 1);
    }

    #[test]
    fn connect_is_idempotent() {
        let fix = testutil::carry_pair();
        let mut packing = PackingState::new(&fix.design);
        let mut store = CarryChainStore::new();

        let first = store.connect(&fix.design, &mut packing, fix.source_pin, fix.sink_pin);
        let second = store.connect(&fix.design, &mut packing, fix.source_pin, fix.sink_pin);

        assert_eq!(first, second);
        assert_eq!(store.chain(first).len(), 2);
        assert_eq!(packing.info(fix.cells[0]).sink_carry_chains.len(), 1);
        assert_eq!(packing.info(fix.cells[1]).source_carry_chains.len(), 1);
    }

    #[test]
    fn connect_merges_two_chains() {
        let fix = testutil::carry_quad();
        let mut packing = PackingState::new(&fix.design);
        let mut store = CarryChainStore::new();

        // Two disjoint chains: (c0 -> c1) and (c2 -> c3).
        let left = store.connect(&fix.design, &mut packing, fix.pins[0].0, fix.pins[0].1);
        let right = store.connect(&fix.design, &mut packing, fix.pins[2].0, fix.pins[2].1);
        assert_ne!(left, right);

        // Linking c1 -> c2 merges them; all four cells share one chain.
        let merged = store.connect(&fix.design, &mut packing, fix.pins[1].0, fix.pins[1].1);
        assert_eq!(store.chain(merged).len(), 4);
        for &cell in &fix.cells {
            assert_eq!(packing.carry_chain_of(cell), Some(merged));
        }
        // The absorbed chain is emptied.
        let emptied = if merged == left { right } else { left };
        assert!(store.chain(emptied).is_empty());
    }

    #[test]
    fn finder_discovers_direct_carry_links() {
        let fix = testutil::carry_pair();
        let mut packing = PackingState::new(&fix.design);
        let mut store = CarryChainStore::new();

        CarryChainFinder::find_carry_chains(&fix.units, &fix.design, &mut packing, &mut store);

        let chain = packing.carry_chain_of(fix.cells[0]).expect("chain found");
        assert_eq!(packing.carry_chain_of(fix.cells[1]), Some(chain));
        assert_eq!(store.chain(chain).len(), 2);
    }

    #[test]
    fn finder_ignores_plain_nets() {
        let fix = testutil::and_of_two_luts();
        let mut packing = PackingState::new(&fix.design);
        let mut store = CarryChainStore::new();

        CarryChainFinder::find_carry_chains(&fix.units, &fix.design, &mut packing, &mut store);

        assert!(store.is_empty());
        for &cell in &fix.cells {
            assert_eq!(packing.carry_chain_of(cell), None);
        }
    }

    #[test]
    fn cluster_chain_absorb_rekeys_offsets() {
        let fix = testutil::slice_fixture();
        let mut design = ClusterDesign::new();
        let a = design.add_cluster(Cluster::new(
            ClusterId::from_raw(0),
            "a",
            fix.units.unit(fix.slice_unit),
        ));
        let b = design.add_cluster(Cluster::new(
            ClusterId::from_raw(1),
            "b",
            fix.units.unit(fix.slice_unit),
        ));

        let mut store = ClusterChainStore::new();
        let chain_a = store.new_chain(a);
        let chain_b = store.new_chain(b);
        design.cluster_mut(a).set_chain(Some(chain_a));
        design.cluster_mut(b).set_chain(Some(chain_b));

        store.absorb_group(&mut design, chain_a, chain_b, Offset::new(1, 0));

        assert_eq!(store.offset_of(chain_a, a), Offset::default());
        assert_eq!(store.offset_of(chain_a, b), Offset::new(1, 0));
        assert!(store.chain(chain_b).is_empty());
        assert_eq!(design.cluster(b).chain(), Some(chain_a));
    }

    #[test]
    #[should_panic(expected = "cannot absorb itself")]
    fn chain_self_absorb_panics() {
        let fix = testutil::slice_fixture();
        let mut design = ClusterDesign::new();
        let a = design.add_cluster(Cluster::new(
            ClusterId::from_raw(0),
            "a",
            fix.units.unit(fix.slice_unit),
        ));
        let mut store = ClusterChainStore::new();
        let chain = store.new_chain(a);
        store.absorb_group(&mut design, chain, chain, Offset::new(1, 0));
    }

    #[test]
    fn packed_cell_counter() {
        let fix = testutil::carry_pair();
        let mut packing = PackingState::new(&fix.design);
        let mut store = CarryChainStore::new();
        let chain = store.connect(&fix.design, &mut packing, fix.source_pin, fix.sink_pin);

        assert_eq!(store.chain(chain).packed_cell_count(), 0);
        store.increment_packed_cells(chain);
        store.increment_packed_cells(chain);
        assert_eq!(store.chain(chain).packed_cell_count(), 2);
    }
}
