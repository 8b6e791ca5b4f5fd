//! The top-level packing driver.
//!
//! For each seed cell the driver tries every available pack unit type,
//! keeps the cheapest valid cluster, commits it, and promotes carry chains
//! to cluster chains, until no unclustered cells remain. Local
//! infeasibility is data resolved by the strategies' backtracking; the only
//! fatal surface is a seed cell no pack unit type can accept.

use crate::chain::{CarryChainFinder, CarryChainStore, ClusterChainId, ClusterChainStore, Offset};
use crate::cluster::{Cluster, ClusterFactory, ClusterId};
use crate::design::ClusterDesign;
use crate::info::PackingState;
use crate::select::{ClusterCostCalculator, SeedSelector};
use crate::status::PackStatus;
use crate::strategy::PackStrategy;
use crate::utils::PackingUtils;
use mosaic_arch::PackUnitList;
use mosaic_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use mosaic_netlist::{CellDesign, CellId, PinDirection};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Progress reporting while packing.
const CODE_PROGRESS: DiagnosticCode = DiagnosticCode {
    category: Category::Pack,
    number: 1,
};

/// No pack unit type can accept a seed cell.
const CODE_NO_PACK_UNIT: DiagnosticCode = DiagnosticCode {
    category: Category::Pack,
    number: 2,
};

/// Fatal, design-level packing failure: a seed cell no pack unit type can
/// accept. Everything recoverable stays inside the search as
/// [`PackStatus::Infeasible`] and never surfaces here.
#[derive(Debug, thiserror::Error)]
#[error("no pack unit can accept cell {cell}: {detail}")]
pub struct PackError {
    /// Name of the unpackable seed cell.
    pub cell: String,
    /// The cell's unsatisfied input pins, their driving nets, and the
    /// remaining-cell count.
    pub detail: String,
}

/// The output of a successful packing run.
#[derive(Debug)]
pub struct PackedDesign {
    /// The committed clusters.
    pub clusters: ClusterDesign,
    /// Per-cell packing attributes, the handoff contract to placement.
    pub packing: PackingState,
    /// Carry chains discovered before the search.
    pub carry_chains: CarryChainStore,
    /// Chains of committed clusters with relative offsets.
    pub cluster_chains: ClusterChainStore,
}

/// A packer maps every netlist cell into a cluster.
pub trait Packer {
    /// Packs the whole design, or fails with the one fatal error.
    fn pack(
        &mut self,
        design: &mut CellDesign,
        sink: &DiagnosticSink,
    ) -> Result<PackedDesign, PackError>;
}

/// The standard greedy driver over pluggable strategies.
pub struct ClusterPacker {
    units: Arc<PackUnitList>,
    factory: Box<dyn ClusterFactory>,
    seed_selector: Box<dyn SeedSelector>,
    /// Pack strategy per pack unit type name.
    strategies: HashMap<String, Box<dyn PackStrategy>>,
    utils: Box<dyn PackingUtils>,
    cost_calculator: Box<dyn ClusterCostCalculator>,
}

impl ClusterPacker {
    /// Creates a packer from its pluggable parts. `strategies` is keyed by
    /// pack unit type name.
    pub fn new(
        units: Arc<PackUnitList>,
        factory: Box<dyn ClusterFactory>,
        seed_selector: Box<dyn SeedSelector>,
        strategies: HashMap<String, Box<dyn PackStrategy>>,
        utils: Box<dyn PackingUtils>,
        cost_calculator: Box<dyn ClusterCostCalculator>,
    ) -> Self {
        Self {
            units,
            factory,
            seed_selector,
            strategies,
            utils,
            cost_calculator,
        }
    }

    fn seed_failure(
        &self,
        design: &CellDesign,
        seed: CellId,
        remaining: usize,
        sink: &DiagnosticSink,
    ) -> PackError {
        let cell = design.cell(seed);
        let mut pins = Vec::new();
        for &pin in &cell.pins {
            let p = design.pin(pin);
            if p.direction != PinDirection::Input {
                continue;
            }
            if let Some(net) = p.net {
                pins.push(format!("{} <- {}", p.name, design.net(net).name));
            }
        }
        let detail = format!(
            "unsatisfied input pins [{}]; {} cells remain unpacked",
            pins.join(", "),
            remaining
        );
        sink.emit(
            Diagnostic::error(CODE_NO_PACK_UNIT, "no pack unit can accept cell")
                .with_cell(&cell.name)
                .with_note(&detail),
        );
        PackError {
            cell: cell.name.clone(),
            detail,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_cluster(
        &mut self,
        design: &CellDesign,
        packing: &mut PackingState,
        clusters: &mut ClusterDesign,
        carry_chains: &mut CarryChainStore,
        cluster_chains: &mut ClusterChainStore,
        unclustered: &mut HashSet<CellId>,
        best: Cluster,
    ) {
        let id = best.id();
        let placements = best.placements();
        clusters.add_cluster(best);

        // Bind the winning cluster's cells for good.
        for &(cell, bel) in &placements {
            packing.set_valid(cell, false);
            packing.set_cluster(cell, Some(id));
            packing.set_location(cell, Some(bel));
            unclustered.remove(&cell);
        }

        clusters.cluster_mut(id).construct_nets(design);
        build_cluster_chains(packing, clusters, carry_chains, cluster_chains, id);

        let cluster = clusters.cluster(id);
        for strategy in self.strategies.values_mut() {
            strategy.commit_cluster(cluster);
        }
        self.seed_selector.commit_cluster(design, packing, cluster);
        self.factory.commit_cluster(cluster);
    }
}

impl Packer for ClusterPacker {
    fn pack(
        &mut self,
        design: &mut CellDesign,
        sink: &DiagnosticSink,
    ) -> Result<PackedDesign, PackError> {
        self.utils.prepare_design(design);

        let mut packing = PackingState::new(design);
        let mut unclustered: HashSet<CellId> = design.leaf_cells().collect();
        for cell in design.static_source_cells() {
            unclustered.remove(&cell);
        }

        let mut carry_chains = CarryChainStore::new();
        CarryChainFinder::find_carry_chains(&self.units, design, &mut packing, &mut carry_chains);

        for strategy in self.strategies.values_mut() {
            strategy.init(design);
        }
        self.seed_selector.init(&self.units, design, &packing);
        self.factory.init();
        self.cost_calculator.init(&self.units, self.factory.as_ref());

        let mut clusters = ClusterDesign::new();
        let mut cluster_chains = ClusterChainStore::new();

        sink.emit(Diagnostic::note(
            CODE_PROGRESS,
            format!("{} cells to pack", unclustered.len()),
        ));
        let mut last_milestone = unclustered.len() / 1000;

        while !unclustered.is_empty() {
            let milestone = unclustered.len() / 1000;
            if milestone < last_milestone {
                sink.emit(Diagnostic::note(
                    CODE_PROGRESS,
                    format!("{} cells remaining to pack", unclustered.len()),
                ));
                last_milestone = milestone;
            }

            let seed = self
                .seed_selector
                .next_seed(&packing)
                .expect("seed selector exhausted while cells remain unpacked");

            let mut best: Option<Cluster> = None;
            for unit in self.factory.supported_pack_units() {
                if self.factory.num_remaining(unit) == 0 {
                    continue;
                }

                let seed_name = design.cell(seed).name.clone();
                let mut cluster = self.factory.create_new_cluster(&seed_name, unit);
                let type_name = self.units.unit(unit).unit_type.name.clone();
                let strategy = self
                    .strategies
                    .get_mut(&type_name)
                    .unwrap_or_else(|| panic!("no pack strategy for unit type {type_name}"));

                let result =
                    strategy.try_pack_cluster(design, &self.units, &mut packing, &mut cluster, seed);

                if result == PackStatus::Valid {
                    let cost = self.cost_calculator.calculate_cost(
                        &cluster,
                        design,
                        &self.units,
                        self.factory.as_ref(),
                    );
                    cluster.cost = cost;
                    // Unbind so the next type attempt starts clean; the
                    // winner is rebound at commit.
                    for cell in cluster.cells() {
                        packing.unbind(cell);
                    }
                    if best.as_ref().map_or(true, |b| cost < b.cost) {
                        best = Some(cluster);
                    }
                }
            }

            let Some(best) = best else {
                return Err(self.seed_failure(design, seed, unclustered.len(), sink));
            };

            self.commit_cluster(
                design,
                &mut packing,
                &mut clusters,
                &mut carry_chains,
                &mut cluster_chains,
                &mut unclustered,
                best,
            );
        }

        for cluster in clusters.clusters_mut() {
            self.utils.finish(design, cluster);
        }

        Ok(PackedDesign {
            clusters,
            packing,
            carry_chains,
            cluster_chains,
        })
    }
}

/// Promotes the committed cluster's carry chains into cluster chains,
/// merging with the chains of already committed neighbor clusters.
fn build_cluster_chains(
    packing: &PackingState,
    clusters: &mut ClusterDesign,
    carry_chains: &mut CarryChainStore,
    cluster_chains: &mut ClusterChainStore,
    id: ClusterId,
) {
    let cc_cells: Vec<CellId> = clusters
        .cluster(id)
        .cells()
        .into_iter()
        .filter(|&cell| packing.carry_chain_of(cell).is_some())
        .collect();
    if cc_cells.is_empty() {
        return;
    }

    for &cell in &cc_cells {
        let chain = packing.carry_chain_of(cell).unwrap();
        carry_chains.increment_packed_cells(chain);
    }

    let chain_id = cluster_chains.new_chain(id);
    clusters.cluster_mut(id).set_chain(Some(chain_id));

    // Clusters our cells drive through direct connections hang below us.
    let mut end_chains: Vec<ClusterChainId> = Vec::new();
    for &cell in &cc_cells {
        for connection in sorted_connections(&packing.info(cell).sink_carry_chains) {
            let Some(end_cluster) = packing.cluster_of(connection.end_cell) else {
                continue;
            };
            let end_chain = clusters
                .cluster(end_cluster)
                .chain()
                .expect("committed carry cluster has no chain");
            if end_chain != chain_id && !end_chains.contains(&end_chain) {
                end_chains.push(end_chain);
            }
        }
    }
    for end_chain in end_chains {
        cluster_chains.absorb_group(clusters, chain_id, end_chain, Offset::new(1, 0));
    }

    // Clusters driving our cells absorb us below their own position.
    let mut begin_chains: Vec<(ClusterChainId, Offset)> = Vec::new();
    for &cell in &cc_cells {
        for connection in sorted_connections(&packing.info(cell).source_carry_chains) {
            let Some(end_cluster) = packing.cluster_of(connection.end_cell) else {
                continue;
            };
            let chain = clusters
                .cluster(end_cluster)
                .chain()
                .expect("committed carry cluster has no chain");
            if chain != chain_id && !begin_chains.iter().any(|(c, _)| *c == chain) {
                begin_chains.push((chain, cluster_chains.offset_of(chain, end_cluster)));
            }
        }
    }
    for (chain, offset) in begin_chains {
        cluster_chains.absorb_group(clusters, chain, chain_id, offset + Offset::new(1, 0));
    }
}

fn sorted_connections(
    connections: &HashSet<crate::chain::CarryChainConnection>,
) -> Vec<crate::chain::CarryChainConnection> {
    let mut out: Vec<_> = connections.iter().cloned().collect();
    out.sort_by_key(|c| (c.cluster_pin.as_raw(), c.end_cell.as_raw()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::clusters_of_chain;
    use crate::testutil;

    #[test]
    fn packs_connected_lut_cone_into_one_cluster() {
        let mut fix = testutil::and_of_two_luts();
        let mut packer = testutil::packer(&fix);
        let sink = DiagnosticSink::new();

        let packed = packer.pack(&mut fix.design, &sink).unwrap();

        assert_eq!(packed.clusters.len(), 1);
        let cluster = packed.clusters.clusters().next().unwrap();
        for &cell in &fix.cells {
            assert!(cluster.has_cell(cell));
            assert!(!packed.packing.is_valid(cell));
            assert_eq!(packed.packing.cluster_of(cell), Some(cluster.id()));
            assert!(packed.packing.location_of(cell).is_some());
        }
        assert!(!sink.has_errors());
    }

    #[test]
    fn unplaceable_cell_is_a_fatal_error() {
        let mut fix = testutil::with_unplaceable_cell();
        let mut packer = testutil::packer(&fix);
        let sink = DiagnosticSink::new();

        let err = packer.pack(&mut fix.design, &sink).unwrap_err();

        assert_eq!(err.cell, "bram0");
        assert!(err.detail.contains("DI"), "detail: {}", err.detail);
        assert!(err.detail.contains("out"), "detail: {}", err.detail);
        assert!(err.detail.contains("remain unpacked"));
        assert!(sink.has_errors());
        let message = format!("{err}");
        assert!(message.contains("bram0"));
    }

    #[test]
    fn carry_pair_links_clusters_with_offsets() {
        let mut fix = testutil::carry_pair();
        let mut packer = testutil::packer(&fix);
        let sink = DiagnosticSink::new();

        let packed = packer.pack(&mut fix.design, &sink).unwrap();

        // The finder unioned both carry cells into one chain.
        let chain = packed
            .packing
            .carry_chain_of(fix.cells[0])
            .expect("carry chain discovered");
        assert_eq!(packed.packing.carry_chain_of(fix.cells[1]), Some(chain));
        assert_eq!(packed.carry_chains.chain(chain).len(), 2);
        assert_eq!(packed.carry_chains.chain(chain).packed_cell_count(), 2);

        // The two carry cells sit in different single-BEL clusters, linked
        // into one cluster chain offset by one row.
        let cluster_a = packed.packing.cluster_of(fix.cells[0]).unwrap();
        let cluster_b = packed.packing.cluster_of(fix.cells[1]).unwrap();
        assert_ne!(cluster_a, cluster_b);

        let chain_a = packed.clusters.cluster(cluster_a).chain().unwrap();
        let chain_b = packed.clusters.cluster(cluster_b).chain().unwrap();
        assert_eq!(chain_a, chain_b);

        let offset_a = packed.cluster_chains.offset_of(chain_a, cluster_a);
        let offset_b = packed.cluster_chains.offset_of(chain_a, cluster_b);
        assert_eq!(offset_b.rows - offset_a.rows, 1);
        assert_eq!(offset_b.cols, offset_a.cols);

        // The chain's cells resolve to exactly those two clusters.
        let by_chain = clusters_of_chain(&packed.packing, &packed.carry_chains);
        let clusters = &by_chain[&chain];
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn longer_carry_chain_orders_all_clusters() {
        let mut fix = testutil::carry_quad();
        let mut packer = testutil::packer(&fix);
        let sink = DiagnosticSink::new();

        let packed = packer.pack(&mut fix.design, &sink).unwrap();

        let chain = packed
            .clusters
            .cluster(packed.packing.cluster_of(fix.cells[0]).unwrap())
            .chain()
            .unwrap();

        // All four carry clusters share one chain, each one row below its
        // driver.
        let mut offsets = Vec::new();
        for &cell in &fix.cells {
            let cluster = packed.packing.cluster_of(cell).unwrap();
            assert_eq!(packed.clusters.cluster(cluster).chain(), Some(chain));
            offsets.push(packed.cluster_chains.offset_of(chain, cluster).rows);
        }
        for window in offsets.windows(2) {
            assert_eq!(window[1] - window[0], 1);
        }
    }

    #[test]
    fn static_source_cells_are_not_packed() {
        let mut fix = testutil::with_static_nets();
        let mut packer = testutil::packer(&fix);
        let sink = DiagnosticSink::new();

        let packed = packer.pack(&mut fix.design, &sink).unwrap();

        let vcc_cell = fix.design.static_source_cells()[0];
        assert_eq!(packed.packing.cluster_of(vcc_cell), None);
        assert!(packed.packing.is_valid(vcc_cell));
        for cluster in packed.clusters.clusters() {
            assert!(!cluster.has_cell(vcc_cell));
        }
    }

    #[test]
    fn progress_notes_are_emitted() {
        let mut fix = testutil::and_of_two_luts();
        let mut packer = testutil::packer(&fix);
        let sink = DiagnosticSink::new();

        packer.pack(&mut fix.design, &sink).unwrap();

        let notes = sink.diagnostics();
        assert!(!notes.is_empty());
        assert!(notes[0].message.contains("cells to pack"));
    }

    #[test]
    fn committed_clusters_have_constructed_nets() {
        let mut fix = testutil::and_of_two_luts();
        let mut packer = testutil::packer(&fix);
        let sink = DiagnosticSink::new();

        let packed = packer.pack(&mut fix.design, &sink).unwrap();
        for cluster in packed.clusters.clusters() {
            // construct_nets ran at commit; querying does not panic.
            let _ = cluster.internal_nets();
            let _ = cluster.external_nets();
        }
    }
}
