//! Default prepacker implementations.

use crate::cluster::{possible_anchors, Cluster};
use crate::info::PackingState;
use crate::prepack::{Prepacker, PrepackerFactory, PrepackStatus};
use crate::strategy::{add_cell_to_cluster, PackedCells};
use crate::status::PackStatus;
use mosaic_arch::PackUnitTemplate;
use mosaic_netlist::{CellDesign, CellId};
use std::collections::HashMap;
use std::sync::Arc;

/// Forces tightly paired cells into the same cluster.
///
/// The factory holds a symmetric pairing table (e.g., a LUT driving only
/// one flip-flop's data input). Whenever one half of a pair is tentatively
/// placed, the prepacker places the other half on a free compatible BEL;
/// if the partner is stuck elsewhere or no BEL remains, the placement is
/// infeasible.
pub struct ForcedPairPrepackerFactory {
    pairs: Arc<HashMap<CellId, CellId>>,
}

impl ForcedPairPrepackerFactory {
    /// Creates a factory from a pairing table; each entry is recorded in
    /// both directions.
    pub fn new(pairs: HashMap<CellId, CellId>) -> Self {
        let mut symmetric = HashMap::new();
        for (&a, &b) in &pairs {
            symmetric.insert(a, b);
            symmetric.insert(b, a);
        }
        Self {
            pairs: Arc::new(symmetric),
        }
    }
}

impl PrepackerFactory for ForcedPairPrepackerFactory {
    fn make(&self) -> Box<dyn Prepacker> {
        Box::new(ForcedPairPrepacker {
            pairs: Arc::clone(&self.pairs),
        })
    }
}

/// See [`ForcedPairPrepackerFactory`].
pub struct ForcedPairPrepacker {
    pairs: Arc<HashMap<CellId, CellId>>,
}

impl Prepacker for ForcedPairPrepacker {
    fn pack_required(
        &mut self,
        design: &CellDesign,
        template: &PackUnitTemplate,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        changed: &mut PackedCells,
    ) -> PrepackStatus {
        let mut status = PrepackStatus::Unchanged;

        let placed: Vec<CellId> = changed.cells().collect();
        for cell in placed {
            let Some(&partner) = self.pairs.get(&cell) else {
                continue;
            };
            if cluster.has_cell(partner) {
                continue;
            }
            // The partner is spoken for elsewhere (committed or
            // invalidated this attempt).
            if !packing.is_valid(partner) || packing.cluster_of(partner).is_some() {
                return PrepackStatus::Infeasible;
            }

            let Some(bel) = possible_anchors(design, template, partner)
                .into_iter()
                .find(|&bel| !cluster.is_bel_occupied(bel))
            else {
                return PrepackStatus::Infeasible;
            };

            if add_cell_to_cluster(packing, cluster, partner, bel) == PackStatus::Infeasible {
                return PrepackStatus::Infeasible;
            }
            changed.insert(partner, bel);
            status = PrepackStatus::Changed;
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterFactory;
    use crate::strategy::{MultiBelPackStrategy, PackStrategy};
    use crate::testutil;
    use mosaic_arch::BelId;

    fn pair_table(fix: &testutil::Fixture) -> HashMap<CellId, CellId> {
        let mut pairs = HashMap::new();
        pairs.insert(fix.cells[2], fix.cells[0]);
        pairs
    }

    #[test]
    fn places_the_partner_of_a_placed_cell() {
        let fix = testutil::and_of_two_luts();
        let mut packing = PackingState::new(&fix.design);
        let mut factory = testutil::factory(&fix);
        let mut cluster = factory.create_new_cluster("c0", fix.slice_unit);
        let template = fix.units.template(fix.slice_unit);

        let prepacker_factory = ForcedPairPrepackerFactory::new(pair_table(&fix));
        let mut prepacker = prepacker_factory.make();

        let mut changed = PackedCells::new();
        add_cell_to_cluster(&mut packing, &mut cluster, fix.cells[2], BelId::from_raw(0));
        changed.insert(fix.cells[2], BelId::from_raw(0));

        let status = prepacker.pack_required(
            &fix.design,
            template,
            &mut packing,
            &mut cluster,
            &mut changed,
        );

        assert_eq!(status, PrepackStatus::Changed);
        assert!(cluster.has_cell(fix.cells[0]));
        assert!(changed.contains(fix.cells[0]));

        // A second pass has nothing left to add.
        let status = prepacker.pack_required(
            &fix.design,
            template,
            &mut packing,
            &mut cluster,
            &mut changed,
        );
        assert_eq!(status, PrepackStatus::Unchanged);
    }

    #[test]
    fn partner_bound_elsewhere_is_infeasible() {
        let fix = testutil::and_of_two_luts();
        let mut packing = PackingState::new(&fix.design);
        let mut factory = testutil::factory(&fix);
        let mut cluster = factory.create_new_cluster("c0", fix.slice_unit);
        let template = fix.units.template(fix.slice_unit);

        // Partner already belongs to some other cluster.
        packing.set_valid(fix.cells[0], false);
        packing.set_cluster(fix.cells[0], Some(crate::cluster::ClusterId::from_raw(42)));

        let prepacker_factory = ForcedPairPrepackerFactory::new(pair_table(&fix));
        let mut prepacker = prepacker_factory.make();

        let mut changed = PackedCells::new();
        add_cell_to_cluster(&mut packing, &mut cluster, fix.cells[2], BelId::from_raw(0));
        changed.insert(fix.cells[2], BelId::from_raw(0));

        let status = prepacker.pack_required(
            &fix.design,
            template,
            &mut packing,
            &mut cluster,
            &mut changed,
        );
        assert_eq!(status, PrepackStatus::Infeasible);
    }

    #[test]
    fn engine_reaches_fixed_point_with_prepacker() {
        let fix = testutil::and_of_two_luts();
        let mut packing = PackingState::new(&fix.design);
        let mut factory = testutil::factory(&fix);

        let mut strategy = MultiBelPackStrategy::new(
            Box::new(crate::selectors::SharedNetsCellSelector::new(false)),
            Box::new(crate::selectors::LowestCostBelSelector::default()),
            vec![Box::new(ForcedPairPrepackerFactory::new(pair_table(&fix)))],
            vec![],
        );
        strategy.init(&fix.design);

        let mut cluster = factory.create_new_cluster("c0", fix.slice_unit);
        let result = strategy.try_pack_cluster(
            &fix.design,
            &fix.units,
            &mut packing,
            &mut cluster,
            fix.cells[2],
        );

        assert_eq!(result, PackStatus::Valid);
        // The pair landed together in the very first generation.
        assert!(cluster.has_cell(fix.cells[0]));
        assert!(cluster.has_cell(fix.cells[2]));
    }
}
