//! Default pack rule implementations.

use crate::cluster::{possible_anchors, Cluster};
use crate::info::PackingState;
use crate::rule::{PackRule, PackRuleFactory, PackRuleResult};
use crate::status::PackStatus;
use crate::undo::UndoMap;
use mosaic_arch::{BelId, PackUnitList};
use mosaic_netlist::{CellDesign, CellId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Demands that a reserved source cell eventually joins the cluster.
///
/// The factory is configured with a reservation table mapping dependent
/// cells to the source cell that must share their cluster (e.g., a
/// flip-flop absorbing the fabric-facing output of a carry element). While
/// a reserved source is still unplaced, the rule answers `Conditional`
/// naming the source's free compatible BELs; once no such BEL remains, the
/// answer hardens to `Infeasible`.
pub struct ReserveBelForSourceRuleFactory {
    reservations: Arc<HashMap<CellId, CellId>>,
}

impl ReserveBelForSourceRuleFactory {
    /// Creates a factory from a dependent-cell to source-cell table.
    pub fn new(reservations: HashMap<CellId, CellId>) -> Self {
        Self {
            reservations: Arc::new(reservations),
        }
    }
}

impl PackRuleFactory for ReserveBelForSourceRuleFactory {
    fn make(&self, _cluster: &Cluster) -> Box<dyn PackRule> {
        Box::new(ReserveBelForSourceRule {
            reservations: Arc::clone(&self.reservations),
            cells_to_check: UndoMap::new(),
        })
    }
}

/// See [`ReserveBelForSourceRuleFactory`].
pub struct ReserveBelForSourceRule {
    reservations: Arc<HashMap<CellId, CellId>>,
    /// Dependent cells in the cluster whose source is still outstanding.
    cells_to_check: UndoMap<CellId, CellId>,
}

impl ReserveBelForSourceRule {
    fn available_bels(
        &self,
        design: &CellDesign,
        units: &PackUnitList,
        cluster: &Cluster,
        cell: CellId,
    ) -> HashSet<BelId> {
        let template = units.template(cluster.unit());
        possible_anchors(design, template, cell)
            .into_iter()
            .filter(|&bel| !cluster.is_bel_occupied(bel))
            .collect()
    }
}

impl PackRule for ReserveBelForSourceRule {
    fn validate(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        packing: &PackingState,
        cluster: &Cluster,
        changed: &[CellId],
    ) -> PackRuleResult {
        self.cells_to_check.checkpoint();

        for &cell in changed {
            if let Some(&source) = self.reservations.get(&cell) {
                self.cells_to_check.insert(cell, source);
            }
        }

        let mut entries: Vec<(CellId, CellId)> = self
            .cells_to_check
            .iter()
            .map(|(&dep, &src)| (dep, src))
            .collect();
        entries.sort_by_key(|(dep, _)| dep.as_raw());

        let mut status = PackStatus::Valid;
        let mut conditionals: HashMap<CellId, HashSet<BelId>> = HashMap::new();
        for (dependent, source) in entries {
            if packing.cluster_of(source).is_some() {
                // Source landed somewhere (usually this cluster); the
                // reservation is discharged.
                self.cells_to_check.remove(&dependent);
                continue;
            }
            status = PackStatus::Conditional;
            let available = self.available_bels(design, units, cluster, source);
            if available.is_empty() {
                status = PackStatus::Infeasible;
                break;
            }
            conditionals.insert(source, available);
        }

        match status {
            PackStatus::Conditional => PackRuleResult::conditional(conditionals),
            PackStatus::Valid => PackRuleResult::valid(),
            PackStatus::Infeasible => PackRuleResult::infeasible(),
        }
    }

    fn revert(&mut self) {
        self.cells_to_check.rollback();
    }
}
