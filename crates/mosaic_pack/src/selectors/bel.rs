//! BEL selection by static base cost.

use crate::cluster::{possible_anchors, Cluster};
use crate::select::BelSelector;
use mosaic_arch::{BelId, PackUnitList};
use mosaic_netlist::{CellDesign, CellId};
use std::collections::{HashMap, HashSet};

/// Offers compatible, unoccupied BELs cheapest-first.
///
/// Costs come from a per-BEL-kind base cost table (default 1.0); ties break
/// toward lower BEL IDs, keeping candidate order deterministic. The queue
/// remaining when a generation commits is saved so a later rollback resumes
/// the committed cell's exploration at its next untried BEL.
pub struct LowestCostBelSelector {
    base_costs: HashMap<String, f64>,
    queue: Vec<BelId>,
    committed_queues: Vec<Vec<BelId>>,
}

impl LowestCostBelSelector {
    /// Creates a selector with the given per-BEL-kind base costs.
    pub fn new(base_costs: HashMap<String, f64>) -> Self {
        Self {
            base_costs,
            queue: Vec::new(),
            committed_queues: Vec::new(),
        }
    }

    fn cost_of(&self, kind: &str) -> f64 {
        self.base_costs.get(kind).copied().unwrap_or(1.0)
    }
}

impl Default for LowestCostBelSelector {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl BelSelector for LowestCostBelSelector {
    fn init(&mut self, _design: &CellDesign) {}

    fn init_cluster(&mut self, _units: &PackUnitList, _cluster: &Cluster) {
        self.queue.clear();
        self.committed_queues.clear();
    }

    fn init_cell(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        cluster: &Cluster,
        cell: CellId,
        forced: Option<&HashSet<BelId>>,
    ) {
        let template = units.template(cluster.unit());
        let mut candidates = possible_anchors(design, template, cell);
        if let Some(forced) = forced {
            candidates.retain(|bel| forced.contains(bel));
        }
        candidates.retain(|&bel| !cluster.is_bel_occupied(bel));
        candidates.sort_by(|&a, &b| {
            let ca = self.cost_of(&template.bel(a).kind);
            let cb = self.cost_of(&template.bel(b).kind);
            ca.partial_cmp(&cb)
                .unwrap()
                .then(a.as_raw().cmp(&b.as_raw()))
        });
        self.queue = candidates;
    }

    fn next_bel(&mut self) -> Option<BelId> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    fn commit_bels(&mut self, _bels: &[BelId]) {
        // Save the committed cell's untried candidates for rollback.
        self.committed_queues.push(std::mem::take(&mut self.queue));
    }

    fn revert_to_last_commit(&mut self) {
        self.queue.clear();
    }

    fn roll_back_last_commit(&mut self) {
        self.queue = self.committed_queues.pop().unwrap_or_default();
    }

    fn cleanup_cluster(&mut self) {
        self.queue.clear();
        self.committed_queues.clear();
    }
}
