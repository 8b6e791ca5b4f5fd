//! Cluster cost by resource utilization and remaining availability.

use crate::cluster::{Cluster, ClusterFactory};
use crate::select::ClusterCostCalculator;
use mosaic_arch::PackUnitList;
use mosaic_netlist::CellDesign;

const BEL_UTILIZATION_FACTOR: f64 = 0.5;
const PIN_UTILIZATION_FACTOR: f64 = 0.2;
const REMAINING_TYPES_FACTOR: f64 = 0.3;

/// Scores clusters by how well they use their pack unit.
///
/// Dense clusters on plentiful unit types score low (good); sparse
/// clusters on scarce types score high, steering the driver away from
/// wasting rare resources.
pub struct UtilizationClusterCostCalculator {
    max_available: f64,
}

impl UtilizationClusterCostCalculator {
    /// Creates an uninitialized calculator.
    pub fn new() -> Self {
        Self { max_available: 1.0 }
    }

    fn bel_utilization(cluster: &Cluster, units: &PackUnitList) -> f64 {
        let bels = units.template(cluster.unit()).bel_count();
        cluster.cell_count() as f64 / bels as f64
    }

    fn pin_utilization(cluster: &Cluster, design: &CellDesign, units: &PackUnitList) -> f64 {
        let template = units.template(cluster.unit());
        let bel_pins: usize = template.bels().iter().map(|b| b.pins.len()).sum();
        if bel_pins == 0 {
            return 0.0;
        }
        let cell_pins: usize = cluster
            .cells()
            .iter()
            .map(|&cell| {
                design
                    .cell(cell)
                    .pins
                    .iter()
                    .filter(|&&p| design.pin(p).is_connected())
                    .count()
            })
            .sum();
        cell_pins as f64 / bel_pins as f64
    }
}

impl Default for UtilizationClusterCostCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterCostCalculator for UtilizationClusterCostCalculator {
    fn init(&mut self, _units: &PackUnitList, factory: &dyn ClusterFactory) {
        self.max_available = factory
            .supported_pack_units()
            .into_iter()
            .map(|unit| factory.num_remaining(unit))
            .max()
            .unwrap_or(1)
            .max(1) as f64;
    }

    fn calculate_cost(
        &self,
        cluster: &Cluster,
        design: &CellDesign,
        units: &PackUnitList,
        factory: &dyn ClusterFactory,
    ) -> f64 {
        let bel_utilization = Self::bel_utilization(cluster, units);
        let pin_utilization = Self::pin_utilization(cluster, design, units);
        let availability = factory.num_remaining(cluster.unit()) as f64 / self.max_available;

        1.0 / (bel_utilization * BEL_UTILIZATION_FACTOR
            + pin_utilization * PIN_UTILIZATION_FACTOR
            + availability * REMAINING_TYPES_FACTOR)
    }
}
