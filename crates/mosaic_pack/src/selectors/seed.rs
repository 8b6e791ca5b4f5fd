//! Seed selection by external input pin count.

use crate::cluster::Cluster;
use crate::info::PackingState;
use crate::select::SeedSelector;
use mosaic_arch::PackUnitList;
use mosaic_netlist::{CellDesign, CellId, PinDirection};
use std::collections::{HashMap, HashSet, VecDeque};

/// Seeds clusters with the cell using the most external inputs.
///
/// Cells are bucketed by how many of their input pins are not sourced by
/// the cell itself; within a bucket, cells with fewer exposed pins come
/// first. Cells of partially packed carry chains preempt the buckets in
/// FIFO order so a chain is never split across incompatible cluster types.
pub struct HighestPinCountSeedSelector {
    max_cell_inputs: usize,
    unclustered: HashMap<usize, Vec<CellId>>,
    carry_queue: VecDeque<CellId>,
    carry_set: HashSet<CellId>,
}

impl HighestPinCountSeedSelector {
    /// Creates an uninitialized selector.
    pub fn new() -> Self {
        Self {
            max_cell_inputs: 0,
            unclustered: HashMap::new(),
            carry_queue: VecDeque::new(),
            carry_set: HashSet::new(),
        }
    }

    fn external_input_count(design: &CellDesign, cell: CellId) -> usize {
        let mut count = 0;
        for &pin in &design.cell(cell).pins {
            if design.pin(pin).direction != PinDirection::Input {
                continue;
            }
            if !Self::sourced_internally(design, cell, pin) {
                count += 1;
            }
        }
        count
    }

    fn sourced_internally(design: &CellDesign, cell: CellId, pin: mosaic_netlist::PinId) -> bool {
        let Some(net) = design.pin(pin).net else {
            return false;
        };
        let Some(source) = design.net_source_pin(net) else {
            return false;
        };
        design.pin(source).cell == cell
    }
}

impl Default for HighestPinCountSeedSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedSelector for HighestPinCountSeedSelector {
    fn init(&mut self, _units: &PackUnitList, design: &CellDesign, _packing: &PackingState) {
        self.unclustered.clear();
        self.max_cell_inputs = 0;

        for cell in design.leaf_cells() {
            let inputs = Self::external_input_count(design, cell);
            self.unclustered.entry(inputs).or_default().push(cell);
            if inputs > self.max_cell_inputs {
                self.max_cell_inputs = inputs;
            }
        }

        // Within a bucket, fewer exposed pins first.
        for bucket in self.unclustered.values_mut() {
            bucket.sort_by_key(|&cell| (design.exposed_pin_count(cell), cell.as_raw()));
        }
    }

    fn next_seed(&mut self, packing: &PackingState) -> Option<CellId> {
        // Exhaust partially packed carry chains first.
        while let Some(cell) = self.carry_queue.pop_front() {
            self.carry_set.remove(&cell);
            if packing.is_valid(cell) {
                return Some(cell);
            }
        }

        for inputs in (0..=self.max_cell_inputs).rev() {
            let Some(bucket) = self.unclustered.get(&inputs) else {
                continue;
            };
            let cell = bucket[0];
            debug_assert!(packing.is_valid(cell));
            return Some(cell);
        }
        None
    }

    fn commit_cluster(&mut self, design: &CellDesign, packing: &PackingState, cluster: &Cluster) {
        for cell in cluster.cells() {
            let inputs = Self::external_input_count(design, cell);
            if let Some(bucket) = self.unclustered.get_mut(&inputs) {
                bucket.retain(|&c| c != cell);
                if bucket.is_empty() {
                    self.unclustered.remove(&inputs);
                }
            }
            if self.carry_set.remove(&cell) {
                self.carry_queue.retain(|&c| c != cell);
            }

            // Queue this cell's unclustered carry partners.
            let info = packing.info(cell);
            for connection in info
                .sink_carry_chains
                .iter()
                .chain(info.source_carry_chains.iter())
            {
                let end = connection.end_cell;
                if packing.cluster_of(end).is_none() && self.carry_set.insert(end) {
                    self.carry_queue.push_back(end);
                }
            }
        }
    }
}
