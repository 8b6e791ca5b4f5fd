//! Cell selection by shared-net and shared-pin absorption gain.

use crate::cluster::Cluster;
use crate::info::PackingState;
use crate::select::CellSelector;
use mosaic_netlist::{CellDesign, CellId, NetId, PinId};
use std::collections::{HashMap, HashSet};

/// Per-generation selection state, stacked in step with the engine.
struct SelectionState {
    /// Candidate queue, built lazily; popped from the back (highest gain).
    queue: Option<Vec<CellId>>,
    /// Cells a conditional verdict wants packed this generation.
    conditionals: Option<Vec<CellId>>,
    using_secondary: bool,
    attempts: usize,
}

/// Prefers cells that absorb the most nets and pins into the cluster.
///
/// The gain of a candidate mixes the fraction of its nets shared with the
/// cluster (weight `ab`) and the fraction of its pins on shared nets
/// (weight `1 - ab`). Static and high-fanout nets are ignored. When a
/// generation carries conditional requirements, only those cells are
/// offered. Optionally searches one connection deeper when the direct
/// neighborhood is exhausted.
pub struct SharedNetsCellSelector {
    search_two_deep: bool,
    high_fanout_limit: usize,
    ab: f64,
    max_attempts: usize,
    state_stack: Vec<SelectionState>,
    shared_nets: HashMap<CellId, HashMap<CellId, Vec<NetId>>>,
    shared_pins: HashMap<CellId, HashMap<CellId, Vec<PinId>>>,
    num_used_pins: HashMap<CellId, usize>,
    num_unique_nets: HashMap<CellId, usize>,
    filtered_nets: HashSet<NetId>,
}

impl SharedNetsCellSelector {
    /// Creates a selector with default weights and limits.
    pub fn new(search_two_deep: bool) -> Self {
        Self {
            search_two_deep,
            high_fanout_limit: 400,
            ab: 0.9,
            max_attempts: 50,
            state_stack: Vec::new(),
            shared_nets: HashMap::new(),
            shared_pins: HashMap::new(),
            num_used_pins: HashMap::new(),
            num_unique_nets: HashMap::new(),
            filtered_nets: HashSet::new(),
        }
    }

    /// Overrides the fanout filter and attempt bound.
    pub fn with_limits(mut self, high_fanout_limit: usize, max_attempts: usize) -> Self {
        self.high_fanout_limit = high_fanout_limit;
        self.max_attempts = max_attempts;
        self
    }

    fn should_filter_net(&self, design: &CellDesign, net: NetId) -> bool {
        let n = design.net(net);
        n.is_static() || n.pins.len() > self.high_fanout_limit
    }

    fn find_shared_nets(&self, design: &CellDesign, cell: CellId) -> HashMap<CellId, Vec<NetId>> {
        let mut out: HashMap<CellId, HashSet<NetId>> = HashMap::new();
        for &pin in &design.cell(cell).pins {
            let Some(net) = design.pin(pin).net else {
                continue;
            };
            if self.filtered_nets.contains(&net) {
                continue;
            }
            for &other_pin in &design.net(net).pins {
                let other = design.pin(other_pin).cell;
                if other != cell {
                    out.entry(other).or_default().insert(net);
                }
            }
        }
        out.into_iter()
            .map(|(cell, nets)| {
                let mut nets: Vec<NetId> = nets.into_iter().collect();
                nets.sort_by_key(|n| n.as_raw());
                (cell, nets)
            })
            .collect()
    }

    fn find_shared_pins(&self, design: &CellDesign, cell: CellId) -> HashMap<CellId, Vec<PinId>> {
        let mut out: HashMap<CellId, HashSet<PinId>> = HashMap::new();
        for &pin in &design.cell(cell).pins {
            let Some(net) = design.pin(pin).net else {
                continue;
            };
            if self.filtered_nets.contains(&net) {
                continue;
            }
            for &other_pin in &design.net(net).pins {
                let other = design.pin(other_pin).cell;
                if other != cell {
                    out.entry(other).or_default().insert(other_pin);
                }
            }
        }
        out.into_iter()
            .map(|(cell, pins)| {
                let mut pins: Vec<PinId> = pins.into_iter().collect();
                pins.sort_by_key(|p| p.as_raw());
                (cell, pins)
            })
            .collect()
    }

    fn used_pin_count(&self, design: &CellDesign, cell: CellId) -> usize {
        design
            .cell(cell)
            .pins
            .iter()
            .filter(|&&pin| {
                design.pin(pin).net.is_some_and(|n| !self.filtered_nets.contains(&n))
            })
            .count()
    }

    fn unique_net_count(&self, design: &CellDesign, cell: CellId) -> usize {
        let mut nets = HashSet::new();
        for &pin in &design.cell(cell).pins {
            if let Some(net) = design.pin(pin).net {
                if !self.filtered_nets.contains(&net) {
                    nets.insert(net);
                }
            }
        }
        nets.len()
    }

    /// Cells sharing at least one unfiltered net with `of`.
    fn connected_cells(&self, of: CellId) -> Vec<CellId> {
        let mut cells: Vec<CellId> = self
            .shared_pins
            .get(&of)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        cells.sort_by_key(|c| c.as_raw());
        cells
    }

    fn cell_gain(&self, cell: CellId, from: &[CellId]) -> f64 {
        let mut shared_net_count = 0usize;
        let mut seen_nets = HashSet::new();
        for &f in from {
            if let Some(nets) = self.shared_nets.get(&f).and_then(|m| m.get(&cell)) {
                for &net in nets {
                    if seen_nets.insert(net) {
                        shared_net_count += 1;
                    }
                }
            }
        }
        let mut shared_pin_count = 0usize;
        let mut seen_pins = HashSet::new();
        for &f in from {
            if let Some(pins) = self.shared_pins.get(&f).and_then(|m| m.get(&cell)) {
                for &pin in pins {
                    if seen_pins.insert(pin) {
                        shared_pin_count += 1;
                    }
                }
            }
        }

        let unique_nets = self.num_unique_nets.get(&cell).copied().unwrap_or(0).max(1);
        let used_pins = self.num_used_pins.get(&cell).copied().unwrap_or(0).max(1);
        self.ab * shared_net_count as f64 / unique_nets as f64
            + (1.0 - self.ab) * shared_pin_count as f64 / used_pins as f64
    }

    /// Cells adjacent to the cluster but not yet inside it.
    fn primary_cells(&self, cluster: &Cluster) -> Vec<CellId> {
        let members = cluster.cells();
        let mut out: Vec<CellId> = Vec::new();
        for &member in &members {
            for candidate in self.connected_cells(member) {
                if !members.contains(&candidate) && !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// Builds a queue sorted so the best candidate pops last.
    fn sorted_queue(gains: Vec<(CellId, f64)>) -> Vec<CellId> {
        let mut gains = gains;
        gains.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap()
                .then(b.0.as_raw().cmp(&a.0.as_raw()))
        });
        gains.into_iter().map(|(cell, _)| cell).collect()
    }

    fn build_primary_queue(
        &self,
        packing: &PackingState,
        cluster: &Cluster,
        conditionals: Option<&[CellId]>,
    ) -> Vec<CellId> {
        if let Some(conditionals) = conditionals {
            // Conditional generations only pursue the demanded cells.
            let mut queue: Vec<CellId> = conditionals.to_vec();
            queue.sort_by_key(|c| std::cmp::Reverse(c.as_raw()));
            return queue;
        }
        let members = cluster.cells();
        let gains: Vec<(CellId, f64)> = self
            .primary_cells(cluster)
            .into_iter()
            .filter(|&c| packing.is_valid(c))
            .map(|c| (c, self.cell_gain(c, &members)))
            .collect();
        Self::sorted_queue(gains)
    }

    fn build_secondary_queue(&self, packing: &PackingState, cluster: &Cluster) -> Vec<CellId> {
        let members = cluster.cells();
        let primary = self.primary_cells(cluster);
        let mut gains: HashMap<CellId, f64> = HashMap::new();
        for &p in &primary {
            let primary_gain = self.cell_gain(p, &members);
            for s in self.connected_cells(p) {
                if !packing.is_valid(s) || primary.contains(&s) || members.contains(&s) {
                    continue;
                }
                let gain = primary_gain * self.cell_gain(s, &[p]);
                *gains.entry(s).or_insert(0.0) += gain;
            }
        }
        Self::sorted_queue(gains.into_iter().collect())
    }
}

impl CellSelector for SharedNetsCellSelector {
    fn init(&mut self, design: &CellDesign) {
        self.filtered_nets = design
            .nets
            .ids()
            .filter(|&n| self.should_filter_net(design, n))
            .collect();
        for cell in design.leaf_cells() {
            let used = self.used_pin_count(design, cell);
            let unique = self.unique_net_count(design, cell);
            self.num_used_pins.insert(cell, used);
            self.num_unique_nets.insert(cell, unique);
        }
        for cell in design.leaf_cells() {
            let nets = self.find_shared_nets(design, cell);
            let pins = self.find_shared_pins(design, cell);
            self.shared_nets.insert(cell, nets);
            self.shared_pins.insert(cell, pins);
        }
    }

    fn init_cluster(&mut self, _cluster: &Cluster, _seed: CellId) {
        self.state_stack.clear();
    }

    fn next_cell(
        &mut self,
        _design: &CellDesign,
        packing: &PackingState,
        cluster: &Cluster,
    ) -> Option<CellId> {
        {
            let state = self
                .state_stack
                .last()
                .expect("next_cell before any committed generation");
            if state.attempts >= self.max_attempts {
                return None;
            }
        }
        self.state_stack.last_mut().unwrap().attempts += 1;

        if self.state_stack.last().unwrap().queue.is_none() {
            let conditionals = self.state_stack.last().unwrap().conditionals.clone();
            let queue = self.build_primary_queue(packing, cluster, conditionals.as_deref());
            self.state_stack.last_mut().unwrap().queue = Some(queue);
        }

        while let Some(cell) = self.state_stack.last_mut().unwrap().queue.as_mut().unwrap().pop() {
            if packing.is_valid(cell) {
                return Some(cell);
            }
        }

        {
            let state = self.state_stack.last().unwrap();
            if !self.search_two_deep || state.using_secondary || state.conditionals.is_some() {
                return None;
            }
        }

        let queue = self.build_secondary_queue(packing, cluster);
        let state = self.state_stack.last_mut().unwrap();
        state.queue = Some(queue);
        state.using_secondary = true;

        while let Some(cell) = self.state_stack.last_mut().unwrap().queue.as_mut().unwrap().pop() {
            if packing.is_valid(cell) {
                return Some(cell);
            }
        }
        None
    }

    fn commit_cells(&mut self, _cells: &[CellId], conditionals: Option<&[CellId]>) {
        self.state_stack.push(SelectionState {
            queue: None,
            conditionals: conditionals.map(|c| c.to_vec()),
            using_secondary: false,
            attempts: 0,
        });
    }

    fn rollback_last_commit(&mut self) {
        self.state_stack.pop();
    }

    fn cleanup_cluster(&mut self) {
        self.state_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterFactory, ClusterId};
    use crate::testutil;

    #[test]
    fn offers_connected_cells_best_first() {
        let fix = testutil::and_of_two_luts();
        let packing = PackingState::new(&fix.design);
        let mut selector = SharedNetsCellSelector::new(false);
        selector.init(&fix.design);

        let mut factory = testutil::factory(&fix);
        let mut cluster = factory.create_new_cluster("c0", fix.slice_unit);
        let seed = fix.cells[2];
        cluster.add_cell(mosaic_arch::BelId::from_raw(0), seed);

        selector.init_cluster(&cluster, seed);
        selector.commit_cells(&[seed], None);

        // All three neighbors of the AND cell are offered exactly once.
        let mut offered = HashSet::new();
        while let Some(cell) = selector.next_cell(&fix.design, &packing, &cluster) {
            assert!(offered.insert(cell), "cell {cell} offered twice");
            // Pretend the engine rejected it so the queue advances.
            // (Invalid cells are skipped, valid ones are returned once.)
            if offered.len() == 3 {
                break;
            }
        }
        assert_eq!(offered.len(), 3);
        assert!(offered.contains(&fix.cells[0]));
        assert!(offered.contains(&fix.cells[1]));
    }

    #[test]
    fn conditional_generation_offers_only_demanded_cells() {
        let fix = testutil::and_of_two_luts();
        let packing = PackingState::new(&fix.design);
        let mut selector = SharedNetsCellSelector::new(false);
        selector.init(&fix.design);

        let mut factory = testutil::factory(&fix);
        let mut cluster = factory.create_new_cluster("c0", fix.slice_unit);
        let seed = fix.cells[2];
        cluster.add_cell(mosaic_arch::BelId::from_raw(0), seed);

        selector.init_cluster(&cluster, seed);
        selector.commit_cells(&[seed], Some(&[fix.cells[1]]));

        assert_eq!(
            selector.next_cell(&fix.design, &packing, &cluster),
            Some(fix.cells[1])
        );
        assert_eq!(selector.next_cell(&fix.design, &packing, &cluster), None);
    }

    #[test]
    fn invalid_cells_are_skipped() {
        let fix = testutil::and_of_two_luts();
        let mut packing = PackingState::new(&fix.design);
        let mut selector = SharedNetsCellSelector::new(false);
        selector.init(&fix.design);

        // Invalidate everything except one input LUT.
        for cell in fix.design.leaf_cells() {
            if cell != fix.cells[0] {
                packing.set_valid(cell, false);
            }
        }

        let mut factory = testutil::factory(&fix);
        let mut cluster = factory.create_new_cluster("c0", fix.slice_unit);
        let seed = fix.cells[2];
        cluster.add_cell(mosaic_arch::BelId::from_raw(0), seed);

        selector.init_cluster(&cluster, seed);
        selector.commit_cells(&[seed], None);

        assert_eq!(
            selector.next_cell(&fix.design, &packing, &cluster),
            Some(fix.cells[0])
        );
        assert_eq!(selector.next_cell(&fix.design, &packing, &cluster), None);
    }

    #[test]
    fn rollback_discards_generation_state() {
        let fix = testutil::and_of_two_luts();
        let packing = PackingState::new(&fix.design);
        let mut selector = SharedNetsCellSelector::new(false);
        selector.init(&fix.design);

        let mut factory = testutil::factory(&fix);
        let mut cluster = factory.create_new_cluster("c0", fix.slice_unit);
        let seed = fix.cells[2];
        cluster.add_cell(mosaic_arch::BelId::from_raw(0), seed);

        selector.init_cluster(&cluster, seed);
        selector.commit_cells(&[seed], None);
        let first = selector.next_cell(&fix.design, &packing, &cluster);

        // A second generation, then roll it back; the first generation's
        // queue resumes where it left off.
        selector.commit_cells(&[first.unwrap()], None);
        selector.rollback_last_commit();
        let second = selector.next_cell(&fix.design, &packing, &cluster);
        assert_ne!(first, second);
    }

    #[test]
    fn attempt_bound_stops_selection() {
        let fix = testutil::and_of_two_luts();
        let packing = PackingState::new(&fix.design);
        let mut selector = SharedNetsCellSelector::new(false).with_limits(400, 2);
        selector.init(&fix.design);

        let mut factory = testutil::factory(&fix);
        let mut cluster = factory.create_new_cluster("c0", fix.slice_unit);
        let seed = fix.cells[2];
        cluster.add_cell(mosaic_arch::BelId::from_raw(0), seed);

        selector.init_cluster(&cluster, seed);
        selector.commit_cells(&[seed], None);

        assert!(selector.next_cell(&fix.design, &packing, &cluster).is_some());
        assert!(selector.next_cell(&fix.design, &packing, &cluster).is_some());
        // Third call exceeds the bound.
        assert_eq!(selector.next_cell(&fix.design, &packing, &cluster), None);
        let _ = ClusterId::from_raw(0);
    }
}
