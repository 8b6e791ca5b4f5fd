//! The backtracking cluster-fill engine.
//!
//! Per packing attempt this grows one cluster from one seed cell. The
//! search keeps an explicit stack of generation frames: each committed
//! cell-set generation records the cells packed with their BELs, the cells
//! invalidated while finding them, the conditional requirements inherited
//! from the previous generation, and which rules were checked (so reverts
//! are exact). Commit pushes a frame and starts a fresh generation;
//! rollback pops one and retries the previous generation from its next
//! candidate. `Conditional` never escapes this engine: an attempt ends
//! `Valid` or `Infeasible` only.

use crate::cluster::{possible_anchors, Cluster};
use crate::info::PackingState;
use crate::prepack::{Prepacker, PrepackerFactory, PrepackStatus};
use crate::rule::{PackRule, PackRuleFactory};
use crate::select::{BelSelector, CellSelector};
use crate::status::PackStatus;
use mosaic_arch::{BelId, PackUnitList, PackUnitTemplate};
use mosaic_netlist::{CellDesign, CellId};
use std::collections::{HashMap, HashSet};

/// The cells tentatively placed during the current generation, with their
/// chosen BELs.
///
/// Entries may only be appended, never removed or overwritten; this is the
/// structural form of the prepacker contract. Insertion order is preserved
/// so commit notifications and reverts are deterministic.
#[derive(Debug, Clone, Default)]
pub struct PackedCells {
    entries: Vec<(CellId, BelId)>,
}

impl PackedCells {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a cell-BEL binding.
    ///
    /// # Panics
    ///
    /// Panics if the cell is already present; overwriting a tentative
    /// placement would make rollback inexact.
    pub fn insert(&mut self, cell: CellId, bel: BelId) {
        assert!(
            !self.contains(cell),
            "cell {cell} is already tentatively placed"
        );
        self.entries.push((cell, bel));
    }

    /// Returns `true` if `cell` has a tentative placement.
    pub fn contains(&self, cell: CellId) -> bool {
        self.entries.iter().any(|(c, _)| *c == cell)
    }

    /// Returns the BEL tentatively holding `cell`, if any.
    pub fn get(&self, cell: CellId) -> Option<BelId> {
        self.entries
            .iter()
            .find(|(c, _)| *c == cell)
            .map(|(_, b)| *b)
    }

    /// Iterates over the cells in insertion order.
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }

    /// Iterates over the BELs in insertion order.
    pub fn bels(&self) -> impl Iterator<Item = BelId> + '_ {
        self.entries.iter().map(|(_, b)| *b)
    }

    /// Iterates over `(cell, BEL)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (CellId, BelId)> + '_ {
        self.entries.iter().copied()
    }

    /// Returns the number of tentative placements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no cells are tentatively placed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tentatively binds `cell` to `anchor` in `cluster`.
///
/// Returns [`PackStatus::Infeasible`] if the BEL is occupied; otherwise the
/// cell enters the cluster, its packing info points at the cluster and BEL,
/// and its validity flag drops.
pub fn add_cell_to_cluster(
    packing: &mut PackingState,
    cluster: &mut Cluster,
    cell: CellId,
    anchor: BelId,
) -> PackStatus {
    if cluster.is_bel_occupied(anchor) {
        return PackStatus::Infeasible;
    }
    cluster.add_cell(anchor, cell);
    packing.set_cluster(cell, Some(cluster.id()));
    packing.set_location(cell, Some(anchor));
    packing.set_valid(cell, false);
    PackStatus::Valid
}

type ConditionalMap = HashMap<CellId, HashSet<BelId>>;

/// One committed generation of the search.
struct Frame {
    status: PackStatus,
    cell: Option<CellId>,
    packed_cells: PackedCells,
    invalidated_cells: Vec<CellId>,
    prev_conditionals: Option<ConditionalMap>,
    next_conditionals: Option<ConditionalMap>,
    checked_rules: Vec<usize>,
}

/// The mutable search state of one packing attempt.
struct SearchState {
    stack: Vec<Frame>,
    status: PackStatus,
    cell: Option<CellId>,
    packed_cells: PackedCells,
    invalidated_cells: Vec<CellId>,
    prev_conditionals: Option<ConditionalMap>,
    next_conditionals: Option<ConditionalMap>,
    checked_rules: Vec<usize>,
}

impl SearchState {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            status: PackStatus::Infeasible,
            cell: None,
            packed_cells: PackedCells::new(),
            invalidated_cells: Vec::new(),
            prev_conditionals: None,
            next_conditionals: None,
            checked_rules: Vec::new(),
        }
    }

    /// Pushes the current generation onto the stack and starts a new one.
    /// The new generation inherits the old one's conditional requirements.
    fn commit(&mut self) {
        let next_conditionals = self.next_conditionals.take();
        self.stack.push(Frame {
            status: self.status,
            cell: self.cell.take(),
            packed_cells: std::mem::take(&mut self.packed_cells),
            invalidated_cells: std::mem::take(&mut self.invalidated_cells),
            prev_conditionals: self.prev_conditionals.take(),
            next_conditionals: next_conditionals.clone(),
            checked_rules: std::mem::take(&mut self.checked_rules),
        });
        self.status = PackStatus::Infeasible;
        self.prev_conditionals = next_conditionals;
    }

    /// Pops one generation, restoring its state exactly.
    fn rollback(&mut self) {
        let frame = self.stack.pop().expect("rollback past the seed state");
        self.status = frame.status;
        self.cell = frame.cell;
        self.packed_cells = frame.packed_cells;
        self.invalidated_cells = frame.invalidated_cells;
        self.prev_conditionals = frame.prev_conditionals;
        self.next_conditionals = frame.next_conditionals;
        self.checked_rules = frame.checked_rules;
    }

    fn is_seed_state(&self) -> bool {
        self.stack.is_empty()
    }
}

/// A strategy for packing one cluster from one seed.
pub trait PackStrategy {
    /// Called once before packing begins.
    fn init(&mut self, design: &CellDesign);

    /// Grows `cluster` from `seed`. Returns [`PackStatus::Valid`] with the
    /// accepted cells left bound, or [`PackStatus::Infeasible`] with every
    /// touched cell restored; never [`PackStatus::Conditional`].
    fn try_pack_cluster(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        seed: CellId,
    ) -> PackStatus;

    /// Tells the strategy that `cluster` was committed by the driver.
    fn commit_cluster(&mut self, cluster: &Cluster);
}

/// The full backtracking strategy for clusters with multiple BELs.
pub struct MultiBelPackStrategy {
    cell_selector: Box<dyn CellSelector>,
    bel_selector: Box<dyn BelSelector>,
    prepacker_factories: Vec<Box<dyn PrepackerFactory>>,
    rule_factories: Vec<Box<dyn PackRuleFactory>>,
}

impl MultiBelPackStrategy {
    /// Creates a strategy from its pluggable parts.
    pub fn new(
        cell_selector: Box<dyn CellSelector>,
        bel_selector: Box<dyn BelSelector>,
        prepacker_factories: Vec<Box<dyn PrepackerFactory>>,
        rule_factories: Vec<Box<dyn PackRuleFactory>>,
    ) -> Self {
        Self {
            cell_selector,
            bel_selector,
            prepacker_factories,
            rule_factories,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_cluster(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        template: &PackUnitTemplate,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        state: &mut SearchState,
        prepackers: &mut [Box<dyn Prepacker>],
        rules: &mut [Box<dyn PackRule>],
    ) -> PackStatus {
        // Roll back until a valid final cluster is found or none can exist.
        // A conditional cluster is never a terminal state.
        loop {
            let mut break_from_loop = false;
            while !break_from_loop {
                self.try_cells_until_success(
                    design, units, template, packing, cluster, state, prepackers, rules,
                );

                match state.status {
                    PackStatus::Infeasible => {
                        debug_assert!(state.cell.is_none());
                        // The seed generation is never rolled back.
                        if !state.is_seed_state() {
                            self.roll_back_last_commit(packing, state);
                        }
                        break_from_loop = true;
                    }
                    PackStatus::Conditional => {
                        debug_assert!(state.next_conditionals.is_some());
                        if !cluster.is_full() {
                            let mut conditional_cells: Vec<CellId> = state
                                .next_conditionals
                                .as_ref()
                                .unwrap()
                                .keys()
                                .copied()
                                .collect();
                            conditional_cells.sort_by_key(|c| c.as_raw());
                            self.commit_cell_bel_pair(state, Some(conditional_cells));
                            self.next_cell(design, units, packing, cluster, state);
                        } else {
                            break_from_loop = true;
                        }
                    }
                    PackStatus::Valid => {
                        if !cluster.is_full() {
                            self.commit_cell_bel_pair(state, None);
                            self.next_cell(design, units, packing, cluster, state);
                        } else {
                            break_from_loop = true;
                        }
                    }
                }
            }

            if state.status == PackStatus::Conditional {
                // Growth exhausted while still conditional: the whole
                // conditional commitment is infeasible. Undo the current
                // BEL choice and resume from the same cell's next BEL.
                state.status = PackStatus::Infeasible;
                revert_state(packing, cluster, state, rules);
            } else {
                if state.status == PackStatus::Infeasible {
                    debug_assert!(state.is_seed_state());
                }
                break;
            }
        }
        state.status
    }

    #[allow(clippy::too_many_arguments)]
    fn try_cells_until_success(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        template: &PackUnitTemplate,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        state: &mut SearchState,
        prepackers: &mut [Box<dyn Prepacker>],
        rules: &mut [Box<dyn PackRule>],
    ) {
        while state.cell.is_some() && state.status == PackStatus::Infeasible {
            let cell = state.cell.unwrap();
            debug_assert!(packing.is_valid(cell));
            debug_assert!(packing.cluster_of(cell).is_none());

            self.try_cell(design, units, template, packing, cluster, state, prepackers, rules);

            if state.status == PackStatus::Infeasible {
                self.revert_to_last_commit(packing, cluster, state, rules);
                // Never choose a different seed cell.
                if state.is_seed_state() {
                    return;
                }
                self.next_cell(design, units, packing, cluster, state);
            }
        }
    }

    /// Tries the current cell at every candidate BEL until one survives
    /// prepacking and validation, or candidates run out.
    #[allow(clippy::too_many_arguments)]
    fn try_cell(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        template: &PackUnitTemplate,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        state: &mut SearchState,
        prepackers: &mut [Box<dyn Prepacker>],
        rules: &mut [Box<dyn PackRule>],
    ) {
        let cell = state.cell.expect("try_cell without a current cell");

        loop {
            let Some(anchor) = self.bel_selector.next_bel() else {
                break;
            };

            let mut status = add_cell_to_cluster(packing, cluster, cell, anchor);
            if status != PackStatus::Infeasible {
                state.packed_cells.insert(cell, anchor);
            }

            // Run the prepackers to a fixed point.
            let mut prepack_status = PrepackStatus::Changed;
            while status != PackStatus::Infeasible && prepack_status == PrepackStatus::Changed {
                prepack_status = PrepackStatus::Unchanged;
                for prepacker in prepackers.iter_mut() {
                    let s = prepacker.pack_required(
                        design,
                        template,
                        packing,
                        cluster,
                        &mut state.packed_cells,
                    );
                    prepack_status = prepack_status.meet(s);
                    if prepack_status == PrepackStatus::Infeasible {
                        status = PackStatus::Infeasible;
                        break;
                    }
                }
            }

            state.status = status;
            state.next_conditionals = Some(HashMap::new());
            validate_rules(design, units, packing, cluster, state, rules);

            if state.status == PackStatus::Infeasible {
                revert_state(packing, cluster, state, rules);
            } else {
                break;
            }
        }

        match state.status {
            PackStatus::Conditional => {
                debug_assert!(!state.next_conditionals.as_ref().unwrap().is_empty());
            }
            PackStatus::Valid | PackStatus::Infeasible => {
                state.next_conditionals = None;
            }
        }
    }

    fn next_cell(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        packing: &mut PackingState,
        cluster: &Cluster,
        state: &mut SearchState,
    ) {
        let next = self.cell_selector.next_cell(design, packing, cluster);
        state.cell = next;

        if let Some(cell) = next {
            let forced = state
                .prev_conditionals
                .as_ref()
                .and_then(|conditionals| conditionals.get(&cell));
            self.bel_selector.init_cell(design, units, cluster, cell, forced);
        }
    }

    fn commit_cell_bel_pair(&mut self, state: &mut SearchState, conditionals: Option<Vec<CellId>>) {
        let cells: Vec<CellId> = state.packed_cells.cells().collect();
        let bels: Vec<BelId> = state.packed_cells.bels().collect();
        self.cell_selector.commit_cells(&cells, conditionals.as_deref());
        self.bel_selector.commit_bels(&bels);
        state.commit();
    }

    /// The current cell failed at every BEL: undo its tentative state, mark
    /// it unselectable for the rest of the attempt, and clear it.
    fn revert_to_last_commit(
        &mut self,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        state: &mut SearchState,
        rules: &mut [Box<dyn PackRule>],
    ) {
        self.bel_selector.revert_to_last_commit();
        revert_state(packing, cluster, state, rules);

        let cell = state.cell.take().expect("no cell to invalidate");
        packing.set_valid(cell, false);
        state.invalidated_cells.push(cell);
    }

    /// Retreats one generation: the previous generation resumes from its
    /// recorded state with its invalidated cells restored.
    fn roll_back_last_commit(&mut self, packing: &mut PackingState, state: &mut SearchState) {
        self.bel_selector.roll_back_last_commit();
        self.cell_selector.rollback_last_commit();
        for &cell in &state.invalidated_cells {
            packing.set_valid(cell, true);
        }
        state.rollback();
    }
}

impl PackStrategy for MultiBelPackStrategy {
    fn init(&mut self, design: &CellDesign) {
        for factory in &mut self.rule_factories {
            factory.init(design);
        }
        self.cell_selector.init(design);
        self.bel_selector.init(design);
        for factory in &mut self.prepacker_factories {
            factory.init(design);
        }
    }

    fn try_pack_cluster(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        seed: CellId,
    ) -> PackStatus {
        let template = units.template(cluster.unit());
        self.cell_selector.init_cluster(cluster, seed);
        self.bel_selector.init_cluster(units, cluster);
        let mut prepackers: Vec<Box<dyn Prepacker>> =
            self.prepacker_factories.iter().map(|f| f.make()).collect();
        let mut rules: Vec<Box<dyn PackRule>> =
            self.rule_factories.iter().map(|f| f.make(cluster)).collect();

        let mut state = SearchState::new();
        state.cell = Some(seed);
        self.bel_selector.init_cell(design, units, cluster, seed, None);

        let result = self.fill_cluster(
            design,
            units,
            template,
            packing,
            cluster,
            &mut state,
            &mut prepackers,
            &mut rules,
        );

        for rule in rules.iter_mut() {
            rule.cleanup();
        }
        self.cell_selector.cleanup_cluster();
        self.bel_selector.cleanup_cluster();
        unbind_cluster(packing, &mut state, result);

        result
    }

    fn commit_cluster(&mut self, cluster: &Cluster) {
        for factory in &mut self.rule_factories {
            factory.commit_cluster(cluster);
        }
    }
}

/// Folds every registered rule over the cells changed this generation.
fn validate_rules(
    design: &CellDesign,
    units: &PackUnitList,
    packing: &PackingState,
    cluster: &Cluster,
    state: &mut SearchState,
    rules: &mut [Box<dyn PackRule>],
) {
    let changed: Vec<CellId> = state.packed_cells.cells().collect();
    for (index, rule) in rules.iter_mut().enumerate() {
        if state.status == PackStatus::Infeasible {
            break;
        }
        let result = rule.validate(design, units, packing, cluster, &changed);
        state.status = state.status.meet(result.status);
        if result.status == PackStatus::Conditional {
            match result.conditionals {
                Some(conditionals) if !conditionals.is_empty() => {
                    merge_conditionals(state.next_conditionals.as_mut().unwrap(), conditionals);
                }
                // A conditional verdict with nothing to pursue is a dead end.
                _ => state.status = PackStatus::Infeasible,
            }
        }
        state.checked_rules.push(index);
    }
}

fn merge_conditionals(into: &mut ConditionalMap, from: ConditionalMap) {
    for (cell, bels) in from {
        into.entry(cell).or_default().extend(bels);
    }
}

/// Undoes the current generation's tentative additions: reverts exactly the
/// checked rules, removes the packed cells from the cluster, and restores
/// their packing info (invalidated cells stay invalid).
fn revert_state(
    packing: &mut PackingState,
    cluster: &mut Cluster,
    state: &mut SearchState,
    rules: &mut [Box<dyn PackRule>],
) {
    for &index in &state.checked_rules {
        rules[index].revert();
    }
    state.checked_rules.clear();

    let packed = std::mem::take(&mut state.packed_cells);
    for (cell, _bel) in packed.iter() {
        packing.set_cluster(cell, None);
        if !state.invalidated_cells.contains(&cell) {
            packing.set_valid(cell, true);
        }
        packing.set_location(cell, None);
        cluster.remove_cell(cell);
    }
    state.next_conditionals = None;
}

/// Restores per-cell state after an attempt finishes.
///
/// On `Infeasible`, every touched cell is fully unbound. On `Valid`, the
/// accepted cells stay bound to the cluster and only the temporarily
/// invalidated cells are restored; the driver unbinds the accepted set
/// itself if this cluster loses the cost comparison.
fn unbind_cluster(packing: &mut PackingState, state: &mut SearchState, result: PackStatus) {
    loop {
        if result != PackStatus::Valid {
            for (cell, _) in state.packed_cells.iter() {
                packing.unbind(cell);
            }
        }
        for &cell in &state.invalidated_cells {
            packing.set_valid(cell, true);
        }
        if state.is_seed_state() {
            break;
        }
        state.rollback();
    }
}

/// Fast-path strategy for clusters with a single BEL.
pub struct SingleBelPackStrategy {
    rule_factories: Vec<Box<dyn PackRuleFactory>>,
}

impl SingleBelPackStrategy {
    /// Creates a strategy from its rule factories.
    pub fn new(rule_factories: Vec<Box<dyn PackRuleFactory>>) -> Self {
        Self { rule_factories }
    }
}

impl PackStrategy for SingleBelPackStrategy {
    fn init(&mut self, design: &CellDesign) {
        for factory in &mut self.rule_factories {
            factory.init(design);
        }
    }

    fn try_pack_cluster(
        &mut self,
        design: &CellDesign,
        units: &PackUnitList,
        packing: &mut PackingState,
        cluster: &mut Cluster,
        seed: CellId,
    ) -> PackStatus {
        let template = units.template(cluster.unit());
        assert_eq!(
            template.bel_count(),
            1,
            "single-BEL strategy requires a single-BEL template"
        );
        let mut rules: Vec<Box<dyn PackRule>> =
            self.rule_factories.iter().map(|f| f.make(cluster)).collect();

        let anchor = template.bels()[0].id;
        let mut status = if possible_anchors(design, template, seed).contains(&anchor) {
            add_cell_to_cluster(packing, cluster, seed, anchor)
        } else {
            PackStatus::Infeasible
        };

        if status != PackStatus::Infeasible {
            let changed = [seed];
            let mut checked = Vec::new();
            for (index, rule) in rules.iter_mut().enumerate() {
                if status == PackStatus::Infeasible {
                    break;
                }
                let result = rule.validate(design, units, packing, cluster, &changed);
                // A single-BEL cluster cannot grow, so a conditional
                // verdict can never be discharged.
                let verdict = if result.status == PackStatus::Conditional {
                    PackStatus::Infeasible
                } else {
                    result.status
                };
                status = status.meet(verdict);
                checked.push(index);
            }

            if status == PackStatus::Infeasible {
                for &index in &checked {
                    rules[index].revert();
                }
                cluster.remove_cell(seed);
                packing.unbind(seed);
            }
        }

        for rule in rules.iter_mut() {
            rule.cleanup();
        }
        status
    }

    fn commit_cluster(&mut self, cluster: &Cluster) {
        for factory in &mut self.rule_factories {
            factory.commit_cluster(cluster);
        }
    }
}
