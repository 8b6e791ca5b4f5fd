//! Shared fixtures for the packing tests: a small synthetic cell library,
//! a SLICE-like pack unit, a single-BEL carry unit, and a few tiny designs.

use crate::cluster::CapacityClusterFactory;
use crate::driver::ClusterPacker;
use crate::prepack::PrepackerFactory;
use crate::rule::PackRuleFactory;
use crate::select::{BelSelector, CellSelector};
use crate::selectors::{
    HighestPinCountSeedSelector, LowestCostBelSelector, SharedNetsCellSelector,
    UtilizationClusterCostCalculator,
};
use crate::strategy::{MultiBelPackStrategy, PackStrategy, SingleBelPackStrategy};
use crate::utils::NoopPackingUtils;
use mosaic_arch::{
    BelId, BelPinDirection, BelPinTemplate, DirectConnection, PackUnitId, PackUnitList,
    PackUnitTemplate, PackUnitTemplateBuilder, PackUnitType,
};
use mosaic_netlist::{
    CellDesign, CellId, CellKind, CellLibrary, KindId, NetKind, PinDirection, PinId, PinTemplate,
};
use std::collections::HashMap;
use std::sync::Arc;

/// A design plus the pack units it targets, with handles to the cells and
/// pins the tests care about.
pub struct Fixture {
    pub design: CellDesign,
    pub units: Arc<PackUnitList>,
    pub slice_unit: PackUnitId,
    pub carry_unit: PackUnitId,
    /// The cells the individual fixture documents.
    pub cells: Vec<CellId>,
    /// An extra LUT cell, where the fixture provides one.
    pub lut_cell: Option<CellId>,
    /// Carry source pin (carry fixtures only).
    pub source_pin: PinId,
    /// Carry sink pin (carry fixtures only).
    pub sink_pin: PinId,
    /// Carry edges in chain order (carry fixtures only).
    pub pins: Vec<(PinId, PinId)>,
}

fn pin(name: &str, direction: PinDirection, bel_kind: &str, bel_pins: &[&str]) -> PinTemplate {
    let mut map = HashMap::new();
    map.insert(
        bel_kind.to_string(),
        bel_pins.iter().map(|p| p.to_string()).collect(),
    );
    PinTemplate {
        name: name.to_string(),
        direction,
        bel_pins: map,
    }
}

fn library() -> CellLibrary {
    let mut lib = CellLibrary::new();
    lib.add_kind(CellKind {
        id: KindId::from_raw(0),
        name: "LUT".into(),
        bel_kinds: vec!["LUT".into()],
        pins: vec![
            pin("I0", PinDirection::Input, "LUT", &["I0", "I1"]),
            pin("I1", PinDirection::Input, "LUT", &["I0", "I1"]),
            pin("O", PinDirection::Output, "LUT", &["O"]),
        ],
    });
    lib.add_kind(CellKind {
        id: KindId::from_raw(0),
        name: "FF".into(),
        bel_kinds: vec!["FF".into()],
        pins: vec![
            pin("D", PinDirection::Input, "FF", &["D"]),
            pin("Q", PinDirection::Output, "FF", &["Q"]),
        ],
    });
    lib.add_kind(CellKind {
        id: KindId::from_raw(0),
        name: "CARRY".into(),
        bel_kinds: vec!["CARRY".into()],
        pins: vec![
            pin("CIN", PinDirection::Input, "CARRY", &["CIN"]),
            pin("COUT", PinDirection::Output, "CARRY", &["COUT"]),
        ],
    });
    lib.add_kind(CellKind {
        id: KindId::from_raw(0),
        name: "BRAM".into(),
        bel_kinds: vec!["BRAM".into()],
        pins: vec![
            pin("DI", PinDirection::Input, "BRAM", &["DI"]),
            pin("DO", PinDirection::Output, "BRAM", &["DO"]),
        ],
    });
    lib.add_kind(CellKind {
        id: KindId::from_raw(0),
        name: "VCC".into(),
        bel_kinds: vec![],
        pins: vec![PinTemplate {
            name: "O".into(),
            direction: PinDirection::Output,
            bel_pins: HashMap::new(),
        }],
    });
    lib
}

fn slice_template() -> PackUnitTemplate {
    let mut builder = PackUnitTemplateBuilder::new();
    let mut anchor = None;
    for site in 0..4 {
        let lut = builder.add_bel(
            site,
            "LUT",
            "LUT",
            vec![
                ("I0", BelPinDirection::Input),
                ("I1", BelPinDirection::Input),
                ("O", BelPinDirection::Output),
            ],
        );
        builder.add_bel(
            site,
            "FF",
            "FF",
            vec![("D", BelPinDirection::Input), ("Q", BelPinDirection::Output)],
        );
        let input = builder.add_wire("IN", Some(site));
        let output = builder.add_wire("OUT", Some(site));
        builder.add_input(input);
        builder.add_output(output);
        if anchor.is_none() {
            anchor = Some(lut);
        }
    }
    let clk = builder.add_wire("CLK", None);
    builder.add_input(clk);
    // Site 0's LUT and FF halves share configuration state.
    builder.pair_bels(BelId::from_raw(0), BelId::from_raw(1));
    builder.set_anchor(anchor.unwrap());
    builder.build()
}

fn carry_template() -> PackUnitTemplate {
    let mut builder = PackUnitTemplateBuilder::new();
    let carry = builder.add_bel(
        0,
        "CARRY4",
        "CARRY",
        vec![
            ("CIN", BelPinDirection::Input),
            ("COUT", BelPinDirection::Output),
        ],
    );
    let exit = builder.add_wire("COUT_EXIT", Some(0));
    let entry = builder.add_wire("CIN_ENTRY", Some(0));
    builder.add_output(exit);
    builder.add_input(entry);

    let cout_pin = mosaic_arch::BelPinId { bel: carry, index: 1 };
    let cin_pin = mosaic_arch::BelPinId { bel: carry, index: 0 };
    builder.add_direct_sink(DirectConnection {
        end_pin: BelPinTemplate {
            bel_kind: "CARRY".into(),
            name: "CIN".into(),
        },
        end_site_index: None,
        end_pack_unit_index: None,
        cluster_pin: cout_pin,
        cluster_exit: exit,
    });
    builder.add_direct_source(DirectConnection {
        end_pin: BelPinTemplate {
            bel_kind: "CARRY".into(),
            name: "COUT".into(),
        },
        end_site_index: None,
        end_pack_unit_index: None,
        cluster_pin: cin_pin,
        cluster_exit: entry,
    });
    builder.set_anchor(carry);
    builder.build()
}

fn units() -> (Arc<PackUnitList>, PackUnitId, PackUnitId) {
    let mut list = PackUnitList::new("testpart");
    let slice = list.add_unit(PackUnitType::new("SLICE"), slice_template());
    let carry = list.add_unit(PackUnitType::new("CARRY"), carry_template());
    (Arc::new(list), slice, carry)
}

fn empty_fixture() -> Fixture {
    let (units, slice_unit, carry_unit) = units();
    Fixture {
        design: CellDesign::new("top", "testpart", library()),
        units,
        slice_unit,
        carry_unit,
        cells: Vec::new(),
        lut_cell: None,
        source_pin: PinId::from_raw(0),
        sink_pin: PinId::from_raw(0),
        pins: Vec::new(),
    }
}

/// Two unconnected LUT cells and the SLICE/CARRY units.
pub fn slice_fixture() -> Fixture {
    let mut fix = empty_fixture();
    let lut = fix.design.library.kind_named("LUT").unwrap();
    let a = fix.design.add_cell("lut_a", lut);
    let b = fix.design.add_cell("lut_b", lut);
    fix.cells = vec![a, b];
    fix
}

/// An AND-of-two-LUTs cone: `lut_a` and `lut_b` feed `and0`, whose output
/// drives `out_buf`. `cells` holds `[lut_a, lut_b, and0]`.
pub fn and_of_two_luts() -> Fixture {
    let mut fix = empty_fixture();
    let lut = fix.design.library.kind_named("LUT").unwrap();
    let a = fix.design.add_cell("lut_a", lut);
    let b = fix.design.add_cell("lut_b", lut);
    let and0 = fix.design.add_cell("and0", lut);
    let buf = fix.design.add_cell("out_buf", lut);

    let na = fix.design.add_net("na", NetKind::Logic);
    fix.design.connect(a, "O", na);
    fix.design.connect(and0, "I0", na);

    let nb = fix.design.add_net("nb", NetKind::Logic);
    fix.design.connect(b, "O", nb);
    fix.design.connect(and0, "I1", nb);

    let out = fix.design.add_net("out", NetKind::Logic);
    fix.design.connect(and0, "O", out);
    fix.design.connect(buf, "I0", out);

    fix.cells = vec![a, b, and0];
    fix
}

/// The AND cone plus a `bram0` cell whose BEL kind no pack unit offers.
/// `cells` ends with the unplaceable cell.
pub fn with_unplaceable_cell() -> Fixture {
    let mut fix = and_of_two_luts();
    let bram = fix.design.library.kind_named("BRAM").unwrap();
    let bram0 = fix.design.add_cell("bram0", bram);
    let out = fix.design.net_named("out").unwrap();
    fix.design.connect(bram0, "DI", out);
    fix.cells.push(bram0);
    fix
}

/// Two carry cells joined by a direct COUT -> CIN net, plus a spare LUT.
pub fn carry_pair() -> Fixture {
    let mut fix = empty_fixture();
    let carry = fix.design.library.kind_named("CARRY").unwrap();
    let lut = fix.design.library.kind_named("LUT").unwrap();
    let c0 = fix.design.add_cell("carry0", carry);
    let c1 = fix.design.add_cell("carry1", carry);
    let lut0 = fix.design.add_cell("lut0", lut);

    let net = fix.design.add_net("carry_link0", NetKind::Logic);
    fix.design.connect(c0, "COUT", net);
    fix.design.connect(c1, "CIN", net);

    fix.source_pin = fix.design.cell_pin(c0, "COUT").unwrap();
    fix.sink_pin = fix.design.cell_pin(c1, "CIN").unwrap();
    fix.cells = vec![c0, c1];
    fix.lut_cell = Some(lut0);
    fix
}

/// Four carry cells in a row; `pins` holds the chain edges in order.
pub fn carry_quad() -> Fixture {
    let mut fix = empty_fixture();
    let carry = fix.design.library.kind_named("CARRY").unwrap();
    let cells: Vec<CellId> = (0..4)
        .map(|i| fix.design.add_cell(format!("carry{i}"), carry))
        .collect();

    let mut pins = Vec::new();
    for i in 0..3 {
        let net = fix.design.add_net(format!("carry_link{i}"), NetKind::Logic);
        fix.design.connect(cells[i], "COUT", net);
        fix.design.connect(cells[i + 1], "CIN", net);
        pins.push((
            fix.design.cell_pin(cells[i], "COUT").unwrap(),
            fix.design.cell_pin(cells[i + 1], "CIN").unwrap(),
        ));
    }

    fix.source_pin = pins[0].0;
    fix.sink_pin = pins[0].1;
    fix.cells = cells;
    fix.pins = pins;
    fix
}

/// Two connected LUTs plus a VCC source cell driving a static net.
pub fn with_static_nets() -> Fixture {
    let mut fix = empty_fixture();
    let lut = fix.design.library.kind_named("LUT").unwrap();
    let vcc_kind = fix.design.library.kind_named("VCC").unwrap();
    let vcc0 = fix.design.add_cell("vcc0", vcc_kind);
    let a = fix.design.add_cell("lut_a", lut);
    let b = fix.design.add_cell("lut_b", lut);

    let vcc = fix.design.add_net("vcc", NetKind::Vcc);
    fix.design.connect(vcc0, "O", vcc);
    fix.design.connect(a, "I0", vcc);

    let n0 = fix.design.add_net("n0", NetKind::Logic);
    fix.design.connect(a, "O", n0);
    fix.design.connect(b, "I0", n0);

    fix.cells = vec![a, b];
    fix
}

/// A capacity factory over the fixture's units.
pub fn factory(fix: &Fixture) -> CapacityClusterFactory {
    CapacityClusterFactory::with_uniform_capacity(fix.units.clone(), 16)
}

fn default_cell_selector() -> Box<dyn CellSelector> {
    Box::new(SharedNetsCellSelector::new(false))
}

fn default_bel_selector() -> Box<dyn BelSelector> {
    Box::new(LowestCostBelSelector::default())
}

/// A multi-BEL strategy with default selectors and no rules.
pub fn multi_strategy() -> MultiBelPackStrategy {
    MultiBelPackStrategy::new(default_cell_selector(), default_bel_selector(), vec![], vec![])
}

/// A multi-BEL strategy with default selectors and the given plugins.
pub fn multi_strategy_with(
    prepackers: Vec<Box<dyn PrepackerFactory>>,
    rules: Vec<Box<dyn PackRuleFactory>>,
) -> MultiBelPackStrategy {
    MultiBelPackStrategy::new(
        default_cell_selector(),
        default_bel_selector(),
        prepackers,
        rules,
    )
}

/// A fully assembled packer over the fixture's units.
pub fn packer(fix: &Fixture) -> ClusterPacker {
    let mut strategies: HashMap<String, Box<dyn PackStrategy>> = HashMap::new();
    strategies.insert("SLICE".to_string(), Box::new(multi_strategy()));
    strategies.insert(
        "CARRY".to_string(),
        Box::new(SingleBelPackStrategy::new(vec![])),
    );
    ClusterPacker::new(
        fix.units.clone(),
        Box::new(factory(fix)),
        Box::new(HighestPinCountSeedSelector::new()),
        strategies,
        Box::new(NoopPackingUtils),
        Box::new(UtilizationClusterCostCalculator::new()),
    )
}

/// Finds the BEL with the given site and name.
pub fn bel_named(template: &PackUnitTemplate, site: u32, name: &str) -> BelId {
    template
        .bels()
        .iter()
        .find(|b| b.site == site && b.name == name)
        .map(|b| b.id)
        .unwrap_or_else(|| panic!("no BEL {name} in site {site}"))
}
