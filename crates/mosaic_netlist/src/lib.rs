//! Flat technology-mapped netlist for the Mosaic packing engine.
//!
//! This crate defines the netlist the packer consumes: [`Cell`]s instancing
//! library [`CellKind`]s, [`Net`]s, [`Pin`]s, and the owning [`CellDesign`].
//! Entities live in dense [`Arena`]s and refer to each other through opaque
//! `u32` IDs, so the packer can attach parallel per-cell state tables without
//! back-pointers or reference cycles.
//!
//! # Usage
//!
//! ```
//! use mosaic_netlist::{CellDesign, CellKind, CellLibrary, NetKind, PinDirection, PinTemplate};
//! use mosaic_netlist::ids::KindId;
//! use std::collections::HashMap;
//!
//! let mut library = CellLibrary::new();
//! let lut = library.add_kind(CellKind {
//!     id: KindId::from_raw(0),
//!     name: "LUT2".into(),
//!     bel_kinds: vec!["LUT".into()],
//!     pins: vec![PinTemplate {
//!         name: "O".into(),
//!         direction: PinDirection::Output,
//!         bel_pins: HashMap::new(),
//!     }],
//! });
//!
//! let mut design = CellDesign::new("top", "part0", library);
//! let cell = design.add_cell("and_0", lut);
//! let net = design.add_net("out", NetKind::Logic);
//! design.connect(cell, "O", net);
//! assert_eq!(design.net_source_pin(net), design.cell_pin(cell, "O"));
//! ```

#![warn(missing_docs)]

pub mod arena;
pub mod data;
pub mod ids;
pub mod library;

pub use arena::{Arena, ArenaId};
pub use data::{Cell, CellDesign, Net, NetKind, Pin};
pub use ids::{CellId, KindId, NetId, PinId};
pub use library::{CellKind, CellLibrary, PinDirection, PinTemplate};
