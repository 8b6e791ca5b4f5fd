//! Device pack unit models for the Mosaic packing engine.
//!
//! A pack unit is the immutable architectural description of one cluster
//! shape: its BELs and their pins, intra-unit wires, static-source pins,
//! direct (non-fabric) connections, and fabric boundary. The packer treats
//! these as read-only inputs; they are generated offline per device family
//! and stored in compressed binary files.
//!
//! # Usage
//!
//! ```
//! use mosaic_arch::{BelPinDirection, PackUnitList, PackUnitTemplateBuilder, PackUnitType};
//!
//! let mut builder = PackUnitTemplateBuilder::new();
//! let lut = builder.add_bel(0, "A6LUT", "LUT6", vec![
//!     ("A1", BelPinDirection::Input),
//!     ("O6", BelPinDirection::Output),
//! ]);
//! builder.set_anchor(lut);
//!
//! let mut units = PackUnitList::new("part0");
//! let slice = units.add_unit(PackUnitType::new("SLICE"), builder.build());
//! assert_eq!(units.template(slice).bel_count(), 1);
//! ```

#![warn(missing_docs)]

pub mod ids;
pub mod pack_unit;
pub mod store;

pub use ids::{BelId, BelPinId, PackUnitId, SiteId, WireId};
pub use pack_unit::{
    Bel, BelPin, BelPinDirection, BelPinTemplate, DirectConnection, PackUnit, PackUnitList,
    PackUnitTemplate, PackUnitTemplateBuilder, PackUnitType, Wire,
};
pub use store::{load_pack_units, save_pack_units, ArchError};
