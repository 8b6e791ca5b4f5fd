//! Opaque ID newtypes for device-side entities.
//!
//! [`PackUnitId`], [`BelId`], and [`WireId`] index into a
//! [`PackUnitList`](crate::PackUnitList) or a
//! [`PackUnitTemplate`](crate::PackUnitTemplate); [`SiteId`] is the device
//! placement handle attached to committed clusters by the placer.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a pack unit within a pack unit list.
    PackUnitId
);

define_id!(
    /// Opaque, copyable ID for a BEL within a pack unit template.
    BelId
);

define_id!(
    /// Opaque, copyable ID for a wire within a pack unit template.
    WireId
);

define_id!(
    /// Opaque, copyable ID for a device site (cluster placement handle).
    SiteId
);

/// Identifies one pin of one BEL within a pack unit template.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BelPinId {
    /// The BEL owning the pin.
    pub bel: BelId,
    /// Index of the pin within the BEL's pin list.
    pub index: u32,
}

impl std::fmt::Display for BelPinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.bel, self.index)
    }
}
