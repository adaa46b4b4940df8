//! The device and cluster-template graph consumed by the Kestrel cluster router.
//!
//! A [`Device`] registers BEL types and owns the name interner. A
//! [`ClusterTemplate`] describes the internal interconnect of one kind of
//! cluster: wires, BELs and their pins, plain, PIP, site-pin and
//! route-through connections, cluster inputs and outputs, direct
//! (carry-chain) connections to neighbouring clusters, and constant sources.
//!
//! Templates are immutable once built and are shared between every cluster
//! instance of the same kind, including across threads.

#![warn(missing_docs)]

pub mod device;
pub mod error;
pub mod ids;
pub mod pin_group;
pub mod template;
pub mod types;

pub use device::Device;
pub use error::TemplateError;
pub use ids::{BelId, BelPinId, BelTypeId, PinGroupId, TemplateId, WireId};
pub use pin_group::PinGroup;
pub use template::{ClusterTemplate, ClusterTemplateBuilder};
pub use types::{
    Bel, BelPin, BelPinTemplate, BelType, ClusterConnection, Connection, ConnectionKind,
    DeviceFamily, DirectConnection, LutSize, LutSlot, PinDirection, PinTemplateRef, Wire,
    WireKind,
};
