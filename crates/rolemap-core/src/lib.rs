//! Rolemap Core - Role-device mapping and binding engine
//!
//! This crate lets application code address input devices by stable logical
//! roles ("right hand", "tracker 2") instead of device slot indices that
//! change as hardware comes and goes:
//! - Role-type descriptors and the shipped role enums
//! - Per-role-type mapping (role to connected device) and binding
//!   (role to serial number) tables
//! - Pluggable assignment policies that recompute mappings on connection
//!   changes
//! - A registry owning one map per role-type, with bulk binding export/import
//! - Name-keyed role references for persisted application state
//!
//! Everything is single-threaded and synchronous. Device state comes from a
//! [`DeviceStateQuery`] implementation supplied by the host.

pub mod binding;
pub mod device;
pub mod error;
pub mod handler;
pub mod map;
pub mod reference;
pub mod registry;
pub mod role_type;
pub mod roles;

pub use binding::{BindingEntry, BindingSnapshot, ImportMode, ImportReport, RoleTypeBindings};
pub use device::{
    DeviceClass, DeviceIndex, DeviceState, DeviceStateQuery, DeviceTable, Handedness, MAX_DEVICE_COUNT,
};
pub use error::RoleError;
pub use handler::{DevicePassthroughHandler, HandRoleHandler, MapHandler, OrderedScanHandler, TrackedHandHandler};
pub use map::{ListenerId, MappingChanged, RoleTypeMap};
pub use reference::{ReferenceListenerId, ResolvedRole, RoleReference, RoleReferenceData};
pub use registry::{default_handler, RoleMapRegistry, TypedRoleMap};
pub use role_type::{RoleTypeDescriptor, RoleTypeId, RoleTypeInfo, RoleTypeRegistry};
pub use roles::{DeviceRole, HandRole, Role, TrackedHandRole, TrackerRole};
