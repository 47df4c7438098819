//! Error types shared by the mapping engine

use thiserror::Error;

use crate::device::DeviceIndex;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoleError {
    #[error("Invalid role {role} for role type {role_type}")]
    InvalidRole { role_type: String, role: i32 },
    #[error("Invalid device index: {0}")]
    InvalidDevice(DeviceIndex),
    #[error("Role {0} is bound and can only be changed through bind/unbind")]
    RoleBound(i32),
    #[error("Device {0} is bound and can only be changed through bind/unbind")]
    DeviceBound(DeviceIndex),
    #[error("Serial number must not be empty")]
    EmptySerial,
    #[error("Bindings are blocked by the active handler of role type {0}")]
    BindingsBlocked(String),
    #[error("Reentrant call: {0}")]
    Reentrant(&'static str),
}
