use super::{assign, MapHandler};
use crate::device::{DeviceClass, DeviceIndex};
use crate::map::RoleTypeMap;

/// Maps every role value to the device index of the same number
///
/// Used for the device role-type, where a role is just a name for a slot.
/// Bindings make no sense there and are blocked.
#[derive(Debug, Clone, Default)]
pub struct DevicePassthroughHandler;

impl DevicePassthroughHandler {
    pub fn new() -> Self {
        Self
    }

    fn refresh_role(map: &mut RoleTypeMap, role: i32) {
        let Ok(index) = u32::try_from(role) else {
            return;
        };
        let device = DeviceIndex(index);
        let connected = device.is_valid() && map.devices().is_connected(device);
        assign(map, role, connected.then_some(device));
    }
}

impl MapHandler for DevicePassthroughHandler {
    fn name(&self) -> &str {
        "device-passthrough"
    }

    fn blocks_bindings(&self) -> bool {
        true
    }

    fn is_exclusive(&self) -> bool {
        true
    }

    fn on_assigned_as_current(&mut self, map: &mut RoleTypeMap) {
        let roles = map.descriptor().valid_roles().to_vec();
        for role in roles {
            Self::refresh_role(map, role);
        }
    }

    fn on_connected_device_changed(
        &mut self,
        map: &mut RoleTypeMap,
        device: DeviceIndex,
        _class: DeviceClass,
        _serial: &str,
        _connected: bool,
    ) {
        if let Ok(role) = i32::try_from(device.0) {
            if map.is_valid_role(role) {
                Self::refresh_role(map, role);
            }
        }
    }
}
