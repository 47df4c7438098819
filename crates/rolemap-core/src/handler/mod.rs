//! Assignment policies
//!
//! A [`MapHandler`] is attached to exactly one [`RoleTypeMap`] and decides
//! the mapping of every role that is not bound. The map calls it after
//! binding-driven updates have been applied, so a handler always observes
//! the current binding state.

use crate::device::{DeviceClass, DeviceIndex};
use crate::map::RoleTypeMap;

mod hand;
mod ordered;
mod passthrough;
mod tracked_hand;

pub use hand::HandRoleHandler;
pub use ordered::OrderedScanHandler;
pub use passthrough::DevicePassthroughHandler;
pub use tracked_hand::TrackedHandHandler;

pub trait MapHandler {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// While active, the map refuses bind and unbind
    fn blocks_bindings(&self) -> bool {
        false
    }

    /// The map clears all mappings before attaching this handler
    fn is_exclusive(&self) -> bool {
        false
    }

    /// Attached to a map; must recompute every unbound role
    fn on_assigned_as_current(&mut self, map: &mut RoleTypeMap);

    fn on_divested_as_current(&mut self, _map: &mut RoleTypeMap) {}

    fn on_connected_device_changed(
        &mut self,
        _map: &mut RoleTypeMap,
        _device: DeviceIndex,
        _class: DeviceClass,
        _serial: &str,
        _connected: bool,
    ) {
    }

    /// The backend reassigned hardware left/right designations
    fn on_tracked_device_role_changed(&mut self, _map: &mut RoleTypeMap) {}

    fn on_binding_changed(
        &mut self,
        _map: &mut RoleTypeMap,
        _serial: &str,
        _previous: Option<i32>,
        _current: Option<i32>,
    ) {
    }
}

/// Map `role` to `device`, or unmap it when there is no device
///
/// Errors are logged and swallowed: a handler cannot do anything useful with
/// a rejected assignment other than leave the role as it is.
pub(crate) fn assign(map: &mut RoleTypeMap, role: i32, device: Option<DeviceIndex>) {
    match device {
        Some(device) if map.mapped_device(role) != device => {
            if let Err(error) = map.map(role, device) {
                tracing::warn!(
                    role_type = %map.role_type_name(),
                    role,
                    device = %device,
                    %error,
                    "Handler assignment rejected"
                );
            }
        }
        Some(_) => {}
        None => {
            map.unmap(role);
        }
    }
}

/// Connected devices of `class` that are not bound, in ascending order
pub(crate) fn unbound_devices_of_class(map: &RoleTypeMap, class: DeviceClass) -> Vec<DeviceIndex> {
    let devices = map.devices();
    DeviceIndex::all()
        .filter(|&device| {
            devices.is_connected(device)
                && devices.device_class(device) == class
                && !map.is_device_bound(device)
        })
        .collect()
}
