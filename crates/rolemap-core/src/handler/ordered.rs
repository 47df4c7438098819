use tracing::debug;

use super::{assign, MapHandler};
use crate::device::{DeviceClass, DeviceIndex, MAX_DEVICE_COUNT};
use crate::map::RoleTypeMap;

/// Assigns interchangeable devices to roles in ascending order
///
/// Valid roles are walked in ascending value order, skipping bound roles;
/// each takes the next connected, unbound device of the configured class in
/// ascending index order. Roles left over once devices run out are unmapped.
#[derive(Debug, Clone)]
pub struct OrderedScanHandler {
    device_class: DeviceClass,
}

impl OrderedScanHandler {
    pub fn new(device_class: DeviceClass) -> Self {
        Self { device_class }
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    fn refresh(&self, map: &mut RoleTypeMap) {
        let roles = map.descriptor().valid_roles().to_vec();
        let mut cursor = 0;
        for role in roles {
            if map.is_role_bound(role) {
                continue;
            }
            let device = self.next_candidate(map, &mut cursor);
            assign(map, role, device);
        }
        debug!(role_type = %map.role_type_name(), "Ordered scan refreshed");
    }

    fn next_candidate(&self, map: &RoleTypeMap, cursor: &mut u32) -> Option<DeviceIndex> {
        let devices = map.devices();
        while *cursor < MAX_DEVICE_COUNT {
            let device = DeviceIndex(*cursor);
            *cursor += 1;
            if devices.is_connected(device)
                && devices.device_class(device) == self.device_class
                && !map.is_device_bound(device)
            {
                return Some(device);
            }
        }
        None
    }
}

impl MapHandler for OrderedScanHandler {
    fn name(&self) -> &str {
        "ordered-scan"
    }

    fn is_exclusive(&self) -> bool {
        true
    }

    fn on_assigned_as_current(&mut self, map: &mut RoleTypeMap) {
        self.refresh(map);
    }

    fn on_connected_device_changed(
        &mut self,
        map: &mut RoleTypeMap,
        _device: DeviceIndex,
        _class: DeviceClass,
        _serial: &str,
        _connected: bool,
    ) {
        self.refresh(map);
    }

    fn on_tracked_device_role_changed(&mut self, map: &mut RoleTypeMap) {
        self.refresh(map);
    }

    fn on_binding_changed(
        &mut self,
        map: &mut RoleTypeMap,
        _serial: &str,
        _previous: Option<i32>,
        _current: Option<i32>,
    ) {
        self.refresh(map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceState, DeviceStateQuery, DeviceTable};
    use crate::role_type::RoleTypeInfo;
    use std::rc::Rc;
    use std::sync::Arc;

    fn scenario() -> (Rc<DeviceTable>, RoleTypeMap) {
        let devices = Rc::new(DeviceTable::new());
        devices.connect(DeviceIndex(0), DeviceState::connected(DeviceClass::GenericTracker, "T0"));
        devices.connect(DeviceIndex(1), DeviceState::connected(DeviceClass::Controller, "C1"));
        devices.connect(DeviceIndex(2), DeviceState::connected(DeviceClass::GenericTracker, "T2"));

        let info = RoleTypeInfo::new("Slots", 0, "Invalid", [("One", 1), ("Two", 2), ("Three", 3)]);
        let mut map = RoleTypeMap::new(Arc::new(info), devices.clone());
        map.set_handler(Box::new(OrderedScanHandler::new(DeviceClass::GenericTracker)))
            .unwrap();
        (devices, map)
    }

    fn notify(devices: &DeviceTable, map: &mut RoleTypeMap, index: u32) {
        let device = DeviceIndex(index);
        map.on_connected_device_changed(
            device,
            devices.device_class(device),
            &devices.serial_number(device),
            devices.is_connected(device),
        )
        .unwrap();
    }

    #[test]
    fn test_ordered_scan_assignment() {
        let (_devices, map) = scenario();
        assert_eq!(map.mapped_device(1), DeviceIndex(0));
        assert_eq!(map.mapped_device(2), DeviceIndex(2));
        assert!(!map.is_role_mapped(3));
    }

    #[test]
    fn test_disconnect_shifts_later_roles() {
        let (devices, mut map) = scenario();
        devices.disconnect(DeviceIndex(0));
        notify(&devices, &mut map, 0);

        assert_eq!(map.mapped_device(1), DeviceIndex(2));
        assert!(!map.is_role_mapped(2));

        devices.connect(DeviceIndex(5), DeviceState::connected(DeviceClass::GenericTracker, "T5"));
        notify(&devices, &mut map, 5);
        assert_eq!(map.mapped_device(1), DeviceIndex(2));
        assert_eq!(map.mapped_device(2), DeviceIndex(5));
    }

    #[test]
    fn test_bound_roles_are_skipped() {
        let (_devices, mut map) = scenario();
        map.bind("T2", 1).unwrap();

        assert_eq!(map.mapped_device(1), DeviceIndex(2));
        assert_eq!(map.mapped_device(2), DeviceIndex(0));
        assert!(!map.is_role_mapped(3));

        map.unbind("T2").unwrap();
        assert_eq!(map.mapped_device(1), DeviceIndex(0));
        assert_eq!(map.mapped_device(2), DeviceIndex(2));
    }

    #[test]
    fn test_bound_offline_role_stays_reserved() {
        let (_devices, mut map) = scenario();
        map.bind("OFFLINE", 1).unwrap();

        assert!(!map.is_role_mapped(1));
        assert_eq!(map.mapped_device(2), DeviceIndex(0));
        assert_eq!(map.mapped_device(3), DeviceIndex(2));
    }
}
