use tracing::debug;

use super::{assign, unbound_devices_of_class, MapHandler};
use crate::device::{DeviceClass, DeviceIndex, Handedness};
use crate::map::RoleTypeMap;
use crate::roles::{HandRole, Role};

/// Assigns controllers to hand roles from hardware left/right hints
///
/// Each free hand role takes the lowest controller hinted for its side,
/// falling back to the lowest remaining controller. The external camera role
/// takes the first generic tracker and the numbered controller roles take
/// whatever controllers are left, in ascending order.
#[derive(Debug, Clone, Default)]
pub struct HandRoleHandler;

impl HandRoleHandler {
    pub fn new() -> Self {
        Self
    }

    fn refresh(&self, map: &mut RoleTypeMap) {
        let mut pool = unbound_devices_of_class(map, DeviceClass::Controller);
        let mut assignments: Vec<(i32, Option<DeviceIndex>)> = Vec::new();

        let right_free = !map.is_role_bound(HandRole::RightHand.to_value());
        let left_free = !map.is_role_bound(HandRole::LeftHand.to_value());

        let mut right = None;
        let mut left = None;
        if right_free {
            right = take_hinted(map, &mut pool, Handedness::Right);
        }
        if left_free {
            left = take_hinted(map, &mut pool, Handedness::Left);
        }
        if right_free && right.is_none() {
            right = take_first(&mut pool);
        }
        if left_free && left.is_none() {
            left = take_first(&mut pool);
        }
        if right_free {
            assignments.push((HandRole::RightHand.to_value(), right));
        }
        if left_free {
            assignments.push((HandRole::LeftHand.to_value(), left));
        }

        let camera = HandRole::ExternalCamera.to_value();
        if !map.is_role_bound(camera) {
            let tracker = unbound_devices_of_class(map, DeviceClass::GenericTracker)
                .into_iter()
                .next();
            assignments.push((camera, tracker));
        }

        for role in HandRole::all()
            .into_iter()
            .filter(|role| *role >= HandRole::Controller3)
        {
            let value = role.to_value();
            if !map.is_role_bound(value) {
                assignments.push((value, take_first(&mut pool)));
            }
        }

        for (role, device) in assignments {
            assign(map, role, device);
        }
        debug!(role_type = %map.role_type_name(), "Hand roles refreshed");
    }
}

fn take_hinted(map: &RoleTypeMap, pool: &mut Vec<DeviceIndex>, side: Handedness) -> Option<DeviceIndex> {
    let position = pool
        .iter()
        .position(|&device| map.devices().handedness(device) == side)?;
    Some(pool.remove(position))
}

fn take_first(pool: &mut Vec<DeviceIndex>) -> Option<DeviceIndex> {
    if pool.is_empty() {
        None
    } else {
        Some(pool.remove(0))
    }
}

impl MapHandler for HandRoleHandler {
    fn name(&self) -> &str {
        "hand-role"
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
    use crate::device::{DeviceState, DeviceTable};
    use crate::role_type::RoleTypeInfo;
    use std::rc::Rc;
    use std::sync::Arc;

    fn controller(serial: &str, side: Handedness) -> DeviceState {
        DeviceState::connected(DeviceClass::Controller, serial).with_handedness(side)
    }

    fn hand_map(devices: &Rc<DeviceTable>) -> RoleTypeMap {
        let mut map = RoleTypeMap::new(Arc::new(RoleTypeInfo::of::<HandRole>()), devices.clone());
        map.set_handler(Box::new(HandRoleHandler::new())).unwrap();
        map
    }

    fn device_of(map: &RoleTypeMap, role: HandRole) -> DeviceIndex {
        map.mapped_device(role.to_value())
    }

    #[test]
    fn test_hints_decide_sides() {
        let devices = Rc::new(DeviceTable::new());
        devices.connect(DeviceIndex(1), controller("L", Handedness::Left));
        devices.connect(DeviceIndex(2), controller("R", Handedness::Right));
        devices.connect(DeviceIndex(3), controller("X", Handedness::None));
        devices.connect(
            DeviceIndex(4),
            DeviceState::connected(DeviceClass::GenericTracker, "CAM"),
        );

        let map = hand_map(&devices);
        assert_eq!(device_of(&map, HandRole::RightHand), DeviceIndex(2));
        assert_eq!(device_of(&map, HandRole::LeftHand), DeviceIndex(1));
        assert_eq!(device_of(&map, HandRole::ExternalCamera), DeviceIndex(4));
        assert_eq!(device_of(&map, HandRole::Controller3), DeviceIndex(3));
        assert!(!map.is_role_mapped(HandRole::Controller4.to_value()));
    }

    #[test]
    fn test_unhinted_controllers_fill_right_then_left() {
        let devices = Rc::new(DeviceTable::new());
        devices.connect(DeviceIndex(5), controller("A", Handedness::None));
        devices.connect(DeviceIndex(6), controller("B", Handedness::None));

        let map = hand_map(&devices);
        assert_eq!(device_of(&map, HandRole::RightHand), DeviceIndex(5));
        assert_eq!(device_of(&map, HandRole::LeftHand), DeviceIndex(6));
    }

    #[test]
    fn test_role_swap_on_tracked_role_change() {
        let devices = Rc::new(DeviceTable::new());
        devices.connect(DeviceIndex(1), controller("A", Handedness::Right));
        devices.connect(DeviceIndex(2), controller("B", Handedness::Left));
        let mut map = hand_map(&devices);
        assert_eq!(device_of(&map, HandRole::RightHand), DeviceIndex(1));

        devices.set_handedness(DeviceIndex(1), Handedness::Left);
        devices.set_handedness(DeviceIndex(2), Handedness::Right);
        map.on_tracked_device_role_changed().unwrap();

        assert_eq!(device_of(&map, HandRole::RightHand), DeviceIndex(2));
        assert_eq!(device_of(&map, HandRole::LeftHand), DeviceIndex(1));
    }

    #[test]
    fn test_bound_right_hand_is_left_alone() {
        let devices = Rc::new(DeviceTable::new());
        devices.connect(DeviceIndex(1), controller("A", Handedness::Right));
        devices.connect(DeviceIndex(2), controller("B", Handedness::Left));
        let mut map = hand_map(&devices);

        map.bind("B", HandRole::RightHand.to_value()).unwrap();
        assert_eq!(device_of(&map, HandRole::RightHand), DeviceIndex(2));
        assert_eq!(device_of(&map, HandRole::LeftHand), DeviceIndex(1));
    }
}
