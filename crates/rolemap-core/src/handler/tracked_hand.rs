use std::cmp::Reverse;
use tracing::debug;

use super::{assign, unbound_devices_of_class, MapHandler};
use crate::device::{DeviceClass, DeviceIndex, Handedness};
use crate::map::RoleTypeMap;
use crate::roles::{Role, TrackedHandRole};

/// Left/right disambiguation for optically tracked hands
///
/// Connected, unbound tracked-hand devices are partitioned by their
/// handedness tag and ranked by pose validity, then valid joint count, then
/// ascending index. An unbound side keeps its device only while that device
/// is still the top-ranked candidate for the side.
#[derive(Debug, Clone, Default)]
pub struct TrackedHandHandler;

impl TrackedHandHandler {
    pub fn new() -> Self {
        Self
    }

    fn refresh(&self, map: &mut RoleTypeMap) {
        let pool = unbound_devices_of_class(map, DeviceClass::TrackedHand);
        let sides = [
            (TrackedHandRole::RightHand, Handedness::Right),
            (TrackedHandRole::LeftHand, Handedness::Left),
        ];

        let mut assignments = Vec::with_capacity(sides.len());
        for (role, side) in sides {
            let value = role.to_value();
            if map.is_role_bound(value) {
                continue;
            }
            let best = best_candidate(map, &pool, side);
            if best != Some(map.mapped_device(value)) {
                debug!(role = %role, best = ?best, "Tracked hand reassigned");
            }
            assignments.push((value, best));
        }

        for (role, device) in assignments {
            assign(map, role, device);
        }
    }
}

fn best_candidate(map: &RoleTypeMap, pool: &[DeviceIndex], side: Handedness) -> Option<DeviceIndex> {
    let devices = map.devices();
    pool.iter()
        .copied()
        .filter(|&device| devices.handedness(device) == side)
        .min_by_key(|&device| {
            (
                Reverse(devices.is_pose_valid(device)),
                Reverse(devices.valid_joint_count(device)),
                device,
            )
        })
}

impl MapHandler for TrackedHandHandler {
    fn name(&self) -> &str {
        "tracked-hand"
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
