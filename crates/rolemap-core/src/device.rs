//! Device slots and the device-state query interface
//!
//! The engine never talks to hardware. Backends describe the current device
//! slots through [`DeviceStateQuery`]; [`DeviceTable`] is an in-memory
//! implementation for hosts that feed device state by hand.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;

/// Number of device slots a backend can expose
pub const MAX_DEVICE_COUNT: u32 = 64;

/// Index of a device slot, stable only while the device stays connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceIndex(pub u32);

impl DeviceIndex {
    pub const INVALID: DeviceIndex = DeviceIndex(u32::MAX);

    pub fn is_valid(self) -> bool {
        self.0 < MAX_DEVICE_COUNT
    }

    /// All valid indices in ascending order
    pub fn all() -> impl Iterator<Item = DeviceIndex> {
        (0..MAX_DEVICE_COUNT).map(DeviceIndex)
    }

    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

/// Kind of hardware occupying a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Invalid,
    Hmd,
    Controller,
    GenericTracker,
    TrackingReference,
    TrackedHand,
}

impl Default for DeviceClass {
    fn default() -> Self {
        Self::Invalid
    }
}

/// Hardware-reported left/right designation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    None,
    Left,
    Right,
}

impl Default for Handedness {
    fn default() -> Self {
        Self::None
    }
}

/// Read access to the device backend
///
/// Every method must answer for any index; slots outside the backend's range
/// report a disconnected device.
pub trait DeviceStateQuery {
    fn is_connected(&self, device: DeviceIndex) -> bool;
    fn device_class(&self, device: DeviceIndex) -> DeviceClass;
    fn serial_number(&self, device: DeviceIndex) -> String;

    fn handedness(&self, _device: DeviceIndex) -> Handedness {
        Handedness::None
    }

    fn is_pose_valid(&self, _device: DeviceIndex) -> bool {
        false
    }

    /// Number of hand joints currently reported as tracked
    fn valid_joint_count(&self, _device: DeviceIndex) -> usize {
        0
    }

    /// Lowest connected device index reporting `serial`
    fn find_connected_by_serial(&self, serial: &str) -> Option<DeviceIndex> {
        if serial.is_empty() {
            return None;
        }
        DeviceIndex::all()
            .find(|&device| self.is_connected(device) && self.serial_number(device) == serial)
    }
}

/// Snapshot of a single device slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub connected: bool,
    pub class: DeviceClass,
    pub serial: String,
    #[serde(default)]
    pub handedness: Handedness,
    #[serde(default)]
    pub pose_valid: bool,
    #[serde(default)]
    pub valid_joints: usize,
}

impl DeviceState {
    /// Create a connected device with the given class and serial number
    pub fn connected(class: DeviceClass, serial: impl Into<String>) -> Self {
        Self {
            connected: true,
            class,
            serial: serial.into(),
            ..Default::default()
        }
    }

    pub fn with_handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = handedness;
        self
    }

    pub fn with_pose(mut self, pose_valid: bool, valid_joints: usize) -> Self {
        self.pose_valid = pose_valid;
        self.valid_joints = valid_joints;
        self
    }
}

/// In-memory device backend
///
/// Mutating a slot does not notify anyone: the host is expected to forward
/// the change to the registry, the same way a polling backend would.
#[derive(Debug)]
pub struct DeviceTable {
    slots: RefCell<Vec<DeviceState>>,
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTable {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(vec![DeviceState::default(); MAX_DEVICE_COUNT as usize]),
        }
    }

    /// Replace the state of a slot
    pub fn set(&self, device: DeviceIndex, state: DeviceState) {
        if !device.is_valid() {
            return;
        }
        self.slots.borrow_mut()[device.slot()] = state;
    }

    /// Mark a slot connected with the given state
    pub fn connect(&self, device: DeviceIndex, mut state: DeviceState) {
        state.connected = true;
        self.set(device, state);
    }

    /// Mark a slot disconnected, keeping its last known class and serial
    pub fn disconnect(&self, device: DeviceIndex) {
        if !device.is_valid() {
            return;
        }
        self.slots.borrow_mut()[device.slot()].connected = false;
    }

    /// Update pose quality of a slot
    pub fn set_pose(&self, device: DeviceIndex, pose_valid: bool, valid_joints: usize) {
        if !device.is_valid() {
            return;
        }
        let mut slots = self.slots.borrow_mut();
        slots[device.slot()].pose_valid = pose_valid;
        slots[device.slot()].valid_joints = valid_joints;
    }

    pub fn set_handedness(&self, device: DeviceIndex, handedness: Handedness) {
        if !device.is_valid() {
            return;
        }
        self.slots.borrow_mut()[device.slot()].handedness = handedness;
    }

    pub fn get(&self, device: DeviceIndex) -> Option<DeviceState> {
        if !device.is_valid() {
            return None;
        }
        self.slots.borrow().get(device.slot()).cloned()
    }

    fn read<T>(&self, device: DeviceIndex, f: impl FnOnce(&DeviceState) -> T, default: T) -> T {
        if !device.is_valid() {
            return default;
        }
        match self.slots.borrow().get(device.slot()) {
            Some(state) => f(state),
            None => default,
        }
    }
}

impl DeviceStateQuery for DeviceTable {
    fn is_connected(&self, device: DeviceIndex) -> bool {
        self.read(device, |s| s.connected, false)
    }

    fn device_class(&self, device: DeviceIndex) -> DeviceClass {
        self.read(device, |s| s.class, DeviceClass::Invalid)
    }

    fn serial_number(&self, device: DeviceIndex) -> String {
        self.read(device, |s| s.serial.clone(), String::new())
    }

    fn handedness(&self, device: DeviceIndex) -> Handedness {
        self.read(device, |s| s.handedness, Handedness::None)
    }

    fn is_pose_valid(&self, device: DeviceIndex) -> bool {
        self.read(device, |s| s.connected && s.pose_valid, false)
    }

    fn valid_joint_count(&self, device: DeviceIndex) -> usize {
        self.read(device, |s| s.valid_joints, 0)
    }
}
