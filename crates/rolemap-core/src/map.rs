//! Per-role-type mapping and binding tables
//!
//! A [`RoleTypeMap`] owns two tables for one role-type:
//! - the *mapping* table, a partial bijection between role values and
//!   currently connected device indices
//! - the *binding* table, serial number to role value, independent of
//!   whether the device is connected
//!
//! Bindings always win over the active [`MapHandler`]: a bound role is only
//! ever mapped to a connected device carrying one of its bound serials, and
//! binding-driven updates are applied before the handler hears about any
//! connection or binding change.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::device::{DeviceClass, DeviceIndex, DeviceStateQuery, MAX_DEVICE_COUNT};
use crate::error::RoleError;
use crate::handler::MapHandler;
use crate::role_type::RoleTypeDescriptor;

/// A single change of the mapping table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingChanged {
    pub role: i32,
    pub previous_device: DeviceIndex,
    pub current_device: DeviceIndex,
}

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Returns `false` once it should be dropped from the map
type MappingListener = Box<dyn FnMut(&MappingChanged) -> bool>;

/// Mapping and binding engine for one role-type
pub struct RoleTypeMap {
    descriptor: Arc<dyn RoleTypeDescriptor>,
    devices: Rc<dyn DeviceStateQuery>,
    /// Indexed by role slot
    role_to_device: Vec<DeviceIndex>,
    /// Indexed by device slot
    device_to_role: Vec<i32>,
    serial_to_role: BTreeMap<String, i32>,
    /// Serials bound to each role slot
    role_serials: Vec<BTreeSet<String>>,
    /// Connected devices whose serial is bound to each role slot
    role_bound_devices: Vec<BTreeSet<DeviceIndex>>,
    handler: Option<Box<dyn MapHandler>>,
    listeners: Vec<(ListenerId, MappingListener)>,
    next_listener_id: u64,
    /// Held while the mapping table is being rewritten
    mapping: bool,
    /// Held while the handler is being called
    dispatching: bool,
}

impl RoleTypeMap {
    /// Create an empty map with no handler attached
    pub fn new(descriptor: Arc<dyn RoleTypeDescriptor>, devices: Rc<dyn DeviceStateQuery>) -> Self {
        let span = descriptor.role_span();
        let invalid = descriptor.invalid_role();
        Self {
            descriptor,
            devices,
            role_to_device: vec![DeviceIndex::INVALID; span],
            device_to_role: vec![invalid; MAX_DEVICE_COUNT as usize],
            serial_to_role: BTreeMap::new(),
            role_serials: vec![BTreeSet::new(); span],
            role_bound_devices: vec![BTreeSet::new(); span],
            handler: None,
            listeners: Vec::new(),
            next_listener_id: 0,
            mapping: false,
            dispatching: false,
        }
    }

    pub fn descriptor(&self) -> &dyn RoleTypeDescriptor {
        self.descriptor.as_ref()
    }

    pub fn role_type_name(&self) -> &str {
        self.descriptor.name()
    }

    /// Device backend this map reads connection state from
    pub fn devices(&self) -> &dyn DeviceStateQuery {
        self.devices.as_ref()
    }

    pub fn invalid_role(&self) -> i32 {
        self.descriptor.invalid_role()
    }

    pub fn is_valid_role(&self, role: i32) -> bool {
        self.descriptor.is_valid_role(role)
    }

    // ---- mapping queries ----

    pub fn is_role_mapped(&self, role: i32) -> bool {
        self.mapped_device(role).is_valid()
    }

    pub fn is_device_mapped(&self, device: DeviceIndex) -> bool {
        self.descriptor.is_valid_role(self.mapped_role(device))
    }

    /// Device mapped to `role`, or [`DeviceIndex::INVALID`]
    pub fn mapped_device(&self, role: i32) -> DeviceIndex {
        self.descriptor
            .role_slot(role)
            .map(|slot| self.role_to_device[slot])
            .unwrap_or(DeviceIndex::INVALID)
    }

    /// Role mapped to `device`, or the invalid role
    pub fn mapped_role(&self, device: DeviceIndex) -> i32 {
        if !device.is_valid() {
            return self.invalid_role();
        }
        self.device_to_role[device.slot()]
    }

    /// All current `(role, device)` pairs in ascending role order
    pub fn mappings(&self) -> impl Iterator<Item = (i32, DeviceIndex)> + '_ {
        self.descriptor
            .valid_roles()
            .iter()
            .map(|&role| (role, self.mapped_device(role)))
            .filter(|(_, device)| device.is_valid())
    }

    // ---- binding queries ----

    /// Whether any serial number is bound to `role`, connected or not
    pub fn is_role_bound(&self, role: i32) -> bool {
        self.descriptor
            .role_slot(role)
            .map(|slot| !self.role_serials[slot].is_empty())
            .unwrap_or(false)
    }

    pub fn is_serial_bound(&self, serial: &str) -> bool {
        self.serial_to_role.contains_key(serial)
    }

    /// Whether `device` is connected and its serial number is bound
    pub fn is_device_bound(&self, device: DeviceIndex) -> bool {
        if !device.is_valid() || !self.devices.is_connected(device) {
            return false;
        }
        let serial = self.devices.serial_number(device);
        !serial.is_empty() && self.serial_to_role.contains_key(&serial)
    }

    /// Role bound to `serial`
    ///
    /// Returns `None` exactly when [`is_serial_bound`](Self::is_serial_bound)
    /// is false; callers that already checked may rely on `Some`.
    pub fn bound_role(&self, serial: &str) -> Option<i32> {
        self.serial_to_role.get(serial).copied()
    }

    /// Serial numbers bound to `role`, in ascending order
    pub fn bound_serials(&self, role: i32) -> impl Iterator<Item = &str> + '_ {
        self.descriptor
            .role_slot(role)
            .map(|slot| &self.role_serials[slot])
            .into_iter()
            .flat_map(|serials| serials.iter().map(|s| s.as_str()))
    }

    /// Connected devices bound to `role`, in ascending order
    pub fn bound_devices(&self, role: i32) -> impl Iterator<Item = DeviceIndex> + '_ {
        self.descriptor
            .role_slot(role)
            .map(|slot| &self.role_bound_devices[slot])
            .into_iter()
            .flat_map(|devices| devices.iter().copied())
    }

    /// The bound device currently holding `role`
    pub fn bound_device(&self, role: i32) -> Option<DeviceIndex> {
        let slot = self.descriptor.role_slot(role)?;
        let device = self.role_to_device[slot];
        self.role_bound_devices[slot].contains(&device).then_some(device)
    }

    /// The binding table as `(serial, role)` pairs ordered by serial
    pub fn bindings(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.serial_to_role.iter().map(|(serial, role)| (serial.as_str(), *role))
    }

    pub fn bindings_blocked(&self) -> bool {
        self.handler.as_ref().map(|h| h.blocks_bindings()).unwrap_or(false)
    }

    // ---- mapping mutation ----

    /// Map `role` to `device`
    ///
    /// Bound roles and bound devices are rejected; their mapping follows the
    /// binding table and only changes through [`bind`](Self::bind) and
    /// [`unbind`](Self::unbind).
    pub fn map(&mut self, role: i32, device: DeviceIndex) -> Result<(), RoleError> {
        self.checked_slot(role)?;
        if !device.is_valid() {
            return Err(RoleError::InvalidDevice(device));
        }
        if self.is_role_bound(role) {
            return Err(RoleError::RoleBound(role));
        }
        if self.is_device_bound(device) {
            return Err(RoleError::DeviceBound(device));
        }
        self.internal_map(role, device)
    }

    /// Unmap `role`; false if it was not mapped or is bound
    pub fn unmap(&mut self, role: i32) -> bool {
        if !self.is_role_mapped(role) || self.is_role_bound(role) {
            return false;
        }
        matches!(self.internal_unmap(role), Ok(true))
    }

    /// Unmap whatever role `device` holds; false if unmapped or bound
    pub fn unmap_device(&mut self, device: DeviceIndex) -> bool {
        if !self.is_device_mapped(device) || self.is_device_bound(device) {
            return false;
        }
        let role = self.mapped_role(device);
        matches!(self.internal_unmap(role), Ok(true))
    }

    /// Install `role -> device`, clearing previous occupants of both sides
    ///
    /// Re-installing an existing pair changes nothing and fires nothing.
    fn internal_map(&mut self, role: i32, device: DeviceIndex) -> Result<(), RoleError> {
        if self.mapping {
            error!(role_type = %self.role_type_name(), role, device = %device, "Recursive internal mapping");
            return Err(RoleError::Reentrant("internal mapping"));
        }
        let slot = self.checked_slot(role)?;
        if !device.is_valid() {
            return Err(RoleError::InvalidDevice(device));
        }

        let previous_device = self.role_to_device[slot];
        if previous_device == device {
            return Ok(());
        }

        self.mapping = true;
        let displaced_role = self.device_to_role[device.slot()];
        if let Some(displaced_slot) = self.descriptor.role_slot(displaced_role) {
            self.role_to_device[displaced_slot] = DeviceIndex::INVALID;
        }
        if previous_device.is_valid() {
            self.device_to_role[previous_device.slot()] = self.invalid_role();
        }
        self.role_to_device[slot] = device;
        self.device_to_role[device.slot()] = role;
        self.mapping = false;

        debug!(
            role_type = %self.role_type_name(),
            role,
            previous = %previous_device,
            device = %device,
            "Role mapped"
        );

        if self.descriptor.is_valid_role(displaced_role) {
            self.emit(MappingChanged {
                role: displaced_role,
                previous_device: device,
                current_device: DeviceIndex::INVALID,
            });
        }
        self.emit(MappingChanged {
            role,
            previous_device,
            current_device: device,
        });
        Ok(())
    }

    fn internal_unmap(&mut self, role: i32) -> Result<bool, RoleError> {
        if self.mapping {
            error!(role_type = %self.role_type_name(), role, "Recursive internal unmapping");
            return Err(RoleError::Reentrant("internal mapping"));
        }
        let slot = self.checked_slot(role)?;
        let previous_device = self.role_to_device[slot];
        if !previous_device.is_valid() {
            return Ok(false);
        }

        self.mapping = true;
        self.role_to_device[slot] = DeviceIndex::INVALID;
        self.device_to_role[previous_device.slot()] = self.invalid_role();
        self.mapping = false;

        debug!(role_type = %self.role_type_name(), role, previous = %previous_device, "Role unmapped");

        self.emit(MappingChanged {
            role,
            previous_device,
            current_device: DeviceIndex::INVALID,
        });
        Ok(true)
    }

    /// Make the mapping of a bound role agree with its bound devices
    ///
    /// Keeps the current device if it is still a candidate, otherwise picks
    /// the lowest candidate. A bound role without candidates stays unmapped.
    fn sync_bound_role(&mut self, role: i32) -> Result<(), RoleError> {
        let slot = self.checked_slot(role)?;
        let current = self.role_to_device[slot];
        let candidates = &self.role_bound_devices[slot];
        if candidates.contains(&current) {
            return Ok(());
        }
        let first = candidates.iter().next().copied();
        match first {
            Some(device) => self.internal_map(role, device),
            None if current.is_valid() && !self.role_serials[slot].is_empty() => {
                self.internal_unmap(role).map(|_| ())
            }
            None => Ok(()),
        }
    }

    fn clear_mappings(&mut self) -> Result<(), RoleError> {
        let roles: Vec<i32> = self.mappings().map(|(role, _)| role).collect();
        for role in roles {
            self.internal_unmap(role)?;
        }
        Ok(())
    }

    // ---- binding mutation ----

    /// Bind `serial` to `role`
    ///
    /// A serial bound elsewhere is unbound first. If the device carrying
    /// `serial` is connected it takes the role immediately.
    pub fn bind(&mut self, serial: &str, role: i32) -> Result<(), RoleError> {
        self.ensure_bindings_allowed("bind")?;
        if serial.is_empty() {
            return Err(RoleError::EmptySerial);
        }
        let slot = self.checked_slot(role)?;

        let previous = self.bound_role(serial);
        if previous == Some(role) {
            return Ok(());
        }
        if let Some(previous_role) = previous {
            self.remove_binding(serial, previous_role)?;
        }

        self.serial_to_role.insert(serial.to_string(), role);
        self.role_serials[slot].insert(serial.to_string());

        match self.devices.find_connected_by_serial(serial) {
            Some(device) => {
                self.role_bound_devices[slot].insert(device);
                self.internal_map(role, device)?;
            }
            None => self.sync_bound_role(role)?,
        }

        info!(
            role_type = %self.role_type_name(),
            serial,
            role,
            previous = ?previous,
            "Bound device serial to role"
        );

        self.dispatch(|handler, map| handler.on_binding_changed(map, serial, previous, Some(role)));
        Ok(())
    }

    /// Remove the binding of `serial`; `Ok(false)` if it was not bound
    pub fn unbind(&mut self, serial: &str) -> Result<bool, RoleError> {
        self.ensure_bindings_allowed("unbind")?;
        let Some(role) = self.bound_role(serial) else {
            return Ok(false);
        };
        self.remove_binding(serial, role)?;

        info!(role_type = %self.role_type_name(), serial, role, "Unbound device serial");

        self.dispatch(|handler, map| handler.on_binding_changed(map, serial, Some(role), None));
        Ok(true)
    }

    /// Remove the binding of the serial carried by a connected device
    pub fn unbind_device(&mut self, device: DeviceIndex) -> Result<bool, RoleError> {
        if !device.is_valid() || !self.devices.is_connected(device) {
            return Ok(false);
        }
        let serial = self.devices.serial_number(device);
        self.unbind(&serial)
    }

    /// Bind every mapped role to the serial of its device; returns bindings added
    pub fn bind_all(&mut self) -> usize {
        if self.bindings_blocked() || self.dispatching {
            debug!(role_type = %self.role_type_name(), "Skipping bind_all");
            return 0;
        }
        let pending: Vec<(String, i32)> = self
            .mappings()
            .map(|(role, device)| (self.devices.serial_number(device), role))
            .filter(|(serial, role)| !serial.is_empty() && self.bound_role(serial) != Some(*role))
            .collect();

        let mut added = 0;
        for (serial, role) in pending {
            if self.bind(&serial, role).is_ok() {
                added += 1;
            }
        }
        added
    }

    /// Remove every binding; returns bindings removed
    pub fn unbind_all(&mut self) -> usize {
        if self.bindings_blocked() || self.dispatching {
            debug!(role_type = %self.role_type_name(), "Skipping unbind_all");
            return 0;
        }
        let serials: Vec<String> = self.serial_to_role.keys().cloned().collect();
        let mut removed = 0;
        for serial in serials {
            if let Ok(true) = self.unbind(&serial) {
                removed += 1;
            }
        }
        removed
    }

    fn remove_binding(&mut self, serial: &str, role: i32) -> Result<(), RoleError> {
        self.serial_to_role.remove(serial);
        let Some(slot) = self.descriptor.role_slot(role) else {
            return Ok(());
        };
        self.role_serials[slot].remove(serial);

        if let Some(device) = self.devices.find_connected_by_serial(serial) {
            self.role_bound_devices[slot].remove(&device);
            if self.role_to_device[slot] == device {
                let remaining = self.role_bound_devices[slot].iter().next().copied();
                match remaining {
                    Some(other) => self.internal_map(role, other)?,
                    None => {
                        self.internal_unmap(role)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn ensure_bindings_allowed(&self, operation: &'static str) -> Result<(), RoleError> {
        if self.dispatching {
            error!(role_type = %self.role_type_name(), operation, "Binding change from inside a handler callback");
            return Err(RoleError::Reentrant(operation));
        }
        if self.bindings_blocked() {
            return Err(RoleError::BindingsBlocked(self.role_type_name().to_string()));
        }
        Ok(())
    }

    // ---- handler ----

    /// Make `handler` the active assignment policy
    ///
    /// The previous handler is divested first. An exclusive handler starts
    /// from an empty mapping table, with binding-driven mappings re-applied
    /// unless it blocks bindings.
    pub fn set_handler(&mut self, handler: Box<dyn MapHandler>) -> Result<(), RoleError> {
        if self.dispatching {
            error!(role_type = %self.role_type_name(), "Handler replaced from inside a handler callback");
            return Err(RoleError::Reentrant("set_handler"));
        }

        if let Some(mut previous) = self.handler.take() {
            self.dispatching = true;
            previous.on_divested_as_current(self);
            self.dispatching = false;
        }

        if handler.is_exclusive() {
            self.clear_mappings()?;
            if !handler.blocks_bindings() {
                let roles = self.descriptor.valid_roles().to_vec();
                for role in roles {
                    self.sync_bound_role(role)?;
                }
            }
        }

        info!(role_type = %self.role_type_name(), handler = handler.name(), "Handler assigned");
        self.handler = Some(handler);
        self.dispatch(|handler, map| handler.on_assigned_as_current(map));
        Ok(())
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.handler.as_ref().map(|h| h.name())
    }

    fn dispatch(&mut self, f: impl FnOnce(&mut (dyn MapHandler + 'static), &mut RoleTypeMap)) {
        let Some(mut handler) = self.handler.take() else {
            return;
        };
        self.dispatching = true;
        f(handler.as_mut(), self);
        self.dispatching = false;
        self.handler = Some(handler);
    }

    // ---- backend notifications ----

    /// Apply a device connection change, then notify the handler
    pub fn on_connected_device_changed(
        &mut self,
        device: DeviceIndex,
        class: DeviceClass,
        serial: &str,
        connected: bool,
    ) -> Result<(), RoleError> {
        if self.dispatching {
            error!(role_type = %self.role_type_name(), device = %device, "Connection change from inside a handler callback");
            return Err(RoleError::Reentrant("connection change"));
        }
        if !device.is_valid() {
            return Err(RoleError::InvalidDevice(device));
        }

        if connected {
            if let Some(role) = self.bound_role(serial) {
                if let Some(slot) = self.descriptor.role_slot(role) {
                    self.role_bound_devices[slot].insert(device);
                    self.internal_map(role, device)?;
                }
            }
        } else {
            for devices in &mut self.role_bound_devices {
                devices.remove(&device);
            }
            let role = self.mapped_role(device);
            if self.descriptor.is_valid_role(role) {
                self.internal_unmap(role)?;
                self.sync_bound_role(role)?;
            }
        }

        self.dispatch(|handler, map| {
            handler.on_connected_device_changed(map, device, class, serial, connected)
        });
        Ok(())
    }

    /// The backend reassigned hardware left/right designations
    pub fn on_tracked_device_role_changed(&mut self) -> Result<(), RoleError> {
        if self.dispatching {
            error!(role_type = %self.role_type_name(), "Tracked role change from inside a handler callback");
            return Err(RoleError::Reentrant("tracked role change"));
        }
        self.dispatch(|handler, map| handler.on_tracked_device_role_changed(map));
        Ok(())
    }

    // ---- events ----

    /// Register a listener for mapping changes
    ///
    /// Listeners only see the event value, so they cannot mutate the map
    /// while it is dispatching.
    pub fn on_mapping_changed(&mut self, mut listener: impl FnMut(&MappingChanged) + 'static) -> ListenerId {
        self.on_mapping_changed_while(move |event| {
            listener(event);
            true
        })
    }

    /// Register a listener that stays registered while it returns `true`
    pub fn on_mapping_changed_while(
        &mut self,
        listener: impl FnMut(&MappingChanged) -> bool + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_mapping_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn emit(&mut self, event: MappingChanged) {
        self.listeners.retain_mut(|(id, listener)| {
            let keep = listener(&event);
            if !keep {
                debug!(role_type = %self.descriptor.name(), listener = id.0, "Dropped mapping listener");
            }
            keep
        });
    }

    fn checked_slot(&self, role: i32) -> Result<usize, RoleError> {
        self.descriptor.role_slot(role).ok_or_else(|| RoleError::InvalidRole {
            role_type: self.role_type_name().to_string(),
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceState, DeviceTable};
    use crate::handler::DevicePassthroughHandler;
    use crate::role_type::RoleTypeInfo;
    use std::cell::RefCell;

    const A: i32 = 1;
    const B: i32 = 2;
    const C: i32 = 3;

    fn setup() -> (Rc<DeviceTable>, RoleTypeMap) {
        let devices = Rc::new(DeviceTable::new());
        let info = RoleTypeInfo::new("Test", 0, "Invalid", [("A", A), ("B", B), ("C", C)]);
        let map = RoleTypeMap::new(Arc::new(info), devices.clone());
        (devices, map)
    }

    fn connect(devices: &DeviceTable, map: &mut RoleTypeMap, index: u32, serial: &str) {
        let device = DeviceIndex(index);
        devices.connect(device, DeviceState::connected(DeviceClass::GenericTracker, serial));
        map.on_connected_device_changed(device, DeviceClass::GenericTracker, serial, true)
            .unwrap();
    }

    fn disconnect(devices: &DeviceTable, map: &mut RoleTypeMap, index: u32) {
        let device = DeviceIndex(index);
        let serial = devices.serial_number(device);
        devices.disconnect(device);
        map.on_connected_device_changed(device, DeviceClass::GenericTracker, &serial, false)
            .unwrap();
    }

    fn record(map: &mut RoleTypeMap) -> Rc<RefCell<Vec<MappingChanged>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        map.on_mapping_changed(move |e| sink.borrow_mut().push(*e));
        events
    }

    fn assert_bijection(map: &RoleTypeMap) {
        for &role in map.descriptor().valid_roles() {
            let device = map.mapped_device(role);
            if device.is_valid() {
                assert_eq!(map.mapped_role(device), role);
            }
        }
        for device in DeviceIndex::all() {
            let role = map.mapped_role(device);
            if map.is_valid_role(role) {
                assert_eq!(map.mapped_device(role), device);
            }
        }
    }

    #[test]
    fn test_map_moves_device_between_roles() {
        let (_devices, mut map) = setup();
        let events = record(&mut map);

        map.map(A, DeviceIndex(0)).unwrap();
        map.map(B, DeviceIndex(0)).unwrap();
        assert_bijection(&map);

        assert!(!map.is_role_mapped(A));
        assert_eq!(map.mapped_device(B), DeviceIndex(0));
        assert_eq!(map.mapped_role(DeviceIndex(0)), B);

        let events = events.borrow();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            MappingChanged { role: A, previous_device: DeviceIndex(0), current_device: DeviceIndex::INVALID }
        );
        assert_eq!(
            events[2],
            MappingChanged { role: B, previous_device: DeviceIndex::INVALID, current_device: DeviceIndex(0) }
        );
    }

    #[test]
    fn test_map_replaces_role_occupant() {
        let (_devices, mut map) = setup();
        map.map(A, DeviceIndex(0)).unwrap();
        map.map(A, DeviceIndex(1)).unwrap();
        assert_bijection(&map);
        assert_eq!(map.mapped_device(A), DeviceIndex(1));
        assert!(!map.is_device_mapped(DeviceIndex(0)));
        assert_eq!(map.mapped_role(DeviceIndex(0)), 0);
    }

    #[test]
    fn test_map_rejects_invalid_arguments() {
        let (devices, mut map) = setup();
        assert!(matches!(map.map(0, DeviceIndex(0)), Err(RoleError::InvalidRole { .. })));
        assert!(matches!(map.map(7, DeviceIndex(0)), Err(RoleError::InvalidRole { .. })));
        assert_eq!(
            map.map(A, DeviceIndex::INVALID),
            Err(RoleError::InvalidDevice(DeviceIndex::INVALID))
        );

        connect(&devices, &mut map, 2, "S2");
        map.bind("S2", B).unwrap();
        assert_eq!(map.map(B, DeviceIndex(5)), Err(RoleError::RoleBound(B)));
        assert_eq!(map.map(A, DeviceIndex(2)), Err(RoleError::DeviceBound(DeviceIndex(2))));
        assert!(!map.unmap(B));
        assert!(!map.unmap_device(DeviceIndex(2)));
        assert_eq!(map.mapped_device(B), DeviceIndex(2));
    }

    #[test]
    fn test_widely_spread_roles() {
        let devices = Rc::new(DeviceTable::new());
        let info = RoleTypeInfo::new("Wide", 0, "Invalid", [("Low", -2_000_000_000), ("High", 2_000_000_000)]);
        let mut map = RoleTypeMap::new(Arc::new(info), devices.clone());

        map.map(2_000_000_000, DeviceIndex(3)).unwrap();
        map.bind("S1", -2_000_000_000).unwrap();
        assert_eq!(map.mapped_device(2_000_000_000), DeviceIndex(3));
        assert_eq!(map.mapped_role(DeviceIndex(3)), 2_000_000_000);
        assert_eq!(map.bound_role("S1"), Some(-2_000_000_000));
        assert!(map.map(5, DeviceIndex(4)).is_err());
    }

    #[test]
    fn test_unmap() {
        let (_devices, mut map) = setup();
        assert!(!map.unmap(A));
        map.map(A, DeviceIndex(4)).unwrap();
        assert!(map.unmap_device(DeviceIndex(4)));
        assert!(!map.is_role_mapped(A));
        map.map(C, DeviceIndex(4)).unwrap();
        assert!(map.unmap(C));
        assert!(!map.unmap(C));
    }

    #[test]
    fn test_reaffirming_a_binding_is_silent() {
        let (devices, mut map) = setup();
        connect(&devices, &mut map, 1, "S1");
        let events = record(&mut map);

        map.bind("S1", A).unwrap();
        assert_eq!(events.borrow().len(), 1);

        map.bind("S1", A).unwrap();
        map.internal_map(A, DeviceIndex(1)).unwrap();
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(map.mapped_device(A), DeviceIndex(1));
    }

    #[test]
    fn test_bound_serial_maps_on_connect() {
        let (devices, mut map) = setup();
        map.bind("S1", C).unwrap();
        assert!(map.is_role_bound(C));
        assert!(!map.is_role_mapped(C));

        connect(&devices, &mut map, 6, "S1");
        assert_eq!(map.mapped_device(C), DeviceIndex(6));
        assert_eq!(map.bound_device(C), Some(DeviceIndex(6)));
        assert!(map.is_device_bound(DeviceIndex(6)));

        disconnect(&devices, &mut map, 6);
        assert!(!map.is_role_mapped(C));
        assert!(map.is_role_bound(C));

        connect(&devices, &mut map, 9, "S1");
        assert_eq!(map.mapped_device(C), DeviceIndex(9));
        assert_bijection(&map);
    }

    #[test]
    fn test_rebind_moves_serial_to_new_role() {
        let (devices, mut map) = setup();
        connect(&devices, &mut map, 0, "S0");
        map.bind("S0", A).unwrap();
        map.bind("S0", B).unwrap();

        assert!(!map.is_role_bound(A));
        assert!(!map.is_role_mapped(A));
        assert_eq!(map.bound_role("S0"), Some(B));
        assert_eq!(map.mapped_device(B), DeviceIndex(0));
        assert_bijection(&map);
    }

    #[test]
    fn test_unbind_falls_back_to_remaining_bound_device() {
        let (devices, mut map) = setup();
        connect(&devices, &mut map, 0, "S0");
        connect(&devices, &mut map, 1, "S1");
        map.bind("S0", A).unwrap();
        map.bind("S1", A).unwrap();

        assert_eq!(map.mapped_device(A), DeviceIndex(1));
        assert_eq!(map.bound_devices(A).collect::<Vec<_>>(), vec![DeviceIndex(0), DeviceIndex(1)]);

        assert_eq!(map.unbind("S1"), Ok(true));
        assert_eq!(map.mapped_device(A), DeviceIndex(0));

        assert_eq!(map.unbind_device(DeviceIndex(0)), Ok(true));
        assert!(!map.is_role_mapped(A));
        assert_eq!(map.unbind("S0"), Ok(false));
    }

    #[test]
    fn test_disconnect_hands_role_to_other_bound_device() {
        let (devices, mut map) = setup();
        connect(&devices, &mut map, 0, "S0");
        connect(&devices, &mut map, 1, "S1");
        map.bind("S0", B).unwrap();
        map.bind("S1", B).unwrap();

        disconnect(&devices, &mut map, 1);
        assert_eq!(map.mapped_device(B), DeviceIndex(0));
        assert_bijection(&map);
    }

    #[test]
    fn test_binding_disconnected_serial_reserves_role() {
        let (_devices, mut map) = setup();
        map.map(A, DeviceIndex(3)).unwrap();
        map.bind("OFFLINE", A).unwrap();
        assert!(!map.is_role_mapped(A));
        assert!(!map.is_device_mapped(DeviceIndex(3)));
    }

    #[test]
    fn test_bind_all_and_unbind_all() {
        let (devices, mut map) = setup();
        connect(&devices, &mut map, 0, "S0");
        connect(&devices, &mut map, 1, "S1");
        map.map(A, DeviceIndex(0)).unwrap();
        map.map(C, DeviceIndex(1)).unwrap();

        assert_eq!(map.bind_all(), 2);
        assert_eq!(map.bind_all(), 0);
        assert_eq!(
            map.bindings().collect::<Vec<_>>(),
            vec![("S0", A), ("S1", C)]
        );

        assert_eq!(map.unbind_all(), 2);
        assert_eq!(map.bindings().count(), 0);
        assert!(!map.is_role_mapped(A));
    }

    #[test]
    fn test_finished_listener_is_dropped() {
        let (_devices, mut map) = setup();
        let calls = Rc::new(RefCell::new(0));
        let sink = calls.clone();
        map.on_mapping_changed_while(move |_| {
            *sink.borrow_mut() += 1;
            false
        });
        let events = record(&mut map);
        assert_eq!(map.listener_count(), 2);

        map.map(A, DeviceIndex(0)).unwrap();
        assert_eq!(map.listener_count(), 1);
        map.map(B, DeviceIndex(1)).unwrap();

        assert_eq!(*calls.borrow(), 1);
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn test_empty_serial_rejected() {
        let (_devices, mut map) = setup();
        assert_eq!(map.bind("", A), Err(RoleError::EmptySerial));
    }

    #[test]
    fn test_internal_mapping_guard() {
        let (_devices, mut map) = setup();
        // Listeners only receive `&MappingChanged` and cannot reach the map,
        // so no public call path re-enters a rewrite; set the flag directly.
        map.mapping = true;
        assert_eq!(
            map.map(A, DeviceIndex(0)),
            Err(RoleError::Reentrant("internal mapping"))
        );
        map.mapping = false;
        assert!(map.map(A, DeviceIndex(0)).is_ok());
    }

    #[test]
    fn test_blocking_handler_refuses_bindings() {
        let devices = Rc::new(DeviceTable::new());
        let mut map = RoleTypeMap::new(
            Arc::new(RoleTypeInfo::of::<crate::roles::DeviceRole>()),
            devices.clone(),
        );
        map.set_handler(Box::new(DevicePassthroughHandler::new())).unwrap();

        assert!(matches!(map.bind("S0", 0), Err(RoleError::BindingsBlocked(_))));
        assert!(matches!(map.unbind("S0"), Err(RoleError::BindingsBlocked(_))));
        assert_eq!(map.bind_all(), 0);
        assert_eq!(map.unbind_all(), 0);
    }

    /// Records what the handler observes when it is called
    struct ProbeHandler {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl MapHandler for ProbeHandler {
        fn name(&self) -> &str {
            "probe"
        }

        fn on_assigned_as_current(&mut self, _map: &mut RoleTypeMap) {
            self.seen.borrow_mut().push("assigned".to_string());
        }

        fn on_connected_device_changed(
            &mut self,
            map: &mut RoleTypeMap,
            device: DeviceIndex,
            _class: DeviceClass,
            _serial: &str,
            connected: bool,
        ) {
            self.seen.borrow_mut().push(format!(
                "connected {} {} role={}",
                device,
                connected,
                map.mapped_role(device)
            ));
        }

        fn on_binding_changed(
            &mut self,
            map: &mut RoleTypeMap,
            serial: &str,
            previous: Option<i32>,
            current: Option<i32>,
        ) {
            let nested = map.bind("OTHER", C);
            self.seen
                .borrow_mut()
                .push(format!("binding {serial} {previous:?} -> {current:?} nested={nested:?}"));
        }
    }

    #[test]
    fn test_handler_sees_binding_state_first() {
        let (devices, mut map) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        map.set_handler(Box::new(ProbeHandler { seen: seen.clone() }))
            .unwrap();
        map.bind("S5", B).unwrap();
        connect(&devices, &mut map, 5, "S5");

        let seen = seen.borrow();
        assert_eq!(seen[0], "assigned");
        assert_eq!(
            seen[1],
            "binding S5 None -> Some(2) nested=Err(Reentrant(\"bind\"))"
        );
        assert_eq!(seen[2], "connected 5 true role=2");
        assert!(!map.is_serial_bound("OTHER"));
    }
}
