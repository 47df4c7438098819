//! Role-type to map lookup owned by the host
//!
//! [`RoleMapRegistry`] is the composition root of the engine: it owns one
//! [`RoleTypeMap`] per role-type, creates them on first use with their
//! default assignment policy, and fans backend notifications out to every
//! map created so far.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::binding::{BindingEntry, BindingSnapshot, ImportMode, ImportReport, RoleTypeBindings};
use crate::device::{DeviceClass, DeviceIndex, DeviceStateQuery};
use crate::error::RoleError;
use crate::handler::{
    DevicePassthroughHandler, HandRoleHandler, MapHandler, OrderedScanHandler, TrackedHandHandler,
};
use crate::map::RoleTypeMap;
use crate::role_type::{RoleTypeDescriptor, RoleTypeId, RoleTypeRegistry};
use crate::roles::Role;

/// Assignment policy a freshly created map starts with
pub fn default_handler(id: RoleTypeId) -> Box<dyn MapHandler> {
    match id {
        RoleTypeId::Device => Box::new(DevicePassthroughHandler::new()),
        RoleTypeId::Hand => Box::new(HandRoleHandler::new()),
        RoleTypeId::Tracker => Box::new(OrderedScanHandler::new(DeviceClass::GenericTracker)),
        RoleTypeId::TrackedHand => Box::new(TrackedHandHandler::new()),
    }
}

pub struct RoleMapRegistry {
    types: RoleTypeRegistry,
    devices: Rc<dyn DeviceStateQuery>,
    maps: BTreeMap<RoleTypeId, RoleTypeMap>,
}

impl RoleMapRegistry {
    /// Registry over the shipped role-types
    pub fn new(devices: Rc<dyn DeviceStateQuery>) -> Self {
        Self::with_types(RoleTypeRegistry::new(), devices)
    }

    pub fn with_types(types: RoleTypeRegistry, devices: Rc<dyn DeviceStateQuery>) -> Self {
        Self {
            types,
            devices,
            maps: BTreeMap::new(),
        }
    }

    pub fn types(&self) -> &RoleTypeRegistry {
        &self.types
    }

    pub fn devices(&self) -> &Rc<dyn DeviceStateQuery> {
        &self.devices
    }

    pub fn descriptor(&self, id: RoleTypeId) -> Arc<dyn RoleTypeDescriptor> {
        self.types.descriptor(id)
    }

    /// The map of `id`, created with its default policy on first use
    pub fn map_mut(&mut self, id: RoleTypeId) -> &mut RoleTypeMap {
        let types = &self.types;
        let devices = &self.devices;
        self.maps
            .entry(id)
            .or_insert_with(|| Self::create_map(types, devices, id))
    }

    /// The map of `id` if it has been created
    pub fn get_map(&self, id: RoleTypeId) -> Option<&RoleTypeMap> {
        self.maps.get(&id)
    }

    /// Create the map of every registered role-type
    pub fn warm_up(&mut self) {
        let ids: Vec<RoleTypeId> = self.types.ids().collect();
        for id in ids {
            self.map_mut(id);
        }
    }

    /// Role-types whose map exists, in ascending order
    pub fn map_ids(&self) -> impl Iterator<Item = RoleTypeId> + '_ {
        self.maps.keys().copied()
    }

    fn create_map(types: &RoleTypeRegistry, devices: &Rc<dyn DeviceStateQuery>, id: RoleTypeId) -> RoleTypeMap {
        let mut map = RoleTypeMap::new(types.descriptor(id), devices.clone());
        if let Err(error) = map.set_handler(default_handler(id)) {
            error!(role_type = %id, %error, "Failed to install default handler");
        }
        debug!(role_type = %id, "Created role map");
        map
    }

    // ---- backend notifications ----

    /// Forward a connection change to every existing map
    ///
    /// All maps are notified even if one fails; the first error is returned.
    pub fn notify_connection_changed(
        &mut self,
        device: DeviceIndex,
        class: DeviceClass,
        serial: &str,
        connected: bool,
    ) -> Result<(), RoleError> {
        info!(device = %device, ?class, serial, connected, "Device connection changed");
        let mut result = Ok(());
        for (id, map) in self.maps.iter_mut() {
            if let Err(error) = map.on_connected_device_changed(device, class, serial, connected) {
                error!(role_type = %id, device = %device, %error, "Connection change failed");
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }
        result
    }

    pub fn notify_tracked_role_changed(&mut self) -> Result<(), RoleError> {
        debug!("Tracked device roles changed");
        let mut result = Ok(());
        for (id, map) in self.maps.iter_mut() {
            if let Err(error) = map.on_tracked_device_role_changed() {
                error!(role_type = %id, %error, "Tracked role change failed");
                if result.is_ok() {
                    result = Err(error);
                }
            }
        }
        result
    }

    // ---- queries ----

    pub fn mapped_device(&mut self, id: RoleTypeId, role: i32) -> DeviceIndex {
        self.map_mut(id).mapped_device(role)
    }

    pub fn mapped_role(&mut self, id: RoleTypeId, device: DeviceIndex) -> i32 {
        self.map_mut(id).mapped_role(device)
    }

    pub fn is_bound(&mut self, id: RoleTypeId, role: i32) -> bool {
        self.map_mut(id).is_role_bound(role)
    }

    pub fn bound_device(&mut self, id: RoleTypeId, role: i32) -> Option<DeviceIndex> {
        self.map_mut(id).bound_device(role)
    }

    /// Role bound to `serial`; `None` when the serial is not bound
    pub fn bound_role(&mut self, id: RoleTypeId, serial: &str) -> Option<i32> {
        self.map_mut(id).bound_role(serial)
    }

    // ---- mutation ----

    pub fn map(&mut self, id: RoleTypeId, role: i32, device: DeviceIndex) -> Result<(), RoleError> {
        self.map_mut(id).map(role, device)
    }

    pub fn unmap(&mut self, id: RoleTypeId, role: i32) -> bool {
        self.map_mut(id).unmap(role)
    }

    pub fn bind(&mut self, id: RoleTypeId, serial: &str, role: i32) -> Result<(), RoleError> {
        self.map_mut(id).bind(serial, role)
    }

    pub fn unbind(&mut self, id: RoleTypeId, serial: &str) -> Result<bool, RoleError> {
        self.map_mut(id).unbind(serial)
    }

    pub fn bind_all(&mut self, id: RoleTypeId) -> usize {
        self.map_mut(id).bind_all()
    }

    pub fn unbind_all(&mut self, id: RoleTypeId) -> usize {
        self.map_mut(id).unbind_all()
    }

    /// Typed view of the map of `R`'s role-type
    pub fn typed<R: Role>(&mut self) -> TypedRoleMap<'_, R> {
        TypedRoleMap::new(self.map_mut(R::TYPE))
    }

    // ---- bulk persistence ----

    /// Bindings of every existing map, role values written by name
    pub fn export_bindings(&self) -> BindingSnapshot {
        let mut snapshot = BindingSnapshot::new();
        for (id, map) in &self.maps {
            let descriptor = map.descriptor();
            let bindings: Vec<BindingEntry> = map
                .bindings()
                .filter_map(|(serial, role)| match descriptor.role_name(role) {
                    Some(name) => Some(BindingEntry::new(serial, name)),
                    None => {
                        warn!(role_type = %id, serial, role, "Bound role has no name, not exported");
                        None
                    }
                })
                .collect();
            if bindings.is_empty() {
                continue;
            }
            snapshot.role_types.push(RoleTypeBindings {
                role_type: id.name().to_string(),
                bindings,
            });
        }
        info!(entries = snapshot.len(), "Exported bindings");
        snapshot
    }

    /// Apply a binding snapshot
    ///
    /// Entries naming an unknown role-type or role are skipped. So are
    /// entries whose role or serial was already bound before the import
    /// started, unless the existing binding is exactly the listed one. With
    /// [`ImportMode::Replace`] each listed role-type is emptied first, so
    /// only unknown names can be skipped.
    pub fn import_bindings(&mut self, snapshot: &BindingSnapshot, mode: ImportMode) -> ImportReport {
        let mut report = ImportReport::default();

        for role_type in &snapshot.role_types {
            let Some(id) = self.types.find(&role_type.role_type) else {
                warn!(role_type = %role_type.role_type, entries = role_type.bindings.len(), "Unknown role type in bindings");
                report.skipped_unknown += role_type.bindings.len();
                continue;
            };
            let map = self.map_mut(id);
            if map.bindings_blocked() {
                warn!(role_type = %id, "Bindings blocked, skipping role type");
                report.skipped_conflict += role_type.bindings.len();
                continue;
            }
            if mode == ImportMode::Replace {
                map.unbind_all();
            }

            let mut imported_roles = BTreeSet::new();
            for entry in &role_type.bindings {
                let descriptor = map.descriptor();
                let Some(role) = descriptor
                    .role_value(&entry.role)
                    .filter(|&role| descriptor.is_valid_role(role))
                else {
                    warn!(role_type = %id, serial = %entry.serial, role = %entry.role, "Unknown role name, skipping");
                    report.skipped_unknown += 1;
                    continue;
                };

                match map.bound_role(&entry.serial) {
                    Some(bound) if bound == role => {
                        report.unchanged += 1;
                        continue;
                    }
                    Some(bound) => {
                        warn!(role_type = %id, serial = %entry.serial, bound, "Serial already bound elsewhere, skipping");
                        report.skipped_conflict += 1;
                        continue;
                    }
                    None => {}
                }
                if map.is_role_bound(role) && !imported_roles.contains(&role) {
                    warn!(role_type = %id, serial = %entry.serial, role, "Role already bound, skipping");
                    report.skipped_conflict += 1;
                    continue;
                }

                match map.bind(&entry.serial, role) {
                    Ok(()) => {
                        imported_roles.insert(role);
                        report.applied += 1;
                    }
                    Err(error) => {
                        warn!(role_type = %id, serial = %entry.serial, %error, "Binding rejected");
                        report.skipped_conflict += 1;
                    }
                }
            }
        }

        info!(
            applied = report.applied,
            unchanged = report.unchanged,
            skipped = report.skipped(),
            "Imported bindings"
        );
        report
    }
}

/// Role-typed view over a [`RoleTypeMap`]
pub struct TypedRoleMap<'a, R: Role> {
    map: &'a mut RoleTypeMap,
    _role: PhantomData<R>,
}

impl<'a, R: Role> TypedRoleMap<'a, R> {
    pub fn new(map: &'a mut RoleTypeMap) -> Self {
        Self {
            map,
            _role: PhantomData,
        }
    }

    /// The untyped map underneath
    pub fn untyped(&mut self) -> &mut RoleTypeMap {
        self.map
    }

    pub fn is_role_mapped(&self, role: R) -> bool {
        self.map.is_role_mapped(role.to_value())
    }

    pub fn is_device_mapped(&self, device: DeviceIndex) -> bool {
        self.map.is_device_mapped(device)
    }

    pub fn mapped_device(&self, role: R) -> DeviceIndex {
        self.map.mapped_device(role.to_value())
    }

    pub fn mapped_role(&self, device: DeviceIndex) -> Option<R> {
        R::from_value(self.map.mapped_role(device))
    }

    pub fn map(&mut self, role: R, device: DeviceIndex) -> Result<(), RoleError> {
        self.map.map(role.to_value(), device)
    }

    pub fn unmap(&mut self, role: R) -> bool {
        self.map.unmap(role.to_value())
    }

    pub fn unmap_device(&mut self, device: DeviceIndex) -> bool {
        self.map.unmap_device(device)
    }

    pub fn is_role_bound(&self, role: R) -> bool {
        self.map.is_role_bound(role.to_value())
    }

    pub fn is_device_bound(&self, device: DeviceIndex) -> bool {
        self.map.is_device_bound(device)
    }

    pub fn bound_role(&self, serial: &str) -> Option<R> {
        self.map.bound_role(serial).and_then(R::from_value)
    }

    pub fn bound_device(&self, role: R) -> Option<DeviceIndex> {
        self.map.bound_device(role.to_value())
    }

    pub fn bind(&mut self, serial: &str, role: R) -> Result<(), RoleError> {
        self.map.bind(serial, role.to_value())
    }

    pub fn unbind(&mut self, serial: &str) -> Result<bool, RoleError> {
        self.map.unbind(serial)
    }

    pub fn unbind_device(&mut self, device: DeviceIndex) -> Result<bool, RoleError> {
        self.map.unbind_device(device)
    }

    pub fn bind_all(&mut self) -> usize {
        self.map.bind_all()
    }

    pub fn unbind_all(&mut self) -> usize {
        self.map.unbind_all()
    }
}
