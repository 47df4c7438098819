//! Persisted, name-keyed role handles
//!
//! A [`RoleReference`] stores a role as two names, the role-type name and the
//! role value name, so persisted state survives renumbering of a role-type.
//! Setting either name only marks the reference dirty; [`RoleReference::refresh`]
//! resolves the names against a [`RoleMapRegistry`] and fires change events.
//! Every reader refreshes first.
//!
//! Unknown or empty names never fail: an unknown type name resolves to the
//! registry's default role-type and an unknown value name to the type's
//! invalid role.
//!
//! Device-index listeners subscribe the reference to its map's
//! mapping-changed events when the first one is added, and unsubscribe when
//! the last one is removed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error};

use crate::device::DeviceIndex;
use crate::error::RoleError;
use crate::map::{ListenerId, MappingChanged};
use crate::registry::RoleMapRegistry;
use crate::role_type::RoleTypeId;
use crate::roles::Role;

/// A resolved `(role-type, role value)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedRole {
    pub role_type: RoleTypeId,
    pub role: i32,
}

/// Handle returned when registering a reference listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceListenerId(u64);

/// Persisted form of a [`RoleReference`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleReferenceData {
    #[serde(default)]
    pub role_type: String,
    #[serde(default)]
    pub role_value: String,
}

type ChangedListener = Rc<RefCell<dyn FnMut(&RoleReference)>>;
type RoleListener = Rc<RefCell<dyn FnMut(&RoleReference, RoleTypeId, i32)>>;
type RolePreviousListener = Rc<RefCell<dyn FnMut(&RoleReference, ResolvedRole, ResolvedRole)>>;
type DeviceListener = Rc<RefCell<dyn FnMut(&RoleReference, DeviceIndex, DeviceIndex)>>;

#[derive(Default)]
struct Listeners {
    changed: Vec<(ReferenceListenerId, ChangedListener)>,
    role: Vec<(ReferenceListenerId, RoleListener)>,
    role_with_previous: Vec<(ReferenceListenerId, RolePreviousListener)>,
    device: Vec<(ReferenceListenerId, DeviceListener)>,
}

struct Inner {
    type_name: RefCell<String>,
    value_name: RefCell<String>,
    type_dirty: Cell<bool>,
    value_dirty: Cell<bool>,
    resolved: Cell<Option<ResolvedRole>>,
    /// Only kept current while subscribed
    device: Cell<DeviceIndex>,
    subscription: Cell<Option<(RoleTypeId, ListenerId)>>,
    notifying: Cell<bool>,
    listeners: RefCell<Listeners>,
    next_listener_id: Cell<u64>,
}

/// Clears the notifying flag when dispatch ends
struct NotifyGuard<'a>(&'a Cell<bool>);

impl<'a> NotifyGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct RoleReference {
    inner: Rc<Inner>,
}

impl RoleReference {
    pub fn new(type_name: impl Into<String>, value_name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(Inner {
                type_name: RefCell::new(type_name.into()),
                value_name: RefCell::new(value_name.into()),
                type_dirty: Cell::new(true),
                value_dirty: Cell::new(true),
                resolved: Cell::new(None),
                device: Cell::new(DeviceIndex::INVALID),
                subscription: Cell::new(None),
                notifying: Cell::new(false),
                listeners: RefCell::new(Listeners::default()),
                next_listener_id: Cell::new(0),
            }),
        }
    }

    pub fn from_role<R: Role>(role: R) -> Self {
        Self::new(R::TYPE.name(), role.name())
    }

    pub fn type_name(&self) -> String {
        self.inner.type_name.borrow().clone()
    }

    pub fn value_name(&self) -> String {
        self.inner.value_name.borrow().clone()
    }

    pub fn to_data(&self) -> RoleReferenceData {
        RoleReferenceData {
            role_type: self.type_name(),
            role_value: self.value_name(),
        }
    }

    /// Whether a name changed since the last [`refresh`](Self::refresh)
    pub fn is_dirty(&self) -> bool {
        self.inner.type_dirty.get() || self.inner.value_dirty.get() || self.inner.resolved.get().is_none()
    }

    /// Last resolution, without refreshing
    pub fn resolved(&self) -> Option<ResolvedRole> {
        self.inner.resolved.get()
    }

    // ---- setters ----

    pub fn set_type_name(&self, name: impl Into<String>) -> Result<(), RoleError> {
        self.ensure_idle("set_type_name")?;
        let name = name.into();
        if *self.inner.type_name.borrow() != name {
            *self.inner.type_name.borrow_mut() = name;
            self.inner.type_dirty.set(true);
        }
        Ok(())
    }

    pub fn set_value_name(&self, name: impl Into<String>) -> Result<(), RoleError> {
        self.ensure_idle("set_value_name")?;
        let name = name.into();
        if *self.inner.value_name.borrow() != name {
            *self.inner.value_name.borrow_mut() = name;
            self.inner.value_dirty.set(true);
        }
        Ok(())
    }

    pub fn set(&self, type_name: impl Into<String>, value_name: impl Into<String>) -> Result<(), RoleError> {
        self.ensure_idle("set")?;
        self.set_type_name(type_name)?;
        self.set_value_name(value_name)
    }

    pub fn set_role<R: Role>(&self, role: R) -> Result<(), RoleError> {
        self.set(R::TYPE.name(), role.name())
    }

    fn ensure_idle(&self, operation: &'static str) -> Result<(), RoleError> {
        if self.inner.notifying.get() {
            error!(
                role_type = %self.inner.type_name.borrow(),
                role_value = %self.inner.value_name.borrow(),
                operation,
                "Role reference changed from inside its own callback"
            );
            return Err(RoleError::Reentrant(operation));
        }
        Ok(())
    }

    // ---- resolution ----

    /// Re-resolve dirty names; `Ok(true)` if the resolved role changed
    pub fn refresh(&self, registry: &mut RoleMapRegistry) -> Result<bool, RoleError> {
        self.ensure_idle("refresh")?;
        let inner = &self.inner;
        let first = inner.resolved.get().is_none();
        if !first && !inner.type_dirty.get() && !inner.value_dirty.get() {
            return Ok(false);
        }

        let previous = inner.resolved.get().unwrap_or_else(|| {
            let role_type = registry.types().default_type();
            ResolvedRole {
                role_type,
                role: registry.descriptor(role_type).invalid_role(),
            }
        });

        let mut role_type = previous.role_type;
        if first || inner.type_dirty.get() {
            role_type = registry.types().find_or_default(&inner.type_name.borrow());
            inner.type_dirty.set(false);
        }

        let mut role = previous.role;
        if first || inner.value_dirty.get() || role_type != previous.role_type {
            let descriptor = registry.descriptor(role_type);
            let value_name = inner.value_name.borrow();
            role = descriptor
                .role_value(&value_name)
                .filter(|&role| descriptor.is_valid_role(role))
                .unwrap_or_else(|| descriptor.invalid_role());
            inner.value_dirty.set(false);
        }

        let current = ResolvedRole { role_type, role };
        inner.resolved.set(Some(current));
        if current == previous {
            return Ok(false);
        }

        let previous_device = inner.device.get();
        let mut current_device = previous_device;
        if !inner.listeners.borrow().device.is_empty() {
            if role_type != previous.role_type {
                self.unsubscribe(registry);
                self.subscribe(registry);
            }
            current_device = registry.map_mut(role_type).mapped_device(role);
            inner.device.set(current_device);
        }

        debug!(
            role_type = %role_type,
            role,
            previous_role = previous.role,
            device = %current_device,
            "Role reference resolved"
        );
        self.notify(previous, current, previous_device, current_device);
        Ok(true)
    }

    fn refresh_or_log(&self, registry: &mut RoleMapRegistry) {
        if let Err(error) = self.refresh(registry) {
            debug!(%error, "Reading role reference without refresh");
        }
    }

    fn current(&self, registry: &RoleMapRegistry) -> ResolvedRole {
        self.inner.resolved.get().unwrap_or_else(|| {
            let role_type = registry.types().default_type();
            ResolvedRole {
                role_type,
                role: registry.descriptor(role_type).invalid_role(),
            }
        })
    }

    pub fn role_type(&self, registry: &mut RoleMapRegistry) -> RoleTypeId {
        self.refresh_or_log(registry);
        self.current(registry).role_type
    }

    pub fn role_value(&self, registry: &mut RoleMapRegistry) -> i32 {
        self.refresh_or_log(registry);
        self.current(registry).role
    }

    /// Device currently mapped to the referenced role
    pub fn device_index(&self, registry: &mut RoleMapRegistry) -> DeviceIndex {
        self.refresh_or_log(registry);
        if self.inner.subscription.get().is_some() {
            return self.inner.device.get();
        }
        let current = self.current(registry);
        registry.map_mut(current.role_type).mapped_device(current.role)
    }

    // ---- listeners ----

    fn next_id(&self) -> ReferenceListenerId {
        let id = self.inner.next_listener_id.get();
        self.inner.next_listener_id.set(id + 1);
        ReferenceListenerId(id)
    }

    pub fn on_changed(&self, listener: impl FnMut(&RoleReference) + 'static) -> ReferenceListenerId {
        let id = self.next_id();
        let listener: ChangedListener = Rc::new(RefCell::new(listener));
        self.inner.listeners.borrow_mut().changed.push((id, listener));
        id
    }

    pub fn on_role_changed(
        &self,
        listener: impl FnMut(&RoleReference, RoleTypeId, i32) + 'static,
    ) -> ReferenceListenerId {
        let id = self.next_id();
        let listener: RoleListener = Rc::new(RefCell::new(listener));
        self.inner.listeners.borrow_mut().role.push((id, listener));
        id
    }

    pub fn on_role_changed_with_previous(
        &self,
        listener: impl FnMut(&RoleReference, ResolvedRole, ResolvedRole) + 'static,
    ) -> ReferenceListenerId {
        let id = self.next_id();
        let listener: RolePreviousListener = Rc::new(RefCell::new(listener));
        self.inner.listeners.borrow_mut().role_with_previous.push((id, listener));
        id
    }

    /// Listen for changes of the mapped device index
    ///
    /// The first listener resolves the reference and subscribes it to the
    /// mapping-changed events of its role-type map.
    pub fn on_device_index_changed(
        &self,
        registry: &mut RoleMapRegistry,
        listener: impl FnMut(&RoleReference, DeviceIndex, DeviceIndex) + 'static,
    ) -> Result<ReferenceListenerId, RoleError> {
        if !self.inner.notifying.get() {
            self.refresh(registry)?;
        }
        let id = self.next_id();
        let listener: DeviceListener = Rc::new(RefCell::new(listener));
        let first = {
            let mut listeners = self.inner.listeners.borrow_mut();
            listeners.device.push((id, listener));
            listeners.device.len() == 1
        };
        if first {
            self.subscribe(registry);
        }
        Ok(id)
    }

    pub fn remove_changed_listener(&self, id: ReferenceListenerId) -> bool {
        remove_listener(&mut self.inner.listeners.borrow_mut().changed, id)
    }

    pub fn remove_role_listener(&self, id: ReferenceListenerId) -> bool {
        remove_listener(&mut self.inner.listeners.borrow_mut().role, id)
    }

    pub fn remove_role_with_previous_listener(&self, id: ReferenceListenerId) -> bool {
        remove_listener(&mut self.inner.listeners.borrow_mut().role_with_previous, id)
    }

    /// Remove a device-index listener; the last one unsubscribes from the map
    pub fn remove_device_index_listener(&self, registry: &mut RoleMapRegistry, id: ReferenceListenerId) -> bool {
        let (removed, empty) = {
            let mut listeners = self.inner.listeners.borrow_mut();
            let removed = remove_listener(&mut listeners.device, id);
            (removed, listeners.device.is_empty())
        };
        if removed && empty {
            self.unsubscribe(registry);
        }
        removed
    }

    /// Drop every device-index listener and the map subscription
    pub fn detach(&self, registry: &mut RoleMapRegistry) {
        self.inner.listeners.borrow_mut().device.clear();
        self.unsubscribe(registry);
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.subscription.get().is_some()
    }

    fn subscribe(&self, registry: &mut RoleMapRegistry) {
        if self.inner.subscription.get().is_some() {
            return;
        }
        let current = self.current(registry);
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let map = registry.map_mut(current.role_type);
        // A dropped reference unregisters itself on the next mapping event
        let listener_id = map.on_mapping_changed_while(move |event| match weak.upgrade() {
            Some(inner) => {
                RoleReference { inner }.on_mapping_event(event);
                true
            }
            None => false,
        });
        self.inner.device.set(map.mapped_device(current.role));
        self.inner.subscription.set(Some((current.role_type, listener_id)));
        debug!(role_type = %current.role_type, role = current.role, "Role reference subscribed");
    }

    fn unsubscribe(&self, registry: &mut RoleMapRegistry) {
        if let Some((role_type, listener_id)) = self.inner.subscription.take() {
            registry.map_mut(role_type).remove_mapping_listener(listener_id);
            self.inner.device.set(DeviceIndex::INVALID);
            debug!(role_type = %role_type, "Role reference unsubscribed");
        }
    }

    fn on_mapping_event(&self, event: &MappingChanged) {
        let Some(current) = self.inner.resolved.get() else {
            return;
        };
        if event.role != current.role {
            return;
        }
        let previous_device = self.inner.device.get();
        if previous_device == event.current_device {
            return;
        }
        self.inner.device.set(event.current_device);

        let _guard = NotifyGuard::enter(&self.inner.notifying);
        self.notify_device(previous_device, event.current_device);
    }

    // ---- dispatch ----

    fn notify(&self, previous: ResolvedRole, current: ResolvedRole, previous_device: DeviceIndex, current_device: DeviceIndex) {
        let _guard = NotifyGuard::enter(&self.inner.notifying);

        let changed = snapshot(&self.inner.listeners.borrow().changed);
        for listener in changed {
            match listener.try_borrow_mut() {
                Ok(mut f) => (&mut *f)(self),
                Err(_) => error!("Changed listener re-entered"),
            }
        }

        let role = snapshot(&self.inner.listeners.borrow().role);
        for listener in role {
            match listener.try_borrow_mut() {
                Ok(mut f) => (&mut *f)(self, current.role_type, current.role),
                Err(_) => error!("Role listener re-entered"),
            }
        }

        let role_with_previous = snapshot(&self.inner.listeners.borrow().role_with_previous);
        for listener in role_with_previous {
            match listener.try_borrow_mut() {
                Ok(mut f) => (&mut *f)(self, previous, current),
                Err(_) => error!("Role listener re-entered"),
            }
        }

        self.notify_device(previous_device, current_device);
    }

    fn notify_device(&self, previous: DeviceIndex, current: DeviceIndex) {
        if previous == current || !(previous.is_valid() || current.is_valid()) {
            return;
        }
        let device = snapshot(&self.inner.listeners.borrow().device);
        for listener in device {
            match listener.try_borrow_mut() {
                Ok(mut f) => (&mut *f)(self, previous, current),
                Err(_) => error!("Device index listener re-entered"),
            }
        }
    }
}

fn snapshot<L: ?Sized>(listeners: &[(ReferenceListenerId, Rc<RefCell<L>>)]) -> Vec<Rc<RefCell<L>>> {
    listeners.iter().map(|(_, listener)| listener.clone()).collect()
}

fn remove_listener<L: ?Sized>(listeners: &mut Vec<(ReferenceListenerId, Rc<RefCell<L>>)>, id: ReferenceListenerId) -> bool {
    let before = listeners.len();
    listeners.retain(|(listener_id, _)| *listener_id != id);
    listeners.len() != before
}

impl fmt::Debug for RoleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleReference")
            .field("type_name", &*self.inner.type_name.borrow())
            .field("value_name", &*self.inner.value_name.borrow())
            .field("resolved", &self.inner.resolved.get())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

impl From<RoleReferenceData> for RoleReference {
    fn from(data: RoleReferenceData) -> Self {
        Self::new(data.role_type, data.role_value)
    }
}

impl Serialize for RoleReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_data().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RoleReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RoleReferenceData::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceClass, DeviceState, DeviceTable, Handedness};
    use crate::roles::{HandRole, TrackerRole};

    fn setup() -> (Rc<DeviceTable>, RoleMapRegistry) {
        let devices = Rc::new(DeviceTable::new());
        let registry = RoleMapRegistry::new(devices.clone());
        (devices, registry)
    }

    fn connect(devices: &DeviceTable, registry: &mut RoleMapRegistry, index: u32, state: DeviceState) {
        let device = DeviceIndex(index);
        let (class, serial) = (state.class, state.serial.clone());
        devices.connect(device, state);
        registry.notify_connection_changed(device, class, &serial, true).unwrap();
    }

    fn disconnect(devices: &DeviceTable, registry: &mut RoleMapRegistry, index: u32) {
        let device = DeviceIndex(index);
        let state = devices.get(device).unwrap();
        devices.disconnect(device);
        registry
            .notify_connection_changed(device, state.class, &state.serial, false)
            .unwrap();
    }

    fn controller(serial: &str, side: Handedness) -> DeviceState {
        DeviceState::connected(DeviceClass::Controller, serial).with_handedness(side)
    }

    #[test]
    fn test_unknown_names_fall_back() {
        let (_devices, mut registry) = setup();
        let reference = RoleReference::new("Missing.Type", "X");
        assert!(reference.is_dirty());
        assert_eq!(reference.refresh(&mut registry), Ok(false));
        assert_eq!(
            reference.resolved(),
            Some(ResolvedRole { role_type: RoleTypeId::Hand, role: -1 })
        );
        assert!(!reference.is_dirty());

        let reference = RoleReference::new("", "");
        assert_eq!(reference.role_type(&mut registry), RoleTypeId::Hand);
        assert_eq!(reference.role_value(&mut registry), -1);
    }

    #[test]
    fn test_value_name_resolved_in_new_type() {
        let (_devices, mut registry) = setup();
        let reference = RoleReference::from_role(HandRole::LeftHand);
        assert_eq!(reference.role_value(&mut registry), 1);

        reference.set_type_name("TrackerRole").unwrap();
        assert_eq!(reference.role_type(&mut registry), RoleTypeId::Tracker);
        assert_eq!(reference.role_value(&mut registry), -1);

        reference.set_role(TrackerRole::Tracker3).unwrap();
        assert_eq!(reference.role_value(&mut registry), 2);
    }

    #[test]
    fn test_set_inside_own_callback_is_rejected() {
        let (_devices, mut registry) = setup();
        let reference = RoleReference::new("HandRole", "RightHand");
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        reference.on_role_changed(move |r, _, _| {
            sink.borrow_mut().push(r.set_value_name("LeftHand"));
        });

        assert_eq!(reference.refresh(&mut registry), Ok(true));
        assert_eq!(*results.borrow(), vec![Err(RoleError::Reentrant("set_value_name"))]);
        assert_eq!(reference.value_name(), "RightHand");
        assert_eq!(reference.role_value(&mut registry), 0);

        reference.set_value_name("LeftHand").unwrap();
        assert_eq!(reference.refresh(&mut registry), Ok(true));
        assert_eq!(results.borrow().len(), 2);
        assert!(results.borrow()[1].is_err());
    }

    #[test]
    fn test_event_order() {
        let (devices, mut registry) = setup();
        connect(&devices, &mut registry, 1, controller("R", Handedness::Right));
        connect(&devices, &mut registry, 2, controller("L", Handedness::Left));
        registry.warm_up();

        let reference = RoleReference::new("HandRole", "LeftHand");
        let log = Rc::new(RefCell::new(Vec::<String>::new()));

        let sink = log.clone();
        reference
            .on_device_index_changed(&mut registry, move |_, previous, current| {
                sink.borrow_mut().push(format!("device {previous}->{current}"));
            })
            .unwrap();
        assert_eq!(reference.device_index(&mut registry), DeviceIndex(2));

        let sink = log.clone();
        reference.on_changed(move |_| sink.borrow_mut().push("changed".to_string()));
        let sink = log.clone();
        reference.on_role_changed(move |_, _, role| sink.borrow_mut().push(format!("role {role}")));
        let sink = log.clone();
        reference.on_role_changed_with_previous(move |_, previous, current| {
            sink.borrow_mut()
                .push(format!("role {}->{}", previous.role, current.role));
        });

        reference.set_value_name("RightHand").unwrap();
        reference.refresh(&mut registry).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["changed", "role 0", "role 1->0", "device 2->1"]
        );
    }

    #[test]
    fn test_device_listener_subscribes_lazily() {
        let (_devices, mut registry) = setup();
        let reference = RoleReference::from_role(HandRole::RightHand);
        reference.on_changed(|_| {});
        assert_eq!(registry.map_mut(RoleTypeId::Hand).listener_count(), 0);

        let first = reference.on_device_index_changed(&mut registry, |_, _, _| {}).unwrap();
        let second = reference.on_device_index_changed(&mut registry, |_, _, _| {}).unwrap();
        assert!(reference.is_subscribed());
        assert_eq!(registry.map_mut(RoleTypeId::Hand).listener_count(), 1);

        assert!(reference.remove_device_index_listener(&mut registry, first));
        assert_eq!(registry.map_mut(RoleTypeId::Hand).listener_count(), 1);
        assert!(reference.remove_device_index_listener(&mut registry, second));
        assert!(!reference.remove_device_index_listener(&mut registry, second));
        assert_eq!(registry.map_mut(RoleTypeId::Hand).listener_count(), 0);
        assert!(!reference.is_subscribed());
    }

    #[test]
    fn test_device_index_follows_connections() {
        let (devices, mut registry) = setup();
        let reference = RoleReference::from_role(TrackerRole::Tracker1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        reference
            .on_device_index_changed(&mut registry, move |_, previous, current| {
                sink.borrow_mut().push((previous, current));
            })
            .unwrap();

        connect(&devices, &mut registry, 5, DeviceState::connected(DeviceClass::GenericTracker, "T5"));
        assert_eq!(reference.device_index(&mut registry), DeviceIndex(5));
        disconnect(&devices, &mut registry, 5);

        assert_eq!(
            *seen.borrow(),
            vec![
                (DeviceIndex::INVALID, DeviceIndex(5)),
                (DeviceIndex(5), DeviceIndex::INVALID)
            ]
        );
    }

    #[test]
    fn test_type_change_moves_subscription() {
        let (_devices, mut registry) = setup();
        let reference = RoleReference::from_role(HandRole::RightHand);
        reference.on_device_index_changed(&mut registry, |_, _, _| {}).unwrap();
        assert_eq!(registry.map_mut(RoleTypeId::Hand).listener_count(), 1);

        reference.set_role(TrackerRole::Tracker1).unwrap();
        reference.refresh(&mut registry).unwrap();
        assert_eq!(registry.map_mut(RoleTypeId::Hand).listener_count(), 0);
        assert_eq!(registry.map_mut(RoleTypeId::Tracker).listener_count(), 1);

        reference.detach(&mut registry);
        assert_eq!(registry.map_mut(RoleTypeId::Tracker).listener_count(), 0);
    }

    #[test]
    fn test_dropped_references_leave_no_listeners() {
        let (devices, mut registry) = setup();
        for _ in 0..10 {
            let reference = RoleReference::from_role(TrackerRole::Tracker1);
            reference.on_device_index_changed(&mut registry, |_, _, _| {}).unwrap();
        }
        let kept = RoleReference::from_role(TrackerRole::Tracker1);
        kept.on_device_index_changed(&mut registry, |_, _, _| {}).unwrap();
        assert_eq!(registry.map_mut(RoleTypeId::Tracker).listener_count(), 11);

        connect(&devices, &mut registry, 5, DeviceState::connected(DeviceClass::GenericTracker, "T5"));
        assert_eq!(registry.map_mut(RoleTypeId::Tracker).listener_count(), 1);
        assert_eq!(kept.device_index(&mut registry), DeviceIndex(5));
    }

    #[test]
    fn test_persisted_form() {
        let (_devices, mut registry) = setup();
        let reference: RoleReference =
            serde_json::from_str(r#"{ "role_type": "TrackerRole", "role_value": "Tracker2" }"#).unwrap();
        assert_eq!(reference.role_type(&mut registry), RoleTypeId::Tracker);
        assert_eq!(reference.role_value(&mut registry), 1);

        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["role_value"], "Tracker2");
    }
}
