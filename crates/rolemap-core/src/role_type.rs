//! Role-type descriptors and their registry
//!
//! A role-type is a closed domain of integer role values with one invalid
//! sentinel and a name table. Names are what gets persisted, so lookups by
//! name are the primary way external state reaches a role value.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::roles::{DeviceRole, HandRole, Role, TrackedHandRole, TrackerRole};

/// Describes one role-type: valid values, invalid sentinel and names
pub trait RoleTypeDescriptor: fmt::Debug {
    /// Stable name used in persisted state
    fn name(&self) -> &str;

    fn invalid_role(&self) -> i32;

    /// Valid role values in ascending order, never containing the invalid value
    fn valid_roles(&self) -> &[i32];

    fn role_name(&self, role: i32) -> Option<&str>;

    fn role_value(&self, name: &str) -> Option<i32>;

    fn is_valid_role(&self, role: i32) -> bool {
        role != self.invalid_role() && self.valid_roles().binary_search(&role).is_ok()
    }

    fn min_valid_role(&self) -> Option<i32> {
        self.valid_roles().first().copied()
    }

    fn max_valid_role(&self) -> Option<i32> {
        self.valid_roles().last().copied()
    }

    /// Number of slots in a table indexed by role slot
    fn role_span(&self) -> usize {
        self.valid_roles().len()
    }

    /// Position of a valid role in [`valid_roles`](Self::valid_roles)
    ///
    /// Slots stay dense however far apart the role values are.
    fn role_slot(&self, role: i32) -> Option<usize> {
        if role == self.invalid_role() {
            return None;
        }
        self.valid_roles().binary_search(&role).ok()
    }
}

/// Table-driven role-type description
#[derive(Debug, Clone)]
pub struct RoleTypeInfo {
    name: String,
    invalid_role: i32,
    valid_roles: Vec<i32>,
    names: BTreeMap<i32, String>,
    values: HashMap<String, i32>,
}

impl RoleTypeInfo {
    /// Build a description from `(name, value)` entries
    ///
    /// The first name given for a value is its canonical name; later names
    /// for the same value act as aliases. Entries carrying the invalid value
    /// only extend the name table.
    pub fn new<I, S>(name: impl Into<String>, invalid_role: i32, invalid_name: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let mut names = BTreeMap::new();
        let mut values = HashMap::new();
        names.insert(invalid_role, invalid_name.to_string());
        values.insert(invalid_name.to_string(), invalid_role);

        for (entry_name, value) in entries {
            let entry_name = entry_name.into();
            names.entry(value).or_insert_with(|| entry_name.clone());
            values.entry(entry_name).or_insert(value);
        }

        let valid_roles = names.keys().copied().filter(|&v| v != invalid_role).collect();

        Self {
            name: name.into(),
            invalid_role,
            valid_roles,
            names,
            values,
        }
    }

    /// Description of a typed role enum
    pub fn of<R: Role>() -> Self {
        Self::new(
            R::TYPE.name(),
            R::INVALID_VALUE,
            "Invalid",
            R::all().into_iter().map(|role| (role.name(), role.to_value())),
        )
    }
}

impl RoleTypeDescriptor for RoleTypeInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn invalid_role(&self) -> i32 {
        self.invalid_role
    }

    fn valid_roles(&self) -> &[i32] {
        &self.valid_roles
    }

    fn role_name(&self, role: i32) -> Option<&str> {
        self.names.get(&role).map(|s| s.as_str())
    }

    fn role_value(&self, name: &str) -> Option<i32> {
        self.values.get(name).copied()
    }
}

/// The role-types shipped with the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoleTypeId {
    Device,
    Hand,
    Tracker,
    TrackedHand,
}

impl RoleTypeId {
    pub const ALL: [RoleTypeId; 4] = [
        RoleTypeId::Device,
        RoleTypeId::Hand,
        RoleTypeId::Tracker,
        RoleTypeId::TrackedHand,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RoleTypeId::Device => "DeviceRole",
            RoleTypeId::Hand => "HandRole",
            RoleTypeId::Tracker => "TrackerRole",
            RoleTypeId::TrackedHand => "TrackedHandRole",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    /// Descriptor of the shipped role enum for this type
    pub fn builtin_descriptor(self) -> RoleTypeInfo {
        match self {
            RoleTypeId::Device => RoleTypeInfo::of::<DeviceRole>(),
            RoleTypeId::Hand => RoleTypeInfo::of::<HandRole>(),
            RoleTypeId::Tracker => RoleTypeInfo::of::<TrackerRole>(),
            RoleTypeId::TrackedHand => RoleTypeInfo::of::<TrackedHandRole>(),
        }
    }
}

impl fmt::Display for RoleTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lookup from role-type identity to its descriptor
#[derive(Debug, Clone)]
pub struct RoleTypeRegistry {
    types: BTreeMap<RoleTypeId, Arc<dyn RoleTypeDescriptor>>,
    default_type: RoleTypeId,
}

impl RoleTypeRegistry {
    /// Registry of all shipped role-types, defaulting to [`RoleTypeId::Hand`]
    pub fn new() -> Self {
        let types = RoleTypeId::ALL
            .into_iter()
            .map(|id| (id, Arc::new(id.builtin_descriptor()) as Arc<dyn RoleTypeDescriptor>))
            .collect();
        Self {
            types,
            default_type: RoleTypeId::Hand,
        }
    }

    /// Replace the descriptor of a role-type
    pub fn register(&mut self, id: RoleTypeId, descriptor: Arc<dyn RoleTypeDescriptor>) {
        self.types.insert(id, descriptor);
    }

    pub fn get(&self, id: RoleTypeId) -> Option<&Arc<dyn RoleTypeDescriptor>> {
        self.types.get(&id)
    }

    /// Registered descriptor of `id`, or the shipped one
    pub fn descriptor(&self, id: RoleTypeId) -> Arc<dyn RoleTypeDescriptor> {
        self.types
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Arc::new(id.builtin_descriptor()))
    }

    /// Resolve a persisted role-type name
    pub fn find(&self, name: &str) -> Option<RoleTypeId> {
        self.types
            .iter()
            .find(|(id, descriptor)| id.name() == name || descriptor.name() == name)
            .map(|(id, _)| *id)
    }

    /// Resolve a persisted name, falling back to the default role-type
    pub fn find_or_default(&self, name: &str) -> RoleTypeId {
        if name.is_empty() {
            return self.default_type;
        }
        self.find(name).unwrap_or(self.default_type)
    }

    pub fn default_type(&self) -> RoleTypeId {
        self.default_type
    }

    pub fn ids(&self) -> impl Iterator<Item = RoleTypeId> + '_ {
        self.types.keys().copied()
    }
}

impl Default for RoleTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
