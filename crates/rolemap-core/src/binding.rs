//! Bulk binding export/import shapes
//!
//! Roles are persisted by name so stored bindings survive renumbering of a
//! role-type as long as its names are stable.

use serde::{Deserialize, Serialize};

/// Every binding of every role-type, as handed to a persistence layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSnapshot {
    #[serde(default)]
    pub role_types: Vec<RoleTypeBindings>,
}

impl BindingSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of binding entries across all role-types
    pub fn len(&self) -> usize {
        self.role_types.iter().map(|rt| rt.bindings.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bindings of the role-type with the given persisted name
    pub fn role_type(&self, name: &str) -> Option<&RoleTypeBindings> {
        self.role_types.iter().find(|rt| rt.role_type == name)
    }
}

/// Bindings of one role-type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTypeBindings {
    /// Persisted role-type name, e.g. `TrackerRole`
    pub role_type: String,
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

/// A single serial number bound to a role
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingEntry {
    pub serial: String,
    /// Role value name within the role-type
    pub role: String,
}

impl BindingEntry {
    pub fn new(serial: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            role: role.into(),
        }
    }
}

/// How an import treats bindings that already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Unbind everything in each listed role-type before binding
    #[default]
    Replace,
    /// Keep existing bindings; conflicting entries are skipped
    Merge,
}

/// Outcome of [`import_bindings`](crate::RoleMapRegistry::import_bindings)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Entries that created a binding
    pub applied: usize,
    /// Entries already bound exactly as listed
    pub unchanged: usize,
    /// Unknown role-type or role name
    pub skipped_unknown: usize,
    /// Role or serial already bound elsewhere, or bindings blocked
    pub skipped_conflict: usize,
}

impl ImportReport {
    pub fn skipped(&self) -> usize {
        self.skipped_unknown + self.skipped_conflict
    }
}
