//! Typed role values for the shipped role-types

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::device::{DeviceIndex, MAX_DEVICE_COUNT};
use crate::role_type::RoleTypeId;

/// A typed value of one role-type
pub trait Role: Copy + Eq + fmt::Debug + 'static {
    const TYPE: RoleTypeId;
    const INVALID_VALUE: i32 = -1;

    fn to_value(self) -> i32;

    fn from_value(value: i32) -> Option<Self>;

    fn name(self) -> Cow<'static, str>;

    /// Every valid role in ascending value order
    fn all() -> Vec<Self>;
}

macro_rules! role_enum {
    (
        $(#[$meta:meta])*
        $name:ident: $type_id:expr => { $($variant:ident = $value:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant = $value),+
        }

        impl Role for $name {
            const TYPE: RoleTypeId = $type_id;

            fn to_value(self) -> i32 {
                self as i32
            }

            fn from_value(value: i32) -> Option<Self> {
                match value {
                    $(v if v == $value => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn name(self) -> Cow<'static, str> {
                match self {
                    $($name::$variant => Cow::Borrowed(stringify!($variant)),)+
                }
            }

            fn all() -> Vec<Self> {
                vec![$($name::$variant),+]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.name())
            }
        }
    };
}

role_enum! {
    /// Controller roles, assigned from hardware left/right hints
    HandRole: RoleTypeId::Hand => {
        RightHand = 0,
        LeftHand = 1,
        ExternalCamera = 2,
        Controller3 = 3,
        Controller4 = 4,
        Controller5 = 5,
        Controller6 = 6,
        Controller7 = 7,
        Controller8 = 8,
        Controller9 = 9,
        Controller10 = 10,
        Controller11 = 11,
        Controller12 = 12,
        Controller13 = 13,
        Controller14 = 14,
        Controller15 = 15,
    }
}

role_enum! {
    /// Interchangeable generic trackers, assigned in device order
    TrackerRole: RoleTypeId::Tracker => {
        Tracker1 = 0,
        Tracker2 = 1,
        Tracker3 = 2,
        Tracker4 = 3,
        Tracker5 = 4,
        Tracker6 = 5,
        Tracker7 = 6,
        Tracker8 = 7,
        Tracker9 = 8,
        Tracker10 = 9,
        Tracker11 = 10,
        Tracker12 = 11,
        Tracker13 = 12,
    }
}

role_enum! {
    /// Optically tracked hands, disambiguated by tracking quality
    TrackedHandRole: RoleTypeId::TrackedHand => {
        RightHand = 0,
        LeftHand = 1,
    }
}

/// Passthrough role whose value is the device index itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceRole(pub u32);

impl DeviceRole {
    pub fn device(self) -> DeviceIndex {
        DeviceIndex(self.0)
    }
}

impl Role for DeviceRole {
    const TYPE: RoleTypeId = RoleTypeId::Device;

    fn to_value(self) -> i32 {
        self.0 as i32
    }

    fn from_value(value: i32) -> Option<Self> {
        if (0..MAX_DEVICE_COUNT as i32).contains(&value) {
            Some(DeviceRole(value as u32))
        } else {
            None
        }
    }

    fn name(self) -> Cow<'static, str> {
        Cow::Owned(format!("Device{}", self.0))
    }

    fn all() -> Vec<Self> {
        (0..MAX_DEVICE_COUNT).map(DeviceRole).collect()
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role_type::{RoleTypeDescriptor, RoleTypeInfo};

    #[test]
    fn test_enum_value_conversion() {
        assert_eq!(HandRole::LeftHand.to_value(), 1);
        assert_eq!(HandRole::from_value(15), Some(HandRole::Controller15));
        assert_eq!(HandRole::from_value(16), None);
        assert_eq!(TrackerRole::from_value(-1), None);
        assert_eq!(TrackedHandRole::RightHand.to_string(), "RightHand");
    }

    #[test]
    fn test_device_role_names() {
        assert_eq!(DeviceRole(12).name(), "Device12");
        assert_eq!(DeviceRole::from_value(64), None);
        assert_eq!(DeviceRole::from_value(5).map(DeviceRole::device), Some(DeviceIndex(5)));
    }

    #[test]
    fn test_info_from_role_enum() {
        let info = RoleTypeInfo::of::<TrackerRole>();
        assert_eq!(info.name(), "TrackerRole");
        assert_eq!(info.valid_roles().len(), 13);
        assert_eq!(info.role_value("Tracker2"), Some(1));
        assert_eq!(info.role_name(-1), Some("Invalid"));
        assert!(!info.is_valid_role(-1));
    }
}
