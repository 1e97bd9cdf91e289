//! Device identity, classification, and enumeration metadata.
//!
//! A [`DeviceId`] is an opaque handle assigned by the input source. It is
//! stable for as long as the device stays connected and is never reused for a
//! different device within a session; a reconnect shows up as a fresh id.
//! The capability cache is keyed on it and dropped when the device goes away.

use serde::{Deserialize, Serialize};

/// Opaque, session-stable identity of a physical input device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(u64);

impl DeviceId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Classification assigned by the input source to each device and report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Mouse,
    Keyboard,
    Joystick,
    GamePad,
}

impl DeviceClass {
    /// `true` for classes whose reports go through the HID decode pipeline.
    pub fn is_hid(self) -> bool {
        matches!(self, DeviceClass::Joystick | DeviceClass::GamePad)
    }
}

/// Bitmask selecting which device classes a listener subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTypeMask(u32);

impl DeviceTypeMask {
    pub const NONE: Self = Self(0x00);
    pub const MOUSE: Self = Self(0x01);
    pub const KEYBOARD: Self = Self(0x02);
    pub const JOYSTICK: Self = Self(0x04);
    pub const GAMEPAD: Self = Self(0x08);
    pub const ALL: Self = Self(0x0f);

    pub const fn contains(self, class: DeviceClass) -> bool {
        let bit = match class {
            DeviceClass::Mouse => Self::MOUSE.0,
            DeviceClass::Keyboard => Self::KEYBOARD.0,
            DeviceClass::Joystick => Self::JOYSTICK.0,
            DeviceClass::GamePad => Self::GAMEPAD.0,
        };
        self.0 & bit != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for DeviceTypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DeviceTypeMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Snapshot of what the source knows about a connected device.
///
/// All string fields are best-effort; sources populate what the platform
/// reports and leave the rest `None`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub id: DeviceId,
    pub class: DeviceClass,
    /// OS/topological path, opaque and platform-specific. Diagnostic first,
    /// identity second.
    pub path: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_contains_and_union() {
        let mask = DeviceTypeMask::JOYSTICK | DeviceTypeMask::GAMEPAD;
        assert!(mask.contains(DeviceClass::Joystick));
        assert!(mask.contains(DeviceClass::GamePad));
        assert!(!mask.contains(DeviceClass::Mouse));
        assert!(DeviceTypeMask::ALL.contains(DeviceClass::Keyboard));
        assert!(DeviceTypeMask::NONE.is_empty());
    }

    #[test]
    fn hid_classes() {
        assert!(DeviceClass::Joystick.is_hid());
        assert!(DeviceClass::GamePad.is_hid());
        assert!(!DeviceClass::Keyboard.is_hid());
        assert!(!DeviceClass::Mouse.is_hid());
    }
}
