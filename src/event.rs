//! Typed views over raw keyboard and mouse reports.
//!
//! Keyboard and mouse payloads are fixed-size and self-describing, so unlike
//! HID reports they need no capability descriptor: [`KeyboardEvent::parse`]
//! and [`MouseEvent::parse`] read the OS-defined little-endian layout straight
//! from the notification payload and keep it verbatim. Accessors interpret the
//! flag bits without modifying the stored report.
//!
//! ## Conventions
//! - Mouse deltas are **raw OS counts**, not normalized.
//! - Wheel deltas are raw wheel units (typically ±120 per detent).
//! - Keyboard state is make/break with hardware scancode plus virtual key.

use std::time::Instant;

use crate::device::{DeviceClass, DeviceId};

/// Keyboard flag bit: set on key release (break), clear on press (make).
pub const KEY_BREAK: u16 = 0x0001;
/// Keyboard flag bit: E0 extended-key prefix.
pub const KEY_E0: u16 = 0x0002;
/// Keyboard flag bit: E1 extended-key prefix.
pub const KEY_E1: u16 = 0x0004;

/// Mouse button transition flags (`button_flags` bits).
pub mod mouse_buttons {
    pub const BUTTON_1_DOWN: u16 = 0x0001;
    pub const BUTTON_2_DOWN: u16 = 0x0004;
    pub const BUTTON_3_DOWN: u16 = 0x0010;
    pub const BUTTON_4_DOWN: u16 = 0x0040;
    pub const BUTTON_5_DOWN: u16 = 0x0100;

    /// All "button went down" bits; the matching "went up" bits are one
    /// position to the left of each.
    pub const DOWN_MASK: u16 =
        BUTTON_1_DOWN | BUTTON_2_DOWN | BUTTON_3_DOWN | BUTTON_4_DOWN | BUTTON_5_DOWN;

    pub const WHEEL: u16 = 0x0400;
    pub const HWHEEL: u16 = 0x0800;
}

/// Mouse flag bit: coordinates are absolute rather than relative deltas.
pub const MOUSE_MOVE_ABSOLUTE: u16 = 0x0001;

/// Borrowed view of one notification before any decoding.
#[derive(Clone, Copy, Debug)]
pub struct RawReportEvent<'a> {
    pub device: DeviceId,
    pub class: DeviceClass,
    pub at: Instant,
    /// The report payload exactly as the source delivered it.
    pub payload: &'a [u8],
}

/// Verbatim keyboard report payload (make/break packet).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawKeyboard {
    pub make_code: u16,
    pub flags: u16,
    pub reserved: u16,
    pub vkey: u16,
    pub message: u32,
    pub extra_information: u32,
}

impl RawKeyboard {
    /// Wire size of a keyboard packet.
    pub const WIRE_LEN: usize = 16;
}

/// One keyboard report with device identity and capture time attached.
#[derive(Clone, Copy, Debug)]
pub struct KeyboardEvent {
    pub device: DeviceId,
    pub at: Instant,
    pub raw: RawKeyboard,
}

impl KeyboardEvent {
    /// Parses the fixed keyboard payload layout. Returns `None` when the
    /// payload is too short; the caller drops that single event.
    pub fn parse(device: DeviceId, at: Instant, payload: &[u8]) -> Option<Self> {
        if payload.len() < RawKeyboard::WIRE_LEN {
            return None;
        }
        let raw = RawKeyboard {
            make_code: u16_at(payload, 0),
            flags: u16_at(payload, 2),
            reserved: u16_at(payload, 4),
            vkey: u16_at(payload, 6),
            message: u32_at(payload, 8),
            extra_information: u32_at(payload, 12),
        };
        Some(Self { device, at, raw })
    }

    pub fn virtual_key_code(&self) -> u16 {
        self.raw.vkey
    }

    pub fn scancode(&self) -> u16 {
        self.raw.make_code
    }

    pub fn is_extended(&self) -> bool {
        self.raw.flags & (KEY_E0 | KEY_E1) != 0
    }

    /// `true` while the key is held (make), `false` on release (break).
    pub fn key_is_down(&self) -> bool {
        self.raw.flags & KEY_BREAK == 0
    }
}

/// Verbatim mouse report payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawMouse {
    pub flags: u16,
    pub button_flags: u16,
    pub button_data: u16,
    pub raw_buttons: u32,
    pub last_x: i32,
    pub last_y: i32,
    pub extra_information: u32,
}

impl RawMouse {
    /// Wire size of a mouse packet (includes 2 bytes of alignment padding
    /// after `flags`, matching the OS layout).
    pub const WIRE_LEN: usize = 24;
}

/// One mouse report with device identity and capture time attached.
#[derive(Clone, Copy, Debug)]
pub struct MouseEvent {
    pub device: DeviceId,
    pub at: Instant,
    pub raw: RawMouse,
}

impl MouseEvent {
    /// Parses the fixed mouse payload layout. Returns `None` when the payload
    /// is too short; the caller drops that single event.
    pub fn parse(device: DeviceId, at: Instant, payload: &[u8]) -> Option<Self> {
        if payload.len() < RawMouse::WIRE_LEN {
            return None;
        }
        let raw = RawMouse {
            flags: u16_at(payload, 0),
            // bytes 2..4 are alignment padding
            button_flags: u16_at(payload, 4),
            button_data: u16_at(payload, 6),
            raw_buttons: u32_at(payload, 8),
            last_x: u32_at(payload, 12) as i32,
            last_y: u32_at(payload, 16) as i32,
            extra_information: u32_at(payload, 20),
        };
        Some(Self { device, at, raw })
    }

    pub fn last_x(&self) -> i32 {
        self.raw.last_x
    }

    pub fn last_y(&self) -> i32 {
        self.raw.last_y
    }

    pub fn is_absolute(&self) -> bool {
        self.raw.flags & MOUSE_MOVE_ABSOLUTE != 0
    }

    /// Vertical wheel delta, or 0 when this report carries no wheel change.
    pub fn wheel_delta(&self) -> i16 {
        if self.raw.button_flags & mouse_buttons::WHEEL != 0 {
            self.raw.button_data as i16
        } else {
            0
        }
    }

    /// Horizontal wheel delta, or 0 when this report carries no wheel change.
    pub fn hwheel_delta(&self) -> i16 {
        if self.raw.button_flags & mouse_buttons::HWHEEL != 0 {
            self.raw.button_data as i16
        } else {
            0
        }
    }

    /// Buttons that transitioned to pressed in this report.
    pub fn pressed_buttons(&self) -> u16 {
        self.raw.button_flags & mouse_buttons::DOWN_MASK
    }

    /// Buttons that transitioned to released in this report.
    pub fn released_buttons(&self) -> u16 {
        (self.raw.button_flags >> 1) & mouse_buttons::DOWN_MASK
    }
}

#[inline]
fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
