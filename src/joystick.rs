//! Normalized joystick and gamepad state.
//!
//! Takes one decoded HID report and maps it onto a fixed slot layout: six
//! axes, four sliders, two hat switches, and up to 64 buttons. Every
//! normalized slot is optional — a device that does not report an axis leaves
//! it `None`, and a value the hardware reports outside its declared logical
//! range is treated as unknown rather than clamped into plausibility.

use std::time::Instant;

use crate::decode::HidReport;
use crate::device::DeviceId;

mod usage_page {
    pub const GENERIC_DESKTOP: u16 = 0x01;
    pub const SIMULATION: u16 = 0x02;
    pub const GAME: u16 = 0x05;
}

mod desktop {
    pub const X: u16 = 0x30;
    pub const Y: u16 = 0x31;
    pub const Z: u16 = 0x32;
    pub const RX: u16 = 0x33;
    pub const RY: u16 = 0x34;
    pub const RZ: u16 = 0x35;
    pub const SLIDER: u16 = 0x36;
    pub const HAT_SWITCH: u16 = 0x39;
}

mod simulation {
    pub const RUDDER: u16 = 0xba;
    pub const THROTTLE: u16 = 0xbb;
    pub const ACCELERATOR: u16 = 0xc4;
    pub const BRAKE: u16 = 0xc5;
    pub const STEERING: u16 = 0xc8;
}

mod game {
    pub const POINT_OF_VIEW: u16 = 0x20;
}

/// Snapshot of one joystick-class report after normalization.
///
/// Axes run `-1.0..=1.0`, sliders `0.0..=1.0`, hats are a fraction of a full
/// clockwise turn in `0.0..1.0` plus a unit vector. Buttons are a packed
/// pressed mask, bit `i` for button `i + 1`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JoystickState {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub rot_x: Option<f32>,
    pub rot_y: Option<f32>,
    pub rot_z: Option<f32>,
    pub slider0: Option<f32>,
    pub slider1: Option<f32>,
    pub slider2: Option<f32>,
    pub slider3: Option<f32>,
    pub hat0: Option<f32>,
    pub hat0_x: Option<f32>,
    pub hat0_y: Option<f32>,
    pub hat1: Option<f32>,
    pub hat1_x: Option<f32>,
    pub hat1_y: Option<f32>,
    pub button_count: u32,
    pub buttons: u64,
}

impl JoystickState {
    /// Pressed state for button `index` (0-based). Indices at or past
    /// `button_count` read as released.
    pub fn button(&self, index: u32) -> bool {
        index < 64 && self.buttons & (1u64 << index) != 0
    }
}

/// One normalized joystick event.
#[derive(Clone, Copy, Debug)]
pub struct JoystickEvent {
    pub device: DeviceId,
    pub at: Instant,
    pub state: JoystickState,
}

impl JoystickEvent {
    /// Normalizes one decoded report into the fixed slot layout.
    pub fn from_report(report: &HidReport) -> Self {
        let mut state = JoystickState::default();
        let mut sliders_seen = 0usize;
        let mut hats_seen = 0usize;

        // Generic desktop fills the standard slots first.
        for dv in &report.values {
            if dv.usage_page != usage_page::GENERIC_DESKTOP {
                continue;
            }
            match dv.usage {
                desktop::X => state.x = axis(dv.value, dv.min, dv.max),
                desktop::Y => state.y = axis(dv.value, dv.min, dv.max),
                desktop::Z => state.z = axis(dv.value, dv.min, dv.max),
                desktop::RX => state.rot_x = axis(dv.value, dv.min, dv.max),
                desktop::RY => state.rot_y = axis(dv.value, dv.min, dv.max),
                desktop::RZ => state.rot_z = axis(dv.value, dv.min, dv.max),
                desktop::SLIDER => {
                    let value = throttle(dv.value, dv.min, dv.max);
                    match sliders_seen {
                        0 => state.slider0 = value,
                        1 => state.slider1 = value,
                        2 => state.slider2 = value,
                        3 => state.slider3 = value,
                        _ => {} // only four slider slots
                    }
                    sliders_seen += 1;
                }
                desktop::HAT_SWITCH => {
                    let value = hat(dv.value, dv.min, dv.max);
                    match hats_seen {
                        0 => set_hat(&mut state.hat0, &mut state.hat0_x, &mut state.hat0_y, value),
                        1 => set_hat(&mut state.hat1, &mut state.hat1_x, &mut state.hat1_y, value),
                        _ => {} // only two hat slots
                    }
                    hats_seen += 1;
                }
                _ => {}
            }
        }

        // Simulation and game controls override the generic slots so wheels
        // and pedal sets land where callers expect them.
        for dv in &report.values {
            match (dv.usage_page, dv.usage) {
                (usage_page::SIMULATION, simulation::STEERING) => {
                    state.x = axis(dv.value, dv.min, dv.max);
                }
                (usage_page::SIMULATION, simulation::ACCELERATOR) => {
                    state.y = axis(dv.value, dv.min, dv.max);
                }
                (usage_page::SIMULATION, simulation::BRAKE) => {
                    state.z = axis(dv.value, dv.min, dv.max);
                }
                (usage_page::SIMULATION, simulation::RUDDER) => {
                    state.rot_z = axis(dv.value, dv.min, dv.max);
                }
                (usage_page::SIMULATION, simulation::THROTTLE) => {
                    state.slider0 = throttle(dv.value, dv.min, dv.max);
                }
                (usage_page::GAME, game::POINT_OF_VIEW) => {
                    let value = hat(dv.value, dv.min, dv.max);
                    set_hat(&mut state.hat0, &mut state.hat0_x, &mut state.hat0_y, value);
                }
                _ => {}
            }
        }

        // Button pages concatenate into a single 64-bit mask in table order,
        // whatever their usage page.
        for db in &report.buttons {
            if state.button_count >= 64 {
                break;
            }
            let offset = state.button_count;
            let available = 64 - offset;
            let written = u32::from(db.count).min(available);
            state.buttons |= (db.mask & mask_of(written)) << offset;
            state.button_count += written;
        }

        Self {
            device: report.device,
            at: report.at,
            state,
        }
    }
}

/// Centered axis: `center = (max - min) / 2`, output `(value - center) /
/// center` clamped to ±1.0. The reading is compared against the half-range
/// directly, not shifted by `min` first.
fn axis(value: i32, min: i32, max: i32) -> Option<f32> {
    let center = (max as f32 - min as f32) / 2.0;
    if center == 0.0 {
        return Some(0.0);
    }
    Some(((value as f32 - center) / center).clamp(-1.0, 1.0))
}

/// One-sided control: min maps to 0.0, max to 1.0. A reading outside the
/// declared range means the control is absent or idle, so no value at all.
fn throttle(value: i32, min: i32, max: i32) -> Option<f32> {
    if value < min || value > max {
        return None;
    }
    let span = max as f32 - min as f32;
    if span == 0.0 {
        return None;
    }
    Some(((value as f32 - min as f32) / span).clamp(0.0, 1.0))
}

/// Hat direction as a fraction of a full turn, scaled with the same one-sided
/// rule as sliders. Out-of-range readings are the idle (centered) position.
fn hat(value: i32, min: i32, max: i32) -> Option<f32> {
    throttle(value, min, max)
}

fn set_hat(slot: &mut Option<f32>, x: &mut Option<f32>, y: &mut Option<f32>, value: Option<f32>) {
    *slot = value;
    match value {
        Some(v) => {
            let angle = v * std::f32::consts::TAU;
            *x = Some(angle.cos());
            *y = Some(angle.sin());
        }
        None => {
            *x = None;
            *y = None;
        }
    }
}

fn mask_of(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
