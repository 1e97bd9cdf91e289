//! Raw report decoding.
//!
//! [`decode`] is a pure function over one raw report payload and a cached
//! [`DeviceCaps`] table. Output sizes are bounded by the capability bounds,
//! so the decoded report lives entirely in fixed-capacity containers — no
//! heap work on the per-report path.
//!
//! Decoding is best-effort by design: a field whose bits fall outside the
//! payload, or whose report id does not match, is omitted from the output.
//! One bad field never aborts the rest of the report.

use std::time::Instant;

use crate::caps::{DeviceCaps, MAX_BUTTON_PAGES, MAX_BUTTONS_PER_PAGE, MAX_VALUE_FIELDS};
use crate::descriptor::ButtonPage;
use crate::device::DeviceId;
use crate::fixed::FixedVec;

/// One resolved absolute-value reading.
///
/// `value` is reported verbatim; hardware can and does report outside
/// `[min, max]`, and normalization treats that as "unknown", so the decoder
/// must not clamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodedValue {
    pub usage_page: u16,
    pub usage: u16,
    pub value: i32,
    pub min: i32,
    pub max: i32,
}

/// Pressed-state mask for one button page.
///
/// Bit `i` set means usage `usage_min + i` is currently pressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodedButtons {
    pub usage_page: u16,
    pub usage_min: u16,
    pub usage_max: u16,
    pub count: u16,
    pub mask: u64,
}

/// One decoded HID report. Transient: produced per raw report, handed to the
/// listener callbacks, then dropped.
#[derive(Clone, Copy, Debug)]
pub struct HidReport {
    pub device: DeviceId,
    pub at: Instant,
    pub values: FixedVec<DecodedValue, MAX_VALUE_FIELDS>,
    pub buttons: FixedVec<DecodedButtons, MAX_BUTTON_PAGES>,
}

/// Decodes one raw report payload against the device's cached field table.
pub fn decode(payload: &[u8], caps: &DeviceCaps, device: DeviceId, at: Instant) -> HidReport {
    let mut report = HidReport {
        device,
        at,
        values: FixedVec::new(),
        buttons: FixedVec::new(),
    };

    // Devices with numbered reports prefix every payload with the id byte;
    // it selects which fields apply and is not part of any field's offset.
    let (report_id, body) = if caps.uses_report_ids {
        match payload.split_first() {
            Some((&id, rest)) => (id, rest),
            None => return report,
        }
    } else {
        (0u8, payload)
    };

    for vf in &caps.values {
        if vf.report_id != report_id {
            continue;
        }
        let Some(bits) = extract_bits(body, vf.bit_offset, vf.bit_size) else {
            continue;
        };
        let value = if vf.is_signed {
            sign_extend(bits, vf.bit_size)
        } else {
            bits as i32
        };
        report.values.push(DecodedValue {
            usage_page: vf.usage_page,
            usage: vf.usage,
            value,
            min: vf.logical_min,
            max: vf.logical_max,
        });
    }

    for bp in &caps.buttons {
        if bp.report_id != report_id {
            continue;
        }
        let Some(mask) = button_mask(body, bp) else {
            continue;
        };
        report.buttons.push(DecodedButtons {
            usage_page: bp.usage_page,
            usage_min: bp.usage_min,
            usage_max: bp.usage_max,
            count: bp.count,
            mask,
        });
    }

    report
}

fn button_mask(body: &[u8], bp: &ButtonPage) -> Option<u64> {
    let mut mask = 0u64;
    if bp.is_array {
        // Each slot holds the usage number of one active button.
        for slot in 0..u32::from(bp.report_count) {
            let offset = bp.bit_offset + slot * u32::from(bp.report_size);
            let raw = extract_bits(body, offset, bp.report_size)?;
            if raw == 0 {
                continue; // empty slot
            }
            let usage = raw as u16;
            if usage < bp.usage_min {
                continue;
            }
            let index = u32::from(usage - bp.usage_min);
            if index < u32::from(bp.count) && index < u32::from(MAX_BUTTONS_PER_PAGE) {
                mask |= 1u64 << index;
            }
        }
    } else {
        for index in 0..u32::from(bp.report_count) {
            let bit = extract_bits(body, bp.bit_offset + index, 1)?;
            if bit != 0 && index < u32::from(bp.count) && index < u32::from(MAX_BUTTONS_PER_PAGE) {
                mask |= 1u64 << index;
            }
        }
    }
    Some(mask)
}

/// Reads `size` bits starting at `offset` (LSB-first within the report, the
/// HID bit order). `None` when the range falls outside the payload.
fn extract_bits(body: &[u8], offset: u32, size: u16) -> Option<u32> {
    if size == 0 || size > 32 {
        return None;
    }
    let end = offset.checked_add(u32::from(size))?;
    if end as usize > body.len() * 8 {
        return None;
    }
    let mut out = 0u32;
    for i in 0..u32::from(size) {
        let bit_index = (offset + i) as usize;
        let bit = (body[bit_index / 8] >> (bit_index % 8)) & 1;
        out |= u32::from(bit) << i;
    }
    Some(out)
}

fn sign_extend(bits: u32, size: u16) -> i32 {
    if size >= 32 {
        return bits as i32;
    }
    let shift = 32 - u32::from(size);
    ((bits << shift) as i32) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::DeviceCaps;
    use crate::descriptor::ValueField;

    fn value_field(
        usage: u16,
        report_id: u8,
        bit_offset: u32,
        bit_size: u16,
        signed: bool,
    ) -> ValueField {
        ValueField {
            usage_page: 0x01,
            usage,
            logical_min: if signed { -127 } else { 0 },
            logical_max: if signed { 127 } else { (1 << bit_size.min(16)) - 1 },
            report_id,
            bit_offset,
            bit_size,
            is_signed: signed,
        }
    }

    fn caps_with(values: &[ValueField], buttons: &[ButtonPage], uses_ids: bool) -> DeviceCaps {
        let mut caps = DeviceCaps {
            uses_report_ids: uses_ids,
            ..DeviceCaps::default()
        };
        for v in values {
            caps.values.push(*v);
        }
        for b in buttons {
            caps.buttons.push(*b);
        }
        caps
    }

    fn dev() -> DeviceId {
        DeviceId::from_raw(7)
    }

    #[test]
    fn extracts_values_across_byte_boundaries() {
        // 12-bit field starting at bit 4: bytes 0x40,0x23 → bits 4..16 are
        // 0x234.
        let caps = caps_with(&[value_field(0x30, 0, 4, 12, false)], &[], false);
        let report = decode(&[0x40, 0x23], &caps, dev(), Instant::now());
        assert_eq!(report.values.len(), 1);
        assert_eq!(report.values[0].value, 0x234);
    }

    #[test]
    fn sign_extends_negative_values() {
        let caps = caps_with(&[value_field(0x30, 0, 0, 8, true)], &[], false);
        let report = decode(&[0x80], &caps, dev(), Instant::now());
        assert_eq!(report.values[0].value, -128);
    }

    #[test]
    fn short_payload_omits_field_without_error() {
        let caps = caps_with(
            &[
                value_field(0x30, 0, 0, 8, false),
                value_field(0x31, 0, 8, 16, false),
            ],
            &[],
            false,
        );
        // One byte: X decodes, Y's bit range is out of reach.
        let report = decode(&[0x55], &caps, dev(), Instant::now());
        assert_eq!(report.values.len(), 1);
        assert_eq!(report.values[0].usage, 0x30);
    }

    #[test]
    fn report_id_selects_fields() {
        let caps = caps_with(
            &[
                value_field(0x30, 1, 0, 8, false),
                value_field(0x31, 2, 0, 8, false),
            ],
            &[],
            true,
        );
        let report = decode(&[0x02, 0x2a], &caps, dev(), Instant::now());
        assert_eq!(report.values.len(), 1);
        assert_eq!(report.values[0].usage, 0x31);
        assert_eq!(report.values[0].value, 0x2a);
    }

    #[test]
    fn empty_payload_with_report_ids_decodes_to_nothing() {
        let caps = caps_with(&[value_field(0x30, 1, 0, 8, false)], &[], true);
        let report = decode(&[], &caps, dev(), Instant::now());
        assert!(report.values.is_empty());
        assert!(report.buttons.is_empty());
    }

    #[test]
    fn variable_button_bits_fold_into_mask() {
        let page = ButtonPage {
            usage_page: 0x09,
            usage_min: 1,
            usage_max: 12,
            count: 12,
            report_id: 0,
            bit_offset: 0,
            report_size: 1,
            report_count: 12,
            is_array: false,
        };
        // Bits 0, 2, 11 set.
        let report = decode(&[0b0000_0101, 0b0000_1000], &caps_with(&[], &[page], false), dev(), Instant::now());
        assert_eq!(report.buttons.len(), 1);
        assert_eq!(report.buttons[0].mask, (1 << 0) | (1 << 2) | (1 << 11));
        assert_eq!(report.buttons[0].count, 12);
    }

    #[test]
    fn array_slots_map_usages_to_bits() {
        let page = ButtonPage {
            usage_page: 0x09,
            usage_min: 1,
            usage_max: 8,
            count: 8,
            report_id: 0,
            bit_offset: 0,
            report_size: 8,
            report_count: 3,
            is_array: true,
        };
        // Slots report usages 3 and 8; one slot empty.
        let report = decode(&[3, 0, 8], &caps_with(&[], &[page], false), dev(), Instant::now());
        assert_eq!(report.buttons[0].mask, (1 << 2) | (1 << 7));
    }

    #[test]
    fn array_usage_outside_range_is_discarded() {
        // count is 4, so usage index 4 (usage 5) is out of range: the bounds
        // test is exclusive.
        let page = ButtonPage {
            usage_page: 0x09,
            usage_min: 1,
            usage_max: 4,
            count: 4,
            report_id: 0,
            bit_offset: 0,
            report_size: 8,
            report_count: 2,
            is_array: true,
        };
        let report = decode(&[5, 4], &caps_with(&[], &[page], false), dev(), Instant::now());
        assert_eq!(report.buttons[0].mask, 1 << 3, "usage 5 must be dropped");
    }

    #[test]
    fn truncated_button_field_is_skipped_entirely() {
        let page = ButtonPage {
            usage_page: 0x09,
            usage_min: 1,
            usage_max: 16,
            count: 16,
            report_id: 0,
            bit_offset: 0,
            report_size: 1,
            report_count: 16,
            is_array: false,
        };
        let report = decode(&[0xff], &caps_with(&[], &[page], false), dev(), Instant::now());
        assert!(report.buttons.is_empty());
    }
}
