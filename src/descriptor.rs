//! HID report-descriptor expansion.
//!
//! A device's capability blob is its standard HID report descriptor: a stream
//! of short items carrying global state (usage page, logical range, report
//! size/count/id) and local state (usages, usage ranges) that `Input` main
//! items snapshot into fields. This module walks that stream once and flattens
//! the input fields into a bit-level table — [`ValueField`]s for absolute
//! values (axes, sliders, hats, dials) and [`ButtonPage`]s for contiguous
//! button usages — which is everything the report decoder needs to extract
//! readings from raw report bytes without further OS help.
//!
//! Output and feature items are skipped entirely; they live in separate
//! report address spaces and this crate never writes to devices.

use std::collections::HashMap;

use thiserror::Error;

/// One absolute-value input field (axis, slider, hat switch, dial, ...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValueField {
    pub usage_page: u16,
    pub usage: u16,
    pub logical_min: i32,
    pub logical_max: i32,
    /// Report id the field belongs to; 0 when the device uses a single
    /// unnumbered report.
    pub report_id: u8,
    /// Bit position within the report body (excluding the id byte).
    pub bit_offset: u32,
    pub bit_size: u16,
    /// Sign-extend extracted bits when set (descriptor declared a negative
    /// logical minimum).
    pub is_signed: bool,
}

/// One contiguous page of button usages.
///
/// Covers both encodings devices use: variable bitfields (one bit per usage)
/// and array slots (each slot holds the usage number of one active button).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonPage {
    pub usage_page: u16,
    pub usage_min: u16,
    pub usage_max: u16,
    /// Number of distinct usages this page can report.
    pub count: u16,
    pub report_id: u8,
    pub bit_offset: u32,
    pub report_size: u16,
    pub report_count: u16,
    pub is_array: bool,
}

/// Flattened input-field table for one device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportLayout {
    pub values: Vec<ValueField>,
    pub buttons: Vec<ButtonPage>,
    /// When set, the first byte of every report payload is a report id.
    pub uses_report_ids: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor item data runs past the end of the blob")]
    UnexpectedEnd,
    #[error("global state pop without matching push")]
    UnbalancedPop,
}

// Item prefix decomposition (HID 1.11 §6.2.2.2).
const TYPE_MAIN: u8 = 0;
const TYPE_GLOBAL: u8 = 1;
const TYPE_LOCAL: u8 = 2;

const MAIN_INPUT: u8 = 0x8;
const MAIN_OUTPUT: u8 = 0x9;
const MAIN_COLLECTION: u8 = 0xa;
const MAIN_FEATURE: u8 = 0xb;
const MAIN_END_COLLECTION: u8 = 0xc;

const GLOBAL_USAGE_PAGE: u8 = 0x0;
const GLOBAL_LOGICAL_MIN: u8 = 0x1;
const GLOBAL_LOGICAL_MAX: u8 = 0x2;
const GLOBAL_REPORT_SIZE: u8 = 0x7;
const GLOBAL_REPORT_ID: u8 = 0x8;
const GLOBAL_REPORT_COUNT: u8 = 0x9;
const GLOBAL_PUSH: u8 = 0xa;
const GLOBAL_POP: u8 = 0xb;

const LOCAL_USAGE: u8 = 0x0;
const LOCAL_USAGE_MIN: u8 = 0x1;
const LOCAL_USAGE_MAX: u8 = 0x2;

const INPUT_CONSTANT: u32 = 0x01;
const INPUT_VARIABLE: u32 = 0x02;

#[derive(Clone, Copy, Debug, Default)]
struct Globals {
    usage_page: u16,
    logical_min: i32,
    logical_max: i32,
    report_size: u16,
    report_count: u16,
    report_id: u8,
}

#[derive(Debug, Default)]
struct Locals {
    /// Usages listed before the main item; extended usages (4-byte items)
    /// carry their page in the high 16 bits.
    usages: Vec<u32>,
    usage_min: Option<u32>,
    usage_max: Option<u32>,
}

impl Locals {
    fn clear(&mut self) {
        self.usages.clear();
        self.usage_min = None;
        self.usage_max = None;
    }
}

/// Splits a possibly-extended usage into `(page, usage)`.
fn split_usage(raw: u32, default_page: u16) -> (u16, u16) {
    if raw > 0xffff {
        ((raw >> 16) as u16, raw as u16)
    } else {
        (default_page, raw as u16)
    }
}

/// Expands a raw HID report descriptor into the flattened input-field table.
pub fn parse_report_descriptor(blob: &[u8]) -> Result<ReportLayout, DescriptorError> {
    let mut layout = ReportLayout::default();
    let mut globals = Globals::default();
    let mut stack: Vec<Globals> = Vec::new();
    let mut locals = Locals::default();
    // Running input bit offset per report id. Offsets restart for each id and
    // exclude the id byte itself.
    let mut offsets: HashMap<u8, u32> = HashMap::new();

    let mut pos = 0usize;
    while pos < blob.len() {
        let prefix = blob[pos];
        pos += 1;

        // Long item: one size byte, one tag byte, then payload. None are
        // defined for input fields; skip it whole.
        if prefix == 0xfe {
            if pos + 2 > blob.len() {
                return Err(DescriptorError::UnexpectedEnd);
            }
            let long_len = blob[pos] as usize;
            pos += 2 + long_len;
            if pos > blob.len() {
                return Err(DescriptorError::UnexpectedEnd);
            }
            continue;
        }

        let size = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let item_type = (prefix >> 2) & 0x03;
        let tag = prefix >> 4;

        if pos + size > blob.len() {
            return Err(DescriptorError::UnexpectedEnd);
        }
        let data_bytes = &blob[pos..pos + size];
        pos += size;

        let udata: u32 = data_bytes
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
        let sdata: i32 = match size {
            0 => 0,
            1 => udata as u8 as i8 as i32,
            2 => udata as u16 as i16 as i32,
            _ => udata as i32,
        };

        match item_type {
            TYPE_GLOBAL => match tag {
                GLOBAL_USAGE_PAGE => globals.usage_page = udata as u16,
                GLOBAL_LOGICAL_MIN => globals.logical_min = sdata,
                GLOBAL_LOGICAL_MAX => {
                    // Descriptors frequently encode an unsigned maximum in the
                    // smallest item that fits it (e.g. 0x25 0xFF for 255). When
                    // the signed reading would invert the range, take the
                    // unsigned one.
                    globals.logical_max = if sdata < globals.logical_min {
                        udata as i32
                    } else {
                        sdata
                    };
                }
                GLOBAL_REPORT_SIZE => globals.report_size = udata as u16,
                GLOBAL_REPORT_ID => {
                    globals.report_id = udata as u8;
                    layout.uses_report_ids = true;
                }
                GLOBAL_REPORT_COUNT => globals.report_count = udata as u16,
                GLOBAL_PUSH => stack.push(globals),
                GLOBAL_POP => globals = stack.pop().ok_or(DescriptorError::UnbalancedPop)?,
                _ => {}
            },
            TYPE_LOCAL => match tag {
                LOCAL_USAGE => locals.usages.push(udata),
                LOCAL_USAGE_MIN => locals.usage_min = Some(udata),
                LOCAL_USAGE_MAX => locals.usage_max = Some(udata),
                _ => {}
            },
            TYPE_MAIN => {
                match tag {
                    MAIN_INPUT => {
                        push_input_fields(&mut layout, &globals, &locals, udata, &mut offsets);
                    }
                    MAIN_OUTPUT | MAIN_FEATURE => {
                        // Separate report spaces; nothing to track.
                    }
                    MAIN_COLLECTION | MAIN_END_COLLECTION => {}
                    _ => {}
                }
                locals.clear();
            }
            _ => {}
        }
    }

    Ok(layout)
}

fn push_input_fields(
    layout: &mut ReportLayout,
    g: &Globals,
    locals: &Locals,
    flags: u32,
    offsets: &mut HashMap<u8, u32>,
) {
    let offset = offsets.entry(g.report_id).or_insert(0);
    let total_bits = u32::from(g.report_size) * u32::from(g.report_count);
    if total_bits == 0 {
        return;
    }

    // Constant fields are padding; they occupy report bits but carry no data.
    if flags & INPUT_CONSTANT != 0 {
        *offset += total_bits;
        return;
    }

    let variable = flags & INPUT_VARIABLE != 0;

    if !variable {
        // Array encoding: each slot carries the usage number of one active
        // control within the declared usage range.
        let range = locals
            .usage_min
            .zip(locals.usage_max)
            .or_else(|| match locals.usages.as_slice() {
                [] => None,
                us => Some((us[0], us[us.len() - 1])),
            });
        if let Some((raw_min, raw_max)) = range {
            let (page, usage_min) = split_usage(raw_min, g.usage_page);
            let (_, usage_max) = split_usage(raw_max, g.usage_page);
            let span = u32::from(usage_max.saturating_sub(usage_min)) + 1;
            layout.buttons.push(ButtonPage {
                usage_page: page,
                usage_min,
                usage_max,
                count: span.min(u32::from(u16::MAX)) as u16,
                report_id: g.report_id,
                bit_offset: *offset,
                report_size: g.report_size,
                report_count: g.report_count,
                is_array: true,
            });
        }
        *offset += total_bits;
        return;
    }

    if g.report_size == 1 {
        // Variable single-bit fields: one contiguous button page.
        let range = locals
            .usage_min
            .zip(locals.usage_max)
            .or_else(|| match locals.usages.as_slice() {
                [] => None,
                us => Some((us[0], us[us.len() - 1])),
            });
        if let Some((raw_min, raw_max)) = range {
            let (page, usage_min) = split_usage(raw_min, g.usage_page);
            let (_, usage_max) = split_usage(raw_max, g.usage_page);
            let span = u32::from(usage_max.saturating_sub(usage_min)) + 1;
            layout.buttons.push(ButtonPage {
                usage_page: page,
                usage_min,
                usage_max,
                count: span.min(u32::from(g.report_count)) as u16,
                report_id: g.report_id,
                bit_offset: *offset,
                report_size: 1,
                report_count: g.report_count,
                is_array: false,
            });
        }
        *offset += total_bits;
        return;
    }

    // Variable multi-bit fields: one value field per report slot. When fewer
    // usages are listed than slots, the last usage repeats (HID rule); a
    // usage range enumerates usages in order.
    let last_listed = locals.usages.last().copied();
    for i in 0..u32::from(g.report_count) {
        let raw_usage = locals
            .usages
            .get(i as usize)
            .copied()
            .or_else(|| {
                locals.usage_min.map(|umin| {
                    let candidate = umin + i;
                    match locals.usage_max {
                        Some(umax) if candidate > umax => umax,
                        _ => candidate,
                    }
                })
            })
            .or(last_listed);
        let Some(raw_usage) = raw_usage else {
            continue;
        };
        let (page, usage) = split_usage(raw_usage, g.usage_page);
        layout.values.push(ValueField {
            usage_page: page,
            usage,
            logical_min: g.logical_min,
            logical_max: g.logical_max,
            report_id: g.report_id,
            bit_offset: *offset + i * u32::from(g.report_size),
            bit_size: g.report_size,
            is_signed: g.logical_min < 0,
        });
    }
    *offset += total_bits;
}
