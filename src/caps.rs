//! Per-device capability cache.
//!
//! The first report from a device (or the start-up pre-warm pass) triggers a
//! capability query: fetch the descriptor blob, expand it, and clamp the
//! result into the bounded field lists. Everything after that is a map
//! lookup. Failures are cached too — a device whose descriptor cannot be
//! resolved is tracked as present-but-undecodable so later reports are
//! skipped cheaply instead of re-running the query per report.
//!
//! The store is owned by the pump and only ever touched from the pump thread,
//! so it needs no synchronization.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::descriptor::{parse_report_descriptor, ButtonPage, ReportLayout, ValueField};
use crate::device::DeviceId;
use crate::fixed::FixedVec;
use crate::source::RawInputSource;

/// Most value fields kept per device; excess descriptor fields are dropped in
/// descriptor order.
pub const MAX_VALUE_FIELDS: usize = 16;
/// Most button pages kept per device.
pub const MAX_BUTTON_PAGES: usize = 16;
/// Most buttons representable per page (one `u64` mask).
pub const MAX_BUTTONS_PER_PAGE: u16 = 64;

/// Immutable, bounded field table for one device. Built at most once per
/// [`DeviceId`] and dropped on disconnect.
#[derive(Clone, Debug, Default)]
pub struct DeviceCaps {
    pub values: FixedVec<ValueField, MAX_VALUE_FIELDS>,
    pub buttons: FixedVec<ButtonPage, MAX_BUTTON_PAGES>,
    pub uses_report_ids: bool,
}

impl DeviceCaps {
    /// Clamps a parsed layout into the bounded lists, preserving descriptor
    /// order. No re-sorting, no prioritization: the first fields win.
    pub fn from_layout(layout: &ReportLayout) -> Self {
        let mut caps = Self {
            uses_report_ids: layout.uses_report_ids,
            ..Self::default()
        };
        for vf in &layout.values {
            if !caps.values.push(*vf) {
                debug!(
                    dropped = layout.values.len() - MAX_VALUE_FIELDS,
                    "value field table full, dropping the rest"
                );
                break;
            }
        }
        for bp in &layout.buttons {
            let mut page = *bp;
            page.count = page.count.min(MAX_BUTTONS_PER_PAGE);
            if !caps.buttons.push(page) {
                debug!(
                    dropped = layout.buttons.len() - MAX_BUTTON_PAGES,
                    "button page table full, dropping the rest"
                );
                break;
            }
        }
        caps
    }
}

/// Memoizing capability resolver keyed on device identity.
#[derive(Default)]
pub struct CapsStore {
    /// `None` records a failed resolution (present but undecodable).
    entries: HashMap<DeviceId, Option<DeviceCaps>>,
}

impl CapsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves capabilities for `id`, querying the source at most once per
    /// identity. Failed queries and malformed descriptors are cached as
    /// negative results; HID decoding stays suppressed for that device until
    /// it reconnects under a fresh identity.
    pub fn resolve<S: RawInputSource + ?Sized>(
        &mut self,
        id: DeviceId,
        source: &mut S,
    ) -> Option<&DeviceCaps> {
        if !self.entries.contains_key(&id) {
            let caps = match source.capability_blob(id) {
                Ok(blob) => match parse_report_descriptor(&blob) {
                    Ok(layout) => {
                        debug!(
                            device = %id,
                            values = layout.values.len(),
                            button_pages = layout.buttons.len(),
                            "resolved device capabilities"
                        );
                        Some(DeviceCaps::from_layout(&layout))
                    }
                    Err(err) => {
                        warn!(device = %id, %err, "malformed capability blob, device marked undecodable");
                        None
                    }
                },
                Err(err) => {
                    warn!(device = %id, %err, "capability query failed, device marked undecodable");
                    None
                }
            };
            self.entries.insert(id, caps);
        }
        self.entries.get(&id).and_then(|caps| caps.as_ref())
    }

    /// Drops the cache entry for a disconnected device.
    pub fn evict(&mut self, id: DeviceId) {
        if self.entries.remove(&id).is_some() {
            debug!(device = %id, "evicted capability cache entry");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
