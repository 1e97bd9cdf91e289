//! End-to-end pump tests over the in-process channel source.
//!
//! Every test drives the full pipeline: injected notifications flow through
//! the pump thread, capability resolution, decoding, and normalization, and
//! land in a recording handler. Closing the listener joins the pump thread,
//! so assertions after `close` observe a frozen, race-free log.

use std::sync::{Arc, Mutex};

use rawpump::device::{DeviceClass, DeviceDescription, DeviceId};
use rawpump::pump::{InputHandler, Interest, Listener, ListenerError};
use rawpump::source::{ChannelSource, SourceError};
use rawpump::{HidReport, JoystickEvent, KeyboardEvent, MouseEvent, RawReportEvent};

#[derive(Clone, Default)]
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl InputHandler for Recorder {
    fn on_raw_report(&mut self, event: &RawReportEvent<'_>) {
        self.push(format!("raw:{:?}:{}", event.class, event.payload.len()));
    }

    fn on_keyboard(&mut self, event: &KeyboardEvent) {
        self.push(format!("key:{:#04x}:{}", event.virtual_key_code(), event.key_is_down()));
    }

    fn on_mouse(&mut self, event: &MouseEvent) {
        self.push(format!("mouse:{}:{}", event.last_x(), event.last_y()));
    }

    fn on_hid_report(&mut self, event: &HidReport) {
        let values: Vec<i32> = event.values.iter().map(|v| v.value).collect();
        self.push(format!("hid:{values:?}"));
    }

    fn on_joystick(&mut self, event: &JoystickEvent) {
        self.push(format!("joy:{:?}", event.state.x));
    }

    fn on_device_arrived(&mut self, device: &DeviceDescription) {
        self.push(format!("arrived:{}", device.id));
    }

    fn on_device_removed(&mut self, device: DeviceId) {
        self.push(format!("removed:{device}"));
    }
}

fn joystick_desc(id: u64) -> DeviceDescription {
    DeviceDescription {
        id: DeviceId::from_raw(id),
        class: DeviceClass::Joystick,
        path: None,
        manufacturer: None,
        product: Some("synthetic stick".into()),
        serial_number: None,
    }
}

/// Descriptor with a single 8-bit X axis, logical 0..=255.
fn x_axis_blob() -> Vec<u8> {
    vec![
        0x05, 0x01, // Usage Page (Generic Desktop)
        0x09, 0x30, // Usage (X)
        0x15, 0x00, // Logical Minimum (0)
        0x26, 0xff, 0x00, // Logical Maximum (255)
        0x75, 0x08, // Report Size (8)
        0x95, 0x01, // Report Count (1)
        0x81, 0x02, // Input (Data, Variable)
    ]
}

fn keyboard_payload(vkey: u16) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&0x1eu16.to_le_bytes()); // make code
    p.extend_from_slice(&0u16.to_le_bytes()); // flags (make)
    p.extend_from_slice(&0u16.to_le_bytes());
    p.extend_from_slice(&vkey.to_le_bytes());
    p.extend_from_slice(&0u32.to_le_bytes());
    p.extend_from_slice(&0u32.to_le_bytes());
    p
}

fn mouse_payload(dx: i32, dy: i32) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend_from_slice(&[0u8; 12]); // flags, padding, button fields
    p.extend_from_slice(&dx.to_le_bytes());
    p.extend_from_slice(&dy.to_le_bytes());
    p.extend_from_slice(&0u32.to_le_bytes());
    p
}

#[test]
fn subscription_failure_surfaces_from_start() {
    let result = Listener::start(
        || {
            let (mut source, _injector) = ChannelSource::new();
            source.fail_subscription();
            Ok(source)
        },
        Recorder::default(),
        Interest::all(),
    );
    assert!(matches!(
        result,
        Err(ListenerError::Source(SourceError::Subscribe(_)))
    ));
}

#[test]
fn close_freezes_the_callback_stream() {
    let (source, injector) = ChannelSource::new();
    let recorder = Recorder::default();

    let mut listener = Listener::start(
        move || Ok(source),
        recorder.clone(),
        Interest::keyboard_and_mouse(),
    )
    .expect("listener starts");

    let kbd = DeviceId::from_raw(1);
    for _ in 0..3 {
        injector.send_report(kbd, DeviceClass::Keyboard, keyboard_payload(0x41));
    }
    listener.close();

    let frozen = recorder.entries();
    assert_eq!(frozen.len(), 6, "3 raw + 3 keyboard callbacks");

    // Anything injected after close is never delivered.
    injector.send_report(kbd, DeviceClass::Keyboard, keyboard_payload(0x42));
    listener.close();
    assert_eq!(recorder.entries(), frozen);
}

#[test]
fn keyboard_and_mouse_flow_without_capabilities() {
    let (source, injector) = ChannelSource::new();
    let recorder = Recorder::default();

    let mut listener = Listener::start(move || Ok(source), recorder.clone(), Interest::all())
        .expect("listener starts");

    injector.send_report(DeviceId::from_raw(1), DeviceClass::Keyboard, keyboard_payload(0x41));
    injector.send_report(DeviceId::from_raw(2), DeviceClass::Mouse, mouse_payload(5, -3));
    listener.close();

    assert_eq!(
        recorder.entries(),
        vec![
            "raw:Keyboard:16".to_string(),
            "key:0x41:true".to_string(),
            "raw:Mouse:24".to_string(),
            "mouse:5:-3".to_string(),
        ]
    );
    assert_eq!(injector.blob_queries(), 0, "no capability work for kbd/mouse");
}

#[test]
fn joystick_reports_decode_and_normalize_in_order() {
    let (mut source, injector) = ChannelSource::new();
    source.seed_device(joystick_desc(7), Some(x_axis_blob()));
    let recorder = Recorder::default();

    let mut listener = Listener::start(move || Ok(source), recorder.clone(), Interest::joysticks())
        .expect("listener starts");
    assert_eq!(injector.blob_queries(), 1, "pre-warm resolved the seeded stick");

    let stick = DeviceId::from_raw(7);
    injector.send_report(stick, DeviceClass::Joystick, vec![0x00]);
    injector.send_report(stick, DeviceClass::Joystick, vec![0xff]);
    listener.close();

    assert_eq!(
        recorder.entries(),
        vec![
            "raw:Joystick:1".to_string(),
            "hid:[0]".to_string(),
            "joy:Some(-1.0)".to_string(),
            "raw:Joystick:1".to_string(),
            "hid:[255]".to_string(),
            "joy:Some(1.0)".to_string(),
        ]
    );
    assert_eq!(injector.blob_queries(), 1, "reports reuse the cached caps");
}

#[test]
fn reconnect_resolves_capabilities_fresh() {
    let (mut source, injector) = ChannelSource::new();
    source.seed_device(joystick_desc(7), Some(x_axis_blob()));
    let recorder = Recorder::default();

    let mut listener = Listener::start(move || Ok(source), recorder.clone(), Interest::joysticks())
        .expect("listener starts");

    let stick = DeviceId::from_raw(7);
    injector.send_report(stick, DeviceClass::Joystick, vec![0x80]);
    injector.remove_device(stick);
    // Reconnect reusing the same OS identity.
    injector.add_device(joystick_desc(7), Some(x_axis_blob()));
    injector.send_report(stick, DeviceClass::Joystick, vec![0x80]);
    listener.close();

    assert_eq!(
        injector.blob_queries(),
        2,
        "one pre-warm resolution plus one after reconnect"
    );
    let entries = recorder.entries();
    assert!(entries.contains(&format!("removed:{stick}")));
    assert!(entries.contains(&format!("arrived:{stick}")));
    assert_eq!(entries.iter().filter(|e| e.starts_with("joy:")).count(), 2);
}

#[test]
fn undecodable_device_still_delivers_raw_reports() {
    let (mut source, injector) = ChannelSource::new();
    // Seeded without a descriptor blob: capability resolution fails.
    source.seed_device(joystick_desc(9), None);
    let recorder = Recorder::default();

    let mut listener = Listener::start(move || Ok(source), recorder.clone(), Interest::joysticks())
        .expect("listener starts");

    injector.send_report(DeviceId::from_raw(9), DeviceClass::Joystick, vec![1, 2, 3]);
    injector.send_report(DeviceId::from_raw(9), DeviceClass::Joystick, vec![4, 5, 6]);
    listener.close();

    assert_eq!(
        recorder.entries(),
        vec!["raw:Joystick:3".to_string(), "raw:Joystick:3".to_string()],
        "raw flows, decode is suppressed"
    );
    assert_eq!(
        injector.blob_queries(),
        1,
        "failed resolution is not retried per report"
    );
}

#[test]
fn oversized_report_is_read_after_one_retry() {
    let (mut source, injector) = ChannelSource::new();
    source.seed_device(joystick_desc(7), Some(x_axis_blob()));
    let recorder = Recorder::default();

    let mut listener = Listener::start(move || Ok(source), recorder.clone(), Interest::joysticks())
        .expect("listener starts");

    // Larger than the pump's initial read buffer.
    let mut payload = vec![0u8; 5000];
    payload[0] = 0xff;
    injector.send_report(DeviceId::from_raw(7), DeviceClass::Joystick, payload);
    listener.close();

    assert_eq!(
        recorder.entries(),
        vec![
            "raw:Joystick:5000".to_string(),
            "hid:[255]".to_string(),
            "joy:Some(1.0)".to_string(),
        ]
    );
}

#[test]
fn classes_outside_the_interest_set_are_skipped() {
    let (source, injector) = ChannelSource::new();
    let recorder = Recorder::default();

    let mut listener = Listener::start(
        move || Ok(source),
        recorder.clone(),
        Interest::keyboard_and_mouse(),
    )
    .expect("listener starts");

    injector.send_report(DeviceId::from_raw(7), DeviceClass::Joystick, vec![0xff]);
    injector.send_report(DeviceId::from_raw(1), DeviceClass::Keyboard, keyboard_payload(0x20));
    listener.close();

    let entries = recorder.entries();
    assert!(
        entries.iter().all(|e| !e.contains("Joystick")),
        "joystick report leaked past the interest filter: {entries:?}"
    );
    assert_eq!(entries.len(), 2, "raw + keyboard for the in-interest report");
}

#[test]
fn dropping_the_listener_stops_the_pump() {
    let (source, injector) = ChannelSource::new();
    let recorder = Recorder::default();

    let listener = Listener::start(move || Ok(source), recorder.clone(), Interest::all())
        .expect("listener starts");
    injector.send_report(DeviceId::from_raw(1), DeviceClass::Keyboard, keyboard_payload(0x41));
    drop(listener);

    let frozen = recorder.entries();
    injector.send_report(DeviceId::from_raw(1), DeviceClass::Keyboard, keyboard_payload(0x42));
    assert_eq!(recorder.entries(), frozen);
}
