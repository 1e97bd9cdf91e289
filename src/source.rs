//! The collaborator boundary between the pump and the OS input subsystem.
//!
//! [`RawInputSource`] is everything the event pump needs from a platform:
//! device enumeration, notification subscription, a blocking FIFO wait,
//! report payload reads, and capability blobs. The Windows backend implements
//! it over Raw Input; [`ChannelSource`] implements it over an in-process
//! channel so the whole pipeline can be driven synthetically (tests, replay).
//!
//! Shutdown is routed through the same notification queue as input: the
//! [`PumpWaker`] returned by [`RawInputSource::waker`] injects a poison
//! notification that is guaranteed to wake [`RawInputSource::wait`], so the
//! pump's blocking loop always observes the stop request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use thiserror::Error;

use crate::device::{DeviceClass, DeviceDescription, DeviceId, DeviceTypeMask};

/// Opaque handle naming one pending report notification.
///
/// Only valid until the next [`RawInputSource::wait`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportHandle(pub(crate) u64);

/// One entry from the source's notification queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A report arrived; read it with [`RawInputSource::read_report`].
    Input(ReportHandle),
    DeviceArrived(DeviceId),
    DeviceRemoved(DeviceId),
    /// Poison injected by a [`PumpWaker`]; the pump exits its loop.
    Shutdown,
}

/// Result of a successful report read.
#[derive(Clone, Copy, Debug)]
pub struct ReportInfo {
    pub device: DeviceId,
    pub class: DeviceClass,
    /// Bytes written into the caller's buffer.
    pub len: usize,
}

#[derive(Debug, Error)]
pub enum ReadError {
    /// The caller's buffer cannot hold the payload. Retrying once with
    /// `required` bytes must succeed; this drives the pump's single
    /// probe-then-allocate retry.
    #[error("report needs {required} bytes")]
    InsufficientSize { required: usize },
    #[error("report read failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("subscription failed: {0}")]
    Subscribe(String),
    #[error("capability query failed: {0}")]
    Query(String),
    #[error("source initialization failed: {0}")]
    Init(String),
}

/// Send handle that wakes a blocked [`RawInputSource::wait`] with the
/// shutdown poison.
pub trait PumpWaker: Send {
    fn post_shutdown(&self);
}

/// Platform collaborator consumed by the event pump.
///
/// Implementations may be thread-affine (the Windows source owns a
/// message-only window); the pump constructs the source on its own thread and
/// never moves it.
pub trait RawInputSource {
    /// Currently connected devices matching `mask`. Used once at pump
    /// start-up to pre-warm the capability cache.
    fn enumerate(&mut self, mask: DeviceTypeMask) -> Vec<DeviceDescription>;

    /// Registers interest in input notifications for `mask`.
    fn subscribe(&mut self, mask: DeviceTypeMask) -> Result<(), SourceError>;

    fn unsubscribe(&mut self);

    /// A `Send` handle able to wake [`wait`](Self::wait) with
    /// [`Notification::Shutdown`].
    fn waker(&self) -> Box<dyn PumpWaker>;

    /// Blocks until the next notification. FIFO in arrival order.
    fn wait(&mut self) -> Notification;

    /// Copies the payload for `handle` into `buf`.
    fn read_report(&mut self, handle: ReportHandle, buf: &mut [u8]) -> Result<ReportInfo, ReadError>;

    /// The device's capability blob (its HID report descriptor bytes).
    fn capability_blob(&mut self, id: DeviceId) -> Result<Vec<u8>, SourceError>;
}

enum Injected {
    Report {
        device: DeviceId,
        class: DeviceClass,
        bytes: Vec<u8>,
    },
    Arrived(DeviceDescription, Option<Vec<u8>>),
    Removed(DeviceId),
    Shutdown,
}

/// In-process [`RawInputSource`] fed through a channel.
///
/// Everything injected is delivered in order; devices registered with a
/// descriptor blob resolve capabilities, devices without one resolve to
/// "undecodable". Capability queries are counted so tests can assert the
/// at-most-once resolution property.
pub struct ChannelSource {
    rx: Receiver<Injected>,
    tx: Sender<Injected>,
    devices: HashMap<DeviceId, (DeviceDescription, Option<Vec<u8>>)>,
    /// Payload for the most recently returned [`Notification::Input`].
    pending: Option<(DeviceId, DeviceClass, Vec<u8>)>,
    next_handle: u64,
    blob_queries: Arc<AtomicUsize>,
    fail_subscribe: bool,
    subscribed: bool,
}

/// Producer half paired with a [`ChannelSource`]. Cloneable and `Send`.
#[derive(Clone)]
pub struct ChannelInjector {
    tx: Sender<Injected>,
    blob_queries: Arc<AtomicUsize>,
}

impl ChannelSource {
    pub fn new() -> (Self, ChannelInjector) {
        let (tx, rx) = channel();
        let blob_queries = Arc::new(AtomicUsize::new(0));
        let source = Self {
            rx,
            tx: tx.clone(),
            devices: HashMap::new(),
            pending: None,
            next_handle: 0,
            blob_queries: Arc::clone(&blob_queries),
            fail_subscribe: false,
            subscribed: false,
        };
        let injector = ChannelInjector { tx, blob_queries };
        (source, injector)
    }

    /// Makes the next [`subscribe`](RawInputSource::subscribe) call fail, for
    /// exercising construction-time failure paths.
    pub fn fail_subscription(&mut self) {
        self.fail_subscribe = true;
    }

    /// Registers a device visible to enumeration before the pump starts.
    pub fn seed_device(&mut self, desc: DeviceDescription, blob: Option<Vec<u8>>) {
        self.devices.insert(desc.id, (desc, blob));
    }
}

impl RawInputSource for ChannelSource {
    fn enumerate(&mut self, mask: DeviceTypeMask) -> Vec<DeviceDescription> {
        self.devices
            .values()
            .filter(|(desc, _)| mask.contains(desc.class))
            .map(|(desc, _)| desc.clone())
            .collect()
    }

    fn subscribe(&mut self, _mask: DeviceTypeMask) -> Result<(), SourceError> {
        if self.fail_subscribe {
            return Err(SourceError::Subscribe("synthetic failure".into()));
        }
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
    }

    fn waker(&self) -> Box<dyn PumpWaker> {
        Box::new(ChannelWaker {
            tx: self.tx.clone(),
        })
    }

    fn wait(&mut self) -> Notification {
        loop {
            let injected = match self.rx.recv() {
                Ok(i) => i,
                // All producers gone: treat as shutdown so the pump cannot
                // block forever.
                Err(_) => return Notification::Shutdown,
            };
            match injected {
                Injected::Report {
                    device,
                    class,
                    bytes,
                } => {
                    self.pending = Some((device, class, bytes));
                    self.next_handle += 1;
                    return Notification::Input(ReportHandle(self.next_handle));
                }
                Injected::Arrived(desc, blob) => {
                    let id = desc.id;
                    self.devices.insert(id, (desc, blob));
                    return Notification::DeviceArrived(id);
                }
                Injected::Removed(id) => {
                    self.devices.remove(&id);
                    return Notification::DeviceRemoved(id);
                }
                Injected::Shutdown => return Notification::Shutdown,
            }
        }
    }

    fn read_report(&mut self, handle: ReportHandle, buf: &mut [u8]) -> Result<ReportInfo, ReadError> {
        if handle.0 != self.next_handle {
            return Err(ReadError::Failed("stale report handle".into()));
        }
        let Some((device, class, bytes)) = self.pending.as_ref() else {
            return Err(ReadError::Failed("no pending report".into()));
        };
        if buf.len() < bytes.len() {
            return Err(ReadError::InsufficientSize {
                required: bytes.len(),
            });
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(ReportInfo {
            device: *device,
            class: *class,
            len: bytes.len(),
        })
    }

    fn capability_blob(&mut self, id: DeviceId) -> Result<Vec<u8>, SourceError> {
        self.blob_queries.fetch_add(1, Ordering::SeqCst);
        match self.devices.get(&id) {
            Some((_, Some(blob))) => Ok(blob.clone()),
            Some((_, None)) => Err(SourceError::Query(format!(
                "device {id} has no descriptor"
            ))),
            None => Err(SourceError::Query(format!("unknown device {id}"))),
        }
    }
}

struct ChannelWaker {
    tx: Sender<Injected>,
}

impl PumpWaker for ChannelWaker {
    fn post_shutdown(&self) {
        // A closed channel already reads as shutdown on the other side.
        let _ = self.tx.send(Injected::Shutdown);
    }
}

impl ChannelInjector {
    /// Queues one raw report for delivery.
    pub fn send_report(&self, device: DeviceId, class: DeviceClass, bytes: Vec<u8>) {
        let _ = self.tx.send(Injected::Report {
            device,
            class,
            bytes,
        });
    }

    /// Announces a newly connected device, optionally with its capability
    /// blob.
    pub fn add_device(&self, desc: DeviceDescription, blob: Option<Vec<u8>>) {
        let _ = self.tx.send(Injected::Arrived(desc, blob));
    }

    pub fn remove_device(&self, id: DeviceId) {
        let _ = self.tx.send(Injected::Removed(id));
    }

    /// Number of capability-blob queries the paired source has served.
    pub fn blob_queries(&self) -> usize {
        self.blob_queries.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: u64, class: DeviceClass) -> DeviceDescription {
        DeviceDescription {
            id: DeviceId::from_raw(id),
            class,
            path: None,
            manufacturer: None,
            product: Some("test".into()),
            serial_number: None,
        }
    }

    #[test]
    fn reports_flow_in_order() {
        let (mut source, injector) = ChannelSource::new();
        let id = DeviceId::from_raw(9);
        injector.send_report(id, DeviceClass::Joystick, vec![1, 2, 3]);
        injector.send_report(id, DeviceClass::Joystick, vec![4]);

        let mut buf = [0u8; 8];
        let Notification::Input(h) = source.wait() else {
            panic!("expected input notification");
        };
        let info = source.read_report(h, &mut buf).unwrap();
        assert_eq!((info.len, &buf[..3]), (3, &[1u8, 2, 3][..]));

        let Notification::Input(h) = source.wait() else {
            panic!("expected input notification");
        };
        let info = source.read_report(h, &mut buf).unwrap();
        assert_eq!((info.len, buf[0]), (1, 4));
    }

    #[test]
    fn undersized_read_reports_required_size() {
        let (mut source, injector) = ChannelSource::new();
        let id = DeviceId::from_raw(9);
        injector.send_report(id, DeviceClass::GamePad, vec![0u8; 100]);

        let Notification::Input(h) = source.wait() else {
            panic!("expected input notification");
        };
        let mut small = [0u8; 10];
        match source.read_report(h, &mut small) {
            Err(ReadError::InsufficientSize { required }) => assert_eq!(required, 100),
            other => panic!("expected size error, got {other:?}"),
        }
        // The retry with the reported size succeeds.
        let mut big = vec![0u8; 100];
        assert!(source.read_report(h, &mut big).is_ok());
    }

    #[test]
    fn waker_wakes_wait() {
        let (mut source, _injector) = ChannelSource::new();
        let waker = source.waker();
        waker.post_shutdown();
        assert_eq!(source.wait(), Notification::Shutdown);
    }

    #[test]
    fn enumerate_respects_mask() {
        let (mut source, _injector) = ChannelSource::new();
        source.seed_device(desc(1, DeviceClass::Joystick), None);
        source.seed_device(desc(2, DeviceClass::Keyboard), None);

        let joysticks = source.enumerate(DeviceTypeMask::JOYSTICK);
        assert_eq!(joysticks.len(), 1);
        assert_eq!(joysticks[0].id, DeviceId::from_raw(1));
        assert_eq!(source.enumerate(DeviceTypeMask::ALL).len(), 2);
    }

    #[test]
    fn arrivals_and_removals_update_topology() {
        let (mut source, injector) = ChannelSource::new();
        injector.add_device(desc(5, DeviceClass::GamePad), Some(vec![0x05, 0x01]));
        assert_eq!(
            source.wait(),
            Notification::DeviceArrived(DeviceId::from_raw(5))
        );
        assert!(source.capability_blob(DeviceId::from_raw(5)).is_ok());

        injector.remove_device(DeviceId::from_raw(5));
        assert_eq!(
            source.wait(),
            Notification::DeviceRemoved(DeviceId::from_raw(5))
        );
        assert!(source.capability_blob(DeviceId::from_raw(5)).is_err());
        assert_eq!(injector.blob_queries(), 2);
    }
}
