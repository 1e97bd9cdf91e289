//! The event pump and its listener lifecycle handle.
//!
//! One dedicated thread owns the source, the capability cache, and the read
//! buffer. Callbacks run inline on that thread in strict notification order,
//! so a handler observes a consistent, single-threaded view of the device
//! topology. Stopping is cooperative: the listener posts a shutdown poison
//! through the source's waker and joins the thread, which guarantees no
//! callback fires after [`Listener::close`] (or drop) returns.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::caps::CapsStore;
use crate::decode::{decode, HidReport};
use crate::device::{DeviceClass, DeviceDescription, DeviceId, DeviceTypeMask};
use crate::event::{KeyboardEvent, MouseEvent, RawReportEvent};
use crate::joystick::JoystickEvent;
use crate::source::{Notification, PumpWaker, RawInputSource, ReadError, SourceError};

/// Initial read buffer size; reports larger than this trigger one
/// probe-then-allocate retry.
const READ_BUF_LEN: usize = 4096;

/// Receiver half of the pump's callback surface.
///
/// All methods default to no-ops so a handler implements only what it wants.
/// Every method runs on the pump thread; blocking here blocks all input
/// delivery.
#[allow(unused_variables)]
pub trait InputHandler: Send {
    /// Every report payload before any decoding, regardless of class.
    fn on_raw_report(&mut self, event: &RawReportEvent<'_>) {}

    fn on_keyboard(&mut self, event: &KeyboardEvent) {}

    fn on_mouse(&mut self, event: &MouseEvent) {}

    /// Decoded HID report for joystick-class devices with resolved
    /// capabilities.
    fn on_hid_report(&mut self, event: &HidReport) {}

    /// Normalized joystick state, derived from the decoded report.
    fn on_joystick(&mut self, event: &JoystickEvent) {}

    fn on_device_arrived(&mut self, device: &DeviceDescription) {}

    fn on_device_removed(&mut self, device: DeviceId) {}
}

/// Which device classes a listener subscribes to. Work for classes outside
/// the interest set is skipped entirely, not filtered after the fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interest {
    pub mask: DeviceTypeMask,
}

impl Interest {
    pub fn all() -> Self {
        Self {
            mask: DeviceTypeMask::ALL,
        }
    }

    pub fn joysticks() -> Self {
        Self {
            mask: DeviceTypeMask::JOYSTICK | DeviceTypeMask::GAMEPAD,
        }
    }

    pub fn keyboard_and_mouse() -> Self {
        Self {
            mask: DeviceTypeMask::KEYBOARD | DeviceTypeMask::MOUSE,
        }
    }
}

impl Default for Interest {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("input source error: {0}")]
    Source(#[from] SourceError),
    #[error("pump thread could not be spawned: {0}")]
    Spawn(std::io::Error),
    #[error("pump thread exited before start-up completed")]
    StartupAborted,
}

/// The pump proper: owns the source, cache, and buffer for one listener.
/// Lives entirely on the pump thread.
struct Pump<S: RawInputSource, H: InputHandler> {
    source: S,
    handler: H,
    interest: Interest,
    caps: CapsStore,
    buf: Vec<u8>,
}

impl<S: RawInputSource, H: InputHandler> Pump<S, H> {
    fn new(source: S, handler: H, interest: Interest) -> Self {
        Self {
            source,
            handler,
            interest,
            caps: CapsStore::new(),
            buf: vec![0u8; READ_BUF_LEN],
        }
    }

    /// Subscribes and pre-warms the capability cache from the current device
    /// topology. Runs before the first `wait`.
    fn register(&mut self) -> Result<Box<dyn PumpWaker>, SourceError> {
        self.source.subscribe(self.interest.mask)?;
        let devices = self.source.enumerate(self.interest.mask);
        debug!(count = devices.len(), "pump registered, pre-warming caps");
        for desc in &devices {
            if desc.class.is_hid() {
                self.caps.resolve(desc.id, &mut self.source);
            }
        }
        Ok(self.source.waker())
    }

    /// Blocks on the source until shutdown poison arrives.
    fn run(&mut self) {
        debug!("pump listening");
        loop {
            match self.source.wait() {
                Notification::Shutdown => {
                    debug!("pump observed shutdown poison");
                    break;
                }
                Notification::DeviceArrived(id) => self.handle_arrival(id),
                Notification::DeviceRemoved(id) => {
                    self.caps.evict(id);
                    self.handler.on_device_removed(id);
                }
                Notification::Input(handle) => self.handle_input(handle),
            }
        }
        self.source.unsubscribe();
        debug!("pump stopped");
    }

    fn handle_arrival(&mut self, id: DeviceId) {
        // A reconnect may reuse the OS identity; resolve against the device
        // as it is now, never against what it used to be.
        self.caps.evict(id);
        let described = self
            .source
            .enumerate(self.interest.mask)
            .into_iter()
            .find(|d| d.id == id);
        let Some(desc) = described else {
            trace!(device = %id, "arrival outside interest set ignored");
            return;
        };
        if desc.class.is_hid() {
            self.caps.resolve(id, &mut self.source);
        }
        self.handler.on_device_arrived(&desc);
    }

    fn handle_input(&mut self, handle: crate::source::ReportHandle) {
        let at = Instant::now();
        let info = match self.source.read_report(handle, &mut self.buf) {
            Ok(info) => info,
            Err(ReadError::InsufficientSize { required }) => {
                // The one allocation on the hot path: grow exactly once and
                // retry; the larger buffer is kept for subsequent reports.
                trace!(required, "growing read buffer");
                self.buf.resize(required, 0);
                match self.source.read_report(handle, &mut self.buf) {
                    Ok(info) => info,
                    Err(err) => {
                        warn!(%err, "report read failed after resize, dropping");
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(%err, "report read failed, dropping");
                return;
            }
        };

        if !self.interest.mask.contains(info.class) {
            return;
        }

        let Self {
            source,
            handler,
            caps,
            buf,
            ..
        } = self;
        let payload = &buf[..info.len];

        handler.on_raw_report(&RawReportEvent {
            device: info.device,
            class: info.class,
            at,
            payload,
        });

        match info.class {
            DeviceClass::Keyboard => match KeyboardEvent::parse(info.device, at, payload) {
                Some(ev) => handler.on_keyboard(&ev),
                None => debug!(device = %info.device, len = info.len, "short keyboard payload dropped"),
            },
            DeviceClass::Mouse => match MouseEvent::parse(info.device, at, payload) {
                Some(ev) => handler.on_mouse(&ev),
                None => debug!(device = %info.device, len = info.len, "short mouse payload dropped"),
            },
            DeviceClass::Joystick | DeviceClass::GamePad => {
                let Some(device_caps) = caps.resolve(info.device, source) else {
                    trace!(device = %info.device, "undecodable device, raw only");
                    return;
                };
                let report = decode(payload, device_caps, info.device, at);
                handler.on_hid_report(&report);
                handler.on_joystick(&JoystickEvent::from_report(&report));
            }
        }
    }
}

/// Outcome of the pump thread's start-up phase, reported back to
/// [`Listener::start`] before the caller returns.
enum Startup {
    Ready(Box<dyn PumpWaker>),
    Failed(SourceError),
}

/// Running pump lifecycle handle.
///
/// Closing (or dropping) posts the shutdown poison and joins the pump thread,
/// so no callback runs after either returns.
pub struct Listener {
    waker: Option<Box<dyn PumpWaker>>,
    thread: Option<JoinHandle<()>>,
}

impl Listener {
    /// Spawns the pump thread and blocks until subscription either succeeds
    /// or fails. The source is constructed by `make_source` *on the pump
    /// thread*, so thread-affine sources are fine.
    pub fn start<S, F, H>(make_source: F, handler: H, interest: Interest) -> Result<Self, ListenerError>
    where
        S: RawInputSource,
        F: FnOnce() -> Result<S, SourceError> + Send + 'static,
        H: InputHandler + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Startup>();

        let thread = thread::Builder::new()
            .name("rawpump".into())
            .spawn(move || {
                let source = match make_source() {
                    Ok(source) => source,
                    Err(err) => {
                        let _ = ready_tx.send(Startup::Failed(err));
                        return;
                    }
                };
                let mut pump = Pump::new(source, handler, interest);
                match pump.register() {
                    Ok(waker) => {
                        let _ = ready_tx.send(Startup::Ready(waker));
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Startup::Failed(err));
                        return;
                    }
                }
                pump.run();
            })
            .map_err(ListenerError::Spawn)?;

        match ready_rx.recv() {
            Ok(Startup::Ready(waker)) => Ok(Self {
                waker: Some(waker),
                thread: Some(thread),
            }),
            Ok(Startup::Failed(err)) => {
                // The thread has already returned; reap it.
                let _ = thread.join();
                Err(err.into())
            }
            Err(_) => {
                let _ = thread.join();
                Err(ListenerError::StartupAborted)
            }
        }
    }

    /// Stops the pump and waits for the thread to finish. Idempotent.
    pub fn close(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.post_shutdown();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("pump thread panicked");
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ChannelSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counter {
        raw: Arc<AtomicUsize>,
    }

    impl InputHandler for Counter {
        fn on_raw_report(&mut self, _event: &RawReportEvent<'_>) {
            self.raw.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn start_fails_when_subscription_fails() {
        let result = Listener::start(
            || {
                let (mut source, _injector) = ChannelSource::new();
                source.fail_subscription();
                Ok(source)
            },
            Counter::default(),
            Interest::all(),
        );
        assert!(matches!(
            result,
            Err(ListenerError::Source(SourceError::Subscribe(_)))
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let (source, _injector) = ChannelSource::new();
        let mut listener =
            Listener::start(move || Ok(source), Counter::default(), Interest::all())
                .expect("listener starts");
        listener.close();
        listener.close();
    }
}
