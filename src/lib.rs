//! Raw HID input pump.
//!
//! A dedicated thread listens to the platform's raw input queue and delivers
//! keyboard, mouse, and joystick events to an [`InputHandler`] in arrival
//! order. Joystick-class reports are decoded against a per-device capability
//! cache and normalized into a fixed slot layout.
//!
//! ```no_run
//! use rawpump::{Interest, InputHandler, JoystickEvent, Listener};
//!
//! struct Printer;
//!
//! impl InputHandler for Printer {
//!     fn on_joystick(&mut self, event: &JoystickEvent) {
//!         println!("{:?}", event.state);
//!     }
//! }
//!
//! # fn main() -> Result<(), rawpump::ListenerError> {
//! let listener = Listener::start(
//!     || rawpump::backends::native_source(),
//!     Printer,
//!     Interest::joysticks(),
//! )?;
//! // input flows until the listener is dropped
//! drop(listener);
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod caps;
pub mod decode;
pub mod descriptor;
pub mod device;
pub mod event;
pub mod fixed;
pub mod joystick;
pub mod pump;
pub mod source;

pub use caps::{CapsStore, DeviceCaps};
pub use decode::{decode, DecodedButtons, DecodedValue, HidReport};
pub use descriptor::{parse_report_descriptor, ButtonPage, ReportLayout, ValueField};
pub use device::{DeviceClass, DeviceDescription, DeviceId, DeviceTypeMask};
pub use event::{KeyboardEvent, MouseEvent, RawReportEvent};
pub use joystick::{JoystickEvent, JoystickState};
pub use pump::{InputHandler, Interest, Listener, ListenerError};
pub use source::{ChannelInjector, ChannelSource, Notification, RawInputSource, SourceError};
