//! Prints every input event for 30 seconds.
//!
//! ```sh
//! cargo run --example watch
//! ```

use std::time::Duration;

use rawpump::{
    DeviceDescription, DeviceId, HidReport, InputHandler, Interest, JoystickEvent, KeyboardEvent,
    Listener, ListenerError, MouseEvent,
};

struct Printer;

impl InputHandler for Printer {
    fn on_keyboard(&mut self, event: &KeyboardEvent) {
        println!(
            "keyboard {:>6} vk={:#04x} sc={:#04x} {}",
            event.device,
            event.virtual_key_code(),
            event.scancode(),
            if event.key_is_down() { "down" } else { "up" },
        );
    }

    fn on_mouse(&mut self, event: &MouseEvent) {
        println!(
            "mouse    {:>6} dx={:+} dy={:+} wheel={:+}",
            event.device,
            event.last_x(),
            event.last_y(),
            event.wheel_delta(),
        );
    }

    fn on_hid_report(&mut self, event: &HidReport) {
        let values: Vec<(u16, i32)> = event.values.iter().map(|v| (v.usage, v.value)).collect();
        println!("hid      {:>6} {values:?}", event.device);
    }

    fn on_joystick(&mut self, event: &JoystickEvent) {
        let s = &event.state;
        println!(
            "joystick {:>6} x={:?} y={:?} hat={:?} buttons={:#018x}",
            event.device, s.x, s.y, s.hat0, s.buttons,
        );
    }

    fn on_device_arrived(&mut self, device: &DeviceDescription) {
        println!(
            "arrived  {:>6} {:?} {}",
            device.id,
            device.class,
            device.product.as_deref().unwrap_or("<unnamed>"),
        );
    }

    fn on_device_removed(&mut self, device: DeviceId) {
        println!("removed  {device:>6}");
    }
}

fn main() -> Result<(), ListenerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rawpump=debug".into()),
        )
        .init();

    let listener = Listener::start(rawpump::backends::native_source, Printer, Interest::all())?;
    println!("watching input for 30s, press keys or move a stick...");
    std::thread::sleep(Duration::from_secs(30));
    drop(listener);
    Ok(())
}
