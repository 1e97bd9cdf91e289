#![cfg(target_os = "windows")]

//! Windows Raw Input source.
//!
//! [`WindowsSource`] owns a message-only window and drains its message queue
//! from [`RawInputSource::wait`]. It is thread-affine: the window belongs to
//! the thread that created it, so the source must be constructed on the pump
//! thread (which [`Listener::start`](crate::pump::Listener::start) does when
//! handed a factory closure).
//!
//! Report payloads are copied out of `WM_INPUT` immediately; the Raw Input
//! buffer behind the message is only valid while the message is current.
//! Capability blobs come from `hidapi`, which re-reads the device's report
//! descriptor through the HID class driver.

use std::collections::{HashMap, VecDeque};
use std::ffi::CString;

use hidapi::HidApi;
use tracing::{debug, trace, warn};

use core::ffi::c_void;
use windows_sys::Win32::Foundation::{GetLastError, HANDLE, HWND, LPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::Input::{
    GetRawInputData, GetRawInputDeviceInfoW, GetRawInputDeviceList, RegisterRawInputDevices,
    RAWINPUTDEVICE, RAWINPUTDEVICELIST, RAWINPUTHEADER, RIDEV_DEVNOTIFY, RIDEV_INPUTSINK,
    RIDEV_REMOVE, RIDI_DEVICEINFO, RIDI_DEVICENAME, RID_DEVICE_INFO, RID_INPUT, RIM_TYPEHID,
    RIM_TYPEKEYBOARD, RIM_TYPEMOUSE,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, PostMessageW,
    RegisterClassW, HWND_MESSAGE, MSG, WM_APP, WM_INPUT, WM_INPUT_DEVICE_CHANGE, WNDCLASSW,
};

use crate::device::{DeviceClass, DeviceDescription, DeviceId, DeviceTypeMask};
use crate::source::{
    Notification, PumpWaker, RawInputSource, ReadError, ReportHandle, ReportInfo, SourceError,
};

/// Shutdown poison, posted by the waker into the window's message queue.
const WM_PUMP_SHUTDOWN: u32 = WM_APP + 0x0051;

const GIDC_ARRIVAL: usize = 1;
const GIDC_REMOVAL: usize = 2;

// HID generic-desktop usages for subscription pairs.
const USAGE_PAGE_GENERIC: u16 = 0x01;
const USAGE_MOUSE: u16 = 0x02;
const USAGE_JOYSTICK: u16 = 0x04;
const USAGE_GAMEPAD: u16 = 0x05;
const USAGE_KEYBOARD: u16 = 0x06;

struct PendingReport {
    device: DeviceId,
    class: DeviceClass,
    bytes: Vec<u8>,
}

/// Raw Input implementation of [`RawInputSource`]. Not `Send`: the message
/// window is bound to the creating thread.
pub struct WindowsSource {
    hwnd: HWND,
    /// Reports captured from `WM_INPUT` but not yet returned from `wait`.
    /// One message can carry several HID reports.
    queue: VecDeque<PendingReport>,
    /// Payload for the most recently returned [`Notification::Input`].
    current: Option<PendingReport>,
    next_handle: u64,
    /// Joystick/gamepad split per HID device handle, resolved once.
    classes: HashMap<u64, Option<DeviceClass>>,
    hid: Option<HidApi>,
    subscribed_mask: DeviceTypeMask,
}

impl WindowsSource {
    /// Creates the message-only window. Must run on the pump thread.
    pub fn new() -> Result<Self, SourceError> {
        let class_name = wide("rawpump-input");
        unsafe {
            let hinstance = GetModuleHandleW(core::ptr::null());
            let wc = WNDCLASSW {
                style: 0,
                lpfnWndProc: Some(DefWindowProcW),
                cbClsExtra: 0,
                cbWndExtra: 0,
                hInstance: hinstance,
                hIcon: core::ptr::null_mut(),
                hCursor: core::ptr::null_mut(),
                hbrBackground: core::ptr::null_mut(),
                lpszMenuName: core::ptr::null(),
                lpszClassName: class_name.as_ptr(),
            };
            // Re-registering an existing class fails; that is fine, the
            // first registration is still in effect.
            RegisterClassW(&wc);

            let hwnd = CreateWindowExW(
                0,
                class_name.as_ptr(),
                class_name.as_ptr(),
                0,
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                core::ptr::null_mut(),
                hinstance,
                core::ptr::null(),
            );
            if hwnd.is_null() {
                return Err(SourceError::Init(format!(
                    "message window creation failed (error {})",
                    GetLastError()
                )));
            }
            debug!("raw input message window created");
            Ok(Self {
                hwnd,
                queue: VecDeque::new(),
                current: None,
                next_handle: 0,
                classes: HashMap::new(),
                hid: None,
                subscribed_mask: DeviceTypeMask::NONE,
            })
        }
    }

    fn usage_pairs(mask: DeviceTypeMask) -> Vec<(u16, u16)> {
        let mut pairs = Vec::new();
        if mask.contains(DeviceClass::Mouse) {
            pairs.push((USAGE_PAGE_GENERIC, USAGE_MOUSE));
        }
        if mask.contains(DeviceClass::Keyboard) {
            pairs.push((USAGE_PAGE_GENERIC, USAGE_KEYBOARD));
        }
        if mask.contains(DeviceClass::Joystick) {
            pairs.push((USAGE_PAGE_GENERIC, USAGE_JOYSTICK));
        }
        if mask.contains(DeviceClass::GamePad) {
            pairs.push((USAGE_PAGE_GENERIC, USAGE_GAMEPAD));
        }
        pairs
    }

    /// Copies the `WM_INPUT` payload behind `lparam` into the pending queue.
    fn capture_input(&mut self, lparam: LPARAM) {
        let buf = match read_input_bytes(lparam) {
            Some(buf) => buf,
            None => return,
        };
        let hdr_sz = core::mem::size_of::<RAWINPUTHEADER>();
        if buf.len() < hdr_sz {
            return;
        }
        // RAWINPUT is variable-sized; only the header layout is fixed.
        let hdr: RAWINPUTHEADER =
            unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const RAWINPUTHEADER) };
        let device = DeviceId::from_raw(hdr.hDevice as usize as u64);
        let data = &buf[hdr_sz..];

        match hdr.dwType {
            RIM_TYPEKEYBOARD => {
                self.queue.push_back(PendingReport {
                    device,
                    class: DeviceClass::Keyboard,
                    bytes: data.to_vec(),
                });
            }
            RIM_TYPEMOUSE => {
                self.queue.push_back(PendingReport {
                    device,
                    class: DeviceClass::Mouse,
                    bytes: data.to_vec(),
                });
            }
            RIM_TYPEHID => {
                let Some(class) = self.hid_class(hdr.hDevice) else {
                    trace!(device = %device, "HID report from non-joystick usage ignored");
                    return;
                };
                // RAWHID: dwSizeHid, dwCount, then dwCount packed reports.
                if data.len() < 8 {
                    return;
                }
                let size_hid = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
                let count = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
                let reports = &data[8..];
                for i in 0..count {
                    let start = i * size_hid;
                    let Some(bytes) = reports.get(start..start + size_hid) else {
                        warn!(device = %device, "truncated RAWHID block, dropping remainder");
                        break;
                    };
                    self.queue.push_back(PendingReport {
                        device,
                        class,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    /// Joystick vs gamepad for a HID device handle, memoized. `None` for HID
    /// endpoints outside those two usages.
    fn hid_class(&mut self, hdevice: HANDLE) -> Option<DeviceClass> {
        let key = hdevice as usize as u64;
        if let Some(class) = self.classes.get(&key) {
            return *class;
        }
        let class = query_hid_usage(hdevice).and_then(|(page, usage)| {
            match (page, usage) {
                (USAGE_PAGE_GENERIC, USAGE_JOYSTICK) => Some(DeviceClass::Joystick),
                (USAGE_PAGE_GENERIC, USAGE_GAMEPAD) => Some(DeviceClass::GamePad),
                _ => None,
            }
        });
        self.classes.insert(key, class);
        class
    }

    fn device_class(&mut self, entry: &RAWINPUTDEVICELIST) -> Option<DeviceClass> {
        match entry.dwType {
            RIM_TYPEMOUSE => Some(DeviceClass::Mouse),
            RIM_TYPEKEYBOARD => Some(DeviceClass::Keyboard),
            RIM_TYPEHID => self.hid_class(entry.hDevice),
            _ => None,
        }
    }

    fn hid_api(&mut self) -> Option<&HidApi> {
        if self.hid.is_none() {
            match HidApi::new() {
                Ok(api) => self.hid = Some(api),
                Err(err) => {
                    warn!(%err, "hidapi initialization failed");
                    return None;
                }
            }
        }
        self.hid.as_ref()
    }

    /// Fills in manufacturer/product/serial strings for a HID device path.
    fn describe_hid(&mut self, path: &str, desc: &mut DeviceDescription) {
        let Ok(cpath) = CString::new(path) else {
            return;
        };
        let Some(api) = self.hid_api() else {
            return;
        };
        let Ok(device) = api.open_path(&cpath) else {
            trace!(path, "device path not openable for metadata");
            return;
        };
        desc.manufacturer = device.get_manufacturer_string().ok().flatten();
        desc.product = device.get_product_string().ok().flatten();
        desc.serial_number = device.get_serial_number_string().ok().flatten();
    }
}

impl RawInputSource for WindowsSource {
    fn enumerate(&mut self, mask: DeviceTypeMask) -> Vec<DeviceDescription> {
        let mut entries: Vec<RAWINPUTDEVICELIST> = Vec::new();
        unsafe {
            let mut count: u32 = 0;
            let entry_size = core::mem::size_of::<RAWINPUTDEVICELIST>() as u32;
            if GetRawInputDeviceList(core::ptr::null_mut(), &mut count, entry_size) == u32::MAX {
                warn!("device list size query failed");
                return Vec::new();
            }
            entries.resize(
                count as usize,
                RAWINPUTDEVICELIST {
                    hDevice: core::ptr::null_mut(),
                    dwType: 0,
                },
            );
            let got = GetRawInputDeviceList(entries.as_mut_ptr(), &mut count, entry_size);
            if got == u32::MAX {
                warn!("device list query failed");
                return Vec::new();
            }
            entries.truncate(got as usize);
        }

        let mut out = Vec::new();
        for entry in &entries {
            let Some(class) = self.device_class(entry) else {
                continue;
            };
            if !mask.contains(class) {
                continue;
            }
            let path = device_path(entry.hDevice);
            let mut desc = DeviceDescription {
                id: DeviceId::from_raw(entry.hDevice as usize as u64),
                class,
                path: path.clone(),
                manufacturer: None,
                product: None,
                serial_number: None,
            };
            if class.is_hid() {
                if let Some(path) = path.as_deref() {
                    self.describe_hid(path, &mut desc);
                }
            }
            out.push(desc);
        }
        out
    }

    fn subscribe(&mut self, mask: DeviceTypeMask) -> Result<(), SourceError> {
        let pairs = Self::usage_pairs(mask);
        if pairs.is_empty() {
            return Ok(());
        }
        let devices: Vec<RAWINPUTDEVICE> = pairs
            .iter()
            .map(|&(page, usage)| RAWINPUTDEVICE {
                usUsagePage: page,
                usUsage: usage,
                // INPUTSINK: deliver even without focus. DEVNOTIFY: post
                // WM_INPUT_DEVICE_CHANGE on arrivals/removals.
                dwFlags: RIDEV_INPUTSINK | RIDEV_DEVNOTIFY,
                hwndTarget: self.hwnd,
            })
            .collect();
        let ok = unsafe {
            RegisterRawInputDevices(
                devices.as_ptr(),
                devices.len() as u32,
                core::mem::size_of::<RAWINPUTDEVICE>() as u32,
            )
        };
        if ok == 0 {
            return Err(SourceError::Subscribe(format!(
                "RegisterRawInputDevices failed (error {})",
                unsafe { GetLastError() }
            )));
        }
        self.subscribed_mask = mask;
        debug!(pairs = devices.len(), "raw input subscription registered");
        Ok(())
    }

    fn unsubscribe(&mut self) {
        let pairs = Self::usage_pairs(self.subscribed_mask);
        if pairs.is_empty() {
            return;
        }
        let devices: Vec<RAWINPUTDEVICE> = pairs
            .iter()
            .map(|&(page, usage)| RAWINPUTDEVICE {
                usUsagePage: page,
                usUsage: usage,
                dwFlags: RIDEV_REMOVE,
                hwndTarget: core::ptr::null_mut(),
            })
            .collect();
        unsafe {
            RegisterRawInputDevices(
                devices.as_ptr(),
                devices.len() as u32,
                core::mem::size_of::<RAWINPUTDEVICE>() as u32,
            );
        }
        self.subscribed_mask = DeviceTypeMask::NONE;
    }

    fn waker(&self) -> Box<dyn PumpWaker> {
        Box::new(WindowsWaker {
            hwnd: self.hwnd as isize,
        })
    }

    fn wait(&mut self) -> Notification {
        loop {
            if let Some(pending) = self.queue.pop_front() {
                self.current = Some(pending);
                self.next_handle += 1;
                return Notification::Input(ReportHandle(self.next_handle));
            }

            let mut msg: MSG = unsafe { core::mem::zeroed() };
            let got = unsafe { GetMessageW(&mut msg, self.hwnd, 0, 0) };
            if got <= 0 {
                // WM_QUIT or a dead window; either way the pump is done.
                return Notification::Shutdown;
            }
            match msg.message {
                WM_PUMP_SHUTDOWN => return Notification::Shutdown,
                WM_INPUT => {
                    self.capture_input(msg.lParam);
                    // Raw Input requires the message to reach DefWindowProc
                    // so the OS can release the buffer.
                    unsafe { DefWindowProcW(msg.hwnd, msg.message, msg.wParam, msg.lParam) };
                }
                WM_INPUT_DEVICE_CHANGE => {
                    let id = DeviceId::from_raw(msg.lParam as usize as u64);
                    match msg.wParam {
                        GIDC_ARRIVAL => return Notification::DeviceArrived(id),
                        GIDC_REMOVAL => {
                            self.classes.remove(&id.as_raw());
                            return Notification::DeviceRemoved(id);
                        }
                        _ => {}
                    }
                }
                _ => {
                    unsafe { DispatchMessageW(&msg) };
                }
            }
        }
    }

    fn read_report(&mut self, handle: ReportHandle, buf: &mut [u8]) -> Result<ReportInfo, ReadError> {
        if handle.0 != self.next_handle {
            return Err(ReadError::Failed("stale report handle".into()));
        }
        let Some(pending) = self.current.as_ref() else {
            return Err(ReadError::Failed("no pending report".into()));
        };
        if buf.len() < pending.bytes.len() {
            return Err(ReadError::InsufficientSize {
                required: pending.bytes.len(),
            });
        }
        buf[..pending.bytes.len()].copy_from_slice(&pending.bytes);
        Ok(ReportInfo {
            device: pending.device,
            class: pending.class,
            len: pending.bytes.len(),
        })
    }

    fn capability_blob(&mut self, id: DeviceId) -> Result<Vec<u8>, SourceError> {
        let hdevice = id.as_raw() as usize as HANDLE;
        let path = device_path(hdevice)
            .ok_or_else(|| SourceError::Query(format!("no device path for {id}")))?;
        let cpath = CString::new(path)
            .map_err(|_| SourceError::Query(format!("device path for {id} is not a C string")))?;
        let api = self
            .hid_api()
            .ok_or_else(|| SourceError::Query("hidapi unavailable".into()))?;
        let device = api
            .open_path(&cpath)
            .map_err(|err| SourceError::Query(format!("open failed for {id}: {err}")))?;
        let mut buf = vec![0u8; 4096];
        let len = device
            .get_report_descriptor(&mut buf)
            .map_err(|err| SourceError::Query(format!("descriptor read failed for {id}: {err}")))?;
        buf.truncate(len);
        Ok(buf)
    }
}

impl Drop for WindowsSource {
    fn drop(&mut self) {
        unsafe {
            DestroyWindow(self.hwnd);
        }
    }
}

struct WindowsWaker {
    /// Window handle as an integer; `PostMessageW` to a window from another
    /// thread is explicitly supported.
    hwnd: isize,
}

// The handle is only ever used with PostMessageW, which is thread-safe.
unsafe impl Send for WindowsWaker {}

impl PumpWaker for WindowsWaker {
    fn post_shutdown(&self) {
        unsafe {
            PostMessageW(self.hwnd as HWND, WM_PUMP_SHUTDOWN, 0, 0);
        }
    }
}

/// Copies the raw input payload behind a `WM_INPUT` lparam.
fn read_input_bytes(lparam: LPARAM) -> Option<Vec<u8>> {
    unsafe {
        let mut size: u32 = 0;
        let header_size = core::mem::size_of::<RAWINPUTHEADER>() as u32;
        let r0 = GetRawInputData(
            lparam as _,
            RID_INPUT,
            core::ptr::null_mut(),
            &mut size,
            header_size,
        );
        if r0 == u32::MAX || size == 0 {
            return None;
        }
        let mut buf = vec![0u8; size as usize];
        let r1 = GetRawInputData(
            lparam as _,
            RID_INPUT,
            buf.as_mut_ptr() as *mut c_void,
            &mut size,
            header_size,
        );
        if r1 == u32::MAX {
            return None;
        }
        Some(buf)
    }
}

/// Device interface path for a handle (`RIDI_DEVICENAME`).
fn device_path(hdevice: HANDLE) -> Option<String> {
    unsafe {
        let mut size: u32 = 0;
        let r0 = GetRawInputDeviceInfoW(hdevice, RIDI_DEVICENAME, core::ptr::null_mut(), &mut size);
        if r0 == u32::MAX || size == 0 {
            return None;
        }
        let mut wide = vec![0u16; size as usize];
        let r1 = GetRawInputDeviceInfoW(
            hdevice,
            RIDI_DEVICENAME,
            wide.as_mut_ptr() as *mut c_void,
            &mut size,
        );
        if r1 == u32::MAX {
            return None;
        }
        while wide.last() == Some(&0) {
            wide.pop();
        }
        Some(String::from_utf16_lossy(&wide))
    }
}

/// Top-level usage page and usage for a HID device handle.
fn query_hid_usage(hdevice: HANDLE) -> Option<(u16, u16)> {
    unsafe {
        let mut info: RID_DEVICE_INFO = core::mem::zeroed();
        info.cbSize = core::mem::size_of::<RID_DEVICE_INFO>() as u32;
        let mut size = info.cbSize;
        let r = GetRawInputDeviceInfoW(
            hdevice,
            RIDI_DEVICEINFO,
            &mut info as *mut _ as *mut c_void,
            &mut size,
        );
        if r == u32::MAX || info.dwType != RIM_TYPEHID {
            return None;
        }
        let hid = info.Anonymous.hid;
        Some((hid.usUsagePage, hid.usUsage))
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
