//! Windows binding to the interception filter driver.
//!
//! Thin FFI layer over the user-mode interception library (`interception.dll`
//! backed by the kernel driver). All translation and policy lives above the
//! [`FilterDriver`] trait; this module only marshals strokes across the C
//! boundary.

use std::ffi::c_void;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::driver::FilterDriver;
use crate::error::{Error, Result};
use crate::stroke::{self, KeyStroke, MAX_DEVICES, MouseStroke, Stroke};

type RawContext = *mut c_void;
type RawDevice = i32;
type RawFilter = u16;
type RawPredicate = extern "C" fn(device: RawDevice) -> i32;

const FILTER_NONE: RawFilter = 0x0000;
const FILTER_ALL: RawFilter = 0xFFFF;

#[repr(C)]
#[derive(Clone, Copy)]
struct RawKeyStroke {
    code: u16,
    state: u16,
    information: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawMouseStroke {
    state: u16,
    flags: u16,
    rolling: i16,
    x: i32,
    y: i32,
    information: u32,
}

/// The driver's on-wire stroke: a buffer the size of the largest variant.
/// Which variant is live is decided by the device ID's class.
#[repr(C)]
#[derive(Clone, Copy)]
union RawStroke {
    key: RawKeyStroke,
    mouse: RawMouseStroke,
}

impl RawStroke {
    fn zeroed() -> Self {
        RawStroke {
            mouse: RawMouseStroke {
                state: 0,
                flags: 0,
                rolling: 0,
                x: 0,
                y: 0,
                information: 0,
            },
        }
    }
}

#[link(name = "interception")]
unsafe extern "C" {
    fn interception_create_context() -> RawContext;
    fn interception_destroy_context(context: RawContext);
    fn interception_set_filter(context: RawContext, predicate: RawPredicate, filter: RawFilter);
    fn interception_send(
        context: RawContext,
        device: RawDevice,
        stroke: *const RawStroke,
        nstroke: u32,
    ) -> i32;
    fn interception_receive(
        context: RawContext,
        device: RawDevice,
        stroke: *mut RawStroke,
        nstroke: u32,
    ) -> i32;
    fn interception_wait_with_timeout(context: RawContext, milliseconds: u32) -> RawDevice;
    fn interception_get_hardware_id(
        context: RawContext,
        device: RawDevice,
        hardware_id_buffer: *mut c_void,
        buffer_size: u32,
    ) -> u32;
}

// interception_set_filter walks every device and consults a capture-free C
// predicate, so the desired per-device answers are staged in a process-wide
// table the predicates read back. The table (and the two-call update around
// it) is serialized by FILTER_LOCK; one driver context per process.
static FILTER_TABLE: [AtomicBool; MAX_DEVICES as usize] =
    [const { AtomicBool::new(false) }; MAX_DEVICES as usize];
static FILTER_LOCK: Mutex<()> = Mutex::new(());

extern "C" fn marked(device: RawDevice) -> i32 {
    let in_range = (1..=MAX_DEVICES).contains(&device);
    (in_range && FILTER_TABLE[(device - 1) as usize].load(Ordering::SeqCst)) as i32
}

extern "C" fn unmarked(device: RawDevice) -> i32 {
    let in_range = (1..=MAX_DEVICES).contains(&device);
    (in_range && !FILTER_TABLE[(device - 1) as usize].load(Ordering::SeqCst)) as i32
}

fn encode(device: i32, strokes: &[Stroke]) -> Result<Vec<RawStroke>> {
    strokes
        .iter()
        .map(|s| match (s, stroke::is_keyboard(device)) {
            (Stroke::Key(key), true) => Ok(RawStroke {
                key: RawKeyStroke {
                    code: key.code,
                    state: key.state,
                    information: key.information,
                },
            }),
            (Stroke::Mouse(mouse), false) if stroke::is_mouse(device) => Ok(RawStroke {
                mouse: RawMouseStroke {
                    state: mouse.state,
                    flags: mouse.flags,
                    rolling: mouse.rolling,
                    x: mouse.x,
                    y: mouse.y,
                    information: mouse.information,
                },
            }),
            _ => Err(Error::InvalidDevice(
                device,
                "stroke variant does not match the device class",
            )),
        })
        .collect()
}

fn decode(device: i32, raw: &RawStroke) -> Stroke {
    if stroke::is_keyboard(device) {
        // SAFETY: keyboard device IDs carry key strokes on the wire.
        let key = unsafe { raw.key };
        Stroke::Key(KeyStroke {
            code: key.code,
            state: key.state,
            information: key.information,
        })
    } else {
        // SAFETY: every non-keyboard ID the driver reports is a mouse.
        let mouse = unsafe { raw.mouse };
        Stroke::Mouse(MouseStroke {
            state: mouse.state,
            flags: mouse.flags,
            rolling: mouse.rolling,
            x: mouse.x,
            y: mouse.y,
            information: mouse.information,
        })
    }
}

/// [`FilterDriver`] backed by the real interception driver.
///
/// Owns the driver context for its lifetime. Create one per process; the
/// driver-level filter is process-global state.
pub struct InterceptionDriver {
    context: RawContext,
}

// SAFETY: the interception user-mode library is documented thread-safe for
// concurrent calls on one context, and the context pointer itself is only
// freed in Drop after exclusive ownership is regained.
unsafe impl Send for InterceptionDriver {}
unsafe impl Sync for InterceptionDriver {}

impl InterceptionDriver {
    /// Create a driver context. Fails when the kernel driver is not
    /// installed or the service is not running.
    pub fn new() -> Result<Self> {
        // SAFETY: no preconditions; a null return is the library's failure
        // signal and is checked below.
        let context = unsafe { interception_create_context() };
        if context.is_null() {
            return Err(Error::Driver(
                "could not create driver context; is the interception driver installed?".into(),
            ));
        }
        log::debug!("driver context created");
        Ok(Self { context })
    }
}

impl FilterDriver for InterceptionDriver {
    fn set_filter(&self, predicate: &(dyn Fn(i32) -> bool + Sync)) -> Result<()> {
        let _guard = FILTER_LOCK.lock().unwrap();
        for device in 1..=MAX_DEVICES {
            FILTER_TABLE[(device - 1) as usize].store(predicate(device), Ordering::SeqCst);
        }
        // Clear the dropped devices before arming the marked ones, so no
        // device is ever filtered by a stale table entry.
        // SAFETY: context is live for &self; the predicates only read the
        // static table.
        unsafe {
            interception_set_filter(self.context, unmarked, FILTER_NONE);
            interception_set_filter(self.context, marked, FILTER_ALL);
        }
        Ok(())
    }

    fn send(&self, device: i32, strokes: &[Stroke]) -> Result<usize> {
        let raw = encode(device, strokes)?;
        // SAFETY: raw is a live, correctly sized buffer for its length.
        let sent =
            unsafe { interception_send(self.context, device, raw.as_ptr(), raw.len() as u32) };
        if sent < 0 {
            return Err(Error::SendFailed(device));
        }
        Ok(sent as usize)
    }

    fn receive(&self, device: i32, max: usize) -> Result<Vec<Stroke>> {
        let mut raw = vec![RawStroke::zeroed(); max];
        // SAFETY: raw is a live, writable buffer for `max` strokes.
        let read = unsafe {
            interception_receive(self.context, device, raw.as_mut_ptr(), max as u32)
        };
        if read < 0 {
            return Err(Error::Driver(format!(
                "receive from device {device} failed"
            )));
        }
        Ok(raw[..read as usize]
            .iter()
            .map(|r| decode(device, r))
            .collect())
    }

    fn wait(&self, timeout: Duration) -> Result<Option<i32>> {
        let millis = timeout.as_millis().min(u128::from(u32::MAX)) as u32;
        // SAFETY: context is live for &self.
        let device = unsafe { interception_wait_with_timeout(self.context, millis) };
        if (1..=MAX_DEVICES).contains(&device) {
            Ok(Some(device))
        } else {
            Ok(None)
        }
    }

    fn hardware_id(&self, device: i32) -> Result<Option<String>> {
        // 500 wide characters, matching the buffer the driver samples use.
        let mut buffer = [0u16; 500];
        // SAFETY: buffer size is passed in bytes and matches the allocation.
        let bytes = unsafe {
            interception_get_hardware_id(
                self.context,
                device,
                buffer.as_mut_ptr().cast(),
                (buffer.len() * 2) as u32,
            )
        };
        if bytes == 0 {
            return Ok(None);
        }
        let units = (bytes as usize / 2).min(buffer.len());
        let id = String::from_utf16_lossy(&buffer[..units]);
        let id = id.trim_end_matches('\0');
        if id.is_empty() {
            Ok(None)
        } else {
            Ok(Some(id.to_string()))
        }
    }
}

impl Drop for InterceptionDriver {
    fn drop(&mut self) {
        // SAFETY: context was created by interception_create_context and is
        // not used after this point.
        unsafe { interception_destroy_context(self.context) };
        log::debug!("driver context destroyed");
    }
}
