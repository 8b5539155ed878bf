//! # interflow
//!
//! A user-mode mediator between a kernel-level input filter driver and typed
//! subscription callbacks, for per-device keyboard and mouse interception on
//! Windows.
//!
//! ## Features
//!
//! - Per-device subscriptions: single key, whole keyboard, single button or
//!   wheel, whole mouse, absolute/relative movement
//! - Blocking: a subscription can consume matching strokes so they never
//!   reach the OS, including partial blocking of combined mouse strokes
//! - Canonical scan codes: E0/E1-extended keys and two-stroke sequences
//!   (Home, PrintScreen, Pause, ...) normalize to single stable codes
//! - Ordered dispatch: events for one subscription fire in stroke order on a
//!   dedicated queue, with an opt-in concurrent pool
//! - Injection: synthesize key, button, wheel, and movement events as if
//!   from hardware
//! - Device resolution by hardware identity (VID/PID or substring match)
//!
//! ## Quick Start
//!
//! ```no_run
//! use interflow::{FilterDriver, Hub, KeyEvent, SubscribeOptions};
//!
//! fn swallow_escape<D: FilterDriver>(hub: &Hub<D>) -> interflow::Result<()> {
//!     // Escape is canonical code 1. Blocked: the OS never sees it.
//!     hub.subscribe_key(1, 1, SubscribeOptions::new().block(true), |event: KeyEvent| {
//!         println!("swallowed escape ({:?})", event.state);
//!     })
//! }
//! ```
//!
//! On Windows, `Hub::open()` constructs a hub over the real driver:
//!
//! ```ignore
//! let hub = interflow::Hub::open()?;
//! let keyboard = hub.find_keyboard(0x046D, 0xC52B, 1)?;
//! hub.subscribe_keyboard(keyboard, SubscribeOptions::new(), |event| {
//!     println!("{event:?}");
//! })?;
//! ```
//!
//! ## Architecture
//!
//! The driver delivers raw strokes per device and forwards nothing from a
//! filtered device unless this process sends it back. The [`Hub`] owns the
//! subscription registry and a single poll thread that waits on the driver,
//! translates each stroke ([`scancode`], [`mouse`]), matches it against the
//! registry, hands callbacks to their dispatch queues, and forwards, blocks,
//! or rewrites the stroke. Registry changes disable the driver filter for
//! their duration, so a stroke can never arrive while the filtered set is
//! changing shape; dropping that invariant can lock out all input until
//! reboot.

pub mod channel;
pub mod driver;
pub mod error;
pub mod hub;
pub mod mouse;
pub mod registry;
pub mod resolver;
pub mod scancode;
pub mod stroke;

mod platform;
mod poll;
mod worker;

// Re-exports
pub use driver::FilterDriver;
pub use error::{Error, Result};
pub use hub::{Hub, HubOptions};
pub use mouse::{ButtonEvent, MouseButton, MoveTracker, block_button, button_events};
pub use registry::{ContextPhase, KeyEvent, MouseButtonEvent, MoveEvent, SubscribeOptions};
pub use resolver::{DeviceClass, DeviceInfo, parse_vid_pid};
pub use scancode::{CanonicalKey, KeyState, denormalize, normalize, normalize_single};
pub use stroke::{KeyStroke, MouseStroke, Stroke, WHEEL_DELTA, is_keyboard, is_mouse};

#[cfg(windows)]
pub use platform::InterceptionDriver;
