//! Subscription registry data model: subscriber-facing event types, the
//! closed set of callback signatures, and the fixed-shape per-device record.

use std::collections::HashMap;
use std::sync::Arc;

use crate::mouse::MouseButton;
use crate::scancode::KeyState;
use crate::worker::Worker;

/// A canonical key event delivered to key subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Device the stroke originated from.
    pub device: i32,
    /// Canonical key code.
    pub code: u16,
    /// Pressed or released.
    pub state: KeyState,
}

/// A button or wheel event delivered to mouse subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseButtonEvent {
    /// Device the stroke originated from.
    pub device: i32,
    /// Which button changed.
    pub button: MouseButton,
    /// 1 = pressed, 0 = released; for wheels, the rotation sign (-1 or 1).
    pub state: i8,
}

/// A movement event delivered to movement-channel subscriptions. Whether
/// the coordinates are absolute or relative is implied by the channel the
/// subscription was registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveEvent {
    /// Device the stroke originated from.
    pub device: i32,
    /// X coordinate or delta.
    pub x: i32,
    /// Y coordinate or delta.
    pub y: i32,
}

/// Which side of a forwarded stroke a context callback is observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPhase {
    /// About to forward an unsubscribed stroke.
    Before,
    /// The stroke has just been forwarded.
    After,
}

/// Callback invoked for canonical key events.
pub type KeyCallback = Arc<dyn Fn(KeyEvent) + Send + Sync>;
/// Callback invoked for mouse button/wheel events.
pub type ButtonCallback = Arc<dyn Fn(MouseButtonEvent) + Send + Sync>;
/// Callback invoked for movement events.
pub type MoveCallback = Arc<dyn Fn(MoveEvent) + Send + Sync>;
/// Callback wrapped around every forwarded unsubscribed stroke.
pub type ContextCallback = Arc<dyn Fn(i32, ContextPhase) + Send + Sync>;

/// The closed set of subscription callback shapes. The dispatch loop picks
/// the invocation by matching on the subscription kind; there is no untyped
/// variadic path.
pub(crate) enum Callback {
    Key(KeyCallback),
    Button(ButtonCallback),
    Move(MoveCallback),
}

/// Options attached to a subscription.
///
/// Changing options on an existing subscription is a remove-then-add, never
/// an in-place mutation, so in-flight dispatch can never observe a
/// half-updated subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Consume matching strokes instead of forwarding them to the OS.
    pub block: bool,
    /// Dispatch on the shared unordered pool instead of a dedicated
    /// per-key FIFO queue.
    pub concurrent: bool,
}

impl SubscribeOptions {
    /// Non-blocking, ordered dispatch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block flag.
    pub fn block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    /// Set the concurrent flag.
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }
}

/// One live subscription. The ordered dispatch queue exists iff the
/// subscription is non-concurrent, and is owned exclusively by this entry:
/// it is created when the subscription is added and drained/joined when the
/// subscription is removed.
pub(crate) struct Subscription {
    pub(crate) block: bool,
    pub(crate) callback: Callback,
    pub(crate) worker: Option<Worker>,
}

impl Subscription {
    pub(crate) fn new(options: SubscribeOptions, callback: Callback, label: String) -> Self {
        let worker = if options.concurrent {
            None
        } else {
            Some(Worker::new(label))
        };
        Self {
            block: options.block,
            callback,
            worker,
        }
    }
}

/// Fixed-shape per-device subscription record: single-key/button map plus
/// one explicit slot per remaining subscription kind. Absolute and relative
/// movement get their own fields rather than aliasing onto fake key codes.
#[derive(Default)]
pub(crate) struct DeviceState {
    /// Single-key subscriptions, keyed by canonical key code for keyboards
    /// and by button index for mice.
    pub(crate) keys: HashMap<u16, Subscription>,
    /// Whole-device ("all keys/buttons") subscription.
    pub(crate) all: Option<Subscription>,
    /// Absolute movement channel (mice only).
    pub(crate) move_absolute: Option<Subscription>,
    /// Relative movement channel (mice only).
    pub(crate) move_relative: Option<Subscription>,
    /// Context callback wrapping forwarded unsubscribed strokes.
    pub(crate) context: Option<ContextCallback>,
}

impl DeviceState {
    /// True iff any of the four subscription kinds is present. This is the
    /// exact condition for the device being in the filtered set.
    pub(crate) fn has_any(&self) -> bool {
        !self.keys.is_empty()
            || self.all.is_some()
            || self.move_absolute.is_some()
            || self.move_relative.is_some()
            || self.context.is_some()
    }
}
