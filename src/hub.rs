//! The owning service object: subscription surface, filter controller, and
//! dispatch-loop lifecycle.
//!
//! A [`Hub`] holds everything that was conceptually "global" (the
//! per-device subscription registry, the filtered-device set, the shared
//! concurrent pool, and the poll thread) behind one explicitly constructed
//! and explicitly shut down value.
//!
//! Every registry mutation follows the same safety-critical sequence, fully
//! serialized across devices by a single control lock:
//!
//! 1. disable the driver-level filter (so no stroke is delivered mid-change);
//! 2. mutate the device's subscription record;
//! 3. recompute whether the device stays in the filtered set;
//! 4. re-enable the filter iff any device anywhere is filtered;
//! 5. run the dispatch loop iff the filter is enabled.
//!
//! Steps 4 and 5 run even when the mutation itself is rejected, so the
//! filter can never be left enabled with no consumer, the one failure mode
//! that locks out all keyboard and mouse input until reboot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::driver::FilterDriver;
use crate::error::{Error, Result};
use crate::mouse::MouseButton;
use crate::poll;
use crate::registry::{
    Callback, ContextPhase, DeviceState, KeyEvent, MouseButtonEvent, MoveEvent, Subscription,
    SubscribeOptions,
};
use crate::resolver::{self, DeviceClass, DeviceInfo};
use crate::scancode::{self, KeyState};
use crate::stroke::{
    self, KeyStroke, MAX_DEVICES, MouseStroke, Stroke, WHEEL_DELTA, mouse_state,
};
use crate::worker::Pool;

/// Tuning knobs for the hub. The defaults suit interactive input.
#[derive(Debug, Clone)]
pub struct HubOptions {
    /// Upper bound on one driver wait. Bounded (tens of milliseconds) so a
    /// stop request is noticed promptly and buffered strokes drain before
    /// the loop exits; never unbounded.
    pub wait_timeout: Duration,
    /// Maximum strokes pulled per receive call.
    pub receive_batch: usize,
    /// Thread count of the shared pool backing concurrent subscriptions.
    pub pool_threads: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(10),
            receive_batch: 32,
            pool_threads: 4,
        }
    }
}

/// State shared between the hub and the poll thread.
pub(crate) struct Shared<D> {
    pub(crate) driver: D,
    pub(crate) options: HubOptions,
    pub(crate) pool: Pool,
    devices: Vec<Mutex<DeviceState>>,
    filtered: Vec<AtomicBool>,
}

impl<D> Shared<D> {
    pub(crate) fn device_state(&self, device: i32) -> &Mutex<DeviceState> {
        &self.devices[(device - 1) as usize]
    }

    pub(crate) fn is_filtered(&self, device: i32) -> bool {
        (1..=MAX_DEVICES).contains(&device)
            && self.filtered[(device - 1) as usize].load(Ordering::SeqCst)
    }

    fn set_filtered(&self, device: i32, filtered: bool) {
        self.filtered[(device - 1) as usize].store(filtered, Ordering::SeqCst);
    }

    fn any_filtered(&self) -> bool {
        self.filtered.iter().any(|f| f.load(Ordering::SeqCst))
    }
}

struct PollHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct Control {
    /// Master switch; when false the filter stays off regardless of
    /// subscriptions.
    enabled: bool,
    shut_down: bool,
    poll: Option<PollHandle>,
}

/// User-mode mediator between the kernel filter driver and typed
/// subscription callbacks.
///
/// Generic over the [`FilterDriver`] boundary; on Windows,
/// [`Hub::open`](#method.open) constructs one over the real driver.
pub struct Hub<D: FilterDriver> {
    pub(crate) shared: Arc<Shared<D>>,
    control: Mutex<Control>,
}

#[cfg(windows)]
impl Hub<crate::platform::InterceptionDriver> {
    /// Open a hub over the real driver with default options.
    pub fn open() -> Result<Self> {
        Ok(Self::new(crate::platform::InterceptionDriver::new()?))
    }
}

impl<D: FilterDriver> Hub<D> {
    /// Create a hub over a driver with default options.
    pub fn new(driver: D) -> Self {
        Self::with_options(driver, HubOptions::default())
    }

    /// Create a hub over a driver with explicit options.
    pub fn with_options(driver: D, options: HubOptions) -> Self {
        let pool = Pool::new(options.pool_threads);
        Self {
            shared: Arc::new(Shared {
                driver,
                options,
                pool,
                devices: (0..MAX_DEVICES).map(|_| Mutex::new(DeviceState::default())).collect(),
                filtered: (0..MAX_DEVICES).map(|_| AtomicBool::new(false)).collect(),
            }),
            control: Mutex::new(Control {
                enabled: true,
                shut_down: false,
                poll: None,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Filter controller
    // ------------------------------------------------------------------

    /// Run one registry mutation under the full filter discipline.
    fn mutate<R>(
        &self,
        device: i32,
        f: impl FnOnce(&mut DeviceState) -> Result<R>,
    ) -> Result<R> {
        let mut control = self.control.lock().unwrap();
        if control.shut_down {
            return Err(Error::ShutDown);
        }

        // Quiesce the driver before the registry changes shape.
        self.shared.driver.set_filter(&|_| false)?;

        let result = {
            let mut state = self.shared.device_state(device).lock().unwrap();
            let result = f(&mut state);
            self.shared.set_filtered(device, state.has_any());
            result
        };

        // Re-enable and loop management run even when the mutation was
        // rejected, so other devices' filtering is restored.
        self.apply_filter_state(&mut control)?;
        result
    }

    /// Re-enable the filter iff anything is filtered, and reconcile the
    /// poll loop with that state. Caller holds the control lock and has
    /// already disabled the filter.
    ///
    /// The loop is spawned before the filter is armed: armed-with-no-consumer
    /// is the state that traps strokes, so a failed spawn must leave the
    /// filter off.
    fn apply_filter_state(&self, control: &mut Control) -> Result<()> {
        let active = control.enabled && self.shared.any_filtered();
        if active {
            if control.poll.is_none() {
                let stop = Arc::new(AtomicBool::new(false));
                let handle = std::thread::Builder::new()
                    .name("interflow-poll".into())
                    .spawn({
                        let shared = self.shared.clone();
                        let stop = stop.clone();
                        move || poll::run(shared, stop)
                    })
                    .map_err(|e| Error::Thread(format!("failed to spawn dispatch loop: {e}")))?;
                control.poll = Some(PollHandle { stop, handle });
                log::debug!("dispatch loop running");
            }
            let shared = &self.shared;
            self.shared.driver.set_filter(&|device| shared.is_filtered(device))?;
        } else if let Some(poll) = control.poll.take() {
            stop_poll(poll)?;
            log::debug!("filter disabled, dispatch loop stopped");
        }
        Ok(())
    }

    /// Globally enable or disable the whole filtering subsystem without
    /// touching the registry. Uses the same disable-before/enable-after
    /// discipline as individual mutations.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut control = self.control.lock().unwrap();
        if control.shut_down {
            return Err(Error::ShutDown);
        }
        if control.enabled == enabled {
            return Ok(());
        }
        self.shared.driver.set_filter(&|_| false)?;
        control.enabled = enabled;
        self.apply_filter_state(&mut control)
    }

    /// Whether the master switch is on.
    pub fn is_enabled(&self) -> bool {
        self.control.lock().unwrap().enabled
    }

    /// Device IDs currently in the filtered set.
    pub fn filtered_devices(&self) -> Vec<i32> {
        (1..=MAX_DEVICES)
            .filter(|&d| self.shared.is_filtered(d))
            .collect()
    }

    /// Tear everything down: filter off first (the driver must never hold a
    /// stroke with nowhere to deliver it), then the loop, then the dispatch
    /// queues. Also runs on drop.
    pub fn shutdown(&self) -> Result<()> {
        let mut control = self.control.lock().unwrap();
        if control.shut_down {
            return Ok(());
        }
        control.shut_down = true;

        self.shared.driver.set_filter(&|_| false)?;
        if let Some(poll) = control.poll.take() {
            let _ = stop_poll(poll);
        }
        let mut removed = Vec::new();
        for device in 1..=MAX_DEVICES {
            let mut state = self.shared.device_state(device).lock().unwrap();
            removed.push(std::mem::take(&mut *state));
            self.shared.set_filtered(device, false);
        }
        drop(control);
        // Worker queues drain and join with no hub lock held, so a callback
        // still in flight can call back into the hub while we wait for it.
        drop(removed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Keyboard subscriptions
    // ------------------------------------------------------------------

    /// Subscribe to one canonical key code on a keyboard device.
    pub fn subscribe_key(
        &self,
        device: i32,
        code: u16,
        options: SubscribeOptions,
        callback: impl Fn(KeyEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        ensure_keyboard(device)?;
        self.mutate(device, |state| {
            if state.keys.contains_key(&code) {
                return Err(Error::AlreadySubscribed {
                    device,
                    target: format!("key {code}"),
                });
            }
            state.keys.insert(
                code,
                Subscription::new(
                    options,
                    Callback::Key(Arc::new(callback)),
                    format!("dev{device}-key{code}"),
                ),
            );
            Ok(())
        })
    }

    /// Remove a single-key subscription, draining and joining its queue.
    pub fn unsubscribe_key(&self, device: i32, code: u16) -> Result<()> {
        ensure_keyboard(device)?;
        // The removed subscription is disposed after both locks are
        // released: the worker join waits on subscriber code, which may
        // call back into this surface.
        let removed = self.mutate(device, |state| {
            state.keys.remove(&code).ok_or(Error::NotSubscribed {
                device,
                target: format!("key {code}"),
            })
        })?;
        drop(removed);
        Ok(())
    }

    /// Subscribe to every key on a keyboard device. Single-key
    /// subscriptions take precedence for their own codes.
    pub fn subscribe_keyboard(
        &self,
        device: i32,
        options: SubscribeOptions,
        callback: impl Fn(KeyEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        ensure_keyboard(device)?;
        self.mutate(device, |state| {
            if state.all.is_some() {
                return Err(Error::AlreadySubscribed {
                    device,
                    target: "all keys".into(),
                });
            }
            state.all = Some(Subscription::new(
                options,
                Callback::Key(Arc::new(callback)),
                format!("dev{device}-all"),
            ));
            Ok(())
        })
    }

    /// Remove a whole-keyboard subscription.
    pub fn unsubscribe_keyboard(&self, device: i32) -> Result<()> {
        ensure_keyboard(device)?;
        let removed = self.mutate(device, |state| {
            state.all.take().ok_or(Error::NotSubscribed {
                device,
                target: "all keys".into(),
            })
        })?;
        drop(removed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mouse subscriptions
    // ------------------------------------------------------------------

    /// Subscribe to one button or wheel on a mouse device.
    pub fn subscribe_mouse_button(
        &self,
        device: i32,
        button: MouseButton,
        options: SubscribeOptions,
        callback: impl Fn(MouseButtonEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        ensure_mouse(device)?;
        let index = button.index();
        self.mutate(device, |state| {
            if state.keys.contains_key(&index) {
                return Err(Error::AlreadySubscribed {
                    device,
                    target: format!("button {button:?}"),
                });
            }
            state.keys.insert(
                index,
                Subscription::new(
                    options,
                    Callback::Button(Arc::new(callback)),
                    format!("dev{device}-btn{index}"),
                ),
            );
            Ok(())
        })
    }

    /// Remove a single-button subscription.
    pub fn unsubscribe_mouse_button(&self, device: i32, button: MouseButton) -> Result<()> {
        ensure_mouse(device)?;
        let removed = self.mutate(device, |state| {
            state
                .keys
                .remove(&button.index())
                .ok_or(Error::NotSubscribed {
                    device,
                    target: format!("button {button:?}"),
                })
        })?;
        drop(removed);
        Ok(())
    }

    /// Subscribe to every button and wheel on a mouse device.
    pub fn subscribe_mouse(
        &self,
        device: i32,
        options: SubscribeOptions,
        callback: impl Fn(MouseButtonEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        ensure_mouse(device)?;
        self.mutate(device, |state| {
            if state.all.is_some() {
                return Err(Error::AlreadySubscribed {
                    device,
                    target: "all buttons".into(),
                });
            }
            state.all = Some(Subscription::new(
                options,
                Callback::Button(Arc::new(callback)),
                format!("dev{device}-all"),
            ));
            Ok(())
        })
    }

    /// Remove a whole-mouse subscription.
    pub fn unsubscribe_mouse(&self, device: i32) -> Result<()> {
        ensure_mouse(device)?;
        let removed = self.mutate(device, |state| {
            state.all.take().ok_or(Error::NotSubscribed {
                device,
                target: "all buttons".into(),
            })
        })?;
        drop(removed);
        Ok(())
    }

    /// Subscribe to absolute movement on a mouse device.
    pub fn subscribe_mouse_move_absolute(
        &self,
        device: i32,
        options: SubscribeOptions,
        callback: impl Fn(MoveEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        self.subscribe_move(device, options, callback, true)
    }

    /// Subscribe to relative movement on a mouse device.
    pub fn subscribe_mouse_move_relative(
        &self,
        device: i32,
        options: SubscribeOptions,
        callback: impl Fn(MoveEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        self.subscribe_move(device, options, callback, false)
    }

    fn subscribe_move(
        &self,
        device: i32,
        options: SubscribeOptions,
        callback: impl Fn(MoveEvent) + Send + Sync + 'static,
        absolute: bool,
    ) -> Result<()> {
        ensure_mouse(device)?;
        let channel = if absolute { "absolute move" } else { "relative move" };
        self.mutate(device, |state| {
            let slot = if absolute {
                &mut state.move_absolute
            } else {
                &mut state.move_relative
            };
            if slot.is_some() {
                return Err(Error::AlreadySubscribed {
                    device,
                    target: channel.into(),
                });
            }
            *slot = Some(Subscription::new(
                options,
                Callback::Move(Arc::new(callback)),
                format!("dev{device}-{}", if absolute { "absmove" } else { "relmove" }),
            ));
            Ok(())
        })
    }

    /// Remove an absolute-movement subscription.
    pub fn unsubscribe_mouse_move_absolute(&self, device: i32) -> Result<()> {
        self.unsubscribe_move(device, true)
    }

    /// Remove a relative-movement subscription.
    pub fn unsubscribe_mouse_move_relative(&self, device: i32) -> Result<()> {
        self.unsubscribe_move(device, false)
    }

    fn unsubscribe_move(&self, device: i32, absolute: bool) -> Result<()> {
        ensure_mouse(device)?;
        let channel = if absolute { "absolute move" } else { "relative move" };
        let removed = self.mutate(device, |state| {
            let slot = if absolute {
                &mut state.move_absolute
            } else {
                &mut state.move_relative
            };
            slot.take().ok_or(Error::NotSubscribed {
                device,
                target: channel.into(),
            })
        })?;
        drop(removed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Context callbacks
    // ------------------------------------------------------------------

    /// Install a context callback: invoked synchronously immediately before
    /// and after every *unsubscribed* stroke from this device is forwarded.
    /// It never consumes or rewrites strokes.
    pub fn set_context_callback(
        &self,
        device: i32,
        callback: impl Fn(i32, ContextPhase) + Send + Sync + 'static,
    ) -> Result<()> {
        ensure_device(device)?;
        self.mutate(device, |state| {
            if state.context.is_some() {
                return Err(Error::AlreadySubscribed {
                    device,
                    target: "context callback".into(),
                });
            }
            state.context = Some(Arc::new(callback));
            Ok(())
        })
    }

    /// Remove a device's context callback.
    pub fn remove_context_callback(&self, device: i32) -> Result<()> {
        ensure_device(device)?;
        let removed = self.mutate(device, |state| {
            state.context.take().ok_or(Error::NotSubscribed {
                device,
                target: "context callback".into(),
            })
        })?;
        drop(removed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Device queries (off the hot path)
    // ------------------------------------------------------------------

    /// Snapshot of every device the driver currently backs with hardware.
    pub fn devices(&self) -> Result<Vec<DeviceInfo>> {
        resolver::devices(&self.shared.driver)
    }

    /// Resolve a keyboard by vendor/product ID (`instance` is 1-based).
    pub fn find_keyboard(&self, vid: u16, pid: u16, instance: usize) -> Result<i32> {
        resolver::find_device(&self.shared.driver, DeviceClass::Keyboard, vid, pid, instance)
    }

    /// Resolve a mouse by vendor/product ID (`instance` is 1-based).
    pub fn find_mouse(&self, vid: u16, pid: u16, instance: usize) -> Result<i32> {
        resolver::find_device(&self.shared.driver, DeviceClass::Mouse, vid, pid, instance)
    }

    /// Resolve a keyboard whose hardware ID contains `fragment`.
    pub fn find_keyboard_by_hardware(&self, fragment: &str, instance: usize) -> Result<i32> {
        resolver::find_device_by_hardware(
            &self.shared.driver,
            DeviceClass::Keyboard,
            fragment,
            instance,
        )
    }

    /// Resolve a mouse whose hardware ID contains `fragment`.
    pub fn find_mouse_by_hardware(&self, fragment: &str, instance: usize) -> Result<i32> {
        resolver::find_device_by_hardware(
            &self.shared.driver,
            DeviceClass::Mouse,
            fragment,
            instance,
        )
    }

    // ------------------------------------------------------------------
    // Injection
    // ------------------------------------------------------------------

    /// Synthesize a key event as if it came from the device: denormalizes
    /// the canonical code into its raw stroke sequence and sends it.
    pub fn send_key(&self, device: i32, code: u16, state: KeyState) -> Result<()> {
        ensure_keyboard(device)?;
        let strokes: Vec<Stroke> = scancode::denormalize(code, state)
            .into_iter()
            .map(Stroke::Key)
            .collect();
        let sent = self.shared.driver.send(device, &strokes)?;
        if sent != strokes.len() {
            return Err(Error::SendFailed(device));
        }
        Ok(())
    }

    /// Inject a raw key stroke without translation.
    pub fn send_key_stroke(&self, device: i32, stroke: KeyStroke) -> Result<()> {
        ensure_keyboard(device)?;
        let sent = self.shared.driver.send(device, &[Stroke::Key(stroke)])?;
        if sent != 1 {
            return Err(Error::SendFailed(device));
        }
        Ok(())
    }

    /// Synthesize a button or wheel event. For click buttons `state` is
    /// 1 (press) or 0 (release); for wheels it is the rotation sign
    /// (-1 or 1), sent as one detent.
    pub fn send_mouse_button(&self, device: i32, button: MouseButton, state: i8) -> Result<()> {
        ensure_mouse(device)?;
        let stroke = match button {
            MouseButton::WheelVertical | MouseButton::WheelHorizontal => {
                if state != 1 && state != -1 {
                    return Err(Error::InvalidArgument(format!(
                        "wheel state must be -1 or 1, got {state}"
                    )));
                }
                let mut stroke = MouseStroke::buttons(if button == MouseButton::WheelVertical {
                    mouse_state::WHEEL
                } else {
                    mouse_state::HWHEEL
                });
                stroke.rolling = WHEEL_DELTA * i16::from(state);
                stroke
            }
            _ => {
                if state != 0 && state != 1 {
                    return Err(Error::InvalidArgument(format!(
                        "button state must be 0 or 1, got {state}"
                    )));
                }
                let bit = 2 * button.index() + u16::from(state == 0);
                MouseStroke::buttons(1 << bit)
            }
        };
        self.send_mouse_stroke(device, stroke)
    }

    /// Synthesize relative mouse movement.
    pub fn send_mouse_move_relative(&self, device: i32, x: i32, y: i32) -> Result<()> {
        self.send_mouse_stroke(device, MouseStroke::relative_move(x, y))
    }

    /// Synthesize absolute mouse movement.
    pub fn send_mouse_move_absolute(&self, device: i32, x: i32, y: i32) -> Result<()> {
        self.send_mouse_stroke(device, MouseStroke::absolute_move(x, y))
    }

    /// Inject a raw mouse stroke.
    pub fn send_mouse_stroke(&self, device: i32, stroke: MouseStroke) -> Result<()> {
        ensure_mouse(device)?;
        let sent = self.shared.driver.send(device, &[Stroke::Mouse(stroke)])?;
        if sent != 1 {
            return Err(Error::SendFailed(device));
        }
        Ok(())
    }
}

impl<D: FilterDriver> Drop for Hub<D> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Signal the poll loop to stop and join it. A mutation issued from inside
/// a context callback runs on the poll thread itself and cannot join it;
/// the loop is detached instead and exits once the callback returns.
fn stop_poll(poll: PollHandle) -> Result<()> {
    poll.stop.store(true, Ordering::Release);
    if poll.handle.thread().id() == std::thread::current().id() {
        return Ok(());
    }
    poll.handle
        .join()
        .map_err(|_| Error::Thread("dispatch loop panicked".into()))
}

fn ensure_keyboard(device: i32) -> Result<()> {
    if stroke::is_keyboard(device) {
        Ok(())
    } else {
        Err(Error::InvalidDevice(device, "expected a keyboard device (1-10)"))
    }
}

fn ensure_mouse(device: i32) -> Result<()> {
    if stroke::is_mouse(device) {
        Ok(())
    } else {
        Err(Error::InvalidDevice(device, "expected a mouse device (11-20)"))
    }
}

fn ensure_device(device: i32) -> Result<()> {
    if (1..=MAX_DEVICES).contains(&device) {
        Ok(())
    } else {
        Err(Error::InvalidDevice(device, "expected a device id in 1-20"))
    }
}
