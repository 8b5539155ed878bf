//! The poll/dispatch loop: one long-lived thread that waits on the driver,
//! translates and classifies each received stroke, matches it against the
//! subscription registry, dispatches callbacks, and forwards, blocks, or
//! rewrites the stroke.
//!
//! The loop never blocks on subscriber code: matched callbacks are handed
//! to a per-key ordered queue or to the shared pool. The only subscriber
//! code that runs inline is the context callback, whose contract is to
//! bracket the synchronous driver send; it is panic-isolated so it cannot
//! take the loop down.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::driver::FilterDriver;
use crate::hub::Shared;
use crate::mouse::{self, MoveTracker};
use crate::registry::{
    Callback, ContextCallback, ContextPhase, KeyEvent, MouseButtonEvent, MoveEvent, Subscription,
};
use crate::scancode;
use crate::stroke::{self, KeyStroke, MAX_DEVICES, MouseStroke, Stroke};
use crate::worker::Job;

/// Loop body. Runs until `stop` is observed; the bounded driver wait keeps
/// stop latency within one timeout and lets strokes buffered during a bulk
/// subscription change drain before the loop exits.
pub(crate) fn run<D: FilterDriver>(shared: Arc<Shared<D>>, stop: Arc<AtomicBool>) {
    log::debug!("dispatch loop started");
    let mut trackers: Vec<MoveTracker> = (0..MAX_DEVICES).map(|_| MoveTracker::new()).collect();

    while !stop.load(Ordering::Acquire) {
        let device = match shared.driver.wait(shared.options.wait_timeout) {
            Ok(Some(device)) => device,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("driver wait failed: {e}");
                continue;
            }
        };
        if !(1..=MAX_DEVICES).contains(&device) {
            log::warn!("driver reported out-of-range device {device}");
            continue;
        }

        let strokes = match shared.driver.receive(device, shared.options.receive_batch) {
            Ok(strokes) => strokes,
            Err(e) => {
                log::warn!("receive from device {device} failed: {e}");
                continue;
            }
        };

        for received in strokes {
            match received {
                Stroke::Key(key) if stroke::is_keyboard(device) => {
                    process_key(&shared, device, key);
                }
                Stroke::Mouse(mouse) if stroke::is_mouse(device) => {
                    let tracker = &mut trackers[(device - 1) as usize];
                    process_mouse(&shared, device, mouse, tracker);
                }
                other => {
                    // A stroke that does not match its device class is
                    // malformed driver input. A dropped keystroke is the
                    // worse failure, so forward it untouched.
                    log::warn!("device {device} delivered a mismatched stroke; forwarding");
                    forward(&shared, device, other, None);
                }
            }
        }
    }
    log::debug!("dispatch loop stopped");
}

/// Hand a job to the subscription's ordering domain: its dedicated FIFO
/// queue, or the shared unordered pool for concurrent subscriptions.
fn dispatch<D: FilterDriver>(shared: &Shared<D>, sub: &Subscription, job: Job) {
    match &sub.worker {
        Some(worker) => worker.enqueue(job),
        None => shared.pool.execute(job),
    }
}

fn invoke_context(callback: &ContextCallback, device: i32, phase: ContextPhase) {
    if catch_unwind(AssertUnwindSafe(|| callback(device, phase))).is_err() {
        log::warn!("context callback for device {device} panicked");
    }
}

/// Forward a stroke to the OS, bracketed by the context callback when one
/// applies. The send is synchronous on the loop: these are real keys
/// reaching the operating system.
fn forward<D: FilterDriver>(
    shared: &Shared<D>,
    device: i32,
    stroke: Stroke,
    context: Option<&ContextCallback>,
) {
    if let Some(callback) = context {
        invoke_context(callback, device, ContextPhase::Before);
    }
    if let Err(e) = shared.driver.send(device, &[stroke]) {
        log::warn!("forwarding stroke to device {device} failed: {e}");
    }
    if let Some(callback) = context {
        invoke_context(callback, device, ContextPhase::After);
    }
}

fn process_key<D: FilterDriver>(shared: &Shared<D>, device: i32, raw: KeyStroke) {
    let key = scancode::normalize_single(&raw);

    // Matching and dispatch run under the device lock (enqueues are plain
    // channel sends), but the lock is released before the context callback
    // or the send: both run user-observable code that may call back into
    // the subscription surface.
    let context = {
        let state = shared.device_state(device).lock().unwrap();
        let mut matched = false;
        // The invisible half of a two-stroke sequence skips matching
        // entirely but is still forwarded so the OS sees the full sequence.
        if !key.ignore {
            let sub = state.keys.get(&key.code).or(state.all.as_ref());
            if let Some(sub) = sub {
                matched = true;
                match &sub.callback {
                    Callback::Key(callback) => {
                        let callback = callback.clone();
                        let event = KeyEvent {
                            device,
                            code: key.code,
                            state: key.state,
                        };
                        dispatch(shared, sub, Box::new(move || callback(event)));
                    }
                    _ => log::warn!("key subscription on device {device} has a non-key callback"),
                }
                if sub.block {
                    return;
                }
            }
        }
        if matched { None } else { state.context.clone() }
    };

    forward(shared, device, Stroke::Key(raw), context.as_ref());
}

fn process_mouse<D: FilterDriver>(
    shared: &Shared<D>,
    device: i32,
    mut raw: MouseStroke,
    tracker: &mut MoveTracker,
) {
    // Same locking shape as process_key: resolve everything under the
    // device lock, release it, then do the user-visible sends.
    let (matched, movement_remains, context) = {
        let state = shared.device_state(device).lock().unwrap();
        let mut matched = false;

        // Movement is resolved (and possibly blocked) before button events,
        // so a button callback fired from the same stroke observes the
        // final coordinates.
        let mut movement_remains = tracker.has_movement(&raw);
        if movement_remains {
            let sub = if raw.is_absolute() {
                state.move_absolute.as_ref()
            } else {
                state.move_relative.as_ref()
            };
            if let Some(sub) = sub {
                matched = true;
                match &sub.callback {
                    Callback::Move(callback) => {
                        let callback = callback.clone();
                        let event = MoveEvent {
                            device,
                            x: raw.x,
                            y: raw.y,
                        };
                        dispatch(shared, sub, Box::new(move || callback(event)));
                    }
                    _ => log::warn!("move subscription on device {device} has a non-move callback"),
                }
                if sub.block {
                    raw.x = 0;
                    raw.y = 0;
                    movement_remains = false;
                }
            }
        }

        for event in mouse::button_events(&raw) {
            let sub = state.keys.get(&event.button.index()).or(state.all.as_ref());
            let Some(sub) = sub else { continue };
            matched = true;
            match &sub.callback {
                Callback::Button(callback) => {
                    let callback = callback.clone();
                    let delivered = MouseButtonEvent {
                        device,
                        button: event.button,
                        state: event.state,
                    };
                    dispatch(shared, sub, Box::new(move || callback(delivered)));
                }
                _ => log::warn!("button subscription on device {device} has a non-button callback"),
            }
            if sub.block {
                mouse::block_button(&mut raw, &event);
            }
        }

        let context = if matched { None } else { state.context.clone() };
        (matched, movement_remains, context)
    };

    if matched {
        // Forward only what survived blocking; a fully consumed stroke is
        // dropped here.
        if movement_remains || raw.state != 0 {
            if let Err(e) = shared.driver.send(device, &[Stroke::Mouse(raw)]) {
                log::warn!("forwarding stroke to device {device} failed: {e}");
            }
        }
    } else {
        forward(shared, device, Stroke::Mouse(raw), context.as_ref());
    }
}
