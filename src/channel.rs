//! Channel-based subscription adapters.
//!
//! Alternatives to callback subscriptions for consumers that want to pull
//! events from a receiver instead. The channel is bounded and fed with
//! `try_send`: a slow consumer drops events rather than stalling dispatch,
//! because backpressure here would eventually stall real input.
//!
//! # Example
//!
//! ```no_run
//! use interflow::{FilterDriver, Hub, SubscribeOptions};
//!
//! fn watch_escape<D: FilterDriver>(hub: &Hub<D>) -> interflow::Result<()> {
//!     let rx = hub.subscribe_key_channel(1, 1, SubscribeOptions::new(), 100)?;
//!     std::thread::spawn(move || {
//!         for event in rx.iter() {
//!             println!("escape: {:?}", event.state);
//!         }
//!     });
//!     Ok(())
//! }
//! ```

use crossbeam_channel::{Receiver, bounded};

use crate::driver::FilterDriver;
use crate::error::Result;
use crate::hub::Hub;
use crate::mouse::MouseButton;
use crate::registry::{KeyEvent, MouseButtonEvent, SubscribeOptions};

impl<D: FilterDriver> Hub<D> {
    /// Subscribe to a key and receive its events over a bounded channel.
    ///
    /// Events are delivered in stroke order (the subscription is ordered
    /// under the hood); if the channel is full, new events are dropped.
    pub fn subscribe_key_channel(
        &self,
        device: i32,
        code: u16,
        options: SubscribeOptions,
        capacity: usize,
    ) -> Result<Receiver<KeyEvent>> {
        let (tx, rx) = bounded(capacity);
        self.subscribe_key(device, code, options, move |event| {
            let _ = tx.try_send(event);
        })?;
        Ok(rx)
    }

    /// Subscribe to a whole keyboard and receive its events over a bounded
    /// channel.
    pub fn subscribe_keyboard_channel(
        &self,
        device: i32,
        options: SubscribeOptions,
        capacity: usize,
    ) -> Result<Receiver<KeyEvent>> {
        let (tx, rx) = bounded(capacity);
        self.subscribe_keyboard(device, options, move |event| {
            let _ = tx.try_send(event);
        })?;
        Ok(rx)
    }

    /// Subscribe to a mouse button and receive its events over a bounded
    /// channel.
    pub fn subscribe_mouse_button_channel(
        &self,
        device: i32,
        button: MouseButton,
        options: SubscribeOptions,
        capacity: usize,
    ) -> Result<Receiver<MouseButtonEvent>> {
        let (tx, rx) = bounded(capacity);
        self.subscribe_mouse_button(device, button, options, move |event| {
            let _ = tx.try_send(event);
        })?;
        Ok(rx)
    }
}

// ============================================================================
// Tokio async support (behind feature flag)
// ============================================================================

#[cfg(feature = "tokio")]
mod tokio_channel {
    use tokio::sync::mpsc;

    use super::*;

    impl<D: FilterDriver> Hub<D> {
        /// Subscribe to a key and receive its events over a tokio channel.
        ///
        /// Fed with `try_send` from the dispatch side, so a full channel
        /// drops events instead of blocking input processing.
        pub fn subscribe_key_channel_async(
            &self,
            device: i32,
            code: u16,
            options: SubscribeOptions,
            capacity: usize,
        ) -> Result<mpsc::Receiver<KeyEvent>> {
            let (tx, rx) = mpsc::channel(capacity);
            self.subscribe_key(device, code, options, move |event| {
                let _ = tx.try_send(event);
            })?;
            Ok(rx)
        }

        /// Subscribe to a mouse button and receive its events over a tokio
        /// channel.
        pub fn subscribe_mouse_button_channel_async(
            &self,
            device: i32,
            button: MouseButton,
            options: SubscribeOptions,
            capacity: usize,
        ) -> Result<mpsc::Receiver<MouseButtonEvent>> {
            let (tx, rx) = mpsc::channel(capacity);
            self.subscribe_mouse_button(device, button, options, move |event| {
                let _ = tx.try_send(event);
            })?;
            Ok(rx)
        }
    }
}
