//! Block the Escape key on every keyboard until Ctrl-C.
//!
//! Requires the interception kernel driver. Run with:
//!
//! ```sh
//! cargo run --example block_escape
//! ```

#[cfg(windows)]
fn main() -> interflow::Result<()> {
    use interflow::{Hub, SubscribeOptions};
    use std::sync::mpsc;

    let hub = Hub::open()?;

    // Escape is canonical code 1. Device IDs 1-10 are the keyboard slots;
    // subscribing to an empty slot is harmless.
    for device in 1..=10 {
        hub.subscribe_key(device, 1, SubscribeOptions::new().block(true), |event| {
            println!("blocked escape on device {} ({:?})", event.device, event.state);
        })?;
    }

    println!("escape is blocked on all keyboards; press ctrl-c to exit");
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("failed to install ctrl-c handler");
    let _ = rx.recv();

    hub.shutdown()
}

#[cfg(not(windows))]
fn main() {
    eprintln!("this demo needs the Windows interception driver");
}
