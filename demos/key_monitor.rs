//! Print every key and mouse button event, without blocking anything.
//!
//! Requires the interception kernel driver. Run with:
//!
//! ```sh
//! cargo run --example key_monitor
//! ```

#[cfg(windows)]
fn main() -> interflow::Result<()> {
    use interflow::{Hub, SubscribeOptions};
    use std::sync::mpsc;

    let hub = Hub::open()?;

    println!("connected devices:");
    for info in hub.devices()? {
        println!("  {:>2}  {}", info.id, info.hardware_id);
    }

    for device in 1..=10 {
        hub.subscribe_keyboard(device, SubscribeOptions::new(), |event| {
            println!(
                "kbd {:>2}  code {:>3}  {:?}",
                event.device, event.code, event.state
            );
        })?;
    }
    for device in 11..=20 {
        hub.subscribe_mouse(device, SubscribeOptions::new(), |event| {
            // state: 1 press, 0 release; for wheels the rotation sign.
            println!("mou {:>2}  {:?} state {}", event.device, event.button, event.state);
        })?;
    }

    println!("monitoring; press ctrl-c to exit");
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
