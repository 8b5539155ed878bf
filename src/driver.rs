//! The filter-driver boundary.
//!
//! The kernel-level driver is an external collaborator with a fixed
//! contract; everything the core needs from it is expressed by
//! [`FilterDriver`]. The Windows binding in [`crate::platform`] implements
//! it against the real driver; tests run against a scripted mock.

use std::time::Duration;

use crate::error::Result;
use crate::stroke::Stroke;

/// The fixed contract this core consumes from the kernel filter driver.
///
/// Implementations own the driver context; dropping the implementation
/// destroys it. All methods are callable from the poll thread and from
/// subscription entry points concurrently.
pub trait FilterDriver: Send + Sync + 'static {
    /// Install the driver-level filter. The driver evaluates `predicate`
    /// per device ID; a device answering `true` has its strokes routed
    /// through this process. Passing an all-false predicate disables
    /// filtering entirely.
    fn set_filter(&self, predicate: &(dyn Fn(i32) -> bool + Sync)) -> Result<()>;

    /// Inject strokes into the device's input stream, as if from hardware.
    /// Returns the number of strokes the driver accepted.
    fn send(&self, device: i32, strokes: &[Stroke]) -> Result<usize>;

    /// Receive up to `max` pending strokes from a filtered device. May
    /// return fewer, including none.
    fn receive(&self, device: i32, max: usize) -> Result<Vec<Stroke>>;

    /// Block until some filtered device has a stroke pending, or until the
    /// timeout elapses (`Ok(None)`).
    fn wait(&self, timeout: Duration) -> Result<Option<i32>>;

    /// The device's hardware identity string, or `None` when no physical
    /// device currently backs this ID. Off the hot path.
    fn hardware_id(&self, device: i32) -> Result<Option<String>>;
}
