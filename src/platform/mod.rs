//! Platform bindings for the kernel filter driver.
//!
//! Only Windows has a real binding; the driver itself is Windows-only. On
//! other platforms the crate still builds so the translation, registry, and
//! dispatch layers can be developed and tested anywhere, but no
//! [`crate::driver::FilterDriver`] implementation is provided.

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::InterceptionDriver;
