//! Error types for the interception library.

use thiserror::Error;

/// Result type alias for interflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while translating, subscribing, or dispatching strokes.
#[derive(Debug, Error)]
pub enum Error {
    /// The driver delivered a stroke batch the translator cannot interpret.
    #[error("malformed stroke input: {0}")]
    MalformedStrokes(String),

    /// The device ID is outside the valid range for the requested operation.
    #[error("invalid device id {0}: {1}")]
    InvalidDevice(i32, &'static str),

    /// No device with the requested hardware identity was found.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The subscription being removed does not exist.
    #[error("device {device} has no subscription for {target}")]
    NotSubscribed {
        /// Device the caller addressed.
        device: i32,
        /// Human-readable name of the missing subscription target.
        target: String,
    },

    /// A subscription for this target already exists.
    ///
    /// Options are never mutated in place; remove the existing subscription
    /// first, then add it with the new options.
    #[error("device {device} already has a subscription for {target}")]
    AlreadySubscribed {
        /// Device the caller addressed.
        device: i32,
        /// Human-readable name of the conflicting subscription target.
        target: String,
    },

    /// A caller-supplied argument is outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The driver context could not be created or a driver call failed.
    #[error("driver error: {0}")]
    Driver(String),

    /// A dispatch or poll thread could not be spawned or joined.
    #[error("thread error: {0}")]
    Thread(String),

    /// Forwarding or injecting a stroke failed.
    #[error("failed to send stroke to device {0}")]
    SendFailed(i32),

    /// The subsystem has been shut down.
    #[error("hub has been shut down")]
    ShutDown,
}
