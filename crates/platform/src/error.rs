//! Error types shared by the platform traits and the streaming core.
//!
//! None of these ever escape an interrupt entry point: the core converts
//! each one into a saturating diagnostic counter plus a log line.

use crate::audio_types::ChannelId;

/// A transfer engine or the sample clock refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError {
    /// The engine was not in its ready state when the operation was attempted.
    #[error("transfer engine not ready")]
    NotReady,
    /// The engine rejected the request (bad buffer, bus error, busy).
    #[error("transfer engine rejected the request")]
    Rejected,
    /// The shared sample clock could not be started.
    #[error("sample clock failed to start")]
    ClockFault,
}

/// The bounded force-disable sequence ran out of polls.
///
/// The engine's request line has still been released; the caller logs the
/// timeout and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("engine still enabled after {polls} polls")]
pub struct PollTimeout {
    /// Number of polls performed before giving up.
    pub polls: u32,
}

/// A [`StreamConfig`](crate::StreamConfig) failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Sample rate outside the supported window.
    #[error("sample rate {hz} Hz outside {min}..={max} Hz")]
    SampleRateOutOfRange {
        /// Requested rate.
        hz: u32,
        /// Inclusive minimum.
        min: u32,
        /// Inclusive maximum.
        max: u32,
    },
    /// A zero poll limit would make every force-disable time out immediately.
    #[error("force-disable poll limit must be non-zero")]
    ZeroPollLimit,
}

/// Channel byte on the wire is neither 0 nor 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("invalid channel {0}")]
pub struct InvalidChannel(pub u8);

/// An output channel could not be started and fell back to a constant
/// mid-scale level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("channel {channel:?} output failed to start: {cause}")]
pub struct DriverFault {
    /// Channel that is now holding mid-scale.
    pub channel: ChannelId,
    /// What the engine or clock reported.
    pub cause: TransferError,
}
