//! Audio domain newtypes for compile-time safety.
//!
//! - `VolumePercent`: clamps 0–100, the only volume the sample path accepts
//! - `ChannelId`: one of the two DAC outputs, parsed from the wire byte

use crate::error::InvalidChannel;
use crate::stream_config::CHANNEL_COUNT;

// ── VolumePercent ────────────────────────────────────────────────────────────

/// Volume as a percentage, clamped to 0–100.
///
/// Wraps a `u8` with the invariant `0 <= value <= 100`.
/// Construct with [`VolumePercent::new`] or, from a VOLUME command,
/// [`VolumePercent::from_param`]. Both clamp; there is no rejecting path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct VolumePercent(u8);

impl VolumePercent {
    /// Unity gain; samples pass through unscaled.
    pub const FULL: Self = Self(100);

    /// Silence; every sample maps to mid-scale.
    pub const MUTE: Self = Self(0);

    /// Create a `VolumePercent`, clamping values above 100 to 100.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        if value > 100 {
            Self(100)
        } else {
            Self(value)
        }
    }

    /// Clamp the big-endian `param` field of a VOLUME command.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Safety: value <= 100 after min()
    pub fn from_param(param: u16) -> Self {
        Self(param.min(100) as u8)
    }

    /// Return the inner volume value (0–100).
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// True when no scaling is applied.
    #[must_use]
    pub const fn is_full(self) -> bool {
        self.0 == 100
    }
}

impl Default for VolumePercent {
    fn default() -> Self {
        Self::FULL
    }
}

// ── ChannelId ────────────────────────────────────────────────────────────────

/// One of the two DAC output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ChannelId {
    /// DAC channel 1 (wire channel byte 0).
    Ch0 = 0,
    /// DAC channel 2 (wire channel byte 1).
    Ch1 = 1,
}

impl ChannelId {
    /// Both channels, in wire order.
    pub const ALL: [Self; CHANNEL_COUNT] = [Self::Ch0, Self::Ch1];

    /// Array index for per-channel state.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Channel byte as it appears on the wire.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = InvalidChannel;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Ch0),
            1 => Ok(Self::Ch1),
            other => Err(InvalidChannel(other)),
        }
    }
}
