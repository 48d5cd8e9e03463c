//! Stream timing and sizing for the DAC slave.
//!
//! # Timing Chain
//!
//! ```text
//! TIM6 update (32 kHz TRGO)
//!   → DAC1 CH1 / CH2 conversion trigger
//!   → DMA1 stream per channel, one 2048-slot buffer per transfer
//! ```
//!
//! One buffer lasts 2048 / 32 000 = 64 ms. That is the hard deadline for the
//! master to deliver the next full buffer before the channel underruns.
//!
//! # Frame Sizes
//!
//! | Frame   | Bytes            |
//! |---------|------------------|
//! | Command | 5                |
//! | Data    | 4 + 2·N, N ≤ 2048 |
//!
//! The landing buffer is sized for the largest legal data frame (4100 bytes).

use crate::error::ConfigError;
use crate::gpio::ReadyPolarity;

/// Output sample rate in Hz.
pub const SAMPLE_RATE_HZ: u32 = 32_000;

/// Samples per channel buffer (one playback period).
pub const BUFFER_CAPACITY: usize = 2048;

/// Number of independent DAC output channels.
pub const CHANNEL_COUNT: usize = 2;

/// DAC resolution in bits.
pub const DAC_BITS: u32 = 12;

/// DAC code for zero signal.
pub const DAC_MID_SCALE: u16 = 2048;

/// Largest DAC code.
pub const DAC_MAX_CODE: u16 = 4095;

/// Right shift that maps signed 16-bit PCM onto the DAC resolution.
#[allow(clippy::arithmetic_side_effects)] // Safety: compile-time constant, 16 - 12
pub const PCM_TO_DAC_SHIFT: u32 = 16 - DAC_BITS;

/// Length of a command frame on the wire.
pub const COMMAND_FRAME_LEN: usize = 5;

/// Length of a data frame header on the wire.
pub const DATA_HEADER_LEN: usize = 4;

/// Worst-case frame length: data header plus a full buffer of samples.
#[allow(clippy::arithmetic_side_effects)] // Safety: compile-time constant, 4 + 4096
pub const LANDING_BUFFER_LEN: usize = DATA_HEADER_LEN + 2 * BUFFER_CAPACITY;

/// Default iteration ceiling for the bounded force-disable sequence.
pub const DEFAULT_POLL_LIMIT: u32 = 10_000;

/// Runtime stream configuration.
///
/// Everything that sizes memory is a compile-time constant above; this value
/// only carries what the interrupt glue may want to tune per board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamConfig {
    /// Rate the shared sample clock is started at.
    pub sample_rate_hz: u32,
    /// Poll ceiling for force-disabling a transfer engine.
    pub poll_limit: u32,
    /// Electrical level meaning "ready" on the flow-control line.
    pub ready_polarity: ReadyPolarity,
}

impl StreamConfig {
    /// Lowest sample rate accepted by [`validate`](Self::validate).
    pub const MIN_SAMPLE_RATE_HZ: u32 = 8_000;

    /// Highest sample rate accepted by [`validate`](Self::validate).
    pub const MAX_SAMPLE_RATE_HZ: u32 = 96_000;

    /// Reference slave configuration: 32 kHz, 10 000 polls, active-low nRDY.
    #[must_use]
    pub const fn slave_default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            poll_limit: DEFAULT_POLL_LIMIT,
            ready_polarity: ReadyPolarity::ActiveLow,
        }
    }

    /// Check the rate window and the poll limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(Self::MIN_SAMPLE_RATE_HZ..=Self::MAX_SAMPLE_RATE_HZ).contains(&self.sample_rate_hz) {
            return Err(ConfigError::SampleRateOutOfRange {
                hz: self.sample_rate_hz,
                min: Self::MIN_SAMPLE_RATE_HZ,
                max: Self::MAX_SAMPLE_RATE_HZ,
            });
        }
        if self.poll_limit == 0 {
            return Err(ConfigError::ZeroPollLimit);
        }
        Ok(())
    }

    /// Playback duration of one full buffer, in microseconds.
    ///
    /// 2048 × 1 000 000 / 32 000 = 64 000 µs. Returns 0 for a zero rate.
    #[must_use]
    pub fn period_us(&self) -> u64 {
        (BUFFER_CAPACITY as u64)
            .saturating_mul(1_000_000)
            .checked_div(u64::from(self.sample_rate_hz))
            .unwrap_or(0)
    }

    /// Playback duration of one full buffer.
    #[must_use]
    pub fn period(&self) -> embassy_time::Duration {
        embassy_time::Duration::from_micros(self.period_us())
    }

    /// Bytes armed for every receive transfer.
    #[must_use]
    pub const fn landing_bytes(&self) -> usize {
        LANDING_BUFFER_LEN
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::slave_default()
    }
}
