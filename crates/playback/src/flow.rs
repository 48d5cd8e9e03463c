//! Ready-line backpressure.
//!
//! - Any channel playing: always ready. Double buffering gives the master a
//!   full period to refill, so throttling would only add stalls.
//! - Nothing playing (pre-buffering): ready only while every channel still
//!   has room in its fill buffer, so an early master cannot overrun a buffer
//!   that nothing will drain until PLAY.
//!
//! While playing the slave assumes the master never sends more than one
//! period of samples between drain-complete events. That is not enforced.

use embedded_hal::digital::OutputPin;
use platform::gpio::{drive_ready, ReadyPolarity};

use crate::channel::ChannelPair;

/// Ready decision for the current channel state.
#[must_use]
pub fn compute_ready(channels: &ChannelPair) -> bool {
    channels.any_playing() || channels.iter().all(|ch| !ch.is_full())
}

/// Owns the ready pin and its last driven decision.
pub struct FlowController<P> {
    pin: P,
    polarity: ReadyPolarity,
    ready: bool,
    pin_faults: u32,
}

impl<P> FlowController<P> {
    /// Controller around `pin`. Reports not-ready until the first update.
    #[must_use]
    pub const fn new(pin: P, polarity: ReadyPolarity) -> Self {
        Self {
            pin,
            polarity,
            ready: false,
            pin_faults: 0,
        }
    }

    /// Last decision driven onto the line.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Pin writes that returned an error.
    pub fn pin_faults(&self) -> u32 {
        self.pin_faults
    }

    /// The ready pin.
    pub fn pin(&self) -> &P {
        &self.pin
    }

    /// The ready pin, mutably.
    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }
}

impl<P: OutputPin> FlowController<P> {
    /// Recompute and drive the line. Returns the new decision.
    pub fn update(&mut self, channels: &ChannelPair) -> bool {
        let ready = compute_ready(channels);
        if ready != self.ready {
            trace!("ready -> {}", ready);
        }
        if drive_ready(&mut self.pin, self.polarity, ready).is_err() {
            self.pin_faults = self.pin_faults.saturating_add(1);
        }
        self.ready = ready;
        ready
    }
}
