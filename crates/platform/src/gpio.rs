//! Flow-control line abstraction
//!
//! The ready line is a plain push-pull output implementing
//! [`embedded_hal::digital::OutputPin`]. The reference board wires it as
//! `nRDY` (low = ready).

use embedded_hal::digital::{OutputPin, PinState};

/// Which electrical level means "ready for the next frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadyPolarity {
    /// Line driven low when ready (`nRDY`).
    #[default]
    ActiveLow,
    /// Line driven high when ready.
    ActiveHigh,
}

impl ReadyPolarity {
    /// Pin level for a given ready decision.
    #[must_use]
    pub const fn level(self, ready: bool) -> PinState {
        match (self, ready) {
            (Self::ActiveLow, true) | (Self::ActiveHigh, false) => PinState::Low,
            (Self::ActiveLow, false) | (Self::ActiveHigh, true) => PinState::High,
        }
    }
}

/// Drive `pin` to the level meaning `ready` under `polarity`.
pub fn drive_ready<P: OutputPin>(
    pin: &mut P,
    polarity: ReadyPolarity,
    ready: bool,
) -> Result<(), P::Error> {
    pin.set_state(polarity.level(ready))
}
