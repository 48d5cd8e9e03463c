//! Transfer-engine abstraction layer
//!
//! The streaming core drives three kinds of hardware:
//!
//! - one bounded receive transfer (SPI slave RX → landing buffer),
//! - one output transfer per DAC channel (sample buffer → DAC data register),
//! - one shared sample clock triggering both DAC channels.
//!
//! The vendor "abort" for these engines can spin forever when the peripheral
//! stops clocking mid-transfer, so the only cancellation path offered here is
//! [`force_disable`]: clear the stream enable bit, poll a bounded number of
//! times, then release the peripheral's request line regardless.

use crate::error::{PollTimeout, TransferError};

/// Low-level disable sequence shared by every transfer engine.
pub trait ForceDisable {
    /// Clear the stream enable bit. Must not wait.
    fn request_disable(&mut self);

    /// Read back the stream enable bit.
    fn is_enabled(&self) -> bool;

    /// Release the peripheral's DMA request line and mark the engine ready.
    /// Called after polling, whether or not the enable bit cleared.
    fn release(&mut self);
}

/// Disable `engine` with a hard ceiling of `poll_limit` polls.
///
/// Returns the number of polls it took. On timeout the request line is still
/// released; the caller logs the [`PollTimeout`] and does not retry inline.
pub fn force_disable<E>(engine: &mut E, poll_limit: u32) -> Result<u32, PollTimeout>
where
    E: ForceDisable + ?Sized,
{
    engine.request_disable();

    let mut polls: u32 = 0;
    let outcome = loop {
        if !engine.is_enabled() {
            break Ok(polls);
        }
        if polls >= poll_limit {
            break Err(PollTimeout { polls });
        }
        polls = polls.saturating_add(1);
        core::hint::spin_loop();
    };

    engine.release();
    outcome
}

/// Bounded receive transfer into a caller-owned landing buffer.
///
/// Implementations stop a running transfer when dropped.
pub trait RxTransfer: ForceDisable {
    /// True when the engine can be armed.
    fn is_ready(&self) -> bool;

    /// Reinitialise the engine to its ready state. Idempotent, never blocks.
    fn reset(&mut self);

    /// Arm a transfer of at most `buffer.len()` bytes.
    ///
    /// # Safety
    ///
    /// `buffer` must stay at its address, and must not be read or written by
    /// anyone else, until the transfer has been stopped with
    /// [`force_disable`] or the engine is dropped.
    unsafe fn start(&mut self, buffer: &mut [u8]) -> Result<(), TransferError>;

    /// Bytes still expected by the current (or last) transfer.
    ///
    /// Read before disabling: captured = armed length − remaining.
    fn remaining(&self) -> usize;
}

/// Per-channel engine draining a sample buffer into the DAC.
///
/// Implementations stop a running transfer when dropped.
pub trait OutputTransfer: ForceDisable {
    /// Bind `samples` and drain one sample per sample-clock trigger.
    ///
    /// The engine repeats the bound buffer. After the last sample it raises
    /// drain-complete and continues from the first, until it is
    /// force-disabled or started on another buffer. Drain-half fires at the
    /// midpoint of every pass. A channel that underruns keeps replaying its
    /// stale buffer, and its next drain-complete still arrives one buffer
    /// period later.
    ///
    /// # Safety
    ///
    /// `samples` must stay at its address, and must not be written, until
    /// the engine has been stopped with [`force_disable`], started on another
    /// buffer, or dropped.
    unsafe fn start(&mut self, samples: &[u16]) -> Result<(), TransferError>;

    /// Fallback: drive a constant code in software mode, no transfer.
    fn hold(&mut self, code: u16);
}

/// Shared hardware trigger for both output channels.
pub trait SampleClock {
    /// Start (or keep running) at `sample_rate_hz`.
    fn start(&mut self, sample_rate_hz: u32) -> Result<(), TransferError>;

    /// Stop the trigger.
    fn stop(&mut self);

    /// True while triggering.
    fn is_running(&self) -> bool;
}
