//! Mock implementations for testing
//!
//! Host stand-ins for the receive engine, the DAC output engines, the sample
//! clock and the ready line. Every mock has a `const fn new` so a whole
//! stream context can be built in a `static` on the host, the same way the
//! firmware builds it on the target.

#![cfg(any(test, feature = "std"))]

use core::cell::Cell;
use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin, PinState};

use crate::dma::{ForceDisable, OutputTransfer, RxTransfer, SampleClock};
use crate::error::TransferError;
use crate::stream_config::LANDING_BUFFER_LEN;

// ── Receive engine ───────────────────────────────────────────────────────────

/// Mock SPI slave receive transfer.
///
/// Bytes staged with [`stage`](Self::stage) are "clocked in" when the
/// transfer is armed, so a test can stage a frame, raise select-assert, then
/// raise select-deassert and see exactly those bytes captured.
pub struct MockRxTransfer {
    staged: heapless::Vec<u8, LANDING_BUFFER_LEN>,
    armed_len: usize,
    captured: usize,
    enabled: bool,
    ready: bool,
    stuck: bool,
    fail_next_start: bool,
    polls: Cell<u32>,
    resets: u32,
}

impl MockRxTransfer {
    /// Create a ready, idle engine.
    pub const fn new() -> Self {
        Self {
            staged: heapless::Vec::new(),
            armed_len: 0,
            captured: 0,
            enabled: false,
            ready: true,
            stuck: false,
            fail_next_start: false,
            polls: Cell::new(0),
            resets: 0,
        }
    }

    /// Stage bytes for the next armed transfer. Returns how many fit.
    pub fn stage(&mut self, bytes: &[u8]) -> usize {
        self.staged.clear();
        let n = bytes.len().min(LANDING_BUFFER_LEN);
        let _ = self.staged.extend_from_slice(bytes.get(..n).unwrap_or_default());
        n
    }

    /// Put the engine into an error state until the next [`reset`](RxTransfer::reset).
    pub fn set_not_ready(&mut self) {
        self.ready = false;
    }

    /// Make the next `start` fail.
    pub fn fail_next_start(&mut self) {
        self.fail_next_start = true;
    }

    /// Keep the enable bit set no matter how long it is polled.
    pub fn set_stuck(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    /// Number of forced resets.
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Total enable-bit reads.
    pub fn polls(&self) -> u32 {
        self.polls.get()
    }

    /// True while a transfer is armed.
    pub fn is_armed(&self) -> bool {
        self.enabled
    }
}

impl Default for MockRxTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl ForceDisable for MockRxTransfer {
    fn request_disable(&mut self) {
        if !self.stuck {
            self.enabled = false;
        }
    }

    fn is_enabled(&self) -> bool {
        self.polls.set(self.polls.get().saturating_add(1));
        self.enabled
    }

    fn release(&mut self) {
        self.enabled = false;
    }
}

impl RxTransfer for MockRxTransfer {
    fn is_ready(&self) -> bool {
        self.ready && !self.enabled
    }

    fn reset(&mut self) {
        self.ready = true;
        self.enabled = false;
        self.resets = self.resets.saturating_add(1);
    }

    unsafe fn start(&mut self, buffer: &mut [u8]) -> Result<(), TransferError> {
        if self.fail_next_start {
            self.fail_next_start = false;
            return Err(TransferError::Rejected);
        }
        if !self.is_ready() {
            return Err(TransferError::NotReady);
        }
        let mut captured = 0usize;
        for (slot, byte) in buffer.iter_mut().zip(self.staged.iter()) {
            *slot = *byte;
            captured = captured.saturating_add(1);
        }
        self.staged.clear();
        self.armed_len = buffer.len();
        self.captured = captured;
        self.enabled = true;
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.armed_len.saturating_sub(self.captured)
    }
}

// ── Output engine ────────────────────────────────────────────────────────────

/// Mock DAC output transfer for one channel.
///
/// Records the address, length and first sample of the buffer it was bound
/// to, so tests can tell which of a channel's two buffers is being drained.
pub struct MockOutputTransfer {
    enabled: bool,
    bound_addr: usize,
    bound_len: usize,
    first_sample: Option<u16>,
    held: Option<u16>,
    stuck: bool,
    fail_starts: u32,
    polls: Cell<u32>,
    starts: u32,
    releases: u32,
}

impl MockOutputTransfer {
    /// Create an idle engine bound to nothing.
    pub const fn new() -> Self {
        Self {
            enabled: false,
            bound_addr: 0,
            bound_len: 0,
            first_sample: None,
            held: None,
            stuck: false,
            fail_starts: 0,
            polls: Cell::new(0),
            starts: 0,
            releases: 0,
        }
    }

    /// Make the next `count` starts fail.
    pub fn fail_next_starts(&mut self, count: u32) {
        self.fail_starts = count;
    }

    /// Keep the enable bit set no matter how long it is polled.
    pub fn set_stuck(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    /// Address of the buffer last bound, if any.
    pub fn bound_addr(&self) -> Option<usize> {
        (self.bound_len > 0).then_some(self.bound_addr)
    }

    /// Length of the buffer last bound.
    pub fn bound_len(&self) -> usize {
        self.bound_len
    }

    /// First sample of the buffer at bind time.
    pub fn first_sample(&self) -> Option<u16> {
        self.first_sample
    }

    /// Constant code being held after a failed start.
    pub fn held_code(&self) -> Option<u16> {
        self.held
    }

    /// Number of successful starts.
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// Number of request-line releases.
    pub fn releases(&self) -> u32 {
        self.releases
    }

    /// Total enable-bit reads.
    pub fn polls(&self) -> u32 {
        self.polls.get()
    }

    /// True while draining.
    pub fn is_running(&self) -> bool {
        self.enabled
    }
}

impl Default for MockOutputTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl ForceDisable for MockOutputTransfer {
    fn request_disable(&mut self) {
        if !self.stuck {
            self.enabled = false;
        }
    }

    fn is_enabled(&self) -> bool {
        self.polls.set(self.polls.get().saturating_add(1));
        self.enabled
    }

    fn release(&mut self) {
        self.enabled = false;
        self.releases = self.releases.saturating_add(1);
    }
}

impl OutputTransfer for MockOutputTransfer {
    unsafe fn start(&mut self, samples: &[u16]) -> Result<(), TransferError> {
        if self.fail_starts > 0 {
            self.fail_starts = self.fail_starts.saturating_sub(1);
            return Err(TransferError::Rejected);
        }
        self.bound_addr = samples.as_ptr() as usize;
        self.bound_len = samples.len();
        self.first_sample = samples.first().copied();
        self.held = None;
        self.enabled = true;
        self.starts = self.starts.saturating_add(1);
        Ok(())
    }

    fn hold(&mut self, code: u16) {
        self.enabled = false;
        self.held = Some(code);
    }
}

// ── Sample clock ─────────────────────────────────────────────────────────────

/// Mock shared sample-rate timer.
pub struct MockSampleClock {
    running: bool,
    rate_hz: u32,
    fail_next_start: bool,
}

impl MockSampleClock {
    /// Create a stopped clock.
    pub const fn new() -> Self {
        Self {
            running: false,
            rate_hz: 0,
            fail_next_start: false,
        }
    }

    /// Make the next `start` fail.
    pub fn fail_next_start(&mut self) {
        self.fail_next_start = true;
    }

    /// Rate passed to the last successful start.
    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }
}

impl Default for MockSampleClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleClock for MockSampleClock {
    fn start(&mut self, sample_rate_hz: u32) -> Result<(), TransferError> {
        if self.fail_next_start {
            self.fail_next_start = false;
            return Err(TransferError::ClockFault);
        }
        self.running = true;
        self.rate_hz = sample_rate_hz;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

// ── Ready line ───────────────────────────────────────────────────────────────

/// Mock flow-control output pin recording its level.
pub struct MockReadyPin {
    level: PinState,
}

impl MockReadyPin {
    /// Create a pin idling high (not ready for an active-low line).
    pub const fn new() -> Self {
        Self { level: PinState::High }
    }

    /// Current level.
    pub fn level(&self) -> PinState {
        self.level
    }
}

impl Default for MockReadyPin {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for MockReadyPin {
    type Error = Infallible;
}

impl OutputPin for MockReadyPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.level = PinState::Low;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.level = PinState::High;
        Ok(())
    }
}
