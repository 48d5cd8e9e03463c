//! Select-edge framed receiver.
//!
//! The master frames every transfer with the select line, and frames have
//! different lengths. The receiver therefore never asks for a frame length:
//!
//! ```text
//!            select asserted                 select deasserted
//!   Idle ─────────────────────────► Capturing ─────────────────────► Idle
//!         arm RX for 4100 bytes               captured = 4100 − remaining
//!                                             force-disable RX
//!                                             hand span to the parser
//! ```
//!
//! The residual count is read *before* the engine is disabled; disabling
//! may clear it. The engine's vendor abort can hang when the master stops
//! clocking mid-byte, so the only stop path is the bounded
//! [`force_disable`].

use platform::dma::{force_disable, RxTransfer};
use platform::stream_config::{COMMAND_FRAME_LEN, DATA_HEADER_LEN, LANDING_BUFFER_LEN};

use crate::stats::{bump, ErrorStats};

/// Receiver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiverState {
    /// Select inactive; waiting for the next assert edge.
    Idle,
    /// Select active; the engine is streaming into the landing buffer.
    Capturing,
}

/// Frame receiver owning the RX engine and the landing buffer.
pub struct FrameReceiver<R> {
    engine: R,
    landing: [u8; LANDING_BUFFER_LEN],
    state: ReceiverState,
    captured: usize,
    last_head: heapless::Vec<u8, COMMAND_FRAME_LEN>,
    poll_limit: u32,
}

impl<R> FrameReceiver<R> {
    /// Idle receiver around `engine`.
    #[must_use]
    pub const fn new(engine: R, poll_limit: u32) -> Self {
        Self {
            engine,
            landing: [0; LANDING_BUFFER_LEN],
            state: ReceiverState::Idle,
            captured: 0,
            last_head: heapless::Vec::new(),
            poll_limit,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Span captured by the last completed frame.
    pub fn frame(&self) -> &[u8] {
        self.landing.get(..self.captured).unwrap_or(&[])
    }

    /// First bytes of the last frame handed to the parser.
    pub fn last_head(&self) -> &[u8] {
        &self.last_head
    }

    /// The receive engine.
    pub fn engine(&self) -> &R {
        &self.engine
    }

    /// The receive engine, mutably (host tests stage wire bytes through this).
    pub fn engine_mut(&mut self) -> &mut R {
        &mut self.engine
    }
}

impl<R: RxTransfer> FrameReceiver<R> {
    /// Select asserted: arm a worst-case-length transfer.
    ///
    /// An engine that is not ready is reset first and counted as a transport
    /// fault. An assert while already capturing means the previous deassert
    /// was missed; that frame is abandoned.
    ///
    /// # Safety
    ///
    /// The receiver must stay at its address until the engine is
    /// force-disabled again: by [`on_select_deasserted`](Self::on_select_deasserted),
    /// [`on_transport_fault`](Self::on_transport_fault), the next assert, or
    /// dropping the receiver.
    pub unsafe fn on_select_asserted(&mut self, stats: &mut ErrorStats) {
        bump(&mut stats.select_asserts);

        if self.state == ReceiverState::Capturing {
            warn!("select asserted while capturing; dropping partial frame");
            bump(&mut stats.transport_faults);
            self.stop_engine(stats);
        }

        if !self.engine.is_ready() {
            warn!("rx engine not ready at select assert; resetting");
            bump(&mut stats.transport_faults);
            self.engine.reset();
        }

        // SAFETY: the caller keeps `self`, and so `landing`, in place until
        // the engine is force-disabled. Nothing here reads `landing` before
        // that, and the engine is dropped together with it.
        match unsafe { self.engine.start(&mut self.landing) } {
            Ok(()) => {
                self.state = ReceiverState::Capturing;
                trace!("rx armed for {} bytes", LANDING_BUFFER_LEN);
            }
            Err(err) => {
                self.state = ReceiverState::Idle;
                bump(&mut stats.arm_failures);
                warn!("rx arm failed: {}", err);
            }
        }
    }

    /// Select deasserted: stop the transfer and return the captured length
    /// if it is long enough to parse.
    pub fn on_select_deasserted(&mut self, stats: &mut ErrorStats) -> Option<usize> {
        bump(&mut stats.select_deasserts);

        if self.state != ReceiverState::Capturing {
            trace!("select deasserted with no transfer armed");
            return None;
        }

        let captured = LANDING_BUFFER_LEN.saturating_sub(self.engine.remaining());
        self.stop_engine(stats);
        self.state = ReceiverState::Idle;
        self.captured = captured;
        stats.last_frame_len = u32::try_from(captured).unwrap_or(u32::MAX);

        if captured < DATA_HEADER_LEN {
            bump(&mut stats.runt_frames);
            debug!("runt frame: {} bytes", captured);
            return None;
        }

        self.last_head.clear();
        let head = self.landing.iter().take(captured.min(COMMAND_FRAME_LEN));
        for byte in head {
            let _ = self.last_head.push(*byte);
        }
        Some(captured)
    }

    /// The transfer filled the whole landing buffer before deassert.
    ///
    /// The frame is still finalised by the deassert edge.
    pub fn on_capture_complete(&mut self, stats: &mut ErrorStats) {
        bump(&mut stats.capture_complete);
        trace!("rx landing buffer full");
    }

    /// The peripheral reported an error: drop the frame and re-arm on the
    /// next assert edge.
    pub fn on_transport_fault(&mut self, stats: &mut ErrorStats) {
        bump(&mut stats.transport_faults);
        warn!("rx transport fault; reinitialising engine");
        self.stop_engine(stats);
        self.engine.reset();
        self.state = ReceiverState::Idle;
    }

    fn stop_engine(&mut self, stats: &mut ErrorStats) {
        if let Err(timeout) = force_disable(&mut self.engine, self.poll_limit) {
            stats.record_timeout(&timeout);
            warn!("rx disable: {}", timeout);
            self.engine.reset();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use platform::mocks::MockRxTransfer;

    fn receiver() -> Box<FrameReceiver<MockRxTransfer>> {
        Box::new(FrameReceiver::new(MockRxTransfer::new(), 100))
    }

    fn assert_select(rx: &mut FrameReceiver<MockRxTransfer>, stats: &mut ErrorStats) {
        // SAFETY: every receiver here is boxed and never moved.
        unsafe { rx.on_select_asserted(stats) }
    }

    fn capture(rx: &mut FrameReceiver<MockRxTransfer>, wire: &[u8], stats: &mut ErrorStats) -> Option<usize> {
        rx.engine_mut().stage(wire);
        assert_select(rx, stats);
        rx.on_select_deasserted(stats)
    }

    #[test]
    fn test_command_frame_is_captured_exactly() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        let wire = [0xC0, 0x00, 0x01, 0x00, 0x00];
        assert_eq!(capture(&mut rx, &wire, &mut stats), Some(5));
        assert_eq!(rx.frame(), &wire);
        assert_eq!(rx.last_head(), &wire);
        assert_eq!(rx.state(), ReceiverState::Idle);
        assert_eq!(stats.last_frame_len, 5);
        assert_eq!(stats.select_asserts, 1);
        assert_eq!(stats.select_deasserts, 1);
    }

    #[test]
    fn test_long_frame_head_snapshot_is_five_bytes() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        let wire = [0xDA, 0x01, 0x00, 0x02, 1, 2, 3, 4];
        assert_eq!(capture(&mut rx, &wire, &mut stats), Some(8));
        assert_eq!(rx.last_head(), &wire[..5]);
    }

    #[test]
    fn test_runt_frames_are_counted_not_returned() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        assert_eq!(capture(&mut rx, &[0xC0, 0x00, 0x01], &mut stats), None);
        assert_eq!(capture(&mut rx, &[], &mut stats), None);
        assert_eq!(stats.runt_frames, 2);
        assert_eq!(stats.last_frame_len, 0);
    }

    #[test]
    fn test_not_ready_engine_is_reset_and_counted() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        rx.engine_mut().set_not_ready();
        assert_eq!(capture(&mut rx, &[0xC0, 0x00, 0x02, 0x00, 0x00], &mut stats), Some(5));
        assert_eq!(stats.transport_faults, 1);
        assert_eq!(rx.engine().resets(), 1);
    }

    #[test]
    fn test_arm_failure_leaves_receiver_idle() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        rx.engine_mut().fail_next_start();
        assert_eq!(capture(&mut rx, &[0xC0, 0x00, 0x02, 0x00, 0x00], &mut stats), None);
        assert_eq!(stats.arm_failures, 1);
        assert_eq!(rx.state(), ReceiverState::Idle);
        // next frame goes through
        assert_eq!(capture(&mut rx, &[0xC0, 0x00, 0x02, 0x00, 0x00], &mut stats), Some(5));
    }

    #[test]
    fn test_stuck_engine_times_out_without_hanging() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        rx.engine_mut().set_stuck(true);
        assert_eq!(capture(&mut rx, &[0xC0, 0x00, 0x02, 0x00, 0x00], &mut stats), Some(5));
        assert_eq!(stats.disable_timeouts, 1);
        // 100-poll ceiling: 101 reads of the enable bit
        assert_eq!(rx.engine().polls(), 101);
        assert!(!rx.engine().is_armed());
    }

    #[test]
    fn test_missed_deassert_abandons_partial_frame() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        assert_select(&mut rx, &mut stats);
        rx.engine_mut().stage(&[0xC0, 0x01, 0x01, 0x00, 0x00]);
        assert_select(&mut rx, &mut stats);
        assert_eq!(stats.transport_faults, 1);
        assert_eq!(rx.on_select_deasserted(&mut stats), Some(5));
    }

    #[test]
    fn test_transport_fault_drops_frame() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        rx.engine_mut().stage(&[0xC0, 0x00, 0x01, 0x00, 0x00]);
        assert_select(&mut rx, &mut stats);
        rx.on_transport_fault(&mut stats);
        assert_eq!(rx.on_select_deasserted(&mut stats), None);
        assert_eq!(stats.transport_faults, 1);
        assert_eq!(rx.state(), ReceiverState::Idle);
    }

    #[test]
    fn test_capture_complete_is_counted() {
        let mut rx = receiver();
        let mut stats = ErrorStats::new();
        rx.on_capture_complete(&mut stats);
        assert_eq!(stats.capture_complete, 1);
    }
}
