//! Diagnostic counters.
//!
//! Everything here is for humans reading the status report. No control
//! decision ever reads a counter. All counters saturate.

use platform::error::{DriverFault, InvalidChannel, PollTimeout};

use crate::protocol::ProtocolError;

/// Error and traffic counters for the receive and output paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorStats {
    /// Receive engine found in an unexpected state, or a transport error event.
    pub transport_faults: u32,
    /// Receive transfer could not be armed.
    pub arm_failures: u32,
    /// Force-disable sequences that ran out of polls.
    pub disable_timeouts: u32,
    /// Frames whose first byte is not a known header.
    pub invalid_header: u32,
    /// Frames naming a channel other than 0 or 1.
    pub invalid_channel: u32,
    /// Short commands, zero/oversized sample counts, truncated payloads.
    pub invalid_length: u32,
    /// Command frames with an unrecognised command code.
    pub unknown_commands: u32,
    /// Select-deasserts with fewer than 4 captured bytes.
    pub runt_frames: u32,
    /// Command frames parsed.
    pub command_frames: u32,
    /// Data frames parsed.
    pub data_frames: u32,
    /// Output engines that failed to start and are holding mid-scale.
    pub driver_faults: u32,
    /// Select-assert edges seen.
    pub select_asserts: u32,
    /// Select-deassert edges seen.
    pub select_deasserts: u32,
    /// Receive transfers that filled the whole landing buffer.
    pub capture_complete: u32,
    /// Bytes captured by the most recent frame (not a counter).
    pub last_frame_len: u32,
}

/// Saturating increment.
pub(crate) fn bump(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}

impl ErrorStats {
    /// All zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transport_faults: 0,
            arm_failures: 0,
            disable_timeouts: 0,
            invalid_header: 0,
            invalid_channel: 0,
            invalid_length: 0,
            unknown_commands: 0,
            runt_frames: 0,
            command_frames: 0,
            data_frames: 0,
            driver_faults: 0,
            select_asserts: 0,
            select_deasserts: 0,
            capture_complete: 0,
            last_frame_len: 0,
        }
    }

    /// Every frame dropped for a protocol reason.
    #[must_use]
    pub fn protocol_errors(&self) -> u32 {
        self.invalid_header
            .saturating_add(self.invalid_channel)
            .saturating_add(self.invalid_length)
            .saturating_add(self.unknown_commands)
            .saturating_add(self.runt_frames)
    }

    /// Count a parse failure under its category.
    pub fn record_protocol(&mut self, err: &ProtocolError) {
        match err {
            ProtocolError::Runt { .. } => bump(&mut self.runt_frames),
            ProtocolError::InvalidHeader(_) => bump(&mut self.invalid_header),
            ProtocolError::ShortCommand { .. }
            | ProtocolError::InvalidSampleCount(_)
            | ProtocolError::Truncated { .. } => bump(&mut self.invalid_length),
        }
    }

    /// Count a frame naming a channel that does not exist.
    pub fn record_invalid_channel(&mut self, _err: &InvalidChannel) {
        bump(&mut self.invalid_channel);
    }

    /// Count an output engine that fell back to mid-scale.
    pub fn record_driver_fault(&mut self, _fault: &DriverFault) {
        bump(&mut self.driver_faults);
    }

    /// Count a force-disable that hit its poll ceiling.
    pub fn record_timeout(&mut self, _timeout: &PollTimeout) {
        bump(&mut self.disable_timeouts);
    }

    /// Zero everything. Never called by command handling.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
