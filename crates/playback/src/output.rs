//! DAC output path: one drain engine per channel plus the shared sample clock.
//!
//! Each engine drains its channel's active buffer at the sample clock and
//! replays it until disabled, raising drain-complete at the end of every
//! pass. The two buffers never form one circular region, so the fill path
//! cannot write memory the engine is reading. On drain-complete a full fill
//! buffer is swapped in and the engine restarted on it. With nothing to swap
//! in, the engine keeps replaying the stale buffer and the next
//! drain-complete arrives one period later, which is where an underrun
//! recovers.
//!
//! A failed start never retries here. The channel holds mid-scale and the
//! next PLAY is the retry path.

use platform::audio_types::ChannelId;
use platform::dma::{force_disable, OutputTransfer, SampleClock};
use platform::error::{DriverFault, TransferError};
use platform::stream_config::{CHANNEL_COUNT, DAC_MID_SCALE};

use crate::channel::{AudioChannel, ChannelPair};
use crate::stats::{bump, ErrorStats};

/// What a drain-complete event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DrainOutcome {
    /// Fill buffer was full: roles exchanged, engine rebound.
    Swapped,
    /// Nothing to swap in: underrun flagged, engine left on the stale buffer.
    Underrun,
    /// Channel is not playing; late event after a stop.
    Idle,
}

/// Per-channel drain event counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrainCounters {
    /// Half-transfer events (informational).
    pub half: u32,
    /// Drain-complete events.
    pub complete: u32,
}

/// Output engines, the sample clock and per-channel fallback state.
pub struct OutputDriver<O, C> {
    engines: [O; CHANNEL_COUNT],
    clock: C,
    sample_rate_hz: u32,
    poll_limit: u32,
    holding: [bool; CHANNEL_COUNT],
    drains: [DrainCounters; CHANNEL_COUNT],
}

impl<O, C> OutputDriver<O, C> {
    /// Driver around two engines and one clock. Nothing is started.
    #[must_use]
    pub const fn new(engines: [O; CHANNEL_COUNT], clock: C, sample_rate_hz: u32, poll_limit: u32) -> Self {
        Self {
            engines,
            clock,
            sample_rate_hz,
            poll_limit,
            holding: [false; CHANNEL_COUNT],
            drains: [DrainCounters { half: 0, complete: 0 }; CHANNEL_COUNT],
        }
    }

    /// Engine for `id`.
    #[allow(clippy::indexing_slicing)] // Safety: ChannelId::index() < CHANNEL_COUNT
    pub fn engine(&self, id: ChannelId) -> &O {
        &self.engines[id.index()]
    }

    /// Engine for `id`, mutably.
    #[allow(clippy::indexing_slicing)] // Safety: ChannelId::index() < CHANNEL_COUNT
    pub fn engine_mut(&mut self, id: ChannelId) -> &mut O {
        &mut self.engines[id.index()]
    }

    /// The shared sample clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The shared sample clock, mutably.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// True while `id` holds mid-scale after a failed start.
    #[allow(clippy::indexing_slicing)] // Safety: ChannelId::index() < CHANNEL_COUNT
    pub fn is_holding(&self, id: ChannelId) -> bool {
        self.holding[id.index()]
    }

    /// Drain event counters for `id`.
    #[allow(clippy::indexing_slicing)] // Safety: ChannelId::index() < CHANNEL_COUNT
    pub fn drains(&self, id: ChannelId) -> DrainCounters {
        self.drains[id.index()]
    }

    /// Zero the drain counters.
    pub fn reset_counters(&mut self) {
        self.drains = [DrainCounters::default(); CHANNEL_COUNT];
    }

    #[allow(clippy::indexing_slicing)] // Safety: ChannelId::index() < CHANNEL_COUNT
    fn set_holding(&mut self, id: ChannelId, holding: bool) {
        self.holding[id.index()] = holding;
    }

    #[allow(clippy::indexing_slicing)] // Safety: ChannelId::index() < CHANNEL_COUNT
    fn drains_mut(&mut self, id: ChannelId) -> &mut DrainCounters {
        &mut self.drains[id.index()]
    }
}

impl<O: OutputTransfer, C: SampleClock> OutputDriver<O, C> {
    /// Bind `channel`'s active buffer to its engine and start the clock.
    ///
    /// On failure the engine holds mid-scale, the fault is counted and
    /// logged, and `false` is returned. No retry.
    ///
    /// # Safety
    ///
    /// `channel` must stay at its address, and must not be dropped, until
    /// this engine is stopped with [`stop`](Self::stop), started again, or
    /// dropped.
    pub unsafe fn start(&mut self, id: ChannelId, channel: &AudioChannel, stats: &mut ErrorStats) -> bool {
        // SAFETY: the caller upholds this function's contract.
        match unsafe { self.try_start(id, channel) } {
            Ok(()) => {
                self.set_holding(id, false);
                debug!("ch{} output started", id.raw());
                true
            }
            Err(fault) => {
                self.engine_mut(id).hold(DAC_MID_SCALE);
                self.set_holding(id, true);
                stats.record_driver_fault(&fault);
                error!("ch{} holding mid-scale: {}", id.raw(), fault);
                false
            }
        }
    }

    /// # Safety
    ///
    /// As for [`start`](Self::start).
    unsafe fn try_start(&mut self, id: ChannelId, channel: &AudioChannel) -> Result<(), DriverFault> {
        let rate = self.sample_rate_hz;
        let engine = self.engine_mut(id);
        // SAFETY: the caller keeps `channel` in place until this engine stops
        // or is restarted. The fill path only writes the other buffer, roles
        // change only in `on_drain_complete` (after this engine finished the
        // buffer) or while stopped, and `AudioChannel::reset` runs only after
        // `stop`.
        unsafe { engine.start(channel.active_samples()) }
            .map_err(|cause| DriverFault { channel: id, cause })?;

        if !self.clock.is_running() {
            self.clock.start(rate).map_err(|_| DriverFault {
                channel: id,
                cause: TransferError::ClockFault,
            })?;
        }
        Ok(())
    }

    /// Force-disable the engine for `id`. Bounded; a timeout is counted.
    pub fn stop(&mut self, id: ChannelId, stats: &mut ErrorStats) {
        let poll_limit = self.poll_limit;
        match force_disable(self.engine_mut(id), poll_limit) {
            Ok(polls) => trace!("ch{} disabled after {} polls", id.raw(), polls),
            Err(timeout) => {
                stats.record_timeout(&timeout);
                warn!("ch{} disable: {}", id.raw(), timeout);
            }
        }
        self.set_holding(id, false);
    }

    /// Stop the shared clock once no channel is playing.
    pub fn stop_clock_if_idle(&mut self, channels: &ChannelPair) {
        if !channels.any_playing() && self.clock.is_running() {
            self.clock.stop();
            debug!("sample clock stopped");
        }
    }

    /// Half of the active buffer has been drained. Informational.
    pub fn on_drain_half(&mut self, id: ChannelId) {
        bump(&mut self.drains_mut(id).half);
    }

    /// The whole active buffer has been drained.
    ///
    /// Swaps and rebinds when the fill buffer is full; otherwise flags an
    /// underrun and leaves the engine replaying the stale buffer.
    ///
    /// # Safety
    ///
    /// As for [`start`](Self::start): the engine may be restarted on
    /// `channel`'s new active buffer.
    pub unsafe fn on_drain_complete(
        &mut self,
        id: ChannelId,
        channel: &mut AudioChannel,
        stats: &mut ErrorStats,
    ) -> DrainOutcome {
        bump(&mut self.drains_mut(id).complete);

        if !channel.is_playing() {
            return DrainOutcome::Idle;
        }

        if channel.swap() {
            channel.clear_underrun();
            self.stop(id, stats);
            // SAFETY: the caller upholds this function's contract, which is
            // the one `start` needs.
            unsafe { self.start(id, channel, stats) };
            trace!("ch{} swapped", id.raw());
            DrainOutcome::Swapped
        } else {
            channel.mark_underrun();
            debug!("ch{} underrun at fill {}", id.raw(), channel.fill_index());
            DrainOutcome::Underrun
        }
    }

    /// The engine reported a transfer error. Output continues; the channel is
    /// flagged underrun and a driver fault is counted.
    pub fn on_output_fault(&mut self, id: ChannelId, channel: &mut AudioChannel, stats: &mut ErrorStats) {
        bump(&mut stats.driver_faults);
        if channel.is_playing() {
            channel.flag_underrun();
        }
        warn!("ch{} output transfer error", id.raw());
    }
}
