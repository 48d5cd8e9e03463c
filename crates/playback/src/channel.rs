//! Double-buffered sample store for one DAC channel.
//!
//! Each channel owns two fixed buffers. One is *active* (bound to the DAC
//! output engine and drained by hardware), the other is *fill* (written by
//! incoming data frames). They are never the same buffer.
//!
//! The two sides meet at exactly one point: the fill buffer becomes full.
//! Only then may [`AudioChannel::swap`] exchange the roles, and only from the
//! drain-complete event or while the channel is not playing. The role is a
//! single [`BufferSlot`] flag, so a swap is a flag flip plus an index reset,
//! both done inside the caller's critical section.

use core::ops::{Index, IndexMut};

use platform::audio_types::{ChannelId, VolumePercent};
use platform::stream_config::{
    BUFFER_CAPACITY, CHANNEL_COUNT, DAC_MAX_CODE, DAC_MID_SCALE, PCM_TO_DAC_SHIFT,
};

/// Samples per buffer.
pub const CAPACITY: usize = BUFFER_CAPACITY;

/// Which of the two owned buffers a role refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferSlot {
    /// First buffer; active after construction.
    A,
    /// Second buffer; fill target after construction.
    B,
}

impl BufferSlot {
    /// The opposite slot.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Lifetime counters for one channel.
///
/// Only [`AudioChannel::reset_counters`] clears them; RESET commands do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStats {
    /// Samples accepted into a fill buffer.
    pub total_samples: u32,
    /// Successful buffer swaps.
    pub buffer_swaps: u32,
    /// Drain-complete events with no full buffer to swap in.
    pub underruns: u32,
}

/// Convert one signed 16-bit PCM sample to a 12-bit DAC code.
///
/// The low four bits are discarded by an arithmetic shift, the result is
/// re-centred on mid-scale, and for `volume < 100` the offset from mid-scale
/// is scaled by `volume / 100` (truncating toward zero). The result is
/// clamped to `0..=4095`.
///
/// ```
/// use platform::VolumePercent;
/// use playback::channel::convert_sample;
///
/// assert_eq!(convert_sample(0, VolumePercent::FULL), 2048);
/// assert_eq!(convert_sample(i16::MAX, VolumePercent::FULL), 4095);
/// assert_eq!(convert_sample(i16::MIN, VolumePercent::FULL), 0);
/// assert_eq!(convert_sample(i16::MAX, VolumePercent::MUTE), 2048);
/// ```
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // Safety: |offset| <= 2048, × 100 fits i32; divisor is the constant 100
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Safety: clamped to 0..=4095 first
pub fn convert_sample(sample: i16, volume: VolumePercent) -> u16 {
    let mid = i32::from(DAC_MID_SCALE);
    let mut code = i32::from(sample >> PCM_TO_DAC_SHIFT) + mid;
    if !volume.is_full() {
        let offset = (code - mid) * i32::from(volume.get()) / 100;
        code = mid + offset;
    }
    code.clamp(0, i32::from(DAC_MAX_CODE)) as u16
}

/// One output channel: two sample buffers and their bookkeeping.
///
/// Roughly 8 KB; lives inside the statically allocated stream context.
pub struct AudioChannel {
    buffers: [[u16; CAPACITY]; 2],
    active: BufferSlot,
    fill_index: usize,
    playing: bool,
    underrun: bool,
    volume: VolumePercent,
    stats: ChannelStats,
}

impl AudioChannel {
    /// Both buffers at mid-scale, A active, volume 100, everything cleared.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffers: [[DAC_MID_SCALE; CAPACITY]; 2],
            active: BufferSlot::A,
            fill_index: 0,
            playing: false,
            underrun: false,
            volume: VolumePercent::FULL,
            stats: ChannelStats {
                total_samples: 0,
                buffer_swaps: 0,
                underruns: 0,
            },
        }
    }

    /// Convert and append samples to the fill buffer.
    ///
    /// Stops silently when the fill buffer is full; the rest of `samples` is
    /// not consumed. Returns how many samples were written. Never blocks.
    pub fn fill<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = i16>,
    {
        let volume = self.volume;
        let start = self.fill_index;
        let Some(buffer) = self.buffers.get_mut(self.active.other().index()) else {
            return 0;
        };
        let Some(free) = buffer.get_mut(start..) else {
            return 0;
        };

        let mut written = 0usize;
        for (slot, sample) in free.iter_mut().zip(samples) {
            *slot = convert_sample(sample, volume);
            written = written.saturating_add(1);
        }

        self.fill_index = start.saturating_add(written);
        self.stats.total_samples = self
            .stats
            .total_samples
            .saturating_add(u32::try_from(written).unwrap_or(u32::MAX));
        written
    }

    /// Exchange active and fill roles. Only succeeds on a full fill buffer.
    ///
    /// Call only when the engine has finished with the active buffer: from
    /// the drain-complete event, or while not playing.
    pub fn swap(&mut self) -> bool {
        if !self.is_full() {
            return false;
        }
        self.active = self.active.other();
        self.fill_index = 0;
        self.stats.buffer_swaps = self.stats.buffer_swaps.saturating_add(1);
        true
    }

    /// Half a buffer is queued (pre-buffer threshold before the first PLAY).
    #[must_use]
    pub fn ready(&self) -> bool {
        self.fill_index >= CAPACITY / 2
    }

    /// Fill buffer is complete and can be swapped in.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.fill_index >= CAPACITY
    }

    /// Stop, clear the fill position and underrun flag, re-zero both buffers.
    ///
    /// Volume, buffer roles and lifetime counters are kept.
    pub fn reset(&mut self) {
        self.playing = false;
        self.fill_index = 0;
        self.underrun = false;
        for buffer in &mut self.buffers {
            buffer.fill(DAC_MID_SCALE);
        }
    }

    /// Samples the output engine should be draining.
    #[must_use]
    pub fn active_samples(&self) -> &[u16] {
        self.buffers
            .get(self.active.index())
            .map(|buffer| buffer.as_slice())
            .unwrap_or(&[])
    }

    /// Samples written so far into the fill buffer.
    #[must_use]
    pub fn pending_samples(&self) -> &[u16] {
        self.buffers
            .get(self.active.other().index())
            .and_then(|buffer| buffer.get(..self.fill_index))
            .unwrap_or(&[])
    }

    /// Slot currently bound for draining.
    #[must_use]
    pub fn active_slot(&self) -> BufferSlot {
        self.active
    }

    /// Next write offset into the fill buffer.
    #[must_use]
    pub fn fill_index(&self) -> usize {
        self.fill_index
    }

    /// True between PLAY and STOP/RESET.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Sticky underrun flag.
    #[must_use]
    pub fn underrun(&self) -> bool {
        self.underrun
    }

    /// Set the underrun flag and count the event.
    pub fn mark_underrun(&mut self) {
        self.underrun = true;
        self.stats.underruns = self.stats.underruns.saturating_add(1);
    }

    /// Set the underrun flag without counting a missed swap.
    pub(crate) fn flag_underrun(&mut self) {
        self.underrun = true;
    }

    /// Clear the sticky underrun flag.
    pub fn clear_underrun(&mut self) {
        self.underrun = false;
    }

    /// Current volume.
    #[must_use]
    pub fn volume(&self) -> VolumePercent {
        self.volume
    }

    /// Set the volume applied to subsequently filled samples.
    pub fn set_volume(&mut self, volume: VolumePercent) {
        self.volume = volume;
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Zero the lifetime counters. Never called by command handling.
    pub fn reset_counters(&mut self) {
        self.stats = ChannelStats::default();
    }
}

impl Default for AudioChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Both output channels, indexed by [`ChannelId`].
pub struct ChannelPair([AudioChannel; CHANNEL_COUNT]);

impl ChannelPair {
    /// Two fresh channels.
    #[must_use]
    pub const fn new() -> Self {
        Self([AudioChannel::new(), AudioChannel::new()])
    }

    /// Channels in wire order.
    pub fn iter(&self) -> core::slice::Iter<'_, AudioChannel> {
        self.0.iter()
    }

    /// Channels in wire order, mutably.
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, AudioChannel> {
        self.0.iter_mut()
    }

    /// True if any channel is playing.
    #[must_use]
    pub fn any_playing(&self) -> bool {
        self.iter().any(AudioChannel::is_playing)
    }
}

impl Default for ChannelPair {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<ChannelId> for ChannelPair {
    type Output = AudioChannel;

    #[allow(clippy::indexing_slicing)] // Safety: ChannelId::index() < CHANNEL_COUNT for every variant
    fn index(&self, id: ChannelId) -> &AudioChannel {
        &self.0[id.index()]
    }
}

impl IndexMut<ChannelId> for ChannelPair {
    #[allow(clippy::indexing_slicing)] // Safety: ChannelId::index() < CHANNEL_COUNT for every variant
    fn index_mut(&mut self, id: ChannelId) -> &mut AudioChannel {
        &mut self.0[id.index()]
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn boxed_channel() -> Box<AudioChannel> {
        Box::new(AudioChannel::new())
    }

    #[test]
    fn test_new_channel_is_idle_at_mid_scale() {
        let ch = boxed_channel();
        assert_eq!(ch.fill_index(), 0);
        assert!(!ch.is_playing());
        assert!(!ch.underrun());
        assert!(ch.volume().is_full());
        assert_eq!(ch.active_slot(), BufferSlot::A);
        assert!(ch.active_samples().iter().all(|&s| s == DAC_MID_SCALE));
        assert_eq!(ch.stats(), ChannelStats::default());
    }

    #[test]
    fn test_fill_converts_and_counts() {
        let mut ch = boxed_channel();
        assert_eq!(ch.fill([0i16, i16::MAX, i16::MIN, 16]), 4);
        assert_eq!(ch.pending_samples(), &[2048, 4095, 0, 2049]);
        assert_eq!(ch.fill_index(), 4);
        assert_eq!(ch.stats().total_samples, 4);
    }

    #[test]
    fn test_fill_stops_at_capacity_and_drops_excess() {
        let mut ch = boxed_channel();
        assert_eq!(ch.fill(core::iter::repeat(100i16).take(CAPACITY - 10)), CAPACITY - 10);
        assert_eq!(ch.fill(core::iter::repeat(100i16).take(50)), 10);
        assert!(ch.is_full());
        assert_eq!(ch.fill([1i16, 2, 3]), 0);
        assert_eq!(ch.stats().total_samples, CAPACITY as u32);
    }

    #[test]
    fn test_fill_does_not_touch_active_buffer() {
        let mut ch = boxed_channel();
        ch.fill(core::iter::repeat(i16::MAX).take(CAPACITY));
        assert!(ch.active_samples().iter().all(|&s| s == DAC_MID_SCALE));
    }

    #[test]
    fn test_swap_requires_full_buffer() {
        let mut ch = boxed_channel();
        ch.fill(core::iter::repeat(0i16).take(CAPACITY - 1));
        assert!(!ch.swap());
        assert_eq!(ch.fill_index(), CAPACITY - 1);
        assert_eq!(ch.active_slot(), BufferSlot::A);
        assert_eq!(ch.stats().buffer_swaps, 0);
    }

    #[test]
    fn test_swap_exchanges_roles() {
        let mut ch = boxed_channel();
        ch.fill(core::iter::repeat(i16::MAX).take(CAPACITY));
        assert!(ch.swap());
        assert_eq!(ch.active_slot(), BufferSlot::B);
        assert_eq!(ch.fill_index(), 0);
        assert!(ch.active_samples().iter().all(|&s| s == 4095));
        assert_eq!(ch.stats().buffer_swaps, 1);
        assert!(!ch.swap());
    }

    #[test]
    fn test_ready_at_half_capacity() {
        let mut ch = boxed_channel();
        ch.fill(core::iter::repeat(0i16).take(CAPACITY / 2 - 1));
        assert!(!ch.ready());
        ch.fill([0i16]);
        assert!(ch.ready());
    }

    #[test]
    fn test_volume_scales_around_mid_scale() {
        let half = VolumePercent::new(50);
        // 0x7FF0 >> 4 = 2047; offset 2047 * 50 / 100 = 1023
        assert_eq!(convert_sample(0x7FF0, half), 2048 + 1023);
        // -32768 >> 4 = -2048; offset -2048 * 50 / 100 = -1024
        assert_eq!(convert_sample(i16::MIN, half), 2048 - 1024);
        assert_eq!(convert_sample(-16, VolumePercent::MUTE), 2048);
    }

    #[test]
    fn test_fill_uses_volume_at_fill_time() {
        let mut ch = boxed_channel();
        ch.set_volume(VolumePercent::MUTE);
        ch.fill([i16::MAX]);
        ch.set_volume(VolumePercent::FULL);
        ch.fill([i16::MAX]);
        assert_eq!(ch.pending_samples(), &[2048, 4095]);
    }

    #[test]
    fn test_reset_keeps_counters_and_volume() {
        let mut ch = boxed_channel();
        ch.set_volume(VolumePercent::new(30));
        ch.fill(core::iter::repeat(i16::MAX).take(CAPACITY));
        ch.swap();
        ch.set_playing(true);
        ch.mark_underrun();
        ch.fill([5i16; 10]);

        ch.reset();

        assert!(!ch.is_playing());
        assert!(!ch.underrun());
        assert_eq!(ch.fill_index(), 0);
        assert_eq!(ch.volume().get(), 30);
        assert!(ch.active_samples().iter().all(|&s| s == DAC_MID_SCALE));
        let stats = ch.stats();
        assert_eq!(stats.total_samples, CAPACITY as u32 + 10);
        assert_eq!(stats.buffer_swaps, 1);
        assert_eq!(stats.underruns, 1);
    }

    #[test]
    fn test_underrun_flag_and_counters() {
        let mut ch = boxed_channel();
        ch.mark_underrun();
        ch.mark_underrun();
        assert!(ch.underrun());
        ch.clear_underrun();
        assert!(!ch.underrun());
        assert_eq!(ch.stats().underruns, 2);
        ch.reset_counters();
        assert_eq!(ch.stats(), ChannelStats::default());
    }
}
