//! Applies parsed frames to the channels and the output path.
//!
//! | Command | Effect                                                              |
//! |---------|---------------------------------------------------------------------|
//! | PLAY    | stop a running session, swap in a full fill buffer, start output     |
//! | STOP    | stop output; stop the clock once both channels are idle              |
//! | VOLUME  | clamp `param` to 0–100                                              |
//! | RESET   | STOP, then reinitialise buffers and flags (counters kept)            |
//!
//! Data frames are accepted whether or not the channel is playing, so the
//! master can pre-buffer before the first PLAY. Nothing here touches the
//! ready line; the context re-evaluates it after every dispatch.

use platform::audio_types::{ChannelId, VolumePercent};
use platform::dma::{OutputTransfer, SampleClock};

use crate::channel::ChannelPair;
use crate::output::OutputDriver;
use crate::protocol::{parse_frame, Command, CommandFrame, DataFrame, Frame};
use crate::stats::{bump, ErrorStats};

/// Borrowed view of the state a frame may mutate.
pub struct Dispatcher<'a, O, C> {
    channels: &'a mut ChannelPair,
    output: &'a mut OutputDriver<O, C>,
    stats: &'a mut ErrorStats,
}

impl<'a, O: OutputTransfer, C: SampleClock> Dispatcher<'a, O, C> {
    /// Borrow the mutable stream state for one dispatch.
    ///
    /// # Safety
    ///
    /// PLAY binds an engine of `output` to a buffer inside `channels`.
    /// `channels` must stay at its address, and must not be dropped, until
    /// every engine started through this dispatcher is stopped, restarted
    /// on another buffer, or dropped.
    pub unsafe fn new(
        channels: &'a mut ChannelPair,
        output: &'a mut OutputDriver<O, C>,
        stats: &'a mut ErrorStats,
    ) -> Self {
        Self {
            channels,
            output,
            stats,
        }
    }

    /// Parse a captured span and apply it. Protocol errors are counted and
    /// the frame dropped with no channel touched.
    pub fn dispatch_span(&mut self, span: &[u8]) {
        match parse_frame(span) {
            Ok(frame) => self.apply(frame),
            Err(err) => {
                self.stats.record_protocol(&err);
                warn!("frame dropped: {}", err);
            }
        }
    }

    /// Apply a parsed frame.
    pub fn apply(&mut self, frame: Frame<'_>) {
        match frame {
            Frame::Command(cmd) => {
                bump(&mut self.stats.command_frames);
                self.apply_command(cmd);
            }
            Frame::Data(data) => {
                bump(&mut self.stats.data_frames);
                self.apply_data(&data);
            }
        }
    }

    fn channel_id(&mut self, raw: u8) -> Option<ChannelId> {
        match ChannelId::try_from(raw) {
            Ok(id) => Some(id),
            Err(err) => {
                self.stats.record_invalid_channel(&err);
                warn!("frame dropped: {}", err);
                None
            }
        }
    }

    fn apply_command(&mut self, cmd: CommandFrame) {
        let Some(id) = self.channel_id(cmd.channel) else {
            return;
        };
        match cmd.command {
            Command::Play => self.play(id),
            Command::Stop => self.stop(id),
            Command::Volume => {
                let volume = VolumePercent::from_param(cmd.param);
                self.channels[id].set_volume(volume);
                debug!("ch{} volume {}", id.raw(), volume.get());
            }
            Command::Reset => self.reset(id),
            Command::Unknown(code) => {
                bump(&mut self.stats.unknown_commands);
                warn!("ch{} unknown command {}", id.raw(), code);
            }
        }
    }

    fn apply_data(&mut self, data: &DataFrame<'_>) {
        let Some(id) = self.channel_id(data.channel) else {
            return;
        };
        let channel = &mut self.channels[id];
        let written = channel.fill(data.samples());
        if written < data.sample_count() {
            debug!(
                "ch{} fill buffer full, dropped {} samples",
                id.raw(),
                data.sample_count().saturating_sub(written)
            );
        }
    }

    /// PLAY: restart output on the channel's active buffer.
    ///
    /// An empty or partial buffer still starts; output is whatever the
    /// active buffer holds (mid-scale after reset).
    pub fn play(&mut self, id: ChannelId) {
        if self.channels[id].is_playing() {
            debug!("ch{} PLAY while playing; restarting", id.raw());
            self.output.stop(id, self.stats);
            self.channels[id].set_playing(false);
        }

        let channel = &mut self.channels[id];
        if channel.is_full() {
            channel.swap();
        }
        channel.set_playing(true);
        channel.clear_underrun();

        // SAFETY: `new`'s caller keeps `channels` in place while engines run.
        if !unsafe { self.output.start(id, &self.channels[id], self.stats) } {
            warn!("ch{} PLAY without output", id.raw());
        }
        info!("ch{} PLAY", id.raw());
    }

    /// STOP: halt output with the bounded disable sequence.
    pub fn stop(&mut self, id: ChannelId) {
        if !self.channels[id].is_playing() {
            return;
        }
        self.channels[id].set_playing(false);
        self.output.stop(id, self.stats);
        self.output.stop_clock_if_idle(self.channels);
        info!("ch{} STOP", id.raw());
    }

    /// RESET: STOP, then reinitialise the channel.
    pub fn reset(&mut self, id: ChannelId) {
        self.stop(id);
        self.channels[id].reset();
        info!("ch{} RESET", id.raw());
    }
}
