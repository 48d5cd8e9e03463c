//! Periodic status report.
//!
//! [`StatusReport`] renders a [`StatusSnapshot`] as a fixed text block;
//! [`report`] sends it to whichever diagnostic sink the build enables.
//!
//! ```text
//! ch0 PLAY fill 1024/2048 vol 100 active A | swaps 12 underruns 0 samples 26624 | drains 12/12
//! ch1 idle fill 0/2048 vol 100 active A | swaps 0 underruns 0 samples 0 | drains 0/0
//! rx Idle ready 1 clock 1 | frames cmd 2 data 104 | last 4 bytes DA 00 01 00
//! errors header 0 channel 0 length 0 unknown 0 runt 0 | transport 0 arm 0 timeout 0 driver 0
//! ```

use core::fmt;

use platform::stream_config::BUFFER_CAPACITY;
use playback::{BufferSlot, ChannelStatus, StatusSnapshot};

/// Text rendering of a [`StatusSnapshot`].
pub struct StatusReport<'a>(pub &'a StatusSnapshot);

fn write_channel(f: &mut fmt::Formatter<'_>, index: usize, ch: &ChannelStatus) -> fmt::Result {
    let state = match (ch.playing, ch.underrun, ch.holding) {
        (false, _, _) => "idle",
        (true, _, true) => "HOLD",
        (true, true, false) => "UNDERRUN",
        (true, false, false) => "PLAY",
    };
    let active = match ch.active {
        BufferSlot::A => 'A',
        BufferSlot::B => 'B',
    };
    writeln!(
        f,
        "ch{index} {state} fill {}/{BUFFER_CAPACITY} vol {} active {active} | swaps {} underruns {} samples {} | drains {}/{}",
        ch.fill_index,
        ch.volume,
        ch.stats.buffer_swaps,
        ch.stats.underruns,
        ch.stats.total_samples,
        ch.drains.half,
        ch.drains.complete,
    )
}

impl fmt::Display for StatusReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = self.0;
        for (index, ch) in snap.channels.iter().enumerate() {
            write_channel(f, index, ch)?;
        }

        let e = &snap.errors;
        write!(
            f,
            "rx {:?} ready {} clock {} | frames cmd {} data {} | last {} bytes",
            snap.receiver,
            u8::from(snap.ready),
            u8::from(snap.clock_running),
            e.command_frames,
            e.data_frames,
            e.last_frame_len,
        )?;
        for byte in snap.last_head.iter().take(snap.last_head_len) {
            write!(f, " {byte:02X}")?;
        }
        writeln!(f)?;

        write!(
            f,
            "errors header {} channel {} length {} unknown {} runt {} | transport {} arm {} timeout {} driver {}",
            e.invalid_header,
            e.invalid_channel,
            e.invalid_length,
            e.unknown_commands,
            e.runt_frames,
            e.transport_faults,
            e.arm_failures,
            e.disable_timeouts,
            e.driver_faults,
        )
    }
}

/// Log `snapshot` to the active diagnostic sink.
pub fn report(snapshot: &StatusSnapshot) {
    #[cfg(feature = "defmt")]
    defmt::info!("status {}", snapshot);

    #[cfg(all(feature = "tracing", not(feature = "defmt")))]
    tracing::info!("status\n{}", StatusReport(snapshot));

    #[cfg(not(any(feature = "defmt", feature = "tracing")))]
    let _ = snapshot;
}
