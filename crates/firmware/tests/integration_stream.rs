//! Stream integration tests: the full slave behind the interrupt-shared context.
// Integration test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
)]
//!
//! Every event goes through `SharedStream::raise`, exactly as the interrupt
//! vectors deliver it on the target. Peripherals are the host mocks from
//! `platform::mocks`; the ready line is checked with `embedded-hal-mock`.
//!
//! Run with: cargo test -p firmware --test integration_stream

use embedded_hal_mock::eh1::digital::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
use firmware::{report, SharedError, SharedStream, StatusReport};
use platform::mocks::{MockOutputTransfer, MockReadyPin, MockRxTransfer, MockSampleClock};
use platform::{ChannelId, StreamConfig};
use playback::{encode_data_frame, Command, CommandFrame, StreamContext, StreamEvent, CAPACITY};

type Stream<P> = SharedStream<MockRxTransfer, MockOutputTransfer, MockSampleClock, P>;

const FRAME_SAMPLES: usize = 256;
const FRAMES_PER_BUFFER: usize = CAPACITY / FRAME_SAMPLES;

/// Leaked so the stream has the `'static` address a real `static` would.
fn stream_with<P>(config: StreamConfig, pin: P) -> &'static Stream<P>
where
    P: embedded_hal::digital::OutputPin + 'static,
{
    let stream: &'static Stream<P> = Box::leak(Box::new(SharedStream::new(StreamContext::new(
        config,
        MockRxTransfer::new(),
        [MockOutputTransfer::new(), MockOutputTransfer::new()],
        MockSampleClock::new(),
        pin,
    ))));
    stream.install_default().expect("install handlers");
    stream.start().expect("start stream");
    stream
}

fn stream() -> &'static Stream<MockReadyPin> {
    stream_with(StreamConfig::slave_default(), MockReadyPin::new())
}

fn transact<P>(stream: &'static Stream<P>, wire: &[u8]) {
    stream.with(|ctx| ctx.rx_engine_mut().stage(wire)).unwrap();
    assert!(stream.raise(StreamEvent::SelectAsserted));
    assert!(stream.raise(StreamEvent::SelectDeasserted));
}

fn command<P>(stream: &'static Stream<P>, id: ChannelId, cmd: Command) {
    transact(stream, &CommandFrame::new(id.raw(), cmd).encode());
}

fn frame<P>(stream: &'static Stream<P>, id: ChannelId, sample: i16) {
    let mut wire = vec![0u8; 4 + 2 * FRAME_SAMPLES];
    let len = encode_data_frame(id.raw(), &[sample; FRAME_SAMPLES], &mut wire).unwrap();
    transact(stream, &wire[..len]);
}

fn period<P>(stream: &'static Stream<P>, id: ChannelId, sample: i16) {
    for _ in 0..FRAMES_PER_BUFFER {
        frame(stream, id, sample);
    }
}

fn drain<P>(stream: &'static Stream<P>, id: ChannelId) {
    assert!(stream.raise(StreamEvent::DrainHalf(id)));
    assert!(stream.raise(StreamEvent::DrainComplete(id)));
}

/// Both channels stream for several periods without an underrun.
#[test]
fn test_two_channel_steady_state() {
    let s = stream();
    for id in ChannelId::ALL {
        period(s, id, 160);
        command(s, id, Command::Play);
    }
    for n in 0..6i16 {
        for id in ChannelId::ALL {
            period(s, id, n * 16);
        }
        for id in ChannelId::ALL {
            drain(s, id);
        }
    }

    let snap = s.with(|ctx| ctx.snapshot()).unwrap();
    for ch in &snap.channels {
        assert!(ch.playing);
        assert!(!ch.underrun);
        assert_eq!(ch.stats.buffer_swaps, 7);
        assert_eq!(ch.stats.underruns, 0);
        assert_eq!(ch.drains.complete, 6);
    }
    assert!(snap.ready);
    assert!(snap.clock_running);
    assert_eq!(snap.errors.protocol_errors(), 0);
    // last period carried 5 * 16 = 80 → 80 >> 4 = 5 above mid-scale
    let first = s.with(|ctx| ctx.output().engine(ChannelId::Ch1).first_sample()).unwrap();
    assert_eq!(first, Some(2053));
}

/// A stalled master produces exactly one underrun, then output recovers.
#[test]
fn test_master_stall_underruns_once() {
    let s = stream();
    period(s, ChannelId::Ch0, 0);
    command(s, ChannelId::Ch0, Command::Play);

    drain(s, ChannelId::Ch0);
    let ch = s.with(|ctx| ctx.snapshot().channels[0]).unwrap();
    assert!(ch.underrun);
    assert!(ch.playing);

    period(s, ChannelId::Ch0, 0);
    drain(s, ChannelId::Ch0);
    let ch = s.with(|ctx| ctx.snapshot().channels[0]).unwrap();
    assert!(!ch.underrun);
    assert_eq!(ch.stats.underruns, 1);
    assert_eq!(ch.stats.buffer_swaps, 2);
}

/// The ready line drops when pre-buffering fills a channel and rises on PLAY.
#[test]
fn test_ready_line_levels() {
    let mut expectations = vec![PinTransaction::set(PinState::Low)];
    expectations.extend((0..FRAMES_PER_BUFFER - 1).map(|_| PinTransaction::set(PinState::Low)));
    expectations.push(PinTransaction::set(PinState::High));
    expectations.push(PinTransaction::set(PinState::Low));

    let s = stream_with(StreamConfig::slave_default(), PinMock::new(&expectations));
    period(s, ChannelId::Ch1, 1);
    assert!(!s.with(|ctx| ctx.is_ready()).unwrap());
    command(s, ChannelId::Ch1, Command::Play);
    assert!(s.with(|ctx| ctx.is_ready()).unwrap());

    let mut pin = s.with(|ctx| ctx.flow().pin().clone()).unwrap();
    pin.done();
}

/// A DAC engine that never clears its enable bit cannot hang a swap.
#[test]
fn test_stuck_output_engine_is_bounded() {
    let config = StreamConfig {
        poll_limit: 64,
        ..StreamConfig::slave_default()
    };
    let s = stream_with(config, MockReadyPin::new());
    period(s, ChannelId::Ch0, 0);
    command(s, ChannelId::Ch0, Command::Play);
    period(s, ChannelId::Ch0, 32);
    s.with(|ctx| ctx.output_engine_mut(ChannelId::Ch0).set_stuck(true)).unwrap();

    drain(s, ChannelId::Ch0);

    s.with(|ctx| {
        let engine = ctx.output().engine(ChannelId::Ch0);
        assert_eq!(engine.polls(), 65);
        assert_eq!(engine.starts(), 2);
        assert_eq!(engine.first_sample(), Some(2050));
        assert_eq!(ctx.stats().disable_timeouts, 1);
        assert_eq!(ctx.channel(ChannelId::Ch0).stats().buffer_swaps, 2);
    })
    .unwrap();
}

/// A receive engine that hangs at deassert is reset; the next frame lands.
#[test]
fn test_stuck_receive_engine_recovers() {
    let config = StreamConfig {
        poll_limit: 16,
        ..StreamConfig::slave_default()
    };
    let s = stream_with(config, MockReadyPin::new());

    s.with(|ctx| ctx.rx_engine_mut().set_stuck(true)).unwrap();
    command(s, ChannelId::Ch0, Command::Play);
    s.with(|ctx| ctx.rx_engine_mut().set_stuck(false)).unwrap();
    command(s, ChannelId::Ch1, Command::Play);

    s.with(|ctx| {
        // the hung frame was still captured before the engine was reset
        assert!(ctx.channel(ChannelId::Ch0).is_playing());
        assert!(ctx.channel(ChannelId::Ch1).is_playing());
        assert_eq!(ctx.stats().disable_timeouts, 1);
        assert_eq!(ctx.stats().transport_faults, 0);
        assert_eq!(ctx.stats().command_frames, 2);
    })
    .unwrap();
}

/// Garbage on the wire is counted and never reaches a channel.
#[test]
fn test_protocol_errors_are_isolated() {
    let s = stream();
    transact(s, &[0x00, 0x01, 0x02, 0x03, 0x04]);
    transact(s, &[0xDA, 0x00, 0x13, 0x88]);
    transact(s, &[0xDA, 0x00, 0x00, 0x10, 0x00, 0x00]);
    transact(s, &CommandFrame::new(7, Command::Play).encode());
    transact(s, &[0xC0]);

    let snap = s.with(|ctx| ctx.snapshot()).unwrap();
    assert_eq!(snap.errors.invalid_header, 1);
    assert_eq!(snap.errors.invalid_length, 2);
    assert_eq!(snap.errors.invalid_channel, 1);
    assert_eq!(snap.errors.runt_frames, 1);
    assert_eq!(snap.errors.protocol_errors(), 5);
    for ch in &snap.channels {
        assert!(!ch.playing);
        assert_eq!(ch.fill_index, 0);
    }
    assert!(snap.ready);
}

/// Counter reset clears diagnostics but leaves playback alone.
#[test]
fn test_reset_counters_from_foreground() {
    let s = stream();
    period(s, ChannelId::Ch0, 0);
    command(s, ChannelId::Ch0, Command::Play);
    transact(s, &[0xEE, 0, 0, 0]);
    drain(s, ChannelId::Ch0);

    s.with(|ctx| ctx.reset_counters()).unwrap();

    let snap = s.with(|ctx| ctx.snapshot()).unwrap();
    assert_eq!(snap.errors.invalid_header, 0);
    assert_eq!(snap.channels[0].stats.buffer_swaps, 0);
    assert_eq!(snap.channels[0].drains.complete, 0);
    assert!(snap.channels[0].playing);
    assert!(snap.channels[0].underrun);
}

/// The status report renders whatever the snapshot holds.
#[test]
fn test_status_report_after_session() {
    let s = stream();
    period(s, ChannelId::Ch1, -32);
    command(s, ChannelId::Ch1, Command::Play);
    transact(s, &CommandFrame::volume(1, 55).encode());

    let snap = s.with(|ctx| ctx.snapshot()).unwrap();
    report(&snap);
    let text = StatusReport(&snap).to_string();
    assert!(text.contains("ch1 PLAY fill 0/2048 vol 55 active B"));
    assert!(text.contains("last 5 bytes C0 01 03 00 37"));
}

/// The foreground cannot re-enter the context from inside `with`.
#[test]
fn test_nested_access_is_busy() {
    let s = stream();
    let inner = s.with(|_| s.with(|ctx| ctx.is_ready())).unwrap();
    assert_eq!(inner, Err(SharedError::Busy));
    assert!(s.with(|_| !s.raise(StreamEvent::DrainHalf(ChannelId::Ch0))).unwrap());
}

/// Master and sample clock as interleaved tasks, as in the emulator.
#[tokio::test]
async fn test_interleaved_master_and_clock() {
    let s = stream();
    period(s, ChannelId::Ch0, 48);
    command(s, ChannelId::Ch0, Command::Play);

    let swaps = || s.with(|ctx| ctx.channel(ChannelId::Ch0).stats().buffer_swaps).unwrap();
    let full = || s.with(|ctx| ctx.channel(ChannelId::Ch0).is_full()).unwrap();

    // master refills once per swap; clock drains once the spare buffer is full
    let master = async {
        for cycle in 1..=4u32 {
            while swaps() < cycle {
                tokio::task::yield_now().await;
            }
            for _ in 0..FRAMES_PER_BUFFER {
                frame(s, ChannelId::Ch0, 48);
                tokio::task::yield_now().await;
            }
        }
    };
    let clock = async {
        for _ in 0..4 {
            while !full() {
                tokio::task::yield_now().await;
            }
            drain(s, ChannelId::Ch0);
        }
    };
    tokio::join!(master, clock);

    let ch = s.with(|ctx| ctx.snapshot().channels[0]).unwrap();
    assert_eq!(ch.stats.buffer_swaps, 5);
    assert_eq!(ch.stats.underruns, 0);
    assert_eq!(ch.stats.total_samples, 5 * CAPACITY as u32);
}
