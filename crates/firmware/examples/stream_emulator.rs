//! DAC Stream Slave Emulator
//!
//! Runs the full receive → double-buffer → drain pipeline on the desktop.
//! A simulated master pre-buffers both channels, sends PLAY and then streams
//! a pair of sine tones while honouring the ready line. A simulated sample
//! clock raises drain events once per buffer period. Channel 1's master
//! stalls for one period halfway through so the underrun path shows up in
//! the counters.
//!
//! Run with: cargo run -p firmware --example stream_emulator --features emulator
//! More detail: RUST_LOG=debug cargo run -p firmware --example stream_emulator --features emulator
#![allow(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::print_stdout
)]

use std::time::Duration;

use firmware::{report, SharedStream, StatusReport};
use platform::mocks::{MockOutputTransfer, MockReadyPin, MockRxTransfer, MockSampleClock};
use platform::{ChannelId, StreamConfig};
use playback::{encode_data_frame, Command, CommandFrame, StreamContext, StreamEvent, CAPACITY};
use tokio::time::{interval, interval_at, Instant};
use tracing_subscriber::EnvFilter;

type Stream = SharedStream<MockRxTransfer, MockOutputTransfer, MockSampleClock, MockReadyPin>;

static STREAM: Stream = SharedStream::new(StreamContext::new(
    StreamConfig::slave_default(),
    MockRxTransfer::new(),
    [MockOutputTransfer::new(), MockOutputTransfer::new()],
    MockSampleClock::new(),
    MockReadyPin::new(),
));

const FRAME_SAMPLES: usize = 256;
const FRAMES_PER_PERIOD: usize = CAPACITY / FRAME_SAMPLES;
const RUN_PERIODS: u32 = 48;
const STALL_PERIOD: u32 = 24;
const STATUS_EVERY: Duration = Duration::from_secs(1);
const TONES_HZ: [f32; 2] = [440.0, 660.0];

type AppResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// The SPI master's side of the wire.
struct Master {
    sample_rate: f32,
    phase: [u32; 2],
    wire: Vec<u8>,
    samples: Vec<i16>,
    stalls: u32,
}

impl Master {
    fn new(config: &StreamConfig) -> Self {
        Self {
            sample_rate: config.sample_rate_hz as f32,
            phase: [0; 2],
            wire: vec![0; config.landing_bytes()],
            samples: Vec::with_capacity(FRAME_SAMPLES),
            stalls: 0,
        }
    }

    /// One select-framed transaction.
    fn transact(bytes: &[u8]) -> AppResult {
        STREAM.with(|ctx| ctx.rx_engine_mut().stage(bytes))?;
        STREAM.raise(StreamEvent::SelectAsserted);
        STREAM.raise(StreamEvent::SelectDeasserted);
        Ok(())
    }

    fn command(id: ChannelId, command: Command) -> AppResult {
        tracing::info!("master: ch{} {:?}", id.raw(), command);
        Self::transact(&CommandFrame::new(id.raw(), command).encode())
    }

    /// Send one data frame if the slave is ready. Returns whether it was sent.
    fn send_frame(&mut self, id: ChannelId) -> AppResult<bool> {
        if !STREAM.with(|ctx| ctx.is_ready())? {
            self.stalls += 1;
            return Ok(false);
        }

        let tone = TONES_HZ[id.index()];
        let phase = &mut self.phase[id.index()];
        self.samples.clear();
        for _ in 0..FRAME_SAMPLES {
            let t = *phase as f32 / self.sample_rate;
            let s = (2.0 * std::f32::consts::PI * tone * t).sin() * 12_000.0;
            self.samples.push(s as i16);
            *phase = phase.wrapping_add(1);
        }

        let len = encode_data_frame(id.raw(), &self.samples, &mut self.wire)?;
        Self::transact(&self.wire[..len])?;
        Ok(true)
    }

    /// Up to one buffer period of frames for `id`.
    fn send_period(&mut self, id: ChannelId) -> AppResult {
        for _ in 0..FRAMES_PER_PERIOD {
            if !self.send_frame(id)? {
                break;
            }
        }
        Ok(())
    }

    /// Fill each channel's spare buffer, then start it.
    fn prebuffer_and_play(&mut self) -> AppResult {
        for id in ChannelId::ALL {
            self.send_period(id)?;
            Self::command(id, Command::Play)?;
        }
        Ok(())
    }

    async fn stream(mut self, start: Instant, period: Duration) -> AppResult<Self> {
        // the first drain-complete lands at `start + period`; refill a quarter
        // period after each one
        self.send_period(ChannelId::Ch0)?;
        self.send_period(ChannelId::Ch1)?;
        let mut ticks = interval_at(start + period + period / 4, period);
        for n in 1..RUN_PERIODS {
            ticks.tick().await;
            self.send_period(ChannelId::Ch0)?;
            if n == STALL_PERIOD {
                tracing::warn!("master: skipping ch1 for one period");
            } else {
                self.send_period(ChannelId::Ch1)?;
            }
        }
        Ok(self)
    }
}

/// DAC trigger timer plus the two DAC DMA streams.
async fn sample_clock(start: Instant, period: Duration) -> AppResult {
    let mut half_ticks = interval_at(start + period / 2, period / 2);
    for _ in 0..RUN_PERIODS {
        half_ticks.tick().await;
        for id in ChannelId::ALL {
            STREAM.raise(StreamEvent::DrainHalf(id));
        }
        half_ticks.tick().await;
        for id in ChannelId::ALL {
            STREAM.raise(StreamEvent::DrainComplete(id));
        }
    }
    Ok(())
}

async fn status_task(run_for: Duration) -> AppResult {
    let deadline = Instant::now() + run_for;
    let mut ticks = interval(STATUS_EVERY);
    ticks.tick().await;
    loop {
        ticks.tick().await;
        if Instant::now() >= deadline {
            return Ok(());
        }
        report(&STREAM.with(|ctx| ctx.snapshot())?);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> AppResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = StreamConfig::slave_default();
    let period = Duration::from_micros(config.period().as_micros());
    println!("DAC Stream Slave - Emulator");
    println!(
        "{} Hz, {} samples per buffer ({} ms), {} periods\n",
        config.sample_rate_hz,
        CAPACITY,
        period.as_millis(),
        RUN_PERIODS
    );

    STREAM.install_default()?;
    STREAM.start()?;

    let mut master = Master::new(&config);
    master.prebuffer_and_play()?;

    let start = Instant::now();
    let run_for = period * RUN_PERIODS;
    let (master, (), ()) = tokio::try_join!(
        master.stream(start, period),
        sample_clock(start, period),
        status_task(run_for),
    )?;

    for id in ChannelId::ALL {
        Master::command(id, Command::Stop)?;
        Master::command(id, Command::Reset)?;
    }

    let snapshot = STREAM.with(|ctx| ctx.snapshot())?;
    println!("\nFinal status:\n{}", StatusReport(&snapshot));
    println!("Master stalls on ready line: {}", master.stalls);
    Ok(())
}
