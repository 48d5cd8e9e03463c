//! The stream context: every piece of state the interrupt handlers share.
//!
//! Owned by the application root (a `static` behind a critical-section
//! mutex in the firmware crate) and passed pinned to each handler. There
//! are no file-scope singletons anywhere in the core.
//!
//! Running transfer engines hold addresses of the landing buffer and of the
//! channels' sample buffers, all of which live inside the context. The
//! context is therefore `!Unpin` and everything that can start an engine
//! takes `Pin<&mut Self>`: once pinned it cannot move, and its memory stays
//! valid until it is dropped, which drops (and so stops) the engines too.
//!
//! ```text
//! SelectAsserted   ─► FrameReceiver::on_select_asserted
//! SelectDeasserted ─► FrameReceiver::on_select_deasserted ─► Dispatcher ─► FlowController
//! DrainComplete(c) ─► OutputDriver::on_drain_complete ──────────────────► FlowController
//! ```

use core::marker::PhantomPinned;
use core::pin::Pin;

use embedded_hal::digital::OutputPin;
use platform::audio_types::ChannelId;
use platform::dma::{OutputTransfer, RxTransfer, SampleClock};
use platform::error::ConfigError;
use platform::stream_config::{StreamConfig, CHANNEL_COUNT, COMMAND_FRAME_LEN};

use crate::channel::{AudioChannel, BufferSlot, ChannelPair, ChannelStats};
use crate::dispatcher::Dispatcher;
use crate::events::{EventKind, HandlerTable, StreamEvent};
use crate::flow::FlowController;
use crate::output::{DrainCounters, OutputDriver};
use crate::receiver::{FrameReceiver, ReceiverState};
use crate::stats::ErrorStats;

/// Copyable per-channel summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStatus {
    /// Between PLAY and STOP/RESET.
    pub playing: bool,
    /// Sticky underrun flag.
    pub underrun: bool,
    /// Holding mid-scale after a failed start.
    pub holding: bool,
    /// Next write offset into the fill buffer.
    pub fill_index: usize,
    /// Volume percent.
    pub volume: u8,
    /// Buffer being drained.
    pub active: BufferSlot,
    /// Lifetime counters.
    pub stats: ChannelStats,
    /// Drain event counters.
    pub drains: DrainCounters,
}

/// Copyable summary of the whole stream for the status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusSnapshot {
    /// Per channel, in wire order.
    pub channels: [ChannelStatus; CHANNEL_COUNT],
    /// Receive and protocol counters.
    pub errors: ErrorStats,
    /// Ready-line decision.
    pub ready: bool,
    /// Receiver state.
    pub receiver: ReceiverState,
    /// Shared sample clock running.
    pub clock_running: bool,
    /// First bytes of the last parsed frame.
    pub last_head: [u8; COMMAND_FRAME_LEN],
    /// Valid bytes in `last_head`.
    pub last_head_len: usize,
}

/// Receiver, channels, output path, ready line and counters.
pub struct StreamContext<R, O, C, P> {
    config: StreamConfig,
    channels: ChannelPair,
    receiver: FrameReceiver<R>,
    output: OutputDriver<O, C>,
    flow: FlowController<P>,
    stats: ErrorStats,
    _pinned: PhantomPinned,
}

impl<R, O, C, P> StreamContext<R, O, C, P> {
    /// Assemble a context. `const` so it can initialise a `static`.
    #[must_use]
    pub const fn new(config: StreamConfig, rx: R, outputs: [O; CHANNEL_COUNT], clock: C, ready_pin: P) -> Self {
        Self {
            config,
            channels: ChannelPair::new(),
            receiver: FrameReceiver::new(rx, config.poll_limit),
            output: OutputDriver::new(outputs, clock, config.sample_rate_hz, config.poll_limit),
            flow: FlowController::new(ready_pin, config.ready_polarity),
            stats: ErrorStats::new(),
            _pinned: PhantomPinned,
        }
    }

    fn fields(self: Pin<&mut Self>) -> &mut Self {
        // SAFETY: callers mutate fields in place. Nothing is moved out of the
        // context and no field is replaced wholesale.
        unsafe { self.get_unchecked_mut() }
    }

    /// Configuration in use.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Channel `id`.
    pub fn channel(&self, id: ChannelId) -> &AudioChannel {
        &self.channels[id]
    }

    /// Both channels.
    pub fn channels(&self) -> &ChannelPair {
        &self.channels
    }

    /// Error and traffic counters.
    pub fn stats(&self) -> &ErrorStats {
        &self.stats
    }

    /// Receiver.
    pub fn receiver(&self) -> &FrameReceiver<R> {
        &self.receiver
    }

    /// Receive engine, mutably. Stays pinned: it may hold a landing-buffer
    /// address.
    pub fn rx_engine_mut(self: Pin<&mut Self>) -> Pin<&mut R> {
        // SAFETY: structural projection; the engine is never moved out.
        unsafe { self.map_unchecked_mut(|ctx| ctx.receiver.engine_mut()) }
    }

    /// Output driver.
    pub fn output(&self) -> &OutputDriver<O, C> {
        &self.output
    }

    /// Output engine for `id`, mutably (fault injection in host tests).
    pub fn output_engine_mut(self: Pin<&mut Self>, id: ChannelId) -> Pin<&mut O> {
        // SAFETY: structural projection; the engine is never moved out.
        unsafe { self.map_unchecked_mut(|ctx| ctx.output.engine_mut(id)) }
    }

    /// Flow controller.
    pub fn flow(&self) -> &FlowController<P> {
        &self.flow
    }

    /// Last ready decision driven onto the line.
    pub fn is_ready(&self) -> bool {
        self.flow.is_ready()
    }

    /// Zero every diagnostic counter. Channel state is untouched.
    pub fn reset_counters(self: Pin<&mut Self>) {
        let this = self.fields();
        this.stats.reset();
        this.output.reset_counters();
        for channel in this.channels.iter_mut() {
            channel.reset_counters();
        }
    }
}

impl<R, O, C, P> StreamContext<R, O, C, P>
where
    R: RxTransfer,
    O: OutputTransfer,
    C: SampleClock,
{
    /// Validate the configuration and drive the initial ready level.
    pub fn start(self: Pin<&mut Self>) -> Result<(), ConfigError>
    where
        P: OutputPin,
    {
        let this = self.fields();
        this.config.validate()?;
        let ready = this.flow.update(&this.channels);
        info!("stream slave started, ready={}", ready);
        Ok(())
    }

    /// Handler table with [`handle`](Self::handle) registered for every kind.
    #[must_use]
    pub fn handlers() -> HandlerTable<Self>
    where
        P: OutputPin,
    {
        let mut table: HandlerTable<Self> = HandlerTable::new();
        for kind in EventKind::ALL {
            table.register(kind, Self::handle);
        }
        table
    }

    /// Process one interrupt event.
    pub fn handle(self: Pin<&mut Self>, event: StreamEvent)
    where
        P: OutputPin,
    {
        let this = self.fields();
        match event {
            StreamEvent::SelectAsserted => {
                // SAFETY: the receiver lives in the pinned context and cannot
                // move before its engine is disabled or dropped with it.
                unsafe { this.receiver.on_select_asserted(&mut this.stats) }
            }
            StreamEvent::SelectDeasserted => {
                if this.receiver.on_select_deasserted(&mut this.stats).is_some() {
                    // SAFETY: the channels live in the pinned context next to
                    // the output engines, so they outlive every running engine.
                    unsafe { Dispatcher::new(&mut this.channels, &mut this.output, &mut this.stats) }
                        .dispatch_span(this.receiver.frame());
                    this.flow.update(&this.channels);
                }
            }
            StreamEvent::RxCaptureComplete => this.receiver.on_capture_complete(&mut this.stats),
            StreamEvent::TransportFault => this.receiver.on_transport_fault(&mut this.stats),
            StreamEvent::DrainHalf(id) => this.output.on_drain_half(id),
            StreamEvent::DrainComplete(id) => {
                // SAFETY: as for `Dispatcher::new` above.
                unsafe {
                    this.output
                        .on_drain_complete(id, &mut this.channels[id], &mut this.stats);
                }
                this.flow.update(&this.channels);
            }
            StreamEvent::OutputFault(id) => {
                this.output
                    .on_output_fault(id, &mut this.channels[id], &mut this.stats);
            }
        }
    }

    /// Copy out everything the status report shows.
    pub fn snapshot(&self) -> StatusSnapshot {
        let status = |id: ChannelId| {
            let ch = &self.channels[id];
            ChannelStatus {
                playing: ch.is_playing(),
                underrun: ch.underrun(),
                holding: self.output.is_holding(id),
                fill_index: ch.fill_index(),
                volume: ch.volume().get(),
                active: ch.active_slot(),
                stats: ch.stats(),
                drains: self.output.drains(id),
            }
        };

        let mut last_head = [0u8; COMMAND_FRAME_LEN];
        let head = self.receiver.last_head();
        for (dst, src) in last_head.iter_mut().zip(head) {
            *dst = *src;
        }

        StatusSnapshot {
            channels: [status(ChannelId::Ch0), status(ChannelId::Ch1)],
            errors: self.stats,
            ready: self.flow.is_ready(),
            receiver: self.receiver.state(),
            clock_running: self.output.clock().is_running(),
            last_head,
            last_head_len: head.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::channel::CAPACITY;
    use crate::protocol::{encode_data_frame, Command, CommandFrame};
    use platform::mocks::{MockOutputTransfer, MockReadyPin, MockRxTransfer, MockSampleClock};
    use platform::stream_config::LANDING_BUFFER_LEN;

    type Ctx = StreamContext<MockRxTransfer, MockOutputTransfer, MockSampleClock, MockReadyPin>;

    fn context_with(config: StreamConfig) -> Pin<Box<Ctx>> {
        Box::pin(StreamContext::new(
            config,
            MockRxTransfer::new(),
            [MockOutputTransfer::new(), MockOutputTransfer::new()],
            MockSampleClock::new(),
            MockReadyPin::new(),
        ))
    }

    fn context() -> Pin<Box<Ctx>> {
        context_with(StreamConfig::slave_default())
    }

    fn send(ctx: &mut Pin<Box<Ctx>>, wire: &[u8]) {
        ctx.as_mut().rx_engine_mut().stage(wire);
        ctx.as_mut().handle(StreamEvent::SelectAsserted);
        ctx.as_mut().handle(StreamEvent::SelectDeasserted);
    }

    fn bound_to_live_buffer(ctx: &Ctx, id: ChannelId) -> bool {
        let live = ctx.channel(id).active_samples().as_ptr() as usize;
        ctx.output().engine(id).bound_addr() == Some(live)
    }

    #[test]
    fn test_context_is_not_unpin() {
        // Resolves only when exactly one impl applies, i.e. when `Ctx: !Unpin`.
        trait AmbiguousIfUnpin<A> {
            fn check() {}
        }
        impl<T: ?Sized> AmbiguousIfUnpin<()> for T {}
        impl<T: ?Sized + Unpin> AmbiguousIfUnpin<u8> for T {}
        <Ctx as AmbiguousIfUnpin<_>>::check();
    }

    #[test]
    fn test_engines_stay_bound_to_live_buffers() {
        let mut ctx = context();
        ctx.as_mut().start().unwrap();
        let mut wire = vec![0u8; LANDING_BUFFER_LEN];
        let len = encode_data_frame(0, &[64; CAPACITY], &mut wire).unwrap();

        send(&mut ctx, &wire[..len]);
        send(&mut ctx, &CommandFrame::new(0, Command::Play).encode());
        assert!(bound_to_live_buffer(&ctx, ChannelId::Ch0));

        for _ in 0..3 {
            send(&mut ctx, &wire[..len]);
            ctx.as_mut().handle(StreamEvent::DrainComplete(ChannelId::Ch0));
            assert!(bound_to_live_buffer(&ctx, ChannelId::Ch0));
        }
        // underrun keeps the engine on the same live buffer
        ctx.as_mut().handle(StreamEvent::DrainComplete(ChannelId::Ch0));
        assert!(ctx.channel(ChannelId::Ch0).underrun());
        assert!(bound_to_live_buffer(&ctx, ChannelId::Ch0));
    }

    #[test]
    fn test_start_drives_ready_low() {
        let mut ctx = context();
        ctx.as_mut().start().unwrap();
        assert!(ctx.is_ready());
        assert_eq!(ctx.flow().pin().level(), embedded_hal::digital::PinState::Low);
    }

    #[test]
    fn test_start_rejects_bad_config() {
        let mut ctx = context_with(StreamConfig {
            poll_limit: 0,
            ..StreamConfig::slave_default()
        });
        assert_eq!(ctx.as_mut().start(), Err(ConfigError::ZeroPollLimit));
    }

    #[test]
    fn test_handler_table_routes_every_kind() {
        let table = Ctx::handlers();
        for kind in EventKind::ALL {
            assert!(table.is_registered(kind));
        }
        let mut ctx = context();
        assert!(table.dispatch(ctx.as_mut(), StreamEvent::DrainHalf(ChannelId::Ch1)));
        assert_eq!(ctx.output().drains(ChannelId::Ch1).half, 1);
    }

    #[test]
    fn test_command_over_the_wire() {
        let mut ctx = context();
        ctx.as_mut().start().unwrap();
        send(&mut ctx, &CommandFrame::new(1, Command::Play).encode());
        assert!(ctx.channel(ChannelId::Ch1).is_playing());
        assert_eq!(ctx.stats().command_frames, 1);
        let snap = ctx.snapshot();
        assert_eq!(snap.last_head, [0xC0, 0x01, 0x01, 0x00, 0x00]);
        assert_eq!(snap.last_head_len, 5);
        assert!(snap.channels[1].playing);
        assert!(snap.clock_running);
        assert_eq!(snap.receiver, ReceiverState::Idle);
    }

    #[test]
    fn test_reset_counters_keeps_channel_state() {
        let mut ctx = context();
        send(&mut ctx, &[0xDA, 0x00, 0x00, 0x01, 0x00, 0x10]);
        send(&mut ctx, &[0x00, 0x00, 0x00, 0x00]);
        ctx.as_mut().handle(StreamEvent::DrainHalf(ChannelId::Ch0));
        assert_eq!(ctx.stats().invalid_header, 1);

        ctx.as_mut().reset_counters();

        assert_eq!(*ctx.stats(), ErrorStats::default());
        assert_eq!(ctx.channel(ChannelId::Ch0).stats(), ChannelStats::default());
        assert_eq!(ctx.output().drains(ChannelId::Ch0), DrainCounters::default());
        assert_eq!(ctx.channel(ChannelId::Ch0).fill_index(), 1);
    }

    #[test]
    fn test_output_fault_does_not_stop_channel() {
        let mut ctx = context();
        send(&mut ctx, &CommandFrame::new(0, Command::Play).encode());
        ctx.as_mut().handle(StreamEvent::OutputFault(ChannelId::Ch0));
        let ch = ctx.channel(ChannelId::Ch0);
        assert!(ch.is_playing());
        assert!(ch.underrun());
        assert_eq!(ctx.stats().driver_faults, 1);
    }
}
