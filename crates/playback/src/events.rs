//! Interrupt events and the handler table.
//!
//! Vector names are a board concern. The core only sees [`StreamEvent`]s,
//! and the glue decides which handler runs for each [`EventKind`]:
//!
//! | Kind                | Events                                   | Typical source          |
//! |---------------------|------------------------------------------|-------------------------|
//! | `SelectEdge`        | `SelectAsserted`, `SelectDeasserted`     | EXTI on the NSS pin     |
//! | `RxCaptureComplete` | `RxCaptureComplete`                      | SPI RX DMA complete     |
//! | `TransportFault`    | `TransportFault`                         | SPI error callback      |
//! | `DrainHalf`         | `DrainHalf(ch)`                          | DAC DMA half-transfer   |
//! | `DrainComplete`     | `DrainComplete(ch)`                      | DAC DMA transfer complete |
//! | `OutputFault`       | `OutputFault(ch)`                        | DAC DMA error callback  |

use core::pin::Pin;

use platform::audio_types::ChannelId;

/// Handler-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// Select line edges.
    SelectEdge,
    /// Receive transfer filled the landing buffer.
    RxCaptureComplete,
    /// Receive peripheral error.
    TransportFault,
    /// Half of an active buffer drained.
    DrainHalf,
    /// Whole active buffer drained.
    DrainComplete,
    /// Output transfer error.
    OutputFault,
}

impl EventKind {
    /// Number of kinds.
    pub const COUNT: usize = 6;

    /// Every kind, in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::SelectEdge,
        Self::RxCaptureComplete,
        Self::TransportFault,
        Self::DrainHalf,
        Self::DrainComplete,
        Self::OutputFault,
    ];

    const fn slot(self) -> usize {
        self as usize
    }
}

/// One interrupt occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamEvent {
    /// Master pulled select active.
    SelectAsserted,
    /// Master released select; the frame is complete.
    SelectDeasserted,
    /// Receive transfer hit the landing buffer's end.
    RxCaptureComplete,
    /// Receive peripheral reported an error.
    TransportFault,
    /// Half-transfer on a channel's output engine.
    DrainHalf(ChannelId),
    /// Transfer-complete on a channel's output engine.
    DrainComplete(ChannelId),
    /// Transfer error on a channel's output engine.
    OutputFault(ChannelId),
}

impl StreamEvent {
    /// Table key for this event.
    #[must_use]
    pub const fn kind(self) -> EventKind {
        match self {
            Self::SelectAsserted | Self::SelectDeasserted => EventKind::SelectEdge,
            Self::RxCaptureComplete => EventKind::RxCaptureComplete,
            Self::TransportFault => EventKind::TransportFault,
            Self::DrainHalf(_) => EventKind::DrainHalf,
            Self::DrainComplete(_) => EventKind::DrainComplete,
            Self::OutputFault(_) => EventKind::OutputFault,
        }
    }
}

/// Handler signature. The context is pinned: transfer engines hold
/// addresses inside it.
pub type Handler<C> = fn(Pin<&mut C>, StreamEvent);

/// Registered handlers keyed by [`EventKind`].
pub struct HandlerTable<C> {
    slots: [Option<Handler<C>>; EventKind::COUNT],
}

impl<C> HandlerTable<C> {
    /// Table with nothing registered.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [None; EventKind::COUNT],
        }
    }

    /// Register `handler` for `kind`, returning the one it replaces.
    #[allow(clippy::indexing_slicing)] // Safety: EventKind discriminants are 0..COUNT
    pub fn register(&mut self, kind: EventKind, handler: Handler<C>) -> Option<Handler<C>> {
        self.slots[kind.slot()].replace(handler)
    }

    /// True if `kind` has a handler.
    #[allow(clippy::indexing_slicing)] // Safety: EventKind discriminants are 0..COUNT
    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.slots[kind.slot()].is_some()
    }

    /// Run the handler for `event`'s kind. Returns false if none is registered.
    #[allow(clippy::indexing_slicing)] // Safety: EventKind discriminants are 0..COUNT
    pub fn dispatch(&self, ctx: Pin<&mut C>, event: StreamEvent) -> bool {
        match self.slots[event.kind().slot()] {
            Some(handler) => {
                handler(ctx, event);
                true
            }
            None => false,
        }
    }
}

impl<C> Default for HandlerTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
