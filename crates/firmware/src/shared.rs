//! The stream context as an interrupt-shared `static`.
//!
//! Every interrupt entry point calls [`SharedStream::raise`]. The whole
//! handler runs inside one critical section, so a buffer role exchange and
//! the `fill_index` reset that goes with it are never observed half done by
//! another interrupt.
//!
//! ```rust,ignore
//! static STREAM: SharedStream<SpiRx, DacTx, Tim6, ReadyPin> =
//!     SharedStream::new(StreamContext::new(StreamConfig::slave_default(), ...));
//!
//! // init
//! STREAM.install_default();
//! STREAM.start()?;
//!
//! // EXTI on NSS, both edges
//! fn exti_nss(rising: bool) {
//!     let event = if rising { StreamEvent::SelectDeasserted } else { StreamEvent::SelectAsserted };
//!     STREAM.raise(event);
//! }
//! ```
//!
//! The context lends its buffers to running DMA engines, so it is pinned.
//! [`raise`](SharedStream::raise), [`with`](SharedStream::with) and
//! [`start`](SharedStream::start) take `&'static self`: a `static` (or a
//! leaked allocation) never moves or drops, which is the guarantee the pin
//! needs.
//!
//! Critical sections last one handler. The longest is a data frame of 2048
//! samples converted into the fill buffer; at the 32 kHz sample rate a
//! drain-complete is 64 ms away, so the DAC DMA interrupt is never at risk.

use core::cell::RefCell;
use core::pin::Pin;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::OutputPin;
use platform::dma::{OutputTransfer, RxTransfer, SampleClock};
use platform::error::ConfigError;
use playback::{HandlerTable, StreamContext, StreamEvent};

/// Errors from foreground access to the shared context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SharedError {
    /// The context is already borrowed further up this call stack.
    #[error("stream context already borrowed")]
    Busy,
    /// The configuration was rejected at start.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

struct Shared<R, O, C, P> {
    ctx: StreamContext<R, O, C, P>,
    handlers: HandlerTable<StreamContext<R, O, C, P>>,
}

/// Stream context plus its handler table, behind a critical-section mutex.
pub struct SharedStream<R, O, C, P> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Shared<R, O, C, P>>>,
}

impl<R, O, C, P> SharedStream<R, O, C, P> {
    /// Wrap `ctx` with an empty handler table. `const` for `static` use.
    pub const fn new(ctx: StreamContext<R, O, C, P>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Shared {
                ctx,
                handlers: HandlerTable::new(),
            })),
        }
    }

    /// Replace the handler table.
    pub fn install(&self, table: HandlerTable<StreamContext<R, O, C, P>>) -> Result<(), SharedError> {
        self.inner.lock(|cell| {
            let mut shared = cell.try_borrow_mut().map_err(|_| SharedError::Busy)?;
            shared.handlers = table;
            Ok(())
        })
    }

    /// Run the registered handler for `event`.
    ///
    /// Returns `false` when no handler is registered for the event's kind or
    /// when called from inside another handler or [`with`](Self::with).
    pub fn raise(&'static self, event: StreamEvent) -> bool {
        self.inner.lock(|cell| {
            let Ok(mut shared) = cell.try_borrow_mut() else {
                return false;
            };
            let Shared { ctx, handlers } = &mut *shared;
            // SAFETY: `self` is `'static`, so the context never moves or drops.
            let ctx = unsafe { Pin::new_unchecked(ctx) };
            handlers.dispatch(ctx, event)
        })
    }

    /// Foreground access to the context: status snapshots, counter resets,
    /// host-side staging.
    pub fn with<T>(
        &'static self,
        f: impl FnOnce(Pin<&mut StreamContext<R, O, C, P>>) -> T,
    ) -> Result<T, SharedError> {
        self.inner.lock(|cell| {
            let mut shared = cell.try_borrow_mut().map_err(|_| SharedError::Busy)?;
            // SAFETY: `self` is `'static`, so the context never moves or drops.
            let ctx = unsafe { Pin::new_unchecked(&mut shared.ctx) };
            Ok(f(ctx))
        })
    }
}

impl<R, O, C, P> SharedStream<R, O, C, P>
where
    R: RxTransfer,
    O: OutputTransfer,
    C: SampleClock,
    P: OutputPin,
{
    /// Route every event kind to [`StreamContext::handle`].
    pub fn install_default(&self) -> Result<(), SharedError> {
        self.install(StreamContext::handlers())
    }

    /// Validate the configuration and drive the initial ready level.
    pub fn start(&'static self) -> Result<(), SharedError> {
        self.with(StreamContext::start)?.map_err(SharedError::from)
    }
}
