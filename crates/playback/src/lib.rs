//! Streaming core for the DAC stream slave.
//!
//! Receives chip-select-framed SPI traffic, double-buffers samples per
//! output channel and swaps buffers when a DAC drain completes. Everything
//! here is hardware-independent; peripherals arrive through the `platform`
//! traits.
//!
//! # Data path
//!
//! ```text
//! SPI landing buffer ─► FrameReceiver ─► parse_frame ─► Dispatcher
//!                                                          │
//!                         ┌────────────────────────────────┘
//!                         ▼
//!              AudioChannel (fill ▸ swap ▸ drain) ─► OutputDriver ─► DAC
//!                         │
//!                         └─► FlowController ─► ready line
//! ```
//!
//! # Features
//!
//! - `defmt`: log through defmt and derive `defmt::Format` (target builds)
//! - `tracing`: log through tracing (emulator and host diagnostics)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
mod fmt;

pub mod channel;
pub mod context;
pub mod dispatcher;
pub mod events;
pub mod flow;
pub mod output;
pub mod protocol;
pub mod receiver;
pub mod stats;

pub use channel::{convert_sample, AudioChannel, BufferSlot, ChannelPair, ChannelStats, CAPACITY};
pub use context::{ChannelStatus, StatusSnapshot, StreamContext};
pub use dispatcher::Dispatcher;
pub use events::{EventKind, Handler, HandlerTable, StreamEvent};
pub use flow::{compute_ready, FlowController};
pub use output::{DrainCounters, DrainOutcome, OutputDriver};
pub use protocol::{
    encode_data_frame, parse_frame, Command, CommandFrame, DataFrame, Frame, ProtocolError,
    COMMAND_HEADER, DATA_HEADER,
};
pub use receiver::{FrameReceiver, ReceiverState};
pub use stats::ErrorStats;
