//! Hardware abstraction layer for the DAC stream slave.
//!
//! This crate describes the peripherals the streaming core drives, as
//! traits, so the core can be exercised on the host without hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Interrupt glue (firmware crate)
//!         ↓
//! Streaming core (playback crate)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (SPI slave DMA, DAC DMA, sample timer, nRDY pin)
//! ```
//!
//! # Abstractions
//!
//! - [`RxTransfer`] - bounded receive transfer into the landing buffer
//! - [`OutputTransfer`] - per-channel DAC drain engine
//! - [`SampleClock`] - shared 32 kHz trigger for both DAC channels
//! - [`force_disable`] - bounded disable-and-poll cancellation primitive
//! - [`ReadyPolarity`] - level mapping for the flow-control line
//!
//! # Features
//!
//! - `std`: expose [`mocks`] to other crates (host tests, emulator)
//! - `defmt`: derive `defmt::Format` on all diagnostic types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors; callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod audio_types;
pub mod dma;
pub mod error;
pub mod gpio;
pub mod stream_config;

pub mod mocks;

pub use audio_types::{ChannelId, VolumePercent};
pub use dma::{force_disable, ForceDisable, OutputTransfer, RxTransfer, SampleClock};
pub use error::{ConfigError, DriverFault, InvalidChannel, PollTimeout, TransferError};
pub use gpio::{drive_ready, ReadyPolarity};
pub use stream_config::StreamConfig;
