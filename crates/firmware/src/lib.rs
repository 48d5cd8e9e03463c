//! DAC Stream Slave Firmware
//!
//! Interrupt glue around the streaming core: owns the stream context behind
//! a critical section, routes interrupt events through the handler table and
//! renders periodic status reports.
//!
//! # Architecture
//!
//! This firmware follows a layered architecture:
//!
//! ```text
//! Interrupt vectors (board support: EXTI, SPI RX DMA, DAC DMA)
//!         ↓  SharedStream::raise(StreamEvent)
//! Shared context (this crate)
//!         ↓
//! Streaming core (playback crate)
//!         ↓
//! Platform HAL (platform crate traits)
//! ```
//!
//! # Features
//!
//! - `hardware` - defmt diagnostics for the target build
//! - `emulator` - Build for desktop testing (tokio, tracing)
//! - `std` - Enable standard library (for emulator and testing)
//!
//! # Emulator Target
//!
//! ```bash
//! cargo run -p firmware --example stream_emulator --features emulator
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
// Logging discipline
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // most errors are self-explanatory
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod shared;
pub mod status;

pub use shared::{SharedError, SharedStream};
pub use status::{report, StatusReport};
