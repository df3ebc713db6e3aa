//! ST7789V display port - chunked frame transfers for SPI colour LCDs.
//!
//! This crate contains everything between a rendered pixel buffer and the
//! serial bus of an ST7789V panel, written so it can be tested on the host:
//!
//! - [`scheduler`]: slices a flush request into address-window chunks that
//!   fit the transfer ceiling and queues them on a [`TransferEngine`]
//! - [`pool`]: fixed arena of descriptor groups (six slots per chunk)
//! - [`reconciler`]: drains the previous flush before slots are reused
//! - [`adapter`]: the display-driver flush contract and the flush gate
//! - [`command`] / [`panel`]: bring-up (reset, init table, orientation, backlight)
//! - [`engine`]: channel-backed and immediate transfer engines
//! - [`port`]: partial draw buffers and strip-by-strip refresh for `embedded-graphics`
//! - [`emulator`]: decodes the transaction stream back into pixels
//!
//! # Testing
//!
//! Run tests on host with:
//! ```bash
//! cargo test -p st7789v-driver
//! ```
//!
//! Tests run with `std` enabled (via `cfg_attr`), while the firmware links the
//! crate as `no_std`.

// Use no_std only when NOT testing (tests need std for the test harness)
#![cfg_attr(not(test), no_std)]
// Crate-level lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

// Must come first so the logging macros are visible to every module below
#[macro_use]
mod fmt;

pub mod adapter;
pub mod command;
pub mod config;
pub mod emulator;
pub mod engine;
pub mod error;
pub mod panel;
pub mod pool;
pub mod port;
pub mod reconciler;
pub mod scene;
pub mod scheduler;
pub mod window;

#[cfg(test)]
mod mock;

pub use adapter::{DisplayAdapter, DisplayDriverConfig, FlushGate, FlushReady};
pub use command::CommandBus;
pub use config::PanelConfig;
pub use engine::{ChannelEngine, ImmediateEngine, TransferChannels, TransferEngine, TransferWorker};
pub use error::{BringUpError, BusFault, FlushError, GeometryError};
pub use panel::Panel;
pub use port::DisplayPort;
pub use scheduler::{FlushReport, FrameScheduler};
pub use window::{AddressWindow, Orientation};
