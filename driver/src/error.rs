//! Error types for the display port.
//!
//! - [`BusFault`]: one transaction failed on the serial bus (degraded, logged)
//! - [`GeometryError`]: a flush request cannot be expressed under the transfer
//!   ceiling or does not fit the panel (fatal configuration error)
//! - [`FlushError`]: what a flush call returns
//! - [`BringUpError`]: panel initialisation failed (fatal)

use thiserror::Error;

/// Failure of a single bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusFault {
    /// SPI peripheral reported an error
    #[error("SPI transfer failed")]
    Spi,
    /// Data/command line could not be driven
    #[error("D/C line error")]
    DataCommand,
    /// Chip-select line could not be driven
    #[error("CS line error")]
    ChipSelect,
    /// The transfer queue refused the descriptor
    #[error("transfer queue rejected descriptor")]
    QueueRejected,
    /// A completion was requested with nothing in flight
    #[error("no transfer in flight")]
    NothingInFlight,
}

/// A flush request that the scheduler cannot turn into transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GeometryError {
    /// Window bounds are reversed, negative or empty
    #[error("invalid area")]
    InvalidArea,
    /// Window extends past the panel resolution
    #[error("area {x2}x{y2} outside {hor_res}x{ver_res} panel")]
    OutOfBounds { x2: u16, y2: u16, hor_res: u16, ver_res: u16 },
    /// A single row is wider than the transfer ceiling
    #[error("row of {row_bytes} bytes exceeds {ceiling} byte ceiling")]
    RowExceedsCeiling { row_bytes: usize, ceiling: usize },
    /// More chunks than the descriptor pool holds
    #[error("{needed} chunks needed, pool holds {capacity}")]
    TooManyChunks { needed: usize, capacity: usize },
    /// Pixel buffer does not cover the window
    #[error("pixel buffer too short: expected {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },
}

/// Result of a flush call that did not complete normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlushError {
    /// Fatal: the request can never be transferred with this configuration
    #[error("geometry: {0}")]
    Geometry(#[from] GeometryError),
    /// Degraded: the frame was only partially queued
    #[error("submission stopped after {queued} descriptors: {fault}")]
    Submission { queued: usize, fault: BusFault },
}

impl FlushError {
    /// Whether the error means the panel cannot be driven at all.
    pub const fn is_fatal(&self) -> bool { matches!(self, Self::Geometry(_)) }
}

/// Panel bring-up failure. The panel is unusable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringUpError {
    /// Command or data write failed during initialisation
    #[error("bus error during bring-up: {0}")]
    Bus(#[from] BusFault),
    /// Reset line could not be driven
    #[error("reset line error")]
    Reset,
    /// Backlight PWM rejected the duty cycle
    #[error("backlight PWM error")]
    Backlight,
}

// =============================================================================
// Tests
// =============================================================================
