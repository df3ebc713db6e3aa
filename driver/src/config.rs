//! Panel and transfer configuration.
//!
//! # Panel
//!
//! The ST7789V controller has 240x320 of display RAM; the 1.69" glass only
//! shows 240x280 of it, starting 20 lines in. Which axis carries that offset
//! depends on the MADCTL orientation (see [`Orientation`]).
//!
//! # Transfer ceiling
//!
//! One bulk transaction may move at most `HOR_RES * MAX_ROWS * 2` bytes,
//! with fewer rows per chunk on panels wider than 240 pixels. The SPI bus
//! itself is configured for a few bytes more than that.

use crate::window::Orientation;

// =============================================================================
// Panel Geometry
// =============================================================================

/// Visible width in the native (portrait) orientation.
pub const PANEL_WIDTH: u16 = 240;

/// Visible height in the native (portrait) orientation.
pub const PANEL_HEIGHT: u16 = 280;

/// Offset of the visible glass inside controller RAM, along the long axis.
pub const PANEL_OFFSET: u16 = 20;

/// Controller RAM size along the long axis.
pub const CONTROLLER_RAM_LINES: u16 = 320;

/// RGB565: two bytes per pixel, big-endian on the wire.
pub const BYTES_PER_PIXEL: usize = 2;

// =============================================================================
// Transfer Limits
// =============================================================================

/// Descriptor groups (chunks) the pool can hold for one flush.
pub const MAX_CHUNKS: usize = 6;

/// Slots in one chunk's descriptor group.
pub const GROUP_LEN: usize = 6;

/// Descriptors one flush can queue at most.
pub const MAX_DESCRIPTORS: usize = MAX_CHUNKS * GROUP_LEN;

/// Depth of the transfer queue between scheduler and bus worker.
pub const QUEUE_DEPTH: usize = 30;

/// Extra bytes the bus accepts beyond the pixel ceiling.
pub const BUS_TRANSFER_SLACK: usize = 8;

/// Rows per chunk for a given horizontal resolution.
pub const fn max_chunk_rows(hor_res: u16) -> usize {
    if hor_res > 240 { 50 } else { 60 }
}

/// Largest pixel payload of one bulk transaction, in bytes.
pub const fn transfer_ceiling(hor_res: u16) -> usize { hor_res as usize * max_chunk_rows(hor_res) * BYTES_PER_PIXEL }

// =============================================================================
// Draw Buffers
// =============================================================================

/// Rows held by each partial draw buffer.
pub const DRAW_BUFFER_ROWS: usize = 40;

// =============================================================================
// Bring-up Timing and Backlight
// =============================================================================

/// Reset line low time, then high time, in milliseconds.
pub const RESET_PULSE_MS: u32 = 200;

/// Settle time after an init-table entry flagged for delay.
pub const INIT_DELAY_MS: u32 = 200;

/// Backlight full scale.
pub const BACKLIGHT_MAX: u16 = 1000;

/// Backlight level applied at the end of bring-up (50%).
pub const BACKLIGHT_DEFAULT: u16 = 500;

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Per-instance panel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanelConfig {
    /// Mounting orientation (MADCTL value and coordinate bias).
    pub orientation: Orientation,
    /// Transfer ceiling in bytes for one bulk transaction.
    pub ceiling: usize,
}

impl PanelConfig {
    /// Configuration for `orientation` with the ceiling derived from its width.
    pub const fn new(orientation: Orientation) -> Self {
        let (hor_res, _) = orientation.resolution();
        Self {
            orientation,
            ceiling: transfer_ceiling(hor_res),
        }
    }

    /// Override the transfer ceiling.
    #[must_use]
    pub const fn with_ceiling(
        mut self,
        ceiling: usize,
    ) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Visible resolution as `(hor_res, ver_res)`.
    pub const fn resolution(&self) -> (u16, u16) { self.orientation.resolution() }

    /// Pixels in one partial draw buffer.
    pub const fn draw_buffer_px(&self) -> usize {
        let (hor_res, _) = self.resolution();
        hor_res as usize * DRAW_BUFFER_ROWS
    }

    /// Maximum transfer size to configure on the SPI bus.
    pub const fn bus_max_transfer(&self) -> usize { self.ceiling + BUS_TRANSFER_SLACK }
}

impl Default for PanelConfig {
    fn default() -> Self { Self::new(Orientation::Normal) }
}

// =============================================================================
// Tests
// =============================================================================
