//! Software model of the ST7789V command interface.
//!
//! [`PanelModel`] implements [`CommandBus`] and decodes what the scheduler
//! sends: CASET/RASET set the address window, RAMWR resets the write
//! cursor, and the data that follows fills the window left to right, top to
//! bottom, wrapping back to the top. MADCTL selects how controller RAM maps
//! onto the visible glass. Visible pixels go to a [`PixelSink`].
//!
//! The host simulator draws through it, and the round-trip tests use it to
//! check that what was flushed is what the panel would show.

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::prelude::*;
use heapless::Vec;

use crate::command::{CASET, CommandBus, MADCTL, RAMWR, RASET};
use crate::config::PANEL_OFFSET;
use crate::error::BusFault;
use crate::window::{BiasAxis, Orientation};

/// Receiver of decoded pixels, in visible-screen coordinates.
pub trait PixelSink {
    fn put_pixel(
        &mut self,
        point: Point,
        color: Rgb565,
    );
}

impl<D: DrawTarget<Color = Rgb565>> PixelSink for D {
    fn put_pixel(
        &mut self,
        point: Point,
        color: Rgb565,
    ) {
        let _ = Pixel(point, color).draw(self);
    }
}

/// What the data phase after the last command means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataPhase {
    Ignore,
    Columns,
    Rows,
    AccessControl,
    Pixels,
}

/// Inclusive RAM address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamRange {
    pub start: u16,
    pub end: u16,
}

impl RamRange {
    const fn from_be(bytes: &[u8]) -> Self {
        Self {
            start: u16::from_be_bytes([bytes[0], bytes[1]]),
            end: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// Decoder for the command/data stream of one panel.
pub struct PanelModel<S> {
    sink: S,
    phase: DataPhase,
    params: Vec<u8, 4>,
    columns: RamRange,
    rows: RamRange,
    cursor: (u16, u16),
    high_byte: Option<u8>,
    madctl: u8,
    commands: usize,
    pixels: usize,
    clipped: usize,
}

impl<S: PixelSink> PanelModel<S> {
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            phase: DataPhase::Ignore,
            params: Vec::new(),
            columns: RamRange { start: 0, end: 0 },
            rows: RamRange { start: 0, end: 0 },
            cursor: (0, 0),
            high_byte: None,
            madctl: 0,
            commands: 0,
            pixels: 0,
            clipped: 0,
        }
    }

    #[inline]
    pub fn sink(&self) -> &S { &self.sink }

    #[inline]
    pub fn sink_mut(&mut self) -> &mut S { &mut self.sink }

    pub fn into_sink(self) -> S { self.sink }

    /// Last MADCTL value received.
    #[inline]
    pub const fn madctl(&self) -> u8 { self.madctl }

    /// Orientation matching the last MADCTL value, if it is one of the four.
    pub fn orientation(&self) -> Option<Orientation> { Orientation::ALL.into_iter().find(|o| o.madctl() == self.madctl) }

    #[inline]
    pub const fn columns(&self) -> RamRange { self.columns }

    #[inline]
    pub const fn rows(&self) -> RamRange { self.rows }

    /// Commands received.
    #[inline]
    pub const fn commands(&self) -> usize { self.commands }

    /// Pixels written to RAM, visible or not.
    #[inline]
    pub const fn pixels(&self) -> usize { self.pixels }

    /// Pixels that landed outside the visible glass.
    #[inline]
    pub const fn clipped(&self) -> usize { self.clipped }

    fn accept_param(
        &mut self,
        byte: u8,
    ) {
        if self.params.push(byte).is_err() || !self.params.is_full() {
            return;
        }
        match self.phase {
            DataPhase::Columns => self.columns = RamRange::from_be(&self.params),
            DataPhase::Rows => self.rows = RamRange::from_be(&self.params),
            _ => {}
        }
    }

    fn accept_pixel_byte(
        &mut self,
        byte: u8,
    ) {
        let Some(high) = self.high_byte.take() else {
            self.high_byte = Some(byte);
            return;
        };
        let color = Rgb565::from(RawU16::new(u16::from_be_bytes([high, byte])));
        let (x, y) = self.cursor;
        self.pixels += 1;
        match self.visible(x, y) {
            Some(point) => self.sink.put_pixel(point, color),
            None => self.clipped += 1,
        }
        self.advance();
    }

    fn advance(&mut self) {
        let (mut x, mut y) = self.cursor;
        if x >= self.columns.end {
            x = self.columns.start;
            y = if y >= self.rows.end { self.rows.start } else { y + 1 };
        } else {
            x += 1;
        }
        self.cursor = (x, y);
    }

    /// Map a RAM address to the visible glass for the current MADCTL.
    fn visible(
        &self,
        x: u16,
        y: u16,
    ) -> Option<Point> {
        let orientation = self.orientation()?;
        let (hor_res, ver_res) = orientation.resolution();
        let (x, y) = match orientation.bias_axis() {
            BiasAxis::Row => (x, y.checked_sub(PANEL_OFFSET)?),
            BiasAxis::Column => (x.checked_sub(PANEL_OFFSET)?, y),
        };
        (x < hor_res && y < ver_res).then(|| Point::new(i32::from(x), i32::from(y)))
    }
}

impl<S: PixelSink> CommandBus for PanelModel<S> {
    async fn write_command(
        &mut self,
        cmd: u8,
    ) -> Result<(), BusFault> {
        self.commands += 1;
        self.params.clear();
        self.high_byte = None;
        self.phase = match cmd {
            CASET => DataPhase::Columns,
            RASET => DataPhase::Rows,
            MADCTL => DataPhase::AccessControl,
            RAMWR => {
                self.cursor = (self.columns.start, self.rows.start);
                DataPhase::Pixels
            }
            _ => DataPhase::Ignore,
        };
        Ok(())
    }

    async fn write_data(
        &mut self,
        data: &[u8],
    ) -> Result<(), BusFault> {
        match self.phase {
            DataPhase::Ignore => {}
            DataPhase::AccessControl => {
                if let Some(&value) = data.first() {
                    self.madctl = value;
                }
            }
            DataPhase::Columns | DataPhase::Rows => {
                for &byte in data {
                    self.accept_param(byte);
                }
            }
            DataPhase::Pixels => {
                for &byte in data {
                    self.accept_pixel_byte(byte);
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
