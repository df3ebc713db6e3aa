//! Command channel used during panel bring-up.
//!
//! Each exchange is one command byte (D/C low) optionally followed by a short
//! parameter payload (D/C high), sent and finished before the next one starts.
//! The vendor init sequence is a static table replayed once; every entry
//! packs its payload length and a settle-delay flag into one byte, and a
//! `0xFF` length marks the end of the table.

use embedded_hal_async::delay::DelayNs;

use crate::config::INIT_DELAY_MS;
use crate::error::{BringUpError, BusFault};
use crate::window::Orientation;

// ST7789V Commands
pub const SWRESET: u8 = 0x01;
pub const SLPOUT: u8 = 0x11;
pub const INVON: u8 = 0x21;
pub const DISPON: u8 = 0x29;
pub const CASET: u8 = 0x2A;
pub const RASET: u8 = 0x2B;
pub const RAMWR: u8 = 0x2C;
pub const MADCTL: u8 = 0x36;
pub const COLMOD: u8 = 0x3A;

// Init-table length byte
const LEN_MASK: u8 = 0x1F;
const DELAY_FLAG: u8 = 0x80;
const END_OF_TABLE: u8 = 0xFF;

/// Serial link to the controller: command bytes and data bytes.
///
/// Implementations own the D/C and chip-select lines. Each call is one
/// complete transaction.
#[allow(async_fn_in_trait)]
pub trait CommandBus {
    /// Send one command byte with D/C low.
    async fn write_command(
        &mut self,
        cmd: u8,
    ) -> Result<(), BusFault>;

    /// Send data bytes with D/C high.
    async fn write_data(
        &mut self,
        data: &[u8],
    ) -> Result<(), BusFault>;
}

impl<B: CommandBus> CommandBus for &mut B {
    async fn write_command(
        &mut self,
        cmd: u8,
    ) -> Result<(), BusFault> {
        (**self).write_command(cmd).await
    }

    async fn write_data(
        &mut self,
        data: &[u8],
    ) -> Result<(), BusFault> {
        (**self).write_data(data).await
    }
}

/// Send a single command byte.
pub async fn send_command<B: CommandBus>(
    bus: &mut B,
    cmd: u8,
) -> Result<(), BringUpError> {
    bus.write_command(cmd).await?;
    Ok(())
}

/// Send a parameter payload. An empty payload sends nothing.
pub async fn send_data<B: CommandBus>(
    bus: &mut B,
    data: &[u8],
) -> Result<(), BringUpError> {
    if data.is_empty() {
        return Ok(());
    }
    bus.write_data(data).await?;
    Ok(())
}

/// One init-table entry: command, up to 16 parameter bytes, length/flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitCommand {
    pub cmd: u8,
    pub data: [u8; 16],
    /// Bits 0..=4: payload length. Bit 7: settle delay afterwards. `0xFF`: end.
    pub databytes: u8,
}

impl InitCommand {
    /// Table terminator.
    pub const END: Self = Self {
        cmd: 0,
        data: [0; 16],
        databytes: END_OF_TABLE,
    };

    /// Build an entry from a payload prefix and the raw length/flags byte.
    pub const fn new(
        cmd: u8,
        payload: &[u8],
        databytes: u8,
    ) -> Self {
        let mut data = [0u8; 16];
        let mut i = 0;
        while i < payload.len() && i < data.len() {
            data[i] = payload[i];
            i += 1;
        }
        Self { cmd, data, databytes }
    }

    /// Whether this entry terminates the table.
    #[inline]
    pub const fn is_end(&self) -> bool { self.databytes == END_OF_TABLE }

    /// Whether the panel needs a settle delay after this entry.
    #[inline]
    pub const fn wants_delay(&self) -> bool { self.databytes & DELAY_FLAG != 0 }

    /// Parameter bytes to send after the command.
    pub fn payload(&self) -> &[u8] {
        let len = ((self.databytes & LEN_MASK) as usize).min(self.data.len());
        &self.data[..len]
    }
}

/// Vendor init sequence for the 240x280 ST7789V glass.
pub const ST7789V_INIT: &[InitCommand] = &[
    InitCommand::new(SLPOUT, &[0], 0x08),
    InitCommand::new(COLMOD, &[0x05], 1),
    InitCommand::new(0xC5, &[0x1A], 1),
    InitCommand::new(MADCTL, &[0x00], 1),
    InitCommand::new(0xB2, &[0x05, 0x05, 0x00, 0x33, 0x33], 5),
    InitCommand::new(0xB7, &[0x05], 1),
    InitCommand::new(0xBB, &[0x3F], 1),
    InitCommand::new(0xC0, &[0x2C], 1),
    InitCommand::new(0xC2, &[0x01], 1),
    InitCommand::new(0xC3, &[0x0F], 1),
    InitCommand::new(0xC4, &[0x20], 1),
    // Set to 0x28 if the display is flipped
    InitCommand::new(0xC6, &[0x01], 1),
    InitCommand::new(0xD0, &[0xA4, 0xA1], 2),
    InitCommand::new(0xE8, &[0x03], 1),
    InitCommand::new(0xE9, &[0x09, 0x09, 0x08], 3),
    // Positive gamma
    InitCommand::new(
        0xE0,
        &[0xD0, 0x05, 0x09, 0x09, 0x08, 0x14, 0x28, 0x33, 0x3F, 0x07, 0x13, 0x14, 0x28, 0x30],
        14,
    ),
    // Negative gamma
    InitCommand::new(
        0xE1,
        &[0xD0, 0x05, 0x09, 0x09, 0x08, 0x03, 0x24, 0x32, 0x32, 0x3B, 0x14, 0x13, 0x28, 0x2F],
        14,
    ),
    InitCommand::new(INVON, &[], 0),
    InitCommand::new(DISPON, &[], 0),
    InitCommand::END,
];

/// Replay an init table up to its terminator.
///
/// Returns the number of entries sent. Any bus failure aborts the replay.
pub async fn replay<B: CommandBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    table: &[InitCommand],
) -> Result<usize, BringUpError> {
    let mut sent = 0;
    for entry in table.iter().take_while(|entry| !entry.is_end()) {
        send_command(bus, entry.cmd).await?;
        send_data(bus, entry.payload()).await?;
        if entry.wants_delay() {
            delay.delay_ms(INIT_DELAY_MS).await;
        }
        sent += 1;
    }
    Ok(sent)
}

/// Program MADCTL for `orientation`.
pub async fn set_orientation<B: CommandBus>(
    bus: &mut B,
    orientation: Orientation,
) -> Result<(), BringUpError> {
    info!("Display orientation: {}", orientation.label());
    info!("0x36 command value: {:#04x}", orientation.madctl());
    send_command(bus, MADCTL).await?;
    send_data(bus, &[orientation.madctl()]).await
}

// =============================================================================
// Tests
// =============================================================================
