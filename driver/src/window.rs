//! Address windows and panel orientation.
//!
//! An [`AddressWindow`] is the inclusive column/row rectangle that CASET and
//! RASET program into the controller. Flush areas arrive in visible-screen
//! coordinates and are shifted by [`PANEL_OFFSET`] along one axis before
//! transmission; which axis depends on the [`Orientation`].

use embedded_graphics::primitives::Rectangle;

use crate::config::{PANEL_HEIGHT, PANEL_OFFSET, PANEL_WIDTH};
use crate::error::GeometryError;

// MADCTL flags
const MADCTL_MY: u8 = 0x80; // Row address order
const MADCTL_MX: u8 = 0x40; // Column address order
const MADCTL_MV: u8 = 0x20; // Row/column exchange

/// Axis that receives the panel offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BiasAxis {
    /// Offset added to y1/y2 (RASET)
    Row,
    /// Offset added to x1/x2 (CASET)
    Column,
}

/// Panel mounting orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Orientation {
    /// Portrait, native scan direction
    #[default]
    Normal = 0,
    /// Landscape, 90° (MV | MX)
    Rotated = 1,
    /// Portrait, 180° (MY | MX)
    Inverted = 2,
    /// Landscape, 270° (MY | MV)
    RotatedInverted = 3,
}

impl Orientation {
    /// All orientations in index order.
    pub const ALL: [Self; 4] = [Self::Normal, Self::Rotated, Self::Inverted, Self::RotatedInverted];

    /// Orientation for a configuration index (0..=3).
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Normal),
            1 => Some(Self::Rotated),
            2 => Some(Self::Inverted),
            3 => Some(Self::RotatedInverted),
            _ => None,
        }
    }

    /// Configuration index (0..=3).
    #[inline]
    pub const fn index(self) -> u8 { self as u8 }

    /// MADCTL (0x36) register value.
    pub const fn madctl(self) -> u8 {
        match self {
            Self::Normal => 0x00,
            Self::Rotated => MADCTL_MV | MADCTL_MX,
            Self::Inverted => MADCTL_MY | MADCTL_MX,
            Self::RotatedInverted => MADCTL_MY | MADCTL_MV,
        }
    }

    /// Axis that carries the panel offset.
    pub const fn bias_axis(self) -> BiasAxis {
        match self {
            Self::Normal | Self::Inverted => BiasAxis::Row,
            Self::Rotated | Self::RotatedInverted => BiasAxis::Column,
        }
    }

    /// Whether rows and columns are exchanged.
    #[inline]
    pub const fn is_landscape(self) -> bool { matches!(self.bias_axis(), BiasAxis::Column) }

    /// Visible resolution as `(hor_res, ver_res)`.
    pub const fn resolution(self) -> (u16, u16) {
        if self.is_landscape() {
            (PANEL_HEIGHT, PANEL_WIDTH)
        } else {
            (PANEL_WIDTH, PANEL_HEIGHT)
        }
    }

    /// Name used in bring-up logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "PORTRAIT",
            Self::Rotated => "LANDSCAPE",
            Self::Inverted => "PORTRAIT_INVERTED",
            Self::RotatedInverted => "LANDSCAPE_INVERTED",
        }
    }
}

/// Inclusive column/row bounds of a controller write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressWindow {
    pub x1: u16,
    pub x2: u16,
    pub y1: u16,
    pub y2: u16,
}

impl AddressWindow {
    /// Create a window, rejecting reversed bounds.
    pub const fn new(
        x1: u16,
        x2: u16,
        y1: u16,
        y2: u16,
    ) -> Result<Self, GeometryError> {
        if x1 > x2 || y1 > y2 {
            return Err(GeometryError::InvalidArea);
        }
        Ok(Self { x1, x2, y1, y2 })
    }

    /// Convert a graphics-library area, checking it fits a `hor_res` x `ver_res` screen.
    pub fn from_area(
        area: &Rectangle,
        hor_res: u16,
        ver_res: u16,
    ) -> Result<Self, GeometryError> {
        let Some(bottom_right) = area.bottom_right() else {
            return Err(GeometryError::InvalidArea);
        };
        let top_left = area.top_left;
        if top_left.x < 0 || top_left.y < 0 {
            return Err(GeometryError::InvalidArea);
        }
        let (Ok(x2), Ok(y2)) = (u16::try_from(bottom_right.x), u16::try_from(bottom_right.y)) else {
            return Err(GeometryError::InvalidArea);
        };
        if x2 >= hor_res || y2 >= ver_res {
            return Err(GeometryError::OutOfBounds {
                x2,
                y2,
                hor_res,
                ver_res,
            });
        }
        Self::new(top_left.x as u16, x2, top_left.y as u16, y2)
    }

    /// Number of columns.
    #[inline]
    pub const fn width(&self) -> usize { (self.x2 - self.x1) as usize + 1 }

    /// Number of rows.
    #[inline]
    pub const fn height(&self) -> usize { (self.y2 - self.y1) as usize + 1 }

    /// Number of pixels covered.
    #[inline]
    pub const fn pixel_count(&self) -> usize { self.width() * self.height() }

    /// Shift into controller RAM coordinates for `orientation`.
    ///
    /// Only one axis moves; the other pair is returned unchanged.
    pub fn biased(
        self,
        orientation: Orientation,
    ) -> Result<Self, GeometryError> {
        let shift = |a: u16, b: u16| match (a.checked_add(PANEL_OFFSET), b.checked_add(PANEL_OFFSET)) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(GeometryError::InvalidArea),
        };
        match orientation.bias_axis() {
            BiasAxis::Row => {
                let (y1, y2) = shift(self.y1, self.y2)?;
                Ok(Self { y1, y2, ..self })
            }
            BiasAxis::Column => {
                let (x1, x2) = shift(self.x1, self.x2)?;
                Ok(Self { x1, x2, ..self })
            }
        }
    }

    /// CASET payload: start and end column, big-endian.
    pub const fn column_bytes(&self) -> [u8; 4] { range_bytes(self.x1, self.x2) }
}

/// Big-endian `[start hi, start lo, end hi, end lo]` for CASET/RASET.
pub const fn range_bytes(
    start: u16,
    end: u16,
) -> [u8; 4] {
    let [s_hi, s_lo] = start.to_be_bytes();
    let [e_hi, e_lo] = end.to_be_bytes();
    [s_hi, s_lo, e_hi, e_lo]
}

// =============================================================================
// Tests
// =============================================================================
