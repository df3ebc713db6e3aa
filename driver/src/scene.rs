//! Test card drawn by the firmware and the simulator.
//!
//! Eight colour bars, a moving marker that forces every strip to change
//! between frames, and a caption with orientation, frame number and the last
//! flush statistics.

use core::fmt::Write;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Alignment, Text};
use heapless::String;
use profont::PROFONT_18_POINT;

use crate::window::Orientation;

const BARS: [Rgb565; 8] = [
    Rgb565::WHITE,
    Rgb565::YELLOW,
    Rgb565::CYAN,
    Rgb565::GREEN,
    Rgb565::MAGENTA,
    Rgb565::RED,
    Rgb565::BLUE,
    Rgb565::BLACK,
];

const TITLE_STYLE: MonoTextStyle<'static, Rgb565> = MonoTextStyle::new(&PROFONT_18_POINT, Rgb565::WHITE);
const CAPTION_STYLE: MonoTextStyle<'static, Rgb565> = MonoTextStyle::new(&FONT_6X10, Rgb565::WHITE);
const PANEL_STYLE: PrimitiveStyle<Rgb565> = PrimitiveStyle::with_fill(Rgb565::BLACK);
const MARKER_STYLE: PrimitiveStyle<Rgb565> = PrimitiveStyle::with_fill(Rgb565::RED);

/// Caption panel height at the bottom of the card.
const CAPTION_HEIGHT: u32 = 48;
const MARKER_SIZE: u32 = 16;
/// Longest orientation label plus three `u32::MAX` counters.
const CAPTION_LEN: usize = 64;

/// One frame of the test card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCard {
    pub orientation: Orientation,
    pub frame: u32,
    /// Frames per second over the last measurement window
    pub fps: u32,
    /// Strips dropped since boot
    pub dropped: u32,
}

impl TestCard {
    pub const fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            frame: 0,
            fps: 0,
            dropped: 0,
        }
    }

    fn size(&self) -> Size {
        let (w, h) = self.orientation.resolution();
        Size::new(u32::from(w), u32::from(h))
    }

    /// Marker position, bouncing down the left edge.
    fn marker(&self) -> Point {
        let travel = self.size().height.saturating_sub(CAPTION_HEIGHT + MARKER_SIZE).max(1);
        let phase = self.frame.wrapping_mul(4) % (travel * 2);
        let y = if phase < travel { phase } else { travel * 2 - phase };
        Point::new(4, y as i32)
    }

    /// Status line under the title.
    fn caption(&self) -> String<CAPTION_LEN> {
        let mut line = String::new();
        let _ = write!(line, "{} #{} {}fps drop {}", self.orientation.label(), self.frame, self.fps, self.dropped);
        line
    }
}

impl Drawable for TestCard {
    type Color = Rgb565;
    type Output = ();

    fn draw<D>(
        &self,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let size = self.size();
        let bar_width = size.width / BARS.len() as u32;
        let bars_height = size.height - CAPTION_HEIGHT;

        for (i, color) in BARS.iter().enumerate() {
            let x = (i as u32 * bar_width) as i32;
            // Last bar takes the rounding remainder
            let width = if i + 1 == BARS.len() { size.width - i as u32 * bar_width } else { bar_width };
            target.fill_solid(&Rectangle::new(Point::new(x, 0), Size::new(width, bars_height)), *color)?;
        }

        Rectangle::new(self.marker(), Size::new(MARKER_SIZE, MARKER_SIZE))
            .into_styled(MARKER_STYLE)
            .draw(target)?;

        let caption = Rectangle::new(Point::new(0, bars_height as i32), Size::new(size.width, CAPTION_HEIGHT));
        caption.into_styled(PANEL_STYLE).draw(target)?;

        let centre_x = (size.width / 2) as i32;
        Text::with_alignment("ST7789V", Point::new(centre_x, bars_height as i32 + 18), TITLE_STYLE, Alignment::Center)
            .draw(target)?;

        let line = self.caption();
        Text::with_alignment(&line, Point::new(centre_x, bars_height as i32 + 38), CAPTION_STYLE, Alignment::Center)
            .draw(target)?;

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
