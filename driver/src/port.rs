//! Partial draw buffers and strip-by-strip refresh.
//!
//! The graphics side never holds a full frame. A dirty area is cut into
//! strips of at most one draw buffer (`hor_res * 40` pixels), each strip is
//! rendered into the next of two buffers with a [`StripRenderer`] and handed
//! to the [`DisplayAdapter`]. While the bus reads one buffer the other one
//! is being rendered.
//!
//! Buffer reuse is safe because of the alternation: buffer A is rendered
//! again only after the flush that used buffer B, and that flush drained
//! every transfer still reading A.

use core::ptr::NonNull;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::adapter::DisplayAdapter;
use crate::config::{BYTES_PER_PIXEL, MAX_CHUNKS};
use crate::engine::TransferEngine;
use crate::error::{FlushError, GeometryError};

// =============================================================================
// Strip Renderer
// =============================================================================

/// `DrawTarget` over one strip of the screen.
///
/// Drawing uses screen coordinates; anything outside the strip is dropped.
/// Pixels are stored big-endian, ready for the bus.
pub struct StripRenderer<'a> {
    buffer: &'a mut [u8],
    area: Rectangle,
}

impl<'a> StripRenderer<'a> {
    /// Render `area` into the front of `buffer`.
    ///
    /// # Panics
    /// If `buffer` is smaller than the area.
    pub fn new(
        buffer: &'a mut [u8],
        area: Rectangle,
    ) -> Self {
        let len = area.size.width as usize * area.size.height as usize * BYTES_PER_PIXEL;
        Self {
            buffer: &mut buffer[..len],
            area,
        }
    }

    /// Rendered bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] { self.buffer }

    #[inline]
    fn index(
        &self,
        point: Point,
    ) -> Option<usize> {
        if !self.area.contains(point) {
            return None;
        }
        let offset = point - self.area.top_left;
        Some((offset.y as usize * self.area.size.width as usize + offset.x as usize) * BYTES_PER_PIXEL)
    }

    #[inline]
    fn set_pixel(
        &mut self,
        point: Point,
        color: Rgb565,
    ) {
        if let Some(idx) = self.index(point) {
            self.buffer[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&be_bytes(color));
        }
    }
}

#[inline]
fn be_bytes(color: Rgb565) -> [u8; 2] { RawU16::from(color).into_inner().to_be_bytes() }

impl Dimensions for StripRenderer<'_> {
    fn bounding_box(&self) -> Rectangle { self.area }
}

impl DrawTarget for StripRenderer<'_> {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(
        &mut self,
        pixels: I,
    ) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point, color);
        }
        Ok(())
    }

    fn fill_contiguous<I>(
        &mut self,
        area: &Rectangle,
        colors: I,
    ) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        for (point, color) in area.points().zip(colors) {
            self.set_pixel(point, color);
        }
        Ok(())
    }

    fn fill_solid(
        &mut self,
        area: &Rectangle,
        color: Self::Color,
    ) -> Result<(), Self::Error> {
        let drawable = area.intersection(&self.area);
        if drawable.is_zero_sized() {
            return Ok(());
        }

        let pixel = be_bytes(color);
        let stride = self.area.size.width as usize * BYTES_PER_PIXEL;
        let start = (drawable.top_left.x - self.area.top_left.x) as usize * BYTES_PER_PIXEL;
        let len = drawable.size.width as usize * BYTES_PER_PIXEL;
        let first_row = (drawable.top_left.y - self.area.top_left.y) as usize;

        for row in first_row..first_row + drawable.size.height as usize {
            let offset = row * stride + start;
            for px in self.buffer[offset..offset + len].chunks_exact_mut(BYTES_PER_PIXEL) {
                px.copy_from_slice(&pixel);
            }
        }
        Ok(())
    }

    fn clear(
        &mut self,
        color: Self::Color,
    ) -> Result<(), Self::Error> {
        let pixel = be_bytes(color);
        for px in self.buffer.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&pixel);
        }
        Ok(())
    }
}

// =============================================================================
// Draw Buffers
// =============================================================================

/// A `'static` pixel buffer that alternates between being rendered and
/// being read by the bus.
struct DrawBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl DrawBuffer {
    fn new(buffer: &'static mut [u8]) -> Self {
        Self {
            len: buffer.len(),
            ptr: NonNull::from(buffer).cast(),
        }
    }

    /// # Safety
    /// No transfer queued from this buffer may still be outstanding.
    unsafe fn render(&mut self) -> &mut [u8] { unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) } }

    /// # Safety
    /// No transfer queued from this buffer may still be outstanding.
    unsafe fn share(
        &self,
        len: usize,
    ) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), len.min(self.len)) }
    }

    /// # Safety
    /// Every transfer queued from this buffer must have been reconciled and
    /// the descriptor pool released.
    unsafe fn reclaim(self) -> &'static mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// What one refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RefreshStats {
    /// Strips rendered and handed to the adapter
    pub strips: usize,
    /// Strips whose transfers were only partly queued
    pub dropped: usize,
}

// =============================================================================
// Display Port
// =============================================================================

/// Renders scenes through two partial draw buffers into a [`DisplayAdapter`].
pub struct DisplayPort<'g, E, const CHUNKS: usize = MAX_CHUNKS> {
    adapter: DisplayAdapter<'g, E, CHUNKS>,
    buffers: [DrawBuffer; 2],
    next: usize,
    background: Rgb565,
    ready_signals: u32,
}

impl<'g, E: TransferEngine, const CHUNKS: usize> DisplayPort<'g, E, CHUNKS> {
    /// Take ownership of two draw buffers of at least `draw_buffer_px` pixels.
    pub fn new(
        adapter: DisplayAdapter<'g, E, CHUNKS>,
        first: &'static mut [u8],
        second: &'static mut [u8],
    ) -> Result<Self, GeometryError> {
        let expected = adapter.driver_config().draw_buffer_px * BYTES_PER_PIXEL;
        let actual = first.len().min(second.len());
        if actual < expected {
            return Err(GeometryError::BufferTooShort { expected, actual });
        }
        Ok(Self {
            adapter,
            buffers: [DrawBuffer::new(first), DrawBuffer::new(second)],
            next: 0,
            background: Rgb565::BLACK,
            ready_signals: 0,
        })
    }

    /// Colour each strip is cleared to before the scene draws.
    #[must_use]
    pub fn with_background(
        mut self,
        color: Rgb565,
    ) -> Self {
        self.background = color;
        self
    }

    #[inline]
    pub const fn adapter(&self) -> &DisplayAdapter<'g, E, CHUNKS> { &self.adapter }

    #[inline]
    pub fn adapter_mut(&mut self) -> &mut DisplayAdapter<'g, E, CHUNKS> { &mut self.adapter }

    /// Full screen in the configured orientation.
    pub fn screen(&self) -> Rectangle {
        let driver = self.adapter.driver_config();
        Rectangle::new(Point::zero(), Size::new(u32::from(driver.hor_res), u32::from(driver.ver_res)))
    }

    /// Rows per strip for an area `width` pixels wide.
    pub fn strip_rows(
        &self,
        width: u32,
    ) -> u32 {
        let px = self.adapter.driver_config().draw_buffer_px as u32;
        (px / width.max(1)).max(1)
    }

    /// Ready signals received from the adapter so far.
    #[inline]
    pub const fn ready_signals(&self) -> u32 { self.ready_signals }

    /// Render `scene` over `area` strip by strip and flush every strip.
    ///
    /// The area is clipped to the screen. A strip whose submission failed is
    /// counted as dropped and the refresh goes on; a geometry error ends it.
    pub async fn refresh<S>(
        &mut self,
        area: &Rectangle,
        scene: &S,
    ) -> Result<RefreshStats, FlushError>
    where
        S: Drawable<Color = Rgb565>,
    {
        let area = area.intersection(&self.screen());
        let mut stats = RefreshStats::default();
        if area.is_zero_sized() {
            return Ok(stats);
        }

        let rows = self.strip_rows(area.size.width);
        let bottom = area.top_left.y + area.size.height as i32;
        let mut y = area.top_left.y;

        while y < bottom {
            let height = rows.min((bottom - y) as u32);
            let strip = Rectangle::new(Point::new(area.top_left.x, y), Size::new(area.size.width, height));
            y += height as i32;

            let index = self.next;
            self.next ^= 1;

            // SAFETY: this buffer was last shared two strips ago; the flush
            // of the previous strip (or `wait_idle` below) reconciled it.
            let mut renderer = StripRenderer::new(unsafe { self.buffers[index].render() }, strip);
            let _ = renderer.clear(self.background);
            let _ = scene.draw(&mut renderer);
            let len = renderer.bytes().len();

            // SAFETY: the renderer is gone and nothing is queued from this buffer.
            let pixels = unsafe { self.buffers[index].share(len) };

            let mut signalled = 0u32;
            // SAFETY: the buffer is not rendered again before the next flush
            // request, and `release` drains before handing it out.
            let mut on_ready = || signalled += 1;
            let result = unsafe { self.adapter.on_flush_request_unchecked(&strip, pixels, &mut on_ready) }.await;
            self.ready_signals = self.ready_signals.wrapping_add(signalled);
            stats.strips += 1;

            match result {
                Ok(()) => {}
                Err(FlushError::Submission { .. }) => stats.dropped += 1,
                Err(err) => {
                    // Nothing was drained; take both buffers back before returning
                    self.adapter.wait_idle().await;
                    return Err(err);
                }
            }
        }

        Ok(stats)
    }

    /// Refresh the whole screen.
    pub async fn refresh_all<S>(
        &mut self,
        scene: &S,
    ) -> Result<RefreshStats, FlushError>
    where
        S: Drawable<Color = Rgb565>,
    {
        let screen = self.screen();
        self.refresh(&screen, scene).await
    }

    /// Drain every outstanding transfer.
    pub async fn wait_idle(&mut self) { self.adapter.wait_idle().await; }

    /// Drain, then give back the adapter and both draw buffers.
    pub async fn release(mut self) -> (DisplayAdapter<'g, E, CHUNKS>, &'static mut [u8], &'static mut [u8]) {
        self.adapter.wait_idle().await;
        let [first, second] = self.buffers;
        // SAFETY: drained above, which also cleared every pool slot.
        let (first, second) = unsafe { (first.reclaim(), second.reclaim()) };
        (self.adapter, first, second)
    }
}

// =============================================================================
// Tests
// =============================================================================
