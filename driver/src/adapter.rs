//! Display-driver adapter.
//!
//! The graphics side hands over a dirty area and its rendered pixels, and
//! expects exactly one "flush ready" signal back before it reuses the
//! buffer. The adapter forwards the request to the [`FrameScheduler`] and
//! signals as soon as everything is queued; the scheduler's next drain
//! keeps the buffer safe until the bus is done with it.
//!
//! A [`FlushGate`] can freeze the physical screen while rendering goes on:
//! with the gate closed nothing new is queued, outstanding transfers are
//! still drained, and the ready signal still fires.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_graphics::primitives::Rectangle;

use crate::config::{MAX_CHUNKS, PanelConfig};
use crate::engine::TransferEngine;
use crate::error::FlushError;
use crate::reconciler::DrainOutcome;
use crate::scheduler::{FlushReport, FrameScheduler};
use crate::window::AddressWindow;

/// Process-wide "flushing enabled" switch.
#[derive(Debug)]
pub struct FlushGate(AtomicBool);

impl FlushGate {
    pub const fn new(enabled: bool) -> Self { Self(AtomicBool::new(enabled)) }

    #[inline]
    pub fn enable(&self) { self.0.store(true, Ordering::Release); }

    #[inline]
    pub fn disable(&self) { self.0.store(false, Ordering::Release); }

    #[inline]
    pub fn set(
        &self,
        enabled: bool,
    ) {
        self.0.store(enabled, Ordering::Release);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool { self.0.load(Ordering::Acquire) }
}

impl Default for FlushGate {
    fn default() -> Self { Self::new(true) }
}

/// Completion signal back to the graphics side.
pub trait FlushReady {
    fn flush_ready(&mut self);
}

impl<F: FnMut()> FlushReady for F {
    fn flush_ready(&mut self) { self() }
}

/// What the graphics side registers for this panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayDriverConfig {
    pub hor_res: u16,
    pub ver_res: u16,
    /// Pixels per partial draw buffer
    pub draw_buffer_px: usize,
}

impl DisplayDriverConfig {
    pub const fn from_panel(config: &PanelConfig) -> Self {
        let (hor_res, ver_res) = config.resolution();
        Self {
            hor_res,
            ver_res,
            draw_buffer_px: config.draw_buffer_px(),
        }
    }
}

/// Flush contract on top of a scheduler and a transfer engine.
pub struct DisplayAdapter<'g, E, const CHUNKS: usize = MAX_CHUNKS> {
    scheduler: FrameScheduler<CHUNKS>,
    engine: E,
    gate: &'g FlushGate,
    driver: DisplayDriverConfig,
    last_report: Option<FlushReport>,
    skipped: u32,
}

impl<'g, E: TransferEngine, const CHUNKS: usize> DisplayAdapter<'g, E, CHUNKS> {
    pub fn new(
        config: PanelConfig,
        engine: E,
        gate: &'g FlushGate,
    ) -> Self {
        let driver = DisplayDriverConfig::from_panel(&config);
        info!(
            "Display driver: {}x{}, draw buffer {} px",
            driver.hor_res,
            driver.ver_res,
            driver.draw_buffer_px
        );
        Self {
            scheduler: FrameScheduler::new(config),
            engine,
            gate,
            driver,
            last_report: None,
            skipped: 0,
        }
    }

    /// Registration data for the graphics side.
    #[inline]
    pub const fn driver_config(&self) -> &DisplayDriverConfig { &self.driver }

    #[inline]
    pub const fn gate(&self) -> &'g FlushGate { self.gate }

    #[inline]
    pub const fn scheduler(&self) -> &FrameScheduler<CHUNKS> { &self.scheduler }

    #[inline]
    pub fn engine(&self) -> &E { &self.engine }

    #[inline]
    pub fn engine_mut(&mut self) -> &mut E { &mut self.engine }

    /// Report of the last flush that reached the scheduler successfully.
    #[inline]
    pub const fn last_report(&self) -> Option<FlushReport> { self.last_report }

    /// Requests skipped because the gate was closed.
    #[inline]
    pub const fn skipped(&self) -> u32 { self.skipped }

    /// Handle one flush request and signal `ready` exactly once.
    ///
    /// `ready` fires after submission, also when the request fails.
    pub async fn on_flush_request<R: FlushReady>(
        &mut self,
        area: &Rectangle,
        colors: &'static [u8],
        ready: &mut R,
    ) -> Result<(), FlushError> {
        // SAFETY: a `'static` shared slice is never written or freed
        unsafe { self.on_flush_request_unchecked(area, colors, ready) }.await
    }

    /// [`on_flush_request`](Self::on_flush_request) from a draw buffer the
    /// caller renders into again later.
    ///
    /// # Safety
    /// `colors` must stay allocated and unwritten until the next flush
    /// request or [`wait_idle`](Self::wait_idle) on this adapter has
    /// returned.
    pub async unsafe fn on_flush_request_unchecked<R: FlushReady>(
        &mut self,
        area: &Rectangle,
        colors: &[u8],
        ready: &mut R,
    ) -> Result<(), FlushError> {
        let result = if self.gate.is_enabled() {
            // SAFETY: forwarded to the caller
            unsafe { self.forward(area, colors) }.await
        } else {
            self.scheduler.wait_idle(&mut self.engine).await;
            self.skipped = self.skipped.wrapping_add(1);
            Ok(())
        };

        if let Err(FlushError::Geometry(err)) = &result {
            error!("Flush rejected: {}", err);
        }

        ready.flush_ready();
        result
    }

    /// Drain everything still in flight.
    pub async fn wait_idle(&mut self) -> DrainOutcome { self.scheduler.wait_idle(&mut self.engine).await }

    /// # Safety
    /// As for [`on_flush_request_unchecked`](Self::on_flush_request_unchecked).
    async unsafe fn forward(
        &mut self,
        area: &Rectangle,
        colors: &[u8],
    ) -> Result<(), FlushError> {
        let window = AddressWindow::from_area(area, self.driver.hor_res, self.driver.ver_res)?;
        // SAFETY: forwarded to the caller
        let report = unsafe { self.scheduler.flush_unchecked(&mut self.engine, &window, colors) }.await?;
        self.last_report = Some(report);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
