//! Frame transfer scheduler.
//!
//! A flush request is a window plus a pixel buffer. The scheduler cuts the
//! window's rows into chunks whose pixel payload stays under the transfer
//! ceiling, fills one descriptor group per chunk and queues the groups on a
//! [`TransferEngine`] in chunk order.
//!
//! ```text
//!        window (biased)                  descriptor pool
//!   y1 ┌──────────────────┐ ─┐
//!      │     chunk 0      │  │ chunk_rows     group 0: CASET RASET RAMWR px
//!      ├──────────────────┤ ─┘
//!      │     chunk 1      │                 group 1: CASET RASET RAMWR px
//!      ├──────────────────┤
//!   y2 │ chunk 2 (rest)   │                 group 2: ...
//!      └──────────────────┘
//! ```
//!
//! `flush` returns once everything is queued. The bus may still be reading
//! the pixel buffer at that point; the next `flush` (or [`FrameScheduler::wait_idle`])
//! drains those transfers before any slot is touched again.

use core::ops::Range;

use crate::config::{BYTES_PER_PIXEL, GROUP_LEN, MAX_CHUNKS, PanelConfig};
use crate::engine::TransferEngine;
use crate::error::{BusFault, FlushError, GeometryError};
use crate::pool::{DescriptorPool, PoolState};
use crate::reconciler::{DrainOutcome, Reconciler};
use crate::window::AddressWindow;

// =============================================================================
// Chunk Plan
// =============================================================================

/// Rows `[row_start, row_end]` of a flush and the bytes that carry them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Chunk {
    /// Position in the flush, also the pool group it uses
    pub index: usize,
    pub row_start: u16,
    pub row_end: u16,
    /// Offset of the first row in the pixel buffer
    pub byte_offset: usize,
    /// Actual rows of this chunk times the row width in bytes
    pub byte_len: usize,
}

impl Chunk {
    /// Rows covered.
    #[inline]
    pub const fn rows(&self) -> usize { (self.row_end - self.row_start) as usize + 1 }

    /// Slice of the pixel buffer this chunk sends.
    #[inline]
    pub const fn byte_range(&self) -> Range<usize> { self.byte_offset..self.byte_offset + self.byte_len }
}

/// How a window splits into chunks under a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChunkPlan {
    window: AddressWindow,
    row_bytes: usize,
    chunk_rows: usize,
    chunk_count: usize,
}

impl ChunkPlan {
    /// Plan `window` for a bus that moves at most `ceiling` bytes at once.
    ///
    /// Fails when a single row is over the ceiling, when more than
    /// `capacity` chunks would be needed, or when `pixels_len` bytes do not
    /// cover the window.
    pub fn new(
        window: AddressWindow,
        ceiling: usize,
        capacity: usize,
        pixels_len: usize,
    ) -> Result<Self, GeometryError> {
        let row_bytes = window.width() * BYTES_PER_PIXEL;
        let chunk_rows = ceiling / row_bytes;
        if chunk_rows == 0 {
            return Err(GeometryError::RowExceedsCeiling { row_bytes, ceiling });
        }

        let rows = window.height();
        let chunk_count = rows.div_ceil(chunk_rows);
        if chunk_count > capacity {
            return Err(GeometryError::TooManyChunks {
                needed: chunk_count,
                capacity,
            });
        }

        let expected = rows * row_bytes;
        if pixels_len < expected {
            return Err(GeometryError::BufferTooShort {
                expected,
                actual: pixels_len,
            });
        }

        Ok(Self {
            window,
            row_bytes,
            chunk_rows,
            chunk_count,
        })
    }

    #[inline]
    pub const fn window(&self) -> &AddressWindow { &self.window }

    #[inline]
    pub const fn row_bytes(&self) -> usize { self.row_bytes }

    /// Rows in every chunk but possibly the last.
    #[inline]
    pub const fn chunk_rows(&self) -> usize { self.chunk_rows }

    #[inline]
    pub const fn chunk_count(&self) -> usize { self.chunk_count }

    /// Pixel bytes the whole flush sends.
    #[inline]
    pub const fn byte_len(&self) -> usize { self.window.height() * self.row_bytes }

    /// Chunk `index`, with the remainder rows if it is the last one.
    pub fn chunk(
        &self,
        index: usize,
    ) -> Option<Chunk> {
        if index >= self.chunk_count {
            return None;
        }
        let first = index * self.chunk_rows;
        let rows = self.chunk_rows.min(self.window.height() - first);
        let row_start = self.window.y1 as usize + first;
        Some(Chunk {
            index,
            row_start: row_start as u16,
            row_end: (row_start + rows - 1) as u16,
            byte_offset: first * self.row_bytes,
            byte_len: rows * self.row_bytes,
        })
    }

    /// Chunks in ascending row order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ { (0..self.chunk_count).filter_map(|index| self.chunk(index)) }
}

// =============================================================================
// Scheduler
// =============================================================================

/// What one flush call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlushReport {
    /// Generation number of this flush
    pub generation: u32,
    /// Chunks the window was split into
    pub chunks: usize,
    /// Descriptors queued
    pub queued: usize,
    /// Completions of the previous flush collected first
    pub drained: usize,
    /// How many of those reported a bus fault
    pub failed: usize,
}

/// Per-panel scheduler owning the descriptor pool and the reconciler.
pub struct FrameScheduler<const CHUNKS: usize = MAX_CHUNKS> {
    config: PanelConfig,
    pool: DescriptorPool<CHUNKS>,
    reconciler: Reconciler,
    generation: u32,
}

impl<const CHUNKS: usize> FrameScheduler<CHUNKS> {
    pub const fn new(config: PanelConfig) -> Self {
        Self {
            config,
            pool: DescriptorPool::new(),
            reconciler: Reconciler::new(),
            generation: 0,
        }
    }

    #[inline]
    pub const fn config(&self) -> &PanelConfig { &self.config }

    /// Generation of the most recent flush, 0 before the first one.
    #[inline]
    pub const fn generation(&self) -> u32 { self.generation }

    #[inline]
    pub const fn pool_state(&self) -> PoolState { self.pool.state() }

    #[inline]
    pub const fn reconciler(&self) -> &Reconciler { &self.reconciler }

    /// Bias `window` for the configured orientation and plan its chunks.
    pub fn plan(
        &self,
        window: &AddressWindow,
        pixels_len: usize,
    ) -> Result<ChunkPlan, GeometryError> {
        let biased = window.biased(self.config.orientation)?;
        ChunkPlan::new(biased, self.config.ceiling, CHUNKS, pixels_len)
    }

    /// Queue `window` for transfer from `pixels`.
    ///
    /// Geometry problems are reported before anything is drained or
    /// queued. A queue failure drops the rest of the frame; the descriptors
    /// already queued are still reconciled by the next call.
    pub async fn flush<E: TransferEngine>(
        &mut self,
        engine: &mut E,
        window: &AddressWindow,
        pixels: &'static [u8],
    ) -> Result<FlushReport, FlushError> {
        // SAFETY: a `'static` shared slice is never written or freed
        unsafe { self.flush_unchecked(engine, window, pixels) }.await
    }

    /// [`flush`](Self::flush) from a buffer the caller reuses.
    ///
    /// # Safety
    /// `pixels` must stay allocated and unwritten until the transfers queued
    /// here have been reconciled, i.e. until the next `flush_unchecked`,
    /// [`flush`](Self::flush) or [`wait_idle`](Self::wait_idle) on this
    /// scheduler has returned.
    pub async unsafe fn flush_unchecked<E: TransferEngine>(
        &mut self,
        engine: &mut E,
        window: &AddressWindow,
        pixels: &[u8],
    ) -> Result<FlushReport, FlushError> {
        let plan = self.plan(window, pixels.len())?;

        let drained = self.wait_idle(engine).await;

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        for chunk in plan.chunks() {
            // SAFETY: forwarded to the caller; `wait_idle` releases the pool
            unsafe { self.pool.populate(&chunk, plan.window(), pixels) };
        }

        let (queued, fault) = self.submit(engine, plan.chunk_count()).await;
        self.pool.mark_in_flight(queued.div_ceil(GROUP_LEN));
        self.reconciler.record_submitted(generation, queued);

        if let Some(fault) = fault {
            warn!("Flush {}: queue failed after {} descriptors: {}", generation, queued, fault);
            return Err(FlushError::Submission { queued, fault });
        }

        trace!(
            "Flush {}: {} rows in {} chunks of {} rows",
            generation,
            plan.window().height(),
            plan.chunk_count(),
            plan.chunk_rows()
        );

        Ok(FlushReport {
            generation,
            chunks: plan.chunk_count(),
            queued,
            drained: drained.waited,
            failed: drained.failed,
        })
    }

    /// Wait for every outstanding transfer and reset the pool.
    pub async fn wait_idle<E: TransferEngine>(
        &mut self,
        engine: &mut E,
    ) -> DrainOutcome {
        let outcome = self.reconciler.drain(engine).await;
        self.pool.release();
        outcome
    }

    /// Queue the first `groups` groups slot by slot. Stops at the first failure.
    async fn submit<E: TransferEngine>(
        &self,
        engine: &mut E,
        groups: usize,
    ) -> (usize, Option<BusFault>) {
        let mut queued = 0;
        for index in 0..groups {
            let Some(group) = self.pool.group(index) else {
                break;
            };
            for descriptor in group {
                if let Err(fault) = engine.queue(*descriptor).await {
                    return (queued, Some(fault));
                }
                queued += 1;
            }
        }
        (queued, None)
    }
}

impl Default for FrameScheduler<MAX_CHUNKS> {
    fn default() -> Self { Self::new(PanelConfig::default()) }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::command::{CASET, RAMWR, RASET};
    use crate::mock::MockEngine;
    use crate::pool::SlotKind;
    use crate::window::Orientation;

    fn leak(len: usize) -> &'static [u8] {
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        Box::leak(bytes.into_boxed_slice())
    }

    fn window(
        x1: u16,
        x2: u16,
        y1: u16,
        y2: u16,
    ) -> AddressWindow {
        AddressWindow::new(x1, x2, y1, y2).unwrap()
    }

    /// Ceiling that gives 40-row chunks on a 240-wide window.
    const CEILING_40_ROWS: usize = 240 * 2 * 40;

    #[test]
    fn test_plan_240x100_example() {
        let plan = ChunkPlan::new(window(0, 239, 0, 99), CEILING_40_ROWS, 6, 240 * 100 * 2).unwrap();

        assert_eq!(plan.chunk_rows(), 40);
        assert_eq!(plan.chunk_count(), 3);

        let spans: Vec<(u16, u16)> = plan.chunks().map(|c| (c.row_start, c.row_end)).collect();
        assert_eq!(spans, [(0, 39), (40, 79), (80, 99)]);

        let last = plan.chunk(2).unwrap();
        assert_eq!(last.rows(), 20);
        assert_eq!(last.byte_len, 20 * 480);
        assert_eq!(last.byte_offset, 80 * 480);
        assert_eq!(plan.chunk(3), None);
    }

    #[test]
    fn test_plan_partitions_rows_exactly() {
        for width in [1u16, 7, 120, 240, 280] {
            for height in [1u16, 2, 39, 40, 41, 100, 280] {
                for ceiling in [2 * 280, 19_200, 28_800, 100_000] {
                    let win = window(0, width - 1, 10, 10 + height - 1);
                    let row_bytes = usize::from(width) * 2;
                    let Ok(plan) = ChunkPlan::new(win, ceiling, usize::MAX, usize::MAX) else {
                        assert!(row_bytes > ceiling);
                        continue;
                    };
                    let chunks: Vec<Chunk> = plan.chunks().collect();

                    // Contiguous, ascending, no overlap
                    assert_eq!(chunks[0].row_start, 10);
                    assert_eq!(chunks.last().unwrap().row_end, win.y2);
                    for pair in chunks.windows(2) {
                        assert_eq!(pair[1].row_start, pair[0].row_end + 1);
                        assert_eq!(pair[1].byte_offset, pair[0].byte_offset + pair[0].byte_len);
                    }

                    let total: usize = chunks.iter().map(Chunk::rows).sum();
                    assert_eq!(total, usize::from(height));

                    let rows = usize::from(height);
                    let remainder = rows % plan.chunk_rows();
                    let expected_last = if remainder == 0 { plan.chunk_rows().min(rows) } else { remainder };
                    assert_eq!(chunks.last().unwrap().rows(), expected_last);

                    for chunk in &chunks {
                        assert_eq!(chunk.byte_len, chunk.rows() * row_bytes);
                        assert!(chunk.byte_len <= ceiling);
                    }
                }
            }
        }
    }

    #[test]
    fn test_plan_rejects_row_over_ceiling() {
        let result = ChunkPlan::new(window(0, 239, 0, 0), 479, 6, 480);
        assert_eq!(
            result,
            Err(GeometryError::RowExceedsCeiling {
                row_bytes: 480,
                ceiling: 479,
            })
        );
    }

    #[test]
    fn test_plan_rejects_too_many_chunks() {
        let result = ChunkPlan::new(window(0, 239, 0, 279), CEILING_40_ROWS, 6, 240 * 280 * 2);
        assert_eq!(result, Err(GeometryError::TooManyChunks { needed: 7, capacity: 6 }));
    }

    #[test]
    fn test_plan_rejects_short_buffer() {
        let result = ChunkPlan::new(window(0, 9, 0, 9), CEILING_40_ROWS, 6, 199);
        assert_eq!(
            result,
            Err(GeometryError::BufferTooShort {
                expected: 200,
                actual: 199,
            })
        );
    }

    #[test]
    fn test_full_screen_fits_pool_in_every_orientation() {
        for orientation in Orientation::ALL {
            let config = PanelConfig::new(orientation);
            let (hor_res, ver_res) = config.resolution();
            let scheduler: FrameScheduler = FrameScheduler::new(config);
            let full = window(0, hor_res - 1, 0, ver_res - 1);
            let plan = scheduler.plan(&full, full.pixel_count() * 2).unwrap();
            assert!(plan.chunk_count() <= MAX_CHUNKS);
        }
    }

    #[test]
    fn test_flush_queues_groups_in_order() {
        let mut engine = MockEngine::new();
        let config = PanelConfig::new(Orientation::Normal).with_ceiling(CEILING_40_ROWS);
        let mut scheduler: FrameScheduler = FrameScheduler::new(config);
        let pixels = leak(240 * 100 * 2);

        let report = block_on(scheduler.flush(&mut engine, &window(0, 239, 0, 99), pixels)).unwrap();

        assert_eq!(
            report,
            FlushReport {
                generation: 1,
                chunks: 3,
                queued: 18,
                drained: 0,
                failed: 0,
            }
        );
        assert_eq!(engine.commands(), [CASET, RASET, RAMWR].repeat(3));
        assert_eq!(engine.bulk_lengths(), [19_200, 19_200, 9_600]);

        // Rows carry the +20 bias; columns stay put
        assert_eq!(engine.queued[1].payload.inline_bytes(), &[0, 0, 0, 239]);
        assert_eq!(engine.queued[3].payload.inline_bytes(), &[0, 20, 0, 59]);
        assert_eq!(engine.queued[9].payload.inline_bytes(), &[0, 60, 0, 99]);
        assert_eq!(engine.queued[15].payload.inline_bytes(), &[0, 100, 0, 119]);

        // Pixel spans tile the buffer
        assert_eq!(engine.queued[17].kind, SlotKind::BulkData);
        let span = engine.queued[17].payload.pixels().unwrap();
        assert_eq!(span.as_ptr(), pixels[38_400..].as_ptr());
        assert_eq!(span.len(), 9_600);
        assert_eq!(scheduler.pool_state(), PoolState::InFlight { groups: 3 });
    }

    #[test]
    fn test_flush_biases_columns_when_rotated() {
        let mut engine = MockEngine::new();
        let mut scheduler: FrameScheduler = FrameScheduler::new(PanelConfig::new(Orientation::Rotated));

        block_on(scheduler.flush(&mut engine, &window(0, 279, 0, 0), leak(560))).unwrap();

        assert_eq!(engine.queued[1].payload.inline_bytes(), &[0, 20, 1, 43]);
        assert_eq!(engine.queued[3].payload.inline_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_first_flush_skips_drain_second_drains_exactly() {
        // MockEngine panics if the first flush waits on anything
        let mut engine = MockEngine::new();
        let config = PanelConfig::default().with_ceiling(CEILING_40_ROWS);
        let mut scheduler: FrameScheduler = FrameScheduler::new(config);

        let first = block_on(scheduler.flush(&mut engine, &window(0, 239, 0, 99), leak(48_000))).unwrap();
        assert_eq!(first.drained, 0);
        assert_eq!(engine.collected, 0);

        let second = block_on(scheduler.flush(&mut engine, &window(0, 239, 0, 39), leak(19_200))).unwrap();
        assert_eq!(second.generation, 2);
        assert_eq!(second.drained, 18);
        assert_eq!(engine.collected, 18);
        assert_eq!(engine.outstanding(), 6);

        let idle = block_on(scheduler.wait_idle(&mut engine));
        assert_eq!(idle.waited, 6);
        assert_eq!(scheduler.pool_state(), PoolState::Free);
    }

    #[test]
    fn test_borrowed_buffer_is_free_after_wait_idle() {
        let mut engine = MockEngine::new();
        let mut scheduler: FrameScheduler = FrameScheduler::default();
        let mut pixels = vec![0x5A; 200];

        let win = window(0, 9, 0, 9);
        // SAFETY: `pixels` is not touched until `wait_idle` below
        block_on(unsafe { scheduler.flush_unchecked(&mut engine, &win, &pixels) }).unwrap();
        assert_eq!(scheduler.pool_state(), PoolState::InFlight { groups: 1 });

        block_on(scheduler.wait_idle(&mut engine));
        pixels[0] = 0;
        pixels.clear();
        assert_eq!(scheduler.pool_state(), PoolState::Free);
        assert_eq!(engine.outstanding(), 0);
    }

    #[test]
    fn test_geometry_error_has_no_side_effects() {
        let mut engine = MockEngine::new();
        let mut scheduler: FrameScheduler = FrameScheduler::default();
        block_on(scheduler.flush(&mut engine, &window(0, 9, 0, 9), leak(200))).unwrap();

        let result = block_on(scheduler.flush(&mut engine, &window(0, 9, 0, 9), leak(10)));

        assert!(matches!(result, Err(FlushError::Geometry(GeometryError::BufferTooShort { .. }))));
        assert_eq!(scheduler.generation(), 1);
        assert_eq!(engine.collected, 0);
        assert_eq!(engine.queued.len(), 6);
    }

    #[test]
    fn test_queue_failure_records_only_what_was_queued() {
        let mut engine = MockEngine::new();
        engine.reject_after = Some(8);
        let config = PanelConfig::default().with_ceiling(CEILING_40_ROWS);
        let mut scheduler: FrameScheduler = FrameScheduler::new(config);

        let result = block_on(scheduler.flush(&mut engine, &window(0, 239, 0, 99), leak(48_000)));

        assert_eq!(
            result,
            Err(FlushError::Submission {
                queued: 8,
                fault: BusFault::QueueRejected,
            })
        );
        assert_eq!(scheduler.reconciler().outstanding(), 8);
        assert_eq!(scheduler.pool_state(), PoolState::InFlight { groups: 2 });

        engine.reject_after = None;
        let report = block_on(scheduler.flush(&mut engine, &window(0, 9, 0, 0), leak(20))).unwrap();
        assert_eq!(report.drained, 8);
    }

    #[test]
    fn test_bus_faults_surface_in_next_report() {
        let mut engine = MockEngine::new();
        engine.fail_at = vec![5];
        let mut scheduler: FrameScheduler = FrameScheduler::default();

        block_on(scheduler.flush(&mut engine, &window(0, 9, 0, 9), leak(200))).unwrap();
        let report = block_on(scheduler.flush(&mut engine, &window(0, 9, 0, 9), leak(200))).unwrap();

        assert_eq!(report.drained, 6);
        assert_eq!(report.failed, 1);
    }
}
