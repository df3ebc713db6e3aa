//! Completion reconciler.
//!
//! Descriptor slots and the pixel buffer they point into belong to the bus
//! until their transfers complete. Before the scheduler repopulates any
//! slot, the reconciler collects exactly as many completions as the previous
//! flush queued. The very first flush has nothing to wait for, which is
//! tracked explicitly rather than with a zero count.

use crate::engine::TransferEngine;

/// A submitted flush awaiting reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlushEpoch {
    /// Generation counter of the flush
    pub generation: u32,
    /// Descriptors queued and not yet collected
    pub descriptors: usize,
}

/// What one drain collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrainOutcome {
    /// Completions collected
    pub waited: usize,
    /// Completions that reported a bus fault
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    epoch: Option<FlushEpoch>,
}

impl Reconciler {
    pub const fn new() -> Self { Self { epoch: None } }

    /// Last recorded flush, `None` before the first one.
    #[inline]
    pub const fn epoch(&self) -> Option<FlushEpoch> { self.epoch }

    /// Completions still owed by the last flush.
    #[inline]
    pub fn outstanding(&self) -> usize { self.epoch.map_or(0, |epoch| epoch.descriptors) }

    /// Remember how many descriptors flush `generation` actually queued.
    pub fn record_submitted(
        &mut self,
        generation: u32,
        descriptors: usize,
    ) {
        self.epoch = Some(FlushEpoch { generation, descriptors });
    }

    /// Collect every completion owed by the last flush.
    ///
    /// Bus faults are logged and counted; they never stop the drain.
    pub async fn drain<E: TransferEngine>(
        &mut self,
        engine: &mut E,
    ) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();
        let Some(epoch) = self.epoch.as_mut() else {
            return outcome;
        };

        while epoch.descriptors > 0 {
            if let Err(fault) = engine.next_completion().await {
                outcome.failed += 1;
                warn!("Flush {}: transfer failed: {}", epoch.generation, fault);
            }
            epoch.descriptors -= 1;
            outcome.waited += 1;
        }

        if outcome.waited > 0 {
            trace!("Flush {}: reconciled {} transfers", epoch.generation, outcome.waited);
        }
        outcome
    }
}

// =============================================================================
// Tests
// =============================================================================
