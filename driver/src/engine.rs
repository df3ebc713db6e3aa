//! Asynchronous transfer engines.
//!
//! The scheduler hands descriptors to a [`TransferEngine`] and later collects
//! one completion per descriptor, in submission order. Two engines are
//! provided:
//!
//! - [`ChannelEngine`] + [`TransferWorker`]: descriptors travel through a
//!   bounded channel to a worker task that owns the bus and sends results
//!   back through a second channel. This is the firmware setup.
//! - [`ImmediateEngine`]: executes each descriptor while it is queued and
//!   buffers the result, for blocking buses and the host simulator.
//!
//! # Channel sizing
//!
//! The results channel must hold every completion of one flush
//! ([`MAX_DESCRIPTORS`](crate::config::MAX_DESCRIPTORS)). Results are only
//! drained at the start of the *next* flush, so a smaller channel would stall
//! the worker while the scheduler is still waiting for queue space.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Deque;

use crate::command::CommandBus;
use crate::error::BusFault;
use crate::pool::{Descriptor, Payload, SlotKind};

/// Outcome of one executed descriptor.
pub type Completion = Result<(), BusFault>;

/// Queue of transactions with in-order completion reporting.
#[allow(async_fn_in_trait)]
pub trait TransferEngine {
    /// Submit one descriptor. Waits while the queue is full.
    async fn queue(
        &mut self,
        descriptor: Descriptor,
    ) -> Result<(), BusFault>;

    /// Wait for the oldest outstanding descriptor to finish.
    async fn next_completion(&mut self) -> Completion;
}

impl<E: TransferEngine> TransferEngine for &mut E {
    async fn queue(
        &mut self,
        descriptor: Descriptor,
    ) -> Result<(), BusFault> {
        (**self).queue(descriptor).await
    }

    async fn next_completion(&mut self) -> Completion { (**self).next_completion().await }
}

/// Put one descriptor on the bus with the D/C level its kind requires.
pub async fn execute<B: CommandBus>(
    bus: &mut B,
    descriptor: &Descriptor,
) -> Completion {
    let bytes = match &descriptor.payload {
        Payload::Inline { .. } => descriptor.payload.inline_bytes(),
        // SAFETY: pixel spans are only built by `Descriptor::bulk` (a
        // `'static` slice) or `bulk_unchecked`, whose caller keeps the buffer
        // unwritten until this descriptor has been executed.
        Payload::Pixels(span) => unsafe { span.as_slice() },
    };
    match descriptor.kind {
        SlotKind::Command => match bytes.first() {
            Some(&cmd) => bus.write_command(cmd).await,
            None => Ok(()),
        },
        SlotKind::ShortData | SlotKind::BulkData => {
            if bytes.is_empty() {
                return Ok(());
            }
            bus.write_data(bytes).await
        }
    }
}

// =============================================================================
// Immediate Engine
// =============================================================================

/// Engine that runs each descriptor on `bus` while it is queued.
///
/// Up to `N` results are kept until collected; queueing more than that
/// without collecting is rejected.
pub struct ImmediateEngine<B, const N: usize> {
    bus: B,
    results: Deque<Completion, N>,
}

impl<B: CommandBus, const N: usize> ImmediateEngine<B, N> {
    /// Wrap a bus.
    pub const fn new(bus: B) -> Self {
        Self {
            bus,
            results: Deque::new(),
        }
    }

    /// Results not yet collected.
    #[inline]
    pub fn outstanding(&self) -> usize { self.results.len() }

    /// Borrow the bus.
    #[inline]
    pub fn bus(&self) -> &B { &self.bus }

    /// Borrow the bus mutably.
    #[inline]
    pub fn bus_mut(&mut self) -> &mut B { &mut self.bus }

    /// Give the bus back.
    pub fn release(self) -> B { self.bus }
}

impl<B: CommandBus, const N: usize> TransferEngine for ImmediateEngine<B, N> {
    async fn queue(
        &mut self,
        descriptor: Descriptor,
    ) -> Result<(), BusFault> {
        if self.results.is_full() {
            return Err(BusFault::QueueRejected);
        }
        let result = execute(&mut self.bus, &descriptor).await;
        self.results.push_back(result).map_err(|_| BusFault::QueueRejected)
    }

    async fn next_completion(&mut self) -> Completion { self.results.pop_front().unwrap_or(Err(BusFault::NothingInFlight)) }
}

// =============================================================================
// Channel Engine
// =============================================================================

/// The two channels shared by a [`ChannelEngine`] and its [`TransferWorker`].
pub struct TransferChannels<M: RawMutex, const Q: usize, const R: usize> {
    queue: Channel<M, Descriptor, Q>,
    results: Channel<M, Completion, R>,
}

impl<M: RawMutex, const Q: usize, const R: usize> TransferChannels<M, Q, R> {
    /// Create empty channels (usable in a `static`).
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            results: Channel::new(),
        }
    }

    /// Scheduler side.
    pub fn engine(&self) -> ChannelEngine<'_, M, Q, R> {
        ChannelEngine {
            queue: self.queue.sender(),
            results: self.results.receiver(),
        }
    }

    /// Bus side.
    pub fn worker<B: CommandBus>(
        &self,
        bus: B,
    ) -> TransferWorker<'_, M, B, Q, R> {
        TransferWorker {
            bus,
            queue: self.queue.receiver(),
            results: self.results.sender(),
            executed: 0,
            failed: 0,
        }
    }
}

impl<M: RawMutex, const Q: usize, const R: usize> Default for TransferChannels<M, Q, R> {
    fn default() -> Self { Self::new() }
}

/// Scheduler-side handle: sends descriptors, receives completions.
pub struct ChannelEngine<'a, M: RawMutex, const Q: usize, const R: usize> {
    queue: Sender<'a, M, Descriptor, Q>,
    results: Receiver<'a, M, Completion, R>,
}

impl<M: RawMutex, const Q: usize, const R: usize> TransferEngine for ChannelEngine<'_, M, Q, R> {
    async fn queue(
        &mut self,
        descriptor: Descriptor,
    ) -> Result<(), BusFault> {
        self.queue.send(descriptor).await;
        Ok(())
    }

    async fn next_completion(&mut self) -> Completion { self.results.receive().await }
}

/// Bus-side worker: executes queued descriptors in order and reports results.
pub struct TransferWorker<'a, M: RawMutex, B, const Q: usize, const R: usize> {
    bus: B,
    queue: Receiver<'a, M, Descriptor, Q>,
    results: Sender<'a, M, Completion, R>,
    executed: u32,
    failed: u32,
}

impl<M: RawMutex, B: CommandBus, const Q: usize, const R: usize> TransferWorker<'_, M, B, Q, R> {
    /// Execute the next queued descriptor, waiting for one if the queue is empty.
    pub async fn process_next(&mut self) {
        let descriptor = self.queue.receive().await;
        let result = execute(&mut self.bus, &descriptor).await;
        self.executed = self.executed.wrapping_add(1);
        if let Err(fault) = result {
            self.failed = self.failed.wrapping_add(1);
            trace!("Transfer {} failed: {}", self.executed, fault);
        }
        self.results.send(result).await;
    }

    /// Execute a descriptor only if one is already queued.
    pub async fn try_process(&mut self) -> bool {
        let Ok(descriptor) = self.queue.try_receive() else {
            return false;
        };
        let result = execute(&mut self.bus, &descriptor).await;
        self.executed = self.executed.wrapping_add(1);
        if result.is_err() {
            self.failed = self.failed.wrapping_add(1);
        }
        self.results.send(result).await;
        true
    }

    /// Serve the queue forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.process_next().await;
        }
    }

    /// Descriptors executed so far.
    #[inline]
    pub const fn executed(&self) -> u32 { self.executed }

    /// Descriptors that reported a bus fault.
    #[inline]
    pub const fn failed(&self) -> u32 { self.failed }

    /// Borrow the bus.
    #[inline]
    pub fn bus(&self) -> &B { &self.bus }
}

// =============================================================================
// Tests
// =============================================================================
