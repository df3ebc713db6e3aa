//! Test doubles for the bus, engine, pins and delay.

use std::collections::VecDeque;

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use embedded_hal_async::delay::DelayNs;

use crate::command::CommandBus;
use crate::engine::{Completion, TransferEngine};
use crate::error::BusFault;
use crate::pool::{Descriptor, SlotKind};

// =============================================================================
// Bus
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Command(u8),
    Data(Vec<u8>),
}

/// Records every write. After `fail_after` successful writes, every further
/// write fails with [`BusFault::Spi`] and is not recorded.
#[derive(Debug, Default)]
pub struct MockBus {
    pub events: Vec<BusEvent>,
    pub fail_after: Option<usize>,
}

impl MockBus {
    pub fn new() -> Self { Self::default() }

    pub fn commands(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                BusEvent::Command(cmd) => Some(*cmd),
                BusEvent::Data(_) => None,
            })
            .collect()
    }

    fn check(&self) -> Result<(), BusFault> {
        match self.fail_after {
            Some(limit) if self.events.len() >= limit => Err(BusFault::Spi),
            _ => Ok(()),
        }
    }
}

impl CommandBus for MockBus {
    async fn write_command(
        &mut self,
        cmd: u8,
    ) -> Result<(), BusFault> {
        self.check()?;
        self.events.push(BusEvent::Command(cmd));
        Ok(())
    }

    async fn write_data(
        &mut self,
        data: &[u8],
    ) -> Result<(), BusFault> {
        self.check()?;
        self.events.push(BusEvent::Data(data.to_vec()));
        Ok(())
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Engine that completes nothing on its own.
///
/// Every queued descriptor is recorded and becomes one outstanding
/// completion. Descriptors whose running index is listed in `fail_at`
/// complete with [`BusFault::Spi`]; once `reject_after` descriptors were
/// accepted the queue refuses more. Waiting with nothing outstanding panics,
/// so a test fails if the scheduler waits for a flush that never happened.
#[derive(Debug, Default)]
pub struct MockEngine {
    pub queued: Vec<Descriptor>,
    pub fail_at: Vec<usize>,
    pub reject_after: Option<usize>,
    pub collected: usize,
    outstanding: VecDeque<Completion>,
}

impl MockEngine {
    pub fn new() -> Self { Self::default() }

    pub fn outstanding(&self) -> usize { self.outstanding.len() }

    pub fn commands(&self) -> Vec<u8> { self.queued.iter().filter_map(Descriptor::command_byte).collect() }

    pub fn bulk_lengths(&self) -> Vec<usize> {
        self.queued
            .iter()
            .filter(|d| d.kind == SlotKind::BulkData)
            .map(|d| d.payload.len())
            .collect()
    }
}

impl TransferEngine for MockEngine {
    async fn queue(
        &mut self,
        descriptor: Descriptor,
    ) -> Result<(), BusFault> {
        if self.reject_after.is_some_and(|limit| self.queued.len() >= limit) {
            return Err(BusFault::QueueRejected);
        }
        let result = if self.fail_at.contains(&self.queued.len()) {
            Err(BusFault::Spi)
        } else {
            Ok(())
        };
        self.queued.push(descriptor);
        self.outstanding.push_back(result);
        Ok(())
    }

    async fn next_completion(&mut self) -> Completion {
        let Some(result) = self.outstanding.pop_front() else {
            panic!("waited for a completion with nothing in flight");
        };
        self.collected += 1;
        result
    }
}

// =============================================================================
// Pins and Delay
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockHalError;

impl digital::Error for MockHalError {
    fn kind(&self) -> digital::ErrorKind { digital::ErrorKind::Other }
}

impl pwm::Error for MockHalError {
    fn kind(&self) -> pwm::ErrorKind { pwm::ErrorKind::Other }
}

/// Output pin recording every level it was driven to.
#[derive(Debug, Default)]
pub struct MockPin {
    pub levels: Vec<bool>,
    pub broken: bool,
}

impl digital::ErrorType for MockPin {
    type Error = MockHalError;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(MockHalError);
        }
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(MockHalError);
        }
        self.levels.push(true);
        Ok(())
    }
}

/// PWM channel with a 10-bit-like scale that records each duty written.
#[derive(Debug)]
pub struct MockPwm {
    pub max: u16,
    pub duties: Vec<u16>,
    pub broken: bool,
}

impl Default for MockPwm {
    fn default() -> Self {
        Self {
            max: 1023,
            duties: Vec::new(),
            broken: false,
        }
    }
}

impl pwm::ErrorType for MockPwm {
    type Error = MockHalError;
}

impl SetDutyCycle for MockPwm {
    fn max_duty_cycle(&self) -> u16 { self.max }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        if self.broken {
            return Err(MockHalError);
        }
        self.duties.push(duty);
        Ok(())
    }
}

/// Delay that returns immediately and adds up what it was asked for.
#[derive(Debug, Default)]
pub struct MockDelay {
    pub total_ms: u32,
    pub calls_ms: Vec<u32>,
}

impl DelayNs for MockDelay {
    async fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.total_ms += ns / 1_000_000;
    }

    async fn delay_us(
        &mut self,
        us: u32,
    ) {
        self.total_ms += us / 1_000;
    }

    async fn delay_ms(
        &mut self,
        ms: u32,
    ) {
        self.total_ms += ms;
        self.calls_ms.push(ms);
    }
}
