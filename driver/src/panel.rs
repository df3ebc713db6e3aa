//! Panel bring-up: reset pulse, init table, orientation and backlight.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use embedded_hal_async::delay::DelayNs;

use crate::command::{self, CommandBus, ST7789V_INIT};
use crate::config::{BACKLIGHT_DEFAULT, BACKLIGHT_MAX, RESET_PULSE_MS};
use crate::error::BringUpError;
use crate::window::Orientation;

// =============================================================================
// Backlight
// =============================================================================

/// Backlight on a PWM channel, driven on a 0..=1000 scale.
pub struct Backlight<P> {
    pwm: P,
    level: u16,
}

impl<P: SetDutyCycle> Backlight<P> {
    pub const fn new(pwm: P) -> Self { Self { pwm, level: 0 } }

    /// Set brightness. Levels above 1000 are clamped.
    pub fn set(
        &mut self,
        level: u16,
    ) -> Result<(), BringUpError> {
        let level = level.min(BACKLIGHT_MAX);
        self.pwm
            .set_duty_cycle_fraction(level, BACKLIGHT_MAX)
            .map_err(|_| BringUpError::Backlight)?;
        self.level = level;
        debug!("Backlight: {}/{}", level, BACKLIGHT_MAX);
        Ok(())
    }

    /// Last level applied.
    #[inline]
    pub const fn level(&self) -> u16 { self.level }
}

// =============================================================================
// Panel
// =============================================================================

/// An ST7789V panel before its bus is handed to the transfer worker.
pub struct Panel<B, RST, BL, D> {
    bus: B,
    reset: RST,
    backlight: Backlight<BL>,
    delay: D,
    orientation: Orientation,
    initialised: bool,
}

impl<B, RST, BL, D> Panel<B, RST, BL, D>
where
    B: CommandBus,
    RST: OutputPin,
    BL: SetDutyCycle,
    D: DelayNs,
{
    pub const fn new(
        bus: B,
        reset: RST,
        backlight: BL,
        delay: D,
        orientation: Orientation,
    ) -> Self {
        Self {
            bus,
            reset,
            backlight: Backlight::new(backlight),
            delay,
            orientation,
            initialised: false,
        }
    }

    #[inline]
    pub const fn orientation(&self) -> Orientation { self.orientation }

    #[inline]
    pub const fn is_initialised(&self) -> bool { self.initialised }

    /// Reset the controller, replay the init table, program the orientation
    /// and switch the backlight on at half brightness.
    pub async fn init(&mut self) -> Result<(), BringUpError> {
        if self.initialised {
            warn!("Panel already initialised, running bring-up again");
        }

        self.hard_reset().await?;

        let sent = command::replay(&mut self.bus, &mut self.delay, ST7789V_INIT).await?;
        debug!("Init table replayed: {} commands", sent);

        command::set_orientation(&mut self.bus, self.orientation).await?;
        self.backlight.set(BACKLIGHT_DEFAULT)?;

        self.initialised = true;
        info!("ST7789V ready ({})", self.orientation.label());
        Ok(())
    }

    /// Reprogram MADCTL.
    pub async fn set_orientation(
        &mut self,
        orientation: Orientation,
    ) -> Result<(), BringUpError> {
        command::set_orientation(&mut self.bus, orientation).await?;
        self.orientation = orientation;
        Ok(())
    }

    pub fn set_backlight(
        &mut self,
        level: u16,
    ) -> Result<(), BringUpError> {
        self.backlight.set(level)
    }

    #[inline]
    pub const fn backlight_level(&self) -> u16 { self.backlight.level() }

    /// Hand the bus to the transfer worker, keeping backlight control.
    pub fn into_parts(self) -> (B, Backlight<BL>) { (self.bus, self.backlight) }

    /// Hand the bus to the transfer worker.
    pub fn into_bus(self) -> B { self.bus }

    async fn hard_reset(&mut self) -> Result<(), BringUpError> {
        self.reset.set_low().map_err(|_| BringUpError::Reset)?;
        self.delay.delay_ms(RESET_PULSE_MS).await;
        self.reset.set_high().map_err(|_| BringUpError::Reset)?;
        self.delay.delay_ms(RESET_PULSE_MS).await;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
