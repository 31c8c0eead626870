//! Suspend/wake coordination around the RTC alarm line.
//!
//! The alarm output is open-drain and active-low, so the wake pin needs
//! a pull-up and a wake-on-low trigger. The quiesce order before
//! suspending is fixed: stale wake sources off, alarm line armed, radio
//! stopped, then suspend. The trigger is level-sensitive, so an alarm
//! firing anywhere in that window still wakes the node.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::Timer;
use embedded_hal::i2c::I2c;
use log::{debug, info};

use crate::error::{Error, Result};
use crate::rtc::Ds3231;
use crate::schedule::{AlarmBoundary, arm_or_fallback};

const ALARM_SETTLE_MS: u64 = 5;

/// Why the node came out of suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// The RTC pulled the alarm line low.
    AlarmLine,
    /// Cold boot or power restored.
    PowerOn,
    /// Any other wake source (reset button, brown-out recovery).
    Other,
}

/// Platform suspend hooks. `suspend` parks the CPU and resolves when a
/// wake source fires.
#[allow(async_fn_in_trait)]
pub trait SleepControl {
    type Error: core::fmt::Debug;

    fn stop_radio(&mut self) -> core::result::Result<(), Self::Error>;

    fn disable_wake_sources(&mut self) -> core::result::Result<(), Self::Error>;

    /// Enable wake-on-low for the alarm pin, pull-up engaged.
    fn arm_wake_on_alarm_line(&mut self) -> core::result::Result<(), Self::Error>;

    async fn suspend(&mut self) -> core::result::Result<WakeCause, Self::Error>;
}

/// Drives the enter-sleep and exit-sleep sequences.
pub struct WakeCoordinator<C: SleepControl> {
    control: C,
}

impl<C: SleepControl> WakeCoordinator<C> {
    pub fn new(control: C) -> Self {
        Self { control }
    }

    /// Quiesce and suspend. Any hook failure aborts the sequence and the
    /// node stays awake; sleeping without a wake path is unrecoverable.
    pub async fn sleep_until_wake(&mut self) -> Result<WakeCause> {
        self.control
            .disable_wake_sources()
            .map_err(|_| Error::Sleep)?;
        self.control
            .arm_wake_on_alarm_line()
            .map_err(|_| Error::Sleep)?;
        self.control.stop_radio().map_err(|err| {
            debug!("radio stop failed: {:?}", err);
            Error::Sleep
        })?;
        let cause = self.control.suspend().await.map_err(|_| Error::Sleep)?;
        info!("woke from suspend: {:?}", cause);
        Ok(cause)
    }

    /// First thing after an alarm-line wake: release the interrupt line
    /// and schedule the next boundary, before the radio or sensors are
    /// touched. A crash later in the cycle then still leaves a wake
    /// armed.
    pub async fn resume_from_alarm<I2C: I2c>(
        &mut self,
        rtc: &mut Ds3231<I2C>,
        interval_minutes: u8,
    ) -> Result<AlarmBoundary> {
        rtc.clear_alarm_flag()?;
        Timer::after_millis(ALARM_SETTLE_MS).await;
        arm_or_fallback(rtc, interval_minutes)
    }
}

/// One-bit handoff from the alarm ISR to the main loop. The ISR only
/// stores; all RTC bus traffic happens in task context.
pub struct AlarmLatch(AtomicBool);

impl AlarmLatch {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// ISR side: record that the line fired.
    pub fn set_from_isr(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Main-loop side: consume the pending flag, if any.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for AlarmLatch {
    fn default() -> Self {
        Self::new()
    }
}
