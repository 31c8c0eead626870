//! Wake-alarm scheduling against clock-aligned boundaries.
//!
//! A node sleeping on an N-minute interval wakes at times where the
//! minute of day is a multiple of N with seconds at zero (14:05:00,
//! 14:10:00, ...), never at "now plus N". The next boundary is always
//! strictly in the future, so a node armed exactly on a boundary sleeps
//! a full interval instead of firing immediately.

use embedded_hal::i2c::I2c;
use log::warn;
use terrasync_api::clamp_wake_interval;

use crate::error::Result;
use crate::rtc::{AlarmMatch, Ds3231, RtcTime};

const MINUTES_PER_DAY: u32 = 24 * 60;
const SECONDS_PER_DAY: u32 = MINUTES_PER_DAY * 60;

/// Widest legitimate gap between arming and the boundary: a 60-minute
/// interval plus the sub-minute carry. Anything further out means the
/// clock moved under us.
const MAX_BOUNDARY_AHEAD_SECS: u32 = 2 * 3600;

/// How the alarm hardware is programmed for a given interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalMode {
    /// Seconds-only match; the hardware recurs every minute on its own.
    EveryMinute,
    /// Exact HH:MM:SS match; must be re-armed after each wake.
    EveryNMinutes(u8),
}

/// A concrete next wake instant and the hardware mode that reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmBoundary {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub mode: IntervalMode,
}

impl AlarmBoundary {
    fn seconds_of_day(&self) -> u32 {
        u32::from(self.hour) * 3600 + u32::from(self.minute) * 60 + u32::from(self.second)
    }

    /// Seconds until this boundary from `now`, counting across midnight.
    pub fn seconds_after(&self, now: &RtcTime) -> u32 {
        (SECONDS_PER_DAY + self.seconds_of_day() - now.seconds_of_day()) % SECONDS_PER_DAY
    }
}

impl core::fmt::Display for AlarmBoundary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Next boundary strictly after `now` for the given interval.
///
/// Out-of-catalog intervals are clamped first, so callers can feed a
/// raw over-the-air value straight in.
pub fn next_boundary(now: RtcTime, interval_minutes: u8) -> AlarmBoundary {
    let interval = clamp_wake_interval(interval_minutes);
    let step = u32::from(interval);

    // Round the current minute of day up to the next multiple of the
    // interval. A partial minute counts as already begun.
    let mut minute_of_day = u32::from(now.hour) * 60 + u32::from(now.minute);
    if now.second != 0 {
        minute_of_day += 1;
    }
    let remainder = minute_of_day % step;
    if remainder != 0 {
        minute_of_day += step - remainder;
    } else if now.second == 0 {
        // Sitting exactly on a boundary: the next one is a full
        // interval away, never "right now".
        minute_of_day += step;
    }
    minute_of_day %= MINUTES_PER_DAY;

    let mode = if interval == 1 {
        IntervalMode::EveryMinute
    } else {
        IntervalMode::EveryNMinutes(interval)
    };
    AlarmBoundary {
        hour: (minute_of_day / 60) as u8,
        minute: (minute_of_day % 60) as u8,
        second: 0,
        mode,
    }
}

/// Program the RTC to fire at the next boundary for `interval_minutes`.
///
/// The clock is re-read after the boundary is computed; if the boundary
/// is no longer strictly ahead (a slow bus or a concurrent time set can
/// do that), it is recomputed from the fresh reading before anything is
/// written to the alarm registers.
pub fn arm<I2C: I2c>(rtc: &mut Ds3231<I2C>, interval_minutes: u8) -> Result<AlarmBoundary> {
    let now = rtc.read_time()?;
    let mut boundary = next_boundary(now, interval_minutes);

    let recheck = rtc.read_time()?;
    let ahead = boundary.seconds_after(&recheck);
    if ahead == 0 || ahead > MAX_BOUNDARY_AHEAD_SECS {
        boundary = next_boundary(recheck, interval_minutes);
    }

    match boundary.mode {
        IntervalMode::EveryMinute => rtc.write_alarm(AlarmMatch::EveryMinute)?,
        IntervalMode::EveryNMinutes(_) => rtc.write_alarm(AlarmMatch::Daily {
            hour: boundary.hour,
            minute: boundary.minute,
            second: boundary.second,
        })?,
    }
    rtc.enable_alarm_interrupt()?;
    rtc.clear_alarm_flag()?;
    Ok(boundary)
}

/// Arm for the requested interval, degrading to the every-minute safety
/// net if the first attempt fails. A node that cannot arm any alarm at
/// all must not be put to sleep.
pub fn arm_or_fallback<I2C: I2c>(
    rtc: &mut Ds3231<I2C>,
    interval_minutes: u8,
) -> Result<AlarmBoundary> {
    match arm(rtc, interval_minutes) {
        Ok(boundary) => Ok(boundary),
        Err(err) => {
            warn!(
                "failed to arm {}-minute alarm ({}), falling back to every-minute",
                interval_minutes, err
            );
            arm(rtc, 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use terrasync_api::ALLOWED_WAKE_INTERVALS;

    use super::*;
    use crate::rtc::MockBus;

    fn at(hour: u8, minute: u8, second: u8) -> RtcTime {
        RtcTime {
            hour,
            minute,
            second,
        }
    }

    #[test]
    fn rounds_up_to_next_multiple() {
        let b = next_boundary(at(14, 7, 23), 5);
        assert_eq!((b.hour, b.minute, b.second), (14, 10, 0));
    }

    #[test]
    fn wraps_across_midnight() {
        let b = next_boundary(at(23, 58, 10), 10);
        assert_eq!((b.hour, b.minute, b.second), (0, 0, 0));
    }

    #[test]
    fn exact_boundary_advances_a_full_interval() {
        let b = next_boundary(at(14, 10, 0), 5);
        assert_eq!((b.hour, b.minute, b.second), (14, 15, 0));
    }

    #[test]
    fn partial_minute_on_aligned_minute_waits_for_next_whole_minute() {
        let b = next_boundary(at(14, 7, 23), 1);
        assert_eq!((b.hour, b.minute, b.second), (14, 8, 0));
        assert_eq!(b.mode, IntervalMode::EveryMinute);
    }

    #[test]
    fn out_of_catalog_interval_is_clamped_first() {
        // 15 clamps down to 10.
        let b = next_boundary(at(14, 7, 23), 15);
        assert_eq!((b.hour, b.minute, b.second), (14, 10, 0));
        assert_eq!(b.mode, IntervalMode::EveryNMinutes(10));
    }

    #[test]
    fn boundary_properties_hold_for_every_catalog_interval() {
        for &interval in ALLOWED_WAKE_INTERVALS.iter() {
            for hour in 0..24u8 {
                for minute in 0..60u8 {
                    for &second in &[0u8, 1, 23, 59] {
                        let now = at(hour, minute, second);
                        let b = next_boundary(now, interval);
                        assert_eq!(b.second, 0);
                        assert_eq!(
                            (u32::from(b.hour) * 60 + u32::from(b.minute))
                                % u32::from(interval),
                            0,
                            "unaligned boundary {} for {} at interval {}",
                            b,
                            now,
                            interval
                        );
                        let ahead = b.seconds_after(&now);
                        assert!(ahead > 0, "boundary {} not after {}", b, now);
                        assert!(
                            ahead <= u32::from(interval) * 60,
                            "boundary {} too far from {} at interval {}",
                            b,
                            now,
                            interval
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn arm_writes_matching_alarm_registers() {
        let bus = MockBus::with_time(14, 7, 23);
        let mut rtc = Ds3231::new(bus);
        let boundary = arm(&mut rtc, 5).unwrap();
        assert_eq!((boundary.hour, boundary.minute), (14, 10));

        let bus = rtc.release();
        assert_eq!(bus.regs[0x07], 0x00);
        assert_eq!(bus.regs[0x08], 0x10);
        assert_eq!(bus.regs[0x09], 0x14);
        assert_eq!(bus.regs[0x0A], 0x80);
        // INTCN | A1IE enabled.
        assert_eq!(bus.regs[0x0E] & 0x05, 0x05);
    }

    #[test]
    fn arm_every_minute_uses_seconds_only_match() {
        let bus = MockBus::with_time(9, 0, 30);
        let mut rtc = Ds3231::new(bus);
        let boundary = arm(&mut rtc, 1).unwrap();
        assert_eq!(boundary.mode, IntervalMode::EveryMinute);

        let bus = rtc.release();
        assert_eq!(bus.regs[0x07], 0x00);
        assert_eq!(bus.regs[0x08], 0x80);
        assert_eq!(bus.regs[0x09], 0x80);
    }

    #[test]
    fn arming_twice_from_the_same_time_is_idempotent() {
        let bus = MockBus::with_time(14, 7, 23);
        let mut rtc = Ds3231::new(bus);
        let first = arm(&mut rtc, 5).unwrap();

        let bus = rtc.release();
        let image = bus.regs;
        let mut rtc = Ds3231::new(bus);
        let second = arm(&mut rtc, 5).unwrap();

        assert_eq!(first, second);
        assert_eq!(rtc.release().regs, image);
    }

    #[test]
    fn arm_clears_stale_alarm_flag() {
        let mut bus = MockBus::with_time(10, 2, 5);
        bus.regs[0x0F] = 0x01;
        let mut rtc = Ds3231::new(bus);
        arm(&mut rtc, 5).unwrap();
        assert!(!rtc.read_alarm_flag().unwrap());
    }

    #[test]
    fn fallback_arms_every_minute_when_bus_recovers() {
        // First attempt fails wholesale, so fallback also fails; a dead
        // bus must surface as an error rather than a silent success.
        let mut bus = MockBus::with_time(10, 2, 5);
        bus.fail = true;
        let mut rtc = Ds3231::new(bus);
        assert!(arm_or_fallback(&mut rtc, 5).is_err());
    }
}
