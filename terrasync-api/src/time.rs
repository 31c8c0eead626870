use core::fmt;

use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Absolute wall-clock time carried on the wire as separate components,
/// matching the RTC's register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClockTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl WallClockTime {
    pub fn to_datetime(&self) -> Option<PrimitiveDateTime> {
        let month = Month::try_from(self.month).ok()?;
        let date = Date::from_calendar_date(i32::from(self.year), month, self.day).ok()?;
        let clock = Time::from_hms(self.hour, self.minute, self.second).ok()?;
        Some(PrimitiveDateTime::new(date, clock))
    }

    pub fn from_datetime(dt: PrimitiveDateTime) -> Self {
        Self {
            year: dt.year() as u16,
            month: dt.month() as u8,
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
        }
    }

    /// Seconds since the unix epoch, treating the components as UTC.
    /// `None` when the components do not form a valid calendar date.
    pub fn unix_timestamp(&self) -> Option<i64> {
        Some(self.to_datetime()?.assume_utc().unix_timestamp())
    }

    pub fn from_unix(epoch: i64) -> Option<Self> {
        let odt = OffsetDateTime::from_unix_timestamp(epoch).ok()?;
        Some(Self::from_datetime(PrimitiveDateTime::new(odt.date(), odt.time())))
    }
}

impl fmt::Display for WallClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Clock access injected into protocol logic so tests stay deterministic.
///
/// `monotonic_ms` never goes backwards; `wall_clock` is `None` until the
/// implementor has an authoritative time base.
pub trait TimeProvider {
    fn monotonic_ms(&self) -> u64;

    fn wall_clock(&self) -> Option<WallClockTime>;
}
