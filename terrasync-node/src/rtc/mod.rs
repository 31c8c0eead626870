mod ds3231;

pub use ds3231::{AlarmMatch, DS3231_ADDR, Ds3231};

#[cfg(test)]
pub use ds3231::mock::MockBus;

/// Time-of-day as read from the RTC's first three registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl RtcTime {
    /// Seconds since local midnight; used for wrap-aware comparisons.
    pub fn seconds_of_day(&self) -> u32 {
        u32::from(self.hour) * 3600 + u32::from(self.minute) * 60 + u32::from(self.second)
    }
}

impl core::fmt::Display for RtcTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}
