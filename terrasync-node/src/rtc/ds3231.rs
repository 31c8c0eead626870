use embedded_hal::i2c::I2c;
use terrasync_api::WallClockTime;

use crate::error::{Error, Result};

use super::RtcTime;

/// Fixed I2C address of the DS3231.
pub const DS3231_ADDR: u8 = 0x68;

const REG_TIME: u8 = 0x00;
const REG_ALARM1: u8 = 0x07;
const REG_CONTROL: u8 = 0x0E;
const REG_STATUS: u8 = 0x0F;

/// INTCN routes the INT/SQW pin to the alarm; A1IE enables Alarm 1.
const CTRL_A1IE: u8 = 0x01;
const CTRL_INTCN: u8 = 0x04;

const STATUS_A1F: u8 = 0x01;
const STATUS_A2F: u8 = 0x02;
const STATUS_OSF: u8 = 0x80;

/// AxMx mask bit: set means "ignore this alarm register".
const ALARM_IGNORE: u8 = 0x80;

/// Hour register keeps bit 6 as the 12/24h selector; mask it off on read.
const HOUR_24H_MASK: u8 = 0x3F;

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

fn from_bcd(byte: u8) -> u8 {
    ((byte >> 4) & 0x0F) * 10 + (byte & 0x0F)
}

/// Alarm 1 match configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmMatch {
    /// Match seconds == 00 only: fires once per minute, forever.
    EveryMinute,
    /// Match an exact HH:MM:SS with day/date ignored: recurs daily at
    /// that wall-clock instant unless re-armed sooner.
    Daily { hour: u8, minute: u8, second: u8 },
}

/// Register-level driver for the DS3231's timekeeping and Alarm 1.
///
/// Every operation surfaces bus NACK/timeout as `Error::Bus`; a failed
/// read is never reported as zero.
pub struct Ds3231<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Ds3231<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_register(&mut self, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(DS3231_ADDR, &[reg], &mut buf)
            .map_err(|_| Error::Bus)?;
        Ok(buf[0])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<()> {
        self.i2c
            .write(DS3231_ADDR, &[reg, value])
            .map_err(|_| Error::Bus)
    }

    /// Current time of day, BCD-decoded from the first three registers.
    pub fn read_time(&mut self) -> Result<RtcTime> {
        let mut buf = [0u8; 3];
        self.i2c
            .write_read(DS3231_ADDR, &[REG_TIME], &mut buf)
            .map_err(|_| Error::Bus)?;
        Ok(RtcTime {
            second: from_bcd(buf[0]),
            minute: from_bcd(buf[1]),
            hour: from_bcd(buf[2] & HOUR_24H_MASK),
        })
    }

    /// Full calendar read (registers 0x00..=0x06). The DS3231 only keeps
    /// a two-digit year; it is interpreted as 2000-based.
    pub fn read_datetime(&mut self) -> Result<WallClockTime> {
        let mut buf = [0u8; 7];
        self.i2c
            .write_read(DS3231_ADDR, &[REG_TIME], &mut buf)
            .map_err(|_| Error::Bus)?;
        Ok(WallClockTime {
            second: from_bcd(buf[0]),
            minute: from_bcd(buf[1]),
            hour: from_bcd(buf[2] & HOUR_24H_MASK),
            day: from_bcd(buf[4]),
            month: from_bcd(buf[5] & 0x1F),
            year: 2000 + u16::from(from_bcd(buf[6])),
        })
    }

    /// Set the full calendar and clear the oscillator-stop flag, since a
    /// freshly written clock is trustworthy again.
    pub fn set_datetime(&mut self, clock: &WallClockTime) -> Result<()> {
        let datetime = clock.to_datetime().ok_or(Error::InvalidTime)?;
        let weekday = datetime.weekday().number_from_monday();
        let buf = [
            REG_TIME,
            to_bcd(clock.second),
            to_bcd(clock.minute),
            to_bcd(clock.hour),
            to_bcd(weekday),
            to_bcd(clock.day),
            to_bcd(clock.month),
            to_bcd((clock.year % 100) as u8),
        ];
        self.i2c.write(DS3231_ADDR, &buf).map_err(|_| Error::Bus)?;

        let status = self.read_register(REG_STATUS)?;
        if status & STATUS_OSF != 0 {
            self.write_register(REG_STATUS, status & !STATUS_OSF)?;
        }
        Ok(())
    }

    /// Whether the oscillator stopped since the last clock write, meaning
    /// the time base can no longer be trusted.
    pub fn lost_power(&mut self) -> Result<bool> {
        Ok(self.read_register(REG_STATUS)? & STATUS_OSF != 0)
    }

    /// Alarm 1 fired flag (A1F).
    pub fn read_alarm_flag(&mut self) -> Result<bool> {
        Ok(self.read_register(REG_STATUS)? & STATUS_A1F != 0)
    }

    /// Clear A1F (and A2F) while preserving every other status bit, so
    /// the INT line releases without disturbing the oscillator flags.
    pub fn clear_alarm_flag(&mut self) -> Result<()> {
        let status = self.read_register(REG_STATUS)?;
        self.write_register(REG_STATUS, status & !(STATUS_A1F | STATUS_A2F))
    }

    /// Set INTCN | A1IE, read-modify-write. Idempotent.
    pub fn enable_alarm_interrupt(&mut self) -> Result<()> {
        let control = self.read_register(REG_CONTROL)?;
        self.write_register(REG_CONTROL, control | CTRL_INTCN | CTRL_A1IE)
    }

    /// Program Alarm 1's four match registers in one bus write.
    pub fn write_alarm(&mut self, alarm: AlarmMatch) -> Result<()> {
        let (seconds, minutes, hours) = match alarm {
            AlarmMatch::EveryMinute => (to_bcd(0), ALARM_IGNORE, ALARM_IGNORE),
            AlarmMatch::Daily {
                hour,
                minute,
                second,
            } => (to_bcd(second), to_bcd(minute), to_bcd(hour)),
        };
        // A1M4 set: day/date never participates in the match.
        let buf = [REG_ALARM1, seconds, minutes, hours, ALARM_IGNORE];
        self.i2c.write(DS3231_ADDR, &buf).map_err(|_| Error::Bus)
    }
}
