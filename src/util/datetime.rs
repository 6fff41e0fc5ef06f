//! Datetime contract (§6), grounded on
//! `original_source/include/libdivecomputer/datetime.h`.
//!
//! `Ticks` are 64-bit seconds since the Unix epoch. `DateTime` mirrors
//! `dc_datetime_t`; `timezone` is `None` when the source protocol carries
//! no offset (`DC_TIMEZONE_NONE`), matching the `NONE = INT_MIN` sentinel.

use chrono::{DateTime as ChronoDateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

pub type Ticks = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// Offset from UTC in minutes; `None` is the `DC_TIMEZONE_NONE` sentinel.
    pub tz_minutes: Option<i32>,
}

impl DateTime {
    pub fn now_utc() -> Ticks {
        Utc::now().timestamp()
    }

    /// `dc_datetime_gmtime`.
    pub fn from_ticks_gmtime(ticks: Ticks) -> Option<Self> {
        let dt = Utc.timestamp_opt(ticks, 0).single()?;
        Some(DateTime {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            tz_minutes: None,
        })
    }

    /// `dc_datetime_localtime` — here "local" means "tagged with the
    /// supplied offset", since the library has no notion of a host locale.
    pub fn from_ticks_with_offset(ticks: Ticks, tz_minutes: i32) -> Option<Self> {
        let naive = Utc.timestamp_opt(ticks + i64::from(tz_minutes) * 60, 0).single()?;
        Some(DateTime {
            year: naive.year(),
            month: naive.month(),
            day: naive.day(),
            hour: naive.hour(),
            minute: naive.minute(),
            second: naive.second(),
            tz_minutes: Some(tz_minutes),
        })
    }

    /// `dc_datetime_mktime` — round-trips to ticks, subtracting the offset
    /// back out when one is present so `from_ticks_with_offset` and
    /// `mktime` compose to the identity.
    pub fn mktime(&self) -> Option<Ticks> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)?;
        let naive = date.and_hms_opt(self.hour, self.minute, self.second)?;
        let utc: ChronoDateTime<Utc> = Utc.from_utc_datetime(&naive);
        let offset = i64::from(self.tz_minutes.unwrap_or(0)) * 60;
        Some(utc.timestamp() - offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gmtime_roundtrips_through_mktime() {
        let ticks = 1_700_000_000;
        let dt = DateTime::from_ticks_gmtime(ticks).unwrap();
        assert_eq!(dt.mktime().unwrap(), ticks);
    }

    #[test]
    fn localtime_preserves_timezone_offset() {
        let ticks = 1_700_000_000;
        let dt = DateTime::from_ticks_with_offset(ticks, 120).unwrap();
        assert_eq!(dt.tz_minutes, Some(120));
        assert_eq!(dt.mktime().unwrap(), ticks);
    }

    #[test]
    fn gmtime_has_no_timezone() {
        let dt = DateTime::from_ticks_gmtime(0).unwrap();
        assert_eq!(dt.tz_minutes, None);
    }
}
