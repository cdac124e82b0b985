//! Rollover granularities and bucket timezones.
//!
//! A rollover decides how a series is cut into partitions over time: every
//! observation lands in the bucket starting at `floor(t)`, and the following
//! bucket starts at `next(t)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{util, Duration, OffsetDateTime, Time, UtcOffset};

use crate::error::{Error, Result};

/// Time granularity at which a series rolls over into a new partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rollover {
    Year,
    Month,
    Day,
    Hour,
    Minute,
}

impl Rollover {
    pub const ALL: [Rollover; 5] = [
        Rollover::Year,
        Rollover::Month,
        Rollover::Day,
        Rollover::Hour,
        Rollover::Minute,
    ];

    /// Truncate `t` to the start of its bucket, keeping `t`'s offset.
    pub fn floor(self, t: OffsetDateTime) -> OffsetDateTime {
        let midnight = t.replace_time(Time::MIDNIGHT);
        match self {
            Rollover::Year => midnight - Duration::days(i64::from(t.ordinal()) - 1),
            Rollover::Month => midnight - Duration::days(i64::from(t.day()) - 1),
            Rollover::Day => midnight,
            Rollover::Hour => midnight + Duration::hours(i64::from(t.hour())),
            Rollover::Minute => {
                midnight
                    + Duration::hours(i64::from(t.hour()))
                    + Duration::minutes(i64::from(t.minute()))
            }
        }
    }

    /// Start of the bucket following the one containing `t`, or `None` when
    /// that instant is past the representable date range.
    pub fn next(self, t: OffsetDateTime) -> Option<OffsetDateTime> {
        let floor = self.floor(t);
        let step = match self {
            Rollover::Year => Duration::days(i64::from(util::days_in_year(floor.year()))),
            Rollover::Month => Duration::days(i64::from(util::days_in_year_month(
                floor.year(),
                floor.month(),
            ))),
            Rollover::Day => Duration::DAY,
            Rollover::Hour => Duration::HOUR,
            Rollover::Minute => Duration::MINUTE,
        };
        floor.checked_add(step)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rollover::Year => "YEAR",
            Rollover::Month => "MONTH",
            Rollover::Day => "DAY",
            Rollover::Hour => "HOUR",
            Rollover::Minute => "MINUTE",
        }
    }
}

impl fmt::Display for Rollover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rollover {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Rollover::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnsupportedRollover(s.to_string()))
    }
}

/// Timezone in which bucket boundaries are cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    UTC,
    AsiaShanghai, // UTC+8
    AsiaTokyo,    // UTC+9
    Custom(UtcOffset),
}

impl Timezone {
    pub fn offset(&self) -> UtcOffset {
        match self {
            Timezone::UTC => UtcOffset::UTC,
            Timezone::AsiaShanghai => fixed_hours(8),
            Timezone::AsiaTokyo => fixed_hours(9),
            Timezone::Custom(offset) => *offset,
        }
    }

    /// Express `t` in this timezone. The instant is unchanged. At the edges
    /// of the date range, where the local time cannot be represented, `t`
    /// is returned in its own offset.
    pub fn localize(&self, t: OffsetDateTime) -> OffsetDateTime {
        t.checked_to_offset(self.offset()).unwrap_or(t)
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Timezone::UTC
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timezone::UTC => f.write_str("UTC"),
            Timezone::AsiaShanghai => f.write_str("Asia/Shanghai"),
            Timezone::AsiaTokyo => f.write_str("Asia/Tokyo"),
            Timezone::Custom(offset) => {
                let (h, m, _) = offset.as_hms();
                let sign = if offset.is_negative() { '-' } else { '+' };
                write!(f, "{}{:02}{:02}", sign, h.unsigned_abs(), m.unsigned_abs())
            }
        }
    }
}

impl FromStr for Timezone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UTC" | "Z" => Ok(Timezone::UTC),
            "Asia/Shanghai" => Ok(Timezone::AsiaShanghai),
            "Asia/Tokyo" => Ok(Timezone::AsiaTokyo),
            _ => {
                // Custom offset, e.g. "+0800" or "-0530".
                let invalid = || Error::InvalidTimezone(s.to_string());
                let sign = match s.as_bytes().first() {
                    Some(b'+') => 1,
                    Some(b'-') => -1,
                    _ => return Err(invalid()),
                };
                if s.len() != 5 || !s[1..].bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let hours: i8 = s[1..3].parse().map_err(|_| invalid())?;
                let minutes: i8 = s[3..5].parse().map_err(|_| invalid())?;
                let offset = UtcOffset::from_hms(sign * hours, sign * minutes, 0)
                    .map_err(|_| invalid())?;
                Ok(Timezone::Custom(offset))
            }
        }
    }
}

fn fixed_hours(hours: i8) -> UtcOffset {
    match UtcOffset::from_hms(hours, 0, 0) {
        Ok(offset) => offset,
        Err(_) => UtcOffset::UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    fn samples() -> Vec<OffsetDateTime> {
        vec![
            datetime!(2020-01-01 00:00 UTC),
            datetime!(2020-02-29 23:59:59.999 UTC),
            datetime!(2021-02-28 12:30:15 UTC),
            datetime!(2019-12-31 23:59:59 UTC),
            datetime!(2024-07-15 08:05:00.5 +08:00),
            datetime!(1999-03-01 00:00:01 -05:00),
        ]
    }

    #[test]
    fn test_floor_each_granularity() {
        let t = datetime!(2021-08-17 14:37:52.25 UTC);
        assert_eq!(Rollover::Year.floor(t), datetime!(2021-01-01 00:00 UTC));
        assert_eq!(Rollover::Month.floor(t), datetime!(2021-08-01 00:00 UTC));
        assert_eq!(Rollover::Day.floor(t), datetime!(2021-08-17 00:00 UTC));
        assert_eq!(Rollover::Hour.floor(t), datetime!(2021-08-17 14:00 UTC));
        assert_eq!(Rollover::Minute.floor(t), datetime!(2021-08-17 14:37 UTC));
    }

    #[test]
    fn test_next_each_granularity() {
        let t = datetime!(2021-12-31 23:59:30 UTC);
        assert_eq!(Rollover::Year.next(t), Some(datetime!(2022-01-01 00:00 UTC)));
        assert_eq!(Rollover::Month.next(t), Some(datetime!(2022-01-01 00:00 UTC)));
        assert_eq!(Rollover::Day.next(t), Some(datetime!(2022-01-01 00:00 UTC)));
        assert_eq!(Rollover::Hour.next(t), Some(datetime!(2022-01-01 00:00 UTC)));
        assert_eq!(Rollover::Minute.next(t), Some(datetime!(2022-01-01 00:00 UTC)));
    }

    #[test]
    fn test_month_next_leap_february() {
        assert_eq!(
            Rollover::Month.next(datetime!(2020-02-10 00:00 UTC)),
            Some(datetime!(2020-03-01 00:00 UTC))
        );
        assert_eq!(
            Rollover::Month.next(datetime!(2021-02-10 00:00 UTC)),
            Some(datetime!(2021-03-01 00:00 UTC))
        );
        assert_eq!(
            Rollover::Year.next(datetime!(2020-06-01 00:00 UTC)),
            Some(datetime!(2021-01-01 00:00 UTC))
        );
    }

    #[test]
    fn test_next_past_max_date_is_none() {
        let t = datetime!(9999-12-31 23:59:30 UTC);
        for rollover in Rollover::ALL {
            assert_eq!(rollover.next(t), None, "{rollover}");
            assert!(rollover.floor(t) <= t);
        }
        assert_eq!(
            Rollover::Month.next(datetime!(9999-11-15 00:00 UTC)),
            Some(datetime!(9999-12-01 00:00 UTC))
        );
    }

    #[test]
    fn test_localize_at_max_date_does_not_panic() {
        let t = datetime!(9999-12-31 23:00 UTC);
        assert_eq!(Timezone::AsiaTokyo.localize(t), t);
    }

    #[test]
    fn test_floor_keeps_offset() {
        let t = datetime!(2024-07-15 01:30 +08:00);
        let floored = Rollover::Day.floor(t);
        assert_eq!(floored, datetime!(2024-07-15 00:00 +08:00));
        assert_eq!(floored.offset(), offset!(+8));
    }

    #[test]
    fn test_floor_next_properties() {
        for rollover in Rollover::ALL {
            for t in samples() {
                let floor = rollover.floor(t);
                let next = rollover.next(t).unwrap();
                assert!(floor <= t, "{rollover} floor({t}) > t");
                assert!(t < next, "{rollover} next({t}) <= t");
                assert_eq!(rollover.floor(floor), floor);
                assert_eq!(rollover.floor(next), next);
                assert_eq!(rollover.floor(floor), rollover.floor(t));
            }
        }
    }

    #[test]
    fn test_floor_on_boundary_is_identity() {
        let boundary = datetime!(2020-01-01 00:00 UTC);
        for rollover in Rollover::ALL {
            assert_eq!(rollover.floor(boundary), boundary);
        }
    }

    #[test]
    fn test_rollover_text() {
        for rollover in Rollover::ALL {
            assert_eq!(rollover.to_string().parse::<Rollover>().unwrap(), rollover);
        }
        assert_eq!("hour".parse::<Rollover>().unwrap(), Rollover::Hour);
        assert!(matches!(
            "WEEK".parse::<Rollover>(),
            Err(Error::UnsupportedRollover(_))
        ));
    }

    #[test]
    fn test_timezone_from_str() {
        assert_eq!("UTC".parse::<Timezone>().unwrap(), Timezone::UTC);
        assert_eq!(
            "Asia/Shanghai".parse::<Timezone>().unwrap().offset(),
            offset!(+8)
        );
        assert_eq!("+0800".parse::<Timezone>().unwrap().offset(), offset!(+8));
        assert_eq!(
            "-0530".parse::<Timezone>().unwrap().offset(),
            offset!(-5:30)
        );
        assert!("Mars/Olympus".parse::<Timezone>().is_err());
        assert!("+8".parse::<Timezone>().is_err());
    }

    #[test]
    fn test_timezone_display_round_trip() {
        let tz: Timezone = "-0530".parse().unwrap();
        assert_eq!(tz.to_string(), "-0530");
        assert_eq!(tz.to_string().parse::<Timezone>().unwrap(), tz);
    }

    #[test]
    fn test_localize_preserves_instant() {
        let tz = Timezone::AsiaTokyo;
        let t = datetime!(2024-01-28 23:00 UTC);
        let local = tz.localize(t);
        assert_eq!(local, t);
        assert_eq!(local.day(), 29);
    }
}
