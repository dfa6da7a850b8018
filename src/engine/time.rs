use anyhow::{Result, bail};
use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SecondsFormat, Utc,
};

pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Calendar projection used for streaks and weekly windows.
///
/// A timestamp belongs to the date it has in `offset`. The default offset is zero, so the
/// calendar date is the UTC date of the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPolicy {
    offset: FixedOffset,
}

impl Default for DayPolicy {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayPolicy {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
        if minutes.unsigned_abs() > MAX_UTC_OFFSET_MINUTES.unsigned_abs() {
            bail!("utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {minutes}");
        }

        match FixedOffset::east_opt(minutes * 60) {
            Some(offset) => Ok(Self { offset }),
            None => bail!("invalid utc offset: {minutes} minutes"),
        }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    pub fn local_date(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_date(now)
    }

    /// First instant of `date` in this policy, as UTC.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(NaiveTime::MIN);
        (local_midnight - Duration::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }

    /// Last whole second of `date` in this policy, as UTC.
    pub fn end_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        self.start_of_day(date + Duration::days(1)) - Duration::seconds(1)
    }
}

/// Parses a stored timestamp. RFC 3339 with any offset is accepted, as is the naive
/// `YYYY-MM-DD HH:MM:SS` form (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();

    DateTime::parse_from_rfc3339(trimmed)
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
