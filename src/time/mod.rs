//! Time boundaries and the shared layout table.
//!
//! The same nine layouts are used to parse `--since`/`--until` and to pick
//! the `--time-format` used when printing records.

mod duration;

pub use duration::parse_duration;

use crate::error::{ObserveError, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

/// Named timestamp layouts accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeFormat {
    #[default]
    StampMilli,
    YearMonthDay,
    YearMonthDayHour,
    YearMonthDayHourMinute,
    RFC3339,
    RFC3339Milli,
    RFC3339Micro,
    RFC3339Nano,
    RFC1123Z,
}

impl TimeFormat {
    /// All layouts, in the order they are documented.
    pub const ALL: [TimeFormat; 9] = [
        TimeFormat::StampMilli,
        TimeFormat::YearMonthDay,
        TimeFormat::YearMonthDayHour,
        TimeFormat::YearMonthDayHourMinute,
        TimeFormat::RFC3339,
        TimeFormat::RFC3339Milli,
        TimeFormat::RFC3339Micro,
        TimeFormat::RFC3339Nano,
        TimeFormat::RFC1123Z,
    ];

    /// Order in which layouts are tried when parsing. More specific layouts
    /// come first so a longer timestamp is never truncated by a shorter one.
    pub const PARSE_ORDER: [TimeFormat; 9] = [
        TimeFormat::StampMilli,
        TimeFormat::RFC3339Nano,
        TimeFormat::RFC3339Micro,
        TimeFormat::RFC3339Milli,
        TimeFormat::RFC3339,
        TimeFormat::RFC1123Z,
        TimeFormat::YearMonthDayHourMinute,
        TimeFormat::YearMonthDayHour,
        TimeFormat::YearMonthDay,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TimeFormat::StampMilli => "StampMilli",
            TimeFormat::YearMonthDay => "YearMonthDay",
            TimeFormat::YearMonthDayHour => "YearMonthDayHour",
            TimeFormat::YearMonthDayHourMinute => "YearMonthDayHourMinute",
            TimeFormat::RFC3339 => "RFC3339",
            TimeFormat::RFC3339Milli => "RFC3339Milli",
            TimeFormat::RFC3339Micro => "RFC3339Micro",
            TimeFormat::RFC3339Nano => "RFC3339Nano",
            TimeFormat::RFC1123Z => "RFC1123Z",
        }
    }

    /// Reference rendering of the layout, shown in help and diagnostics.
    pub fn example(&self) -> &'static str {
        match self {
            TimeFormat::StampMilli => "Jan _2 15:04:05.000",
            TimeFormat::YearMonthDay => "2006-01-02",
            TimeFormat::YearMonthDayHour => "2006-01-02T15Z07:00",
            TimeFormat::YearMonthDayHourMinute => "2006-01-02T15:04Z07:00",
            TimeFormat::RFC3339 => "2006-01-02T15:04:05Z07:00",
            TimeFormat::RFC3339Milli => "2006-01-02T15:04:05.000Z07:00",
            TimeFormat::RFC3339Micro => "2006-01-02T15:04:05.000000Z07:00",
            TimeFormat::RFC3339Nano => "2006-01-02T15:04:05.999999999Z07:00",
            TimeFormat::RFC1123Z => "Mon, 02 Jan 2006 15:04:05 -0700",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(TimeFormat::name).collect()
    }

    /// `Name: example` lines for every layout.
    pub fn described() -> Vec<String> {
        Self::ALL
            .iter()
            .map(|layout| format!("{}: {}", layout.name(), layout.example()))
            .collect()
    }

    /// Parse `input` with this layout only. Layouts without a zone are UTC;
    /// `StampMilli` carries no year and takes the one from `now`.
    pub fn parse(&self, input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeFormat::StampMilli => {
                let dated = format!("{} {}", now.year(), input);
                NaiveDateTime::parse_from_str(&dated, "%Y %b %e %H:%M:%S%.3f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }
            TimeFormat::YearMonthDay => NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc()),
            TimeFormat::YearMonthDayHour => {
                let (body, offset) = split_zone(input)?;
                let naive =
                    NaiveDateTime::parse_from_str(&format!("{}:00", body), "%Y-%m-%dT%H:%M").ok()?;
                localize(naive, offset)
            }
            TimeFormat::YearMonthDayHourMinute => {
                let (body, offset) = split_zone(input)?;
                let naive = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M").ok()?;
                localize(naive, offset)
            }
            TimeFormat::RFC3339 => parse_rfc3339(input, |digits| digits == 0),
            TimeFormat::RFC3339Milli => parse_rfc3339(input, |digits| digits == 3),
            TimeFormat::RFC3339Micro => parse_rfc3339(input, |digits| digits == 6),
            TimeFormat::RFC3339Nano => parse_rfc3339(input, |digits| digits <= 9),
            TimeFormat::RFC1123Z => DateTime::parse_from_str(input, "%a, %d %b %Y %H:%M:%S %z")
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// Render `time` (in UTC) with this layout.
    pub fn format(&self, time: &DateTime<Utc>) -> String {
        match self {
            TimeFormat::StampMilli => time.format("%b %e %H:%M:%S%.3f").to_string(),
            TimeFormat::YearMonthDay => time.format("%Y-%m-%d").to_string(),
            TimeFormat::YearMonthDayHour => time.format("%Y-%m-%dT%HZ").to_string(),
            TimeFormat::YearMonthDayHourMinute => time.format("%Y-%m-%dT%H:%MZ").to_string(),
            TimeFormat::RFC3339 => time.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            TimeFormat::RFC3339Milli => time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimeFormat::RFC3339Micro => time.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            TimeFormat::RFC3339Nano => {
                let mut out = time.format("%Y-%m-%dT%H:%M:%S").to_string();
                let nanos = time.timestamp_subsec_nanos();
                if nanos > 0 {
                    let fraction = format!("{:09}", nanos);
                    out.push('.');
                    out.push_str(fraction.trim_end_matches('0'));
                }
                out.push('Z');
                out
            }
            TimeFormat::RFC1123Z => time.format("%a, %d %b %Y %H:%M:%S %z").to_string(),
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TimeFormat {
    type Err = ObserveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|layout| layout.name() == s)
            .ok_or_else(|| ObserveError::InvalidTimeFormat {
                input: s.to_string(),
                accepted: Self::names(),
            })
    }
}

fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Split a trailing `Z` or `±HH:MM` zone off `input`.
fn split_zone(input: &str) -> Option<(&str, FixedOffset)> {
    if let Some(body) = input.strip_suffix('Z') {
        return Some((body, FixedOffset::east_opt(0)?));
    }

    let split = input.len().checked_sub(6)?;
    if !input.is_char_boundary(split) {
        return None;
    }
    let (body, zone) = input.split_at(split);
    let zone = zone.as_bytes();
    let sign = match zone[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = [zone[1], zone[2], zone[4], zone[5]];
    if zone[3] != b':' || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = |hi: u8, lo: u8| i32::from(hi - b'0') * 10 + i32::from(lo - b'0');
    let seconds = value(digits[0], digits[1]) * 3_600 + value(digits[2], digits[3]) * 60;
    FixedOffset::east_opt(sign * seconds).map(|offset| (body, offset))
}

fn fraction_digits(input: &str) -> usize {
    let bytes = input.as_bytes();
    match bytes.get(19) {
        Some(b'.') => bytes[20..].iter().take_while(|b| b.is_ascii_digit()).count(),
        _ => 0,
    }
}

fn parse_rfc3339(input: &str, precision: impl Fn(usize) -> bool) -> Option<DateTime<Utc>> {
    if !precision(fraction_digits(input)) {
        return None;
    }
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Try every layout in [`TimeFormat::PARSE_ORDER`]; the first match wins.
pub fn parse_absolute(input: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, TimeFormat)> {
    TimeFormat::PARSE_ORDER
        .iter()
        .find_map(|layout| layout.parse(input, now).map(|time| (time, *layout)))
}

/// A resolved `--since`/`--until` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBoundary {
    /// `offset` before the `now` the expression was resolved against.
    Relative {
        offset: Duration,
        at: DateTime<Utc>,
    },
    Absolute(DateTime<Utc>),
}

impl TimeBoundary {
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            TimeBoundary::Relative { at, .. } => *at,
            TimeBoundary::Absolute(at) => *at,
        }
    }
}

/// Resolve a time expression against `now`.
///
/// An empty expression means no boundary. Relative durations always point
/// into the past, whatever their sign.
pub fn resolve(expr: &str, now: DateTime<Utc>) -> Result<Option<TimeBoundary>> {
    if expr.is_empty() {
        return Ok(None);
    }

    if let Some(offset) = parse_duration(expr).map(|d| d.abs()) {
        if let Some(at) = now.checked_sub_signed(offset) {
            return Ok(Some(TimeBoundary::Relative { offset, at }));
        }
    }

    match parse_absolute(expr, now) {
        Some((at, _)) => Ok(Some(TimeBoundary::Absolute(at))),
        None => Err(ObserveError::InvalidTimeExpression {
            input: expr.to_string(),
            accepted: TimeFormat::described(),
        }),
    }
}
