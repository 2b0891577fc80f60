//! `date_time` tool: now/format/diff/add over `chrono`.
//!
//! Timezones are `UTC`/`Z`, a fixed offset (`+05:30`, `-0800`, `UTC+2`) or an IANA name
//! (`America/New_York`), the latter resolved through `chrono-tz` so DST applies per instant.

use chrono::{
    DateTime, FixedOffset, Months, NaiveDate, NaiveDateTime, Offset, SecondsFormat, TimeDelta,
    TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Serialize;
use toolpipe_core::{Error, Result};

const EN_US_DATETIME: &str = "%-m/%-d/%Y, %-I:%M:%S %p";
const EN_US_DATE: &str = "%-m/%-d/%Y";
const EN_US_TIME: &str = "%-I:%M:%S %p";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOp {
    Now,
    Format,
    Diff,
    Add,
}

impl DateOp {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "now" => Ok(Self::Now),
            "format" => Ok(Self::Format),
            "diff" => Ok(Self::Diff),
            "add" => Ok(Self::Add),
            other => Err(Error::InvalidParams(format!(
                "unknown operation {other:?} (allowed: now, format, diff, add)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "seconds" => Ok(Self::Seconds),
            "minutes" => Ok(Self::Minutes),
            "hours" => Ok(Self::Hours),
            "days" => Ok(Self::Days),
            "weeks" => Ok(Self::Weeks),
            "months" => Ok(Self::Months),
            "years" => Ok(Self::Years),
            other => Err(Error::InvalidParams(format!(
                "unknown unit {other:?} (allowed: seconds, minutes, hours, days, weeks, months, years)"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Years => "years",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneRule {
    Fixed(FixedOffset),
    Named(Tz),
}

/// A resolved display zone and the label echoed back to callers.
#[derive(Debug, Clone)]
pub struct Zone {
    rule: ZoneRule,
    pub label: String,
}

impl Zone {
    /// UTC offset in seconds at instant `at`.
    pub fn offset_secs_at(&self, at: DateTime<Utc>) -> i32 {
        match self.rule {
            ZoneRule::Fixed(o) => o.local_minus_utc(),
            ZoneRule::Named(tz) => tz
                .offset_from_utc_datetime(&at.naive_utc())
                .fix()
                .local_minus_utc(),
        }
    }

    fn render(&self, d: DateTime<Utc>, fmt: &str) -> String {
        match self.rule {
            ZoneRule::Fixed(o) => d.with_timezone(&o).format(fmt).to_string(),
            ZoneRule::Named(tz) => d.with_timezone(&tz).format(fmt).to_string(),
        }
    }
}

pub fn parse_timezone(tz: Option<&str>) -> Result<Zone> {
    let raw = tz.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("UTC");
    if raw.eq_ignore_ascii_case("utc") || raw.eq_ignore_ascii_case("gmt") || raw == "Z" {
        return Ok(Zone {
            rule: ZoneRule::Fixed(FixedOffset::east_opt(0).ok_or_else(|| bad_zone(raw))?),
            label: "UTC".to_string(),
        });
    }
    let rule = match parse_offset(raw) {
        Some(o) => ZoneRule::Fixed(o),
        None => ZoneRule::Named(raw.parse::<Tz>().map_err(|_| bad_zone(raw))?),
    };
    Ok(Zone {
        rule,
        label: raw.to_string(),
    })
}

fn bad_zone(raw: &str) -> Error {
    Error::InvalidParams(format!(
        "unsupported timezone {raw:?} (use UTC, a fixed offset like +05:30, or an IANA name like America/New_York)"
    ))
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let rest = raw
        .strip_prefix("UTC")
        .or_else(|| raw.strip_prefix("GMT"))
        .unwrap_or(raw);
    let (sign, digits) = match rest.as_bytes().first()? {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    // Byte offsets below are only char boundaries for ASCII input.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }
    let (h, m) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if !(0..=14).contains(&h) || !(0..60).contains(&m) {
        return None;
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}

/// RFC 3339, RFC 2822, `YYYY-MM-DD[ T]HH:MM[:SS[.fff]]` (read as UTC), or a bare date (UTC midnight).
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Ok(d.with_timezone(&Utc));
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(s) {
        return Ok(d.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(n.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(n) = d.and_hms_opt(0, 0, 0) {
            return Ok(n.and_utc());
        }
    }
    Err(Error::InvalidParams(format!("Invalid date: {s:?}")))
}

fn iso(d: DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn local(d: DateTime<Utc>, zone: &Zone, fmt: &str) -> String {
    zone.render(d, fmt)
}

#[derive(Debug, Clone, Serialize)]
pub struct NowReport {
    pub iso: String,
    pub formatted: String,
    pub timezone: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatReport {
    pub iso: String,
    pub formatted: String,
    pub date: String,
    pub time: String,
    pub day_of_week: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiffReport {
    pub milliseconds: i64,
    pub seconds: i64,
    pub minutes: i64,
    pub hours: i64,
    pub days: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReport {
    pub original_date: String,
    pub added: String,
    pub result: String,
    pub formatted: String,
}

pub fn now_at(at: DateTime<Utc>, zone: &Zone) -> NowReport {
    NowReport {
        iso: iso(at),
        formatted: local(at, zone, EN_US_DATETIME),
        timezone: zone.label.clone(),
        timestamp: at.timestamp_millis(),
    }
}

pub fn now(zone: &Zone) -> NowReport {
    now_at(Utc::now(), zone)
}

pub fn format(date: &str, zone: &Zone) -> Result<FormatReport> {
    let d = parse_date(date)?;
    Ok(FormatReport {
        iso: iso(d),
        formatted: local(d, zone, EN_US_DATETIME),
        date: local(d, zone, EN_US_DATE),
        time: local(d, zone, EN_US_TIME),
        day_of_week: local(d, zone, "%A"),
    })
}

/// `date2 - date`, each unit floored.
pub fn diff(date: &str, date2: &str) -> Result<DiffReport> {
    let d1 = parse_date(date)?;
    let d2 = parse_date(date2)?;
    let ms = (d2 - d1).num_milliseconds();
    Ok(DiffReport {
        milliseconds: ms,
        seconds: ms.div_euclid(1_000),
        minutes: ms.div_euclid(60_000),
        hours: ms.div_euclid(3_600_000),
        days: ms.div_euclid(86_400_000),
    })
}

/// Calendar units clamp to the end of the month (`Jan 31 + 1 month = Feb 28/29`).
pub fn add(date: &str, amount: i64, unit: TimeUnit, zone: &Zone) -> Result<AddReport> {
    let d = parse_date(date)?;
    let overflow = || Error::InvalidParams(format!("adding {amount} {} overflows", unit.name()));
    let fixed = |secs: Option<i64>| -> Result<DateTime<Utc>> {
        let delta = secs
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(overflow)?;
        d.checked_add_signed(delta).ok_or_else(overflow)
    };
    let months = |n: Option<i64>| -> Result<DateTime<Utc>> {
        let n = n.ok_or_else(overflow)?;
        let m = Months::new(u32::try_from(n.unsigned_abs()).map_err(|_| overflow())?);
        let shifted = if n >= 0 {
            d.checked_add_months(m)
        } else {
            d.checked_sub_months(m)
        };
        shifted.ok_or_else(overflow)
    };

    let out = match unit {
        TimeUnit::Seconds => fixed(Some(amount)),
        TimeUnit::Minutes => fixed(amount.checked_mul(60)),
        TimeUnit::Hours => fixed(amount.checked_mul(3_600)),
        TimeUnit::Days => fixed(amount.checked_mul(86_400)),
        TimeUnit::Weeks => fixed(amount.checked_mul(7 * 86_400)),
        TimeUnit::Months => months(Some(amount)),
        TimeUnit::Years => months(amount.checked_mul(12)),
    }?;

    Ok(AddReport {
        original_date: date.to_string(),
        added: format!("{amount} {}", unit.name()),
        result: iso(out),
        formatted: local(out, zone, EN_US_DATETIME),
    })
}
