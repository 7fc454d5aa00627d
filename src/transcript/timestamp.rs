//! Turns the date and time strings captured from a header (or a feed's
//! `time` field) into a UTC instant.
//!
//! Header dates are tried against a fixed cascade of layouts: the layout the
//! pattern hints at first, then four-digit years before two-digit years and
//! 12-hour clocks before 24-hour clocks, each with the hinted day/month order
//! ahead of the swapped one. The first layout that yields a real calendar
//! date wins; nothing tries to guess which of two valid readings was meant.

use crate::error::TranscriptError;
use crate::transcript::message::MessageTime;
use crate::transcript::patterns::{ClockStyle, DateOrder, TimestampHint, YearDigits};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

const TWELVE_HOUR_LAYOUTS: [&str; 2] = ["%I:%M:%S %p", "%I:%M %p"];
const TWENTY_FOUR_HOUR_LAYOUTS: [&str; 2] = ["%H:%M:%S", "%H:%M"];
const ISO_NAIVE_LAYOUTS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// One (date layout, time layout) reading of a raw header timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub order: DateOrder,
    /// Always `Two` or `Four`.
    pub year: YearDigits,
    /// Always `TwelveHour` or `TwentyFourHour`.
    pub clock: ClockStyle,
    pub seconds_first: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TimestampNormalizer {
    tz: Tz,
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

/// Expand a two-digit year: `00..=49` is 20xx, `50..=99` is 19xx.
pub fn expand_two_digit_year(yy: i32) -> i32 {
    if yy < 50 { 2000 + yy } else { 1900 + yy }
}

fn years_for(hint: YearDigits) -> &'static [YearDigits] {
    match hint {
        YearDigits::Four => &[YearDigits::Four],
        YearDigits::Two => &[YearDigits::Two],
        YearDigits::Either => &[YearDigits::Four, YearDigits::Two],
    }
}

fn clocks_for(hint: ClockStyle) -> &'static [ClockStyle] {
    match hint {
        ClockStyle::TwelveHour => &[ClockStyle::TwelveHour],
        ClockStyle::TwentyFourHour => &[ClockStyle::TwentyFourHour],
        ClockStyle::Either => &[ClockStyle::TwelveHour, ClockStyle::TwentyFourHour],
    }
}

fn split_date(raw: &str) -> Option<[&str; 3]> {
    let mut parts = raw.trim().split(['/', '.', '-']);
    let a = parts.next()?;
    let b = parts.next()?;
    let c = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let all_digits = [a, b, c]
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|ch| ch.is_ascii_digit()));
    all_digits.then_some([a, b, c])
}

fn parse_date(raw: &str, order: DateOrder, year: YearDigits) -> Option<NaiveDate> {
    let [a, b, c] = split_date(raw)?;

    // `2024-01-02` style exports put the year up front.
    if a.len() == 4 {
        if year != YearDigits::Four {
            return None;
        }
        return NaiveDate::from_ymd_opt(a.parse().ok()?, b.parse().ok()?, c.parse().ok()?);
    }

    let full_year = match (year, c.len()) {
        (YearDigits::Four, 4) => c.parse().ok()?,
        (YearDigits::Two, 2) => expand_two_digit_year(c.parse().ok()?),
        _ => return None,
    };
    let (month, day) = match order {
        DateOrder::MonthFirst => (a, b),
        DateOrder::DayFirst => (b, a),
    };
    NaiveDate::from_ymd_opt(full_year, month.parse().ok()?, day.parse().ok()?)
}

fn clean_time(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .filter(|ch| *ch != '.')
        .map(|ch| if ch.is_whitespace() { ' ' } else { ch })
        .collect();
    let mut out = spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    // `3:04PM` -> `3:04 PM`
    if (out.ends_with("AM") || out.ends_with("PM"))
        && out[..out.len() - 2].ends_with(|ch: char| ch.is_ascii_digit())
    {
        out.insert(out.len() - 2, ' ');
    }
    out
}

fn parse_time(raw: &str, clock: ClockStyle, seconds_first: bool) -> Option<NaiveTime> {
    let cleaned = clean_time(raw);
    let layouts = match clock {
        ClockStyle::TwentyFourHour => TWENTY_FOUR_HOUR_LAYOUTS,
        _ => TWELVE_HOUR_LAYOUTS,
    };
    let ordered: [&str; 2] = if seconds_first {
        layouts
    } else {
        [layouts[1], layouts[0]]
    };
    ordered
        .iter()
        .find_map(|layout| NaiveTime::parse_from_str(&cleaned, layout).ok())
}

impl TimestampNormalizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Candidate readings in the order they are attempted.
    pub fn candidates(hint: TimestampHint) -> Vec<Candidate> {
        let mut out: Vec<Candidate> = Vec::new();
        let mut push = |candidate: Candidate| {
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        };

        for &year in years_for(hint.year) {
            for &clock in clocks_for(hint.clock) {
                push(Candidate {
                    order: hint.order,
                    year,
                    clock,
                    seconds_first: hint.seconds,
                });
            }
        }

        for year in [YearDigits::Four, YearDigits::Two] {
            for clock in [ClockStyle::TwelveHour, ClockStyle::TwentyFourHour] {
                for order in [hint.order, hint.order.other()] {
                    push(Candidate {
                        order,
                        year,
                        clock,
                        seconds_first: hint.seconds,
                    });
                }
            }
        }
        out
    }

    /// Wall-clock reading of a header timestamp, before time zone resolution.
    pub fn parse_local(
        raw_date: &str,
        raw_time: &str,
        hint: TimestampHint,
    ) -> Result<NaiveDateTime, TranscriptError> {
        Self::candidates(hint)
            .into_iter()
            .find_map(|c| {
                let date = parse_date(raw_date, c.order, c.year)?;
                let time = parse_time(raw_time, c.clock, c.seconds_first)?;
                Some(date.and_time(time))
            })
            .ok_or_else(|| TranscriptError::UnparseableTimestamp {
                date: raw_date.to_string(),
                time: raw_time.to_string(),
            })
    }

    pub fn normalize(
        &self,
        raw_date: &str,
        raw_time: &str,
        hint: TimestampHint,
    ) -> Result<DateTime<Utc>, TranscriptError> {
        let local = Self::parse_local(raw_date, raw_time, hint)?;
        self.resolve_local(&local)
            .ok_or_else(|| TranscriptError::UnparseableTimestamp {
                date: raw_date.to_string(),
                time: raw_time.to_string(),
            })
    }

    /// Pin a wall-clock time to the configured zone. Ambiguous (DST fall-back)
    /// times take the earlier instant; skipped (spring-forward) times move an
    /// hour ahead.
    pub fn resolve_local(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(local)
            .earliest()
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(*local + Duration::hours(1)))
                    .earliest()
            })
            .map(|at| at.with_timezone(&Utc))
    }

    /// True when swapping day and month would also give a valid, different date.
    pub fn is_order_ambiguous(raw_date: &str) -> bool {
        let Some([a, b, _]) = split_date(raw_date) else {
            return false;
        };
        if a.len() == 4 {
            return false;
        }
        match (a.parse::<u32>(), b.parse::<u32>()) {
            (Ok(x), Ok(y)) => x != y && (1..=12).contains(&x) && (1..=12).contains(&y),
            _ => false,
        }
    }

    /// Read a feed `time` value: plain numbers (or numeric strings) are epoch
    /// milliseconds, other strings are tried as ISO-8601. Anything else is
    /// marked invalid instead of failing the batch.
    pub fn normalize_feed(&self, value: &Value) -> MessageTime {
        match value {
            Value::Number(n) => {
                let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64));
                millis_to_time(millis, &n.to_string())
            }
            Value::String(s) => self.normalize_feed_str(s.trim()),
            other => MessageTime::Invalid {
                raw: other.to_string(),
            },
        }
    }

    fn normalize_feed_str(&self, raw: &str) -> MessageTime {
        if let Ok(millis) = raw.parse::<i64>() {
            return millis_to_time(Some(millis), raw);
        }
        if let Ok(millis) = raw.parse::<f64>()
            && millis.is_finite()
        {
            return millis_to_time(Some(millis as i64), raw);
        }
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return MessageTime::known(at.with_timezone(&Utc));
        }
        ISO_NAIVE_LAYOUTS
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
            .and_then(|local| self.resolve_local(&local))
            .map(MessageTime::known)
            .unwrap_or_else(|| MessageTime::Invalid {
                raw: raw.to_string(),
            })
    }
}

fn millis_to_time(millis: Option<i64>, raw: &str) -> MessageTime {
    match millis.and_then(DateTime::<Utc>::from_timestamp_millis) {
        Some(at) => MessageTime::known(at),
        None => MessageTime::Invalid {
            raw: raw.to_string(),
        },
    }
}
