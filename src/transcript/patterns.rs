//! Header patterns for the known chat export encodings.
//!
//! Order matters: the registry is scanned front to back and the first
//! pattern that matches a line claims it. Two-digit year exports are listed
//! after four-digit ones so `1/2/2024` is never read as year `20`.

use crate::error::ChatCtxError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateOrder {
    MonthFirst,
    DayFirst,
}

impl DateOrder {
    pub fn other(self) -> Self {
        match self {
            Self::MonthFirst => Self::DayFirst,
            Self::DayFirst => Self::MonthFirst,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YearDigits {
    Two,
    Four,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockStyle {
    #[serde(rename = "12h")]
    TwelveHour,
    #[serde(rename = "24h")]
    TwentyFourHour,
    #[serde(rename = "either")]
    Either,
}

/// How to read the date and time a pattern captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampHint {
    pub order: DateOrder,
    pub year: YearDigits,
    pub clock: ClockStyle,
    pub seconds: bool,
}

impl TimestampHint {
    pub const fn new(order: DateOrder, year: YearDigits, clock: ClockStyle, seconds: bool) -> Self {
        Self {
            order,
            year,
            clock,
            seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Timestamped(TimestampHint),
    /// `sender: body` with no timestamp; consulted last.
    Untimed,
}

#[derive(Debug, Clone)]
pub struct MessagePattern {
    name: String,
    regex: Regex,
    kind: PatternKind,
}

/// The pieces of a header line a pattern recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMatch<'a> {
    pub sender: &'a str,
    pub date: Option<&'a str>,
    pub time: Option<&'a str>,
    pub body: &'a str,
}

impl MessagePattern {
    pub fn timestamped(
        name: impl Into<String>,
        source: &str,
        hint: TimestampHint,
    ) -> Result<Self, ChatCtxError> {
        Self::compile(name.into(), source, PatternKind::Timestamped(hint))
    }

    pub fn untimed(name: impl Into<String>, source: &str) -> Result<Self, ChatCtxError> {
        Self::compile(name.into(), source, PatternKind::Untimed)
    }

    fn compile(name: String, source: &str, kind: PatternKind) -> Result<Self, ChatCtxError> {
        let regex = Regex::new(source).map_err(|err| {
            ChatCtxError::InvalidConfig(format!("pattern `{name}` does not compile: {err}"))
        })?;

        let mut required = vec!["sender", "body"];
        if matches!(kind, PatternKind::Timestamped(_)) {
            required.extend(["date", "time"]);
        }
        let groups: Vec<&str> = regex.capture_names().flatten().collect();
        for group in required {
            if !groups.contains(&group) {
                return Err(ChatCtxError::InvalidConfig(format!(
                    "pattern `{name}` is missing the named group `{group}`"
                )));
            }
        }

        Ok(Self { name, regex, kind })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn is_untimed(&self) -> bool {
        matches!(self.kind, PatternKind::Untimed)
    }

    pub fn match_line<'a>(&self, line: &'a str) -> Option<HeaderMatch<'a>> {
        let caps = self.regex.captures(line)?;
        let sender = caps.name("sender")?.as_str().trim();
        if sender.is_empty() {
            return None;
        }
        let body = caps.name("body").map(|m| m.as_str().trim()).unwrap_or("");
        let (date, time) = match self.kind {
            PatternKind::Timestamped(_) => (
                Some(caps.name("date")?.as_str().trim()),
                Some(caps.name("time")?.as_str().trim()),
            ),
            PatternKind::Untimed => (None, None),
        };
        Some(HeaderMatch {
            sender,
            date,
            time,
            body,
        })
    }
}

/// A caller-supplied pattern, usually read from the `[[patterns.extra]]`
/// tables of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub regex: String,
    #[serde(default = "default_order")]
    pub order: DateOrder,
    #[serde(default = "default_year")]
    pub year: YearDigits,
    #[serde(default = "default_clock")]
    pub clock: ClockStyle,
    #[serde(default)]
    pub seconds: bool,
    #[serde(default)]
    pub untimed: bool,
    /// Evaluate ahead of the built-in patterns instead of just before the fallback.
    #[serde(default)]
    pub first: bool,
}

fn default_order() -> DateOrder {
    DateOrder::MonthFirst
}

fn default_year() -> YearDigits {
    YearDigits::Either
}

fn default_clock() -> ClockStyle {
    ClockStyle::Either
}

impl PatternSpec {
    pub fn compile(&self) -> Result<MessagePattern, ChatCtxError> {
        if self.untimed {
            return MessagePattern::untimed(self.name.clone(), &self.regex);
        }
        MessagePattern::timestamped(
            self.name.clone(),
            &self.regex,
            TimestampHint::new(self.order, self.year, self.clock, self.seconds),
        )
    }
}

const MERIDIEM: &str = r"[AaPp]\.?\s?[Mm]\.?";
const DATE_FOUR: &str = r"\d{1,2}[/.\-]\d{1,2}[/.\-]\d{4}";
const DATE_TWO: &str = r"\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2}";
const DATE_EITHER: &str = r"\d{1,2}[/.\-]\d{1,2}[/.\-](?:\d{4}|\d{2})";
const SENDER_BODY: &str = r"(?P<sender>[^:]+?):\s?(?P<body>.*)$";

fn dash_header(date: &str, time: &str) -> String {
    format!(r"^(?P<date>{date}),?\s+(?P<time>{time})\s+-\s+{SENDER_BODY}")
}

fn builtin_patterns() -> Result<Vec<MessagePattern>, ChatCtxError> {
    let twelve_hour = format!(r"\d{{1,2}}:\d{{2}}(?::\d{{2}})?\s?{MERIDIEM}");
    let bracket_time = format!(r"\d{{1,2}}:\d{{2}}(?::\d{{2}})?(?:\s?{MERIDIEM})?");

    Ok(vec![
        MessagePattern::timestamped(
            "dash-4y-12h",
            &dash_header(DATE_FOUR, &twelve_hour),
            TimestampHint::new(
                DateOrder::MonthFirst,
                YearDigits::Four,
                ClockStyle::TwelveHour,
                false,
            ),
        )?,
        MessagePattern::timestamped(
            "dash-2y-12h",
            &dash_header(DATE_TWO, &twelve_hour),
            TimestampHint::new(
                DateOrder::MonthFirst,
                YearDigits::Two,
                ClockStyle::TwelveHour,
                false,
            ),
        )?,
        MessagePattern::timestamped(
            "dash-24h-seconds",
            &dash_header(DATE_EITHER, r"\d{1,2}:\d{2}:\d{2}"),
            TimestampHint::new(
                DateOrder::DayFirst,
                YearDigits::Either,
                ClockStyle::TwentyFourHour,
                true,
            ),
        )?,
        MessagePattern::timestamped(
            "dash-24h",
            &dash_header(DATE_EITHER, r"\d{1,2}:\d{2}"),
            TimestampHint::new(
                DateOrder::DayFirst,
                YearDigits::Either,
                ClockStyle::TwentyFourHour,
                false,
            ),
        )?,
        MessagePattern::timestamped(
            "bracketed",
            &format!(
                r"^\[(?P<date>{DATE_EITHER}),?\s+(?P<time>{bracket_time})\]\s*{SENDER_BODY}"
            ),
            TimestampHint::new(
                DateOrder::MonthFirst,
                YearDigits::Either,
                ClockStyle::Either,
                true,
            ),
        )?,
        MessagePattern::untimed(
            "sender-only",
            r"^(?P<sender>[^\s\d:\[\]][^:\[\]]{0,63}?):\s+(?P<body>\S.*)$",
        )?,
    ])
}

// Built-in sources are literals covered by the tests below.
static BUILTIN: LazyLock<Vec<MessagePattern>> =
    LazyLock::new(|| builtin_patterns().expect("built-in header patterns"));

#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: Vec<MessagePattern>,
    retire_untimed_after_dated: bool,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternRegistry {
    pub fn builtin() -> Self {
        Self {
            patterns: BUILTIN.clone(),
            retire_untimed_after_dated: false,
        }
    }

    /// When on, the untimed fallback stops matching once a timestamped
    /// header has been seen, so `Re: lunch` inside a dated export stays a
    /// continuation line.
    pub fn retiring_untimed_after_dated(mut self, on: bool) -> Self {
        self.retire_untimed_after_dated = on;
        self
    }

    pub fn retires_untimed_after_dated(&self) -> bool {
        self.retire_untimed_after_dated
    }

    /// Built-ins plus caller patterns. Caller patterns go just ahead of the
    /// untimed fallback unless they ask to be `first`.
    pub fn with_extra(specs: &[PatternSpec]) -> Result<Self, ChatCtxError> {
        let mut registry = Self::builtin();
        let mut leading = Vec::new();
        for spec in specs {
            let pattern = spec.compile()?;
            if spec.first {
                leading.push(pattern);
            } else {
                registry.insert_before_fallback(pattern);
            }
        }
        leading.append(&mut registry.patterns);
        registry.patterns = leading;
        Ok(registry)
    }

    pub fn insert_before_fallback(&mut self, pattern: MessagePattern) {
        let at = self
            .patterns
            .iter()
            .position(MessagePattern::is_untimed)
            .unwrap_or(self.patterns.len());
        self.patterns.insert(at, pattern);
    }

    pub fn patterns(&self) -> &[MessagePattern] {
        &self.patterns
    }

    /// First pattern, in registry order, that recognises `line` as a header.
    pub fn first_match<'a>(
        &'a self,
        line: &'a str,
        allow_untimed: bool,
    ) -> Option<(&'a MessagePattern, HeaderMatch<'a>)> {
        self.patterns
            .iter()
            .filter(|p| allow_untimed || !p.is_untimed())
            .find_map(|p| p.match_line(line).map(|m| (p, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched_name(registry: &PatternRegistry, line: &str) -> Option<String> {
        registry
            .first_match(line, true)
            .map(|(p, _)| p.name().to_string())
    }

    #[test]
    fn builtin_registry_compiles_in_documented_order() {
        let registry = PatternRegistry::builtin();
        let names: Vec<&str> = registry.patterns().iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec![
                "dash-4y-12h",
                "dash-2y-12h",
                "dash-24h-seconds",
                "dash-24h",
                "bracketed",
                "sender-only"
            ]
        );
    }

    #[test]
    fn recognises_each_export_variant() {
        let registry = PatternRegistry::builtin();
        assert_eq!(
            matched_name(&registry, "1/2/2024, 3:04 PM - Alice: hello").as_deref(),
            Some("dash-4y-12h")
        );
        assert_eq!(
            matched_name(&registry, "1/2/24, 3:04\u{202f}pm - Alice: hello").as_deref(),
            Some("dash-2y-12h")
        );
        assert_eq!(
            matched_name(&registry, "02.01.24, 15:04:05 - Alice: hello").as_deref(),
            Some("dash-24h-seconds")
        );
        assert_eq!(
            matched_name(&registry, "02/01/2024, 15:04 - Alice: hello").as_deref(),
            Some("dash-24h")
        );
        assert_eq!(
            matched_name(&registry, "[1/2/24, 3:04:05 PM] Alice: hello").as_deref(),
            Some("bracketed")
        );
        assert_eq!(
            matched_name(&registry, "Alice: hello").as_deref(),
            Some("sender-only")
        );
    }

    #[test]
    fn header_match_splits_sender_and_body() {
        let registry = PatternRegistry::builtin();
        let (_, m) = registry
            .first_match("1/2/24, 3:04 PM - Bob: hi Alice: again", true)
            .expect("header");
        assert_eq!(m.sender, "Bob");
        assert_eq!(m.date, Some("1/2/24"));
        assert_eq!(m.time, Some("3:04 PM"));
        assert_eq!(m.body, "hi Alice: again");
    }

    #[test]
    fn untimed_fallback_can_be_excluded() {
        let registry = PatternRegistry::builtin();
        assert!(registry.first_match("Note: bring snacks", false).is_none());
        assert!(registry.first_match("Note: bring snacks", true).is_some());
    }

    #[test]
    fn system_notices_are_not_headers() {
        let registry = PatternRegistry::builtin();
        assert!(
            registry
                .first_match("1/2/24, 3:00 PM - Messages and calls are end-to-end encrypted.", true)
                .is_none()
        );
        assert!(registry.first_match("", true).is_none());
    }

    #[test]
    fn extra_patterns_slot_before_fallback_or_first() {
        let specs = vec![
            PatternSpec {
                name: "iso".into(),
                regex: r"^(?P<date>\d{4}-\d{2}-\d{2}) (?P<time>\d{2}:\d{2}) <(?P<sender>[^>]+)> (?P<body>.*)$".into(),
                order: DateOrder::MonthFirst,
                year: YearDigits::Four,
                clock: ClockStyle::TwentyFourHour,
                seconds: false,
                untimed: false,
                first: false,
            },
            PatternSpec {
                name: "irc".into(),
                regex: r"^\* (?P<sender>\S+) (?P<body>.*)$".into(),
                order: DateOrder::MonthFirst,
                year: YearDigits::Either,
                clock: ClockStyle::Either,
                seconds: false,
                untimed: true,
                first: true,
            },
        ];
        let registry = PatternRegistry::with_extra(&specs).expect("registry");
        let names: Vec<&str> = registry.patterns().iter().map(|p| p.name()).collect();
        assert_eq!(names.first(), Some(&"irc"));
        assert_eq!(names[names.len() - 2], "iso");
        assert_eq!(names.last(), Some(&"sender-only"));
        assert_eq!(
            matched_name(&registry, "2024-01-02 15:04 <alice> hi").as_deref(),
            Some("iso")
        );
    }

    #[test]
    fn extra_pattern_without_required_groups_is_rejected() {
        let spec = PatternSpec {
            name: "broken".into(),
            regex: r"^(?P<sender>\w+): (?P<body>.*)$".into(),
            order: DateOrder::MonthFirst,
            year: YearDigits::Either,
            clock: ClockStyle::Either,
            seconds: false,
            untimed: false,
            first: false,
        };
        let err = PatternRegistry::with_extra(&[spec]).unwrap_err();
        assert!(err.to_string().contains("named group `date`"));

        let bad_regex = PatternSpec {
            name: "bad".into(),
            regex: "(".into(),
            order: DateOrder::MonthFirst,
            year: YearDigits::Either,
            clock: ClockStyle::Either,
            seconds: false,
            untimed: true,
            first: false,
        };
        assert!(PatternRegistry::with_extra(&[bad_regex]).is_err());
    }
}
