//! Renders messages as a date-grouped transcript for a model to read.
//!
//! ```text
//! ## 2024-01-02 (Tuesday)
//! [15:04] Alice: hello / continued line
//! [15:05] Bob: hi Alice
//! ```
//!
//! Messages are stably sorted by instant first. A message without a
//! timestamp sorts as if it carried the last known instant before it in
//! input order, so it stays next to its neighbours and renders as `--:--`.
//! Leading untimed messages (or a transcript with no times at all) go under
//! an `Undated` block.

use crate::error::TranscriptError;
use crate::transcript::message::{Message, MessageTime, SkippedMessage, SpeakerLabels};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;

pub const UNDATED_LABEL: &str = "Undated";
const UNKNOWN_TIME_LABEL: &str = "--:--";

#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub tz: Tz,
    pub labels: SpeakerLabels,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            tz: Tz::UTC,
            labels: SpeakerLabels::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateBlock {
    pub date: Option<NaiveDate>,
    pub lines: Vec<String>,
}

impl DateBlock {
    pub fn header(&self) -> String {
        match self.date {
            Some(date) => format!("## {} ({})", date.format("%Y-%m-%d"), date.format("%A")),
            None => format!("## {UNDATED_LABEL}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextDocument {
    pub blocks: Vec<DateBlock>,
    pub skipped: Vec<SkippedMessage>,
}

impl ContextDocument {
    pub fn message_count(&self) -> usize {
        self.blocks.iter().map(|b| b.lines.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContextDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", block.header())?;
            for line in &block.lines {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

struct Slot<'m> {
    position: usize,
    message: &'m Message,
    sort_key: Option<DateTime<Utc>>,
}

fn single_line(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

#[derive(Debug, Clone, Default)]
pub struct ContextFormatter {
    options: FormatOptions,
}

impl ContextFormatter {
    pub fn new(options: FormatOptions) -> Self {
        Self { options }
    }

    pub fn format(&self, messages: &[Message]) -> ContextDocument {
        let mut doc = ContextDocument::default();
        let mut slots: Vec<Slot<'_>> = Vec::with_capacity(messages.len());
        let mut carried: Option<DateTime<Utc>> = None;

        for (position, message) in messages.iter().enumerate() {
            if message.body.trim().is_empty() {
                doc.skipped.push(SkippedMessage {
                    position,
                    reason: TranscriptError::EmptyAfterFilter,
                });
                continue;
            }
            if let MessageTime::Invalid { raw } = &message.time {
                tracing::warn!(position, raw = %raw, "skipping message with unreadable time");
                doc.skipped.push(SkippedMessage {
                    position,
                    reason: TranscriptError::UnparseableTimestamp {
                        date: String::new(),
                        time: raw.clone(),
                    },
                });
                continue;
            }
            if let MessageTime::Known { at } = message.time {
                carried = Some(at);
            }
            slots.push(Slot {
                position,
                message,
                sort_key: carried,
            });
        }

        // Stable: equal instants keep input order.
        slots.sort_by_key(|slot| slot.sort_key);

        let mut current: Option<Option<NaiveDate>> = None;
        for slot in slots {
            let local = slot.sort_key.map(|at| at.with_timezone(&self.options.tz));
            let date = local.map(|t| t.date_naive());
            let time_label = match (&slot.message.time, local) {
                (MessageTime::Known { .. }, Some(t)) => t.format("%H:%M").to_string(),
                _ => UNKNOWN_TIME_LABEL.to_string(),
            };

            if current != Some(date) {
                doc.blocks.push(DateBlock {
                    date,
                    lines: Vec::new(),
                });
                current = Some(date);
            }
            let line = format!(
                "[{time_label}] {}: {}",
                slot.message.sender.label(&self.options.labels),
                single_line(&slot.message.body)
            );
            if let Some(block) = doc.blocks.last_mut() {
                block.lines.push(line);
            }
            tracing::trace!(position = slot.position, "formatted message");
        }

        tracing::debug!(
            blocks = doc.blocks.len(),
            rendered = doc.message_count(),
            skipped = doc.skipped.len(),
            "formatted context"
        );
        doc
    }
}
