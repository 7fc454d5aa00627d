use crate::error::TranscriptError;
use crate::transcript::message::{Batch, Message, MessageTime, Origin, SkippedMessage, Speaker};
use crate::transcript::patterns::{PatternKind, PatternRegistry};
use crate::transcript::reconstruct::{MessageReconstructor, RawMessageRecord};
use crate::transcript::timestamp::TimestampNormalizer;

/// Outcome of ingesting one exported transcript.
#[derive(Debug, Clone, Default)]
pub struct TranscriptBatch {
    pub messages: Vec<Message>,
    pub skipped: Vec<SkippedMessage>,
    pub line_count: usize,
    pub discarded_lines: usize,
    pub discarded_sample: Vec<String>,
    /// Dates like `03/04/24` that read as valid either way round.
    pub ambiguous_dates: usize,
}

const MAX_SKIP_SAMPLE: usize = 5;

fn line_reasons(skipped: &[SkippedMessage]) -> Vec<String> {
    skipped
        .iter()
        .map(|s| format!("line {}: {}", s.position, s.reason))
        .collect()
}

impl TranscriptBatch {
    pub fn skip_reasons(&self) -> Vec<String> {
        line_reasons(&self.skipped)
    }
}

/// Strict UTF-8 decode with a leading byte-order mark removed.
pub fn decode(bytes: &[u8]) -> Result<&str, TranscriptError> {
    let text = std::str::from_utf8(bytes).map_err(|err| TranscriptError::UndecodableInput {
        valid_up_to: err.valid_up_to(),
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

pub fn normalize_record(
    record: &RawMessageRecord,
    normalizer: &TimestampNormalizer,
) -> Result<Message, TranscriptError> {
    let time = match (record.kind, &record.raw_date, &record.raw_time) {
        (PatternKind::Timestamped(hint), Some(date), Some(time)) => {
            MessageTime::known(normalizer.normalize(date, time, hint)?)
        }
        _ => MessageTime::Unknown,
    };
    Ok(Message {
        sender: Speaker::Named(record.sender.clone()),
        time,
        body: record.body.clone(),
        origin: Origin::ParsedFromText,
    })
}

pub fn ingest(
    bytes: &[u8],
    registry: &PatternRegistry,
    normalizer: &TimestampNormalizer,
) -> Result<TranscriptBatch, TranscriptError> {
    ingest_text(decode(bytes)?, registry, normalizer)
}

/// Reconstruct and normalize `text`. Records whose timestamp cannot be read
/// are skipped and reported; the batch fails only when nothing usable is
/// left.
pub fn ingest_text(
    text: &str,
    registry: &PatternRegistry,
    normalizer: &TimestampNormalizer,
) -> Result<TranscriptBatch, TranscriptError> {
    let rebuilt = MessageReconstructor::new(registry).reconstruct(text);
    let mut batch: Batch<Message> = Batch::default();
    let mut ambiguous_dates = 0usize;

    for record in &rebuilt.records {
        let outcome = normalize_record(record, normalizer);
        match &outcome {
            Ok(_) => {
                if let Some(date) = &record.raw_date
                    && TimestampNormalizer::is_order_ambiguous(date)
                {
                    ambiguous_dates += 1;
                    tracing::debug!(line = record.line, date = %date, pattern = %record.pattern, "day/month order ambiguous");
                }
            }
            Err(reason) => {
                tracing::warn!(line = record.line, reason = %reason, "skipping message");
            }
        }
        batch.push(record.line, outcome);
    }

    if batch.items.is_empty() {
        let mut unmatched_sample = rebuilt.discarded_sample.clone();
        if unmatched_sample.is_empty() {
            unmatched_sample = line_reasons(&batch.skipped);
            unmatched_sample.truncate(MAX_SKIP_SAMPLE);
        }
        return Err(TranscriptError::NoMessagesFound {
            line_count: rebuilt.line_count,
            unmatched_sample,
        });
    }

    if ambiguous_dates > 0 {
        tracing::info!(ambiguous_dates, "resolved ambiguous dates by pattern order");
    }
    tracing::info!(
        messages = batch.items.len(),
        skipped = batch.skipped.len(),
        lines = rebuilt.line_count,
        "ingested transcript"
    );

    Ok(TranscriptBatch {
        messages: batch.items,
        skipped: batch.skipped,
        line_count: rebuilt.line_count,
        discarded_lines: rebuilt.discarded_lines,
        discarded_sample: rebuilt.discarded_sample,
        ambiguous_dates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn run(text: &str) -> Result<TranscriptBatch, TranscriptError> {
        ingest_text(text, &PatternRegistry::builtin(), &TimestampNormalizer::default())
    }

    #[test]
    fn two_message_conversation_normalizes() {
        let batch = run(
            "1/2/24, 3:04 PM - Alice: hello\ncontinued line\n1/2/24, 3:05 PM - Bob: hi Alice",
        )
        .unwrap();
        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.messages[0].sender, Speaker::Named("Alice".into()));
        assert_eq!(batch.messages[0].body, "hello\ncontinued line");
        assert_eq!(
            batch.messages[0].time,
            MessageTime::known(Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 0).unwrap())
        );
        assert_eq!(batch.messages[1].body, "hi Alice");
        assert_eq!(batch.ambiguous_dates, 2);
    }

    #[test]
    fn invalid_utf8_is_undecodable_not_a_parse_failure() {
        let err = ingest(
            b"1/2/24, 3:04 PM - A: ok\n\xff\xfe",
            &PatternRegistry::builtin(),
            &TimestampNormalizer::default(),
        )
        .unwrap_err();
        assert_eq!(err, TranscriptError::UndecodableInput { valid_up_to: 24 });
    }

    #[test]
    fn byte_order_mark_is_stripped() {
        assert_eq!(decode("\u{feff}hi".as_bytes()).unwrap(), "hi");
    }

    #[test]
    fn empty_input_reports_no_messages() {
        let err = run("").unwrap_err();
        assert_eq!(
            err,
            TranscriptError::NoMessagesFound {
                line_count: 0,
                unmatched_sample: Vec::new()
            }
        );
    }

    #[test]
    fn noise_only_input_carries_sample() {
        let err = run("just some text\nwithout any header\n").unwrap_err();
        match err {
            TranscriptError::NoMessagesFound {
                line_count,
                unmatched_sample,
            } => {
                assert_eq!(line_count, 2);
                assert_eq!(unmatched_sample[0], "just some text");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn every_record_skipped_is_no_messages_found() {
        let text = (1..=7)
            .map(|i| format!("13/45/24, 3:0{i} PM - Alice: note {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let err = run(&text).unwrap_err();
        match err {
            TranscriptError::NoMessagesFound {
                line_count,
                unmatched_sample,
            } => {
                assert_eq!(line_count, 7);
                assert_eq!(unmatched_sample.len(), 5);
                assert_eq!(
                    unmatched_sample[0],
                    "line 1: unparseable timestamp `13/45/24 3:01 PM`"
                );
                assert!(unmatched_sample[4].starts_with("line 5: unparseable timestamp"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_timestamp_skips_one_message() {
        let batch = run("13/45/24, 3:04 PM - Alice: bad date\n1/2/24, 3:05 PM - Bob: fine").unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].position, 1);
        assert!(matches!(
            batch.skipped[0].reason,
            TranscriptError::UnparseableTimestamp { .. }
        ));
    }

    #[test]
    fn headerless_messages_have_unknown_time() {
        let batch = run("Alice: hi\nBob: hey").unwrap();
        assert_eq!(batch.messages.len(), 2);
        assert!(batch.messages.iter().all(|m| m.time == MessageTime::Unknown));
    }
}
