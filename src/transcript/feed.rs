use crate::error::TranscriptError;
use crate::transcript::message::{Batch, Message, MessageTime, Origin, Speaker};
use crate::transcript::timestamp::TimestampNormalizer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message as a live bridge reports it. Only these three fields are
/// read; anything else in the record is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(alias = "Time", alias = "timestamp", default)]
    pub time: Value,
    #[serde(alias = "IsFromMe", alias = "isFromMe", default)]
    pub is_from_me: Option<bool>,
    #[serde(alias = "Content", default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedPayload {
    Bare(Vec<FeedRecord>),
    Wrapped { messages: Option<Vec<FeedRecord>> },
}

/// Accepts either a bare array of records or `{"messages": [...]}`.
pub fn parse_feed_json(text: &str) -> Result<Vec<FeedRecord>, serde_json::Error> {
    Ok(match serde_json::from_str::<FeedPayload>(text)? {
        FeedPayload::Bare(records) => records,
        FeedPayload::Wrapped { messages } => messages.unwrap_or_default(),
    })
}

impl FeedRecord {
    pub fn to_message(&self, normalizer: &TimestampNormalizer) -> Message {
        let sender = if self.is_from_me.unwrap_or(false) {
            Speaker::SelfParty
        } else {
            Speaker::Counterpart
        };
        Message {
            sender,
            time: normalizer.normalize_feed(&self.time),
            body: self.content.clone().unwrap_or_default(),
            origin: Origin::SuppliedNumeric,
        }
    }
}

/// Normalize feed records and sort them by time. Feed order is not
/// guaranteed to be chronological; ties keep feed order.
///
/// Records are never rejected here. Unreadable times become
/// `MessageTime::Invalid` and empty bodies survive until formatting, where
/// both are skipped with a reason.
pub fn messages_from_feed(records: &[FeedRecord], normalizer: &TimestampNormalizer) -> Vec<Message> {
    let mut messages: Vec<Message> = records.iter().map(|r| r.to_message(normalizer)).collect();
    messages.sort_by_key(|m| m.time.instant());
    let invalid = messages.iter().filter(|m| m.time.is_invalid()).count();
    if invalid > 0 {
        tracing::warn!(invalid, total = messages.len(), "feed records with unreadable time");
    }
    messages
}

/// Feed messages that are usable for chunking: readable time, non-empty body.
pub fn usable_feed_messages(messages: Vec<Message>) -> Batch<Message> {
    let mut batch = Batch::default();
    for (position, message) in messages.into_iter().enumerate() {
        let outcome = if message.body.trim().is_empty() {
            Err(TranscriptError::EmptyAfterFilter)
        } else if let MessageTime::Invalid { raw } = &message.time {
            Err(TranscriptError::UnparseableTimestamp {
                date: String::new(),
                time: raw.clone(),
            })
        } else {
            Ok(message)
        };
        batch.push(position, outcome);
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn accepts_bare_array_with_snake_case_fields() {
        let records = parse_feed_json(
            r#"[{"time": 1704207840000, "is_from_me": true, "content": "hello", "id": "x1"}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].is_from_me, Some(true));
        assert_eq!(records[0].content.as_deref(), Some("hello"));
    }

    #[test]
    fn accepts_wrapped_bridge_payload_with_native_names() {
        let records = parse_feed_json(
            r#"{"messages": [{"Time": "2024-01-02T15:04:00Z", "Sender": "123@s", "Content": "hi", "IsFromMe": false, "MediaType": ""}]}"#,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, Value::String("2024-01-02T15:04:00Z".into()));
        assert_eq!(records[0].is_from_me, Some(false));
    }

    #[test]
    fn null_message_list_is_empty() {
        assert!(parse_feed_json(r#"{"messages": null}"#).unwrap().is_empty());
    }

    #[test]
    fn feed_is_sorted_by_time_and_labelled_by_flag() {
        let records = parse_feed_json(
            r#"[
                {"time": "1704207900000", "is_from_me": false, "content": "second"},
                {"time": 1704207840000, "is_from_me": true, "content": "first"}
            ]"#,
        )
        .unwrap();
        let messages = messages_from_feed(&records, &TimestampNormalizer::default());
        assert_eq!(messages[0].body, "first");
        assert_eq!(messages[0].sender, Speaker::SelfParty);
        assert_eq!(messages[1].sender, Speaker::Counterpart);
        assert_eq!(
            messages[0].time,
            MessageTime::known(Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 0).unwrap())
        );
        assert!(messages.iter().all(|m| m.origin == Origin::SuppliedNumeric));
    }

    #[test]
    fn unreadable_time_degrades_single_record() {
        let records = parse_feed_json(
            r#"[{"time": "not a time", "content": "a"}, {"time": 0, "content": "b"}, {"time": 1000, "content": ""}]"#,
        )
        .unwrap();
        let messages = messages_from_feed(&records, &TimestampNormalizer::default());
        assert_eq!(messages.len(), 3);
        let batch = usable_feed_messages(messages);
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].body, "b");
        assert_eq!(batch.skipped.len(), 2);
    }
}
